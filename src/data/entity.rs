//! Entities: validated field sets with an identity and a storage life cycle

use crate::data::factory::{Factory, FactoryInner};
use crate::data::validators::{failed_validations, validator_by_name, Validator};
use crate::domain::errors::{DataError, DomainError, ValidationError};
use crate::domain::repositories::Record;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// Field that holds the identity of a persisted entity.
pub const ID_FIELD: &str = "id";

pub type FieldValidators = BTreeMap<String, Vec<Arc<dyn Validator>>>;

/// Anything that can be reduced to raw field data.
pub trait FieldsData: Send + Sync + fmt::Debug {
    fn fields_data(&self) -> Record;
}

/// Value of an entity field: plain data, or entities embedded in it.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Data(Value),
    Embedded(Arc<dyn FieldsData>),
    EmbeddedList(Vec<Arc<dyn FieldsData>>),
}

impl FieldValue {
    pub fn embed(entity: impl FieldsData + 'static) -> Self {
        FieldValue::Embedded(Arc::new(entity))
    }

    /// Reduce to plain data, embedded entities becoming their field data.
    pub fn to_value(&self) -> Value {
        match self {
            FieldValue::Data(value) => value.clone(),
            FieldValue::Embedded(entity) => Value::Object(entity.fields_data()),
            FieldValue::EmbeddedList(entities) => Value::Array(
                entities
                    .iter()
                    .map(|entity| Value::Object(entity.fields_data()))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Data(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Data(Value::String(value.to_string()))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Data(Value::String(value))
    }
}

/// Declared shape of an entity type: its tag, fields and default validators.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    tag: String,
    fields: Vec<String>,
    validators: FieldValidators,
}

impl EntitySchema {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            fields: vec![ID_FIELD.to_string()],
            validators: BTreeMap::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.fields.contains(&name) {
            self.fields.push(name);
        }
        self
    }

    pub fn validated_field(mut self, name: impl Into<String>, validators: Vec<Arc<dyn Validator>>) -> Self {
        let name = name.into();
        self.validators.entry(name.clone()).or_default().extend(validators);
        self.field(name)
    }

    /// Declare a field whose validators are given by name.
    pub fn field_with_validators(self, name: impl Into<String>, validator_names: &[String]) -> Result<Self, DomainError> {
        let validators = validator_names
            .iter()
            .map(|validator_name| {
                validator_by_name(validator_name)
                    .ok_or_else(|| DomainError::InvalidSchema(format!("Unknown validator '{}'", validator_name)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.validated_field(name, validators))
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn field_validators(&self) -> &FieldValidators {
        &self.validators
    }
}

/// Validate incoming fields, then hand the ones to keep to `apply`.
///
/// Atomic updates apply nothing unless every field passes. Non-atomic updates
/// apply each valid field and still report the invalid ones.
fn validate_and_apply<I, K, V>(
    data: I,
    atomic: bool,
    validators: &FieldValidators,
    mut apply: impl FnMut(String, FieldValue),
) -> Result<(), ValidationError>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<FieldValue>,
{
    let mut failures = ValidationError::new();
    let mut accepted = Vec::new();

    for (name, value) in data {
        let (name, value) = (name.into(), value.into());
        let messages = failed_validations(validators.get(&name), &name, &value.to_value());
        if !messages.is_empty() {
            failures.add(name, messages);
        } else if atomic {
            accepted.push((name, value));
        } else {
            apply(name, value);
        }
    }

    if !failures.is_empty() {
        return Err(failures);
    }
    for (name, value) in accepted {
        apply(name, value);
    }
    Ok(())
}

fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn declared_fields_data(fields: &[String], values: &BTreeMap<String, FieldValue>) -> Record {
    fields
        .iter()
        .map(|name| {
            let value = values.get(name).map(FieldValue::to_value).unwrap_or(Value::Null);
            (name.clone(), value)
        })
        .collect()
}

#[derive(Debug)]
struct EntityState {
    id: Option<String>,
    is_new: bool,
    destroyed: bool,
    values: BTreeMap<String, FieldValue>,
    validators: FieldValidators,
}

struct EntityInner {
    schema: Arc<EntitySchema>,
    factory: Weak<FactoryInner>,
    state: RwLock<EntityState>,
}

/// A persisted record of some entity type.
///
/// `Entity` is a handle: clones share the same state, so the instance a
/// factory hands out for an id is the one every holder sees.
#[derive(Clone)]
pub struct Entity {
    inner: Arc<EntityInner>,
}

impl Entity {
    /// Build an entity from raw data without validating it.
    pub(crate) fn build(schema: Arc<EntitySchema>, factory: Weak<FactoryInner>, data: Record, is_new: bool) -> Self {
        let validators = schema.field_validators().clone();
        let mut state = EntityState {
            id: None,
            is_new,
            destroyed: false,
            values: BTreeMap::new(),
            validators,
        };
        for (name, value) in data {
            if name == ID_FIELD {
                state.id = id_from_value(&value);
            } else {
                state.values.insert(name, FieldValue::Data(value));
            }
        }

        Self {
            inner: Arc::new(EntityInner {
                schema,
                factory,
                state: RwLock::new(state),
            }),
        }
    }

    pub fn id(&self) -> Option<String> {
        self.inner.state.read().id.clone()
    }

    pub fn is_new(&self) -> bool {
        self.inner.state.read().is_new
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.read().destroyed
    }

    pub fn tag(&self) -> &str {
        self.inner.schema.tag()
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.inner.schema
    }

    /// Current value of a field, reduced to plain data.
    pub fn get(&self, name: &str) -> Option<Value> {
        let state = self.inner.state.read();
        if name == ID_FIELD {
            return state.id.clone().map(Value::String);
        }
        state.values.get(name).map(FieldValue::to_value)
    }

    pub fn get_field(&self, name: &str) -> Option<FieldValue> {
        self.inner.state.read().values.get(name).cloned()
    }

    /// Whether two handles refer to the same in-memory instance.
    pub fn same_instance(&self, other: &Entity) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Replace the validators of the given fields on this instance.
    pub fn set_field_validators(&self, validators: FieldValidators) {
        let mut state = self.inner.state.write();
        for (name, field_validators) in validators {
            state.validators.insert(name, field_validators);
        }
    }

    /// Add validators to the given fields on this instance.
    pub fn add_field_validators(&self, validators: FieldValidators) {
        let mut state = self.inner.state.write();
        for (name, field_validators) in validators {
            state.validators.entry(name).or_default().extend(field_validators);
        }
    }

    /// Change field values, validating them first.
    ///
    /// When the data carries an id the factory has not cached yet, the
    /// entity registers itself under it, dropping its previous id.
    pub fn update<I, K, V>(&self, data: I, atomic: bool) -> Result<(), DataError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        let (old_id, new_id) = {
            let mut guard = self.inner.state.write();
            if guard.destroyed {
                return Err(DataError::Destroyed(self.describe(&guard)));
            }

            let state = &mut *guard;
            let mut new_id = None;
            let values = &mut state.values;
            validate_and_apply(data, atomic, &state.validators, |name, value| {
                if name == ID_FIELD {
                    new_id = Some(id_from_value(&value.to_value()));
                } else {
                    values.insert(name, value);
                }
            })?;

            let old_id = state.id.clone();
            if let Some(id) = new_id.clone() {
                state.id = id;
            }
            (old_id, new_id.flatten())
        };

        if let (Some(id), Some(factory)) = (new_id, self.factory()) {
            if let Some(old_id) = old_id.filter(|old_id| *old_id != id) {
                factory.unregister_id(&old_id, self);
            }
            if factory.get_entity(&id).is_none() {
                factory.register_entity(self);
            }
        }
        Ok(())
    }

    /// Declared fields with their current values, embedded entities
    /// reduced to their own field data.
    pub fn fields_data(&self) -> Record {
        let state = self.inner.state.read();
        let mut data = declared_fields_data(self.inner.schema.fields(), &state.values);
        data.insert(
            ID_FIELD.to_string(),
            state.id.clone().map(Value::String).unwrap_or(Value::Null),
        );
        data
    }

    /// Persist the entity, creating it in the data source if it is new.
    pub fn store(&self) -> Result<(), DataError> {
        let (is_new, id) = {
            let state = self.inner.state.read();
            if state.destroyed {
                return Err(DataError::Destroyed(self.describe(&state)));
            }
            (state.is_new, state.id.clone())
        };
        let factory = self.require_factory()?;
        let data = self.fields_data();

        if is_new {
            let new_id = factory.data_source().create(&data)?;
            tracing::debug!("Stored new {} with ID {}", self.tag(), new_id);
            {
                let mut state = self.inner.state.write();
                state.id = Some(new_id);
                state.is_new = false;
            }
            factory.register_entity(self);
        } else {
            let id = id.ok_or_else(|| DataError::NotPersistable(format!("{} has no ID", self.tag())))?;
            factory.data_source().update(&id, &data)?;
            tracing::debug!("Updated {}:{}", self.tag(), id);
        }
        Ok(())
    }

    /// Delete the entity from storage and forget it.
    pub fn destroy(&self) -> Result<(), DataError> {
        let id = {
            let state = self.inner.state.read();
            if state.destroyed {
                return Err(DataError::Destroyed(self.describe(&state)));
            }
            state
                .id
                .clone()
                .ok_or_else(|| DataError::NotPersistable(format!("{} was never stored", self.tag())))?
        };
        let factory = self.require_factory()?;

        factory.data_source().destroy(&id)?;
        factory.unregister_entity(self);
        self.inner.state.write().destroyed = true;
        tracing::debug!("Destroyed {}:{}", self.tag(), id);
        Ok(())
    }

    fn factory(&self) -> Option<Factory> {
        self.inner.factory.upgrade().map(Factory::from_inner)
    }

    fn require_factory(&self) -> Result<Factory, DataError> {
        self.factory()
            .ok_or_else(|| DataError::NotPersistable(format!("the {} factory is gone", self.tag())))
    }

    fn describe(&self, state: &EntityState) -> String {
        format!("{}:{}", self.tag(), state.id.as_deref().unwrap_or("new"))
    }
}

impl FieldsData for Entity {
    fn fields_data(&self) -> Record {
        Entity::fields_data(self)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Entity")
            .field("tag", &self.tag())
            .field("id", &state.id)
            .field("is_new", &state.is_new)
            .field("destroyed", &state.destroyed)
            .finish()
    }
}

/// An entity that only lives embedded in another one.
///
/// It validates and reports its field data like any entity, but it has no
/// identity and no storage operations.
#[derive(Debug, Clone)]
pub struct Subentity {
    schema: Arc<EntitySchema>,
    values: BTreeMap<String, FieldValue>,
    validators: FieldValidators,
}

impl Subentity {
    pub fn new(schema: Arc<EntitySchema>) -> Self {
        let validators = schema.field_validators().clone();
        Self {
            schema,
            values: BTreeMap::new(),
            validators,
        }
    }

    /// Build a subentity from data, validating every field.
    pub fn with_data(schema: Arc<EntitySchema>, data: Record) -> Result<Self, DataError> {
        let mut subentity = Self::new(schema);
        subentity.update(data, true)?;
        Ok(subentity)
    }

    pub fn update<I, K, V>(&mut self, data: I, atomic: bool) -> Result<(), DataError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        let values = &mut self.values;
        validate_and_apply(data, atomic, &self.validators, |name, value| {
            values.insert(name, value);
        })?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).map(FieldValue::to_value)
    }

    pub fn tag(&self) -> &str {
        self.schema.tag()
    }
}

impl FieldsData for Subentity {
    fn fields_data(&self) -> Record {
        let fields: Vec<String> = self
            .schema
            .fields()
            .iter()
            .filter(|name| name.as_str() != ID_FIELD)
            .cloned()
            .collect();
        declared_fields_data(&fields, &self.values)
    }
}
