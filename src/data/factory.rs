//! Per-type entity factories and their identity maps

use crate::data::entity::{Entity, EntitySchema, ID_FIELD};
use crate::domain::errors::DataError;
use crate::domain::repositories::{DataSource, Record};
use moka::sync::Cache;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub(crate) struct FactoryInner {
    schema: Arc<EntitySchema>,
    source: Arc<dyn DataSource>,
    cache: Cache<String, Entity>,
}

/// Builds, caches and looks up the entities of one type.
///
/// The cache is an identity map: for a given id, every lookup yields the
/// same instance until the entity is unregistered or destroyed.
#[derive(Clone)]
pub struct Factory {
    inner: Arc<FactoryInner>,
}

impl Factory {
    pub fn new(schema: EntitySchema, source: Arc<dyn DataSource>) -> Self {
        Self {
            inner: Arc::new(FactoryInner {
                schema: Arc::new(schema),
                source,
                cache: Cache::builder().build(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<FactoryInner>) -> Self {
        Self { inner }
    }

    pub fn tag(&self) -> &str {
        self.inner.schema.tag()
    }

    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.inner.schema
    }

    pub fn data_source(&self) -> &Arc<dyn DataSource> {
        &self.inner.source
    }

    /// Cached entity for an id. Never touches the data source.
    pub fn get_entity(&self, id: &str) -> Option<Entity> {
        self.inner.cache.get(id)
    }

    /// Cached entity for an id, loading it from the data source on a miss.
    pub fn find_entity(&self, id: &str) -> Result<Entity, DataError> {
        if let Some(entity) = self.get_entity(id) {
            tracing::debug!("Cache hit for {}:{}", self.tag(), id);
            return Ok(entity);
        }
        tracing::debug!("Cache miss for {}:{}", self.tag(), id);

        let mut data = self.inner.source.retrieve(id).map_err(|e| match e {
            DataError::NotFound(_) => DataError::NotFound(format!("{}:{}", self.tag(), id)),
            other => other,
        })?;
        data.insert(ID_FIELD.to_string(), Value::String(id.to_string()));

        let entity = self.rehydrate(data);
        self.register_entity(&entity);
        Ok(entity)
    }

    /// Every entity matching the filter. Cached instances take precedence
    /// over the data the source returns for the same id.
    pub fn get_all(&self, filter: Option<&Record>) -> Result<Vec<Entity>, DataError> {
        let records = self.inner.source.retrieve_all(filter)?;
        tracing::debug!("Retrieved {} {} records", records.len(), self.tag());

        let entities = records
            .into_iter()
            .map(|record| {
                let id = record.get(ID_FIELD).and_then(|id| match id {
                    Value::String(id) => Some(id.clone()),
                    Value::Number(id) => Some(id.to_string()),
                    _ => None,
                });
                match id.as_deref().and_then(|id| self.get_entity(id)) {
                    Some(cached) => cached,
                    None => {
                        let entity = self.rehydrate(record);
                        self.register_entity(&entity);
                        entity
                    }
                }
            })
            .collect();
        Ok(entities)
    }

    pub fn count(&self, filter: Option<&Record>) -> Result<usize, DataError> {
        self.inner.source.count(filter)
    }

    /// A new, unsaved entity holding validated data.
    pub fn new_entity(&self, data: Record) -> Result<Entity, DataError> {
        let entity = Entity::build(self.inner.schema.clone(), Arc::downgrade(&self.inner), Record::new(), true);
        entity.update(data, true)?;
        Ok(entity)
    }

    /// Put an entity in the identity map under its id.
    pub fn register_entity(&self, entity: &Entity) {
        match entity.id() {
            Some(id) => {
                tracing::debug!("Registering {}:{}", self.tag(), id);
                self.inner.cache.insert(id, entity.clone());
            }
            None => tracing::warn!("Cannot register a {} entity without an ID", self.tag()),
        }
    }

    pub fn unregister_entity(&self, entity: &Entity) {
        if let Some(id) = entity.id() {
            tracing::debug!("Unregistering {}:{}", self.tag(), id);
            self.inner.cache.invalidate(&id);
        }
    }

    /// Drop a cached id, as long as it still points at this entity.
    pub(crate) fn unregister_id(&self, id: &str, entity: &Entity) {
        let cached = self.inner.cache.get(id);
        if cached.is_some_and(|cached| cached.same_instance(entity)) {
            tracing::debug!("Unregistering {}:{}", self.tag(), id);
            self.inner.cache.invalidate(id);
        }
    }

    fn rehydrate(&self, data: Record) -> Entity {
        Entity::build(self.inner.schema.clone(), Arc::downgrade(&self.inner), data, false)
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory").field("tag", &self.tag()).finish()
    }
}

/// The factories of an application, keyed by entity type tag.
#[derive(Debug, Clone, Default)]
pub struct FactoryRegistry {
    factories: BTreeMap<String, Factory>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Factory) -> &mut Self {
        tracing::debug!("Registered factory for {}", factory.tag());
        self.factories.insert(factory.tag().to_string(), factory);
        self
    }

    pub fn with(mut self, factory: Factory) -> Self {
        self.register(factory);
        self
    }

    pub fn get(&self, tag: &str) -> Result<&Factory, DataError> {
        self.factories
            .get(tag)
            .ok_or_else(|| DataError::UnknownType(tag.to_string()))
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}
