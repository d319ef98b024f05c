//! Browsing and management of entity collections

use crate::data::{Entity, Factory, ID_FIELD};
use crate::domain::entities::{HttpMethod, Request};
use crate::domain::errors::{DataError, HttpError};
use crate::domain::negotiation::ContentToken;
use crate::domain::repositories::Record;
use crate::domain::utils::capitalize;
use crate::responders::{AppContext, HandlerTable, Responder};
use crate::responses::{Response, STATUS_KEY};
use serde_json::{json, Value};
use std::sync::Arc;

/// Pseudo-id that asks for the edition page of a new item.
const NEW_ITEM_ID: &str = "new";
const SELECTION_PREFIX: &str = "select_";

/// How a collection is exposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSettings {
    /// Collection name, also the tag of its entity type.
    pub name: String,
    /// Name of one item, used as data key and in messages.
    pub item_name: String,
    /// Whether items can be changed. Managed collections are restricted.
    pub managed: bool,
}

impl CollectionSettings {
    pub fn new(name: impl Into<String>, item_name: impl Into<String>, managed: bool) -> Self {
        Self {
            name: name.into(),
            item_name: item_name.into(),
            managed,
        }
    }
}

/// Lists and shows the items of a collection, and for managed collections
/// stores and deletes them.
pub struct CollectionResponder {
    request: Option<Request>,
    settings: Arc<CollectionSettings>,
}

impl CollectionResponder {
    pub fn new(request: Option<Request>, settings: Arc<CollectionSettings>) -> Self {
        Self { request, settings }
    }

    pub fn handlers(managed: bool) -> HandlerTable<Self> {
        let table = HandlerTable::new()
            .on(HttpMethod::Get, ContentToken::All, Self::html_get)
            .on(HttpMethod::Get, ContentToken::Html, Self::html_get)
            .on(HttpMethod::Get, ContentToken::Json, Self::json_get);
        if !managed {
            return table;
        }

        table
            .on(HttpMethod::Post, ContentToken::All, Self::html_post)
            .on(HttpMethod::Post, ContentToken::Html, Self::html_post)
            .on_action(HttpMethod::Get, "delete", ContentToken::All, Self::delete_confirmation)
            .on_action(HttpMethod::Get, "delete", ContentToken::Html, Self::delete_confirmation)
            .on_action(HttpMethod::Post, "delete", ContentToken::All, Self::delete)
            .on_action(HttpMethod::Post, "delete", ContentToken::Html, Self::delete)
    }

    fn factory<'a>(&self, ctx: &'a AppContext) -> Result<&'a Factory, HttpError> {
        Ok(ctx.factories.get(&self.settings.name)?)
    }

    fn parameter(&self, name: &str) -> Option<String> {
        self.request.as_ref().and_then(|request| request.parameter_str(name))
    }

    fn fields_list(entities: &[Entity]) -> Value {
        Value::Array(entities.iter().map(|entity| Value::Object(entity.fields_data())).collect())
    }

    fn html_get(&mut self, ctx: &AppContext) -> Result<Response, HttpError> {
        let collection = &self.settings.name;
        let mut response = ctx.html_response(self.request.as_ref());

        match self.parameter(ID_FIELD) {
            Some(id) if id == NEW_ITEM_ID && self.settings.managed => {
                response.set_template_id(format!("{}/edit", collection));
                response.append_title(format!("New {}", self.settings.item_name));
            }
            Some(id) => {
                let entity = self.factory(ctx)?.find_entity(&id)?;
                response.set_template_id(format!("{}/edit", collection));
                response.set_data(self.settings.item_name.clone(), entity.fields_data());
                response.append_title(format!("{} {}", capitalize(&self.settings.item_name), id));
            }
            None => {
                let entities = self.factory(ctx)?.get_all(None)?;
                response.set_template_id(format!("{}/index", collection));
                response.set_data(collection.clone(), Self::fields_list(&entities));
                response.append_title(capitalize(collection));
            }
        }

        response.set_data("view", self.parameter("view").map_or(Value::Null, Value::String));
        Ok(response)
    }

    fn json_get(&mut self, ctx: &AppContext) -> Result<Response, HttpError> {
        let factory = self.factory(ctx)?;
        let mut response = Response::json();

        match self.parameter(ID_FIELD) {
            Some(id) => {
                let entity = factory.find_entity(&id)?;
                response.set_data(self.settings.item_name.clone(), entity.fields_data());
            }
            None => {
                let entities = factory.get_all(None)?;
                response.set_data(self.settings.name.clone(), Self::fields_list(&entities));
            }
        }
        Ok(response)
    }

    fn html_post(&mut self, ctx: &AppContext) -> Result<Response, HttpError> {
        let operation = self.parameter("operation").unwrap_or_default();
        match operation.as_str() {
            "remove_selected" => self.delete(ctx),
            "store" | "save" => self.store(ctx),
            other => Err(HttpError::BadRequest(format!("Operation '{}' not recognised.", other))),
        }
    }

    /// Declared fields present in the request.
    fn entity_data_from_request(&self, factory: &Factory) -> Record {
        let Some(request) = self.request.as_ref() else {
            return Record::new();
        };
        factory
            .schema()
            .fields()
            .iter()
            .filter(|field| field.as_str() != ID_FIELD)
            .filter_map(|field| request.parameter(field).map(|value| (field.clone(), value.clone())))
            .collect()
    }

    fn store(&mut self, ctx: &AppContext) -> Result<Response, HttpError> {
        let factory = self.factory(ctx)?;
        let data = self.entity_data_from_request(factory);
        let id = self.parameter(ID_FIELD).filter(|id| id != NEW_ITEM_ID);

        let mut response = ctx.html_response(self.request.as_ref());
        response.set_template_id(format!("{}/edit", self.settings.name));

        let stored = match &id {
            Some(id) => factory
                .find_entity(id)
                .and_then(|entity| entity.update(data.clone(), true).map(|_| entity)),
            None => factory.new_entity(data.clone()),
        }
        .and_then(|entity| entity.store().map(|_| entity));

        match stored {
            Ok(entity) => {
                tracing::info!("Stored {}:{}", self.settings.name, entity.id().unwrap_or_default());
                response.add_notice(format!("{} correctly stored.", capitalize(&self.settings.item_name)));
                response.set_data(self.settings.item_name.clone(), entity.fields_data());
            }
            Err(error) => {
                tracing::warn!("Could not store {}: {}", self.settings.item_name, error);
                match &error {
                    DataError::Validation(validation) => {
                        response.add_data(STATUS_KEY, json!({"error": [{"validation": validation.to_value()}]}));
                        response.set_data("validation", validation.to_value());
                    }
                    other => response.add_error_message(other.to_string()),
                }
                let mut submitted = data;
                submitted.insert(ID_FIELD.to_string(), id.map_or(Value::Null, Value::String));
                response.set_data(self.settings.item_name.clone(), submitted);
            }
        }
        Ok(response)
    }

    fn delete_confirmation(&mut self, ctx: &AppContext) -> Result<Response, HttpError> {
        let ids = self
            .request
            .as_ref()
            .map(|request| request.parameter_list(ID_FIELD))
            .unwrap_or_default();
        Ok(self.confirmation_response(ctx, ids))
    }

    fn delete(&mut self, ctx: &AppContext) -> Result<Response, HttpError> {
        let confirmed = self.parameter("confirm").as_deref() == Some("1");
        if !confirmed {
            let selected = self.selected_ids();
            return Ok(self.confirmation_response(ctx, selected));
        }

        let ids = self
            .request
            .as_ref()
            .map(|request| request.parameter_list("ids"))
            .unwrap_or_default();
        let factory = self.factory(ctx)?;
        Ok(self.batch_response(ids, |id| factory.find_entity(id)?.destroy()))
    }

    /// Ids of the items ticked in a list, sent as `select_<id>` parameters.
    fn selected_ids(&self) -> Vec<String> {
        self.request
            .as_ref()
            .map(|request| {
                request
                    .parameters()
                    .keys()
                    .filter_map(|name| name.strip_prefix(SELECTION_PREFIX))
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn confirmation_response(&self, ctx: &AppContext, ids: Vec<String>) -> Response {
        if ids.is_empty() {
            return self.index_redirection();
        }

        let mut response = ctx.html_response(self.request.as_ref());
        response.set_template_id(format!("{}/delete", self.settings.name));
        response.set_data(self.settings.name.clone(), ids);
        response
    }

    /// Run an action over several items and report on the index page.
    fn batch_response(&self, ids: Vec<String>, action: impl Fn(&str) -> Result<(), DataError>) -> Response {
        let mut response = self.index_redirection();

        let mut affected = 0;
        for id in &ids {
            match action(id) {
                Ok(()) => affected += 1,
                Err(DataError::NotFound(_)) => response.add_error_message(format!(
                    "{} {} was not found.",
                    capitalize(&self.settings.item_name),
                    id
                )),
                Err(error) => response.add_error_message(error.to_string()),
            }
        }

        tracing::info!("{} of {} {} affected", affected, ids.len(), self.settings.name);
        response.add_notice(format!("{} {} were affected.", affected, self.settings.name));
        response
    }

    /// Redirect to the collection index, keeping the current view.
    fn index_redirection(&self) -> Response {
        let mut url = format!("/{}/", self.settings.name);
        if let Some(view) = self.parameter("view") {
            let view: String = url::form_urlencoded::byte_serialize(view.as_bytes()).collect();
            url.push_str(&format!("?view={}", view));
        }
        Response::redirect(url)
    }
}

impl Responder for CollectionResponder {
    fn type_tag(&self) -> &str {
        &self.settings.name
    }

    fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }

    fn is_restricted(&self) -> bool {
        self.settings.managed
    }
}
