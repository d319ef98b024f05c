//! Responder factory: builds responders by the id routes refer to

use crate::domain::entities::Request;
use crate::domain::errors::{DomainError, HttpError};
use crate::responders::collection::{CollectionResponder, CollectionSettings};
use crate::responders::error::ErrorResponder;
use crate::responders::identity::IdentityResponder;
use crate::responders::page::PageResponder;
use crate::responders::{BoundResponder, DynResponder, HandlerTable, Responder};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Responder serving error requests.
pub const ERROR_RESPONDER: &str = "error";
/// Responder serving the identification flow.
pub const IDENTITY_RESPONDER: &str = "identity";
/// Responder serving static pages.
pub const PAGE_RESPONDER: &str = "page";

type Constructor = Box<dyn Fn(Option<Request>) -> Box<dyn DynResponder> + Send + Sync>;

/// Known responder types, keyed by id.
#[derive(Default)]
pub struct ResponderRegistry {
    constructors: BTreeMap<String, Constructor>,
}

impl ResponderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in error, identity and page responders.
    pub fn with_builtins() -> Result<Self, DomainError> {
        let mut registry = Self::new();
        registry
            .register(ERROR_RESPONDER, ErrorResponder::handlers(), ErrorResponder::new)?
            .register(IDENTITY_RESPONDER, IdentityResponder::handlers(), IdentityResponder::new)?
            .register(PAGE_RESPONDER, PageResponder::handlers(), PageResponder::new)?;
        Ok(registry)
    }

    /// Register a responder type. The handler table is checked here, so a
    /// table without a default handler never reaches a request.
    pub fn register<R, F>(&mut self, id: impl Into<String>, table: HandlerTable<R>, build: F) -> Result<&mut Self, DomainError>
    where
        R: Responder,
        F: Fn(Option<Request>) -> R + Send + Sync + 'static,
    {
        let id = id.into();
        if let Err(e) = table.validate() {
            tracing::error!("Cannot register responder {}: {}", id, e);
            return Err(e);
        }

        tracing::debug!(
            "Registered responder {} with handlers: {}",
            id,
            table.keys().map(|key| key.tag()).collect::<Vec<_>>().join(", ")
        );

        let table = Arc::new(table);
        let constructor: Constructor = Box::new(move |request| -> Box<dyn DynResponder> {
            Box::new(BoundResponder::new(build(request), table.clone()))
        });
        self.constructors.insert(id, constructor);
        Ok(self)
    }

    /// Register the responder of a collection under the collection name.
    pub fn register_collection(&mut self, settings: CollectionSettings) -> Result<&mut Self, DomainError> {
        let settings = Arc::new(settings);
        let table = CollectionResponder::handlers(settings.managed);
        let id = settings.name.clone();
        self.register(id, table, move |request| CollectionResponder::new(request, settings.clone()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.constructors.contains_key(id)
    }

    /// Build a responder for a request.
    pub fn create(&self, id: &str, request: Option<Request>) -> Result<Box<dyn DynResponder>, HttpError> {
        let constructor = self
            .constructors
            .get(id)
            .ok_or_else(|| HttpError::NotFound(format!("Responder '{}' is not registered", id)))?;
        tracing::debug!("Using responder {}", id);
        Ok(constructor(request))
    }
}
