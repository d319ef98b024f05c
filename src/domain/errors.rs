//! Error taxonomy shared by the dispatch and data layers

use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Per-field validation failures.
///
/// Each entry maps a field name to the fail messages of every validator the
/// value did not pass, so a caller can redisplay a form with inline messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, thiserror::Error)]
#[error("Validation failed for: {}", self.field_names().join(", "))]
pub struct ValidationError {
    status: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, messages: Vec<String>) {
        if !messages.is_empty() {
            self.status.entry(field.into()).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_empty()
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.status.keys().map(String::as_str).collect()
    }

    pub fn messages(&self, field: &str) -> Option<&[String]> {
        self.status.get(field).map(Vec::as_slice)
    }

    pub fn status(&self) -> &BTreeMap<String, Vec<String>> {
        &self.status
    }

    pub fn to_value(&self) -> Value {
        json!(self.status)
    }
}

/// Errors raised while producing a response to a request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HttpError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Not acceptable: {0}")]
    NotAcceptable(String),
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),
    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),
    #[error("Not authorized: {0}")]
    NotAuthorized(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HttpError {
    /// HTTP status code that represents this error.
    pub fn status_code(&self) -> u16 {
        match self {
            HttpError::NotFound(_) => 404,
            HttpError::NotAcceptable(_) => 406,
            HttpError::MethodNotAllowed(_) => 405,
            HttpError::NotAuthenticated(_) => 401,
            HttpError::NotAuthorized(_) => 403,
            HttpError::BadRequest(_) | HttpError::Validation(_) => 400,
            HttpError::Internal(_) => 500,
        }
    }
}

/// Errors raised by entities, factories and data sources.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DataError {
    #[error("Entity {0} could not be retrieved")]
    NotFound(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Entity {0} has been destroyed")]
    Destroyed(String),
    #[error("Immutable data source: {0}")]
    Immutable(String),
    #[error("Unknown entity type: {0}")]
    UnknownType(String),
    #[error("Entity cannot be persisted: {0}")]
    NotPersistable(String),
    #[error("Data source error: {0}")]
    Source(String),
}

impl From<DataError> for HttpError {
    fn from(error: DataError) -> Self {
        match error {
            DataError::NotFound(_) | DataError::UnknownType(_) => HttpError::NotFound(error.to_string()),
            DataError::Validation(validation) => HttpError::Validation(validation),
            other => HttpError::Internal(other.to_string()),
        }
    }
}

/// Errors raised while building domain values from configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("Invalid route: {0}")]
    InvalidRoute(String),
    #[error("Invalid permission: {0}")]
    InvalidPermission(String),
    #[error("Invalid handler table: {0}")]
    InvalidHandlerTable(String),
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
}
