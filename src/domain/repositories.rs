/// Repository interfaces (Ports) - define contracts without implementation
/// These follow the Dependency Inversion Principle

use crate::domain::entities::{Principal, Request, Route};
use crate::domain::errors::{DataError, HttpError};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Raw field data, as exchanged with data sources.
pub type Record = Map<String, Value>;

/// Repository for the routing table
#[async_trait]
pub trait RouteRepository: Send + Sync {
    /// Load all routes, in matching order
    async fn load_all(&self) -> Result<Vec<Route>, RepositoryError>;
}

/// CRUD backend that entities are persisted to
pub trait DataSource: Send + Sync {
    /// Store a new record and return its ID
    fn create(&self, data: &Record) -> Result<String, DataError>;

    /// Fetch one record, failing with [`DataError::NotFound`] if absent
    fn retrieve(&self, id: &str) -> Result<Record, DataError>;

    /// Fetch every record whose fields equal the ones in the filter
    fn retrieve_all(&self, filter: Option<&Record>) -> Result<Vec<Record>, DataError>;

    /// Replace the data of an existing record
    fn update(&self, id: &str, data: &Record) -> Result<(), DataError>;

    /// Delete a record
    fn destroy(&self, id: &str) -> Result<(), DataError>;

    /// Number of records matching the filter
    fn count(&self, filter: Option<&Record>) -> Result<usize, DataError> {
        Ok(self.retrieve_all(filter)?.len())
    }
}

/// Service that knows who is behind a request
pub trait PrincipalProvider: Send + Sync {
    /// The principal associated with the request, if any
    fn current(&self, request: Option<&Request>) -> Option<Principal>;

    /// Exchange a key for a session token
    fn sign_in(&self, _key: &str) -> Option<String> {
        None
    }
}

/// Service that decides whether a principal may run an operation
pub trait Authorizer: Send + Sync {
    fn check_authorization(
        &self,
        principal: &Principal,
        responder_type: &str,
        operation: &str,
    ) -> Result<(), HttpError>;
}

/// Template backend used by HTML responses
pub trait Renderer: Send + Sync {
    fn render(&self, template_id: &str, data: &Value) -> Result<String, HttpError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    IoError(String),
}
