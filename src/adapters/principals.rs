//! Principal adapters: key-based sessions and permission checks

use crate::domain::entities::{Permissions, Principal, Request};
use crate::domain::errors::HttpError;
use crate::domain::repositories::{Authorizer, PrincipalProvider};
use crate::responders::identity::SESSION_COOKIE;
use moka::sync::Cache;
use std::collections::HashMap;
use std::time::Duration;

/// Sessions unused for this long are closed.
pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(30 * 60);

fn session_cache(idle: Duration) -> Cache<String, Principal> {
    Cache::builder().time_to_idle(idle).build()
}

/// Principals that sign in with a shared key and are then recognised by a
/// session cookie.
pub struct SessionPrincipals {
    by_key: HashMap<String, Principal>,
    sessions: Cache<String, Principal>,
}

impl Default for SessionPrincipals {
    fn default() -> Self {
        Self {
            by_key: HashMap::new(),
            sessions: session_cache(DEFAULT_SESSION_IDLE),
        }
    }
}

impl SessionPrincipals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close sessions after `idle` without a request. Drops open sessions.
    pub fn with_session_idle(mut self, idle: Duration) -> Self {
        self.sessions = session_cache(idle);
        self
    }

    pub fn with_principal(mut self, id: impl Into<String>, key: impl Into<String>, permissions: Permissions) -> Self {
        self.by_key
            .insert(key.into(), Principal::authenticated(id, permissions));
        self
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

impl PrincipalProvider for SessionPrincipals {
    fn current(&self, request: Option<&Request>) -> Option<Principal> {
        let token = request?.cookie(SESSION_COOKIE)?;
        self.sessions.get(token)
    }

    fn sign_in(&self, key: &str) -> Option<String> {
        let principal = match self.by_key.get(key) {
            Some(principal) => principal.clone(),
            None => {
                tracing::warn!("Rejected sign-in with an unknown key");
                return None;
            }
        };

        let token = uuid::Uuid::new_v4().simple().to_string();
        tracing::debug!("Opened session for principal {}", principal.id);
        self.sessions.insert(token.clone(), principal);
        Some(token)
    }
}

/// Grants operations according to the principal's own permissions.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissionAuthorizer;

impl Authorizer for PermissionAuthorizer {
    fn check_authorization(&self, principal: &Principal, responder_type: &str, operation: &str) -> Result<(), HttpError> {
        if principal.permissions.allows(responder_type, operation) {
            Ok(())
        } else {
            tracing::warn!("Principal {} may not run {} on {}", principal.id, operation, responder_type);
            Err(HttpError::NotAuthorized(format!(
                "Operation {} on {} is not allowed",
                operation, responder_type
            )))
        }
    }
}
