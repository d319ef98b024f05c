//! Services and settings shared by every responder

use crate::data::FactoryRegistry;
use crate::domain::entities::Request;
use crate::domain::repositories::{Authorizer, PrincipalProvider, Renderer};
use crate::responses::{pop_status_messages, Response};
use std::sync::Arc;

/// Path prefix of the identification flow.
pub const DEFAULT_IDENTITY_PREFIX: &str = "/identity";

/// Application-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub application_id: String,
    pub application_name: String,
    pub identity_prefix: String,
    pub default_section: String,
    pub default_page: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            application_id: "eix".to_string(),
            application_name: "Eix".to_string(),
            identity_prefix: DEFAULT_IDENTITY_PREFIX.to_string(),
            default_section: "pages".to_string(),
            default_page: "index".to_string(),
        }
    }
}

/// Everything a handler may need besides its own request.
pub struct AppContext {
    pub settings: Settings,
    pub factories: FactoryRegistry,
    pub principals: Arc<dyn PrincipalProvider>,
    pub authorizer: Arc<dyn Authorizer>,
    pub renderer: Arc<dyn Renderer>,
}

impl AppContext {
    pub fn new(
        settings: Settings,
        factories: FactoryRegistry,
        principals: Arc<dyn PrincipalProvider>,
        authorizer: Arc<dyn Authorizer>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            settings,
            factories,
            principals,
            authorizer,
            renderer,
        }
    }

    /// An HTML response titled after the application, showing any status
    /// messages carried over from a redirect.
    pub fn html_response(&self, request: Option<&Request>) -> Response {
        let mut response = Response::html(
            self.renderer.clone(),
            self.settings.application_name.clone(),
            request.map(Request::current_url),
        );
        pop_status_messages(request, &mut response);
        response
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        use crate::adapters::principals::{PermissionAuthorizer, SessionPrincipals};
        use crate::adapters::render::TemplateRenderer;

        Self::new(
            Settings::default(),
            FactoryRegistry::new(),
            Arc::new(SessionPrincipals::new()),
            Arc::new(PermissionAuthorizer),
            Arc::new(TemplateRenderer::builtin()),
        )
    }
}
