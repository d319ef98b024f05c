/// Adapters layer - interface adapters that convert between external formats and domain
pub mod config;
pub mod http;
pub mod principals;
pub mod render;

pub use config::XmlManifestRepository;
pub use http::HttpServerState;
pub use principals::{PermissionAuthorizer, SessionPrincipals};
pub use render::TemplateRenderer;
