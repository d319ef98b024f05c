use crate::data::{EntitySchema, ID_FIELD};
use crate::domain::entities::{Permissions, Route};
use crate::domain::errors::DomainError;
use crate::responders::{CollectionSettings, Settings};
use serde::Deserialize;
use std::path::PathBuf;

/// Address the server binds to when neither the manifest nor the
/// environment names one.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:3000";

/// Represents the eix.xml application manifest
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename = "manifest")]
pub struct Manifest {
    #[serde(default)]
    pub application: ApplicationConfig,

    #[serde(rename = "route", default)]
    pub routes: Vec<RouteConfig>,

    #[serde(rename = "collection", default)]
    pub collections: Vec<CollectionConfig>,

    #[serde(rename = "principal", default)]
    pub principals: Vec<PrincipalConfig>,
}

/// Application-wide settings
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ApplicationConfig {
    #[serde(default)]
    pub id: Option<String>,

    /// Name shown first in every page title
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub bind_address: Option<String>,

    /// Directory holding `section/page.html` templates
    #[serde(default)]
    pub templates: Option<String>,

    #[serde(default)]
    pub default_section: Option<String>,

    #[serde(default)]
    pub default_page: Option<String>,

    #[serde(default)]
    pub identity_prefix: Option<String>,
}

/// A routing rule
#[derive(Debug, Deserialize, Clone)]
pub struct RouteConfig {
    /// Regular expression matched against the whole path
    pub uri: String,

    /// Responder id serving the route
    pub responder: String,

    #[serde(rename = "capture", default)]
    pub captures: Vec<CaptureConfig>,

    #[serde(rename = "default", default)]
    pub defaults: Vec<DefaultConfig>,
}

/// Binds a numbered regex group to a parameter
#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    pub name: String,
    pub group: usize,
}

/// Literal parameter added by a route
#[derive(Debug, Deserialize, Clone)]
pub struct DefaultConfig {
    pub name: String,
    pub value: String,
}

/// An entity collection and how it is exposed
#[derive(Debug, Deserialize, Clone)]
pub struct CollectionConfig {
    /// Collection name, also the responder id and entity type tag
    pub name: String,

    /// Name of one item (defaults to the collection name)
    #[serde(default)]
    pub item: Option<String>,

    #[serde(default)]
    pub managed: bool,

    /// "memory" (default) or the base URL of a REST backend
    #[serde(default)]
    pub source: Option<String>,

    #[serde(rename = "field", default)]
    pub fields: Vec<FieldConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FieldConfig {
    pub name: String,

    #[serde(rename = "validator", default)]
    pub validators: Vec<String>,
}

/// Someone who may sign in with a key
#[derive(Debug, Deserialize, Clone)]
pub struct PrincipalConfig {
    pub id: String,
    pub key: String,

    /// Grants written as `*`, `responder:*` or `responder:operation`
    #[serde(rename = "permission", default)]
    pub permissions: Vec<String>,
}

/// Where a collection keeps its records
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Memory,
    Http(String),
}

impl Manifest {
    /// Load manifest from XML file
    pub fn from_file(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let contents = std::fs::read_to_string(&path)?;
        Self::parse(&contents)
    }

    pub fn parse(xml: &str) -> anyhow::Result<Self> {
        let manifest: Manifest = serde_xml_rs::from_str(xml)?;
        Ok(manifest)
    }

    pub fn settings(&self) -> Settings {
        let defaults = Settings::default();
        let app = &self.application;
        Settings {
            application_id: app.id.clone().unwrap_or(defaults.application_id),
            application_name: app.name.clone().unwrap_or(defaults.application_name),
            identity_prefix: app.identity_prefix.clone().unwrap_or(defaults.identity_prefix),
            default_section: app.default_section.clone().unwrap_or(defaults.default_section),
            default_page: app.default_page.clone().unwrap_or(defaults.default_page),
        }
    }

    /// The bind address: `BIND_ADDRESS` wins over the manifest.
    pub fn bind_address(&self) -> String {
        std::env::var("BIND_ADDRESS")
            .ok()
            .or_else(|| self.application.bind_address.clone())
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string())
    }

    pub fn routes(&self) -> Result<Vec<Route>, DomainError> {
        self.routes.iter().map(RouteConfig::to_route).collect()
    }
}

impl RouteConfig {
    pub fn to_route(&self) -> Result<Route, DomainError> {
        let route = self
            .captures
            .iter()
            .fold(Route::new(self.uri.as_str())?, |route, capture| {
                route.capture(capture.name.as_str(), capture.group)
            });
        let route = self
            .defaults
            .iter()
            .fold(route, |route, default| route.default_param(default.name.as_str(), default.value.as_str()));
        Ok(route.responder(self.responder.as_str()))
    }
}

impl CollectionConfig {
    pub fn settings(&self) -> CollectionSettings {
        let item = self.item.clone().unwrap_or_else(|| self.name.clone());
        CollectionSettings::new(self.name.as_str(), item, self.managed)
    }

    pub fn schema(&self) -> Result<EntitySchema, DomainError> {
        self.fields
            .iter()
            .filter(|field| field.name != ID_FIELD)
            .try_fold(EntitySchema::new(self.name.as_str()), |schema, field| {
                schema.field_with_validators(field.name.as_str(), &field.validators)
            })
    }

    pub fn source_kind(&self) -> Result<SourceKind, DomainError> {
        match self.source.as_deref().map(str::trim) {
            None | Some("") | Some("memory") => Ok(SourceKind::Memory),
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
                Ok(SourceKind::Http(url.to_string()))
            }
            Some(other) => Err(DomainError::InvalidSchema(format!(
                "Invalid source for collection {}: {}. Must be 'memory' or an http(s) URL",
                self.name, other
            ))),
        }
    }
}

impl PrincipalConfig {
    pub fn permissions(&self) -> Result<Permissions, DomainError> {
        self.permissions
            .iter()
            .try_fold(Permissions::none(), |permissions, grant| permissions.parse_grant(grant))
    }
}
