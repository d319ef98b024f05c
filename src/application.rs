//! Wiring: builds the services and the dispatcher an application manifest
//! describes

use crate::adapters::{HttpServerState, PermissionAuthorizer, SessionPrincipals, TemplateRenderer, XmlManifestRepository};
use crate::config::{CollectionConfig, Manifest, SourceKind};
use crate::data::{Factory, FactoryRegistry, MemorySource};
use crate::domain::entities::Route;
use crate::domain::repositories::{DataSource, Renderer};
use crate::infrastructure::HttpSource;
use crate::responders::{AppContext, ResponderRegistry};
use crate::use_cases::{DispatchRequestUseCase, InitializeRoutesUseCase};
use anyhow::Context;
use axum::Router;
use std::path::Path;
use std::sync::Arc;

/// A ready-to-serve application.
pub struct Application {
    dispatcher: Arc<DispatchRequestUseCase>,
    bind_address: String,
}

impl Application {
    /// Load the manifest and routing table from an XML file.
    pub async fn load(manifest_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let repository = Arc::new(XmlManifestRepository::new(manifest_path.as_ref()));
        let manifest = repository.load_manifest().await?;
        let routes = InitializeRoutesUseCase::new(repository).execute().await?;
        tracing::info!("Loaded {} route(s)", routes.len());

        Self::build(&manifest, routes)
    }

    pub fn build(manifest: &Manifest, routes: Vec<Route>) -> anyhow::Result<Self> {
        let settings = manifest.settings();

        let mut factories = FactoryRegistry::new();
        let mut responders = ResponderRegistry::with_builtins()?;
        for collection in &manifest.collections {
            if responders.contains(&collection.name) {
                anyhow::bail!("Collection name '{}' is taken by a built-in responder", collection.name);
            }
            let schema = collection
                .schema()
                .with_context(|| format!("Invalid collection '{}'", collection.name))?;
            factories.register(Factory::new(schema, data_source(collection)?));
            responders.register_collection(collection.settings())?;
            tracing::info!(
                "Registered collection '{}'{}",
                collection.name,
                if collection.managed { " (managed)" } else { "" }
            );
        }

        let principals = manifest
            .principals
            .iter()
            .try_fold(SessionPrincipals::new(), |principals, principal| {
                let permissions = principal
                    .permissions()
                    .with_context(|| format!("Invalid permissions for principal '{}'", principal.id))?;
                Ok::<_, anyhow::Error>(principals.with_principal(principal.id.as_str(), principal.key.as_str(), permissions))
            })?;
        tracing::info!("Loaded {} principal(s)", principals.len());

        let renderer: Arc<dyn Renderer> = match &manifest.application.templates {
            Some(dir) => {
                tracing::info!("Templates are read from {}", dir);
                Arc::new(TemplateRenderer::new(dir))
            }
            None => Arc::new(TemplateRenderer::builtin()),
        };

        let context = AppContext::new(
            settings,
            factories,
            Arc::new(principals),
            Arc::new(PermissionAuthorizer),
            renderer,
        );

        Ok(Self {
            dispatcher: Arc::new(DispatchRequestUseCase::new(routes, responders, context)),
            bind_address: manifest.bind_address(),
        })
    }

    pub fn dispatcher(&self) -> Arc<DispatchRequestUseCase> {
        self.dispatcher.clone()
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    pub fn router(&self) -> Router {
        HttpServerState::new(self.dispatcher.clone()).create_router()
    }
}

fn data_source(collection: &CollectionConfig) -> anyhow::Result<Arc<dyn DataSource>> {
    Ok(match collection.source_kind()? {
        SourceKind::Memory => Arc::new(MemorySource::new()),
        SourceKind::Http(url) => Arc::new(HttpSource::new(url)),
    })
}
