//! Config adapter - implements RouteRepository using the XML manifest
//! This is an infrastructure adapter

use crate::config::Manifest;
use crate::domain::entities::Route;
use crate::domain::repositories::{RepositoryError, RouteRepository};
use async_trait::async_trait;
use std::path::PathBuf;

/// XML-based route repository
pub struct XmlManifestRepository {
    manifest_path: PathBuf,
}

impl XmlManifestRepository {
    pub fn new(manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
        }
    }

    /// Read and parse the whole manifest
    pub async fn load_manifest(&self) -> Result<Manifest, RepositoryError> {
        let contents = tokio::fs::read_to_string(&self.manifest_path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => RepositoryError::NotFound(self.manifest_path.display().to_string()),
                _ => RepositoryError::IoError(e.to_string()),
            })?;

        Manifest::parse(&contents).map_err(|e| RepositoryError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl RouteRepository for XmlManifestRepository {
    async fn load_all(&self) -> Result<Vec<Route>, RepositoryError> {
        self.load_manifest()
            .await?
            .routes()
            .map_err(|e| RepositoryError::ParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_load_valid_manifest() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest>
    <route>
        <uri>/notes/(\w+)</uri>
        <responder>notes</responder>
        <capture>
            <name>id</name>
            <group>1</group>
        </capture>
    </route>
    <route>
        <uri>/</uri>
        <responder>page</responder>
    </route>
</manifest>"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(xml.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let repo = XmlManifestRepository::new(temp_file.path());
        let routes = repo.load_all().await.unwrap();

        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].as_str(), r"/notes/(\w+)");
        assert!(routes[1].match_path("/").is_some());
    }

    #[tokio::test]
    async fn test_load_invalid_xml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"invalid xml").unwrap();
        temp_file.flush().unwrap();

        let repo = XmlManifestRepository::new(temp_file.path());
        assert!(matches!(repo.load_all().await, Err(RepositoryError::ParseError(_))));
    }

    #[tokio::test]
    async fn test_invalid_route_pattern() {
        let xml = r#"<manifest><route><uri>notes</uri><responder>notes</responder></route></manifest>"#;
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(xml.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let repo = XmlManifestRepository::new(temp_file.path());
        assert!(matches!(repo.load_all().await, Err(RepositoryError::ParseError(_))));
    }

    #[tokio::test]
    async fn test_missing_manifest() {
        let repo = XmlManifestRepository::new("/nonexistent/eix.xml");
        assert!(matches!(repo.load_all().await, Err(RepositoryError::NotFound(_))));
    }
}
