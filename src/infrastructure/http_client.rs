/// HTTP data source
/// Implements DataSource against a JSON REST endpoint

use crate::data::ID_FIELD;
use crate::domain::errors::DataError;
use crate::domain::repositories::{DataSource, Record};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

/// Records behind a REST collection URL.
///
/// `POST {base}` creates, `GET {base}` lists (filter fields as query
/// parameters), and `GET`/`PUT`/`DELETE {base}/{id}` work on one record.
/// Calls block, so use it from dispatch threads only.
#[derive(Debug, Clone)]
pub struct HttpSource {
    base_url: String,
    timeout: Duration,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn client(&self) -> Result<Client, DataError> {
        Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| DataError::Source(e.to_string()))
    }

    fn record_url(&self, id: &str) -> String {
        format!("{}/{}", self.base_url, url::form_urlencoded::byte_serialize(id.as_bytes()).collect::<String>())
    }

    fn send(&self, request: RequestBuilder, id: Option<&str>) -> Result<Response, DataError> {
        let response = request.send().map_err(|e| DataError::Source(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(DataError::NotFound(id.unwrap_or(&self.base_url).to_string())),
            status if !status.is_success() => Err(DataError::Source(format!(
                "HTTP request failed with status: {}",
                status
            ))),
            _ => Ok(response),
        }
    }

    fn read_json(response: Response) -> Result<Value, DataError> {
        response.json::<Value>().map_err(|e| DataError::Source(e.to_string()))
    }

    fn into_record(value: Value) -> Result<Record, DataError> {
        match value {
            Value::Object(record) => Ok(record),
            other => Err(DataError::Source(format!("expected a JSON object, got {}", other))),
        }
    }
}

impl DataSource for HttpSource {
    fn create(&self, data: &Record) -> Result<String, DataError> {
        tracing::debug!("Creating record at: {}", self.base_url);
        let response = self.send(self.client()?.post(&self.base_url).json(data), None)?;

        let created = Self::read_json(response)?;
        match created.get(ID_FIELD) {
            Some(Value::String(id)) => Ok(id.clone()),
            Some(Value::Number(id)) => Ok(id.to_string()),
            _ => Err(DataError::Source("the created record has no ID".to_string())),
        }
    }

    fn retrieve(&self, id: &str) -> Result<Record, DataError> {
        let url = self.record_url(id);
        tracing::debug!("Retrieving record from: {}", url);
        let response = self.send(self.client()?.get(&url), Some(id))?;
        Self::into_record(Self::read_json(response)?)
    }

    fn retrieve_all(&self, filter: Option<&Record>) -> Result<Vec<Record>, DataError> {
        let query: Vec<(String, String)> = filter
            .map(|filter| {
                filter
                    .iter()
                    .map(|(field, value)| {
                        let value = match value {
                            Value::String(text) => text.clone(),
                            other => other.to_string(),
                        };
                        (field.clone(), value)
                    })
                    .collect()
            })
            .unwrap_or_default();

        tracing::debug!("Retrieving records from: {}", self.base_url);
        let response = self.send(self.client()?.get(&self.base_url).query(&query), None)?;

        match Self::read_json(response)? {
            Value::Array(items) => items.into_iter().map(Self::into_record).collect(),
            other => Err(DataError::Source(format!("expected a JSON array, got {}", other))),
        }
    }

    fn update(&self, id: &str, data: &Record) -> Result<(), DataError> {
        let url = self.record_url(id);
        tracing::debug!("Updating record at: {}", url);
        self.send(self.client()?.put(&url).json(data), Some(id))?;
        Ok(())
    }

    fn destroy(&self, id: &str) -> Result<(), DataError> {
        let url = self.record_url(id);
        tracing::debug!("Destroying record at: {}", url);
        self.send(self.client()?.delete(&url), Some(id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[test]
    fn test_retrieve() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/notes/7")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": "7", "title": "Remote"}"#)
            .create();

        let source = HttpSource::new(format!("{}/notes/", server.url()));
        let record = source.retrieve("7").unwrap();

        assert_eq!(record["title"], json!("Remote"));
        mock.assert();
    }

    #[test]
    fn test_missing_record() {
        let mut server = mockito::Server::new();
        let _get = server.mock("GET", "/notes/404").with_status(404).create();
        let _delete = server.mock("DELETE", "/notes/404").with_status(404).create();

        let source = HttpSource::new(format!("{}/notes", server.url()));
        assert!(matches!(source.retrieve("404"), Err(DataError::NotFound(_))));
        assert!(matches!(source.destroy("404"), Err(DataError::NotFound(_))));
    }

    #[test]
    fn test_create_returns_id() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/notes")
            .match_body(Matcher::Json(json!({"title": "New"})))
            .with_status(201)
            .with_body(r#"{"id": 12, "title": "New"}"#)
            .create();

        let source = HttpSource::new(format!("{}/notes", server.url()));
        let data = json!({"title": "New"}).as_object().cloned().unwrap();

        assert_eq!(source.create(&data).unwrap(), "12");
        mock.assert();
    }

    #[test]
    fn test_retrieve_all_with_filter() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/notes")
            .match_query(Matcher::UrlEncoded("kind".into(), "todo".into()))
            .with_status(200)
            .with_body(r#"[{"id": "1", "kind": "todo"}, {"id": "2", "kind": "todo"}]"#)
            .create();

        let source = HttpSource::new(format!("{}/notes", server.url()));
        let filter = json!({"kind": "todo"}).as_object().cloned().unwrap();

        assert_eq!(source.retrieve_all(Some(&filter)).unwrap().len(), 2);
        mock.assert();
    }

    #[test]
    fn test_server_error() {
        let mut server = mockito::Server::new();
        let _put = server.mock("PUT", "/notes/1").with_status(500).create();

        let source = HttpSource::new(format!("{}/notes", server.url()));
        let result = source.update("1", &Record::new());
        assert!(matches!(result, Err(DataError::Source(_))));
    }
}
