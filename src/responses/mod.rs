//! Responses: data collected by responders, serialized on issue

pub mod xml;

use crate::domain::entities::{HttpResponse, Request};
use crate::domain::errors::HttpError;
use crate::domain::repositories::Renderer;
use serde_json::{json, Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Status codes a response may carry.
pub const RECOGNIZED_STATUS_CODES: [u16; 15] = [
    200, 201, 202, 204, 301, 302, 303, 400, 401, 403, 404, 405, 406, 408, 500,
];

pub const DEFAULT_ENCODING: &str = "UTF-8";

/// Data key that holds status messages.
pub const STATUS_KEY: &str = "status";

const TITLE_SEPARATOR: &str = " — ";

/// Cookie carrying status messages across a redirect.
pub const MESSAGES_COOKIE: &str = "eix-messages";
/// Seconds carried messages wait for the next page.
pub const MESSAGES_MAX_AGE: u32 = 60;

/// Kind of status message shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusMessage {
    Notice,
    Warning,
    Error,
}

impl StatusMessage {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusMessage::Notice => "notice",
            StatusMessage::Warning => "warning",
            StatusMessage::Error => "error",
        }
    }
}

fn messages_cookie(messages: &Value) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(messages.to_string().as_bytes()).collect();
    format!("{}={}; Max-Age={}; Path=/; HttpOnly", MESSAGES_COOKIE, encoded, MESSAGES_MAX_AGE)
}

/// Move the status messages carried by the request into the response, and
/// expire their cookie.
pub fn pop_status_messages(request: Option<&Request>, response: &mut Response) {
    let Some(encoded) = request.and_then(|request| request.cookie(MESSAGES_COOKIE)) else {
        return;
    };
    response.add_cookie(format!("{}=; Max-Age=0; Path=/; HttpOnly", MESSAGES_COOKIE));

    let messages = url::form_urlencoded::parse(encoded.as_bytes())
        .next()
        .and_then(|(json, _)| serde_json::from_str::<Value>(&json).ok());
    match messages {
        Some(messages @ Value::Object(_)) => response.add_data(STATUS_KEY, messages),
        _ => tracing::warn!("Ignoring malformed {} cookie", MESSAGES_COOKIE),
    }
}

/// Whether a status code may be set on a response.
pub fn is_recognized_status(status: u16) -> bool {
    RECOGNIZED_STATUS_CODES.contains(&status)
}

/// Merge `addition` into `existing` the way repeated `add_data` calls do:
/// objects merge key by key, arrays concatenate, and clashing scalars end
/// up together in an array.
pub fn merge_values(existing: Value, addition: Value) -> Value {
    match (existing, addition) {
        (Value::Object(mut existing), Value::Object(addition)) => {
            for (key, value) in addition {
                let merged = match existing.remove(&key) {
                    Some(current) => merge_values(current, value),
                    None => value,
                };
                existing.insert(key, merged);
            }
            Value::Object(existing)
        }
        (Value::Array(mut existing), Value::Array(addition)) => {
            existing.extend(addition);
            Value::Array(existing)
        }
        (Value::Array(mut existing), addition) => {
            existing.push(addition);
            Value::Array(existing)
        }
        (existing, Value::Array(addition)) => {
            let mut items = vec![existing];
            items.extend(addition);
            Value::Array(items)
        }
        (existing, addition) => Value::Array(vec![existing, addition]),
    }
}

struct HtmlBody {
    renderer: Arc<dyn Renderer>,
    application_name: String,
    url: Option<String>,
    template_id: Option<String>,
    title_parts: Vec<String>,
}

enum ImageSource {
    Unset,
    Bytes(Vec<u8>),
    File(PathBuf),
}

enum Body {
    Html(HtmlBody),
    Json,
    Xml,
    Image(ImageSource),
    Redirect(Option<String>),
}

/// A response under construction.
///
/// Every kind shares the status, content type, data and headers; issuing
/// consumes the response and serializes it according to its kind.
pub struct Response {
    status: u16,
    content_type: Option<String>,
    encoding: String,
    data: Map<String, Value>,
    headers: Vec<(String, String)>,
    body: Body,
}

impl Response {
    fn with_body(body: Body, content_type: Option<&str>) -> Self {
        Self {
            status: 200,
            content_type: content_type.map(str::to_string),
            encoding: DEFAULT_ENCODING.to_string(),
            data: Map::new(),
            headers: Vec::new(),
            body,
        }
    }

    /// An HTML page rendered from a template.
    pub fn html(renderer: Arc<dyn Renderer>, application_name: impl Into<String>, url: Option<String>) -> Self {
        Self::with_body(
            Body::Html(HtmlBody {
                renderer,
                application_name: application_name.into(),
                url,
                template_id: None,
                title_parts: Vec::new(),
            }),
            Some("text/html"),
        )
    }

    pub fn json() -> Self {
        Self::with_body(Body::Json, Some("application/json"))
    }

    pub fn xml() -> Self {
        Self::with_body(Body::Xml, Some("application/xml"))
    }

    pub fn image() -> Self {
        Self::with_body(Body::Image(ImageSource::Unset), None)
    }

    /// A 303 redirection to another URL.
    pub fn redirect(location: impl Into<String>) -> Self {
        let mut response = Self::with_body(Body::Redirect(Some(location.into())), None);
        response.status = 303;
        response
    }

    pub fn kind(&self) -> &'static str {
        match self.body {
            Body::Html(_) => "html",
            Body::Json => "json",
            Body::Xml => "xml",
            Body::Image(_) => "image",
            Body::Redirect(_) => "redirect",
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Set the status, if it is one of [`RECOGNIZED_STATUS_CODES`].
    pub fn set_status(&mut self, status: u16) -> bool {
        let recognized = is_recognized_status(status);
        if recognized {
            self.status = status;
        } else {
            tracing::warn!("Ignoring unrecognized status code {}", status);
        }
        recognized
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    pub fn set_encoding(&mut self, encoding: impl Into<String>) {
        self.encoding = encoding.into();
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn get_data(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Replace the value under a key.
    pub fn set_data(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    /// Merge a value into whatever the key already holds.
    pub fn add_data(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let merged = match self.data.remove(&key) {
            Some(existing) => merge_values(existing, value),
            None => value,
        };
        self.data.insert(key, merged);
    }

    pub fn add_status_message(&mut self, kind: StatusMessage, message: impl Into<String>) {
        self.add_data(STATUS_KEY, json!({ kind.as_str(): [message.into()] }));
    }

    pub fn add_notice(&mut self, message: impl Into<String>) {
        self.add_status_message(StatusMessage::Notice, message);
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.add_status_message(StatusMessage::Warning, message);
    }

    pub fn add_error_message(&mut self, message: impl Into<String>) {
        self.add_status_message(StatusMessage::Error, message);
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Set a header, replacing any previous value.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(key, _)| !key.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }

    /// Add a `Set-Cookie` header. Several cookies may be set at once.
    pub fn add_cookie(&mut self, cookie: impl Into<String>) {
        self.headers.push(("Set-Cookie".to_string(), cookie.into()));
    }

    pub fn template_id(&self) -> Option<&str> {
        match &self.body {
            Body::Html(html) => html.template_id.as_deref(),
            _ => None,
        }
    }

    /// Template rendered by an HTML response. Ignored by other kinds.
    pub fn set_template_id(&mut self, template_id: impl Into<String>) {
        if let Body::Html(html) = &mut self.body {
            html.template_id = Some(template_id.into());
        }
    }

    /// Add a part to the page title, after the application name.
    pub fn append_title(&mut self, part: impl Into<String>) {
        if let Body::Html(html) = &mut self.body {
            html.title_parts.push(part.into());
        }
    }

    /// Serve the image from memory.
    pub fn set_image(&mut self, bytes: Vec<u8>, content_type: impl Into<String>) {
        if let Body::Image(source) = &mut self.body {
            *source = ImageSource::Bytes(bytes);
            self.content_type = Some(content_type.into());
        }
    }

    /// Serve the image from a file, guessing its type from the extension.
    pub fn set_image_file(&mut self, path: impl Into<PathBuf>) {
        if let Body::Image(source) = &mut self.body {
            let path = path.into();
            self.content_type = image_type_for(&path).map(str::to_string);
            *source = ImageSource::File(path);
        }
    }

    /// Set the image MIME type from a short name such as `png` or `jpg`.
    pub fn set_image_type(&mut self, image_type: &str) -> Result<(), HttpError> {
        let content_type = match image_type.to_ascii_lowercase().as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            other => return Err(HttpError::Internal(format!("Unsupported image format: {}", other))),
        };
        self.content_type = Some(content_type.to_string());
        Ok(())
    }

    pub fn location(&self) -> Option<&str> {
        match &self.body {
            Body::Redirect(location) => location.as_deref(),
            _ => None,
        }
    }

    pub fn set_location(&mut self, location: impl Into<String>) {
        if let Body::Redirect(current) = &mut self.body {
            *current = Some(location.into());
        }
    }

    /// Serialize the response. Consumes it, so it is issued only once.
    pub fn issue(self) -> Result<HttpResponse, HttpError> {
        tracing::debug!("Issuing {} response with status {}", self.kind(), self.status);

        let Response {
            status,
            content_type,
            encoding,
            data,
            mut headers,
            body,
        } = self;

        let payload = match body {
            Body::Html(html) => {
                let template_id = html
                    .template_id
                    .ok_or_else(|| HttpError::Internal("No template has been set".to_string()))?;

                let mut title = vec![html.application_name];
                title.extend(html.title_parts);
                let mut view = data;
                view.insert(
                    "page".to_string(),
                    json!({
                        "title": title.join(TITLE_SEPARATOR),
                        "template": template_id,
                        "contentType": content_type.clone().unwrap_or_default(),
                        "url": html.url,
                    }),
                );

                html.renderer.render(&template_id, &Value::Object(view))?.into_bytes()
            }
            Body::Json => {
                let value = if data.len() == 1 {
                    data.into_iter().next().map(|(_, value)| value).unwrap_or(Value::Null)
                } else {
                    Value::Object(data)
                };
                serde_json::to_vec(&value).map_err(|e| HttpError::Internal(e.to_string()))?
            }
            Body::Xml => xml::write_document(&data)?,
            Body::Image(source) => {
                headers.push(("Cache-Control".to_string(), "3600".to_string()));
                match source {
                    ImageSource::Bytes(bytes) => bytes,
                    ImageSource::File(path) => std::fs::read(&path).map_err(|_| {
                        HttpError::NotFound(format!("Image not found in {}", path.display()))
                    })?,
                    ImageSource::Unset => {
                        return Err(HttpError::BadRequest("No image has been set.".to_string()))
                    }
                }
            }
            Body::Redirect(location) => {
                let location = location
                    .ok_or_else(|| HttpError::Internal("No redirection URL has been set".to_string()))?;
                tracing::debug!("Redirecting to {}", location);
                headers.push(("Location".to_string(), location));
                // Messages are shown by the page the client lands on
                if let Some(messages) = data.get(STATUS_KEY) {
                    headers.push(("Set-Cookie".to_string(), messages_cookie(messages)));
                }
                Vec::new()
            }
        };

        if let Some(content_type) = content_type {
            headers.push((
                "Content-Type".to_string(),
                format!("{}; charset={}", content_type, encoding),
            ));
        }

        Ok(HttpResponse {
            status_code: status,
            headers,
            body: payload,
        })
    }
}

fn image_type_for(path: &Path) -> Option<&'static str> {
    match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("kind", &self.kind())
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("data", &self.data)
            .finish()
    }
}
