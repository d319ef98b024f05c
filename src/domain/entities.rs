//! Domain entities - pure business logic with no external dependencies

use crate::domain::errors::{DomainError, HttpError};
use crate::domain::negotiation::{parse_accept_header, AcceptedType, ANY_CONTENT_TYPE};
use crate::domain::utils::{merge_json_object, parse_cookies, parse_form_pairs};
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Parameter that names the responder type handling a route.
pub const RESPONDER_PARAMETER: &str = "responder";
/// Parameter that selects an action-specific handler.
pub const ACTION_PARAMETER: &str = "action";

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub fn parse(method: &str) -> Result<Self, HttpError> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(HttpError::MethodNotAllowed(format!("{} requests are not supported", other))),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP request representation, as received by an adapter
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub uri: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn path(&self) -> &str {
        self.uri.split_once('?').map_or(self.uri.as_str(), |(path, _)| path)
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.split_once('?').map(|(_, query)| query)
    }

    pub fn cookies(&self) -> BTreeMap<String, String> {
        self.header("cookie").map(parse_cookies).unwrap_or_default()
    }
}

/// HTTP response representation, as produced by issuing a response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Value object for a routing rule
///
/// The pattern is a regular expression that must match the whole path.
/// Captures bind numbered groups to parameter names; defaults are literal
/// parameter values, among them the responder that serves the route.
#[derive(Debug, Clone)]
pub struct Route {
    source: String,
    pattern: Regex,
    captures: Vec<(String, usize)>,
    defaults: Vec<(String, String)>,
}

impl Route {
    pub fn new(pattern: impl Into<String>) -> Result<Self, DomainError> {
        let source = pattern.into();
        if source.is_empty() || !source.starts_with('/') {
            return Err(DomainError::InvalidRoute("Route must start with /".to_string()));
        }
        let pattern = Regex::new(&format!("^(?:{})$", source))
            .map_err(|e| DomainError::InvalidRoute(format!("{}: {}", source, e)))?;

        Ok(Self {
            source,
            pattern,
            captures: Vec::new(),
            defaults: Vec::new(),
        })
    }

    pub fn capture(mut self, name: impl Into<String>, group: usize) -> Self {
        self.captures.push((name.into(), group));
        self
    }

    pub fn default_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.push((name.into(), value.into()));
        self
    }

    pub fn responder(mut self, responder: impl Into<String>) -> Self {
        self.defaults.push((RESPONDER_PARAMETER.to_string(), responder.into()));
        self
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a path, returning the parameters the route contributes.
    pub fn match_path(&self, path: &str) -> Option<BTreeMap<String, Value>> {
        let matches = self.pattern.captures(path)?;

        let mut components = BTreeMap::new();
        for (name, value) in &self.defaults {
            components.insert(name.clone(), Value::String(value.clone()));
        }
        for (name, group) in &self.captures {
            if let Some(matched) = matches.get(*group) {
                components.insert(name.clone(), Value::String(matched.as_str().to_string()));
            }
        }

        Some(components)
    }
}

/// An immutable, parsed request
#[derive(Debug, Clone)]
pub struct Request {
    method: HttpMethod,
    path: String,
    query: Option<String>,
    parameters: BTreeMap<String, Value>,
    accepted: Vec<AcceptedType>,
    cookies: BTreeMap<String, String>,
    error: Option<Arc<HttpError>>,
}

impl Request {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            parameters: BTreeMap::new(),
            accepted: parse_accept_header(None),
            cookies: BTreeMap::new(),
            error: None,
        }
    }

    /// Build a request from raw input, matching the path against the routes.
    ///
    /// Parameters come from the query string, then the body, then the
    /// matching route, later sources overriding earlier ones.
    pub fn from_http(raw: &HttpRequest, routes: &[Route]) -> Result<Self, HttpError> {
        let method = HttpMethod::parse(&raw.method)?;
        let path = raw.path().to_string();
        tracing::debug!("Parsing URI: {}", path);

        let mut parameters = BTreeMap::new();
        if let Some(query) = raw.query() {
            parse_form_pairs(query, &mut parameters);
        }
        Self::parse_body(raw, &mut parameters)?;

        let (route, components) = routes
            .iter()
            .find_map(|route| route.match_path(&path).map(|components| (route, components)))
            .ok_or_else(|| HttpError::NotFound(format!("No routes match URI '{}'", path)))?;
        tracing::debug!("Found a matching route: {}", route.as_str());
        parameters.extend(components);

        Ok(Self {
            method,
            path,
            query: raw.query().map(str::to_string),
            parameters,
            accepted: parse_accept_header(raw.header("accept")),
            cookies: raw.cookies(),
            error: None,
        })
    }

    /// Build a request that describes a failure, to be served by the error
    /// responder. It is always a GET and carries no route parameters.
    ///
    /// `*/*` is appended as the least preferred type, so the failure is
    /// reported even when the client accepts nothing the error responder
    /// produces.
    pub fn error(error: HttpError, raw: Option<&HttpRequest>) -> Self {
        let mut request = Self::new(HttpMethod::Get, raw.map_or("/", HttpRequest::path));
        if let Some(raw) = raw {
            request.query = raw.query().map(str::to_string);
            request.accepted = parse_accept_header(raw.header("accept"));
            request.cookies = raw.cookies();
        }
        if !request.accepted.iter().any(|accepted| accepted.media_type == ANY_CONTENT_TYPE) {
            request.accepted.push(AcceptedType {
                media_type: ANY_CONTENT_TYPE.to_string(),
                quality: 0.0,
            });
        }
        request.error = Some(Arc::new(error));
        request
    }

    fn parse_body(raw: &HttpRequest, parameters: &mut BTreeMap<String, Value>) -> Result<(), HttpError> {
        if raw.body.is_empty() {
            return Ok(());
        }
        let content_type = raw.header("content-type").unwrap_or("").to_ascii_lowercase();

        if content_type.starts_with("application/x-www-form-urlencoded") {
            let body = std::str::from_utf8(&raw.body)
                .map_err(|e| HttpError::BadRequest(format!("Form body is not UTF-8: {}", e)))?;
            parse_form_pairs(body, parameters);
        } else if content_type.starts_with("application/json") {
            match serde_json::from_slice::<Value>(&raw.body) {
                Ok(Value::Object(object)) => merge_json_object(object, parameters),
                Ok(_) => return Err(HttpError::BadRequest("JSON body must be an object".to_string())),
                Err(e) => return Err(HttpError::BadRequest(format!("Invalid JSON body: {}", e))),
            }
        }

        Ok(())
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_accept(mut self, header: &str) -> Self {
        self.accepted = parse_accept_header(Some(header));
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Copy of this request with another method and no action.
    pub fn redirected_to(&self, method: HttpMethod) -> Self {
        let mut request = self.clone();
        request.method = method;
        request.parameters.remove(ACTION_PARAMETER);
        request
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn parameters(&self) -> &BTreeMap<String, Value> {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    /// A scalar parameter as text. Empty strings count as absent.
    pub fn parameter_str(&self, name: &str) -> Option<String> {
        match self.parameters.get(name)? {
            Value::String(text) if !text.is_empty() => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }

    /// A parameter as a list of strings; scalars become one-element lists.
    pub fn parameter_list(&self, name: &str) -> Vec<String> {
        match self.parameters.get(name) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(text) => Some(text.clone()),
                    Value::Number(number) => Some(number.to_string()),
                    _ => None,
                })
                .collect(),
            Some(_) => self.parameter_str(name).into_iter().collect(),
            None => Vec::new(),
        }
    }

    pub fn action(&self) -> Option<String> {
        self.parameter_str(ACTION_PARAMETER)
    }

    pub fn responder_id(&self) -> Option<String> {
        self.parameter_str(RESPONDER_PARAMETER)
    }

    pub fn accepted_content_types(&self) -> &[AcceptedType] {
        &self.accepted
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn current_url(&self) -> String {
        match &self.query {
            Some(query) if !query.is_empty() => format!("{}?{}", self.path, query),
            _ => self.path.clone(),
        }
    }

    pub fn error_details(&self) -> Option<&HttpError> {
        self.error.as_deref()
    }
}

/// Operations a principal may run, keyed by responder type tag.
///
/// `*` as a responder grants everything; `*` as an operation grants every
/// operation of that responder type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions {
    grants: BTreeMap<String, BTreeSet<String>>,
}

impl Permissions {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self::none().grant("*", "*")
    }

    pub fn grant(mut self, responder: impl Into<String>, operation: impl Into<String>) -> Self {
        self.grants
            .entry(responder.into())
            .or_default()
            .insert(operation.into());
        self
    }

    /// Parse a grant written as `*`, `responder:*` or `responder:operation`.
    pub fn parse_grant(self, grant: &str) -> Result<Self, DomainError> {
        let grant = grant.trim();
        if grant == "*" {
            return Ok(self.grant("*", "*"));
        }
        match grant.split_once(':') {
            Some((responder, operation)) if !responder.is_empty() && !operation.is_empty() => {
                Ok(self.grant(responder, operation))
            }
            _ => Err(DomainError::InvalidPermission(grant.to_string())),
        }
    }

    pub fn allows(&self, responder: &str, operation: &str) -> bool {
        if self.grants.contains_key("*") {
            return true;
        }
        self.grants
            .get(responder)
            .is_some_and(|operations| operations.contains("*") || operations.contains(operation))
    }
}

/// Someone using the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub authenticated: bool,
    pub permissions: Permissions,
}

impl Principal {
    pub fn anonymous(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            email: None,
            authenticated: false,
            permissions: Permissions::none(),
        }
    }

    pub fn authenticated(id: impl Into<String>, permissions: Permissions) -> Self {
        Self {
            authenticated: true,
            permissions,
            ..Self::anonymous(id)
        }
    }
}
