//! Responder that reports failures

use crate::domain::entities::{HttpMethod, Request};
use crate::domain::errors::HttpError;
use crate::domain::negotiation::ContentToken;
use crate::responders::{AppContext, HandlerTable, Responder};
use crate::responses::Response;
use serde_json::json;

/// Serves error requests in the representation the client prefers.
pub struct ErrorResponder {
    request: Option<Request>,
}

impl ErrorResponder {
    pub fn new(request: Option<Request>) -> Self {
        Self { request }
    }

    pub fn handlers() -> HandlerTable<Self> {
        HandlerTable::new()
            .on(HttpMethod::Get, ContentToken::All, Self::html)
            .on(HttpMethod::Get, ContentToken::Html, Self::html)
            .on(HttpMethod::Get, ContentToken::Json, Self::json)
            .on(HttpMethod::Get, ContentToken::Xml, Self::xml)
    }

    fn error(&self) -> HttpError {
        self.request
            .as_ref()
            .and_then(Request::error_details)
            .cloned()
            .unwrap_or_else(|| HttpError::Internal("Unknown error".to_string()))
    }

    /// Fill in the status and error data shared by every representation.
    fn describe(&self, mut response: Response) -> Response {
        let error = self.error();
        let code = error.status_code();

        response.set_status(code);
        response.set_data("error", json!({"code": code, "message": error.to_string()}));
        if let HttpError::Validation(validation) = &error {
            response.set_data("validation", validation.to_value());
        }
        response
    }

    fn template_for(code: u16) -> &'static str {
        match code {
            404 => "error/not_found",
            401 | 403 => "error/security",
            _ => "error/index",
        }
    }

    fn html(&mut self, ctx: &AppContext) -> Result<Response, HttpError> {
        let mut response = self.describe(ctx.html_response(self.request.as_ref()));
        response.set_template_id(Self::template_for(self.error().status_code()));
        response.append_title("Error");
        Ok(response)
    }

    fn json(&mut self, _ctx: &AppContext) -> Result<Response, HttpError> {
        Ok(self.describe(Response::json()))
    }

    fn xml(&mut self, _ctx: &AppContext) -> Result<Response, HttpError> {
        Ok(self.describe(Response::xml()))
    }
}

impl Responder for ErrorResponder {
    fn type_tag(&self) -> &str {
        "error"
    }

    fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }
}
