//! Identification flow: asks for credentials and remembers where the user
//! was heading

use crate::domain::entities::{HttpMethod, Request};
use crate::domain::errors::HttpError;
use crate::domain::negotiation::ContentToken;
use crate::responders::{AppContext, HandlerTable, Responder};
use crate::responses::Response;

/// Cookie holding the URL to return to after identification.
pub const LOCATOR_COOKIE: &str = "eix-locator";
/// Cookie holding the session token of a signed-in principal.
pub const SESSION_COOKIE: &str = "eix-session";
/// Seconds a recorded locator stays valid.
pub const LOCATOR_MAX_AGE: u32 = 300;

/// `Set-Cookie` value recording a locator.
pub fn locator_cookie(url: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(url.as_bytes()).collect();
    format!("{}={}; Max-Age={}; Path=/; HttpOnly", LOCATOR_COOKIE, encoded, LOCATOR_MAX_AGE)
}

/// The locator recorded in the request, if any.
pub fn last_locator(request: Option<&Request>) -> Option<String> {
    let encoded = request?.cookie(LOCATOR_COOKIE)?;
    url::form_urlencoded::parse(encoded.as_bytes())
        .next()
        .map(|(url, _)| url.into_owned())
        .filter(|url| url.starts_with('/'))
}

/// Read the recorded locator and expire its cookie on the response.
pub fn pop_last_locator(request: Option<&Request>, response: &mut Response) -> Option<String> {
    let locator = last_locator(request)?;
    response.add_cookie(format!("{}=; Max-Age=0; Path=/; HttpOnly", LOCATOR_COOKIE));
    Some(locator)
}

fn session_cookie(token: &str) -> String {
    format!("{}={}; Path=/; HttpOnly", SESSION_COOKIE, token)
}

pub struct IdentityResponder {
    request: Option<Request>,
}

impl IdentityResponder {
    pub fn new(request: Option<Request>) -> Self {
        Self { request }
    }

    pub fn handlers() -> HandlerTable<Self> {
        HandlerTable::new()
            .on(HttpMethod::Get, ContentToken::All, Self::identify)
            .on(HttpMethod::Get, ContentToken::Html, Self::identify)
            .on(HttpMethod::Post, ContentToken::All, Self::sign_in)
            .on(HttpMethod::Post, ContentToken::Html, Self::sign_in)
    }

    /// Redirect to where the user was heading, or to the home page.
    fn return_response(&self) -> Response {
        let mut response = Response::redirect("/");
        if let Some(locator) = pop_last_locator(self.request.as_ref(), &mut response) {
            response.set_location(locator);
        }
        response
    }

    fn identify(&mut self, ctx: &AppContext) -> Result<Response, HttpError> {
        let signed_in = ctx
            .principals
            .current(self.request.as_ref())
            .is_some_and(|principal| principal.authenticated);
        if signed_in {
            return Ok(self.return_response());
        }

        let mut response = ctx.html_response(self.request.as_ref());
        response.set_template_id("identity/identify");
        response.append_title("Identification");
        Ok(response)
    }

    fn sign_in(&mut self, ctx: &AppContext) -> Result<Response, HttpError> {
        let request = self
            .request
            .as_ref()
            .ok_or_else(|| HttpError::BadRequest("Nothing to sign in with".to_string()))?;

        let provider = request.parameter_str("provider").unwrap_or_default();
        if provider != "key" {
            return Err(HttpError::BadRequest(format!(
                "Identity provider '{}' is not recognised.",
                provider
            )));
        }

        let key = request
            .parameter_str("key")
            .ok_or_else(|| HttpError::BadRequest("No key has been provided".to_string()))?;
        let token = ctx
            .principals
            .sign_in(&key)
            .ok_or_else(|| HttpError::NotAuthenticated("The key is not valid".to_string()))?;

        tracing::info!("Principal signed in");
        let mut response = self.return_response();
        response.add_cookie(session_cookie(&token));
        Ok(response)
    }
}

impl Responder for IdentityResponder {
    fn type_tag(&self) -> &str {
        "identity"
    }

    fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }
}
