//! Responders: per-request handlers selected by route, verb, action and
//! content type

pub mod collection;
pub mod context;
pub mod error;
pub mod identity;
pub mod page;
pub mod registry;

pub use collection::{CollectionResponder, CollectionSettings};
pub use context::{AppContext, Settings};
pub use error::ErrorResponder;
pub use identity::IdentityResponder;
pub use page::PageResponder;
pub use registry::ResponderRegistry;

use crate::domain::entities::{HttpMethod, Request};
use crate::domain::errors::{DomainError, HttpError};
use crate::domain::negotiation::ContentToken;
use crate::responses::Response;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Operation run for a (verb, action, content type) combination.
pub type Handler<R> = fn(&mut R, &AppContext) -> Result<Response, HttpError>;

/// A responder type: state built per request, served through a
/// [`HandlerTable`].
pub trait Responder: Send + 'static {
    /// Tag the authorizer knows this responder type by.
    fn type_tag(&self) -> &str;

    fn request(&self) -> Option<&Request>;

    /// Whether every operation needs an authorized principal.
    fn is_restricted(&self) -> bool {
        false
    }
}

/// Registration key of a handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerKey {
    pub method: HttpMethod,
    pub action: Option<String>,
    pub token: ContentToken,
}

impl HandlerKey {
    pub fn new(method: HttpMethod, action: Option<&str>, token: ContentToken) -> Self {
        Self {
            method,
            action: action.map(str::to_string),
            token,
        }
    }

    /// Operation tag used for authorization, such as `get.html` or
    /// `post.delete.html`.
    pub fn tag(&self) -> String {
        let method = self.method.as_str().to_ascii_lowercase();
        match &self.action {
            Some(action) => format!("{}.{}.{}", method, action, self.token),
            None => format!("{}.{}", method, self.token),
        }
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

/// Handlers of a responder type, keyed by verb, action and content token.
pub struct HandlerTable<R> {
    handlers: BTreeMap<HandlerKey, Handler<R>>,
}

impl<R> Default for HandlerTable<R> {
    fn default() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }
}

impl<R> HandlerTable<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, method: HttpMethod, token: ContentToken, handler: Handler<R>) -> Self {
        self.handlers.insert(HandlerKey::new(method, None, token), handler);
        self
    }

    pub fn on_action(mut self, method: HttpMethod, action: &str, token: ContentToken, handler: Handler<R>) -> Self {
        self.handlers
            .insert(HandlerKey::new(method, Some(action), token), handler);
        self
    }

    /// Check the table can serve a request with no preferences at all.
    pub fn validate(&self) -> Result<(), DomainError> {
        let fallback = HandlerKey::new(HttpMethod::Get, None, ContentToken::All);
        if self.handlers.contains_key(&fallback) {
            Ok(())
        } else {
            Err(DomainError::InvalidHandlerTable(
                "a GET handler for any content type is required".to_string(),
            ))
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &HandlerKey> {
        self.handlers.keys()
    }

    fn supports_method(&self, method: HttpMethod) -> bool {
        self.handlers.keys().any(|key| key.method == method)
    }

    fn supports_action(&self, method: HttpMethod, action: &str) -> bool {
        self.handlers
            .keys()
            .any(|key| key.method == method && key.action.as_deref() == Some(action))
    }

    /// Find the handler for a request.
    ///
    /// Without a request the GET handler for any content type is used.
    /// Otherwise the accepted content types are tried in order of
    /// preference, skipping those that map to no token.
    pub fn resolve(&self, request: Option<&Request>) -> Result<(HandlerKey, Handler<R>), HttpError> {
        let Some(request) = request else {
            let key = HandlerKey::new(HttpMethod::Get, None, ContentToken::All);
            return self
                .handlers
                .get(&key)
                .map(|handler| (key.clone(), *handler))
                .ok_or_else(|| HttpError::Internal("No default handler registered".to_string()));
        };

        let method = request.method();
        if !self.supports_method(method) {
            return Err(HttpError::MethodNotAllowed(format!(
                "{} is not supported here",
                method
            )));
        }

        let action = request.action();
        if let Some(action) = action.as_deref() {
            if !self.supports_action(method, action) {
                return Err(HttpError::NotFound(format!(
                    "Action '{}' is not available for {}",
                    action, method
                )));
            }
        }

        for accepted in request.accepted_content_types() {
            let token = match ContentToken::for_media_type(&accepted.media_type) {
                Ok(token) => token,
                Err(e) => {
                    tracing::debug!("{}", e);
                    continue;
                }
            };
            let key = HandlerKey::new(method, action.as_deref(), token);
            if let Some(handler) = self.handlers.get(&key) {
                tracing::debug!("Resolved handler {}", key);
                return Ok((key, *handler));
            }
            tracing::debug!("No handler for {}", key);
        }

        Err(HttpError::NotAcceptable(format!(
            "None of the accepted content types can be served for {}",
            request.current_url()
        )))
    }
}

/// A responder instance as the dispatcher sees it.
pub trait DynResponder: Send {
    fn type_tag(&self) -> &str;

    /// Resolve and run the handler for the request. The response is
    /// computed once; later calls return the same one.
    fn get_response(&mut self, ctx: &AppContext) -> Result<&mut Response, HttpError>;

    /// Hand the computed response over for issuing.
    fn take_response(&mut self) -> Option<Response>;
}

/// A responder bound to its handler table, memoizing its response.
pub struct BoundResponder<R: Responder> {
    responder: R,
    table: Arc<HandlerTable<R>>,
    response: Option<Response>,
}

impl<R: Responder> BoundResponder<R> {
    pub fn new(responder: R, table: Arc<HandlerTable<R>>) -> Self {
        Self {
            responder,
            table,
            response: None,
        }
    }

    pub fn responder(&self) -> &R {
        &self.responder
    }

    fn compute(&mut self, ctx: &AppContext) -> Result<Response, HttpError> {
        let (key, handler) = self.table.resolve(self.responder.request())?;

        if self.responder.is_restricted() {
            let principal = ctx
                .principals
                .current(self.responder.request())
                .filter(|principal| principal.authenticated)
                .ok_or_else(|| {
                    HttpError::NotAuthenticated(format!(
                        "{} requires an identified user",
                        self.responder.type_tag()
                    ))
                })?;
            ctx.authorizer
                .check_authorization(&principal, self.responder.type_tag(), &key.tag())?;
        }

        handler(&mut self.responder, ctx)
    }
}

impl<R: Responder> DynResponder for BoundResponder<R> {
    fn type_tag(&self) -> &str {
        self.responder.type_tag()
    }

    fn get_response(&mut self, ctx: &AppContext) -> Result<&mut Response, HttpError> {
        if self.response.is_none() {
            let response = self.compute(ctx)?;
            self.response = Some(response);
        }
        self.response
            .as_mut()
            .ok_or_else(|| HttpError::Internal("Response was not computed".to_string()))
    }

    fn take_response(&mut self) -> Option<Response> {
        self.response.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Permissions, Principal};
    use crate::domain::repositories::{Authorizer, PrincipalProvider};
    use serde_json::json;

    struct Counter {
        request: Option<Request>,
        calls: usize,
        restricted: bool,
    }

    impl Counter {
        fn new(request: Option<Request>) -> Self {
            Self {
                request,
                calls: 0,
                restricted: false,
            }
        }

        fn table() -> HandlerTable<Self> {
            HandlerTable::new()
                .on(HttpMethod::Get, ContentToken::All, Self::any)
                .on(HttpMethod::Get, ContentToken::Html, Self::html)
                .on(HttpMethod::Get, ContentToken::Json, Self::json)
                .on_action(HttpMethod::Post, "delete", ContentToken::Html, Self::html)
        }

        fn respond(&mut self, served: &str) -> Result<Response, HttpError> {
            self.calls += 1;
            let mut response = Response::json();
            response.set_data("served", served);
            response.set_data("calls", self.calls);
            Ok(response)
        }

        fn any(&mut self, _ctx: &AppContext) -> Result<Response, HttpError> {
            self.respond("all")
        }

        fn html(&mut self, _ctx: &AppContext) -> Result<Response, HttpError> {
            self.respond("html")
        }

        fn json(&mut self, _ctx: &AppContext) -> Result<Response, HttpError> {
            self.respond("json")
        }
    }

    impl Responder for Counter {
        fn type_tag(&self) -> &str {
            "counter"
        }

        fn request(&self) -> Option<&Request> {
            self.request.as_ref()
        }

        fn is_restricted(&self) -> bool {
            self.restricted
        }
    }

    fn resolved(request: Option<Request>) -> Result<String, HttpError> {
        Counter::table().resolve(request.as_ref()).map(|(key, _)| key.tag())
    }

    fn get(accept: &str) -> Request {
        Request::new(HttpMethod::Get, "/counter").with_accept(accept)
    }

    #[test]
    fn test_highest_weight_supported_type_wins() {
        assert_eq!(resolved(Some(get("text/html;q=0.5,application/json"))).unwrap(), "get.json");
        assert_eq!(resolved(Some(get("text/html,application/json;q=0.9"))).unwrap(), "get.html");
    }

    #[test]
    fn test_falls_through_unserved_types() {
        let table = HandlerTable::<Counter>::new()
            .on(HttpMethod::Get, ContentToken::All, Counter::any)
            .on(HttpMethod::Get, ContentToken::Html, Counter::html);
        let request = get("application/json,text/html;q=0.5");
        let (key, _) = table.resolve(Some(&request)).unwrap();
        assert_eq!(key.tag(), "get.html");
    }

    #[test]
    fn test_unmapped_types_are_skipped() {
        assert_eq!(resolved(Some(get("application/pdf,text/plain,*/*;q=0.1"))).unwrap(), "get.all");
        assert!(matches!(
            resolved(Some(get("application/pdf,image/png"))),
            Err(HttpError::NotAcceptable(_))
        ));
    }

    #[test]
    fn test_no_request_uses_default_handler() {
        assert_eq!(resolved(None).unwrap(), "get.all");
    }

    #[test]
    fn test_unsupported_method() {
        let request = Request::new(HttpMethod::Put, "/counter");
        assert!(matches!(resolved(Some(request)), Err(HttpError::MethodNotAllowed(_))));
    }

    #[test]
    fn test_actions() {
        let request = Request::new(HttpMethod::Post, "/counter")
            .with_parameter("action", "delete")
            .with_accept("text/html");
        assert_eq!(resolved(Some(request)).unwrap(), "post.delete.html");

        let request = Request::new(HttpMethod::Get, "/counter").with_parameter("action", "delete");
        assert!(matches!(resolved(Some(request)), Err(HttpError::NotFound(_))));

        let request = Request::new(HttpMethod::Post, "/counter")
            .with_parameter("action", "delete")
            .with_accept("application/json");
        assert!(matches!(resolved(Some(request)), Err(HttpError::NotAcceptable(_))));
    }

    #[test]
    fn test_table_needs_default_handler() {
        assert!(Counter::table().validate().is_ok());
        let table = HandlerTable::<Counter>::new().on(HttpMethod::Get, ContentToken::Html, Counter::html);
        assert!(matches!(table.validate(), Err(DomainError::InvalidHandlerTable(_))));
    }

    #[test]
    fn test_response_is_memoized() {
        let ctx = AppContext::for_tests();
        let mut responder = BoundResponder::new(Counter::new(Some(get("text/html"))), Arc::new(Counter::table()));

        let first = responder.get_response(&ctx).unwrap().get_data("calls").cloned();
        let second = responder.get_response(&ctx).unwrap().get_data("calls").cloned();

        assert_eq!(first, Some(json!(1)));
        assert_eq!(second, Some(json!(1)));
        assert_eq!(responder.responder().calls, 1);
        assert!(responder.take_response().is_some());
    }

    struct FixedPrincipal(Option<Principal>);

    impl PrincipalProvider for FixedPrincipal {
        fn current(&self, _request: Option<&Request>) -> Option<Principal> {
            self.0.clone()
        }
    }

    struct OnlyHtml;

    impl Authorizer for OnlyHtml {
        fn check_authorization(&self, _principal: &Principal, responder: &str, operation: &str) -> Result<(), HttpError> {
            if responder == "counter" && operation == "get.html" {
                Ok(())
            } else {
                Err(HttpError::NotAuthorized(operation.to_string()))
            }
        }
    }

    fn restricted(accept: &str) -> BoundResponder<Counter> {
        let mut counter = Counter::new(Some(get(accept)));
        counter.restricted = true;
        BoundResponder::new(counter, Arc::new(Counter::table()))
    }

    #[test]
    fn test_restricted_needs_principal() {
        let mut ctx = AppContext::for_tests();
        ctx.principals = Arc::new(FixedPrincipal(None));
        let result = restricted("text/html").get_response(&ctx).map(|_| ());
        assert!(matches!(result, Err(HttpError::NotAuthenticated(_))));

        ctx.principals = Arc::new(FixedPrincipal(Some(Principal::anonymous("guest"))));
        let result = restricted("text/html").get_response(&ctx).map(|_| ());
        assert!(matches!(result, Err(HttpError::NotAuthenticated(_))));
    }

    #[test]
    fn test_restricted_checks_operation() {
        let mut ctx = AppContext::for_tests();
        ctx.principals = Arc::new(FixedPrincipal(Some(Principal::authenticated("editor", Permissions::none()))));
        ctx.authorizer = Arc::new(OnlyHtml);

        assert!(restricted("text/html").get_response(&ctx).is_ok());
        let result = restricted("application/json").get_response(&ctx).map(|_| ());
        assert!(matches!(result, Err(HttpError::NotAuthorized(_))));
    }
}
