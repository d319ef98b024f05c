/// Use Cases - Application-specific business rules
/// Uses domain entities, responders and repository interfaces

use crate::domain::entities::{HttpMethod, HttpRequest, HttpResponse, Request, Route};
use crate::domain::errors::HttpError;
use crate::domain::repositories::RouteRepository;
use crate::responders::identity::{locator_cookie, LOCATOR_COOKIE};
use crate::responders::registry::{ERROR_RESPONDER, IDENTITY_RESPONDER};
use crate::responders::{AppContext, ResponderRegistry};
use crate::responses::Response;
use std::sync::Arc;
use std::time::Instant;

/// Use case for loading the routing table
pub struct InitializeRoutesUseCase<R: RouteRepository> {
    repository: Arc<R>,
}

impl<R: RouteRepository> InitializeRoutesUseCase<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Load all routes from the repository
    pub async fn execute(&self) -> Result<Vec<Route>, UseCaseError> {
        self.repository
            .load_all()
            .await
            .map_err(|e| UseCaseError::RepositoryError(e.to_string()))
    }
}

/// Hook run on every response right before it is issued.
pub type AlterHook = Box<dyn Fn(&mut Response) + Send + Sync>;

/// Use case for serving one HTTP request: parse it, find its responder,
/// obtain and issue the response, falling back to identification and to
/// the error responder.
pub struct DispatchRequestUseCase {
    routes: Arc<Vec<Route>>,
    responders: Arc<ResponderRegistry>,
    context: Arc<AppContext>,
    alter: Option<AlterHook>,
}

impl DispatchRequestUseCase {
    pub fn new(routes: Vec<Route>, responders: ResponderRegistry, context: AppContext) -> Self {
        Self {
            routes: Arc::new(routes),
            responders: Arc::new(responders),
            context: Arc::new(context),
            alter: None,
        }
    }

    pub fn with_alter(mut self, hook: impl Fn(&mut Response) + Send + Sync + 'static) -> Self {
        self.alter = Some(Box::new(hook));
        self
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Execute the use case. Every failure ends up as an error response, so
    /// this always produces something to send back.
    pub fn execute(&self, raw: &HttpRequest) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4();
        let started = Instant::now();
        let span = tracing::info_span!("dispatch", %request_id);
        let _entered = span.enter();
        tracing::debug!("Dispatching {} {}", raw.method, raw.uri);

        let response = match self.run(raw) {
            Ok(response) => response,
            Err(error) => self.fail(error, raw),
        };

        tracing::info!(
            "{} {} -> {} in {:?}",
            raw.method,
            raw.uri,
            response.status_code,
            started.elapsed()
        );
        response
    }

    fn run(&self, raw: &HttpRequest) -> Result<HttpResponse, HttpError> {
        let request = Request::from_http(raw, &self.routes)?;
        let response = self.respond(request)?;
        self.issue(response)
    }

    fn respond(&self, request: Request) -> Result<Response, HttpError> {
        let responder_id = request
            .responder_id()
            .ok_or_else(|| HttpError::NotFound(format!("No responder serves '{}'", request.path())))?;

        match self.obtain(&responder_id, request.clone()) {
            Err(HttpError::NotAuthenticated(reason)) => {
                tracing::info!("Identification needed: {}", reason);
                // Clients that cannot show the identification page get the 401
                match self.identify(&request) {
                    Err(HttpError::NotAcceptable(_)) => Err(HttpError::NotAuthenticated(reason)),
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Ask the identity responder instead, remembering where the user was
    /// heading unless that is already known or is the identity flow itself.
    fn identify(&self, request: &Request) -> Result<Response, HttpError> {
        let mut response = self.obtain(IDENTITY_RESPONDER, request.redirected_to(HttpMethod::Get))?;

        let in_identity_flow = request.path().starts_with(&self.context.settings.identity_prefix);
        if request.cookie(LOCATOR_COOKIE).is_none() && !in_identity_flow {
            let locator = request.current_url();
            tracing::debug!("Recording locator {}", locator);
            response.add_cookie(locator_cookie(&locator));
        }
        Ok(response)
    }

    fn obtain(&self, responder_id: &str, request: Request) -> Result<Response, HttpError> {
        let mut responder = self.responders.create(responder_id, Some(request))?;
        responder.get_response(&self.context)?;
        responder
            .take_response()
            .ok_or_else(|| HttpError::Internal(format!("Responder {} produced no response", responder_id)))
    }

    fn issue(&self, mut response: Response) -> Result<HttpResponse, HttpError> {
        if let Some(alter) = &self.alter {
            alter(&mut response);
        }
        response.issue()
    }

    /// Serve the failure through the error responder. If that fails too,
    /// answer with a bare diagnostic page.
    fn fail(&self, error: HttpError, raw: &HttpRequest) -> HttpResponse {
        if error.status_code() >= 500 {
            tracing::error!("Request failed: {}", error);
        } else {
            tracing::warn!("Request failed: {}", error);
        }

        let request = Request::error(error.clone(), Some(raw));
        match self
            .obtain(ERROR_RESPONDER, request)
            .and_then(|response| self.issue(response))
        {
            Ok(response) => response,
            Err(fatal) => {
                tracing::error!("Fatal error while reporting '{}': {}", error, fatal);
                fatal_response(&error, &fatal)
            }
        }
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn fatal_response(error: &HttpError, fatal: &HttpError) -> HttpResponse {
    let body = format!(
        "<!DOCTYPE html>\n<html><head><title>Fatal error</title></head><body>\
         <h1>Fatal error</h1><p>{}</p><p>{}</p></body></html>\n",
        escape_html(&error.to_string()),
        escape_html(&fatal.to_string())
    );
    HttpResponse {
        status_code: 500,
        headers: vec![("Content-Type".to_string(), "text/html; charset=UTF-8".to_string())],
        body: body.into_bytes(),
    }
}

/// Use case errors
#[derive(Debug)]
pub enum UseCaseError {
    RepositoryError(String),
}

impl std::fmt::Display for UseCaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UseCaseError::RepositoryError(msg) => write!(f, "Repository error: {}", msg),
        }
    }
}

impl std::error::Error for UseCaseError {}
