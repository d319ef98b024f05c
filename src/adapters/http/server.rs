/// HTTP adapter - Axum-based HTTP server controller
/// This is an interface adapter that translates HTTP requests to the dispatcher

use crate::domain::entities::{HttpRequest, HttpResponse};
use crate::use_cases::DispatchRequestUseCase;
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Largest request body the server reads.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// HTTP server state
#[derive(Clone)]
pub struct HttpServerState {
    dispatcher: Arc<DispatchRequestUseCase>,
}

impl HttpServerState {
    pub fn new(dispatcher: Arc<DispatchRequestUseCase>) -> Self {
        Self { dispatcher }
    }

    pub fn create_router(self) -> Router {
        Router::new()
            .route("/*path", any(dispatch_handler))
            .fallback(dispatch_handler)
            .layer(TraceLayer::new_for_http())
            .with_state(self)
    }
}

/// Handle incoming HTTP requests
async fn dispatch_handler(
    State(state): State<HttpServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    tracing::debug!("Received {} request for {}", method, uri.path());

    // Convert Axum types to domain types
    let domain_request = match convert_to_domain_request(method, uri, headers, body).await {
        Ok(req) => req,
        Err(e) => {
            tracing::error!("Failed to convert request: {}", e);
            return (StatusCode::BAD_REQUEST, format!("Invalid request: {}", e)).into_response();
        }
    };

    // A dispatch runs to completion on the blocking pool
    let dispatcher = state.dispatcher.clone();
    match tokio::task::spawn_blocking(move || dispatcher.execute(&domain_request)).await {
        Ok(domain_response) => convert_to_axum_response(domain_response),
        Err(e) => {
            tracing::error!("Dispatch task failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

/// Convert Axum request to domain request
async fn convert_to_domain_request(
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Result<HttpRequest, String> {
    use axum::body::to_bytes;

    let body_bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| format!("Failed to read body: {}", e))?
        .to_vec();

    let target = uri
        .path_and_query()
        .map(|target| target.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());

    let request = headers
        .iter()
        .filter_map(|(k, v)| {
            v.to_str()
                .ok()
                .map(|v| (k.as_str().to_string(), v.to_string()))
        })
        .fold(HttpRequest::new(method.as_str(), target), |request, (name, value)| {
            request.with_header(name, value)
        });

    Ok(request.with_body(body_bytes))
}

/// Convert domain response to Axum response
fn convert_to_axum_response(domain_response: HttpResponse) -> Response {
    let mut response_builder = Response::builder()
        .status(StatusCode::from_u16(domain_response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR));

    for (key, value) in domain_response.headers {
        response_builder = response_builder.header(key, value);
    }

    response_builder
        .body(Body::from(domain_response.body))
        .unwrap_or_else(|e| {
            tracing::error!("Failed to build response: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        })
}
