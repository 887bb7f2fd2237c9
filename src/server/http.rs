use axum::body::{Body, Bytes, HttpBody, to_bytes};
use axum::extract::{Extension, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use futures_util::StreamExt;
use serde::Serialize;

use super::ServerConfig;
use crate::fixture::{EDGE_API_ROUTE, EDGE_ROUTE, Fixture, Fixtures, NODE_API_ROUTE, NODE_ROUTE};
use crate::signal::{AbortGuard, AbortSignal};

const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct FixtureHttpState {
    fixtures: Fixtures,
}

impl FixtureHttpState {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            fixtures: Fixtures::new(
                &config.middleware_matcher,
                config.producer,
                config.body_capacity,
            ),
        }
    }

    pub fn fixtures(&self) -> &Fixtures {
        &self.fixtures
    }
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

fn error_response(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: ErrorDetail {
                code,
                message: message.into(),
            },
        }),
    )
}

/// Builds the fixture router. Fixtures live in `state`, so a new state is a
/// clean slate.
pub fn router(state: FixtureHttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(EDGE_ROUTE, any(handle_edge_route))
        .route(NODE_ROUTE, any(handle_node_route))
        .route(EDGE_API_ROUTE, any(handle_edge_api))
        .route(NODE_API_ROUTE, any(handle_node_api))
        .fallback(handle_fallback)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            edge_middleware,
        ))
        .layer(middleware::from_fn(observe_disconnect))
        .with_state(state)
}

/// Gives every request an [`AbortSignal`] that fires once the server lets go
/// of the response body, which happens when the body finishes or the client
/// connection goes away.
///
/// Bodies of known length are already complete, so they are passed through
/// untouched and the signal fires as soon as the response leaves here.
async fn observe_disconnect(mut request: Request, next: Next) -> Response {
    let signal = AbortSignal::new();
    request.extensions_mut().insert(signal.clone());

    let response = next.run(request).await;
    let guard = AbortGuard::new(signal);
    if response.body().size_hint().exact().is_some() {
        return response;
    }
    response.map(move |body| {
        Body::from_stream(body.into_data_stream().map(move |chunk| {
            let _guard = &guard;
            chunk
        }))
    })
}

async fn edge_middleware(
    State(state): State<FixtureHttpState>,
    request: Request,
    next: Next,
) -> Response {
    let fixture = &state.fixtures.middleware;
    if request.uri().path() != fixture.route() {
        return next.run(request).await;
    }
    respond_after_body(fixture, request).await
}

async fn handle_edge_route(State(state): State<FixtureHttpState>, request: Request) -> Response {
    respond_after_body(&state.fixtures.edge_route, request).await
}

async fn handle_node_route(State(state): State<FixtureHttpState>, request: Request) -> Response {
    respond_after_body(&state.fixtures.node_route, request).await
}

// API handlers get the body already read by the extractor.
async fn handle_edge_api(
    State(state): State<FixtureHttpState>,
    Extension(signal): Extension<AbortSignal>,
    _body: Bytes,
) -> Response {
    state.fixtures.edge_api.respond(signal).await
}

async fn handle_node_api(
    State(state): State<FixtureHttpState>,
    Extension(signal): Extension<AbortSignal>,
    _body: Bytes,
) -> Response {
    state.fixtures.node_api.respond(signal).await
}

/// Reads the whole request body before branching so the end of the request
/// body is never mistaken for the connection closing.
async fn respond_after_body(fixture: &Fixture, request: Request) -> Response {
    let signal = request
        .extensions()
        .get::<AbortSignal>()
        .cloned()
        .unwrap_or_default();

    if let Err(err) = to_bytes(request.into_body(), MAX_REQUEST_BODY_BYTES).await {
        tracing::warn!(route = fixture.route(), error = %err, "failed to read request body");
        return error_response(StatusCode::BAD_REQUEST, "invalid_request", err.to_string())
            .into_response();
    }

    fixture.respond(signal).await
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn handle_fallback(request: Request) -> (StatusCode, Json<ErrorResponse>) {
    error_response(
        StatusCode::NOT_FOUND,
        "not_found",
        format!("no fixture at {}", request.uri().path()),
    )
}
