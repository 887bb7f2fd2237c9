//! Two-phase cancellation fixtures.
//!
//! The first request to a fixture starts a producer and streams it back. The
//! second request waits until the first connection has been observed closed
//! and the producer has cleaned up, then reports how far the producer got.

mod pipeline;

use std::fmt;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderValue, header};
use axum::response::Response;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::producer::{Producer, ProducerConfig, Readable, Streamable};
use crate::signal::AbortSignal;

pub use pipeline::MAX_BODY_CAPACITY;

pub const MIDDLEWARE_ROUTE: &str = "/middleware";
pub const EDGE_ROUTE: &str = "/edge-route";
pub const NODE_ROUTE: &str = "/node-route";
pub const EDGE_API_ROUTE: &str = "/api/edge-api";
pub const NODE_API_ROUTE: &str = "/api/node-api";

/// Every fixture route with its default matcher, in probe order.
pub const FIXTURE_ROUTES: [&str; 5] = [
    MIDDLEWARE_ROUTE,
    EDGE_ROUTE,
    NODE_ROUTE,
    EDGE_API_ROUTE,
    NODE_API_ROUTE,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Runtime {
    /// The producer stream is handed to the server as the body itself.
    Edge,
    /// The producer runs on its own task and writes into a channel body.
    Node,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    Middleware,
    RouteHandler,
    ApiHandler,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Surface {
    pub runtime: Runtime,
    pub kind: RouteKind,
}

impl Surface {
    pub const fn new(runtime: Runtime, kind: RouteKind) -> Self {
        Self { runtime, kind }
    }

    fn open(&self, config: ProducerConfig, body_capacity: usize) -> (Producer, Body) {
        match (self.runtime, self.kind) {
            (Runtime::Edge, _) => {
                let streamable = Streamable::new(config);
                let producer = streamable.producer().clone();
                (producer, Body::from_stream(streamable))
            }
            (Runtime::Node, RouteKind::ApiHandler) => {
                let readable = Readable::new(config);
                let producer = readable.producer().clone();
                (producer, pipeline::pipeline(readable, body_capacity))
            }
            (Runtime::Node, _) => {
                let streamable = Streamable::new(config);
                let producer = streamable.producer().clone();
                (producer, pipeline::pump(streamable, body_capacity))
            }
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let runtime = match self.runtime {
            Runtime::Edge => "edge",
            Runtime::Node => "node",
        };
        let kind = match self.kind {
            RouteKind::Middleware => "middleware",
            RouteKind::RouteHandler => "route",
            RouteKind::ApiHandler => "api",
        };
        write!(f, "{runtime}-{kind}")
    }
}

#[derive(Clone, Debug)]
struct Primed {
    producer: Producer,
    request_aborted: AbortSignal,
}

/// One route's state machine. The primed producer lives as long as the
/// fixture does.
#[derive(Debug)]
pub struct Fixture {
    route: String,
    surface: Surface,
    producer_config: ProducerConfig,
    body_capacity: usize,
    primed: Mutex<Option<Primed>>,
}

impl Fixture {
    pub fn new(
        route: impl Into<String>,
        surface: Surface,
        producer_config: ProducerConfig,
        body_capacity: usize,
    ) -> Self {
        Self {
            route: route.into(),
            surface,
            producer_config,
            body_capacity,
            primed: Mutex::new(None),
        }
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    /// The producer started by the first request, if any.
    pub async fn producer(&self) -> Option<Producer> {
        self.primed
            .lock()
            .await
            .as_ref()
            .map(|primed| primed.producer.clone())
    }

    /// Handles one request. `request_aborted` must fire once the server
    /// stops delivering this request's response.
    pub async fn respond(&self, request_aborted: AbortSignal) -> Response {
        let primed = {
            let mut slot = self.primed.lock().await;
            if let Some(primed) = slot.clone() {
                primed
            } else {
                let (producer, body) = self.surface.open(self.producer_config, self.body_capacity);
                *slot = Some(Primed {
                    producer,
                    request_aborted,
                });
                tracing::info!(
                    route = %self.route,
                    surface = %self.surface,
                    "fixture primed"
                );
                return text_response(body);
            }
        };

        self.report(primed).await
    }

    async fn report(&self, primed: Primed) -> Response {
        let ((), completion) = tokio::join!(
            primed.request_aborted.aborted(),
            primed.producer.cleaned_up()
        );
        let value = primed.producer.value();
        tracing::info!(
            route = %self.route,
            surface = %self.surface,
            ?completion,
            value,
            "reporting producer counter"
        );
        text_response(Body::from(value.to_string()))
    }
}

fn text_response(body: Body) -> Response {
    let mut response = Response::new(body);
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// The full set of fixtures served by one router.
#[derive(Clone, Debug)]
pub struct Fixtures {
    pub middleware: Arc<Fixture>,
    pub edge_route: Arc<Fixture>,
    pub node_route: Arc<Fixture>,
    pub edge_api: Arc<Fixture>,
    pub node_api: Arc<Fixture>,
}

impl Fixtures {
    pub fn new(
        middleware_matcher: &str,
        producer_config: ProducerConfig,
        body_capacity: usize,
    ) -> Self {
        let fixture = |route: &str, runtime, kind| {
            Arc::new(Fixture::new(
                route,
                Surface::new(runtime, kind),
                producer_config,
                body_capacity,
            ))
        };

        Self {
            middleware: fixture(middleware_matcher, Runtime::Edge, RouteKind::Middleware),
            edge_route: fixture(EDGE_ROUTE, Runtime::Edge, RouteKind::RouteHandler),
            node_route: fixture(NODE_ROUTE, Runtime::Node, RouteKind::RouteHandler),
            edge_api: fixture(EDGE_API_ROUTE, Runtime::Edge, RouteKind::ApiHandler),
            node_api: fixture(NODE_API_ROUTE, Runtime::Node, RouteKind::ApiHandler),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Fixture>> {
        [
            &self.middleware,
            &self.edge_route,
            &self.node_route,
            &self.edge_api,
            &self.node_api,
        ]
        .into_iter()
    }

    pub fn get(&self, route: &str) -> Option<&Arc<Fixture>> {
        self.iter().find(|fixture| fixture.route() == route)
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;
    use crate::producer::Completion;

    fn fast_fixture(runtime: Runtime, kind: RouteKind) -> Fixture {
        Fixture::new(
            "/test",
            Surface::new(runtime, kind),
            ProducerConfig {
                interval_ms: 1,
                bound: 3,
            },
            1,
        )
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf8")
    }

    #[tokio::test]
    async fn second_request_reports_after_both_signals() {
        for (runtime, kind) in [
            (Runtime::Edge, RouteKind::Middleware),
            (Runtime::Node, RouteKind::RouteHandler),
            (Runtime::Node, RouteKind::ApiHandler),
        ] {
            let fixture = fast_fixture(runtime, kind);
            let first_aborted = AbortSignal::new();

            let first = fixture.respond(first_aborted.clone()).await;
            assert_eq!(body_text(first).await, "012");
            first_aborted.abort();

            let second = fixture.respond(AbortSignal::new()).await;
            assert_eq!(body_text(second).await, "3");

            let producer = fixture.producer().await.expect("primed");
            assert_eq!(producer.completion(), Some(Completion::Exhausted));
        }
    }

    #[tokio::test]
    async fn second_request_waits_for_request_abort() {
        let fixture = Arc::new(fast_fixture(Runtime::Edge, RouteKind::RouteHandler));
        let first_aborted = AbortSignal::new();

        let first = fixture.respond(first_aborted.clone()).await;
        drop(first);

        let waiter = {
            let fixture = fixture.clone();
            tokio::spawn(async move { fixture.respond(AbortSignal::new()).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        first_aborted.abort();
        let second = waiter.await.expect("join");
        assert_eq!(body_text(second).await, "0");
    }

    #[test]
    fn fixtures_are_found_by_route() {
        let fixtures = Fixtures::new(MIDDLEWARE_ROUTE, ProducerConfig::default(), 1);
        let routes: Vec<&str> = fixtures.iter().map(|fixture| fixture.route()).collect();
        assert_eq!(routes, FIXTURE_ROUTES);

        let node_api = fixtures.get(NODE_API_ROUTE).expect("node api");
        assert_eq!(
            node_api.surface(),
            Surface::new(Runtime::Node, RouteKind::ApiHandler)
        );
        assert_eq!(node_api.surface().to_string(), "node-api");
        assert!(fixtures.get("/nope").is_none());
    }
}
