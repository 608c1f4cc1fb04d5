//! Mock fixture servers standing in for the upstreams of the orders service.
//!
//! One server process simulates one [`Upstream`]. Each upstream is just a
//! [`RouteTable`]: a fixed list of routes answering canned or templated JSON
//! (see [`fixtures`]). Nothing is stored between requests.

use axum::{
    Json, Router,
    extract::Path,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{MethodFilter, MethodRouter, get, on},
};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::error;

pub mod fixtures;

/// An upstream service of the orders service.
#[derive(
    Clone,
    Copy,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Debug,
    Display,
    EnumString,
    EnumIter,
    clap::ValueEnum,
)]
#[strum(serialize_all = "snake_case")]
pub enum Upstream {
    /// Customers, their addresses and their cards.
    Accounts,
    Carts,
    Payment,
    Shipping,
}

impl Upstream {
    /// The environment variable that selects the upstream in the
    /// `mock-upstream` binary.
    pub const ENV: &str = "MOCK_UPSTREAM";

    /// The hostname the orders service uses to reach this upstream.
    pub fn hostname(self) -> &'static str {
        match self {
            Upstream::Accounts => "user",
            Upstream::Carts => "carts",
            Upstream::Payment => "payment",
            Upstream::Shipping => "shipping",
        }
    }

    /// The routes this upstream answers.
    pub fn routes(self) -> RouteTable {
        use ContentType::{HalJson, Json};
        use Responder::{Echo, Static, Templated};

        let routes = match self {
            Upstream::Accounts => vec![
                Route::new(Verb::Get, "/customers/{id}", Templated(fixtures::customer, HalJson)),
                Route::new(Verb::Get, "/addresses/{id}", Templated(fixtures::address, HalJson)),
                Route::new(Verb::Get, "/cards/{id}", Templated(fixtures::card, HalJson)),
            ],
            Upstream::Carts => vec![
                Route::new(Verb::Get, "/carts/{id}", Templated(fixtures::cart, HalJson)),
                Route::new(Verb::Get, "/carts/{id}/items", Templated(fixtures::cart_items, Json)),
            ],
            Upstream::Payment => vec![Route::new(
                Verb::Post,
                "/paymentAuth",
                Static(fixtures::payment_authorised, Json),
            )],
            Upstream::Shipping => vec![Route::new(Verb::Post, "/shipping", Echo)],
        };
        RouteTable { routes }
    }
}

/// Content types answered by the fixture servers.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Display)]
pub enum ContentType {
    #[strum(serialize = "application/json")]
    Json,
    #[strum(serialize = "application/hal+json")]
    HalJson,
}

/// HTTP methods used by the fixture routes.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Post,
}

impl Verb {
    fn filter(self) -> MethodFilter {
        match self {
            Verb::Get => MethodFilter::GET,
            Verb::Post => MethodFilter::POST,
        }
    }
}

/// How a route builds its response.
#[derive(Clone, Copy, Debug)]
pub enum Responder {
    /// A payload derived only from the single path parameter.
    Templated(fn(&str) -> Value, ContentType),

    /// The same payload for every request.
    Static(fn() -> Value, ContentType),

    /// The JSON request body, sent back unchanged.
    Echo,
}

/// One entry in a [`RouteTable`].
#[derive(Clone, Copy, Debug)]
pub struct Route {
    pub verb: Verb,

    /// Path pattern in `axum` syntax, e.g. `/carts/{id}`.
    pub path: &'static str,

    pub responder: Responder,
}

impl Route {
    pub fn new(verb: Verb, path: &'static str, responder: Responder) -> Self {
        Self {
            verb,
            path,
            responder,
        }
    }

    fn method_router(self) -> MethodRouter {
        let filter = self.verb.filter();
        match self.responder {
            Responder::Templated(template, content_type) => {
                on(filter, move |Path(id): Path<String>| async move {
                    FixtureResponse::json(&template(&id), content_type)
                })
            }
            Responder::Static(payload, content_type) => on(filter, move || async move {
                FixtureResponse::json(&payload(), content_type)
            }),
            Responder::Echo => on(filter, |Json(body): Json<Value>| async move {
                FixtureResponse::json(&body, ContentType::Json)
            }),
        }
    }
}

/// The routes of one simulated upstream.
#[derive(Clone, Debug)]
pub struct RouteTable {
    pub routes: Vec<Route>,
}

impl RouteTable {
    /// Build a router answering the table, plus `GET /health`.
    pub fn into_router(self) -> Router {
        self.routes
            .into_iter()
            .fold(
                Router::new().route("/health", get(|| async { "ok" })),
                |router, route| router.route(route.path, route.method_router()),
            )
            .layer(TraceLayer::new_for_http())
    }
}

/// The router for a simulated upstream.
pub fn router(upstream: Upstream) -> Router {
    upstream.routes().into_router()
}

/// Serve the simulated upstream on the listener until the process exits.
pub async fn serve(listener: TcpListener, upstream: Upstream) -> std::io::Result<()> {
    axum::serve(listener, router(upstream)).await
}

#[derive(Debug)]
pub enum FixtureResponse {
    Success(Vec<u8>, ContentType),
    Error(serde_json::Error),
}

impl FixtureResponse {
    fn json(payload: &Value, content_type: ContentType) -> Self {
        match serde_json::to_vec(payload) {
            Ok(body) => FixtureResponse::Success(body, content_type),
            Err(err) => FixtureResponse::Error(err),
        }
    }
}

impl IntoResponse for FixtureResponse {
    fn into_response(self) -> axum::response::Response {
        match self {
            FixtureResponse::Success(body, content_type) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, content_type.to_string())],
                body,
            )
                .into_response(),
            FixtureResponse::Error(err) => {
                error!(?err, "serialize fixture");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:?}")).into_response()
            }
        }
    }
}
