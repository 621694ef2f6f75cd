//! HTTP surface of the gateway.
//!
//! Authenticated route CRUD endpoints that forward to the route service
//! through an [`RpcClient`], plus an unauthenticated health check.

pub mod auth;
pub mod contracts;
mod error;
mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::RpcClient;

pub use auth::{
    // ---
    authenticate,
    Identity,
    IdentityResolver,
    ResolverState,
    StaticTokenResolver,
    TrustedHeaderResolver,
};
pub use error::ApiError;

/// Shared handler state.
#[derive(Clone)]
pub struct GatewayState {
    pub client: RpcClient,
}

impl GatewayState {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }
}

/// Build the gateway router.
///
/// `base_path` prefixes every route (e.g. `/routes-api`). An empty string or
/// `/` mounts the routes at the root.
pub fn build_router(state: GatewayState, resolver: ResolverState, base_path: &str) -> Router {
    // ---
    let secured = Router::new()
        .route("/v1/routes", get(handlers::list_routes))
        .route("/v1/route", post(handlers::create_route))
        .route(
            "/v1/route/:id",
            get(handlers::get_route)
                .put(handlers::update_route)
                .delete(handlers::delete_route),
        )
        .with_state(state)
        .layer(middleware::from_fn_with_state(resolver, authenticate));

    let api = Router::new()
        .route("/health", get(handlers::health))
        .merge(secured);

    let router = match normalize_base_path(base_path) {
        Some(prefix) => Router::new().nest(&prefix, api),
        None => api,
    };

    router.layer(TraceLayer::new_for_http())
}

/// `"api/"` -> `Some("/api")`, `"/"` and `""` -> `None`.
fn normalize_base_path(base_path: &str) -> Option<String> {
    // ---
    let trimmed = base_path.trim().trim_matches('/');

    if trimmed.is_empty() {
        None
    } else {
        Some(format!("/{trimmed}"))
    }
}
