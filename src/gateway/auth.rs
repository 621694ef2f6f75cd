//! Caller identity.
//!
//! Token verification happens outside this crate. The [`authenticate`]
//! middleware only requires a bearer token to be present and asks an
//! [`IdentityResolver`] for the already-validated identity behind it. Handlers
//! take [`Identity`] as an extractor; a request without one is rejected with
//! 401 before any handler logic runs.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};

use super::error::ApiError;

/// Header carrying the user id set by an upstream authenticating proxy.
pub const HEADER_USER_ID: &str = "x-user-id";

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
}

/// Maps a bearer token (and request headers) to a validated identity.
#[async_trait::async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, token: &str, headers: &HeaderMap) -> Option<Identity>;
}

pub type ResolverState = Arc<dyn IdentityResolver>;

/// Trusts the `x-user-id` header propagated by an upstream proxy that has
/// already verified the token.
#[derive(Debug, Default, Clone)]
pub struct TrustedHeaderResolver;

#[async_trait::async_trait]
impl IdentityResolver for TrustedHeaderResolver {
    async fn resolve(&self, _token: &str, headers: &HeaderMap) -> Option<Identity> {
        // ---
        headers
            .get(HEADER_USER_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|user_id| Identity {
                user_id: user_id.to_string(),
            })
    }
}

/// Fixed token-to-user table, for development and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticTokenResolver {
    tokens: HashMap<String, String>,
}

impl StaticTokenResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), user_id.into());
        self
    }
}

#[async_trait::async_trait]
impl IdentityResolver for StaticTokenResolver {
    async fn resolve(&self, token: &str, _headers: &HeaderMap) -> Option<Identity> {
        self.tokens.get(token).map(|user_id| Identity {
            user_id: user_id.clone(),
        })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    // ---
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Middleware resolving the caller identity into the request extensions.
pub async fn authenticate(
    State(resolver): State<ResolverState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // ---
    let path = request.uri().path().to_string();

    let Some(token) = bearer_token(request.headers()).map(str::to_owned) else {
        tracing::debug!(%path, "missing or malformed Authorization header");
        return Err(ApiError::Unauthenticated);
    };

    let Some(identity) = resolver.resolve(&token, request.headers()).await else {
        tracing::warn!(%path, "no identity for bearer token");
        return Err(ApiError::Unauthenticated);
    };

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or(ApiError::Unauthenticated)
    }
}
