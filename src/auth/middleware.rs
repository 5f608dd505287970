// Authentication middleware for protected routes

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::{
    error::AuthError,
    models::Role,
    token::{SignedClaims, TokenService},
};

/// Identity claims published for the lifetime of one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestClaims {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub uid: String,
    pub user_type: Role,
}

impl From<SignedClaims> for RequestClaims {
    fn from(claims: SignedClaims) -> Self {
        Self {
            email: claims.email,
            first_name: claims.first_name,
            last_name: claims.last_name,
            uid: claims.uid,
            user_type: claims.user_type,
        }
    }
}

/// Claims published by `authenticate`; rejects when the middleware did not run
#[async_trait]
impl<S> FromRequestParts<S> for RequestClaims
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestClaims>()
            .cloned()
            .ok_or(AuthError::MissingToken)
    }
}

/// Pull the credential out of the Authorization header
///
/// Accepts `Bearer <token>` (any scheme case) as well as a bare token.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::InvalidToken)?
        .trim();

    if value.is_empty() {
        return Err(AuthError::MissingToken);
    }

    let token = match value.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        Some(_) => return Err(AuthError::InvalidToken),
        None if value.eq_ignore_ascii_case("bearer") => "",
        None => value,
    };

    if token.is_empty() {
        return Err(AuthError::InvalidToken);
    }

    Ok(token)
}

/// Verify the signed token on every request and publish its claims
///
/// Failures short-circuit with 401 before the handler runs.
pub async fn authenticate(
    State(tokens): State<Arc<TokenService>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let endpoint = request.uri().path().to_string();

    let claims = {
        let token = bearer_token(request.headers()).map_err(|e| {
            warn!("Rejected request to {}: {}", endpoint, e);
            e
        })?;

        tokens.verify_signed_token(token).map_err(|e| {
            warn!("Token verification failed for {}: {}", endpoint, e);
            e
        })?
    };

    debug!(
        "Authenticated uid={}, role={}, endpoint={}",
        claims.uid, claims.user_type, endpoint
    );

    request.extensions_mut().insert(RequestClaims::from(claims));
    Ok(next.run(request).await)
}
