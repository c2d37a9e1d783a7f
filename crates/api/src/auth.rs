//! Request identity
//!
//! Authentication happens upstream; the proxy forwards the authenticated
//! user in the `X-User-Id` header.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use storage::UserId;

use crate::error::ApiError;

pub const USER_HEADER: &str = "x-user-id";

/// The user a request acts for
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| CurrentUser(UserId::new(v)))
            .ok_or_else(|| ApiError::unauthorized("Missing X-User-Id header"))
    }
}
