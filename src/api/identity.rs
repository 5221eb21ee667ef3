use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::AppError;
use crate::ledger::models::OwnerId;

/// Header carrying the authenticated owner, set by the upstream auth gateway
pub const OWNER_HEADER: &str = "x-owner-id";

/// Owner of the current request
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub OwnerId);

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .map(Identity)
            .ok_or(AppError::Unauthorized)
    }
}
