use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::api::handler::AppState;
use crate::error::{AppError, AppResult};

/// Process-wide request limiter for the HTTP surface
pub struct RateLimitLayer {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl RateLimitLayer {
    pub fn per_minute(requests: u32) -> AppResult<Self> {
        let requests = NonZeroU32::new(requests)
            .ok_or_else(|| AppError::Config("API rate limit must be greater than zero".to_string()))?;

        Ok(RateLimitLayer {
            limiter: RateLimiter::direct(Quota::per_minute(requests)),
        })
    }

    pub fn check(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    if !state.rate_limiter.check() {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded. Please try again later.",
        )
            .into_response();
    }

    next.run(req).await
}
