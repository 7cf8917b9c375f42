//! # Middleware Module
//!
//! Rate limiting for the kernsync HTTP API.
//!
//! - `KERNSYNC_RATE_LIMIT`: Requests per second (default: 20, 0 to disable)

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Default rate limit in requests per second.
const DEFAULT_RATE_LIMIT: u32 = 20;

const DEFAULT_RPS: NonZeroU32 = match NonZeroU32::new(DEFAULT_RATE_LIMIT) {
    Some(rps) => rps,
    None => NonZeroU32::MIN,
};

/// Global rate limiter type alias.
pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Create a new global rate limiter. Zero falls back to the default.
pub fn create_rate_limiter(requests_per_second: u32) -> GlobalRateLimiter {
    let rps = NonZeroU32::new(requests_per_second).unwrap_or(DEFAULT_RPS);
    Arc::new(RateLimiter::direct(Quota::per_second(rps)))
}

/// Requests per second from `KERNSYNC_RATE_LIMIT`.
pub fn get_rate_limit_from_env() -> u32 {
    std::env::var("KERNSYNC_RATE_LIMIT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_RATE_LIMIT)
}

/// Rejects requests over the global limit with 429.
pub async fn rate_limit_middleware(
    State(limiter): State<GlobalRateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    match limiter.check() {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => {
            tracing::warn!("Rate limit exceeded");
            Err((StatusCode::TOO_MANY_REQUESTS, "Too Many Requests"))
        }
    }
}
