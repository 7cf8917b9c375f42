//! # Authentication Module
//!
//! Optional API key authentication for the kernsync HTTP API.
//!
//! ## Configuration
//!
//! - `KERNSYNC_API_KEY`: If set, all requests (except /health) require this key
//!
//! ## Usage
//!
//! ```text
//! Authorization: Bearer <your-api-key>
//! ```

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "KERNSYNC_API_KEY";

/// Get API key from environment variable.
///
/// `None` (authentication disabled) when unset or empty.
pub fn get_api_key_from_env() -> Option<String> {
    std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty())
}

/// Constant-time key comparison over equal-length buffers.
fn keys_match(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();

    let max_len = provided.len().max(expected.len());
    let mut padded_provided = vec![0u8; max_len];
    let mut padded_expected = vec![0u8; max_len];
    padded_provided[..provided.len()].copy_from_slice(provided);
    padded_expected[..expected.len()].copy_from_slice(expected);

    let bytes_match: bool = padded_provided.ct_eq(&padded_expected).into();
    bytes_match && provided.len() == expected.len()
}

/// API key authentication middleware.
///
/// `/health` is always allowed. Both `Bearer <key>` and a raw `<key>` are
/// accepted in the `Authorization` header.
pub async fn api_key_auth_middleware(
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    let Some(expected) = get_api_key_from_env() else {
        return Ok(next.run(request).await);
    };

    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v));

    match provided {
        Some(key) if keys_match(key, &expected) => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!(
                event = "auth_failure",
                reason = "invalid_api_key",
                "Authentication failed: invalid API key"
            );
            Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
        None => {
            tracing::warn!(
                event = "auth_failure",
                reason = "missing_authorization_header",
                "Missing Authorization header"
            );
            Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_match_requires_equal_length() {
        assert!(keys_match("secret", "secret"));
        assert!(!keys_match("secret", "secret2"));
        assert!(!keys_match("", "secret"));
        assert!(!keys_match("secreT", "secret"));
    }
}
