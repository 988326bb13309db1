//! Boundary guard for superadmin-only endpoints.
//!
//! Identity and role are established by the upstream gateway, which forwards
//! a shared secret in `x-admin-token`. A matching token is turned into a
//! `Superadmin` marker; nothing downstream re-checks it.

use crate::{AppState, errors::AppError, services::bucket_migrator::Superadmin};
use axum::{extract::FromRequestParts, http::request::Parts};
use subtle::ConstantTimeEq;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

pub struct AdminCaller(pub Superadmin);

impl FromRequestParts<AppState> for AdminCaller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.settings.admin_token.as_deref() else {
            return Err(AppError::forbidden("superadmin endpoints are disabled"));
        };
        let presented = parts
            .headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("missing admin token"))?;

        if !constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
            tracing::warn!("rejected superadmin call with a bad token");
            return Err(AppError::forbidden("invalid admin token"));
        }
        Ok(AdminCaller(Superadmin::vouched()))
    }
}

/// Token comparison that takes the same time wherever the first mismatch is.
/// A length mismatch still runs a comparison before answering.
fn constant_time_eq(presented: &[u8], expected: &[u8]) -> bool {
    if presented.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    presented.ct_eq(expected).into()
}

#[cfg(test)]
mod tests {
    use super::constant_time_eq;

    #[test]
    fn compares_tokens() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret2"));
        assert!(!constant_time_eq(b"", b"secret"));
    }
}
