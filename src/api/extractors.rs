//! Caller identity extraction.
//!
//! Tokens are checked by the gateway in front of this service, which forwards
//! the caller as `x-user-id` (and `x-user-role: admin` for staff).

use crate::api::error::AuthenticationRequired;
use crate::orders::Caller;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The caller forwarded by the gateway
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub Caller);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .ok_or(AuthenticationRequired)?;

        let is_admin = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|role| role.trim().eq_ignore_ascii_case("admin"))
            .unwrap_or(false);

        Ok(AuthenticatedUser(Caller { user_id, is_admin }))
    }
}
