//! Caller identity forwarded by the authenticating proxy.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use checkout::{Requester, Role};
use common::UserId;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The authenticated caller, read from `x-user-id` and `x-user-role`.
///
/// A missing or malformed user id rejects the request with 401. Any role
/// other than `admin` is treated as a customer.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Requester);

impl Identity {
    pub fn user_id(&self) -> UserId {
        self.0.user_id
    }

    /// Rejects callers without the admin role.
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.0.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Admin role required".to_string()))
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized(format!("Missing {USER_ID_HEADER} header")))?
            .trim()
            .parse::<UserId>()
            .map_err(|e| ApiError::Unauthorized(format!("Invalid {USER_ID_HEADER}: {e}")))?;

        let role = match parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            Some(role) if role.trim().eq_ignore_ascii_case("admin") => Role::Admin,
            _ => Role::Customer,
        };

        Ok(Identity(Requester { user_id, role }))
    }
}
