//! Identity extraction from upstream-provider headers.
//!
//! Authentication itself is an external collaborator; by the time a
//! request reaches this service, a trusted proxy has already verified the
//! caller and stamped `x-user-id` (and `x-staff` for staff identities)
//! onto the request. This extractor turns those headers into the opaque
//! authorization fact handlers work with.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{Identity, UserId};
use uuid::Uuid;

use crate::error::ApiError;

/// The authenticated caller, extracted per request.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Identity);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing x-user-id header".to_string()))?;
        let user_id = Uuid::parse_str(user_id)
            .map_err(|_| ApiError::Unauthorized("invalid x-user-id header".to_string()))?;

        let is_staff = parts
            .headers
            .get("x-staff")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Ok(Caller(Identity {
            user_id: UserId::from_uuid(user_id),
            is_staff,
        }))
    }
}

impl Caller {
    /// Rejects non-staff callers.
    pub fn require_staff(&self) -> Result<(), ApiError> {
        if self.0.is_staff {
            Ok(())
        } else {
            Err(ApiError::Forbidden("staff access required".to_string()))
        }
    }
}
