//! Resolves the acting user for a request.
//!
//! Authentication happens upstream; this layer trusts the `x-user-id` header
//! and looks the user and their club up through the store.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use carnival_core::{ActingUser, CarnivalError, UserId};

use crate::error::AppError;
use crate::AppState;

pub const USER_HEADER: &str = "x-user-id";

#[derive(Debug, Clone)]
pub struct CurrentUser(pub ActingUser);

impl CurrentUser {
    pub fn require_admin(&self) -> Result<&ActingUser, AppError> {
        if !self.0.is_admin {
            return Err(CarnivalError::Forbidden("Administrator access required.".into()).into());
        }
        Ok(&self.0)
    }
}

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthenticated(format!("Missing {USER_HEADER} header")))?;
        let user_id: UserId = raw
            .trim()
            .parse()
            .map_err(|_| AppError::Unauthenticated(format!("Invalid {USER_HEADER} header")))?;

        let user = state
            .service
            .store()
            .find_acting_user(user_id)
            .await
            .map_err(CarnivalError::from)?
            .ok_or_else(|| AppError::Unauthenticated("Unknown or inactive user".into()))?;
        Ok(CurrentUser(user))
    }
}
