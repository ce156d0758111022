use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use carnival_core::{CarnivalError, SiteMode};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Carnival(#[from] CarnivalError),
    /// The body, path or query string could not be parsed.
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
    #[error("{0}")]
    Unauthenticated(String),
    #[error("site is not live")]
    SiteClosed(SiteMode),
    #[error("sync is not configured on this server")]
    SyncUnavailable,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Shape errors axum reports as 422 are plain validation failures here.
    fn rejected(status: StatusCode, message: String) -> Self {
        let status = if status == StatusCode::UNPROCESSABLE_ENTITY {
            StatusCode::BAD_REQUEST
        } else {
            status
        };
        AppError::Rejected { status, message }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::rejected(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::rejected(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::rejected(rejection.status(), rejection.body_text())
    }
}

fn internal(err: &dyn std::fmt::Display) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Carnival(err) => match err {
                CarnivalError::MissingIdentityFields { .. }
                | CarnivalError::NoClub
                | CarnivalError::InvalidMerge(_) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
                }
                CarnivalError::DuplicateConflict { existing_id } => {
                    let body = json!({
                        "error": err.to_string(),
                        "code": "DUPLICATE_CONFLICT",
                        "existingId": existing_id,
                    });
                    return (StatusCode::CONFLICT, Json(body)).into_response();
                }
                CarnivalError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
                CarnivalError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN", err.to_string()),
                CarnivalError::Store(store) => internal(store),
            },
            AppError::Rejected { status, message } => (*status, "VALIDATION_ERROR", message.clone()),
            AppError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", msg.clone()),
            AppError::SiteClosed(SiteMode::ComingSoon) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "COMING_SOON",
                "The carnival directory is coming soon.".to_string(),
            ),
            AppError::SiteClosed(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "MAINTENANCE",
                "The carnival directory is down for maintenance.".to_string(),
            ),
            AppError::SyncUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "SYNC_UNAVAILABLE", self.to_string())
            }
            AppError::Internal(err) => internal(&format!("{err:#}")),
        };

        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carnival_core::StoreError;

    #[test]
    fn status_codes_follow_error_kind() {
        let cases = [
            (AppError::from(CarnivalError::NoClub), StatusCode::BAD_REQUEST),
            (
                AppError::from(CarnivalError::DuplicateConflict { existing_id: 4 }),
                StatusCode::CONFLICT,
            ),
            (AppError::from(CarnivalError::NotFound(9)), StatusCode::NOT_FOUND),
            (
                AppError::from(CarnivalError::Forbidden("admins only".into())),
                StatusCode::FORBIDDEN,
            ),
            (
                AppError::from(CarnivalError::Store(StoreError::Vanished(1))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (AppError::SiteClosed(SiteMode::Maintenance), StatusCode::SERVICE_UNAVAILABLE),
            (
                AppError::rejected(StatusCode::UNPROCESSABLE_ENTITY, "bad date".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::rejected(StatusCode::UNSUPPORTED_MEDIA_TYPE, "not json".into()),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
