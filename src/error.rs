use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde_json::json;

use crate::rules::time_accumulator::TrackingError;

pub type AppResult<T> = Result<T, AppError>;

/// MySQL reports unique-key violations with SQLSTATE 23000.
const DUPLICATE_KEY: &str = "23000";

#[derive(Debug, Display)]
pub enum AppError {
    #[display(fmt = "{}", _0)]
    Validation(String),

    #[display(fmt = "{}", _0)]
    Unauthorized(String),

    #[display(fmt = "{}", _0)]
    Forbidden(String),

    #[display(fmt = "{}", _0)]
    NotFound(String),

    #[display(fmt = "{}", _0)]
    Conflict(String),

    #[display(fmt = "Database error: {}", _0)]
    Database(sqlx::Error),

    #[display(fmt = "{}", _0)]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict(message.into())
    }

    /// Maps a unique-key violation to `Conflict(message)`, anything else to
    /// `Database`.
    pub fn from_db_with_conflict(e: sqlx::Error, message: &str) -> Self {
        if is_duplicate_key(&e) {
            AppError::Conflict(message.to_string())
        } else {
            AppError::Database(e)
        }
    }
}

pub fn is_duplicate_key(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some(DUPLICATE_KEY),
        _ => false,
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Database(e)
    }
}

impl From<TrackingError> for AppError {
    fn from(e: TrackingError) -> Self {
        match e {
            TrackingError::AlreadyTracking => AppError::Conflict(e.to_string()),
            TrackingError::NotTracking => AppError::Validation(e.to_string()),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            AppError::Database(e) => {
                tracing::error!(error = %e, "Database operation failed");
                json!({ "message": "Database operation failed", "details": e.to_string() })
            }
            AppError::Internal(e) => {
                tracing::error!(error = %e, "Internal error");
                json!({ "message": "Internal Server Error" })
            }
            other => json!({ "message": other.to_string() }),
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(AppError::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::forbidden("x").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::conflict("x").status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::Database(sqlx::Error::RowNotFound).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn tracking_errors_map_to_client_errors() {
        assert_eq!(
            AppError::from(TrackingError::AlreadyTracking).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(TrackingError::NotTracking).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn non_database_errors_are_not_conflicts() {
        assert!(!is_duplicate_key(&sqlx::Error::RowNotFound));
        assert!(matches!(
            AppError::from_db_with_conflict(sqlx::Error::RowNotFound, "dup"),
            AppError::Database(_)
        ));
    }

    #[actix_web::test]
    async fn database_errors_surface_details() {
        let resp = AppError::Database(sqlx::Error::RowNotFound).error_response();
        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "Database operation failed");
        assert!(json["details"].as_str().unwrap().contains("no rows"));
    }

    #[actix_web::test]
    async fn validation_message_is_returned_verbatim() {
        let resp = AppError::validation("Task title is required").error_response();
        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "Task title is required");
    }
}
