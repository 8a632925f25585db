//! Shared error handling utilities.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::auth::password::PasswordPolicyError;
use crate::models::UnknownVariant;

/// JSON body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    #[schema(example = "Issue not found")]
    pub error: String,
    #[schema(example = "NOT_FOUND")]
    pub code: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Issue was modified concurrently (current version {current})")]
    StaleWrite { current: i32 },

    #[error("Database error")]
    Database(#[source] DieselError),

    #[error("Database unavailable")]
    Pool(#[source] diesel::r2d2::PoolError),

    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, AppError>;

impl AppError {
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        AppError::Unauthenticated(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AppError::Internal(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::BAD_REQUEST,
            AppError::StaleWrite { .. } => StatusCode::CONFLICT,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Pool(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated(_) => "UNAUTHENTICATED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Conflict(_) => "CONFLICT",
            AppError::StaleWrite { .. } => "STALE_WRITE",
            AppError::Database(_) => "DB_ERROR",
            AppError::Pool(_) => "DB_UNAVAILABLE",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            AppError::Database(e) => error!(error = %e, "Database error"),
            AppError::Pool(e) => error!(error = %e, "Database connection error"),
            AppError::Internal(msg) => error!(error = %msg, "Internal error"),
            _ => {}
        }

        let body = Json(ApiError::new(self.to_string(), self.code()));

        if let AppError::Unauthenticated(_) = self {
            return (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response();
        }

        (status, body).into_response()
    }
}

impl From<DieselError> for AppError {
    fn from(e: DieselError) -> Self {
        match e {
            DieselError::NotFound => AppError::NotFound("Resource"),
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                AppError::Conflict(unique_violation_message(info.constraint_name()))
            }
            other => AppError::Database(other),
        }
    }
}

fn unique_violation_message(constraint: Option<&str>) -> String {
    match constraint {
        Some(name) if name.contains("email") => "Email already registered".to_string(),
        Some(name) if name.contains("key") && name.starts_with("projects") => {
            "Project key already exists".to_string()
        }
        Some(name) if name.starts_with("project_members") => {
            "User is already a member of this project".to_string()
        }
        _ => "Resource already exists".to_string(),
    }
}

impl From<diesel::r2d2::PoolError> for AppError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        AppError::Pool(e)
    }
}

impl From<UnknownVariant> for AppError {
    fn from(e: UnknownVariant) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<PasswordPolicyError> for AppError {
    fn from(e: PasswordPolicyError) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let detail = errs
                    .iter()
                    .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                    .next()
                    .unwrap_or_else(|| "is invalid".to_string());
                format!("{} {}", field, detail)
            })
            .collect();
        fields.sort();

        AppError::Validation(format!("Validation failed: {}", fields.join("; ")))
    }
}
