//! Authentication handlers.

use axum::{extract::State, Extension, Json};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::password::PasswordService,
    db::{self, get_db_conn},
    error::{ApiError, ApiResult, AppError},
    helpers::normalize_email,
    middleware::CurrentUser,
    models::{NewUser, User, UserSummary},
    schema::users,
    telemetry::{record_auth_attempt, AuthOutcome},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SignupRequest {
    #[validate(length(min = 1, max = 100, message = "must be 1 to 100 characters"))]
    #[schema(example = "John Doe")]
    pub name: String,
    #[validate(
        email(message = "is not a valid email address"),
        length(max = 100, message = "must be at most 100 characters")
    )]
    #[schema(example = "john@example.com", max_length = 100)]
    pub email: String,
    #[schema(example = "password123", min_length = 8)]
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "john@example.com")]
    pub email: String,
    #[schema(example = "password123")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    #[schema(example = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9...")]
    pub access_token: String,
    #[schema(example = "bearer")]
    pub token_type: String,
    /// Token lifetime in seconds.
    #[schema(example = 604800)]
    pub expires_in: u64,
}

#[utoipa::path(
    post,
    path = "/auth/signup",
    tag = "Authentication",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "User created", body = UserSummary),
        (status = 400, description = "Invalid input or email already registered", body = ApiError),
        (status = 429, description = "Too many attempts", body = ApiError)
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> ApiResult<Json<UserSummary>> {
    let payload = SignupRequest {
        name: payload.name.trim().to_string(),
        email: normalize_email(&payload.email),
        password: payload.password,
    };
    payload.validate()?;
    state.password_policy.validate(&payload.password)?;

    let password_hash =
        PasswordService::hash_password_with_cost(&payload.password, state.password_hash_cost)
            .map_err(|e| AppError::internal(format!("Password hashing failed: {}", e)))?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let user = db::transaction(&mut conn, |conn| {
        let taken: bool = diesel::select(diesel::dsl::exists(
            users::table.filter(users::email.eq(&payload.email)),
        ))
        .get_result(conn)?;

        if taken {
            record_auth_attempt("signup", AuthOutcome::EmailTaken);
            return Err(AppError::conflict("Email already registered"));
        }

        let user = diesel::insert_into(users::table)
            .values(NewUser {
                name: payload.name.clone(),
                email: payload.email.clone(),
                password_hash,
            })
            .returning(User::as_returning())
            .get_result(conn)?;

        Ok(user)
    })?;

    record_auth_attempt("signup", AuthOutcome::Success);
    info!(user_id = %user.id, "User signed up");

    Ok(Json(user.into()))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 401, description = "Invalid credentials", body = ApiError),
        (status = 429, description = "Too many attempts", body = ApiError)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let email = normalize_email(&payload.email);

    let mut conn = get_db_conn(&state.db_pool)?;
    let user = db::read_only(&mut conn, |conn| {
        Ok(users::table
            .filter(users::email.eq(&email))
            .select(User::as_select())
            .first(conn)
            .optional()?)
    })?;
    drop(conn);

    let invalid = || {
        record_auth_attempt("login", AuthOutcome::InvalidCredentials);
        AppError::unauthenticated("Invalid email or password")
    };

    let Some(user) = user else {
        warn!("Login attempt for unknown email");
        return Err(invalid());
    };

    let valid = PasswordService::verify_password(&payload.password, &user.password_hash)
        .map_err(|e| AppError::internal(format!("Password verification failed: {}", e)))?;

    if !valid {
        warn!(user_id = %user.id, "Login attempt with wrong password");
        return Err(invalid());
    }

    let access_token = state
        .jwt
        .generate_access_token(user.id)
        .map_err(|e| AppError::internal(format!("Token generation failed: {}", e)))?;

    record_auth_attempt("login", AuthOutcome::Success);
    info!(user_id = %user.id, "User logged in");

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
        expires_in: state.jwt.access_token_expiry,
    }))
}

#[utoipa::path(
    get,
    path = "/me",
    tag = "Authentication",
    responses(
        (status = 200, description = "Current user", body = UserSummary),
        (status = 401, description = "Missing or invalid token", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn me(Extension(current): Extension<CurrentUser>) -> Json<UserSummary> {
    Json(current.0.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: String) -> SignupRequest {
        SignupRequest {
            name: "Test".to_string(),
            email,
            password: "password123".to_string(),
        }
    }

    #[test]
    fn test_signup_accepts_email_at_column_limit() {
        let email = format!("{}@example.com", "a".repeat(100 - "@example.com".len()));
        assert_eq!(email.len(), 100);
        assert!(request(email).validate().is_ok());
    }

    #[test]
    fn test_signup_rejects_email_longer_than_column() {
        let email = format!("{}@{}.com", "a".repeat(64), "b".repeat(60));
        let errors = request(email).validate().unwrap_err();
        assert!(errors.field_errors().contains_key("email"));
    }
}
