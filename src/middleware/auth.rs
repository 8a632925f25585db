//! Authentication middleware.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use diesel::prelude::*;
use tracing::debug;
use uuid::Uuid;

use crate::{
    db::get_db_conn,
    error::{ApiResult, AppError},
    models::User,
    schema::users,
    telemetry::{record_auth_attempt, AuthOutcome},
    AppState,
};

/// The authenticated caller, resolved from the bearer token.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn id(&self) -> Uuid {
        self.0.id
    }
}

fn bearer_token(req: &Request) -> ApiResult<&str> {
    let value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::unauthenticated("Missing authorization header"))?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or_else(|| AppError::unauthenticated("Invalid authorization header format"))?;

    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(AppError::unauthenticated(
            "Invalid authorization header format",
        ));
    }

    Ok(token.trim())
}

/// Verifies the access token, loads its user and stores it as a
/// [`CurrentUser`] extension. A token for a deleted user is rejected.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req)?;

    let claims = state.jwt.verify_access_token(token).map_err(|e| {
        debug!(error = %e, "Token verification failed");
        record_auth_attempt("token", AuthOutcome::InvalidToken);
        AppError::unauthenticated("Invalid or expired token")
    })?;

    let user_id = claims
        .user_id()
        .ok_or_else(|| AppError::unauthenticated("Invalid token subject"))?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let user = users::table
        .find(user_id)
        .select(User::as_select())
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| {
            record_auth_attempt("token", AuthOutcome::UnknownUser);
            AppError::unauthenticated("User no longer exists")
        })?;
    drop(conn);

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with(value: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/me");
        if let Some(v) = value {
            builder = builder.header(header::AUTHORIZATION, v);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(bearer_token(&request_with(Some("Bearer abc"))).unwrap(), "abc");
        assert_eq!(bearer_token(&request_with(Some("bearer abc"))).unwrap(), "abc");
    }

    #[test]
    fn test_bearer_token_rejections() {
        for value in [None, Some("abc"), Some("Basic abc"), Some("Bearer   ")] {
            let err = bearer_token(&request_with(value)).unwrap_err();
            assert!(matches!(err, AppError::Unauthenticated(_)));
        }
    }
}
