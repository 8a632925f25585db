//! Issue comment handlers.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    access::{authorize_issue, Capability},
    db::{self, get_db_conn},
    error::{ApiError, ApiResult, AppError},
    middleware::CurrentUser,
    models::{Comment, NewComment, UserSummary},
    schema::{comments, users},
    AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCommentRequest {
    #[schema(example = "Reproduced on Firefox as well.")]
    pub body: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CommentResponse {
    pub id: Uuid,
    pub issue_id: Uuid,
    pub author_id: Uuid,
    pub author: UserSummary,
    pub body: String,
    pub created_at: NaiveDateTime,
}

impl CommentResponse {
    fn new(comment: Comment, author: UserSummary) -> Self {
        Self {
            id: comment.id,
            issue_id: comment.issue_id,
            author_id: comment.author_id,
            author,
            body: comment.body,
            created_at: comment.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CommentListResponse {
    pub data: Vec<CommentResponse>,
}

fn validate_body(raw: &str) -> ApiResult<String> {
    let body = raw.trim();
    if body.is_empty() {
        return Err(AppError::validation("body cannot be empty"));
    }
    Ok(body.to_string())
}

#[utoipa::path(
    get,
    path = "/issues/{issue_id}/comments",
    tag = "Comments",
    params(("issue_id" = Uuid, Path, description = "Issue ID")),
    responses(
        (status = 200, description = "Comments, oldest first", body = CommentListResponse),
        (status = 401, description = "Unauthenticated", body = ApiError),
        (status = 403, description = "Not a member of the issue's project", body = ApiError),
        (status = 404, description = "Issue not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_comments(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(issue_id): Path<Uuid>,
) -> ApiResult<Json<CommentListResponse>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let data = db::read_only(&mut conn, |conn| {
        authorize_issue(conn, current.id(), issue_id, Capability::MEMBER)?;

        let rows: Vec<(Comment, UserSummary)> = comments::table
            .inner_join(users::table)
            .filter(comments::issue_id.eq(issue_id))
            .order((comments::created_at.asc(), comments::id.asc()))
            .select((Comment::as_select(), UserSummary::as_select()))
            .load(conn)?;

        Ok(rows
            .into_iter()
            .map(|(comment, author)| CommentResponse::new(comment, author))
            .collect::<Vec<_>>())
    })?;

    Ok(Json(CommentListResponse { data }))
}

#[utoipa::path(
    post,
    path = "/issues/{issue_id}/comments",
    tag = "Comments",
    params(("issue_id" = Uuid, Path, description = "Issue ID")),
    request_body = CreateCommentRequest,
    responses(
        (status = 200, description = "Comment added", body = CommentResponse),
        (status = 400, description = "Empty body", body = ApiError),
        (status = 401, description = "Unauthenticated", body = ApiError),
        (status = 403, description = "Not a member of the issue's project", body = ApiError),
        (status = 404, description = "Issue not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_comment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(issue_id): Path<Uuid>,
    Json(payload): Json<CreateCommentRequest>,
) -> ApiResult<Json<CommentResponse>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let response = db::transaction(&mut conn, |conn| {
        authorize_issue(conn, current.id(), issue_id, Capability::MEMBER)?;
        let body = validate_body(&payload.body)?;

        let comment = diesel::insert_into(comments::table)
            .values(NewComment {
                issue_id,
                author_id: current.id(),
                body,
            })
            .returning(Comment::as_returning())
            .get_result(conn)?;

        Ok(CommentResponse::new(comment, current.0.clone().into()))
    })?;

    info!(
        comment_id = %response.id,
        issue_id = %issue_id,
        author_id = %current.id(),
        "Comment added"
    );

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_body_trims() {
        assert_eq!(validate_body("  looks good \n").unwrap(), "looks good");
    }

    #[test]
    fn test_validate_body_rejects_blank() {
        let err = validate_body(" \t\n").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
