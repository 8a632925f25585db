//! Project member management handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    access::{authorize_project, Capability},
    db::{self, get_db_conn},
    error::{ApiError, ApiResult, AppError},
    helpers::normalize_email,
    middleware::CurrentUser,
    models::{MemberRole, NewProjectMember, ProjectMember, UserSummary},
    schema::{project_members, users},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddMemberRequest {
    #[validate(email(message = "is not a valid email address"))]
    #[schema(example = "jane@example.com")]
    pub email: String,
    #[serde(default)]
    pub role: MemberRole,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MemberResponse {
    pub user: UserSummary,
    pub role: MemberRole,
    pub joined_at: NaiveDateTime,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MembersListResponse {
    pub data: Vec<MemberResponse>,
}

/// Members of a project with their users, ordered by name.
pub fn load_members(conn: &mut PgConnection, project_id: Uuid) -> ApiResult<Vec<MemberResponse>> {
    let rows: Vec<(ProjectMember, UserSummary)> = project_members::table
        .inner_join(users::table)
        .filter(project_members::project_id.eq(project_id))
        .order((users::name.asc(), users::id.asc()))
        .select((ProjectMember::as_select(), UserSummary::as_select()))
        .load(conn)?;

    Ok(rows
        .into_iter()
        .map(|(member, user)| MemberResponse {
            user,
            role: member.role,
            joined_at: member.joined_at,
        })
        .collect())
}

#[utoipa::path(
    post,
    path = "/projects/{project_id}/members",
    tag = "Members",
    params(("project_id" = Uuid, Path, description = "Project ID")),
    request_body = AddMemberRequest,
    responses(
        (status = 201, description = "Member added", body = MemberResponse),
        (status = 400, description = "Invalid input or already a member", body = ApiError),
        (status = 401, description = "Unauthenticated", body = ApiError),
        (status = 403, description = "Caller is not a maintainer", body = ApiError),
        (status = 404, description = "Project or user not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn add_project_member(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<AddMemberRequest>,
) -> ApiResult<(StatusCode, Json<MemberResponse>)> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let member = db::transaction(&mut conn, |conn| {
        authorize_project(conn, current.id(), project_id, Capability::MAINTAIN)?;

        let email = normalize_email(&payload.email);
        AddMemberRequest {
            email: email.clone(),
            role: payload.role,
        }
        .validate()?;

        let user = users::table
            .filter(users::email.eq(&email))
            .select(UserSummary::as_select())
            .first(conn)
            .optional()?
            .ok_or(AppError::NotFound("User with this email"))?;

        let already_member: bool = diesel::select(diesel::dsl::exists(
            project_members::table.find((project_id, user.id)),
        ))
        .get_result(conn)?;
        if already_member {
            return Err(AppError::conflict(
                "User is already a member of this project",
            ));
        }

        let member = diesel::insert_into(project_members::table)
            .values(NewProjectMember {
                project_id,
                user_id: user.id,
                role: payload.role,
            })
            .returning(ProjectMember::as_returning())
            .get_result(conn)?;

        Ok(MemberResponse {
            user,
            role: member.role,
            joined_at: member.joined_at,
        })
    })?;

    info!(
        project_id = %project_id,
        user_id = %member.user.id,
        role = %member.role,
        added_by = %current.id(),
        "Project member added"
    );

    Ok((StatusCode::CREATED, Json(member)))
}

#[utoipa::path(
    get,
    path = "/projects/{project_id}/members",
    tag = "Members",
    params(("project_id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project members", body = MembersListResponse),
        (status = 401, description = "Unauthenticated", body = ApiError),
        (status = 403, description = "Not a member", body = ApiError),
        (status = 404, description = "Project not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_project_members(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<MembersListResponse>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let data = db::read_only(&mut conn, |conn| {
        authorize_project(conn, current.id(), project_id, Capability::MEMBER)?;
        load_members(conn, project_id)
    })?;

    Ok(Json(MembersListResponse { data }))
}
