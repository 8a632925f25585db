//! Project management handlers.

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::NaiveDateTime;
use diesel::dsl::count_star;
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
    handlers::members::{load_members, MemberResponse},
    helpers::{double_option, normalize_project_key},
    middleware::CurrentUser,
    models::{
        MemberRole, NewProject, NewProjectMember, Project, ProjectChangeset, ProjectMember,
    },
    schema::{issues, project_members, projects},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 100, message = "must be 1 to 100 characters"))]
    #[schema(example = "Web Platform")]
    pub name: String,
    #[validate(length(min = 1, max = 10, message = "must be 1 to 10 characters"))]
    #[schema(example = "WEB")]
    pub key: String,
    #[schema(example = "Main web application platform")]
    pub description: Option<String>,
}

/// Partial project edit. Omitted fields are left alone; `"description": null`
/// clears the description.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProjectRequest {
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>, example = "Web Platform v2")]
    pub name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectDetailResponse {
    pub id: Uuid,
    #[schema(example = "Web Platform")]
    pub name: String,
    #[schema(example = "WEB")]
    pub key: String,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
    pub members: Vec<MemberResponse>,
}

impl ProjectDetailResponse {
    fn new(project: Project, members: Vec<MemberResponse>) -> Self {
        Self {
            id: project.id,
            name: project.name,
            key: project.key,
            description: project.description,
            created_at: project.created_at,
            members,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectSummary {
    pub id: Uuid,
    #[schema(example = "Web Platform")]
    pub name: String,
    #[schema(example = "WEB")]
    pub key: String,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
    /// The caller's role in this project.
    pub role: MemberRole,
    #[schema(example = 12)]
    pub issue_count: i64,
    #[schema(example = 3)]
    pub member_count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectListResponse {
    pub data: Vec<ProjectSummary>,
}

#[utoipa::path(
    post,
    path = "/projects",
    tag = "Projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 200, description = "Project created; caller becomes maintainer", body = ProjectDetailResponse),
        (status = 400, description = "Invalid input or key already exists", body = ApiError),
        (status = 401, description = "Unauthenticated", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_project(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<CreateProjectRequest>,
) -> ApiResult<Json<ProjectDetailResponse>> {
    let payload = CreateProjectRequest {
        name: payload.name.trim().to_string(),
        key: normalize_project_key(&payload.key),
        description: payload.description,
    };
    payload.validate()?;

    let mut conn = get_db_conn(&state.db_pool)?;
    let response = db::transaction(&mut conn, |conn| {
        let key_taken: bool = diesel::select(diesel::dsl::exists(
            projects::table.filter(projects::key.eq(&payload.key)),
        ))
        .get_result(conn)?;
        if key_taken {
            return Err(AppError::conflict("Project key already exists"));
        }

        let project = diesel::insert_into(projects::table)
            .values(NewProject {
                name: payload.name.clone(),
                key: payload.key.clone(),
                description: payload.description.clone(),
            })
            .returning(Project::as_returning())
            .get_result(conn)?;

        diesel::insert_into(project_members::table)
            .values(NewProjectMember {
                project_id: project.id,
                user_id: current.id(),
                role: MemberRole::Maintainer,
            })
            .execute(conn)?;

        let members = load_members(conn, project.id)?;
        Ok(ProjectDetailResponse::new(project, members))
    })?;

    info!(
        project_id = %response.id,
        key = %response.key,
        created_by = %current.id(),
        "Project created"
    );

    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/projects",
    tag = "Projects",
    responses(
        (status = 200, description = "Projects the caller belongs to", body = ProjectListResponse),
        (status = 401, description = "Unauthenticated", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Json<ProjectListResponse>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let data = db::read_only(&mut conn, |conn| {
        let rows: Vec<(Project, ProjectMember)> = projects::table
            .inner_join(project_members::table)
            .filter(project_members::user_id.eq(current.id()))
            .order((projects::created_at.desc(), projects::id.asc()))
            .select((Project::as_select(), ProjectMember::as_select()))
            .load(conn)?;

        let ids: Vec<Uuid> = rows.iter().map(|(p, _)| p.id).collect();

        let issue_counts: HashMap<Uuid, i64> = issues::table
            .filter(issues::project_id.eq_any(ids.clone()))
            .group_by(issues::project_id)
            .select((issues::project_id, count_star()))
            .load::<(Uuid, i64)>(conn)?
            .into_iter()
            .collect();

        let member_counts: HashMap<Uuid, i64> = project_members::table
            .filter(project_members::project_id.eq_any(ids))
            .group_by(project_members::project_id)
            .select((project_members::project_id, count_star()))
            .load::<(Uuid, i64)>(conn)?
            .into_iter()
            .collect();

        Ok(rows
            .into_iter()
            .map(|(project, membership)| ProjectSummary {
                issue_count: issue_counts.get(&project.id).copied().unwrap_or(0),
                member_count: member_counts.get(&project.id).copied().unwrap_or(0),
                role: membership.role,
                id: project.id,
                name: project.name,
                key: project.key,
                description: project.description,
                created_at: project.created_at,
            })
            .collect::<Vec<_>>())
    })?;

    Ok(Json(ProjectListResponse { data }))
}

#[utoipa::path(
    get,
    path = "/projects/{project_id}",
    tag = "Projects",
    params(("project_id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project with its members", body = ProjectDetailResponse),
        (status = 401, description = "Unauthenticated", body = ApiError),
        (status = 403, description = "Not a member", body = ApiError),
        (status = 404, description = "Project not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_project(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<ProjectDetailResponse>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let response = db::read_only(&mut conn, |conn| {
        let access = authorize_project(conn, current.id(), project_id, Capability::MEMBER)?;
        let members = load_members(conn, project_id)?;
        Ok(ProjectDetailResponse::new(access.project, members))
    })?;

    Ok(Json(response))
}

#[utoipa::path(
    patch,
    path = "/projects/{project_id}",
    tag = "Projects",
    params(("project_id" = Uuid, Path, description = "Project ID")),
    request_body = UpdateProjectRequest,
    responses(
        (status = 200, description = "Project updated", body = ProjectDetailResponse),
        (status = 400, description = "Invalid input", body = ApiError),
        (status = 401, description = "Unauthenticated", body = ApiError),
        (status = 403, description = "Caller is not a maintainer", body = ApiError),
        (status = 404, description = "Project not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_project(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<UpdateProjectRequest>,
) -> ApiResult<Json<ProjectDetailResponse>> {
    let name = match payload.name {
        None => None,
        Some(None) => return Err(AppError::validation("name cannot be null")),
        Some(Some(name)) => {
            let name = name.trim().to_string();
            if name.is_empty() || name.chars().count() > 100 {
                return Err(AppError::validation("name must be 1 to 100 characters"));
            }
            Some(name)
        }
    };
    let changes = ProjectChangeset {
        name,
        description: payload.description,
    };

    let mut conn = get_db_conn(&state.db_pool)?;
    let response = db::transaction(&mut conn, |conn| {
        let access = authorize_project(conn, current.id(), project_id, Capability::MAINTAIN)?;

        let project = if changes.name.is_none() && changes.description.is_none() {
            access.project
        } else {
            diesel::update(projects::table.find(project_id))
                .set(&changes)
                .returning(Project::as_returning())
                .get_result(conn)?
        };

        let members = load_members(conn, project_id)?;
        Ok(ProjectDetailResponse::new(project, members))
    })?;

    info!(project_id = %project_id, updated_by = %current.id(), "Project updated");

    Ok(Json(response))
}

#[utoipa::path(
    delete,
    path = "/projects/{project_id}",
    tag = "Projects",
    params(("project_id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 204, description = "Project and everything in it deleted"),
        (status = 401, description = "Unauthenticated", body = ApiError),
        (status = 403, description = "Caller is not a maintainer", body = ApiError),
        (status = 404, description = "Project not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_project(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let mut conn = get_db_conn(&state.db_pool)?;

    db::transaction(&mut conn, |conn| {
        authorize_project(conn, current.id(), project_id, Capability::MAINTAIN)?;
        diesel::delete(projects::table.find(project_id)).execute(conn)?;
        Ok(())
    })?;

    info!(project_id = %project_id, deleted_by = %current.id(), "Project deleted");

    Ok(StatusCode::NO_CONTENT)
}
