//! Issue handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    access::{authorize_issue, authorize_project, ensure_assignable, Capability, IssueAccess},
    db::{self, get_db_conn},
    error::{ApiError, ApiResult, AppError},
    helpers::{double_option, parse_timestamp},
    middleware::CurrentUser,
    models::{Issue, IssueChangeset, IssuePriority, IssueStatus, NewIssue},
    pagination::PaginatedResponse,
    query::{self, IssueListParams, IssueQuery, IssueView},
    schema::issues,
    AppState,
};

const MAX_TITLE_LENGTH: usize = 200;

/// New issue. Any `status` in the body is ignored: issues always start open.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateIssueRequest {
    #[schema(example = "Login button not responding")]
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub priority: IssuePriority,
    pub assignee_id: Option<Uuid>,
    /// RFC 3339 timestamp or `YYYY-MM-DD`.
    #[schema(example = "2024-07-01T00:00:00Z")]
    pub expected_completion_date: Option<String>,
}

/// Partial issue edit. Omitted fields are untouched; `null` clears
/// `description`, `assignee_id` and `expected_completion_date`, and is
/// rejected for `title`, `status` and `priority`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateIssueRequest {
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub title: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<IssueStatus>)]
    pub status: Option<Option<IssueStatus>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<IssuePriority>)]
    pub priority: Option<Option<IssuePriority>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<Uuid>)]
    pub assignee_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub expected_completion_date: Option<Option<String>>,
    /// Version last seen by the client. When present, the update only
    /// applies if the issue is still at this version.
    pub version: Option<i32>,
}

fn validate_title(raw: &str) -> ApiResult<String> {
    let title = raw.trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE_LENGTH {
        return Err(AppError::validation(format!(
            "title must be 1 to {} characters",
            MAX_TITLE_LENGTH
        )));
    }
    Ok(title.to_string())
}

fn validate_timestamp(raw: &str) -> ApiResult<NaiveDateTime> {
    parse_timestamp(raw).ok_or_else(|| {
        AppError::validation("expected_completion_date must be an ISO-8601 date or timestamp")
    })
}

fn required<T>(field: &str, value: Option<Option<T>>) -> ApiResult<Option<T>> {
    match value {
        Some(None) => Err(AppError::validation(format!("{} cannot be null", field))),
        Some(Some(v)) => Ok(Some(v)),
        None => Ok(None),
    }
}

impl UpdateIssueRequest {
    /// Turns the request into column updates. Any status or assignee in the
    /// payload needs the triage capability, even when it matches the stored
    /// value.
    fn into_changeset(
        self,
        conn: &mut PgConnection,
        access: &IssueAccess,
    ) -> ApiResult<IssueChangeset> {
        let issue = &access.issue;

        let title = required("title", self.title)?
            .map(|t| validate_title(&t))
            .transpose()?;
        let status = required("status", self.status)?;
        let priority = required("priority", self.priority)?;

        if status.is_some() || self.assignee_id.is_some() {
            access.require(Capability::TRIAGE)?;
        }

        if let Some(assignee_id) = self.assignee_id {
            ensure_assignable(conn, issue.project_id, assignee_id)?;
        }

        let expected_completion_date = match self.expected_completion_date {
            None => None,
            Some(None) => Some(None),
            Some(Some(raw)) => Some(Some(validate_timestamp(&raw)?)),
        };

        Ok(IssueChangeset {
            title,
            description: self.description,
            status: status.map(String::from),
            priority: priority.map(String::from),
            assignee_id: self.assignee_id,
            expected_completion_date,
            updated_at: Utc::now().naive_utc(),
        })
    }
}

#[utoipa::path(
    post,
    path = "/projects/{project_id}/issues",
    tag = "Issues",
    params(("project_id" = Uuid, Path, description = "Project ID")),
    request_body = CreateIssueRequest,
    responses(
        (status = 200, description = "Issue created with status open", body = IssueView),
        (status = 400, description = "Invalid input or assignee is not a member", body = ApiError),
        (status = 401, description = "Unauthenticated", body = ApiError),
        (status = 403, description = "Not a member", body = ApiError),
        (status = 404, description = "Project not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_issue(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<CreateIssueRequest>,
) -> ApiResult<Json<IssueView>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let view = db::transaction(&mut conn, |conn| {
        authorize_project(conn, current.id(), project_id, Capability::MEMBER)?;

        let title = validate_title(&payload.title)?;
        let expected_completion_date = payload
            .expected_completion_date
            .as_deref()
            .map(validate_timestamp)
            .transpose()?;
        ensure_assignable(conn, project_id, payload.assignee_id)?;

        let issue = diesel::insert_into(issues::table)
            .values(NewIssue {
                project_id,
                title,
                description: payload.description.clone(),
                status: IssueStatus::Open,
                priority: payload.priority,
                reporter_id: current.id(),
                assignee_id: payload.assignee_id,
                expected_completion_date,
            })
            .returning(Issue::as_returning())
            .get_result(conn)?;

        query::issue_view(conn, issue)
    })?;

    info!(
        issue_id = %view.id,
        project_id = %project_id,
        reporter_id = %current.id(),
        "Issue created"
    );

    Ok(Json(view))
}

#[utoipa::path(
    get,
    path = "/projects/{project_id}/issues",
    tag = "Issues",
    params(
        ("project_id" = Uuid, Path, description = "Project ID"),
        IssueListParams
    ),
    responses(
        (status = 200, description = "Filtered, sorted page of issues", body = PaginatedResponse<IssueView>),
        (status = 400, description = "Invalid filter, sort or page", body = ApiError),
        (status = 401, description = "Unauthenticated", body = ApiError),
        (status = 403, description = "Not a member", body = ApiError),
        (status = 404, description = "Project not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_issues(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(project_id): Path<Uuid>,
    Query(params): Query<IssueListParams>,
) -> ApiResult<Json<PaginatedResponse<IssueView>>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let page = db::read_only(&mut conn, |conn| {
        authorize_project(conn, current.id(), project_id, Capability::MEMBER)?;
        let query = IssueQuery::parse(&params)?;
        query::list_issues(conn, project_id, &query)
    })?;

    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/issues/{issue_id}",
    tag = "Issues",
    params(("issue_id" = Uuid, Path, description = "Issue ID")),
    responses(
        (status = 200, description = "Issue detail", body = IssueView),
        (status = 401, description = "Unauthenticated", body = ApiError),
        (status = 403, description = "Not a member of the issue's project", body = ApiError),
        (status = 404, description = "Issue not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_issue(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(issue_id): Path<Uuid>,
) -> ApiResult<Json<IssueView>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let view = db::read_only(&mut conn, |conn| {
        let access = authorize_issue(conn, current.id(), issue_id, Capability::MEMBER)?;
        query::issue_view(conn, access.issue)
    })?;

    Ok(Json(view))
}

#[utoipa::path(
    patch,
    path = "/issues/{issue_id}",
    tag = "Issues",
    params(("issue_id" = Uuid, Path, description = "Issue ID")),
    request_body = UpdateIssueRequest,
    responses(
        (status = 200, description = "Issue updated", body = IssueView),
        (status = 400, description = "Invalid input or assignee is not a member", body = ApiError),
        (status = 401, description = "Unauthenticated", body = ApiError),
        (status = 403, description = "Not a member, or status/assignee change without triage rights", body = ApiError),
        (status = 404, description = "Issue not found", body = ApiError),
        (status = 409, description = "Issue changed since the supplied version", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_issue(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(issue_id): Path<Uuid>,
    Json(payload): Json<UpdateIssueRequest>,
) -> ApiResult<Json<IssueView>> {
    let mut conn = get_db_conn(&state.db_pool)?;

    let view = db::transaction(&mut conn, |conn| {
        let access = authorize_issue(conn, current.id(), issue_id, Capability::MEMBER)?;

        let expected_version = payload.version;
        if let Some(expected) = expected_version {
            if expected != access.issue.version {
                return Err(AppError::StaleWrite {
                    current: access.issue.version,
                });
            }
        }

        let changes = payload.into_changeset(conn, &access)?;
        let bump = issues::version.eq(issues::version + 1);

        let updated = match expected_version {
            Some(expected) => diesel::update(
                issues::table
                    .find(issue_id)
                    .filter(issues::version.eq(expected)),
            )
            .set((&changes, bump))
            .returning(Issue::as_returning())
            .get_result(conn)
            .optional()?,
            None => diesel::update(issues::table.find(issue_id))
                .set((&changes, bump))
                .returning(Issue::as_returning())
                .get_result(conn)
                .optional()?,
        };

        let issue = match updated {
            Some(issue) => issue,
            None => {
                let current: i32 = issues::table
                    .find(issue_id)
                    .select(issues::version)
                    .first(conn)?;
                return Err(AppError::StaleWrite { current });
            }
        };

        query::issue_view(conn, issue)
    })?;

    info!(
        issue_id = %issue_id,
        version = view.version,
        updated_by = %current.id(),
        "Issue updated"
    );

    Ok(Json(view))
}

#[utoipa::path(
    delete,
    path = "/issues/{issue_id}",
    tag = "Issues",
    params(("issue_id" = Uuid, Path, description = "Issue ID")),
    responses(
        (status = 204, description = "Issue and its comments deleted"),
        (status = 401, description = "Unauthenticated", body = ApiError),
        (status = 403, description = "Caller is neither maintainer nor reporter", body = ApiError),
        (status = 404, description = "Issue not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_issue(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(issue_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let mut conn = get_db_conn(&state.db_pool)?;

    db::transaction(&mut conn, |conn| {
        authorize_issue(conn, current.id(), issue_id, Capability::TRIAGE)?;
        diesel::delete(issues::table.find(issue_id)).execute(conn)?;
        Ok(())
    })?;

    info!(issue_id = %issue_id, deleted_by = %current.id(), "Issue deleted");

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_body_tracks_presence() {
        let body: UpdateIssueRequest =
            serde_json::from_str(r#"{"assignee_id": null, "priority": "high"}"#).unwrap();

        assert_eq!(body.assignee_id, Some(None));
        assert_eq!(body.priority, Some(Some(IssuePriority::High)));
        assert_eq!(body.title, None);
        assert_eq!(body.description, None);
        assert_eq!(body.version, None);
    }

    #[test]
    fn test_create_body_ignores_status_and_defaults_priority() {
        let body: CreateIssueRequest =
            serde_json::from_str(r#"{"title": "Crash on save", "status": "closed"}"#).unwrap();

        assert_eq!(body.priority, IssuePriority::Medium);
        assert!(body.assignee_id.is_none());
    }

    #[test]
    fn test_required_rejects_explicit_null() {
        assert!(required::<String>("title", Some(None)).is_err());
        assert_eq!(required::<String>("title", None).unwrap(), None);
        assert_eq!(
            required("title", Some(Some("x".to_string()))).unwrap(),
            Some("x".to_string())
        );
    }

    #[test]
    fn test_validate_title() {
        assert_eq!(validate_title("  Fix me  ").unwrap(), "Fix me");
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(201)).is_err());
        assert!(validate_title(&"x".repeat(200)).is_ok());
    }
}
