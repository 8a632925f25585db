//! Issue listing: filtering, ordering, pagination and row hydration.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use chrono::NaiveDateTime;
use diesel::dsl::{count_star, sql};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::sql_types::Integer;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{ApiResult, AppError};
use crate::helpers::escape_like;
use crate::models::{Issue, IssuePriority, IssueStatus, UserSummary};
use crate::pagination::{Page, PaginatedResponse};
use crate::schema::{comments, issues, users};
use crate::telemetry::metrics::record_issue_query;

/// Raw query string of `GET /projects/{id}/issues`. Everything arrives as
/// text so that bad values surface as validation errors after the access
/// check instead of extractor rejections.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct IssueListParams {
    /// Case-insensitive substring of the title.
    pub q: Option<String>,
    /// open, in_progress, resolved or closed.
    pub status: Option<String>,
    /// low, medium, high or critical.
    pub priority: Option<String>,
    pub assignee_id: Option<String>,
    /// created_at (default), priority, status or updated_at.
    pub sort: Option<String>,
    /// asc or desc (default).
    pub order: Option<String>,
    #[param(minimum = 1, default = 1)]
    pub page: Option<String>,
    #[param(minimum = 1, maximum = 100, default = 20)]
    pub per_page: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    CreatedAt,
    Priority,
    Status,
    UpdatedAt,
}

impl SortKey {
    fn parse(raw: &str) -> ApiResult<Self> {
        match raw {
            "created_at" => Ok(SortKey::CreatedAt),
            "priority" => Ok(SortKey::Priority),
            "status" => Ok(SortKey::Status),
            "updated_at" => Ok(SortKey::UpdatedAt),
            other => Err(AppError::validation(format!(
                "invalid sort '{}', expected one of: created_at, priority, status, updated_at",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn parse(raw: &str) -> ApiResult<Self> {
        match raw {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(AppError::validation(format!(
                "invalid order '{}', expected asc or desc",
                other
            ))),
        }
    }
}

/// Validated listing request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssueQuery {
    pub q: Option<String>,
    pub status: Option<IssueStatus>,
    pub priority: Option<IssuePriority>,
    pub assignee_id: Option<Uuid>,
    pub sort: SortKey,
    pub order: SortOrder,
    pub page: Page,
}

fn present(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Search text is matched as sent; only an all-blank value counts as absent.
fn search_text(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().filter(|s| !s.trim().is_empty())
}

impl IssueQuery {
    pub fn parse(params: &IssueListParams) -> ApiResult<Self> {
        let assignee_id = present(&params.assignee_id)
            .map(|raw| {
                Uuid::parse_str(raw)
                    .map_err(|_| AppError::validation("assignee_id must be a UUID"))
            })
            .transpose()?;

        Ok(Self {
            q: search_text(&params.q).map(str::to_string),
            status: present(&params.status)
                .map(str::parse::<IssueStatus>)
                .transpose()?,
            priority: present(&params.priority)
                .map(str::parse::<IssuePriority>)
                .transpose()?,
            assignee_id,
            sort: present(&params.sort)
                .map(SortKey::parse)
                .transpose()?
                .unwrap_or_default(),
            order: present(&params.order)
                .map(SortOrder::parse)
                .transpose()?
                .unwrap_or_default(),
            page: Page::parse(params.page.as_deref(), params.per_page.as_deref())?,
        })
    }

    fn filtered<'a>(&self, project_id: Uuid) -> issues::BoxedQuery<'a, Pg> {
        let mut query = issues::table
            .filter(issues::project_id.eq(project_id))
            .into_boxed();

        if let Some(q) = &self.q {
            query = query.filter(issues::title.ilike(format!("%{}%", escape_like(q))));
        }
        if let Some(status) = self.status {
            query = query.filter(issues::status.eq(status.as_str()));
        }
        if let Some(priority) = self.priority {
            query = query.filter(issues::priority.eq(priority.as_str()));
        }
        if let Some(assignee_id) = self.assignee_id {
            query = query.filter(issues::assignee_id.eq(assignee_id));
        }

        query
    }

    fn ordered<'a>(&self, query: issues::BoxedQuery<'a, Pg>) -> issues::BoxedQuery<'a, Pg> {
        let asc = self.order == SortOrder::Asc;

        let query = match self.sort {
            SortKey::CreatedAt if asc => query.order_by(issues::created_at.asc()),
            SortKey::CreatedAt => query.order_by(issues::created_at.desc()),
            SortKey::UpdatedAt if asc => query.order_by(issues::updated_at.asc()),
            SortKey::UpdatedAt => query.order_by(issues::updated_at.desc()),
            SortKey::Priority | SortKey::Status => {
                let rank = sql::<Integer>(&self.rank_expression());
                if asc {
                    query.order_by(rank.asc())
                } else {
                    query.order_by(rank.desc())
                }
            }
        };

        query.then_order_by(issues::id.asc())
    }

    /// `CASE` mapping the sort column onto its declaration-order rank. Only
    /// the fixed variant names are interpolated.
    fn rank_expression(&self) -> String {
        let (column, arms): (&str, Vec<String>) = match self.sort {
            SortKey::Status => (
                "issues.status",
                IssueStatus::ALL
                    .iter()
                    .map(|s| format!("WHEN '{}' THEN {}", s.as_str(), s.rank()))
                    .collect(),
            ),
            _ => (
                "issues.priority",
                IssuePriority::ALL
                    .iter()
                    .map(|p| format!("WHEN '{}' THEN {}", p.as_str(), p.rank()))
                    .collect(),
            ),
        };

        format!("CASE {} {} END", column, arms.join(" "))
    }
}

/// An issue as returned over the API, with its people and comment count
/// resolved.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IssueView {
    pub id: Uuid,
    pub project_id: Uuid,
    #[schema(example = "Login button not responding")]
    pub title: String,
    pub description: Option<String>,
    pub status: IssueStatus,
    pub priority: IssuePriority,
    pub reporter_id: Uuid,
    pub reporter: UserSummary,
    pub assignee_id: Option<Uuid>,
    pub assignee: Option<UserSummary>,
    pub expected_completion_date: Option<NaiveDateTime>,
    /// Increments on every update; send it back on PATCH to detect
    /// concurrent edits.
    pub version: i32,
    pub comment_count: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

pub fn list_issues(
    conn: &mut PgConnection,
    project_id: Uuid,
    query: &IssueQuery,
) -> ApiResult<PaginatedResponse<IssueView>> {
    let started = Instant::now();

    let total_count: i64 = query.filtered(project_id).count().get_result(conn)?;

    let rows: Vec<Issue> = query
        .ordered(query.filtered(project_id))
        .limit(query.page.limit())
        .offset(query.page.offset())
        .select(Issue::as_select())
        .load(conn)?;

    let data = hydrate(conn, rows)?;
    record_issue_query(data.len(), started.elapsed());

    Ok(PaginatedResponse::new(data, query.page, total_count))
}

pub fn issue_view(conn: &mut PgConnection, issue: Issue) -> ApiResult<IssueView> {
    hydrate(conn, vec![issue])?
        .pop()
        .ok_or_else(|| AppError::internal("Issue hydration returned no rows"))
}

/// Resolves reporters, assignees and comment counts for a page of issues
/// with one query each.
pub fn hydrate(conn: &mut PgConnection, rows: Vec<Issue>) -> ApiResult<Vec<IssueView>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let issue_ids: Vec<Uuid> = rows.iter().map(|i| i.id).collect();
    let user_ids: Vec<Uuid> = rows
        .iter()
        .flat_map(|i| std::iter::once(i.reporter_id).chain(i.assignee_id))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let people: HashMap<Uuid, UserSummary> = users::table
        .filter(users::id.eq_any(user_ids))
        .select(UserSummary::as_select())
        .load::<UserSummary>(conn)?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    let comment_counts: HashMap<Uuid, i64> = comments::table
        .filter(comments::issue_id.eq_any(issue_ids))
        .group_by(comments::issue_id)
        .select((comments::issue_id, count_star()))
        .load::<(Uuid, i64)>(conn)?
        .into_iter()
        .collect();

    rows.into_iter()
        .map(|issue| {
            let reporter = people
                .get(&issue.reporter_id)
                .cloned()
                .ok_or_else(|| AppError::internal("Issue reporter missing"))?;
            let assignee = issue.assignee_id.and_then(|id| people.get(&id).cloned());

            Ok(IssueView {
                id: issue.id,
                project_id: issue.project_id,
                title: issue.title,
                description: issue.description,
                status: issue.status,
                priority: issue.priority,
                reporter_id: issue.reporter_id,
                reporter,
                assignee_id: issue.assignee_id,
                assignee,
                expected_completion_date: issue.expected_completion_date,
                version: issue.version,
                comment_count: comment_counts.get(&issue.id).copied().unwrap_or(0),
                created_at: issue.created_at,
                updated_at: issue.updated_at,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> IssueListParams {
        let mut p = IssueListParams::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "q" => p.q = value,
                "status" => p.status = value,
                "priority" => p.priority = value,
                "assignee_id" => p.assignee_id = value,
                "sort" => p.sort = value,
                "order" => p.order = value,
                "page" => p.page = value,
                "per_page" => p.per_page = value,
                other => panic!("unknown param {}", other),
            }
        }
        p
    }

    #[test]
    fn test_defaults() {
        let query = IssueQuery::parse(&IssueListParams::default()).unwrap();
        assert_eq!(query, IssueQuery::default());
        assert_eq!(query.sort, SortKey::CreatedAt);
        assert_eq!(query.order, SortOrder::Desc);
        assert_eq!(query.page.page(), 1);
        assert_eq!(query.page.per_page(), 20);
    }

    #[test]
    fn test_parses_every_filter() {
        let assignee = Uuid::new_v4();
        let assignee_text = assignee.to_string();
        let query = IssueQuery::parse(&params(&[
            ("q", " login "),
            ("status", "in_progress"),
            ("priority", "critical"),
            ("assignee_id", &assignee_text),
            ("sort", "priority"),
            ("order", "asc"),
            ("page", "2"),
            ("per_page", "50"),
        ]))
        .unwrap();

        assert_eq!(query.q.as_deref(), Some(" login "));
        assert_eq!(query.status, Some(IssueStatus::InProgress));
        assert_eq!(query.priority, Some(IssuePriority::Critical));
        assert_eq!(query.assignee_id, Some(assignee));
        assert_eq!(query.sort, SortKey::Priority);
        assert_eq!(query.order, SortOrder::Asc);
        assert_eq!(query.page.offset(), 50);
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let query = IssueQuery::parse(&params(&[("q", "   "), ("sort", "")])).unwrap();
        assert_eq!(query.q, None);
        assert_eq!(query.sort, SortKey::CreatedAt);
    }

    #[test]
    fn test_search_text_keeps_surrounding_spaces() {
        let query = IssueQuery::parse(&params(&[("q", " fix")])).unwrap();
        assert_eq!(query.q.as_deref(), Some(" fix"));
    }

    #[test]
    fn test_rejects_bad_values() {
        for bad in [
            ("sort", "title"),
            ("order", "sideways"),
            ("status", "done"),
            ("priority", "urgent"),
            ("assignee_id", "not-a-uuid"),
            ("page", "0"),
            ("per_page", "101"),
            ("per_page", "ten"),
        ] {
            let err = IssueQuery::parse(&params(&[bad])).unwrap_err();
            assert!(
                matches!(err, AppError::Validation(_)),
                "{:?} should be a validation error",
                bad
            );
        }
    }

    #[test]
    fn test_rank_expression_follows_severity_order() {
        let query = IssueQuery {
            sort: SortKey::Priority,
            ..Default::default()
        };
        assert_eq!(
            query.rank_expression(),
            "CASE issues.priority WHEN 'low' THEN 0 WHEN 'medium' THEN 1 \
             WHEN 'high' THEN 2 WHEN 'critical' THEN 3 END"
        );

        let query = IssueQuery {
            sort: SortKey::Status,
            ..Default::default()
        };
        assert!(query
            .rank_expression()
            .starts_with("CASE issues.status WHEN 'open' THEN 0 WHEN 'in_progress' THEN 1"));
    }
}
