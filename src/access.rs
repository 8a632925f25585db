//! Project-scoped authorization.
//!
//! Every project or issue endpoint resolves its target through
//! [`authorize_project`] or [`authorize_issue`]. Checks run in a fixed order:
//! the target must exist (404), the caller must be a member of its project
//! (403), and the caller's role must satisfy the requested [`Capability`] (403).

use diesel::dsl::exists;
use diesel::prelude::*;
use tracing::warn;
use uuid::Uuid;

use crate::error::{ApiResult, AppError};
use crate::models::{Issue, MemberRole, Project, ProjectMember};
use crate::schema::{issues, project_members, projects};
use crate::telemetry::record_access_check;

/// A privilege level: a minimum role, optionally waived for the issue's
/// reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    pub name: &'static str,
    pub required_role: MemberRole,
    pub reporter_exempt: bool,
}

impl Capability {
    /// Any member: read the project, list and create issues, comment.
    pub const MEMBER: Capability = Capability {
        name: "member",
        required_role: MemberRole::Member,
        reporter_exempt: false,
    };

    /// Change status or assignee, delete an issue.
    pub const TRIAGE: Capability = Capability {
        name: "triage",
        required_role: MemberRole::Maintainer,
        reporter_exempt: true,
    };

    /// Manage members, edit or delete the project.
    pub const MAINTAIN: Capability = Capability {
        name: "maintain",
        required_role: MemberRole::Maintainer,
        reporter_exempt: false,
    };

    pub fn permits(&self, role: MemberRole, is_reporter: bool) -> bool {
        role >= self.required_role || (self.reporter_exempt && is_reporter)
    }

    fn denial_message(&self) -> &'static str {
        match (self.required_role, self.reporter_exempt) {
            (MemberRole::Member, _) => "Project membership required",
            (MemberRole::Maintainer, true) => "Only a maintainer or the issue reporter can do this",
            (MemberRole::Maintainer, false) => "Maintainer role required",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProjectAccess {
    pub project: Project,
    pub role: MemberRole,
}

#[derive(Debug, Clone)]
pub struct IssueAccess {
    pub issue: Issue,
    pub role: MemberRole,
    user_id: Uuid,
}

impl IssueAccess {
    pub fn is_reporter(&self) -> bool {
        self.issue.reporter_id == self.user_id
    }

    /// Re-checks an already resolved issue against a stronger capability.
    pub fn require(&self, capability: Capability) -> ApiResult<()> {
        let granted = capability.permits(self.role, self.is_reporter());
        record_access_check(capability.name, granted);

        if granted {
            Ok(())
        } else {
            Err(deny(
                self.user_id,
                self.issue.project_id,
                capability,
                capability.denial_message(),
            ))
        }
    }
}

fn deny(user_id: Uuid, project_id: Uuid, capability: Capability, reason: &str) -> AppError {
    warn!(
        user_id = %user_id,
        project_id = %project_id,
        capability = capability.name,
        reason,
        "Access denied"
    );
    AppError::forbidden(reason)
}

fn membership_role(
    conn: &mut PgConnection,
    project_id: Uuid,
    user_id: Uuid,
) -> ApiResult<Option<MemberRole>> {
    let member = project_members::table
        .find((project_id, user_id))
        .select(ProjectMember::as_select())
        .first(conn)
        .optional()?;

    Ok(member.map(|m| m.role))
}

fn require_membership(
    conn: &mut PgConnection,
    project_id: Uuid,
    user_id: Uuid,
    capability: Capability,
) -> ApiResult<MemberRole> {
    match membership_role(conn, project_id, user_id)? {
        Some(role) => Ok(role),
        None => {
            record_access_check(capability.name, false);
            Err(deny(
                user_id,
                project_id,
                capability,
                "Not a member of this project",
            ))
        }
    }
}

pub fn authorize_project(
    conn: &mut PgConnection,
    user_id: Uuid,
    project_id: Uuid,
    capability: Capability,
) -> ApiResult<ProjectAccess> {
    let project = projects::table
        .find(project_id)
        .select(Project::as_select())
        .first(conn)
        .optional()?
        .ok_or(AppError::NotFound("Project"))?;

    let role = require_membership(conn, project_id, user_id, capability)?;

    let granted = capability.permits(role, false);
    record_access_check(capability.name, granted);
    if !granted {
        return Err(deny(
            user_id,
            project_id,
            capability,
            capability.denial_message(),
        ));
    }

    Ok(ProjectAccess { project, role })
}

pub fn authorize_issue(
    conn: &mut PgConnection,
    user_id: Uuid,
    issue_id: Uuid,
    capability: Capability,
) -> ApiResult<IssueAccess> {
    let issue = issues::table
        .find(issue_id)
        .select(Issue::as_select())
        .first(conn)
        .optional()?
        .ok_or(AppError::NotFound("Issue"))?;

    let role = require_membership(conn, issue.project_id, user_id, capability)?;

    let access = IssueAccess {
        issue,
        role,
        user_id,
    };
    access.require(capability)?;

    Ok(access)
}

/// A present assignee must already be a member of the project.
pub fn ensure_assignable(
    conn: &mut PgConnection,
    project_id: Uuid,
    assignee_id: Option<Uuid>,
) -> ApiResult<()> {
    let Some(assignee_id) = assignee_id else {
        return Ok(());
    };

    let is_member: bool = diesel::select(exists(
        project_members::table.find((project_id, assignee_id)),
    ))
    .get_result(conn)?;

    if is_member {
        Ok(())
    } else {
        Err(AppError::validation(
            "Assignee must be a member of this project",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_capability_admits_every_role() {
        assert!(Capability::MEMBER.permits(MemberRole::Member, false));
        assert!(Capability::MEMBER.permits(MemberRole::Maintainer, false));
    }

    #[test]
    fn test_triage_admits_maintainer_or_reporter() {
        assert!(Capability::TRIAGE.permits(MemberRole::Maintainer, false));
        assert!(Capability::TRIAGE.permits(MemberRole::Member, true));
        assert!(!Capability::TRIAGE.permits(MemberRole::Member, false));
    }

    #[test]
    fn test_maintain_ignores_reporter_status() {
        assert!(Capability::MAINTAIN.permits(MemberRole::Maintainer, false));
        assert!(!Capability::MAINTAIN.permits(MemberRole::Member, true));
        assert!(!Capability::MAINTAIN.permits(MemberRole::Member, false));
    }

    #[test]
    fn test_denial_messages_name_the_requirement() {
        assert_eq!(
            Capability::MAINTAIN.denial_message(),
            "Maintainer role required"
        );
        assert!(Capability::TRIAGE.denial_message().contains("reporter"));
    }

    fn issue_access(role: MemberRole, reporter_id: Uuid, user_id: Uuid) -> IssueAccess {
        let now = chrono::Utc::now().naive_utc();
        IssueAccess {
            issue: Issue {
                id: Uuid::new_v4(),
                project_id: Uuid::new_v4(),
                title: "Login button broken".to_string(),
                description: None,
                status: crate::models::IssueStatus::Open,
                priority: crate::models::IssuePriority::High,
                reporter_id,
                assignee_id: None,
                expected_completion_date: None,
                version: 1,
                created_at: now,
                updated_at: now,
            },
            role,
            user_id,
        }
    }

    #[test]
    fn test_issue_access_require() {
        let reporter = Uuid::new_v4();
        let other = Uuid::new_v4();

        let as_reporter = issue_access(MemberRole::Member, reporter, reporter);
        assert!(as_reporter.is_reporter());
        assert!(as_reporter.require(Capability::TRIAGE).is_ok());

        let as_member = issue_access(MemberRole::Member, reporter, other);
        assert!(!as_member.is_reporter());
        let err = as_member.require(Capability::TRIAGE).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let as_maintainer = issue_access(MemberRole::Maintainer, reporter, other);
        assert!(as_maintainer.require(Capability::TRIAGE).is_ok());
    }
}
