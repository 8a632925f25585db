use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Raised when a stored or submitted value does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} '{value}', expected one of: {expected}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
    pub expected: String,
}

/// Enums persisted as lowercase varchar columns.
///
/// Variant order is significant: it defines the rank used when sorting.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn rank(&self) -> i32 {
                Self::ALL.iter().position(|v| v == self).unwrap_or_default() as i32
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(UnknownVariant {
                        kind: $kind,
                        value: s.to_string(),
                        expected: Self::ALL
                            .iter()
                            .map(|v| v.as_str())
                            .collect::<Vec<_>>()
                            .join(", "),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = UnknownVariant;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.as_str().to_string()
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Member,
    Maintainer,
}

text_enum!(MemberRole, "role", {
    Member => "member",
    Maintainer => "maintainer",
});

impl Default for MemberRole {
    fn default() -> Self {
        MemberRole::Member
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

text_enum!(IssueStatus, "status", {
    Open => "open",
    InProgress => "in_progress",
    Resolved => "resolved",
    Closed => "closed",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IssuePriority {
    Low,
    Medium,
    High,
    Critical,
}

text_enum!(IssuePriority, "priority", {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

impl Default for IssuePriority {
    fn default() -> Self {
        IssuePriority::Medium
    }
}

#[derive(Debug, Queryable, Selectable, Clone)]
#[diesel(table_name = crate::schema::users)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: NaiveDateTime,
}

/// Public view of a user. Never carries the password hash.
#[derive(Debug, Queryable, Selectable, Serialize, Clone, PartialEq, ToSchema)]
#[diesel(table_name = crate::schema::users)]
pub struct UserSummary {
    pub id: Uuid,
    #[schema(example = "Jane Smith")]
    pub name: String,
    #[schema(example = "jane@example.com")]
    pub email: String,
    pub created_at: NaiveDateTime,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::projects)]
pub struct Project {
    pub id: Uuid,
    #[schema(example = "Web Platform")]
    pub name: String,
    #[schema(example = "WEB")]
    pub key: String,
    #[schema(example = "Main web application platform")]
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::projects)]
pub struct NewProject {
    pub name: String,
    pub key: String,
    pub description: Option<String>,
}

#[derive(Debug, AsChangeset, Default)]
#[diesel(table_name = crate::schema::projects)]
pub struct ProjectChangeset {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
}

#[derive(Debug, Queryable, Selectable, Clone)]
#[diesel(table_name = crate::schema::project_members)]
pub struct ProjectMember {
    pub project_id: Uuid,
    pub user_id: Uuid,
    #[diesel(deserialize_as = String)]
    pub role: MemberRole,
    pub joined_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::project_members)]
pub struct NewProjectMember {
    pub project_id: Uuid,
    pub user_id: Uuid,
    #[diesel(serialize_as = String)]
    pub role: MemberRole,
}

#[derive(Debug, Queryable, Selectable, Clone)]
#[diesel(table_name = crate::schema::issues)]
pub struct Issue {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[diesel(deserialize_as = String)]
    pub status: IssueStatus,
    #[diesel(deserialize_as = String)]
    pub priority: IssuePriority,
    pub reporter_id: Uuid,
    pub assignee_id: Option<Uuid>,
    pub expected_completion_date: Option<NaiveDateTime>,
    pub version: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::issues)]
pub struct NewIssue {
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[diesel(serialize_as = String)]
    pub status: IssueStatus,
    #[diesel(serialize_as = String)]
    pub priority: IssuePriority,
    pub reporter_id: Uuid,
    pub assignee_id: Option<Uuid>,
    pub expected_completion_date: Option<NaiveDateTime>,
}

/// Column updates for a partial issue edit. `None` leaves a column untouched;
/// `Some(None)` on a nullable column writes NULL.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = crate::schema::issues)]
pub struct IssueChangeset {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assignee_id: Option<Option<Uuid>>,
    pub expected_completion_date: Option<Option<NaiveDateTime>>,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Queryable, Selectable, Clone)]
#[diesel(table_name = crate::schema::comments)]
pub struct Comment {
    pub id: Uuid,
    pub issue_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::comments)]
pub struct NewComment {
    pub issue_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
}
