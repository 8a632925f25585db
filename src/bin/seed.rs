//! Loads demo users, projects, issues and comments into an empty database.
//!
//! Does nothing when any user already exists.

use diesel::prelude::*;
use issuehub::{
    auth::PasswordService,
    create_db_pool,
    db::{self, get_db_conn},
    error::{ApiResult, AppError},
    init_tracing, shutdown_telemetry,
    models::{
        IssuePriority, IssueStatus, MemberRole, NewComment, NewIssue, NewProject,
        NewProjectMember, NewUser,
    },
    schema::{comments, issues, project_members, projects, users},
    Config,
};
use tracing::{error, info};
use uuid::Uuid;

const USERS: &[(&str, &str, &str)] = &[
    ("John Doe", "john@example.com", "password123"),
    ("Jane Smith", "jane@example.com", "password123"),
    ("Bob Johnson", "bob@example.com", "password123"),
    ("Alice Williams", "alice@example.com", "password123"),
    ("Demo User", "demo@example.com", "demo123"),
];

const JOHN: usize = 0;
const JANE: usize = 1;
const BOB: usize = 2;
const ALICE: usize = 3;
const DEMO: usize = 4;

const PROJECTS: &[(&str, &str, &str)] = &[
    ("Web Platform", "WEB", "Main web application platform"),
    ("Mobile App", "MOB", "Mobile application for iOS and Android"),
];

const WEB: usize = 0;
const MOB: usize = 1;

const MEMBERS: &[(usize, usize, MemberRole)] = &[
    (WEB, JOHN, MemberRole::Maintainer),
    (WEB, JANE, MemberRole::Maintainer),
    (WEB, BOB, MemberRole::Member),
    (WEB, DEMO, MemberRole::Member),
    (MOB, JANE, MemberRole::Maintainer),
    (MOB, ALICE, MemberRole::Member),
    (MOB, DEMO, MemberRole::Maintainer),
];

struct SeedIssue {
    project: usize,
    title: &'static str,
    description: &'static str,
    status: IssueStatus,
    priority: IssuePriority,
    reporter: usize,
    assignee: Option<usize>,
}

const ISSUES: &[SeedIssue] = &[
    SeedIssue {
        project: WEB,
        title: "Login page not responsive on mobile",
        description: "The login page doesn't adapt properly to mobile screen sizes. Elements overlap and form fields are cut off.",
        status: IssueStatus::Open,
        priority: IssuePriority::High,
        reporter: BOB,
        assignee: Some(JOHN),
    },
    SeedIssue {
        project: WEB,
        title: "Add dark mode support",
        description: "Users have requested a dark mode option for better visibility in low-light conditions.",
        status: IssueStatus::InProgress,
        priority: IssuePriority::Medium,
        reporter: JOHN,
        assignee: Some(JANE),
    },
    SeedIssue {
        project: WEB,
        title: "Performance issues with large datasets",
        description: "Page load times increase significantly when displaying tables with more than 1000 rows.",
        status: IssueStatus::Open,
        priority: IssuePriority::Critical,
        reporter: JANE,
        assignee: Some(JOHN),
    },
    SeedIssue {
        project: WEB,
        title: "Export to CSV feature broken",
        description: "The export functionality throws an error when trying to export data to CSV format.",
        status: IssueStatus::Resolved,
        priority: IssuePriority::High,
        reporter: DEMO,
        assignee: Some(JANE),
    },
    SeedIssue {
        project: WEB,
        title: "Update documentation for API v2",
        description: "API documentation needs to be updated to reflect changes in version 2.0.",
        status: IssueStatus::Open,
        priority: IssuePriority::Low,
        reporter: JOHN,
        assignee: None,
    },
    SeedIssue {
        project: WEB,
        title: "Implement two-factor authentication",
        description: "Add 2FA support for enhanced security.",
        status: IssueStatus::Open,
        priority: IssuePriority::High,
        reporter: JANE,
        assignee: Some(JOHN),
    },
    SeedIssue {
        project: WEB,
        title: "Search functionality returns incorrect results",
        description: "Search feature is not properly filtering results based on the search criteria.",
        status: IssueStatus::InProgress,
        priority: IssuePriority::Medium,
        reporter: BOB,
        assignee: Some(JANE),
    },
    SeedIssue {
        project: WEB,
        title: "Add user activity logging",
        description: "Implement comprehensive logging for user actions for audit purposes.",
        status: IssueStatus::Open,
        priority: IssuePriority::Medium,
        reporter: DEMO,
        assignee: None,
    },
    SeedIssue {
        project: MOB,
        title: "App crashes on startup on iOS 15",
        description: "Multiple users report the app crashing immediately after launch on iOS 15 devices.",
        status: IssueStatus::Open,
        priority: IssuePriority::Critical,
        reporter: ALICE,
        assignee: Some(JANE),
    },
    SeedIssue {
        project: MOB,
        title: "Push notifications not working on Android",
        description: "Push notifications are not being received on Android devices running version 12 and above.",
        status: IssueStatus::Open,
        priority: IssuePriority::High,
        reporter: JANE,
        assignee: Some(ALICE),
    },
    SeedIssue {
        project: MOB,
        title: "Add offline mode support",
        description: "Allow users to access cached content when offline.",
        status: IssueStatus::Open,
        priority: IssuePriority::Medium,
        reporter: DEMO,
        assignee: None,
    },
    SeedIssue {
        project: MOB,
        title: "Improve app launch time",
        description: "App takes too long to load on older devices.",
        status: IssueStatus::InProgress,
        priority: IssuePriority::Medium,
        reporter: ALICE,
        assignee: Some(JANE),
    },
    SeedIssue {
        project: MOB,
        title: "Add biometric authentication",
        description: "Support Face ID and Touch ID for iOS, and fingerprint authentication for Android.",
        status: IssueStatus::Closed,
        priority: IssuePriority::High,
        reporter: JANE,
        assignee: Some(ALICE),
    },
];

/// (index into ISSUES, author, body)
const COMMENTS: &[(usize, usize, &str)] = &[
    (0, JOHN, "I'll look into this issue. Can you provide specific device models and screen sizes where you're seeing this problem?"),
    (0, BOB, "Sure! I'm seeing this on iPhone 12 mini and Samsung Galaxy S21. The login button is completely off-screen."),
    (1, JANE, "I've started working on the dark mode implementation. Should have a PR ready by end of week."),
    (2, JOHN, "This is a critical issue. We need to implement pagination or virtual scrolling ASAP."),
    (2, JANE, "I agree. I can help with the backend pagination implementation."),
    (8, JANE, "I've identified the issue. It's related to a deprecated API call. Working on a fix now."),
    (8, ALICE, "Great! This is affecting a lot of users. Please prioritize this."),
];

fn seed(conn: &mut PgConnection, hash_cost: u32) -> ApiResult<bool> {
    let existing: i64 = users::table.count().get_result(conn)?;
    if existing > 0 {
        return Ok(false);
    }

    let mut user_ids: Vec<Uuid> = Vec::with_capacity(USERS.len());
    for (name, email, password) in USERS {
        let password_hash = PasswordService::hash_password_with_cost(password, hash_cost)
            .map_err(|e| AppError::internal(format!("Password hashing failed: {}", e)))?;

        let id = diesel::insert_into(users::table)
            .values(NewUser {
                name: name.to_string(),
                email: email.to_string(),
                password_hash,
            })
            .returning(users::id)
            .get_result(conn)?;
        user_ids.push(id);
    }

    let mut project_ids: Vec<Uuid> = Vec::with_capacity(PROJECTS.len());
    for (name, key, description) in PROJECTS {
        let id = diesel::insert_into(projects::table)
            .values(NewProject {
                name: name.to_string(),
                key: key.to_string(),
                description: Some(description.to_string()),
            })
            .returning(projects::id)
            .get_result(conn)?;
        project_ids.push(id);
    }

    for &(project, user, role) in MEMBERS {
        diesel::insert_into(project_members::table)
            .values(NewProjectMember {
                project_id: project_ids[project],
                user_id: user_ids[user],
                role,
            })
            .execute(conn)?;
    }

    let mut issue_ids: Vec<Uuid> = Vec::with_capacity(ISSUES.len());
    for issue in ISSUES {
        let id = diesel::insert_into(issues::table)
            .values(NewIssue {
                project_id: project_ids[issue.project],
                title: issue.title.to_string(),
                description: Some(issue.description.to_string()),
                status: issue.status,
                priority: issue.priority,
                reporter_id: user_ids[issue.reporter],
                assignee_id: issue.assignee.map(|a| user_ids[a]),
                expected_completion_date: None,
            })
            .returning(issues::id)
            .get_result(conn)?;
        issue_ids.push(id);
    }

    for &(issue, author, body) in COMMENTS {
        diesel::insert_into(comments::table)
            .values(NewComment {
                issue_id: issue_ids[issue],
                author_id: user_ids[author],
                body: body.to_string(),
            })
            .execute(conn)?;
    }

    Ok(true)
}

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&config);

    let pool = create_db_pool(&config.database);
    let result = get_db_conn(&pool).and_then(|mut conn| {
        db::transaction(&mut conn, |conn| {
            seed(conn, config.security.password_hash_cost)
        })
    });

    match result {
        Ok(false) => info!("Database already seeded"),
        Ok(true) => {
            info!(
                users = USERS.len(),
                projects = PROJECTS.len(),
                issues = ISSUES.len(),
                comments = COMMENTS.len(),
                "Database seeded"
            );
            for (name, email, password) in USERS {
                info!(user = %name, email = %email, password = %password, "Demo account");
            }
        }
        Err(e) => {
            error!(error = %e, "Seeding failed");
            shutdown_telemetry();
            std::process::exit(1);
        }
    }

    shutdown_telemetry();
}
