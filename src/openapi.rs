//! OpenAPI documentation served through Swagger UI.

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::error::ApiError;
use crate::pagination::{PaginatedResponse, PaginationMeta};
use crate::query::IssueView;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Issue Hub API",
        version = "1.0.0",
        description = "Multi-tenant issue tracker.\n\n\
        ## Authentication\n\
        1. Create an account with `POST /auth/signup`\n\
        2. Exchange credentials for a token with `POST /auth/login`\n\
        3. Send it on every other request: `Authorization: Bearer <token>`\n\n\
        ## Roles\n\
        Every project has members with the role `member` or `maintainer`. \
        Members read the project, file issues and comment. Maintainers also \
        manage members and the project itself. Changing an issue's status or \
        assignee, or deleting it, is open to maintainers and the issue's reporter.",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "/api", description = "Current server")
    ),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "Authentication", description = "Signup, login and the current user"),
        (name = "Projects", description = "Project management"),
        (name = "Members", description = "Project membership"),
        (name = "Issues", description = "Issues within a project"),
        (name = "Comments", description = "Discussion on an issue")
    ),
    paths(
        crate::handlers::health::health_check,
        crate::handlers::health::ready_check,

        crate::handlers::auth::signup,
        crate::handlers::auth::login,
        crate::handlers::auth::me,

        crate::handlers::projects::create_project,
        crate::handlers::projects::list_projects,
        crate::handlers::projects::get_project,
        crate::handlers::projects::update_project,
        crate::handlers::projects::delete_project,

        crate::handlers::members::add_project_member,
        crate::handlers::members::list_project_members,

        crate::handlers::issues::create_issue,
        crate::handlers::issues::list_issues,
        crate::handlers::issues::get_issue,
        crate::handlers::issues::update_issue,
        crate::handlers::issues::delete_issue,

        crate::handlers::comments::list_comments,
        crate::handlers::comments::create_comment,
    ),
    components(
        schemas(
            ApiError,
            PaginationMeta,
            PaginatedResponse<IssueView>,

            crate::handlers::health::HealthResponse,
            crate::handlers::health::ReadinessResponse,
            crate::handlers::health::ComponentStatus,

            crate::handlers::auth::SignupRequest,
            crate::handlers::auth::LoginRequest,
            crate::handlers::auth::TokenResponse,
            crate::models::UserSummary,

            crate::models::MemberRole,
            crate::models::IssueStatus,
            crate::models::IssuePriority,

            crate::handlers::projects::CreateProjectRequest,
            crate::handlers::projects::UpdateProjectRequest,
            crate::handlers::projects::ProjectDetailResponse,
            crate::handlers::projects::ProjectSummary,
            crate::handlers::projects::ProjectListResponse,

            crate::handlers::members::AddMemberRequest,
            crate::handlers::members::MemberResponse,
            crate::handlers::members::MembersListResponse,

            IssueView,
            crate::handlers::issues::CreateIssueRequest,
            crate::handlers::issues::UpdateIssueRequest,

            crate::handlers::comments::CreateCommentRequest,
            crate::handlers::comments::CommentResponse,
            crate::handlers::comments::CommentListResponse,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Access token from /auth/login.\n\
                            Include in requests as: `Authorization: Bearer <token>`",
                        ))
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_router() -> Router {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "Issue Hub API");
        assert_eq!(spec.info.version, "1.0.0");
    }

    #[test]
    fn test_openapi_has_security_scheme() {
        let spec = ApiDoc::openapi();
        let components = spec.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(components.schemas.contains_key("IssueView"));
    }

    #[test]
    fn test_openapi_documents_issue_routes() {
        let spec = ApiDoc::openapi();
        assert!(spec.paths.paths.contains_key("/projects/{project_id}/issues"));
        assert!(spec.paths.paths.contains_key("/issues/{issue_id}"));
        assert!(spec.paths.paths.contains_key("/issues/{issue_id}/comments"));
    }

    #[test]
    fn test_openapi_has_tags() {
        let tags = ApiDoc::openapi().tags.expect("tags");
        for name in ["Health", "Authentication", "Projects", "Members", "Issues", "Comments"] {
            assert!(tags.iter().any(|t| t.name == name), "missing tag {}", name);
        }
    }
}
