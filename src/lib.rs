//! Issue Hub - multi-tenant issue tracking with project roles and JWT authentication.

pub mod access;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod helpers;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod pagination;
pub mod query;
pub mod schema;
pub mod telemetry;

use std::time::Duration;

use axum::{
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use auth::{JwtService, PasswordPolicy};
use error::AppError;
use middleware::{
    auth_middleware, auth_rate_limit_middleware, metrics_middleware, request_id_middleware,
    AuthRateLimit,
};
use telemetry::MetricsState;

pub use config::Config;
pub use db::{create_db_pool, create_db_pool_with_url, DbPool};
pub use telemetry::shutdown_telemetry;

/// Per-process context handed to every handler. Immutable after
/// construction; cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub jwt: JwtService,
    pub password_policy: PasswordPolicy,
    pub password_hash_cost: u32,
    pub auth_rate_limit: AuthRateLimit,
    pub metrics: MetricsState,
    pub service_name: String,
}

impl AppState {
    pub fn new(db_pool: DbPool, config: &Config) -> Self {
        Self {
            db_pool,
            jwt: JwtService::new(&config.jwt),
            password_policy: PasswordPolicy::with_min_length(config.security.min_password_length),
            password_hash_cost: config.security.password_hash_cost,
            auth_rate_limit: AuthRateLimit::from_config(&config.security),
            metrics: MetricsState::new(config.telemetry.metrics_enabled),
            service_name: config.telemetry.service_name.clone(),
        }
    }
}

/// Routes under the API prefix.
fn api_routes(state: &AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::ready_check))
        .with_state(state.clone());

    let auth_routes = Router::new()
        .route("/auth/signup", post(handlers::auth::signup))
        .route("/auth/login", post(handlers::auth::login))
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth_rate_limit.clone(),
            auth_rate_limit_middleware,
        ))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/me", get(handlers::auth::me))
        .route(
            "/projects",
            post(handlers::projects::create_project).get(handlers::projects::list_projects),
        )
        .route(
            "/projects/{project_id}",
            get(handlers::projects::get_project)
                .patch(handlers::projects::update_project)
                .delete(handlers::projects::delete_project),
        )
        .route(
            "/projects/{project_id}/members",
            post(handlers::members::add_project_member)
                .get(handlers::members::list_project_members),
        )
        .route(
            "/projects/{project_id}/issues",
            post(handlers::issues::create_issue).get(handlers::issues::list_issues),
        )
        .route(
            "/issues/{issue_id}",
            get(handlers::issues::get_issue)
                .patch(handlers::issues::update_issue)
                .delete(handlers::issues::delete_issue),
        )
        .route(
            "/issues/{issue_id}/comments",
            get(handlers::comments::list_comments).post(handlers::comments::create_comment),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    Router::new()
        .merge(public_routes)
        .merge(auth_routes)
        .merge(protected_routes)
}

pub fn create_router(state: AppState, config: &Config) -> Router {
    let cors = build_cors_layer(config);
    let body_limit = RequestBodyLimitLayer::new(config.server.max_body_size);

    #[allow(deprecated)]
    let timeout = TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs));

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let api = api_routes(&state);
    let prefix = config.server.api_prefix.as_str();
    let app = if prefix.is_empty() {
        Router::new().merge(api)
    } else {
        Router::new().nest(prefix, api)
    };

    let metrics_route = Router::new()
        .route("/metrics", get(telemetry::metrics::metrics_handler))
        .with_state(state.metrics.clone());

    app.merge(metrics_route)
        .merge(openapi::swagger_router())
        .fallback(fallback_handler)
        .layer(axum_middleware::from_fn(metrics_middleware))
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(trace_layer)
        .layer(timeout)
        .layer(body_limit)
        .layer(cors)
}

async fn fallback_handler() -> impl IntoResponse {
    AppError::NotFound("Route")
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    use axum::http::header::HeaderName;
    use axum::http::Method;

    let is_wildcard_origin = config.cors.allowed_origins.contains(&"*".to_string())
        || config.cors.allowed_origins.is_empty();

    let methods: Vec<Method> = config
        .cors
        .allowed_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();

    let headers: Vec<HeaderName> = config
        .cors
        .allowed_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_methods(methods)
        .allow_headers(headers)
        .max_age(Duration::from_secs(config.cors.max_age_secs));

    match (is_wildcard_origin, config.cors.allow_credentials) {
        // Credentials forbid a literal `*`, so echo the caller's origin.
        (true, true) => cors
            .allow_origin(tower_http::cors::AllowOrigin::mirror_request())
            .allow_credentials(true),
        (true, false) => cors.allow_origin(Any),
        (false, credentials) => {
            let origins: Vec<_> = config
                .cors
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            cors.allow_origin(origins).allow_credentials(credentials)
        }
    }
}

pub fn init_tracing(config: &Config) {
    telemetry::init_telemetry(config);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn test_build_cors_layer_wildcard() {
        let mut config = Config::default_for_testing();
        config.cors.allowed_origins = vec!["*".to_string()];
        let _ = build_cors_layer(&config);

        config.cors.allow_credentials = true;
        let _ = build_cors_layer(&config);
    }

    #[test]
    fn test_build_cors_layer_specific_origins() {
        let mut config = Config::default_for_testing();
        config.cors.allowed_origins = vec![
            "http://localhost:3000".to_string(),
            "https://example.com".to_string(),
        ];
        config.cors.allow_credentials = true;
        let _ = build_cors_layer(&config);
    }
}
