//! HTTP route handlers and router assembly

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{auth::require_auth, state::AppState};

pub mod admin;
pub mod auth;
pub mod blocs;
pub mod categories;
pub mod health;
pub mod healthwatch;
pub mod prs;
pub mod programs;
pub mod settings;
pub mod stash;

/// Maximum request body size; watch export archives are the largest
/// uploads we accept
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    // Routes reachable without an access token
    let public_routes = Router::new()
        .route("/info", get(health::instance_info))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/login_mfa", post(auth::login_mfa))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/oidc/login", post(auth::oidc_login))
        // Machine clients authenticate with their API token instead of a JWT
        .route("/stash/token", post(stash::create_stash_item_by_token));

    let protected_routes = Router::new()
        .route("/auth/update_password", post(auth::update_password))
        // Account settings
        .route("/settings/mfa/enable", post(settings::mfa_enable))
        .route("/settings/mfa/verify", post(settings::mfa_verify))
        .route("/settings/mfa/disable", post(settings::mfa_disable))
        .route(
            "/settings/api_token",
            put(settings::create_api_token).delete(settings::delete_api_token),
        )
        .route("/settings/export", get(settings::export_data))
        // Admin user management
        .route(
            "/admin/users",
            get(admin::list_users).post(admin::create_user),
        )
        .route("/admin/users/:username", delete(admin::delete_user))
        .route("/admin/users/:username/reset", put(admin::reset_password))
        .route("/admin/users/:username/reset_mfa", put(admin::reset_mfa))
        .route(
            "/admin/users/:username/toggle_active",
            put(admin::toggle_active),
        )
        // Categories
        .route(
            "/categories",
            get(categories::list_categories).post(categories::create_category),
        )
        .route(
            "/categories/:id",
            put(categories::update_category).delete(categories::delete_category),
        )
        // Blocs
        .route("/blocs", get(blocs::list_blocs).post(blocs::create_bloc))
        .route(
            "/blocs/:id",
            put(blocs::update_bloc).delete(blocs::delete_bloc),
        )
        // Personal records
        .route("/prs", get(prs::list_prs).post(prs::create_pr))
        .route("/prs/:id", put(prs::update_pr).delete(prs::delete_pr))
        .route(
            "/prs/:id/values",
            get(prs::list_pr_values).post(prs::create_pr_value),
        )
        .route("/prs/:id/values/:value_id", delete(prs::delete_pr_value))
        // Programs
        .route(
            "/programs",
            get(programs::list_programs).post(programs::create_program),
        )
        .route(
            "/programs/:id",
            get(programs::get_program)
                .put(programs::update_program)
                .delete(programs::delete_program),
        )
        .route("/programs/:id/steps", post(programs::create_step))
        .route(
            "/programs/:id/steps/:step_id",
            delete(programs::delete_step),
        )
        .route(
            "/programs/:id/steps/:step_id/blocs",
            post(programs::create_step_bloc),
        )
        .route(
            "/programs/:id/steps/:step_id/blocs/:bloc_id",
            delete(programs::delete_step_bloc),
        )
        // Stash
        .route(
            "/stash",
            get(stash::list_stash).post(stash::create_stash_item),
        )
        .route("/stash/:id", delete(stash::delete_stash_item))
        // Health watch data
        .route(
            "/healthwatch",
            get(healthwatch::list_health_data).post(healthwatch::upsert_health_data),
        )
        .route("/healthwatch/:id", delete(healthwatch::delete_health_data))
        .route("/healthwatch/import", post(healthwatch::import_archive))
        .route("/stats/weekly", get(healthwatch::weekly_stats))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let api_routes = public_routes.merge(protected_routes);

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", api_routes)
        .layer(
            tower::ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(CompressionLayer::new())
                .layer(DefaultBodyLimit::max(MAX_BODY_SIZE)),
        )
        .with_state(state)
}
