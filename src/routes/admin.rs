use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, put},
};

/// Admin Router Module
///
/// Account administration and the application review workflow. Each handler
/// takes the `Principal` extractor (authentication) and then requires an
/// administrator role before touching the repository.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET/POST /admin/users
        // List every account, or create one with an explicit role.
        .route(
            "/users",
            get(handlers::admin_get_users).post(handlers::admin_create_user),
        )
        // GET /admin/applications?status=...
        .route("/applications", get(handlers::admin_get_applications))
        // PUT /admin/applications/{application_id}/status
        // Moves an application through the review workflow.
        .route(
            "/applications/{application_id}/status",
            put(handlers::admin_update_status),
        )
}
