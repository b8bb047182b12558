use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session token.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /login
        // Credentials in, opaque session token out.
        .route("/login", post(handlers::login))
        // POST /users
        // Self-registration; always creates an applicant.
        .route("/users", post(handlers::create_user))
}
