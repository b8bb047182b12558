use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Every route here sits behind the authentication route layer, so handlers
/// receive the `Principal` it resolved. Ownership and role checks happen in the
/// handlers through the `AccessController`.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // POST /logout
        // Revokes the token used for this request.
        .route("/logout", post(handlers::logout))
        // GET /me
        .route("/me", get(handlers::get_me))
        // GET /users/{user_id}
        // Applicants may only read themselves; reviewers may read anyone.
        .route("/users/{user_id}", get(handlers::get_user))
        // GET/POST /users/{user_id}/application
        // The single application a user owns. Reads are redacted for limited helpers.
        .route(
            "/users/{user_id}/application",
            get(handlers::get_application).post(handlers::create_application),
        )
        // GET/POST /users/{user_id}/application/comments
        .route(
            "/users/{user_id}/application/comments",
            get(handlers::get_comments).post(handlers::create_comment),
        )
}
