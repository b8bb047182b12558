use std::any::Any;

use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{self, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Gateway core.
pub mod access;
pub mod auth;
pub mod clock;
pub mod password;
pub mod redact;
pub mod session;
pub mod token;
pub mod users;

// Persistence, configuration and the HTTP surface.
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod routes;

use auth::Principal;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use clock::{ClockState, SystemClock};
pub use config::{AppConfig, ConfigError};
pub use error::{ApiError, ApiResult};
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};
pub use session::SessionAuthenticator;

use password::PasswordHasher;
use token::TokenStore;
use users::UserStore;

/// ApiDoc
///
/// OpenAPI document for every handler, served at `/api-docs/openapi.json`.
/// Handler paths are relative to the `/api/v1` server prefix.
#[derive(OpenApi)]
#[openapi(
    servers((url = "/api/v1")),
    paths(
        handlers::login, handlers::logout, handlers::create_user, handlers::get_me,
        handlers::get_user, handlers::get_application, handlers::create_application,
        handlers::get_comments, handlers::create_comment, handlers::admin_get_users,
        handlers::admin_get_applications, handlers::admin_create_user,
        handlers::admin_update_status
    ),
    components(
        schemas(
            models::LoginRequest, models::LoginResponse, models::LoginResult,
            models::CreateUserRequest, models::AdminCreateUserRequest, models::PublicUser,
            models::CreateApplicationRequest, models::ApplicationView, models::Comment,
            models::CreateCommentRequest, models::UpdateStatusRequest, error::ErrorBody,
        )
    ),
    tags(
        (name = "applicant-portal", description = "Applicant management API")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// The single shared container of services and configuration handed to every
/// handler. All members are cheap `Clone` handles.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub config: AppConfig,
    pub clock: ClockState,
    pub users: UserStore,
    pub sessions: SessionAuthenticator,
}

impl AppState {
    /// Wires the gateway services over `repo`. Fails if argon2 rejects the
    /// password hash cost or the session lifetime cannot be represented.
    pub fn new(repo: RepositoryState, config: AppConfig, clock: ClockState) -> Result<Self, ConfigError> {
        let hasher = PasswordHasher::new(config.hash_cost)?;
        let session_ttl = config.session_ttl_delta()?;
        let users = UserStore::new(repo.clone(), hasher, clock.clone(), config.repo_timeout);
        let tokens = TokenStore::new(repo.clone(), config.repo_timeout);
        let sessions = SessionAuthenticator::new(tokens, users.clone(), clock.clone(), session_ttl);

        Ok(Self {
            repo,
            config,
            clock,
            users,
            sessions,
        })
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for SessionAuthenticator {
    fn from_ref(app_state: &AppState) -> SessionAuthenticator {
        app_state.sessions.clone()
    }
}

impl FromRef<AppState> for UserStore {
    fn from_ref(app_state: &AppState) -> UserStore {
        app_state.users.clone()
    }
}

/// auth_middleware
///
/// Route layer for the authenticated routes. The `Principal` extractor rejects
/// the request with 401 before the handler runs if the bearer token does not
/// resolve; otherwise the principal is stored in the request extensions so the
/// handler does not resolve it a second time.
async fn auth_middleware(principal: Principal, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(principal);
    next.run(request).await
}

/// handle_panic
///
/// Converts a panic inside request handling into the generic 500 response.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = err.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = err.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    ApiError::internal(format!("handler panicked: {detail}")).into_response()
}

/// create_router
///
/// Assembles the `/api/v1` routers, the documentation endpoints and the
/// observability layers, and binds the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(cors::Any)
        .allow_origin(cors::Any)
        .allow_headers(cors::Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let api = Router::new()
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .nest("/admin", admin::admin_routes());

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api/v1", api)
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id))
                .layer(CatchPanicLayer::custom(handle_panic)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one HTTP request, carrying the request id so every log line of the
/// request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
