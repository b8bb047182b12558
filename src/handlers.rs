use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;

use crate::{
    AppState,
    access::{ACCESS_APPLICANT, ADMINISTER, AccessController, Requirement},
    auth::{ClientMeta, Principal},
    error::{ApiError, ApiJson, ApiResult, ErrorBody},
    models::{
        AdminCreateUserRequest, Application, ApplicationStatus, ApplicationView, Comment,
        CreateApplicationRequest, CreateCommentRequest, CreateUserRequest, LoginRequest,
        LoginResponse, NewComment, PublicUser, Role, UpdateStatusRequest, User,
        education_level_name,
    },
    redact::ResponseRedactor,
    repository::{RepoError, RepoResultExt, bounded},
    session::SessionAuthenticator,
};

// --- Query Structs ---

/// ApplicationFilter
///
/// Query parameters of GET /admin/applications.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct ApplicationFilter {
    /// Only return applications currently in this status (e.g. `received`).
    pub status: Option<String>,
}

// --- Helpers ---

async fn load_application_of(state: &AppState, user_id: i64) -> ApiResult<Application> {
    bounded(state.config.repo_timeout, state.repo.get_application_of(user_id))
        .await
        .optional()?
        .ok_or(ApiError::NotFound("application"))
}

/// Attaches the owner's name and applies the viewer's redaction.
async fn present(state: &AppState, application: Application, viewer: Role) -> ApiResult<ApplicationView> {
    let owner = state.users.get(application.user_id).await?;
    let view = ApplicationView::new(application, owner.as_ref());
    Ok(ResponseRedactor::redact(&view, viewer))
}

// --- Session Handlers ---

/// login
///
/// [Public Route] Exchanges an email and password for a session token valid
/// for the configured session lifetime.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = LoginResponse),
        (status = 400, description = "Missing email or password", body = ErrorBody),
        (status = 401, description = "Invalid password or unknown user", body = ErrorBody)
    )
)]
pub async fn login(
    State(sessions): State<SessionAuthenticator>,
    client: ClientMeta,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let response = sessions.login(payload, &client).await?;
    Ok(Json(response))
}

/// logout
///
/// [Authenticated Route] Revokes the session token that authenticated this request.
#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 200, description = "Session revoked"),
        (status = 401, description = "Access denied", body = ErrorBody)
    )
)]
pub async fn logout(
    principal: Principal,
    State(sessions): State<SessionAuthenticator>,
) -> ApiResult<StatusCode> {
    AccessController::authorize(&principal, Requirement::AnyAuthenticated, None)?;
    sessions.logout(&principal).await?;
    Ok(StatusCode::OK)
}

// --- User Handlers ---

/// create_user
///
/// [Public Route] Self-registration. The account is always created with the
/// `Applicant` role.
#[utoipa::path(
    post,
    path = "/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = PublicUser),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody)
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<PublicUser>)> {
    let user = state.users.register(payload, Role::Applicant).await?;
    Ok((StatusCode::CREATED, Json(user.to_public())))
}

/// get_me
///
/// [Authenticated Route] The caller's own account.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Current user", body = PublicUser),
        (status = 401, description = "Access denied", body = ErrorBody)
    )
)]
pub async fn get_me(principal: Principal, State(state): State<AppState>) -> ApiResult<Json<PublicUser>> {
    AccessController::authorize(&principal, Requirement::AnyAuthenticated, None)?;
    let user = state
        .users
        .get(principal.user_id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    Ok(Json(user.to_public()))
}

/// get_user
///
/// [Authenticated Route] A single account. Applicants may only read their own.
#[utoipa::path(
    get,
    path = "/users/{user_id}",
    params(("user_id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = PublicUser),
        (status = 401, description = "Access denied", body = ErrorBody),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn get_user(
    principal: Principal,
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<PublicUser>> {
    AccessController::authorize(&principal, ACCESS_APPLICANT, Some(user_id))?;
    let user = state
        .users
        .get(user_id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    Ok(Json(user.to_public()))
}

// --- Application Handlers ---

/// get_application
///
/// [Authenticated Route] The application owned by `user_id`. Limited helpers
/// receive it with contact and demographic fields blanked.
#[utoipa::path(
    get,
    path = "/users/{user_id}/application",
    params(("user_id" = i64, Path, description = "Owner's user ID")),
    responses(
        (status = 200, description = "Application", body = ApplicationView),
        (status = 401, description = "Access denied", body = ErrorBody),
        (status = 404, description = "User has no application", body = ErrorBody)
    )
)]
pub async fn get_application(
    principal: Principal,
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<ApplicationView>> {
    AccessController::authorize(&principal, ACCESS_APPLICANT, Some(user_id))?;
    let application = load_application_of(&state, user_id).await?;
    Ok(Json(present(&state, application, principal.role).await?))
}

/// create_application
///
/// [Authenticated Route] Submits the application of `user_id`. A user can hold
/// only one; new applications start in status `received`.
#[utoipa::path(
    post,
    path = "/users/{user_id}/application",
    params(("user_id" = i64, Path, description = "Owner's user ID")),
    request_body = CreateApplicationRequest,
    responses(
        (status = 201, description = "Application created", body = ApplicationView),
        (status = 400, description = "Invalid education level", body = ErrorBody),
        (status = 401, description = "Access denied", body = ErrorBody),
        (status = 404, description = "Unknown user", body = ErrorBody),
        (status = 409, description = "Application already exists", body = ErrorBody)
    )
)]
pub async fn create_application(
    principal: Principal,
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    ApiJson(payload): ApiJson<CreateApplicationRequest>,
) -> ApiResult<(StatusCode, Json<ApplicationView>)> {
    AccessController::authorize(&principal, ACCESS_APPLICANT, Some(user_id))?;

    if education_level_name(payload.education_level).is_none() {
        return Err(ApiError::validation(format!(
            "Unknown education level {}",
            payload.education_level
        )));
    }
    if state.users.get(user_id).await?.is_none() {
        return Err(ApiError::NotFound("user"));
    }

    let new = payload.into_new_application(user_id, state.clock.now());
    let application = match bounded(state.config.repo_timeout, state.repo.set_application(new)).await {
        Ok(application) => application,
        Err(RepoError::Conflict(_)) => {
            return Err(ApiError::Conflict(
                "This user already has an application".to_string(),
            ));
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(application_id = application.id, user_id, "application created");
    let view = present(&state, application, principal.role).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

// --- Comment Handlers ---

/// get_comments
///
/// [Authenticated Route] Comments attached to the application of `user_id`.
#[utoipa::path(
    get,
    path = "/users/{user_id}/application/comments",
    params(("user_id" = i64, Path, description = "Owner's user ID")),
    responses(
        (status = 200, description = "Comments", body = [Comment]),
        (status = 401, description = "Access denied", body = ErrorBody),
        (status = 404, description = "User has no application", body = ErrorBody)
    )
)]
pub async fn get_comments(
    principal: Principal,
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<Vec<Comment>>> {
    AccessController::authorize(&principal, ACCESS_APPLICANT, Some(user_id))?;
    let application = load_application_of(&state, user_id).await?;
    let comments = bounded(state.config.repo_timeout, state.repo.get_comments(application.id)).await?;
    Ok(Json(comments))
}

/// create_comment
///
/// [Authenticated Route] Adds a comment to the application of `user_id`. The
/// author is always the caller.
#[utoipa::path(
    post,
    path = "/users/{user_id}/application/comments",
    params(("user_id" = i64, Path, description = "Owner's user ID")),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment added", body = Comment),
        (status = 400, description = "Empty comment", body = ErrorBody),
        (status = 401, description = "Access denied", body = ErrorBody),
        (status = 404, description = "User has no application", body = ErrorBody)
    )
)]
pub async fn create_comment(
    principal: Principal,
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    ApiJson(payload): ApiJson<CreateCommentRequest>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    AccessController::authorize(&principal, ACCESS_APPLICANT, Some(user_id))?;

    let contents = payload.contents.trim();
    if contents.is_empty() {
        return Err(ApiError::validation("A comment cannot be empty"));
    }

    let application = load_application_of(&state, user_id).await?;
    let comment = NewComment {
        application_id: application.id,
        user_id: principal.user_id,
        contents: contents.to_string(),
        created_at: state.clock.now(),
    };
    let comment = bounded(state.config.repo_timeout, state.repo.set_comment(comment)).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

// --- Admin Handlers ---

/// admin_get_users
///
/// [Admin Route] Every registered account.
#[utoipa::path(
    get,
    path = "/admin/users",
    responses(
        (status = 200, description = "All users", body = [PublicUser]),
        (status = 401, description = "Access denied", body = ErrorBody)
    )
)]
pub async fn admin_get_users(
    principal: Principal,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<PublicUser>>> {
    AccessController::authorize(&principal, ADMINISTER, None)?;
    let users = state.users.list().await?;
    Ok(Json(users.iter().map(User::to_public).collect()))
}

/// admin_get_applications
///
/// [Admin Route] Every application, optionally filtered by status, redacted
/// for the caller's role.
#[utoipa::path(
    get,
    path = "/admin/applications",
    params(ApplicationFilter),
    responses(
        (status = 200, description = "Applications", body = [ApplicationView]),
        (status = 400, description = "Unknown status", body = ErrorBody),
        (status = 401, description = "Access denied", body = ErrorBody)
    )
)]
pub async fn admin_get_applications(
    principal: Principal,
    State(state): State<AppState>,
    Query(filter): Query<ApplicationFilter>,
) -> ApiResult<Json<Vec<ApplicationView>>> {
    AccessController::authorize(&principal, ADMINISTER, None)?;

    let status = match filter.status.as_deref() {
        None | Some("") => None,
        Some(value) => Some(
            ApplicationStatus::parse(value)
                .ok_or_else(|| ApiError::validation(format!("Unknown application status {value:?}")))?,
        ),
    };

    let applications = bounded(
        state.config.repo_timeout,
        state.repo.get_applications(status.map(ApplicationStatus::as_str)),
    )
    .await?;
    let owners: HashMap<i64, User> = state
        .users
        .list()
        .await?
        .into_iter()
        .map(|user| (user.id, user))
        .collect();

    let views: Vec<ApplicationView> = applications
        .into_iter()
        .map(|application| {
            let owner = owners.get(&application.user_id);
            ApplicationView::new(application, owner)
        })
        .collect();

    Ok(Json(ResponseRedactor::redact_all(&views, principal.role)))
}

/// admin_create_user
///
/// [Admin Route] Creates an account with an explicit role, e.g. a helper.
#[utoipa::path(
    post,
    path = "/admin/users",
    request_body = AdminCreateUserRequest,
    responses(
        (status = 201, description = "User created", body = PublicUser),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 401, description = "Access denied", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody)
    )
)]
pub async fn admin_create_user(
    principal: Principal,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<AdminCreateUserRequest>,
) -> ApiResult<(StatusCode, Json<PublicUser>)> {
    AccessController::authorize(&principal, ADMINISTER, None)?;

    let (request, role) = payload.into_parts();
    let user = state.users.register(request, role).await?;
    tracing::info!(created_by = principal.user_id, user_id = user.id, %role, "user created by administrator");
    Ok((StatusCode::CREATED, Json(user.to_public())))
}

/// admin_update_status
///
/// [Admin Route] Moves an application to another review status.
#[utoipa::path(
    put,
    path = "/admin/applications/{application_id}/status",
    params(("application_id" = i64, Path, description = "Application ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApplicationView),
        (status = 400, description = "Unknown status", body = ErrorBody),
        (status = 401, description = "Access denied", body = ErrorBody),
        (status = 404, description = "Unknown application", body = ErrorBody)
    )
)]
pub async fn admin_update_status(
    principal: Principal,
    State(state): State<AppState>,
    Path(application_id): Path<i64>,
    ApiJson(payload): ApiJson<UpdateStatusRequest>,
) -> ApiResult<Json<ApplicationView>> {
    AccessController::authorize(&principal, ADMINISTER, None)?;

    let status = ApplicationStatus::parse(payload.status.trim()).ok_or_else(|| {
        ApiError::validation(format!("Unknown application status {:?}", payload.status))
    })?;

    let current = bounded(state.config.repo_timeout, state.repo.get_application(application_id))
        .await
        .optional()?
        .ok_or(ApiError::NotFound("application"))?;

    let application = bounded(
        state.config.repo_timeout,
        state
            .repo
            .update_application_status(application_id, status.as_str(), state.clock.now()),
    )
    .await
    .optional()?
    .ok_or(ApiError::NotFound("application"))?;

    tracing::info!(
        application_id,
        from = %current.status,
        status = status.as_str(),
        changed_by = principal.user_id,
        "application status changed"
    );
    Ok(Json(present(&state, application, principal.role).await?))
}
