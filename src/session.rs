use chrono::TimeDelta;
use thiserror::Error;

use crate::{
    auth::{ClientMeta, Principal},
    clock::ClockState,
    error::{ApiError, ApiResult},
    models::{LoginRequest, LoginResponse, LoginResult},
    repository::RepoError,
    token::TokenStore,
    users::UserStore,
};

/// Why a request failed authentication. Only ever logged; callers see a
/// single "access denied".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No `Authorization` header, or not of the form `Bearer <token>`.
    NoCredentials,
    /// Unknown token, or a token whose user no longer exists.
    InvalidToken,
    /// The token exists but its expiry has passed.
    ExpiredToken,
}

#[derive(Debug, Error)]
pub enum AuthFailure {
    #[error("authentication rejected: {0:?}")]
    Rejected(Rejection),
    #[error(transparent)]
    Repository(#[from] RepoError),
}

impl From<AuthFailure> for ApiError {
    fn from(failure: AuthFailure) -> Self {
        match failure {
            AuthFailure::Rejected(_) => ApiError::AccessDenied,
            AuthFailure::Repository(e) => ApiError::Internal(e.to_string()),
        }
    }
}

/// Extracts the token from an `Authorization` header value. The scheme is
/// matched case-sensitively and must be followed by exactly one non-empty token.
pub fn parse_bearer(header: Option<&str>) -> Option<&str> {
    let value = header?.strip_prefix("Bearer ")?;
    if value.is_empty() || value.contains(char::is_whitespace) {
        return None;
    }
    Some(value)
}

/// SessionAuthenticator
///
/// Issues sessions at login, resolves bearer tokens into a [`Principal`] on
/// every authenticated request, and revokes sessions at logout. Holds no mutable
/// state of its own; all cross-request state lives in the repository.
#[derive(Clone)]
pub struct SessionAuthenticator {
    tokens: TokenStore,
    users: UserStore,
    clock: ClockState,
    session_ttl: TimeDelta,
}

impl SessionAuthenticator {
    pub fn new(tokens: TokenStore, users: UserStore, clock: ClockState, session_ttl: TimeDelta) -> Self {
        Self {
            tokens,
            users,
            clock,
            session_ttl,
        }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    /// resolve
    ///
    /// The validation state machine: header → token → expiry → owning user.
    /// The returned failure carries the discriminated reason.
    pub async fn resolve(
        &self,
        authorization: Option<&str>,
        client: ClientMeta,
    ) -> Result<Principal, AuthFailure> {
        let value = parse_bearer(authorization).ok_or(AuthFailure::Rejected(Rejection::NoCredentials))?;

        let token = self
            .tokens
            .lookup(value)
            .await?
            .ok_or(AuthFailure::Rejected(Rejection::InvalidToken))?;

        if self.clock.now() >= token.expires {
            return Err(AuthFailure::Rejected(Rejection::ExpiredToken));
        }

        let user = self
            .users
            .get(token.user_id)
            .await?
            .filter(|user| user.id > 0)
            .ok_or(AuthFailure::Rejected(Rejection::InvalidToken))?;

        Ok(Principal {
            user_id: user.id,
            role: user.role,
            client,
            token: token.value,
        })
    }

    /// Like [`resolve`](Self::resolve), with every rejection logged and
    /// collapsed into [`ApiError::AccessDenied`].
    pub async fn authenticate(
        &self,
        authorization: Option<&str>,
        client: ClientMeta,
    ) -> ApiResult<Principal> {
        let remote_addr = client.remote_addr;
        self.resolve(authorization, client).await.map_err(|failure| {
            match &failure {
                AuthFailure::Rejected(reason) => {
                    tracing::warn!(?reason, ?remote_addr, "authentication rejected")
                }
                AuthFailure::Repository(e) => {
                    tracing::error!(error = %e, ?remote_addr, "authentication could not reach the repository")
                }
            }
            failure.into()
        })
    }

    /// login
    ///
    /// Exchanges credentials for a fresh session token. An unknown email and a
    /// wrong password produce the same `InvalidCredentials` error.
    pub async fn login(&self, request: LoginRequest, client: &ClientMeta) -> ApiResult<LoginResponse> {
        tracing::info!(remote_addr = ?client.remote_addr, user_agent = ?client.user_agent, "login called");

        if request.email.trim().is_empty() {
            return Err(ApiError::validation("You must provide an email address"));
        }
        if request.password.is_empty() {
            return Err(ApiError::validation("You must provide a password"));
        }

        let Some(user) = self.users.by_email(&request.email).await? else {
            tracing::warn!("login for unknown email");
            return Err(ApiError::InvalidCredentials);
        };

        if !self.users.verify_password(&user, &request.password).await? {
            tracing::warn!(user_id = user.id, "login with wrong password");
            return Err(ApiError::InvalidCredentials);
        }

        let expires = self
            .clock
            .now()
            .checked_add_signed(self.session_ttl)
            .ok_or_else(|| ApiError::internal("session expiry is out of range"))?;
        let token = self.tokens.issue(user.id, expires).await.map_err(|e| {
            ApiError::internal(format!("unable to persist session token: {e}"))
        })?;

        tracing::info!(user_id = user.id, %expires, "session issued");

        Ok(LoginResponse {
            token: token.value,
            token_expiry_seconds: self.session_ttl.num_seconds(),
            result: LoginResult::from(&user),
        })
    }

    /// Revokes the session that authenticated `principal`. Revoking a session
    /// that is already gone succeeds.
    pub async fn logout(&self, principal: &Principal) -> ApiResult<()> {
        let removed = self
            .tokens
            .revoke(&principal.token)
            .await
            .map_err(|e| ApiError::internal(format!("unable to delete token: {e}")))?;

        tracing::info!(user_id = principal.user_id, removed, "logout");
        Ok(())
    }
}
