use std::{
    convert::Infallible,
    net::{IpAddr, SocketAddr},
};

use axum::{
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{header, request::Parts},
};

use crate::{error::ApiError, models::Role, session::SessionAuthenticator};

/// Connection details of the caller, carried for logging only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMeta {
    pub remote_addr: Option<IpAddr>,
    pub user_agent: Option<String>,
}

impl ClientMeta {
    /// Reads the peer address (when the server was started with connect info)
    /// and the `User-Agent` header.
    pub fn from_parts(parts: &Parts) -> Self {
        let remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        Self {
            remote_addr,
            user_agent,
        }
    }
}

impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientMeta::from_parts(parts))
    }
}

/// Principal
///
/// The resolved identity of an authenticated request. Exists only for the
/// lifetime of that request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub role: Role,
    pub client: ClientMeta,
    /// The session token that authenticated this request, kept so logout can
    /// revoke exactly this session.
    pub token: String,
}

/// Principal extractor
///
/// Handlers behind the authentication route layer receive the principal the
/// middleware already resolved. Anywhere else the bearer token is validated
/// here, using the `SessionAuthenticator` from state.
///
/// Rejection: `ApiError::AccessDenied` (401) for any authentication failure,
/// `ApiError::Internal` (500) when the repository cannot be reached.
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
    SessionAuthenticator: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<Principal>() {
            return Ok(principal.clone());
        }

        let sessions = SessionAuthenticator::from_ref(state);
        let authorization = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let principal = sessions
            .authenticate(authorization, ClientMeta::from_parts(parts))
            .await?;

        parts.extensions.insert(principal.clone());
        Ok(principal)
    }
}
