use chrono::{DateTime, Utc};
use rand::{Rng, distributions::Alphanumeric};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::{
    clock::ClockState,
    models::Token,
    repository::{RepoError, RepoResultExt, RepositoryState, bounded},
};

/// Length of every issued token value.
pub const TOKEN_LENGTH: usize = 16;

/// How many fresh values to try when a generated value collides with a live token.
const ISSUE_ATTEMPTS: usize = 3;

/// Draws a token value of [`TOKEN_LENGTH`] characters from `[0-9A-Za-z]`
/// using the thread-local CSPRNG.
pub fn generate_token_value() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// TokenStore
///
/// Session token persistence on top of the repository. Every call is bounded
/// by the configured repository timeout.
#[derive(Clone)]
pub struct TokenStore {
    repo: RepositoryState,
    timeout: Duration,
}

impl TokenStore {
    pub fn new(repo: RepositoryState, timeout: Duration) -> Self {
        Self { repo, timeout }
    }

    /// Creates and persists a new token for `user_id`. The insert is the only
    /// write, so a token is either fully stored or not stored at all.
    pub async fn issue(&self, user_id: i64, expires: DateTime<Utc>) -> Result<Token, RepoError> {
        let mut attempt = 1;
        loop {
            let token = Token {
                user_id,
                value: generate_token_value(),
                expires,
            };

            match bounded(self.timeout, self.repo.set_token(&token)).await {
                Ok(()) => return Ok(token),
                Err(RepoError::Conflict(_)) if attempt < ISSUE_ATTEMPTS => {
                    tracing::warn!(user_id, attempt, "generated token value collided, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn lookup(&self, value: &str) -> Result<Option<Token>, RepoError> {
        bounded(self.timeout, self.repo.get_token(value)).await.optional()
    }

    /// Deletes the token. Returns `false` if it was already gone.
    pub async fn revoke(&self, value: &str) -> Result<bool, RepoError> {
        match bounded(self.timeout, self.repo.del_token(value)).await {
            Ok(()) => Ok(true),
            Err(RepoError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Purges every token that expired at or before `now`.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<u64, RepoError> {
        bounded(self.timeout, self.repo.del_expired_tokens(now)).await
    }

    /// Runs [`sweep`](Self::sweep) every `every` until the runtime shuts down.
    /// `every` must be non-zero; [`AppConfig::load`](crate::AppConfig::load) rejects a zero interval.
    pub fn spawn_sweeper(self, clock: ClockState, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.sweep(clock.now()).await {
                    Ok(0) => {}
                    Ok(purged) => tracing::info!(purged, "expired session tokens removed"),
                    Err(e) => tracing::error!(error = %e, "token sweep failed"),
                }
            }
        })
    }
}
