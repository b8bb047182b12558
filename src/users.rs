use std::time::Duration;

use crate::{
    clock::ClockState,
    error::{ApiError, ApiResult},
    models::{CreateUserRequest, NewUser, Role, User},
    password::PasswordHasher,
    repository::{RepoError, RepoResultExt, RepositoryState, bounded},
};

/// Shortest password accepted at registration.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Emails are compared and stored trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// UserStore
///
/// Account persistence plus credential handling. Password hashing and
/// verification are CPU-heavy and run on the blocking pool.
#[derive(Clone)]
pub struct UserStore {
    repo: RepositoryState,
    hasher: PasswordHasher,
    clock: ClockState,
    timeout: Duration,
}

impl UserStore {
    pub fn new(
        repo: RepositoryState,
        hasher: PasswordHasher,
        clock: ClockState,
        timeout: Duration,
    ) -> Self {
        Self {
            repo,
            hasher,
            clock,
            timeout,
        }
    }

    pub async fn get(&self, id: i64) -> Result<Option<User>, RepoError> {
        bounded(self.timeout, self.repo.get_user(id)).await.optional()
    }

    pub async fn by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        let email = normalize_email(email);
        bounded(self.timeout, self.repo.get_user_by_email(&email))
            .await
            .optional()
    }

    pub async fn list(&self) -> Result<Vec<User>, RepoError> {
        bounded(self.timeout, self.repo.get_users()).await
    }

    /// register
    ///
    /// Validates the request, hashes the password and stores the account with
    /// `role`. A duplicate email is a `Conflict`.
    pub async fn register(&self, request: CreateUserRequest, role: Role) -> ApiResult<User> {
        let email = normalize_email(&request.email);
        if email.is_empty() || !email.contains('@') {
            return Err(ApiError::validation("You must provide a valid email address"));
        }
        if request.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ApiError::validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if role == Role::None {
            return Err(ApiError::validation("A user must be given a role"));
        }

        let password_hash = self.hash_password(request.password).await?;
        let user = NewUser {
            email,
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            password_hash,
            created_at: self.clock.now(),
            role,
        };

        match bounded(self.timeout, self.repo.set_user(user)).await {
            Ok(created) => {
                tracing::info!(user_id = created.id, role = %created.role, "user registered");
                Ok(created)
            }
            Err(RepoError::Conflict(_)) => Err(ApiError::Conflict(
                "A user with this email address already exists".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Checks `password` against the stored hash of `user`.
    pub async fn verify_password(&self, user: &User, password: &str) -> ApiResult<bool> {
        let hasher = self.hasher.clone();
        let hashed = user.password_hash.clone();
        let password = password.to_string();

        let matched = tokio::task::spawn_blocking(move || hasher.verify(&password, &hashed))
            .await
            .map_err(|e| ApiError::internal(format!("password verification task failed: {e}")))??;
        Ok(matched)
    }

    async fn hash_password(&self, password: String) -> ApiResult<String> {
        let hasher = self.hasher.clone();
        let hashed = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| ApiError::internal(format!("password hashing task failed: {e}")))??;
        Ok(hashed)
    }
}
