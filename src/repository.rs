use crate::models::{
    Application, Comment, NewApplication, NewComment, NewUser, Role, Token, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::{
    collections::{BTreeMap, HashMap},
    future::Future,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use thiserror::Error;

/// RepoError
///
/// What a persistence call can report. `NotFound` is kept apart from transport
/// failures so callers can tell "no such token" from "database unreachable".
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("record not found")]
    NotFound,
    #[error("uniqueness violated: {0}")]
    Conflict(String),
    #[error("repository call timed out after {0:?}")]
    Timeout(Duration),
    #[error("repository backend failure: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepoError::Conflict(db.constraint().unwrap_or("unique").to_string())
            }
            other => RepoError::Backend(other.to_string()),
        }
    }
}

/// Turns the `NotFound` case of a repository result into `None`.
pub trait RepoResultExt<T> {
    fn optional(self) -> Result<Option<T>, RepoError>;
}

impl<T> RepoResultExt<T> for Result<T, RepoError> {
    fn optional(self) -> Result<Option<T>, RepoError> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(RepoError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// bounded
///
/// Runs a repository call with an upper time limit. A call that does not finish
/// in time is dropped and reported as `RepoError::Timeout`.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, RepoError>
where
    F: Future<Output = Result<T, RepoError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(?limit, "repository call exceeded its time limit");
            Err(RepoError::Timeout(limit))
        }
    }
}

/// Repository Trait
///
/// The persistence contract consumed by the gateway. Implementations own their
/// own consistency: token values and user emails are unique, and each user has
/// at most one application.
///
/// **Send + Sync + async_trait** are required so the trait object
/// (`Arc<dyn Repository>`) can be shared across request tasks.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Sessions ---
    async fn set_token(&self, token: &Token) -> Result<(), RepoError>;
    async fn get_token(&self, value: &str) -> Result<Token, RepoError>;
    // NotFound when no token had this value.
    async fn del_token(&self, value: &str) -> Result<(), RepoError>;
    // Deletes every token with `expires <= now` and reports how many went.
    async fn del_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, RepoError>;

    // --- Users ---
    async fn get_user(&self, id: i64) -> Result<User, RepoError>;
    async fn get_user_by_email(&self, email: &str) -> Result<User, RepoError>;
    async fn set_user(&self, user: NewUser) -> Result<User, RepoError>;
    async fn get_users(&self) -> Result<Vec<User>, RepoError>;

    // --- Applications ---
    async fn get_application(&self, id: i64) -> Result<Application, RepoError>;
    async fn get_application_of(&self, user_id: i64) -> Result<Application, RepoError>;
    async fn get_applications(&self, status: Option<&str>) -> Result<Vec<Application>, RepoError>;
    async fn set_application(&self, application: NewApplication) -> Result<Application, RepoError>;
    async fn update_application_status(
        &self,
        id: i64,
        status: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<Application, RepoError>;

    // --- Comments ---
    async fn get_comments(&self, application_id: i64) -> Result<Vec<Comment>, RepoError>;
    async fn set_comment(&self, comment: NewComment) -> Result<Comment, RepoError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

// --- Postgres ---

const USER_COLUMNS: &str = "id, email, first_name, last_name, password_hash, created_at, role_id";

const APPLICATION_COLUMNS: &str = "id, user_id, birthday, phone, nationality, country, city, zip, \
     address, address_extra, survey_data, gender, education_level, status, blocked_until, \
     created_at, edited_at";

/// Raw `users` row; the role column is validated on the way out.
#[derive(FromRow)]
struct UserRow {
    id: i64,
    email: String,
    first_name: String,
    last_name: String,
    password_hash: String,
    created_at: DateTime<Utc>,
    role_id: i32,
}

impl TryFrom<UserRow> for User {
    type Error = RepoError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = Role::try_from(row.role_id).map_err(|e| RepoError::Backend(e.to_string()))?;
        Ok(User {
            id: row.id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            password_hash: row.password_hash,
            created_at: row.created_at,
            role,
        })
    }
}

/// PostgresRepository
///
/// The production implementation of the `Repository` trait, backed by PostgreSQL.
/// The schema lives in `migrations/`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn set_token(&self, token: &Token) -> Result<(), RepoError> {
        sqlx::query("INSERT INTO auth_tokens (token, user_id, expires) VALUES ($1, $2, $3)")
            .bind(&token.value)
            .bind(token.user_id)
            .bind(token.expires)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_token(&self, value: &str) -> Result<Token, RepoError> {
        sqlx::query_as::<_, Token>(
            "SELECT user_id, token AS value, expires FROM auth_tokens WHERE token = $1",
        )
        .bind(value)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepoError::NotFound)
    }

    async fn del_token(&self, value: &str) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE token = $1")
            .bind(value)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn del_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE expires <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_user(&self, id: i64) -> Result<User, RepoError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, UserRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepoError::NotFound)?
            .try_into()
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, RepoError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, UserRow>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepoError::NotFound)?
            .try_into()
    }

    async fn set_user(&self, user: NewUser) -> Result<User, RepoError> {
        let query = format!(
            "INSERT INTO users (email, first_name, last_name, password_hash, created_at, role_id) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, UserRow>(&query)
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.password_hash)
            .bind(user.created_at)
            .bind(user.role.bits())
            .fetch_one(&self.pool)
            .await?
            .try_into()
    }

    async fn get_users(&self) -> Result<Vec<User>, RepoError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id");
        sqlx::query_as::<_, UserRow>(&query)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    async fn get_application(&self, id: i64) -> Result<Application, RepoError> {
        let query = format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = $1");
        sqlx::query_as::<_, Application>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn get_application_of(&self, user_id: i64) -> Result<Application, RepoError> {
        let query = format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE user_id = $1");
        sqlx::query_as::<_, Application>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn get_applications(&self, status: Option<&str>) -> Result<Vec<Application>, RepoError> {
        let query = format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications \
             WHERE ($1::text IS NULL OR status = $1) ORDER BY id"
        );
        let applications = sqlx::query_as::<_, Application>(&query)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;
        Ok(applications)
    }

    async fn set_application(&self, application: NewApplication) -> Result<Application, RepoError> {
        let query = format!(
            "INSERT INTO applications (user_id, birthday, phone, nationality, country, city, zip, \
             address, address_extra, survey_data, gender, education_level, status, created_at, edited_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14) \
             RETURNING {APPLICATION_COLUMNS}"
        );
        let created = sqlx::query_as::<_, Application>(&query)
            .bind(application.user_id)
            .bind(application.birthday)
            .bind(&application.phone)
            .bind(&application.nationality)
            .bind(&application.country)
            .bind(&application.city)
            .bind(&application.zip)
            .bind(&application.address)
            .bind(&application.address_extra)
            .bind(&application.survey_data)
            .bind(&application.gender)
            .bind(application.education_level)
            .bind(application.status.as_str())
            .bind(application.created_at)
            .fetch_one(&self.pool)
            .await?;
        Ok(created)
    }

    async fn update_application_status(
        &self,
        id: i64,
        status: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<Application, RepoError> {
        let query = format!(
            "UPDATE applications SET status = $2, edited_at = $3 WHERE id = $1 \
             RETURNING {APPLICATION_COLUMNS}"
        );
        sqlx::query_as::<_, Application>(&query)
            .bind(id)
            .bind(status)
            .bind(edited_at)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn get_comments(&self, application_id: i64) -> Result<Vec<Comment>, RepoError> {
        let comments = sqlx::query_as::<_, Comment>(
            "SELECT id, application_id, user_id, contents, created_at FROM comments \
             WHERE application_id = $1 ORDER BY created_at, id",
        )
        .bind(application_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(comments)
    }

    async fn set_comment(&self, comment: NewComment) -> Result<Comment, RepoError> {
        let created = sqlx::query_as::<_, Comment>(
            "INSERT INTO comments (application_id, user_id, contents, created_at) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, application_id, user_id, contents, created_at",
        )
        .bind(comment.application_id)
        .bind(comment.user_id)
        .bind(&comment.contents)
        .bind(comment.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }
}

// --- In-process implementation ---

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    tokens: HashMap<String, Token>,
    applications: BTreeMap<i64, Application>,
    comments: Vec<Comment>,
    last_user_id: i64,
    last_application_id: i64,
    last_comment_id: i64,
}

/// MemoryRepository
///
/// A `Repository` held entirely in process memory. Used when the service runs
/// locally without `DATABASE_URL`, and as the collaborator in tests. It applies
/// the same uniqueness rules as the Postgres schema.
#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, RepoError> {
        self.tables
            .lock()
            .map_err(|_| RepoError::Backend("memory repository lock poisoned".to_string()))
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn set_token(&self, token: &Token) -> Result<(), RepoError> {
        let mut tables = self.tables()?;
        if tables.tokens.contains_key(&token.value) {
            return Err(RepoError::Conflict("auth_tokens_pkey".to_string()));
        }
        tables.tokens.insert(token.value.clone(), token.clone());
        Ok(())
    }

    async fn get_token(&self, value: &str) -> Result<Token, RepoError> {
        self.tables()?
            .tokens
            .get(value)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn del_token(&self, value: &str) -> Result<(), RepoError> {
        self.tables()?
            .tokens
            .remove(value)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }

    async fn del_expired_tokens(&self, now: DateTime<Utc>) -> Result<u64, RepoError> {
        let mut tables = self.tables()?;
        let before = tables.tokens.len();
        tables.tokens.retain(|_, token| token.expires > now);
        Ok((before - tables.tokens.len()) as u64)
    }

    async fn get_user(&self, id: i64) -> Result<User, RepoError> {
        self.tables()?
            .users
            .get(&id)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, RepoError> {
        self.tables()?
            .users
            .values()
            .find(|user| user.email == email)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn set_user(&self, user: NewUser) -> Result<User, RepoError> {
        let mut tables = self.tables()?;
        if tables.users.values().any(|existing| existing.email == user.email) {
            return Err(RepoError::Conflict("users_email_key".to_string()));
        }

        tables.last_user_id += 1;
        let stored = User {
            id: tables.last_user_id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            password_hash: user.password_hash,
            created_at: user.created_at,
            role: user.role,
        };
        tables.users.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_users(&self) -> Result<Vec<User>, RepoError> {
        Ok(self.tables()?.users.values().cloned().collect())
    }

    async fn get_application(&self, id: i64) -> Result<Application, RepoError> {
        self.tables()?
            .applications
            .get(&id)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn get_application_of(&self, user_id: i64) -> Result<Application, RepoError> {
        self.tables()?
            .applications
            .values()
            .find(|application| application.user_id == user_id)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn get_applications(&self, status: Option<&str>) -> Result<Vec<Application>, RepoError> {
        Ok(self
            .tables()?
            .applications
            .values()
            .filter(|application| status.is_none_or(|wanted| application.status == wanted))
            .cloned()
            .collect())
    }

    async fn set_application(&self, application: NewApplication) -> Result<Application, RepoError> {
        let mut tables = self.tables()?;
        if !tables.users.contains_key(&application.user_id) {
            return Err(RepoError::Backend(format!(
                "applications.user_id {} references no user",
                application.user_id
            )));
        }
        if tables
            .applications
            .values()
            .any(|existing| existing.user_id == application.user_id)
        {
            return Err(RepoError::Conflict("applications_user_id_key".to_string()));
        }

        tables.last_application_id += 1;
        let stored = Application {
            id: tables.last_application_id,
            user_id: application.user_id,
            birthday: application.birthday,
            phone: application.phone,
            nationality: application.nationality,
            country: application.country,
            city: application.city,
            zip: application.zip,
            address: application.address,
            address_extra: application.address_extra,
            survey_data: application.survey_data,
            gender: application.gender,
            education_level: application.education_level,
            status: application.status.as_str().to_string(),
            blocked_until: None,
            created_at: application.created_at,
            edited_at: application.created_at,
        };
        tables.applications.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update_application_status(
        &self,
        id: i64,
        status: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<Application, RepoError> {
        let mut tables = self.tables()?;
        let application = tables.applications.get_mut(&id).ok_or(RepoError::NotFound)?;
        application.status = status.to_string();
        application.edited_at = edited_at;
        Ok(application.clone())
    }

    async fn get_comments(&self, application_id: i64) -> Result<Vec<Comment>, RepoError> {
        Ok(self
            .tables()?
            .comments
            .iter()
            .filter(|comment| comment.application_id == application_id)
            .cloned()
            .collect())
    }

    async fn set_comment(&self, comment: NewComment) -> Result<Comment, RepoError> {
        let mut tables = self.tables()?;
        if !tables.applications.contains_key(&comment.application_id) {
            return Err(RepoError::Backend(format!(
                "comments.application_id {} references no application",
                comment.application_id
            )));
        }

        tables.last_comment_id += 1;
        let stored = Comment {
            id: tables.last_comment_id,
            application_id: comment.application_id,
            user_id: comment.user_id,
            contents: comment.contents,
            created_at: comment.created_at,
        };
        tables.comments.push(stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApplicationStatus;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            password_hash: "hash".to_string(),
            created_at: Utc::now(),
            role: Role::Applicant,
        }
    }

    fn new_application(user_id: i64) -> NewApplication {
        NewApplication {
            user_id,
            birthday: None,
            phone: String::new(),
            nationality: String::new(),
            country: String::new(),
            city: String::new(),
            zip: String::new(),
            address: String::new(),
            address_extra: String::new(),
            survey_data: String::new(),
            gender: String::new(),
            education_level: 0,
            status: ApplicationStatus::Received,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn memory_repository_enforces_uniqueness() {
        let repo = MemoryRepository::new();
        let user = repo.set_user(new_user("bob@example.com")).await.unwrap();

        assert!(matches!(
            repo.set_user(new_user("bob@example.com")).await,
            Err(RepoError::Conflict(_))
        ));

        repo.set_application(new_application(user.id)).await.unwrap();
        assert!(matches!(
            repo.set_application(new_application(user.id)).await,
            Err(RepoError::Conflict(_))
        ));
        assert!(matches!(
            repo.set_application(new_application(user.id + 1)).await,
            Err(RepoError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let repo = MemoryRepository::new();
        assert!(matches!(repo.get_user(1).await, Err(RepoError::NotFound)));
        assert!(matches!(repo.del_token("nope").await, Err(RepoError::NotFound)));
        assert!(matches!(repo.get_user(1).await.optional(), Ok(None)));
    }

    #[tokio::test]
    async fn bounded_reports_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, RepoError>(())
        };
        let result = bounded(Duration::from_millis(10), slow).await;
        assert!(matches!(result, Err(RepoError::Timeout(_))));
    }
}
