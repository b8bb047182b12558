use std::{env, str::FromStr, time::Duration};

use chrono::{TimeDelta, Utc};
use thiserror::Error;

use crate::password::{HashCost, HashError};

/// Raised by [`AppConfig::load`] when the environment is incomplete or malformed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set when APP_ENV=production")]
    Missing(&'static str),
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
    #[error("password hash cost rejected: {0}")]
    HashCost(#[from] HashError),
}

/// Env
///
/// The runtime context. `Local` allows running without a database and logs in a
/// human-readable format; `Production` demands a database and logs JSON.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Env {
    Local,
    Production,
}

/// Credentials of an administrator created at startup when not yet registered.
#[derive(Clone, Debug)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

/// AppConfig
///
/// Immutable configuration loaded once at startup and shared through the
/// application state.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub env: Env,
    pub host: String,
    pub port: u16,
    /// Postgres connection string. `None` runs on the in-memory repository
    /// (local only).
    pub db_url: Option<String>,
    /// Lifetime of a freshly issued session token.
    pub session_ttl: Duration,
    /// Upper bound on every repository call made while handling a request.
    pub repo_timeout: Duration,
    /// Period of the expired-token sweeper.
    pub token_sweep_interval: Duration,
    pub hash_cost: HashCost,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Default for AppConfig {
    /// default
    ///
    /// A configuration for tests: local, no database, and a password hash cost
    /// low enough to keep test suites fast.
    fn default() -> Self {
        Self {
            env: Env::Local,
            host: "127.0.0.1".to_string(),
            port: 3000,
            db_url: None,
            session_ttl: Duration::from_secs(3600),
            repo_timeout: Duration::from_secs(5),
            token_sweep_interval: Duration::from_secs(300),
            hash_cost: HashCost {
                memory_kib: 1024,
                iterations: 1,
            },
            bootstrap_admin: None,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from the process environment. Anything missing
    /// falls back to a default except `DATABASE_URL` in production.
    pub fn load() -> Result<Self, ConfigError> {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let db_url = optional("DATABASE_URL");
        if env == Env::Production && db_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let bootstrap_admin = match (
            optional("BOOTSTRAP_ADMIN_EMAIL"),
            optional("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Some(email), Some(password)) => Some(BootstrapAdmin { email, password }),
            _ => None,
        };

        let defaults = HashCost::default();

        let config = Self {
            env,
            host: optional("APP_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed("APP_PORT", 3000)?,
            db_url,
            session_ttl: Duration::from_secs(nonzero("SESSION_TTL_SECS", 3600)?),
            repo_timeout: Duration::from_millis(nonzero("REPO_TIMEOUT_MS", 5000)?),
            token_sweep_interval: Duration::from_secs(nonzero("TOKEN_SWEEP_SECS", 300)?),
            hash_cost: HashCost {
                memory_kib: parsed("PASSWORD_HASH_MEMORY_KIB", defaults.memory_kib)?,
                iterations: parsed("PASSWORD_HASH_ITERATIONS", defaults.iterations)?,
            },
            bootstrap_admin,
        };
        config.session_ttl_delta()?;

        Ok(config)
    }

    /// The session lifetime as a calendar delta for expiry arithmetic. Fails
    /// when the lifetime is zero or a token issued now would expire past the
    /// last representable date.
    pub fn session_ttl_delta(&self) -> Result<TimeDelta, ConfigError> {
        TimeDelta::from_std(self.session_ttl)
            .ok()
            .filter(|ttl| *ttl > TimeDelta::zero() && Utc::now().checked_add_signed(*ttl).is_some())
            .ok_or_else(|| ConfigError::Invalid {
                name: "SESSION_TTL_SECS",
                value: self.session_ttl.as_secs().to_string(),
            })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn nonzero(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match parsed(name, default)? {
        0 => Err(ConfigError::Invalid {
            name,
            value: "0".to_string(),
        }),
        value => Ok(value),
    }
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
