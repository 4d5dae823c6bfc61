//! Connection settings for the Supabase database.
//!
//! Everything the connection handle needs is carried in a [`DbConfig`] value.
//! The process environment is only consulted by [`DbConfig::from_env`]; the
//! other constructors take their input explicitly.
//!
//! # Environment Variables
//!
//! - `DATABASE_URL`: Postgres connection string (required). The host may be
//!   left empty when a `host` query parameter names a Unix socket directory,
//!   e.g. `postgres:///postgres?host=/var/run/postgresql`.
//! - `APP_ENV`: `development` (default) or `production`
//! - `DB_SSL_MODE`: `disable`, `allow`, `prefer`, `require`, `verify-ca`, `verify-full`
//! - `DB_MAX_CONNECTIONS`: pool size once connected (default 5)
//! - `DB_CONNECT_TIMEOUT_SECS`: upper bound on the handshake (default: none)

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use url::Url;

pub const DATABASE_URL: &str = "DATABASE_URL";
pub const APP_ENV: &str = "APP_ENV";
pub const DB_SSL_MODE: &str = "DB_SSL_MODE";
pub const DB_MAX_CONNECTIONS: &str = "DB_MAX_CONNECTIONS";
pub const DB_CONNECT_TIMEOUT_SECS: &str = "DB_CONNECT_TIMEOUT_SECS";

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid value {value:?} for {name}: {reason}")]
    InvalidVar {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid database url: {0}")]
    InvalidUrl(String),

    #[error("failed to read env file: {0}")]
    EnvFile(#[from] dotenvy::Error),
}

/// Deployment environment, used to pick TLS defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" | "local" => Ok(Self::Development),
            "prod" | "production" => Ok(Self::Production),
            _ => Err("expected one of: development, production".to_string()),
        }
    }
}

impl Environment {
    /// Supabase only accepts TLS in production; local stacks usually run without it.
    pub fn default_ssl_mode(self) -> SslMode {
        match self {
            Self::Development => SslMode::Prefer,
            Self::Production => SslMode::Require,
        }
    }
}

/// TLS negotiation mode, mirroring libpq's `sslmode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disable" => Ok(Self::Disable),
            "allow" => Ok(Self::Allow),
            "prefer" => Ok(Self::Prefer),
            "require" => Ok(Self::Require),
            "verify-ca" => Ok(Self::VerifyCa),
            "verify-full" => Ok(Self::VerifyFull),
            _ => Err(
                "expected one of: disable, allow, prefer, require, verify-ca, verify-full"
                    .to_string(),
            ),
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disable => "disable",
            Self::Allow => "allow",
            Self::Prefer => "prefer",
            Self::Require => "require",
            Self::VerifyCa => "verify-ca",
            Self::VerifyFull => "verify-full",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: String,
    pub environment: Environment,
    pub ssl_mode: SslMode,
    pub max_connections: u32,
    /// `None` waits for the handshake indefinitely.
    pub connect_timeout: Option<Duration>,
}

impl DbConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        let environment = Environment::default();
        Self {
            database_url: database_url.into(),
            environment,
            ssl_mode: environment.default_ssl_mode(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout: None,
        }
    }

    /// Switches environment and resets the ssl mode to that environment's default.
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self.ssl_mode = environment.default_ssl_mode();
        self
    }

    pub fn with_ssl_mode(mut self, ssl_mode: SslMode) -> Self {
        self.ssl_mode = ssl_mode;
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from the variables in a dotenv-formatted file, without
    /// touching the process environment.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let vars = dotenvy::from_path_iter(path.as_ref())?
            .collect::<Result<HashMap<String, String>, _>>()?;
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as unset.
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get(DATABASE_URL).ok_or(ConfigError::MissingVar(DATABASE_URL))?;
        validate_url(&database_url)?;

        let environment = match get(APP_ENV) {
            Some(value) => parse_var(APP_ENV, value)?,
            None => Environment::default(),
        };

        let ssl_mode = match get(DB_SSL_MODE) {
            Some(value) => parse_var(DB_SSL_MODE, value)?,
            None => environment.default_ssl_mode(),
        };

        let max_connections = match get(DB_MAX_CONNECTIONS) {
            Some(value) => parse_positive(DB_MAX_CONNECTIONS, value)?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let connect_timeout = get(DB_CONNECT_TIMEOUT_SECS)
            .map(|value| parse_positive(DB_CONNECT_TIMEOUT_SECS, value))
            .transpose()?
            .map(|secs| Duration::from_secs(u64::from(secs)));

        let config = Self {
            database_url,
            environment,
            ssl_mode,
            max_connections,
            connect_timeout,
        };
        debug!(
            url = %config.redacted_url(),
            environment = ?config.environment,
            ssl_mode = %config.ssl_mode,
            max_connections = config.max_connections,
            "Loaded database config"
        );
        Ok(config)
    }

    /// The database url with its password masked, safe for logs.
    pub fn redacted_url(&self) -> String {
        match Url::parse(&self.database_url) {
            Ok(mut url) => {
                if url.password().is_some() && url.set_password(Some("***")).is_err() {
                    return "<unredactable url>".to_string();
                }
                url.to_string()
            }
            Err(_) => "<unparseable url>".to_string(),
        }
    }
}

/// Loads `.env` from the working directory or its parents. A missing file is
/// `Ok(None)`; a file that fails to parse is an error.
pub fn load_dotenv() -> Result<Option<PathBuf>, ConfigError> {
    found_or_absent(dotenvy::dotenv())
}

/// Same as [`load_dotenv`] for an explicit path.
pub fn load_dotenv_from(path: impl AsRef<Path>) -> Result<Option<PathBuf>, ConfigError> {
    let path = path.as_ref();
    found_or_absent(dotenvy::from_path(path).map(|()| path.to_path_buf()))
}

fn found_or_absent(result: dotenvy::Result<PathBuf>) -> Result<Option<PathBuf>, ConfigError> {
    match result {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(ConfigError::EnvFile(e)),
    }
}

fn validate_url(raw: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;
    if !matches!(url.scheme(), "postgres" | "postgresql") {
        return Err(ConfigError::InvalidUrl(format!(
            "unsupported scheme {:?}, expected postgres or postgresql",
            url.scheme()
        )));
    }
    // An empty authority is fine when the socket directory comes from `?host=`.
    let has_host_param = url.query_pairs().any(|(key, _)| key == "host");
    if url.host_str().is_none_or(str::is_empty) && !has_host_param {
        return Err(ConfigError::InvalidUrl("missing host".to_string()));
    }
    Ok(())
}

fn parse_var<T>(name: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr<Err = String>,
{
    value
        .parse()
        .map_err(|reason| ConfigError::InvalidVar { name, value, reason })
}

fn parse_positive(name: &'static str, value: String) -> Result<u32, ConfigError> {
    match value.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        Ok(_) => Err(ConfigError::InvalidVar {
            name,
            value,
            reason: "must be greater than zero".to_string(),
        }),
        Err(e) => Err(ConfigError::InvalidVar {
            name,
            value,
            reason: e.to_string(),
        }),
    }
}
