use std::{
    env,
    fmt::{self, Display},
    net::SocketAddr,
    str::FromStr,
};

use crate::constants::{DEFAULT_BIND_ADDRESS, DEFAULT_MAX_CONNECTIONS, DEFAULT_SESSION_TTL_HOURS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str, String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "Environment variable {key} is not set"),
            ConfigError::Invalid(key, e) => write!(f, "Invalid {key} value: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Server settings read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: SocketAddr,
    pub session_secret: String,
    pub session_ttl_hours: i64,
    pub max_connections: u32,
}

impl Config {
    /// Loads `.env` when present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            log::debug!("No .env file loaded: {e}");
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            database_url: required(&lookup, "DATABASE_URL")?,
            bind_address: parsed(&lookup, "BIND_ADDRESS", DEFAULT_BIND_ADDRESS)?,
            session_secret: required(&lookup, "SESSION_SECRET")?,
            session_ttl_hours: parsed(
                &lookup,
                "SESSION_TTL_HOURS",
                &DEFAULT_SESSION_TTL_HOURS.to_string(),
            )?,
            max_connections: parsed(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                &DEFAULT_MAX_CONNECTIONS.to_string(),
            )?,
        };

        if config.session_ttl_hours <= 0 {
            return Err(ConfigError::Invalid(
                "SESSION_TTL_HOURS",
                String::from("must be positive"),
            ));
        }
        if config.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "DATABASE_MAX_CONNECTIONS",
                String::from("must be positive"),
            ));
        }

        Ok(config)
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parsed<F, T>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    let value = lookup(key).unwrap_or_else(|| {
        log::info!("{key} not set, using default: {default}");
        default.to_string()
    });

    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid(key, e.to_string()))
}
