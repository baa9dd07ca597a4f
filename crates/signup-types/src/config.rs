use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Update-path hashing cost when `SIGNUP_HASH_COST` is unset. This is the
/// weakest value the hasher accepts; production deployments should override it.
pub const DEFAULT_HASH_COST: u32 = 1;
pub const DEFAULT_POOL_SIZE: usize = 10;
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("DATABASE_URL is not set; refusing to start without a database")]
    MissingDatabaseUrl,
    #[error("{name} has an invalid value: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Where the process is running. Production refuses to create a database
/// that does not exist yet; test keeps statement failures out of the error log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeploymentMode {
    #[default]
    Development,
    Production,
    Test,
}

impl FromStr for DeploymentMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            _ => Err(ConfigError::Invalid {
                name: "SIGNUP_ENV",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub mode: DeploymentMode,
    /// Argon2 iteration count used when a password is changed.
    pub hash_cost: u32,
    pub pool_size: usize,
    pub acquire_timeout: Duration,
}

impl Config {
    /// Read configuration from the process environment. Call once at startup.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::MissingDatabaseUrl)?;

        let mode = match lookup("SIGNUP_ENV") {
            Some(raw) => raw.parse()?,
            None => DeploymentMode::default(),
        };

        let hash_cost = parse_or("SIGNUP_HASH_COST", &lookup, DEFAULT_HASH_COST)?;
        if hash_cost == 0 {
            return Err(ConfigError::Invalid {
                name: "SIGNUP_HASH_COST",
                value: "0".into(),
            });
        }

        let pool_size = parse_or("SIGNUP_POOL_SIZE", &lookup, DEFAULT_POOL_SIZE)?;
        if pool_size == 0 {
            return Err(ConfigError::Invalid {
                name: "SIGNUP_POOL_SIZE",
                value: "0".into(),
            });
        }

        let timeout_ms = parse_or(
            "SIGNUP_ACQUIRE_TIMEOUT_MS",
            &lookup,
            DEFAULT_ACQUIRE_TIMEOUT_MS,
        )?;

        Ok(Self {
            database_url,
            mode,
            hash_cost,
            pool_size,
            acquire_timeout: Duration::from_millis(timeout_ms),
        })
    }
}

fn parse_or<F, T>(name: &'static str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(default),
    }
}
