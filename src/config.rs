use crate::core::db::{Credentials, RetryPolicy};
use crate::core::{Result, SqlHelperError};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `connection.password`.
pub const PASSWORD_ENV: &str = "SQLHELPER_PASSWORD";

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Connection-related configuration.
#[derive(Debug, Deserialize)]
pub struct ConnectionConfig {
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: Option<String>,
}

/// Default retry policy for statements run from the command line.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub exit_on_fail: bool,
    pub retries: u32,
    pub cooldown_secs: f64,
}

fn default_port() -> u16 {
    3306
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        RetryConfig {
            exit_on_fail: policy.exit_on_fail,
            retries: policy.retries,
            cooldown_secs: policy.cooldown.as_secs_f64(),
        }
    }
}

impl RetryConfig {
    /// `cooldown_secs` as a `Duration`; negative, NaN, infinite and
    /// out-of-range values are configuration errors.
    pub fn cooldown(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.cooldown_secs).map_err(|e| {
            SqlHelperError::Config(format!(
                "retry.cooldown_secs must be a non-negative number of seconds, got {}: {}",
                self.cooldown_secs, e
            ))
        })
    }
}

impl Config {
    pub fn credentials(&self) -> Credentials {
        let c = &self.connection;
        Credentials::new(&c.username, &c.password, &c.host, c.port, c.database.clone())
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        Ok(RetryPolicy {
            exit_on_fail: self.retry.exit_on_fail,
            retries: self.retry.retries,
            cooldown: self.retry.cooldown()?,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.connection.host.trim().is_empty() {
            return Err(SqlHelperError::Config("connection.host must not be empty".to_string()));
        }
        self.retry.cooldown()?;
        Ok(())
    }
}

/// Parses and validates configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).map_err(|e| SqlHelperError::Config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Loads configuration from a TOML file at the given path.
///
/// A non-empty `SQLHELPER_PASSWORD` environment variable replaces the
/// file's password.
///
/// # Example
///
/// ```no_run
/// let config = sqlhelper::config::load_config("config.toml").expect("Failed to load config");
/// println!("{:?}", config.retry);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| SqlHelperError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    let mut config = parse_config(&content)?;
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        if !password.is_empty() {
            config.connection.password = password;
        }
    }
    Ok(config)
}

/// `<config dir>/sqlhelper/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("sqlhelper").join("config.toml"))
}
