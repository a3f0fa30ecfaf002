use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} must be a valid {expected}, got '{value}'")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Read `key` from the environment, falling back to `default` when unset.
pub fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            expected: std::any::type_name::<T>(),
            value,
        }),
        Err(_) => Ok(default),
    }
}

/// Read a required variable.
pub fn env_required(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::Missing(key))
}

/// Bounds on store writes made while a station lock is held.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Extra attempts after a failed write (default: `2`).
    pub commit_retries: u32,
    /// Pause between attempts (default: `50ms`).
    pub retry_backoff: Duration,
    /// Upper bound on a single write attempt (default: `2000ms`).
    pub commit_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            commit_retries: 2,
            retry_backoff: Duration::from_millis(50),
            commit_timeout: Duration::from_millis(2000),
        }
    }
}

impl DispatchConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default |
    /// |------------------------------|---------|
    /// | `DISPATCH_COMMIT_RETRIES`    | `2`     |
    /// | `DISPATCH_RETRY_BACKOFF_MS`  | `50`    |
    /// | `DISPATCH_COMMIT_TIMEOUT_MS` | `2000`  |
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let commit_retries = env_or("DISPATCH_COMMIT_RETRIES", defaults.commit_retries)?;
        let retry_backoff_ms: u64 = env_or(
            "DISPATCH_RETRY_BACKOFF_MS",
            defaults.retry_backoff.as_millis() as u64,
        )?;
        let commit_timeout_ms: u64 = env_or(
            "DISPATCH_COMMIT_TIMEOUT_MS",
            defaults.commit_timeout.as_millis() as u64,
        )?;

        if commit_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "DISPATCH_COMMIT_TIMEOUT_MS",
                expected: "positive integer",
                value: commit_timeout_ms.to_string(),
            });
        }

        Ok(Self {
            commit_retries,
            retry_backoff: Duration::from_millis(retry_backoff_ms),
            commit_timeout: Duration::from_millis(commit_timeout_ms),
        })
    }

    /// Total attempts a write gets, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.commit_retries + 1
    }
}
