use towtruck_dispatch::config::{env_or, env_required, ConfigError};

/// Dispatcher process configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    /// PostgreSQL `LISTEN` channel carrying trigger messages.
    pub trigger_channel: String,
    /// Seconds to wait for background tasks on shutdown.
    pub shutdown_timeout_secs: u64,
    pub db_max_connections: u32,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default             |
    /// |----------------------------|---------------------|
    /// | `DATABASE_URL`             | required            |
    /// | `DISPATCH_TRIGGER_CHANNEL` | `dispatch_triggers` |
    /// | `SHUTDOWN_TIMEOUT_SECS`    | `5`                 |
    /// | `DB_MAX_CONNECTIONS`       | `20`                |
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env_required("DATABASE_URL")?;
        let trigger_channel = env_or("DISPATCH_TRIGGER_CHANNEL", "dispatch_triggers".to_string())?;
        if trigger_channel.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "DISPATCH_TRIGGER_CHANNEL",
                expected: "non-empty channel name",
                value: trigger_channel,
            });
        }

        Ok(Self {
            database_url,
            trigger_channel,
            shutdown_timeout_secs: env_or("SHUTDOWN_TIMEOUT_SECS", 5)?,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 20)?,
        })
    }
}
