/// Relay configuration, loaded from the environment at startup.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub database_url: String,
    pub tick_interval_secs: u64,
    pub batch_limit: i64,
    pub chunk_size: usize,
    pub sink_host: String,
    pub sink_database: String,
    pub sink_table_name: String,
    pub sink_user: String,
    pub sink_password: String,
    pub environment: String,
}

impl RelayConfig {
    /// Load configuration from the environment, falling back to
    /// development-friendly defaults for everything but `DATABASE_URL`.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| "DATABASE_URL must be set")?,
            tick_interval_secs: std::env::var("TICK_INTERVAL_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            batch_limit: std::env::var("BATCH_LIMIT")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .unwrap_or(500),
            chunk_size: std::env::var("CHUNK_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            sink_host: std::env::var("SINK_HOST")
                .unwrap_or_else(|_| "http://localhost:8123".to_string()),
            sink_database: std::env::var("SINK_DATABASE")
                .unwrap_or_else(|_| "default".to_string()),
            sink_table_name: std::env::var("SINK_TABLE_NAME")
                .unwrap_or_else(|_| "outbox_events".to_string()),
            sink_user: std::env::var("SINK_USER").unwrap_or_else(|_| "default".to_string()),
            sink_password: std::env::var("SINK_PASSWORD").unwrap_or_default(),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_database_url_is_an_error() {
        std::env::remove_var("DATABASE_URL");
        let result = RelayConfig::from_env();
        assert!(result.is_err());
    }

    #[test]
    fn defaults_apply_when_optional_vars_are_unset() {
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        std::env::remove_var("BATCH_LIMIT");
        let config = RelayConfig::from_env().unwrap();
        assert_eq!(config.batch_limit, 500);
        assert_eq!(config.chunk_size, 1000);
        std::env::remove_var("DATABASE_URL");
    }
}
