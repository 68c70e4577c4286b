use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use url::Url;

/// Largest number of ids sent to the store in one delete call.
pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub reconciliation: ReconciliationConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
    /// Seconds
    pub request_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Seconds
    pub acquire_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    pub batch_size: usize,
    pub fetch_retry_attempts: usize,
    pub fetch_retry_delay_ms: u64,
    pub max_concurrent_shops: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: String,
    pub file_enabled: bool,
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub endpoint: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            request_timeout: 30,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/catalog.db".to_string(),
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: 30,
        }
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            fetch_retry_attempts: 3,
            fetch_retry_delay_ms: 200,
            max_concurrent_shops: 4,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: "logs".to_string(),
            file_enabled: false,
            json: false,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "/metrics".to_string(),
        }
    }
}

impl AppConfig {
    /// Layers `default`, the `RUN_MODE` file and `local` from `config_dir`,
    /// then `RESALE__*` environment variables on top.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        let layer = |name: &str| config_dir.join(name).to_string_lossy().into_owned();

        let s = Config::builder()
            .add_source(File::with_name(&layer("default")))
            .add_source(File::with_name(&layer(&run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name(&layer("local")).required(false))
            .add_source(Environment::with_prefix("RESALE").separator("__"))
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate server configuration
        if self.server.port == 0 {
            return Err(ConfigError::Message("Server port must be greater than 0".into()));
        }

        if Url::parse(&self.server.base_url).is_err() {
            return Err(ConfigError::Message("Invalid base URL format".into()));
        }

        // Validate database configuration
        if !self.database.url.starts_with("sqlite:") {
            return Err(ConfigError::Message("Database url must use the sqlite: scheme".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message(
                "Database max_connections must be greater than 0".into(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Message(
                "Database min_connections cannot exceed max_connections".into(),
            ));
        }

        // Validate reconciliation configuration
        if self.reconciliation.batch_size == 0 || self.reconciliation.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::Message(format!(
                "Reconciliation batch_size must be between 1 and {}",
                MAX_BATCH_SIZE
            )));
        }

        if self.reconciliation.max_concurrent_shops == 0 {
            return Err(ConfigError::Message(
                "Reconciliation max_concurrent_shops must be greater than 0".into(),
            ));
        }

        // Validate logging configuration
        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            return Err(ConfigError::Message(format!(
                "Invalid logging level: {}",
                self.logging.level
            )));
        }

        // Validate metrics configuration
        if self.metrics.enabled && !self.metrics.endpoint.starts_with('/') {
            return Err(ConfigError::Message("Metrics endpoint must start with '/'".into()));
        }

        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
