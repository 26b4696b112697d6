use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Prefix shared by every environment variable the service reads
pub const ENV_PREFIX: &str = "QKART";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {message}")]
    LoadError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_timeout")]
    pub request_timeout_seconds: u64,
}

/// Where carts, users and products are stored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    DynamoDb,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_users_table")]
    pub users_table_name: String,
    #[serde(default = "default_products_table")]
    pub products_table_name: String,
    #[serde(default = "default_carts_table")]
    pub carts_table_name: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Overrides the DynamoDB endpoint, e.g. for DynamoDB Local
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub auto_create_tables: bool,
    /// JSON seed loaded into the memory backend at startup
    #[serde(default)]
    pub seed_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_service_version")]
    pub service_version: String,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub enable_json_logging: bool,
}

impl Config {
    /// Load `QKART_*` variables from the process environment
    pub fn from_environment() -> Result<Self, ConfigError> {
        Self::from_source(config::Environment::with_prefix(ENV_PREFIX))
    }

    /// Load from an explicit environment source and validate the result
    pub fn from_source(source: config::Environment) -> Result<Self, ConfigError> {
        info!("Loading configuration from environment");

        let settings = config::Config::builder()
            .add_source(source)
            .build()
            .map_err(|e| ConfigError::LoadError {
                message: format!("Failed to load config: {}", e),
            })?;

        let config = Config {
            server: deserialize_section(&settings, "server")?,
            database: deserialize_section(&settings, "database")?,
            observability: deserialize_section(&settings, "observability")?,
        };

        config.validate()?;

        info!("Configuration loaded successfully");
        debug!("Configuration: {:?}", config);

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError {
                message: "Server port cannot be 0".to_string(),
            });
        }

        if self.server.request_timeout_seconds == 0 {
            return Err(ConfigError::ValidationError {
                message: "Request timeout cannot be 0".to_string(),
            });
        }

        for (name, value) in [
            ("Users", &self.database.users_table_name),
            ("Products", &self.database.products_table_name),
            ("Carts", &self.database.carts_table_name),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError {
                    message: format!("{} table name cannot be empty", name),
                });
            }
        }

        if self.database.seed_file.is_some() && self.database.backend != StorageBackend::Memory {
            warn!("Seed file is only loaded by the memory backend and will be ignored");
        }

        Ok(())
    }
}

fn deserialize_section<T: serde::de::DeserializeOwned>(
    settings: &config::Config,
    section: &str,
) -> Result<T, ConfigError> {
    settings
        .clone()
        .try_deserialize()
        .map_err(|e| ConfigError::LoadError {
            message: format!("Failed to deserialize {} config: {}", section, e),
        })
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl DatabaseConfig {
    /// Build a DynamoDB client for the configured region and optional endpoint
    pub async fn dynamodb_client(&self) -> DynamoDbClient {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(self.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config);
        if let Some(endpoint_url) = &self.endpoint_url {
            info!("Using DynamoDB endpoint {}", endpoint_url);
            builder = builder.endpoint_url(endpoint_url);
        }

        DynamoDbClient::from_conf(builder.build())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            users_table_name: default_users_table(),
            products_table_name: default_products_table(),
            carts_table_name: default_carts_table(),
            region: default_region(),
            endpoint_url: None,
            auto_create_tables: false,
            seed_file: None,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            service_version: default_service_version(),
            otlp_endpoint: None,
            log_level: default_log_level(),
            enable_json_logging: false,
        }
    }
}

// Default value functions
pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    8082
}

pub(crate) fn default_timeout() -> u64 {
    30
}

pub(crate) fn default_users_table() -> String {
    "QKartUsers".to_string()
}

pub(crate) fn default_products_table() -> String {
    "QKartProducts".to_string()
}

pub(crate) fn default_carts_table() -> String {
    "QKartCarts".to_string()
}

pub(crate) fn default_region() -> String {
    "us-east-1".to_string()
}

pub(crate) fn default_service_name() -> String {
    "qkart-rs".to_string()
}

pub(crate) fn default_service_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

pub(crate) fn default_log_level() -> String {
    "info".to_string()
}
