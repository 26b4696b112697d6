pub mod config;
pub mod handlers;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod seed;
pub mod services;

pub use config::{Config, ConfigError, StorageBackend};
pub use handlers::create_app;
pub use observability::{init_observability, shutdown_observability, Metrics};
