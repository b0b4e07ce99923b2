pub mod app_config;
pub mod classes;

pub use app_config::{AppConfig, ObservabilityConfig, ServerConfig, StorageBackend, StorageConfig};
pub use classes::{ClassConfig, ClassesConfiguration, MethodConfig, ResultSource};
