pub mod credentials;
pub mod loader;
pub mod schema;

pub use loader::{get_config_path, load_config, save_config};
pub use schema::{
    Config, CorsConfig, DEFAULT_BUCKET, DatabaseConfig, ProviderConfig,
    ServerConfig, StorageBackend, StorageConfig,
};
