use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::warn;

use crate::errors::RelayError;

/// Generates a `Debug` impl that redacts secret fields.
///
/// Field specifiers:
/// - `field_name`: printed normally via `&self.field_name`
/// - `redact(field_name)`: `String` field: shows `[empty]` or `[REDACTED]`
macro_rules! redact_debug {
    (@field $builder:ident, $self:ident, redact($field:ident)) => {
        $builder.field(
            stringify!($field),
            &if $self.$field.is_empty() {
                "[empty]"
            } else {
                "[REDACTED]"
            },
        );
    };
    (@field $builder:ident, $self:ident, $field:ident) => {
        $builder.field(stringify!($field), &$self.$field);
    };

    (@fields $builder:ident, $self:ident,) => {};
    (@fields $builder:ident, $self:ident, redact($field:ident), $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, redact($field));
        redact_debug!(@fields $builder, $self, $($rest)*);
    };
    (@fields $builder:ident, $self:ident, $field:ident, $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, $field);
        redact_debug!(@fields $builder, $self, $($rest)*);
    };

    ($struct_name:ident, $($fields:tt)*) => {
        impl std::fmt::Debug for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let mut builder = f.debug_struct(stringify!($struct_name));
                redact_debug!(@fields builder, self, $($fields)*);
                builder.finish()
            }
        }
    };
}

/// Bucket the relay writes attachments to unless configured otherwise.
pub const DEFAULT_BUCKET: &str = "messaging-media";

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    18_790
}

fn default_webhook_path() -> String {
    "/webhook/whatsapp".to_string()
}

fn default_max_body_bytes() -> usize {
    1_048_576
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_webhook_path", rename = "webhookPath")]
    pub webhook_path: String,
    #[serde(default = "default_max_body_bytes", rename = "maxBodyBytes")]
    pub max_body_bytes: usize,
    #[serde(default)]
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            webhook_path: default_webhook_path(),
            max_body_bytes: default_max_body_bytes(),
            cors: CorsConfig::default(),
        }
    }
}

fn default_allow_origin() -> String {
    "*".to_string()
}

fn default_allow_headers() -> Vec<String> {
    ["authorization", "x-client-info", "apikey", "content-type"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_allow_methods() -> Vec<String> {
    ["GET", "POST", "OPTIONS"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Cross-origin headers attached to webhook responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_allow_origin", rename = "allowOrigin")]
    pub allow_origin: String,
    #[serde(default = "default_allow_headers", rename = "allowHeaders")]
    pub allow_headers: Vec<String>,
    #[serde(default = "default_allow_methods", rename = "allowMethods")]
    pub allow_methods: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origin: default_allow_origin(),
            allow_headers: default_allow_headers(),
            allow_methods: default_allow_methods(),
        }
    }
}

// ---------------------------------------------------------------------------
// Messaging provider
// ---------------------------------------------------------------------------

fn default_api_base() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_api_version() -> String {
    "v18.0".to_string()
}

fn default_max_media_bytes() -> usize {
    // Largest attachment the provider accepts (documents).
    100 * 1024 * 1024
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, rename = "accessToken")]
    pub access_token: String,
    /// App secret used to verify `X-Hub-Signature-256`. Empty disables the check.
    #[serde(default, rename = "appSecret")]
    pub app_secret: String,
    #[serde(default, rename = "verifyToken")]
    pub verify_token: String,
    #[serde(default = "default_api_base", rename = "apiBase")]
    pub api_base: String,
    #[serde(default = "default_api_version", rename = "apiVersion")]
    pub api_version: String,
    #[serde(default = "default_max_media_bytes", rename = "maxMediaBytes")]
    pub max_media_bytes: usize,
    #[serde(default = "default_timeout_secs", rename = "timeoutSecs")]
    pub timeout_secs: u64,
    /// Maps the receiving phone number id to the owning organization.
    /// Unmapped numbers use the phone number id itself.
    #[serde(default)]
    pub organizations: HashMap<String, String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            app_secret: String::new(),
            verify_token: String::new(),
            api_base: default_api_base(),
            api_version: default_api_version(),
            max_media_bytes: default_max_media_bytes(),
            timeout_secs: default_timeout_secs(),
            organizations: HashMap::new(),
        }
    }
}

redact_debug!(
    ProviderConfig,
    redact(access_token),
    redact(app_secret),
    redact(verify_token),
    api_base,
    api_version,
    max_media_bytes,
    timeout_secs,
    organizations,
);

impl ProviderConfig {
    pub fn organization_for(&self, phone_number_id: &str) -> String {
        self.organizations
            .get(phone_number_id)
            .cloned()
            .unwrap_or_else(|| phone_number_id.to_string())
    }
}

// ---------------------------------------------------------------------------
// Object storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    Http,
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Root directory for the local backend. Empty means `<home>/storage`.
    #[serde(default)]
    pub root: String,
    #[serde(default, rename = "baseUrl")]
    pub base_url: String,
    #[serde(default, rename = "serviceKey")]
    pub service_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            bucket: default_bucket(),
            root: String::new(),
            base_url: String::new(),
            service_key: String::new(),
        }
    }
}

redact_debug!(
    StorageConfig,
    backend,
    bucket,
    root,
    base_url,
    redact(service_key),
);

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    /// `SQLite` file path. Empty means `<home>/relay.db`.
    #[serde(default)]
    pub path: String,
}

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl Config {
    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        if self.database.path.is_empty() {
            Ok(crate::utils::get_relay_home()?.join("relay.db"))
        } else {
            Ok(crate::utils::expand_home(&self.database.path))
        }
    }

    pub fn storage_root(&self) -> anyhow::Result<PathBuf> {
        if self.storage.root.is_empty() {
            Ok(crate::utils::get_relay_home()?.join("storage"))
        } else {
            Ok(crate::utils::expand_home(&self.storage.root))
        }
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        self.validate_server()?;
        self.validate_provider()?;
        self.validate_storage()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), RelayError> {
        let s = &self.server;
        if s.port == 0 {
            return Err(RelayError::Config("server.port must be > 0".into()));
        }
        if s.port < 1024 {
            warn!(
                "server.port {} is a privileged port (< 1024), may require elevated permissions",
                s.port
            );
        }
        if !s.webhook_path.starts_with('/') {
            return Err(RelayError::Config(
                "server.webhookPath must start with '/'".into(),
            ));
        }
        if s.webhook_path == "/health" {
            return Err(RelayError::Config(
                "server.webhookPath conflicts with the health endpoint".into(),
            ));
        }
        if s.max_body_bytes == 0 {
            return Err(RelayError::Config("server.maxBodyBytes must be > 0".into()));
        }
        if s.cors.allow_origin.is_empty() {
            return Err(RelayError::Config(
                "server.cors.allowOrigin must not be empty".into(),
            ));
        }
        Ok(())
    }

    fn validate_provider(&self) -> Result<(), RelayError> {
        let p = &self.provider;
        if url::Url::parse(&p.api_base).is_err() {
            return Err(RelayError::Config(format!(
                "provider.apiBase is not a valid URL: {}",
                p.api_base
            )));
        }
        if p.api_version.is_empty() || p.api_version.contains('/') {
            return Err(RelayError::Config(
                "provider.apiVersion must be a single path segment like v18.0".into(),
            ));
        }
        if p.max_media_bytes == 0 {
            return Err(RelayError::Config(
                "provider.maxMediaBytes must be > 0".into(),
            ));
        }
        if p.timeout_secs == 0 {
            return Err(RelayError::Config("provider.timeoutSecs must be > 0".into()));
        }
        if p.access_token.is_empty() {
            warn!("provider.accessToken is empty, media downloads will fail");
        }
        if p.app_secret.is_empty() {
            warn!("provider.appSecret is empty, webhook signatures will not be verified");
        }
        Ok(())
    }

    fn validate_storage(&self) -> Result<(), RelayError> {
        let s = &self.storage;
        if s.bucket.is_empty() || s.bucket.contains('/') {
            return Err(RelayError::Config(
                "storage.bucket must be a non-empty name without '/'".into(),
            ));
        }
        if s.backend == StorageBackend::Http {
            let Ok(parsed) = url::Url::parse(&s.base_url) else {
                return Err(RelayError::Config(format!(
                    "storage.baseUrl is not a valid URL: {}",
                    s.base_url
                )));
            };
            if parsed.scheme() != "https"
                && !parsed
                    .host_str()
                    .is_some_and(|h| h == "localhost" || h.starts_with("127."))
            {
                warn!(
                    "storage.baseUrl uses {} (not HTTPS), service key will travel in clear text",
                    parsed.scheme()
                );
            }
            if s.service_key.is_empty() {
                return Err(RelayError::Config(
                    "storage.serviceKey is required for the http backend".into(),
                ));
            }
        }
        Ok(())
    }
}
