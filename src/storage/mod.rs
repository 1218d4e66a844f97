pub mod local;
pub mod remote;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{Config, StorageBackend};
use crate::errors::RelayError;
use crate::messages::StorageReference;

pub use local::LocalObjectStore;
pub use remote::HttpObjectStore;

/// Durable object storage for relayed attachments.
///
/// `put` overwrites an existing object under the same key, so retrying an
/// upload is idempotent.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<StorageReference, RelayError>;

    fn bucket(&self) -> &str;
}

/// Deterministic object key for a message: `<organization>/<message id>`.
///
/// Each segment is percent-encoded, so distinct pairs always get distinct keys.
pub fn storage_key(organization_id: &str, provider_message_id: &str) -> String {
    format!(
        "{}/{}",
        key_segment(organization_id),
        key_segment(provider_message_id)
    )
}

/// Reversible single-segment encoding. Leading dots are escaped too, so a
/// segment is never `.` or `..`; an empty input becomes a lone `%`, which
/// percent-encoding never produces.
fn key_segment(raw: &str) -> String {
    if raw.is_empty() {
        return "%".to_string();
    }
    let encoded = urlencoding::encode(raw);
    let dots = encoded.bytes().take_while(|&b| b == b'.').count();
    format!("{}{}", "%2E".repeat(dots), &encoded[dots..])
}

pub fn build_object_store(config: &Config) -> anyhow::Result<Arc<dyn ObjectStore>> {
    let storage = &config.storage;
    Ok(match storage.backend {
        StorageBackend::Local => Arc::new(LocalObjectStore::new(
            config.storage_root()?,
            &storage.bucket,
        )),
        StorageBackend::Http => Arc::new(HttpObjectStore::new(
            &storage.base_url,
            &storage.bucket,
            &storage.service_key,
            config.provider.timeout_secs,
        )),
    })
}
