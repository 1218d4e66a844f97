pub mod sqlite;

use async_trait::async_trait;

use crate::errors::RelayError;
use crate::messages::{InboundMessage, StorageReference};

pub use sqlite::SqliteMessageStore;

/// Result of persisting one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First delivery of this provider message id.
    Inserted,
    /// Redelivery that contributed new metadata (e.g. a storage path).
    Updated,
    /// Redelivery with nothing new; the stored row is unchanged.
    Duplicate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total: u64,
    pub media: u64,
    pub pending_upload: u64,
}

/// Row store for inbound messages, unique on the provider message id.
///
/// Writes are idempotent: the provider delivers at least once, and a repeated
/// delivery must never create a second row or drop metadata already stored.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn upsert(&self, message: &InboundMessage) -> Result<UpsertOutcome, RelayError>;

    async fn get(&self, provider_message_id: &str) -> Result<Option<InboundMessage>, RelayError>;

    /// Media messages that still have no storage path, oldest first.
    async fn pending_media(&self, limit: usize) -> Result<Vec<InboundMessage>, RelayError>;

    /// Record a successful upload. Returns false if the message is unknown.
    async fn attach_storage_path(
        &self,
        provider_message_id: &str,
        reference: &StorageReference,
    ) -> Result<bool, RelayError>;

    async fn stats(&self) -> Result<StoreStats, RelayError>;
}
