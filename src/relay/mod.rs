//! Moves attachments from the messaging provider into object storage.
//!
//! One media message goes through
//! `Received -> MediaFetchAttempted -> {Uploaded | FetchOrUploadFailed} -> Persisted`.
//! Both branches end persisted. A failed branch keeps `original_media_id` in
//! metadata so [`MediaRelay::retry_pending`] can finish the transfer later.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::errors::{FetchError, RelayError};
use crate::messages::{
    InboundMessage, MediaAsset, MessageKind, MessageMetadata, StorageReference,
};
use crate::provider::MediaFetcher;
use crate::storage::{ObjectStore, storage_key};
use crate::store::{MessageStore, UpsertOutcome};
use crate::utils::media::{base_mime, sniff_image_mime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Received,
    MediaFetchAttempted,
    Uploaded,
    FetchOrUploadFailed,
    Persisted,
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::MediaFetchAttempted => "media_fetch_attempted",
            Self::Uploaded => "uploaded",
            Self::FetchOrUploadFailed => "fetch_or_upload_failed",
            Self::Persisted => "persisted",
        };
        f.write_str(s)
    }
}

/// How the media step of a relay ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaBranch {
    /// Text message, nothing to transfer.
    NoMedia,
    Uploaded,
    /// A previous delivery already stored the attachment.
    AlreadyStored,
    FetchOrUploadFailed,
}

#[derive(Debug, Clone)]
pub struct RelayOutcome {
    pub provider_message_id: String,
    pub kind: MessageKind,
    pub branch: MediaBranch,
    pub persisted: UpsertOutcome,
    pub storage_path: Option<String>,
}

impl RelayOutcome {
    pub fn needs_retry(&self) -> bool {
        self.branch == MediaBranch::FetchOrUploadFailed
    }
}

/// Counters from one pass of the retry job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryReport {
    pub attempted: usize,
    pub uploaded: usize,
    /// Provider no longer has the media; the row keeps its original id.
    pub expired: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct MediaRelay {
    fetcher: Arc<dyn MediaFetcher>,
    objects: Arc<dyn ObjectStore>,
    store: Arc<dyn MessageStore>,
}

impl MediaRelay {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        objects: Arc<dyn ObjectStore>,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            fetcher,
            objects,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    /// Relay and persist one inbound message.
    ///
    /// Fetch and upload failures degrade to a record without a storage path;
    /// only a persistence failure is returned as an error.
    pub async fn relay(&self, mut message: InboundMessage) -> Result<RelayOutcome, RelayError> {
        let id = message.provider_message_id.clone();
        trace_state(&id, RelayState::Received);

        let branch = match message.media_id().map(str::to_string) {
            Some(media_id) if message.kind.is_media() => {
                if let Some(stored) = self.already_stored(&id).await? {
                    debug!(
                        "message {}: media already stored at {}",
                        id,
                        stored.storage_path.as_deref().unwrap_or_default()
                    );
                    message.metadata = stored;
                    MediaBranch::AlreadyStored
                } else {
                    trace_state(&id, RelayState::MediaFetchAttempted);
                    match self.transfer(&message, &media_id).await {
                        Ok(reference) => {
                            message.attach(&reference);
                            trace_state(&id, RelayState::Uploaded);
                            MediaBranch::Uploaded
                        }
                        Err(e) => {
                            warn!(
                                "message {}: relay of media {} failed, keeping id for retry: {}",
                                id, media_id, e
                            );
                            trace_state(&id, RelayState::FetchOrUploadFailed);
                            MediaBranch::FetchOrUploadFailed
                        }
                    }
                }
            }
            _ => MediaBranch::NoMedia,
        };

        debug_assert!(message.metadata.is_recoverable(message.kind));
        let persisted = self.store.upsert(&message).await?;
        trace_state(&id, RelayState::Persisted);

        Ok(RelayOutcome {
            provider_message_id: id,
            kind: message.kind,
            branch,
            persisted,
            storage_path: message.metadata.storage_path,
        })
    }

    /// Metadata of a stored row that already has its attachment uploaded.
    async fn already_stored(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<MessageMetadata>, RelayError> {
        Ok(self
            .store
            .get(provider_message_id)
            .await?
            .map(|m| m.metadata)
            .filter(|meta| meta.storage_path.is_some()))
    }

    /// Fetch then upload. Errors here are always degradable.
    async fn transfer(
        &self,
        message: &InboundMessage,
        media_id: &str,
    ) -> Result<StorageReference, RelayError> {
        let asset = self.fetcher.fetch(media_id).await?;
        let content_type = stored_content_type(message.kind, &asset);
        let key = storage_key(&message.organization_id, &message.provider_message_id);
        self.objects
            .put(&key, &asset.bytes, &content_type)
            .await
    }

    /// Retry uploads for persisted media messages that have no storage path yet.
    pub async fn retry_pending(&self, limit: usize) -> Result<RetryReport, RelayError> {
        let pending = self.store.pending_media(limit).await?;
        let mut report = RetryReport::default();

        for message in pending {
            let Some(media_id) = message.media_id().map(str::to_string) else {
                continue;
            };
            report.attempted += 1;

            match self.transfer(&message, &media_id).await {
                Ok(reference) => {
                    self.store
                        .attach_storage_path(&message.provider_message_id, &reference)
                        .await?;
                    info!(
                        "retry: stored media {} for message {} at {}",
                        media_id, message.provider_message_id, reference.key
                    );
                    report.uploaded += 1;
                }
                Err(RelayError::Fetch(FetchError::NotFound { .. })) => {
                    warn!(
                        "retry: media {} for message {} has expired at the provider",
                        media_id, message.provider_message_id
                    );
                    report.expired += 1;
                }
                Err(e) => {
                    warn!(
                        "retry: media {} for message {} still failing: {}",
                        media_id, message.provider_message_id, e
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

/// Content type to store with an attachment. For images the bytes win over
/// a served type that disagrees with them.
fn stored_content_type(kind: MessageKind, asset: &MediaAsset) -> String {
    if kind == MessageKind::Image
        && let Some(sniffed) = sniff_image_mime(&asset.bytes)
        && base_mime(&asset.content_type).as_deref() != Some(sniffed)
    {
        warn!(
            "media {}: served as {} but bytes are {}, storing the latter",
            asset.media_id, asset.content_type, sniffed
        );
        return sniffed.to_string();
    }
    asset.content_type.clone()
}

fn trace_state(provider_message_id: &str, state: RelayState) {
    debug!("message {}: {}", provider_message_id, state);
}
