use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of an inbound message. Everything except `Text` carries an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Document,
    Audio,
    Video,
}

impl MessageKind {
    pub fn is_media(self) -> bool {
        !matches!(self, Self::Text)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Document => "document",
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "document" => Ok(Self::Document),
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            other => Err(format!("unsupported message kind: {other}")),
        }
    }
}

/// Metadata persisted alongside each message.
///
/// Serialized as `{ original_media_id?, storage_path?, content_type? }`.
/// `original_media_id` is set once for media messages and never cleared, so a
/// failed relay can always be retried from the stored row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_media_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl MessageMetadata {
    /// A media record is recoverable when it has either been uploaded or still
    /// holds the provider id needed to fetch it again.
    pub fn is_recoverable(&self, kind: MessageKind) -> bool {
        if !kind.is_media() {
            return true;
        }
        self.storage_path.as_deref().is_some_and(|p| !p.is_empty())
            || self
                .original_media_id
                .as_deref()
                .is_some_and(|id| !id.is_empty())
    }

    pub fn needs_upload(&self) -> bool {
        self.storage_path.is_none() && self.original_media_id.is_some()
    }

    /// Fold in fields from a later write without dropping anything already known.
    ///
    /// Once a storage path is recorded, it and its content type are final.
    pub fn merge(&mut self, newer: &MessageMetadata) {
        if self.original_media_id.is_none() {
            self.original_media_id.clone_from(&newer.original_media_id);
        }
        if self.storage_path.is_some() {
            return;
        }
        if newer.storage_path.is_some() {
            self.storage_path.clone_from(&newer.storage_path);
            if newer.content_type.is_some() {
                self.content_type.clone_from(&newer.content_type);
            }
        } else if self.content_type.is_none() {
            self.content_type.clone_from(&newer.content_type);
        }
    }
}

/// One received communication, keyed by the provider's message id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub provider_message_id: String,
    pub organization_id: String,
    pub sender_id: String,
    pub kind: MessageKind,
    pub body: Option<String>,
    pub metadata: MessageMetadata,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new_text(
        provider_message_id: impl Into<String>,
        organization_id: impl Into<String>,
        sender_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            provider_message_id: provider_message_id.into(),
            organization_id: organization_id.into(),
            sender_id: sender_id.into(),
            kind: MessageKind::Text,
            body: Some(body.into()),
            metadata: MessageMetadata::default(),
            received_at: Utc::now(),
        }
    }

    /// Build a media message. The provider media id is recorded up front so
    /// the row stays recoverable whatever happens to the upload.
    pub fn new_media(
        provider_message_id: impl Into<String>,
        organization_id: impl Into<String>,
        sender_id: impl Into<String>,
        kind: MessageKind,
        media_id: impl Into<String>,
        caption: Option<String>,
    ) -> Self {
        debug_assert!(kind.is_media(), "new_media called with {kind}");
        Self {
            provider_message_id: provider_message_id.into(),
            organization_id: organization_id.into(),
            sender_id: sender_id.into(),
            kind,
            body: caption,
            metadata: MessageMetadata {
                original_media_id: Some(media_id.into()),
                ..MessageMetadata::default()
            },
            received_at: Utc::now(),
        }
    }

    pub fn media_id(&self) -> Option<&str> {
        self.metadata.original_media_id.as_deref()
    }

    pub fn attach(&mut self, reference: &StorageReference) {
        self.metadata.storage_path = Some(reference.key.clone());
        self.metadata.content_type = Some(reference.content_type.clone());
    }
}

/// Binary payload downloaded from the provider. Lives only for one request.
#[derive(Clone)]
pub struct MediaAsset {
    pub media_id: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for MediaAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaAsset")
            .field("media_id", &self.media_id)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Durable pointer to an uploaded object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageReference {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
}

#[cfg(test)]
mod tests;
