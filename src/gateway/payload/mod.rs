//! Provider webhook envelope.
//!
//! `{"object": ..., "entry": [{"changes": [{"value": {"metadata": {...},
//! "messages": [...], "statuses": [...]}}]}]}`. Only `messages` produce
//! records. Status callbacks are counted and dropped.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::errors::RelayError;
use crate::messages::{InboundMessage, MessageKind};

#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    pub object: String,
    pub entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub metadata: Option<PhoneMetadata>,
    #[serde(default)]
    pub messages: Vec<RawMessage>,
    #[serde(default)]
    pub statuses: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct PhoneMetadata {
    pub phone_number_id: String,
    #[serde(default)]
    pub display_phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawMessage {
    pub id: String,
    pub from: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextBody>,
    #[serde(default)]
    pub image: Option<MediaBody>,
    #[serde(default)]
    pub document: Option<MediaBody>,
    #[serde(default)]
    pub audio: Option<MediaBody>,
    #[serde(default)]
    pub video: Option<MediaBody>,
}

#[derive(Debug, Deserialize)]
pub struct TextBody {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct MediaBody {
    pub id: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

impl RawMessage {
    fn media(&self, kind: MessageKind) -> Option<&MediaBody> {
        match kind {
            MessageKind::Image => self.image.as_ref(),
            MessageKind::Document => self.document.as_ref(),
            MessageKind::Audio => self.audio.as_ref(),
            MessageKind::Video => self.video.as_ref(),
            MessageKind::Text => None,
        }
    }

    fn received_at(&self) -> DateTime<Utc> {
        self.timestamp
            .as_deref()
            .and_then(|ts| ts.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now)
    }
}

/// Messages extracted from one webhook call, in payload order.
#[derive(Debug, Default)]
pub struct ParsedBatch {
    pub messages: Vec<InboundMessage>,
    /// Unsupported types and media messages without a media id.
    pub skipped: usize,
    pub statuses: usize,
}

pub fn parse_envelope(body: &[u8]) -> Result<WebhookEnvelope, RelayError> {
    serde_json::from_slice(body).map_err(|e| RelayError::PayloadParse(e.to_string()))
}

/// Parse a raw webhook body into inbound messages.
pub fn parse_payload(body: &[u8], provider: &ProviderConfig) -> Result<ParsedBatch, RelayError> {
    let envelope = parse_envelope(body)?;
    Ok(extract_messages(&envelope, provider))
}

pub fn extract_messages(envelope: &WebhookEnvelope, provider: &ProviderConfig) -> ParsedBatch {
    let mut batch = ParsedBatch::default();

    for change in envelope.entry.iter().flat_map(|e| &e.changes) {
        let value = &change.value;
        batch.statuses += value.statuses.len();
        if value.messages.is_empty() {
            continue;
        }

        let Some(meta) = value.metadata.as_ref() else {
            warn!(
                "webhook change without phone metadata, skipping {} message(s)",
                value.messages.len()
            );
            batch.skipped += value.messages.len();
            continue;
        };
        let organization_id = provider.organization_for(&meta.phone_number_id);

        for raw in &value.messages {
            match to_inbound(raw, &organization_id) {
                Some(msg) => batch.messages.push(msg),
                None => batch.skipped += 1,
            }
        }
    }

    batch
}

fn to_inbound(raw: &RawMessage, organization_id: &str) -> Option<InboundMessage> {
    let Ok(kind) = raw.kind.parse::<MessageKind>() else {
        debug!("message {}: unsupported type {}, skipping", raw.id, raw.kind);
        return None;
    };

    let mut msg = if kind == MessageKind::Text {
        let body = raw.text.as_ref().map(|t| t.body.clone()).unwrap_or_default();
        InboundMessage::new_text(&raw.id, organization_id, &raw.from, body)
    } else {
        let Some(media) = raw.media(kind).filter(|m| !m.id.is_empty()) else {
            warn!("message {}: {} without media id, skipping", raw.id, kind);
            return None;
        };
        let caption = media.caption.clone().or_else(|| media.filename.clone());
        let mut msg =
            InboundMessage::new_media(&raw.id, organization_id, &raw.from, kind, &media.id, caption);
        msg.metadata.content_type.clone_from(&media.mime_type);
        msg
    };
    msg.received_at = raw.received_at();
    Some(msg)
}
