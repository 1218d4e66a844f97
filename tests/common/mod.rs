// Shared test helpers, not all items are used by every test binary.
#![allow(unused)]

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use sewdle_relay::config::Config;
use sewdle_relay::errors::{FetchError, RelayError};
use sewdle_relay::gateway::{GatewayState, build_router};
use sewdle_relay::messages::{InboundMessage, MediaAsset, StorageReference};
use sewdle_relay::provider::MediaFetcher;
use sewdle_relay::relay::MediaRelay;
use sewdle_relay::storage::ObjectStore;
use sewdle_relay::store::{MessageStore, StoreStats, UpsertOutcome};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

/// Fetcher that serves a fixed set of media ids and records every call.
#[derive(Default)]
pub struct RecordingFetcher {
    assets: Mutex<HashMap<String, MediaAsset>>,
    failing: Mutex<HashMap<String, FetchError>>,
    pub calls: Mutex<Vec<String>>,
}

impl RecordingFetcher {
    pub fn with_asset(self, media_id: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.serve(media_id, content_type, bytes);
        self
    }

    pub fn serve(&self, media_id: &str, content_type: &str, bytes: &[u8]) {
        self.failing.lock().unwrap().remove(media_id);
        self.assets.lock().unwrap().insert(
            media_id.to_string(),
            MediaAsset {
                media_id: media_id.to_string(),
                content_type: content_type.to_string(),
                bytes: bytes.to_vec(),
            },
        );
    }

    pub fn fail(&self, media_id: &str, err: FetchError) {
        self.assets.lock().unwrap().remove(media_id);
        self.failing
            .lock()
            .unwrap()
            .insert(media_id.to_string(), err);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaFetcher for RecordingFetcher {
    async fn fetch(&self, media_id: &str) -> Result<MediaAsset, RelayError> {
        self.calls.lock().unwrap().push(media_id.to_string());
        if let Some(err) = self.failing.lock().unwrap().get(media_id) {
            return Err(err.clone().into());
        }
        self.assets
            .lock()
            .unwrap()
            .get(media_id)
            .cloned()
            .ok_or_else(|| {
                FetchError::NotFound {
                    media_id: media_id.to_string(),
                }
                .into()
            })
    }
}

/// In-memory object store that records uploads.
#[derive(Default)]
pub struct RecordingObjectStore {
    pub objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    pub puts: Mutex<Vec<String>>,
    pub reject: Mutex<Option<String>>,
}

impl RecordingObjectStore {
    pub fn put_count(&self) -> usize {
        self.puts.lock().unwrap().len()
    }

    pub fn object(&self, key: &str) -> Option<(Vec<u8>, String)> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl ObjectStore for RecordingObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<StorageReference, RelayError> {
        self.puts.lock().unwrap().push(key.to_string());
        if let Some(reason) = self.reject.lock().unwrap().clone() {
            return Err(RelayError::Storage(reason));
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (bytes.to_vec(), content_type.to_string()));
        Ok(StorageReference {
            bucket: "messaging-media".to_string(),
            key: key.to_string(),
            content_type: content_type.to_string(),
        })
    }

    fn bucket(&self) -> &str {
        "messaging-media"
    }
}

/// Store whose database is unreachable.
pub struct UnavailableStore;

#[async_trait]
impl MessageStore for UnavailableStore {
    async fn upsert(&self, _message: &InboundMessage) -> Result<UpsertOutcome, RelayError> {
        Err(RelayError::Persistence("database is locked".into()))
    }

    async fn get(&self, _id: &str) -> Result<Option<InboundMessage>, RelayError> {
        Err(RelayError::Persistence("database is locked".into()))
    }

    async fn pending_media(&self, _limit: usize) -> Result<Vec<InboundMessage>, RelayError> {
        Err(RelayError::Persistence("database is locked".into()))
    }

    async fn attach_storage_path(
        &self,
        _id: &str,
        _reference: &StorageReference,
    ) -> Result<bool, RelayError> {
        Err(RelayError::Persistence("database is locked".into()))
    }

    async fn stats(&self) -> Result<StoreStats, RelayError> {
        Err(RelayError::Persistence("database is locked".into()))
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config
        .provider
        .organizations
        .insert("1093".to_string(), "org1".to_string());
    config
}

pub fn app(config: Config, relay: MediaRelay) -> Router {
    build_router(GatewayState::new(Arc::new(config), relay))
}

// --- Payload builders ---

pub fn whatsapp_payload(phone_number_id: &str, messages: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "WABA-1",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {"display_phone_number": "15550001111", "phone_number_id": phone_number_id},
                    "messages": messages
                }
            }]
        }]
    }))
    .unwrap()
}

pub fn image_message(id: &str, media_id: &str) -> Value {
    json!({
        "from": "573001112233",
        "id": id,
        "timestamp": "1718000000",
        "type": "image",
        "image": {"id": media_id, "mime_type": "image/jpeg"}
    })
}

pub fn text_message(id: &str, body: &str) -> Value {
    json!({
        "from": "573001112233",
        "id": id,
        "timestamp": "1718000000",
        "type": "text",
        "text": {"body": body}
    })
}

pub fn post_webhook(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook/whatsapp")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20)
        .await
        .unwrap();
    (
        status,
        serde_json::from_slice(&bytes).unwrap_or(Value::Null),
    )
}
