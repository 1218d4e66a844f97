//! HTTP server for the provider webhook.
//!
//! `POST` carries inbound messages, `GET` answers the subscription handshake
//! and `OPTIONS` answers CORS preflight. Every message in a payload goes
//! through [`MediaRelay::relay`] in order before the response is sent.

pub mod payload;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{Config, CorsConfig};
use crate::relay::{MediaBranch, MediaRelay};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

/// Shared state for the webhook handlers.
#[derive(Clone)]
pub struct GatewayState {
    config: Arc<Config>,
    relay: MediaRelay,
}

impl GatewayState {
    pub fn new(config: Arc<Config>, relay: MediaRelay) -> Self {
        Self { config, relay }
    }
}

/// Per-request counters returned to the provider.
#[derive(Debug, Default, Serialize)]
pub struct RelaySummary {
    pub status: &'static str,
    pub received: usize,
    pub relayed: usize,
    pub pending_retry: usize,
    pub skipped: usize,
}

/// Build the webhook router.
pub fn build_router(state: GatewayState) -> Router {
    let path = state.config.server.webhook_path.clone();
    let limit = state.config.server.max_body_bytes;
    Router::new()
        .route(
            &path,
            get(verify_handler)
                .post(webhook_handler)
                .options(preflight_handler),
        )
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

/// CORS headers for webhook responses.
pub fn cors_headers(cors: &CorsConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let pairs = [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, cors.allow_origin.clone()),
        (header::ACCESS_CONTROL_ALLOW_HEADERS, cors.allow_headers.join(", ")),
        (header::ACCESS_CONTROL_ALLOW_METHODS, cors.allow_methods.join(", ")),
    ];
    for (name, value) in pairs {
        insert_header(&mut headers, name, &value);
    }
    headers
}

fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(name, v);
        }
        Err(_) => warn!("cors: invalid value for {}: {:?}", name, value),
    }
}

/// OPTIONS: CORS preflight.
async fn preflight_handler(State(state): State<GatewayState>) -> Response {
    (
        StatusCode::NO_CONTENT,
        cors_headers(&state.config.server.cors),
    )
        .into_response()
}

/// GET /health
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION
    }))
}

/// Validate HMAC-SHA256 signature against a payload.
pub(crate) fn validate_webhook_signature(secret: &str, signature: &str, body: &[u8]) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    let sig = signature.strip_prefix("sha256=").unwrap_or(signature);
    expected.as_bytes().ct_eq(sig.as_bytes()).into()
}

/// Subscription handshake. Returns the challenge when the verify token matches.
pub(crate) fn verify_subscription(
    verify_token: &str,
    params: &HashMap<String, String>,
) -> Option<String> {
    if verify_token.is_empty() {
        return None;
    }
    let mode = params.get("hub.mode").map(String::as_str);
    let token = params.get("hub.verify_token").map_or("", String::as_str);
    let challenge = params.get("hub.challenge")?;
    let token_ok: bool = verify_token.as_bytes().ct_eq(token.as_bytes()).into();
    (mode == Some("subscribe") && token_ok).then(|| challenge.clone())
}

/// GET: provider subscription handshake.
async fn verify_handler(
    State(state): State<GatewayState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let cors = cors_headers(&state.config.server.cors);
    match verify_subscription(&state.config.provider.verify_token, &params) {
        Some(challenge) => {
            info!("webhook subscription verified");
            (StatusCode::OK, cors, challenge).into_response()
        }
        None => {
            warn!("webhook subscription verification rejected");
            (StatusCode::FORBIDDEN, cors).into_response()
        }
    }
}

fn error_response(status: StatusCode, cors: HeaderMap, message: &str) -> Response {
    (status, cors, Json(serde_json::json!({ "error": message }))).into_response()
}

/// POST: inbound messages from the provider.
async fn webhook_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let request_id = format!("wh-{}", Uuid::new_v4());
    let cors = cors_headers(&state.config.server.cors);

    // Oversized bodies are cut off by DefaultBodyLimit while reading
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            let status = rejection.status();
            warn!("{}: unreadable body ({}): {}", request_id, status, rejection.body_text());
            let message = if status == StatusCode::PAYLOAD_TOO_LARGE {
                "payload too large"
            } else {
                "unreadable body"
            };
            return error_response(status, cors, message);
        }
    };

    let secret = &state.config.provider.app_secret;
    if !secret.is_empty() {
        let Some(signature) = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
        else {
            warn!("{}: missing {} header", request_id, SIGNATURE_HEADER);
            return error_response(StatusCode::FORBIDDEN, cors, "missing signature");
        };
        if !validate_webhook_signature(secret, signature, &body) {
            warn!("{}: invalid signature", request_id);
            return error_response(StatusCode::FORBIDDEN, cors, "invalid signature");
        }
    }

    let batch = match payload::parse_payload(&body, &state.config.provider) {
        Ok(batch) => batch,
        Err(e) => {
            warn!("{}: rejected payload: {}", request_id, e);
            return error_response(e.status_code(), cors, &e.to_string());
        }
    };
    debug!(
        "{}: {} message(s), {} status update(s), {} skipped",
        request_id,
        batch.messages.len(),
        batch.statuses,
        batch.skipped
    );

    let mut summary = RelaySummary {
        status: "ok",
        received: batch.messages.len(),
        skipped: batch.skipped,
        ..RelaySummary::default()
    };

    for message in batch.messages {
        let id = message.provider_message_id.clone();
        match state.relay.relay(message).await {
            Ok(outcome) => match outcome.branch {
                MediaBranch::Uploaded | MediaBranch::AlreadyStored => summary.relayed += 1,
                MediaBranch::FetchOrUploadFailed => summary.pending_retry += 1,
                MediaBranch::NoMedia => {}
            },
            Err(e) => {
                error!("{}: failed to persist message {}: {}", request_id, id, e);
                return error_response(e.status_code(), cors, "persistence failed");
            }
        }
    }

    info!(
        "{}: received={} relayed={} pending_retry={} skipped={}",
        request_id, summary.received, summary.relayed, summary.pending_retry, summary.skipped
    );
    (StatusCode::OK, cors, Json(summary)).into_response()
}

/// Bind and serve the webhook router. Returns the server task handle.
pub async fn start(
    host: &str,
    port: u16,
    state: GatewayState,
) -> Result<tokio::task::JoinHandle<()>> {
    let webhook_path = state.config.server.webhook_path.clone();
    let app = build_router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("webhook server listening on {}{}", addr, webhook_path);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("webhook server error: {}", e);
        }
    });

    Ok(handle)
}
