//! Media fetcher for the messaging provider.
//!
//! Resolving an attachment takes two calls: a lookup that turns the media id
//! into a short-lived download URL, then the authenticated download itself.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::errors::{FetchError, RelayError};
use crate::messages::MediaAsset;
use crate::utils::http::{error_snippet, http_client, limited_body};
use crate::utils::media::{DEFAULT_CONTENT_TYPE, base_mime};

/// Downloads an attachment by provider media id.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, media_id: &str) -> Result<MediaAsset, RelayError>;
}

/// Response of the media-info lookup.
#[derive(Debug, Deserialize)]
struct MediaInfo {
    url: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    file_size: Option<u64>,
}

/// Graph error code for an id that does not exist or can no longer be read.
const GRAPH_UNKNOWN_OBJECT: i64 = 100;

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    code: i64,
    #[serde(default)]
    error_subcode: Option<i64>,
}

/// Unknown or expired media ids come back as `400` with error code 100.
/// Token and permission failures (190, 10, 200, ...) are not expiry.
fn is_unknown_object(body: &str) -> bool {
    match serde_json::from_str::<GraphErrorBody>(body) {
        Ok(parsed) => {
            debug!(
                "graph error code {} subcode {:?}",
                parsed.error.code, parsed.error.error_subcode
            );
            parsed.error.code == GRAPH_UNKNOWN_OBJECT
        }
        Err(_) => false,
    }
}

/// Fetcher backed by the Graph API (`{api_base}/{version}/{media_id}`).
pub struct GraphMediaFetcher {
    client: Client,
    api_base: String,
    api_version: String,
    access_token: String,
    max_bytes: usize,
}

impl GraphMediaFetcher {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            client: http_client(config.timeout_secs),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
            access_token: config.access_token.clone(),
            max_bytes: config.max_media_bytes,
        }
    }

    fn lookup_url(&self, media_id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.api_base,
            self.api_version,
            urlencoding::encode(media_id)
        )
    }

    async fn lookup(&self, media_id: &str) -> Result<MediaInfo, FetchError> {
        let resp = self
            .client
            .get(self.lookup_url(media_id))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| transport(media_id, &e))?;

        let status = resp.status();
        if is_gone(status) {
            return Err(FetchError::NotFound {
                media_id: media_id.to_string(),
            });
        }
        if !status.is_success() {
            let body = error_snippet(resp).await;
            if status == StatusCode::BAD_REQUEST && is_unknown_object(&body) {
                debug!("media lookup {} rejected: {}", media_id, body);
                return Err(FetchError::NotFound {
                    media_id: media_id.to_string(),
                });
            }
            warn!("media lookup {} failed ({}): {}", media_id, status, body);
            return Err(FetchError::Status {
                media_id: media_id.to_string(),
                status: status.as_u16(),
            });
        }

        resp.json::<MediaInfo>()
            .await
            .map_err(|e| transport(media_id, &e))
    }
}

#[async_trait]
impl MediaFetcher for GraphMediaFetcher {
    async fn fetch(&self, media_id: &str) -> Result<MediaAsset, RelayError> {
        let info = self.lookup(media_id).await?;

        if let Some(size) = info.file_size
            && size as usize > self.max_bytes
        {
            return Err(FetchError::TooLarge {
                media_id: media_id.to_string(),
                limit: self.max_bytes,
            }
            .into());
        }

        let resp = self
            .client
            .get(&info.url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| transport(media_id, &e))?;

        let status = resp.status();
        if is_gone(status) {
            return Err(FetchError::NotFound {
                media_id: media_id.to_string(),
            }
            .into());
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                media_id: media_id.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let header_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(base_mime);
        let content_type = header_type
            .or_else(|| info.mime_type.as_deref().and_then(base_mime))
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        let (bytes, truncated) = limited_body(resp, self.max_bytes).await.map_err(|e| {
            if e.to_string().contains("too large") {
                FetchError::TooLarge {
                    media_id: media_id.to_string(),
                    limit: self.max_bytes,
                }
            } else {
                FetchError::Transport {
                    media_id: media_id.to_string(),
                    message: e.to_string(),
                }
            }
        })?;
        if truncated {
            return Err(FetchError::TooLarge {
                media_id: media_id.to_string(),
                limit: self.max_bytes,
            }
            .into());
        }

        debug!(
            "fetched media {}: {} bytes, {}",
            media_id,
            bytes.len(),
            content_type
        );

        Ok(MediaAsset {
            media_id: media_id.to_string(),
            content_type,
            bytes,
        })
    }
}

fn is_gone(status: StatusCode) -> bool {
    status == StatusCode::NOT_FOUND || status == StatusCode::GONE
}

fn transport(media_id: &str, e: &reqwest::Error) -> FetchError {
    FetchError::Transport {
        media_id: media_id.to_string(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests;
