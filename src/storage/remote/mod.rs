use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::ObjectStore;
use crate::errors::RelayError;
use crate::messages::StorageReference;
use crate::utils::http::{error_snippet, http_client};

/// Object store behind the hosted backend's storage REST API.
///
/// Objects are written with `POST {base}/storage/v1/object/{bucket}/{key}` and
/// `x-upsert: true`, which replaces an existing object under the same key.
pub struct HttpObjectStore {
    client: Client,
    base_url: String,
    bucket: String,
    service_key: String,
}

impl HttpObjectStore {
    pub fn new(base_url: &str, bucket: &str, service_key: &str, timeout_secs: u64) -> Self {
        Self {
            client: http_client(timeout_secs),
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            service_key: service_key.to_string(),
        }
    }

    fn object_url(&self, key: &str) -> String {
        let encoded: Vec<String> = key
            .split('/')
            .map(|seg| urlencoding::encode(seg).into_owned())
            .collect();
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            urlencoding::encode(&self.bucket),
            encoded.join("/")
        )
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<StorageReference, RelayError> {
        let url = self.object_url(key);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| RelayError::Storage(format!("upload of {key} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = error_snippet(resp).await;
            warn!("storage upload {} rejected ({}): {}", key, status, body);
            return Err(RelayError::Storage(format!(
                "storage API returned {status} for {key}"
            )));
        }

        debug!("uploaded {} ({} bytes) to {}", key, bytes.len(), self.bucket);

        Ok(StorageReference {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            content_type: content_type.to_string(),
        })
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}
