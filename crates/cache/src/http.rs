//! HTTP artifact cache backend
//!
//! Stateless per request, one round trip per call. Artifacts travel inside
//! the binary envelope defined in [`crate::wire`]; the fetch path verifies
//! the claimed rule keys, declared length, and payload digest before the
//! destination file appears, and drains every response body so pooled
//! keep-alive connections stay reusable.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use url::Url;

use crate::artifact::ArtifactInfo;
use crate::config::{render_error_message, HttpCacheConfig};
use crate::errors::{CacheError, Result};
use crate::keys::RuleKey;
use crate::mode::CacheReadMode;
use crate::paths::{BorrowablePath, LazyPath};
use crate::result::CacheResult;
use crate::traits::{ArtifactCache, StoreHandle};
use crate::wire::{self, ArtifactMetadata, MAX_METADATA_BLOCK_LEN, PAYLOAD_DIGEST_LEN};

/// Remote cache backend speaking the quarry HTTP wire protocol
pub struct HttpArtifactCache {
    name: String,
    base_url: Url,
    client: reqwest::Client,
    read_mode: CacheReadMode,
    error_message_format: String,
    store_permits: Arc<Semaphore>,
}

impl HttpArtifactCache {
    /// Create a backend from its configuration
    pub fn new(config: &HttpCacheConfig) -> Result<Self> {
        let mut base_url = Url::parse(&config.url).map_err(|e| {
            CacheError::configuration(format!("invalid cache URL '{}': {e}", config.url))
        })?;
        // A trailing slash keeps Url::join from eating the last path segment.
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                CacheError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            name: config.name.clone(),
            base_url,
            client,
            read_mode: config.mode,
            error_message_format: config.error_message_format.clone(),
            store_permits: Arc::new(Semaphore::new(config.store_concurrency.max(1))),
        })
    }

    fn artifact_url(&self, rule_key: &RuleKey) -> Result<Url> {
        self.base_url
            .join(&format!("artifacts/key/{}", rule_key.to_hex()))
            .map_err(|e| CacheError::configuration(format!("failed to build artifact URL: {e}")))
    }

    async fn fetch_artifact(&self, rule_key: &RuleKey, output: &LazyPath) -> Result<CacheResult> {
        let url = self.artifact_url(rule_key)?;
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| CacheError::network(url.as_str(), e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            // Drain the body so the keep-alive connection returns to the pool.
            while let Some(_chunk) = response
                .chunk()
                .await
                .map_err(|e| CacheError::network(url.as_str(), e.to_string()))?
            {}
            tracing::debug!("cache miss for {} at {}", rule_key, self.name);
            return Ok(CacheResult::miss());
        }
        if !status.is_success() {
            while let Ok(Some(_chunk)) = response.chunk().await {}
            return Err(CacheError::HttpStatus {
                endpoint: url.to_string(),
                status: status.as_u16(),
            });
        }

        self.read_artifact(rule_key, &url, response, output).await
    }

    /// Decode the envelope incrementally and stream the payload to `output`
    async fn read_artifact(
        &self,
        rule_key: &RuleKey,
        url: &Url,
        mut response: reqwest::Response,
        output: &LazyPath,
    ) -> Result<CacheResult> {
        let network_err =
            |e: reqwest::Error| CacheError::network(url.as_str(), e.to_string());

        // Buffer until the length prefix and metadata block are complete.
        let mut buffered: Vec<u8> = Vec::new();
        let block_len = loop {
            if buffered.len() >= 4 {
                let declared = u32::from_be_bytes([
                    buffered[0], buffered[1], buffered[2], buffered[3],
                ]);
                if declared > MAX_METADATA_BLOCK_LEN {
                    return Err(CacheError::envelope(format!(
                        "metadata block of {declared} bytes exceeds limit"
                    )));
                }
                break declared as usize;
            }
            match response.chunk().await.map_err(network_err)? {
                Some(chunk) => buffered.extend_from_slice(&chunk),
                None => {
                    return Err(CacheError::envelope(
                        "response ended before metadata block length",
                    ))
                }
            }
        };
        while buffered.len() < 4 + block_len {
            match response.chunk().await.map_err(network_err)? {
                Some(chunk) => buffered.extend_from_slice(&chunk),
                None => {
                    return Err(CacheError::envelope(
                        "response ended inside metadata block",
                    ))
                }
            }
        }

        let metadata = ArtifactMetadata::from_bytes(&buffered[4..4 + block_len])?;
        if !metadata.contains(rule_key) {
            // The server produced an artifact for some other key. This is a
            // correctness problem, never a miss, and nothing may be written.
            return Err(CacheError::KeyMismatch {
                rule_key: *rule_key,
            });
        }

        let declared = metadata.payload_len();
        let mut staged = output.stage().await?;
        let mut hasher = Sha256::new();
        let mut received: u64 = 0;

        // Payload bytes that arrived buffered behind the header.
        let mut pending = buffered.split_off(4 + block_len);
        loop {
            if !pending.is_empty() {
                received += pending.len() as u64;
                if received > declared {
                    staged.discard().await;
                    return Err(CacheError::Overrun { declared, received });
                }
                hasher.update(&pending);
                staged.write_all(&pending).await?;
                pending.clear();
            }
            match response.chunk().await {
                Ok(Some(chunk)) => pending.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) => {
                    staged.discard().await;
                    return Err(network_err(e));
                }
            }
        }

        if received < declared {
            staged.discard().await;
            return Err(CacheError::Truncated { declared, received });
        }
        let actual: [u8; PAYLOAD_DIGEST_LEN] = hasher.finalize().into();
        if &actual != metadata.payload_digest() {
            staged.discard().await;
            return Err(CacheError::DigestMismatch {
                expected: hex::encode(metadata.payload_digest()),
                actual: hex::encode(actual),
            });
        }

        staged.commit().await?;
        tracing::debug!(
            "cache hit for {} at {} ({} bytes)",
            rule_key,
            self.name,
            declared
        );
        Ok(CacheResult::hit(
            self.name.clone(),
            metadata.metadata().clone(),
            declared,
        ))
    }
}

#[async_trait]
impl ArtifactCache for HttpArtifactCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, rule_key: &RuleKey, output: &LazyPath) -> Result<CacheResult> {
        match self.fetch_artifact(rule_key, output).await {
            Ok(result) => Ok(result),
            Err(err) if err.is_environment_fault() => Err(err),
            Err(err) => {
                tracing::warn!(
                    "{}",
                    render_error_message(&self.error_message_format, &self.name, &err.to_string())
                );
                Ok(CacheResult::error(self.name.clone(), err.to_string()))
            }
        }
    }

    fn store(&self, info: ArtifactInfo, output: BorrowablePath) -> StoreHandle {
        // Stores address the primary (first) rule key; the body's key
        // header carries the full alias set.
        let url = match self.artifact_url(&info.rule_keys()[0]) {
            Ok(url) => url,
            Err(err) => return StoreHandle::spawn(async move { Err(err) }),
        };
        let client = self.client.clone();
        let name = self.name.clone();
        let template = self.error_message_format.clone();
        let permits = Arc::clone(&self.store_permits);
        // The transport only ever reads the file; the borrow flag conveys
        // ownership it has no way to take.
        let path = output.path().to_path_buf();

        StoreHandle::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| CacheError::StoreFailed {
                    message: e.to_string(),
                })?;
            let result = upload(&client, url, &info, &path).await;
            if let Err(err) = &result {
                tracing::warn!(
                    "{}",
                    render_error_message(&template, &name, &err.to_string())
                );
            }
            result
        })
    }

    fn read_mode(&self) -> CacheReadMode {
        self.read_mode
    }

    async fn close(&self) -> Result<()> {
        // Connection pools are released when the client drops; nothing to
        // flush, and calling twice is harmless.
        Ok(())
    }
}

async fn upload(
    client: &reqwest::Client,
    url: Url,
    info: &ArtifactInfo,
    path: &std::path::Path,
) -> Result<()> {
    let payload = tokio::fs::read(path)
        .await
        .map_err(|e| CacheError::io(path, "read artifact for upload", e))?;
    let metadata =
        ArtifactMetadata::for_artifact(info, payload.len() as u64, wire::payload_digest(&payload));
    let mut body = metadata.encode_store_header();
    body.extend_from_slice(&payload);

    let response = client
        .post(url.clone())
        .body(body)
        .send()
        .await
        .map_err(|e| CacheError::network(url.as_str(), e.to_string()))?;
    let status = response.status();
    let _ = response.bytes().await;
    if !status.is_success() {
        return Err(CacheError::HttpStatus {
            endpoint: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(())
}
