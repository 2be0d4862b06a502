//! `SnapshotTransport` (spec §4.9): streams a snapshot to the backend as
//! zstd-compressed JSON without ever materializing the full payload in
//! memory, retries per the status-driven policy, and reports a decoded
//! `SnapshotResponse`.

mod response;

pub use response::{is_non_retryable, parse_status, status_hint, TransportError};

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_compression::tokio::write::ZstdEncoder;
use async_compression::Level;
use futures::TryStreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::model::{ClusterSnapshot, SnapshotResponse};

const INGEST_PATH: &str = "/api/v1/metrics/ingest";

/// `CompressionLevel` (1-4) to `async-compression`'s zstd level, an
/// implementation-defined total function per spec §9.
pub fn compression_level_to_zstd(level: u8) -> i32 {
    match level {
        1 => 3,
        2 => 9,
        4 => 19,
        _ => 15, // 3, and any out-of-range value, map to the default.
    }
}

pub struct SnapshotTransport {
    client: reqwest::Client,
    backend_url: String,
    api_key: String,
    cluster_id: String,
    agent_version: String,
    zstd_level: i32,
    max_retries: u32,
}

impl SnapshotTransport {
    pub fn new(
        backend_url: String,
        api_key: String,
        cluster_id: String,
        agent_version: String,
        compression_level: u8,
        max_retries: u32,
        request_timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("reqwest client configuration is always valid");
        Self {
            client,
            backend_url,
            api_key,
            cluster_id,
            agent_version,
            zstd_level: compression_level_to_zstd(compression_level),
            max_retries,
        }
    }

    /// Sends the snapshot, retrying per spec §4.9. Each attempt rebuilds a
    /// fresh pipe (spec Property #6: every attempt's compressed body is
    /// freshly produced; the snapshot itself, and its UUID, are built once
    /// per tick by the caller).
    pub async fn send(
        &self,
        ctx: CancellationToken,
        snapshot: &ClusterSnapshot,
    ) -> Result<SnapshotResponse, TransportError> {
        let attempts = 1 + self.max_retries;
        let mut last_err = None;

        for attempt in 1..=attempts {
            if ctx.is_cancelled() {
                return Err(TransportError::Canceled);
            }

            if attempt > 1 {
                let backoff = Duration::from_secs(1u64 << (attempt - 1));
                debug!(attempt, backoff_secs = backoff.as_secs(), "retrying snapshot send");
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = ctx.cancelled() => return Err(TransportError::Canceled),
                }
            }

            match self.send_once(snapshot).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if is_non_retryable(&err) {
                        return Err(err);
                    }
                    warn!(attempt, error = %err, "snapshot send attempt failed");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.expect("loop runs at least once since attempts >= 1"))
    }

    async fn send_once(&self, snapshot: &ClusterSnapshot) -> Result<SnapshotResponse, TransportError> {
        let (writer, reader) = tokio::io::duplex(64 * 1024);
        let byte_count = Arc::new(AtomicU64::new(0));

        let body_json = serde_json::to_vec(snapshot)?;
        let mut encoder = ZstdEncoder::with_quality(writer, Level::Precise(self.zstd_level));
        tokio::spawn(async move {
            let result: io::Result<()> = async {
                encoder.write_all(&body_json).await?;
                encoder.shutdown().await?;
                Ok(())
            }
            .await;
            if let Err(err) = result {
                debug!(error = %err, "zstd producer task ended with an io error");
            }
        });

        let counted = byte_count.clone();
        let stream = ReaderStream::new(reader).inspect_ok(move |chunk| {
            counted.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        });
        let body = reqwest::Body::wrap_stream(stream);

        let url = format!("{}{}", self.backend_url.trim_end_matches('/'), INGEST_PATH);
        let response = self
            .client
            .post(&url)
            .headers(self.headers(&snapshot.snapshot_id.to_string()))
            .body(body)
            .send()
            .await
            .map_err(TransportError::Request)?;

        debug!(compressed_bytes = byte_count.load(Ordering::Relaxed), "snapshot send completed");
        parse_status(response).await
    }

    fn headers(&self, snapshot_id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("Content-Encoding", HeaderValue::from_static("zstd"));
        headers.insert(
            "X-Cluster-ID",
            HeaderValue::from_str(&self.cluster_id).unwrap_or_else(|_| HeaderValue::from_static("invalid")),
        );
        headers.insert(
            "X-Agent-Version",
            HeaderValue::from_str(&self.agent_version).unwrap_or_else(|_| HeaderValue::from_static("invalid")),
        );
        headers.insert(
            "X-Snapshot-ID",
            HeaderValue::from_str(snapshot_id).unwrap_or_else(|_| HeaderValue::from_static("invalid")),
        );
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_level_mapping_is_total() {
        assert_eq!(compression_level_to_zstd(1), 3);
        assert_eq!(compression_level_to_zstd(2), 9);
        assert_eq!(compression_level_to_zstd(3), 15);
        assert_eq!(compression_level_to_zstd(4), 19);
        assert_eq!(compression_level_to_zstd(0), 15);
        assert_eq!(compression_level_to_zstd(200), 15);
    }
}
