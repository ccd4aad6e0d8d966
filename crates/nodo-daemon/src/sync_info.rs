use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use nodo_bridge::event_bus::EventBus;
use nodo_bridge::protocol::Notification;
use nodo_core::config::SyncConfig;
use nodo_core::types::SyncInfo;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("http client: {0}")]
    Client(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("rpc error: {0}")]
    Rpc(String),
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<SyncResult>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct SyncResult {
    #[serde(default)]
    height: u64,
    #[serde(default)]
    target_height: u64,
}

/// Parse a `sync_info` JSON-RPC response body.
///
/// Missing `result`, `height` or `target_height` default to zero. A body
/// that is not JSON, or carries an `error` member, is an error.
pub fn parse_sync_response(body: &str) -> Result<SyncInfo, SyncError> {
    let resp: RpcResponse =
        serde_json::from_str(body).map_err(|e| SyncError::Decode(e.to_string()))?;
    if let Some(err) = resp.error {
        return Err(SyncError::Rpc(err.to_string()));
    }
    let result = resp.result.unwrap_or_default();
    Ok(SyncInfo::new(result.height, result.target_height))
}

#[derive(Debug, Default)]
struct Latest {
    seq: u64,
    info: SyncInfo,
}

/// Polls the local node's `sync_info` and keeps the last good answer.
///
/// Each poll takes a sequence number when it is issued. A response is only
/// stored if no newer poll has been applied yet, so under overlapping polls
/// the most recently issued request wins regardless of arrival order.
#[derive(Clone)]
pub struct SyncStatusPoller {
    client: reqwest::Client,
    url: String,
    bus: EventBus,
    issued: Arc<AtomicU64>,
    latest: Arc<Mutex<Latest>>,
}

impl SyncStatusPoller {
    pub fn new(url: impl Into<String>, timeout: Duration, bus: EventBus) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Client(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            bus,
            issued: Arc::new(AtomicU64::new(0)),
            latest: Arc::new(Mutex::new(Latest::default())),
        })
    }

    pub fn from_config(cfg: &SyncConfig, bus: EventBus) -> Result<Self, SyncError> {
        Self::new(cfg.rpc_url.clone(), cfg.request_timeout(), bus)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn latest(&self) -> MutexGuard<'_, Latest> {
        self.latest.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Last stored sync info.
    pub fn sync_info(&self) -> SyncInfo {
        self.latest().info
    }

    pub fn sync_percentage(&self) -> u32 {
        self.sync_info().percentage()
    }

    /// Issue a poll in the background and return immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_sync_status_update(&self) {
        let poller = self.clone();
        tokio::spawn(async move {
            poller.poll_once().await;
        });
    }

    /// Issue one poll and wait for it. Publishes exactly one notification
    /// unless the response was superseded by a newer poll.
    pub async fn poll_once(&self) -> Option<SyncInfo> {
        let seq = self.next_seq();
        let outcome = self.fetch().await;
        self.complete(seq, outcome)
    }

    /// Record the outcome of poll `seq`. Returns the stored info when applied.
    ///
    /// Outcomes of polls overtaken by a newer applied response are dropped
    /// without a notification, failures included. A failure never changes
    /// the stored info.
    pub fn complete(&self, seq: u64, outcome: Result<SyncInfo, SyncError>) -> Option<SyncInfo> {
        match outcome {
            Ok(info) => {
                {
                    let mut latest = self.latest();
                    if seq <= latest.seq {
                        debug!(seq, applied = latest.seq, "discarding superseded sync response");
                        return None;
                    }
                    latest.seq = seq;
                    latest.info = info;
                }
                debug!(
                    seq,
                    height = info.height,
                    target_height = info.target_height,
                    "sync status updated"
                );
                self.bus.publish(Notification::SyncStatusReady {
                    height: info.height,
                    target_height: info.target_height,
                    percentage: info.percentage(),
                });
                Some(info)
            }
            Err(e) => {
                let applied = self.latest().seq;
                if seq <= applied {
                    debug!(seq, applied, error = %e, "discarding superseded sync failure");
                    return None;
                }
                warn!(seq, error = %e, "sync status poll failed");
                self.bus.publish(Notification::SyncStatusFailed {
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    /// Reserve a sequence number without sending a request.
    pub fn next_seq(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn fetch(&self) -> Result<SyncInfo, SyncError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": "0",
            "method": "sync_info",
        });
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::Request(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SyncError::Status(status.as_u16()));
        }
        let text = resp
            .text()
            .await
            .map_err(|e| SyncError::Request(e.to_string()))?;
        parse_sync_response(&text)
    }
}

impl std::fmt::Debug for SyncStatusPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncStatusPoller")
            .field("url", &self.url)
            .field("issued", &self.issued.load(Ordering::Relaxed))
            .finish()
    }
}

