use std::thread;
use std::time::Duration;

use binsight_contracts::detection::{DetectionResult, WasteCategory};
use chrono::{SecondsFormat, Utc};
use reqwest::blocking::Client as HttpClient;
use serde::Serialize;
use tracing::{debug, warn};

use crate::request::CaptureHints;

/// Persistence request describing one finished classification. Sent
/// best-effort after the lifecycle reaches success.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub user_id: String,
    pub capture_id: String,
    pub image_url: String,
    pub item_label: String,
    pub category: WasteCategory,
    pub confidence: f64,
    pub value: f64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    pub recorded_at: String,
}

impl HistoryRecord {
    pub fn from_result(
        result: &DetectionResult,
        capture_id: &str,
        user_id: &str,
        image_url: &str,
        hints: &CaptureHints,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            capture_id: capture_id.to_string(),
            image_url: image_url.to_string(),
            item_label: result.item.clone(),
            category: result.category,
            confidence: result.confidence,
            value: result.value,
            message: result.message.clone(),
            weight: hints.weight.clone(),
            size: hints.size.clone(),
            recorded_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
        }
    }
}

/// Fire-and-forget sink. Implementations own their failure channel: errors
/// are logged and swallowed, never surfaced, so an unreliable persistence
/// path cannot downgrade a successful classification.
pub trait HistorySink: Send + Sync {
    fn record(&self, record: HistoryRecord);
}

/// Used when no history endpoint is configured.
pub struct NullHistorySink;

impl HistorySink for NullHistorySink {
    fn record(&self, record: HistoryRecord) {
        debug!(capture_id = %record.capture_id, "history sink disabled, dropping record");
    }
}

/// POSTs each record from a detached thread. The spawning caller returns
/// immediately and never learns the outcome.
pub struct HttpHistorySink {
    endpoint: String,
    timeout: Duration,
}

impl HttpHistorySink {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl HistorySink for HttpHistorySink {
    fn record(&self, record: HistoryRecord) {
        let endpoint = self.endpoint.clone();
        let timeout = self.timeout;
        thread::spawn(move || {
            let client = match HttpClient::builder().timeout(timeout).build() {
                Ok(client) => client,
                Err(err) => {
                    warn!(capture_id = %record.capture_id, error = %err, "history client init failed");
                    return;
                }
            };
            match client.post(&endpoint).json(&record).send() {
                Ok(response) if response.status().is_success() => {
                    debug!(capture_id = %record.capture_id, "history record persisted");
                }
                Ok(response) => {
                    warn!(
                        capture_id = %record.capture_id,
                        status = response.status().as_u16(),
                        "history sink rejected record"
                    );
                }
                Err(err) => {
                    warn!(capture_id = %record.capture_id, error = %err, "history write failed");
                }
            }
        });
    }
}
