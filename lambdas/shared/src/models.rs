//! Domain models for the detection history lambda
//!
//! These types represent the data flowing through one invocation:
//! - Invocation arguments: event type plus the history request
//! - Polling context: checkpoint and history window owned by the invocation
//! - Detections and the pages the vendor client yields
//! - Polling parameters handed to the vendor client

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Only event type this handler knows how to pull history for
pub const SUPPORTED_EVENT_TYPE: &str = "detections";

/// Integration name reported to the vendor API
pub const INTEGRATION_NAME: &str = "fncloud-lambda";

/// Page size requested from the vendor API during history pulls
pub const HISTORY_PAGE_LIMIT: u32 = 50;

/// Detection UUID to the events recorded for it
pub type EventsByDetection = HashMap<String, Vec<Value>>;

/// Invocation payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvocationArgs {
    /// Kind of records to pull (must be "detections")
    #[serde(default)]
    pub event_type: Option<String>,
    /// History window and starting checkpoint
    #[serde(default)]
    pub history: Option<HistoryArgs>,
}

/// History request carried in the invocation payload
///
/// A key sent as `null` still counts as sent: `Some(None)` for the dates,
/// `Some(Value::Null)` for the checkpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryArgs {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub start_date_str: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub end_date_str: Option<Option<String>>,
    /// Opaque cursor, usually a timestamp string
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<Value>,
    /// Keys the orchestrator sends that this handler does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HistoryArgs {
    /// True when the payload carried `{}` (or nothing at all)
    pub fn is_empty(&self) -> bool {
        self.start_date_str.is_none()
            && self.end_date_str.is_none()
            && self.checkpoint.is_none()
            && self.extra.is_empty()
    }
}

fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Start and end of the history being pulled
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryWindow {
    pub start_date: String,
    pub end_date: String,
}

/// Polling state for one invocation.
///
/// Seeded by the handler, advanced by the vendor client while pages are
/// drained, and read back once polling finishes.
#[derive(Debug, Clone, Default)]
pub struct ApiContext {
    checkpoint: Value,
    history: Option<HistoryWindow>,
}

impl ApiContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_checkpoint(&mut self, checkpoint: Value) {
        self.checkpoint = checkpoint;
    }

    pub fn checkpoint(&self) -> &Value {
        &self.checkpoint
    }

    pub fn update_history(&mut self, history: HistoryWindow) {
        self.history = Some(history);
    }

    pub fn history(&self) -> Option<&HistoryWindow> {
        self.history.as_ref()
    }
}

/// A vendor detection record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub uuid: String,
    /// JSON-encoded list of the detection's events, set during enrichment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<String>,
    /// Vendor-defined fields, passed through untouched
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Detection {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            events: None,
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// One page yielded by the vendor client's history poll
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponsePage {
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub events: EventsByDetection,
}

/// Parameters for the vendor client's history poll
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollingArgs {
    pub account_uuid: Option<String>,
    /// Minutes the vendor needs before detections are complete
    pub polling_delay: i64,
    pub status: String,
    pub pull_muted_detections: String,
    pub pull_muted_rules: String,
    pub pull_muted_devices: String,
    pub include_description: bool,
    pub include_signature: bool,
    pub include_pdns: Option<bool>,
    pub include_dhcp: Option<bool>,
    pub include_events: Option<bool>,
    pub filter_training_detections: bool,
    pub limit: u32,
    pub start_date: String,
}

/// Render an opaque checkpoint for log lines and error messages
pub fn display_checkpoint(checkpoint: &Value) -> String {
    match checkpoint {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
