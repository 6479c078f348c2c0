//! HTTP adapter for the FortiNDR Cloud detections API
//!
//! A thin client: one pass of offset paging over the history window, rule
//! metadata merged into each detection, optional per-detection events. No
//! retry or backoff; a failed request fails the invocation and the caller
//! retries from the last persisted checkpoint.

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration as StdDuration;
use tracing::{debug, warn, Level};

use crate::client::{ApiClientFactory, DetectionSource, HistoryPoller};
use crate::errors::{Error, Result};
use crate::models::{
    display_checkpoint, ApiContext, Detection, EventsByDetection, PollingArgs, ResponsePage,
};

const DEFAULT_DOMAIN: &str = "icebrg.io";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const TRAINING_RULE_CATEGORY: &str = "Posture: Training";

/// Builds [`FncHttpClient`]s sharing one connection pool
pub struct FncHttpClientFactory {
    http: Client,
}

impl FncHttpClientFactory {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(StdDuration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Client(e.to_string()))?;
        Ok(Self { http })
    }
}

impl ApiClientFactory for FncHttpClientFactory {
    fn get_api_client(
        &self,
        name: &str,
        api_token: Option<&str>,
        domain: Option<&str>,
    ) -> Result<Box<dyn DetectionSource>> {
        let api_token = api_token
            .ok_or_else(|| Error::Client("API token was not provided".to_string()))?;

        Ok(Box::new(FncHttpClient {
            http: self.http.clone(),
            base_url: base_url(domain.unwrap_or(DEFAULT_DOMAIN)),
            api_token: api_token.to_string(),
            user_agent: format!("{}/{}", name, env!("CARGO_PKG_VERSION")),
            log_level: Level::INFO,
        }))
    }
}

/// Detections API client for one tenant
pub struct FncHttpClient {
    http: Client,
    base_url: String,
    api_token: String,
    user_agent: String,
    log_level: Level,
}

impl DetectionSource for FncHttpClient {
    fn set_log_level(&mut self, level: Level) -> Result<()> {
        self.log_level = level;
        Ok(())
    }

    fn poll_history(&self, ctx: &ApiContext, args: &PollingArgs) -> Result<Box<dyn HistoryPoller>> {
        let window_start = ctx
            .history()
            .map(|h| h.start_date.as_str())
            .unwrap_or(&args.start_date);
        let start = history_start(ctx.checkpoint(), window_start);
        let end = history_end(
            ctx.history().map(|h| h.end_date.as_str()),
            Utc::now(),
            args.polling_delay,
        );

        if args.include_pdns == Some(true) || args.include_dhcp == Some(true) {
            warn!("PDNS and DHCP enrichment are not supported by the HTTP detections client");
        }

        Ok(Box::new(FncHistoryPoller {
            api: ApiRequester {
                http: self.http.clone(),
                base_url: self.base_url.clone(),
                api_token: self.api_token.clone(),
                user_agent: self.user_agent.clone(),
                verbose: self.log_level >= Level::DEBUG,
            },
            args: args.clone(),
            start,
            end,
            offset: 0,
            done: false,
        }))
    }
}

/// Offset pager over `[start, end]`
pub struct FncHistoryPoller {
    api: ApiRequester,
    args: PollingArgs,
    start: String,
    end: String,
    offset: u32,
    done: bool,
}

#[async_trait]
impl HistoryPoller for FncHistoryPoller {
    async fn next_page(&mut self, ctx: &mut ApiContext) -> Result<Option<ResponsePage>> {
        if self.done {
            return Ok(None);
        }

        let query = detections_query(&self.args, &self.start, &self.end, self.offset);
        let response: DetectionsResponse = self.api.get("/v1/detections", &query).await?;
        let received = response.detections.len() as u32;

        if received == 0 {
            self.finish(ctx);
            return Ok(None);
        }

        let detections = apply_rules(response.detections, &response.rules, &self.args);
        let mut events = EventsByDetection::new();
        if self.args.include_events == Some(true) {
            for detection in &detections {
                let path = format!("/v1/detections/{}/events", detection.uuid);
                let found: EventsResponse = self.api.get(&path, &[]).await?;
                events.insert(detection.uuid.clone(), found.events);
            }
        }

        self.offset += received;
        if received < self.args.limit {
            self.finish(ctx);
        }

        Ok(Some(ResponsePage { detections, events }))
    }
}

impl FncHistoryPoller {
    fn finish(&mut self, ctx: &mut ApiContext) {
        self.done = true;
        ctx.update_checkpoint(Value::String(self.end.clone()));
    }
}

struct ApiRequester {
    http: Client,
    base_url: String,
    api_token: String,
    user_agent: String,
    verbose: bool,
}

impl ApiRequester {
    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        if self.verbose {
            debug!(url = %url, query = ?query, "Requesting detections API");
        }

        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("IBToken {}", self.api_token))
            .header("User-Agent", &self.user_agent)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::Client(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Client(e.to_string()))?;

        if status.is_success() {
            Ok(serde_json::from_str(&body)?)
        } else {
            Err(Error::Client(format!("HTTP {} from {}: {}", status, path, body)))
        }
    }
}

#[derive(Debug, Deserialize)]
struct DetectionsResponse {
    #[serde(default)]
    detections: Vec<Detection>,
    #[serde(default)]
    rules: Vec<Rule>,
}

#[derive(Debug, Clone, Deserialize)]
struct Rule {
    uuid: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    confidence: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    query_signature: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    events: Vec<Value>,
}

fn base_url(domain: &str) -> String {
    let domain = domain.trim().trim_end_matches('/');
    if domain.starts_with("http://") || domain.starts_with("https://") {
        domain.to_string()
    } else {
        format!("https://detections.{}", domain)
    }
}

/// Start of the pull: the checkpoint, but never before the window start
fn history_start(checkpoint: &Value, window_start: &str) -> String {
    if checkpoint.is_null() {
        return window_start.to_string();
    }
    let checkpoint = display_checkpoint(checkpoint);
    match (
        DateTime::parse_from_rfc3339(&checkpoint),
        DateTime::parse_from_rfc3339(window_start),
    ) {
        (Ok(resume), Ok(start)) if start > resume => window_start.to_string(),
        _ => checkpoint,
    }
}

/// End of the pull: the requested end, held back by the polling delay
fn history_end(requested: Option<&str>, now: DateTime<Utc>, polling_delay_minutes: i64) -> String {
    let latest = now - Duration::minutes(polling_delay_minutes);
    let end = match requested.map(DateTime::parse_from_rfc3339) {
        Some(Ok(end)) => end.with_timezone(&Utc).min(latest),
        // Unparseable ends are the vendor's to interpret
        Some(Err(_)) => return requested.unwrap_or_default().to_string(),
        None => latest,
    };
    end.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn detections_query(
    args: &PollingArgs,
    start: &str,
    end: &str,
    offset: u32,
) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("created_or_shared_start_date", start.to_string()),
        ("created_or_shared_end_date", end.to_string()),
        ("include", "rules".to_string()),
        ("sort_by", "created".to_string()),
        ("sort_order", "asc".to_string()),
        ("limit", args.limit.to_string()),
        ("offset", offset.to_string()),
    ];
    if let Some(account_uuid) = &args.account_uuid {
        query.push(("account_uuid", account_uuid.clone()));
    }
    if !args.status.eq_ignore_ascii_case("all") {
        query.push(("status", args.status.to_lowercase()));
    }
    for (key, value) in [
        ("muted", &args.pull_muted_detections),
        ("muted_rule", &args.pull_muted_rules),
        ("muted_device", &args.pull_muted_devices),
    ] {
        if !value.eq_ignore_ascii_case("all") {
            query.push((key, value.to_lowercase()));
        }
    }
    query
}

/// Merge rule metadata into detections, dropping training detections when asked
fn apply_rules(detections: Vec<Detection>, rules: &[Rule], args: &PollingArgs) -> Vec<Detection> {
    detections
        .into_iter()
        .filter_map(|mut detection| {
            let rule_uuid = detection.field("rule_uuid").and_then(Value::as_str);
            let rule = rule_uuid.and_then(|id| rules.iter().find(|r| r.uuid == id));
            let Some(rule) = rule else {
                return Some(detection);
            };

            let training = rule
                .category
                .as_deref()
                .map(|c| c.eq_ignore_ascii_case(TRAINING_RULE_CATEGORY))
                .unwrap_or(false);
            if training && args.filter_training_detections {
                return None;
            }

            let mut merge = |key: &str, value: &Option<String>| {
                if let Some(v) = value {
                    detection.fields.insert(key.to_string(), Value::String(v.clone()));
                }
            };
            merge("rule_name", &rule.name);
            merge("rule_severity", &rule.severity);
            merge("rule_confidence", &rule.confidence);
            merge("rule_category", &rule.category);
            if args.include_description {
                merge("rule_description", &rule.description);
            }
            if args.include_signature {
                merge("rule_signature", &rule.query_signature);
            }
            Some(detection)
        })
        .collect()
}
