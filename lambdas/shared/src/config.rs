//! Runtime configuration read from the Lambda environment
//!
//! Resolved once at cold start and passed by reference into the handler.
//! Empty variables count as unset.

use tracing::Level;

use crate::errors::{Error, Result};
use crate::models::{PollingArgs, HISTORY_PAGE_LIMIT};

const API_TOKEN_ENV: &str = "FncApiToken";
const ACCOUNT_UUID_ENV: &str = "FncAccountUuid";
const INCLUDE_PDNS_ENV: &str = "IncludePdns";
const INCLUDE_DHCP_ENV: &str = "IncludeDhcp";
const INCLUDE_EVENTS_ENV: &str = "IncludeEvents";
const POLLING_DELAY_ENV: &str = "PollingDelay";
const API_DOMAIN_ENV: &str = "FncApiDomain";
const DETECTION_STATUS_ENV: &str = "DetectionStatus";
const PULL_MUTED_ENV: &str = "PullMuted";
const INCLUDE_DESCRIPTION_ENV: &str = "IncludeDescription";
const INCLUDE_SIGNATURE_ENV: &str = "IncludeSignature";
const LOG_LEVEL_ENV: &str = "LogLevel";
const INGESTION_URL_ENV: &str = "IngestionUrl";
const INGESTION_TOKEN_ENV: &str = "IngestionToken";

const DEFAULT_POLLING_DELAY: i64 = 10;
const DEFAULT_DETECTION_STATUS: &str = "all";
const DEFAULT_PULL_MUTED: &str = "all";
const DEFAULT_LOG_LEVEL: &str = "INFO";

/// Settings for the vendor client and the history poll
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_token: Option<String>,
    pub account_uuid: Option<String>,
    /// Read from `IncludePdns`. Older connector builds read this flag from
    /// `FncAccountUuid`, so deployments that never set `IncludePdns` now
    /// leave PDNS inclusion to the vendor default.
    pub include_pdns: Option<bool>,
    pub include_dhcp: Option<bool>,
    pub include_events: Option<bool>,
    /// Minutes
    pub polling_delay: i64,
    pub domain: Option<String>,
    pub detection_status: String,
    pub pull_muted: String,
    pub include_description: bool,
    pub include_signature: bool,
    /// Kept raw; parsed when the client's verbosity is set
    pub log_level: String,
    pub sink: SinkConfig,
}

/// Where enriched detections are delivered
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SinkConfig {
    pub url: Option<String>,
    pub token: Option<String>,
}

impl Config {
    /// Load from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (for testing)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let polling_delay = match get(POLLING_DELAY_ENV) {
            Some(raw) => raw.trim().parse::<i64>().map_err(|_| {
                Error::Config(format!("{} must be an integer, got {:?}", POLLING_DELAY_ENV, raw))
            })?,
            None => DEFAULT_POLLING_DELAY,
        };

        let flag = |key: &str| -> Result<Option<bool>> {
            get(key).map(|raw| parse_flag(key, &raw)).transpose()
        };

        Ok(Self {
            api_token: get(API_TOKEN_ENV),
            account_uuid: get(ACCOUNT_UUID_ENV),
            include_pdns: flag(INCLUDE_PDNS_ENV)?,
            include_dhcp: flag(INCLUDE_DHCP_ENV)?,
            include_events: flag(INCLUDE_EVENTS_ENV)?,
            polling_delay,
            domain: get(API_DOMAIN_ENV),
            detection_status: get(DETECTION_STATUS_ENV)
                .unwrap_or_else(|| DEFAULT_DETECTION_STATUS.to_string()),
            pull_muted: get(PULL_MUTED_ENV).unwrap_or_else(|| DEFAULT_PULL_MUTED.to_string()),
            include_description: flag(INCLUDE_DESCRIPTION_ENV)?.unwrap_or(true),
            include_signature: flag(INCLUDE_SIGNATURE_ENV)?.unwrap_or(true),
            log_level: get(LOG_LEVEL_ENV).unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            sink: SinkConfig {
                url: get(INGESTION_URL_ENV),
                token: get(INGESTION_TOKEN_ENV),
            },
        })
    }

    /// Build the vendor poll parameters for a history pull starting at `start_date`
    pub fn polling_args(&self, start_date: &str) -> PollingArgs {
        PollingArgs {
            account_uuid: self.account_uuid.clone(),
            polling_delay: self.polling_delay,
            status: self.detection_status.clone(),
            pull_muted_detections: self.pull_muted.clone(),
            pull_muted_rules: self.pull_muted.clone(),
            pull_muted_devices: self.pull_muted.clone(),
            include_description: self.include_description,
            include_signature: self.include_signature,
            include_pdns: self.include_pdns,
            include_dhcp: self.include_dhcp,
            include_events: self.include_events,
            filter_training_detections: true,
            limit: HISTORY_PAGE_LIMIT,
            start_date: start_date.to_string(),
        }
    }
}

/// Map a Python-style level name onto a tracing level
pub fn parse_log_level(raw: &str) -> Result<Level> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "CRITICAL" | "FATAL" | "ERROR" => Ok(Level::ERROR),
        "WARNING" | "WARN" => Ok(Level::WARN),
        "INFO" => Ok(Level::INFO),
        "DEBUG" => Ok(Level::DEBUG),
        "TRACE" | "NOTSET" => Ok(Level::TRACE),
        _ => Err(Error::Config(format!("Unknown log level: {}", raw))),
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::Config(format!("{} must be true or false, got {:?}", key, raw))),
    }
}
