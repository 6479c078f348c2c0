//! fncloud Core Library
//!
//! Shared functionality for the FortiNDR Cloud history Lambda including:
//! - Domain models and configuration
//! - Payload validation and detection enrichment
//! - The fetch-and-send pipeline and its collaborator traits
//! - HTTP adapters for the detections API and the ingestion sink
//! - Error types

pub mod client;
pub mod config;
pub mod enrichment;
pub mod errors;
pub mod fnc;
pub mod history;
pub mod models;
pub mod sink;
pub mod validation;


pub use client::{ApiClientFactory, DetectionSink, DetectionSource, HistoryPoller};
pub use config::{Config, SinkConfig};
pub use errors::{Error, Result};
pub use fnc::FncHttpClientFactory;
pub use history::DetectionHistory;
pub use models::*;
pub use sink::HttpSink;
