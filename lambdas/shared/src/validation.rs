//! Invocation payload validation
//!
//! Runs before any client, context or sink is touched.

use serde_json::Value;
use tracing::info;

use crate::errors::{Error, Result};
use crate::models::{InvocationArgs, SUPPORTED_EVENT_TYPE};

/// Reject payloads that cannot start a detection history pull
pub fn validate_args(args: &InvocationArgs) -> Result<()> {
    info!("Validating args to retrieve detections history.");

    let supported = args
        .event_type
        .as_deref()
        .map(|t| t.trim().to_lowercase() == SUPPORTED_EVENT_TYPE)
        .unwrap_or(false);
    if !supported {
        return Err(Error::InvalidInput(
            "Event type was not provided or it is not supported. Event type must be detections to pull detections history.".to_string(),
        ));
    }

    let history = match &args.history {
        Some(h) if !h.is_empty() => h,
        _ => {
            return Err(Error::InvalidInput(
                "History object was not provided or it is empty. History object is required to retrieve detection history.".to_string(),
            ))
        }
    };

    if !history.checkpoint.as_ref().map(is_truthy).unwrap_or(false) {
        return Err(Error::InvalidInput(
            "Checkpoint was not provided. Checkpoint is required to retrieve detections history."
                .to_string(),
        ));
    }

    info!("Args for retrieving detections history validated.");
    Ok(())
}

/// Whether a JSON value carries something usable: not null, false, zero or empty
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
