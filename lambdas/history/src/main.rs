//! fncloud Detection History Lambda
//!
//! Invoked by the connector's orchestration with
//! `{"event_type": "detections", "history": {"checkpoint": ..., ...}}`.
//! Returns the checkpoint to persist for the next invocation.

use fncloud_core::config::parse_log_level;
use fncloud_core::{Config, DetectionHistory, FncHttpClientFactory, HttpSink, InvocationArgs};
use lambda_runtime::{run, service_fn, Error as LambdaError, LambdaEvent};
use serde_json::Value;
use tracing::{error, info};

type History = DetectionHistory<FncHttpClientFactory, HttpSink>;

async fn function_handler(
    event: LambdaEvent<InvocationArgs>,
    history: &History,
) -> Result<Value, LambdaError> {
    let (args, context) = event.into_parts();

    info!(request_id = %context.request_id, "Processing detections history request");

    match history.run(args).await {
        Ok(checkpoint) => Ok(checkpoint),
        Err(e) => {
            error!(
                request_id = %context.request_id,
                code = e.code(),
                retryable = e.is_retryable(),
                "Detections history request failed"
            );
            Err(e.into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    let config = Config::from_env();
    let level = config
        .as_ref()
        .ok()
        .and_then(|c| parse_log_level(&c.log_level).ok())
        .unwrap_or(tracing::Level::INFO);

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .init();

    let config = config.inspect_err(|e| error!(error = %e, "Invalid configuration"))?;

    // Initialize clients once per execution environment
    let clients = FncHttpClientFactory::new()?;
    let sink = HttpSink::new(&config.sink)?;
    let history = DetectionHistory::new(config, clients, sink);

    run(service_fn(|event| function_handler(event, &history))).await
}
