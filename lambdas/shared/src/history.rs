//! Detection history pull
//!
//! One invocation validates its payload, seeds a polling context, drains the
//! vendor client's history poll page by page (enriching and forwarding each
//! page before asking for the next) and returns the checkpoint the client
//! left in the context.

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::client::{ApiClientFactory, DetectionSink};
use crate::config::{parse_log_level, Config};
use crate::enrichment::add_events_to_detections;
use crate::errors::{Error, Result};
use crate::models::{
    display_checkpoint, ApiContext, HistoryWindow, InvocationArgs, ResponsePage, INTEGRATION_NAME,
};
use crate::validation::{is_truthy, validate_args};

/// Fetch-and-send pipeline for detection history
pub struct DetectionHistory<F, S> {
    config: Config,
    clients: F,
    sink: S,
}

impl<F, S> DetectionHistory<F, S>
where
    F: ApiClientFactory,
    S: DetectionSink,
{
    pub fn new(config: Config, clients: F, sink: S) -> Self {
        Self {
            config,
            clients,
            sink,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Handle one invocation, returning the checkpoint to persist for the next one
    pub async fn run(&self, args: InvocationArgs) -> Result<Value> {
        validate_args(&args)?;

        let event_type = args.event_type.unwrap_or_default();
        let history = args.history.unwrap_or_default();

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let start_date = non_empty(history.start_date_str.flatten()).unwrap_or_else(|| now.clone());
        let end_date = non_empty(history.end_date_str.flatten()).unwrap_or_else(|| now.clone());
        let checkpoint = history
            .checkpoint
            .filter(is_truthy)
            .unwrap_or_else(|| Value::String(now.clone()));
        let checkpoint_str = display_checkpoint(&checkpoint);

        info!(
            event_type = %event_type,
            start_date = %checkpoint_str,
            end_date = %end_date,
            "FetchAndSendDetections: fetching for history"
        );

        let mut ctx = ApiContext::new();
        ctx.update_checkpoint(checkpoint);
        ctx.update_history(HistoryWindow {
            start_date: start_date.clone(),
            end_date,
        });

        match self
            .fetch_and_send_detections(&mut ctx, &event_type, &start_date)
            .await
        {
            Ok(()) => {
                let new_checkpoint = ctx.checkpoint().clone();
                info!(
                    checkpoint = %checkpoint_str,
                    new_checkpoint = %display_checkpoint(&new_checkpoint),
                    "Detections history retrieved"
                );
                Ok(new_checkpoint)
            }
            Err(e) => {
                error!(
                    checkpoint = %checkpoint_str,
                    error = %e,
                    "Failure: FetchAndSendDetections"
                );
                Err(Error::FetchFailed {
                    checkpoint: checkpoint_str,
                    source: Box::new(e),
                })
            }
        }
    }

    /// Drain the vendor history poll, forwarding every enriched page to the sink
    pub async fn fetch_and_send_detections(
        &self,
        ctx: &mut ApiContext,
        event_type: &str,
        start_date: &str,
    ) -> Result<()> {
        let mut client = self.clients.get_api_client(
            INTEGRATION_NAME,
            self.config.api_token.as_deref(),
            self.config.domain.as_deref(),
        )?;
        client.set_log_level(parse_log_level(&self.config.log_level)?)?;

        let polling_args = self.config.polling_args(start_date);
        let mut poller = client.poll_history(ctx, &polling_args)?;

        let mut pages = 0usize;
        let mut forwarded = 0usize;
        while let Some(page) = poller.next_page(ctx).await? {
            let ResponsePage {
                mut detections,
                events,
            } = page;
            add_events_to_detections(&mut detections, &events)?;
            self.sink.post_data(&detections, event_type).await?;

            pages += 1;
            forwarded += detections.len();
            debug!(page = pages, detections = detections.len(), "Forwarded detections page");
        }

        info!(pages = pages, detections = forwarded, "Detections history drained");
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
