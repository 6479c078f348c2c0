//! Collaborator seams for the history pull
//!
//! The vendor client owns paging, checkpoint advancement, auth and rate
//! limiting. The handler only sees these traits, so tests and other
//! deployments can swap the HTTP adapters for their own.

use async_trait::async_trait;
use tracing::Level;

use crate::errors::Result;
use crate::models::{ApiContext, Detection, PollingArgs, ResponsePage};

/// Builds vendor clients scoped to one integration and tenant
pub trait ApiClientFactory: Send + Sync {
    fn get_api_client(
        &self,
        name: &str,
        api_token: Option<&str>,
        domain: Option<&str>,
    ) -> Result<Box<dyn DetectionSource>>;
}

/// A vendor client able to replay detection history
pub trait DetectionSource: Send {
    /// Verbosity for the client's own request logging
    fn set_log_level(&mut self, level: Level) -> Result<()>;

    /// Start a history poll over the window held in `ctx`.
    ///
    /// The returned poller is drained once and cannot be restarted.
    fn poll_history(&self, ctx: &ApiContext, args: &PollingArgs) -> Result<Box<dyn HistoryPoller>>;
}

/// Lazy, finite sequence of history pages
#[async_trait]
pub trait HistoryPoller: Send {
    /// Fetch the next page, advancing `ctx` as the client sees fit.
    ///
    /// Returns `None` once the history window is exhausted, and on every
    /// call after that.
    async fn next_page(&mut self, ctx: &mut ApiContext) -> Result<Option<ResponsePage>>;
}

/// Destination for enriched detections
#[async_trait]
pub trait DetectionSink: Send + Sync {
    async fn post_data(&self, detections: &[Detection], event_type: &str) -> Result<()>;
}
