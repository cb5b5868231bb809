//! Notification sinks.

use crate::services::{NotificationSink, ServiceError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

/// Upper bound on a best-effort notification.
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Sink that writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn notify(&self, text: &str) -> Result<(), ServiceError> {
        info!(target: "autonomy::notify", "{text}");
        Ok(())
    }
}

/// Deliver `text` without letting a sink failure (or a hung sink) affect the
/// caller. Returns `true` when the sink accepted the message.
pub async fn notify_best_effort(sink: &dyn NotificationSink, text: &str) -> bool {
    match tokio::time::timeout(NOTIFY_TIMEOUT, sink.notify(text)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(error = %e, "notification dropped");
            false
        }
        Err(_) => {
            warn!("notification timed out");
            false
        }
    }
}
