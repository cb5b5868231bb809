//! Monitoring probes and the task that runs them.

use crate::capabilities::Capability;
use crate::learning::LearningSource;
use crate::scheduler::tasks::{TaskBody, TaskContext, TaskResult};
use crate::services::{Probe, ServiceError, notify_best_effort};
use crate::tasks::TaskServices;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Runs one [`Probe`] and reports findings to the sink.
pub struct ProbeTask {
    probe: Arc<dyn Probe>,
    services: TaskServices,
}

impl ProbeTask {
    /// Task running `probe`.
    pub fn new(probe: Arc<dyn Probe>, services: TaskServices) -> Self {
        Self { probe, services }
    }
}

#[async_trait]
impl TaskBody for ProbeTask {
    async fn run(&self, _ctx: &TaskContext) -> TaskResult {
        if let Some(skipped) = self.services.require(Capability::Monitor) {
            return skipped;
        }
        let name = self.probe.name();
        let summary = match self.probe.check().await {
            Ok(None) => {
                debug!(probe = name, "all clear");
                format!("{name}: all clear")
            }
            Ok(Some(finding)) => {
                warn!(probe = name, "probe finding: {finding}");
                notify_best_effort(self.services.sink.as_ref(), &format!("[{name}] {finding}"))
                    .await;
                format!("{name}: {finding}")
            }
            Err(e) => return TaskResult::Error(format!("{name} probe failed: {e}")),
        };
        self.services
            .learnings
            .record(LearningSource::Monitoring, &format!("Monitoring check: {summary}"));
        TaskResult::Success(summary)
    }
}

/// Probe that reports when an HTTP endpoint stops answering with a
/// success status.
pub struct HttpProbe {
    name: String,
    url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpProbe {
    /// Probe `url` under `name`, giving up after `timeout`.
    pub fn new(name: impl Into<String>, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            timeout,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> Result<Option<String>, ServiceError> {
        match self.client.get(&self.url).timeout(self.timeout).send().await {
            Ok(response) if response.status().is_success() => Ok(None),
            Ok(response) => Ok(Some(format!(
                "{} answered HTTP {}",
                self.url,
                response.status()
            ))),
            Err(e) if e.is_timeout() => Ok(Some(format!(
                "{} did not answer within {}s",
                self.url,
                self.timeout.as_secs()
            ))),
            Err(e) if e.is_builder() => Err(ServiceError::InvalidResponse(e.to_string())),
            Err(e) => Ok(Some(format!("{} unreachable: {e}", self.url))),
        }
    }
}
