//! Shared test doubles used by unit and integration tests.
//!
//! Scripted reasoning service, recording notification sink, probes and
//! instrumented task bodies. Nothing here talks to the network.

use crate::scheduler::tasks::{TaskBody, TaskContext, TaskResult};
use crate::services::{NotificationSink, Probe, ReasoningService, ServiceError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Reasoning service that replays canned replies.
///
/// Replies are chosen by the first rule whose needle occurs in the prompt,
/// then from the queued sequence, then the fallback.
pub struct ScriptedReasoner {
    rules: Vec<(String, Result<String, ServiceError>)>,
    queue: Mutex<VecDeque<Result<String, ServiceError>>>,
    fallback: Result<String, ServiceError>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedReasoner {
    /// Always answer `reply`.
    pub fn always(reply: &str) -> Self {
        Self::with_fallback(Ok(reply.to_owned()))
    }

    /// Always fail with `error`.
    pub fn failing(error: ServiceError) -> Self {
        Self::with_fallback(Err(error))
    }

    /// Answer from `replies` in order, then fail as unavailable.
    pub fn sequence(replies: Vec<Result<String, ServiceError>>) -> Self {
        let reasoner = Self::with_fallback(Err(ServiceError::Unavailable(
            "script exhausted".to_owned(),
        )));
        *reasoner.queue.lock().unwrap_or_else(|e| e.into_inner()) = replies.into();
        reasoner
    }

    fn with_fallback(fallback: Result<String, ServiceError>) -> Self {
        Self {
            rules: Vec::new(),
            queue: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answer `reply` whenever the prompt contains `needle`.
    pub fn on(mut self, needle: &str, reply: &str) -> Self {
        self.rules.push((needle.to_owned(), Ok(reply.to_owned())));
        self
    }

    /// Fail with `error` whenever the prompt contains `needle`.
    pub fn on_fail(mut self, needle: &str, error: ServiceError) -> Self {
        self.rules.push((needle.to_owned(), Err(error)));
        self
    }

    /// Sleep before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of calls received.
    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoner {
    async fn complete(&self, prompt: &str, _timeout: Duration) -> Result<String, ServiceError> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_owned());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((_, reply)) = self.rules.iter().find(|(n, _)| prompt.contains(n.as_str())) {
            return reply.clone();
        }
        if let Some(reply) = self
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
        {
            return reply;
        }
        self.fallback.clone()
    }
}

/// Notification sink that keeps every message.
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<String>>,
    unavailable: bool,
    delay: Option<Duration>,
}

impl RecordingSink {
    /// Sink that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that rejects everything.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Sleep before accepting.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Messages accepted so far.
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, text: &str) -> Result<(), ServiceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable {
            return Err(ServiceError::Unavailable("sink offline".to_owned()));
        }
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(text.to_owned());
        Ok(())
    }
}

/// Probe returning a fixed result.
pub struct StaticProbe {
    name: String,
    result: Result<Option<String>, ServiceError>,
}

impl StaticProbe {
    /// Probe named `name` answering `result`.
    pub fn new(name: &str, result: Result<Option<String>, ServiceError>) -> Self {
        Self {
            name: name.to_owned(),
            result,
        }
    }
}

#[async_trait]
impl Probe for StaticProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> Result<Option<String>, ServiceError> {
        self.result.clone()
    }
}

/// Task body that counts invocations.
pub struct CountingTask {
    runs: AtomicUsize,
    completions: AtomicUsize,
    fail: bool,
    delay: Option<Duration>,
}

impl CountingTask {
    /// Body that succeeds.
    pub fn succeeding() -> Self {
        Self {
            runs: AtomicUsize::new(0),
            completions: AtomicUsize::new(0),
            fail: false,
            delay: None,
        }
    }

    /// Body that fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::succeeding()
        }
    }

    /// Sleep before returning.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Times the body was entered.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Times the body returned.
    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskBody for CountingTask {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.completions.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            TaskResult::Error(format!("{} run {n} failed", ctx.task_id()))
        } else {
            TaskResult::Success(format!("{} run {n}", ctx.task_id()))
        }
    }
}

/// Task body that panics.
pub struct PanickingTask;

#[async_trait]
impl TaskBody for PanickingTask {
    async fn run(&self, _ctx: &TaskContext) -> TaskResult {
        panic!("task body exploded")
    }
}

/// Task body recording how many runs of the same task id overlap.
pub struct ConcurrencyGauge {
    hold: Duration,
    active: Mutex<HashMap<String, usize>>,
    max_overlap: AtomicUsize,
    total: AtomicUsize,
}

impl ConcurrencyGauge {
    /// Gauge whose runs last `hold`.
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            active: Mutex::new(HashMap::new()),
            max_overlap: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
        }
    }

    /// Largest number of simultaneous runs observed for any one id.
    pub fn max_overlap(&self) -> usize {
        self.max_overlap.load(Ordering::SeqCst)
    }

    /// Runs started across all ids.
    pub fn total_runs(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskBody for ConcurrencyGauge {
    async fn run(&self, ctx: &TaskContext) -> TaskResult {
        self.total.fetch_add(1, Ordering::SeqCst);
        {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            let count = active.entry(ctx.task_id().to_owned()).or_insert(0);
            *count += 1;
            self.max_overlap.fetch_max(*count, Ordering::SeqCst);
        }
        tokio::time::sleep(self.hold).await;
        {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(count) = active.get_mut(ctx.task_id()) {
                *count = count.saturating_sub(1);
            }
        }
        TaskResult::Success("held".to_owned())
    }
}
