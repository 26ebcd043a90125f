// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Stub algorithm implementations for exercising the scheduler without
//! real physics code.
//!
//! A [`StubAlgorithm`] declares arbitrary data dependencies and attributes
//! through its builder methods, resolves to a configurable outcome, and can
//! optionally sleep (to hold a worker), record its execution into a shared
//! [`ExecutionLog`] (to assert scheduling order in tests) and invoke a hook
//! while running (to drive event views or condition loading from inside an
//! algorithm body, the way production view-maker algorithms do).

use crate::slot::EventContext;
use crate::traits::{AlgOutcome, Algorithm};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a stub resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StubBehavior {
    #[default]
    Accept,
    Reject,
    Fail,
}

/// Shared record of executed algorithm names, in execution order.
#[derive(Clone, Default)]
pub struct ExecutionLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push(name.to_string());
    }

    /// Executed names in order.
    pub fn names(&self) -> Vec<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.clone()
    }

    pub fn count_of(&self, name: &str) -> usize {
        self.names().iter().filter(|n| n.as_str() == name).count()
    }

    /// Position of the first execution of `name`, if any.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.names().iter().position(|n| n == name)
    }
}

type Hook = Arc<dyn Fn(&EventContext) + Send + Sync>;

/// A configurable test algorithm.
pub struct StubAlgorithm {
    name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    cardinality: u32,
    clonable: bool,
    blocking: bool,
    accelerated: bool,
    behavior: StubBehavior,
    sleep: Duration,
    log: Option<ExecutionLog>,
    hook: Option<Hook>,
}

impl StubAlgorithm {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            cardinality: 1,
            clonable: false,
            blocking: false,
            accelerated: false,
            behavior: StubBehavior::Accept,
            sleep: Duration::ZERO,
            log: None,
            hook: None,
        }
    }

    pub fn with_inputs(mut self, inputs: &[&str]) -> Self {
        self.inputs = inputs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_outputs(mut self, outputs: &[&str]) -> Self {
        self.outputs = outputs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_cardinality(mut self, cardinality: u32) -> Self {
        self.cardinality = cardinality;
        self
    }

    pub fn clonable(mut self) -> Self {
        self.clonable = true;
        self
    }

    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }

    pub fn accelerated(mut self) -> Self {
        self.accelerated = true;
        self
    }

    pub fn with_behavior(mut self, behavior: StubBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn rejecting(self) -> Self {
        self.with_behavior(StubBehavior::Reject)
    }

    pub fn failing(self) -> Self {
        self.with_behavior(StubBehavior::Fail)
    }

    pub fn sleeping(mut self, millis: u64) -> Self {
        self.sleep = Duration::from_millis(millis);
        self
    }

    pub fn with_log(mut self, log: ExecutionLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Invoke `hook` from inside the algorithm body, before the outcome is
    /// reported.
    pub fn with_hook(mut self, hook: impl Fn(&EventContext) + Send + Sync + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }
}

#[async_trait]
impl Algorithm for StubAlgorithm {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> Vec<String> {
        self.inputs.clone()
    }

    fn outputs(&self) -> Vec<String> {
        self.outputs.clone()
    }

    fn cardinality(&self) -> u32 {
        self.cardinality
    }

    fn is_clonable(&self) -> bool {
        self.clonable
    }

    fn is_blocking(&self) -> bool {
        self.blocking
    }

    fn is_asynchronous(&self) -> bool {
        self.accelerated
    }

    async fn execute(&self, context: &EventContext) -> AlgOutcome {
        if !self.sleep.is_zero() {
            tokio::time::sleep(self.sleep).await;
        }
        if let Some(hook) = &self.hook {
            hook(context);
        }
        if let Some(log) = &self.log {
            log.record(&self.name);
        }
        match self.behavior {
            StubBehavior::Accept => AlgOutcome::Accepted,
            StubBehavior::Reject => AlgOutcome::Rejected,
            StubBehavior::Fail => AlgOutcome::Error(format!("{} failed on purpose", self.name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn outcomes_follow_behavior() {
        let ctx = EventContext::new(1);
        assert_eq!(
            StubAlgorithm::new("a").execute(&ctx).await,
            AlgOutcome::Accepted
        );
        assert_eq!(
            StubAlgorithm::new("r").rejecting().execute(&ctx).await,
            AlgOutcome::Rejected
        );
        assert!(matches!(
            StubAlgorithm::new("f").failing().execute(&ctx).await,
            AlgOutcome::Error(_)
        ));
    }

    #[tokio::test]
    async fn log_records_in_order() {
        let log = ExecutionLog::new();
        let ctx = EventContext::new(1);
        StubAlgorithm::new("first")
            .with_log(log.clone())
            .execute(&ctx)
            .await;
        StubAlgorithm::new("second")
            .with_log(log.clone())
            .execute(&ctx)
            .await;
        assert_eq!(log.names(), vec!["first", "second"]);
        assert_eq!(log.position_of("second"), Some(1));
        assert_eq!(log.count_of("first"), 1);
    }

    #[tokio::test]
    async fn hook_sees_the_context() {
        let seen = Arc::new(Mutex::new(None));
        let seen_by_hook = seen.clone();
        let alg = StubAlgorithm::new("hooked").with_hook(move |ctx| {
            *seen_by_hook.lock().unwrap() = Some(ctx.event_number);
        });
        alg.execute(&EventContext::new(42)).await;
        assert_eq!(*seen.lock().unwrap(), Some(42));
    }
}
