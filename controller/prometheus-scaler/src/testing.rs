//! Scripted metric source for unit tests

use crate::query::{MetricSignal, MetricSource, QueryError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

pub(crate) enum Step {
    Signal(MetricSignal),
    Fail,
    Hang,
}

/// Replays one step per call; an exhausted script reads as no data.
pub(crate) struct ScriptedSource {
    script: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    entered: Notify,
}

impl ScriptedSource {
    pub(crate) fn new(steps: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
            entered: Notify::new(),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) async fn wait_entered(&self) {
        self.entered.notified().await
    }
}

#[async_trait]
impl MetricSource for ScriptedSource {
    async fn execute(&self) -> Result<MetricSignal, QueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Signal(MetricSignal::NoData));

        match step {
            Step::Signal(signal) => Ok(signal),
            Step::Fail => Err(QueryError::AmbiguousResult {
                query: "up".to_string(),
                count: 2,
            }),
            Step::Hang => std::future::pending().await,
        }
    }
}
