//! StreamIsActive watch loop
//!
//! One [`ActivityWatch`] runs per open stream. It re-evaluates the metric on a
//! fixed period and pushes an "active" notification whenever the value is
//! positive. The subscriber's disconnect (its receiver closing) is raced
//! against both the timer and any in-flight query, so the loop ends promptly
//! once nobody is listening.

use crate::metrics::Metrics;
use crate::proto::IsActiveResponse;
use crate::query::MetricSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tonic::Status;
use tracing::{debug, info, warn};

/// Polling cadence of an open stream
pub const STREAM_POLL_INTERVAL: Duration = Duration::from_secs(60 * 60);

pub type ActivitySender = mpsc::Sender<Result<IsActiveResponse, Status>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Polling,
    Closed,
}

/// Totals for a finished watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchReport {
    pub state: WatchState,
    pub polls: u64,
    pub pushes: u64,
}

pub struct ActivityWatch<S> {
    source: Arc<S>,
    period: Duration,
    sender: ActivitySender,
    target: String,
    metrics: Metrics,
    state: WatchState,
    polls: u64,
    pushes: u64,
}

impl<S: MetricSource> ActivityWatch<S> {
    pub fn new(
        source: Arc<S>,
        period: Duration,
        sender: ActivitySender,
        target: String,
        metrics: Metrics,
    ) -> Self {
        Self {
            source,
            period,
            sender,
            target,
            metrics,
            state: WatchState::Polling,
            polls: 0,
            pushes: 0,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    /// Poll until the subscriber goes away
    pub async fn run(mut self) -> WatchReport {
        // First evaluation happens one full period after the stream opens.
        let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            target_name = %self.target,
            period_secs = self.period.as_secs(),
            "Activity watch started"
        );

        while self.state == WatchState::Polling {
            tokio::select! {
                _ = self.sender.closed() => self.close("subscriber disconnected"),
                _ = ticker.tick() => self.poll().await,
            }
        }

        self.metrics
            .record_stream_closed(&self.target, self.polls, self.pushes);

        WatchReport {
            state: self.state,
            polls: self.polls,
            pushes: self.pushes,
        }
    }

    async fn poll(&mut self) {
        self.polls += 1;
        let started = Instant::now();

        let outcome = tokio::select! {
            _ = self.sender.closed() => None,
            result = self.source.execute() => Some(result),
        };

        let Some(result) = outcome else {
            self.close("subscriber disconnected during query");
            return;
        };

        match result {
            Ok(signal) => {
                self.metrics
                    .record_query("stream_is_active", "ok", started.elapsed());

                if !signal.is_active() {
                    debug!(value = signal.value(), "Metric inactive, nothing to push");
                    return;
                }

                if self
                    .sender
                    .send(Ok(IsActiveResponse { result: true }))
                    .await
                    .is_err()
                {
                    self.close("push to subscriber failed");
                    return;
                }

                self.pushes += 1;
                self.metrics.record_push(&self.target);
            }
            Err(e) => {
                self.metrics
                    .record_query("stream_is_active", e.kind(), started.elapsed());
                warn!(
                    target_name = %self.target,
                    error_kind = e.kind(),
                    error = %e,
                    "Prometheus query failed, stream stays open"
                );
            }
        }
    }

    fn close(&mut self, reason: &str) {
        info!(target_name = %self.target, reason = %reason, "Activity watch closed");
        self.state = WatchState::Closed;
    }
}
