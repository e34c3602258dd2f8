//! Folding per-request outcomes into run statistics.
//!
//! Two aggregators share the same fold ([`AggregateStats::record`]) and differ
//! only in how concurrent writers are serialized:
//!
//! - [`ChannelAggregator`]: workers send outcomes over a bounded channel and a
//!   single collector task owns the statistics.
//! - [`SharedAggregator`]: workers fold outcomes themselves under a mutex that
//!   is held only for the counter update.

use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };

use async_trait::async_trait;
use tokio::{ sync::mpsc, task::JoinHandle };
use tracing::{ trace, warn };

use crate::error::{ BenchError, FailureCause };
use crate::executor::Outcome;

/// Accumulated counters of a run.
///
/// Min and max stay `None` until the first success so that a genuine
/// zero latency is never confused with "no data".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateStats {
    pub requests_issued: usize,
    pub requests_succeeded: usize,
    pub sum_latency_micros: u64,
    pub min_latency_micros: Option<u64>,
    pub max_latency_micros: Option<u64>,
    pub timeouts: usize, // failures caused by the request timeout
    pub redirect_failures: usize, // failures caused by the redirect budget
}

impl AggregateStats {
    /// Fold one outcome in
    pub fn record(&mut self, outcome: Outcome) {
        self.requests_issued += 1;

        match outcome {
            Outcome::Success { latency_micros } => {
                self.requests_succeeded += 1;
                self.sum_latency_micros += latency_micros;
                self.min_latency_micros = Some(
                    self.min_latency_micros.map_or(latency_micros, |min| min.min(latency_micros))
                );
                self.max_latency_micros = Some(
                    self.max_latency_micros.map_or(latency_micros, |max| max.max(latency_micros))
                );
            }
            Outcome::Failure { cause: FailureCause::Timeout } => {
                self.timeouts += 1;
            }
            Outcome::Failure { cause: FailureCause::TooManyRedirects } => {
                self.redirect_failures += 1;
            }
            Outcome::Failure { cause: FailureCause::Transport(_) } => {}
        }
    }

    pub fn failed_requests(&self) -> usize {
        self.requests_issued - self.requests_succeeded
    }

    /// Mean latency of successful requests, `None` without any success
    pub fn average_latency_micros(&self) -> Option<f64> {
        if self.requests_succeeded == 0 {
            None
        } else {
            Some((self.sum_latency_micros as f64) / (self.requests_succeeded as f64))
        }
    }
}

/// Destination for outcomes, callable from any number of workers at once
#[async_trait]
pub trait Recorder: Clone + Send + Sync + 'static {
    async fn record(&self, outcome: Outcome);
}

/// Statistics owned by one collector task fed through a channel
#[derive(Debug)]
pub struct ChannelAggregator {
    tx: mpsc::Sender<Outcome>,
    collector: JoinHandle<AggregateStats>,
}

impl ChannelAggregator {
    /// Spawn the collector. `buffer` bounds how many outcomes may wait to be folded.
    pub fn spawn(buffer: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Outcome>(buffer.max(1));

        let collector = tokio::spawn(async move {
            let mut stats = AggregateStats::default();
            while let Some(outcome) = rx.recv().await {
                stats.record(outcome);
                trace!(issued = stats.requests_issued, "outcome recorded");
            }
            stats
        });

        Self { tx, collector }
    }

    pub fn recorder(&self) -> ChannelRecorder {
        ChannelRecorder { tx: self.tx.clone() }
    }

    /// Close the channel and wait for the collector to fold what is left.
    ///
    /// Every [`ChannelRecorder`] must have been dropped, otherwise this waits forever.
    pub async fn finish(self) -> Result<AggregateStats, BenchError> {
        drop(self.tx);
        Ok(self.collector.await?)
    }
}

/// Sending half handed to the workers
#[derive(Debug, Clone)]
pub struct ChannelRecorder {
    tx: mpsc::Sender<Outcome>,
}

#[async_trait]
impl Recorder for ChannelRecorder {
    async fn record(&self, outcome: Outcome) {
        if self.tx.send(outcome).await.is_err() {
            warn!("aggregation channel closed, outcome dropped");
        }
    }
}

/// Statistics shared by all workers behind a mutex
#[derive(Debug, Clone, Default)]
pub struct SharedAggregator {
    stats: Arc<Mutex<AggregateStats>>,
}

impl SharedAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the statistics once every worker has let go of its handle
    pub fn into_stats(self) -> Result<AggregateStats, BenchError> {
        let stats = Arc::try_unwrap(self.stats).map_err(|_|
            BenchError::Aggregation("statistics still shared by a running worker".to_string())
        )?;
        Ok(stats.into_inner().unwrap_or_else(PoisonError::into_inner))
    }

    fn lock(&self) -> MutexGuard<'_, AggregateStats> {
        // a panicking worker cannot leave the counters half-updated
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Recorder for SharedAggregator {
    async fn record(&self, outcome: Outcome) {
        self.lock().record(outcome);
    }
}
