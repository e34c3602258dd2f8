//! Scheduling strategies that push N requests through at most C slots.
//!
//! Every strategy performs exactly `config.requests` executions, never has more
//! than `config.concurrency` of them in flight, and returns only after every
//! execution has produced an outcome. They differ only in how work is handed
//! out and how outcomes reach the statistics.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{ mpsc, Mutex, Semaphore };
use tokio::task::JoinSet;
use tracing::{ debug, info };

use crate::aggregator::{ AggregateStats, ChannelAggregator, Recorder, SharedAggregator };
use crate::config::{ Config, Strategy };
use crate::error::BenchError;
use crate::executor::Executor;
use crate::runner::{ Phase, PhaseTracker };

/// A scheduling policy for one benchmark run
#[async_trait]
pub trait Controller: Send + Sync {
    /// Drive the whole workload and hand back the final statistics.
    ///
    /// Implementations advance `phase` to [`Phase::Draining`] once the last
    /// unit of work has been handed out.
    async fn run(
        &self,
        config: &Config,
        executor: Arc<dyn Executor>,
        phase: &PhaseTracker
    ) -> Result<AggregateStats, BenchError>;
}

pub fn controller_for(strategy: Strategy) -> Box<dyn Controller> {
    match strategy {
        Strategy::Semaphore => Box::new(SemaphoreGate),
        Strategy::WorkerPool => Box::new(WorkerPool),
        Strategy::Mutex => Box::new(MutexPool),
    }
}

/// One task per request, each admitted by one of C permits
#[derive(Debug, Default)]
pub struct SemaphoreGate;

#[async_trait]
impl Controller for SemaphoreGate {
    async fn run(
        &self,
        config: &Config,
        executor: Arc<dyn Executor>,
        phase: &PhaseTracker
    ) -> Result<AggregateStats, BenchError> {
        let aggregator = ChannelAggregator::spawn(config.concurrency);
        let slots = Arc::new(Semaphore::new(config.concurrency));
        let mut tasks = JoinSet::new();

        for _ in 0..config.requests {
            let slots = slots.clone();
            let executor = executor.clone();
            let recorder = aggregator.recorder();

            tasks.spawn(async move {
                let outcome = {
                    let _slot = slots
                        .acquire_owned().await
                        .map_err(|e| BenchError::Dispatch(e.to_string()))?;
                    executor.execute().await
                };
                recorder.record(outcome).await;
                Ok::<(), BenchError>(())
            });
        }
        phase.advance(Phase::Draining);

        while let Some(task) = tasks.join_next().await {
            task??;
        }
        aggregator.finish().await
    }
}

/// C workers, outcomes sent to a single collector
#[derive(Debug, Default)]
pub struct WorkerPool;

#[async_trait]
impl Controller for WorkerPool {
    async fn run(
        &self,
        config: &Config,
        executor: Arc<dyn Executor>,
        phase: &PhaseTracker
    ) -> Result<AggregateStats, BenchError> {
        let aggregator = ChannelAggregator::spawn(config.concurrency);
        run_pool(config, executor, phase, aggregator.recorder()).await?;
        aggregator.finish().await
    }
}

/// C workers, outcomes folded by the workers themselves under a lock
#[derive(Debug, Default)]
pub struct MutexPool;

#[async_trait]
impl Controller for MutexPool {
    async fn run(
        &self,
        config: &Config,
        executor: Arc<dyn Executor>,
        phase: &PhaseTracker
    ) -> Result<AggregateStats, BenchError> {
        let aggregator = SharedAggregator::new();
        run_pool(config, executor, phase, aggregator.clone()).await?;
        aggregator.into_stats()
    }
}

// Opaque unit of work, one per request
#[derive(Debug)]
struct Job;

/// Closed queue of jobs shared by the pool workers
struct JobQueue {
    rx: Mutex<mpsc::Receiver<Job>>,
}

impl JobQueue {
    /// Next job, `None` once the queue is empty and closed
    async fn next(&self) -> Option<Job> {
        self.rx.lock().await.recv().await
    }
}

// Start C workers, feed them N jobs, close the queue, wait for every worker to exit
async fn run_pool<R: Recorder>(
    config: &Config,
    executor: Arc<dyn Executor>,
    phase: &PhaseTracker,
    recorder: R
) -> Result<(), BenchError> {
    let (tx, rx) = mpsc::channel(config.requests);
    let queue = Arc::new(JobQueue { rx: Mutex::new(rx) });

    let mut workers = JoinSet::new();
    for id in 0..config.concurrency {
        workers.spawn(work(id, queue.clone(), executor.clone(), recorder.clone()));
    }
    drop(recorder);
    info!(workers = config.concurrency, "worker pool started");

    for _ in 0..config.requests {
        tx.send(Job).await.map_err(|e| BenchError::Dispatch(e.to_string()))?;
    }
    drop(tx);
    phase.advance(Phase::Draining);

    while let Some(worker) = workers.join_next().await {
        worker?;
    }
    Ok(())
}

async fn work<R: Recorder>(id: usize, queue: Arc<JobQueue>, executor: Arc<dyn Executor>, recorder: R) {
    let mut completed = 0usize;
    while queue.next().await.is_some() {
        let outcome = executor.execute().await;
        recorder.record(outcome).await;
        completed += 1;
    }
    debug!(worker = id, completed, "worker exiting");
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::testing::MockExecutor;
    use super::*;

    const STRATEGIES: [Strategy; 3] = [Strategy::Semaphore, Strategy::WorkerPool, Strategy::Mutex];

    fn config(requests: usize, concurrency: usize, strategy: Strategy) -> Config {
        Config::new("http://127.0.0.1:8080/greet", requests, concurrency)
            .unwrap()
            .with_strategy(strategy)
    }

    async fn run(config: &Config, executor: Arc<MockExecutor>) -> AggregateStats {
        let phase = PhaseTracker::new();
        let stats = controller_for(config.strategy)
            .run(config, executor, &phase).await
            .unwrap();
        assert_eq!(phase.current(), Phase::Draining);
        stats
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn executes_exactly_n_requests() {
        for strategy in STRATEGIES {
            for (requests, concurrency) in [(1, 1), (7, 3), (50, 10), (3, 20)] {
                let executor = Arc::new(MockExecutor::new(Duration::from_millis(1)));
                let config = config(requests, concurrency, strategy);

                let stats = run(&config, executor.clone()).await;

                assert_eq!(executor.calls(), requests, "{} n={} c={}", strategy, requests, concurrency);
                assert_eq!(stats.requests_issued, requests);
                assert_eq!(stats.requests_succeeded, requests);
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_concurrency() {
        for strategy in STRATEGIES {
            let executor = Arc::new(MockExecutor::new(Duration::from_millis(5)));
            let config = config(60, 4, strategy);

            run(&config, executor.clone()).await;

            assert!(executor.peak_in_flight() <= 4, "{} peaked at {}", strategy, executor.peak_in_flight());
            assert!(executor.peak_in_flight() >= 1);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn strategies_agree_on_counts() {
        let mut results = Vec::new();
        for strategy in STRATEGIES {
            let executor = Arc::new(MockExecutor::new(Duration::from_millis(1)).failing_every(4));
            let stats = run(&config(40, 6, strategy), executor).await;
            results.push((stats.requests_issued, stats.requests_succeeded));
        }

        assert_eq!(results, vec![(40, 30); 3]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn all_failures_are_still_counted() {
        for strategy in STRATEGIES {
            let executor = Arc::new(MockExecutor::new(Duration::ZERO).failing_every(1));
            let stats = run(&config(10, 5, strategy), executor).await;

            assert_eq!(stats.requests_issued, 10);
            assert_eq!(stats.requests_succeeded, 0);
            assert_eq!(stats.min_latency_micros, None);
            assert_eq!(stats.max_latency_micros, None);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn latency_bounds_hold() {
        for strategy in STRATEGIES {
            let executor = Arc::new(MockExecutor::new(Duration::from_millis(2)));
            let stats = run(&config(20, 5, strategy), executor).await;

            let min = stats.min_latency_micros.unwrap();
            let max = stats.max_latency_micros.unwrap();
            let avg = stats.average_latency_micros().unwrap();
            assert!(min >= 2_000);
            assert!(min <= max);
            assert!((min as f64) <= avg && avg <= (max as f64));
        }
    }
}
