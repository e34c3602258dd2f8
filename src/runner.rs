use crate::config::Config;
use crate::error::BenchError;
use crate::executor::{ Executor, HttpExecutor };
use crate::report::Report;
use crate::strategy::controller_for;

use std::net::ToSocketAddrs;
use std::sync::Arc;
use tokio::{ runtime::{ Builder, Runtime }, sync::watch, time::Instant };
use tracing::{ debug, info };

/// Lifecycle of a run. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Work is being created and handed out
    Dispatching,
    /// Everything is handed out, waiting for outstanding requests
    Draining,
    /// All outcomes are in, statistics are final
    Reporting,
}

/// Publishes the current phase of a run
#[derive(Debug)]
pub struct PhaseTracker {
    tx: watch::Sender<Phase>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Phase::Dispatching);
        Self { tx }
    }

    #[cfg(test)]
    pub fn current(&self) -> Phase {
        *self.tx.borrow()
    }

    /// Receiver that sees every later transition
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.tx.subscribe()
    }

    /// Move to `next`; moving backwards or staying put is ignored
    pub fn advance(&self, next: Phase) {
        self.tx.send_if_modified(|phase| {
            if next > *phase {
                debug!(from = ?*phase, to = ?next, "phase transition");
                *phase = next;
                true
            } else {
                false
            }
        });
    }
}

/// Benchmark driver for one configured target
pub struct Runner {
    config: Config,
    executor: Arc<dyn Executor>, // shared by every worker of the run
}

impl Runner {
    /*------------------==| Public Functions |==-------------------------*/
    /// Create a new Runner with an HTTP executor for the configured target
    pub fn new(config: Config) -> Result<Self, BenchError> {
        let executor = HttpExecutor::new(&config)?;
        Ok(Self::with_executor(config, Arc::new(executor)))
    }

    pub fn with_executor(config: Config, executor: Arc<dyn Executor>) -> Self {
        Self { config, executor }
    }

    /// Main entry point: resolve the target, drive every request, build the report
    pub fn run(self) -> Result<Report, BenchError> {
        self.resolve_target()?;
        self.print_banner();

        let runtime = Self::build_runtime(self.config.threads)?;
        let phase = PhaseTracker::new();
        runtime.block_on(async {
            let progress = tokio::spawn(Self::print_progress(phase.subscribe(), self.config.requests));
            let result = run_benchmark(&self.config, self.executor.clone(), &phase).await;
            progress.abort();
            result
        })
    }

    /*-------------------==| Private/Helpers |==----------------------- */

    /// Check that the target host resolves before sending anything
    fn resolve_target(&self) -> Result<(), BenchError> {
        let unresolvable = || BenchError::Unresolvable(self.config.url.to_string());

        let mut addrs = (self.config.host(), self.config.port())
            .to_socket_addrs()
            .map_err(|_| unresolvable())?;
        let addr = addrs.next().ok_or_else(unresolvable)?;

        debug!(%addr, "target resolved");
        Ok(())
    }

    fn print_banner(&self) {
        println!("[+] Starting benchmark");
        println!("[i] URL: {}", self.config.url);
        println!(
            "[i] Requests: {}  Concurrency: {}  Strategy: {}  KeepAlive: {}  Redirects: {}",
            self.config.requests,
            self.config.concurrency,
            self.config.strategy,
            self.config.keep_alive,
            self.config.max_redirects
        );
        println!("[i] Using {} thread(s)\nPlease be patient..", self.config.threads);
    }

    /// Print a line once every request has been handed out
    async fn print_progress(mut phases: watch::Receiver<Phase>, requests: usize) {
        while phases.changed().await.is_ok() {
            match *phases.borrow_and_update() {
                Phase::Draining => {
                    println!("Dispatched {} request(s), waiting for outstanding responses..", requests);
                }
                Phase::Reporting => {
                    return;
                }
                Phase::Dispatching => {}
            }
        }
    }

    /// Helper function to create the tokio runtime
    fn build_runtime(threads: usize) -> Result<Runtime, BenchError> {
        Builder::new_multi_thread()
            .worker_threads(threads)
            .enable_all()
            .build()
            .map_err(BenchError::Runtime)
    }
}

/// Drive one run through the configured strategy and report on it.
///
/// There is no way to abort a run once it has started: it always issues
/// exactly `config.requests` requests.
pub async fn run_benchmark(
    config: &Config,
    executor: Arc<dyn Executor>,
    phase: &PhaseTracker
) -> Result<Report, BenchError> {
    info!(
        url = %config.url,
        requests = config.requests,
        concurrency = config.concurrency,
        strategy = %config.strategy,
        "benchmark starting"
    );

    let controller = controller_for(config.strategy);
    let start = Instant::now();
    let stats = controller.run(config, executor, phase).await?;
    phase.advance(Phase::Reporting);
    let elapsed = start.elapsed();

    if stats.requests_issued != config.requests {
        return Err(
            BenchError::Aggregation(
                format!(
                    "{} outcomes recorded for {} requests",
                    stats.requests_issued,
                    config.requests
                )
            )
        );
    }

    info!(
        issued = stats.requests_issued,
        succeeded = stats.requests_succeeded,
        elapsed_ms = elapsed.as_millis() as u64,
        "benchmark done"
    );
    Ok(Report::new(config, stats, elapsed))
}
