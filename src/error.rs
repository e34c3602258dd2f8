use thiserror::Error;

/// Rejected command line or programmatic configuration.
///
/// Always reported before any request is sent.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid number of requests, must be at least 1")]
    ZeroRequests,

    #[error("Invalid number of concurrent requests, must be at least 1")]
    ZeroConcurrency,

    #[error("Invalid number of threads, must be at least 1")]
    ZeroThreads,

    #[error("Invalid duration \"{0}\" (use e.g. 10s, 1m, 1h)")]
    InvalidDuration(String),
}

/// Errors that end a benchmark run before a report can be produced.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] isahc::Error),

    #[error("Failed to resolve {0}")]
    Unresolvable(String),

    #[error("Failed to create tokio runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("Failed to dispatch request: {0}")]
    Dispatch(String),

    #[error("Benchmark task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Aggregation failed: {0}")]
    Aggregation(String),
}

/// Why a single request did not produce a response.
///
/// Carried inside a failed outcome and folded into the statistics; it never
/// aborts a run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FailureCause {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("too many redirects")]
    TooManyRedirects,
}
