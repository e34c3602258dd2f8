use std::fmt;
use std::time::Duration;

use clap::{ Parser, ValueEnum };
use url::Url;

use crate::error::ConfigError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(25);
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(20);

/// How the request workload is scheduled onto the concurrency budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    /// One task per request, admitted through C semaphore permits
    Semaphore,
    /// C long-lived workers draining a job queue, results sent over a channel
    WorkerPool,
    /// C long-lived workers draining a job queue, results folded under a lock
    Mutex,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Semaphore => "semaphore",
            Strategy::WorkerPool => "worker-pool",
            Strategy::Mutex => "mutex",
        };
        f.write_str(name)
    }
}

// Command line arguments, validated into a Config
#[derive(Debug, Parser)]
#[command(version, about, after_help = "Durations can be specified like: 10s, 1m, 1h")]
pub struct Args {
    /// URL to benchmark, e.g. http://127.0.0.1:8080/greet
    #[arg(value_name = "URL", required_unless_present = "url_flag")]
    pub url: Option<String>,

    /// URL to benchmark (alternative to the positional argument)
    #[arg(short = 'u', long = "url", value_name = "URL", conflicts_with = "url")]
    pub url_flag: Option<String>,

    /// Number of requests
    #[arg(short = 'n', long, default_value_t = 1)]
    pub requests: usize,

    /// Concurrent requests
    #[arg(short = 'c', long, default_value_t = 1)]
    pub concurrency: usize,

    /// Follow up to this many redirects (0 disables redirect following)
    #[arg(short = 'r', long = "redirects", default_value_t = 0)]
    pub max_redirects: u32,

    /// Ask the server to keep connections alive between requests
    #[arg(short = 'k', long)]
    pub keep_alive: bool,

    /// Scheduling strategy
    #[arg(short = 's', long, value_enum, default_value_t = Strategy::Semaphore)]
    pub strategy: Strategy,

    /// Request timeout
    #[arg(short = 'T', long, value_parser = parse_duration_string, default_value = "25s")]
    pub timeout: Duration,

    /// Connection timeout
    #[arg(short = 'C', long, value_parser = parse_duration_string, default_value = "20s")]
    pub connection_timeout: Duration,

    /// Number of runtime threads (Default: number of CPUs)
    #[arg(short = 't', long, default_value_t = num_cpus::get())]
    pub threads: usize,

    /// Summarize output
    #[arg(long)]
    pub summarize: bool,
}

impl Args {
    /// Validate the parsed arguments into an immutable Config
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let url = self.url.or(self.url_flag).unwrap_or_default();
        Config::new(&url, self.requests, self.concurrency)?
            .with_max_redirects(self.max_redirects)
            .with_keep_alive(self.keep_alive)
            .with_strategy(self.strategy)
            .with_timeout(self.timeout)
            .with_connection_timeout(self.connection_timeout)
            .with_summarize(self.summarize)
            .with_threads(self.threads)
    }
}

/// Benchmark configuration, read-only once built
#[derive(Debug, Clone)]
pub struct Config {
    pub url: Url,
    pub requests: usize, // total requests N
    pub concurrency: usize, // requests in flight at most, C
    pub max_redirects: u32, // 0 means redirects are not followed
    pub keep_alive: bool,
    pub strategy: Strategy,

    pub timeout: Duration, // total time for request/response cycle including DNS resolution
    pub connection_timeout: Duration, // timeout for establishing connection to the host
    pub threads: usize,
    pub summarize: bool,
}

impl Config {
    /// Config with the given workload and the default knobs.
    ///
    /// Fails if `url` is not an absolute http(s) URL with a host, or if
    /// `requests` or `concurrency` is zero. `concurrency` may exceed `requests`.
    pub fn new(url: &str, requests: usize, concurrency: usize) -> Result<Self, ConfigError> {
        let url = parse_url(url)?;
        if requests == 0 {
            return Err(ConfigError::ZeroRequests);
        }
        if concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }

        Ok(Config {
            url,
            requests,
            concurrency,
            max_redirects: 0,
            keep_alive: false,
            strategy: Strategy::Semaphore,
            timeout: DEFAULT_TIMEOUT,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            threads: 1,
            summarize: false,
        })
    }

    pub fn with_max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connection_timeout(mut self, connection_timeout: Duration) -> Self {
        self.connection_timeout = connection_timeout;
        self
    }

    pub fn with_summarize(mut self, summarize: bool) -> Self {
        self.summarize = summarize;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Result<Self, ConfigError> {
        if threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        self.threads = threads;
        Ok(self)
    }

    /// Hostname of the target
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Port of the target, 80/443 if none specified
    pub fn port(&self) -> u16 {
        self.url.port_or_known_default().unwrap_or(80)
    }
}

fn parse_url(url: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let parsed = Url::parse(url).map_err(|e| invalid(&e.to_string()))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(invalid("scheme must be http or https"));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("URL does not have a valid hostname"));
    }
    Ok(parsed)
}

// Parses durations like 10s, 1m, 1h; a bare number means seconds
fn parse_duration_string(duration_str: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(duration_str.to_string());

    let (value_str, unit) = match duration_str.char_indices().last() {
        Some((idx, unit @ ('s' | 'm' | 'h'))) => (&duration_str[..idx], unit),
        Some(_) => (duration_str, 's'),
        None => {
            return Err(invalid());
        }
    };

    let value: u64 = value_str.parse().map_err(|_| invalid())?;
    let multiplier: u64 = match unit {
        'm' => 60,
        'h' => 60 * 60,
        _ => 1,
    };
    let duration = Duration::from_secs(value.checked_mul(multiplier).ok_or_else(invalid)?);

    if duration.is_zero() {
        return Err(invalid());
    }
    Ok(duration)
}
