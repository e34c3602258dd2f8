use std::time::Instant;

use async_trait::async_trait;
use isahc::{
    config::{ Configurable, RedirectPolicy },
    error::ErrorKind,
    http::header::CONNECTION,
    AsyncReadResponseExt,
    HttpClient,
    Request,
};
use tracing::debug;

use crate::config::Config;
use crate::error::{ BenchError, FailureCause };

/// Result of exactly one dispatched request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success {
        latency_micros: u64,
    },
    Failure {
        cause: FailureCause,
    },
}

impl Outcome {
    pub fn success(latency_micros: u64) -> Self {
        Outcome::Success { latency_micros }
    }

    pub fn failure(cause: FailureCause) -> Self {
        Outcome::Failure { cause }
    }
}

/// Performs a single request against the configured target.
///
/// Implementations must be safe to share between all workers of a run and
/// must not touch any shared statistics: the outcome is handed back to the
/// caller, which decides how it gets aggregated.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self) -> Outcome;
}

/// Executor backed by a shared isahc client
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: HttpClient,
    url: String,
    keep_alive: bool,
    follows_redirects: bool,
}

impl HttpExecutor {
    /// Build the client once for the whole run
    pub fn new(config: &Config) -> Result<Self, BenchError> {
        let redirect_policy = if config.max_redirects > 0 {
            RedirectPolicy::Limit(config.max_redirects)
        } else {
            RedirectPolicy::None
        };

        let client = HttpClient::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connection_timeout)
            .redirect_policy(redirect_policy)
            .build()?;

        Ok(Self {
            client,
            url: config.url.to_string(),
            keep_alive: config.keep_alive,
            follows_redirects: config.max_redirects > 0,
        })
    }

    fn connection_header(&self) -> &'static str {
        if self.keep_alive { "keep-alive" } else { "close" }
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(&self) -> Outcome {
        let request = match
            Request::get(self.url.as_str()).header(CONNECTION, self.connection_header()).body(())
        {
            Ok(request) => request,
            Err(err) => {
                return Outcome::failure(FailureCause::Transport(err.to_string()));
            }
        };

        let start = Instant::now();
        let response = self.client.send_async(request).await;

        match response {
            Ok(mut res) => {
                // read the whole body, the measured time covers it
                if let Err(err) = res.consume().await {
                    debug!(error = %err, "failed to drain response body");
                }
                let latency = start.elapsed();

                // with no redirect budget the first redirect already exceeds it
                if !self.follows_redirects && res.status().is_redirection() {
                    debug!(status = %res.status(), "redirect with a zero redirect budget");
                    return Outcome::failure(FailureCause::TooManyRedirects);
                }
                Outcome::success(latency.as_micros() as u64)
            }
            Err(err) => {
                let cause = classify(&err);
                debug!(error = %err, cause = %cause, "request failed");
                Outcome::failure(cause)
            }
        }
    }
}

fn classify(err: &isahc::Error) -> FailureCause {
    match err.kind() {
        ErrorKind::Timeout => FailureCause::Timeout,
        ErrorKind::TooManyRedirects => FailureCause::TooManyRedirects,
        _ => FailureCause::Transport(err.to_string()),
    }
}
