use std::fmt::Display;
use std::io::{ self, Write };
use std::time::Duration;

use crate::aggregator::AggregateStats;
use crate::config::{ Config, Strategy };

const FIELD_WIDTH: usize = 24; //  width of each field for formatting print

/// Final figures of a run, built once all outcomes are in
#[derive(Debug, Clone)]
pub struct Report {
    pub host: String, // hostname of the server
    pub port: u16, // port of the server
    pub strategy: Strategy,
    pub requests: usize, // requests the run was configured for (N)
    pub concurrency: usize, // concurrency level (C)
    pub summarize: bool,

    pub stats: AggregateStats,
    pub duration: Duration, // total duration of the test
}

impl Report {
    pub fn new(config: &Config, stats: AggregateStats, duration: Duration) -> Self {
        Report {
            host: config.host().to_string(),
            port: config.port(),
            strategy: config.strategy,
            requests: config.requests,
            concurrency: config.concurrency,
            summarize: config.summarize,
            stats,
            duration,
        }
    }

    /// Share of the N requests that did not succeed, in percent
    pub fn error_rate(&self) -> f64 {
        let failed = self.requests.saturating_sub(self.stats.requests_succeeded);
        ((failed as f64) * 100.0) / (self.requests as f64)
    }

    /// Requests per second over the whole run
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 { (self.requests as f64) / secs } else { 0.0 }
    }

    /// Mean latency of successful requests in ms, 0 when nothing succeeded
    pub fn average_latency_ms(&self) -> f64 {
        self.stats.average_latency_micros().map_or(0.0, micros_to_ms)
    }

    pub fn min_latency_ms(&self) -> f64 {
        self.stats.min_latency_micros.map_or(0.0, |v| micros_to_ms(v as f64))
    }

    pub fn max_latency_ms(&self) -> f64 {
        self.stats.max_latency_micros.map_or(0.0, |v| micros_to_ms(v as f64))
    }

    /// Print the report to stdout, full or summarized
    pub fn print(&self) -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        writeln!(out)?;
        if self.summarize { self.write_summary(&mut out) } else { self.write_full(&mut out) }
    }

    /// Compact report, one line per figure
    pub fn write_summary<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "[+] Benchmark done")?;
        writeln!(
            out,
            "[*] Requests: {} / {}   Error: {:.2}%",
            self.stats.requests_succeeded,
            self.requests,
            self.error_rate()
        )?;
        writeln!(out, "[*] TPS: {:.3} reqs/second", self.throughput())?;
        writeln!(out, "[*] Time: {:.6} seconds", self.duration.as_secs_f64())?;
        writeln!(
            out,
            "[*] Average latency: {:.6} ms   Min latency: {:.6} ms   Max latency: {:.6} ms",
            self.average_latency_ms(),
            self.min_latency_ms(),
            self.max_latency_ms()
        )
    }

    /// Full report with aligned fields
    pub fn write_full<W: Write>(&self, out: &mut W) -> io::Result<()> {
        // Report Details
        write_field(out, "Hostname:", &self.host)?;
        write_field(out, "Port:", self.port)?;
        write_field(out, "Strategy:", self.strategy)?;
        write_field(out, "Concurrency Level:", self.concurrency)?;
        writeln!(out)?;

        write_field(out, "Issued Requests:", self.stats.requests_issued)?;
        write_field(out, "Succeeded Requests:", self.stats.requests_succeeded)?;
        if self.stats.failed_requests() > 0 {
            write_field(
                out,
                "Failed Requests:",
                format!("{} (including timeouts)", self.stats.failed_requests())
            )?;
        }
        if self.stats.timeouts > 0 {
            write_field(out, "Timeouts:", self.stats.timeouts)?;
        }
        if self.stats.redirect_failures > 0 {
            write_field(out, "Too Many Redirects:", self.stats.redirect_failures)?;
        }
        write_field(out, "Error Rate:", format!("{:.2}%", self.error_rate()))?;
        write_field(out, "Requests/sec:", format!("{:.2}", self.throughput()))?;
        write_field(out, "Total Time Taken:", format!("{:.6}s", self.duration.as_secs_f64()))?;
        writeln!(out)?;

        // Request Timings
        writeln!(out, "Time Taken for Requests:")?;
        writeln!(out, " {:<12} {:<12} {:<12}", "Min (ms)", "Avg (ms)", "Max (ms)")?;
        writeln!(
            out,
            " {:<12.3} {:<12.3} {:<12.3}",
            self.min_latency_ms(),
            self.average_latency_ms(),
            self.max_latency_ms()
        )
    }
}

fn write_field<W: Write>(out: &mut W, name: &str, value: impl Display) -> io::Result<()> {
    writeln!(out, "{:<field_width$}{}", name, value, field_width = FIELD_WIDTH)
}

fn micros_to_ms(micros: f64) -> f64 {
    micros / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureCause;
    use crate::executor::Outcome;

    fn report(requests: usize, outcomes: Vec<Outcome>, duration: Duration) -> Report {
        let config = Config::new("http://127.0.0.1:8080/greet", requests, 2).unwrap();
        let mut stats = AggregateStats::default();
        for outcome in outcomes {
            stats.record(outcome);
        }
        Report::new(&config, stats, duration)
    }

    fn render(report: &Report, summarize: bool) -> String {
        let mut out = Vec::new();
        if summarize {
            report.write_summary(&mut out).unwrap();
        } else {
            report.write_full(&mut out).unwrap();
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn derived_statistics() {
        let report = report(
            4,
            vec![
                Outcome::success(2_000),
                Outcome::success(4_000),
                Outcome::success(6_000),
                Outcome::failure(FailureCause::Timeout)
            ],
            Duration::from_secs(2)
        );

        assert_eq!(report.error_rate(), 25.0);
        assert_eq!(report.throughput(), 2.0);
        assert_eq!(report.average_latency_ms(), 4.0);
        assert_eq!(report.min_latency_ms(), 2.0);
        assert_eq!(report.max_latency_ms(), 6.0);
    }

    #[test]
    fn no_successes_means_zero_average() {
        let failures = (0..10)
            .map(|_| Outcome::failure(FailureCause::Transport("connection refused".into())))
            .collect();
        let report = report(10, failures, Duration::from_millis(50));

        assert_eq!(report.error_rate(), 100.0);
        assert_eq!(report.average_latency_ms(), 0.0);
        assert_eq!(report.min_latency_ms(), 0.0);
        assert_eq!(report.max_latency_ms(), 0.0);
        assert!(render(&report, false).contains("Failed Requests:"));
        assert!(render(&report, true).contains("Requests: 0 / 10"));
    }

    #[test]
    fn zero_elapsed_time_has_zero_throughput() {
        let report = report(1, vec![Outcome::success(0)], Duration::ZERO);
        assert_eq!(report.throughput(), 0.0);
    }

    #[test]
    fn full_report_lists_failure_causes() {
        let report = report(
            3,
            vec![
                Outcome::success(1_500),
                Outcome::failure(FailureCause::Timeout),
                Outcome::failure(FailureCause::TooManyRedirects)
            ],
            Duration::from_secs(1)
        );
        let text = render(&report, false);

        assert!(text.contains(&format!("{:<24}127.0.0.1", "Hostname:")));
        assert!(text.contains("Timeouts:"));
        assert!(text.contains("Too Many Redirects:"));
        assert!(text.contains("66.67%"));
        assert!(text.contains("1.500"));
    }

    #[test]
    fn summary_matches_compact_layout() {
        let report = report(2, vec![Outcome::success(1_000), Outcome::success(3_000)], Duration::from_secs(1));
        let text = render(&report, true);

        assert!(text.contains("[*] Requests: 2 / 2   Error: 0.00%"));
        assert!(text.contains("[*] TPS: 2.000 reqs/second"));
        assert!(text.contains("Average latency: 2.000000 ms"));
    }
}
