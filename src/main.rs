mod aggregator;
mod config;
mod error;
mod executor;
mod report;
mod runner;
mod strategy;

use clap::Parser;
use tracing_subscriber::{ layer::SubscriberExt, util::SubscriberInitExt, EnvFilter };

use config::Args;
use error::BenchError;
use runner::Runner;

fn main() {
    tracing_subscriber
        ::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "benchpool=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = Args::parse()
        .into_config()
        .map_err(BenchError::from)
        .and_then(Runner::new)
        .and_then(Runner::run);

    match result {
        Ok(report) => {
            if let Err(err) = report.print() {
                eprintln!("Failed to print report: {}", err);
                std::process::exit(1);
            }
        }
        Err(BenchError::Config(err)) => {
            eprintln!("{}\nUse --help for more info", err);
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    }
}
