use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry};

use crate::commands::CreateCommands;
use crate::provider::aws::AwsBootstrap;

pub mod commands;
pub mod error;
pub mod filter;
pub mod gate;
pub mod irsa;
pub mod loader;
pub mod models;
pub mod orchestrator;
pub mod provider;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};

/// Create IAM roles for Kubernetes service accounts on EKS
#[derive(Parser, Debug)]
#[command(name = "irsactl", version, about)]
pub struct Cli {
    /// Log level, 0 is silent, 4 is debug and 5 is trace
    #[arg(long, short = 'v', global = true, default_value_t = 3, value_parser = clap::value_parser!(u8).range(0..=5))]
    pub verbose: u8,

    /// Format of log lines
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create resource(s)
    #[command(subcommand)]
    Create(CreateCommands),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl Cli {
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        match self.command {
            Commands::Create(CreateCommands::IamServiceAccount(args)) => {
                let bootstrap = AwsBootstrap::default();
                let report = commands::create::iam_service_account(args, &bootstrap, cancel).await?;
                info!(
                    "{} iamserviceaccount(s) handled, {} skipped ({})",
                    report.targets.len(),
                    report.skipped.len(),
                    report.mode
                );
                Ok(())
            }
        }
    }
}

fn level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::OFF,
        1 => LevelFilter::ERROR,
        2 => LevelFilter::WARN,
        3 => LevelFilter::INFO,
        4 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over `verbosity`.
pub fn init_logging(verbosity: u8, format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level(verbosity).into()));
    let registry = Registry::default().with(env_filter);
    match format {
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}
