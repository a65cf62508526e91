mod config;

use clap::Parser;
use config::{CommonConfig, Config, ConfigError};
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const METRICS_PREFIX: &str = "callback_relay";

#[derive(Parser)]
#[command(version, about = "Relays document editor saves to a backend")]
enum CliCommand {
    /// Run the relay service
    Run {
        /// Path to the YAML service config
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid Sentry DSN: {0}")]
    Sentry(String),
    #[error("could not install metrics exporter: {0}")]
    Metrics(String),
    #[error("could not start runtime: {0}")]
    Runtime(std::io::Error),
    #[error(transparent)]
    Relay(#[from] relay::errors::RelayError),
}

fn main() {
    let cli = CliCommand::parse();

    let result = match cli {
        CliCommand::Run { config } => run(config),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "callback relay exited with an error");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(config_path: PathBuf) -> Result<(), CliError> {
    let config = Config::from_file(&config_path)?;

    // Keep the guard alive so that buffered events are flushed on exit
    let _sentry = init_logging(&config.common)?;
    init_metrics(&config.common)?;

    tracing::info!(config = %config_path.display(), "Loaded configuration");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    runtime.block_on(relay::run(config.relay))?;
    Ok(())
}

fn init_logging(config: &CommonConfig) -> Result<Option<sentry::ClientInitGuard>, CliError> {
    let dsn = config
        .logging
        .as_ref()
        .map(|logging| logging.sentry_dsn.parse::<sentry::types::Dsn>())
        .transpose()
        .map_err(|e| CliError::Sentry(e.to_string()))?;

    let sentry_guard = dsn.map(|dsn| {
        sentry::init(sentry::ClientOptions {
            dsn: Some(dsn),
            release: sentry::release_name!(),
            ..Default::default()
        })
    });

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            sentry_guard
                .as_ref()
                .map(|_| sentry::integrations::tracing::layer()),
        )
        .init();

    Ok(sentry_guard)
}

fn init_metrics(config: &CommonConfig) -> Result<(), CliError> {
    let Some(metrics_config) = &config.metrics else {
        return Ok(());
    };

    let recorder = StatsdBuilder::from(&metrics_config.statsd_host, metrics_config.statsd_port)
        .build(Some(METRICS_PREFIX))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;

    shared::metrics_defs::describe_all(relay::metrics_defs::ALL_METRICS);
    tracing::info!(
        host = %metrics_config.statsd_host,
        port = metrics_config.statsd_port,
        "Metrics exporter installed"
    );
    Ok(())
}
