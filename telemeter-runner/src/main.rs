//! Telemeter Runner
//!
//! Wraps a pipeline step and reports its outcome to a Splunk-style HTTP
//! event collector.
//!
//! Architecture:
//! - Configuration: command-line flags with environment variable fallbacks
//! - Services: payload shaping, batching, log collection, secret masking
//! - Step: runs the wrapped command and finalizes its telemetry exactly once
//!
//! Every `tracing` event is both printed (secrets masked) and collected in
//! memory. When a step fails and log shipping is enabled, the collected
//! lines travel to the collector together with the step telemetry.

mod command;
mod config;
mod error;
mod logging;
mod service;
mod step;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use telemeter_core::domain::telemetry::{ErrorCategory, PipelineTelemetry};
use tracing::{error, info, warn};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::Config;
use crate::service::{Delivery, InMemoryLogCollector, PipelineEnvironment, SecretRegistry};
use crate::step::{StepReporter, run_step};

#[derive(Parser)]
#[command(name = "telemeter")]
#[command(about = "Pipeline step telemetry and log shipping", long_about = None)]
struct Cli {
    #[command(flatten)]
    collector: CollectorArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Collector connection settings shared by all commands
#[derive(Args)]
struct CollectorArgs {
    /// Collector URL; telemetry is not sent when unset
    #[arg(long, env = "TELEMETER_COLLECTOR_URL")]
    collector_url: Option<String>,

    /// Collector token, "Splunk " is prepended when missing
    #[arg(long, env = "TELEMETER_COLLECTOR_TOKEN", default_value = "", hide_env_values = true)]
    collector_token: String,

    /// Collector index
    #[arg(long, env = "TELEMETER_COLLECTOR_INDEX", default_value = "")]
    collector_index: String,

    /// Ship the full log output of failed steps
    #[arg(long, env = "TELEMETER_SEND_LOGS")]
    send_logs: bool,

    /// Correlation id of this pipeline run (random when unset)
    #[arg(long, env = "TELEMETER_CORRELATION_ID")]
    correlation_id: Option<String>,

    /// Maximum number of log lines per request
    #[arg(long, env = "TELEMETER_BATCH_SIZE", default_value_t = 20_000)]
    batch_size: usize,

    /// Request timeout in seconds
    #[arg(long, env = "TELEMETER_REQUEST_TIMEOUT", default_value_t = 5)]
    request_timeout: u64,

    /// Additional attempts after a failed request
    #[arg(long, env = "TELEMETER_RETRIES", default_value_t = 0)]
    retries: u32,

    /// Accept any certificate presented by the collector
    #[arg(long, env = "TELEMETER_SKIP_TLS_VERIFICATION")]
    skip_tls_verification: bool,

    /// Directory holding the pipeline environment files
    #[arg(long, env = "TELEMETER_PIPELINE_ENV_DIR")]
    pipeline_env_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command as a pipeline step and report its outcome
    Run {
        /// Step name reported in the telemetry
        #[arg(long)]
        step_name: String,

        /// Stage the step belongs to
        #[arg(long, default_value = "")]
        stage_name: String,

        #[arg(long, env = "TELEMETER_PIPELINE_URL_HASH", default_value = "")]
        pipeline_url_hash: String,

        #[arg(long, env = "TELEMETER_BUILD_URL_HASH", default_value = "")]
        build_url_hash: String,

        /// Command to run, after `--`
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Report the status of a whole pipeline run
    PipelineStatus {
        /// File holding the raw pipeline log
        #[arg(long)]
        log_file: PathBuf,

        /// Final pipeline status (e.g., SUCCESS, FAILURE)
        #[arg(long)]
        status: String,

        /// Pipeline duration in milliseconds
        #[arg(long, default_value_t = 0)]
        duration_ms: u64,

        /// Pipeline start time (RFC 3339)
        #[arg(long)]
        start_time: Option<chrono::DateTime<chrono::Utc>>,

        #[arg(long, default_value = "")]
        error_category: String,

        #[arg(long, default_value = "")]
        orchestrator: String,

        #[arg(long, env = "TELEMETER_PIPELINE_URL_HASH", default_value = "")]
        pipeline_url_hash: String,

        #[arg(long, env = "TELEMETER_BUILD_URL_HASH", default_value = "")]
        build_url_hash: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let secrets = SecretRegistry::new();
    let collector = InMemoryLogCollector::new();

    // Initialize logging
    logging::subscriber(
        std::io::stderr,
        logging::console_filter(),
        collector.clone(),
        secrets.clone(),
    )
    .init();

    let config = load_config(cli.collector);
    let delivery = init_delivery(&config, &secrets);

    match cli.command {
        Commands::Run {
            step_name,
            stage_name,
            pipeline_url_hash,
            build_url_hash,
            command,
        } => {
            let reporter = StepReporter::new(step_name, delivery, Arc::new(collector))
                .with_stage_name(stage_name)
                .with_pipeline_url_hash(pipeline_url_hash)
                .with_build_url_hash(build_url_hash);

            let telemetry = run_step(reporter, async move {
                let (program, args) = command
                    .split_first()
                    .context("No command given to run")?;
                command::run_command(program, args).await
            })
            .await;

            Ok(if telemetry.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::PipelineStatus {
            log_file,
            status,
            duration_ms,
            start_time,
            error_category,
            orchestrator,
            pipeline_url_hash,
            build_url_hash,
        } => {
            let Some(delivery) = delivery else {
                warn!("Telemetry delivery not configured, pipeline status not sent");
                return Ok(ExitCode::SUCCESS);
            };

            if !error_category.is_empty() {
                error_category
                    .parse::<ErrorCategory>()
                    .map_err(anyhow::Error::msg)?;
            }

            let telemetry = PipelineTelemetry {
                pipeline_url_hash,
                build_url_hash,
                orchestrator,
                start_time,
                duration_ms,
                status,
                error_category: error_category.to_ascii_lowercase(),
            };

            let raw_log = tokio::fs::read(&log_file)
                .await
                .with_context(|| format!("Failed to read log file {}", log_file.display()))?;

            match delivery.send_pipeline_status(&telemetry, &raw_log).await {
                Ok(()) => {
                    info!("Pipeline status {} sent", telemetry.status);
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    error!("Failed to send pipeline status: {}", e);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

/// Builds the configuration from parsed flags
fn load_config(args: CollectorArgs) -> Config {
    let mut config = Config::new(args.collector_url, args.collector_token);
    config.collector_index = args.collector_index;
    config.send_logs = args.send_logs;
    if let Some(correlation_id) = args.correlation_id {
        config.correlation_id = correlation_id;
    }
    config.batch_size = args.batch_size;
    config.request_timeout = Duration::from_secs(args.request_timeout);
    config.retries = args.retries;
    config.skip_tls_verification = args.skip_tls_verification;
    if let Some(dir) = args.pipeline_env_dir {
        config.pipeline_env_dir = dir;
    }
    config
}

/// Sets up delivery, or returns `None` when it is disabled or misconfigured
///
/// A broken collector configuration never stops the step from running.
fn init_delivery(config: &Config, secrets: &SecretRegistry) -> Option<Delivery> {
    if let Err(e) = config.validate() {
        warn!("Invalid collector configuration, telemetry disabled: {:#}", e);
        return None;
    }

    let target = match config.delivery_target() {
        Ok(Some(target)) => target,
        Ok(None) => {
            info!("No collector URL configured, telemetry disabled");
            return None;
        }
        Err(e) => {
            warn!("Invalid collector configuration, telemetry disabled: {:#}", e);
            return None;
        }
    };

    let ambient = Arc::new(PipelineEnvironment::new(config.pipeline_env_dir.clone()));
    match Delivery::initialize(target, secrets, ambient) {
        Ok(delivery) => Some(delivery),
        Err(e) => {
            warn!("Telemetry delivery disabled: {}", e);
            None
        }
    }
}
