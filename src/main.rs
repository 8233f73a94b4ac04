//! nf-genomeassembler - platform task entry points

use anyhow::Context;
use std::path::Path;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use nf_genomeassembler::cli::{Cli, Commands};
use nf_genomeassembler::driver::{self, Driver, LogUpload, RunOutcome};
use nf_genomeassembler::platform::LatchPlatform;
use nf_genomeassembler::{RuntimeConfig, process_guard, schema};

/// Initialize logging; `RUST_LOG` overrides the default `info` level
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    init_tracing();

    let cli = Cli::parse_args();
    debug!("CLI arguments parsed: {:?}", cli.command);

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Commands::Schema => {
            schema::check()?;
            println!("{}", schema::to_json()?);
            Ok(0)
        }
        Commands::Initialize => {
            let config = load_config(cli.config.as_deref())?;
            if cli.dry_run {
                println!("would provision {} GiB at {}", config.storage_gib, config.provision_url);
                return Ok(0);
            }
            let platform = LatchPlatform::from_config(&config);
            let storage_handle = driver::initialize(&config, &platform)?;
            println!("{}", storage_handle);
            Ok(0)
        }
        Commands::Run { storage, params } => {
            let config = load_config(cli.config.as_deref())?;
            let params = params.resolve()?;
            let platform = LatchPlatform::from_config(&config);
            let driver = Driver::new(&config, &platform);
            if cli.dry_run {
                println!("{}", driver.command(&storage, &params));
                return Ok(0);
            }
            Ok(report(driver.run(&storage, &params)))
        }
        Commands::Workflow { params } => {
            let config = load_config(cli.config.as_deref())?;
            let params = params.resolve()?;
            let platform = LatchPlatform::from_config(&config);
            let driver = Driver::new(&config, &platform);
            if cli.dry_run {
                println!("{}", driver.command("<storage>", &params));
                return Ok(0);
            }
            match driver.run_workflow(&params) {
                Ok(outcome) => Ok(report(outcome)),
                Err(e) => {
                    error!("{}", e);
                    Ok(e.exit_code())
                }
            }
        }
    }
}

/// Load and validate the runtime configuration, then install the signal
/// handlers that stop the runner on termination.
fn load_config(path: Option<&Path>) -> anyhow::Result<RuntimeConfig> {
    let config = RuntimeConfig::load(path)?;
    config.validate().context("Invalid runtime configuration")?;

    // The signal thread stops the runner; the driver still uploads its log
    if let Err(e) = process_guard::init_signal_handlers(config.termination_grace()) {
        warn!("Failed to initialize signal handlers: {}", e);
    }
    Ok(config)
}

/// Log the run outcome and pick the exit code. The execution result decides
/// the code; a lost log is reported separately.
fn report(outcome: RunOutcome) -> i32 {
    let stages: Vec<String> = outcome.stages.iter().map(|s| s.to_string()).collect();
    debug!("Stages: {}", stages.join(" -> "));

    match &outcome.log_upload {
        LogUpload::Uploaded { remote } => info!("Runner log available at {}", remote),
        LogUpload::NoLogFile => info!("Runner produced no log file"),
        LogUpload::SkippedNoExecutionName => warn!("Runner log was not uploaded"),
        LogUpload::Failed(reason) => {
            let state = if outcome.succeeded() { "succeeded" } else { "failed" };
            warn!("Pipeline {} but its log was lost: {}", state, reason);
        }
    }

    match outcome.into_result() {
        Ok(()) => {
            info!("Pipeline completed successfully");
            0
        }
        Err(e) => e.exit_code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_schema_needs_no_config() {
        let cli = Cli::try_parse_from([
            "nf-genomeassembler",
            "--config",
            "/nonexistent/config.json",
            "schema",
        ])
        .unwrap();
        assert_eq!(run(cli).unwrap(), 0);
    }

    #[test]
    fn test_missing_config_file_fails_other_commands() {
        let cli = Cli::try_parse_from([
            "nf-genomeassembler",
            "--config",
            "/nonexistent/config.json",
            "--dry-run",
            "initialize",
        ])
        .unwrap();
        assert!(run(cli).is_err());
    }
}
