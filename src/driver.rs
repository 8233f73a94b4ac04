//! Workflow run lifecycle.
//!
//! # Stage Flow
//!
//! ```text
//! Provisioning ──error──> (abort, nothing else runs)
//!     ↓
//! Staging ─────┐
//!     ↓        │ error
//! Executing ───┤
//!     ↓        │
//! LogUpload <──┘   (always entered once Staging has begun)
//!     ↓
//! Done | Failed
//! ```
//!
//! The log upload is tied to a scope guard around staging and execution, so
//! it also runs if that region unwinds. Upload problems are reported in
//! [`RunOutcome::log_upload`] and never replace the execution result.

use strum::Display;
use tracing::{debug, error, info, warn};

use crate::config::{LOG_FILE_NAME, RuntimeConfig, TOKEN_ENV};
use crate::error::{Result, WorkflowError};
use crate::params::ResolvedParameters;
use crate::platform::Platform;
use crate::runner::{self, RunnerCommand};
use crate::staging;

/// Stages of one workflow run, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum RunStage {
    Provisioning,
    Staging,
    Executing,
    LogUpload,
    Done,
    /// Terminal state after a fatal error
    Failed,
}

impl RunStage {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// What happened to the runner log after a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogUpload {
    Uploaded { remote: String },
    /// The runner never wrote a log
    NoLogFile,
    /// The execution has no resolvable display name
    SkippedNoExecutionName,
    /// The upload was attempted and failed; the run result is unaffected
    Failed(String),
}

/// Result of [`Driver::run`]
#[derive(Debug)]
pub struct RunOutcome {
    /// Primary result of the run
    pub execution: Result<()>,
    pub log_upload: LogUpload,
    /// Stages entered, in order, ending in a terminal stage
    pub stages: Vec<RunStage>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.execution.is_ok()
    }

    /// The execution result, discarding the upload outcome
    pub fn into_result(self) -> Result<()> {
        self.execution
    }
}

/// Provision the shared storage volume for this execution.
///
/// Fails without contacting the platform when no execution token is set.
pub fn initialize(config: &RuntimeConfig, platform: &dyn Platform) -> Result<String> {
    let token = config
        .execution_token
        .as_deref()
        .ok_or_else(|| WorkflowError::MissingToken(TOKEN_ENV.to_string()))?;
    platform.provision_storage(token, config.storage_gib)
}

/// Runs the pipeline for one execution against an injected configuration
/// and platform.
pub struct Driver<'a> {
    config: &'a RuntimeConfig,
    platform: &'a dyn Platform,
}

impl<'a> Driver<'a> {
    pub fn new(config: &'a RuntimeConfig, platform: &'a dyn Platform) -> Self {
        Self { config, platform }
    }

    /// Runner invocation for the given storage handle and parameters
    pub fn command(&self, storage_handle: &str, params: &ResolvedParameters) -> RunnerCommand {
        RunnerCommand::new(self.config, storage_handle, params)
    }

    /// Provision storage, then run the pipeline.
    ///
    /// # Errors
    ///
    /// Returns the provisioning error directly; in that case no staging,
    /// execution or upload has happened.
    pub fn run_workflow(&self, params: &ResolvedParameters) -> Result<RunOutcome> {
        let storage_handle = initialize(self.config, self.platform)?;
        let mut outcome = self.run(&storage_handle, params);
        outcome.stages.insert(0, RunStage::Provisioning);
        Ok(outcome)
    }

    /// Stage the working directory, run the pipeline and upload its log.
    pub fn run(&self, storage_handle: &str, params: &ResolvedParameters) -> RunOutcome {
        let mut stages = vec![RunStage::Staging];

        let guard = LogUploadGuard::new(self);
        let execution = self.stage().and_then(|()| {
            stages.push(RunStage::Executing);
            runner::run_runner(&self.command(storage_handle, params))
        });

        stages.push(RunStage::LogUpload);
        let log_upload = guard.finish();

        match &execution {
            Ok(()) => stages.push(RunStage::Done),
            Err(e) => {
                error!("Pipeline run failed: {}", e);
                stages.push(RunStage::Failed);
            }
        }

        RunOutcome {
            execution,
            log_upload,
            stages,
        }
    }

    fn stage(&self) -> Result<()> {
        staging::stage_directory(
            &self.config.task_root,
            &self.config.shared_dir,
            &self.config.ignore_list,
        )
        .map(|_| ())
    }

    /// Upload the runner log if there is one. Never fails.
    pub fn upload_log(&self) -> LogUpload {
        let log = self.config.log_path();
        if !log.exists() {
            debug!("No {} at {}, nothing to upload", LOG_FILE_NAME, log.display());
            return LogUpload::NoLogFile;
        }

        let Some(token) = self.config.execution_token.as_deref() else {
            info!("Skipping logs upload, no execution token to resolve the execution name");
            return LogUpload::SkippedNoExecutionName;
        };

        let name = match self.platform.execution_name(token) {
            Ok(name) => name,
            Err(e) => {
                warn!("Failed to resolve execution name: {}", e);
                None
            }
        };
        let Some(name) = name else {
            info!("Skipping logs upload, failed to get execution name");
            return LogUpload::SkippedNoExecutionName;
        };

        let remote = self.config.remote_log_path(&name);
        info!("Uploading {} to {}", LOG_FILE_NAME, remote);
        match self.platform.upload(token, &log, &remote) {
            Ok(()) => LogUpload::Uploaded { remote },
            Err(e) => {
                error!("Log upload to {} failed: {}", remote, e);
                LogUpload::Failed(e.to_string())
            }
        }
    }
}

/// Uploads the runner log when the guarded region ends, including by unwinding
struct LogUploadGuard<'d, 'a> {
    driver: &'d Driver<'a>,
    finished: bool,
}

impl<'d, 'a> LogUploadGuard<'d, 'a> {
    fn new(driver: &'d Driver<'a>) -> Self {
        Self {
            driver,
            finished: false,
        }
    }

    fn finish(mut self) -> LogUpload {
        self.finished = true;
        self.driver.upload_log()
    }
}

impl Drop for LogUploadGuard<'_, '_> {
    fn drop(&mut self) {
        if !self.finished {
            let outcome = self.driver.upload_log();
            warn!("Run aborted abnormally; log upload outcome: {:?}", outcome);
        }
    }
}
