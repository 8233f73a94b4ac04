//! Pipeline runner invocation.
//!
//! [`RunnerCommand`] is the complete, inspectable description of one
//! `nextflow run` call: program, argv, environment overlay and working
//! directory. [`run_runner`] is the only place the runner is spawned, so every
//! launch goes through process-group isolation and child registration.

use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use tracing::info;

use crate::config::RuntimeConfig;
use crate::error::{Result, WorkflowError};
use crate::params::ResolvedParameters;
use crate::process_guard::{self, ChildGuard, CommandProcessGroup};

/// One invocation of the pipeline runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Overlaid on the inherited environment
    pub env: Vec<(String, String)>,
    pub cwd: PathBuf,
}

impl RunnerCommand {
    /// Build the runner invocation for a staged directory.
    ///
    /// `[runner, run, <staged>/main.nf, -work-dir, <staged>, -profile, docker,
    /// -c, latch.config, ...parameter flags]`
    pub fn new(config: &RuntimeConfig, storage_handle: &str, params: &ResolvedParameters) -> Self {
        let mut args = vec![
            "run".to_string(),
            config.entry_path().display().to_string(),
            "-work-dir".to_string(),
            config.shared_dir.display().to_string(),
            "-profile".to_string(),
            config.profile.clone(),
            "-c".to_string(),
            config.runner_config.clone(),
        ];
        args.extend(params.to_cli_args());

        Self {
            program: config.runner_binary.clone(),
            args,
            env: config.to_env_vars(storage_handle),
            cwd: config.shared_dir.clone(),
        }
    }

    /// Program followed by its arguments
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        cmd
    }
}

impl fmt::Display for RunnerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv().join(" "))
    }
}

fn describe_status(status: ExitStatus) -> String {
    match (status.code(), status.signal()) {
        (Some(code), _) => format!("exit code {}", code),
        (None, Some(sig)) => format!("signal {}", sig),
        _ => "unknown status".to_string(),
    }
}

/// Run the pipeline runner to completion.
///
/// Output streams are inherited so the runner's progress reaches the task
/// log directly.
///
/// # Errors
///
/// - `Interrupted` if a termination signal arrived before or during the run
/// - `Execution` if the runner cannot be spawned or exits unsuccessfully
pub fn run_runner(command: &RunnerCommand) -> Result<()> {
    if let Some(sig) = process_guard::received_signal() {
        return Err(WorkflowError::Interrupted(sig));
    }

    info!("Launching Nextflow Runtime");
    info!("{}", command);
    info!("env overlay: {:?}", command.env);

    let mut child = command
        .to_command()
        .in_new_process_group()
        .spawn()
        .map_err(|e| {
            WorkflowError::execution(format!(
                "failed to spawn {}: {}",
                command.program.display(),
                e
            ))
        })?;
    let _registration = ChildGuard::register(child.id());

    let status = child.wait().map_err(|e| {
        WorkflowError::execution(format!("failed waiting for {}: {}", command.program.display(), e))
    })?;

    if status.success() {
        info!("Nextflow Runtime finished successfully");
        return Ok(());
    }
    if let Some(sig) = process_guard::received_signal() {
        return Err(WorkflowError::Interrupted(sig));
    }
    Err(WorkflowError::execution(format!(
        "{} failed with {}",
        command.program.display(),
        describe_status(status)
    )))
}
