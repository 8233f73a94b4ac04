//! Runtime configuration for the workflow tasks.
//!
//! Every path, endpoint and tuning knob the tasks use lives here and is
//! passed into the driver explicitly. Only [`RuntimeConfig::load`] looks at
//! the process environment, and only for the execution token.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::params::REMOTE_SCHEME;

/// Environment variable holding the platform execution token.
pub const TOKEN_ENV: &str = "FLYTE_INTERNAL_EXECUTION_ID";

/// Name of the runner's log file inside the staged directory.
pub const LOG_FILE_NAME: &str = ".nextflow.log";

/// Top-level entries of the task root that are never staged.
pub const DEFAULT_IGNORE_LIST: &[&str] = &[
    "latch",
    ".latch",
    "nextflow",
    ".nextflow",
    "work",
    "results",
    "miniconda",
    "anaconda3",
    "mambaforge",
];

/// Paths, endpoints and settings for one task process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    // Staging
    pub task_root: PathBuf,
    pub shared_dir: PathBuf,
    pub ignore_list: Vec<String>,

    // Runner invocation
    pub runner_binary: PathBuf,
    pub entry_file: String,
    pub profile: String,
    pub runner_config: String,
    pub nxf_home: String,
    pub nxf_opts: String,
    pub storage_claim_var: String,
    pub termination_grace_secs: u64,

    // Platform
    pub storage_gib: u32,
    pub provision_url: String,
    pub graphql_url: String,
    pub data_api_url: String,
    pub http_timeout_secs: u64,

    // Log upload
    pub log_base: String,
    pub log_namespace: String,

    /// Never read from or written to a config file
    #[serde(skip)]
    pub execution_token: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            task_root: PathBuf::from("/root"),
            shared_dir: PathBuf::from("/nf-workdir"),
            ignore_list: DEFAULT_IGNORE_LIST.iter().map(|s| s.to_string()).collect(),
            runner_binary: PathBuf::from("/root/nextflow"),
            entry_file: "main.nf".to_string(),
            profile: "docker".to_string(),
            runner_config: "latch.config".to_string(),
            nxf_home: "/root/.nextflow".to_string(),
            nxf_opts: "-Xms2048M -Xmx8G -XX:ActiveProcessorCount=4".to_string(),
            storage_claim_var: "K8S_STORAGE_CLAIM_NAME".to_string(),
            termination_grace_secs: 5,
            storage_gib: 100,
            provision_url: "http://nf-dispatcher-service.flyte.svc.cluster.local/provision-storage"
                .to_string(),
            graphql_url: "https://vacuole.latch.bio/graphql".to_string(),
            data_api_url: "https://nucleus.latch.bio".to_string(),
            http_timeout_secs: 60,
            log_base: "latch:///your_log_dir".to_string(),
            log_namespace: "nf_nf_core_genomeassembler".to_string(),
            execution_token: None,
        }
    }
}

impl RuntimeConfig {
    /// Load the configuration file if one is given, then pick up the
    /// execution token from the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        Ok(config.with_token(std::env::var(TOKEN_ENV).ok()))
    }

    /// Load configuration from a JSON file. Missing keys keep their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Replace the execution token. Empty tokens count as unset.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.execution_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.task_root.as_os_str().is_empty() || self.shared_dir.as_os_str().is_empty() {
            anyhow::bail!("task_root and shared_dir must be specified");
        }
        if self.task_root == self.shared_dir {
            anyhow::bail!("shared_dir must differ from task_root");
        }
        if self.runner_binary.as_os_str().is_empty() {
            anyhow::bail!("runner_binary must be specified");
        }
        if self.entry_file.trim().is_empty() {
            anyhow::bail!("entry_file must be specified");
        }
        if self.storage_gib == 0 {
            anyhow::bail!("storage_gib must be greater than zero");
        }
        if !self.log_base.starts_with(REMOTE_SCHEME) {
            anyhow::bail!("log_base must be a {} URI, got '{}'", REMOTE_SCHEME, self.log_base);
        }
        for url in [&self.provision_url, &self.graphql_url, &self.data_api_url] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("endpoint '{}' must start with http:// or https://", url);
            }
        }
        Ok(())
    }

    /// Pipeline entry file inside the staged directory
    pub fn entry_path(&self) -> PathBuf {
        self.shared_dir.join(&self.entry_file)
    }

    /// Runner log file inside the staged directory
    pub fn log_path(&self) -> PathBuf {
        self.shared_dir.join(LOG_FILE_NAME)
    }

    /// Remote destination of the runner log for a named execution.
    pub fn remote_log_path(&self, execution_name: &str) -> String {
        [
            self.log_base.trim_end_matches('/'),
            self.log_namespace.trim_matches('/'),
            execution_name.trim_matches('/'),
            "nextflow.log",
        ]
        .join("/")
    }

    /// Environment overlay for the runner process
    pub fn to_env_vars(&self, storage_handle: &str) -> Vec<(String, String)> {
        vec![
            ("NXF_HOME".to_string(), self.nxf_home.clone()),
            ("NXF_OPTS".to_string(), self.nxf_opts.clone()),
            (self.storage_claim_var.clone(), storage_handle.to_string()),
            ("NXF_DISABLE_CHECK_LATEST".to_string(), "true".to_string()),
        ]
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn termination_grace(&self) -> Duration {
        Duration::from_secs(self.termination_grace_secs)
    }
}
