//! nf-core/genomeassembler platform wrapper
//!
//! Declares the pipeline's parameters, provisions shared storage, stages the
//! task directory, launches Nextflow with translated flags and uploads the
//! Nextflow log when the run ends.

pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod params;
pub mod platform;
pub mod process_guard;
pub mod runner;
pub mod schema;
pub mod staging;

pub use config::RuntimeConfig;
pub use driver::{Driver, LogUpload, RunOutcome, RunStage, initialize};
pub use error::{Result, WorkflowError};
pub use params::{DataRef, FlagValue, ResolvedParameters};
pub use platform::{LatchPlatform, Platform};
pub use runner::RunnerCommand;
pub use schema::{PARAMETERS, ParamType, ParameterSpec};
