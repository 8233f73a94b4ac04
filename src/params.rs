//! Resolved parameter values and their translation into pipeline flags.
//!
//! # Flag Convention
//!
//! | Value            | Tokens                 |
//! |------------------|------------------------|
//! | absent           | none                   |
//! | `true`           | `--<name>`             |
//! | `false`          | none                   |
//! | anything else    | `--<name>` `<value>`   |
//!
//! Booleans are presence-only for every boolean parameter. Flags are emitted
//! in the declared order of [`crate::schema::PARAMETERS`], never in the order
//! values were supplied.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

use crate::error::{Result, WorkflowError};
use crate::schema::{
    DEFAULT_BUSCO_LINEAGES, DEFAULT_KMER_COUNTER, DEFAULT_KMER_SIZE, DEFAULT_PLOIDY, DEFAULT_STEP,
    ValueKind,
};

/// URI scheme of platform-managed storage.
pub const REMOTE_SCHEME: &str = "latch://";

/// A file or directory handed to the pipeline.
///
/// Either a platform URI (`latch:///data/sample.csv`), which the runner's
/// storage plugin resolves, or a path the runner resolves from the staged
/// directory. Rendered verbatim on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataRef(String);

impl DataRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this points at platform storage rather than the task filesystem
    pub fn is_remote(&self) -> bool {
        self.0.starts_with(REMOTE_SCHEME)
    }
}

impl FromStr for DataRef {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(WorkflowError::parameter("file or directory reference cannot be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for DataRef {
    type Error = WorkflowError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DataRef> for String {
    fn from(value: DataRef) -> Self {
        value.0
    }
}

impl fmt::Display for DataRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A borrowed parameter value ready to be rendered as a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagValue<'a> {
    File(&'a DataRef),
    Directory(&'a DataRef),
    Str(&'a str),
    Int(i64),
    Bool(bool),
}

impl FlagValue<'_> {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::File(_) => ValueKind::File,
            Self::Directory(_) => ValueKind::Directory,
            Self::Str(_) => ValueKind::String,
            Self::Int(_) => ValueKind::Integer,
            Self::Bool(_) => ValueKind::Boolean,
        }
    }
}

impl fmt::Display for FlagValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(r) | Self::Directory(r) => write!(f, "{}", r),
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{}", i),
            Self::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Translate one parameter into command-line tokens.
///
/// ```
/// use nf_genomeassembler::params::{flag, FlagValue};
///
/// assert_eq!(flag("kmer_size", Some(FlagValue::Int(31))), vec!["--kmer_size", "31"]);
/// assert_eq!(flag("enable_ont_kmer_analyses", Some(FlagValue::Bool(true))), vec!["--enable_ont_kmer_analyses"]);
/// assert!(flag("reference", None).is_empty());
/// ```
pub fn flag(name: &str, value: Option<FlagValue<'_>>) -> Vec<String> {
    match value {
        None | Some(FlagValue::Bool(false)) => Vec::new(),
        Some(FlagValue::Bool(true)) => vec![format!("--{}", name)],
        Some(value) => vec![format!("--{}", name), value.to_string()],
    }
}

fn default_step() -> Option<String> {
    Some(DEFAULT_STEP.to_string())
}

fn default_kmer_size() -> Option<i64> {
    Some(DEFAULT_KMER_SIZE)
}

fn default_ploidy() -> Option<i64> {
    Some(DEFAULT_PLOIDY)
}

fn default_busco_lineages() -> Option<String> {
    Some(DEFAULT_BUSCO_LINEAGES.to_string())
}

fn default_kmer_counter() -> Option<String> {
    Some(DEFAULT_KMER_COUNTER.to_string())
}

fn file(r: &Option<DataRef>) -> Option<FlagValue<'_>> {
    r.as_ref().map(FlagValue::File)
}

fn dir(r: &Option<DataRef>) -> Option<FlagValue<'_>> {
    r.as_ref().map(FlagValue::Directory)
}

fn text(s: &Option<String>) -> Option<FlagValue<'_>> {
    s.as_deref().map(FlagValue::Str)
}

fn int(i: Option<i64>) -> Option<FlagValue<'static>> {
    i.map(FlagValue::Int)
}

/// Concrete values for one execution of the workflow.
///
/// When loaded from JSON, a missing key takes the schema default while an
/// explicit `null` leaves the parameter absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolvedParameters {
    pub input: DataRef,
    pub outdir: DataRef,
    #[serde(default = "default_step")]
    pub step: Option<String>,
    #[serde(default = "default_kmer_size")]
    pub kmer_size: Option<i64>,
    #[serde(default = "default_ploidy")]
    pub ploidy: Option<i64>,
    #[serde(default = "default_busco_lineages")]
    pub busco_lineages: Option<String>,
    #[serde(default)]
    pub busco_lineage_path: Option<DataRef>,
    #[serde(default)]
    pub reference: Option<DataRef>,
    #[serde(default)]
    pub mash_screen_db: Option<DataRef>,
    #[serde(default = "default_kmer_counter")]
    pub kmer_counter: Option<String>,
    #[serde(default)]
    pub enable_ont_kmer_analyses: Option<bool>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub multiqc_title: Option<String>,
    #[serde(default)]
    pub genome: Option<String>,
    #[serde(default)]
    pub fasta: Option<DataRef>,
    #[serde(default)]
    pub multiqc_methods_description: Option<String>,
}

impl ResolvedParameters {
    /// Required values with every optional parameter at its schema default.
    pub fn new(input: DataRef, outdir: DataRef) -> Self {
        Self {
            input,
            outdir,
            step: default_step(),
            kmer_size: default_kmer_size(),
            ploidy: default_ploidy(),
            busco_lineages: default_busco_lineages(),
            busco_lineage_path: None,
            reference: None,
            mash_screen_db: None,
            kmer_counter: default_kmer_counter(),
            enable_ont_kmer_analyses: None,
            email: None,
            multiqc_title: None,
            genome: None,
            fasta: None,
            multiqc_methods_description: None,
        }
    }

    /// Load parameters from a JSON params file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read parameters from {:?}", path.as_ref()))?;

        let params: Self =
            serde_json::from_str(&content).context("Failed to parse parameters JSON")?;

        Ok(params)
    }

    /// Every parameter with its value, in declared order.
    pub fn entries(&self) -> [(&'static str, Option<FlagValue<'_>>); 16] {
        [
            ("input", Some(FlagValue::File(&self.input))),
            ("outdir", Some(FlagValue::Directory(&self.outdir))),
            ("step", text(&self.step)),
            ("kmer_size", int(self.kmer_size)),
            ("ploidy", int(self.ploidy)),
            ("busco_lineages", text(&self.busco_lineages)),
            ("busco_lineage_path", dir(&self.busco_lineage_path)),
            ("reference", file(&self.reference)),
            ("mash_screen_db", file(&self.mash_screen_db)),
            ("kmer_counter", text(&self.kmer_counter)),
            ("enable_ont_kmer_analyses", self.enable_ont_kmer_analyses.map(FlagValue::Bool)),
            ("email", text(&self.email)),
            ("multiqc_title", text(&self.multiqc_title)),
            ("genome", text(&self.genome)),
            ("fasta", file(&self.fasta)),
            ("multiqc_methods_description", text(&self.multiqc_methods_description)),
        ]
    }

    /// Pipeline flags for these parameters.
    pub fn to_cli_args(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .flat_map(|(name, value)| flag(name, value))
            .collect()
    }

    /// Reject values the pipeline would refuse.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("kmer_size", self.kmer_size), ("ploidy", self.ploidy)] {
            match value {
                Some(v) if v <= 0 => {
                    return Err(WorkflowError::parameter(format!(
                        "{} must be a positive integer, got {}",
                        name, v
                    )));
                }
                _ => {}
            }
        }

        if let Some(email) = self.email.as_deref().filter(|e| !e.contains('@')) {
            return Err(WorkflowError::parameter(format!(
                "email '{}' is not a valid address",
                email
            )));
        }

        if !self.outdir.is_remote() {
            warn!(
                "outdir '{}' is not platform storage; results will not outlive the task",
                self.outdir
            );
        }

        Ok(())
    }
}
