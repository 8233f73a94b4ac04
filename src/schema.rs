//! Parameter schema for nf-core/genomeassembler.
//!
//! Inert data consumed by the scheduler's form rendering and by the
//! parameter resolver. The slice order of [`PARAMETERS`] is the declared
//! parameter order, which is also the order flags appear on the pipeline
//! command line.

use serde::Serialize;
use strum::{Display, EnumIter, EnumString};

use crate::error::{Result, WorkflowError};

/// Default stage list run by the pipeline.
pub const DEFAULT_STEP: &str = "data_qc,preprocess,assemble,validate,curate";
/// Default k-mer size for k-mer analyses.
pub const DEFAULT_KMER_SIZE: i64 = 31;
/// Default estimated ploidy.
pub const DEFAULT_PLOIDY: i64 = 2;
/// Default BUSCO lineage selection.
pub const DEFAULT_BUSCO_LINEAGES: &str = "auto";
/// Default k-mer counter.
pub const DEFAULT_KMER_COUNTER: &str = "fastk";

/// Semantic type of a parameter, as presented to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ParamType {
    File,
    OptionalFile,
    Directory,
    OptionalDirectory,
    /// Directory the pipeline writes its results into
    OutputDirectory,
    OptionalString,
    OptionalInteger,
    OptionalBoolean,
}

/// Shape of a value regardless of optionality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    File,
    Directory,
    String,
    Integer,
    Boolean,
}

impl ParamType {
    /// Whether the scheduler may leave this parameter unset
    pub const fn is_optional(self) -> bool {
        !matches!(self, Self::File | Self::Directory | Self::OutputDirectory)
    }

    pub const fn kind(self) -> ValueKind {
        match self {
            Self::File | Self::OptionalFile => ValueKind::File,
            Self::Directory | Self::OptionalDirectory | Self::OutputDirectory => {
                ValueKind::Directory
            }
            Self::OptionalString => ValueKind::String,
            Self::OptionalInteger => ValueKind::Integer,
            Self::OptionalBoolean => ValueKind::Boolean,
        }
    }
}

/// Literal default attached to a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DefaultValue {
    Str(&'static str),
    Int(i64),
    Bool(bool),
}

impl DefaultValue {
    pub const fn kind(self) -> ValueKind {
        match self {
            Self::Str(_) => ValueKind::String,
            Self::Int(_) => ValueKind::Integer,
            Self::Bool(_) => ValueKind::Boolean,
        }
    }
}

/// One externally settable input of the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParameterSpec {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub ty: ParamType,
    pub default: Option<DefaultValue>,
    pub section_title: Option<&'static str>,
    pub description: &'static str,
}

/// Every parameter of the workflow, in declared order.
pub static PARAMETERS: &[ParameterSpec] = &[
    ParameterSpec {
        name: "input",
        ty: ParamType::File,
        default: None,
        section_title: Some("Input/output options"),
        description: "Path to comma-separated file containing information about the samples in the experiment.",
    },
    ParameterSpec {
        name: "outdir",
        ty: ParamType::OutputDirectory,
        default: None,
        section_title: None,
        description: "The output directory where the results will be saved. You have to use absolute paths to storage on Cloud infrastructure.",
    },
    ParameterSpec {
        name: "step",
        ty: ParamType::OptionalString,
        default: Some(DefaultValue::Str(DEFAULT_STEP)),
        section_title: None,
        description: "The stage of genome assembly to run",
    },
    ParameterSpec {
        name: "kmer_size",
        ty: ParamType::OptionalInteger,
        default: Some(DefaultValue::Int(DEFAULT_KMER_SIZE)),
        section_title: None,
        description: "The k-mer size to use in k-mer analyses when not supplied in yaml metadata",
    },
    ParameterSpec {
        name: "ploidy",
        ty: ParamType::OptionalInteger,
        default: Some(DefaultValue::Int(DEFAULT_PLOIDY)),
        section_title: None,
        description: "The estimated ploidy to use when not supplied in yaml metadata",
    },
    ParameterSpec {
        name: "busco_lineages",
        ty: ParamType::OptionalString,
        default: Some(DefaultValue::Str(DEFAULT_BUSCO_LINEAGES)),
        section_title: None,
        description: "The busco lineages to examine, when not supplied in the yaml metadata",
    },
    ParameterSpec {
        name: "busco_lineage_path",
        ty: ParamType::OptionalDirectory,
        default: None,
        section_title: None,
        description: "The local path to the downloaded busco lineages",
    },
    ParameterSpec {
        name: "reference",
        ty: ParamType::OptionalFile,
        default: None,
        section_title: None,
        description: "An optional reference genome for comparison to",
    },
    ParameterSpec {
        name: "mash_screen_db",
        ty: ParamType::OptionalFile,
        default: None,
        section_title: None,
        description: "A mash screen database to search for contamination",
    },
    ParameterSpec {
        name: "kmer_counter",
        ty: ParamType::OptionalString,
        default: Some(DefaultValue::Str(DEFAULT_KMER_COUNTER)),
        section_title: None,
        description: "The default k-mer counter to use for k-mer analyses",
    },
    ParameterSpec {
        name: "enable_ont_kmer_analyses",
        ty: ParamType::OptionalBoolean,
        default: None,
        section_title: None,
        description: "Flag to enable k-mer analyses on ONT data",
    },
    ParameterSpec {
        name: "email",
        ty: ParamType::OptionalString,
        default: None,
        section_title: None,
        description: "Email address for completion summary.",
    },
    ParameterSpec {
        name: "multiqc_title",
        ty: ParamType::OptionalString,
        default: None,
        section_title: None,
        description: "MultiQC report title. Printed as page header, used for filename if not otherwise specified.",
    },
    ParameterSpec {
        name: "genome",
        ty: ParamType::OptionalString,
        default: None,
        section_title: Some("Reference genome options"),
        description: "Name of iGenomes reference.",
    },
    ParameterSpec {
        name: "fasta",
        ty: ParamType::OptionalFile,
        default: None,
        section_title: None,
        description: "Path to FASTA genome file.",
    },
    ParameterSpec {
        name: "multiqc_methods_description",
        ty: ParamType::OptionalString,
        default: None,
        section_title: Some("Generic options"),
        description: "Custom MultiQC yaml file containing HTML including a methods description.",
    },
];

/// Look up a parameter by name.
pub fn lookup(name: &str) -> Option<&'static ParameterSpec> {
    PARAMETERS.iter().find(|spec| spec.name == name)
}

/// Parameter names in declared order.
pub fn names() -> impl Iterator<Item = &'static str> {
    PARAMETERS.iter().map(|spec| spec.name)
}

/// Verify the schema is internally consistent.
///
/// Names must be unique, required parameters carry no default, and every
/// default must match the shape of its declared type.
pub fn check() -> Result<()> {
    for (i, spec) in PARAMETERS.iter().enumerate() {
        if PARAMETERS[..i].iter().any(|other| other.name == spec.name) {
            return Err(WorkflowError::parameter(format!(
                "parameter '{}' is declared twice",
                spec.name
            )));
        }
        match spec.default {
            Some(_) if !spec.ty.is_optional() => {
                return Err(WorkflowError::parameter(format!(
                    "required parameter '{}' must not declare a default",
                    spec.name
                )));
            }
            Some(default) if default.kind() != spec.ty.kind() => {
                return Err(WorkflowError::parameter(format!(
                    "default of '{}' does not match type {}",
                    spec.name, spec.ty
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Render the schema as a pretty JSON array in declared order.
pub fn to_json() -> Result<String> {
    Ok(serde_json::to_string_pretty(PARAMETERS)?)
}
