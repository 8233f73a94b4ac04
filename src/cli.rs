use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::params::{DataRef, ResolvedParameters};

/// nf-core/genomeassembler platform tasks
#[derive(Parser, Debug)]
#[command(name = "nf-genomeassembler")]
#[command(about = "Provision, stage and launch the nf-core/genomeassembler Nextflow pipeline")]
#[command(version)]
pub struct Cli {
    /// Runtime configuration file (JSON). Defaults to the platform task layout.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print the pipeline command line and exit.
    ///
    /// Nothing is provisioned, staged or launched.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision the shared storage volume and print its name
    Initialize,
    /// Stage and run the pipeline on an already provisioned volume
    Run {
        /// Storage volume name returned by `initialize`
        #[arg(long)]
        storage: String,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Provision storage, then stage and run the pipeline
    Workflow {
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Print the parameter schema as JSON
    Schema,
}

/// Pipeline parameters. Flags override values from `--params-file`.
#[derive(Args, Debug, Clone, Default)]
pub struct ParamArgs {
    /// JSON parameter file; missing keys take their defaults, `null` leaves a parameter unset
    #[arg(long)]
    pub params_file: Option<PathBuf>,

    /// Samplesheet describing the samples in the experiment
    #[arg(long)]
    pub input: Option<DataRef>,
    /// Output directory for the results
    #[arg(long)]
    pub outdir: Option<DataRef>,
    /// Stages of genome assembly to run [default: data_qc,preprocess,assemble,validate,curate]
    #[arg(long)]
    pub step: Option<String>,
    /// k-mer size for k-mer analyses [default: 31]
    #[arg(long)]
    pub kmer_size: Option<i64>,
    /// Estimated ploidy [default: 2]
    #[arg(long)]
    pub ploidy: Option<i64>,
    /// BUSCO lineages to examine [default: auto]
    #[arg(long)]
    pub busco_lineages: Option<String>,
    /// Local path to the downloaded BUSCO lineages
    #[arg(long)]
    pub busco_lineage_path: Option<DataRef>,
    /// Reference genome for comparison
    #[arg(long)]
    pub reference: Option<DataRef>,
    /// Mash screen database to search for contamination
    #[arg(long)]
    pub mash_screen_db: Option<DataRef>,
    /// k-mer counter [default: fastk]
    #[arg(long)]
    pub kmer_counter: Option<String>,
    /// Enable k-mer analyses on ONT data
    #[arg(long)]
    pub enable_ont_kmer_analyses: bool,
    /// Email address for the completion summary
    #[arg(long)]
    pub email: Option<String>,
    /// MultiQC report title
    #[arg(long)]
    pub multiqc_title: Option<String>,
    /// Name of an iGenomes reference
    #[arg(long)]
    pub genome: Option<String>,
    /// FASTA genome file
    #[arg(long)]
    pub fasta: Option<DataRef>,
    /// MultiQC methods description YAML
    #[arg(long)]
    pub multiqc_methods_description: Option<String>,
}

impl ParamArgs {
    /// Combine the parameter file and flags into validated parameters.
    pub fn resolve(&self) -> anyhow::Result<ResolvedParameters> {
        let mut params = match &self.params_file {
            Some(path) => ResolvedParameters::load_from_file(path)?,
            None => {
                let input = self
                    .input
                    .clone()
                    .context("--input is required without --params-file")?;
                let outdir = self
                    .outdir
                    .clone()
                    .context("--outdir is required without --params-file")?;
                ResolvedParameters::new(input, outdir)
            }
        };

        fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *slot = v.clone();
            }
        }
        fn set_opt<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                *slot = value.clone();
            }
        }

        set(&mut params.input, &self.input);
        set(&mut params.outdir, &self.outdir);
        set_opt(&mut params.step, &self.step);
        set_opt(&mut params.kmer_size, &self.kmer_size);
        set_opt(&mut params.ploidy, &self.ploidy);
        set_opt(&mut params.busco_lineages, &self.busco_lineages);
        set_opt(&mut params.busco_lineage_path, &self.busco_lineage_path);
        set_opt(&mut params.reference, &self.reference);
        set_opt(&mut params.mash_screen_db, &self.mash_screen_db);
        set_opt(&mut params.kmer_counter, &self.kmer_counter);
        if self.enable_ont_kmer_analyses {
            params.enable_ont_kmer_analyses = Some(true);
        }
        set_opt(&mut params.email, &self.email);
        set_opt(&mut params.multiqc_title, &self.multiqc_title);
        set_opt(&mut params.genome, &self.genome);
        set_opt(&mut params.fasta, &self.fasta);
        set_opt(
            &mut params.multiqc_methods_description,
            &self.multiqc_methods_description,
        );

        params.validate()?;
        Ok(params)
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
