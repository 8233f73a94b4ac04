//! Driver integration tests
//!
//! The runner is `/bin/sh` and the "entry" it executes is a script named
//! `run` placed in the task root. The script only exists in the shared
//! directory if staging copied it there, so every successful launch also
//! proves staging ran first.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use nf_genomeassembler::config::LOG_FILE_NAME;
use nf_genomeassembler::{
    Driver, LogUpload, Platform, ResolvedParameters, Result, RunStage, RuntimeConfig,
    WorkflowError,
};
use tempfile::TempDir;

#[derive(Default)]
struct RecordingPlatform {
    provision_fails: bool,
    execution_name: Option<String>,
    upload_fails: bool,
    provisions: RefCell<u32>,
    uploads: RefCell<Vec<(PathBuf, String, String)>>,
}

impl Platform for RecordingPlatform {
    fn provision_storage(&self, _token: &str, _storage_gib: u32) -> Result<String> {
        *self.provisions.borrow_mut() += 1;
        if self.provision_fails {
            return Err(WorkflowError::provisioning("provision returned 503"));
        }
        Ok("pvc-abc".to_string())
    }

    fn execution_name(&self, _token: &str) -> Result<Option<String>> {
        Ok(self.execution_name.clone())
    }

    fn upload(&self, _token: &str, local: &Path, remote: &str) -> Result<()> {
        let content = fs::read_to_string(local)?;
        self.uploads
            .borrow_mut()
            .push((local.to_path_buf(), remote.to_string(), content));
        if self.upload_fails {
            return Err(WorkflowError::platform("start-upload returned 500"));
        }
        Ok(())
    }
}

struct Fixture {
    _dir: TempDir,
    config: RuntimeConfig,
}

impl Fixture {
    /// Task root holding a fake pipeline whose `run` script executes `body`
    fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let task_root = dir.path().join("task");
        let shared_dir = dir.path().join("shared");
        fs::create_dir_all(task_root.join(".git")).unwrap();
        fs::write(task_root.join(".git/HEAD"), "ref: refs/heads/main").unwrap();
        for ignored in ["work/ab/cdef", ".nextflow/history", "results/pipeline_info", "latch"] {
            fs::create_dir_all(task_root.join(ignored)).unwrap();
        }
        fs::write(task_root.join("work/ab/cdef/.command.log"), "stale").unwrap();
        fs::write(task_root.join("latch/__init__.py"), "").unwrap();
        fs::create_dir_all(task_root.join("modules/local")).unwrap();
        fs::write(task_root.join("modules/local/assemble.nf"), "process ASSEMBLE {}").unwrap();
        fs::write(task_root.join("main.nf"), "workflow {}").unwrap();
        fs::write(task_root.join("run"), format!("{}\n", body)).unwrap();

        let config = RuntimeConfig {
            task_root,
            shared_dir,
            runner_binary: PathBuf::from("/bin/sh"),
            ..Default::default()
        }
        .with_token(Some("exec-token".to_string()));

        Self { _dir: dir, config }
    }

    fn shared(&self, name: &str) -> PathBuf {
        self.config.shared_dir.join(name)
    }
}

const RECORDING_RUNNER: &str = r#"printf '%s\n' "$@" > args.txt
echo "$K8S_STORAGE_CLAIM_NAME" > claim.txt
echo "nextflow log line" > .nextflow.log"#;

fn params() -> ResolvedParameters {
    ResolvedParameters::new(
        "latch:///samples.csv".parse().unwrap(),
        "latch:///results".parse().unwrap(),
    )
}

fn named_platform() -> RecordingPlatform {
    RecordingPlatform {
        execution_name: Some("run-42".to_string()),
        ..Default::default()
    }
}

#[test]
fn test_successful_run_stages_executes_and_uploads() {
    let fixture = Fixture::new(RECORDING_RUNNER);
    let platform = named_platform();

    let outcome = Driver::new(&fixture.config, &platform).run("pvc-abc", &params());

    assert!(outcome.succeeded(), "{:?}", outcome.execution);
    assert_eq!(
        outcome.stages,
        vec![RunStage::Staging, RunStage::Executing, RunStage::LogUpload, RunStage::Done]
    );

    let remote = "latch:///your_log_dir/nf_nf_core_genomeassembler/run-42/nextflow.log";
    assert_eq!(outcome.log_upload, LogUpload::Uploaded { remote: remote.to_string() });

    let uploads = platform.uploads.borrow();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].0, fixture.shared(LOG_FILE_NAME));
    assert_eq!(uploads[0].1, remote);
    assert_eq!(uploads[0].2.trim(), "nextflow log line");
}

#[test]
fn test_runner_receives_translated_command_and_claim() {
    let fixture = Fixture::new(RECORDING_RUNNER);
    let platform = named_platform();

    let outcome = Driver::new(&fixture.config, &platform).run("pvc-abc", &params());
    assert!(outcome.succeeded());

    let args = fs::read_to_string(fixture.shared("args.txt")).unwrap();
    let args: Vec<&str> = args.lines().collect();
    let entry = fixture.shared("main.nf").display().to_string();
    let workdir = fixture.config.shared_dir.display().to_string();

    // $0 is the `run` script; its arguments start after the verb
    assert_eq!(
        &args[..7],
        &[entry.as_str(), "-work-dir", workdir.as_str(), "-profile", "docker", "-c", "latch.config"]
    );
    assert_eq!(
        &args[7..],
        &[
            "--input",
            "latch:///samples.csv",
            "--outdir",
            "latch:///results",
            "--step",
            "data_qc,preprocess,assemble,validate,curate",
            "--kmer_size",
            "31",
            "--ploidy",
            "2",
            "--busco_lineages",
            "auto",
            "--kmer_counter",
            "fastk",
        ]
    );

    let claim = fs::read_to_string(fixture.shared("claim.txt")).unwrap();
    assert_eq!(claim.trim(), "pvc-abc");
}

#[test]
fn test_staging_skips_ignored_names_and_keeps_nested_sources() {
    let fixture = Fixture::new(RECORDING_RUNNER);
    let platform = named_platform();

    Driver::new(&fixture.config, &platform).run("pvc-abc", &params());

    for ignored in ["work", ".nextflow", "results", "latch"] {
        assert!(!fixture.shared(ignored).exists(), "{} should not be staged", ignored);
    }
    assert!(fixture.shared(".git/HEAD").is_file());
    assert!(fixture.shared("modules/local/assemble.nf").is_file());
    assert!(fixture.shared("main.nf").is_file());
}

#[test]
fn test_nonzero_exit_still_uploads_log() {
    let fixture = Fixture::new("echo 'ERROR ~ process failed' > .nextflow.log\nexit 3");
    let platform = named_platform();

    let outcome = Driver::new(&fixture.config, &platform).run("pvc-abc", &params());

    assert!(!outcome.succeeded());
    assert_eq!(outcome.stages.last(), Some(&RunStage::Failed));
    assert!(outcome.stages.contains(&RunStage::LogUpload));
    assert!(matches!(outcome.log_upload, LogUpload::Uploaded { .. }));
    assert_eq!(platform.uploads.borrow().len(), 1);

    let err = outcome.into_result().unwrap_err();
    assert!(matches!(err, WorkflowError::Execution(ref msg) if msg.contains("exit code 3")));
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn test_upload_failure_does_not_mask_success() {
    let fixture = Fixture::new(RECORDING_RUNNER);
    let platform = RecordingPlatform {
        upload_fails: true,
        ..named_platform()
    };

    let outcome = Driver::new(&fixture.config, &platform).run("pvc-abc", &params());

    assert!(outcome.succeeded());
    assert!(matches!(outcome.log_upload, LogUpload::Failed(ref msg) if msg.contains("500")));
}

#[test]
fn test_upload_failure_does_not_mask_execution_error() {
    let fixture = Fixture::new("echo log > .nextflow.log\nexit 2");
    let platform = RecordingPlatform {
        upload_fails: true,
        ..named_platform()
    };

    let outcome = Driver::new(&fixture.config, &platform).run("pvc-abc", &params());

    assert!(matches!(outcome.log_upload, LogUpload::Failed(_)));
    assert!(matches!(outcome.execution, Err(WorkflowError::Execution(_))));
}

#[test]
fn test_missing_log_is_not_an_error() {
    let fixture = Fixture::new("exit 0");
    let platform = named_platform();

    let outcome = Driver::new(&fixture.config, &platform).run("pvc-abc", &params());

    assert!(outcome.succeeded());
    assert_eq!(outcome.log_upload, LogUpload::NoLogFile);
    assert!(platform.uploads.borrow().is_empty());
}

#[test]
fn test_unresolved_execution_name_skips_upload() {
    let fixture = Fixture::new(RECORDING_RUNNER);
    let platform = RecordingPlatform::default();

    let outcome = Driver::new(&fixture.config, &platform).run("pvc-abc", &params());

    assert!(outcome.succeeded());
    assert_eq!(outcome.log_upload, LogUpload::SkippedNoExecutionName);
    assert!(platform.uploads.borrow().is_empty());
}

#[test]
fn test_staging_failure_skips_execution() {
    let mut fixture = Fixture::new(RECORDING_RUNNER);
    fixture.config.task_root = fixture.config.task_root.join("missing");
    let platform = named_platform();

    let outcome = Driver::new(&fixture.config, &platform).run("pvc-abc", &params());

    assert!(matches!(outcome.execution, Err(WorkflowError::Staging(_))));
    assert_eq!(
        outcome.stages,
        vec![RunStage::Staging, RunStage::LogUpload, RunStage::Failed]
    );
    assert!(!fixture.shared("args.txt").exists());
}

#[test]
fn test_workflow_provisions_before_running() {
    let fixture = Fixture::new(RECORDING_RUNNER);
    let platform = named_platform();

    let outcome = Driver::new(&fixture.config, &platform)
        .run_workflow(&params())
        .unwrap();

    assert!(outcome.succeeded());
    assert_eq!(outcome.stages.first(), Some(&RunStage::Provisioning));
    assert_eq!(*platform.provisions.borrow(), 1);
    let claim = fs::read_to_string(fixture.shared("claim.txt")).unwrap();
    assert_eq!(claim.trim(), "pvc-abc");
}

#[test]
fn test_workflow_without_token_runs_nothing() {
    let fixture = Fixture::new(RECORDING_RUNNER);
    let config = fixture.config.clone().with_token(None);
    let platform = named_platform();

    let err = Driver::new(&config, &platform)
        .run_workflow(&params())
        .unwrap_err();

    assert!(matches!(err, WorkflowError::MissingToken(_)));
    assert_eq!(*platform.provisions.borrow(), 0);
    assert!(!fixture.shared("args.txt").exists());
    assert!(platform.uploads.borrow().is_empty());
}

#[test]
fn test_provisioning_failure_aborts_workflow() {
    let fixture = Fixture::new(RECORDING_RUNNER);
    let platform = RecordingPlatform {
        provision_fails: true,
        ..named_platform()
    };

    let err = Driver::new(&fixture.config, &platform)
        .run_workflow(&params())
        .unwrap_err();

    assert!(matches!(err, WorkflowError::Provisioning(_)));
    assert!(!fixture.config.shared_dir.exists());
    assert!(platform.uploads.borrow().is_empty());
}

#[test]
fn test_rerun_merges_into_existing_shared_dir() {
    let fixture = Fixture::new(RECORDING_RUNNER);
    let platform = named_platform();
    let driver = Driver::new(&fixture.config, &platform);

    assert!(driver.run("pvc-abc", &params()).succeeded());
    assert!(driver.run("pvc-abc", &params()).succeeded());
    assert_eq!(platform.uploads.borrow().len(), 2);
}
