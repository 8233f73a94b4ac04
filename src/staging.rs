//! Staging of the task filesystem into the shared working directory.
//!
//! The task root is copied into the shared mount so the runner (and the
//! pods it launches) can see the pipeline sources. Entries whose name is on
//! the ignore list are skipped wherever they appear, symlinks are followed,
//! and dangling symlinks are skipped. A directory symlink that leads back
//! into a directory already being copied is skipped, so symlink cycles
//! terminate. Existing destination files are overwritten; existing
//! directories are merged into.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Result, WorkflowError};

/// Counts of what a staging copy did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageReport {
    pub files: u64,
    pub dirs: u64,
    pub dangling_symlinks: u64,
}

/// Copy `src` into `dst`, skipping entries named in `ignore`.
pub fn stage_directory(src: &Path, dst: &Path, ignore: &[String]) -> Result<StageReport> {
    info!("Staging {} into {}", src.display(), dst.display());
    if !src.is_dir() {
        return Err(WorkflowError::staging(format!(
            "source {} is not a directory",
            src.display()
        )));
    }

    let mut report = StageReport::default();
    let mut active = HashSet::new();
    copy_filtered(src, dst, ignore, &mut active, &mut report).map_err(|e| {
        WorkflowError::staging(format!(
            "copying {} to {}: {}",
            src.display(),
            dst.display(),
            e
        ))
    })?;

    info!(
        "Staged {} file(s) in {} directorie(s), skipped {} dangling symlink(s)",
        report.files, report.dirs, report.dangling_symlinks
    );
    Ok(report)
}

fn is_ignored(name: &std::ffi::OsStr, ignore: &[String]) -> bool {
    ignore.iter().any(|ex| name == ex.as_str())
}

/// `active` holds the canonical roots of the copies currently in progress
fn copy_filtered(
    src: &Path,
    dst: &Path,
    ignore: &[String],
    active: &mut HashSet<PathBuf>,
    report: &mut StageReport,
) -> io::Result<()> {
    let root = fs::canonicalize(src)?;
    active.insert(root.clone());
    let result = copy_tree(src, dst, ignore, active, report);
    active.remove(&root);
    result
}

fn copy_tree(
    src: &Path,
    dst: &Path,
    ignore: &[String],
    active: &mut HashSet<PathBuf>,
    report: &mut StageReport,
) -> io::Result<()> {
    fs::create_dir_all(dst)?;

    let walker = WalkDir::new(src)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored(e.file_name(), ignore));

    for entry in walker {
        let entry = entry?;
        let path = entry.path();
        let rel = path.strip_prefix(src).map_err(io::Error::other)?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
            report.dirs += 1;
        } else if file_type.is_symlink() {
            match fs::metadata(path) {
                Ok(meta) if meta.is_dir() => {
                    let real = fs::canonicalize(path)?;
                    let parent = match path.parent() {
                        Some(parent) => fs::canonicalize(parent)?,
                        None => real.clone(),
                    };
                    if parent.starts_with(&real) || active.iter().any(|dir| dir.starts_with(&real)) {
                        warn!("Skipping symlink {} that loops back to {}", path.display(), real.display());
                        continue;
                    }
                    report.dirs += 1;
                    copy_filtered(&real, &target, ignore, active, report)?;
                }
                Ok(meta) if meta.is_file() => {
                    fs::copy(path, &target)?;
                    report.files += 1;
                }
                Ok(_) => debug!("Skipping special file behind symlink {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("Skipping dangling symlink {}", path.display());
                    report.dangling_symlinks += 1;
                }
                Err(e) => return Err(e),
            }
        } else if file_type.is_file() {
            fs::copy(path, &target)?;
            report.files += 1;
        }
    }
    Ok(())
}
