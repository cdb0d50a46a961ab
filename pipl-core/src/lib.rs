use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

pub mod field;
pub mod patch;
pub mod scan;
pub mod tables;

#[cfg(test)]
mod fixtures;

pub use field::{DecodedRecord, FieldValue};
pub use patch::{dump, patch, AppliedPatch, PatchReport};

pub const PLUGIN_EXTENSION: &str = "aex";
pub const OUTPUT_SUFFIX: &str = "_mfr";

/// Outcomes of walking a single buffer.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("PiPL cannot be found")]
    MarkerNotFound,
    #[error("malformed record at offset 0x{offset:08X}: {reason}")]
    MalformedRecord { offset: usize, reason: String },
}

impl PatchError {
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        PatchError::MalformedRecord {
            offset,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PiplError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    UnsupportedEnvironment(String),
    #[error("{path}: {source}")]
    Patch {
        path: PathBuf,
        #[source]
        source: PatchError,
    },
}

pub type Result<T> = std::result::Result<T, PiplError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchSettings {
    pub input_path: PathBuf,
    /// Decode and plan, but never write an output file.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    MarkerNotFound,
    NoPatchNeeded,
    Patched,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub input_path: PathBuf,
    pub output_path: Option<PathBuf>,
    pub status: RunStatus,
    pub report: PatchReport,
}

/// Plugins are only loaded by the Windows host, so patching is gated on it.
pub fn check_host_platform() -> Result<()> {
    if cfg!(windows) {
        Ok(())
    } else {
        Err(PiplError::UnsupportedEnvironment(
            "This tool is available only on Windows.".to_string(),
        ))
    }
}

fn has_plugin_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case(PLUGIN_EXTENSION))
}

fn is_patched_output(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map_or(false, |s| s.ends_with(OUTPUT_SUFFIX))
}

pub fn validate_input(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(PiplError::InvalidInput(format!(
            "{} doesn't exist",
            path.display()
        )));
    }
    if !path.is_file() {
        return Err(PiplError::InvalidInput(format!(
            "{} is not a file",
            path.display()
        )));
    }
    if !has_plugin_extension(path) {
        return Err(PiplError::InvalidInput(format!(
            "Only .{PLUGIN_EXTENSION} is supported: {}",
            path.display()
        )));
    }
    Ok(())
}

/// `<dir>/<stem>_mfr.aex` next to the input.
pub fn output_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}{OUTPUT_SUFFIX}.{PLUGIN_EXTENSION}"))
}

/// Patches one file. A missing PiPL is reported through the summary status;
/// a corrupt one is an error.
pub fn patch_file(path: &Path, dry_run: bool) -> Result<RunSummary> {
    validate_input(path)?;
    let mut bytes = fs::read(path)?;

    let report = match patch(&mut bytes) {
        Ok(report) => report,
        Err(PatchError::MarkerNotFound) => {
            warn!("{}: PiPL cannot be found", path.display());
            return Ok(RunSummary {
                input_path: path.to_path_buf(),
                output_path: None,
                status: RunStatus::MarkerNotFound,
                report: PatchReport::default(),
            });
        }
        Err(source) => {
            return Err(PiplError::Patch {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if !report.modified {
        info!("{}: no patch needed", path.display());
        return Ok(RunSummary {
            input_path: path.to_path_buf(),
            output_path: None,
            status: RunStatus::NoPatchNeeded,
            report,
        });
    }

    let dest = output_path_for(path);
    if dry_run {
        info!(
            "{}: {} rewrites planned, dry run so {} not written",
            path.display(),
            report.applied.len(),
            dest.display()
        );
    } else {
        fs::write(&dest, &bytes)?;
        info!("{}: wrote {}", path.display(), dest.display());
    }

    Ok(RunSummary {
        input_path: path.to_path_buf(),
        output_path: (!dry_run).then_some(dest),
        status: RunStatus::Patched,
        report,
    })
}

/// Every plugin under `dir`, skipping outputs of earlier runs.
pub fn collect_plugins(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| PiplError::Io(e.into()))?;
        let path = entry.path();
        if entry.file_type().is_file() && has_plugin_extension(path) && !is_patched_output(path) {
            out.push(path.to_path_buf());
        }
    }
    Ok(out)
}

/// A plugin that could not be processed during a directory run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub input_path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub summaries: Vec<RunSummary>,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Patches the input file, or every plugin beneath it when it is a
/// directory. A single file's error is returned as is; in a directory run
/// each failing plugin is recorded and the remaining plugins are still
/// processed.
pub fn run(settings: &PatchSettings) -> Result<BatchReport> {
    let input = &settings.input_path;
    if !input.exists() {
        return Err(PiplError::InvalidInput(format!(
            "{} doesn't exist",
            input.display()
        )));
    }

    if !input.is_dir() {
        let summary = patch_file(input, settings.dry_run)?;
        return Ok(BatchReport {
            summaries: vec![summary],
            failures: Vec::new(),
        });
    }

    let plugins = collect_plugins(input)?;
    if plugins.is_empty() {
        return Err(PiplError::InvalidInput(format!(
            "no .{PLUGIN_EXTENSION} files under {}",
            input.display()
        )));
    }

    let mut report = BatchReport::default();
    for plugin in plugins {
        match patch_file(&plugin, settings.dry_run) {
            Ok(summary) => report.summaries.push(summary),
            Err(err) => {
                warn!("{}: {err}", plugin.display());
                report.failures.push(BatchFailure {
                    input_path: plugin,
                    error: err.to_string(),
                });
            }
        }
    }
    Ok(report)
}
