//! Aggregation of per-file outcomes into a single run report

use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::job::{FileJob, JobStatus};

/// How the run treats the filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Analyze and report only; nothing on disk changes
    #[default]
    DryRun,
    /// Back up, rewrite and clean up companion artifacts
    Apply,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::DryRun => "dry-run",
            RunMode::Apply => "apply",
        }
    }

    pub fn mutates(&self) -> bool {
        matches!(self, RunMode::Apply)
    }
}

/// Outcome of one file as it appears in the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub path: String,
    pub status: JobStatus,
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stale_patches: Vec<usize>,
}

impl FileEntry {
    fn from_job(job: &FileJob) -> Self {
        Self {
            path: job.path.display().to_string(),
            status: job.status,
            changed: job.changed,
            backup: job.backup_path.as_ref().map(|p| p.display().to_string()),
            message: job.error.clone().or_else(|| job.note.clone()),
            stale_patches: job.stale_patches.clone(),
        }
    }
}

/// Immutable summary of one invocation
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    mode: RunMode,
    processed: usize,
    skipped: usize,
    changed: usize,
    errors: Vec<String>,
    timestamp: DateTime<Local>,
    #[serde(skip_serializing_if = "Option::is_none")]
    backup_root: Option<PathBuf>,
    files: Vec<FileEntry>,
}

impl RunReport {
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Files that went through the pipeline successfully
    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Files whose content was (or, in dry-run, would be) rewritten
    pub fn changed(&self) -> usize {
        self.changed
    }

    /// Error messages in file-processing order
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn backup_root(&self) -> Option<&Path> {
        self.backup_root.as_deref()
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }
}

/// Accumulates outcomes until [`RunReporter::finalize`] produces the report
#[derive(Debug)]
pub struct RunReporter {
    mode: RunMode,
    backup_root: Option<PathBuf>,
    processed: usize,
    skipped: usize,
    changed: usize,
    errors: Vec<String>,
    files: Vec<FileEntry>,
}

impl RunReporter {
    pub fn new(mode: RunMode, backup_root: Option<PathBuf>) -> Self {
        Self {
            mode,
            backup_root,
            processed: 0,
            skipped: 0,
            changed: 0,
            errors: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Record an error that is not tied to a single job (e.g. discovery)
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Record a finished job; the job is consumed
    pub fn record(&mut self, mut job: FileJob) {
        if job.is_pending() {
            job.fail("job finished without an outcome");
        }

        match job.status {
            JobStatus::Success => {
                self.processed += 1;
                if job.changed {
                    self.changed += 1;
                }
            }
            JobStatus::Skipped => self.skipped += 1,
            JobStatus::Error => {
                let message = job.error.clone().unwrap_or_default();
                self.errors
                    .push(format!("{}: {}", job.path.display(), message));
            }
            JobStatus::Pending => unreachable!("pending jobs are failed above"),
        }

        self.files.push(FileEntry::from_job(&job));
    }

    pub fn finalize(self) -> RunReport {
        RunReport {
            mode: self.mode,
            processed: self.processed,
            skipped: self.skipped,
            changed: self.changed,
            errors: self.errors,
            timestamp: Local::now(),
            backup_root: self.backup_root,
            files: self.files,
        }
    }
}
