//! Per-file unit of work

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::patch::join_lines;

/// Lifecycle state of a [`FileJob`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Success,
    Skipped,
    Error,
}

/// Everything the run loop knows about one discovered file
///
/// A job leaves `Pending` exactly once, through [`FileJob::succeed`],
/// [`FileJob::skip`] or [`FileJob::fail`].
#[derive(Debug, Clone)]
pub struct FileJob {
    /// File that is (or would be) rewritten
    pub path: PathBuf,
    /// File the content is read from; differs from `path` for companion artifacts
    pub source_path: PathBuf,
    /// Content of `source_path` before the run, split into lines
    pub original_lines: Vec<String>,
    /// Pipeline output, set once the transformation succeeded
    pub transformed_content: Option<String>,
    /// Backup written for `path` during this run
    pub backup_path: Option<PathBuf>,
    pub status: JobStatus,
    /// Failure message when `status` is `Error`
    pub error: Option<String>,
    /// Reason when `status` is `Skipped`
    pub note: Option<String>,
    /// Whether the transformed content differs from what is on disk at `path`
    pub changed: bool,
    /// Line patches that were ignored as stale
    pub stale_patches: Vec<usize>,
}

impl FileJob {
    /// Job that rewrites `path` in place
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            source_path: path.clone(),
            path,
            original_lines: Vec::new(),
            transformed_content: None,
            backup_path: None,
            status: JobStatus::Pending,
            error: None,
            note: None,
            changed: false,
            stale_patches: Vec::new(),
        }
    }

    /// Job that applies the companion artifact `companion` onto `target`
    pub fn from_companion(companion: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        let mut job = Self::new(target);
        job.source_path = companion.into();
        job
    }

    /// True when the content comes from a companion artifact
    pub fn is_companion(&self) -> bool {
        self.source_path != self.path
    }

    pub fn companion(&self) -> Option<&Path> {
        self.is_companion().then_some(self.source_path.as_path())
    }

    /// The pre-run content reassembled from `original_lines`
    pub fn original_content(&self) -> String {
        join_lines(&self.original_lines)
    }

    pub fn is_pending(&self) -> bool {
        self.status == JobStatus::Pending
    }

    pub fn succeed(&mut self, changed: bool) {
        debug_assert!(self.is_pending(), "job {} finished twice", self.path.display());
        self.status = JobStatus::Success;
        self.changed = changed;
    }

    pub fn skip(&mut self, reason: impl Into<String>) {
        debug_assert!(self.is_pending(), "job {} finished twice", self.path.display());
        self.status = JobStatus::Skipped;
        self.note = Some(reason.into());
    }

    /// Mark the job failed; any partial transformation is discarded
    pub fn fail(&mut self, message: impl Into<String>) {
        debug_assert!(self.is_pending(), "job {} finished twice", self.path.display());
        self.status = JobStatus::Error;
        self.error = Some(message.into());
        self.transformed_content = None;
        self.changed = false;
    }
}
