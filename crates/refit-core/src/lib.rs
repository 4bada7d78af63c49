//! refit-core: Core abstractions for batch source rewriting
//!
//! This crate provides:
//! - `LinePatch`: A line-number-indexed replacement, deletion or rename
//! - `apply_patches()`: Apply a patch set against a file's original lines
//! - `FileJob`: The per-file unit of work tracked by the run loop
//! - `RunReporter`/`RunReport`: Aggregation of per-file outcomes

pub mod error;
pub mod job;
mod patch;
pub mod report;

pub use error::{DiscoveryError, MissingCounterpartError};
pub use job::{FileJob, JobStatus};
pub use patch::{apply_patches, join_lines, line_count, split_lines, LinePatch, PatchAction, PatchError, PatchOutcome};
pub use report::{FileEntry, RunMode, RunReport, RunReporter};
