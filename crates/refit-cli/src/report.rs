//! Report artifact written at the end of every run

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use refit_core::{JobStatus, RunReport};

use crate::config::ReportFormat;

#[derive(Debug, Error)]
pub enum ReportWriteError {
    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write report {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Write the report to `path`, replacing any previous one
pub fn write_report(
    report: &RunReport,
    passes: &[(&str, &str)],
    path: &Path,
    format: ReportFormat,
) -> Result<(), ReportWriteError> {
    let content = match format {
        ReportFormat::Markdown => render_markdown(report, passes),
        ReportFormat::Json => {
            let mut json = serde_json::to_string_pretty(report)?;
            json.push('\n');
            json
        }
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ReportWriteError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, content).map_err(|source| ReportWriteError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Human-readable report; `passes` are (name, description) in pipeline order
pub fn render_markdown(report: &RunReport, passes: &[(&str, &str)]) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# Refit Report");
    let _ = writeln!(out);
    let _ = writeln!(out, "**Run at**: {}", report.timestamp().to_rfc3339());
    let _ = writeln!(out, "**Mode**: {}", report.mode().as_str());
    let _ = writeln!(out);

    let _ = writeln!(out, "## Summary");
    let _ = writeln!(out);
    let _ = writeln!(out, "- **Processed**: {} file(s)", report.processed());
    let _ = writeln!(out, "- **Changed**: {} file(s)", report.changed());
    let _ = writeln!(out, "- **Skipped**: {} file(s)", report.skipped());
    let _ = writeln!(out, "- **Errors**: {}", report.error_count());
    let _ = writeln!(out);

    if !passes.is_empty() {
        let _ = writeln!(out, "## Passes");
        let _ = writeln!(out);
        for (i, (name, description)) in passes.iter().enumerate() {
            let _ = writeln!(out, "{}. `{}`: {}", i + 1, name, description);
        }
        let _ = writeln!(out);
    }

    if let Some(root) = report.backup_root() {
        let _ = writeln!(out, "## Backups");
        let _ = writeln!(out);
        let _ = writeln!(out, "Original files were copied to `{}/` before being rewritten.", root.display());
        let _ = writeln!(out);
        let _ = writeln!(out, "To roll back, run `refit --restore` or copy the files back by hand.");
        let _ = writeln!(out);
    }

    if report.error_count() > 0 {
        let _ = writeln!(out, "## Errors");
        let _ = writeln!(out);
        for error in report.errors() {
            let _ = writeln!(out, "- {}", error);
        }
        let _ = writeln!(out);
    }

    if !report.files().is_empty() {
        let _ = writeln!(out, "## Files");
        let _ = writeln!(out);
        let _ = writeln!(out, "| File | Status | Changed | Notes |");
        let _ = writeln!(out, "|------|--------|---------|-------|");
        for entry in report.files() {
            let status = match entry.status {
                JobStatus::Success => "ok",
                JobStatus::Skipped => "skipped",
                JobStatus::Error => "error",
                JobStatus::Pending => "pending",
            };
            let mut notes = entry.message.clone().unwrap_or_default();
            if !entry.stale_patches.is_empty() {
                if !notes.is_empty() {
                    notes.push_str("; ");
                }
                let lines: Vec<String> = entry.stale_patches.iter().map(|l| l.to_string()).collect();
                let _ = write!(notes, "stale patches at line(s) {}", lines.join(", "));
            }
            let _ = writeln!(
                out,
                "| `{}` | {} | {} | {} |",
                entry.path,
                status,
                if entry.changed { "yes" } else { "no" },
                notes.replace('|', "\\|")
            );
        }
    }

    out
}
