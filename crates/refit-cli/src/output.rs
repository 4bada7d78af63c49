//! Terminal output for refit
//!
//! Supports text (colored terminal), unified diff and JSON output formats.

use colored::*;
use similar::{ChangeTag, TextDiff};
use std::fmt::Write as _;
use std::path::Path;

use refit_core::{JobStatus, RunReport};

use crate::process::Processed;

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Diff,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<OutputFormat> {
        match s.to_lowercase().as_str() {
            "text" => Some(OutputFormat::Text),
            "json" => Some(OutputFormat::Json),
            "diff" => Some(OutputFormat::Diff),
            _ => None,
        }
    }
}

/// Prints per-file results as they are recorded and a closing summary
pub struct Reporter {
    format: OutputFormat,
    verbose: bool,
}

impl Reporter {
    pub fn new(format: OutputFormat, verbose: bool) -> Self {
        Self { format, verbose }
    }

    /// Report one finished job
    pub fn report(&self, processed: &Processed) {
        let job = &processed.job;
        match job.status {
            JobStatus::Error => {
                if self.format == OutputFormat::Text {
                    eprintln!(
                        "{}: {} - {}",
                        "Error".red(),
                        job.path.display(),
                        job.error.as_deref().unwrap_or_default()
                    );
                }
            }
            JobStatus::Skipped => {
                if self.format == OutputFormat::Text {
                    eprintln!(
                        "{}: {}",
                        "Skipped".yellow(),
                        job.note.as_deref().unwrap_or_default()
                    );
                }
            }
            JobStatus::Success | JobStatus::Pending => {
                let (Some(before), Some(after)) = (processed.before.as_deref(), processed.after())
                else {
                    return;
                };
                if !job.changed {
                    if self.verbose && self.format == OutputFormat::Text {
                        println!("{}: No changes needed", job.path.display());
                    }
                    return;
                }
                match self.format {
                    OutputFormat::Text => {
                        println!("{}", job.path.display().to_string().bold());
                        print!("{}", colored_diff(before, after));
                        if let Some(backup) = &job.backup_path {
                            println!("  {} backed up to {}", "OK".green(), backup.display());
                        }
                        println!();
                    }
                    OutputFormat::Diff => print!("{}", unified_diff(&job.path, before, after)),
                    // JSON output is handled in finish()
                    OutputFormat::Json => {}
                }
            }
        }
    }

    /// Print the closing summary or, in JSON mode, the whole report
    pub fn finish(&self, report: &RunReport, report_path: Option<&Path>) -> serde_json::Result<()> {
        match self.format {
            OutputFormat::Text => {
                println!("{}", "Summary".bold().underline());
                println!("  Mode: {}", report.mode().as_str());
                println!("  Files processed: {}", report.processed());
                println!("  Files changed: {}", report.changed());
                if report.skipped() > 0 {
                    println!("  Files skipped: {}", report.skipped());
                }
                if report.error_count() > 0 {
                    println!("  Errors: {}", report.error_count().to_string().red());
                }
                if let Some(path) = report_path {
                    println!("  Report: {}", path.display());
                }

                if !report.mode().mutates() && report.changed() > 0 {
                    println!();
                    println!("{}", "Run with --apply to write changes".yellow());
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(report)?);
            }
            // Patch-compatible output carries no summary
            OutputFormat::Diff => {}
        }
        Ok(())
    }
}

/// Changed lines only, red for removals and green for additions
fn colored_diff(old: &str, new: &str) -> String {
    let mut out = String::new();
    for change in TextDiff::from_lines(old, new).iter_all_changes() {
        let line = change.value().trim_end_matches(['\n', '\r']);
        match change.tag() {
            ChangeTag::Delete => {
                let _ = writeln!(out, "  {}", format!("- {}", line).red());
            }
            ChangeTag::Insert => {
                let _ = writeln!(out, "  {}", format!("+ {}", line).green());
            }
            ChangeTag::Equal => {}
        }
    }
    out
}

/// Unified diff (`diff -u` compatible)
pub fn unified_diff(path: &Path, old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let path_str = path.display().to_string();

    let mut out = String::new();
    let _ = writeln!(out, "--- a/{}", path_str);
    let _ = writeln!(out, "+++ b/{}", path_str);

    for hunk in diff.unified_diff().context_radius(3).iter_hunks() {
        let _ = writeln!(out, "{}", hunk.header());
        for change in hunk.iter_changes() {
            let sign = match change.tag() {
                ChangeTag::Delete => "-",
                ChangeTag::Insert => "+",
                ChangeTag::Equal => " ",
            };
            // Display already ends the line, even when the source did not
            let _ = write!(out, "{}{}", sign, change);
            if change.missing_newline() {
                out.push_str("\\ No newline at end of file\n");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("text"), Some(OutputFormat::Text));
        assert_eq!(OutputFormat::from_str("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str("diff"), Some(OutputFormat::Diff));
        assert_eq!(OutputFormat::from_str("xml"), None);
    }

    #[test]
    fn test_unified_diff() {
        let diff = unified_diff(
            Path::new("tests/a.ts"),
            "a\nb\nc\n",
            "a\nB\nc\n",
        );
        assert_eq!(
            diff,
            "--- a/tests/a.ts\n+++ b/tests/a.ts\n@@ -1,3 +1,3 @@\n a\n-b\n+B\n c\n"
        );
    }

    #[test]
    fn test_unified_diff_missing_newline() {
        let diff = unified_diff(Path::new("a.ts"), "x", "y");
        assert_eq!(
            diff,
            "--- a/a.ts\n+++ b/a.ts\n@@ -1 +1 @@\n\
             -x\n\\ No newline at end of file\n\
             +y\n\\ No newline at end of file\n"
        );
    }

    #[test]
    fn test_colored_diff_skips_equal_lines() {
        let diff = colored_diff("same\nold\n", "same\nnew\n");
        assert!(!diff.contains("same"));
        assert!(diff.contains("- old"));
        assert!(diff.contains("+ new"));
    }
}
