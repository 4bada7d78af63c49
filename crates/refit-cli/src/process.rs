//! Per-file processing for refit
//!
//! A job reads its source, applies line patches against the pre-run
//! numbering, runs the pass pipeline and, in apply mode, backs up and
//! rewrites the target. Failures stay inside the job.

use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use refit_core::{
    apply_patches, join_lines, split_lines, FileJob, MissingCounterpartError, RunMode,
};
use refit_rules::{Pipeline, TransformError};

use crate::backup::{BackupError, BackupManager};
use crate::config::PatchSet;

/// Everything that can go wrong with a single file
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to remove companion {}: {source}", path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Shared, read-only state for every job of a run
pub struct RunContext<'a> {
    pub mode: RunMode,
    /// Discovery root; patch paths are relative to it
    pub root: &'a Path,
    pub pipeline: &'a Pipeline,
    pub patches: &'a PatchSet,
    pub backups: &'a BackupManager,
}

/// A finished job plus what the target held before the run
pub struct Processed {
    pub job: FileJob,
    /// Content of the target before the run, when it could be read
    pub before: Option<String>,
}

impl Processed {
    pub fn after(&self) -> Option<&str> {
        self.job.transformed_content.as_deref()
    }
}

/// Process all jobs in parallel; results keep the input order
pub fn run_jobs(ctx: &RunContext<'_>, jobs: Vec<FileJob>) -> Vec<Processed> {
    jobs.into_par_iter()
        .map(|job| process_job(ctx, job))
        .collect()
}

/// Process a single job; never panics on I/O, failures are recorded on the job
pub fn process_job(ctx: &RunContext<'_>, mut job: FileJob) -> Processed {
    match run_job(ctx, &mut job) {
        Ok(before) => Processed { job, before },
        Err(e) => {
            warn!(file = %job.path.display(), "{}", e);
            job.fail(e.to_string());
            Processed { job, before: None }
        }
    }
}

fn run_job(ctx: &RunContext<'_>, job: &mut FileJob) -> Result<Option<String>, JobError> {
    if let Some(companion) = job.companion() {
        if !job.path.exists() {
            let missing = MissingCounterpartError {
                companion: companion.to_path_buf(),
                target: job.path.clone(),
            };
            warn!("{}", missing);
            job.skip(missing.to_string());
            return Ok(None);
        }
    }

    let source = read(&job.source_path)?;
    job.original_lines = split_lines(&source);

    let relative = job.path.strip_prefix(ctx.root).unwrap_or(&job.path);
    let outcome = apply_patches(&job.original_lines, ctx.patches.for_file(relative));
    if !outcome.stale.is_empty() {
        warn!(
            file = %job.path.display(),
            lines = ?outcome.stale,
            "ignoring stale line patches"
        );
    }
    job.stale_patches = outcome.stale;

    let transformed = ctx.pipeline.run(&join_lines(&outcome.lines))?;

    let before = if job.is_companion() {
        read(&job.path)?
    } else {
        source
    };
    let changed = transformed != before;

    if ctx.mode.mutates() {
        if changed {
            job.backup_path = Some(ctx.backups.backup(&job.path)?);
            write_atomic(&job.path, &transformed)?;
            debug!(file = %job.path.display(), "rewritten");
        }
        if let Some(companion) = job.companion() {
            fs::remove_file(companion).map_err(|source| JobError::Cleanup {
                path: companion.to_path_buf(),
                source,
            })?;
        }
    }

    job.transformed_content = Some(transformed);
    job.succeed(changed);
    Ok(Some(before))
}

fn read(path: &Path) -> Result<String, JobError> {
    fs::read_to_string(path).map_err(|source| JobError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Write through a sibling temp file so the target is replaced in one rename
///
/// The target's permission bits carry over to the new file.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), JobError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{}.refit-tmp", file_name));
    let permissions = fs::metadata(path).ok().map(|m| m.permissions());

    let result = fs::write(&temp, content)
        .and_then(|_| match permissions {
            Some(permissions) => fs::set_permissions(&temp, permissions),
            None => Ok(()),
        })
        .and_then(|_| fs::rename(&temp, path));
    if let Err(source) = result {
        let _ = fs::remove_file(&temp);
        return Err(JobError::Write {
            path: path.to_path_buf(),
            source,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use refit_core::{line_count, JobStatus};
    use refit_rules::{ImportDeduplicator, PhaseId, RuleEngine, TransformationRule};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    use crate::config::PatchConfig;

    struct Fixture {
        temp: TempDir,
        pipeline: Pipeline,
        patches: PatchSet,
        backups: BackupManager,
    }

    impl Fixture {
        fn new(patches: Vec<PatchConfig>) -> Self {
            let temp = TempDir::new().unwrap();
            let engine = RuleEngine::new(vec![TransformationRule::new(
                "mock_true",
                r"jest\.fn\(\)\.mockReturnValue\(true\)",
                "() => true",
                PhaseId::new(10, "normalize_mocks"),
            )
            .unwrap()]);
            let pipeline = Pipeline::new()
                .with_pass(engine)
                .with_pass(ImportDeduplicator::new())
                .self_check(true);
            let backups = BackupManager::new(temp.path(), temp.path().join("backup-before-refit"));

            Self {
                temp,
                pipeline,
                patches: PatchSet::from_config(&patches).unwrap(),
                backups,
            }
        }

        fn ctx(&self, mode: RunMode) -> RunContext<'_> {
            RunContext {
                mode,
                root: self.temp.path(),
                pipeline: &self.pipeline,
                patches: &self.patches,
                backups: &self.backups,
            }
        }

        fn write(&self, relative: &str, content: &str) -> PathBuf {
            let path = self.temp.path().join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            path
        }

        /// Every file under the temp dir with its bytes
        fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
            walkdir::WalkDir::new(self.temp.path())
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| (e.path().to_path_buf(), fs::read(e.path()).unwrap()))
                .collect()
        }
    }

    const MOCKED: &str = "const f = jest.fn().mockReturnValue(true);\n";

    #[test]
    fn test_dry_run_changes_nothing_on_disk() {
        let fx = Fixture::new(vec![]);
        let path = fx.write("tests/a.ts", MOCKED);
        let before = fx.snapshot();

        let processed = process_job(&fx.ctx(RunMode::DryRun), FileJob::new(&path));

        assert_eq!(processed.job.status, JobStatus::Success);
        assert!(processed.job.changed);
        assert_eq!(processed.after(), Some("const f = () => true;\n"));
        assert_eq!(processed.before.as_deref(), Some(MOCKED));
        assert!(processed.job.backup_path.is_none());
        assert_eq!(fx.snapshot(), before);
    }

    #[test]
    fn test_apply_backs_up_then_writes() {
        let fx = Fixture::new(vec![]);
        let path = fx.write("tests/a.ts", MOCKED);

        let processed = process_job(&fx.ctx(RunMode::Apply), FileJob::new(&path));

        assert_eq!(processed.job.status, JobStatus::Success);
        let backup = processed.job.backup_path.unwrap();
        assert_eq!(backup, fx.temp.path().join("backup-before-refit/tests/a.ts"));
        assert_eq!(fs::read_to_string(backup).unwrap(), MOCKED);
        assert_eq!(fs::read_to_string(&path).unwrap(), "const f = () => true;\n");
        assert!(!fx.temp.path().join("tests/.a.ts.refit-tmp").exists());
    }

    #[test]
    fn test_unchanged_file_is_not_backed_up() {
        let fx = Fixture::new(vec![]);
        let path = fx.write("tests/a.ts", "const f = () => true;\n");

        let processed = process_job(&fx.ctx(RunMode::Apply), FileJob::new(&path));

        assert_eq!(processed.job.status, JobStatus::Success);
        assert!(!processed.job.changed);
        assert!(processed.job.backup_path.is_none());
        assert!(!fx.temp.path().join("backup-before-refit").exists());
    }

    #[test]
    fn test_patches_use_original_numbering() {
        let fx = Fixture::new(vec![
            PatchConfig {
                file: PathBuf::from("tests/a.ts"),
                line: 1,
                delete: true,
                ..Default::default()
            },
            PatchConfig {
                file: PathBuf::from("tests/a.ts"),
                line: 3,
                replace: Some("    } catch (_error) {".to_string()),
                ..Default::default()
            },
            PatchConfig {
                file: PathBuf::from("tests/a.ts"),
                line: 500,
                replace: Some("unreachable".to_string()),
                ..Default::default()
            },
        ]);
        let path = fx.write(
            "tests/a.ts",
            "// obsolete\n    try { run(); }\n    } catch (error) {\n    }\n",
        );

        let processed = process_job(&fx.ctx(RunMode::DryRun), FileJob::new(&path));

        assert_eq!(
            processed.after(),
            Some("\n    try { run(); }\n    } catch (_error) {\n    }\n")
        );
        assert_eq!(processed.job.stale_patches, vec![500]);
        assert_eq!(line_count(&processed.job.original_lines), 4);
    }

    #[test]
    fn test_patch_past_final_newline_is_stale() {
        let fx = Fixture::new(vec![PatchConfig {
            file: PathBuf::from("tests/long.ts"),
            line: 301,
            replace: Some("INJECTED".to_string()),
            ..Default::default()
        }]);
        let source: String = (1..=300).map(|i| format!("line {}\n", i)).collect();
        let path = fx.write("tests/long.ts", &source);

        let processed = process_job(&fx.ctx(RunMode::Apply), FileJob::new(&path));

        assert_eq!(processed.job.status, JobStatus::Success);
        assert!(!processed.job.changed);
        assert_eq!(processed.job.stale_patches, vec![301]);
        assert_eq!(fs::read_to_string(&path).unwrap(), source);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let fx = Fixture::new(vec![]);
        let path = fx.write("tests/run.ts", "old\n");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        write_atomic(&path, "new\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o755);
    }

    #[test]
    fn test_read_failure_is_a_job_error() {
        let fx = Fixture::new(vec![]);
        let path = fx.temp.path().join("tests/missing.ts");

        let processed = process_job(&fx.ctx(RunMode::Apply), FileJob::new(&path));

        assert_eq!(processed.job.status, JobStatus::Error);
        assert!(processed.after().is_none());
        assert!(processed.job.error.as_deref().unwrap().contains("Failed to read"));
    }

    #[test]
    fn test_backup_conflict_leaves_file_untouched() {
        let fx = Fixture::new(vec![]);
        let path = fx.write("tests/a.ts", MOCKED);
        fx.write("backup-before-refit/tests/a.ts", "from an older run\n");

        let processed = process_job(&fx.ctx(RunMode::Apply), FileJob::new(&path));

        assert_eq!(processed.job.status, JobStatus::Error);
        assert!(processed.job.error.unwrap().contains("already exists"));
        assert_eq!(fs::read_to_string(&path).unwrap(), MOCKED);
    }

    #[test]
    fn test_companion_missing_counterpart_is_skipped() {
        let fx = Fixture::new(vec![]);
        let companion = fx.write("tests/a.ts.optimized", MOCKED);
        let target = fx.temp.path().join("tests/a.ts");
        let before = fx.snapshot();

        let processed = process_job(
            &fx.ctx(RunMode::Apply),
            FileJob::from_companion(&companion, &target),
        );

        assert_eq!(processed.job.status, JobStatus::Skipped);
        assert!(processed.job.note.unwrap().contains("Missing counterpart"));
        assert_eq!(fx.snapshot(), before);
    }

    #[test]
    fn test_companion_apply_replaces_target_and_cleans_up() {
        let fx = Fixture::new(vec![]);
        let target = fx.write("tests/a.ts", "const f = 1;\n");
        let companion = fx.write("tests/a.ts.optimized", MOCKED);

        let processed = process_job(
            &fx.ctx(RunMode::Apply),
            FileJob::from_companion(&companion, &target),
        );

        assert_eq!(processed.job.status, JobStatus::Success);
        assert_eq!(processed.before.as_deref(), Some("const f = 1;\n"));
        assert_eq!(fs::read_to_string(&target).unwrap(), "const f = () => true;\n");
        assert_eq!(
            fs::read_to_string(fx.temp.path().join("backup-before-refit/tests/a.ts")).unwrap(),
            "const f = 1;\n"
        );
        assert!(!companion.exists());
    }

    #[test]
    fn test_companion_dry_run_keeps_companion() {
        let fx = Fixture::new(vec![]);
        let target = fx.write("tests/a.ts", "const f = 1;\n");
        let companion = fx.write("tests/a.ts.optimized", MOCKED);

        let processed = process_job(
            &fx.ctx(RunMode::DryRun),
            FileJob::from_companion(&companion, &target),
        );

        assert!(processed.job.changed);
        assert!(companion.exists());
        assert_eq!(fs::read_to_string(&target).unwrap(), "const f = 1;\n");
    }

    #[test]
    fn test_run_jobs_keeps_order_and_isolates_failures() {
        let fx = Fixture::new(vec![]);
        let a = fx.write("tests/a.ts", MOCKED);
        let missing = fx.temp.path().join("tests/b.ts");
        let c = fx.write("tests/c.ts", "plain\n");

        let results = run_jobs(
            &fx.ctx(RunMode::Apply),
            vec![FileJob::new(&a), FileJob::new(&missing), FileJob::new(&c)],
        );

        let statuses: Vec<_> = results.iter().map(|p| p.job.status).collect();
        assert_eq!(statuses, [JobStatus::Success, JobStatus::Error, JobStatus::Success]);
        assert_eq!(results[0].job.path, a);
        assert_eq!(fs::read_to_string(&a).unwrap(), "const f = () => true;\n");
    }

    #[test]
    fn test_second_apply_is_a_noop() {
        let fx = Fixture::new(vec![]);
        let path = fx.write("tests/a.ts", MOCKED);

        process_job(&fx.ctx(RunMode::Apply), FileJob::new(&path));
        let after_first = fx.snapshot();

        let second = process_job(&fx.ctx(RunMode::Apply), FileJob::new(&path));
        assert!(!second.job.changed);
        assert_eq!(fx.snapshot(), after_first);
    }
}
