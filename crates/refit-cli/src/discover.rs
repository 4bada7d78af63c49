//! Candidate file discovery
//!
//! Walks the root once and keeps files whose root-relative path matches an
//! include pattern and no exclude pattern. Unreadable directories are
//! reported and skipped.

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use refit_core::{DiscoveryError, FileJob};

use crate::config::should_exclude;

/// `*` stays within one path component, `**` crosses directories
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Search settings for one run
#[derive(Debug, Clone)]
pub struct Discoverer {
    root: PathBuf,
    includes: Vec<Pattern>,
    excludes: Vec<String>,
    companion_suffix: Option<String>,
}

/// Files found by [`Discoverer::discover`], sorted and deduplicated
#[derive(Debug, Default)]
pub struct Discovery {
    pub files: Vec<PathBuf>,
    pub errors: Vec<DiscoveryError>,
}

impl Discoverer {
    pub fn new(root: impl Into<PathBuf>, includes: &[String], excludes: &[String]) -> Result<Self> {
        let includes = includes
            .iter()
            .map(|p| {
                Pattern::new(p).with_context(|| format!("Invalid include pattern '{}'", p))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            root: root.into(),
            includes,
            excludes: excludes.to_vec(),
            companion_suffix: None,
        })
    }

    /// Look for companion artifacts carrying `suffix` instead of the files themselves
    pub fn with_companion_suffix(mut self, suffix: Option<String>) -> Self {
        self.companion_suffix = suffix.filter(|s| !s.is_empty());
        self
    }

    /// Walk the root; never fails, errors are collected
    pub fn discover(&self) -> Discovery {
        let mut files = BTreeSet::new();
        let mut errors = Vec::new();

        let walker = WalkDir::new(&self.root).follow_links(false).into_iter();
        let walker = walker.filter_entry(|entry| {
            entry.depth() == 0 || !self.is_excluded(self.relative(entry.path()))
        });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let error = DiscoveryError {
                        path: err.path().unwrap_or(self.root.as_path()).to_path_buf(),
                        message: err
                            .io_error()
                            .map(|e| e.to_string())
                            .unwrap_or_else(|| err.to_string()),
                    };
                    warn!("{}", error);
                    errors.push(error);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let relative = self.relative(entry.path());
            let Some(candidate) = self.candidate(relative) else {
                continue;
            };
            if self.includes.iter().any(|p| p.matches_path_with(&candidate, MATCH_OPTIONS)) {
                files.insert(self.under_root(relative));
            }
        }

        debug!(
            root = %self.root.display(),
            files = files.len(),
            errors = errors.len(),
            "discovery finished"
        );

        Discovery {
            files: files.into_iter().collect(),
            errors,
        }
    }

    /// Path relative to the root
    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }

    /// The path includes are matched against: the file itself, or the
    /// target of a companion artifact
    fn candidate(&self, relative: &Path) -> Option<PathBuf> {
        match &self.companion_suffix {
            None => Some(relative.to_path_buf()),
            Some(suffix) => companion_target(relative, suffix),
        }
    }

    fn is_excluded(&self, relative: &Path) -> bool {
        !relative.as_os_str().is_empty() && should_exclude(&self.excludes, relative)
    }

    /// `root/relative`, without a leading `./` when the root is `.`
    fn under_root(&self, relative: &Path) -> PathBuf {
        if self.root == Path::new(".") {
            relative.to_path_buf()
        } else {
            self.root.join(relative)
        }
    }
}

impl Discovery {
    /// One job per file; companion artifacts target the file named without `suffix`
    pub fn into_jobs(self, companion_suffix: Option<&str>) -> (Vec<FileJob>, Vec<DiscoveryError>) {
        let suffix = companion_suffix.filter(|s| !s.is_empty());
        let jobs = self
            .files
            .into_iter()
            .map(|file| match suffix.and_then(|s| companion_target(&file, s)) {
                Some(target) => FileJob::from_companion(file, target),
                None => FileJob::new(file),
            })
            .collect();
        (jobs, self.errors)
    }
}

/// `a/x.ts.optimized` with suffix `.optimized` targets `a/x.ts`
pub fn companion_target(path: &Path, suffix: &str) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let target = name.strip_suffix(suffix)?;
    if target.is_empty() {
        return None;
    }
    Some(path.with_file_name(target))
}
