//! Configuration file support for refit
//!
//! Loads `.refit.toml` from current directory or parent directories.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use refit_core::LinePatch;
use refit_rules::CompactionOptions;

pub const CONFIG_FILE: &str = ".refit.toml";

/// Configuration file structure
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub discover: DiscoverConfig,
    pub backup: BackupConfig,
    pub rules: RulesConfig,
    pub imports: ImportsConfig,
    pub assertions: AssertionsConfig,
    pub report: ReportConfig,
    pub patches: Vec<PatchConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DiscoverConfig {
    /// Directory the include patterns are evaluated from
    pub root: PathBuf,
    /// Glob patterns selecting candidate files (`**` is recursive)
    pub include: Vec<String>,
    /// Glob patterns to exclude from processing
    pub exclude: Vec<String>,
    /// When set, files ending in this suffix are companion artifacts whose
    /// content replaces the file named without the suffix
    pub companion_suffix: Option<String>,
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            include: vec!["tests/**/*.ts".to_string(), "utest/**/*.ts".to_string()],
            exclude: Vec::new(),
            companion_suffix: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Backup root, relative to the discovery root unless absolute
    pub dir: PathBuf,
    /// Put each run's backups in its own timestamped directory
    pub timestamped: bool,
    /// Replace a backup left by an earlier run when its content differs
    pub overwrite: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("backup-before-refit"),
            timestamped: false,
            overwrite: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Built-in catalogs to load; all of them when unset
    pub builtin: Option<Vec<String>>,
    /// Extra YAML catalog files or directories
    pub catalogs: Vec<PathBuf>,
    /// Rules to leave out
    pub disabled: Vec<String>,
    /// Identifiers substituted for `{{identifiers}}` in rule patterns
    pub active_identifiers: Vec<String>,
    /// Re-run the pipeline on its own output; defaults to on in debug builds
    pub self_check: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ImportsConfig {
    pub enabled: bool,
}

impl Default for ImportsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AssertionsConfig {
    pub enabled: bool,
    pub threshold: usize,
    pub keep: usize,
    pub matchers: Vec<String>,
    pub marker: String,
}

impl Default for AssertionsConfig {
    fn default() -> Self {
        let defaults = CompactionOptions::default();
        Self {
            enabled: true,
            threshold: defaults.threshold,
            keep: defaults.keep,
            matchers: defaults.matchers,
            marker: defaults.marker,
        }
    }
}

impl AssertionsConfig {
    pub fn options(&self) -> CompactionOptions {
        CompactionOptions {
            threshold: self.threshold,
            keep: self.keep,
            matchers: self.matchers.clone(),
            marker: self.marker.clone(),
        }
    }
}

/// Report artifact format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Markdown,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<ReportFormat> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Some(ReportFormat::Markdown),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub path: PathBuf,
    pub format: ReportFormat,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("refit-report.md"),
            format: ReportFormat::Markdown,
        }
    }
}

/// One `[[patches]]` entry
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    /// File path relative to the discovery root
    pub file: PathBuf,
    /// 1-based line number in the file as it was before the run
    pub line: usize,
    pub replace: Option<String>,
    pub delete: bool,
    pub rename: Option<RenameConfig>,
    /// Only patch the line if it still contains this text
    pub anchor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenameConfig {
    pub from: String,
    pub to: String,
}

impl PatchConfig {
    /// Build the patch, requiring exactly one action
    pub fn to_patch(&self) -> Result<LinePatch> {
        let location = format!("{}:{}", self.file.display(), self.line);
        let actions =
            self.replace.is_some() as usize + self.delete as usize + self.rename.is_some() as usize;
        if actions != 1 {
            bail!(
                "Patch {} must set exactly one of replace, delete or rename",
                location
            );
        }

        let built = if let Some(text) = &self.replace {
            LinePatch::replace(self.line, text.clone())
        } else if let Some(rename) = &self.rename {
            LinePatch::rename(self.line, rename.from.clone(), rename.to.clone())
        } else {
            LinePatch::delete(self.line)
        };
        let patch = built.with_context(|| format!("Invalid patch {}", location))?;

        Ok(match &self.anchor {
            Some(anchor) => patch.with_anchor(anchor.clone()),
            None => patch,
        })
    }
}

/// Line patches grouped by file, in declaration order
#[derive(Debug, Default)]
pub struct PatchSet {
    by_file: HashMap<PathBuf, Vec<LinePatch>>,
}

impl PatchSet {
    pub fn from_config(patches: &[PatchConfig]) -> Result<Self> {
        let mut by_file: HashMap<PathBuf, Vec<LinePatch>> = HashMap::new();
        for entry in patches {
            by_file
                .entry(normalize(&entry.file))
                .or_default()
                .push(entry.to_patch()?);
        }
        Ok(Self { by_file })
    }

    /// Patches for `relative`, a path relative to the discovery root
    pub fn for_file(&self, relative: &Path) -> &[LinePatch] {
        self.by_file
            .get(&normalize(relative))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_file.values().map(Vec::len).sum()
    }

    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.by_file.keys().map(PathBuf::as_path)
    }
}

/// Drop `.` components so `./tests/a.ts` and `tests/a.ts` compare equal
pub fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, std::path::Component::CurDir))
        .collect()
}

impl Config {
    /// Load config from `.refit.toml` searching from current directory upward
    pub fn load() -> Result<Option<(Config, PathBuf)>> {
        Self::load_from(std::env::current_dir()?)
    }

    /// Load config searching from the given directory upward
    pub fn load_from(start_dir: PathBuf) -> Result<Option<(Config, PathBuf)>> {
        let mut current = Some(start_dir.as_path());

        while let Some(dir) = current {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                let config = Self::load_path(&config_path)?;
                return Ok(Some((config, config_path)));
            }
            current = dir.parent();
        }

        Ok(None)
    }

    /// Load config from a specific path
    pub fn load_path(path: &Path) -> Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Backup root resolved against the discovery root
    pub fn backup_dir(&self) -> PathBuf {
        if self.backup.dir.is_absolute() {
            self.backup.dir.clone()
        } else {
            self.discover.root.join(&self.backup.dir)
        }
    }

    pub fn disabled_rules(&self) -> HashSet<String> {
        self.rules.disabled.iter().cloned().collect()
    }

    pub fn active_identifiers(&self) -> BTreeSet<String> {
        self.rules
            .active_identifiers
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Glob match on the full path or the file name, plus `dir/` prefix patterns
pub fn should_exclude(patterns: &[String], path: &Path) -> bool {
    let path_str = path.to_string_lossy();

    for pattern in patterns {
        if let Ok(glob_pattern) = glob::Pattern::new(pattern) {
            if glob_pattern.matches(&path_str) {
                return true;
            }
            if let Some(file_name) = path.file_name() {
                if glob_pattern.matches(&file_name.to_string_lossy()) {
                    return true;
                }
            }
        }

        if pattern.ends_with('/') {
            let dir_pattern = pattern.trim_end_matches('/');
            if path_str.contains(&format!("/{}/", dir_pattern))
                || path_str.starts_with(&format!("{}/", dir_pattern))
            {
                return true;
            }
        }
    }

    false
}
