//! Backup functionality for safe file modifications
//!
//! Every file is copied under the backup root, mirroring its path relative to
//! the discovery root, before its first write in a run. Restoring copies the
//! backups back over the originals.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Failed to create backup directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to back up {} to {}: {source}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read {} for backup comparison: {source}", path.display())]
    Compare {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Backup {} already exists with different content (set backup.overwrite to replace it)", path.display())]
    Conflict { path: PathBuf },

    #[error("No backup found at {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to restore {} from {}: {source}", to.display(), from.display())]
    Restore {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Backup manager for file modifications
type BackupSlot = Arc<Mutex<Option<PathBuf>>>;

#[derive(Debug)]
pub struct BackupManager {
    /// Root that backed-up paths are made relative to
    root: PathBuf,
    /// Directory to store backups
    backup_dir: PathBuf,
    /// Timestamped session directory
    session_dir: Option<PathBuf>,
    /// Replace prior-run backups whose content differs
    overwrite: bool,
    /// Backups taken in this run, by original path; each slot is locked
    /// only while its own file is copied
    taken: Mutex<HashMap<PathBuf, BackupSlot>>,
}

impl BackupManager {
    /// Create a new backup manager
    pub fn new(root: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            backup_dir: backup_dir.into(),
            session_dir: None,
            overwrite: false,
            taken: Mutex::new(HashMap::new()),
        }
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Start a timestamped session below the backup directory
    ///
    /// Nothing is created on disk until the first backup is taken.
    pub fn init_session(&mut self) {
        let timestamp = chrono::Local::now().format("%Y-%m-%dT%H-%M-%S").to_string();
        self.session_dir = Some(self.backup_dir.join(timestamp));
    }

    /// Directory this run's backups go to
    pub fn backup_root(&self) -> &Path {
        self.session_dir.as_deref().unwrap_or(&self.backup_dir)
    }

    /// Where the backup of `path` lives
    pub fn backup_path_for(&self, path: &Path) -> PathBuf {
        self.backup_root().join(mirrored(&self.root, path))
    }

    /// Backup a file before modification
    ///
    /// Only the first call for a path copies anything; later calls return the
    /// recorded location.
    pub fn backup(&self, path: &Path) -> Result<PathBuf, BackupError> {
        let slot = {
            let mut taken = self.taken.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(taken.entry(path.to_path_buf()).or_default())
        };
        let mut taken = slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = taken.as_ref() {
            return Ok(existing.clone());
        }

        let backup_path = self.backup_path_for(path);

        if backup_path.exists() {
            let compare = |p: &Path| {
                fs::read(p).map_err(|source| BackupError::Compare {
                    path: p.to_path_buf(),
                    source,
                })
            };
            if compare(&backup_path)? == compare(path)? {
                debug!(backup = %backup_path.display(), "reusing identical backup");
                *taken = Some(backup_path.clone());
                return Ok(backup_path);
            }
            if !self.overwrite {
                return Err(BackupError::Conflict { path: backup_path });
            }
        }

        if let Some(parent) = backup_path.parent() {
            fs::create_dir_all(parent).map_err(|source| BackupError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        fs::copy(path, &backup_path).map_err(|source| BackupError::Copy {
            from: path.to_path_buf(),
            to: backup_path.clone(),
            source,
        })?;

        debug!(file = %path.display(), backup = %backup_path.display(), "backed up");
        *taken = Some(backup_path.clone());
        Ok(backup_path)
    }

    /// Restore a file from its backup under `backup_root`
    pub fn restore_file(&self, path: &Path, backup_root: &Path) -> Result<PathBuf, BackupError> {
        let backup_path = backup_root.join(mirrored(&self.root, path));
        if !backup_path.is_file() {
            return Err(BackupError::NotFound { path: backup_path });
        }

        copy_back(&backup_path, path)?;
        Ok(backup_path)
    }

    /// Restore every file found under `backup_root` into the discovery root
    ///
    /// Returns the restored paths in sorted order.
    pub fn restore_all(&self, backup_root: &Path) -> Result<Vec<PathBuf>, BackupError> {
        if !backup_root.is_dir() {
            return Err(BackupError::NotFound {
                path: backup_root.to_path_buf(),
            });
        }

        let mut restored = Vec::new();
        for entry in WalkDir::new(backup_root).sort_by_file_name() {
            let entry = entry.map_err(|e| BackupError::Restore {
                from: e.path().unwrap_or(backup_root).to_path_buf(),
                to: self.root.clone(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry.path().strip_prefix(backup_root).unwrap_or(entry.path());
            let target = self.root.join(relative);
            copy_back(entry.path(), &target)?;
            restored.push(target);
        }

        info!(files = restored.len(), from = %backup_root.display(), "restored backups");
        Ok(restored)
    }

    /// The most recent timestamped session, or the backup directory itself
    pub fn latest_session(&self) -> PathBuf {
        let sessions = fs::read_dir(&self.backup_dir)
            .into_iter()
            .flatten()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter(|e| is_session_name(&e.file_name().to_string_lossy()))
            .map(|e| e.path())
            .max();

        sessions.unwrap_or_else(|| self.backup_dir.clone())
    }
}

fn copy_back(from: &Path, to: &Path) -> Result<(), BackupError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|source| BackupError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::copy(from, to).map_err(|source| BackupError::Restore {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// `YYYY-MM-DDTHH-MM-SS`
fn is_session_name(name: &str) -> bool {
    chrono::NaiveDateTime::parse_from_str(name, "%Y-%m-%dT%H-%M-%S").is_ok()
}

/// Path of `path` inside the backup root
///
/// Paths under `root` keep their root-relative layout; other absolute paths
/// drop their root component.
fn mirrored(root: &Path, path: &Path) -> PathBuf {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter(|c| matches!(c, Component::Normal(_) | Component::ParentDir))
        .map(|c| match c {
            Component::ParentDir => Component::Normal("__parent__".as_ref()),
            other => other,
        })
        .collect()
}
