//! YAML catalog loader
//!
//! Load catalogs from files, directories, or strings.

use std::fs;
use std::path::{Path, PathBuf};

use super::schema::YamlCatalog;
use crate::error::RuleError;

/// Load a catalog from a string
pub fn load_catalog_from_string(yaml: &str) -> Result<YamlCatalog, RuleError> {
    let catalog: YamlCatalog = serde_yaml::from_str(yaml)?;
    catalog.validate().map_err(RuleError::Validation)?;
    Ok(catalog)
}

/// Load a catalog from a file
pub fn load_catalog_from_file(path: &Path) -> Result<YamlCatalog, RuleError> {
    let content = fs::read_to_string(path)?;
    load_catalog_from_string(&content).map_err(|e| match e {
        RuleError::Validation(msg) => {
            RuleError::Validation(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}

/// Load every `.yaml`/`.yml` catalog below `dir`, in path order
///
/// A catalog that fails to load fails the whole call.
pub fn load_catalogs_from_dir(dir: &Path) -> Result<Vec<YamlCatalog>, RuleError> {
    if !dir.is_dir() {
        return Err(RuleError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Directory not found: {}", dir.display()),
        )));
    }

    let mut paths = Vec::new();
    walk_dir(dir, &mut paths)?;
    paths.sort();

    paths.iter().map(|p| load_catalog_from_file(p)).collect()
}

/// Load a catalog path that may be a single file or a directory
pub fn load_catalogs(path: &Path) -> Result<Vec<YamlCatalog>, RuleError> {
    if path.is_dir() {
        load_catalogs_from_dir(path)
    } else {
        Ok(vec![load_catalog_from_file(path)?])
    }
}

fn walk_dir(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<(), RuleError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();

        if path.is_dir() {
            walk_dir(&path, paths)?;
        } else if let Some(ext) = path.extension() {
            if ext == "yaml" || ext == "yml" {
                paths.push(path);
            }
        }
    }

    Ok(())
}
