//! Error kinds shared by the discovery and run loop

use std::path::PathBuf;
use thiserror::Error;

/// A part of the tree could not be searched; the rest of the run continues
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Discovery failed at {}: {message}", path.display())]
pub struct DiscoveryError {
    pub path: PathBuf,
    pub message: String,
}

/// A companion artifact exists but the file it targets does not
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Missing counterpart for {}: {} does not exist", companion.display(), target.display())]
pub struct MissingCounterpartError {
    pub companion: PathBuf,
    pub target: PathBuf,
}
