//! Declarative rule catalogs in YAML
//!
//! # Example catalog
//!
//! ```yaml
//! name: mocks
//! description: Replace trivial jest mocks with plain functions
//! phases:
//!   - name: normalize_mocks
//!     order: 10
//!     rules:
//!       - name: mock_return_true
//!         pattern: 'jest\.fn\(\)\.mockReturnValue\(true\)'
//!         replace: '() => true'
//!         examples:
//!           - input: 'const ready = jest.fn().mockReturnValue(true);'
//!             output: 'const ready = () => true;'
//! ```

pub mod loader;
pub mod schema;

pub use loader::{load_catalog_from_file, load_catalog_from_string, load_catalogs, load_catalogs_from_dir};
pub use schema::{Example, YamlCatalog, YamlPhase, YamlRule};
