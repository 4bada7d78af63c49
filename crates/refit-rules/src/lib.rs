//! refit-rules: Content passes for refit
//!
//! Available passes:
//! - rule_engine: Phased regex rules loaded from YAML catalogs
//! - import_dedup: Merge repeated named imports of one module
//! - assertion_compaction: Shorten long runs of trivial existence assertions
//!
//! Built-in catalogs:
//! - mocks: jest mocks that return literals become arrow functions
//! - hooks: empty beforeEach/afterEach/beforeAll/afterAll are removed
//! - event-handlers: DOM handler parameters get their specific event type
//! - unused-identifiers: active identifiers get an underscore prefix
//! - whitespace: trailing spaces and tabs are stripped

pub mod assertions;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod imports;
pub mod pipeline;
pub mod registry;
pub mod rule;

pub use assertions::{AssertionCompactor, CompactionOptions};
pub use catalog::{load_catalog_from_file, load_catalog_from_string, load_catalogs, YamlCatalog};
pub use engine::{Phase, RuleEngine};
pub use error::{RuleError, TransformError};
pub use imports::{ImportDeduplicator, ImportGroup, ImportGroups};
pub use pipeline::{Pass, Pipeline};
pub use registry::{builtin_names, list_rules, load_builtin, load_builtins, RuleInfo};
pub use rule::{PhaseId, TransformationRule};
