//! Error types for rule configuration and transformation

use thiserror::Error;

/// Errors raised while loading or validating rules (configuration time)
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse catalog: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid catalog: {0}")]
    Validation(String),

    #[error("Unknown built-in catalog '{0}'")]
    UnknownCatalog(String),

    #[error("Rule '{rule}' has an invalid pattern: {message}")]
    InvalidPattern { rule: String, message: String },

    #[error("Rule '{rule}' has an invalid replacement template: {message}")]
    InvalidTemplate { rule: String, message: String },

    #[error("Rule '{rule}' has no examples")]
    MissingExamples { rule: String },

    #[error("Rule '{rule}' example {index}: expected {expected:?}, got {actual:?}")]
    ExampleMismatch {
        rule: String,
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("Rule '{rule}' is not idempotent on example {index}: reapplying turned {first:?} into {second:?}")]
    NotIdempotent {
        rule: String,
        index: usize,
        first: String,
        second: String,
    },

    #[error("Rule '{rule}' failed on example {index}: {source}")]
    ExampleFailed {
        rule: String,
        index: usize,
        #[source]
        source: TransformError,
    },

    #[error("Invalid assertion compaction settings: {0}")]
    InvalidCompaction(String),
}

/// Errors raised while transforming a file's content (run time)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("Rule '{rule}' failed while matching: {message}")]
    Matching { rule: String, message: String },

    #[error("Pass '{pass}' is not idempotent: a second run changed its own output near line {line}")]
    Unstable { pass: String, line: usize },
}
