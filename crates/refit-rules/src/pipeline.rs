//! Ordered content passes and the idempotence self-check

use tracing::warn;

use crate::error::TransformError;
use crate::engine::RuleEngine;

/// A whole-file text transformation
pub trait Pass: Send + Sync {
    /// The unique identifier for this pass (e.g., "rule_engine")
    fn name(&self) -> &str;

    /// A short description of what this pass does
    fn description(&self) -> &str;

    /// Transform `content`; an unchanged input is returned as-is
    fn apply(&self, content: &str) -> Result<String, TransformError>;
}

impl Pass for RuleEngine {
    fn name(&self) -> &str {
        "rule_engine"
    }

    fn description(&self) -> &str {
        "Phased pattern rules from the loaded catalogs"
    }

    fn apply(&self, content: &str) -> Result<String, TransformError> {
        RuleEngine::apply(self, content)
    }
}

/// Passes applied one after another to each file
pub struct Pipeline {
    passes: Vec<Box<dyn Pass>>,
    self_check: bool,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// An empty pipeline; self-checking defaults to on in debug builds
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            self_check: cfg!(debug_assertions),
        }
    }

    pub fn with_pass(mut self, pass: impl Pass + 'static) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    /// Re-run the pipeline on its own output and fail if anything changes
    pub fn self_check(mut self, enabled: bool) -> Self {
        self.self_check = enabled;
        self
    }

    pub fn passes(&self) -> impl Iterator<Item = &dyn Pass> {
        self.passes.iter().map(|p| p.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn run(&self, content: &str) -> Result<String, TransformError> {
        let output = self.run_once(content)?;

        if self.self_check {
            self.check_stable(&output)?;
        }

        Ok(output)
    }

    fn run_once(&self, content: &str) -> Result<String, TransformError> {
        let mut current = content.to_string();
        for pass in &self.passes {
            current = pass.apply(&current)?;
        }
        Ok(current)
    }

    /// Every pass must leave the finished output alone
    fn check_stable(&self, output: &str) -> Result<(), TransformError> {
        let mut current = output.to_string();

        for pass in &self.passes {
            let next = pass.apply(&current)?;
            if next != current {
                let line = first_difference(&current, &next);
                warn!(pass = pass.name(), line, "pass changed its own output");
                return Err(TransformError::Unstable {
                    pass: pass.name().to_string(),
                    line,
                });
            }
            current = next;
        }

        Ok(())
    }
}

/// 1-based line of the first difference between `a` and `b`
fn first_difference(a: &str, b: &str) -> usize {
    let mut a_lines = a.split('\n');
    let mut b_lines = b.split('\n');
    let mut line = 1;

    loop {
        match (a_lines.next(), b_lines.next()) {
            (Some(x), Some(y)) if x == y => line += 1,
            _ => return line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertions::{AssertionCompactor, CompactionOptions};
    use crate::imports::ImportDeduplicator;
    use crate::rule::{PhaseId, TransformationRule};

    struct Appender;

    impl Pass for Appender {
        fn name(&self) -> &str {
            "appender"
        }

        fn description(&self) -> &str {
            "Appends a line on every run"
        }

        fn apply(&self, content: &str) -> Result<String, TransformError> {
            Ok(format!("{}// again\n", content))
        }
    }

    fn engine() -> RuleEngine {
        RuleEngine::new(vec![TransformationRule::new(
            "mock_true",
            r"jest\.fn\(\)\.mockReturnValue\(true\)",
            "() => true",
            PhaseId::new(10, "normalize_mocks"),
        )
        .unwrap()])
    }

    #[test]
    fn test_passes_run_in_order() {
        let pipeline = Pipeline::new()
            .with_pass(engine())
            .with_pass(ImportDeduplicator::new())
            .with_pass(AssertionCompactor::new(CompactionOptions::default()).unwrap())
            .self_check(true);

        let input = "import { a } from 'x';\nimport { b } from 'x';\nconst f = jest.fn().mockReturnValue(true);\n";
        assert_eq!(
            pipeline.run(input).unwrap(),
            "import { a, b } from 'x';\nconst f = () => true;\n"
        );

        let names: Vec<_> = pipeline.passes().map(|p| p.name()).collect();
        assert_eq!(names, ["rule_engine", "import_dedup", "assertion_compaction"]);
    }

    #[test]
    fn test_empty_pipeline_is_identity() {
        let pipeline = Pipeline::new().self_check(true);
        assert!(pipeline.is_empty());
        assert_eq!(pipeline.run("x\n").unwrap(), "x\n");
    }

    #[test]
    fn test_self_check_reports_unstable_pass() {
        let pipeline = Pipeline::new().with_pass(Appender).self_check(true);
        let err = pipeline.run("a\nb\n").unwrap_err();
        assert_eq!(
            err,
            TransformError::Unstable {
                pass: "appender".to_string(),
                line: 4,
            }
        );
    }

    #[test]
    fn test_self_check_disabled() {
        let pipeline = Pipeline::new().with_pass(Appender).self_check(false);
        assert_eq!(pipeline.run("a\n").unwrap(), "a\n// again\n");
    }

    #[test]
    fn test_first_difference() {
        assert_eq!(first_difference("a\nb\nc", "a\nx\nc"), 2);
        assert_eq!(first_difference("a", "a\nb"), 2);
        assert_eq!(first_difference("x", "y"), 1);
    }
}
