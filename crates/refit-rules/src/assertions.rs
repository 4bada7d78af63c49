//! Compaction of long runs of trivial existence assertions

use regex::Regex;
use tracing::debug;

use refit_core::{join_lines, split_lines};

use crate::error::{RuleError, TransformError};
use crate::pipeline::Pass;

/// Settings for [`AssertionCompactor`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionOptions {
    /// Runs longer than this are compacted
    pub threshold: usize,
    /// Assertions kept from the start of a compacted run
    pub keep: usize,
    /// Zero-argument matchers that make an assertion trivial
    pub matchers: Vec<String>,
    /// Comment inserted in front of a compacted run
    pub marker: String,
}

impl Default for CompactionOptions {
    fn default() -> Self {
        Self {
            threshold: 3,
            keep: 3,
            matchers: vec!["toBeDefined".to_string()],
            marker: "// verify object existence".to_string(),
        }
    }
}

impl CompactionOptions {
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.keep == 0 {
            return Err(RuleError::InvalidCompaction(
                "keep must be at least 1".to_string(),
            ));
        }
        if self.keep > self.threshold {
            return Err(RuleError::InvalidCompaction(format!(
                "keep ({}) must not exceed threshold ({})",
                self.keep, self.threshold
            )));
        }
        if self.matchers.iter().all(|m| m.trim().is_empty()) {
            return Err(RuleError::InvalidCompaction(
                "at least one matcher is required".to_string(),
            ));
        }
        if self.marker.trim().is_empty() || self.marker.contains('\n') {
            return Err(RuleError::InvalidCompaction(
                "marker must be a single non-empty line".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pass that shortens runs of `expect(name).toBeDefined()` lines
#[derive(Debug)]
pub struct AssertionCompactor {
    options: CompactionOptions,
    trivial: Regex,
}

impl AssertionCompactor {
    pub fn new(options: CompactionOptions) -> Result<Self, RuleError> {
        options.validate()?;

        let matchers = options
            .matchers
            .iter()
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join("|");

        let pattern = format!(
            r"^(?P<indent>[ \t]*)expect\(\s*[A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*|\[\d+\])*\s*\)\.(?:{})\(\s*\);?[ \t]*\r?$",
            matchers
        );
        let trivial = Regex::new(&pattern)
            .map_err(|e| RuleError::InvalidCompaction(format!("bad matcher: {}", e)))?;

        Ok(Self { options, trivial })
    }

    pub fn options(&self) -> &CompactionOptions {
        &self.options
    }

    /// True when `line` is a trivial assertion
    pub fn is_trivial(&self, line: &str) -> bool {
        self.trivial.is_match(line)
    }

    /// Compact every run in `content`
    pub fn compact(&self, content: &str) -> String {
        let lines = split_lines(content);
        let mut out: Vec<String> = Vec::with_capacity(lines.len());
        let mut compacted = 0usize;
        let mut i = 0;

        while i < lines.len() {
            if !self.is_trivial(&lines[i]) {
                out.push(lines[i].clone());
                i += 1;
                continue;
            }

            let start = i;
            while i < lines.len() && self.is_trivial(&lines[i]) {
                i += 1;
            }
            let run = &lines[start..i];

            if run.len() <= self.options.threshold {
                out.extend(run.iter().cloned());
                continue;
            }

            let already_marked = out
                .last()
                .is_some_and(|prev| prev.trim() == self.options.marker.trim());
            if !already_marked {
                out.push(self.marker_for(&run[0]));
            }
            out.extend(run.iter().take(self.options.keep).cloned());
            compacted += 1;
        }

        if compacted == 0 {
            return content.to_string();
        }

        debug!(runs = compacted, "compacted trivial assertion runs");
        join_lines(&out)
    }

    /// Marker line with the indentation and line ending of `first`
    fn marker_for(&self, first: &str) -> String {
        let indent: String = first
            .chars()
            .take_while(|c| *c == ' ' || *c == '\t')
            .collect();
        let cr = if first.ends_with('\r') { "\r" } else { "" };
        format!("{}{}{}", indent, self.options.marker, cr)
    }
}

impl Pass for AssertionCompactor {
    fn name(&self) -> &str {
        "assertion_compaction"
    }

    fn description(&self) -> &str {
        "Shorten long runs of trivial existence assertions"
    }

    fn apply(&self, content: &str) -> Result<String, TransformError> {
        Ok(self.compact(content))
    }
}
