//! A single pattern rule: global substitution with capture interpolation

use fancy_regex::{Expander, Regex};
use std::collections::BTreeSet;

use crate::error::{RuleError, TransformError};

/// Placeholder expanded to the configured active identifiers
pub const IDENTIFIERS_PLACEHOLDER: &str = "{{identifiers}}";

/// Position of a rule in the engine
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhaseId {
    /// Phases run in ascending order
    pub order: u32,
    pub name: String,
}

impl PhaseId {
    pub fn new(order: u32, name: impl Into<String>) -> Self {
        Self {
            order,
            name: name.into(),
        }
    }
}

/// An immutable rewrite rule
///
/// The replacement is a template: `$1`, `${1}` and `${name}` refer to capture
/// groups, `$$` is a literal dollar sign.
#[derive(Debug)]
pub struct TransformationRule {
    name: String,
    description: String,
    phase: PhaseId,
    pattern: Regex,
    replacement: String,
}

impl TransformationRule {
    /// Compile a rule, validating the pattern and the replacement template
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        replacement: impl Into<String>,
        phase: PhaseId,
    ) -> Result<Self, RuleError> {
        let name = name.into();
        let replacement = replacement.into();

        let pattern = Regex::new(pattern).map_err(|e| RuleError::InvalidPattern {
            rule: name.clone(),
            message: e.to_string(),
        })?;

        Expander::default()
            .check(&replacement, &pattern)
            .map_err(|e| RuleError::InvalidTemplate {
                rule: name.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            name,
            description: String::new(),
            phase,
            pattern,
            replacement,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn phase(&self) -> &PhaseId {
        &self.phase
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    /// Replace every match of the pattern in `content`
    pub fn apply(&self, content: &str) -> Result<String, TransformError> {
        let expander = Expander::default();
        let mut out = String::with_capacity(content.len());
        let mut last = 0;

        for caps in self.pattern.captures_iter(content) {
            let caps = caps.map_err(|e| TransformError::Matching {
                rule: self.name.clone(),
                message: e.to_string(),
            })?;
            let Some(whole) = caps.get(0) else {
                continue;
            };

            out.push_str(&content[last..whole.start()]);
            expander.append_expansion(&mut out, &self.replacement, &caps);
            last = whole.end();
        }

        if last == 0 && out.is_empty() {
            return Ok(content.to_string());
        }

        out.push_str(&content[last..]);
        Ok(out)
    }
}

/// True when `pattern` uses the active-identifier placeholder
pub fn uses_identifiers(pattern: &str) -> bool {
    pattern.contains(IDENTIFIERS_PLACEHOLDER)
}

/// Expand the identifier placeholder into an escaped alternation
///
/// Returns `None` when the pattern needs identifiers but none are active;
/// such a rule has nothing to act on.
pub fn expand_identifiers(pattern: &str, identifiers: &BTreeSet<String>) -> Option<String> {
    if !uses_identifiers(pattern) {
        return Some(pattern.to_string());
    }
    if identifiers.is_empty() {
        return None;
    }

    let alternation = identifiers
        .iter()
        .map(|ident| fancy_regex::escape(ident).into_owned())
        .collect::<Vec<_>>()
        .join("|");

    Some(pattern.replace(IDENTIFIERS_PLACEHOLDER, &format!("(?:{})", alternation)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str, replacement: &str) -> TransformationRule {
        TransformationRule::new("test", pattern, replacement, PhaseId::new(1, "test")).unwrap()
    }

    #[test]
    fn test_literal_substitution() {
        let r = rule(r"jest\.fn\(\)\.mockReturnValue\(true\)", "() => true");
        assert_eq!(
            r.apply("const f = jest.fn().mockReturnValue(true);").unwrap(),
            "const f = () => true;"
        );
    }

    #[test]
    fn test_capture_interpolation() {
        let r = rule(r"jest\.fn\(\)\.mockReturnValue\((\d+)\)", "() => ${1}");
        assert_eq!(
            r.apply("a(jest.fn().mockReturnValue(42), jest.fn().mockReturnValue(7))")
                .unwrap(),
            "a(() => 42, () => 7)"
        );
    }

    #[test]
    fn test_no_match_returns_input() {
        let r = rule(r"never", "x");
        assert_eq!(r.apply("unchanged").unwrap(), "unchanged");
    }

    #[test]
    fn test_match_at_start_with_empty_replacement() {
        let r = rule(r"^drop;", "");
        assert_eq!(r.apply("drop;keep").unwrap(), "keep");
        assert_eq!(r.apply("drop;").unwrap(), "");
    }

    #[test]
    fn test_lookbehind_guard() {
        let r = rule(r"(?<![\w.])session\.", "_session.");
        let once = r.apply("session.id; this.session.id; _session.id").unwrap();
        assert_eq!(once, "_session.id; this.session.id; _session.id");
        assert_eq!(r.apply(&once).unwrap(), once);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = TransformationRule::new("bad", "(unclosed", "", PhaseId::new(1, "p"));
        assert!(matches!(err, Err(RuleError::InvalidPattern { .. })));
    }

    #[test]
    fn test_invalid_template_rejected() {
        let err = TransformationRule::new("bad", r"(\d+)", "${2}", PhaseId::new(1, "p"));
        assert!(matches!(err, Err(RuleError::InvalidTemplate { .. })));
    }

    #[test]
    fn test_expand_identifiers() {
        let ids: BTreeSet<String> = ["session", "error"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            expand_identifiers(r"catch \(({{identifiers}})\)", &ids).unwrap(),
            r"catch \(((?:error|session))\)"
        );
        assert_eq!(expand_identifiers("plain", &BTreeSet::new()).unwrap(), "plain");
        assert!(expand_identifiers("{{identifiers}}", &BTreeSet::new()).is_none());
    }

    #[test]
    fn test_identifiers_are_escaped() {
        let ids: BTreeSet<String> = ["$scope".to_string()].into_iter().collect();
        let expanded = expand_identifiers(r"\b{{identifiers}}\b", &ids).unwrap();
        assert!(expanded.contains(r"\$scope"));
    }
}
