//! Phased rule engine
//!
//! Rules run phase by phase in ascending phase order, and in declaration order
//! within a phase. The output of one phase is the only input of the next.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::catalog::{YamlCatalog, YamlRule};
use crate::error::{RuleError, TransformError};
use crate::rule::{expand_identifiers, uses_identifiers, PhaseId, TransformationRule};

/// Rules that share a phase
#[derive(Debug)]
pub struct Phase {
    id: PhaseId,
    rules: Vec<Arc<TransformationRule>>,
}

impl Phase {
    pub fn id(&self) -> &PhaseId {
        &self.id
    }

    pub fn rules(&self) -> &[Arc<TransformationRule>] {
        &self.rules
    }
}

/// An ordered, immutable set of rules
#[derive(Debug, Default)]
pub struct RuleEngine {
    phases: Vec<Phase>,
}

impl RuleEngine {
    /// Group `rules` into phases ordered by phase order
    ///
    /// The sort is stable, so rules of equal order keep their declaration order.
    pub fn new(rules: Vec<TransformationRule>) -> Self {
        let mut rules = rules;
        rules.sort_by_key(|r| r.phase().order);

        let mut phases: Vec<Phase> = Vec::new();
        for rule in rules {
            match phases.iter_mut().find(|p| &p.id == rule.phase()) {
                Some(phase) => phase.rules.push(Arc::new(rule)),
                None => phases.push(Phase {
                    id: rule.phase().clone(),
                    rules: vec![Arc::new(rule)],
                }),
            }
        }

        Self { phases }
    }

    /// Compile and verify every rule of `catalogs`
    ///
    /// Rules named in `disabled` are left out without being verified, so a
    /// broken rule can be switched off. Rules that reference
    /// `{{identifiers}}` are left out when `identifiers` is empty.
    pub fn from_catalogs(
        catalogs: &[YamlCatalog],
        disabled: &HashSet<String>,
        identifiers: &BTreeSet<String>,
    ) -> Result<Self, RuleError> {
        let mut seen = HashSet::new();
        let mut rules = Vec::new();

        for catalog in catalogs {
            for (phase, rule) in catalog.rules() {
                if !seen.insert(rule.name.clone()) {
                    return Err(RuleError::Validation(format!(
                        "Rule '{}' is defined more than once (catalog '{}')",
                        rule.name, catalog.name
                    )));
                }

                if disabled.contains(&rule.name) {
                    debug!(rule = %rule.name, "rule disabled by configuration");
                    continue;
                }

                let phase_id = PhaseId::new(phase.order, &phase.name);
                verify_examples(rule, &phase_id)?;
                match compile(rule, phase_id, identifiers)? {
                    Some(compiled) => rules.push(compiled),
                    None => debug!(rule = %rule.name, "no active identifiers, rule is inert"),
                }
            }
        }

        Ok(Self::new(rules))
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn rule_count(&self) -> usize {
        self.phases.iter().map(|p| p.rules.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Rules in execution order
    pub fn rules(&self) -> impl Iterator<Item = &TransformationRule> {
        self.phases
            .iter()
            .flat_map(|p| p.rules.iter().map(|r| r.as_ref()))
    }

    /// Fold every phase over `content`
    pub fn apply(&self, content: &str) -> Result<String, TransformError> {
        let mut current = content.to_string();

        for phase in &self.phases {
            for rule in &phase.rules {
                let next = rule.apply(&current)?;
                if next != current {
                    trace!(phase = %phase.id.name, rule = rule.name(), "rule matched");
                    current = next;
                }
            }
        }

        Ok(current)
    }
}

fn compile(
    rule: &YamlRule,
    phase: PhaseId,
    identifiers: &BTreeSet<String>,
) -> Result<Option<TransformationRule>, RuleError> {
    let Some(pattern) = expand_identifiers(&rule.pattern, identifiers) else {
        return Ok(None);
    };

    let compiled = TransformationRule::new(&rule.name, &pattern, &rule.replace, phase)?
        .with_description(&rule.description);
    Ok(Some(compiled))
}

/// Check a rule against its own examples
///
/// Each example must produce its expected output, and that output must be a
/// fixed point of the rule.
fn verify_examples(rule: &YamlRule, phase: &PhaseId) -> Result<(), RuleError> {
    if rule.examples.is_empty() {
        return Err(RuleError::MissingExamples {
            rule: rule.name.clone(),
        });
    }

    let needs_identifiers = uses_identifiers(&rule.pattern);

    for (index, example) in rule.examples.iter().enumerate() {
        let identifiers: BTreeSet<String> = example.identifiers.iter().cloned().collect();
        if needs_identifiers && identifiers.is_empty() {
            return Err(RuleError::Validation(format!(
                "Rule '{}' example {} must list the identifiers it is checked with",
                rule.name, index
            )));
        }

        let Some(compiled) = compile(rule, phase.clone(), &identifiers)? else {
            continue;
        };

        let failed = |source| RuleError::ExampleFailed {
            rule: rule.name.clone(),
            index,
            source,
        };

        let first = compiled.apply(&example.input).map_err(failed)?;
        if first != example.expected() {
            return Err(RuleError::ExampleMismatch {
                rule: rule.name.clone(),
                index,
                expected: example.expected().to_string(),
                actual: first,
            });
        }

        let second = compiled.apply(&first).map_err(failed)?;
        if second != first {
            return Err(RuleError::NotIdempotent {
                rule: rule.name.clone(),
                index,
                first,
                second,
            });
        }
    }

    Ok(())
}
