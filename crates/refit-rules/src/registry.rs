//! Registry of the catalogs that ship with refit

use crate::catalog::{load_catalog_from_string, YamlCatalog};
use crate::error::RuleError;

/// Built-in catalogs as (name, YAML source), in default load order
const BUILTIN_CATALOGS: &[(&str, &str)] = &[
    ("mocks", include_str!("../catalogs/mocks.yaml")),
    ("hooks", include_str!("../catalogs/hooks.yaml")),
    ("event-handlers", include_str!("../catalogs/event-handlers.yaml")),
    ("unused-identifiers", include_str!("../catalogs/unused-identifiers.yaml")),
    ("whitespace", include_str!("../catalogs/whitespace.yaml")),
];

/// Names of all built-in catalogs
pub fn builtin_names() -> Vec<&'static str> {
    BUILTIN_CATALOGS.iter().map(|(name, _)| *name).collect()
}

/// Parse one built-in catalog by name
pub fn load_builtin(name: &str) -> Result<YamlCatalog, RuleError> {
    let (_, source) = BUILTIN_CATALOGS
        .iter()
        .find(|(n, _)| *n == name)
        .ok_or_else(|| RuleError::UnknownCatalog(name.to_string()))?;
    load_catalog_from_string(source)
}

/// Parse the named built-in catalogs, in the order given
pub fn load_builtins<S: AsRef<str>>(names: &[S]) -> Result<Vec<YamlCatalog>, RuleError> {
    names.iter().map(|n| load_builtin(n.as_ref())).collect()
}

/// One line of `--list-rules` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleInfo {
    pub catalog: String,
    pub phase: String,
    pub order: u32,
    pub name: String,
    pub description: String,
    pub example_count: usize,
}

/// Describe every rule of `catalogs`, sorted by phase order
pub fn list_rules(catalogs: &[YamlCatalog]) -> Vec<RuleInfo> {
    let mut infos: Vec<RuleInfo> = catalogs
        .iter()
        .flat_map(|catalog| {
            catalog.rules().map(move |(phase, rule)| RuleInfo {
                catalog: catalog.name.clone(),
                phase: phase.name.clone(),
                order: phase.order,
                name: rule.name.clone(),
                description: rule.description.clone(),
                example_count: rule.examples.len(),
            })
        })
        .collect();

    infos.sort_by_key(|info| info.order);
    infos
}
