//! YAML catalog schema definitions
//!
//! A catalog groups pattern rules into ordered phases. Every rule carries
//! inline examples that are checked when the catalog is loaded.

use serde::{Deserialize, Serialize};

/// A complete YAML rule catalog
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct YamlCatalog {
    /// Catalog identifier (e.g., "mocks")
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Phases in declaration order; execution order comes from `order`
    #[serde(default)]
    pub phases: Vec<YamlPhase>,
}

/// A named group of rules that runs as one step
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct YamlPhase {
    pub name: String,

    /// Ascending execution order across all loaded catalogs
    pub order: u32,

    #[serde(default)]
    pub rules: Vec<YamlRule>,
}

/// A single pattern rule
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct YamlRule {
    /// Unique rule identifier (e.g., "mock_return_literal")
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Regular expression; lookaround is allowed and `{{identifiers}}`
    /// expands to the active identifier set
    pub pattern: String,

    /// Replacement template (`${1}`, `${name}`, `$$`)
    #[serde(default)]
    pub replace: String,

    /// Inline examples (at least one is required)
    #[serde(default)]
    pub examples: Vec<Example>,
}

/// An input and the output the rule must produce for it
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Example {
    pub input: String,

    /// Expected output; absent means the rule must leave the input alone
    #[serde(default)]
    pub output: Option<String>,

    /// Identifiers to expand `{{identifiers}}` with while checking this example
    #[serde(default)]
    pub identifiers: Vec<String>,
}

impl Example {
    pub fn expected(&self) -> &str {
        self.output.as_deref().unwrap_or(&self.input)
    }
}

impl YamlCatalog {
    /// Validate the catalog structure
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Catalog name is required".to_string());
        }
        for phase in &self.phases {
            if phase.name.trim().is_empty() {
                return Err(format!("Catalog '{}' has a phase without a name", self.name));
            }
            for rule in &phase.rules {
                rule.validate()
                    .map_err(|e| format!("{} (phase '{}')", e, phase.name))?;
            }
        }
        Ok(())
    }

    /// Iterate over every rule with the phase it belongs to
    pub fn rules(&self) -> impl Iterator<Item = (&YamlPhase, &YamlRule)> {
        self.phases
            .iter()
            .flat_map(|phase| phase.rules.iter().map(move |rule| (phase, rule)))
    }

    pub fn rule_count(&self) -> usize {
        self.phases.iter().map(|p| p.rules.len()).sum()
    }
}

impl YamlRule {
    /// Validate the rule structure
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Rule name is required".to_string());
        }
        if self.pattern.is_empty() {
            return Err(format!("Rule '{}' has an empty pattern", self.name));
        }
        Ok(())
    }
}
