//! Merge repeated named imports of the same module
//!
//! Only single-line `import { ... } from '...'` statements are considered.
//! Default, namespace, side-effect and multi-line imports pass through
//! untouched. `import type { ... }` statements are merged separately from
//! value imports of the same module.

use indexmap::{IndexMap, IndexSet};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

use refit_core::{join_lines, split_lines};

use crate::error::TransformError;
use crate::pipeline::Pass;

fn import_regex() -> &'static Regex {
    static IMPORT_REGEX: OnceLock<Regex> = OnceLock::new();
    IMPORT_REGEX.get_or_init(|| {
        Regex::new(
            r#"^(?P<indent>[ \t]*)import\s+(?P<kind>type\s+)?\{(?P<specs>[^}]*)\}\s*from\s*(?P<quote>['"])(?P<module>[^'"]+)['"](?P<semi>\s*;)?(?P<trail>[ \t]*\r?)$"#,
        )
        .unwrap()
    })
}

/// Groups are keyed by (type-only, module specifier)
type GroupKey = (bool, String);

/// Layout of the first statement of a group, reused for the merged statement
#[derive(Debug, Clone, PartialEq, Eq)]
struct ImportStyle {
    indent: String,
    quote: char,
    semicolon: bool,
    trail: String,
}

/// All named imports of one module, in first-seen order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportGroup {
    pub module: String,
    pub type_only: bool,
    pub specifiers: IndexSet<String>,
    /// Number of statements importing this module
    pub occurrences: usize,
    /// 0-based line of the first statement
    pub first_line: usize,
    has_duplicates: bool,
    style: ImportStyle,
}

impl ImportGroup {
    /// True when the group is imported more than once or repeats a specifier
    pub fn needs_rewrite(&self) -> bool {
        self.occurrences > 1 || self.has_duplicates
    }

    /// The merged statement
    pub fn render(&self) -> String {
        let kind = if self.type_only { "type " } else { "" };
        let specifiers = if self.specifiers.is_empty() {
            "{}".to_string()
        } else {
            format!(
                "{{ {} }}",
                self.specifiers.iter().cloned().collect::<Vec<_>>().join(", ")
            )
        };
        let semicolon = if self.style.semicolon { ";" } else { "" };

        format!(
            "{indent}import {kind}{specifiers} from {q}{module}{q}{semicolon}{trail}",
            indent = self.style.indent,
            q = self.style.quote,
            module = self.module,
            trail = self.style.trail,
        )
    }
}

/// Accumulator for one file's imports
#[derive(Debug, Default)]
pub struct ImportGroups {
    groups: IndexMap<GroupKey, ImportGroup>,
    /// Import statement lines mapped to their group index
    lines: BTreeMap<usize, usize>,
}

impl ImportGroups {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, module: &str, type_only: bool) -> Option<&ImportGroup> {
        self.groups.get(&(type_only, module.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImportGroup> {
        self.groups.values()
    }

    fn add(&mut self, line: usize, caps: &Captures<'_>) {
        let type_only = caps.name("kind").is_some();
        let module = caps["module"].to_string();

        let entry = self.groups.entry((type_only, module.clone()));
        self.lines.insert(line, entry.index());

        let entry = entry.or_insert_with(|| ImportGroup {
            module,
            type_only,
            specifiers: IndexSet::new(),
            occurrences: 0,
            first_line: line,
            has_duplicates: false,
            style: ImportStyle {
                indent: caps["indent"].to_string(),
                quote: if &caps["quote"] == "\"" { '"' } else { '\'' },
                semicolon: caps.name("semi").is_some(),
                trail: caps["trail"].to_string(),
            },
        });
        entry.occurrences += 1;

        for specifier in caps["specs"].split(',') {
            let specifier = specifier.split_whitespace().collect::<Vec<_>>().join(" ");
            if specifier.is_empty() {
                continue;
            }
            if !entry.specifiers.insert(specifier) {
                entry.has_duplicates = true;
            }
        }
    }
}

/// Pass that merges duplicate imports
#[derive(Debug, Default)]
pub struct ImportDeduplicator;

impl ImportDeduplicator {
    pub fn new() -> Self {
        Self
    }

    /// Collect every single-line named import of `lines`
    pub fn collect<S: AsRef<str>>(&self, lines: &[S]) -> ImportGroups {
        let mut groups = ImportGroups::default();
        for (index, line) in lines.iter().enumerate() {
            if let Some(caps) = import_regex().captures(line.as_ref()) {
                groups.add(index, &caps);
            }
        }
        groups
    }

    /// Rewrite `lines` according to `groups`
    ///
    /// The first statement of a group that needs rewriting becomes the merged
    /// statement and later ones are removed. Every other line is kept.
    pub fn rewrite<S: AsRef<str>>(&self, lines: &[S], groups: &ImportGroups) -> Vec<String> {
        let mut out = Vec::with_capacity(lines.len());

        for (index, line) in lines.iter().enumerate() {
            let group = groups
                .lines
                .get(&index)
                .and_then(|g| groups.groups.get_index(*g))
                .map(|(_, group)| group)
                .filter(|group| group.needs_rewrite());

            match group {
                Some(group) if group.first_line == index => out.push(group.render()),
                Some(_) => {}
                None => out.push(line.as_ref().to_string()),
            }
        }

        out
    }

    /// Merge duplicate imports in `content`
    pub fn dedupe(&self, content: &str) -> String {
        let lines = split_lines(content);
        let groups = self.collect(&lines);

        let merged = groups.iter().filter(|g| g.needs_rewrite()).count();
        if merged == 0 {
            return content.to_string();
        }

        debug!(groups = merged, "merging duplicate imports");
        join_lines(&self.rewrite(&lines, &groups))
    }
}

impl Pass for ImportDeduplicator {
    fn name(&self) -> &str {
        "import_dedup"
    }

    fn description(&self) -> &str {
        "Merge repeated named imports of the same module"
    }

    fn apply(&self, content: &str) -> Result<String, TransformError> {
        Ok(self.dedupe(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dedupe(content: &str) -> String {
        ImportDeduplicator::new().dedupe(content)
    }

    #[test]
    fn test_merges_in_first_seen_order() {
        let input = "import { a, b } from 'x';\nimport { b, c } from 'x';\nconst y = 1;\n";
        assert_eq!(
            dedupe(input),
            "import { a, b, c } from 'x';\nconst y = 1;\n"
        );
    }

    #[test]
    fn test_merge_lands_on_first_occurrence() {
        let input = "import { a } from './m';\nimport { z } from './other';\nimport { b } from './m';\n\nfoo();\n";
        assert_eq!(
            dedupe(input),
            "import { a, b } from './m';\nimport { z } from './other';\n\nfoo();\n"
        );
    }

    #[test]
    fn test_single_imports_untouched() {
        let input = "import {a,b} from \"x\"\nimport { c } from 'y';\n";
        assert_eq!(dedupe(input), input);
    }

    #[test]
    fn test_duplicate_specifier_in_one_statement() {
        assert_eq!(
            dedupe("import { a, a, b } from 'x';\n"),
            "import { a, b } from 'x';\n"
        );
    }

    #[test]
    fn test_preserves_indent_quote_and_semicolon() {
        let input = "  import { a } from \"x\"\n  import { b } from 'x';\n";
        assert_eq!(dedupe(input), "  import { a, b } from \"x\"\n");
    }

    #[test]
    fn test_type_imports_are_kept_apart() {
        let input = "import type { A } from 'x';\nimport { a } from 'x';\nimport type { B } from 'x';\n";
        assert_eq!(
            dedupe(input),
            "import type { A, B } from 'x';\nimport { a } from 'x';\n"
        );
    }

    #[test]
    fn test_aliases_are_normalized() {
        let input = "import { a  as  b } from 'x';\nimport { a as b, c } from 'x';\n";
        assert_eq!(dedupe(input), "import { a as b, c } from 'x';\n");
    }

    #[test]
    fn test_other_import_forms_pass_through() {
        let input = "import x from 'x';\nimport * as y from 'y';\nimport 'z';\nimport {\n  a,\n} from 'w';\nimport x from 'x';\n";
        assert_eq!(dedupe(input), input);
    }

    #[test]
    fn test_crlf_lines() {
        let input = "import { a } from 'x';\r\nimport { b } from 'x';\r\nrun();\r\n";
        assert_eq!(dedupe(input), "import { a, b } from 'x';\r\nrun();\r\n");
    }

    #[test]
    fn test_second_pass_is_noop() {
        let input = "import { a, b } from 'x';\nimport { c } from 'y';\nimport { b, d } from 'x';\nimport { c } from 'y';\n";
        let once = dedupe(input);
        assert_eq!(once, "import { a, b, d } from 'x';\nimport { c } from 'y';\n");
        assert_eq!(dedupe(&once), once);
    }

    #[test]
    fn test_collect_groups() {
        let lines = vec![
            "import { a } from 'x';",
            "import { b, a } from 'x';",
            "import { c } from 'y';",
        ];
        let groups = ImportDeduplicator::new().collect(&lines);

        assert_eq!(groups.len(), 2);
        let x = groups.get("x", false).unwrap();
        assert_eq!(x.occurrences, 2);
        assert_eq!(x.specifiers.iter().collect::<Vec<_>>(), ["a", "b"]);
        assert!(x.needs_rewrite());
        assert!(!groups.get("y", false).unwrap().needs_rewrite());
    }
}
