//! Line-indexed patching against a file's pre-run line numbering
//!
//! Patches are always evaluated against the *original* line array in a single
//! pass, so earlier patches can never shift the targets of later ones. The
//! number of lines is preserved: a deleted line becomes an empty line.

use regex::{NoExpand, Regex};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use thiserror::Error;

/// Errors that can occur when constructing a patch
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PatchError {
    #[error("Line numbers are 1-based, got 0")]
    ZeroLine,

    #[error("Replacement for line {line} contains a line break")]
    MultilineReplacement { line: usize },

    #[error("Rename on line {line} has an empty source identifier")]
    EmptyRename { line: usize },
}

/// What a patch does to its target line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchAction {
    /// Replace the whole line
    Replace(String),
    /// Blank the line out (the line itself stays, empty)
    Delete,
    /// Replace whole-word occurrences of `from` with `to` within the line
    Rename { from: String, to: String },
}

/// A single patch targeting one 1-based line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinePatch {
    line: NonZeroUsize,
    action: PatchAction,
    anchor: Option<String>,
}

impl LinePatch {
    /// Create a patch, validating that it cannot change the line count
    pub fn new(line: usize, action: PatchAction) -> Result<Self, PatchError> {
        let line = NonZeroUsize::new(line).ok_or(PatchError::ZeroLine)?;

        match &action {
            PatchAction::Replace(text) if text.contains('\n') => {
                return Err(PatchError::MultilineReplacement { line: line.get() });
            }
            PatchAction::Rename { from, to } => {
                if from.is_empty() {
                    return Err(PatchError::EmptyRename { line: line.get() });
                }
                if to.contains('\n') {
                    return Err(PatchError::MultilineReplacement { line: line.get() });
                }
            }
            _ => {}
        }

        Ok(Self {
            line,
            action,
            anchor: None,
        })
    }

    pub fn replace(line: usize, text: impl Into<String>) -> Result<Self, PatchError> {
        Self::new(line, PatchAction::Replace(text.into()))
    }

    pub fn delete(line: usize) -> Result<Self, PatchError> {
        Self::new(line, PatchAction::Delete)
    }

    pub fn rename(
        line: usize,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Result<Self, PatchError> {
        Self::new(
            line,
            PatchAction::Rename {
                from: from.into(),
                to: to.into(),
            },
        )
    }

    /// Only apply the patch when the original line contains `anchor`
    pub fn with_anchor(mut self, anchor: impl Into<String>) -> Self {
        self.anchor = Some(anchor.into());
        self
    }

    /// 1-based target line
    pub fn line(&self) -> usize {
        self.line.get()
    }

    pub fn action(&self) -> &PatchAction {
        &self.action
    }

    pub fn anchor(&self) -> Option<&str> {
        self.anchor.as_deref()
    }

    fn matches_anchor(&self, original: &str) -> bool {
        match &self.anchor {
            Some(anchor) => original.contains(anchor.as_str()),
            None => true,
        }
    }

    /// Produce the patched text for `original`, keeping a trailing `\r`
    fn render(&self, original: &str) -> String {
        let (body, cr) = match original.strip_suffix('\r') {
            Some(body) => (body, "\r"),
            None => (original, ""),
        };

        let patched = match &self.action {
            PatchAction::Replace(text) => text.trim_end_matches('\r').to_string(),
            PatchAction::Delete => String::new(),
            PatchAction::Rename { from, to } => rename_word(body, from, to),
        };

        format!("{}{}", patched, cr)
    }
}

/// Whole-word substitution used by [`PatchAction::Rename`]
fn rename_word(line: &str, from: &str, to: &str) -> String {
    let pattern = format!(r"\b{}\b", regex::escape(from));
    match Regex::new(&pattern) {
        Ok(re) => re.replace_all(line, NoExpand(to)).into_owned(),
        Err(_) => line.replace(from, to),
    }
}

/// Result of applying a patch set to one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchOutcome {
    /// The patched lines (same length as the input)
    pub lines: Vec<String>,
    /// Number of lines that received a patch
    pub applied: usize,
    /// Target lines of patches that were ignored (out of range or anchor mismatch)
    pub stale: Vec<usize>,
}

/// Apply `patches` to the original `lines` in one pass
///
/// Patches beyond the end of the file, or whose anchor does not match, are
/// ignored and reported as stale. When several applicable patches target the
/// same line, the last one in declaration order wins.
pub fn apply_patches<S: AsRef<str>>(lines: &[S], patches: &[LinePatch]) -> PatchOutcome {
    let mut winners: BTreeMap<usize, &LinePatch> = BTreeMap::new();
    let mut stale = Vec::new();
    let count = line_count(lines);

    for patch in patches {
        let index = patch.line() - 1;
        match lines[..count].get(index) {
            Some(original) if patch.matches_anchor(original.as_ref()) => {
                winners.insert(index, patch);
            }
            _ => stale.push(patch.line()),
        }
    }

    let patched: Vec<String> = lines
        .iter()
        .enumerate()
        .map(|(index, line)| match winners.get(&index) {
            Some(patch) => patch.render(line.as_ref()),
            None => line.as_ref().to_string(),
        })
        .collect();

    PatchOutcome {
        lines: patched,
        applied: winners.len(),
        stale,
    }
}

/// Number of real lines in a [`split_lines`] array
///
/// Content ending in `\n` splits into a trailing empty element; that element
/// is the end of the file, not a line.
pub fn line_count<S: AsRef<str>>(lines: &[S]) -> usize {
    match lines.last() {
        Some(last) if last.as_ref().is_empty() => lines.len() - 1,
        _ => lines.len(),
    }
}

/// Split content into lines without losing anything (`join_lines` restores it exactly)
pub fn split_lines(content: &str) -> Vec<String> {
    content.split('\n').map(str::to_string).collect()
}

/// Inverse of [`split_lines`]
pub fn join_lines<S: AsRef<str>>(lines: &[S]) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(line.as_ref());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(source: &str) -> Vec<String> {
        split_lines(source)
    }

    #[test]
    fn test_replace_single_line() {
        let input = lines("a\nb\nc");
        let outcome = apply_patches(&input, &[LinePatch::replace(2, "B").unwrap()]);

        assert_eq!(outcome.lines, vec!["a", "B", "c"]);
        assert_eq!(outcome.applied, 1);
        assert!(outcome.stale.is_empty());
    }

    #[test]
    fn test_delete_keeps_line_count() {
        let input = lines("a\nb\nc\n");
        let outcome = apply_patches(&input, &[LinePatch::delete(1).unwrap()]);

        assert_eq!(outcome.lines.len(), input.len());
        assert_eq!(join_lines(&outcome.lines), "\nb\nc\n");
    }

    #[test]
    fn test_out_of_range_is_ignored() {
        let input: Vec<String> = (1..=300).map(|i| format!("line {}", i)).collect();
        let outcome = apply_patches(&input, &[LinePatch::replace(500, "x").unwrap()]);

        assert_eq!(outcome.lines, input);
        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.stale, vec![500]);
    }

    #[test]
    fn test_line_after_final_newline_is_out_of_range() {
        let source: String = (1..=300).map(|i| format!("line {}\n", i)).collect();
        let input = lines(&source);
        let outcome = apply_patches(&input, &[LinePatch::replace(301, "INJECTED").unwrap()]);

        assert_eq!(join_lines(&outcome.lines), source);
        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.stale, vec![301]);
    }

    #[test]
    fn test_last_line_before_final_newline_is_patchable() {
        let input = lines("a\nb\n");
        let outcome = apply_patches(&input, &[LinePatch::replace(2, "B").unwrap()]);

        assert_eq!(join_lines(&outcome.lines), "a\nB\n");
        assert!(outcome.stale.is_empty());
    }

    #[test]
    fn test_line_count() {
        assert_eq!(line_count(&lines("")), 0);
        assert_eq!(line_count(&lines("a")), 1);
        assert_eq!(line_count(&lines("a\n")), 1);
        assert_eq!(line_count(&lines("a\n\n")), 2);
        assert_eq!(line_count(&lines("a\r\nb")), 2);
    }

    #[test]
    fn test_patches_use_original_numbering() {
        let input = lines("one\ntwo\nthree");
        let patches = vec![
            LinePatch::delete(1).unwrap(),
            LinePatch::replace(3, "THREE").unwrap(),
        ];
        let outcome = apply_patches(&input, &patches);

        assert_eq!(outcome.lines, vec!["", "two", "THREE"]);
    }

    #[test]
    fn test_last_patch_wins() {
        let input = lines("x");
        let patches = vec![
            LinePatch::replace(1, "first").unwrap(),
            LinePatch::replace(1, "second").unwrap(),
        ];
        let outcome = apply_patches(&input, &patches);

        assert_eq!(outcome.lines, vec!["second"]);
        assert_eq!(outcome.applied, 1);
    }

    #[test]
    fn test_rename_respects_word_boundaries() {
        let input = lines("this.sampleRate = sampleRate; // sampleRateHz");
        let outcome = apply_patches(
            &input,
            &[LinePatch::rename(1, "sampleRate", "_sampleRate").unwrap()],
        );

        assert_eq!(
            outcome.lines[0],
            "this._sampleRate = _sampleRate; // sampleRateHz"
        );
    }

    #[test]
    fn test_rename_is_stable_when_reapplied() {
        let input = lines("catch (error) { log(error); }");
        let patch = LinePatch::rename(1, "error", "_error").unwrap();

        let once = apply_patches(&input, std::slice::from_ref(&patch));
        let twice = apply_patches(&once.lines, std::slice::from_ref(&patch));

        assert_eq!(once.lines, twice.lines);
    }

    #[test]
    fn test_anchor_mismatch_is_stale() {
        let input = lines("let a = 1;\nlet b = 2;");
        let patches = vec![
            LinePatch::replace(2, "let b = 3;").unwrap().with_anchor("let c"),
            LinePatch::replace(1, "let a = 9;").unwrap().with_anchor("let a"),
        ];
        let outcome = apply_patches(&input, &patches);

        assert_eq!(outcome.lines, vec!["let a = 9;", "let b = 2;"]);
        assert_eq!(outcome.stale, vec![2]);
    }

    #[test]
    fn test_crlf_is_preserved() {
        let input = lines("a\r\nb\r\nc");
        let outcome = apply_patches(&input, &[LinePatch::replace(1, "A").unwrap()]);

        assert_eq!(join_lines(&outcome.lines), "A\r\nb\r\nc");
    }

    #[test]
    fn test_constructor_validation() {
        assert_eq!(LinePatch::delete(0), Err(PatchError::ZeroLine));
        assert_eq!(
            LinePatch::replace(4, "a\nb"),
            Err(PatchError::MultilineReplacement { line: 4 })
        );
        assert_eq!(
            LinePatch::rename(2, "", "x"),
            Err(PatchError::EmptyRename { line: 2 })
        );
    }

    #[test]
    fn test_line_count_preserved_for_any_patch_set() {
        let input = lines("a\nb\nc\nd\n");
        let patch_sets = vec![
            vec![],
            vec![LinePatch::delete(1).unwrap(), LinePatch::delete(5).unwrap()],
            vec![LinePatch::replace(2, "").unwrap(), LinePatch::replace(99, "z").unwrap()],
            vec![LinePatch::rename(3, "c", "cc").unwrap(), LinePatch::replace(3, "q").unwrap()],
        ];

        for patches in patch_sets {
            assert_eq!(apply_patches(&input, &patches).lines.len(), input.len());
        }
    }

    #[test]
    fn test_split_join_roundtrip_exact() {
        for source in ["", "\n", "a", "a\n", "a\r\nb\r\n", "\n\nx\n\n"] {
            assert_eq!(join_lines(&split_lines(source)), source);
        }
    }
}
