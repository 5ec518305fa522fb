//! Unified-diff patching with an optional fuzz factor.
//!
//! A [`Patch`] targets a single file's content: parse once, then apply to a
//! string and receive the rewritten content plus a per-hunk report. Hunks
//! whose context has drifted are relocated by searching outward from the
//! expected position, and with fuzz enabled, by ignoring edge context lines
//! the way classic `patch(1)` does.

mod apply;
mod error;
mod parser;

pub use error::PatchError;

use serde::Serialize;

/// One line of a hunk body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffLine {
    Context(String),
    Add(String),
    Remove(String),
}

/// A contiguous change region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<DiffLine>,
}

impl Hunk {
    /// The old-file and new-file line images of this hunk.
    pub(crate) fn segments(&self) -> (Vec<&str>, Vec<&str>) {
        let mut old_lines = Vec::new();
        let mut new_lines = Vec::new();
        for line in &self.lines {
            match line {
                DiffLine::Context(text) => {
                    old_lines.push(text.as_str());
                    new_lines.push(text.as_str());
                }
                DiffLine::Add(text) => new_lines.push(text.as_str()),
                DiffLine::Remove(text) => old_lines.push(text.as_str()),
            }
        }
        (old_lines, new_lines)
    }
}

/// Where and how a hunk landed.
#[derive(Debug, Clone, Serialize)]
pub struct HunkReport {
    /// 1-based hunk ordinal.
    pub hunk: usize,
    /// 1-based line in the original content where the hunk applied.
    pub applied_at: usize,
    /// Lines of drift from the position the header named.
    pub offset: i64,
    /// Edge context lines that had to be ignored for the hunk to match.
    pub fuzz: u32,
}

/// The rewritten content plus how each hunk applied.
#[derive(Debug, Clone)]
pub struct AppliedPatch {
    pub content: String,
    pub reports: Vec<HunkReport>,
}

/// A parsed unified diff for a single file.
#[derive(Debug, Clone)]
pub struct Patch {
    hunks: Vec<Hunk>,
    new_no_newline: bool,
}

impl Patch {
    pub fn parse(input: &str) -> Result<Self, PatchError> {
        let parsed = parser::parse(input)?;
        Ok(Self {
            hunks: parsed.hunks,
            new_no_newline: parsed.new_no_newline,
        })
    }

    pub fn hunks(&self) -> &[Hunk] {
        &self.hunks
    }

    /// Apply to `content`, tolerating up to `max_fuzz` ignored edge context
    /// lines per hunk.
    pub fn apply(&self, content: &str, max_fuzz: u32) -> Result<AppliedPatch, PatchError> {
        apply::apply(self, content, max_fuzz, self.new_no_newline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn simple_replacement_round_trips() {
        let patch = Patch::parse("@@ -1,3 +1,3 @@\n alpha\n-beta\n+BETA\n gamma\n").unwrap();
        let applied = patch.apply("alpha\nbeta\ngamma\n", 0).unwrap();
        assert_eq!(applied.content, "alpha\nBETA\ngamma\n");
        assert_eq!(applied.reports.len(), 1);
        assert_eq!(applied.reports[0].offset, 0);
        assert_eq!(applied.reports[0].fuzz, 0);
    }

    #[test]
    fn drifted_hunk_is_relocated() {
        // Header says line 1, but the region actually starts at line 4.
        let patch = Patch::parse("@@ -1,3 +1,3 @@\n alpha\n-beta\n+BETA\n gamma\n").unwrap();
        let applied = patch.apply("x\ny\nz\nalpha\nbeta\ngamma\n", 0).unwrap();
        assert_eq!(applied.content, "x\ny\nz\nalpha\nBETA\ngamma\n");
        assert_eq!(applied.reports[0].offset, 3);
    }

    #[test]
    fn fuzz_tolerates_drifted_edge_context() {
        let patch =
            Patch::parse("@@ -1,3 +1,3 @@\n WRONG\n-beta\n+BETA\n gamma\n").unwrap();
        assert!(patch.apply("alpha\nbeta\ngamma\n", 0).is_err());

        let applied = patch.apply("alpha\nbeta\ngamma\n", 2).unwrap();
        assert_eq!(applied.content, "alpha\nBETA\ngamma\n");
        assert!(applied.reports[0].fuzz >= 1);
    }

    #[test]
    fn insertion_hunk_adds_lines() {
        let patch = Patch::parse("@@ -1,2 +1,3 @@\n one\n+one and a half\n two\n").unwrap();
        let applied = patch.apply("one\ntwo\nthree\n", 0).unwrap();
        assert_eq!(applied.content, "one\none and a half\ntwo\nthree\n");
    }

    #[test]
    fn deletion_hunk_removes_lines() {
        let patch = Patch::parse("@@ -1,3 +1,2 @@\n one\n-two\n three\n").unwrap();
        let applied = patch.apply("one\ntwo\nthree\n", 0).unwrap();
        assert_eq!(applied.content, "one\nthree\n");
    }

    #[test]
    fn multiple_hunks_apply_with_cumulative_offsets() {
        let diff = "@@ -1,2 +1,3 @@\n a\n+A2\n b\n@@ -5,2 +6,2 @@\n e\n-f\n+F\n";
        let patch = Patch::parse(diff).unwrap();
        let applied = patch.apply("a\nb\nc\nd\ne\nf\n", 0).unwrap();
        assert_eq!(applied.content, "a\nA2\nb\nc\nd\ne\nF\n");
        assert_eq!(applied.reports.len(), 2);
    }

    #[test]
    fn mismatched_context_fails_with_snippet() {
        let patch = Patch::parse("@@ -1,2 +1,2 @@\n nope\n-never\n+ever\n").unwrap();
        let err = patch.apply("completely\ndifferent\n", 2).unwrap_err();
        assert!(matches!(err, PatchError::HunkMismatch { .. }));
        assert!(err.to_string().contains("does not apply"));
    }

    #[test]
    fn no_newline_marker_strips_trailing_newline() {
        let patch = Patch::parse("@@ -1 +1 @@\n-old\n+new\n\\ No newline at end of file\n").unwrap();
        let applied = patch.apply("old\n", 0).unwrap();
        assert_eq!(applied.content, "new");
    }
}
