//! Shell-glob name filtering.
//!
//! A [`PatternFilter`] is compiled once per pass from a comma-separated
//! pattern list and matched against bare file or directory names, never
//! full paths. Matching is case-sensitive with the usual `*`, `?`, and
//! `[...]` semantics.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::warn;

/// A compiled set of shell-glob patterns matched against bare names.
///
/// Built from a comma-separated list; whitespace around each pattern is
/// trimmed and empty entries are dropped. A name matches the filter if it
/// matches at least one pattern.
#[derive(Debug, Clone)]
pub struct PatternFilter {
    set: GlobSet,
}

impl PatternFilter {
    /// Compile a comma-separated pattern list.
    ///
    /// Patterns that fail to compile are skipped with a warning rather than
    /// failing the whole list, so one typo does not stall the sync loop.
    pub fn new(patterns: &str) -> Self {
        let mut builder = GlobSetBuilder::new();
        for pat in patterns.split(',') {
            let pat = pat.trim();
            if pat.is_empty() {
                continue;
            }
            match Glob::new(pat) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(e) => warn!(pattern = pat, "skipping invalid glob pattern: {e}"),
            }
        }
        let set = builder
            .build()
            .unwrap_or_else(|_| GlobSet::empty());
        Self { set }
    }

    /// Whether `name` matches at least one pattern.
    pub fn matches(&self, name: &str) -> bool {
        self.set.is_match(Path::new(name))
    }

    /// True when no pattern compiled (nothing can ever match).
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_pattern() {
        let filter = PatternFilter::new("*.txt");
        assert!(filter.matches("notes.txt"));
        assert!(!filter.matches("notes.csv"));
    }

    #[test]
    fn test_comma_separated_list_with_whitespace() {
        let filter = PatternFilter::new(" *.txt , *.csv ");
        assert!(filter.matches("a.txt"));
        assert!(filter.matches("b.csv"));
        assert!(!filter.matches("c.log"));
    }

    #[test]
    fn test_question_mark_and_class() {
        let filter = PatternFilter::new("data?.bin,report[0-9].txt");
        assert!(filter.matches("data1.bin"));
        assert!(!filter.matches("data12.bin"));
        assert!(filter.matches("report7.txt"));
        assert!(!filter.matches("reportx.txt"));
    }

    #[test]
    fn test_case_sensitive() {
        let filter = PatternFilter::new("*.TXT");
        assert!(filter.matches("README.TXT"));
        assert!(!filter.matches("readme.txt"));
    }

    #[test]
    fn test_invalid_pattern_skipped() {
        // The broken class pattern is dropped, the valid one still works
        let filter = PatternFilter::new("[,*.txt");
        assert!(filter.matches("ok.txt"));
        assert!(!filter.matches("ok.csv"));
    }

    #[test]
    fn test_empty_list_matches_nothing() {
        let filter = PatternFilter::new(" , ");
        assert!(filter.is_empty());
        assert!(!filter.matches("anything"));
    }

    #[test]
    fn test_star_matches_dotfiles() {
        let filter = PatternFilter::new("*");
        assert!(filter.matches(".gitignore"));
        assert!(filter.matches("plain"));
    }
}
