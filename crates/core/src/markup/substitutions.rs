//! Caller-supplied rewrites applied after the rule table: user mentions and
//! attachment placeholders.

use std::cmp::Reverse;

use regex_lite::{NoExpand, Regex};

use crate::errors::MarkupError;

/// A single pattern → replacement entry. The replacement is inserted
/// verbatim, `$` has no special meaning in it.
#[derive(Debug, Clone)]
pub struct Substitution {
    pattern: String,
    regex: Regex,
    replacement: String,
}

impl Substitution {
    /// Match `text` literally.
    pub fn literal(text: &str, replacement: impl Into<String>) -> Result<Self, MarkupError> {
        Self::regex(&regex_lite::escape(text), replacement)
    }

    /// Match a regular expression.
    pub fn regex(pattern: &str, replacement: impl Into<String>) -> Result<Self, MarkupError> {
        let regex = Regex::new(pattern).map_err(|e| MarkupError::InvalidPattern {
            pattern: pattern.to_string(),
            detail: e.to_string(),
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            replacement: replacement.into(),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    pub fn apply(&self, text: &str) -> String {
        self.regex
            .replace_all(text, NoExpand(&self.replacement))
            .into_owned()
    }
}

/// A set of substitutions keyed by pattern.
#[derive(Debug, Clone, Default)]
pub struct Substitutions {
    entries: Vec<Substitution>,
}

impl Substitutions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, replacing any entry with the same pattern.
    pub fn insert(&mut self, substitution: Substitution) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.pattern == substitution.pattern)
        {
            Some(existing) => *existing = substitution,
            None => self.entries.push(substitution),
        }
    }

    /// Copy of `self` with every entry of `other` inserted.
    pub fn merged(&self, other: &Substitutions) -> Substitutions {
        let mut merged = self.clone();
        for entry in &other.entries {
            merged.insert(entry.clone());
        }
        merged
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in application order: longest pattern first, ties broken by
    /// pattern text, so a pattern never gets shadowed by one of its prefixes.
    pub fn ordered(&self) -> Vec<&Substitution> {
        let mut ordered: Vec<&Substitution> = self.entries.iter().collect();
        ordered.sort_by(|a, b| {
            (Reverse(a.pattern.len()), &a.pattern).cmp(&(Reverse(b.pattern.len()), &b.pattern))
        });
        ordered
    }

    pub fn apply(&self, text: &str) -> String {
        self.ordered()
            .into_iter()
            .fold(text.to_string(), |acc, s| s.apply(&acc))
    }
}

impl Extend<Substitution> for Substitutions {
    fn extend<T: IntoIterator<Item = Substitution>>(&mut self, iter: T) {
        for substitution in iter {
            self.insert(substitution);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_escapes_metacharacters() {
        let s = Substitution::literal("[~accountid:5b10a]", "@jroe").unwrap();
        assert_eq!(s.apply("ping [~accountid:5b10a] please"), "ping @jroe please");
        assert_eq!(s.apply("ping ~accountid:5b10a please"), "ping ~accountid:5b10a please");
    }

    #[test]
    fn test_replacement_is_not_expanded() {
        let s = Substitution::literal("price", "$1 and ${2}").unwrap();
        assert_eq!(s.apply("price"), "$1 and ${2}");
    }

    #[test]
    fn test_invalid_regex_is_reported() {
        let err = Substitution::regex("(unclosed", "x").unwrap_err();
        assert!(matches!(err, MarkupError::InvalidPattern { .. }));
    }

    #[test]
    fn test_longest_pattern_applies_first() {
        let mut subs = Substitutions::new();
        subs.insert(Substitution::literal("[~accountid:1]", "@short").unwrap());
        subs.insert(Substitution::literal("[~accountid:12]", "@long").unwrap());
        assert_eq!(
            subs.apply("[~accountid:12] and [~accountid:1]"),
            "@long and @short"
        );
    }

    #[test]
    fn test_ties_are_ordered_by_pattern() {
        let mut subs = Substitutions::new();
        subs.insert(Substitution::literal("bb", "1").unwrap());
        subs.insert(Substitution::literal("aa", "2").unwrap());
        let patterns: Vec<&str> = subs.ordered().iter().map(|s| s.pattern()).collect();
        assert_eq!(patterns, vec!["aa", "bb"]);
    }

    #[test]
    fn test_insert_replaces_same_pattern() {
        let mut subs = Substitutions::new();
        subs.insert(Substitution::literal("x", "1").unwrap());
        subs.insert(Substitution::literal("x", "2").unwrap());
        assert_eq!(subs.len(), 1);
        assert_eq!(subs.apply("x"), "2");
    }

    #[test]
    fn test_merged_keeps_both_sets() {
        let mut shared = Substitutions::new();
        shared.insert(Substitution::literal("a", "A").unwrap());
        let mut local = Substitutions::new();
        local.insert(Substitution::literal("b", "B").unwrap());

        let merged = shared.merged(&local);
        assert_eq!(merged.len(), 2);
        assert_eq!(shared.len(), 1);
        assert_eq!(merged.apply("ab"), "AB");
    }
}
