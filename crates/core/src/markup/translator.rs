use regex_lite::Regex;
use tracing::{debug, trace};

use super::rules::{default_rules, Rule};
use super::substitutions::Substitutions;
use crate::errors::MarkupError;

#[derive(Debug, Clone)]
struct CompiledRule {
    name: &'static str,
    regex: Regex,
    replacement: String,
}

/// Rewrites Jira wiki markup into GitLab Markdown.
///
/// Translation is a single pass over the rule table followed by the
/// caller's substitutions. It is not idempotent: translating Markdown a
/// second time rewrites it again.
#[derive(Debug, Clone)]
pub struct MarkupTranslator {
    rules: Vec<CompiledRule>,
}

impl MarkupTranslator {
    /// Translator with the built-in rule table.
    pub fn new() -> Result<Self, MarkupError> {
        Self::with_rules(default_rules())
    }

    pub fn with_rules(rules: Vec<Rule>) -> Result<Self, MarkupError> {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let regex = Regex::new(&rule.pattern).map_err(|e| MarkupError::InvalidPattern {
                    pattern: rule.pattern.clone(),
                    detail: e.to_string(),
                })?;
                Ok(CompiledRule {
                    name: rule.name,
                    regex,
                    replacement: rule.replacement,
                })
            })
            .collect::<Result<Vec<_>, MarkupError>>()?;
        debug!(rules = rules.len(), "compiled markup rules");
        Ok(Self { rules })
    }

    /// Translate `text`; `None` yields an empty string.
    pub fn translate<'a>(&self, text: impl Into<Option<&'a str>>, substitutions: &Substitutions) -> String {
        let Some(text) = text.into() else {
            return String::new();
        };

        let mut out = text.to_string();
        for rule in &self.rules {
            if let std::borrow::Cow::Owned(rewritten) =
                rule.regex.replace_all(&out, rule.replacement.as_str())
            {
                trace!(rule = rule.name, "markup rule applied");
                out = rewritten;
            }
        }
        substitutions.apply(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::Substitution;

    fn translate(text: &str) -> String {
        MarkupTranslator::new()
            .unwrap()
            .translate(text, &Substitutions::new())
    }

    #[test]
    fn test_none_is_empty() {
        let translator = MarkupTranslator::new().unwrap();
        assert_eq!(translator.translate(None, &Substitutions::new()), "");
    }

    #[test]
    fn test_code_block() {
        let out = translate("{code:python}\nx=1\n{code}");
        assert!(out.contains("```python\nx=1\n```"), "got {:?}", out);
    }

    #[test]
    fn test_code_block_language_forms() {
        let out = translate("{code:Java}\nint x;\n{code}");
        assert!(out.contains("```Java\nint x;\n```"), "got {:?}", out);

        let out = translate("{code:c++}\nx++;\n{code}");
        assert!(out.contains("```c++\nx++;\n```"), "got {:?}", out);

        let out = translate("{code:java|title=Foo.java}\nint x;\n{code}");
        assert!(out.contains("```java\nint x;\n```"), "got {:?}", out);
    }

    #[test]
    fn test_code_block_without_language() {
        let out = translate("{code:title=Foo.java|borderStyle=solid}\nint x;\n{code}");
        assert!(out.contains("```\nint x;\n```"), "got {:?}", out);
        assert!(!out.contains("{code"), "got {:?}", out);
        assert!(!out.contains("title"), "got {:?}", out);
        assert_eq!(out.matches("```").count(), 2);
    }

    #[test]
    fn test_noformat_block() {
        let out = translate("before\n{noformat}\nraw text\n{noformat}\nafter");
        assert_eq!(out, "before\n```\nraw text\n```\nafter");
    }

    #[test]
    fn test_bold() {
        assert_eq!(translate("*bold*"), "**bold**");
        assert_eq!(translate("a *b* and *c* d"), "a **b** and **c** d");
    }

    #[test]
    fn test_emphasis_effects() {
        assert_eq!(translate("an _italic_ word"), "an *italic* word");
        assert_eq!(translate("a -gone- word"), "a ~~gone~~ word");
        assert_eq!(translate("a +under+ word"), "a __under__ word");
        assert_eq!(translate("call {{run()}} now"), "call `run()` now");
    }

    #[test]
    fn test_emphasis_needs_flanking() {
        assert_eq!(translate("snake_case_name"), "snake_case_name");
        assert_eq!(translate("2024-03-01"), "2024-03-01");
        assert_eq!(translate("a*b*c"), "a*b*c");
        assert_eq!(translate("a{{b}}c"), "a{{b}}c");
        assert_eq!(translate("x{{y}} z"), "x{{y}} z");
    }

    #[test]
    fn test_effect_body_stops_at_its_delimiter() {
        assert_eq!(translate("*x*y and z*"), "*x*y and z*");
        assert_eq!(translate("-x-y and z-"), "-x-y and z-");
        assert_eq!(translate("+x+y and z+"), "+x+y and z+");
        assert_eq!(translate("*a* and *b*"), "**a** and **b**");
    }

    #[test]
    fn test_inline_code_at_line_edges() {
        assert_eq!(translate("{{cargo}} first"), "`cargo` first");
        assert_eq!(translate("(see {{a.b}})"), "(see `a.b`)");
    }

    #[test]
    fn test_headings() {
        assert_eq!(translate("h1. Title"), "# Title");
        assert_eq!(translate("intro\nh3. Details"), "intro\n### Details");
        assert_eq!(translate("h6. Deep"), "###### Deep");
    }

    #[test]
    fn test_lists() {
        assert_eq!(translate("# step"), "1. step");
        assert_eq!(translate("# one\n## two\n### three"), "1. one\n   1. two\n      1. three");
        assert_eq!(translate("* a\n** b\n*** c"), "- a\n   - b\n      - c");
        assert_eq!(translate("- dash"), "- dash");
    }

    #[test]
    fn test_links() {
        assert_eq!(translate("see [README]"), "see README");
        assert_eq!(
            translate("see [the docs|https://docs.acme.example/x]"),
            "see [the docs](https://docs.acme.example/x)"
        );
        assert_eq!(translate("cc [~accountid:5b10a]"), "cc [~accountid:5b10a]");
    }

    #[test]
    fn test_quotes_and_ruler() {
        assert_eq!(translate("bq. quoted"), "> quoted");
        assert_eq!(translate("{quote}q{quote}"), "\n>>>\nq\n>>>\n");
        assert_eq!(translate("{color:#ff0000}alert{color}"), "> **alert**");
        assert_eq!(translate("above\n-----\nbelow"), "above\n---\nbelow");
    }

    #[test]
    fn test_line_breaks() {
        assert_eq!(translate("a\r\nb"), "a  \nb");
        assert_eq!(translate(r"a\\b"), "a  \nb");
    }

    #[test]
    fn test_emoticons() {
        assert_eq!(translate("done (/) nice :)"), "done :white_check_mark: nice :smiley:");
        assert_eq!(translate("(*y)"), ":star:");
    }

    #[test]
    fn test_substitutions_run_last() {
        let mut subs = Substitutions::new();
        subs.insert(Substitution::literal("[~accountid:5b10a]", "@jroe").unwrap());
        let out = MarkupTranslator::new()
            .unwrap()
            .translate("*hi* [~accountid:5b10a]", &subs);
        assert_eq!(out, "**hi** @jroe");
    }

    #[test]
    fn test_not_idempotent() {
        let once = translate("h1. Title");
        assert_eq!(once, "# Title");
        assert_eq!(translate(&once), "1. Title");
    }
}
