//! The Jira wiki markup → GitLab Markdown rule table.
//!
//! Rules are applied in table order, each one to the output of the one
//! before it. Patterns use `regex-lite` syntax; replacements may refer to
//! capture groups as `${1}`.

/// One rewrite step of the translator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: &'static str,
    pub pattern: String,
    pub replacement: String,
}

impl Rule {
    pub fn new(name: &'static str, pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            name,
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }
}

/// Emoticon → emoji shortcode. Matched literally.
const EMOTICONS: &[(&str, &str)] = &[
    (":)", ":smiley:"),
    (":(", ":disappointed:"),
    (":P", ":yum:"),
    (":D", ":grin:"),
    (";)", ":wink:"),
    ("(y)", ":thumbsup:"),
    ("(n)", ":thumbsdown:"),
    ("(i)", ":information_source:"),
    ("(/)", ":white_check_mark:"),
    ("(x)", ":x:"),
    ("(!)", ":warning:"),
    ("(+)", ":heavy_plus_sign:"),
    ("(-)", ":heavy_minus_sign:"),
    ("(?)", ":grey_question:"),
    ("(on)", ":bulb:"),
];

/// The built-in rule table, in precedence order.
pub fn default_rules() -> Vec<Rule> {
    let mut rules = vec![
        // Preformatted blocks
        Rule::new("noformat", r"\s*\{noformat\}\s*", "\n```\n"),
        // `{code:lang}` or `{code:lang|title=...}` carries a language;
        // `{code:title=...}` and other parameter-only forms do not.
        Rule::new(
            "code-open-lang",
            r"\{code:([\w+#-]+)(?:\|[^}]*)?\}\s*",
            "\n```${1}\n",
        ),
        Rule::new("code-open-params", r"\{code[:|][^}]*\}\s*", "\n```\n"),
        Rule::new("code-close", r"\n?\{code\}\s*", "\n```\n"),
        // Line breaks
        Rule::new("crlf", r"\r\n", "  \n"),
        Rule::new("forced-break", r"\\\\", "  \n"),
        // Quotes
        Rule::new("bq", r"(?m)^[ \t]*bq\.[ \t]+(.*)$", "> ${1}"),
        Rule::new("quote", r"\{quote\}", "\n>>>\n"),
        Rule::new("color", r"\{color:[#\w]+\}(.*?)\{color\}", "> **${1}**"),
        Rule::new("ruler", r"(?m)^-{4,}[ \t]*$", "---"),
        // Links; `[~...]` mentions are left to caller substitutions
        Rule::new("link", r"\[([^~|\]]*)\]", "${1}"),
        Rule::new(
            "aliased-link",
            r"\[([^|\]]+)\|([a-z]+://[^\]]+)\]",
            "[${1}](${2})",
        ),
        // Lists
        Rule::new("ordered-1", r"(?m)^ *# ", "1. "),
        Rule::new("ordered-2", r"(?m)^ *[*#-]# ", "   1. "),
        Rule::new("ordered-3", r"(?m)^ *[*#-]{2}# ", "      1. "),
        Rule::new("unordered-1", r"(?m)^ *[*-] ", "- "),
        Rule::new("unordered-2", r"(?m)^ *[*#-][*-] ", "   - "),
        Rule::new("unordered-3", r"(?m)^ *[*#-]{2}[*-] ", "      - "),
        // Text effects
        // Bodies never contain their own delimiter. An opening `*` or `{{`
        // never follows a word character.
        Rule::new(
            "bold",
            r"(^|[^*\w])\*([^\s*](?:[^*]*?[^\s*])??)\*\B",
            "${1}**${2}**",
        ),
        Rule::new("emphasis", r"\b_([^\s_](?:[^_]*?[^\s_])??)_\b", "*${1}*"),
        Rule::new("strikethrough", r"\B-([^\s-](?:[^-]*?[^\s-])??)-\B", "~~${1}~~"),
        Rule::new("underline", r"\B\+([^\s+](?:[^+]*?[^\s+])??)\+\B", "__${1}__"),
        Rule::new(
            "inline-code",
            r"(^|[^\w])\{\{([^}\n]+(?:\}[^}\n]+)*)\}\}\B",
            "${1}`${2}`",
        ),
    ];

    for level in 1..=6 {
        rules.push(Rule::new(
            "heading",
            format!(r"(?m)^h{}\.[ \t]+", level),
            format!("{} ", "#".repeat(level)),
        ));
    }

    for (emoticon, code) in EMOTICONS {
        rules.push(Rule::new("emoticon", regex_lite::escape(emoticon), *code));
    }
    rules.push(Rule::new("emoticon", r"\(\*[rgby]?\)", ":star:"));

    rules
}
