//! Grammar Rule Definitions
//!
//!     The enzyme grammar, top down:
//!
//!         injection    := "{[" sequence "]}"
//!         sequence     := enzyme ("|" enzyme)*
//!         enzyme       := execution | transclusion | literal
//!
//!         literal      := integer | str_literal
//!         integer      := [0-9]+
//!         str_literal  := string
//!         string       := "=" <text where "=" and "\" are escaped by a prefixed "\"> "="
//!
//!         transclusion := item | attr
//!         item         := post_item | author_item
//!         attr         := post_attr | author_attr
//!         post_item    := post "." field
//!         author_item  := post "/author." field
//!         post_attr    := post ":" field
//!         author_attr  := post "/author:" field
//!         post         := [0-9]+ | "@@" slug | "@" slug | ""
//!         slug         := [\w+~-]+
//!         field        := [^|.=\]}]+ | string
//!
//!         execution    := ("array" | "assoc" | "defer" | item) "(" [0-9]* ")"
//!
//!     The rules are declared bottom up in [ENZYME_GRAMMAR]. A template refers to an earlier
//!     rule with a `<name>` placeholder, which composition replaces with the embedded (non
//!     capturing) form of that rule. Since a rule may only refer to rules declared before it,
//!     composing never meets an unresolved placeholder.
//!
//!     The composed patterns are recognizers: they say whether a text belongs to a rule. The
//!     structure of a sequence comes from the [parser](super::parsing), which accepts the same
//!     language.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Grammar rules as regex templates, bottom up.
///
/// Each entry is a tuple of (rule_name, template). Templates never contain capture groups of
/// their own; composition gives each rule exactly one named group, its own name.
pub const ENZYME_GRAMMAR: &[(&str, &str)] = &[
    ("integer", r"[0-9]+"),
    ("string", r"=[^=\\]*(?:\\(?s:.)[^=\\]*)*="),
    ("str_literal", r"<string>"),
    ("literal", r"<integer>|<str_literal>"),
    ("slug", r"[\w+~-]+"),
    ("post", r"[0-9]+|@@<slug>|@<slug>|"),
    // Blanks outside strings are gone by the time a field is matched.
    ("field", r"[^|.=\]}]+|<string>"),
    ("post_item", r"<post>\.<field>"),
    ("author_item", r"<post>/author\.<field>"),
    ("item", r"<post_item>|<author_item>"),
    ("post_attr", r"<post>:<field>"),
    ("author_attr", r"<post>/author:<field>"),
    ("attr", r"<post_attr>|<author_attr>"),
    ("transclusion", r"<item>|<attr>"),
    (
        "execution",
        r"(?:\b(?:array|assoc|defer)\b|<item>)\([0-9]*\)",
    ),
    ("enzyme", r"<execution>|<transclusion>|<literal>"),
    ("sequence", r"<enzyme>(?:\|<enzyme>)*"),
    ("injection", r"\{\[<sequence>\]\}"),
];

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([a-z_]+)>").unwrap());

/// The composed enzyme grammar.
pub static GRAMMAR: Lazy<Grammar> =
    Lazy::new(|| Grammar::compose(ENZYME_GRAMMAR).expect("enzyme grammar is declared bottom up"));

static SEQUENCE_VALID: Lazy<Regex> = Lazy::new(|| {
    let enzyme = GRAMMAR
        .extract("enzyme", Usage::Embedded)
        .expect("enzyme rule is declared");
    Regex::new(&format!(r"^(?:\|{})+$", enzyme)).unwrap()
});

/// Errors that can occur while composing a grammar
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GrammarError {
    /// A template refers to a rule that is unknown or declared later
    #[error("rule '{rule}' refers to '{reference}', which is not declared before it")]
    UnknownRule { rule: String, reference: String },
    /// Two rules share a name
    #[error("rule '{0}' is declared more than once")]
    DuplicateRule(String),
    /// The extracted pattern does not exist
    #[error("no rule named '{0}'")]
    MissingRule(String),
    /// The composed pattern is not a valid regex
    #[error("rule '{rule}' does not compile: {message}")]
    Invalid { rule: String, message: String },
}

/// How an extracted rule is going to be used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    /// As a sub-expression of another pattern: `(?:body)`
    Embedded,
    /// As a free-standing pattern capturing the rule by name: `(?P<name>body)`
    Standalone,
    /// Like [`Usage::Standalone`], matching the whole text: `^(?P<name>body)$`
    Anchored,
}

/// A rule after composition
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: String,
    pub template: String,
    /// The template with every placeholder substituted
    pub body: String,
}

/// A set of composed rules, in declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct Grammar {
    rules: Vec<Rule>,
    index: HashMap<String, usize>,
}

impl Grammar {
    /// Compose the rules in order, interpolating each template with the rules before it.
    pub fn compose(rules: &[(&str, &str)]) -> Result<Self, GrammarError> {
        let mut grammar = Grammar {
            rules: Vec::with_capacity(rules.len()),
            index: HashMap::new(),
        };

        for (name, template) in rules {
            if grammar.index.contains_key(*name) {
                return Err(GrammarError::DuplicateRule(name.to_string()));
            }

            let mut body = String::with_capacity(template.len());
            let mut last = 0;
            for caps in PLACEHOLDER.captures_iter(template) {
                let whole = caps.get(0).unwrap();
                let reference = &caps[1];
                let embedded = grammar.extract(reference, Usage::Embedded).ok_or_else(|| {
                    GrammarError::UnknownRule {
                        rule: name.to_string(),
                        reference: reference.to_string(),
                    }
                })?;
                body.push_str(&template[last..whole.start()]);
                body.push_str(&embedded);
                last = whole.end();
            }
            body.push_str(&template[last..]);

            grammar.index.insert(name.to_string(), grammar.rules.len());
            grammar.rules.push(Rule {
                name: name.to_string(),
                template: template.to_string(),
                body,
            });
        }

        Ok(grammar)
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.index.get(name).map(|&i| &self.rules[i])
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// The pattern of a rule, shaped for the given usage.
    pub fn extract(&self, name: &str, usage: Usage) -> Option<String> {
        let rule = self.rule(name)?;
        Some(match usage {
            Usage::Embedded => format!("(?:{})", rule.body),
            Usage::Standalone => format!("(?P<{}>{})", rule.name, rule.body),
            Usage::Anchored => format!("^(?P<{}>{})$", rule.name, rule.body),
        })
    }

    /// Compile the pattern of a rule.
    pub fn regex(&self, name: &str, usage: Usage) -> Result<Regex, GrammarError> {
        let pattern = self
            .extract(name, usage)
            .ok_or_else(|| GrammarError::MissingRule(name.to_string()))?;
        Regex::new(&pattern).map_err(|e| GrammarError::Invalid {
            rule: name.to_string(),
            message: e.to_string(),
        })
    }
}

/// True if the cleaned text is a chain of enzymes and nothing else.
pub fn is_valid_sequence(cleaned: &str) -> bool {
    SEQUENCE_VALID.is_match(&format!("|{}", cleaned))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn every_rule_compiles() {
        for rule in GRAMMAR.rules() {
            for usage in [Usage::Embedded, Usage::Standalone, Usage::Anchored] {
                assert!(
                    GRAMMAR.regex(&rule.name, usage).is_ok(),
                    "rule {} does not compile as {:?}",
                    rule.name,
                    usage
                );
            }
        }
    }

    #[test]
    fn placeholders_are_fully_resolved() {
        for rule in GRAMMAR.rules() {
            assert!(
                !PLACEHOLDER.is_match(&rule.body),
                "rule {} kept a placeholder",
                rule.name
            );
        }
    }

    #[test]
    fn forward_references_are_rejected() {
        let rules = [("item", r"<post>\.x"), ("post", r"[0-9]+")];
        assert_eq!(
            Grammar::compose(&rules),
            Err(GrammarError::UnknownRule {
                rule: "item".into(),
                reference: "post".into()
            })
        );
    }

    #[test]
    fn duplicate_rules_are_rejected() {
        let rules = [("a", "x"), ("a", "y")];
        assert_eq!(
            Grammar::compose(&rules),
            Err(GrammarError::DuplicateRule("a".into()))
        );
    }

    #[test]
    fn composition_embeds_sub_rules() {
        let grammar = Grammar::compose(&[("digit", "[0-9]"), ("pair", "<digit><digit>")]).unwrap();
        assert_eq!(grammar.rule("pair").unwrap().body, "(?:[0-9])(?:[0-9])");
        assert_eq!(
            grammar.extract("pair", Usage::Anchored).unwrap(),
            "^(?P<pair>(?:[0-9])(?:[0-9]))$"
        );
    }

    #[test]
    fn standalone_usage_captures_by_name() {
        let regex = GRAMMAR.regex("string", Usage::Standalone).unwrap();
        let caps = regex.captures(r"x =a\=b= y").unwrap();
        assert_eq!(&caps["string"], r"=a\=b=");
    }

    #[rstest]
    #[case("42")]
    #[case("=hello=")]
    #[case(".field")]
    #[case("123.field")]
    #[case("@about/author:display_name")]
    #[case("@@missing.=spaced field=")]
    #[case("1|2|3|array(3)")]
    #[case("=a=|1|=b=|2|assoc(2)")]
    #[case("defer(20)")]
    #[case(".code(2)")]
    #[case(".code()")]
    #[case(":post_title")]
    fn valid_sequences(#[case] cleaned: &str) {
        assert!(is_valid_sequence(cleaned), "{cleaned} should be valid");
    }

    #[rstest]
    #[case("")]
    #[case("1||2")]
    #[case("foo(")]
    #[case("|1")]
    #[case("1|")]
    #[case("=unterminated")]
    #[case(".a.b")]
    #[case("xarray(2)")]
    #[case("-5")]
    fn invalid_sequences(#[case] cleaned: &str) {
        assert!(!is_valid_sequence(cleaned), "{cleaned} should be invalid");
    }

    #[test]
    fn anchored_enzyme_matches_whole_text_only() {
        let enzyme = GRAMMAR.regex("enzyme", Usage::Anchored).unwrap();
        assert!(enzyme.is_match("array(3)"));
        assert!(!enzyme.is_match("array(3)|1"));
    }
}
