//! Sequence cleaning
//!
//!     Authors write sequences inside rich text, so the interior of an injection usually
//!     carries noise: comments, line breaks and indentation, markup the editor added, and
//!     non-breaking spaces where a plain space was typed. Cleaning removes all of it, in order:
//!
//!         1. block comments `/* ... */`
//!         2. blanks outside quoted strings; inside them only non-breaking spaces change
//!         3. backslashes in front of injection delimiters (`\{`, `\[`, `\]`, `\}`)
//!         4. markup tags

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::grammar::{Usage, GRAMMAR};

static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());

static MAYBE_QUOTED: Lazy<Regex> = Lazy::new(|| {
    let string = GRAMMAR
        .extract("string", Usage::Standalone)
        .expect("string rule is declared");
    Regex::new(&format!(
        r"(?s)(?P<before_string>.*?){}|(?P<anything_else>.+)",
        string
    ))
    .unwrap()
});

// `\s` already covers U+00A0, it is listed for the editors that only emit that one.
static BLANKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:\s|\u{a0})+").unwrap());

static ESCAPED_DELIMITER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\([{\[\]}])").unwrap());

static TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->|<[/!?]?[A-Za-z][^>]*>").unwrap());

/// Remove the noise from the interior of an injection.
pub fn clean(raw: &str) -> String {
    let result = COMMENT.replace_all(raw, "");
    let result = MAYBE_QUOTED.replace_all(&result, strip_blanks);
    let result = ESCAPED_DELIMITER.replace_all(&result, "$1");
    let result = TAG.replace_all(&result, "");
    result.into_owned()
}

fn strip_blanks(caps: &Captures) -> String {
    match caps.name("string") {
        Some(string) => {
            let before = caps.name("before_string").map_or("", |m| m.as_str());
            format!(
                "{}{}",
                BLANKS.replace_all(before, ""),
                string.as_str().replace('\u{a0}', " ")
            )
        }
        None => {
            let rest = caps.name("anything_else").map_or("", |m| m.as_str());
            BLANKS.replace_all(rest, "").into_owned()
        }
    }
}
