//! Injection discovery
//!
//!     Content is scanned left to right for the next `{[ ... ]}`. The interior is not checked
//!     here: anything between the first `{[` and the first `]}` after it is a candidate.
//!
//!     An injection right after a `{` (the source reads `{{[ ... ]}`) is escaped. It is
//!     rewritten to the marker form `{-[ ... ]}`, which no later pass mistakes for an
//!     injection, and [unescape] turns the marker back into `{[ ... ]}` at the very end.

use once_cell::sync::Lazy;
use regex::Regex;

static INJECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{\[(?P<could_be_sequence>.*?)\]\}").unwrap());

const OPEN: &str = "{[";
const CLOSE: &str = "]}";
const ESCAPED_OPEN: &str = "{-[";

/// A candidate injection, splitting the scanned content in three.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Injection<'a> {
    pub before: &'a str,
    /// The interior, as written
    pub raw: &'a str,
    pub after: &'a str,
}

impl<'a> Injection<'a> {
    /// True if the source had `{{[`, i.e. `before` ends with `{`.
    pub fn is_escaped(&self) -> bool {
        self.before.ends_with('{')
    }

    /// The injection with its delimiters, as found in the content.
    pub fn source(&self) -> String {
        format!("{}{}{}", OPEN, self.raw, CLOSE)
    }

    /// What replaces an escaped injection; after the `{` of `before` it reads `{-[raw]}`.
    pub fn escaped(&self) -> String {
        format!("-[{}{}", self.raw, CLOSE)
    }
}

/// Find the next candidate injection in `content`.
pub fn next_injection(content: &str) -> Option<Injection<'_>> {
    let caps = INJECTION.captures(content)?;
    let whole = caps.get(0)?;
    let raw = caps.name("could_be_sequence")?;
    Some(Injection {
        before: &content[..whole.start()],
        raw: raw.as_str(),
        after: &content[whole.end()..],
    })
}

/// Turn escaped injection markers back into plain injections.
pub fn unescape(content: &str) -> String {
    content.replace(ESCAPED_OPEN, OPEN)
}
