//! Sequence evaluation
//!
//!     One injection at a time:
//!
//!         1. clean the interior
//!         2. check that the cleaned text is a chain of enzymes, or leave the injection as is
//!         3. parse it, and run each enzyme on a fresh stack, pushing what it yields
//!         4. the top of the stack replaces the injection
//!
//!     A `defer` that takes effect rejects the injection: it stays in the content as written,
//!     for the pass it was deferred to.
//!
//!     [Catalyst] carries what evaluation needs from the engine and from the content item
//!     being processed. It lives for one absorb call, so the intra-content slot and the
//!     "continue injecting" flag it borrows are shared by all the injections of that content.

use super::ast::Sequence;
use super::cleaning::clean;
use super::diagnostics::DiagnosticLog;
use super::engine::EngineOptions;
use super::grammar::is_valid_sequence;
use super::host::{AuthorId, Authorization, ContentItem, ContentStore, Sandbox};
use super::parsing::parse_sequence;
use super::pipeline::{Pass, Registration};
use super::stack::Stack;
use super::value::Value;

/// What became of an injection.
#[derive(Debug, Clone, PartialEq)]
pub enum Catalysis {
    /// Not a sequence; the injection text, delimiters included, stays as it was
    Skipped(String),
    /// A deferral took effect
    Rejected,
    /// The value that replaces the injection
    Replaced(Value),
}

/// Evaluation context for the injections of one content.
pub struct Catalyst<'e> {
    pub(super) store: &'e dyn ContentStore,
    pub(super) authorization: &'e dyn Authorization,
    pub(super) sandbox: &'e dyn Sandbox,
    pub(super) options: &'e EngineOptions,
    pub(super) diagnostics: &'e DiagnosticLog,
    pub(super) pass: &'e Pass,
    /// The item being processed, if any
    pub(super) processed: Option<&'e ContentItem>,
    /// Author on whose behalf enzymes run
    pub(super) requester: AuthorId,
    pub(super) intra: &'e mut Value,
    pub(super) extra: &'e mut Value,
    pub(super) continue_injecting: &'e mut bool,
    /// Registrations to hand to the stage pipeline once the content is done
    pub(super) requests: Vec<Registration>,
    pub(super) rejected: bool,
}

impl<'e> Catalyst<'e> {
    /// Evaluate the interior of one injection.
    pub fn catalyze(&mut self, raw: &str) -> Catalysis {
        let injection = format!("{{[{}]}}", raw);
        let cleaned = clean(raw);
        if !is_valid_sequence(&cleaned) {
            tracing::debug!(injection = %injection, "not a sequence, skipped");
            return Catalysis::Skipped(injection);
        }
        let sequence = match parse_sequence(&cleaned) {
            Ok(sequence) => sequence,
            Err(errors) => {
                tracing::warn!(injection = %injection, ?errors, "valid sequence did not parse");
                return Catalysis::Skipped(injection);
            }
        };

        self.rejected = false;
        let top = self.evaluate(&sequence, &injection);
        if self.rejected {
            Catalysis::Rejected
        } else {
            Catalysis::Replaced(top)
        }
    }

    /// Run the enzymes of a sequence and return the top of the stack.
    fn evaluate(&mut self, sequence: &Sequence, injection: &str) -> Value {
        let mut stack = Stack::new();
        for step in &sequence.steps {
            if self.rejected {
                break;
            }
            if let Some(value) = self.execute(step, injection, &mut stack) {
                stack.push([value]);
            }
        }
        stack
            .peek(1)
            .and_then(|mut top| top.pop())
            .unwrap_or(Value::Null)
    }

    /// Ask for a registration once the content is done.
    pub fn request(&mut self, registration: Registration) {
        if !self.requests.contains(&registration) {
            self.requests.push(registration);
        }
    }

    pub fn is_injecting(&self) -> bool {
        *self.continue_injecting
    }

    pub fn into_requests(self) -> Vec<Registration> {
        self.requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nzymes::memory::Site;
    use crate::nzymes::pipeline::{Handler, Subject};
    use crate::nzymes::sandbox::Disabled;
    use serde_json::json;

    fn site() -> Site {
        Site::from_yaml_str(
            r#"
authors:
  - id: 1
    login: admin
    roles: [Administrator]
"#,
        )
        .unwrap()
    }

    fn catalyze_all(raws: &[&str], priority: i32) -> (Vec<Catalysis>, Vec<Registration>) {
        let site = site();
        let options = EngineOptions::default();
        let diagnostics = DiagnosticLog::new();
        let pass = Pass::new("content", priority, Subject::Detached);
        let (mut intra, mut extra, mut go_on) = (Value::Null, Value::Null, true);
        let mut catalyst = Catalyst {
            store: &site,
            authorization: &site,
            sandbox: &Disabled,
            options: &options,
            diagnostics: &diagnostics,
            pass: &pass,
            processed: None,
            requester: 1,
            intra: &mut intra,
            extra: &mut extra,
            continue_injecting: &mut go_on,
            requests: Vec::new(),
            rejected: false,
        };
        let results = raws.iter().map(|raw| catalyst.catalyze(raw)).collect();
        (results, catalyst.into_requests())
    }

    #[test]
    fn outcomes() {
        let (results, requests) =
            catalyze_all(&["1|2", " 1 || 2 ", "defer(20)|1", "=a=|defer(5)"], 9);
        assert_eq!(
            results,
            vec![
                Catalysis::Replaced(json!(2)),
                Catalysis::Skipped("{[ 1 || 2 ]}".to_string()),
                Catalysis::Rejected,
                Catalysis::Replaced(json!("a")),
            ]
        );
        assert_eq!(requests, vec![Registration::new(Handler::Absorb, "content", 20)]);
    }

    #[test]
    fn a_rejection_does_not_carry_over() {
        let (results, _) = catalyze_all(&["defer(20)", "3"], 9);
        assert_eq!(results[1], Catalysis::Replaced(json!(3)));
    }

    #[test]
    fn requests_are_deduplicated() {
        let (_, requests) = catalyze_all(&["defer(20)", "defer(20)", "defer(30)"], 9);
        assert_eq!(requests.len(), 2);
    }
}
