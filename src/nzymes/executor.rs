//! Enzyme execution
//!
//!     Dispatch of each parsed enzyme, with the resolution of the content item it addresses
//!     and the capability gate in front of every lookup and code execution.
//!
//!     Failures are values: an unresolved item is `Null`, a denied field transclusion is an
//!     empty string, a denied attribute or execution is `Null`. Code that fails is reported
//!     to the diagnostics and yields `Null`.

use std::panic::{self, AssertUnwindSafe};

use super::ast::{Enzyme, Execution, Literal, Lookup, Owner, PostRef, Reference, Step, Transclusion};
use super::diagnostics::{Diagnostic, DiagnosticKind};
use super::evaluator::Catalyst;
use super::host::{ContentItem, ContentStatus, Entity, Evaluation, ExecutionScope};
use super::pipeline::{Handler, Registration};
use super::policy::{authorize, Access, Decision, Operation};
use super::stack::Stack;
use super::value::{collapse, key_of, Value};

impl<'e> Catalyst<'e> {
    /// Run one enzyme. `None` means there is nothing to push.
    pub(super) fn execute(
        &mut self,
        step: &Step,
        injection: &str,
        stack: &mut Stack<Value>,
    ) -> Option<Value> {
        match &step.enzyme {
            Enzyme::Literal { literal } => Some(match literal {
                Literal::Integer(number) => Value::from(*number),
                Literal::Text(text) => Value::String(text.clone()),
            }),
            Enzyme::Transclusion(transclusion) => Some(self.transclude(transclusion)),
            Enzyme::Execution { execution } => match execution {
                Execution::Array(count) => Some(array(*count, stack)),
                Execution::Assoc(count) => Some(assoc(*count, stack)),
                Execution::Defer(priority) => {
                    self.defer(*priority);
                    None
                }
                Execution::Call {
                    reference,
                    arguments,
                } => Some(self.call(reference, *arguments, step, injection, stack)),
            },
        }
    }

    fn defer(&mut self, priority: i32) {
        if self.pass.priority >= priority {
            return;
        }
        tracing::debug!(stage = %self.pass.stage, from = self.pass.priority, to = priority, "deferred");
        self.request(Registration::new(
            Handler::Absorb,
            self.pass.stage.clone(),
            priority,
        ));
        self.rejected = true;
    }

    fn allowed(&self, operation: Operation, access: Access) -> Decision {
        let decision = authorize(operation, access, self.authorization);
        if !decision.allowed {
            tracing::debug!(?operation, requester = access.requester, addressed = access.addressed, %decision, "not authorized");
        }
        decision
    }

    /// The item a post reference stands for, if it can be used by the requester.
    pub(super) fn resolve(&self, post: &PostRef) -> Option<ContentItem> {
        let item = match post {
            PostRef::Current => self.processed.cloned(),
            PostRef::Id(id) => self.store.content(*id),
            PostRef::Slug(slug) => {
                let kinds = self.store.slug_kinds(self.options.slug_kinds.clone());
                self.store
                    .find_by_slug(slug, &kinds)
                    .and_then(|id| self.store.content(id))
            }
            PostRef::SlugWithFallback(slug) => {
                let kinds = self.store.slug_kinds(Vec::new());
                match self.store.find_by_slug(slug, &kinds) {
                    Some(id) => self.store.content(id),
                    None if self
                        .allowed(Operation::ResolveMissing, Access::own(self.requester))
                        .allowed =>
                    {
                        self.store.missing_content(slug)
                    }
                    None => None,
                }
            }
        };

        let item = item?;
        if item.status == ContentStatus::Publish || item.author == self.requester {
            Some(item)
        } else {
            tracing::debug!(item = item.id, status = item.status.as_str(), "item not usable");
            None
        }
    }

    /// Values of a custom field of the item or its author.
    fn field(&self, item: &ContentItem, reference: &Reference) -> Value {
        match reference.owner {
            Owner::Content => collapse(self.store.fields(Entity::Content(item), &reference.field)),
            Owner::Author => match self.store.author(item.author) {
                Some(author) => {
                    collapse(self.store.fields(Entity::Author(&author), &reference.field))
                }
                None => Value::Null,
            },
        }
    }

    fn attribute(&self, item: &ContentItem, reference: &Reference) -> Value {
        let value = match reference.owner {
            Owner::Content => self.store.attribute(Entity::Content(item), &reference.field),
            Owner::Author => self
                .store
                .author(item.author)
                .and_then(|author| self.store.attribute(Entity::Author(&author), &reference.field)),
        };
        value.unwrap_or(Value::Null)
    }

    fn transclude(&self, transclusion: &Transclusion) -> Value {
        let reference = &transclusion.reference;
        let Some(item) = self.resolve(&reference.post) else {
            return Value::Null;
        };
        let access = Access::between(self.requester, item.author);
        match transclusion.lookup {
            Lookup::Field => {
                if !self.allowed(Operation::TranscludeField, access).allowed {
                    return Value::String(String::new());
                }
                self.field(&item, reference)
            }
            Lookup::Attribute => {
                if !self.allowed(Operation::UseAttribute, access).allowed {
                    return Value::Null;
                }
                self.attribute(&item, reference)
            }
        }
    }

    /// Run the code stored in a field.
    ///
    /// Arguments leave the stack before the item is resolved or the call authorized, so a
    /// denied call still consumes them.
    fn call(
        &mut self,
        reference: &Reference,
        count: usize,
        step: &Step,
        injection: &str,
        stack: &mut Stack<Value>,
    ) -> Value {
        let arguments = if count > 0 {
            stack.pop(count).unwrap_or_default()
        } else {
            Vec::new()
        };

        let Some(item) = self.resolve(&reference.post) else {
            return Value::Null;
        };
        let access = Access::between(self.requester, item.author);
        if !self.allowed(Operation::ExecuteField, access).allowed {
            return Value::Null;
        }

        let code = self.field(&item, reference);
        self.run(code, &arguments, &item, step, injection)
    }

    fn run(
        &mut self,
        code: Value,
        arguments: &[Value],
        origin: &ContentItem,
        step: &Step,
        injection: &str,
    ) -> Value {
        let context = |kind| {
            Diagnostic::new(
                kind,
                self.processed.map(|item| item.id),
                step.source.as_str(),
                injection,
            )
        };

        let code = match code {
            Value::String(code) => code,
            other => {
                self.diagnostics.report(context(DiagnosticKind::Error).with_detail(format!(
                    "Code to execute must be a string: {} given.",
                    type_name(&other)
                )));
                return Value::Null;
            }
        };
        let code = code.trim();
        if code.is_empty() {
            self.diagnostics
                .report(context(DiagnosticKind::Error).with_detail("No code to execute."));
            return Value::Null;
        }

        let pending = context(DiagnosticKind::Shutdown).with_code(code);
        self.diagnostics.arm(pending.clone());
        let evaluation = {
            let mut scope = ExecutionScope::new(
                origin,
                self.processed,
                &mut *self.intra,
                &mut *self.extra,
                &mut *self.continue_injecting,
            );
            let sandbox = self.sandbox;
            if self.options.catch_panics {
                panic::catch_unwind(AssertUnwindSafe(|| {
                    sandbox.evaluate(code, arguments, &mut scope)
                }))
                .unwrap_or_else(|payload| Evaluation::failure(panic_message(payload.as_ref())))
            } else {
                sandbox.evaluate(code, arguments, &mut scope)
            }
        };
        self.diagnostics.disarm();

        let mut value = evaluation.value;
        if let Some(error) = evaluation.error {
            self.diagnostics.report(
                pending
                    .with_kind(DiagnosticKind::Error)
                    .with_detail(error),
            );
            value = Value::Null;
        }
        if !evaluation.output.is_empty() {
            self.diagnostics
                .report(context(DiagnosticKind::Output).with_detail(evaluation.output));
        }
        value
    }
}

/// `array(n)`: the last `n` values, in push order.
fn array(count: usize, stack: &mut Stack<Value>) -> Value {
    if count == 0 {
        return Value::Null;
    }
    stack.pop(count).map(Value::Array).unwrap_or(Value::Null)
}

/// `assoc(n)`: the last `2n` values, read as key, value, key, value...
fn assoc(count: usize, stack: &mut Stack<Value>) -> Value {
    if count == 0 {
        return Value::Null;
    }
    let arguments = stack.pop(count.saturating_mul(2)).unwrap_or_default();
    let mut map = serde_json::Map::new();
    for pair in arguments.chunks(2) {
        let value = pair.get(1).cloned().unwrap_or(Value::Null);
        match key_of(&pair[0]) {
            Some(key) => {
                map.insert(key, value);
            }
            None => tracing::warn!(key = %pair[0], "assoc key is not a scalar, pair skipped"),
        }
    }
    // Pairs missing from the stack all collapse into the same empty key.
    if count > arguments.len().div_ceil(2) {
        map.insert(String::new(), Value::Null);
    }
    Value::Object(map)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "code panicked".to_string()
    }
}
