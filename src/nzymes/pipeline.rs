//! Named priority stages
//!
//!     A host renders content through named stages (a title, an excerpt, the body). Each stage
//!     runs its handlers in ascending priority, every handler taking the content left by the
//!     previous one. The engine hooks into a stage by registering a [Handler] at a priority.
//!
//!     Handlers may register more handlers while a stage runs. Those above the running
//!     priority still run in the same rendering: a deferred injection is absorbed again later
//!     in the stage, and escaped injections are unescaped at the very end of it.

use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Bound;

use super::engine::Engine;
use super::host::ContentId;

/// What the engine does when a stage reaches one of its registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Handler {
    /// Process the injections in the content
    Absorb,
    /// Turn escaped injection markers back into injections
    Unescape,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Registration {
    pub handler: Handler,
    pub stage: String,
    pub priority: i32,
}

impl Registration {
    pub fn new(handler: Handler, stage: impl Into<String>, priority: i32) -> Self {
        Registration {
            handler,
            stage: stage.into(),
            priority,
        }
    }
}

/// What the content belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    Item(ContentId),
    /// Content with no item, like a site title
    Detached,
}

/// The running stage, as seen by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pass {
    pub stage: String,
    pub priority: i32,
    pub subject: Subject,
}

impl Pass {
    pub fn new(stage: impl Into<String>, priority: i32, subject: Subject) -> Self {
        Pass {
            stage: stage.into(),
            priority,
            subject,
        }
    }
}

/// A host's stage pipeline, as far as the engine needs it.
pub trait StagePipeline {
    /// Add a handler to a stage. Registering the same handler twice at the same stage and
    /// priority has no effect.
    fn register(&mut self, registration: Registration);
}

impl StagePipeline for Vec<Registration> {
    fn register(&mut self, registration: Registration) {
        if !self.contains(&registration) {
            self.push(registration);
        }
    }
}

/// An in-memory stage pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    stages: BTreeMap<String, BTreeMap<i32, Vec<Handler>>>,
}

impl StagePipeline for Pipeline {
    fn register(&mut self, registration: Registration) {
        let handlers = self
            .stages
            .entry(registration.stage)
            .or_default()
            .entry(registration.priority)
            .or_default();
        if !handlers.contains(&registration.handler) {
            handlers.push(registration.handler);
        }
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered handlers of a stage, by ascending priority.
    pub fn handlers(&self, stage: &str) -> Vec<(i32, Handler)> {
        self.stages
            .get(stage)
            .map(|priorities| {
                priorities
                    .iter()
                    .flat_map(|(p, handlers)| handlers.iter().map(move |h| (*p, *h)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First priority of a stage strictly above `after`, with its handlers.
    fn next_priority(&self, stage: &str, after: Option<i32>) -> Option<(i32, Vec<Handler>)> {
        let priorities = self.stages.get(stage)?;
        let lower = match after {
            Some(priority) => Bound::Excluded(priority),
            None => Bound::Unbounded,
        };
        priorities
            .range((lower, Bound::Unbounded))
            .next()
            .map(|(priority, handlers)| (*priority, handlers.clone()))
    }

    /// Run a stage on `content` and return the result.
    pub fn apply(
        &mut self,
        engine: &mut Engine,
        stage: &str,
        content: &str,
        subject: Subject,
    ) -> String {
        let mut content = content.to_string();
        let mut done = None;
        while let Some((priority, handlers)) = self.next_priority(stage, done) {
            let pass = Pass::new(stage, priority, subject);
            for handler in handlers {
                tracing::trace!(stage, priority, ?handler, "running handler");
                content = engine.handle(handler, &content, &pass, self);
            }
            done = Some(priority);
        }
        content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registering_twice_is_a_no_op() {
        let mut pipeline = Pipeline::new();
        pipeline.register(Registration::new(Handler::Absorb, "content", 9));
        pipeline.register(Registration::new(Handler::Absorb, "content", 9));
        pipeline.register(Registration::new(Handler::Absorb, "content", 20));
        pipeline.register(Registration::new(Handler::Unescape, "content", 1000));
        assert_eq!(
            pipeline.handlers("content"),
            vec![
                (9, Handler::Absorb),
                (20, Handler::Absorb),
                (1000, Handler::Unescape)
            ]
        );
        assert!(pipeline.handlers("title").is_empty());
    }

    #[test]
    fn priorities_are_visited_in_order() {
        let mut pipeline = Pipeline::new();
        pipeline.register(Registration::new(Handler::Unescape, "content", 1000));
        pipeline.register(Registration::new(Handler::Absorb, "content", -5));
        assert_eq!(
            pipeline.next_priority("content", None),
            Some((-5, vec![Handler::Absorb]))
        );
        assert_eq!(
            pipeline.next_priority("content", Some(-5)),
            Some((1000, vec![Handler::Unescape]))
        );
        assert_eq!(pipeline.next_priority("content", Some(1000)), None);
    }

    #[test]
    fn collecting_registrations() {
        let mut collected: Vec<Registration> = Vec::new();
        collected.register(Registration::new(Handler::Absorb, "title", 9));
        collected.register(Registration::new(Handler::Absorb, "title", 9));
        assert_eq!(collected.len(), 1);
    }
}
