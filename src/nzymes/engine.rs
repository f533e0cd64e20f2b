//! The engine
//!
//!     An [Engine] holds the collaborators of a host (content store, authorization, sandbox)
//!     and processes the injections of the content handed to it by a stage pipeline.
//!
//!     Entry points:
//!
//!         absorb    one pass over a content, called by a stage at some priority
//!         unescape  turn the markers of escaped injections back into injections
//!         handle    dispatch a stage registration to one of the above
//!         process   run the engine's own direct stage on a content, outside any host stage
//!
//!     Before any injection is evaluated, absorb checks in order that the processed item
//!     resolves, that it is inside the processing window, that its author can inject, and that
//!     there is at least one candidate injection. Failing any of them leaves the content as is.
//!
//!     Handler registrations made by the engine (deferrals, unescaping) go through [Engine::attach],
//!     which keeps the set of `(handler, stage, priority)` already registered. An engine is meant
//!     to be attached to a single stage pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::mem;
use std::sync::Arc;

use super::diagnostics::DiagnosticLog;
use super::evaluator::{Catalysis, Catalyst};
use super::host::{AuthorId, Authorization, ContentId, ContentItem, ContentStore, Sandbox};
use super::memory::Site;
use super::pipeline::{Handler, Pass, Pipeline, Registration, StagePipeline, Subject};
use super::policy::{authorize, Access, Operation};
use super::sandbox::Disabled;
use super::scanning::{self, next_injection};
use super::value::{render, Value};

/// Stage used by [Engine::process].
pub const DIRECT_STAGE: &str = "__nzymes__process";
pub const DEFAULT_PRIORITY: i32 = 9;
pub const UNESCAPE_PRIORITY: i32 = 1000;
/// Requester of content that belongs to no item.
pub const DETACHED_AUTHOR: AuthorId = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Priority the engine is attached at
    pub default_priority: i32,
    pub unescape_priority: i32,
    pub direct_stage: String,
    pub detached_author: AuthorId,
    /// Kinds searched, in order, for `@slug`
    pub slug_kinds: Vec<String>,
    /// Stages [Engine::attach_stages] attaches to
    pub stages: Vec<String>,
    /// Items dated before this are not processed, unless listed in `also_process`
    pub process_after: Option<DateTime<Utc>>,
    pub also_process: Vec<ContentId>,
    /// Turn panics of the sandbox into execution failures
    pub catch_panics: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            default_priority: DEFAULT_PRIORITY,
            unescape_priority: UNESCAPE_PRIORITY,
            direct_stage: DIRECT_STAGE.to_string(),
            detached_author: DETACHED_AUTHOR,
            slug_kinds: vec!["page".to_string(), "post".to_string()],
            stages: vec![
                "title".to_string(),
                "excerpt".to_string(),
                "content".to_string(),
            ],
            process_after: None,
            also_process: Vec::new(),
            catch_panics: true,
        }
    }
}

impl EngineOptions {
    /// True if the item is inside the processing window.
    pub fn covers(&self, item: &ContentItem) -> bool {
        match self.process_after {
            None => true,
            Some(after) => item.date >= after || self.also_process.contains(&item.id),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("no content store was given")]
    MissingStore,
    #[error("no authorization was given")]
    MissingAuthorization,
}

pub struct Engine {
    store: Arc<dyn ContentStore>,
    authorization: Arc<dyn Authorization>,
    sandbox: Box<dyn Sandbox>,
    options: EngineOptions,
    attached: BTreeSet<Registration>,
    /// Shared by everything processed, never reset
    extra: Value,
    diagnostics: DiagnosticLog,
    direct: Pipeline,
}

impl Engine {
    pub fn new(
        store: Arc<dyn ContentStore>,
        authorization: Arc<dyn Authorization>,
        sandbox: Box<dyn Sandbox>,
        options: EngineOptions,
    ) -> Self {
        Engine {
            store,
            authorization,
            sandbox,
            options,
            attached: BTreeSet::new(),
            extra: Value::Null,
            diagnostics: DiagnosticLog::new(),
            direct: Pipeline::new(),
        }
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn diagnostics(&self) -> &DiagnosticLog {
        &self.diagnostics
    }

    pub fn extra(&self) -> &Value {
        &self.extra
    }

    pub fn extra_mut(&mut self) -> &mut Value {
        &mut self.extra
    }

    /// Register a handler with the stage pipeline, once per `(handler, stage, priority)`.
    ///
    /// Returns false if it was already registered or the stage has no name.
    pub fn attach(
        &mut self,
        hooks: &mut dyn StagePipeline,
        handler: Handler,
        stage: &str,
        priority: i32,
    ) -> bool {
        if stage.is_empty() {
            return false;
        }
        let registration = Registration::new(handler, stage, priority);
        if !self.attached.insert(registration.clone()) {
            return false;
        }
        tracing::debug!(?handler, stage, priority, "attached");
        hooks.register(registration);
        true
    }

    /// Attach [Handler::Absorb] to every configured stage, at the default priority.
    pub fn attach_stages(&mut self, hooks: &mut dyn StagePipeline) {
        let priority = self.options.default_priority;
        for stage in self.options.stages.clone() {
            self.attach(hooks, Handler::Absorb, &stage, priority);
        }
    }

    pub fn attached(&self) -> impl Iterator<Item = &Registration> {
        self.attached.iter()
    }

    pub fn handle(
        &mut self,
        handler: Handler,
        content: &str,
        pass: &Pass,
        hooks: &mut dyn StagePipeline,
    ) -> String {
        match handler {
            Handler::Absorb => self.absorb(content, pass, hooks),
            Handler::Unescape => self.unescape(content),
        }
    }

    pub fn unescape(&self, content: &str) -> String {
        scanning::unescape(content)
    }

    /// Process the injections of `content` for one stage pass.
    pub fn absorb(&mut self, content: &str, pass: &Pass, hooks: &mut dyn StagePipeline) -> String {
        let processed = match pass.subject {
            Subject::Item(id) => match self.store.content(id) {
                Some(item) => Some(item),
                None => {
                    tracing::debug!(item = id, "absorb exit: no item");
                    return content.to_string();
                }
            },
            Subject::Detached => None,
        };
        if let Some(item) = &processed {
            if !self.options.covers(item) {
                tracing::debug!(item = item.id, "absorb exit: item not in the processing window");
                return content.to_string();
            }
        }
        let requester = processed
            .as_ref()
            .map(|item| item.author)
            .unwrap_or(self.options.detached_author);
        let decision = authorize(
            Operation::Inject,
            Access::own(requester),
            self.authorization.as_ref(),
        );
        if !decision.allowed {
            tracing::debug!(requester, %decision, "absorb exit: not authorized");
            return content.to_string();
        }
        let Some(first) = next_injection(content) else {
            tracing::debug!("absorb exit: no injection");
            return content.to_string();
        };

        let unescape_priority = self.options.unescape_priority;
        let mut intra = Value::Null;
        let mut continue_injecting = true;
        let mut catalyst = Catalyst {
            store: self.store.as_ref(),
            authorization: self.authorization.as_ref(),
            sandbox: self.sandbox.as_ref(),
            options: &self.options,
            diagnostics: &self.diagnostics,
            pass,
            processed: processed.as_ref(),
            requester,
            intra: &mut intra,
            extra: &mut self.extra,
            continue_injecting: &mut continue_injecting,
            requests: Vec::new(),
            rejected: false,
        };

        let mut result = String::with_capacity(content.len());
        let mut rest = content;
        let mut found = Some(first);
        while let Some(injection) = found {
            result.push_str(injection.before);
            if injection.is_escaped() {
                result.push_str(&injection.escaped());
                catalyst.request(Registration::new(
                    Handler::Unescape,
                    pass.stage.clone(),
                    unescape_priority,
                ));
            } else {
                match catalyst.catalyze(injection.raw) {
                    Catalysis::Skipped(text) => result.push_str(&text),
                    Catalysis::Rejected => result.push_str(&injection.source()),
                    Catalysis::Replaced(value) => result.push_str(&render(&value)),
                }
            }
            rest = injection.after;
            found = if catalyst.is_injecting() {
                next_injection(rest)
            } else {
                tracing::debug!("injecting stopped by code");
                None
            };
        }
        result.push_str(rest);

        for registration in catalyst.into_requests() {
            self.attach(
                hooks,
                registration.handler,
                &registration.stage,
                registration.priority,
            );
        }
        result
    }

    /// Run the direct stage on `content`.
    pub fn process(&mut self, content: &str, subject: Subject) -> String {
        let stage = self.options.direct_stage.clone();
        let priority = self.options.default_priority;
        let mut direct = mem::take(&mut self.direct);
        self.attach(&mut direct, Handler::Absorb, &stage, priority);
        let result = direct.apply(self, &stage, content, subject);
        self.direct = direct;
        result
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.diagnostics
            .report_armed("The code did not return to the engine.");
    }
}

/// Builds an [Engine]. The sandbox defaults to [Disabled] and the options to their defaults.
#[derive(Default)]
pub struct EngineBuilder {
    store: Option<Arc<dyn ContentStore>>,
    authorization: Option<Arc<dyn Authorization>>,
    sandbox: Option<Box<dyn Sandbox>>,
    options: EngineOptions,
    diagnostics: Option<DiagnosticLog>,
}

impl EngineBuilder {
    pub fn store(mut self, store: Arc<dyn ContentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn authorization(mut self, authorization: Arc<dyn Authorization>) -> Self {
        self.authorization = Some(authorization);
        self
    }

    /// Use a [Site] as both content store and authorization.
    pub fn site(self, site: Arc<Site>) -> Self {
        let store: Arc<dyn ContentStore> = site.clone();
        self.store(store).authorization(site)
    }

    pub fn sandbox(mut self, sandbox: impl Sandbox + 'static) -> Self {
        self.sandbox = Some(Box::new(sandbox));
        self
    }

    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Report into an existing log instead of a new one.
    pub fn diagnostics(mut self, diagnostics: DiagnosticLog) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub fn build(self) -> Result<Engine, EngineError> {
        let store = self.store.ok_or(EngineError::MissingStore)?;
        let authorization = self
            .authorization
            .ok_or(EngineError::MissingAuthorization)?;
        let sandbox = self
            .sandbox
            .unwrap_or_else(|| Box::new(Disabled));
        let mut engine = Engine::new(store, authorization, sandbox, self.options);
        if let Some(diagnostics) = self.diagnostics {
            engine.diagnostics = diagnostics;
        }
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nzymes::host::{Evaluation, ExecutionScope};
    use crate::nzymes::sandbox::FnSandbox;
    use chrono::TimeZone;
    use serde_json::json;

    const SITE: &str = r#"
authors:
  - id: 1
    login: admin
    roles: [Administrator]
  - id: 2
    login: writer
    roles: [PrivilegedUser]
  - id: 3
    login: coder
    roles: [TrustedCoder]
items:
  - id: 10
    slug: hello
    kind: post
    author: 2
    date: 2021-01-01T00:00:00Z
    fields:
      greeting: Hello
  - id: 11
    slug: old
    kind: post
    author: 2
    date: 2010-01-01T00:00:00Z
  - id: 20
    slug: lib
    kind: page
    author: 3
    date: 2021-01-01T00:00:00Z
    fields:
      double: "double"
      stop: "stop"
      motto: Shared
"#;

    fn site() -> Arc<Site> {
        Arc::new(Site::from_yaml_str(SITE).unwrap())
    }

    fn sandbox() -> FnSandbox {
        FnSandbox::new(|code: &str, arguments: &[Value], scope: &mut ExecutionScope<'_>| {
            match code {
                "double" => Evaluation::value(json!(arguments[0].as_i64().unwrap_or(0) * 2)),
                "stop" => {
                    scope.stop_injecting();
                    Evaluation::value(json!("stopped"))
                }
                other => Evaluation::failure(format!("unknown code {}", other)),
            }
        })
    }

    fn engine() -> Engine {
        Engine::builder().site(site()).sandbox(sandbox()).build().unwrap()
    }

    #[test]
    fn builder_needs_a_store() {
        let err = Engine::builder().build().err();
        assert_eq!(err, Some(EngineError::MissingStore));
    }

    #[test]
    fn process_replaces_injections() {
        let mut engine = engine();
        let out = engine.process("a {[1]} b {[=x=]} c", Subject::Item(10));
        assert_eq!(out, "a 1 b x c");
    }

    #[test]
    fn content_without_injections_is_untouched() {
        let mut engine = engine();
        assert_eq!(engine.process("plain", Subject::Item(10)), "plain");
    }

    #[test]
    fn unknown_item_is_untouched() {
        let mut engine = engine();
        assert_eq!(engine.process("{[1]}", Subject::Item(99)), "{[1]}");
    }

    #[test]
    fn processing_window() {
        let options = EngineOptions {
            process_after: Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()),
            ..Default::default()
        };
        let mut engine = Engine::builder()
            .site(site())
            .options(options.clone())
            .build()
            .unwrap();
        assert_eq!(engine.process("{[1]}", Subject::Item(11)), "{[1]}");
        assert_eq!(engine.process("{[1]}", Subject::Item(10)), "1");

        let mut engine = Engine::builder()
            .site(site())
            .options(EngineOptions {
                also_process: vec![11],
                ..options
            })
            .build()
            .unwrap();
        assert_eq!(engine.process("{[1]}", Subject::Item(11)), "1");
    }

    #[test]
    fn detached_content_runs_as_the_detached_author() {
        let mut engine = engine();
        assert_eq!(engine.process("{[@lib.motto]}", Subject::Detached), "Shared");
    }

    #[test]
    fn own_field_is_transcluded() {
        let mut engine = engine();
        assert_eq!(engine.process("{[.greeting]}", Subject::Item(10)), "Hello");
    }

    #[test]
    fn shared_code_runs_for_others() {
        let mut engine = engine();
        let out = engine.process("{[21|@lib.double(1)]}", Subject::Item(10));
        assert_eq!(out, "42");
        assert!(engine.diagnostics().is_empty());
    }

    #[test]
    fn code_can_stop_injecting() {
        let mut engine = engine();
        let out = engine.process("{[@lib.stop()]} {[1]}", Subject::Item(10));
        assert_eq!(out, "stopped {[1]}");
    }

    #[test]
    fn attach_is_idempotent() {
        let mut engine = engine();
        let mut hooks: Vec<Registration> = Vec::new();
        assert!(engine.attach(&mut hooks, Handler::Absorb, "content", 9));
        assert!(!engine.attach(&mut hooks, Handler::Absorb, "content", 9));
        assert!(!engine.attach(&mut hooks, Handler::Absorb, "", 9));
        engine.attach_stages(&mut hooks);
        assert_eq!(hooks.len(), 3);
        assert_eq!(engine.attached().count(), 3);
    }

    #[test]
    fn absorb_registers_deferrals() {
        let mut engine = engine();
        let mut hooks: Vec<Registration> = Vec::new();
        let pass = Pass::new("content", 9, Subject::Item(10));
        let out = engine.absorb("{[1|defer(20)]}", &pass, &mut hooks);
        assert_eq!(out, "{[1|defer(20)]}");
        assert_eq!(hooks, vec![Registration::new(Handler::Absorb, "content", 20)]);

        let later = Pass::new("content", 20, Subject::Item(10));
        assert_eq!(engine.absorb(&out, &later, &mut hooks), "1");
    }

    #[test]
    fn absorb_escapes_and_registers_unescape() {
        let mut engine = engine();
        let mut hooks: Vec<Registration> = Vec::new();
        let pass = Pass::new("title", 9, Subject::Item(10));
        let out = engine.absorb("{{[1]}", &pass, &mut hooks);
        assert_eq!(out, "{-[1]}");
        assert_eq!(hooks, vec![Registration::new(Handler::Unescape, "title", 1000)]);
        assert_eq!(engine.unescape(&out), "{[1]}");
    }

    #[test]
    fn extra_outlives_a_pass() {
        let mut engine = engine();
        *engine.extra_mut() = json!({"count": 1});
        engine.process("{[1]}", Subject::Item(10));
        assert_eq!(engine.extra(), &json!({"count": 1}));
    }
}
