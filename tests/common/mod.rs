//! Shared fixtures for the engine integration tests
//!
//! A small site with one author per role, and a scripted sandbox whose "code" is a keyword.

#![allow(dead_code)]

use nzymes::nzymes::memory::Site;
use nzymes::nzymes::sandbox::FnSandbox;
use nzymes::nzymes::{Engine, EngineOptions, Evaluation, ExecutionScope, Value};
use serde_json::json;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

pub const SITE: &str = r#"
authors:
  - id: 1
    login: admin
    roles: [Administrator]
  - id: 2
    login: ann
    display_name: Ann
    roles: [User]
  - id: 3
    login: bob
    roles: [PrivilegedUser]
  - id: 4
    login: cody
    roles: [Coder]
  - id: 5
    login: tess
    roles: [TrustedCoder]
  - id: 6
    login: nobody
items:
  - id: 10
    slug: ann-post
    kind: post
    author: 2
    date: 2021-01-01T00:00:00Z
    title: Ann's
    fields:
      greeting: Hello
      code: sum
  - id: 11
    slug: bob-post
    kind: post
    author: 3
    date: 2021-01-01T00:00:00Z
    title: Bob's
    fields:
      greeting: Hi
      code: sum
  - id: 12
    slug: cody-lib
    kind: page
    author: 4
    date: 2021-01-01T00:00:00Z
    fields:
      sum: sum
  - id: 13
    slug: tess-lib
    kind: page
    author: 5
    date: 2021-01-01T00:00:00Z
    fields:
      sum: sum
      set: set
      get: get
      count: count
      stop: stop
      panic: panic
      fail: fail
      print: print
      number: 5
      blank: "   "
      motto: Shared
  - id: 14
    slug: draft
    kind: post
    status: draft
    author: 5
    date: 2021-01-01T00:00:00Z
    fields:
      motto: Not yet
  - id: 15
    slug: nobody-post
    kind: post
    author: 6
    date: 2021-01-01T00:00:00Z
"#;

pub fn site() -> Site {
    Site::from_yaml_str(SITE).expect("fixture site")
}

/// Counts the calls that reach the sandbox.
#[derive(Clone, Default)]
pub struct Calls(Rc<Cell<usize>>);

impl Calls {
    pub fn count(&self) -> usize {
        self.0.get()
    }
}

/// A sandbox that understands a handful of keywords.
pub fn sandbox(calls: Calls) -> FnSandbox {
    FnSandbox::new(
        move |code: &str, arguments: &[Value], scope: &mut ExecutionScope<'_>| {
            calls.0.set(calls.0.get() + 1);
            match code {
                "sum" => Evaluation::value(json!(arguments
                    .iter()
                    .filter_map(Value::as_i64)
                    .sum::<i64>())),
                "set" => {
                    *scope.intra = arguments.first().cloned().unwrap_or(Value::Null);
                    Evaluation::value(Value::Null)
                }
                "get" => Evaluation::value(scope.intra.clone()),
                "count" => {
                    let count = scope.extra.as_i64().unwrap_or(0) + 1;
                    *scope.extra = json!(count);
                    Evaluation::value(json!(count))
                }
                "stop" => {
                    scope.stop_injecting();
                    Evaluation::value(json!("stopped"))
                }
                "panic" => panic!("boom"),
                "fail" => Evaluation::failure("syntax error"),
                "print" => Evaluation::value(json!("ok")).with_output("printed"),
                other => Evaluation::value(json!(other)),
            }
        },
    )
}

pub fn engine_with(options: EngineOptions, calls: Calls) -> Engine {
    Engine::builder()
        .site(Arc::new(site()))
        .sandbox(sandbox(calls))
        .options(options)
        .build()
        .expect("engine")
}

pub fn engine() -> Engine {
    engine_with(EngineOptions::default(), Calls::default())
}
