//! Main module for nzymes library functionality
//!
//!     The processing of one content pass goes through these stages:
//!
//!         1. scanning: find the next `{[ ... ]}` candidate (or its escaped `{{[ ... ]}` form)
//!         2. cleaning: drop comments, blanks outside strings, markup and delimiter escapes
//!         3. grammar: check that the cleaned text is a chain of enzymes, nothing else
//!         4. lexing + parsing: turn the chain into a [Sequence](ast::Sequence)
//!         5. evaluator + executor: run the enzymes on a fresh [Stack](stack::Stack)
//!
//!     Everything outside of the engine proper (content store, capabilities, stage pipeline,
//!     code execution) is reached through the traits in [host].

pub mod ast;
pub mod cleaning;
pub mod diagnostics;
pub mod engine;
pub mod evaluator;
pub mod executor;
pub mod grammar;
pub mod host;
pub mod lexing;
pub mod memory;
pub mod parsing;
pub mod pipeline;
pub mod policy;
pub mod sandbox;
pub mod scanning;
pub mod stack;
pub mod value;

pub use ast::{Enzyme, Execution, Literal, Lookup, Owner, PostRef, Reference, Sequence, Step};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticLog};
pub use engine::{Engine, EngineBuilder, EngineOptions};
pub use host::{
    Author, AuthorId, Authorization, ContentId, ContentItem, ContentStatus, ContentStore, Entity,
    Evaluation, ExecutionScope, Sandbox,
};
pub use pipeline::{Handler, Pass, Pipeline, Registration, StagePipeline, Subject};
pub use policy::{Capability, Role};
pub use stack::Stack;
pub use value::Value;
