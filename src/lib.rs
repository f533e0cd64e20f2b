//! # nzymes
//!
//! An engine for enzyme sequences injected into free-form content.
//!
//! Content items carry injections written as `{[ enzyme | enzyme | ... ]}`. Each injection is
//! cleaned, validated against the enzyme grammar, parsed into a sequence and evaluated on a
//! stack machine; the top of the stack replaces the injection in the content.
//!
//! File Layout
//!
//! src/nzymes
//!   ├── grammar, lexing, parsing, ast    The front end: rule table, tokens and parser
//!   ├── cleaning, scanning               Text level handling of injections
//!   ├── stack, value, evaluator,         The stack machine and enzyme dispatch
//!   │   executor
//!   ├── host, policy, pipeline, sandbox  Collaborator contracts and their in-process versions
//!   ├── memory                           In-memory host, used by the CLI and tests
//!   └── diagnostics, engine              Reporting and the entry points
//!
//! See the [engine module](nzymes::engine) for the processing entry points.

pub mod nzymes;
