//! Sandboxes
//!
//!     [Disabled] refuses to run anything. [FnSandbox] hands the code to a closure, which is
//!     how a host embeds its own interpreter. [ProcessSandbox] runs the code with an external
//!     program, one process per call:
//!
//!         <program> <args...> <code> nzymes <arguments...>
//!
//!     so that `sh -c` sees the arguments as `$1`, `$2`... Standard output, without its last
//!     newline, is the value; standard error is the captured output; a failed exit is an error.

use std::fmt;
use std::process::Command;

use super::host::{Evaluation, ExecutionScope, Sandbox};
use super::value::{render, Value};

/// A sandbox for hosts that do not allow code execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct Disabled;

impl Sandbox for Disabled {
    fn evaluate(
        &self,
        _code: &str,
        _arguments: &[Value],
        _scope: &mut ExecutionScope<'_>,
    ) -> Evaluation {
        Evaluation::failure("code execution is disabled")
    }
}

type Evaluator = dyn Fn(&str, &[Value], &mut ExecutionScope<'_>) -> Evaluation;

pub struct FnSandbox {
    evaluator: Box<Evaluator>,
}

impl FnSandbox {
    pub fn new<F>(evaluator: F) -> Self
    where
        F: Fn(&str, &[Value], &mut ExecutionScope<'_>) -> Evaluation + 'static,
    {
        FnSandbox {
            evaluator: Box::new(evaluator),
        }
    }
}

impl fmt::Debug for FnSandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSandbox").finish_non_exhaustive()
    }
}

impl Sandbox for FnSandbox {
    fn evaluate(
        &self,
        code: &str,
        arguments: &[Value],
        scope: &mut ExecutionScope<'_>,
    ) -> Evaluation {
        (self.evaluator)(code, arguments, scope)
    }
}

/// Name given to the code in the argument list, i.e. `$0` for `sh -c`.
const ARGV0: &str = "nzymes";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSandbox {
    program: String,
    args: Vec<String>,
}

impl ProcessSandbox {
    pub fn new(program: impl Into<String>) -> Self {
        ProcessSandbox {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl Sandbox for ProcessSandbox {
    fn evaluate(
        &self,
        code: &str,
        arguments: &[Value],
        scope: &mut ExecutionScope<'_>,
    ) -> Evaluation {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(code)
            .arg(ARGV0)
            .args(arguments.iter().map(render))
            .env("NZYMES_ORIGIN", scope.origin.id.to_string())
            .env(
                "NZYMES_PROCESSED",
                scope.processed.map(|item| item.id.to_string()).unwrap_or_default(),
            );
        tracing::trace!(program = %self.program, "running code");

        let output = match command.output() {
            Ok(output) => output,
            Err(err) => return Evaluation::failure(format!("cannot run {}: {}", self.program, err)),
        };
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            let message = match stderr.trim() {
                "" => format!("{} exited with {}", self.program, output.status),
                message => message.to_string(),
            };
            return Evaluation::failure(message);
        }
        let value = stdout.strip_suffix('\n').unwrap_or(&*stdout);
        Evaluation::value(Value::from(value)).with_output(stderr)
    }
}
