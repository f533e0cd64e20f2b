//! Developer diagnostics
//!
//!     Failures of stored code never reach the rendered content. They are recorded here, with
//!     enough context to find them: the content item being processed, the enzyme, the
//!     injection, and the code with line numbers.
//!
//!     Every record is also emitted as a `tracing` event, so a host that only installs a
//!     subscriber still sees them.
//!
//!     A sandbox call is bracketed by [DiagnosticLog::arm] and [DiagnosticLog::disarm]. If the
//!     call never returns (it unwinds past the engine), the armed record is still there when
//!     the engine is dropped, and gets reported as a shutdown error.

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use super::host::ContentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Stored code failed
    Error,
    /// Stored code printed something
    Output,
    /// Stored code did not return
    Shutdown,
}

impl DiagnosticKind {
    pub fn title(&self) -> &'static str {
        match self {
            DiagnosticKind::Error => "Nzymes ERROR",
            DiagnosticKind::Output => "Nzymes OUTPUT",
            DiagnosticKind::Shutdown => "Nzymes SHUTDOWN ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub content: Option<ContentId>,
    pub enzyme: String,
    pub injection: String,
    pub detail: String,
    /// The code that was running, if it is worth showing
    pub code: Option<String>,
}

impl Diagnostic {
    pub fn new(
        kind: DiagnosticKind,
        content: Option<ContentId>,
        enzyme: impl Into<String>,
        injection: impl Into<String>,
    ) -> Self {
        Diagnostic {
            kind,
            content,
            enzyme: enzyme.into(),
            injection: injection.into(),
            detail: String::new(),
            code: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_kind(mut self, kind: DiagnosticKind) -> Self {
        self.kind = kind;
        self
    }

    /// The line that locates the failure.
    pub fn context(&self) -> String {
        let content = match self.content {
            Some(id) => id.to_string(),
            None => "none".to_string(),
        };
        format!(
            "Content: {} - Enzyme: {} - Injection: {}",
            content, self.enzyme, self.injection
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.kind.title())?;
        writeln!(f, "{}", self.context())?;
        write!(f, "{}", self.detail.trim())?;
        if let Some(code) = &self.code {
            write!(f, "\n{}", format_code(code))?;
        }
        Ok(())
    }
}

/// Number the lines of `code`, right aligned to the widest number.
pub fn format_code(code: &str) -> String {
    let lines: Vec<&str> = code.split('\n').collect();
    let width = lines.len().to_string().len();
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{:>width$}: {}", i + 1, line, width = width))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Default)]
struct Records {
    reported: Vec<Diagnostic>,
    armed: Option<Diagnostic>,
}

/// A shared, append-only log of diagnostics.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticLog {
    inner: Arc<Mutex<Records>>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, Records> {
        // A panic while holding the lock leaves the records usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn report(&self, diagnostic: Diagnostic) {
        match diagnostic.kind {
            DiagnosticKind::Output => tracing::info!(
                content = ?diagnostic.content,
                enzyme = %diagnostic.enzyme,
                "{}",
                diagnostic
            ),
            DiagnosticKind::Error | DiagnosticKind::Shutdown => tracing::error!(
                content = ?diagnostic.content,
                enzyme = %diagnostic.enzyme,
                "{}",
                diagnostic
            ),
        }
        self.records().reported.push(diagnostic);
    }

    /// Keep `diagnostic` ready in case the running call never returns.
    pub fn arm(&self, diagnostic: Diagnostic) {
        self.records().armed = Some(diagnostic);
    }

    pub fn disarm(&self) {
        self.records().armed = None;
    }

    pub fn is_armed(&self) -> bool {
        self.records().armed.is_some()
    }

    /// Report the armed diagnostic, if any, as a shutdown error.
    pub fn report_armed(&self, detail: &str) {
        let armed = self.records().armed.take();
        if let Some(diagnostic) = armed {
            self.report(
                diagnostic
                    .with_kind(DiagnosticKind::Shutdown)
                    .with_detail(detail),
            );
        }
    }

    pub fn entries(&self) -> Vec<Diagnostic> {
        self.records().reported.clone()
    }

    pub fn len(&self) -> usize {
        self.records().reported.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().reported.is_empty()
    }

    /// Remove and return everything reported so far.
    pub fn drain(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.records().reported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure() -> Diagnostic {
        Diagnostic::new(DiagnosticKind::Error, Some(7), "@lib.code(1)", "{[1|@lib.code(1)]}")
            .with_detail("syntax error, unexpected end of file\n")
    }

    #[test]
    fn test_format_code_aligns_numbers() {
        let code = (1..=10)
            .map(|i| format!("line {}", i))
            .collect::<Vec<_>>()
            .join("\n");
        let formatted = format_code(&code);
        let lines: Vec<&str> = formatted.lines().collect();
        assert_eq!(lines[0], " 1: line 1");
        assert_eq!(lines[9], "10: line 10");
    }

    #[test]
    fn test_display_with_code() {
        let diagnostic = failure().with_code("let x =\nx +");
        insta::assert_snapshot!(diagnostic.to_string(), @r###"
        Nzymes ERROR
        Content: 7 - Enzyme: @lib.code(1) - Injection: {[1|@lib.code(1)]}
        syntax error, unexpected end of file
        1: let x =
        2: x +
        "###);
    }

    #[test]
    fn test_display_without_content() {
        let diagnostic = Diagnostic::new(DiagnosticKind::Output, None, ".x()", "{[.x()]}")
            .with_detail("hello");
        insta::assert_snapshot!(diagnostic.to_string(), @r###"
        Nzymes OUTPUT
        Content: none - Enzyme: .x() - Injection: {[.x()]}
        hello
        "###);
    }

    #[test]
    fn test_armed_diagnostic_is_reported_once() {
        let log = DiagnosticLog::new();
        log.arm(failure().with_code("loop {}"));
        assert!(log.is_armed());
        log.report_armed("did not return");
        log.report_armed("did not return");
        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, DiagnosticKind::Shutdown);
        assert_eq!(entries[0].detail, "did not return");
    }

    #[test]
    fn test_disarm_forgets() {
        let log = DiagnosticLog::new();
        log.arm(failure());
        log.disarm();
        log.report_armed("unused");
        assert!(log.is_empty());
    }

    #[test]
    fn test_clones_share_records() {
        let log = DiagnosticLog::new();
        let other = log.clone();
        other.report(failure());
        assert_eq!(log.len(), 1);
        assert_eq!(log.drain().len(), 1);
        assert!(other.is_empty());
    }
}
