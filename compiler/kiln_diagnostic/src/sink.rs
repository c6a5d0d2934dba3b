//! Diagnostic accumulation.

use crate::{Diagnostic, ErrorGuaranteed};

/// Collects diagnostics in emission order.
///
/// The backend never stops on a recoverable error, so the sink only counts;
/// callers decide afterwards whether the output is usable.
#[derive(Default, Debug)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an error diagnostic and get proof it was emitted.
    pub fn emit_error(&mut self, diag: Diagnostic) -> ErrorGuaranteed {
        debug_assert!(diag.is_error(), "emit_error called with {}", diag.severity);
        self.push(diag);
        ErrorGuaranteed::new()
    }

    /// Emit a diagnostic of any severity.
    pub fn emit(&mut self, diag: Diagnostic) {
        self.push(diag);
    }

    fn push(&mut self, diag: Diagnostic) {
        if diag.is_error() {
            self.error_count += 1;
        }
        self.diagnostics.push(diag);
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Proof of failure if any error was emitted.
    pub fn has_errors(&self) -> Option<ErrorGuaranteed> {
        ErrorGuaranteed::from_error_count(self.error_count)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Move every diagnostic out of `other` into this sink.
    pub fn extend(&mut self, other: DiagnosticSink) {
        for diag in other.diagnostics {
            self.push(diag);
        }
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}
