//! Accumulating diagnostic list.

use crate::{CompileError, Diagnostic, Severity};

/// Collects the diagnostics of one compilation, in emission order.
#[derive(Debug, Default)]
pub struct DiagnosticList {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticList {
    pub fn new() -> Self {
        DiagnosticList {
            diagnostics: Vec::new(),
        }
    }

    pub fn add(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Record a hard failure: the principal diagnostic plus its notes.
    pub fn add_error(&mut self, error: CompileError) {
        self.diagnostics.push(error.diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn clear(&mut self) {
        self.diagnostics.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Category, ErrorCode};
    use soul_ir::SourceRef;

    #[test]
    fn error_detection() {
        let mut list = DiagnosticList::new();
        assert!(!list.has_errors());
        list.add(Diagnostic::warning(
            ErrorCode("W0101"),
            Category::Sanity,
            SourceRef::NONE,
            "unused variable",
        ));
        assert!(!list.has_errors());
        list.add(Diagnostic::error(
            ErrorCode("E0101"),
            Category::Parse,
            SourceRef::NONE,
            "expected a statement",
        ));
        assert!(list.has_errors());
        assert_eq!(list.len(), 2);
    }
}
