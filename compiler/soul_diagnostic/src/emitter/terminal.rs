//! Terminal emitter: `file:line:col: severity[code]: message`.

use std::io::Write;

use super::DiagnosticEmitter;
use crate::{Diagnostic, SourceMap};

pub struct TerminalEmitter<W: Write> {
    writer: W,
}

impl<W: Write> TerminalEmitter<W> {
    pub fn new(writer: W) -> Self {
        TerminalEmitter { writer }
    }
}

impl<W: Write> DiagnosticEmitter for TerminalEmitter<W> {
    fn emit(&mut self, diagnostic: &Diagnostic, sources: &SourceMap) {
        let position = diagnostic
            .location
            .and_then(|loc| sources.describe(loc))
            .map(|(file, pos)| format!("{}:{}:{}: ", file, pos.line, pos.column))
            .unwrap_or_default();

        let _ = writeln!(
            self.writer,
            "{}{}[{}]: {}",
            position,
            diagnostic.severity.text(),
            diagnostic.code,
            diagnostic.message
        );

        for note in &diagnostic.notes {
            let note_position = note
                .location
                .and_then(|loc| sources.describe(loc))
                .map(|(file, pos)| format!("{}:{}:{}: ", file, pos.line, pos.column))
                .unwrap_or_default();
            let _ = writeln!(self.writer, "  {}note: {}", note_position, note.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Category, ErrorCode};
    use soul_ir::{SourceRef, Span};

    #[test]
    fn renders_location_and_code() {
        let mut sources = SourceMap::new();
        let file = sources.add_file("p.soul", "processor P {}\n");
        let d = Diagnostic::error(
            ErrorCode("E0201"),
            Category::Sanity,
            SourceRef::new(file, Span::new(10, 11)),
            "a processor must declare at least one output",
        );
        let mut out = Vec::new();
        TerminalEmitter::new(&mut out).emit(&d, &sources);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "p.soul:1:11: error[E0201]: a processor must declare at least one output\n"
        );
    }
}
