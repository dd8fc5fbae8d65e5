//! JSON emitter for machine-readable diagnostic output.
//!
//! The JSON is built by hand to keep this crate dependency-free.

use std::io::Write;

use super::{escape_json, DiagnosticEmitter};
use crate::{Diagnostic, SourceMap};

pub struct JsonEmitter<W: Write> {
    writer: W,
    first: bool,
}

impl<W: Write> JsonEmitter<W> {
    pub fn new(writer: W) -> Self {
        JsonEmitter {
            writer,
            first: true,
        }
    }

    /// Begin the JSON array output.
    pub fn begin(&mut self) {
        let _ = write!(self.writer, "[");
    }

    /// End the JSON array output.
    pub fn end(&mut self) {
        let _ = writeln!(self.writer, "\n]");
    }
}

impl<W: Write> DiagnosticEmitter for JsonEmitter<W> {
    fn emit(&mut self, diagnostic: &Diagnostic, sources: &SourceMap) {
        if !self.first {
            let _ = write!(self.writer, ",");
        }
        self.first = false;

        let _ = writeln!(self.writer);
        let _ = writeln!(self.writer, "  {{");
        let _ = writeln!(self.writer, "    \"code\": \"{}\",", diagnostic.code);
        let _ = writeln!(
            self.writer,
            "    \"severity\": \"{}\",",
            diagnostic.severity.text()
        );

        if let Some((file, pos)) = diagnostic.location.and_then(|loc| sources.describe(loc)) {
            let _ = writeln!(self.writer, "    \"file\": \"{}\",", escape_json(&file));
            let _ = writeln!(self.writer, "    \"line\": {},", pos.line);
            let _ = writeln!(self.writer, "    \"column\": {},", pos.column);
        }

        let _ = writeln!(self.writer, "    \"notes\": [");
        for (i, note) in diagnostic.notes.iter().enumerate() {
            let comma = if i + 1 < diagnostic.notes.len() { "," } else { "" };
            let _ = writeln!(
                self.writer,
                "      \"{}\"{}",
                escape_json(&note.message),
                comma
            );
        }
        let _ = writeln!(self.writer, "    ],");

        let _ = writeln!(
            self.writer,
            "    \"message\": \"{}\"",
            escape_json(&diagnostic.message)
        );
        let _ = write!(self.writer, "  }}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Category, ErrorCode};
    use soul_ir::SourceRef;

    #[test]
    fn emits_valid_shape() {
        let sources = SourceMap::new();
        let d = Diagnostic::error(
            ErrorCode("E0301"),
            Category::Resolution,
            SourceRef::NONE,
            "unresolved symbol 'x'",
        );
        let mut out = Vec::new();
        let mut emitter = JsonEmitter::new(&mut out);
        emitter.begin();
        emitter.emit(&d, &sources);
        emitter.end();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with('['));
        assert!(text.trim_end().ends_with(']'));
        assert!(text.contains("\"code\": \"E0301\""));
        assert!(text.contains("unresolved symbol 'x'"));
    }
}
