//! Source map: byte spans to 1-based line/column positions.

use soul_ir::{FileId, SourceRef};

/// A 1-based line/column pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAndColumn {
    pub line: u32,
    pub column: u32,
}

/// One registered source unit.
pub struct SourceFile {
    pub name: String,
    pub contents: String,
    /// Byte offset of the start of each line.
    line_starts: Vec<u32>,
}

impl SourceFile {
    fn new(name: String, contents: String) -> Self {
        let mut line_starts = vec![0u32];
        for (i, b) in contents.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        SourceFile {
            name,
            contents,
            line_starts,
        }
    }

    fn line_and_column(&self, offset: u32) -> LineAndColumn {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let line_start = self.line_starts[line] as usize;
        let offset = (offset as usize).min(self.contents.len());
        // Column counts characters, not bytes.
        let column = self.contents[line_start..offset].chars().count() as u32 + 1;
        LineAndColumn {
            line: line as u32 + 1,
            column,
        }
    }
}

/// All source units of one compilation.
#[derive(Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn new() -> Self {
        SourceMap { files: Vec::new() }
    }

    pub fn add_file(&mut self, name: impl Into<String>, contents: impl Into<String>) -> FileId {
        let id = FileId(u16::try_from(self.files.len()).expect("too many source files"));
        self.files.push(SourceFile::new(name.into(), contents.into()));
        id
    }

    pub fn file(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(id.0 as usize)
    }

    /// Resolve a source reference to file name and line/column.
    pub fn describe(&self, location: SourceRef) -> Option<(String, LineAndColumn)> {
        if location.is_none() {
            return None;
        }
        let file = self.file(location.file)?;
        Some((
            file.name.clone(),
            file.line_and_column(location.span.start),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soul_ir::Span;

    #[test]
    fn line_and_column_are_one_based() {
        let mut map = SourceMap::new();
        let file = map.add_file("test.soul", "abc\ndef\nxy");
        let (name, pos) = map
            .describe(SourceRef::new(file, Span::new(0, 1)))
            .unwrap();
        assert_eq!(name, "test.soul");
        assert_eq!(pos, LineAndColumn { line: 1, column: 1 });

        let (_, pos) = map
            .describe(SourceRef::new(file, Span::new(5, 6)))
            .unwrap();
        assert_eq!(pos, LineAndColumn { line: 2, column: 2 });

        let (_, pos) = map
            .describe(SourceRef::new(file, Span::new(8, 9)))
            .unwrap();
        assert_eq!(pos, LineAndColumn { line: 3, column: 1 });
    }

    #[test]
    fn none_location_is_unresolvable() {
        let map = SourceMap::new();
        assert!(map.describe(SourceRef::NONE).is_none());
    }
}
