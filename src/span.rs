//! Source position tracking.
//!
//! Every token, AST node, and IR instruction traces back to a [`Span`] so
//! diagnostics can point at the offending text. Paths are interned in a
//! [`SourceMap`] rather than carried in full on every position: a
//! translation unit can pull in dozens of headers through `#include`, and
//! tokens outlive the file they came from.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Interned identifier for a source file known to a [`SourceMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(u32);

/// A single point in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub file: FileId,
    /// 1-indexed line number.
    pub line: u32,
    /// 1-indexed column number.
    pub column: u32,
}

impl Position {
    pub fn new(file: FileId, line: u32, column: u32) -> Self {
        Position { file, line, column }
    }
}

/// A half-open range of source text, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Span { start, end }
    }

    /// A zero-width span at a single position, used for synthesized nodes
    /// (implicit `ret`, inserted conversions) that have no source text of
    /// their own.
    pub fn point(pos: Position) -> Self {
        Span { start: pos, end: pos }
    }

    /// The smallest span covering both `self` and `other`.
    pub fn merge(self, other: Span) -> Span {
        let start = if self.start.line < other.start.line
            || (self.start.line == other.start.line && self.start.column <= other.start.column)
        {
            self.start
        } else {
            other.start
        };
        let end = if self.end.line > other.end.line
            || (self.end.line == other.end.line && self.end.column >= other.end.column)
        {
            self.end
        } else {
            other.end
        };
        Span { start, end }
    }
}

/// Owns the text and path of every file pulled into a compilation, assigns
/// each a stable [`FileId`], and renders positions back to `path:line:col`
/// for diagnostics.
#[derive(Debug, Default, Clone)]
pub struct SourceMap {
    files: Vec<SourceFile>,
    by_path: HashMap<PathBuf, FileId>,
}

#[derive(Debug, Clone)]
struct SourceFile {
    path: PathBuf,
    contents: String,
}

impl SourceMap {
    pub fn new() -> Self {
        SourceMap::default()
    }

    /// Register a file's contents, returning its [`FileId`]. Re-adding an
    /// already-canonicalized path returns the existing id rather than
    /// duplicating storage; this is what makes include-guard-free headers
    /// that are `#include`d twice from distinct directories resolve to one
    /// entry once the caller canonicalizes first.
    pub fn add_file(&mut self, path: PathBuf, contents: String) -> FileId {
        if let Some(&id) = self.by_path.get(&path) {
            return id;
        }
        let id = FileId(self.files.len() as u32);
        self.by_path.insert(path.clone(), id);
        self.files.push(SourceFile { path, contents });
        id
    }

    pub fn path(&self, file: FileId) -> &Path {
        &self.files[file.0 as usize].path
    }

    pub fn contents(&self, file: FileId) -> &str {
        &self.files[file.0 as usize].contents
    }

    pub fn display_position(&self, pos: Position) -> String {
        format!("{}:{}:{}", self.path(pos.file).display(), pos.line, pos.column)
    }

    pub fn display_span(&self, span: Span) -> String {
        if span.start.line == span.end.line {
            format!(
                "{}:{}:{}-{}",
                self.path(span.start.file).display(),
                span.start.line,
                span.start.column,
                span.end.column
            )
        } else {
            format!(
                "{}:{}:{}-{}:{}",
                self.path(span.start.file).display(),
                span.start.line,
                span.start.column,
                span.end.line,
                span.end.column
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_file_dedupes_by_path() {
        let mut map = SourceMap::new();
        let a = map.add_file(PathBuf::from("/x/a.c"), "int main(){}".into());
        let b = map.add_file(PathBuf::from("/x/a.c"), "int main(){}".into());
        assert_eq!(a, b);
    }

    #[test]
    fn merge_widens_to_cover_both() {
        let f = FileId(0);
        let s1 = Span::new(Position::new(f, 1, 1), Position::new(f, 1, 5));
        let s2 = Span::new(Position::new(f, 2, 1), Position::new(f, 2, 3));
        let merged = s1.merge(s2);
        assert_eq!(merged.start, s1.start);
        assert_eq!(merged.end, s2.end);
    }

    #[test]
    fn display_position_formats_as_path_line_col() {
        let mut map = SourceMap::new();
        let f = map.add_file(PathBuf::from("a.c"), String::new());
        assert_eq!(map.display_position(Position::new(f, 3, 7)), "a.c:3:7");
    }
}
