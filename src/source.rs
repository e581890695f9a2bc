use crate::error::{StxError, SyntaxError};
use miette::{NamedSource, SourceSpan};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The full text of one loaded file or in-memory buffer.
#[derive(Debug)]
pub struct SourceFile {
    name: String,
    path: Option<PathBuf>,
    text: String,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        SourceFile {
            name: name.into(),
            path: None,
            text: normalize_newlines(text.into()),
        }
    }

    pub fn from_path(path: PathBuf, text: impl Into<String>) -> Self {
        SourceFile {
            name: path.to_string_lossy().to_string(),
            path: Some(path),
            text: normalize_newlines(text.into()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

fn normalize_newlines(text: String) -> String {
    if text.contains('\r') {
        text.replace("\r\n", "\n")
    } else {
        text
    }
}

/// An immutable position inside a [`SourceFile`]. Line and column are 1-based,
/// the offset is in bytes.
#[derive(Clone)]
pub struct Location {
    file: Arc<SourceFile>,
    line: usize,
    column: usize,
    offset: usize,
}

impl Location {
    #[must_use]
    pub fn new(file: Arc<SourceFile>, line: usize, column: usize, offset: usize) -> Self {
        Location {
            file,
            line,
            column,
            offset,
        }
    }

    /// The first character of `file`.
    #[must_use]
    pub fn start_of(file: Arc<SourceFile>) -> Self {
        Location::new(file, 1, 1, 0)
    }

    #[must_use]
    pub fn file(&self) -> &Arc<SourceFile> {
        &self.file
    }

    #[must_use]
    pub fn file_name(&self) -> &str {
        self.file.name()
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.file.path()
    }

    #[must_use]
    pub fn line(&self) -> usize {
        self.line
    }

    #[must_use]
    pub fn column(&self) -> usize {
        self.column
    }

    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn named_source(&self) -> NamedSource<String> {
        NamedSource::new(self.file.name.clone(), self.file.text.clone())
    }

    #[must_use]
    pub fn span(&self) -> SourceSpan {
        let len = self
            .file
            .text
            .get(self.offset..)
            .and_then(|rest| rest.chars().next())
            .map_or(0, char::len_utf8);
        (self.offset, len).into()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file.name, self.line, self.column)
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file.name, self.line, self.column)
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset
            && self.line == other.line
            && self.column == other.column
            && self.file.name == other.file.name
    }
}

impl Eq for Location {}

impl Serialize for Location {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Location", 3)?;
        state.serialize_field("file", self.file.name())?;
        state.serialize_field("line", &self.line)?;
        state.serialize_field("column", &self.column)?;
        state.end()
    }
}

/// A saved cursor state. Checkpoints nest: each one must be committed or
/// rolled back, innermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Checkpoint {
    offset: usize,
    line: usize,
    column: usize,
    depth: usize,
}

/// Maps one line of a text fragment back to where it came from.
#[derive(Debug, Clone)]
struct Segment {
    start: usize,
    origin: Location,
}

/// A line of text together with the location of its first character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLine {
    pub text: String,
    pub location: Location,
}

/// Cursor over the text of one file, or over a fragment assembled from
/// [`TextLine`]s whose locations still point into the original file.
#[derive(Debug, Clone)]
pub struct Source {
    file: Arc<SourceFile>,
    text: Arc<str>,
    offset: usize,
    line: usize,
    column: usize,
    segments: Vec<Segment>,
    depth: usize,
}

impl Source {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Source::from_file(Arc::new(SourceFile::new(name, text)))
    }

    #[must_use]
    pub fn from_file(file: Arc<SourceFile>) -> Self {
        let text: Arc<str> = Arc::from(file.text());
        Source {
            file,
            text,
            offset: 0,
            line: 0,
            column: 0,
            segments: Vec::new(),
            depth: 0,
        }
    }

    /// Joins `lines` with `\n` into a scannable fragment. Locations reported
    /// while scanning the fragment refer to the original lines.
    #[must_use]
    pub fn fragment(lines: &[TextLine]) -> Self {
        let mut text = String::new();
        let mut segments = Vec::with_capacity(lines.len());
        for (index, line) in lines.iter().enumerate() {
            if index > 0 {
                text.push('\n');
            }
            segments.push(Segment {
                start: text.len(),
                origin: line.location.clone(),
            });
            text.push_str(&line.text);
        }
        let file = match lines.first() {
            Some(line) => line.location.file().clone(),
            None => Arc::new(SourceFile::new("<fragment>", "")),
        };
        Source {
            file,
            text: Arc::from(text),
            offset: 0,
            line: 0,
            column: 0,
            segments,
            depth: 0,
        }
    }

    #[must_use]
    pub fn file(&self) -> &Arc<SourceFile> {
        &self.file
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.file.path()
    }

    // === Cursor ===

    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.offset >= self.text.len()
    }

    #[must_use]
    pub fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    #[must_use]
    pub fn peek_nth(&self, n: usize) -> Option<char> {
        self.remaining().chars().nth(n)
    }

    /// Consumes one character; reading past the end is an error.
    pub fn advance(&mut self) -> Result<char, StxError> {
        match self.peek() {
            Some(c) => {
                self.bump(c);
                Ok(c)
            }
            None => Err(SyntaxError::unexpected_end(self.location()).into()),
        }
    }

    fn bump(&mut self, c: char) {
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
    }

    /// 0-based column of the cursor within the current line.
    #[must_use]
    pub fn column(&self) -> usize {
        self.column
    }

    /// 0-based line of the cursor.
    #[must_use]
    pub fn line(&self) -> usize {
        self.line
    }

    #[must_use]
    pub fn location(&self) -> Location {
        match self.segments.get(self.line) {
            Some(segment) => Location {
                file: segment.origin.file.clone(),
                line: segment.origin.line,
                column: segment.origin.column + self.column,
                offset: segment.origin.offset + (self.offset - segment.start),
            },
            None => Location {
                file: self.file.clone(),
                line: self.line + 1,
                column: self.column + 1,
                offset: self.offset,
            },
        }
    }

    #[must_use]
    pub fn remaining(&self) -> &str {
        self.text.get(self.offset..).unwrap_or("")
    }

    #[must_use]
    pub fn rest_of_line(&self) -> &str {
        let rest = self.remaining();
        match rest.find('\n') {
            Some(end) => &rest[..end],
            None => rest,
        }
    }

    // === Transactions ===

    pub fn checkpoint(&mut self) -> Checkpoint {
        self.depth += 1;
        Checkpoint {
            offset: self.offset,
            line: self.line,
            column: self.column,
            depth: self.depth,
        }
    }

    pub fn commit(&mut self, checkpoint: Checkpoint) {
        debug_assert_eq!(checkpoint.depth, self.depth, "checkpoints must nest");
        self.depth = checkpoint.depth - 1;
    }

    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        debug_assert_eq!(checkpoint.depth, self.depth, "checkpoints must nest");
        self.offset = checkpoint.offset;
        self.line = checkpoint.line;
        self.column = checkpoint.column;
        self.depth = checkpoint.depth - 1;
    }

    /// Runs `f` inside a checkpoint. The cursor is restored unless `f`
    /// returns `Ok(Some(_))`.
    pub fn attempt<T, E>(
        &mut self,
        f: impl FnOnce(&mut Source) -> Result<Option<T>, E>,
    ) -> Result<Option<T>, E> {
        let checkpoint = self.checkpoint();
        match f(self) {
            Ok(Some(value)) => {
                self.commit(checkpoint);
                Ok(Some(value))
            }
            other => {
                self.rollback(checkpoint);
                other
            }
        }
    }

    // === Derived readers ===

    #[must_use]
    pub fn test(&self, text: &str) -> bool {
        !text.is_empty() && self.remaining().starts_with(text)
    }

    /// Consumes `text` if the cursor is at it.
    pub fn pull(&mut self, text: &str) -> bool {
        if !self.test(text) {
            return false;
        }
        for c in text.chars() {
            self.bump(c);
        }
        true
    }

    pub fn read_while(&mut self, predicate: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }
            out.push(c);
            self.bump(c);
        }
        out
    }

    /// Reads up to, but not including, the first character in `stops`.
    pub fn read_until(&mut self, stops: &[char]) -> String {
        self.read_while(|c| !stops.contains(&c))
    }

    /// Skips spaces and tabs on the current line.
    pub fn skip_spaces(&mut self) -> usize {
        self.read_while(|c| c == ' ' || c == '\t').chars().count()
    }

    #[must_use]
    pub fn at_line_end(&self) -> bool {
        matches!(self.peek(), None | Some('\n'))
    }

    pub fn skip_line_end(&mut self) {
        if self.peek() == Some('\n') {
            self.bump('\n');
        }
    }

    /// Indentation of the current line, counted from the cursor.
    #[must_use]
    pub fn line_indentation(&self) -> usize {
        self.rest_of_line()
            .chars()
            .take_while(|c| *c == ' ' || *c == '\t')
            .count()
    }

    #[must_use]
    pub fn is_blank_line(&self) -> bool {
        self.rest_of_line().trim().is_empty()
    }

    /// Whether the current line may continue a block indented at `min_indent`.
    /// Blank lines always may.
    #[must_use]
    pub fn indentation_ok(&self, min_indent: usize) -> bool {
        self.is_blank_line() || self.line_indentation() >= min_indent
    }

    /// Consumes the current line when it holds only whitespace.
    pub fn consume_blank_line(&mut self) -> bool {
        if self.is_eof() || !self.is_blank_line() {
            return false;
        }
        self.skip_spaces();
        self.skip_line_end();
        true
    }

    /// Reads the rest of the current line and moves past its line break.
    pub fn read_line(&mut self) -> Option<String> {
        if self.is_eof() {
            return None;
        }
        let line = self.read_until(&['\n']);
        self.skip_line_end();
        Some(line)
    }

    pub fn expect_end_of_line(&mut self) -> Result<(), StxError> {
        self.skip_spaces();
        if self.at_line_end() {
            self.skip_line_end();
            Ok(())
        } else {
            Err(SyntaxError::unexpected(
                self.location(),
                "end of line",
                self.rest_of_line().trim_end(),
            )
            .into())
        }
    }

    pub fn expect(&mut self, text: &str) -> Result<(), StxError> {
        if self.pull(text) {
            return Ok(());
        }
        if self.is_eof() {
            return Err(SyntaxError::unexpected_end(self.location()).into());
        }
        let found: String = self.remaining().chars().take(text.chars().count()).collect();
        Err(SyntaxError::unexpected(self.location(), format!("`{text}`"), found).into())
    }
}
