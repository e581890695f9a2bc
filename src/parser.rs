use crate::blocks::{Block, CaptionMark};
use crate::error::{ResourceError, SemanticError, StxError, SyntaxError};
use crate::fs::{normalize_path, resolve_include, FileSystem};
use crate::marks::{self, BlockMark, BLOCK_MARKS};
use crate::reader::Reader;
use crate::source::{Location, Source, SourceFile, TextLine};
use crate::values::{self, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const CELL_MARK: &str = "|";
const CODE_FENCE: &str = "```";
const COMMENT_FENCE: &str = "!!!";
const LITERAL_FENCE: &str = "+++";
const CONTENT_OPEN: &str = "{{{";
const CONTENT_CLOSE: &str = "}}}";

/// Outcome of trying to start a block at the cursor.
enum Step {
    Block(Block),
    /// Something was consumed but produced no block (comments, includes).
    Nothing,
    /// Closes the enclosing section: a heading of the same or a higher
    /// level (left unconsumed) or an exit mark.
    Close,
}

/// How a run of blank lines affects the current capture.
enum Blank {
    None,
    Separator(usize),
    Trailing,
    Stop,
}

/// An indentation-sensitive recursive descent parser turning STX text into
/// a [`Block`] tree.
pub struct Parser<'fs> {
    reader: Reader<'fs>,
    stop_marks: Vec<&'static str>,
    sections: Vec<u8>,
}

impl<'fs> Parser<'fs> {
    pub fn new(reader: Reader<'fs>) -> Self {
        Parser {
            reader,
            stop_marks: Vec::new(),
            sections: Vec::new(),
        }
    }

    /// Parses `source_text` as if it were the file `name`; includes are
    /// resolved relative to it through `fs`.
    pub fn new_with_name(fs: &'fs dyn FileSystem, source_text: &str, name: &str) -> Self {
        let file = Arc::new(SourceFile::from_path(PathBuf::from(name), source_text));
        Parser::new(Reader::new(fs, Source::from_file(file)))
    }

    // === Main Parsing Methods ===

    /// Document ::= { Block }
    pub fn parse_document(&mut self) -> Result<Block, StxError> {
        let block = self.capture(0, false)?;
        if self.reader.alive()? {
            let src = self.src();
            return Err(SyntaxError::unexpected(
                src.location(),
                "a block",
                src.rest_of_line().trim(),
            )
            .into());
        }
        Ok(block)
    }

    /// Captures blocks while lines are indented at least `indentation`.
    /// A breakable capture ends at the first blank line, otherwise blank
    /// lines become separators.
    fn capture(&mut self, indentation: usize, breakable: bool) -> Result<Block, StxError> {
        let location = self.src().location();
        let mut blocks = Vec::new();

        while self.reader.alive()? {
            if self.src().column() > 0 {
                let src = self.src();
                src.skip_spaces();
                if src.at_line_end() {
                    src.skip_line_end();
                    continue;
                }
            } else {
                match self.blank_lines(indentation, breakable) {
                    Blank::None => {}
                    Blank::Separator(count) => {
                        blocks.push(Block::Separator(count));
                        continue;
                    }
                    Blank::Trailing => continue,
                    Blank::Stop => break,
                }
                if self.src().line_indentation() < indentation {
                    break;
                }
                self.src().skip_spaces();
            }

            if self.at_stop_mark() {
                break;
            }

            match self.block(indentation)? {
                Step::Block(block) => blocks.push(block),
                Step::Nothing => {}
                Step::Close => break,
            }
        }

        Ok(Block::from_children(blocks, location))
    }

    fn blank_lines(&mut self, indentation: usize, breakable: bool) -> Blank {
        let src = self.src();
        let checkpoint = src.checkpoint();
        let mut count = 0;
        while src.consume_blank_line() {
            count += 1;
        }

        if count == 0 {
            src.commit(checkpoint);
            Blank::None
        } else if src.is_eof() {
            src.commit(checkpoint);
            Blank::Trailing
        } else if breakable || src.line_indentation() < indentation {
            src.rollback(checkpoint);
            Blank::Stop
        } else {
            src.commit(checkpoint);
            Blank::Separator(count)
        }
    }

    /// Block ::= Section | ListItem | TableRow | Caption | CodeBlock
    ///         | Comment | ContentBox | Attribute | Directive | Paragraph
    fn block(&mut self, indentation: usize) -> Result<Step, StxError> {
        let src = self.reader.source();
        let location = src.location();
        let column = src.column();

        let checkpoint = src.checkpoint();
        let Some(mark) = read_block_mark(src) else {
            src.commit(checkpoint);
            return self.paragraph().map(Step::Block);
        };
        if let BlockMark::Heading(level) = mark {
            if self.sections.last().is_some_and(|open| level <= *open) {
                self.src().rollback(checkpoint);
                return Ok(Step::Close);
            }
        }
        self.src().commit(checkpoint);

        let block = match mark {
            BlockMark::Heading(level) => Some(self.parse_section(level, indentation, location)?),
            BlockMark::UnorderedItem | BlockMark::OrderedItem => Some(self.parse_list_item(
                mark == BlockMark::OrderedItem,
                column,
                location,
            )?),
            BlockMark::HeaderRow | BlockMark::DataRow | BlockMark::Cell => Some(
                self.parse_table_row(mark == BlockMark::HeaderRow, column, location)?,
            ),
            BlockMark::PreCaption => Some(self.parse_caption(CaptionMark::Pre, column, location)?),
            BlockMark::PostCaption => {
                Some(self.parse_caption(CaptionMark::Post, column, location)?)
            }
            BlockMark::CodeFence => Some(self.parse_code_block(column, location)?),
            BlockMark::CommentFence => {
                self.parse_comment(column, location)?;
                None
            }
            BlockMark::LiteralFence => Some(self.parse_literal(column, location)?),
            BlockMark::ContentOpen => Some(self.parse_content_box(column, location)?),
            BlockMark::ContentClose => {
                return Err(SyntaxError::unexpected(location, "a block", CONTENT_CLOSE).into())
            }
            BlockMark::Attribute => Some(self.parse_attribute(location)?),
            BlockMark::Directive => self.parse_directive(location)?,
            BlockMark::Exit => return self.parse_exit(),
        };

        Ok(block.map_or(Step::Nothing, Step::Block))
    }

    /// Section ::= HeadingMark Heading { Block }
    fn parse_section(
        &mut self,
        level: u8,
        indentation: usize,
        location: Location,
    ) -> Result<Block, StxError> {
        let heading_column = self.content_column(location.column() - 1, level as usize);
        let heading = self.capture(heading_column, true)?;

        self.sections.push(level);
        let body = self.capture(indentation, false);
        self.sections.pop();

        Ok(Block::Title {
            level,
            heading: Box::new(heading),
            body: Box::new(body?),
            location,
        })
    }

    /// ListItem ::= ("-" | ".") { Block }
    fn parse_list_item(
        &mut self,
        ordered: bool,
        column: usize,
        location: Location,
    ) -> Result<Block, StxError> {
        let content_column = self.content_column(column, 1);
        let content = self.isolated(|p| p.capture(content_column, false))?;
        Ok(Block::ListItem {
            content: Box::new(content),
            ordered,
            location,
        })
    }

    /// TableRow ::= ("|=" | "|-") Cell { "|" Cell }
    fn parse_table_row(
        &mut self,
        header: bool,
        column: usize,
        location: Location,
    ) -> Result<Block, StxError> {
        let mut cells = Vec::new();
        self.stop_marks.push(CELL_MARK);
        let result = self.parse_table_cells(column, &mut cells);
        self.stop_marks.pop();
        result?;

        Ok(Block::TableRow {
            cells,
            header,
            location,
        })
    }

    fn parse_table_cells(
        &mut self,
        row_column: usize,
        cells: &mut Vec<Block>,
    ) -> Result<(), StxError> {
        loop {
            let src = self.src();
            src.skip_spaces();
            if src.at_line_end() {
                src.skip_line_end();
            } else {
                let location = src.location();
                let content_column = src.column();
                let content = self.isolated(|p| p.capture(content_column, true))?;
                cells.push(Block::TableCell {
                    content: Box::new(content),
                    location,
                });

                let src = self.src();
                if src.column() > 0 && src.pull(CELL_MARK) {
                    continue;
                }
            }

            if !self.row_continues(row_column) {
                return Ok(());
            }
        }
    }

    /// A row goes on when the next non-blank line starts with a bare cell
    /// mark at or past the row's column.
    fn row_continues(&mut self, row_column: usize) -> bool {
        let src = self.src();
        let checkpoint = src.checkpoint();
        while src.consume_blank_line() {}

        let indentation = src.line_indentation();
        src.skip_spaces();
        let is_cell = indentation >= row_column
            && marks::match_longest(src.rest_of_line(), BLOCK_MARKS)
                .is_some_and(|spec| spec.mark == BlockMark::Cell);

        if is_cell {
            src.pull(CELL_MARK);
            src.commit(checkpoint);
        } else {
            src.rollback(checkpoint);
        }
        is_cell
    }

    /// Caption ::= ("::" | ":^") { Block }
    fn parse_caption(
        &mut self,
        mark: CaptionMark,
        column: usize,
        location: Location,
    ) -> Result<Block, StxError> {
        let content_column = self.content_column(column, 2);
        let content = self.isolated(|p| p.capture(content_column, true))?;
        Ok(Block::MarkedElement {
            content: Box::new(content),
            mark,
            location,
        })
    }

    /// CodeBlock ::= "```" [ Value ] EOL { Line } "```"
    fn parse_code_block(&mut self, column: usize, location: Location) -> Result<Block, StxError> {
        let src = self.src();
        src.skip_spaces();
        let header_location = src.location();
        let header = if src.at_line_end() {
            None
        } else {
            Some(values::parse_value(src)?)
        };
        src.expect_end_of_line()?;

        let text = self.read_verbatim(CODE_FENCE, column, &location)?;

        match header {
            None => Ok(Block::CodeBlock {
                text,
                lang: None,
                location,
            }),
            Some(Value::Token(lang)) => Ok(Block::CodeBlock {
                text,
                lang: Some(lang),
                location,
            }),
            Some(Value::Entry(key, options)) => Ok(Block::FunctionBlock {
                key,
                options: *options,
                text,
                location,
            }),
            Some(other) => Err(SyntaxError::invalid_value(
                header_location,
                format!("expected a language or a function, found {}", other.kind_name()),
            )
            .into()),
        }
    }

    /// Literal ::= "+++" [ Entry ] EOL { Line } "+++"
    fn parse_literal(&mut self, column: usize, location: Location) -> Result<Block, StxError> {
        let src = self.src();
        src.skip_spaces();
        let header_location = src.location();
        let header = if src.at_line_end() {
            None
        } else {
            Some(values::parse_value(src)?)
        };
        src.expect_end_of_line()?;

        let text = self.read_verbatim(LITERAL_FENCE, column, &location)?;

        match header {
            None => Ok(Block::Literal { text, location }),
            Some(Value::Entry(key, options)) => Ok(Block::FunctionBlock {
                key,
                options: *options,
                text,
                location,
            }),
            Some(other) => Err(SyntaxError::invalid_value(
                header_location,
                format!("expected a function, found {}", other.kind_name()),
            )
            .into()),
        }
    }

    /// Exit ::= "%" EOL
    /// Closes the innermost section; outside of one it ends any open list
    /// or table.
    fn parse_exit(&mut self) -> Result<Step, StxError> {
        self.src().expect_end_of_line()?;
        if self.sections.is_empty() {
            Ok(Step::Block(Block::Separator(2)))
        } else {
            Ok(Step::Close)
        }
    }

    /// Comment ::= "!!!" { Line } "!!!"
    fn parse_comment(&mut self, column: usize, location: Location) -> Result<(), StxError> {
        self.src().read_line();
        let discarded = self.read_verbatim(COMMENT_FENCE, column, &location)?;
        log::debug!("{location}: skipped comment of {} line(s)", discarded.lines().count());
        Ok(())
    }

    /// Reads lines verbatim until `fence` appears alone at `column`. A line
    /// starting with `\` followed by the fence or another `\` loses that
    /// first backslash.
    fn read_verbatim(
        &mut self,
        fence: &str,
        column: usize,
        opened_at: &Location,
    ) -> Result<String, StxError> {
        let mut text = String::new();
        loop {
            let Some(line) = self.src().read_line() else {
                return Err(SyntaxError::UnterminatedBlock {
                    fence: fence.to_string(),
                    src: opened_at.named_source(),
                    span: opened_at.span(),
                    location: opened_at.clone(),
                }
                .into());
            };

            let indent = line.chars().take(column).take_while(|c| *c == ' ').count();
            let line = &line[indent..];
            if indent == column && line.trim_end() == fence {
                return Ok(text);
            }

            let line = match line.strip_prefix('\\') {
                Some(rest) if rest.starts_with(fence) || rest.starts_with('\\') => rest,
                _ => line,
            };
            text.push_str(line);
            text.push('\n');
        }
    }

    /// ContentBox ::= "{{{" [ Entry ] EOL { Block } "}}}"
    fn parse_content_box(&mut self, column: usize, location: Location) -> Result<Block, StxError> {
        let src = self.src();
        src.skip_spaces();
        let function = if src.at_line_end() {
            None
        } else {
            Some(values::parse_entry(src)?)
        };
        src.expect_end_of_line()?;

        self.stop_marks.push(CONTENT_CLOSE);
        let content = self.isolated(|p| p.capture(column, false));
        self.stop_marks.pop();
        let content = content?;

        let src = self.src();
        if !src.pull(CONTENT_CLOSE) {
            return Err(SyntaxError::UnterminatedBlock {
                fence: CONTENT_OPEN.to_string(),
                src: location.named_source(),
                span: location.span(),
                location,
            }
            .into());
        }
        src.expect_end_of_line()?;

        Ok(Block::ContentBox {
            content: Box::new(content),
            function,
            location,
        })
    }

    /// Attribute ::= "@" Name ( ":" Value | Group | "[" RawList "]" )?
    fn parse_attribute(&mut self, location: Location) -> Result<Block, StxError> {
        let (name, value) = self.parse_named_value("an attribute name")?;
        Ok(Block::Attribute {
            name,
            value,
            location,
        })
    }

    /// Directive ::= "#" Name ( ":" Value | Group )?
    fn parse_directive(&mut self, location: Location) -> Result<Option<Block>, StxError> {
        let (name, value) = self.parse_named_value("a directive name")?;
        log::debug!("{location}: directive `{name}`");

        match name.as_str() {
            "include" => {
                self.process_include(&value, location)?;
                Ok(None)
            }
            "embed" => self.process_embed(&value, location).map(Some),
            "title" | "author" | "format" | "encoding" | "stylesheets" | "output" => {
                Ok(Some(Block::Directive {
                    name,
                    value,
                    location,
                }))
            }
            _ => Err(SemanticError::UnknownDirective {
                name,
                src: location.named_source(),
                span: location.span(),
                location,
            }
            .into()),
        }
    }

    /// Reads `name`, then an optional value, then the end of the line. A
    /// value that does not parse up to the end of the line is taken as raw
    /// text, so `#title: Some Words` needs no quotes.
    fn parse_named_value(&mut self, expected: &str) -> Result<(String, Value), StxError> {
        let src = self.src();
        let name_location = src.location();
        let Some(name) = values::try_parse_text(src)? else {
            return Err(SyntaxError::unexpected(name_location, expected, src.rest_of_line()).into());
        };

        let value = match src.peek() {
            Some('[') => values::parse_bracket_list(src)?,
            Some('(') => values::parse_value(src)?,
            _ => {
                src.skip_spaces();
                if src.pull(":") {
                    src.skip_spaces();
                    let checkpoint = src.checkpoint();
                    let parsed = values::parse_value(src);
                    src.skip_spaces();
                    match parsed {
                        Ok(value) if src.at_line_end() => {
                            src.commit(checkpoint);
                            value
                        }
                        _ => {
                            src.rollback(checkpoint);
                            Value::Token(src.read_until(&['\n']).trim_end().to_string())
                        }
                    }
                } else {
                    Value::Empty
                }
            }
        };
        src.expect_end_of_line()?;
        Ok((name, value))
    }

    fn process_include(&mut self, value: &Value, location: Location) -> Result<(), StxError> {
        let targets = value.to_str_list().map_err(|err| {
            SemanticError::coercion(location.clone(), format!("include expects paths: {err}"))
        })?;

        let fs = self.reader.file_system();
        let from = self.reader.current().path().map(Path::to_path_buf);
        let mut paths = Vec::new();
        for target in &targets {
            let resolved = resolve_include(fs, from.as_deref(), target)
                .map_err(|err| StxError::from(ResourceError::from_io(target, &err, &location)))?;
            paths.extend(resolved);
        }

        log::debug!("{location}: including {} file(s)", paths.len());
        self.reader.push_include(paths, location)
    }

    fn process_embed(&mut self, value: &Value, location: Location) -> Result<Block, StxError> {
        let target = value.to_str().map_err(|err| {
            SemanticError::coercion(location.clone(), format!("embed expects a path: {err}"))
        })?;

        let base = self
            .reader
            .current()
            .path()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let path = normalize_path(&base.join(target));
        let text = self
            .reader
            .file_system()
            .read_to_string(&path)
            .map_err(|err| {
                StxError::from(ResourceError::from_io(&path.to_string_lossy(), &err, &location))
            })?;

        Ok(Block::CodeBlock {
            text,
            lang: None,
            location,
        })
    }

    /// Paragraph ::= Text { EOL Text }
    /// Continuation lines must be indented at least to the paragraph's
    /// first column and must not start a block.
    fn paragraph(&mut self) -> Result<Block, StxError> {
        let stop = self.stop_marks.last().copied();
        let src = self.reader.source();
        let start_column = src.column();
        let mut lines = Vec::new();

        loop {
            let location = src.location();
            let text = read_text(src, stop)?;
            lines.push(TextLine {
                text: text.trim_end().to_string(),
                location,
            });

            if !src.at_line_end() {
                break;
            }
            src.skip_line_end();
            if !continues_paragraph(src, start_column, stop) {
                break;
            }
            src.skip_spaces();
        }

        Ok(Block::LineText(lines))
    }

    // === Helper Methods ===

    fn src(&mut self) -> &mut Source {
        self.reader.source()
    }

    fn at_stop_mark(&self) -> bool {
        self.stop_marks
            .last()
            .is_some_and(|stop| self.reader.current().test(stop))
    }

    /// Skips the spaces after a mark and returns the column its content
    /// starts at. Content on the following lines uses one column past the
    /// mark when the mark ends its line.
    fn content_column(&mut self, mark_column: usize, mark_len: usize) -> usize {
        let src = self.src();
        src.skip_spaces();
        if src.at_line_end() {
            mark_column + mark_len + 1
        } else {
            src.column()
        }
    }

    /// Runs `f` with no open sections, so headings inside nested content
    /// start their own hierarchy.
    fn isolated<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, StxError>,
    ) -> Result<T, StxError> {
        let sections = std::mem::take(&mut self.sections);
        let result = f(self);
        self.sections = sections;
        result
    }
}

fn read_block_mark(src: &mut Source) -> Option<BlockMark> {
    let spec = marks::match_longest(src.rest_of_line(), BLOCK_MARKS)?;
    src.pull(spec.text);
    Some(spec.mark)
}

/// Reads up to the end of the line or an unescaped `stop`.
fn read_text(src: &mut Source, stop: Option<&str>) -> Result<String, StxError> {
    let mut out = String::new();
    while let Some(c) = src.peek() {
        if c == '\n' || stop.is_some_and(|stop| src.test(stop)) {
            break;
        }
        out.push(src.advance()?);
        if c == marks::ESCAPE_CHAR && !src.at_line_end() {
            out.push(src.advance()?);
        }
    }
    Ok(out)
}

fn continues_paragraph(src: &Source, start_column: usize, stop: Option<&str>) -> bool {
    if src.is_eof() || src.is_blank_line() {
        return false;
    }
    let indentation = src.line_indentation();
    if indentation < start_column {
        return false;
    }
    let rest = &src.rest_of_line()[indentation..];
    if stop.is_some_and(|stop| rest.starts_with(stop)) {
        return false;
    }
    marks::match_longest(rest, BLOCK_MARKS).is_none()
}
