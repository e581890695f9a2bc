//! Inline markup inside paragraphs: styles, code spans, links and function
//! calls, nested through a stack of open delimiters.

use crate::ast::{Argument, Component, ComponentKind, FunctionCall, TextStyle};
use crate::error::{StxError, SyntaxError};
use crate::marks::{self, InlineMark, INLINE_MARKS};
use crate::source::{Location, Source, TextLine};
use crate::values::{self, Value};

const ELLIPSIS: char = '\u{2026}';

struct Delimiter {
    opener: &'static str,
    closer: &'static str,
    opened_at: Location,
}

/// Parses the lines of one paragraph. A paragraph made of nothing but a
/// function call becomes that call, as a block.
pub fn parse_paragraph(lines: &[TextLine]) -> Result<Component, StxError> {
    let mut src = Source::fragment(lines);
    let location = src.location();
    let mut parser = InlineParser {
        src: &mut src,
        stack: Vec::new(),
    };
    let mut contents = parser.parse_contents()?;

    let lone_call = matches!(
        contents.as_slice(),
        [Component {
            kind: ComponentKind::FunctionCall(_),
            ..
        }]
    );
    if lone_call {
        if let Some(mut call) = contents.pop() {
            if let ComponentKind::FunctionCall(inner) = &mut call.kind {
                inner.inline = false;
            }
            return Ok(call);
        }
    }

    Ok(Component::new(ComponentKind::Paragraph { contents }, location))
}

struct InlineParser<'s> {
    src: &'s mut Source,
    stack: Vec<Delimiter>,
}

impl InlineParser<'_> {
    /// Reads nodes until the innermost open delimiter closes, or to the end
    /// of the text when none is open.
    fn parse_contents(&mut self) -> Result<Vec<Component>, StxError> {
        let mut nodes = Vec::new();
        let mut text = TextRun::default();

        loop {
            if self.src.is_eof() {
                if let Some(open) = self.stack.last() {
                    return Err(SyntaxError::UnclosedDelimiter {
                        opener: open.opener.to_string(),
                        closer: open.closer.to_string(),
                        src: open.opened_at.named_source(),
                        span: open.opened_at.span(),
                        location: open.opened_at.clone(),
                    }
                    .into());
                }
                break;
            }

            if let Some(open) = self.stack.last() {
                if self.src.pull(open.closer) {
                    break;
                }
            }
            self.check_enclosing_closers()?;

            let location = self.src.location();
            let mark =
                marks::match_longest(self.src.remaining(), INLINE_MARKS).map(|spec| spec.mark);
            let node = match mark {
                Some(InlineMark::Escape) => {
                    let c = self.escaped_char()?;
                    text.push(c, location);
                    continue;
                }
                Some(InlineMark::Strong) => self.styled(TextStyle::Strong, "*")?,
                Some(InlineMark::Emphasis) => self.styled(TextStyle::Emphasis, "_")?,
                Some(InlineMark::Deleted) => self.styled(TextStyle::Deleted, "~~")?,
                Some(InlineMark::DoubleQuote) => self.styled(TextStyle::DoubleQuote, "\"\"")?,
                Some(InlineMark::SingleQuote) => self.styled(TextStyle::SingleQuote, "''")?,
                Some(InlineMark::Ellipsis) => {
                    self.src.pull("...");
                    text.push(ELLIPSIS, location);
                    continue;
                }
                Some(InlineMark::Code) => self.code_span()?,
                Some(InlineMark::LinkOpen) => self.link()?,
                Some(InlineMark::FunctionOpen) => self.function_call()?,
                Some(InlineMark::ContentOpen) => self.captured_content()?,
                _ => {
                    let c = self.src.advance()?;
                    text.push(c, location);
                    continue;
                }
            };
            text.flush(&mut nodes);
            nodes.push(node);
        }

        text.flush(&mut nodes);
        Ok(nodes)
    }

    /// A closer of an outer delimiter showing up before the inner one is
    /// closed.
    fn check_enclosing_closers(&self) -> Result<(), StxError> {
        let Some((innermost, enclosing)) = self.stack.split_last() else {
            return Ok(());
        };
        let Some(outer) = enclosing.iter().rev().find(|d| self.src.test(d.closer)) else {
            return Ok(());
        };
        let location = self.src.location();
        Err(SyntaxError::MismatchedDelimiter {
            opener: innermost.opener.to_string(),
            opened_at: innermost.opened_at.clone(),
            expected: innermost.closer.to_string(),
            found: outer.closer.to_string(),
            src: location.named_source(),
            span: location.span(),
            opener_span: innermost.opened_at.span(),
            location,
        }
        .into())
    }

    fn escaped_char(&mut self) -> Result<char, StxError> {
        let location = self.src.location();
        self.src.advance()?;
        let c = self.src.advance()?;
        let closes = self
            .stack
            .last()
            .is_some_and(|open| open.closer.starts_with(c));
        if marks::is_escapable(c) || closes {
            Ok(c)
        } else {
            Err(invalid_escape(location, c))
        }
    }

    fn nested(
        &mut self,
        opener: &'static str,
        closer: &'static str,
    ) -> Result<(Vec<Component>, Location), StxError> {
        let opened_at = self.src.location();
        self.src.pull(opener);
        self.stack.push(Delimiter {
            opener,
            closer,
            opened_at: opened_at.clone(),
        });
        let contents = self.parse_contents();
        self.stack.pop();
        Ok((contents?, opened_at))
    }

    fn styled(&mut self, style: TextStyle, mark: &'static str) -> Result<Component, StxError> {
        let (contents, location) = self.nested(mark, mark)?;
        Ok(Component::new(
            ComponentKind::StyledText { contents, style },
            location,
        ))
    }

    /// Code spans take their content verbatim; only escapes apply.
    fn code_span(&mut self) -> Result<Component, StxError> {
        let opened_at = self.src.location();
        self.src.pull("`");
        let mut code = String::new();
        loop {
            match self.src.peek() {
                None => return Err(unclosed(opened_at, "`", "`")),
                Some('`') => {
                    self.src.advance()?;
                    break;
                }
                Some(marks::ESCAPE_CHAR) => {
                    let location = self.src.location();
                    self.src.advance()?;
                    let c = self.src.advance()?;
                    if !marks::is_escapable(c) {
                        return Err(invalid_escape(location, c));
                    }
                    code.push(c);
                }
                Some(_) => code.push(self.src.advance()?),
            }
        }

        let text = Component::text_node(code, opened_at.clone());
        Ok(Component::new(
            ComponentKind::StyledText {
                contents: vec![text],
                style: TextStyle::Code,
            },
            opened_at,
        ))
    }

    /// `[text]` or `[text](reference)`; the reference is read raw.
    fn link(&mut self) -> Result<Component, StxError> {
        let (contents, location) = self.nested("[", "]")?;

        let reference = if self.src.peek() == Some('(') {
            let opened_at = self.src.location();
            self.src.advance()?;
            let raw = self.src.read_until(&[')', '\n']);
            if !self.src.pull(")") {
                return Err(unclosed(opened_at, "(", ")"));
            }
            Some(raw.trim().to_string()).filter(|r| !r.is_empty())
        } else {
            None
        };

        Ok(Component::new(
            ComponentKind::LinkText {
                contents,
                reference,
                invalid: false,
            },
            location,
        ))
    }

    /// `<key options>` optionally followed by `{content}`.
    fn function_call(&mut self) -> Result<Component, StxError> {
        let location = self.src.location();
        let (key, options) = self.function_header()?;

        let argument = if self.src.peek() == Some('{') {
            let (contents, content_location) = self.nested("{", "}")?;
            Argument::Content(Box::new(Component::composite(contents, content_location)))
        } else {
            Argument::None
        };

        Ok(call(key, options, argument, location))
    }

    /// `{content}<key options>`
    fn captured_content(&mut self) -> Result<Component, StxError> {
        let (contents, location) = self.nested("{", "}")?;
        if self.src.peek() != Some('<') {
            let found = self.src.rest_of_line().to_string();
            return Err(SyntaxError::unexpected(
                self.src.location(),
                "a function call after captured content",
                found,
            )
            .into());
        }
        let (key, options) = self.function_header()?;
        let content = Component::composite(contents, location.clone());
        Ok(call(key, options, Argument::Content(Box::new(content)), location))
    }

    fn function_header(&mut self) -> Result<(String, Value), StxError> {
        let opened_at = self.src.location();
        self.src.pull("<");
        self.src.skip_spaces();

        let key_location = self.src.location();
        let Some(key) = values::try_parse_text(self.src)? else {
            let found = self.src.rest_of_line().to_string();
            return Err(SyntaxError::unexpected(key_location, "a function name", found).into());
        };

        let options = match self.src.peek() {
            Some('(') => values::parse_value(self.src)?,
            Some(':') => {
                self.src.advance()?;
                self.src.skip_spaces();
                values::parse_value(self.src)?
            }
            _ => {
                self.src.skip_spaces();
                values::parse_value(self.src)?
            }
        };

        self.src.skip_spaces();
        if self.src.is_eof() {
            return Err(unclosed(opened_at, "<", ">"));
        }
        self.src.expect(">")?;
        Ok((key, options))
    }
}

fn call(key: String, options: Value, argument: Argument, location: Location) -> Component {
    Component::new(
        ComponentKind::FunctionCall(FunctionCall {
            key,
            options,
            argument,
            result: None,
            inline: true,
        }),
        location,
    )
}

/// Literal characters waiting to become a text node.
#[derive(Default)]
struct TextRun {
    text: String,
    start: Option<Location>,
}

impl TextRun {
    fn push(&mut self, c: char, location: Location) {
        self.start.get_or_insert(location);
        self.text.push(c);
    }

    fn flush(&mut self, nodes: &mut Vec<Component>) {
        if let Some(start) = self.start.take() {
            nodes.push(Component::text_node(std::mem::take(&mut self.text), start));
        }
    }
}

fn unclosed(opened_at: Location, opener: &str, closer: &str) -> StxError {
    SyntaxError::UnclosedDelimiter {
        opener: opener.to_string(),
        closer: closer.to_string(),
        src: opened_at.named_source(),
        span: opened_at.span(),
        location: opened_at,
    }
    .into()
}

fn invalid_escape(location: Location, character: char) -> StxError {
    SyntaxError::InvalidEscape {
        character,
        src: location.named_source(),
        span: location.span(),
        location,
    }
    .into()
}
