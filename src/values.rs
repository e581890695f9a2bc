use crate::error::{StxError, SyntaxError};
use crate::source::{Location, Source};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// A value of the data notation used by attributes, directives and function
/// options.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value {
    #[default]
    Empty,
    Token(String),
    Entry(String, Box<Value>),
    Group(Vec<Value>),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoercionError {
    #[error("expected {expected}, found {found}")]
    InvalidCoercion {
        expected: &'static str,
        found: &'static str,
    },
    #[error("duplicate key `{0}`")]
    DuplicateKey(String),
}

impl Value {
    pub fn token(text: impl Into<String>) -> Self {
        Value::Token(text.into())
    }

    pub fn entry(name: impl Into<String>, value: Value) -> Self {
        Value::Entry(name.into(), Box::new(value))
    }

    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Empty => "empty value",
            Value::Token(_) => "token",
            Value::Entry(..) => "entry",
            Value::Group(_) => "group",
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Empty => true,
            Value::Group(items) => items.is_empty(),
            _ => false,
        }
    }

    /// An empty group reads as the empty string and a one-item group as its
    /// item; anything else that is not a token fails.
    pub fn to_str(&self) -> Result<&str, CoercionError> {
        match self {
            Value::Token(text) => Ok(text),
            Value::Group(items) if items.is_empty() => Ok(""),
            Value::Group(items) if items.len() == 1 => items[0].to_str(),
            other => Err(CoercionError::InvalidCoercion {
                expected: "a string",
                found: other.kind_name(),
            }),
        }
    }

    #[must_use]
    pub fn to_list(&self) -> Vec<&Value> {
        match self {
            Value::Empty => Vec::new(),
            Value::Group(items) => items.iter().collect(),
            other => vec![other],
        }
    }

    pub fn to_str_list(&self) -> Result<Vec<String>, CoercionError> {
        self.to_list()
            .into_iter()
            .map(|item| item.to_str().map(str::to_string))
            .collect()
    }

    pub fn to_map(&self) -> Result<BTreeMap<String, Value>, CoercionError> {
        let mut map = BTreeMap::new();
        for item in self.to_list() {
            match item {
                Value::Entry(name, value) => {
                    if map.insert(name.clone(), (**value).clone()).is_some() {
                        return Err(CoercionError::DuplicateKey(name.clone()));
                    }
                }
                other => {
                    return Err(CoercionError::InvalidCoercion {
                        expected: "an entry",
                        found: other.kind_name(),
                    })
                }
            }
        }
        Ok(map)
    }

    /// Like [`Value::to_map`], but a bare token (or a token among the
    /// entries) is taken as the value of `key_for_str`.
    pub fn to_map_with(&self, key_for_str: &str) -> Result<BTreeMap<String, Value>, CoercionError> {
        let mut map = BTreeMap::new();
        for item in self.to_list() {
            let (name, value) = match item {
                Value::Entry(name, value) => (name.clone(), (**value).clone()),
                Value::Token(_) => (key_for_str.to_string(), item.clone()),
                other => {
                    return Err(CoercionError::InvalidCoercion {
                        expected: "an entry or a token",
                        found: other.kind_name(),
                    })
                }
            };
            if map.contains_key(&name) {
                return Err(CoercionError::DuplicateKey(name));
            }
            map.insert(name, value);
        }
        Ok(map)
    }

    /// Unwraps single-item groups.
    #[must_use]
    pub fn collapse(self) -> Value {
        match self {
            Value::Group(mut items) if items.len() == 1 => items.remove(0).collapse(),
            other => other,
        }
    }

    /// Reads a token as an entry with an empty value.
    #[must_use]
    pub fn into_entry(self) -> Option<(String, Value)> {
        match self {
            Value::Token(name) => Some((name, Value::Empty)),
            Value::Entry(name, value) => Some((name, *value)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => write!(f, "~"),
            Value::Token(text) if !text.is_empty() && text.chars().all(is_token_char) => {
                write!(f, "{text}")
            }
            Value::Token(text) => write!(f, "{text:?}"),
            Value::Entry(name, value) => write!(f, "{}: {value}", Value::token(name.clone())),
            Value::Group(items) => {
                write!(f, "(")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Empty => serializer.serialize_unit(),
            Value::Token(text) => serializer.serialize_str(text),
            Value::Entry(name, value) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(name, value)?;
                map.end()
            }
            Value::Group(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

// === Parsing ===

const TOKEN_DELIMITER: char = '`';
const ENTRY_SEPARATOR: char = ':';
const GROUP_SEPARATOR: char = ',';
const GROUP_BEGIN: char = '(';
const GROUP_END: char = ')';
const EMPTY_MARK: char = '~';

#[must_use]
pub fn is_token_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '/')
}

/// Parses a comma separated sequence: no items is [`Value::Empty`], one item
/// is that item, more become a [`Value::Group`].
pub fn parse_value(src: &mut Source) -> Result<Value, StxError> {
    let mut items = ValueParser::new(src).values()?;
    Ok(match items.len() {
        0 => Value::Empty,
        1 => items.remove(0),
        _ => Value::Group(items),
    })
}

/// Parses `name`, `name: value` or `name(group)`.
pub fn parse_entry(src: &mut Source) -> Result<(String, Value), StxError> {
    let location = src.location();
    try_parse_entry(src)?
        .ok_or_else(|| SyntaxError::invalid_value(location, "expected a name or an entry").into())
}

pub fn try_parse_entry(src: &mut Source) -> Result<Option<(String, Value)>, StxError> {
    Ok(ValueParser::new(src)
        .token_or_entry(true)?
        .and_then(Value::into_entry))
}

/// Reads a bare or delimited token.
pub fn try_parse_text(src: &mut Source) -> Result<Option<String>, StxError> {
    ValueParser::new(src).text()
}

/// The legacy attribute form `[a, b, c]`: raw comma separated tokens where
/// `\,` and `\]` escape the delimiters.
pub fn parse_bracket_list(src: &mut Source) -> Result<Value, StxError> {
    let opened_at = src.location();
    src.expect("[")?;
    let mut items = Vec::new();
    let mut current = String::new();
    loop {
        match src.peek() {
            None | Some('\n') => {
                return Err(SyntaxError::UnclosedDelimiter {
                    opener: "[".to_string(),
                    closer: "]".to_string(),
                    src: opened_at.named_source(),
                    span: opened_at.span(),
                    location: opened_at,
                }
                .into())
            }
            Some(']') => {
                src.advance()?;
                break;
            }
            Some(',') => {
                src.advance()?;
                items.push(Value::Token(current.trim().to_string()));
                current.clear();
            }
            Some('\\') => {
                src.advance()?;
                let escaped = src.advance()?;
                current.push(escaped);
            }
            Some(_) => current.push(src.advance()?),
        }
    }
    if !current.trim().is_empty() || !items.is_empty() {
        items.push(Value::Token(current.trim().to_string()));
    }
    Ok(match items.len() {
        0 => Value::Empty,
        1 => items.remove(0),
        _ => Value::Group(items),
    })
}

/// Parses a whole string as a value.
pub fn parse_str(text: &str) -> Result<Value, StxError> {
    let mut src = Source::new("<value>", text);
    src.skip_spaces();
    let value = parse_value(&mut src)?;
    src.skip_spaces();
    if !src.is_eof() {
        return Err(SyntaxError::unexpected(src.location(), "end of value", src.remaining()).into());
    }
    Ok(value)
}

struct ValueParser<'s> {
    src: &'s mut Source,
    depth: usize,
}

impl<'s> ValueParser<'s> {
    fn new(src: &'s mut Source) -> Self {
        ValueParser { src, depth: 0 }
    }

    /// Spaces and tabs; line breaks too inside parentheses.
    fn skip_void(&mut self) {
        let multiline = self.depth > 0;
        self.src
            .read_while(|c| c == ' ' || c == '\t' || (multiline && c == '\n'));
    }

    fn values(&mut self) -> Result<Vec<Value>, StxError> {
        let mut items = Vec::new();
        loop {
            let location = self.src.location();
            match self.item(true)? {
                Some(item) => items.push(item),
                None if items.is_empty() => break,
                None => {
                    return Err(
                        SyntaxError::invalid_value(location, "expected a value after `,`").into(),
                    )
                }
            }

            let checkpoint = self.src.checkpoint();
            self.skip_void();
            if self.src.pull(&GROUP_SEPARATOR.to_string()) {
                self.src.commit(checkpoint);
                self.skip_void();
            } else {
                self.src.rollback(checkpoint);
                break;
            }
        }
        Ok(items)
    }

    fn item(&mut self, allow_entry: bool) -> Result<Option<Value>, StxError> {
        match self.src.peek() {
            Some(EMPTY_MARK) => {
                self.src.advance()?;
                Ok(Some(Value::Empty))
            }
            Some(GROUP_BEGIN) => self.group().map(Some),
            _ => self.token_or_entry(allow_entry),
        }
    }

    fn group(&mut self) -> Result<Value, StxError> {
        let opened_at = self.src.location();
        self.src.advance()?;
        self.depth += 1;
        self.skip_void();
        let items = self.values()?;
        self.skip_void();
        self.depth -= 1;
        if self.src.peek() != Some(GROUP_END) {
            return Err(SyntaxError::UnclosedDelimiter {
                opener: GROUP_BEGIN.to_string(),
                closer: GROUP_END.to_string(),
                src: opened_at.named_source(),
                span: opened_at.span(),
                location: opened_at,
            }
            .into());
        }
        self.src.advance()?;
        Ok(Value::Group(items))
    }

    fn token_or_entry(&mut self, allow_entry: bool) -> Result<Option<Value>, StxError> {
        let Some(text) = self.text()? else {
            return Ok(None);
        };

        let checkpoint = self.src.checkpoint();
        self.skip_void();
        match self.src.peek() {
            Some(ENTRY_SEPARATOR) if allow_entry => {
                self.src.commit(checkpoint);
                self.src.advance()?;
                self.skip_void();
                let location = self.src.location();
                match self.item(false)? {
                    Some(value) => Ok(Some(Value::entry(text, value))),
                    None => {
                        Err(SyntaxError::invalid_value(location, "expected an entry value").into())
                    }
                }
            }
            Some(GROUP_BEGIN) => {
                self.src.commit(checkpoint);
                let group = self.group()?;
                Ok(Some(Value::entry(text, group)))
            }
            _ => {
                self.src.rollback(checkpoint);
                Ok(Some(Value::Token(text)))
            }
        }
    }

    fn text(&mut self) -> Result<Option<String>, StxError> {
        match self.src.peek() {
            Some(c) if is_token_char(c) => Ok(Some(self.src.read_while(is_token_char))),
            Some(TOKEN_DELIMITER) => self.delimited_token().map(Some),
            Some(quote @ ('"' | '\'')) => self.quoted_string(quote).map(Some),
            _ => Ok(None),
        }
    }

    fn delimited_token(&mut self) -> Result<String, StxError> {
        let opened_at = self.src.location();
        self.src.advance()?;
        let mut out = String::new();
        loop {
            match self.src.peek() {
                None => return Err(unclosed(opened_at, TOKEN_DELIMITER)),
                Some(TOKEN_DELIMITER) => {
                    self.src.advance()?;
                    return Ok(out);
                }
                Some('\\') => {
                    let location = self.src.location();
                    self.src.advance()?;
                    match self.src.advance()? {
                        c @ ('\\' | TOKEN_DELIMITER) => out.push(c),
                        other => return Err(invalid_escape(location, other)),
                    }
                }
                Some(_) => out.push(self.src.advance()?),
            }
        }
    }

    fn quoted_string(&mut self, quote: char) -> Result<String, StxError> {
        let opened_at = self.src.location();
        self.src.advance()?;
        let mut value = String::new();
        loop {
            let Some(c) = self.src.peek() else {
                return Err(unclosed(opened_at, quote));
            };
            if c == quote {
                self.src.advance()?;
                return Ok(value);
            }
            if c != '\\' {
                value.push(self.src.advance()?);
                continue;
            }

            let location = self.src.location();
            self.src.advance()?;
            match self.src.advance()? {
                '"' => value.push('"'),
                '\'' => value.push('\''),
                '\\' => value.push('\\'),
                '/' => value.push('/'),
                'n' => value.push('\n'),
                'r' => value.push('\r'),
                't' => value.push('\t'),
                'u' => {
                    let mut hex = String::with_capacity(4);
                    for _ in 0..4 {
                        hex.push(self.src.advance()?);
                    }
                    let decoded = u32::from_str_radix(&hex, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| {
                            StxError::from(SyntaxError::invalid_value(
                                location.clone(),
                                format!("`\\u{hex}` is not a valid code point"),
                            ))
                        })?;
                    value.push(decoded);
                }
                other => return Err(invalid_escape(location, other)),
            }
        }
    }
}

fn unclosed(opened_at: Location, delimiter: char) -> StxError {
    SyntaxError::UnclosedDelimiter {
        opener: delimiter.to_string(),
        closer: delimiter.to_string(),
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
