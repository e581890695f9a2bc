use crate::source::{Location, TextLine};
use crate::values::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionMark {
    Pre,
    Post,
}

/// Parse-time tree produced by the block parser and consumed by the
/// compiler. Text regions stay raw here; inline markup is parsed during
/// compilation.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Composite {
        children: Vec<Block>,
        location: Location,
    },
    Title {
        level: u8,
        heading: Box<Block>,
        body: Box<Block>,
        location: Location,
    },
    ListItem {
        content: Box<Block>,
        ordered: bool,
        location: Location,
    },
    TableRow {
        cells: Vec<Block>,
        header: bool,
        location: Location,
    },
    TableCell {
        content: Box<Block>,
        location: Location,
    },
    CodeBlock {
        text: String,
        lang: Option<String>,
        location: Location,
    },
    /// The verbatim body of a `+++` area without a function header.
    Literal {
        text: String,
        location: Location,
    },
    LineText(Vec<TextLine>),
    Attribute {
        name: String,
        value: Value,
        location: Location,
    },
    Directive {
        name: String,
        value: Value,
        location: Location,
    },
    MarkedElement {
        content: Box<Block>,
        mark: CaptionMark,
        location: Location,
    },
    Separator(usize),
    /// A `{{{ ... }}}` region, optionally handed to a function.
    ContentBox {
        content: Box<Block>,
        function: Option<(String, Value)>,
        location: Location,
    },
    /// A code fence whose header names a function instead of a language.
    FunctionBlock {
        key: String,
        options: Value,
        text: String,
        location: Location,
    },
}

impl Block {
    /// Wraps captured blocks, unwrapping a single child.
    pub fn from_children(mut children: Vec<Block>, location: Location) -> Block {
        if children.len() == 1 {
            children.remove(0)
        } else {
            Block::Composite { children, location }
        }
    }

    /// The location the block starts at; separators have none.
    #[must_use]
    pub fn location(&self) -> Option<&Location> {
        match self {
            Block::Composite { location, .. }
            | Block::Title { location, .. }
            | Block::ListItem { location, .. }
            | Block::TableRow { location, .. }
            | Block::TableCell { location, .. }
            | Block::CodeBlock { location, .. }
            | Block::Literal { location, .. }
            | Block::Attribute { location, .. }
            | Block::Directive { location, .. }
            | Block::MarkedElement { location, .. }
            | Block::ContentBox { location, .. }
            | Block::FunctionBlock { location, .. } => Some(location),
            Block::LineText(lines) => lines.first().map(|line| &line.location),
            Block::Separator(_) => None,
        }
    }

    /// The raw text of a [`Block::LineText`], lines joined with `\n`.
    #[must_use]
    pub fn raw_text(&self) -> Option<String> {
        match self {
            Block::LineText(lines) => Some(
                lines
                    .iter()
                    .map(|line| line.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            _ => None,
        }
    }
}
