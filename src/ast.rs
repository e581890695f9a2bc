use crate::source::Location;
use crate::values::Value;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root of a compiled document: metadata collected from directives plus the
/// content tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub title: Option<String>,
    pub author: Option<String>,
    pub format: Option<String>,
    pub encoding: Option<String>,
    pub stylesheets: Vec<String>,
    pub content: Component,
    pub outputs: Vec<Output>,
    pub source_path: Option<PathBuf>,
}

/// A requested rendering, from `#output`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Output {
    pub format: String,
    pub file: Option<String>,
    pub options: BTreeMap<String, Value>,
}

/// Pre-order position of a component in [`Document::content`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ComponentId(pub usize);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Component {
    #[serde(flatten)]
    pub kind: ComponentKind,
    pub location: Location,
    /// Filled by the linking pass; the first one is the main reference.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComponentKind {
    Composite {
        children: Vec<Component>,
    },
    Section {
        level: u8,
        heading: Box<Component>,
        content: Box<Component>,
        number: Option<String>,
    },
    ListBlock {
        items: Vec<Component>,
        ordered: bool,
    },
    Table {
        rows: Vec<Component>,
        caption: Option<Box<Component>>,
        number: Option<String>,
    },
    TableRow {
        cells: Vec<Component>,
        header: bool,
    },
    Figure {
        content: Box<Component>,
        caption: Box<Component>,
        number: Option<String>,
    },
    CodeBlock {
        contents: String,
        lang: Option<String>,
        caption: Option<Box<Component>>,
    },
    /// Verbatim text from a `+++` area.
    Literal {
        contents: String,
    },
    Paragraph {
        contents: Vec<Component>,
    },
    PlainText {
        text: String,
    },
    StyledText {
        contents: Vec<Component>,
        style: TextStyle,
    },
    LinkText {
        contents: Vec<Component>,
        reference: Option<String>,
        invalid: bool,
    },
    FunctionCall(FunctionCall),
    ContentBox {
        content: Box<Component>,
        style: Option<String>,
    },
    TableOfContents {
        title: Option<String>,
        elements: Vec<IndexNode>,
    },
    Image {
        src: String,
        alt: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextStyle {
    Strong,
    Emphasis,
    Code,
    Deleted,
    DoubleQuote,
    SingleQuote,
    Custom(String),
}

/// A call to a registered function. `result` stays `None` until the
/// resolution pass runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionCall {
    pub key: String,
    pub options: Value,
    pub argument: Argument,
    pub result: Option<Box<Component>>,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Argument {
    None,
    Text(String),
    Content(Box<Component>),
}

impl Argument {
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Argument::None => "no argument",
            Argument::Text(_) => "literal text",
            Argument::Content(_) => "content",
        }
    }
}

/// One entry of a table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexNode {
    pub title: String,
    pub reference: Option<String>,
    pub number: Option<String>,
    pub level: u8,
    pub children: Vec<IndexNode>,
}

impl Component {
    pub fn new(kind: ComponentKind, location: Location) -> Self {
        Component {
            kind,
            location,
            refs: Vec::new(),
        }
    }

    pub fn text_node(text: impl Into<String>, location: Location) -> Self {
        Component::new(ComponentKind::PlainText { text: text.into() }, location)
    }

    pub fn composite(children: Vec<Component>, location: Location) -> Self {
        Component::new(ComponentKind::Composite { children }, location)
    }

    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ComponentKind::Composite { .. } => "composite",
            ComponentKind::Section { .. } => "section",
            ComponentKind::ListBlock { .. } => "list",
            ComponentKind::Table { .. } => "table",
            ComponentKind::TableRow { .. } => "table row",
            ComponentKind::Figure { .. } => "figure",
            ComponentKind::CodeBlock { .. } => "code block",
            ComponentKind::Literal { .. } => "literal",
            ComponentKind::Paragraph { .. } => "paragraph",
            ComponentKind::PlainText { .. } => "text",
            ComponentKind::StyledText { .. } => "styled text",
            ComponentKind::LinkText { .. } => "link",
            ComponentKind::FunctionCall(_) => "function call",
            ComponentKind::ContentBox { .. } => "content box",
            ComponentKind::TableOfContents { .. } => "table of contents",
            ComponentKind::Image { .. } => "image",
        }
    }

    /// Direct children in document order. A resolved function call exposes
    /// its result; an unresolved one its content argument.
    #[must_use]
    pub fn children(&self) -> Vec<&Component> {
        match &self.kind {
            ComponentKind::Composite { children } => children.iter().collect(),
            ComponentKind::Section {
                heading, content, ..
            } => vec![heading.as_ref(), content.as_ref()],
            ComponentKind::ListBlock { items, .. } => items.iter().collect(),
            ComponentKind::Table { rows, caption, .. } => {
                caption.as_deref().into_iter().chain(rows.iter()).collect()
            }
            ComponentKind::TableRow { cells, .. } => cells.iter().collect(),
            ComponentKind::Figure {
                content, caption, ..
            } => vec![content.as_ref(), caption.as_ref()],
            ComponentKind::CodeBlock { caption, .. } => caption.as_deref().into_iter().collect(),
            ComponentKind::Paragraph { contents }
            | ComponentKind::StyledText { contents, .. }
            | ComponentKind::LinkText { contents, .. } => contents.iter().collect(),
            ComponentKind::FunctionCall(call) => match (&call.result, &call.argument) {
                (Some(result), _) => vec![result.as_ref()],
                (None, Argument::Content(content)) => vec![content.as_ref()],
                (None, _) => Vec::new(),
            },
            ComponentKind::ContentBox { content, .. } => vec![content.as_ref()],
            ComponentKind::PlainText { .. }
            | ComponentKind::Literal { .. }
            | ComponentKind::TableOfContents { .. }
            | ComponentKind::Image { .. } => Vec::new(),
        }
    }

    /// Same children, in the same order, as [`Component::children`].
    pub fn children_mut(&mut self) -> Vec<&mut Component> {
        match &mut self.kind {
            ComponentKind::Composite { children } => children.iter_mut().collect(),
            ComponentKind::Section {
                heading, content, ..
            } => vec![heading.as_mut(), content.as_mut()],
            ComponentKind::ListBlock { items, .. } => items.iter_mut().collect(),
            ComponentKind::Table { rows, caption, .. } => caption
                .as_deref_mut()
                .into_iter()
                .chain(rows.iter_mut())
                .collect(),
            ComponentKind::TableRow { cells, .. } => cells.iter_mut().collect(),
            ComponentKind::Figure {
                content, caption, ..
            } => vec![content.as_mut(), caption.as_mut()],
            ComponentKind::CodeBlock { caption, .. } => {
                caption.as_deref_mut().into_iter().collect()
            }
            ComponentKind::Paragraph { contents }
            | ComponentKind::StyledText { contents, .. }
            | ComponentKind::LinkText { contents, .. } => contents.iter_mut().collect(),
            ComponentKind::FunctionCall(call) => match (&mut call.result, &mut call.argument) {
                (Some(result), _) => vec![result.as_mut()],
                (None, Argument::Content(content)) => vec![content.as_mut()],
                (None, _) => Vec::new(),
            },
            ComponentKind::ContentBox { content, .. } => vec![content.as_mut()],
            ComponentKind::PlainText { .. }
            | ComponentKind::Literal { .. }
            | ComponentKind::TableOfContents { .. }
            | ComponentKind::Image { .. } => Vec::new(),
        }
    }

    /// Pre-order traversal starting with `self`.
    #[must_use]
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }

    /// Mutable pre-order traversal, visiting nodes in the same order as
    /// [`Component::walk`].
    pub fn try_walk_mut<E, F>(&mut self, visit: &mut F) -> Result<(), E>
    where
        F: FnMut(&mut Component) -> Result<(), E>,
    {
        visit(self)?;
        for child in self.children_mut() {
            child.try_walk_mut(visit)?;
        }
        Ok(())
    }

    pub fn walk_mut<F>(&mut self, visit: &mut F)
    where
        F: FnMut(&mut Component),
    {
        visit(self);
        for child in self.children_mut() {
            child.walk_mut(visit);
        }
    }

    /// Concatenated plain text of the subtree.
    #[must_use]
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match &self.kind {
            ComponentKind::PlainText { text } => out.push_str(text),
            ComponentKind::CodeBlock { contents, .. } | ComponentKind::Literal { contents } => {
                out.push_str(contents)
            }
            ComponentKind::Image { alt, .. } => out.push_str(alt.as_deref().unwrap_or_default()),
            ComponentKind::FunctionCall(FunctionCall {
                result: None,
                argument: Argument::Text(text),
                ..
            }) => out.push_str(text),
            _ => {
                for child in self.children() {
                    child.collect_text(out);
                }
            }
        }
    }

    #[must_use]
    pub fn main_ref(&self) -> Option<&str> {
        self.refs.first().map(String::as_str)
    }

    #[must_use]
    pub fn other_refs(&self) -> &[String] {
        self.refs.get(1..).unwrap_or_default()
    }

    /// The caption of a table, figure or code block.
    #[must_use]
    pub fn caption(&self) -> Option<&Component> {
        match &self.kind {
            ComponentKind::Table { caption, .. } | ComponentKind::CodeBlock { caption, .. } => {
                caption.as_deref()
            }
            ComponentKind::Figure { caption, .. } => Some(caption.as_ref()),
            _ => None,
        }
    }
}

pub struct Walk<'a> {
    stack: Vec<&'a Component>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a Component;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children().into_iter().rev());
        Some(node)
    }
}

impl Document {
    pub fn new(content: Component, source_path: Option<PathBuf>) -> Self {
        Document {
            title: None,
            author: None,
            format: None,
            encoding: None,
            stylesheets: Vec::new(),
            content,
            outputs: Vec::new(),
            source_path,
        }
    }

    /// The component with pre-order index `id`.
    #[must_use]
    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.content.walk().nth(id.0)
    }
}
