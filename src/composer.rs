use crate::ast::{Component, ComponentKind, TextStyle};
use crate::error::{SemanticError, StxError};
use crate::source::Location;
use crate::values::{CoercionError, Value};

/// Which kind of block the next pushed item may merge into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Merge {
    None,
    List { ordered: bool },
    Table,
}

#[derive(Debug)]
struct PendingAttribute {
    name: String,
    value: Value,
    location: Location,
}

#[derive(Debug)]
struct Frame {
    location: Location,
    components: Vec<Component>,
    attributes: Vec<PendingAttribute>,
    caption: Option<(Component, Location)>,
    merge: Merge,
}

impl Frame {
    fn new(location: Location) -> Self {
        Frame {
            location,
            components: Vec::new(),
            attributes: Vec::new(),
            caption: None,
            merge: Merge::None,
        }
    }

    fn has_pending(&self) -> bool {
        !self.attributes.is_empty() || self.caption.is_some()
    }

    fn finish(mut self) -> Result<Component, StxError> {
        if let Some(first) = self.attributes.first() {
            let names = self
                .attributes
                .iter()
                .map(|attribute| format!("`{}`", attribute.name))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(SemanticError::UnconsumedAttributes {
                names,
                src: first.location.named_source(),
                span: first.location.span(),
                location: first.location.clone(),
            }
            .into());
        }
        if let Some((_, location)) = self.caption {
            return Err(SemanticError::floating_caption(location).into());
        }

        Ok(match self.components.len() {
            1 => self.components.remove(0),
            _ => Component::composite(self.components, self.location),
        })
    }
}

/// Accumulates compiled components frame by frame, applying pending
/// attributes and captions to whatever gets pushed next.
#[derive(Debug)]
pub struct Composer {
    current: Frame,
    parents: Vec<Frame>,
}

impl Composer {
    pub fn new(location: Location) -> Self {
        Composer {
            current: Frame::new(location),
            parents: Vec::new(),
        }
    }

    pub fn open_frame(&mut self, location: Location) {
        let parent = std::mem::replace(&mut self.current, Frame::new(location));
        self.parents.push(parent);
    }

    /// Closes the innermost frame: no frame yields an empty composite, one
    /// component is returned as is, more are wrapped in a composite.
    pub fn close_frame(&mut self) -> Result<Component, StxError> {
        let next = match self.parents.pop() {
            Some(parent) => parent,
            None => Frame::new(self.current.location.clone()),
        };
        std::mem::replace(&mut self.current, next).finish()
    }

    /// Closes the root frame.
    pub fn finish(self) -> Result<Component, StxError> {
        debug_assert!(self.parents.is_empty(), "unbalanced composer frames");
        self.current.finish()
    }

    #[must_use]
    pub fn get_last(&self) -> Option<&Component> {
        self.current.components.last()
    }

    /// Removes the most recently pushed component of the open frame. Stops
    /// list and table merging, so a following item starts a new block.
    pub fn pop(&mut self) -> Option<Component> {
        self.current.merge = Merge::None;
        self.current.components.pop()
    }

    pub fn push(&mut self, component: Component) -> Result<(), StxError> {
        let component = self.prepare(component)?;
        self.current.components.push(component);
        self.current.merge = Merge::None;
        Ok(())
    }

    /// Adds an item to the open list of the same kind, or starts a new list.
    pub fn push_list_item(
        &mut self,
        item: Component,
        ordered: bool,
        location: Location,
    ) -> Result<(), StxError> {
        if self.current.merge == (Merge::List { ordered }) && !self.current.has_pending() {
            if let Some(ComponentKind::ListBlock { items, .. }) = self.last_merge_target() {
                items.push(item);
                return Ok(());
            }
        }

        let list = Component::new(
            ComponentKind::ListBlock {
                items: vec![item],
                ordered,
            },
            location,
        );
        self.push(list)?;
        self.current.merge = Merge::List { ordered };
        Ok(())
    }

    /// Adds a row to the open table, or starts a new table.
    pub fn push_table_row(&mut self, row: Component, location: Location) -> Result<(), StxError> {
        if self.current.merge == Merge::Table && !self.current.has_pending() {
            if let Some(ComponentKind::Table { rows, .. }) = self.last_merge_target() {
                rows.push(row);
                return Ok(());
            }
        }

        let table = Component::new(
            ComponentKind::Table {
                rows: vec![row],
                caption: None,
                number: None,
            },
            location,
        );
        self.push(table)?;
        self.current.merge = Merge::Table;
        Ok(())
    }

    /// A separator of one blank line keeps lists and tables open; longer
    /// ones close them.
    pub fn separator(&mut self, size: usize) {
        if size >= 2 {
            self.current.merge = Merge::None;
        }
    }

    pub fn push_attribute(
        &mut self,
        name: String,
        value: Value,
        location: Location,
    ) -> Result<(), StxError> {
        if self.current.attributes.iter().any(|a| a.name == name) {
            return Err(SemanticError::DuplicateAttribute {
                name,
                src: location.named_source(),
                span: location.span(),
                location,
            }
            .into());
        }
        self.current.attributes.push(PendingAttribute {
            name,
            value,
            location,
        });
        Ok(())
    }

    pub fn push_pre_caption(
        &mut self,
        caption: Component,
        location: Location,
    ) -> Result<(), StxError> {
        if self.current.caption.is_some() {
            return Err(SemanticError::floating_caption(location).into());
        }
        self.current.caption = Some((caption, location));
        self.current.merge = Merge::None;
        Ok(())
    }

    /// Captions the most recent component, looking outward through empty
    /// frames.
    pub fn push_post_caption(
        &mut self,
        caption: Component,
        location: Location,
    ) -> Result<(), StxError> {
        self.current.merge = Merge::None;
        let found = std::iter::once(&mut self.current)
            .chain(self.parents.iter_mut().rev())
            .find_map(|frame| {
                let last = frame.components.pop()?;
                Some((last, &mut frame.components))
            });
        let Some((target, components)) = found else {
            return Err(SemanticError::CaptionWithoutTarget {
                src: location.named_source(),
                span: location.span(),
                location,
            }
            .into());
        };
        let captioned = attach_caption(target, caption, location)?;
        components.push(captioned);
        Ok(())
    }

    /// Applies pending attributes and the pending caption to `component`.
    fn prepare(&mut self, mut component: Component) -> Result<Component, StxError> {
        for attribute in std::mem::take(&mut self.current.attributes) {
            apply_attribute(&mut component, attribute)?;
        }
        match self.current.caption.take() {
            Some((caption, location)) => attach_caption(component, caption, location),
            None => Ok(component),
        }
    }

    /// The last component of the current frame, seen through a figure.
    fn last_merge_target(&mut self) -> Option<&mut ComponentKind> {
        let last = self.current.components.last_mut()?;
        match &mut last.kind {
            ComponentKind::Figure { content, .. } => Some(&mut content.kind),
            kind => Some(kind),
        }
    }
}

fn attach_caption(
    mut target: Component,
    caption: Component,
    location: Location,
) -> Result<Component, StxError> {
    match &mut target.kind {
        ComponentKind::Table { caption: slot, .. }
        | ComponentKind::CodeBlock { caption: slot, .. } => {
            if slot.is_some() {
                return Err(SemanticError::floating_caption(location).into());
            }
            *slot = Some(Box::new(caption));
            Ok(target)
        }
        ComponentKind::Figure { .. } => Err(SemanticError::floating_caption(location).into()),
        _ => {
            let figure_location = target.location.clone();
            Ok(Component::new(
                ComponentKind::Figure {
                    content: Box::new(target),
                    caption: Box::new(caption),
                    number: None,
                },
                figure_location,
            ))
        }
    }
}

fn apply_attribute(component: &mut Component, attribute: PendingAttribute) -> Result<(), StxError> {
    let PendingAttribute {
        name,
        value,
        location,
    } = attribute;
    let coercion = |err: CoercionError| {
        SemanticError::coercion(location.clone(), format!("attribute `{name}`: {err}"))
    };

    if name == "ref" {
        let refs = value.to_str_list().map_err(coercion)?;
        component.refs.extend(refs);
        return Ok(());
    }

    let applied = match (name.as_str(), &mut component.kind) {
        ("lang", ComponentKind::CodeBlock { lang, .. }) => {
            *lang = Some(value.to_str().map_err(coercion)?.to_string());
            true
        }
        ("style", ComponentKind::ContentBox { style, .. }) => {
            *style = Some(value.to_str().map_err(coercion)?.to_string());
            true
        }
        ("style", ComponentKind::StyledText { style, .. }) => {
            *style = TextStyle::Custom(value.to_str().map_err(coercion)?.to_string());
            true
        }
        _ => false,
    };
    if applied {
        return Ok(());
    }

    Err(SemanticError::UnknownAttribute {
        component: component.kind_name(),
        src: location.named_source(),
        span: location.span(),
        name,
        location,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceFile;
    use std::sync::Arc;

    fn loc() -> Location {
        Location::start_of(Arc::new(SourceFile::new("test.stx", "x")))
    }

    fn text(s: &str) -> Component {
        Component::text_node(s, loc())
    }

    fn row(cell: &str) -> Component {
        Component::new(
            ComponentKind::TableRow {
                cells: vec![text(cell)],
                header: false,
            },
            loc(),
        )
    }

    fn code(contents: &str) -> Component {
        Component::new(
            ComponentKind::CodeBlock {
                contents: contents.to_string(),
                lang: None,
                caption: None,
            },
            loc(),
        )
    }

    fn children(component: &Component) -> Vec<&Component> {
        match &component.kind {
            ComponentKind::Composite { children } => children.iter().collect(),
            _ => vec![component],
        }
    }

    #[test]
    fn test_list_items_merge_until_long_separator() {
        let mut composer = Composer::new(loc());
        composer.push_list_item(text("one"), false, loc()).unwrap();
        composer.push_list_item(text("two"), false, loc()).unwrap();
        composer.separator(1);
        composer.push_list_item(text("three"), false, loc()).unwrap();
        composer.separator(2);
        composer.push_list_item(text("four"), false, loc()).unwrap();
        composer.push_list_item(text("five"), true, loc()).unwrap();

        let result = composer.finish().unwrap();
        let lists: Vec<(usize, bool)> = children(&result)
            .iter()
            .map(|c| match &c.kind {
                ComponentKind::ListBlock { items, ordered } => (items.len(), *ordered),
                other => panic!("expected a list, got {other:?}"),
            })
            .collect();
        assert_eq!(lists, vec![(3, false), (1, false), (1, true)]);
    }

    #[test]
    fn test_rows_merge_into_table() {
        let mut composer = Composer::new(loc());
        composer.push_table_row(row("a"), loc()).unwrap();
        composer.push_table_row(row("b"), loc()).unwrap();
        let table = composer.finish().unwrap();
        assert!(matches!(&table.kind, ComponentKind::Table { rows, .. } if rows.len() == 2));
    }

    #[test]
    fn test_pre_caption_goes_into_table() {
        let mut composer = Composer::new(loc());
        composer.push_pre_caption(text("Numbers"), loc()).unwrap();
        composer.push_table_row(row("a"), loc()).unwrap();
        composer.push_table_row(row("b"), loc()).unwrap();
        let table = composer.finish().unwrap();
        let ComponentKind::Table { rows, caption, .. } = &table.kind else {
            panic!("expected a table, got {table:?}");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(caption.as_ref().unwrap().text(), "Numbers");
    }

    #[test]
    fn test_pre_caption_wraps_in_figure() {
        let mut composer = Composer::new(loc());
        composer.push_pre_caption(text("Look"), loc()).unwrap();
        composer.push(text("picture")).unwrap();
        let figure = composer.finish().unwrap();
        let ComponentKind::Figure { content, caption, .. } = &figure.kind else {
            panic!("expected a figure, got {figure:?}");
        };
        assert_eq!(content.text(), "picture");
        assert_eq!(caption.text(), "Look");
    }

    #[test]
    fn test_two_pre_captions_are_floating() {
        let mut composer = Composer::new(loc());
        composer.push_pre_caption(text("one"), loc()).unwrap();
        let err = composer.push_pre_caption(text("two"), loc()).unwrap_err();
        assert!(matches!(
            err,
            StxError::Semantic(SemanticError::FloatingCaption { .. })
        ));
    }

    #[test]
    fn test_post_caption_on_captioned_code_is_floating() {
        let mut composer = Composer::new(loc());
        composer.push(code("x")).unwrap();
        composer.push_post_caption(text("first"), loc()).unwrap();
        assert!(composer.get_last().unwrap().caption().is_some());
        let err = composer.push_post_caption(text("second"), loc()).unwrap_err();
        assert!(matches!(
            err,
            StxError::Semantic(SemanticError::FloatingCaption { .. })
        ));
    }

    #[test]
    fn test_post_caption_looks_through_empty_frames() {
        let mut composer = Composer::new(loc());
        composer.push(text("picture")).unwrap();
        composer.open_frame(loc());
        composer.push_post_caption(text("caption"), loc()).unwrap();
        let inner = composer.close_frame().unwrap();
        assert!(matches!(&inner.kind, ComponentKind::Composite { children } if children.is_empty()));

        let figure = composer.finish().unwrap();
        assert!(matches!(figure.kind, ComponentKind::Figure { .. }));
    }

    #[test]
    fn test_post_caption_without_target() {
        let mut composer = Composer::new(loc());
        let err = composer.push_post_caption(text("alone"), loc()).unwrap_err();
        assert!(matches!(
            err,
            StxError::Semantic(SemanticError::CaptionWithoutTarget { .. })
        ));
    }

    #[test]
    fn test_attributes_apply_to_next_component() {
        let mut composer = Composer::new(loc());
        composer
            .push_attribute("ref".to_string(), Value::token("main"), loc())
            .unwrap();
        composer
            .push_attribute("lang".to_string(), Value::token("rust"), loc())
            .unwrap();
        composer.push(code("fn main() {}")).unwrap();
        composer.push(code("second")).unwrap();

        let result = composer.finish().unwrap();
        let blocks = children(&result);
        assert_eq!(blocks[0].main_ref(), Some("main"));
        assert!(matches!(&blocks[0].kind, ComponentKind::CodeBlock { lang: Some(l), .. } if l == "rust"));
        assert!(blocks[1].refs.is_empty());
    }

    #[test]
    fn test_attribute_errors() {
        let mut composer = Composer::new(loc());
        composer
            .push_attribute("ref".to_string(), Value::token("a"), loc())
            .unwrap();
        let err = composer
            .push_attribute("ref".to_string(), Value::token("b"), loc())
            .unwrap_err();
        assert!(matches!(
            err,
            StxError::Semantic(SemanticError::DuplicateAttribute { .. })
        ));

        let mut composer = Composer::new(loc());
        composer
            .push_attribute("lang".to_string(), Value::token("rust"), loc())
            .unwrap();
        let err = composer.push(text("not code")).unwrap_err();
        assert!(matches!(
            err,
            StxError::Semantic(SemanticError::UnknownAttribute { component: "text", .. })
        ));
    }

    #[test]
    fn test_pending_state_at_close_is_an_error() {
        let mut composer = Composer::new(loc());
        composer.open_frame(loc());
        composer
            .push_attribute("ref".to_string(), Value::token("x"), loc())
            .unwrap();
        let err = composer.close_frame().unwrap_err();
        assert!(matches!(
            err,
            StxError::Semantic(SemanticError::UnconsumedAttributes { .. })
        ));

        let mut composer = Composer::new(loc());
        composer.push_pre_caption(text("dangling"), loc()).unwrap();
        let err = composer.finish().unwrap_err();
        assert!(matches!(
            err,
            StxError::Semantic(SemanticError::FloatingCaption { .. })
        ));
    }

    #[test]
    fn test_pop_returns_last_and_breaks_merging() {
        let mut composer = Composer::new(loc());
        composer.push(text("a")).unwrap();
        composer.push_list_item(text("one"), false, loc()).unwrap();
        let popped = composer.pop().unwrap();
        assert_eq!(popped.kind_name(), "list");
        assert_eq!(composer.get_last().map(Component::text).as_deref(), Some("a"));

        composer.push_list_item(text("two"), false, loc()).unwrap();
        assert!(matches!(
            &composer.get_last().unwrap().kind,
            ComponentKind::ListBlock { items, .. } if items.len() == 1
        ));
        assert!(Composer::new(loc()).pop().is_none());
    }
}
