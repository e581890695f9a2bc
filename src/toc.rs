use crate::ast::{Component, ComponentKind, Document, IndexNode};

/// Fills every table of contents with the section outline of the document.
pub fn build_tables_of_contents(document: &mut Document) {
    let mut index = Vec::new();
    collect_index(&document.content, &mut index);

    let mut filled = 0;
    document.content.walk_mut(&mut |component: &mut Component| {
        if let ComponentKind::TableOfContents { elements, .. } = &mut component.kind {
            elements.clone_from(&index);
            filled += 1;
        }
    });
    if filled > 0 {
        log::debug!("filled {filled} table(s) of contents with {} top-level entries", index.len());
    }
}

/// The section outline below `component`. Only sections and composites are
/// looked into.
pub fn collect_index(component: &Component, elements: &mut Vec<IndexNode>) {
    match &component.kind {
        ComponentKind::Section {
            level,
            heading,
            content,
            number,
        } => {
            let mut node = IndexNode {
                title: heading.text().trim().to_string(),
                reference: component.main_ref().map(str::to_string),
                number: number.clone(),
                level: *level,
                children: Vec::new(),
            };
            collect_index(content, &mut node.children);
            elements.push(node);
        }
        ComponentKind::Composite { children } => {
            for child in children {
                collect_index(child, elements);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Location, SourceFile};
    use std::sync::Arc;

    fn loc() -> Location {
        Location::start_of(Arc::new(SourceFile::new("test.stx", "x")))
    }

    fn section(level: u8, title: &str, number: &str, children: Vec<Component>) -> Component {
        let mut component = Component::new(
            ComponentKind::Section {
                level,
                heading: Box::new(Component::text_node(format!(" {title} "), loc())),
                content: Box::new(Component::composite(children, loc())),
                number: Some(number.to_string()),
            },
            loc(),
        );
        component.refs.push(title.to_lowercase());
        component
    }

    fn toc() -> Component {
        Component::new(
            ComponentKind::TableOfContents {
                title: None,
                elements: Vec::new(),
            },
            loc(),
        )
    }

    fn boxed(content: Component) -> Component {
        Component::new(
            ComponentKind::ContentBox {
                content: Box::new(content),
                style: None,
            },
            loc(),
        )
    }

    #[test]
    fn test_outline_mirrors_sections() {
        let mut doc = Document::new(
            Component::composite(
                vec![
                    toc(),
                    section(1, "Intro", "1.", vec![section(2, "Goals", "1.1.", vec![])]),
                    boxed(section(1, "Hidden", "9.", vec![])),
                    section(1, "Usage", "2.", vec![]),
                ],
                loc(),
            ),
            None,
        );
        build_tables_of_contents(&mut doc);

        let Some(ComponentKind::TableOfContents { elements, .. }) =
            doc.content.walk().map(|c| &c.kind).find(|kind| matches!(kind, ComponentKind::TableOfContents { .. }))
        else {
            panic!("table of contents disappeared");
        };

        let titles: Vec<&str> = elements.iter().map(|node| node.title.as_str()).collect();
        assert_eq!(titles, ["Intro", "Usage"]);
        assert_eq!(elements[0].reference.as_deref(), Some("intro"));
        assert_eq!(elements[0].number.as_deref(), Some("1."));
        assert_eq!(elements[0].children.len(), 1);
        assert_eq!(elements[0].children[0].title, "Goals");
        assert_eq!(elements[0].children[0].level, 2);
        assert!(elements[1].children.is_empty());
    }

    #[test]
    fn test_rebuilding_replaces_entries() {
        let mut doc = Document::new(
            Component::composite(vec![toc(), section(1, "Only", "1.", vec![])], loc()),
            None,
        );
        build_tables_of_contents(&mut doc);
        let first = doc.clone();
        build_tables_of_contents(&mut doc);
        assert_eq!(doc, first);
    }
}
