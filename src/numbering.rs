use crate::ast::{Component, ComponentKind, Document};

/// Default number of section levels that get a number.
pub const MAX_NUMBER_DEPTH: usize = 3;

/// Numbers sections by nesting (`1.`, `1.2.`, ...) down to `max_depth`
/// levels, then tables and figures by order of appearance. Existing
/// numbers are overwritten, so running it twice gives the same result.
pub fn number(document: &mut Document, max_depth: usize) {
    number_sections(&mut document.content, "", 1, max_depth);
    number_tables_and_figures(&mut document.content);
}

/// Only composites and sections are looked into.
fn number_sections(component: &mut Component, parent: &str, depth: usize, max_depth: usize) {
    match &mut component.kind {
        ComponentKind::Composite { children } => {
            let mut count = 1;
            for child in children {
                if matches!(child.kind, ComponentKind::Section { .. }) {
                    number_section(child, parent, count, depth, max_depth);
                    count += 1;
                } else {
                    number_sections(child, parent, depth, max_depth);
                }
            }
        }
        ComponentKind::Section { .. } => number_section(component, parent, 1, depth, max_depth),
        _ => {}
    }
}

fn number_section(
    section: &mut Component,
    parent: &str,
    count: usize,
    depth: usize,
    max_depth: usize,
) {
    let location = &section.location;
    let ComponentKind::Section {
        level,
        content,
        number,
        ..
    } = &mut section.kind
    else {
        return;
    };

    if usize::from(*level) != depth {
        log::warn!("{location}: expected section level {depth} instead of {level}");
    }

    let own = format!("{parent}{count}.");
    *number = (depth <= max_depth).then(|| own.clone());
    number_sections(content, &own, depth + 1, max_depth);
}

fn number_tables_and_figures(root: &mut Component) {
    let mut tables = 0;
    let mut figures = 0;
    root.walk_mut(&mut |component: &mut Component| match &mut component.kind {
        ComponentKind::Table { number, .. } => {
            tables += 1;
            *number = Some(format!("{tables}."));
        }
        ComponentKind::Figure { number, .. } => {
            figures += 1;
            *number = Some(format!("{figures}."));
        }
        _ => {}
    });
}
