use crate::ast::{Component, ComponentId, ComponentKind, Document};
use crate::error::{SemanticError, StxError};
use crate::source::Location;
use serde::Serialize;
use std::collections::BTreeMap;

/// Default soft cap for generated references.
pub const REF_LENGTH_HINT: usize = 40;

/// Turns text into a reference: lower-case ASCII letters and digits, with
/// every other run of characters collapsed into one `-`. Once the result is
/// `length_hint` long, the next separator ends it.
#[must_use]
pub fn make_ref(text: &str, length_hint: Option<usize>) -> String {
    let mut slug = String::new();
    for c in text.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if length_hint.is_some_and(|hint| slug.len() >= hint) {
            break;
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Whether a link target points outside the document: `scheme://`, `//`,
/// `mailto:` or `tel:`.
#[must_use]
pub fn is_external(reference: &str) -> bool {
    let lower = reference.to_ascii_lowercase();
    if lower.starts_with("mailto:") || lower.starts_with("tel:") {
        return true;
    }
    let scheme_len = lower.chars().take_while(char::is_ascii_lowercase).count();
    let rest = &lower[scheme_len..];
    let rest = if scheme_len > 0 {
        match rest.strip_prefix(':') {
            Some(rest) => rest,
            None => return false,
        }
    } else {
        rest
    };
    rest.starts_with("//")
}

/// Every registered reference and the component carrying it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefMap {
    by_ref: BTreeMap<String, ComponentId>,
    by_component: BTreeMap<ComponentId, Vec<String>>,
}

impl RefMap {
    /// Reads the references already stored on the tree.
    #[must_use]
    pub fn from_document(document: &Document) -> Self {
        let mut map = RefMap::default();
        for (index, component) in document.content.walk().enumerate() {
            if component.refs.is_empty() {
                continue;
            }
            let id = ComponentId(index);
            for reference in &component.refs {
                map.by_ref.insert(reference.clone(), id);
            }
            map.by_component.insert(id, component.refs.clone());
        }
        map
    }

    #[must_use]
    pub fn lookup(&self, reference: &str) -> Option<ComponentId> {
        self.by_ref.get(reference).copied()
    }

    #[must_use]
    pub fn contains(&self, reference: &str) -> bool {
        self.by_ref.contains_key(reference)
    }

    #[must_use]
    pub fn main_ref(&self, id: ComponentId) -> Option<&str> {
        self.by_component
            .get(&id)
            .and_then(|refs| refs.first())
            .map(String::as_str)
    }

    #[must_use]
    pub fn other_refs(&self, id: ComponentId) -> &[String] {
        self.by_component
            .get(&id)
            .and_then(|refs| refs.get(1..))
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ComponentId)> {
        self.by_ref.iter().map(|(reference, id)| (reference.as_str(), *id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_ref.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_ref.is_empty()
    }
}

/// An internal link whose target is not defined anywhere.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkWarning {
    pub reference: String,
    pub location: Location,
}

/// Assigns and checks references. Running it again on a linked document
/// changes nothing.
pub fn link(
    document: &mut Document,
    length_hint: usize,
) -> Result<(RefMap, Vec<LinkWarning>), StxError> {
    let mut taken: BTreeMap<String, Location> = BTreeMap::new();

    // 1. Normalize explicit references
    document.content.try_walk_mut(&mut |component: &mut Component| {
        normalize_references(component, &mut taken)
    })?;

    // 2. Generate the missing ones
    document.content.walk_mut(&mut |component: &mut Component| {
        generate_reference(component, &mut taken, length_hint);
    });

    // 3. Check links
    let mut warnings = Vec::new();
    document.content.walk_mut(&mut |component: &mut Component| {
        check_link(component, &taken, &mut warnings);
    });

    let refs = RefMap::from_document(document);
    log::debug!(
        "linking done: {} reference(s), {} invalid link(s)",
        refs.len(),
        warnings.len()
    );
    Ok((refs, warnings))
}

fn normalize_references(
    component: &mut Component,
    taken: &mut BTreeMap<String, Location>,
) -> Result<(), StxError> {
    let location = &component.location;
    for reference in &mut component.refs {
        let normalized = make_ref(reference, None);
        if normalized.is_empty() {
            return Err(SemanticError::coercion(
                location.clone(),
                format!("reference `{reference}` has no letters or digits"),
            )
            .into());
        }
        if let Some(first) = taken.get(&normalized) {
            return Err(SemanticError::DuplicateReference {
                reference: normalized,
                first: first.clone(),
                src: location.named_source(),
                span: location.span(),
                location: location.clone(),
            }
            .into());
        }
        taken.insert(normalized.clone(), location.clone());
        *reference = normalized;
    }
    Ok(())
}

fn generate_reference(
    component: &mut Component,
    taken: &mut BTreeMap<String, Location>,
    length_hint: usize,
) {
    if !component.refs.is_empty() {
        return;
    }
    let text = match &component.kind {
        ComponentKind::Section { heading, .. } => heading.text(),
        ComponentKind::Table { caption: Some(caption), .. } => caption.text(),
        ComponentKind::Table { .. } => component.text(),
        ComponentKind::Figure { caption, .. } => caption.text(),
        _ => return,
    };

    let base = make_ref(&text, Some(length_hint));
    if base.is_empty() {
        log::warn!(
            "{}: cannot derive a reference for this {}",
            component.location,
            component.kind_name()
        );
        return;
    }

    let mut candidate = base.clone();
    let mut count = 0;
    while taken.contains_key(&candidate) {
        count += 1;
        candidate = format!("{base}-{count}");
    }
    taken.insert(candidate.clone(), component.location.clone());
    component.refs.push(candidate);
}

fn check_link(
    component: &mut Component,
    taken: &BTreeMap<String, Location>,
    warnings: &mut Vec<LinkWarning>,
) {
    let text = component.text();
    let ComponentKind::LinkText {
        reference, invalid, ..
    } = &mut component.kind
    else {
        return;
    };

    let normalized = match reference.as_deref() {
        None => make_ref(&text, None),
        Some(target) if is_external(target) => {
            *invalid = false;
            return;
        }
        Some(target) => make_ref(target, None),
    };

    *invalid = !taken.contains_key(&normalized);
    if *invalid {
        log::warn!("{}: invalid link `{normalized}`", component.location);
        warnings.push(LinkWarning {
            reference: normalized.clone(),
            location: component.location.clone(),
        });
    }
    *reference = Some(normalized);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceFile;
    use std::sync::Arc;

    fn loc(line: usize) -> Location {
        Location::new(Arc::new(SourceFile::new("test.stx", "x\n".repeat(10))), line, 1, 0)
    }

    fn text(value: &str) -> Component {
        Component::text_node(value, loc(1))
    }

    fn section(heading: &str, refs: &[&str], line: usize) -> Component {
        let mut component = Component::new(
            ComponentKind::Section {
                level: 1,
                heading: Box::new(text(heading)),
                content: Box::new(Component::composite(Vec::new(), loc(line))),
                number: None,
            },
            loc(line),
        );
        component.refs = refs.iter().map(|r| r.to_string()).collect();
        component
    }

    fn link_to(label: &str, reference: Option<&str>) -> Component {
        Component::new(
            ComponentKind::LinkText {
                contents: vec![text(label)],
                reference: reference.map(str::to_string),
                invalid: false,
            },
            loc(9),
        )
    }

    fn document(children: Vec<Component>) -> Document {
        Document::new(Component::composite(children, loc(1)), None)
    }

    fn link_ok(document: &mut Document) -> (RefMap, Vec<LinkWarning>) {
        match link(document, REF_LENGTH_HINT) {
            Ok(result) => result,
            Err(err) => {
                let report = miette::Report::from(err);
                panic!("{:#}", report);
            }
        }
    }

    fn link_state(component: &Component) -> (Option<String>, bool) {
        match &component.kind {
            ComponentKind::LinkText {
                reference, invalid, ..
            } => (reference.clone(), *invalid),
            other => panic!("expected a link, got {other:?}"),
        }
    }

    #[test]
    fn test_make_ref() {
        assert_eq!(make_ref("  Hello, World! ", None), "hello-world");
        assert_eq!(make_ref("Déjà vu 2", None), "d-j-vu-2");
        assert_eq!(make_ref("---", None), "");
        assert_eq!(make_ref("already-a-slug", None), "already-a-slug");
        assert_eq!(make_ref("alpha beta gamma", Some(5)), "alpha");
        assert_eq!(make_ref("alphabet soup", Some(5)), "alphabet");
    }

    #[test]
    fn test_is_external() {
        assert!(is_external("https://example.com"));
        assert!(is_external("HTTP://example.com"));
        assert!(is_external("//cdn.example.com/x"));
        assert!(is_external("mailto:someone@example.com"));
        assert!(is_external("tel:+123"));
        assert!(!is_external("intro"));
        assert!(!is_external("section:2"));
    }

    #[test]
    fn test_explicit_refs_are_normalized() {
        let mut doc = document(vec![section("Intro", &["My Intro", "Start"], 1)]);
        let (refs, _) = link_ok(&mut doc);
        assert_eq!(refs.lookup("my-intro"), Some(ComponentId(1)));
        assert_eq!(refs.main_ref(ComponentId(1)), Some("my-intro"));
        assert_eq!(refs.other_refs(ComponentId(1)), ["start".to_string()]);
        let component = doc.component(ComponentId(1)).unwrap();
        assert_eq!(component.main_ref(), Some("my-intro"));
    }

    #[test]
    fn test_duplicate_explicit_ref_fails() {
        let mut doc = document(vec![section("A", &["same"], 1), section("B", &["Same"], 3)]);
        let err = link(&mut doc, REF_LENGTH_HINT).unwrap_err();
        match err {
            StxError::Semantic(SemanticError::DuplicateReference { reference, first, location, .. }) => {
                assert_eq!(reference, "same");
                assert_eq!(first.line(), 1);
                assert_eq!(location.line(), 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_generated_refs_are_unique() {
        let mut doc = document(vec![
            section("Usage", &[], 1),
            section("Usage", &[], 2),
            section("Other", &["usage-2"], 3),
            section("Usage", &[], 4),
        ]);
        let (refs, _) = link_ok(&mut doc);
        let mut all: Vec<&str> = refs.iter().map(|(reference, _)| reference).collect();
        all.sort_unstable();
        assert_eq!(all, ["usage", "usage-1", "usage-2", "usage-3"]);
    }

    #[test]
    fn test_long_headings_still_get_unique_refs() {
        let heading = "a very long heading that goes well past the length hint of forty";
        let mut doc = document(vec![section(heading, &[], 1), section(heading, &[], 2)]);
        let (refs, _) = link_ok(&mut doc);
        assert_eq!(refs.len(), 2);
        assert!(refs.contains("a-very-long-heading-that-goes-well-past-the"));
    }

    #[test]
    fn test_links_are_checked() {
        let mut doc = document(vec![
            section("Getting Started", &[], 1),
            link_to("Getting started", None),
            link_to("See", Some("Getting Started")),
            link_to("See", Some("nonexistent")),
            link_to("Site", Some("https://example.com/A")),
        ]);
        let (_, warnings) = link_ok(&mut doc);

        let Component {
            kind: ComponentKind::Composite { children },
            ..
        } = &doc.content
        else {
            panic!("expected a composite root");
        };
        assert_eq!(link_state(&children[1]), (Some("getting-started".to_string()), false));
        assert_eq!(link_state(&children[2]), (Some("getting-started".to_string()), false));
        assert_eq!(link_state(&children[3]), (Some("nonexistent".to_string()), true));
        assert_eq!(
            link_state(&children[4]),
            (Some("https://example.com/A".to_string()), false)
        );

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].reference, "nonexistent");
        assert_eq!(warnings[0].location.line(), 9);
    }

    #[test]
    fn test_linking_is_idempotent() {
        let mut doc = document(vec![
            section("One", &["First Part"], 1),
            section("Two", &[], 2),
            section("Two", &[], 3),
            link_to("Two", None),
            link_to("x", Some("missing")),
        ]);
        let (first_refs, first_warnings) = link_ok(&mut doc);
        let linked = doc.clone();

        let (second_refs, second_warnings) = link_ok(&mut doc);
        assert_eq!(doc, linked);
        assert_eq!(first_refs, second_refs);
        assert_eq!(first_warnings, second_warnings);
    }
}
