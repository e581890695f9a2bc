use miette::Report;
use stx_core::ast::{Component, ComponentKind, TextStyle};
use stx_core::linking;
use stx_core::numbering;
use stx_core::{compile, CompileResult, Compiler, Options};

fn compile_ok(source: &str) -> CompileResult {
    match compile(source, "test.stx") {
        Ok(result) => result,
        Err(err) => {
            let report = Report::from(err);
            panic!("{:#}", report);
        }
    }
}

fn top_level(component: &Component) -> Vec<&Component> {
    match &component.kind {
        ComponentKind::Composite { children } => children.iter().collect(),
        _ => vec![component],
    }
}

fn sections(component: &Component) -> Vec<&Component> {
    component
        .walk()
        .filter(|c| matches!(c.kind, ComponentKind::Section { .. }))
        .collect()
}

fn section_number(section: &Component) -> Option<&str> {
    match &section.kind {
        ComponentKind::Section { number, .. } => number.as_deref(),
        _ => None,
    }
}

#[test]
fn test_title_and_body() {
    let result = compile_ok("= Title\n\nBody");
    let ComponentKind::Section {
        level,
        heading,
        content,
        ..
    } = &result.document.content.kind
    else {
        panic!("expected one section, got {:?}", result.document.content);
    };
    assert_eq!(*level, 1);
    assert_eq!(heading.text(), "Title");
    assert!(matches!(content.kind, ComponentKind::Paragraph { .. }));
    assert_eq!(content.text(), "Body");
}

#[test]
fn test_heading_nesting() {
    let result = compile_ok("= A\n== B\n== C\n= D");
    let parts = top_level(&result.document.content);
    assert_eq!(parts.len(), 2);

    let ComponentKind::Section { heading, content, .. } = &parts[0].kind else {
        panic!("expected section A");
    };
    assert_eq!(heading.text(), "A");
    let nested: Vec<String> = top_level(content)
        .iter()
        .map(|section| match &section.kind {
            ComponentKind::Section { heading, level, .. } => format!("{level}:{}", heading.text()),
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(nested, ["2:B", "2:C"]);

    let numbers: Vec<Option<&str>> = sections(&result.document.content)
        .into_iter()
        .map(section_number)
        .collect();
    assert_eq!(numbers, [Some("1."), Some("1.1."), Some("1.2."), Some("2.")]);
}

#[test]
fn test_list_merging() {
    let result = compile_ok("- one\n- two\n- three");
    let ComponentKind::ListBlock { items, ordered } = &result.document.content.kind else {
        panic!("expected a list, got {:?}", result.document.content);
    };
    assert!(!ordered);
    assert_eq!(items.len(), 3);
}

#[test]
fn test_table_cells() {
    let result = compile_ok("|= H1 | H2\n|- a | b");
    let ComponentKind::Table { rows, number, .. } = &result.document.content.kind else {
        panic!("expected a table, got {:?}", result.document.content);
    };
    assert_eq!(number.as_deref(), Some("1."));
    let shape: Vec<(bool, usize)> = rows
        .iter()
        .map(|row| match &row.kind {
            ComponentKind::TableRow { cells, header } => (*header, cells.len()),
            other => panic!("expected a row, got {other:?}"),
        })
        .collect();
    assert_eq!(shape, [(true, 2), (false, 2)]);
    assert!(result.document.content.main_ref().is_some());
}

#[test]
fn test_escapes_are_consumed() {
    let result = compile_ok("\\*not bold\\*");
    assert_eq!(result.document.content.text(), "*not bold*");
    assert!(!result
        .document
        .content
        .walk()
        .any(|c| matches!(c.kind, ComponentKind::StyledText { style: TextStyle::Strong, .. })));
}

#[test]
fn test_escaped_cell_mark_stays_in_cell() {
    let result = compile_ok("|- a\\|b | c");
    let ComponentKind::Table { rows, .. } = &result.document.content.kind else {
        panic!("expected a table, got {:?}", result.document.content);
    };
    let ComponentKind::TableRow { cells, .. } = &rows[0].kind else {
        panic!("expected a row, got {:?}", rows[0]);
    };
    let texts: Vec<String> = cells.iter().map(Component::text).collect();
    assert_eq!(texts, ["a|b", "c"]);
}

#[test]
fn test_quote_styles_and_ellipsis() {
    let result = compile_ok("Wait... she said \"\"hi\"\" and ''ok''.\n");
    let styles: Vec<TextStyle> = result
        .document
        .content
        .walk()
        .filter_map(|c| match &c.kind {
            ComponentKind::StyledText { style, .. } => Some(style.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(styles, [TextStyle::DoubleQuote, TextStyle::SingleQuote]);
    assert_eq!(
        result.document.content.text(),
        "Wait\u{2026} she said hi and ok."
    );
}

#[test]
fn test_literal_area_is_not_markup() {
    let result = compile_ok("+++\nraw *text*\n+++\n");
    let ComponentKind::Literal { contents } = &result.document.content.kind else {
        panic!("expected a literal, got {:?}", result.document.content);
    };
    assert_eq!(contents, "raw *text*\n");
}

#[test]
fn test_literal_area_feeds_a_function() {
    let result = compile_ok("+++ code: rust\nfn main() {}\n+++\n");
    let code = result
        .document
        .content
        .walk()
        .find_map(|c| match &c.kind {
            ComponentKind::CodeBlock { contents, lang, .. } => Some((contents.clone(), lang.clone())),
            _ => None,
        });
    assert_eq!(code, Some(("fn main() {}\n".to_string(), Some("rust".to_string()))));
}

#[test]
fn test_exit_mark_returns_to_parent_section() {
    let result = compile_ok("= A\n== B\nInside B.\n%\nBack in A.\n");
    let ComponentKind::Section { content, .. } = &result.document.content.kind else {
        panic!("expected section A, got {:?}", result.document.content);
    };
    let parts = top_level(content);
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].kind_name(), "section");
    assert_eq!(parts[1].text(), "Back in A.");
}

#[test]
fn test_exit_mark_splits_lists() {
    let result = compile_ok("- one\n%\n- two\n");
    let lists = result
        .document
        .content
        .walk()
        .filter(|c| matches!(c.kind, ComponentKind::ListBlock { .. }))
        .count();
    assert_eq!(lists, 2);
}

#[test]
fn test_unresolved_link_is_flagged() {
    let result = compile_ok("[See](nonexistent)");
    let link = result
        .document
        .content
        .walk()
        .find_map(|c| match &c.kind {
            ComponentKind::LinkText {
                reference, invalid, ..
            } => Some((reference.clone(), *invalid)),
            _ => None,
        })
        .unwrap();
    assert_eq!(link, (Some("nonexistent".to_string()), true));
    assert!(result.has_invalid_links());
    assert_eq!(result.warnings[0].location.line(), 1);
}

#[test]
fn test_links_to_sections_resolve() {
    let result = compile_ok("= Getting Started\n\nRead [this](Getting Started) or [getting started].\n\n= Next\n\nVisit [docs](https://example.com).");
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    let references: Vec<Option<String>> = result
        .document
        .content
        .walk()
        .filter_map(|c| match &c.kind {
            ComponentKind::LinkText { reference, .. } => Some(reference.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        references,
        [
            Some("getting-started".to_string()),
            Some("getting-started".to_string()),
            Some("https://example.com".to_string())
        ]
    );
}

#[test]
fn test_references_are_unique_and_stable() {
    let source = "= Setup\n\n= Setup\n\n@ref: setup-2\n= Other\n\n:: Setup\n|- x\n";
    let mut result = compile_ok(source);

    let mut all: Vec<String> = result.refs.iter().map(|(reference, _)| reference.to_string()).collect();
    let count = all.len();
    all.sort();
    all.dedup();
    assert_eq!(all.len(), count);
    assert_eq!(all, ["setup", "setup-1", "setup-2", "setup-3"]);

    for (reference, id) in result.refs.iter() {
        let component = result.document.component(id).unwrap();
        assert!(component.refs.iter().any(|r| r == reference));
    }

    let linked = result.document.clone();
    let (refs, warnings) = linking::link(&mut result.document, linking::REF_LENGTH_HINT).unwrap();
    assert_eq!(result.document, linked);
    assert_eq!(refs, result.refs);
    assert!(warnings.is_empty());
}

#[test]
fn test_numbering_is_deterministic() {
    let mut result = compile_ok("= A\n== B\n|- cell\n\n\n= C\n:: Caption\nA figure\n");
    let numbered = result.document.clone();
    numbering::number(&mut result.document, numbering::MAX_NUMBER_DEPTH);
    assert_eq!(result.document, numbered);
}

#[test]
fn test_number_depth_option() {
    let source = "= A\n== B\n=== C\n";
    let shallow = Compiler::new()
        .with_options(Options {
            max_number_depth: 2,
            ..Options::default()
        })
        .compile_str(source, "test.stx")
        .unwrap();
    let numbers: Vec<Option<&str>> = sections(&shallow.document.content)
        .into_iter()
        .map(section_number)
        .collect();
    assert_eq!(numbers, [Some("1."), Some("1.1."), None]);
}

#[test]
fn test_table_of_contents() {
    let result = compile_ok("<toc: Contents>\n\n= Intro\n== Goals\n= Usage\n");
    let Some(ComponentKind::TableOfContents { title, elements }) = result
        .document
        .content
        .walk()
        .map(|c| &c.kind)
        .find(|kind| matches!(kind, ComponentKind::TableOfContents { .. }))
    else {
        panic!("no table of contents in {:?}", result.document.content);
    };
    assert_eq!(title.as_deref(), Some("Contents"));
    assert_eq!(elements.len(), 2);
    assert_eq!(elements[0].title, "Intro");
    assert_eq!(elements[0].reference.as_deref(), Some("intro"));
    assert_eq!(elements[0].children[0].number.as_deref(), Some("1.1."));
    assert_eq!(elements[1].number.as_deref(), Some("2."));
}

#[test]
fn test_builtin_functions_resolve() {
    let result = compile_ok(
        "Line<br>break and <style: loud>{shouting}.\n\n<img src: cat.png, alt: \"A cat\">\n\n{{{ warning\nCareful\n}}}\n",
    );
    let kinds: Vec<&'static str> = result
        .document
        .content
        .walk()
        .filter_map(|c| match &c.kind {
            ComponentKind::FunctionCall(call) => call.result.as_ref().map(|r| r.kind_name()),
            _ => None,
        })
        .collect();
    assert_eq!(kinds, ["text", "styled text", "image", "content box"]);
    assert!(result.document.content.text().starts_with("Line\nbreak and shouting."));
}

#[test]
fn test_metadata_reaches_document() {
    let result = compile_ok("#title: Field Notes\n#author: A. Writer\n#output: html(file: notes.html)\n\nText");
    let document = &result.document;
    assert_eq!(document.title.as_deref(), Some("Field Notes"));
    assert_eq!(document.author.as_deref(), Some("A. Writer"));
    assert_eq!(document.outputs[0].format, "html");
    assert_eq!(document.outputs[0].file.as_deref(), Some("notes.html"));
}

#[test]
fn test_simple_document_to_json() {
    let result = compile_ok("#title: Demo\n\n= Intro\n\nHello *world*.");
    let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();

    assert_eq!(json["document"]["title"], "Demo");
    let section = &json["document"]["content"];
    assert_eq!(section["type"], "section");
    assert_eq!(section["number"], "1.");
    assert_eq!(section["refs"], serde_json::json!(["intro"]));
    assert_eq!(section["location"], serde_json::json!({"file": "test.stx", "line": 3, "column": 1}));
    assert_eq!(section["content"]["type"], "paragraph");
    assert_eq!(section["content"]["contents"][1]["style"], "strong");
    assert!(json["warnings"].as_array().unwrap().is_empty());
}

#[test]
fn test_simple_document_to_yaml() {
    let result = compile_ok("= Intro\n");
    let yaml = result.to_yaml().unwrap();
    let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(value["document"]["content"]["type"], serde_yaml::Value::from("section"));
}
