use miette::Report;
use std::fs;
use std::path::Path;
use stx_core::ast::{Component, ComponentKind, FunctionCall};
use stx_core::error::ResourceError;
use stx_core::{compile_file, CompileResult, Compiler, FunctionRegistry, StxError};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, text: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, text).unwrap();
}

fn compile_ok(path: &Path) -> CompileResult {
    match compile_file(path) {
        Ok(result) => result,
        Err(err) => {
            let report = Report::from(err);
            panic!("{:#}", report);
        }
    }
}

fn headings(component: &Component) -> Vec<String> {
    component
        .walk()
        .filter_map(|c| match &c.kind {
            ComponentKind::Section { heading, .. } => Some(heading.text()),
            _ => None,
        })
        .collect()
}

fn code_blocks(component: &Component) -> Vec<String> {
    component
        .walk()
        .filter_map(|c| match &c.kind {
            ComponentKind::CodeBlock { contents, .. } => Some(contents.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_directory_include_in_sorted_order() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "book.stx", "#title: Book\n#include: chapters\n");
    write(dir.path(), "chapters/02-usage.stx", "= Usage\n\nRun it.\n");
    write(dir.path(), "chapters/01-intro.stx", "= Intro\n\nWelcome.\n");
    write(dir.path(), "chapters/03-extra/notes.stx", "= Notes\n");

    let result = compile_ok(&dir.path().join("book.stx"));
    assert_eq!(result.document.title.as_deref(), Some("Book"));
    assert_eq!(headings(&result.document.content), ["Intro", "Usage", "Notes"]);
}

#[test]
fn test_nested_include_is_relative_to_including_file() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "main.stx", "= Main\n#include: parts/part.stx\n");
    write(dir.path(), "parts/part.stx", "== Part\n#include: deeper/leaf.stx\n");
    write(dir.path(), "parts/deeper/leaf.stx", "=== Leaf\n");

    let result = compile_ok(&dir.path().join("main.stx"));
    assert_eq!(headings(&result.document.content), ["Main", "Part", "Leaf"]);
}

#[test]
fn test_embed_directive_and_function() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "doc.stx",
        "= Code\n#include: chapters/one.stx\n\n<embed: snippets/b.txt>\n",
    );
    write(dir.path(), "chapters/one.stx", "#embed: ../snippets/a.txt\n");
    write(dir.path(), "snippets/a.txt", "from directive\n");
    write(dir.path(), "snippets/b.txt", "from function\n");

    let result = compile_ok(&dir.path().join("doc.stx"));
    assert_eq!(
        code_blocks(&result.document.content),
        ["from directive\n", "from function\n"]
    );
}

#[test]
fn test_missing_embed_is_a_resource_error() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "doc.stx", "<embed: nowhere.txt>\n");
    let err = compile_file(dir.path().join("doc.stx")).unwrap_err();
    assert!(matches!(err, StxError::Resource(ResourceError::FileNotFound { .. })));
}

#[test]
fn test_circular_include_on_disk() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.stx", "= A\n#include: sub/b.stx\n");
    write(dir.path(), "sub/b.stx", "= B\n#include: ../a.stx\n");
    let err = compile_file(dir.path().join("a.stx")).unwrap_err();
    match err {
        StxError::Resource(ResourceError::CircularInclude { cycle, .. }) => {
            assert!(cycle.contains("a.stx"), "{cycle}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_same_file_may_be_included_twice_in_sequence() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "main.stx", "#include: part.stx\n#include: part.stx\n");
    write(dir.path(), "part.stx", "- item\n");
    let result = compile_ok(&dir.path().join("main.stx"));
    let ComponentKind::ListBlock { items, .. } = &result.document.content.kind else {
        panic!("expected one merged list, got {:?}", result.document.content);
    };
    assert_eq!(items.len(), 2);
}

#[test]
fn test_custom_function_replaces_builtin() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "doc.stx", "Break<br>here.\n");

    let mut registry = FunctionRegistry::with_builtins();
    registry
        .register(
            "br",
            |ctx, _call| Ok(Some(Component::text_node(" / ", ctx.location.clone()))),
            true,
        )
        .unwrap();
    let result = Compiler::new()
        .with_registry(registry)
        .compile_file(dir.path().join("doc.stx"))
        .unwrap();
    assert_eq!(result.document.content.text(), "Break / here.");
}

#[test]
fn test_function_sees_document_metadata() {
    let mut compiler = Compiler::new();
    compiler
        .registry_mut()
        .register(
            "doc-title",
            |ctx, _call| {
                let title = ctx.document.title.clone().unwrap_or_default();
                Ok(Some(Component::text_node(title, ctx.location.clone())))
            },
            false,
        )
        .unwrap();
    let result = compiler
        .compile_str("#title: Manual\n\nThis is <doc-title>.", "doc.stx")
        .unwrap();
    assert_eq!(result.document.content.text(), "This is Manual.");

    let resolved = result
        .document
        .content
        .walk()
        .filter(|c| {
            matches!(
                &c.kind,
                ComponentKind::FunctionCall(FunctionCall { result: Some(_), .. })
            )
        })
        .count();
    assert_eq!(resolved, 1);
}
