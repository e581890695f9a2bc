use crate::ast::{Argument, Component, ComponentKind, FunctionCall, TextStyle};
use crate::error::{ResourceError, SemanticError, StxError};
use crate::fs::normalize_path;
use crate::resolver::{CallContext, FunctionRegistry};
use crate::source::Location;
use crate::values::Value;
use std::collections::BTreeMap;
use std::path::Path;

type Builtin = fn(&CallContext<'_>, &FunctionCall) -> Result<Option<Component>, StxError>;

pub(crate) fn register_builtins(registry: &mut FunctionRegistry) {
    let builtins: [(&str, Builtin); 9] = [
        ("img", image),
        ("image", image),
        ("code", code),
        ("admonition", admonition),
        ("warning", warning),
        ("br", line_break),
        ("style", style),
        ("toc", table_of_contents),
        ("embed", embed),
    ];
    for (key, handler) in builtins {
        registry.insert(key, handler);
    }
}

// === Handlers ===

fn image(ctx: &CallContext<'_>, call: &FunctionCall) -> Result<Option<Component>, StxError> {
    expect_no_argument(ctx, call)?;
    let mut options = CallOptions::parse(ctx, call, Some("src"))?;
    let src = options.take_str("src")?;
    let alt = options.take_str("alt")?;
    options.finish()?;

    let Some(src) = src else {
        return Err(missing_option(ctx, call, "src"));
    };
    if alt.is_none() {
        log::warn!("{}: image `{src}` has no alt text", ctx.location);
    }
    Ok(Some(Component::new(ComponentKind::Image { src, alt }, ctx.location.clone())))
}

fn code(ctx: &CallContext<'_>, call: &FunctionCall) -> Result<Option<Component>, StxError> {
    let text = expect_text(ctx, call)?;
    let mut options = CallOptions::parse(ctx, call, Some("lang"))?;
    let lang = options.take_str("lang")?;
    options.finish()?;

    Ok(Some(Component::new(
        ComponentKind::CodeBlock {
            contents: text.to_string(),
            lang,
            caption: None,
        },
        ctx.location.clone(),
    )))
}

fn admonition(ctx: &CallContext<'_>, call: &FunctionCall) -> Result<Option<Component>, StxError> {
    let content = expect_content(ctx, call)?;
    let mut options = CallOptions::parse(ctx, call, Some("type"))?;
    let style = options.take_str("type")?;
    options.finish()?;

    Ok(Some(content_box(ctx, content, style)))
}

fn warning(ctx: &CallContext<'_>, call: &FunctionCall) -> Result<Option<Component>, StxError> {
    let content = expect_content(ctx, call)?;
    CallOptions::parse(ctx, call, None)?.finish()?;
    Ok(Some(content_box(ctx, content, Some("warning".to_string()))))
}

fn line_break(ctx: &CallContext<'_>, call: &FunctionCall) -> Result<Option<Component>, StxError> {
    expect_no_argument(ctx, call)?;
    CallOptions::parse(ctx, call, None)?.finish()?;
    Ok(Some(Component::text_node("\n", ctx.location.clone())))
}

fn style(ctx: &CallContext<'_>, call: &FunctionCall) -> Result<Option<Component>, StxError> {
    let content = expect_content(ctx, call)?;
    let mut options = CallOptions::parse(ctx, call, Some("style"))?;
    let style = options.take_str("style")?;
    options.finish()?;

    let Some(style) = style else {
        return Err(missing_option(ctx, call, "style"));
    };
    let contents = match &content.kind {
        ComponentKind::Composite { children } => children.clone(),
        _ => vec![content.clone()],
    };
    Ok(Some(Component::new(
        ComponentKind::StyledText {
            contents,
            style: TextStyle::Custom(style),
        },
        ctx.location.clone(),
    )))
}

fn table_of_contents(
    ctx: &CallContext<'_>,
    call: &FunctionCall,
) -> Result<Option<Component>, StxError> {
    expect_no_argument(ctx, call)?;
    let mut options = CallOptions::parse(ctx, call, Some("title"))?;
    let title = options.take_str("title")?;
    options.finish()?;

    Ok(Some(Component::new(
        ComponentKind::TableOfContents {
            title,
            elements: Vec::new(),
        },
        ctx.location.clone(),
    )))
}

/// Reads a file next to the document into a code block.
fn embed(ctx: &CallContext<'_>, call: &FunctionCall) -> Result<Option<Component>, StxError> {
    expect_no_argument(ctx, call)?;
    let mut options = CallOptions::parse(ctx, call, Some("src"))?;
    let src = options.take_str("src")?;
    options.finish()?;

    let Some(src) = src else {
        return Err(missing_option(ctx, call, "src"));
    };
    let base = ctx
        .document
        .source_path
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new(""));
    let path = normalize_path(&base.join(&src));
    let text = ctx
        .fs
        .read_to_string(&path)
        .map_err(|err| ResourceError::from_io(&path.to_string_lossy(), &err, ctx.location))?;

    Ok(Some(Component::new(
        ComponentKind::CodeBlock {
            contents: text,
            lang: None,
            caption: None,
        },
        ctx.location.clone(),
    )))
}

// === Helper Methods ===

fn content_box(ctx: &CallContext<'_>, content: &Component, style: Option<String>) -> Component {
    Component::new(
        ComponentKind::ContentBox {
            content: Box::new(content.clone()),
            style,
        },
        ctx.location.clone(),
    )
}

/// The options of a call as a map, consumed key by key; whatever is left
/// when [`CallOptions::finish`] runs is an unknown option.
struct CallOptions<'c> {
    key: &'c str,
    location: &'c Location,
    map: BTreeMap<String, Value>,
}

impl<'c> CallOptions<'c> {
    fn parse(
        ctx: &'c CallContext<'_>,
        call: &'c FunctionCall,
        key_for_str: Option<&str>,
    ) -> Result<Self, StxError> {
        let map = match key_for_str {
            Some(name) => call.options.to_map_with(name),
            None => call.options.to_map(),
        }
        .map_err(|err| {
            SemanticError::coercion(
                ctx.location.clone(),
                format!("invalid options for `{}`: {err}", call.key),
            )
        })?;
        Ok(CallOptions {
            key: &call.key,
            location: ctx.location,
            map,
        })
    }

    fn take_str(&mut self, name: &str) -> Result<Option<String>, StxError> {
        let Some(value) = self.map.remove(name) else {
            return Ok(None);
        };
        match value.to_str() {
            Ok(text) => Ok(Some(text.to_string())),
            Err(err) => Err(SemanticError::coercion(
                self.location.clone(),
                format!("option `{name}` of `{}`: {err}", self.key),
            )
            .into()),
        }
    }

    fn finish(self) -> Result<(), StxError> {
        if self.map.is_empty() {
            return Ok(());
        }
        let options = self
            .map
            .keys()
            .map(|name| format!("`{name}`"))
            .collect::<Vec<_>>()
            .join(", ");
        Err(SemanticError::UnknownOption {
            key: self.key.to_string(),
            options,
            src: self.location.named_source(),
            span: self.location.span(),
            location: self.location.clone(),
        }
        .into())
    }
}

fn expect_no_argument(ctx: &CallContext<'_>, call: &FunctionCall) -> Result<(), StxError> {
    match &call.argument {
        Argument::None => Ok(()),
        other => Err(invalid_shape(ctx, call, "no argument", other)),
    }
}

fn expect_text<'c>(ctx: &CallContext<'_>, call: &'c FunctionCall) -> Result<&'c str, StxError> {
    match &call.argument {
        Argument::Text(text) => Ok(text),
        other => Err(invalid_shape(ctx, call, "literal text", other)),
    }
}

fn expect_content<'c>(
    ctx: &CallContext<'_>,
    call: &'c FunctionCall,
) -> Result<&'c Component, StxError> {
    match &call.argument {
        Argument::Content(content) => Ok(content),
        other => Err(invalid_shape(ctx, call, "content", other)),
    }
}

fn invalid_shape(
    ctx: &CallContext<'_>,
    call: &FunctionCall,
    expected: &'static str,
    found: &Argument,
) -> StxError {
    SemanticError::InvalidArgumentShape {
        key: call.key.clone(),
        expected,
        found: found.kind_name(),
        src: ctx.location.named_source(),
        span: ctx.location.span(),
        location: ctx.location.clone(),
    }
    .into()
}

fn missing_option(ctx: &CallContext<'_>, call: &FunctionCall, option: &'static str) -> StxError {
    SemanticError::MissingOption {
        key: call.key.clone(),
        option,
        src: ctx.location.named_source(),
        span: ctx.location.span(),
        location: ctx.location.clone(),
    }
    .into()
}
