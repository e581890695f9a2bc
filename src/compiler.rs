use crate::ast::{Argument, Component, ComponentKind, Document, FunctionCall, Output};
use crate::blocks::{Block, CaptionMark};
use crate::composer::Composer;
use crate::error::{SemanticError, StxError};
use crate::inline;
use crate::source::Location;
use crate::values::{CoercionError, Value};
use std::path::PathBuf;

/// Turns the block tree of a parsed file into a [`Document`]. Directive
/// blocks fill the document metadata; everything else goes through the
/// composer.
pub fn compile_document(
    block: Block,
    location: Location,
    source_path: Option<PathBuf>,
) -> Result<Document, StxError> {
    let empty = Component::composite(Vec::new(), location.clone());
    let mut compiler = BlockCompiler {
        composer: Composer::new(location),
        document: Document::new(empty, source_path),
    };
    compiler.compile_block(block)?;

    let BlockCompiler {
        composer,
        mut document,
    } = compiler;
    document.content = composer.finish()?;
    Ok(document)
}

struct BlockCompiler {
    composer: Composer,
    document: Document,
}

impl BlockCompiler {
    fn compile_block(&mut self, block: Block) -> Result<(), StxError> {
        match block {
            Block::Composite { children, .. } => {
                for child in children {
                    self.compile_block(child)?;
                }
                Ok(())
            }
            Block::Title {
                level,
                heading,
                body,
                location,
            } => {
                let heading = self.compile_nested(*heading, &location)?;
                let content = self.compile_nested(*body, &location)?;
                self.composer.push(Component::new(
                    ComponentKind::Section {
                        level,
                        heading: Box::new(heading),
                        content: Box::new(content),
                        number: None,
                    },
                    location,
                ))
            }
            Block::ListItem {
                content,
                ordered,
                location,
            } => {
                let item = self.compile_nested(*content, &location)?;
                self.composer.push_list_item(item, ordered, location)
            }
            Block::TableRow {
                cells,
                header,
                location,
            } => {
                let cells = cells
                    .into_iter()
                    .map(|cell| self.compile_nested(cell, &location))
                    .collect::<Result<Vec<_>, _>>()?;
                let row =
                    Component::new(ComponentKind::TableRow { cells, header }, location.clone());
                self.composer.push_table_row(row, location)
            }
            Block::TableCell { content, location } => {
                let cell = self.compile_nested(*content, &location)?;
                self.composer.push(cell)
            }
            Block::CodeBlock {
                text,
                lang,
                location,
            } => self.composer.push(Component::new(
                ComponentKind::CodeBlock {
                    contents: text,
                    lang,
                    caption: None,
                },
                location,
            )),
            Block::Literal { text, location } => self.composer.push(Component::new(
                ComponentKind::Literal { contents: text },
                location,
            )),
            Block::LineText(lines) => {
                let paragraph = inline::parse_paragraph(&lines)?;
                self.composer.push(paragraph)
            }
            Block::Attribute {
                name,
                value,
                location,
            } => self.composer.push_attribute(name, value, location),
            Block::Directive {
                name,
                value,
                location,
            } => self.apply_directive(&name, value, &location),
            Block::MarkedElement {
                content,
                mark,
                location,
            } => {
                let caption = self.compile_nested(*content, &location)?;
                match mark {
                    CaptionMark::Pre => self.composer.push_pre_caption(caption, location),
                    CaptionMark::Post => self.composer.push_post_caption(caption, location),
                }
            }
            Block::Separator(size) => {
                self.composer.separator(size);
                Ok(())
            }
            Block::ContentBox {
                content,
                function,
                location,
            } => {
                let content = Box::new(self.compile_nested(*content, &location)?);
                let kind = match function {
                    None => ComponentKind::ContentBox {
                        content,
                        style: None,
                    },
                    Some((key, options)) => block_call(key, options, Argument::Content(content)),
                };
                self.composer.push(Component::new(kind, location))
            }
            Block::FunctionBlock {
                key,
                options,
                text,
                location,
            } => self.composer.push(Component::new(
                block_call(key, options, Argument::Text(text)),
                location,
            )),
        }
    }

    /// Compiles `block` in a frame of its own.
    fn compile_nested(&mut self, block: Block, parent: &Location) -> Result<Component, StxError> {
        let location = block.location().unwrap_or(parent).clone();
        self.composer.open_frame(location);
        let compiled = self.compile_block(block);
        let component = self.composer.close_frame();
        compiled?;
        component
    }

    fn apply_directive(
        &mut self,
        name: &str,
        value: Value,
        location: &Location,
    ) -> Result<(), StxError> {
        let coercion = |err: CoercionError| {
            SemanticError::coercion(location.clone(), format!("directive `{name}`: {err}"))
        };
        let document = &mut self.document;

        match name {
            "title" => document.title = Some(value.to_str().map_err(coercion)?.to_string()),
            "author" => document.author = Some(value.to_str().map_err(coercion)?.to_string()),
            "format" => document.format = Some(value.to_str().map_err(coercion)?.to_string()),
            "encoding" => document.encoding = Some(value.to_str().map_err(coercion)?.to_string()),
            "stylesheets" => document
                .stylesheets
                .extend(value.to_str_list().map_err(coercion)?),
            "output" => {
                for item in value.to_list() {
                    let output = parse_output(item).map_err(coercion)?;
                    document.outputs.push(output);
                }
            }
            _ => {
                return Err(SemanticError::UnknownDirective {
                    name: name.to_string(),
                    src: location.named_source(),
                    span: location.span(),
                    location: location.clone(),
                }
                .into())
            }
        }
        log::debug!("{location}: applied directive `{name}`");
        Ok(())
    }
}

fn block_call(key: String, options: Value, argument: Argument) -> ComponentKind {
    ComponentKind::FunctionCall(FunctionCall {
        key,
        options,
        argument,
        result: None,
        inline: false,
    })
}

/// `html`, `html(file: out.html, theme: dark)` or `html: out.html`.
fn parse_output(value: &Value) -> Result<Output, CoercionError> {
    match value {
        Value::Entry(format, options) => {
            let mut options = options.to_map_with("file")?;
            let file = options
                .remove("file")
                .map(|file| file.to_str().map(str::to_string))
                .transpose()?;
            Ok(Output {
                format: format.clone(),
                file,
                options,
            })
        }
        other => Ok(Output {
            format: other.to_str()?.to_string(),
            file: None,
            options: Default::default(),
        }),
    }
}
