pub mod api;
pub mod ast;
pub mod blocks;
pub mod compiler;
pub mod composer;
pub mod error;
pub mod fs;
pub mod functions;
pub mod inline;
pub mod linking;
pub mod marks;
pub mod numbering;
pub mod parser;
pub mod reader;
pub mod resolver;
pub mod source;
pub mod toc;
pub mod values;

pub use api::{compile, compile_file, CompileResult, Compiler, Options};
pub use ast::{Component, ComponentId, ComponentKind, Document};
pub use error::StxError;
pub use resolver::FunctionRegistry;
