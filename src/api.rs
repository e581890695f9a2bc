use crate::ast::Document;
use crate::compiler::compile_document;
use crate::error::StxError;
use crate::fs::{FileSystem, OsFileSystem};
use crate::linking::{self, LinkWarning, RefMap, REF_LENGTH_HINT};
use crate::numbering::{self, MAX_NUMBER_DEPTH};
use crate::parser::Parser;
use crate::reader::Reader;
use crate::resolver::{FunctionRegistry, Resolver};
use crate::source::{Location, Source, SourceFile};
use crate::toc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Knobs of the post-processing passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Soft cap on the length of generated references.
    pub ref_length_hint: usize,
    /// Sections nested deeper than this get no number.
    pub max_number_depth: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            ref_length_hint: REF_LENGTH_HINT,
            max_number_depth: MAX_NUMBER_DEPTH,
        }
    }
}

/// The result of a successful compilation: the linked document, its
/// reference map, and the links that point nowhere.
#[derive(Debug, Clone, Serialize)]
pub struct CompileResult {
    pub document: Document,
    pub refs: RefMap,
    pub warnings: Vec<LinkWarning>,
}

impl CompileResult {
    /// Serializes the compiled document into a pretty-printed JSON string.
    ///
    /// # Errors
    /// Returns a `serde_json::Error` if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self)
    }

    /// Serializes the compiled document into a YAML string.
    ///
    /// # Errors
    /// Returns a `serde_yaml::Error` if serialization fails.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self)
    }

    /// Whether any internal link was left unresolved.
    #[must_use]
    pub fn has_invalid_links(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Runs the whole pipeline: parse, compile, resolve functions, link,
/// number and build the tables of contents.
pub struct Compiler {
    fs: Box<dyn FileSystem>,
    registry: FunctionRegistry,
    options: Options,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// A compiler reading from the real file system, with the built-in
    /// functions and default options.
    #[must_use]
    pub fn new() -> Self {
        Compiler {
            fs: Box::new(OsFileSystem),
            registry: FunctionRegistry::with_builtins(),
            options: Options::default(),
        }
    }

    #[must_use]
    pub fn with_file_system(mut self, fs: impl FileSystem + 'static) -> Self {
        self.fs = Box::new(fs);
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_registry(mut self, registry: FunctionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// The registry, for adding functions to the built-in ones.
    pub fn registry_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.registry
    }

    /// Compiles `source` as if read from a file named `name`. Includes and
    /// embeds are resolved relative to that name.
    ///
    /// # Errors
    ///
    /// Returns a `StxError` if parsing, composition, resolution or linking
    /// fails.
    pub fn compile_str(&self, source: &str, name: &str) -> Result<CompileResult, StxError> {
        let path = PathBuf::from(name);
        let file = Arc::new(SourceFile::from_path(path.clone(), source));
        let reader = Reader::new(self.fs.as_ref(), Source::from_file(Arc::clone(&file)));
        self.run(Parser::new(reader), file, Some(path))
    }

    /// Reads and compiles the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns a `StxError` if the file cannot be read or if any stage of the
    /// compilation fails.
    pub fn compile_file(&self, path: impl AsRef<Path>) -> Result<CompileResult, StxError> {
        let reader = Reader::open(self.fs.as_ref(), path.as_ref())?;
        let file = Arc::clone(reader.current().file());
        let source_path = file.path().map(Path::to_path_buf);
        self.run(Parser::new(reader), file, source_path)
    }

    fn run(
        &self,
        mut parser: Parser<'_>,
        file: Arc<SourceFile>,
        source_path: Option<PathBuf>,
    ) -> Result<CompileResult, StxError> {
        // 1. Parse and compose
        let block = parser.parse_document()?;
        let mut document = compile_document(block, Location::start_of(file), source_path)?;
        log::debug!("parsed {} component(s)", document.content.walk().count());

        // 2. Run the functions
        Resolver::new(&self.registry, self.fs.as_ref()).resolve(&mut document)?;

        // 3. References, numbers, outline
        let (refs, warnings) = linking::link(&mut document, self.options.ref_length_hint)?;
        numbering::number(&mut document, self.options.max_number_depth);
        toc::build_tables_of_contents(&mut document);

        Ok(CompileResult {
            document,
            refs,
            warnings,
        })
    }
}

/// Compiles an STX document held in memory.
///
/// This is the primary entry point for callers that just need the compiled
/// tree. It reads includes from the real file system and uses the built-in
/// functions and default options.
///
/// # Arguments
///
/// * `source` - The STX source text.
/// * `file_name` - The name of the document (used for error reporting and
///   relative includes).
///
/// # Errors
///
/// Returns a `StxError` if any stage of the compilation fails.
pub fn compile(source: &str, file_name: &str) -> Result<CompileResult, StxError> {
    Compiler::new().compile_str(source, file_name)
}

/// Compiles the STX document stored at `path`.
///
/// # Errors
///
/// Returns a `StxError` if the file cannot be read or the compilation fails.
pub fn compile_file(path: impl AsRef<Path>) -> Result<CompileResult, StxError> {
    Compiler::new().compile_file(path)
}
