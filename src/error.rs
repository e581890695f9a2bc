use crate::source::Location;
use miette::{Diagnostic, NamedSource, SourceSpan};
use std::io;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum StxError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Semantic(#[from] SemanticError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Resource(#[from] ResourceError),
}

impl StxError {
    /// Where the error was raised, when it is tied to a source position.
    #[must_use]
    pub fn location(&self) -> Option<&Location> {
        match self {
            StxError::Syntax(err) => Some(err.location()),
            StxError::Semantic(err) => err.location(),
            StxError::Resource(err) => err.location(),
        }
    }
}

/// Malformed input: the text does not follow the STX grammar.
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum SyntaxError {
    #[error("{location}: unexpected end of input")]
    #[diagnostic(
        code(syntax::unexpected_eof),
        help("The input ended while the parser still needed more characters.")
    )]
    UnexpectedEndOfInput {
        location: Location,
        #[source_code]
        src: NamedSource<String>,
        #[label("input ends here")]
        span: SourceSpan,
    },

    #[error("{location}: expected {expected}, found {found:?}")]
    #[diagnostic(code(syntax::unexpected_content))]
    UnexpectedContent {
        expected: String,
        found: String,
        location: Location,
        #[source_code]
        src: NamedSource<String>,
        #[label("expected {expected}")]
        span: SourceSpan,
    },

    #[error("{location}: `{opener}` is never closed, expected `{closer}`")]
    #[diagnostic(
        code(syntax::unclosed_delimiter),
        help("Close the delimiter or escape it with a backslash.")
    )]
    UnclosedDelimiter {
        opener: String,
        closer: String,
        location: Location,
        #[source_code]
        src: NamedSource<String>,
        #[label("opened here")]
        span: SourceSpan,
    },

    #[error("{location}: found `{found}` but `{opener}` opened at {opened_at} expects `{expected}`")]
    #[diagnostic(
        code(syntax::mismatched_delimiter),
        help("Inline delimiters must be closed in the reverse order they were opened.")
    )]
    MismatchedDelimiter {
        opener: String,
        opened_at: Location,
        expected: String,
        found: String,
        location: Location,
        #[source_code]
        src: NamedSource<String>,
        #[label("unexpected `{found}`")]
        span: SourceSpan,
        #[label("`{opener}` opened here")]
        opener_span: SourceSpan,
    },

    #[error("{location}: invalid escape sequence `\\{character}`")]
    #[diagnostic(
        code(syntax::invalid_escape),
        help("Only reserved mark characters and the active stop character can be escaped.")
    )]
    InvalidEscape {
        character: char,
        location: Location,
        #[source_code]
        src: NamedSource<String>,
        #[label("this escape")]
        span: SourceSpan,
    },

    #[error("{location}: block opened with `{fence}` is never closed")]
    #[diagnostic(code(syntax::unterminated_block))]
    UnterminatedBlock {
        fence: String,
        location: Location,
        #[source_code]
        src: NamedSource<String>,
        #[label("block starts here")]
        span: SourceSpan,
    },

    #[error("{location}: invalid value: {message}")]
    #[diagnostic(code(syntax::invalid_value))]
    InvalidValue {
        message: String,
        location: Location,
        #[source_code]
        src: NamedSource<String>,
        #[label("{message}")]
        span: SourceSpan,
    },
}

impl SyntaxError {
    pub(crate) fn unexpected_end(location: Location) -> Self {
        SyntaxError::UnexpectedEndOfInput {
            src: location.named_source(),
            span: location.span(),
            location,
        }
    }

    pub(crate) fn unexpected(
        location: Location,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        SyntaxError::UnexpectedContent {
            expected: expected.into(),
            found: found.into(),
            src: location.named_source(),
            span: location.span(),
            location,
        }
    }

    pub(crate) fn invalid_value(location: Location, message: impl Into<String>) -> Self {
        SyntaxError::InvalidValue {
            message: message.into(),
            src: location.named_source(),
            span: location.span(),
            location,
        }
    }

    #[must_use]
    pub fn location(&self) -> &Location {
        match self {
            SyntaxError::UnexpectedEndOfInput { location, .. }
            | SyntaxError::UnexpectedContent { location, .. }
            | SyntaxError::UnclosedDelimiter { location, .. }
            | SyntaxError::MismatchedDelimiter { location, .. }
            | SyntaxError::InvalidEscape { location, .. }
            | SyntaxError::UnterminatedBlock { location, .. }
            | SyntaxError::InvalidValue { location, .. } => location,
        }
    }
}

/// Well-formed input that does not make sense as a document.
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum SemanticError {
    #[error("{location}: attribute `{name}` is already defined")]
    #[diagnostic(code(semantic::duplicate_attribute))]
    DuplicateAttribute {
        name: String,
        location: Location,
        #[source_code]
        src: NamedSource<String>,
        #[label("second definition")]
        span: SourceSpan,
    },

    #[error("{location}: attribute `{name}` is not supported by {component}")]
    #[diagnostic(
        code(semantic::unknown_attribute),
        help("Supported attributes are `ref`, `lang` (code blocks) and `style` (boxes and styled text).")
    )]
    UnknownAttribute {
        name: String,
        component: &'static str,
        location: Location,
        #[source_code]
        src: NamedSource<String>,
        #[label("attribute defined here")]
        span: SourceSpan,
    },

    #[error("{location}: floating caption, the target already has a caption")]
    #[diagnostic(
        code(semantic::floating_caption),
        help("A table, code block or figure can carry only one caption.")
    )]
    FloatingCaption {
        location: Location,
        #[source_code]
        src: NamedSource<String>,
        #[label("extra caption")]
        span: SourceSpan,
    },

    #[error("{location}: caption has no component to attach to")]
    #[diagnostic(code(semantic::caption_without_target))]
    CaptionWithoutTarget {
        location: Location,
        #[source_code]
        src: NamedSource<String>,
        #[label("this caption")]
        span: SourceSpan,
    },

    #[error("{location}: reference `{reference}` is already defined at {first}")]
    #[diagnostic(code(semantic::duplicate_reference))]
    DuplicateReference {
        reference: String,
        first: Location,
        location: Location,
        #[source_code]
        src: NamedSource<String>,
        #[label("duplicated here")]
        span: SourceSpan,
    },

    #[error("{location}: unsupported directive `{name}`")]
    #[diagnostic(
        code(semantic::unknown_directive),
        help("Known directives: title, author, format, encoding, stylesheets, include, embed, output.")
    )]
    UnknownDirective {
        name: String,
        location: Location,
        #[source_code]
        src: NamedSource<String>,
        #[label("unknown directive")]
        span: SourceSpan,
    },

    #[error("{location}: function `{key}` is not registered")]
    #[diagnostic(code(semantic::unknown_function))]
    UnknownFunction {
        key: String,
        location: Location,
        #[source_code]
        src: NamedSource<String>,
        #[label("called here")]
        span: SourceSpan,
    },

    #[error("{location}: function `{key}` produced no component")]
    #[diagnostic(code(semantic::function_produced_nothing))]
    FunctionProducedNothing {
        key: String,
        location: Location,
        #[source_code]
        src: NamedSource<String>,
        #[label("called here")]
        span: SourceSpan,
    },

    #[error("{location}: function `{key}` expects {expected}, found {found}")]
    #[diagnostic(code(semantic::invalid_argument_shape))]
    InvalidArgumentShape {
        key: String,
        expected: &'static str,
        found: &'static str,
        location: Location,
        #[source_code]
        src: NamedSource<String>,
        #[label("called here")]
        span: SourceSpan,
    },

    #[error("{location}: unknown option(s) {options} for function `{key}`")]
    #[diagnostic(code(semantic::unknown_option))]
    UnknownOption {
        key: String,
        options: String,
        location: Location,
        #[source_code]
        src: NamedSource<String>,
        #[label("called here")]
        span: SourceSpan,
    },

    #[error("{location}: function `{key}` requires the `{option}` option")]
    #[diagnostic(code(semantic::missing_option))]
    MissingOption {
        key: String,
        option: &'static str,
        location: Location,
        #[source_code]
        src: NamedSource<String>,
        #[label("called here")]
        span: SourceSpan,
    },

    #[error("{location}: {message}")]
    #[diagnostic(code(semantic::invalid_coercion))]
    InvalidCoercion {
        message: String,
        location: Location,
        #[source_code]
        src: NamedSource<String>,
        #[label("{message}")]
        span: SourceSpan,
    },

    #[error("{location}: attribute(s) {names} have no component to apply to")]
    #[diagnostic(code(semantic::unconsumed_attributes))]
    UnconsumedAttributes {
        names: String,
        location: Location,
        #[source_code]
        src: NamedSource<String>,
        #[label("defined here")]
        span: SourceSpan,
    },

    #[error("function `{key}` is already registered")]
    #[diagnostic(
        code(semantic::function_already_registered),
        help("Pass `allow_override = true` to replace an existing handler.")
    )]
    FunctionAlreadyRegistered { key: String },
}

impl SemanticError {
    pub(crate) fn floating_caption(location: Location) -> Self {
        SemanticError::FloatingCaption {
            src: location.named_source(),
            span: location.span(),
            location,
        }
    }

    pub(crate) fn coercion(location: Location, message: impl Into<String>) -> Self {
        SemanticError::InvalidCoercion {
            message: message.into(),
            src: location.named_source(),
            span: location.span(),
            location,
        }
    }

    #[must_use]
    pub fn location(&self) -> Option<&Location> {
        match self {
            SemanticError::DuplicateAttribute { location, .. }
            | SemanticError::UnknownAttribute { location, .. }
            | SemanticError::FloatingCaption { location, .. }
            | SemanticError::CaptionWithoutTarget { location, .. }
            | SemanticError::DuplicateReference { location, .. }
            | SemanticError::UnknownDirective { location, .. }
            | SemanticError::UnknownFunction { location, .. }
            | SemanticError::FunctionProducedNothing { location, .. }
            | SemanticError::InvalidArgumentShape { location, .. }
            | SemanticError::UnknownOption { location, .. }
            | SemanticError::MissingOption { location, .. }
            | SemanticError::InvalidCoercion { location, .. }
            | SemanticError::UnconsumedAttributes { location, .. } => Some(location),
            SemanticError::FunctionAlreadyRegistered { .. } => None,
        }
    }
}

/// Files that cannot be loaded.
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum ResourceError {
    #[error("{location}: file not found: {path}")]
    #[diagnostic(code(resource::file_not_found))]
    FileNotFound {
        path: String,
        location: Location,
        #[source_code]
        src: NamedSource<String>,
        #[label("requested here")]
        span: SourceSpan,
    },

    #[error("{location}: circular include detected: {cycle}")]
    #[diagnostic(
        code(resource::circular_include),
        help("A file cannot include itself, directly or through other files.")
    )]
    CircularInclude {
        cycle: String,
        location: Location,
        #[source_code]
        src: NamedSource<String>,
        #[label("included here")]
        span: SourceSpan,
    },

    #[error("cannot read {path}: {message}")]
    #[diagnostic(code(resource::unreadable))]
    Unreadable { path: String, message: String },
}

impl ResourceError {
    pub(crate) fn from_io(path: &str, err: &io::Error, location: &Location) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            ResourceError::FileNotFound {
                path: path.to_string(),
                src: location.named_source(),
                span: location.span(),
                location: location.clone(),
            }
        } else {
            ResourceError::Unreadable {
                path: path.to_string(),
                message: err.to_string(),
            }
        }
    }

    #[must_use]
    pub fn location(&self) -> Option<&Location> {
        match self {
            ResourceError::FileNotFound { location, .. }
            | ResourceError::CircularInclude { location, .. } => Some(location),
            ResourceError::Unreadable { .. } => None,
        }
    }
}
