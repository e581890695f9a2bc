use crate::ast::{Component, ComponentKind, Document, FunctionCall};
use crate::error::{SemanticError, StxError};
use crate::fs::FileSystem;
use crate::functions;
use crate::source::Location;
use std::collections::BTreeMap;
use std::fmt;

/// What a function handler can see besides the call itself.
pub struct CallContext<'a> {
    /// The document being resolved. Its content is detached while the pass
    /// runs, so only the metadata is meaningful.
    pub document: &'a Document,
    pub fs: &'a dyn FileSystem,
    pub location: &'a Location,
}

pub type Handler = Box<
    dyn Fn(&CallContext<'_>, &FunctionCall) -> Result<Option<Component>, StxError> + Send + Sync,
>;

/// Function handlers by call key.
#[derive(Default)]
pub struct FunctionRegistry {
    handlers: BTreeMap<String, Handler>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in functions (`img`, `code`, `toc`, ...).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        functions::register_builtins(&mut registry);
        registry
    }

    /// Registers `handler` under `key`. Replacing an existing handler needs
    /// `allow_override`.
    pub fn register<F>(
        &mut self,
        key: impl Into<String>,
        handler: F,
        allow_override: bool,
    ) -> Result<(), StxError>
    where
        F: Fn(&CallContext<'_>, &FunctionCall) -> Result<Option<Component>, StxError>
            + Send
            + Sync
            + 'static,
    {
        let key = key.into();
        if !allow_override && self.handlers.contains_key(&key) {
            return Err(SemanticError::FunctionAlreadyRegistered { key }.into());
        }
        self.insert(key, handler);
        Ok(())
    }

    /// Sets the handler for `key`, replacing any previous one.
    pub(crate) fn insert<F>(&mut self, key: impl Into<String>, handler: F)
    where
        F: Fn(&CallContext<'_>, &FunctionCall) -> Result<Option<Component>, StxError>
            + Send
            + Sync
            + 'static,
    {
        self.handlers.insert(key.into(), Box::new(handler));
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Handler> {
        self.handlers.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.handlers.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

/// Runs every unresolved function call of a document through its handler.
pub struct Resolver<'a> {
    registry: &'a FunctionRegistry,
    fs: &'a dyn FileSystem,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a FunctionRegistry, fs: &'a dyn FileSystem) -> Self {
        Resolver { registry, fs }
    }

    /// Post-order over the content tree: children resolve before their
    /// parent, calls that already have a result are left alone, and a
    /// handler's result is itself resolved.
    pub fn resolve(&self, document: &mut Document) -> Result<(), StxError> {
        let placeholder = Component::composite(Vec::new(), document.content.location.clone());
        let mut content = std::mem::replace(&mut document.content, placeholder);
        let result = self.resolve_component(&mut content, document);
        document.content = content;
        result
    }

    fn resolve_component(
        &self,
        component: &mut Component,
        document: &Document,
    ) -> Result<(), StxError> {
        for child in component.children_mut() {
            self.resolve_component(child, document)?;
        }

        let location = component.location.clone();
        let ComponentKind::FunctionCall(call) = &mut component.kind else {
            return Ok(());
        };
        if call.result.is_some() {
            return Ok(());
        }

        let mut result = self.invoke(call, document, &location)?;
        self.resolve_component(&mut result, document)?;
        call.result = Some(Box::new(result));
        Ok(())
    }

    fn invoke(
        &self,
        call: &FunctionCall,
        document: &Document,
        location: &Location,
    ) -> Result<Component, StxError> {
        let Some(handler) = self.registry.get(&call.key) else {
            return Err(SemanticError::UnknownFunction {
                key: call.key.clone(),
                src: location.named_source(),
                span: location.span(),
                location: location.clone(),
            }
            .into());
        };

        log::debug!("{location}: resolving `{}`", call.key);
        let context = CallContext {
            document,
            fs: self.fs,
            location,
        };
        handler(&context, call)?.ok_or_else(|| {
            SemanticError::FunctionProducedNothing {
                key: call.key.clone(),
                src: location.named_source(),
                span: location.span(),
                location: location.clone(),
            }
            .into()
        })
    }
}
