//! Formatter registry
//!
//! Formatters are grouped in chains keyed by MIME type. Within a chain the first
//! formatter that produces output wins; across chains the MIME order decides which
//! representation is computed first.

use crate::capability::{has_own_capability, Capability};
use crate::error::ApiError;
use crate::value::Displayable;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub const MIME_HTML: &str = "text/html";
pub const MIME_PLAIN: &str = "text/plain";

/// What a formatter produced for a value.
pub enum FormatterOutput {
    /// Final content. Empty content means "handled, show nothing".
    Content(String),
    /// Display this value in place of the original.
    Redisplay(Arc<dyn Displayable>),
}

impl fmt::Debug for FormatterOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatterOutput::Content(content) => f.debug_tuple("Content").field(content).finish(),
            FormatterOutput::Redisplay(value) => {
                f.debug_tuple("Redisplay").field(&value.type_name()).finish()
            }
        }
    }
}

pub trait Formatter: Send + Sync {
    /// Registration name. Registering a formatter with the same name replaces it.
    fn name(&self) -> &str;

    /// `Ok(None)` passes the value to the next formatter in the chain.
    fn format(&self, value: &dyn Displayable) -> Result<Option<FormatterOutput>, ApiError>;
}

#[derive(Default)]
struct RegistryInner {
    order: Vec<String>,
    chains: HashMap<String, Vec<Arc<dyn Formatter>>>,
}

#[derive(Default)]
pub struct FormatterRegistry {
    inner: RwLock<RegistryInner>,
}

impl FormatterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The chains a notebook starts with: plain text first, then native HTML.
    pub fn with_host_defaults() -> Self {
        let registry = Self::new();
        registry.register(MIME_PLAIN, Arc::new(PlainTextFormatter));
        registry.register(MIME_HTML, Arc::new(NativeHtmlFormatter));
        registry
    }

    /// Put `formatter` at the front of the `mime` chain.
    ///
    /// A formatter already registered under the same name is replaced. Unknown MIME
    /// types are appended to the MIME order.
    pub fn register(&self, mime: &str, formatter: Arc<dyn Formatter>) {
        let mut inner = self.inner.write();
        if !inner.order.iter().any(|m| m == mime) {
            inner.order.push(mime.to_string());
        }
        let chain = inner.chains.entry(mime.to_string()).or_default();
        chain.retain(|existing| existing.name() != formatter.name());
        debug!(mime, formatter = formatter.name(), "Registered formatter");
        chain.insert(0, formatter);
    }

    pub fn unregister(&self, mime: &str, name: &str) -> bool {
        let mut inner = self.inner.write();
        let Some(chain) = inner.chains.get_mut(mime) else {
            return false;
        };
        let before = chain.len();
        chain.retain(|existing| existing.name() != name);
        chain.len() != before
    }

    /// Make `mime` the first representation computed.
    pub fn move_to_front(&self, mime: &str) {
        let mut inner = self.inner.write();
        inner.order.retain(|m| m != mime);
        inner.order.insert(0, mime.to_string());
    }

    pub fn mime_order(&self) -> Vec<String> {
        self.inner.read().order.clone()
    }

    pub fn chain(&self, mime: &str) -> Vec<Arc<dyn Formatter>> {
        self.inner
            .read()
            .chains
            .get(mime)
            .cloned()
            .unwrap_or_default()
    }

    pub fn formatter_names(&self, mime: &str) -> Vec<String> {
        self.chain(mime)
            .iter()
            .map(|f| f.name().to_string())
            .collect()
    }

    /// Run the `mime` chain for `value`.
    ///
    /// The chain is cloned first, so formatters may re-enter the registry.
    pub fn format(
        &self,
        mime: &str,
        value: &dyn Displayable,
    ) -> Result<Option<FormatterOutput>, ApiError> {
        for formatter in self.chain(mime) {
            if let Some(output) = formatter.format(value)? {
                return Ok(Some(output));
            }
        }
        Ok(None)
    }
}

impl fmt::Debug for FormatterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        let mut map = f.debug_map();
        for mime in &inner.order {
            let names: Vec<&str> = inner
                .chains
                .get(mime)
                .map(|chain| chain.iter().map(|f| f.name()).collect())
                .unwrap_or_default();
            map.entry(mime, &names);
        }
        map.finish()
    }
}

/// Uses a value's own HTML representation.
pub struct NativeHtmlFormatter;

impl Formatter for NativeHtmlFormatter {
    fn name(&self) -> &str {
        "host.native_html"
    }

    fn format(&self, value: &dyn Displayable) -> Result<Option<FormatterOutput>, ApiError> {
        if !has_own_capability(value, Capability::NativeHtml) {
            return Ok(None);
        }
        Ok(value.repr_html().map(FormatterOutput::Content))
    }
}

/// Pretty representation if the value has one, otherwise its summary.
pub struct PlainTextFormatter;

impl Formatter for PlainTextFormatter {
    fn name(&self) -> &str {
        "host.plain_text"
    }

    fn format(&self, value: &dyn Displayable) -> Result<Option<FormatterOutput>, ApiError> {
        let text = if has_own_capability(value, Capability::NativePretty) {
            value.repr_pretty().unwrap_or_else(|| value.summary())
        } else {
            value.summary()
        };
        Ok(Some(FormatterOutput::Content(text)))
    }
}
