//! Notebook host interface
//!
//! Everything the display system needs from the surrounding notebook: a formatter
//! registry, output emission, in-place updates of emitted fragments, relocation,
//! expression evaluation and cell execution. [`memory::RecordingHost`] is an
//! in-process implementation used by the CLI and the tests.

pub mod memory;
pub mod registry;

use crate::autovisualize::Autovisualizer;
use crate::context::{ContextManager, ContextualValue};
use crate::error::ApiError;
use crate::magic::CellMagic;
use crate::repr::{FragmentId, LeafId};
use crate::value::Displayable;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;
use tracing::info;

pub use memory::{DisplayRecord, HostEvent, OutputRecord, RecordingHost};
pub use registry::{Formatter, FormatterOutput, FormatterRegistry, MIME_HTML, MIME_PLAIN};

/// Content handed to [`Host::emit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputContent {
    /// A root rendering that later leaf updates and relocations refer to.
    Fragment { id: FragmentId, html: String },
    Html(String),
    Text(String),
}

/// Resolved content for one deferred leaf of an emitted fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafUpdate {
    pub leaf: LeafId,
    pub html: String,
    /// The producer failed and `html` is an error marker.
    pub failed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The fragment is no longer part of the document.
    Discarded,
}

/// Result of evaluating an expression in the host's variable scope.
#[derive(Clone)]
pub enum HostValue {
    None,
    Autovisualizer(Autovisualizer),
    ContextManager(Arc<dyn ContextManager>),
    Value(Arc<dyn Displayable>),
}

impl HostValue {
    pub fn kind(&self) -> &'static str {
        match self {
            HostValue::None => "None",
            HostValue::Autovisualizer(_) => "autovisualizer",
            HostValue::ContextManager(_) => "context manager",
            HostValue::Value(_) => "value",
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::None => f.write_str("None"),
            HostValue::Autovisualizer(v) => f.debug_tuple("Autovisualizer").field(v).finish(),
            HostValue::ContextManager(cm) => {
                f.debug_tuple("ContextManager").field(&cm.describe()).finish()
            }
            HostValue::Value(v) => f.debug_tuple("Value").field(&v.type_name()).finish(),
        }
    }
}

pub trait Host: Send + Sync {
    fn name(&self) -> &str;

    fn formatters(&self) -> &FormatterRegistry;

    /// Display a value in the current output slot through the formatter chains.
    fn display(&self, value: &dyn Displayable) -> Result<(), ApiError>;

    /// Emit content directly, bypassing the formatters.
    fn emit(&self, content: OutputContent) -> Result<(), ApiError>;

    /// Deliver a leaf update to an emitted fragment.
    fn push_update(&self, fragment: &FragmentId, update: LeafUpdate) -> DeliveryOutcome;

    /// Move an emitted fragment into the output slot currently being displayed.
    fn relocate(&self, fragment: &FragmentId) -> Result<(), ApiError>;

    /// Evaluate an expression in the current variable scope.
    fn evaluate(&self, expression: &str) -> Result<HostValue, ApiError>;

    /// Execute a block of user code.
    fn run_cell(&self, body: &str) -> Result<(), ApiError>;

    fn register_magic(&self, magic: Arc<dyn CellMagic>) -> Result<(), ApiError>;
}

static ACTIVE_HOST: Lazy<ContextualValue<Option<Arc<dyn Host>>>> =
    Lazy::new(|| ContextualValue::new(module_path!(), "active_host", None));

/// The host the display system talks to. `None` outside a notebook.
pub fn active_host() -> &'static ContextualValue<Option<Arc<dyn Host>>> {
    &ACTIVE_HOST
}

/// Install `host` process-wide.
pub fn install(host: Arc<dyn Host>) {
    info!(host = host.name(), "Installed notebook host");
    active_host().set_globally(Some(host));
}

pub fn uninstall() {
    active_host().set_globally(None);
}

/// The active host, or [`ApiError::HostUnavailable`] naming `operation`.
pub fn current(operation: &'static str) -> Result<Arc<dyn Host>, ApiError> {
    active_host()
        .get()
        .ok_or(ApiError::HostUnavailable(operation))
}
