//! Automatic visualization
//!
//! An autovisualizer is consulted by the renderer for every subtree and may replace
//! the default structural rendering with a custom visualization.

use crate::capability::{has_own_capability, Capability};
use crate::context::ContextualValue;
use crate::repr::Part;
use crate::streaming::deferred::maybe_defer;
use crate::value::{ArrayView, Displayable, KeyPath};
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

const PREVIEW_LEN: usize = 8;

/// What an autovisualizer produces for a subtree.
#[derive(Debug, Clone)]
pub enum Visualization {
    /// Raw HTML shown in place of the subtree.
    Html(String),
    /// A ready-made part shown in place of the subtree.
    Part(Part),
    /// Render the subtree normally, with this autovisualizer active beneath it.
    Child(Autovisualizer),
}

type VisualizeFn = dyn Fn(&dyn Displayable, &KeyPath) -> Option<Visualization> + Send + Sync;

/// A named visualization callback.
#[derive(Clone)]
pub struct Autovisualizer {
    name: Arc<str>,
    func: Arc<VisualizeFn>,
}

impl Autovisualizer {
    pub fn new(
        name: &str,
        func: impl Fn(&dyn Displayable, &KeyPath) -> Option<Visualization> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: Arc::from(name),
            func: Arc::new(func),
        }
    }

    /// An autovisualizer that never visualizes anything.
    pub fn disabled() -> Self {
        Self::new("disabled", |_, _| None)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn visualize(&self, value: &dyn Displayable, path: &KeyPath) -> Option<Visualization> {
        (self.func)(value, path)
    }
}

impl fmt::Debug for Autovisualizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Autovisualizer")
            .field("name", &self.name)
            .finish()
    }
}

static ACTIVE_AUTOVISUALIZER: Lazy<ContextualValue<Option<Autovisualizer>>> =
    Lazy::new(|| ContextualValue::new(module_path!(), "active_autovisualizer", None));

/// The autovisualizer consulted by the renderer. `None` disables visualization.
pub fn active_autovisualizer() -> &'static ContextualValue<Option<Autovisualizer>> {
    &ACTIVE_AUTOVISUALIZER
}

/// Visualizes values that expose array data with a summary leaf.
///
/// The summary is computed as a deferred leaf when a collector is active, so a
/// streaming display shows the structure first and fills in the statistics later.
pub fn array_autovisualizer() -> Autovisualizer {
    Autovisualizer::new("arrays", |value, path| {
        if !has_own_capability(value, Capability::ArrayData) {
            return None;
        }
        let array = value.as_array()?;
        match maybe_defer(move || Ok(array_summary(&array))) {
            Ok(part) => Some(Visualization::Part(part)),
            Err(err) => {
                warn!(path = %path, error = %err, "Array visualization failed");
                Some(Visualization::Part(Part::error(path, &err)))
            }
        }
    })
}

/// One-line summary of an array: signature, statistics and a value preview.
pub fn array_summary(array: &ArrayView) -> Part {
    let signature = Part::styled(Part::text(array.signature()), "font-weight: bold");
    let mut parts = vec![signature];

    if let Some(stats) = array.stats() {
        let mut line = format!(
            " min={} max={} mean={}",
            format_number(stats.min),
            format_number(stats.max),
            format_number(stats.mean)
        );
        if stats.nan_count > 0 {
            line.push_str(&format!(" nan={}", stats.nan_count));
        }
        parts.push(Part::text(line));
    }

    if !array.is_empty() {
        let mut preview: Vec<String> = array
            .values
            .iter()
            .take(PREVIEW_LEN)
            .map(|v| format_number(*v))
            .collect();
        if array.len() > PREVIEW_LEN {
            preview.push("...".to_string());
        }
        parts.push(Part::text(format!(" [{}]", preview.join(", "))));
    }

    Part::Siblings(parts)
}

fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{:.4}", value)
    }
}
