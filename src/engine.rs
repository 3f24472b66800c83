//! Rendering engine
//!
//! Turns a [`Displayable`] into a [`FoldableRepr`]. The dispatch policy only depends
//! on the [`RenderEngine`] trait; [`TreeRenderer`] is the built-in implementation,
//! walking `children()` and consulting the active autovisualizer at every subtree.

use crate::autovisualize::{active_autovisualizer, Visualization};
use crate::capability::{has_own_capability, Capability};
use crate::context::ContextualValue;
use crate::error::{panic_message, RenderError};
use crate::repr::{FoldableRepr, Part};
use crate::value::{Displayable, KeyPath};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

pub trait RenderEngine: Send + Sync {
    /// Build a representation of `value`.
    ///
    /// With `tolerate_subtree_errors`, a failing subtree becomes an inline error
    /// marker and its siblings still render; otherwise the first failure is returned.
    fn build_representation(
        &self,
        value: &dyn Displayable,
        tolerate_subtree_errors: bool,
    ) -> Result<FoldableRepr, RenderError>;
}

/// Renderer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Nodes shallower than this start expanded
    #[serde(default = "default_expand_depth")]
    pub expand_depth: usize,

    /// Subtrees deeper than this are elided
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_expand_depth() -> usize {
    2
}

fn default_max_depth() -> usize {
    64
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            expand_depth: default_expand_depth(),
            max_depth: default_max_depth(),
        }
    }
}

impl RendererConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_depth == 0 {
            return Err("max_depth must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct TreeRenderer {
    config: RendererConfig,
}

impl TreeRenderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    /// A renderer that expands every node, for text output.
    pub fn fully_expanded() -> Self {
        Self::new(RendererConfig {
            expand_depth: usize::MAX,
            ..RendererConfig::default()
        })
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    fn build_subtree(
        &self,
        value: &dyn Displayable,
        path: &KeyPath,
        tolerate: bool,
    ) -> Result<Part, RenderError> {
        match guarded(path, || self.build_node(value, path, tolerate)) {
            Ok(part) => Ok(part),
            Err(err) if tolerate => {
                warn!(path = %path, error = %err, "Subtree failed to render; substituting error marker");
                Ok(Part::error(path, &err))
            }
            Err(err) => Err(err),
        }
    }

    fn build_node(
        &self,
        value: &dyn Displayable,
        path: &KeyPath,
        tolerate: bool,
    ) -> Result<Part, RenderError> {
        if path.depth() > self.config.max_depth {
            return Ok(Part::text("..."));
        }

        if let Some(visualizer) = active_autovisualizer().get() {
            match visualizer.visualize(value, path) {
                Some(Visualization::Html(html)) => {
                    return Ok(Part::EmbeddedHtml {
                        html,
                        fallback: value.summary(),
                    })
                }
                Some(Visualization::Part(part)) => return Ok(part),
                Some(Visualization::Child(child)) => {
                    return active_autovisualizer()
                        .with_scoped(Some(child), || self.build_structure(value, path, tolerate));
                }
                None => {}
            }
        }

        self.build_structure(value, path, tolerate)
    }

    fn build_structure(
        &self,
        value: &dyn Displayable,
        path: &KeyPath,
        tolerate: bool,
    ) -> Result<Part, RenderError> {
        if has_own_capability(value, Capability::CustomSubtreeRepr) {
            if let Some(result) = value.subtree_repr(path) {
                return result;
            }
        }

        // Display objects nested inside a structure are embedded as-is.
        if !path.is_root() && has_own_capability(value, Capability::NativeHtml) {
            if let Some(html) = value.repr_html() {
                return Ok(Part::EmbeddedHtml {
                    html,
                    fallback: value.summary(),
                });
            }
        }

        let children = value.children();
        if children.is_empty() {
            let text = if has_own_capability(value, Capability::NativePretty) {
                value.repr_pretty().unwrap_or_else(|| value.summary())
            } else {
                value.summary()
            };
            return Ok(Part::Text(text));
        }

        let mut parts = Vec::with_capacity(children.len());
        for child in children {
            let child_path = path.child(child.key.clone());
            let rendered = self.build_subtree(child.value, &child_path, tolerate)?;
            parts.push(Part::field(child.key.label(), rendered));
        }

        Ok(Part::Foldable {
            label: value.type_name().into_owned(),
            children: parts,
            expanded: path.depth() < self.config.expand_depth,
        })
    }
}

impl RenderEngine for TreeRenderer {
    fn build_representation(
        &self,
        value: &dyn Displayable,
        tolerate_subtree_errors: bool,
    ) -> Result<FoldableRepr, RenderError> {
        let root = self.build_subtree(value, &KeyPath::root(), tolerate_subtree_errors)?;
        Ok(FoldableRepr::new(root))
    }
}

/// Run user-facing rendering code, turning a panic into a [`RenderError`].
pub(crate) fn guarded<R>(
    path: &KeyPath,
    f: impl FnOnce() -> Result<R, RenderError>,
) -> Result<R, RenderError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(RenderError::Panicked {
            path: path.to_string(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

static ACTIVE_RENDERER: Lazy<ContextualValue<Arc<dyn RenderEngine>>> = Lazy::new(|| {
    ContextualValue::new(
        module_path!(),
        "active_renderer",
        Arc::new(TreeRenderer::default()) as Arc<dyn RenderEngine>,
    )
});

/// The engine used by dispatch and the rendering helpers.
pub fn active_renderer() -> &'static ContextualValue<Arc<dyn RenderEngine>> {
    &ACTIVE_RENDERER
}
