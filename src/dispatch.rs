//! Formatter Dispatch Policy
//!
//! Consulted once per displayed value. Decides whether the value's own HTML is
//! used, custom rendering is suppressed, or the value is rendered by the active
//! engine, and carries out the rendering.

use crate::capability::{has_own_capability, is_display_object, Capability};
use crate::engine::{active_renderer, RenderEngine, TreeRenderer};
use crate::error::{ApiError, RenderError};
use crate::host::{self, Formatter, FormatterOutput};
use crate::repr::html::RenderOptions;
use crate::repr::text::to_text;
use crate::repr::FoldableRepr;
use crate::streaming::deferred::collecting_deferred_renderings;
use crate::streaming::pipeline::{render_to_html_as_root, StreamingPipeline};
use crate::streaming::OutputHandle;
use crate::value::Displayable;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchDecision {
    /// The value has its own HTML; leave it to the host.
    DeferToNative,
    /// Leave the value to the host's other formatters.
    Suppress,
    Render,
}

impl fmt::Display for DispatchDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DispatchDecision::DeferToNative => "defer_to_native",
            DispatchDecision::Suppress => "suppress",
            DispatchDecision::Render => "render",
        };
        f.write_str(name)
    }
}

/// Decide how `value` is displayed. Only the value's own capabilities count.
pub fn decide(value: &dyn Displayable) -> DispatchDecision {
    if has_own_capability(value, Capability::NativeHtml) {
        return DispatchDecision::DeferToNative;
    }
    let custom = has_own_capability(value, Capability::CustomRootRepr)
        || has_own_capability(value, Capability::CustomSubtreeRepr);
    if is_display_object(value) || (has_own_capability(value, Capability::NativePretty) && !custom)
    {
        return DispatchDecision::Suppress;
    }
    DispatchDecision::Render
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    pub streaming: bool,
    pub compress_html: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            streaming: true,
            compress_html: true,
        }
    }
}

#[derive(Debug)]
pub enum DispatchOutcome {
    Deferred,
    Suppressed,
    /// A finished root fragment.
    Fragment(String),
    /// A streaming render; display it to place the output.
    Handle(OutputHandle),
}

pub struct DispatchPolicy {
    options: DispatchOptions,
    pipeline: Arc<StreamingPipeline>,
}

impl DispatchPolicy {
    pub fn new(options: DispatchOptions, pipeline: Arc<StreamingPipeline>) -> Self {
        Self { options, pipeline }
    }

    pub fn options(&self) -> DispatchOptions {
        self.options
    }

    pub fn render(&self, value: &dyn Displayable) -> Result<DispatchOutcome, ApiError> {
        let decision = decide(value);
        debug!(
            type_name = %value.type_name(),
            decision = %decision,
            streaming = self.options.streaming,
            "Dispatching value"
        );
        match decision {
            DispatchDecision::DeferToNative => return Ok(DispatchOutcome::Deferred),
            DispatchDecision::Suppress => return Ok(DispatchOutcome::Suppressed),
            DispatchDecision::Render => {}
        }

        let render_options = RenderOptions {
            roundtrip: false,
            compressed: self.options.compress_html,
        };

        if !self.options.streaming {
            let repr = build_root(value)?;
            return Ok(DispatchOutcome::Fragment(render_to_html_as_root(
                &repr,
                render_options,
            )?));
        }

        let host = host::current("display_streaming_as_root")?;
        let (repr, deferreds) = collecting_deferred_renderings(|| build_root(value));
        let repr = repr?;
        let handle = self.pipeline.display_streaming_as_root(
            host,
            &repr,
            deferreds,
            render_options,
            true,
        )?;
        Ok(DispatchOutcome::Handle(handle))
    }
}

/// Custom root representation if the value declares one, else the active engine.
fn build_root(value: &dyn Displayable) -> Result<FoldableRepr, RenderError> {
    if has_own_capability(value, Capability::CustomRootRepr) {
        if let Some(root) = value.root_repr() {
            return root.map(FoldableRepr::new);
        }
    }
    active_renderer().get().build_representation(value, true)
}

/// The dispatch policy as a `text/html` formatter.
pub struct HtmlDispatchFormatter {
    policy: DispatchPolicy,
}

impl HtmlDispatchFormatter {
    pub const NAME: &'static str = "foldscope.html";

    pub fn new(policy: DispatchPolicy) -> Self {
        Self { policy }
    }
}

impl Formatter for HtmlDispatchFormatter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn format(&self, value: &dyn Displayable) -> Result<Option<FormatterOutput>, ApiError> {
        Ok(match self.policy.render(value)? {
            DispatchOutcome::Deferred | DispatchOutcome::Suppressed => None,
            DispatchOutcome::Fragment(html) => Some(FormatterOutput::Content(html)),
            DispatchOutcome::Handle(handle) => Some(FormatterOutput::Redisplay(Arc::new(handle))),
        })
    }
}

/// Fully expanded one-line-per-row text for values exposing array data.
pub struct ArrayTextFormatter;

impl ArrayTextFormatter {
    pub const NAME: &'static str = "foldscope.array_text";
}

impl Formatter for ArrayTextFormatter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn format(&self, value: &dyn Displayable) -> Result<Option<FormatterOutput>, ApiError> {
        if !has_own_capability(value, Capability::ArrayData) {
            return Ok(None);
        }
        let repr = TreeRenderer::fully_expanded().build_representation(value, true)?;
        Ok(Some(FormatterOutput::Content(to_text(repr.root()))))
    }
}
