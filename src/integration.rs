//! Notebook setup and user entry points
//!
//! Installs the dispatch policy and the cell magics into the active host, and
//! provides the one-shot display helpers.

use crate::autovisualize::{active_autovisualizer, array_autovisualizer};
use crate::config::FoldscopeConfig;
use crate::dispatch::{ArrayTextFormatter, DispatchOptions, DispatchPolicy, HtmlDispatchFormatter};
use crate::engine::{active_renderer, TreeRenderer};
use crate::error::ApiError;
use crate::figures::{self, Subfigure};
use crate::host::{self, OutputContent, MIME_HTML, MIME_PLAIN};
use crate::magic::{AutovisualizeMagic, WithMagic};
use crate::repr::html::{render_root, RenderOptions};
use crate::repr::text::to_text;
use crate::repr::FragmentId;
use crate::streaming::{PipelineConfig, StreamingPipeline};
use crate::value::Displayable;
use std::sync::Arc;
use tracing::info;

/// Options for [`register_as_default`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterOptions {
    /// Emit a skeleton immediately and fill in deferred leaves as they resolve.
    pub streaming: bool,
    /// Deflate-compress renderings before sending them to the host.
    pub compress_html: bool,
    pub pipeline: PipelineConfig,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            streaming: true,
            compress_html: true,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl RegisterOptions {
    pub fn from_config(config: &FoldscopeConfig) -> Self {
        Self {
            streaming: config.display.streaming,
            compress_html: config.display.compress_html,
            pipeline: config.pipeline.clone(),
        }
    }
}

/// Make the dispatch policy the host's default HTML renderer.
pub fn register_as_default(options: &RegisterOptions) -> Result<(), ApiError> {
    host::current("register_as_default")?;
    let pipeline = Arc::new(StreamingPipeline::from_config(&options.pipeline)?);
    register_as_default_with(options, pipeline)
}

/// [`register_as_default`] with an explicit pipeline.
pub fn register_as_default_with(
    options: &RegisterOptions,
    pipeline: Arc<StreamingPipeline>,
) -> Result<(), ApiError> {
    let host = host::current("register_as_default")?;
    let policy = DispatchPolicy::new(
        DispatchOptions {
            streaming: options.streaming,
            compress_html: options.compress_html,
        },
        pipeline,
    );

    let registry = host.formatters();
    registry.register(MIME_HTML, Arc::new(HtmlDispatchFormatter::new(policy)));
    registry.register(MIME_PLAIN, Arc::new(ArrayTextFormatter));
    // Streaming outputs need the HTML formatter to run first.
    registry.move_to_front(MIME_HTML);

    info!(
        host = host.name(),
        streaming = options.streaming,
        compress_html = options.compress_html,
        "Registered as default renderer"
    );
    Ok(())
}

pub fn register_autovisualize_magic() -> Result<(), ApiError> {
    let host = host::current("register_autovisualize_magic")?;
    host.register_magic(Arc::new(AutovisualizeMagic))
}

pub fn register_context_manager_magic() -> Result<(), ApiError> {
    let host = host::current("register_context_manager_magic")?;
    host.register_magic(Arc::new(WithMagic))
}

/// Default renderer, both magics, and optionally array autovisualization for
/// every subsequent display.
pub fn basic_interactive_setup(autovisualize_arrays: bool) -> Result<(), ApiError> {
    register_as_default(&RegisterOptions::default())?;
    register_autovisualize_magic()?;
    register_context_manager_magic()?;
    if autovisualize_arrays {
        active_autovisualizer().set_globally(Some(array_autovisualizer()));
    }
    Ok(())
}

/// [`basic_interactive_setup`] driven by a loaded configuration.
pub fn interactive_setup_from_config(config: &FoldscopeConfig) -> Result<(), ApiError> {
    active_renderer().set_globally(Arc::new(TreeRenderer::new(config.renderer.clone())));
    register_as_default(&RegisterOptions::from_config(config))?;
    register_autovisualize_magic()?;
    register_context_manager_magic()?;
    if config.display.autovisualize_arrays {
        active_autovisualizer().set_globally(Some(array_autovisualizer()));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayArgs {
    /// Show failing subtrees as error markers instead of failing the display.
    pub ignore_exceptions: bool,
    pub roundtrip: bool,
}

/// Render `value` to a compressed fragment and emit it.
pub fn display(value: &dyn Displayable, args: DisplayArgs) -> Result<(), ApiError> {
    let host = host::current("display")?;
    let html = render_to_html(
        value,
        args.ignore_exceptions,
        RenderOptions {
            roundtrip: args.roundtrip,
            compressed: true,
        },
    )?;
    host.emit(OutputContent::Html(html))
}

/// Show items inline, like `print`. Text shows as itself.
pub fn show<'a>(
    items: impl IntoIterator<Item = Subfigure<'a>>,
    wrap: bool,
    space_separated: bool,
) -> Result<(), ApiError> {
    let host = host::current("show")?;
    let mut subfigures = Vec::new();
    for item in items {
        if space_separated && !subfigures.is_empty() {
            subfigures.push(Subfigure::from(" "));
        }
        subfigures.push(item);
    }
    let figure = figures::inline(subfigures, wrap)?;
    host.display(&figure)
}

pub fn render_to_html(
    value: &dyn Displayable,
    ignore_exceptions: bool,
    options: RenderOptions,
) -> Result<String, ApiError> {
    let repr = active_renderer()
        .get()
        .build_representation(value, ignore_exceptions)?;
    Ok(render_root(repr.root(), &FragmentId::next(), options)?)
}

pub fn render_to_text(
    value: &dyn Displayable,
    ignore_exceptions: bool,
) -> Result<String, ApiError> {
    let repr = active_renderer()
        .get()
        .build_representation(value, ignore_exceptions)?;
    Ok(to_text(repr.root()))
}
