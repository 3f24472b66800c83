//! CLI route: single route table and run context. Drives a headless host through the library.

use crate::autovisualize::{active_autovisualizer, array_autovisualizer};
use crate::cli::parse::{Commands, OutputFormat};
use crate::config::{ConfigLoader, FoldscopeConfig};
use crate::dispatch::{DispatchOptions, DispatchOutcome, DispatchPolicy};
use crate::engine::{active_renderer, RenderEngine, TreeRenderer};
use crate::error::ApiError;
use crate::host::{active_host, Host, OutputContent, RecordingHost};
use crate::integration::render_to_text;
use crate::streaming::StreamingPipeline;
use crate::value::JsonDocument;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Runtime context for CLI execution: workspace, config path, and the effective configuration.
pub struct RunContext {
    workspace_root: PathBuf,
    config_path: Option<PathBuf>,
    config: FoldscopeConfig,
}

/// Options for one `render` invocation.
struct RenderRequest<'a> {
    file: &'a Path,
    format: OutputFormat,
    streaming: bool,
    compress_html: bool,
    autovisualize: bool,
    timeout: Duration,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };

        if let Err(errors) = config.validate() {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            return Err(ApiError::ConfigError(messages.join("; ")));
        }

        Ok(Self {
            workspace_root,
            config_path,
            config,
        })
    }

    pub fn config(&self) -> &FoldscopeConfig {
        &self.config
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Render {
                file,
                format,
                no_stream,
                no_compress,
                no_autovisualize,
                timeout,
            } => self.render(RenderRequest {
                file,
                format: *format,
                streaming: self.config.display.streaming && !no_stream,
                compress_html: self.config.display.compress_html && !no_compress,
                autovisualize: self.config.display.autovisualize_arrays && !no_autovisualize,
                timeout: Duration::from_secs(*timeout),
            }),
            Commands::Config => self.show_config(),
        }
    }

    fn render(&self, request: RenderRequest<'_>) -> Result<String, ApiError> {
        let source = std::fs::read_to_string(request.file)?;
        let json: serde_json::Value = serde_json::from_str(&source).map_err(|e| {
            ApiError::UserExpression(format!(
                "Invalid JSON in {}: {}",
                request.file.display(),
                e
            ))
        })?;
        let document = JsonDocument::from_json(json);

        let renderer: Arc<dyn RenderEngine> =
            Arc::new(TreeRenderer::new(self.config.renderer.clone()));
        let _renderer_scope = active_renderer().set_scoped(renderer);
        let _visualizer_scope = active_autovisualizer()
            .set_scoped(request.autovisualize.then(array_autovisualizer));

        info!(
            file = %request.file.display(),
            format = ?request.format,
            streaming = request.streaming,
            "Rendering document"
        );

        if request.format == OutputFormat::Text {
            return render_to_text(&document, true);
        }

        let host = Arc::new(RecordingHost::with_name("foldscope-cli"));
        let _host_scope = active_host().set_scoped(Some(host.clone() as Arc<dyn Host>));
        let pipeline = Arc::new(StreamingPipeline::from_config(&self.config.pipeline)?);
        let policy = DispatchPolicy::new(
            DispatchOptions {
                streaming: request.streaming,
                compress_html: request.compress_html,
            },
            Arc::clone(&pipeline),
        );

        match policy.render(&document)? {
            DispatchOutcome::Fragment(html) => host.emit(OutputContent::Html(html))?,
            DispatchOutcome::Handle(handle) => {
                host.display(&handle)?;
                pipeline.run_pending();
                if !handle.wait_for_leaves(request.timeout) {
                    warn!(
                        progress = ?handle.progress(),
                        "Timed out waiting for deferred leaves"
                    );
                }
            }
            DispatchOutcome::Deferred | DispatchOutcome::Suppressed => host.display(&document)?,
        }

        Ok(host.document_html())
    }

    fn show_config(&self) -> Result<String, ApiError> {
        let source = match &self.config_path {
            Some(path) => path.display().to_string(),
            None => format!("{} (layered)", self.workspace_root.display()),
        };
        let body = toml::to_string_pretty(&self.config)
            .map_err(|e| ApiError::ConfigError(format!("Failed to serialize config: {}", e)))?;
        Ok(format!("# source: {}\n{}", source, body))
    }
}
