//! Configuration System
//!
//! Layered configuration for the display system: merge-policy defaults, the
//! user's global file, workspace files, then `FOLDSCOPE__SECTION__KEY`
//! environment variables. Later layers win.

use crate::engine::RendererConfig;
use crate::logging::LoggingConfig;
use crate::streaming::PipelineConfig;
use serde::{Deserialize, Serialize};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldscopeConfig {
    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub renderer: RendererConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Display policy settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Emit a skeleton first and stream deferred leaves into it
    #[serde(default = "default_true")]
    pub streaming: bool,

    /// Deflate-compress HTML renderings
    #[serde(default = "default_true")]
    pub compress_html: bool,

    /// Install the array autovisualizer during setup
    #[serde(default = "default_true")]
    pub autovisualize_arrays: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            streaming: true,
            compress_html: true,
            autovisualize_arrays: true,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Renderer(String),
    Pipeline(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Renderer(msg) => write!(f, "Renderer: {}", msg),
            ValidationError::Pipeline(msg) => write!(f, "Pipeline: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl FoldscopeConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.renderer.validate() {
            errors.push(ValidationError::Renderer(e));
        }
        if let Err(e) = self.pipeline.validate() {
            errors.push(ValidationError::Pipeline(e));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
