//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("display.streaming", true)?
        .set_default("display.compress_html", true)?
        .set_default("display.autovisualize_arrays", true)?
        .set_default("renderer.expand_depth", 2_i64)?
        .set_default("renderer.max_depth", 64_i64)?
        .set_default("pipeline.scheduler", "worker_pool")?
        .set_default("pipeline.workers", 2_i64)?
        .set_default("pipeline.max_concurrent_leaves", 4_i64)
}
