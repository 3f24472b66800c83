//! Loader entry points over the layered sources.

use super::merge::merge_policy::builder_with_defaults;
use super::sources::{global_file, workspace_file};
use super::FoldscopeConfig;
use config::{ConfigError, Environment, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Prefix for `FOLDSCOPE__SECTION__KEY` overrides.
const ENV_PREFIX: &str = "FOLDSCOPE";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, then the global file, then workspace files, then the environment.
    pub fn load(workspace_root: &Path) -> Result<FoldscopeConfig, ConfigError> {
        let builder = builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        debug!(workspace = %workspace_root.display(), "Loaded configuration");
        config.try_deserialize()
    }

    /// Defaults overlaid with a single explicit file. Missing files are an error.
    pub fn load_from_file(path: &Path) -> Result<FoldscopeConfig, ConfigError> {
        builder_with_defaults()?
            .add_source(File::from(path).required(true))
            .build()?
            .try_deserialize()
    }

    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }

    pub fn default() -> FoldscopeConfig {
        FoldscopeConfig::default()
    }
}
