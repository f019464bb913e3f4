//! Configuration system for expgate.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> explicit config file -> environment variables ->
//! overrides.

use crate::gateway::GatewayConfig;
use crate::tensorboard::TensorboardConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the per-workspace configuration directory.
pub const WORKSPACE_CONFIG_DIR: &str = ".expgate";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpgateConfig {
    pub gateway: GatewayConfig,
    pub tensorboard: TensorboardConfig,
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "expgate", "expgate")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(WORKSPACE_CONFIG_DIR).join("config.toml")
}

/// Load configuration from all layers.
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&ExpgateConfig>,
) -> Result<ExpgateConfig, Box<figment::Error>> {
    load_config_with_file(workspace, None, overrides)
}

/// Load configuration, layering `config_file` above the user and workspace
/// files. Unlike those, an explicit file must exist.
pub fn load_config_with_file(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
    overrides: Option<&ExpgateConfig>,
) -> Result<ExpgateConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(ExpgateConfig::default()));

    if let Some(user_config) = user_config_path().filter(|p| p.exists()) {
        figment = figment.merge(Toml::file(user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(ws_config));
        }
    }

    if let Some(file) = config_file {
        if !file.exists() {
            return Err(Box::new(figment::Error::from(format!(
                "config file not found: {}",
                file.display()
            ))));
        }
        figment = figment.merge(Toml::file(file));
    }

    // EXPGATE_GATEWAY__PORT, EXPGATE_TENSORBOARD__COMMAND, ...
    figment = figment.merge(Env::prefixed("EXPGATE_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Whether a user-level or workspace-level config file exists.
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if user_config_path().is_some_and(|p| p.exists()) {
        return true;
    }
    workspace.is_some_and(|ws| workspace_config_path(ws).exists())
}
