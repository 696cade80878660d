pub mod merge;
pub mod schema;

pub use schema::*;

use crate::cli::{Cli, Commands};
use crate::error::ConfigError;
use anyhow::Context;
use std::path::{Path, PathBuf};

/// Load configuration by merging global, workspace, and CLI sources.
/// Precedence: CLI > workspace config > global config > defaults.
///
/// `--config` replaces the global layer. Missing config files are handled
/// gracefully (defaults apply).
pub fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    // Layer 1: Global config (~/.config/baton/baton.toml or platform equivalent)
    let global = match &cli.config {
        Some(path) => load_toml_file(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?
            .unwrap_or_default(),
        None => load_global_config(),
    };

    // Workers and reviewers run with the workspace as their cwd, so every
    // derived path must be absolute before it reaches them.
    let workspace_path = cli
        .workspace
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let workspace_path = std::path::absolute(&workspace_path).with_context(|| {
        format!("Failed to resolve workspace {}", workspace_path.display())
    })?;

    // Layer 2: Workspace config (workspace/baton.toml)
    let workspace = load_workspace_config(&workspace_path);

    // Layer 3: CLI args
    let cli_partial = cli_to_partial(cli, workspace_path);

    let config = cli_partial
        .with_fallback(workspace)
        .with_fallback(global)
        .finalize();

    Ok(config)
}

/// Load global config from the platform-specific config directory.
/// Returns empty PartialConfig if file not found.
fn load_global_config() -> PartialConfig {
    match global_config_path() {
        Some(p) => match load_toml_file(&p) {
            Ok(partial) => partial.unwrap_or_default(),
            Err(e) => {
                tracing::warn!("Ignoring config: {}", e);
                PartialConfig::default()
            }
        },
        None => {
            tracing::debug!("Could not determine global config directory");
            PartialConfig::default()
        }
    }
}

/// Load workspace config from workspace/baton.toml.
/// Parse errors are logged and ignored.
fn load_workspace_config(workspace_path: &Path) -> PartialConfig {
    let config_path = workspace_path.join("baton.toml");
    match load_toml_file(&config_path) {
        Ok(partial) => partial.unwrap_or_default(),
        Err(e) => {
            tracing::warn!("Ignoring config: {}", e);
            PartialConfig::default()
        }
    }
}

/// Load and parse a TOML config file into a PartialConfig.
/// Returns `Ok(None)` when the file does not exist.
fn load_toml_file(path: &Path) -> Result<Option<PartialConfig>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let config_file =
                toml::from_str::<ConfigFile>(&contents).map_err(|e| ConfigError::ParseError {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
            tracing::debug!("Loaded config from {}", path.display());
            Ok(Some(config_file.to_partial()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Ok(None)
        }
        Err(e) => Err(ConfigError::IoError(e)),
    }
}

/// Resolve the platform-specific global config path.
/// Linux: ~/.config/baton/baton.toml
/// macOS: ~/Library/Application Support/baton/baton.toml
fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "baton")
        .map(|dirs| dirs.config_dir().join("baton.toml"))
}

/// Convert CLI arguments to a PartialConfig for merging.
fn cli_to_partial(cli: &Cli, workspace: PathBuf) -> PartialConfig {
    let mut partial = PartialConfig {
        workspace: Some(workspace),
        ..Default::default()
    };

    if let Commands::Batch {
        worker,
        deadline,
        output_root,
        ..
    } = &cli.command
    {
        partial.worker = worker.clone();
        partial.deadline_secs = *deadline;
        partial.output_root = output_root.clone();
    }

    partial
}
