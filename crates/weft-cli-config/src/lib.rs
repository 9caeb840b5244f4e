// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Configuration management for the weft CLI.
//!
//! This crate provides:
//! - XDG Base Directory compliant path resolution
//! - Layered configuration (defaults, user file, workspace file,
//!   `WEFT_*` environment, command line)
//! - Validation and conversion into engine [`weft_common_core::TurnConfig`]

pub mod error;
pub mod layer;
pub mod paths;
pub mod runtime;
pub mod sources;

use std::path::PathBuf;

use tracing::debug;

pub use error::ConfigError;
pub use layer::{ProviderKind, WeftConfigLayer};
pub use paths::{resolve_xdg_paths, workspace_config_path, PathsConfig};
pub use runtime::{
	finalize, AcpSettings, BehaviourConfig, DualBoostConfig, LoggingConfig, ProviderConfig,
	RecoveryConfig, WeftConfig,
};
pub use sources::{
	CliOverrides, CliSource, ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource,
};

/// Where to look for configuration.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
	/// Replaces the user config file when set.
	pub config_file: Option<PathBuf>,
	/// Project root; its `.weft/config.toml` is layered over the user file.
	pub workspace: Option<PathBuf>,
	pub cli: CliOverrides,
}

/// Load configuration from all sources with default precedence.
pub fn load_config(options: LoadOptions) -> Result<WeftConfig, ConfigError> {
	let paths = resolve_xdg_paths()?;
	let user_file = options
		.config_file
		.clone()
		.unwrap_or_else(|| paths.user_config_file.clone());

	let mut sources: Vec<Box<dyn ConfigSource>> = vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::user(user_file)),
		Box::new(EnvSource),
		Box::new(CliSource::new(options.cli)),
	];
	if let Some(workspace) = &options.workspace {
		sources.push(Box::new(TomlSource::workspace(workspace_config_path(
			workspace,
		))));
	}

	load_from_sources(sources, paths)
}

/// Merges `sources` in precedence order and resolves the result.
pub fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
	paths: PathsConfig,
) -> Result<WeftConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = WeftConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged, paths)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn paths_in(dir: &std::path::Path) -> PathsConfig {
		PathsConfig {
			user_config_file: dir.join("user/config.toml"),
			data_dir: dir.join("data"),
			cache_dir: dir.join("cache"),
		}
	}

	/// **Test: workspace file overrides user file, CLI overrides both**
	#[test]
	fn test_layer_precedence_across_files() {
		let dir = tempfile::tempdir().unwrap();
		let user = dir.path().join("user.toml");
		let workspace = dir.path().join("project");
		std::fs::create_dir_all(workspace.join(".weft")).unwrap();

		std::fs::write(
			&user,
			r#"
provider = "openai"

[behaviour]
max_completion_reminders = 5
agentic = false

[logging]
level = "debug"
"#,
		)
		.unwrap();
		std::fs::write(
			workspace_config_path(&workspace),
			r#"
[behaviour]
max_completion_reminders = 2
"#,
		)
		.unwrap();

		let sources: Vec<Box<dyn ConfigSource>> = vec![
			Box::new(CliSource::new(CliOverrides {
				log_level: Some("warn".to_string()),
				..Default::default()
			})),
			Box::new(TomlSource::workspace(workspace_config_path(&workspace))),
			Box::new(TomlSource::user(&user)),
			Box::new(DefaultsSource),
		];
		let config = load_from_sources(sources, paths_in(dir.path())).unwrap();

		assert_eq!(config.provider, "openai");
		assert_eq!(config.behaviour.max_completion_reminders, 2);
		assert!(!config.behaviour.agentic);
		assert_eq!(config.logging.level, "warn");
	}

	#[test]
	fn test_missing_files_fall_back_to_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let sources: Vec<Box<dyn ConfigSource>> = vec![
			Box::new(DefaultsSource),
			Box::new(TomlSource::user(dir.path().join("absent.toml"))),
		];
		let config = load_from_sources(sources, paths_in(dir.path())).unwrap();
		assert_eq!(config.provider, "anthropic");
		assert_eq!(config.paths.data_dir, dir.path().join("data"));
	}
}
