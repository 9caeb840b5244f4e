// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! XDG Base Directory compliant path resolution.

use std::path::{Path, PathBuf};

use crate::ConfigError;

/// Resolved XDG paths for weft.
#[derive(Debug, Clone)]
pub struct PathsConfig {
	/// User config file: ~/.config/weft/config.toml
	pub user_config_file: PathBuf,
	/// Data directory: ~/.local/share/weft/
	pub data_dir: PathBuf,
	/// Cache directory: ~/.cache/weft/ (turn artifacts)
	pub cache_dir: PathBuf,
}

impl PathsConfig {
	/// Parent of `user_config_file`.
	pub fn config_dir(&self) -> PathBuf {
		self
			.user_config_file
			.parent()
			.map(|p| p.to_path_buf())
			.unwrap_or_else(|| self.user_config_file.clone())
	}

	/// Directory holding one JSON record per conversation.
	pub fn conversations_dir(&self) -> PathBuf {
		self.data_dir.join("conversations")
	}

	pub fn artifacts_dir(&self) -> PathBuf {
		self.cache_dir.join("turns")
	}
}

/// Resolve XDG paths according to the Base Directory Specification.
///
/// Uses `XDG_CONFIG_HOME`, `XDG_DATA_HOME` and `XDG_CACHE_HOME` when set,
/// otherwise the usual dot-directories under home.
pub fn resolve_xdg_paths() -> Result<PathsConfig, ConfigError> {
	let home = dirs::home_dir().ok_or(ConfigError::HomeDirNotFound)?;

	let config_home = std::env::var_os("XDG_CONFIG_HOME")
		.map(PathBuf::from)
		.unwrap_or_else(|| home.join(".config"));

	let data_home = std::env::var_os("XDG_DATA_HOME")
		.map(PathBuf::from)
		.unwrap_or_else(|| home.join(".local/share"));

	let cache_home = std::env::var_os("XDG_CACHE_HOME")
		.map(PathBuf::from)
		.unwrap_or_else(|| home.join(".cache"));

	tracing::debug!(
			config_home = %config_home.display(),
			data_home = %data_home.display(),
			cache_home = %cache_home.display(),
			"resolved XDG paths"
	);

	Ok(PathsConfig {
		user_config_file: config_home.join("weft/config.toml"),
		data_dir: data_home.join("weft"),
		cache_dir: cache_home.join("weft"),
	})
}

/// Workspace config file under `workspace`.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
	workspace.join(".weft/config.toml")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_resolve_xdg_paths_succeeds() {
		let paths = resolve_xdg_paths().unwrap();
		assert!(paths.user_config_file.ends_with("weft/config.toml"));
		assert!(paths.data_dir.ends_with("weft"));
		assert!(paths.conversations_dir().ends_with("weft/conversations"));
		assert!(paths.artifacts_dir().ends_with("weft/turns"));
	}

	#[test]
	fn test_config_dir_returns_parent() {
		let paths = resolve_xdg_paths().unwrap();
		assert!(paths.config_dir().ends_with("weft"));
	}

	#[test]
	fn test_workspace_config_path() {
		let path = workspace_config_path(Path::new("/work/project"));
		assert_eq!(path, PathBuf::from("/work/project/.weft/config.toml"));
	}
}
