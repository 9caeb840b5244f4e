// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::path::{Path, PathBuf};
use weft_common_core::ToolError;

fn workspace_canonical(workspace_root: &Path) -> Result<PathBuf, ToolError> {
	workspace_root
		.canonicalize()
		.map_err(|_| ToolError::FileNotFound(workspace_root.to_path_buf()))
}

/// Resolves an existing file inside the workspace.
pub(crate) fn resolve_existing(path: &Path, workspace_root: &Path) -> Result<PathBuf, ToolError> {
	let absolute_path = if path.is_absolute() {
		path.to_path_buf()
	} else {
		workspace_root.join(path)
	};

	let canonical = absolute_path
		.canonicalize()
		.map_err(|_| ToolError::FileNotFound(absolute_path.clone()))?;

	if !canonical.starts_with(workspace_canonical(workspace_root)?) {
		return Err(ToolError::PathOutsideWorkspace(canonical));
	}

	Ok(canonical)
}

/// Resolves a path that may not exist yet. The nearest existing ancestor
/// must be inside the workspace and `..` components are rejected.
pub(crate) fn resolve_writable(path: &Path, workspace_root: &Path) -> Result<PathBuf, ToolError> {
	if path
		.components()
		.any(|c| matches!(c, std::path::Component::ParentDir))
	{
		return Err(ToolError::PathOutsideWorkspace(path.to_path_buf()));
	}

	let workspace = workspace_canonical(workspace_root)?;
	let normalized = if path.is_absolute() {
		path.to_path_buf()
	} else {
		workspace.join(path)
	};

	let mut ancestor = normalized.as_path();
	while !ancestor.exists() {
		match ancestor.parent() {
			Some(parent) => ancestor = parent,
			None => break,
		}
	}
	let ancestor = ancestor
		.canonicalize()
		.map_err(|_| ToolError::PathOutsideWorkspace(normalized.clone()))?;
	if !ancestor.starts_with(&workspace) {
		return Err(ToolError::PathOutsideWorkspace(normalized));
	}

	Ok(normalized)
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn test_writable_accepts_new_nested_path() {
		let workspace = TempDir::new().unwrap();
		let resolved = resolve_writable(Path::new("a/b/c.txt"), workspace.path()).unwrap();
		assert!(resolved.ends_with("a/b/c.txt"));
	}

	#[test]
	fn test_writable_rejects_escape() {
		let workspace = TempDir::new().unwrap();
		assert!(matches!(
			resolve_writable(Path::new("../x.txt"), workspace.path()),
			Err(ToolError::PathOutsideWorkspace(_))
		));
		assert!(matches!(
			resolve_writable(Path::new("/etc/weft-test.txt"), workspace.path()),
			Err(ToolError::PathOutsideWorkspace(_))
		));
	}

	#[test]
	fn test_existing_requires_file() {
		let workspace = TempDir::new().unwrap();
		assert!(matches!(
			resolve_existing(Path::new("missing.txt"), workspace.path()),
			Err(ToolError::FileNotFound(_))
		));
	}
}
