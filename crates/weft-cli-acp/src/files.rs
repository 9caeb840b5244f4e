// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! File access offered to the agent through `fs/*` requests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

/// Reads and writes files on behalf of the agent.
#[async_trait]
pub trait FileAccess: Send + Sync {
	/// `line` is 1-based.
	async fn read_text(
		&self,
		path: &Path,
		line: Option<u32>,
		limit: Option<u32>,
	) -> std::io::Result<String>;

	async fn write_text(&self, path: &Path, content: &str) -> std::io::Result<()>;
}

/// Disk-backed file access with an overlay of unsaved editor buffers.
///
/// Reads see unsaved content first; a write clears the overlay entry.
#[derive(Clone, Debug, Default)]
pub struct WorkspaceFiles {
	unsaved: Arc<Mutex<HashMap<PathBuf, String>>>,
}

impl WorkspaceFiles {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_unsaved(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
		self.buffers().insert(path.into(), content.into());
	}

	pub fn clear_unsaved(&self, path: &Path) {
		self.buffers().remove(path);
	}

	fn buffers(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, String>> {
		self.unsaved.lock().unwrap_or_else(|e| e.into_inner())
	}
}

#[async_trait]
impl FileAccess for WorkspaceFiles {
	async fn read_text(
		&self,
		path: &Path,
		line: Option<u32>,
		limit: Option<u32>,
	) -> std::io::Result<String> {
		let unsaved = self.buffers().get(path).cloned();
		let content = match unsaved {
			Some(content) => {
				debug!(path = %path.display(), "serving unsaved buffer");
				content
			}
			None => tokio::fs::read_to_string(path).await?,
		};
		Ok(slice_lines(&content, line, limit))
	}

	async fn write_text(&self, path: &Path, content: &str) -> std::io::Result<()> {
		if let Some(parent) = path.parent() {
			if !parent.as_os_str().is_empty() {
				tokio::fs::create_dir_all(parent).await?;
			}
		}
		tokio::fs::write(path, content).await?;
		self.clear_unsaved(path);
		debug!(path = %path.display(), bytes = content.len(), "agent wrote file");
		Ok(())
	}
}

pub(crate) fn slice_lines(content: &str, line: Option<u32>, limit: Option<u32>) -> String {
	if line.is_none() && limit.is_none() {
		return content.to_string();
	}
	let start = line.map(|l| l.saturating_sub(1) as usize).unwrap_or(0);
	let take = limit.map(|l| l as usize).unwrap_or(usize::MAX);
	content
		.split_inclusive('\n')
		.skip(start)
		.take(take)
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_slice_lines() {
		let text = "a\nb\nc\nd";
		assert_eq!(slice_lines(text, None, None), text);
		assert_eq!(slice_lines(text, Some(2), Some(2)), "b\nc\n");
		assert_eq!(slice_lines(text, Some(4), None), "d");
		assert_eq!(slice_lines(text, Some(9), None), "");
		assert_eq!(slice_lines(text, None, Some(1)), "a\n");
	}

	/// **Test: unsaved buffers shadow disk until written**
	#[tokio::test]
	async fn test_unsaved_overlay() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("a.txt");
		std::fs::write(&path, "disk").unwrap();

		let files = WorkspaceFiles::new();
		files.set_unsaved(&path, "buffer");
		assert_eq!(files.read_text(&path, None, None).await.unwrap(), "buffer");

		files.write_text(&path, "saved").await.unwrap();
		assert_eq!(files.read_text(&path, None, None).await.unwrap(), "saved");
		assert_eq!(std::fs::read_to_string(&path).unwrap(), "saved");
	}

	#[tokio::test]
	async fn test_write_creates_parent_dirs() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("nested/deeper/b.txt");
		WorkspaceFiles::new().write_text(&path, "x").await.unwrap();
		assert_eq!(std::fs::read_to_string(&path).unwrap(), "x");
	}

	#[tokio::test]
	async fn test_missing_file_errors() {
		let dir = tempfile::tempdir().unwrap();
		let err = WorkspaceFiles::new()
			.read_text(&dir.path().join("nope"), None, None)
			.await
			.unwrap_err();
		assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
	}
}
