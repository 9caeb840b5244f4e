// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! On-disk copy of a request body for one turn.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};
use weft_common_core::LlmError;

/// Request body written to a temporary file before the request is issued.
///
/// The file is removed when the artifact drops unless it was kept.
#[derive(Debug)]
pub struct TurnArtifact {
	body: Vec<u8>,
	file: Option<NamedTempFile>,
	kept: Option<PathBuf>,
}

impl TurnArtifact {
	pub fn write(
		body: &serde_json::Value,
		dir: Option<&Path>,
		keep: bool,
	) -> Result<Self, LlmError> {
		let bytes = serde_json::to_vec(body)
			.map_err(|e| LlmError::InvalidResponse(format!("failed to encode request: {e}")))?;

		let mut builder = tempfile::Builder::new();
		builder.prefix("weft-turn-").suffix(".json");
		let created = match dir {
			Some(dir) => builder.tempfile_in(dir),
			None => builder.tempfile(),
		};
		let mut file = created.map_err(|e| LlmError::Transport(format!("artifact: {e}")))?;
		file
			.write_all(&bytes)
			.map_err(|e| LlmError::Transport(format!("artifact: {e}")))?;

		if keep {
			match file.keep() {
				Ok((_, path)) => {
					debug!(path = %path.display(), "kept turn artifact");
					return Ok(Self {
						body: bytes,
						file: None,
						kept: Some(path),
					});
				}
				Err(e) => {
					warn!(error = %e.error, "failed to keep turn artifact");
					return Ok(Self {
						body: bytes,
						file: Some(e.file),
						kept: None,
					});
				}
			}
		}

		Ok(Self {
			body: bytes,
			file: Some(file),
			kept: None,
		})
	}

	pub fn body(&self) -> &[u8] {
		&self.body
	}

	pub fn path(&self) -> Option<&Path> {
		match (&self.file, &self.kept) {
			(Some(file), _) => Some(file.path()),
			(None, Some(path)) => Some(path.as_path()),
			(None, None) => None,
		}
	}

	pub fn is_kept(&self) -> bool {
		self.kept.is_some()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use tempfile::TempDir;

	#[test]
	fn test_artifact_removed_on_drop() {
		let dir = TempDir::new().unwrap();
		let artifact = TurnArtifact::write(&json!({"model": "m"}), Some(dir.path()), false).unwrap();
		let path = artifact.path().unwrap().to_path_buf();
		assert!(path.exists());
		assert_eq!(artifact.body(), br#"{"model":"m"}"#);
		drop(artifact);
		assert!(!path.exists());
	}

	#[test]
	fn test_kept_artifact_survives_drop() {
		let dir = TempDir::new().unwrap();
		let artifact = TurnArtifact::write(&json!({}), Some(dir.path()), true).unwrap();
		assert!(artifact.is_kept());
		let path = artifact.path().unwrap().to_path_buf();
		drop(artifact);
		assert!(path.exists());
	}
}
