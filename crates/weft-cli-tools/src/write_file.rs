// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use weft_common_core::{ToolContext, ToolError};

use crate::path::resolve_writable;
use crate::Tool;

#[derive(Debug, Deserialize)]
struct WriteFileArgs {
	path: PathBuf,
	#[serde(default)]
	content: String,
}

#[derive(Debug, Serialize)]
struct WriteFileResult {
	path: PathBuf,
	bytes: usize,
	/// True for a streaming preview; nothing was written.
	preview: bool,
}

/// Writes a whole file. Streams: partial input yields a preview of what
/// would be written.
pub struct WriteFileTool;

impl WriteFileTool {
	pub fn new() -> Self {
		Self
	}
}

impl Default for WriteFileTool {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl Tool for WriteFileTool {
	fn name(&self) -> &str {
		"write_file"
	}

	fn description(&self) -> &str {
		"Create or overwrite a file in the workspace with the given content"
	}

	fn input_schema(&self) -> serde_json::Value {
		serde_json::json!({
				"type": "object",
				"properties": {
						"path": {
								"type": "string",
								"description": "Path to the file to write"
						},
						"content": {
								"type": "string",
								"description": "Full new content of the file"
						}
				},
				"required": ["path", "content"]
		})
	}

	fn supports_streaming(&self) -> bool {
		true
	}

	async fn invoke(
		&self,
		args: serde_json::Value,
		ctx: &ToolContext,
	) -> Result<serde_json::Value, ToolError> {
		let args: WriteFileArgs =
			serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
		let file_path = resolve_writable(&args.path, &ctx.workspace_root)?;

		if ctx.streaming {
			tracing::trace!(
					path = %file_path.display(),
					bytes = args.content.len(),
					"write preview"
			);
			let result = WriteFileResult {
				path: file_path,
				bytes: args.content.len(),
				preview: true,
			};
			return serde_json::to_value(result).map_err(|e| ToolError::Serialization(e.to_string()));
		}

		let summary = format!("write {} bytes to {}", args.content.len(), file_path.display());
		if !ctx.approve(self.name(), &summary).await {
			tracing::info!(path = %file_path.display(), "write declined");
			return Err(ToolError::UserDeclined(summary));
		}

		if let Some(parent) = file_path.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}
		tokio::fs::write(&file_path, &args.content).await?;

		tracing::info!(
				path = %file_path.display(),
				bytes = args.content.len(),
				"file written"
		);

		let result = WriteFileResult {
			path: file_path,
			bytes: args.content.len(),
			preview: false,
		};
		serde_json::to_value(result).map_err(|e| ToolError::Serialization(e.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use tempfile::TempDir;
	use weft_common_core::ToolApprover;

	#[derive(Debug)]
	struct Deny;

	#[async_trait]
	impl ToolApprover for Deny {
		async fn approve(&self, _tool_name: &str, _summary: &str) -> bool {
			false
		}
	}

	#[tokio::test]
	async fn write_file_creates_nested_file() {
		let workspace = TempDir::new().unwrap();
		let ctx = ToolContext::new(workspace.path().to_path_buf());

		let result = WriteFileTool::new()
			.invoke(serde_json::json!({"path": "src/new.rs", "content": "fn main() {}"}), &ctx)
			.await
			.unwrap();

		assert_eq!(result["preview"], false);
		let written = std::fs::read_to_string(workspace.path().join("src/new.rs")).unwrap();
		assert_eq!(written, "fn main() {}");
	}

	/// **Test: streaming invocations never touch the disk**
	#[tokio::test]
	async fn streaming_invocation_is_a_preview() {
		let workspace = TempDir::new().unwrap();
		let mut ctx = ToolContext::new(workspace.path().to_path_buf());
		ctx.streaming = true;

		let result = WriteFileTool::new()
			.invoke(serde_json::json!({"path": "a.txt", "content": "par"}), &ctx)
			.await
			.unwrap();

		assert_eq!(result["preview"], true);
		assert_eq!(result["bytes"], 3);
		assert!(!workspace.path().join("a.txt").exists());
	}

	/// **Test: a refused approval is a user-declined error**
	#[tokio::test]
	async fn declined_write_is_user_declined() {
		let workspace = TempDir::new().unwrap();
		let ctx = ToolContext::new(workspace.path().to_path_buf()).with_approver(Arc::new(Deny));

		let err = WriteFileTool::new()
			.invoke(serde_json::json!({"path": "a.txt", "content": "x"}), &ctx)
			.await
			.unwrap_err();

		assert!(err.is_user_declined());
		assert!(!workspace.path().join("a.txt").exists());
	}
}
