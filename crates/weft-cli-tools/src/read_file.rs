// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use weft_common_core::{ToolContext, ToolError};

use crate::path::resolve_existing;
use crate::Tool;

const DEFAULT_MAX_BYTES: u64 = 1024 * 1024; // 1MB

#[derive(Debug, Deserialize)]
struct ReadFileArgs {
	path: PathBuf,
	/// 1-based first line.
	line: Option<usize>,
	limit: Option<usize>,
	max_bytes: Option<u64>,
}

#[derive(Debug, Serialize)]
struct ReadFileResult {
	path: PathBuf,
	contents: String,
	truncated: bool,
}

pub struct ReadFileTool;

impl ReadFileTool {
	pub fn new() -> Self {
		Self
	}
}

impl Default for ReadFileTool {
	fn default() -> Self {
		Self::new()
	}
}

/// Slices `contents` to `limit` lines starting at 1-based `line`.
pub(crate) fn slice_lines(contents: &str, line: Option<usize>, limit: Option<usize>) -> String {
	if line.is_none() && limit.is_none() {
		return contents.to_string();
	}
	let skip = line.unwrap_or(1).saturating_sub(1);
	let take = limit.unwrap_or(usize::MAX);
	contents
		.split_inclusive('\n')
		.skip(skip)
		.take(take)
		.collect()
}

#[async_trait]
impl Tool for ReadFileTool {
	fn name(&self) -> &str {
		"read_file"
	}

	fn description(&self) -> &str {
		"Read the contents of a file from the workspace"
	}

	fn input_schema(&self) -> serde_json::Value {
		serde_json::json!({
				"type": "object",
				"properties": {
						"path": {
								"type": "string",
								"description": "Path to the file to read (absolute or relative to workspace)"
						},
						"line": {
								"type": "integer",
								"description": "1-based line to start reading from"
						},
						"limit": {
								"type": "integer",
								"description": "Maximum number of lines to return"
						},
						"max_bytes": {
								"type": "integer",
								"description": "Maximum number of bytes to read (default: 1MB)"
						}
				},
				"required": ["path"]
		})
	}

	async fn invoke(
		&self,
		args: serde_json::Value,
		ctx: &ToolContext,
	) -> Result<serde_json::Value, ToolError> {
		let args: ReadFileArgs =
			serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
		let max_bytes = args.max_bytes.unwrap_or(DEFAULT_MAX_BYTES);

		tracing::debug!(
				path = %args.path.display(),
				max_bytes = max_bytes,
				"reading file"
		);

		let canonical_path = resolve_existing(&args.path, &ctx.workspace_root)?;

		let file_size = tokio::fs::metadata(&canonical_path).await?.len();
		let truncated = file_size > max_bytes;
		let file = tokio::fs::File::open(&canonical_path).await?;
		let mut bytes = Vec::with_capacity(file_size.min(max_bytes) as usize);
		file.take(max_bytes).read_to_end(&mut bytes).await?;
		let contents = slice_lines(&String::from_utf8_lossy(&bytes), args.line, args.limit);

		if truncated {
			tracing::info!(
					path = %canonical_path.display(),
					file_size = file_size,
					max_bytes = max_bytes,
					"file truncated due to size limit"
			);
		}

		let result = ReadFileResult {
			path: canonical_path,
			contents,
			truncated,
		};

		serde_json::to_value(result).map_err(|e| ToolError::Serialization(e.to_string()))
	}
}
