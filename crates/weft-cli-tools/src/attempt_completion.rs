// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use serde::Deserialize;
use weft_common_core::{ToolContext, ToolError, COMPLETION_TOOL_NAME};

use crate::Tool;

#[derive(Debug, Deserialize)]
struct AttemptCompletionArgs {
	result: String,
}

/// Declares the agentic task finished.
pub struct AttemptCompletionTool;

impl AttemptCompletionTool {
	pub fn new() -> Self {
		Self
	}
}

impl Default for AttemptCompletionTool {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl Tool for AttemptCompletionTool {
	fn name(&self) -> &str {
		COMPLETION_TOOL_NAME
	}

	fn description(&self) -> &str {
		"Call once the task is complete, with a short summary of the outcome."
	}

	fn input_schema(&self) -> serde_json::Value {
		serde_json::json!({
				"type": "object",
				"properties": {
						"result": {
								"type": "string",
								"description": "Summary of what was done"
						}
				},
				"required": ["result"]
		})
	}

	async fn invoke(
		&self,
		args: serde_json::Value,
		_ctx: &ToolContext,
	) -> Result<serde_json::Value, ToolError> {
		let args: AttemptCompletionArgs =
			serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
		tracing::info!(summary_len = args.result.len(), "task marked complete");
		Ok(serde_json::json!({"completed": true, "result": args.result}))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn completion_echoes_result() {
		let ctx = ToolContext::new(std::env::temp_dir());
		let out = AttemptCompletionTool::new()
			.invoke(serde_json::json!({"result": "done"}), &ctx)
			.await
			.unwrap();
		assert_eq!(out["completed"], true);
		assert_eq!(out["result"], "done");
	}
}
