// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use serde::Deserialize;
use weft_common_core::{TodoItem, ToolContext, ToolError};

use crate::Tool;

#[derive(Debug, Deserialize)]
struct WriteTodosArgs {
	todos: Vec<TodoItem>,
}

/// Replaces the conversation's todo plan.
pub struct WriteTodosTool;

impl WriteTodosTool {
	pub fn new() -> Self {
		Self
	}
}

impl Default for WriteTodosTool {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl Tool for WriteTodosTool {
	fn name(&self) -> &str {
		"write_todos"
	}

	fn description(&self) -> &str {
		"Replace the task's todo list. Send the full list every time; mark items completed as you finish them."
	}

	fn input_schema(&self) -> serde_json::Value {
		serde_json::json!({
				"type": "object",
				"properties": {
						"todos": {
								"type": "array",
								"items": {
										"type": "object",
										"properties": {
												"content": {"type": "string"},
												"status": {"type": "string", "enum": ["pending", "in_progress", "completed"]},
												"priority": {"type": "string", "enum": ["high", "medium", "low"]}
										},
										"required": ["content", "status"]
								}
						}
				},
				"required": ["todos"]
		})
	}

	async fn invoke(
		&self,
		args: serde_json::Value,
		ctx: &ToolContext,
	) -> Result<serde_json::Value, ToolError> {
		let args: WriteTodosArgs =
			serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

		let unfinished = {
			let mut plan = ctx.plan.lock();
			plan.replace(args.todos);
			plan.unfinished()
		};

		tracing::debug!(unfinished, "todo plan replaced");
		Ok(serde_json::json!({"unfinished": unfinished}))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use weft_common_core::{SharedPlan, TodoStatus};

	#[tokio::test]
	async fn write_todos_replaces_shared_plan() {
		let plan = SharedPlan::default();
		plan.lock().replace(vec![TodoItem::new("old")]);
		let ctx = ToolContext::new(std::env::temp_dir()).with_plan(plan.clone());

		let result = WriteTodosTool::new()
			.invoke(
				serde_json::json!({"todos": [
					{"content": "a", "status": "completed"},
					{"content": "b", "status": "in_progress", "priority": "high"}
				]}),
				&ctx,
			)
			.await
			.unwrap();

		assert_eq!(result["unfinished"], 1);
		let snapshot = plan.snapshot();
		assert_eq!(snapshot.entries.len(), 2);
		assert_eq!(snapshot.entries[1].status, TodoStatus::InProgress);
	}

	#[tokio::test]
	async fn write_todos_rejects_bad_input() {
		let ctx = ToolContext::new(std::env::temp_dir());
		let err = WriteTodosTool::new()
			.invoke(serde_json::json!({"todos": "nope"}), &ctx)
			.await
			.unwrap_err();
		assert!(matches!(err, ToolError::InvalidArguments(_)));
	}
}
