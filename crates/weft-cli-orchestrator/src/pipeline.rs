// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Sequential tool execution for pending tool uses.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use weft_cli_tools::ToolRegistry;
use weft_common_core::{
	HistoryMessage, MessageId, ToolContext, ToolDefinition, ToolError, ToolUseRef, ToolUseState,
};
use weft_common_history::HistoryStore;

use crate::observer::TurnObserver;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineOutcome {
	Completed { executed: usize },
	/// A tool returned the cancellation sentinel, or the turn was cancelled.
	/// The remaining queue was not run.
	Cancelled,
}

pub struct ToolPipeline {
	registry: Arc<ToolRegistry>,
	timeout: Duration,
}

impl ToolPipeline {
	pub fn new(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
		Self { registry, timeout }
	}

	pub fn definitions(&self) -> Vec<ToolDefinition> {
		self.registry.definitions()
	}

	pub fn supports_streaming(&self, tool_name: &str) -> bool {
		self.registry.supports_streaming(tool_name)
	}

	/// Runs `pending` strictly in order, appending one tool_result per tool use.
	#[instrument(skip_all, fields(count = pending.len()))]
	pub async fn run(
		&self,
		pending: Vec<ToolUseRef>,
		history: &mut HistoryStore,
		ctx: &ToolContext,
		observer: &dyn TurnObserver,
	) -> PipelineOutcome {
		let mut executed = 0;

		for tool_use in pending {
			if history.has_tool_result(&tool_use.id) {
				debug!(tool_id = %tool_use.id, "tool use already answered, skipping");
				continue;
			}
			if tool_use.state == ToolUseState::Generating {
				warn!(tool_id = %tool_use.id, tool_name = %tool_use.name, "tool input still generating, skipping");
				continue;
			}
			if ctx.cancel.is_cancelled() {
				info!(tool_id = %tool_use.id, "turn cancelled before tool ran");
				return PipelineOutcome::Cancelled;
			}

			mark_calling(history, &tool_use.message_id, true, observer);
			debug!(tool_id = %tool_use.id, tool_name = %tool_use.name, "executing tool");
			let result = self.invoke(&tool_use, ctx).await;
			mark_calling(history, &tool_use.message_id, false, observer);

			let message = match result {
				Err(e) if e.is_cancelled() => {
					info!(tool_id = %tool_use.id, "tool cancelled, dropping remaining queue");
					return PipelineOutcome::Cancelled;
				}
				Ok(output) => {
					debug!(tool_id = %tool_use.id, "tool succeeded");
					HistoryMessage::tool_result(
						ctx.turn_id.clone(),
						tool_use.id.clone(),
						render_output(&output),
						false,
						false,
					)
				}
				Err(e) => {
					let declined = e.is_user_declined();
					warn!(tool_id = %tool_use.id, error = %e, user_declined = declined, "tool failed");
					HistoryMessage::tool_result(
						ctx.turn_id.clone(),
						tool_use.id.clone(),
						e.to_string(),
						true,
						declined,
					)
				}
			};
			history.upsert(message.clone());
			observer.on_message(&message);
			executed += 1;
		}

		PipelineOutcome::Completed { executed }
	}

	/// Invokes a streaming-capable tool on partial input. The result is not
	/// recorded in history.
	pub async fn preview(&self, tool_use: &ToolUseRef, ctx: &ToolContext) -> Option<Value> {
		if !self.registry.supports_streaming(&tool_use.name) {
			return None;
		}
		let mut preview_ctx = ctx.clone();
		preview_ctx.streaming = true;
		match self.invoke(tool_use, &preview_ctx).await {
			Ok(output) => Some(output),
			Err(e) => {
				debug!(tool_id = %tool_use.id, error = %e, "tool preview failed");
				None
			}
		}
	}

	async fn invoke(&self, tool_use: &ToolUseRef, ctx: &ToolContext) -> Result<Value, ToolError> {
		let call = self
			.registry
			.invoke(&tool_use.name, tool_use.input.clone(), ctx);
		tokio::select! {
			biased;
			_ = ctx.cancel.cancelled() => Err(ToolError::Cancelled),
			result = tokio::time::timeout(self.timeout, call) => match result {
				Ok(result) => result,
				Err(_) => Err(ToolError::Timeout),
			},
		}
	}
}

fn mark_calling(
	history: &mut HistoryStore,
	message_id: &MessageId,
	calling: bool,
	observer: &dyn TurnObserver,
) {
	if let Some(updated) = history.update(message_id, |m| m.flags.is_calling = calling) {
		observer.on_message(&updated);
	}
}

fn render_output(output: &Value) -> String {
	match output {
		Value::String(s) => s.clone(),
		other => other.to_string(),
	}
}
