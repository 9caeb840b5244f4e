// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use std::collections::BTreeMap;
use weft_common_core::{ToolContext, ToolDefinition, ToolError};

#[async_trait]
pub trait Tool: Send + Sync {
	fn name(&self) -> &str;

	fn description(&self) -> &str;

	fn input_schema(&self) -> serde_json::Value;

	/// Tools that accept partial input may be invoked while the model is
	/// still streaming it. Such calls run with `ctx.streaming` set and must
	/// not commit side effects.
	fn supports_streaming(&self) -> bool {
		false
	}

	fn to_definition(&self) -> ToolDefinition {
		ToolDefinition {
			name: self.name().to_string(),
			description: self.description().to_string(),
			input_schema: self.input_schema(),
		}
	}

	async fn invoke(
		&self,
		args: serde_json::Value,
		ctx: &ToolContext,
	) -> Result<serde_json::Value, ToolError>;
}

/// Tools by name, iterated in name order so the catalog sent to the model
/// is stable between turns.
pub struct ToolRegistry {
	tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
	pub fn new() -> Self {
		Self {
			tools: BTreeMap::new(),
		}
	}

	pub fn register(&mut self, tool: Box<dyn Tool>) {
		let name = tool.name().to_string();
		tracing::debug!(tool_name = %name, "registering tool");
		self.tools.insert(name, tool);
	}

	pub fn get(&self, name: &str) -> Option<&dyn Tool> {
		self.tools.get(name).map(|t| t.as_ref())
	}

	pub fn supports_streaming(&self, name: &str) -> bool {
		self.get(name).is_some_and(|t| t.supports_streaming())
	}

	pub fn definitions(&self) -> Vec<ToolDefinition> {
		self.tools.values().map(|t| t.to_definition()).collect()
	}

	pub fn is_empty(&self) -> bool {
		self.tools.is_empty()
	}

	pub async fn invoke(
		&self,
		name: &str,
		args: serde_json::Value,
		ctx: &ToolContext,
	) -> Result<serde_json::Value, ToolError> {
		let tool = self
			.get(name)
			.ok_or_else(|| ToolError::NotFound(name.to_string()))?;
		tool.invoke(args, ctx).await
	}
}

impl Default for ToolRegistry {
	fn default() -> Self {
		Self::new()
	}
}
