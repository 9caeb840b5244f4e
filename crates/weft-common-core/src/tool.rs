// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::message::TurnId;
use crate::plan::SharedPlan;

/// Definition of a tool for the LLM.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDefinition {
	pub name: String,
	pub description: String,
	pub input_schema: serde_json::Value,
}

impl ToolDefinition {
	pub fn new(
		name: impl Into<String>,
		description: impl Into<String>,
		input_schema: serde_json::Value,
	) -> Self {
		let name = name.into();
		tracing::debug!(
				tool_name = %name,
				"Creating tool definition"
		);
		Self {
			name,
			description: description.into(),
			input_schema,
		}
	}
}

/// Asks the user before a tool performs a side effect.
#[async_trait]
pub trait ToolApprover: Send + Sync + std::fmt::Debug {
	async fn approve(&self, tool_name: &str, summary: &str) -> bool;
}

/// Context provided to tools during execution.
#[derive(Clone, Debug)]
pub struct ToolContext {
	pub workspace_root: PathBuf,
	pub plan: SharedPlan,
	pub turn_id: Option<TurnId>,
	/// Set while the tool input is still streaming in.
	pub streaming: bool,
	pub cancel: CancellationToken,
	/// No approver means side effects are allowed.
	pub approver: Option<Arc<dyn ToolApprover>>,
}

impl ToolContext {
	pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
		let workspace_root = workspace_root.into();
		tracing::debug!(
				workspace_root = %workspace_root.display(),
				"Creating tool context"
		);
		Self {
			workspace_root,
			plan: SharedPlan::default(),
			turn_id: None,
			streaming: false,
			cancel: CancellationToken::new(),
			approver: None,
		}
	}

	pub fn with_plan(mut self, plan: SharedPlan) -> Self {
		self.plan = plan;
		self
	}

	pub fn with_approver(mut self, approver: Arc<dyn ToolApprover>) -> Self {
		self.approver = Some(approver);
		self
	}

	/// Asks the approver, if any. Returns `true` when no approver is set.
	pub async fn approve(&self, tool_name: &str, summary: &str) -> bool {
		match &self.approver {
			Some(approver) => approver.approve(tool_name, summary).await,
			None => true,
		}
	}

	pub fn for_turn(&self, turn_id: TurnId, cancel: CancellationToken) -> Self {
		Self {
			workspace_root: self.workspace_root.clone(),
			plan: self.plan.clone(),
			turn_id: Some(turn_id),
			streaming: false,
			cancel,
			approver: self.approver.clone(),
		}
	}
}
