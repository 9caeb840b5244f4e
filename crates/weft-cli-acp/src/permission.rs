// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Tool-call permission requests from the agent.

use agent_client_protocol as acp;
use async_trait::async_trait;
use tracing::info;

/// What the user decided for one permission prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionDecision {
	AllowOnce,
	AllowAlways,
	RejectOnce,
	RejectAlways,
	/// The prompt was dismissed without a choice.
	Cancelled,
}

impl PermissionDecision {
	pub fn is_reject(self) -> bool {
		matches!(self, Self::RejectOnce | Self::RejectAlways)
	}
}

/// A permission request as shown to the user.
#[derive(Clone, Debug)]
pub struct PermissionPrompt {
	pub tool_call_id: String,
	pub title: String,
	pub kind: Option<String>,
	pub options: Vec<acp::PermissionOption>,
}

impl PermissionPrompt {
	pub fn new(tool_call: &acp::ToolCallUpdate, options: Vec<acp::PermissionOption>) -> Self {
		let tool_call_id = tool_call.tool_call_id.to_string();
		Self {
			title: tool_call
				.fields
				.title
				.clone()
				.unwrap_or_else(|| tool_call_id.clone()),
			kind: tool_call.fields.kind.as_ref().map(|k| kind_name(k).to_string()),
			tool_call_id,
			options,
		}
	}
}

/// Wire name of a tool kind.
pub fn kind_name(kind: &acp::ToolKind) -> &'static str {
	match kind {
		acp::ToolKind::Read => "read",
		acp::ToolKind::Edit => "edit",
		acp::ToolKind::Delete => "delete",
		acp::ToolKind::Move => "move",
		acp::ToolKind::Search => "search",
		acp::ToolKind::Execute => "execute",
		acp::ToolKind::Think => "think",
		acp::ToolKind::Fetch => "fetch",
		acp::ToolKind::SwitchMode => "switch_mode",
		_ => "other",
	}
}

/// Asks the user how to answer a permission request.
#[async_trait]
pub trait PermissionConfirmer: Send + Sync {
	async fn confirm(&self, prompt: &PermissionPrompt) -> PermissionDecision;
}

/// Answers every request with a fixed decision.
#[derive(Clone, Copy, Debug)]
pub struct FixedConfirmer(pub PermissionDecision);

#[async_trait]
impl PermissionConfirmer for FixedConfirmer {
	async fn confirm(&self, _prompt: &PermissionPrompt) -> PermissionDecision {
		self.0
	}
}

/// Tool kinds that change the workspace or run commands.
const MUTATING_KINDS: &[&str] = &["edit", "delete", "move", "execute"];

/// Mode in which mutating tools may be rejected without asking.
pub const PLAN_MODE: &str = "plan";

pub fn should_auto_reject(auto_reject_in_plan: bool, mode: Option<&str>, kind: Option<&str>) -> bool {
	auto_reject_in_plan
		&& mode == Some(PLAN_MODE)
		&& kind.is_some_and(|k| MUTATING_KINDS.contains(&k))
}

/// Maps a decision onto one of the offered option ids.
///
/// Falls back from an "always" choice to the "once" variant of the same
/// polarity and vice versa. `None` means the request is answered as
/// cancelled.
pub fn select_option(
	decision: PermissionDecision,
	options: &[acp::PermissionOption],
) -> Option<acp::PermissionOptionId> {
	use acp::PermissionOptionKind::*;

	let preference: &[acp::PermissionOptionKind] = match decision {
		PermissionDecision::AllowOnce => &[AllowOnce, AllowAlways],
		PermissionDecision::AllowAlways => &[AllowAlways, AllowOnce],
		PermissionDecision::RejectOnce => &[RejectOnce, RejectAlways],
		PermissionDecision::RejectAlways => &[RejectAlways, RejectOnce],
		PermissionDecision::Cancelled => &[],
	};
	let selected = preference
		.iter()
		.find_map(|kind| options.iter().find(|o| o.kind == *kind))
		.map(|o| o.option_id.clone());
	info!(
		?decision,
		option_id = ?selected.as_ref().map(ToString::to_string),
		"permission decision"
	);
	selected
}

/// Reply to a permission request for `decision`.
pub fn permission_response(
	decision: PermissionDecision,
	options: &[acp::PermissionOption],
) -> acp::RequestPermissionResponse {
	let outcome = match select_option(decision, options) {
		Some(option_id) => {
			acp::RequestPermissionOutcome::Selected(acp::SelectedPermissionOutcome::new(option_id))
		}
		None => acp::RequestPermissionOutcome::Cancelled,
	};
	acp::RequestPermissionResponse::new(outcome)
}
