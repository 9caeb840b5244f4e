// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Conversation history message types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable key of a history message.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
	pub fn new() -> Self {
		Self(uuid::Uuid::new_v4().to_string())
	}

	/// Create a MessageId from an existing string without validation.
	pub fn from_string(s: impl Into<String>) -> Self {
		Self(s.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Default for MessageId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for MessageId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Identifier of one request/response cycle.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(String);

impl TurnId {
	pub fn new() -> Self {
		Self(format!("turn-{}", uuid::Uuid::new_v4()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Default for TurnId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for TurnId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Role of a message participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	User,
	Assistant,
}

/// Whether a tool_use input is still streaming in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolUseState {
	Generating,
	Generated,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
	Text {
		text: String,
	},
	Thinking {
		thinking: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		signature: Option<String>,
	},
	ToolUse {
		id: String,
		name: String,
		input: serde_json::Value,
		state: ToolUseState,
	},
	ToolResult {
		tool_use_id: String,
		content: String,
		#[serde(default)]
		is_error: bool,
		#[serde(default)]
		is_user_declined: bool,
	},
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
	Text(String),
	Blocks(Vec<ContentBlock>),
}

impl MessageContent {
	/// Returns the content blocks; plain text is not a block list.
	pub fn blocks(&self) -> &[ContentBlock] {
		match self {
			MessageContent::Text(_) => &[],
			MessageContent::Blocks(blocks) => blocks,
		}
	}
}

fn default_true() -> bool {
	true
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFlags {
	#[serde(default = "default_true")]
	pub visible: bool,
	#[serde(default)]
	pub is_context: bool,
	#[serde(default)]
	pub is_user_submission: bool,
	/// Shown to the user, never replayed into a prompt.
	#[serde(default)]
	pub just_for_display: bool,
	/// A tool_use currently being executed.
	#[serde(default)]
	pub is_calling: bool,
}

impl Default for MessageFlags {
	fn default() -> Self {
		Self {
			visible: true,
			is_context: false,
			is_user_submission: false,
			just_for_display: false,
			is_calling: false,
		}
	}
}

/// Owned view of a tool_use block and the message carrying it.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolUseRef {
	pub message_id: MessageId,
	pub id: String,
	pub name: String,
	pub input: serde_json::Value,
	pub state: ToolUseState,
}

/// A message in the conversation history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
	pub id: MessageId,
	pub role: Role,
	pub content: MessageContent,
	pub timestamp: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub turn_id: Option<TurnId>,
	#[serde(default)]
	pub flags: MessageFlags,
}

impl HistoryMessage {
	fn build(role: Role, content: MessageContent, turn_id: Option<TurnId>) -> Self {
		Self {
			id: MessageId::new(),
			role,
			content,
			timestamp: Utc::now(),
			turn_id,
			flags: MessageFlags::default(),
		}
	}

	/// A message typed by the user.
	pub fn user(text: impl Into<String>) -> Self {
		let mut msg = Self::build(Role::User, MessageContent::Text(text.into()), None);
		msg.flags.is_user_submission = true;
		msg
	}

	/// A user-role context block (project context, diagnostics, reminders).
	pub fn context(text: impl Into<String>) -> Self {
		let mut msg = Self::build(Role::User, MessageContent::Text(text.into()), None);
		msg.flags.is_context = true;
		msg.flags.visible = false;
		msg
	}

	pub fn assistant(text: impl Into<String>) -> Self {
		Self::build(Role::Assistant, MessageContent::Text(text.into()), None)
	}

	pub fn assistant_blocks(turn_id: Option<TurnId>, blocks: Vec<ContentBlock>) -> Self {
		Self::build(Role::Assistant, MessageContent::Blocks(blocks), turn_id)
	}

	pub fn tool_use(
		turn_id: Option<TurnId>,
		id: impl Into<String>,
		name: impl Into<String>,
		input: serde_json::Value,
		state: ToolUseState,
	) -> Self {
		Self::assistant_blocks(
			turn_id,
			vec![ContentBlock::ToolUse {
				id: id.into(),
				name: name.into(),
				input,
				state,
			}],
		)
	}

	pub fn tool_result(
		turn_id: Option<TurnId>,
		tool_use_id: impl Into<String>,
		content: impl Into<String>,
		is_error: bool,
		is_user_declined: bool,
	) -> Self {
		Self::build(
			Role::User,
			MessageContent::Blocks(vec![ContentBlock::ToolResult {
				tool_use_id: tool_use_id.into(),
				content: content.into(),
				is_error,
				is_user_declined,
			}]),
			turn_id,
		)
	}

	/// An assistant notice shown to the user but never sent to the model.
	pub fn display_notice(turn_id: Option<TurnId>, text: impl Into<String>) -> Self {
		let mut msg = Self::build(Role::Assistant, MessageContent::Text(text.into()), turn_id);
		msg.flags.just_for_display = true;
		msg
	}

	pub fn with_id(mut self, id: MessageId) -> Self {
		self.id = id;
		self
	}

	pub fn blocks(&self) -> &[ContentBlock] {
		self.content.blocks()
	}

	/// Concatenated text content, ignoring thinking and tool blocks.
	pub fn text(&self) -> String {
		match &self.content {
			MessageContent::Text(text) => text.clone(),
			MessageContent::Blocks(blocks) => blocks
				.iter()
				.filter_map(|b| match b {
					ContentBlock::Text { text } => Some(text.as_str()),
					_ => None,
				})
				.collect::<Vec<_>>()
				.join(""),
		}
	}

	pub fn is_replayable(&self) -> bool {
		!self.flags.just_for_display
	}

	pub fn tool_uses(&self) -> Vec<ToolUseRef> {
		self
			.blocks()
			.iter()
			.filter_map(|b| match b {
				ContentBlock::ToolUse {
					id,
					name,
					input,
					state,
				} => Some(ToolUseRef {
					message_id: self.id.clone(),
					id: id.clone(),
					name: name.clone(),
					input: input.clone(),
					state: *state,
				}),
				_ => None,
			})
			.collect()
	}

	pub fn tool_result_ids(&self) -> Vec<&str> {
		self
			.blocks()
			.iter()
			.filter_map(|b| match b {
				ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
				_ => None,
			})
			.collect()
	}

	pub fn has_tool_use(&self) -> bool {
		self
			.blocks()
			.iter()
			.any(|b| matches!(b, ContentBlock::ToolUse { .. }))
	}

	pub fn has_tool_result(&self) -> bool {
		self
			.blocks()
			.iter()
			.any(|b| matches!(b, ContentBlock::ToolResult { .. }))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	/// **Property: flags default to a visible, replayable message**
	#[test]
	fn test_flags_default_visible() {
		let flags = MessageFlags::default();
		assert!(flags.visible);
		assert!(!flags.just_for_display);

		let parsed: MessageFlags = serde_json::from_str("{}").unwrap();
		assert_eq!(parsed, flags);
	}

	#[test]
	fn test_display_notice_is_not_replayable() {
		let notice = HistoryMessage::display_notice(None, "request cancelled");
		assert!(!notice.is_replayable());
		assert_eq!(notice.role, Role::Assistant);
	}

	/// **Test: content blocks serialize with a snake_case type tag**
	#[test]
	fn test_tool_use_block_serialization() {
		let msg = HistoryMessage::tool_use(
			None,
			"toolu_1",
			"read_file",
			serde_json::json!({"path": "a.rs"}),
			ToolUseState::Generated,
		);
		let json = serde_json::to_value(&msg).unwrap();
		assert_eq!(json["content"][0]["type"], "tool_use");
		assert_eq!(json["content"][0]["state"], "generated");

		let back: HistoryMessage = serde_json::from_value(json).unwrap();
		assert_eq!(back, msg);
	}

	#[test]
	fn test_text_skips_non_text_blocks() {
		let msg = HistoryMessage::assistant_blocks(
			None,
			vec![
				ContentBlock::Thinking {
					thinking: "hmm".to_string(),
					signature: None,
				},
				ContentBlock::Text {
					text: "Hello".to_string(),
				},
			],
		);
		assert_eq!(msg.text(), "Hello");
	}

	#[test]
	fn test_tool_result_ids() {
		let msg = HistoryMessage::tool_result(None, "toolu_9", "ok", false, false);
		assert_eq!(msg.tool_result_ids(), vec!["toolu_9"]);
		assert!(msg.has_tool_result());
		assert!(!msg.has_tool_use());
	}
}
