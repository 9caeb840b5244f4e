// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Anthropic-specific API types and conversions.

use serde::{Deserialize, Serialize};
use weft_common_core::{ContentBlock, HistoryMessage, LlmRequest, MessageContent, Role, ToolUseState};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 8192;

/// Configuration for the Anthropic dialect.
#[derive(Clone, Debug)]
pub struct AnthropicConfig {
	pub api_key: String,
	pub base_url: String,
	pub model: String,
}

impl AnthropicConfig {
	pub fn new(api_key: impl Into<String>) -> Self {
		Self {
			api_key: api_key.into(),
			base_url: DEFAULT_BASE_URL.to_string(),
			model: "claude-sonnet-4-20250514".to_string(),
		}
	}

	pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
		self.base_url = base_url.into();
		self
	}

	pub fn with_model(mut self, model: impl Into<String>) -> Self {
		self.model = model.into();
		self
	}
}

/// Anthropic Messages API request.
#[derive(Debug, Clone, Serialize)]
pub struct AnthropicRequest {
	pub model: String,
	pub messages: Vec<AnthropicMessage>,
	pub max_tokens: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub system: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tools: Option<Vec<AnthropicTool>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stream: Option<bool>,
}

/// A message in the Anthropic conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMessage {
	pub role: String,
	pub content: AnthropicMessageContent,
}

/// Content can be a string or a list of content blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnthropicMessageContent {
	Text(String),
	Blocks(Vec<AnthropicContent>),
}

impl AnthropicMessageContent {
	fn into_blocks(self) -> Vec<AnthropicContent> {
		match self {
			Self::Text(text) => vec![AnthropicContent::Text { text }],
			Self::Blocks(blocks) => blocks,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicContent {
	Text {
		text: String,
	},
	Thinking {
		thinking: String,
		signature: String,
	},
	ToolUse {
		id: String,
		name: String,
		input: serde_json::Value,
	},
	ToolResult {
		tool_use_id: String,
		content: String,
		#[serde(skip_serializing_if = "Option::is_none")]
		is_error: Option<bool>,
	},
}

/// Tool definition for Anthropic API.
#[derive(Debug, Clone, Serialize)]
pub struct AnthropicTool {
	pub name: String,
	pub description: String,
	pub input_schema: serde_json::Value,
}

/// Non-streaming response from the Messages API.
#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicResponse {
	pub id: String,
	pub content: Vec<AnthropicResponseContent>,
	pub model: String,
	pub stop_reason: Option<String>,
	pub usage: AnthropicUsage,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicResponseContent {
	Text {
		text: String,
	},
	Thinking {
		thinking: String,
	},
	ToolUse {
		id: String,
		name: String,
		input: serde_json::Value,
	},
	#[serde(other)]
	Unknown,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnthropicUsage {
	#[serde(default)]
	pub input_tokens: u32,
	#[serde(default)]
	pub output_tokens: u32,
}

/// Error response from Anthropic API.
#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicError {
	#[serde(rename = "type")]
	pub error_type: String,
	pub error: AnthropicErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicErrorDetail {
	#[serde(rename = "type")]
	pub error_type: String,
	pub message: String,
}

fn convert_blocks(blocks: &[ContentBlock]) -> Vec<AnthropicContent> {
	blocks
		.iter()
		.filter_map(|block| match block {
			ContentBlock::Text { text } if !text.is_empty() => {
				Some(AnthropicContent::Text { text: text.clone() })
			}
			ContentBlock::Text { .. } => None,
			// Unsigned thinking is rejected on replay.
			ContentBlock::Thinking {
				thinking,
				signature: Some(signature),
			} => Some(AnthropicContent::Thinking {
				thinking: thinking.clone(),
				signature: signature.clone(),
			}),
			ContentBlock::Thinking { .. } => None,
			ContentBlock::ToolUse {
				id,
				name,
				input,
				state: ToolUseState::Generated,
			} => Some(AnthropicContent::ToolUse {
				id: id.clone(),
				name: name.clone(),
				input: input.clone(),
			}),
			ContentBlock::ToolUse { .. } => None,
			ContentBlock::ToolResult {
				tool_use_id,
				content,
				is_error,
				..
			} => Some(AnthropicContent::ToolResult {
				tool_use_id: tool_use_id.clone(),
				content: content.clone(),
				is_error: is_error.then_some(true),
			}),
		})
		.collect()
}

fn convert_message(msg: &HistoryMessage) -> Option<AnthropicMessage> {
	let role = match msg.role {
		Role::User => "user",
		Role::Assistant => "assistant",
	};
	let content = match &msg.content {
		MessageContent::Text(text) if text.is_empty() => return None,
		MessageContent::Text(text) => AnthropicMessageContent::Text(text.clone()),
		MessageContent::Blocks(blocks) => {
			let blocks = convert_blocks(blocks);
			if blocks.is_empty() {
				return None;
			}
			AnthropicMessageContent::Blocks(blocks)
		}
	};
	Some(AnthropicMessage {
		role: role.to_string(),
		content,
	})
}

/// Folds consecutive same-role messages into one; the API requires
/// alternating roles.
fn merge_consecutive(messages: Vec<AnthropicMessage>) -> Vec<AnthropicMessage> {
	let mut merged: Vec<AnthropicMessage> = Vec::with_capacity(messages.len());
	for msg in messages {
		match merged.last_mut() {
			Some(last) if last.role == msg.role => {
				let mut blocks = std::mem::replace(
					&mut last.content,
					AnthropicMessageContent::Blocks(Vec::new()),
				)
				.into_blocks();
				blocks.extend(msg.content.into_blocks());
				last.content = AnthropicMessageContent::Blocks(blocks);
			}
			_ => merged.push(msg),
		}
	}
	merged
}

impl From<&LlmRequest> for AnthropicRequest {
	fn from(req: &LlmRequest) -> Self {
		let messages = merge_consecutive(req.messages.iter().filter_map(convert_message).collect());

		let tools = if req.tools.is_empty() {
			None
		} else {
			Some(
				req
					.tools
					.iter()
					.map(|t| AnthropicTool {
						name: t.name.clone(),
						description: t.description.clone(),
						input_schema: t.input_schema.clone(),
					})
					.collect(),
			)
		};

		Self {
			model: req.model.clone(),
			messages,
			max_tokens: req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
			system: (!req.system_prompt.is_empty()).then(|| req.system_prompt.clone()),
			temperature: req.temperature,
			tools,
			stream: Some(true),
		}
	}
}
