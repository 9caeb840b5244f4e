// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! OpenAI-specific API types and conversions.

use serde::{Deserialize, Serialize};
use weft_common_core::{ContentBlock, HistoryMessage, LlmRequest, MessageContent, Role, ToolUseState};

/// Configuration for the OpenAI dialect.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
	pub api_key: String,
	pub base_url: String,
	pub model: String,
	pub organization: Option<String>,
}

impl OpenAIConfig {
	pub fn new(api_key: impl Into<String>) -> Self {
		Self {
			api_key: api_key.into(),
			base_url: "https://api.openai.com/v1".to_string(),
			model: "gpt-4o".to_string(),
			organization: None,
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

	pub fn with_organization(mut self, org: impl Into<String>) -> Self {
		self.organization = Some(org.into());
		self
	}
}

/// OpenAI chat completion request.
#[derive(Debug, Clone, Serialize)]
pub struct OpenAIRequest {
	pub model: String,
	pub messages: Vec<OpenAIMessage>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f32>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub tools: Vec<OpenAITool>,
	#[serde(skip_serializing_if = "std::ops::Not::not")]
	pub stream: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stream_options: Option<StreamOptions>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamOptions {
	pub include_usage: bool,
}

/// OpenAI message format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAIMessage {
	pub role: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub content: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_call_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_calls: Option<Vec<OpenAIToolCall>>,
}

/// OpenAI tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIToolCall {
	pub id: String,
	#[serde(rename = "type")]
	pub call_type: String,
	pub function: OpenAIFunctionCall,
}

/// OpenAI function call details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIFunctionCall {
	pub name: String,
	pub arguments: String,
}

/// OpenAI tool definition.
#[derive(Debug, Clone, Serialize)]
pub struct OpenAITool {
	#[serde(rename = "type")]
	pub tool_type: String,
	pub function: OpenAIFunction,
}

/// OpenAI function definition.
#[derive(Debug, Clone, Serialize)]
pub struct OpenAIFunction {
	pub name: String,
	pub description: String,
	pub parameters: serde_json::Value,
}

/// OpenAI chat completion response.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIResponse {
	pub id: String,
	pub model: String,
	pub choices: Vec<OpenAIChoice>,
	#[serde(default)]
	pub usage: Option<OpenAIUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIChoice {
	pub message: OpenAIMessage,
	pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIUsage {
	pub prompt_tokens: u32,
	pub completion_tokens: u32,
}

/// OpenAI streaming chunk.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIStreamChunk {
	#[serde(default)]
	pub id: String,
	#[serde(default)]
	pub choices: Vec<OpenAIStreamChoice>,
	#[serde(default)]
	pub usage: Option<OpenAIUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIStreamChoice {
	#[serde(default)]
	pub delta: OpenAIDelta,
	pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct OpenAIDelta {
	#[serde(default)]
	pub content: Option<String>,
	/// Reasoning text some compatible servers stream separately.
	#[serde(default)]
	pub reasoning_content: Option<String>,
	#[serde(default)]
	pub tool_calls: Option<Vec<OpenAIToolCallDelta>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIToolCallDelta {
	pub index: u32,
	#[serde(default)]
	pub id: Option<String>,
	#[serde(default)]
	pub function: Option<OpenAIFunctionDelta>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct OpenAIFunctionDelta {
	#[serde(default)]
	pub name: Option<String>,
	#[serde(default)]
	pub arguments: Option<String>,
}

/// OpenAI API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIError {
	pub error: OpenAIErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIErrorDetail {
	pub message: String,
	#[serde(rename = "type")]
	pub error_type: Option<String>,
	pub code: Option<String>,
}

/// Converts one history message; tool results become separate `tool` messages.
fn convert_message(msg: &HistoryMessage) -> Vec<OpenAIMessage> {
	let blocks = match &msg.content {
		MessageContent::Text(text) => {
			let role = match msg.role {
				Role::User => "user",
				Role::Assistant => "assistant",
			};
			return vec![OpenAIMessage {
				role: role.to_string(),
				content: Some(text.clone()),
				..Default::default()
			}];
		}
		MessageContent::Blocks(blocks) => blocks,
	};

	let mut out = Vec::new();
	let mut text = String::new();
	let mut tool_calls = Vec::new();

	for block in blocks {
		match block {
			ContentBlock::Text { text: t } => text.push_str(t),
			ContentBlock::Thinking { .. } => {}
			ContentBlock::ToolUse {
				id,
				name,
				input,
				state: ToolUseState::Generated,
			} => tool_calls.push(OpenAIToolCall {
				id: id.clone(),
				call_type: "function".to_string(),
				function: OpenAIFunctionCall {
					name: name.clone(),
					arguments: input.to_string(),
				},
			}),
			ContentBlock::ToolUse { .. } => {}
			ContentBlock::ToolResult {
				tool_use_id,
				content,
				..
			} => out.push(OpenAIMessage {
				role: "tool".to_string(),
				content: Some(content.clone()),
				tool_call_id: Some(tool_use_id.clone()),
				..Default::default()
			}),
		}
	}

	if !text.is_empty() || !tool_calls.is_empty() {
		let role = match msg.role {
			Role::User => "user",
			Role::Assistant => "assistant",
		};
		out.insert(
			0,
			OpenAIMessage {
				role: role.to_string(),
				content: (!text.is_empty()).then_some(text),
				tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
				..Default::default()
			},
		);
	}
	out
}

/// Joins an assistant message carrying only tool calls into the previous
/// assistant message, so parallel calls travel in one message.
fn merge_tool_calls(messages: Vec<OpenAIMessage>) -> Vec<OpenAIMessage> {
	let mut merged: Vec<OpenAIMessage> = Vec::with_capacity(messages.len());
	for msg in messages {
		if let Some(last) = merged.last_mut() {
			if last.role == "assistant" && msg.role == "assistant" && msg.content.is_none() {
				if let Some(calls) = msg.tool_calls {
					last.tool_calls.get_or_insert_with(Vec::new).extend(calls);
					continue;
				}
			}
		}
		merged.push(msg);
	}
	merged
}

impl From<&LlmRequest> for OpenAIRequest {
	fn from(req: &LlmRequest) -> Self {
		let mut messages = Vec::new();
		if !req.system_prompt.is_empty() {
			messages.push(OpenAIMessage {
				role: "system".to_string(),
				content: Some(req.system_prompt.clone()),
				..Default::default()
			});
		}
		messages.extend(req.messages.iter().flat_map(convert_message));

		Self {
			model: req.model.clone(),
			messages: merge_tool_calls(messages),
			max_tokens: req.max_tokens,
			temperature: req.temperature,
			tools: req
				.tools
				.iter()
				.map(|t| OpenAITool {
					tool_type: "function".to_string(),
					function: OpenAIFunction {
						name: t.name.clone(),
						description: t.description.clone(),
						parameters: t.input_schema.clone(),
					},
				})
				.collect(),
			stream: true,
			stream_options: Some(StreamOptions {
				include_usage: true,
			}),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	/// **Test: tool calls and tool results map to the chat completions shape**
	#[test]
	fn test_tool_round_trip_shape() {
		let request = LlmRequest::new("gpt-4o")
			.with_system_prompt("sys")
			.with_messages(vec![
				HistoryMessage::user("list files"),
				HistoryMessage::tool_use(None, "call_1", "ls", json!({"dir": "."}), ToolUseState::Generated),
				HistoryMessage::tool_use(None, "call_2", "ls", json!({"dir": "src"}), ToolUseState::Generated),
				HistoryMessage::tool_result(None, "call_1", "a\nb", false, false),
				HistoryMessage::tool_result(None, "call_2", "c", false, false),
			]);

		let converted = OpenAIRequest::from(&request);
		let roles: Vec<&str> = converted.messages.iter().map(|m| m.role.as_str()).collect();
		assert_eq!(roles, vec!["system", "user", "assistant", "tool", "tool"]);
		assert_eq!(converted.messages[2].tool_calls.as_ref().unwrap().len(), 2);
		assert_eq!(converted.messages[3].tool_call_id.as_deref(), Some("call_1"));
		let json = serde_json::to_value(&converted).unwrap();
		assert_eq!(json["stream"], true);
		assert_eq!(
			json["messages"][2]["tool_calls"][0]["function"]["arguments"],
			"{\"dir\":\".\"}"
		);
	}

	#[test]
	fn test_generating_tool_use_is_skipped() {
		let msg = HistoryMessage::tool_use(None, "c", "ls", json!({}), ToolUseState::Generating);
		assert!(convert_message(&msg).is_empty());
	}
}
