// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event parser for the Anthropic streaming API.

use serde::Deserialize;
use tracing::{debug, trace, warn};
use weft_common_core::{LlmError, LlmEvent, StopReason};
use weft_llm_transport::{ParseState, DEFAULT_RETRY_AFTER_SECS};

/// SSE event types from Anthropic streaming API.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
	#[serde(rename = "message_start")]
	MessageStart { message: MessageStartData },
	#[serde(rename = "content_block_start")]
	ContentBlockStart {
		index: usize,
		content_block: ContentBlockStart,
	},
	#[serde(rename = "content_block_delta")]
	ContentBlockDelta { index: usize, delta: ContentDelta },
	#[serde(rename = "content_block_stop")]
	ContentBlockStop { index: usize },
	#[serde(rename = "message_delta")]
	MessageDelta {
		delta: MessageDeltaData,
		usage: Option<MessageDeltaUsage>,
	},
	#[serde(rename = "message_stop")]
	MessageStop,
	#[serde(rename = "ping")]
	Ping,
	#[serde(rename = "error")]
	Error { error: StreamErrorData },
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageStartData {
	pub id: String,
	pub model: String,
	pub usage: Option<MessageStartUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageStartUsage {
	pub input_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageDeltaUsage {
	pub output_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlockStart {
	Text {
		#[serde(default)]
		text: String,
	},
	Thinking {
		#[serde(default)]
		thinking: String,
	},
	ToolUse {
		id: String,
		name: String,
	},
	#[serde(other)]
	Other,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentDelta {
	TextDelta { text: String },
	ThinkingDelta { thinking: String },
	InputJsonDelta { partial_json: String },
	#[serde(other)]
	Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageDeltaData {
	pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamErrorData {
	#[serde(rename = "type")]
	pub error_type: String,
	pub message: String,
}

fn map_stop_reason(reason: &str) -> StopReason {
	match reason {
		"tool_use" => StopReason::ToolUse,
		"max_tokens" => {
			warn!("response truncated at max_tokens");
			StopReason::Complete
		}
		_ => StopReason::Complete,
	}
}

/// Applies one stream event to `state` and returns the turn events it yields.
pub fn process_stream_event(
	event: StreamEvent,
	state: &mut ParseState,
) -> Result<Vec<LlmEvent>, LlmError> {
	match event {
		StreamEvent::MessageStart { message } => {
			debug!(id = %message.id, model = %message.model, "message started");
			if let Some(usage) = message.usage {
				state.usage.input_tokens = usage.input_tokens;
			}
			Ok(vec![])
		}
		StreamEvent::ContentBlockStart {
			index,
			content_block,
		} => Ok(match content_block {
			ContentBlockStart::Text { text } if !text.is_empty() => {
				vec![LlmEvent::TextDelta { content: text }]
			}
			ContentBlockStart::Thinking { thinking } if !thinking.is_empty() => {
				vec![LlmEvent::ThinkingDelta { content: thinking }]
			}
			ContentBlockStart::ToolUse { id, name } => vec![state.start_tool_use(index, id, name)],
			_ => vec![],
		}),
		StreamEvent::ContentBlockDelta { index, delta } => Ok(match delta {
			ContentDelta::TextDelta { text } => vec![LlmEvent::TextDelta { content: text }],
			ContentDelta::ThinkingDelta { thinking } => {
				vec![LlmEvent::ThinkingDelta { content: thinking }]
			}
			ContentDelta::InputJsonDelta { partial_json } => state
				.push_tool_input(index, &partial_json)
				.into_iter()
				.collect(),
			ContentDelta::Other => vec![],
		}),
		StreamEvent::ContentBlockStop { index } => {
			Ok(state.finish_tool_use(index).into_iter().collect())
		}
		StreamEvent::MessageDelta { delta, usage } => {
			if let Some(reason) = delta.stop_reason {
				debug!(stop_reason = %reason, "message delta with stop reason");
				state.stop_reason = Some(map_stop_reason(&reason));
			}
			if let Some(u) = usage {
				state.usage.output_tokens = u.output_tokens;
			}
			Ok(vec![])
		}
		StreamEvent::MessageStop => {
			debug!("message completed");
			let mut events = state.finish_all();
			events.push(LlmEvent::Usage(state.usage.clone()));
			events.push(LlmEvent::Stop(state.final_stop_reason()));
			Ok(events)
		}
		StreamEvent::Ping => {
			trace!("received ping");
			Ok(vec![])
		}
		StreamEvent::Error { error } => {
			warn!(error_type = %error.error_type, message = %error.message, "stream error event");
			if error.error_type == "rate_limit_error" {
				return Ok(vec![LlmEvent::Stop(StopReason::RateLimit {
					retry_after_secs: DEFAULT_RETRY_AFTER_SECS,
				})]);
			}
			Err(LlmError::Api(error.message))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn feed(state: &mut ParseState, frames: &[serde_json::Value]) -> Vec<LlmEvent> {
		frames
			.iter()
			.flat_map(|f| {
				let event: StreamEvent = serde_json::from_value(f.clone()).unwrap();
				process_stream_event(event, state).unwrap()
			})
			.collect()
	}

	/// **Test: a text-only message ends with Complete**
	#[test]
	fn test_text_message_completes() {
		let mut state = ParseState::new();
		let events = feed(
			&mut state,
			&[
				json!({"type": "message_start", "message": {"id": "m1", "model": "claude", "usage": {"input_tokens": 12}}}),
				json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
				json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hi"}}),
				json!({"type": "content_block_stop", "index": 0}),
				json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 3}}),
				json!({"type": "message_stop"}),
			],
		);
		assert!(matches!(&events[0], LlmEvent::TextDelta { content } if content == "Hi"));
		assert!(matches!(
			&events[1],
			LlmEvent::Usage(u) if u.input_tokens == 12 && u.output_tokens == 3
		));
		assert!(matches!(&events[2], LlmEvent::Stop(StopReason::Complete)));
	}

	/// **Test: tool_use blocks produce start, deltas, done and a ToolUse stop**
	#[test]
	fn test_tool_use_message() {
		let mut state = ParseState::new();
		let events = feed(
			&mut state,
			&[
				json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "toolu_1", "name": "read_file", "input": {}}}),
				json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"path\":"}}),
				json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "\"a.rs\"}"}}),
				json!({"type": "content_block_stop", "index": 1}),
				json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}}),
				json!({"type": "message_stop"}),
			],
		);
		assert!(matches!(&events[0], LlmEvent::ToolUseStart { id, .. } if id == "toolu_1"));
		assert!(matches!(&events[3], LlmEvent::ToolUseDone { input, .. } if input == &json!({"path": "a.rs"})));
		assert!(matches!(events.last(), Some(LlmEvent::Stop(StopReason::ToolUse))));
	}

	#[test]
	fn test_thinking_and_unknown_blocks() {
		let mut state = ParseState::new();
		let events = feed(
			&mut state,
			&[
				json!({"type": "content_block_start", "index": 0, "content_block": {"type": "thinking", "thinking": ""}}),
				json!({"type": "content_block_delta", "index": 0, "delta": {"type": "thinking_delta", "thinking": "let me see"}}),
				json!({"type": "content_block_delta", "index": 0, "delta": {"type": "signature_delta", "signature": "sig"}}),
				json!({"type": "content_block_start", "index": 1, "content_block": {"type": "redacted_thinking", "data": "x"}}),
			],
		);
		assert_eq!(events.len(), 1);
		assert!(matches!(&events[0], LlmEvent::ThinkingDelta { content } if content == "let me see"));
	}

	#[test]
	fn test_error_events() {
		let mut state = ParseState::new();
		let overloaded: StreamEvent = serde_json::from_value(
			json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}),
		)
		.unwrap();
		assert!(matches!(
			process_stream_event(overloaded, &mut state),
			Err(LlmError::Api(message)) if message == "Overloaded"
		));

		let limited: StreamEvent = serde_json::from_value(
			json!({"type": "error", "error": {"type": "rate_limit_error", "message": "slow down"}}),
		)
		.unwrap();
		let events = process_stream_event(limited, &mut state).unwrap();
		assert!(matches!(
			events[0],
			LlmEvent::Stop(StopReason::RateLimit { retry_after_secs: DEFAULT_RETRY_AFTER_SECS })
		));
	}
}
