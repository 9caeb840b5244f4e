// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Chunk parser for OpenAI streaming responses.

use tracing::{debug, trace, warn};
use weft_common_core::{LlmError, LlmEvent, StopReason};
use weft_llm_transport::ParseState;

use crate::types::{OpenAIError, OpenAIStreamChunk};

pub(crate) fn map_finish_reason(reason: &str) -> StopReason {
	match reason {
		"tool_calls" | "function_call" => StopReason::ToolUse,
		"length" => {
			warn!("response truncated at max_tokens");
			StopReason::Complete
		}
		_ => StopReason::Complete,
	}
}

/// Final events once the `[DONE]` marker arrives.
pub(crate) fn finish(state: &mut ParseState) -> Vec<LlmEvent> {
	debug!("received [DONE] marker");
	let mut events = state.finish_all();
	events.push(LlmEvent::Usage(state.usage.clone()));
	events.push(LlmEvent::Stop(state.final_stop_reason()));
	events
}

/// Applies one `data:` payload to `state`.
pub fn process_chunk(data: &str, state: &mut ParseState) -> Result<Vec<LlmEvent>, LlmError> {
	let data = data.trim();
	if data == "[DONE]" {
		return Ok(finish(state));
	}

	let chunk = match serde_json::from_str::<OpenAIStreamChunk>(data) {
		Ok(chunk) => chunk,
		Err(e) => {
			if let Ok(error_response) = serde_json::from_str::<OpenAIError>(data) {
				warn!(
						error_type = ?error_response.error.error_type,
						message = %error_response.error.message,
						"OpenAI API error in stream"
				);
				return Err(LlmError::Api(error_response.error.message));
			}
			warn!(error = %e, data = data, "failed to parse stream chunk");
			return Ok(vec![]);
		}
	};

	let mut events = Vec::new();
	if let Some(u) = chunk.usage {
		state.usage.input_tokens = u.prompt_tokens;
		state.usage.output_tokens = u.completion_tokens;
	}

	for choice in chunk.choices {
		if let Some(reasoning) = choice.delta.reasoning_content.filter(|r| !r.is_empty()) {
			events.push(LlmEvent::ThinkingDelta { content: reasoning });
		}
		if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
			events.push(LlmEvent::TextDelta { content });
		}
		for delta in choice.delta.tool_calls.unwrap_or_default() {
			let index = delta.index as usize;
			let function = delta.function.unwrap_or_default();
			if let Some(id) = delta.id {
				let name = function.name.clone().unwrap_or_default();
				events.push(state.start_tool_use(index, id, name));
			} else if let Some(name) = &function.name {
				if let Some(open) = state.tool_uses.get_mut(&index) {
					open.name = name.clone();
				}
			}
			if let Some(args) = function.arguments.filter(|a| !a.is_empty()) {
				events.extend(state.push_tool_input(index, &args));
			}
		}
		if let Some(reason) = choice.finish_reason {
			trace!(finish_reason = %reason, "stream finish reason received");
			state.stop_reason = Some(map_finish_reason(&reason));
		}
	}

	Ok(events)
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn chunk(delta: serde_json::Value, finish: Option<&str>) -> String {
		json!({"id": "1", "choices": [{"index": 0, "delta": delta, "finish_reason": finish}]}).to_string()
	}

	/// Tests that text content deltas are emitted and the stream completes
	/// on the [DONE] marker.
	#[test]
	fn test_stream_text_delta() {
		let mut state = ParseState::new();
		let mut events = Vec::new();
		events.extend(process_chunk(&chunk(json!({"content": "Hello"}), None), &mut state).unwrap());
		events.extend(process_chunk(&chunk(json!({"content": " world"}), Some("stop")), &mut state).unwrap());
		events.extend(process_chunk("[DONE]", &mut state).unwrap());

		assert!(matches!(&events[0], LlmEvent::TextDelta { content } if content == "Hello"));
		assert!(matches!(&events[1], LlmEvent::TextDelta { content } if content == " world"));
		assert!(matches!(events.last(), Some(LlmEvent::Stop(StopReason::Complete))));
	}

	/// **Test: tool call fragments accumulate by index**
	#[test]
	fn test_stream_tool_calls() {
		let mut state = ParseState::new();
		let mut events = Vec::new();
		events.extend(
			process_chunk(
				&chunk(
					json!({"tool_calls": [{"index": 0, "id": "call_1", "type": "function", "function": {"name": "ls", "arguments": ""}}]}),
					None,
				),
				&mut state,
			)
			.unwrap(),
		);
		events.extend(
			process_chunk(
				&chunk(json!({"tool_calls": [{"index": 0, "function": {"arguments": "{\"dir\":"}}]}), None),
				&mut state,
			)
			.unwrap(),
		);
		events.extend(
			process_chunk(
				&chunk(json!({"tool_calls": [{"index": 0, "function": {"arguments": "\"src\"}"}}]}), Some("tool_calls")),
				&mut state,
			)
			.unwrap(),
		);
		events.extend(process_chunk("[DONE]", &mut state).unwrap());

		assert!(matches!(&events[0], LlmEvent::ToolUseStart { id, name, .. } if id == "call_1" && name == "ls"));
		assert!(events.iter().any(|e| matches!(
			e,
			LlmEvent::ToolUseDone { input, .. } if input == &json!({"dir": "src"})
		)));
		assert!(matches!(events.last(), Some(LlmEvent::Stop(StopReason::ToolUse))));
	}

	#[test]
	fn test_usage_chunk_and_error_payload() {
		let mut state = ParseState::new();
		let usage = json!({"id": "1", "choices": [], "usage": {"prompt_tokens": 10, "completion_tokens": 4}});
		process_chunk(&usage.to_string(), &mut state).unwrap();
		assert_eq!(state.usage.input_tokens, 10);

		let err = process_chunk(r#"{"error":{"message":"boom","type":"server_error","code":null}}"#, &mut state);
		assert!(matches!(err, Err(LlmError::Api(m)) if m == "boom"));
	}
}
