// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Contract between the transport and a provider dialect.

use std::collections::BTreeMap;

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use tracing::{debug, warn};
use weft_common_core::{LlmError, LlmEvent, LlmRequest, StopReason, Usage};

use crate::sse::SseFrame;

/// Provider-specific HTTP request for one turn.
#[derive(Clone, Debug)]
pub struct RequestSpec {
	pub url: String,
	pub headers: Vec<(String, String)>,
	pub body: serde_json::Value,
	/// Whether the response arrives as a framed stream.
	pub stream: bool,
}

/// Tool input accumulating across deltas.
#[derive(Clone, Debug, Default)]
pub struct PartialToolUse {
	pub id: String,
	pub name: String,
	pub arguments_json: String,
}

/// Per-turn accumulator an adapter threads through [`ProviderAdapter::parse_event`].
#[derive(Debug, Default)]
pub struct ParseState {
	pub tool_uses: BTreeMap<usize, PartialToolUse>,
	/// Provider stop reason seen before the final frame.
	pub stop_reason: Option<StopReason>,
	pub usage: Usage,
	pub saw_tool_use: bool,
}

impl ParseState {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn start_tool_use(
		&mut self,
		index: usize,
		id: impl Into<String>,
		name: impl Into<String>,
	) -> LlmEvent {
		let (id, name) = (id.into(), name.into());
		debug!(index, id = %id, name = %name, "tool use started");
		self.saw_tool_use = true;
		self.tool_uses.insert(
			index,
			PartialToolUse {
				id: id.clone(),
				name: name.clone(),
				arguments_json: String::new(),
			},
		);
		LlmEvent::ToolUseStart { index, id, name }
	}

	pub fn push_tool_input(&mut self, index: usize, fragment: &str) -> Option<LlmEvent> {
		let Some(builder) = self.tool_uses.get_mut(&index) else {
			warn!(index, "received tool delta for unknown content block");
			return None;
		};
		builder.arguments_json.push_str(fragment);
		Some(LlmEvent::ToolUseDelta {
			index,
			partial_json: fragment.to_string(),
		})
	}

	pub fn finish_tool_use(&mut self, index: usize) -> Option<LlmEvent> {
		let builder = self.tool_uses.remove(&index)?;
		let mut input: serde_json::Value = serde_json::from_str(&builder.arguments_json)
			.unwrap_or_else(|e| {
				if !builder.arguments_json.is_empty() {
					warn!(
						index,
						id = %builder.id,
						name = %builder.name,
						error = %e,
						raw = %builder.arguments_json,
						"failed to parse tool arguments JSON, defaulting to empty object"
					);
				}
				serde_json::Value::Object(serde_json::Map::new())
			});
		if input.is_null() {
			input = serde_json::Value::Object(serde_json::Map::new());
		}
		debug!(index, id = %builder.id, name = %builder.name, "tool use completed");
		Some(LlmEvent::ToolUseDone {
			index,
			id: builder.id,
			name: builder.name,
			input,
		})
	}

	/// Closes every tool use still open.
	pub fn finish_all(&mut self) -> Vec<LlmEvent> {
		let indexes: Vec<usize> = self.tool_uses.keys().copied().collect();
		indexes
			.into_iter()
			.filter_map(|i| self.finish_tool_use(i))
			.collect()
	}

	/// Stop reason to report when the stream ends without an explicit one.
	pub fn final_stop_reason(&mut self) -> StopReason {
		self.stop_reason.take().unwrap_or(if self.saw_tool_use {
			StopReason::ToolUse
		} else {
			StopReason::Complete
		})
	}
}

/// One provider dialect: request shape, stream parsing and error mapping.
///
/// `parse_event` may emit [`LlmEvent::Stop`]; the transport stops reading
/// after the first one.
pub trait ProviderAdapter: Send + Sync {
	fn name(&self) -> &str;

	fn build_request(&self, request: &LlmRequest) -> Result<RequestSpec, LlmError>;

	fn parse_event(
		&self,
		frame: &SseFrame,
		state: &mut ParseState,
	) -> Result<Vec<LlmEvent>, LlmError>;

	/// Providers that only answer with a complete body.
	fn is_streaming_disabled(&self) -> bool {
		false
	}

	/// Parses a complete non-streaming response body.
	fn parse_response(&self, body: &str, state: &mut ParseState) -> Result<Vec<LlmEvent>, LlmError> {
		self.parse_event(&SseFrame::data(body), state)
	}

	/// Maps a non-429 error status to the error reported in the stop event.
	fn on_http_error(&self, status: StatusCode, body: &str) -> LlmError {
		LlmError::HttpStatus {
			status: status.as_u16(),
			body: body.to_string(),
		}
	}

	/// Seconds to wait after a 429 when no `Retry-After` header is present.
	fn rate_limit_sleep_hint(&self, _headers: &HeaderMap, _body: &str) -> Option<u64> {
		None
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	/// **Test: tool input assembled from fragments parses into an object**
	#[test]
	fn test_tool_use_accumulates_fragments() {
		let mut state = ParseState::new();
		state.start_tool_use(0, "toolu_1", "read_file");
		state.push_tool_input(0, "{\"path\":");
		state.push_tool_input(0, "\"src/lib.rs\"}");
		match state.finish_tool_use(0) {
			Some(LlmEvent::ToolUseDone { id, input, .. }) => {
				assert_eq!(id, "toolu_1");
				assert_eq!(input, json!({"path": "src/lib.rs"}));
			}
			other => panic!("unexpected {other:?}"),
		}
		assert_eq!(state.final_stop_reason(), StopReason::ToolUse);
	}

	#[test]
	fn test_empty_or_broken_input_defaults_to_object() {
		let mut state = ParseState::new();
		state.start_tool_use(2, "t", "x");
		state.push_tool_input(2, "{\"broken");
		let events = state.finish_all();
		assert!(matches!(
			&events[0],
			LlmEvent::ToolUseDone { input, .. } if input == &json!({})
		));
		assert!(state.tool_uses.is_empty());
	}

	#[test]
	fn test_delta_for_unknown_index_is_ignored() {
		let mut state = ParseState::new();
		assert!(state.push_tool_input(5, "{}").is_none());
		assert_eq!(state.final_stop_reason(), StopReason::Complete);
	}
}
