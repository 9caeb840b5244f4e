// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use reqwest::StatusCode;
use tracing::{debug, warn};
use weft_common_core::{LlmError, LlmEvent, LlmRequest};
use weft_llm_transport::{ParseState, ProviderAdapter, RequestSpec, SseFrame};

use crate::stream::{process_stream_event, StreamEvent};
use crate::types::{AnthropicConfig, AnthropicError, AnthropicRequest, AnthropicResponse, AnthropicResponseContent};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// [`ProviderAdapter`] for the Anthropic Messages API.
pub struct AnthropicAdapter {
	config: AnthropicConfig,
	disable_stream: bool,
}

impl AnthropicAdapter {
	pub fn new(config: AnthropicConfig) -> Self {
		Self {
			config,
			disable_stream: false,
		}
	}

	pub fn with_disable_stream(mut self, disable_stream: bool) -> Self {
		self.disable_stream = disable_stream;
		self
	}

	fn messages_url(&self) -> String {
		format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'))
	}
}

impl ProviderAdapter for AnthropicAdapter {
	fn name(&self) -> &str {
		"anthropic"
	}

	fn build_request(&self, request: &LlmRequest) -> Result<RequestSpec, LlmError> {
		let mut body = AnthropicRequest::from(request);
		if body.model.is_empty() {
			body.model = self.config.model.clone();
		}
		body.stream = Some(!self.disable_stream);
		debug!(model = %body.model, messages = body.messages.len(), "built anthropic request");

		let body = serde_json::to_value(&body)
			.map_err(|e| LlmError::InvalidResponse(format!("failed to encode request: {e}")))?;

		Ok(RequestSpec {
			url: self.messages_url(),
			headers: vec![
				("x-api-key".to_string(), self.config.api_key.clone()),
				("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string()),
			],
			body,
			stream: !self.disable_stream,
		})
	}

	fn parse_event(
		&self,
		frame: &SseFrame,
		state: &mut ParseState,
	) -> Result<Vec<LlmEvent>, LlmError> {
		let event: StreamEvent = match serde_json::from_str(&frame.data) {
			Ok(event) => event,
			Err(e) => {
				warn!(error = %e, event = ?frame.event, data = %frame.data, "failed to parse SSE event");
				return Ok(vec![]);
			}
		};
		process_stream_event(event, state)
	}

	fn is_streaming_disabled(&self) -> bool {
		self.disable_stream
	}

	fn parse_response(&self, body: &str, state: &mut ParseState) -> Result<Vec<LlmEvent>, LlmError> {
		let response: AnthropicResponse = serde_json::from_str(body)
			.map_err(|e| LlmError::InvalidResponse(format!("failed to parse response: {e}")))?;
		debug!(id = %response.id, model = %response.model, "parsed non-streaming response");

		state.usage.input_tokens = response.usage.input_tokens;
		state.usage.output_tokens = response.usage.output_tokens;

		let mut events = Vec::new();
		for (index, block) in response.content.into_iter().enumerate() {
			match block {
				AnthropicResponseContent::Text { text } => {
					events.push(LlmEvent::TextDelta { content: text })
				}
				AnthropicResponseContent::Thinking { thinking } => {
					events.push(LlmEvent::ThinkingDelta { content: thinking })
				}
				AnthropicResponseContent::ToolUse { id, name, input } => {
					events.push(state.start_tool_use(index, id.clone(), name.clone()));
					state.tool_uses.remove(&index);
					events.push(LlmEvent::ToolUseDone {
						index,
						id,
						name,
						input,
					});
				}
				AnthropicResponseContent::Unknown => {}
			}
		}
		if response.stop_reason.as_deref() == Some("tool_use") {
			state.stop_reason = Some(weft_common_core::StopReason::ToolUse);
		}
		Ok(events)
	}

	fn on_http_error(&self, status: StatusCode, body: &str) -> LlmError {
		match serde_json::from_str::<AnthropicError>(body) {
			Ok(err) => {
				warn!(status = %status, error_type = %err.error.error_type, "anthropic API error");
				LlmError::Api(format!("{}: {}", err.error.error_type, err.error.message))
			}
			Err(_) => LlmError::HttpStatus {
				status: status.as_u16(),
				body: body.to_string(),
			},
		}
	}
}
