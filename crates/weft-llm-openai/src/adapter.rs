// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use tracing::{debug, warn};
use weft_common_core::{LlmError, LlmEvent, LlmRequest};
use weft_llm_transport::{ParseState, ProviderAdapter, RequestSpec, SseFrame};

use crate::stream::{map_finish_reason, process_chunk};
use crate::types::{OpenAIConfig, OpenAIError, OpenAIRequest, OpenAIResponse};

/// [`ProviderAdapter`] for OpenAI-compatible chat completions.
pub struct OpenAIAdapter {
	config: OpenAIConfig,
	disable_stream: bool,
}

impl OpenAIAdapter {
	pub fn new(config: OpenAIConfig) -> Self {
		Self {
			config,
			disable_stream: false,
		}
	}

	pub fn with_disable_stream(mut self, disable_stream: bool) -> Self {
		self.disable_stream = disable_stream;
		self
	}

	fn completions_url(&self) -> String {
		format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
	}
}

/// Parses wait hints such as `"Please try again in 1.5s"`, `"20s"`, `"1m30s"`
/// or `"250ms"` into whole seconds, rounded up.
pub fn parse_wait_hint(text: &str) -> Option<u64> {
	let start = text
		.find("try again in ")
		.map(|i| i + "try again in ".len())
		.unwrap_or(0);
	let rest = &text[start..];

	let mut total_ms = 0f64;
	let mut number = String::new();
	let mut matched = false;
	let mut chars = rest.chars().peekable();
	while let Some(c) = chars.next() {
		if c.is_ascii_digit() || c == '.' {
			number.push(c);
			continue;
		}
		if number.is_empty() {
			break;
		}
		let value: f64 = number.parse().ok()?;
		number.clear();
		let unit_ms = match c {
			'm' if chars.peek() == Some(&'s') => {
				chars.next();
				1.0
			}
			'h' => 3_600_000.0,
			'm' => 60_000.0,
			's' => 1000.0,
			_ => break,
		};
		total_ms += value * unit_ms;
		matched = true;
	}

	matched.then(|| (total_ms / 1000.0).ceil().max(1.0) as u64)
}

impl ProviderAdapter for OpenAIAdapter {
	fn name(&self) -> &str {
		"openai"
	}

	fn build_request(&self, request: &LlmRequest) -> Result<RequestSpec, LlmError> {
		let mut body = OpenAIRequest::from(request);
		if body.model.is_empty() {
			body.model = self.config.model.clone();
		}
		if self.disable_stream {
			body.stream = false;
			body.stream_options = None;
		}
		debug!(model = %body.model, messages = body.messages.len(), "built openai request");

		let mut headers = vec![(
			"authorization".to_string(),
			format!("Bearer {}", self.config.api_key),
		)];
		if let Some(org) = &self.config.organization {
			headers.push(("openai-organization".to_string(), org.clone()));
		}

		Ok(RequestSpec {
			url: self.completions_url(),
			headers,
			body: serde_json::to_value(&body)
				.map_err(|e| LlmError::InvalidResponse(format!("failed to encode request: {e}")))?,
			stream: !self.disable_stream,
		})
	}

	fn parse_event(
		&self,
		frame: &SseFrame,
		state: &mut ParseState,
	) -> Result<Vec<LlmEvent>, LlmError> {
		process_chunk(&frame.data, state)
	}

	fn is_streaming_disabled(&self) -> bool {
		self.disable_stream
	}

	fn parse_response(&self, body: &str, state: &mut ParseState) -> Result<Vec<LlmEvent>, LlmError> {
		let response: OpenAIResponse = serde_json::from_str(body)
			.map_err(|e| LlmError::InvalidResponse(format!("failed to parse response: {e}")))?;
		debug!(id = %response.id, model = %response.model, "parsed non-streaming response");

		if let Some(usage) = response.usage {
			state.usage.input_tokens = usage.prompt_tokens;
			state.usage.output_tokens = usage.completion_tokens;
		}

		let mut events = Vec::new();
		if let Some(choice) = response.choices.into_iter().next() {
			if let Some(content) = choice.message.content.filter(|c| !c.is_empty()) {
				events.push(LlmEvent::TextDelta { content });
			}
			for (index, call) in choice.message.tool_calls.unwrap_or_default().into_iter().enumerate() {
				events.push(state.start_tool_use(index, call.id, call.function.name));
				events.extend(state.push_tool_input(index, &call.function.arguments));
				events.extend(state.finish_tool_use(index));
			}
			if let Some(reason) = choice.finish_reason {
				state.stop_reason = Some(map_finish_reason(&reason));
			}
		}
		Ok(events)
	}

	fn on_http_error(&self, status: StatusCode, body: &str) -> LlmError {
		match serde_json::from_str::<OpenAIError>(body) {
			Ok(err) => {
				warn!(status = %status, error_type = ?err.error.error_type, "openai API error");
				LlmError::Api(err.error.message)
			}
			Err(_) => LlmError::HttpStatus {
				status: status.as_u16(),
				body: body.to_string(),
			},
		}
	}

	fn rate_limit_sleep_hint(&self, headers: &HeaderMap, body: &str) -> Option<u64> {
		let from_header = ["x-ratelimit-reset-requests", "x-ratelimit-reset-tokens"]
			.iter()
			.filter_map(|name| headers.get(*name)?.to_str().ok())
			.filter_map(parse_wait_hint)
			.max();
		from_header.or_else(|| {
			let message = serde_json::from_str::<OpenAIError>(body)
				.map(|e| e.error.message)
				.unwrap_or_else(|_| body.to_string());
			message.contains("try again in ").then(|| parse_wait_hint(&message)).flatten()
		})
	}
}
