// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! LLM abstraction types for request/response handling and streaming.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use pin_project_lite::pin_project;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::error::LlmError;
use crate::message::HistoryMessage;
use crate::tool::ToolDefinition;

/// Resolved prompt for one turn.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmRequest {
	pub model: String,
	pub system_prompt: String,
	pub messages: Vec<HistoryMessage>,
	pub tools: Vec<ToolDefinition>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f32>,
}

impl LlmRequest {
	pub fn new(model: impl Into<String>) -> Self {
		Self {
			model: model.into(),
			system_prompt: String::new(),
			messages: Vec::new(),
			tools: Vec::new(),
			max_tokens: None,
			temperature: None,
		}
	}

	pub fn with_model(mut self, model: impl Into<String>) -> Self {
		self.model = model.into();
		self
	}

	pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
		self.system_prompt = system_prompt.into();
		self
	}

	pub fn with_messages(mut self, messages: Vec<HistoryMessage>) -> Self {
		self.messages = messages;
		self
	}

	pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
		self.tools = tools;
		self
	}

	pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
		self.max_tokens = Some(max_tokens);
		self
	}

	pub fn with_temperature(mut self, temperature: f32) -> Self {
		self.temperature = Some(temperature);
		self
	}
}

/// Why a turn ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
	Complete,
	ToolUse,
	RateLimit { retry_after_secs: u64 },
	Cancelled,
	Error(LlmError),
	/// A streaming-capable tool was previewed mid-stream. Not terminal.
	StreamingToolUse,
}

impl StopReason {
	pub fn name(&self) -> &'static str {
		match self {
			Self::Complete => "complete",
			Self::ToolUse => "tool_use",
			Self::RateLimit { .. } => "rate_limit",
			Self::Cancelled => "cancelled",
			Self::Error(_) => "error",
			Self::StreamingToolUse => "streaming_tool_use",
		}
	}

	pub fn is_terminal(&self) -> bool {
		!matches!(self, Self::StreamingToolUse)
	}
}

/// Streaming events emitted by a backend during one turn.
///
/// A well-formed stream starts with [`LlmEvent::Start`] and ends with exactly
/// one [`LlmEvent::Stop`].
#[derive(Clone, Debug)]
pub enum LlmEvent {
	Start,
	/// Response headers, once available.
	Headers(reqwest::header::HeaderMap),
	/// Incremental text content from the assistant.
	TextDelta { content: String },
	/// Incremental private reasoning.
	ThinkingDelta { content: String },
	/// A tool_use block opened.
	ToolUseStart {
		index: usize,
		id: String,
		name: String,
	},
	/// Incremental tool input JSON.
	ToolUseDelta { index: usize, partial_json: String },
	/// A tool_use block closed with its full input.
	ToolUseDone {
		index: usize,
		id: String,
		name: String,
		input: serde_json::Value,
	},
	Usage(Usage),
	Stop(StopReason),
}

/// Token usage statistics from an LLM request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
	pub input_tokens: u32,
	pub output_tokens: u32,
}

impl Usage {
	pub fn total(&self) -> u32 {
		self.input_tokens.saturating_add(self.output_tokens)
	}
}

pin_project! {
		/// A stream of LLM events during completion.
		///
		/// Wraps an async stream of [`LlmEvent`] items, providing both
		/// direct async iteration via [`next`] and [`Stream`] trait implementation.
		pub struct LlmStream {
				#[pin]
				inner: Pin<Box<dyn Stream<Item = LlmEvent> + Send>>,
		}
}

impl LlmStream {
	/// Creates a new LLM stream from a boxed stream.
	pub fn new(inner: Pin<Box<dyn Stream<Item = LlmEvent> + Send>>) -> Self {
		Self { inner }
	}

	/// Creates a stream that replays a fixed list of events.
	pub fn from_events(events: Vec<LlmEvent>) -> Self {
		Self::new(Box::pin(futures::stream::iter(events)))
	}

	/// Returns the next event from the stream, or `None` if the stream is
	/// exhausted.
	#[instrument(skip(self), level = "trace")]
	pub async fn next(&mut self) -> Option<LlmEvent> {
		use futures::StreamExt;
		self.inner.next().await
	}
}

impl Stream for LlmStream {
	type Item = LlmEvent;

	fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		self.project().inner.poll_next(cx)
	}
}

/// A model backend reachable for one streaming turn.
#[async_trait]
pub trait LlmClient: Send + Sync {
	/// Human-readable provider name for logs.
	fn name(&self) -> &str;

	/// Starts one turn. Cancelling `cancel` ends the stream with a single
	/// `Stop(Cancelled)`.
	async fn complete_streaming(
		&self,
		request: LlmRequest,
		cancel: CancellationToken,
	) -> Result<LlmStream, LlmError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	mod llm_request {
		use super::*;
		use proptest::prelude::*;

		proptest! {
				/// Verifies LlmRequest can be serialized to JSON and deserialized back,
				/// so turn artifacts written for debugging can be replayed.
				#[test]
				fn serialization_roundtrip_preserves_data(
						model in "[a-z]{1,20}",
						system in ".{0,40}",
						max_tokens in proptest::option::of(1u32..10000),
				) {
						let request = LlmRequest::new(model)
								.with_system_prompt(system);
						let request = match max_tokens {
								Some(n) => request.with_max_tokens(n),
								None => request,
						};

						let json = serde_json::to_string(&request).expect("serialization should succeed");
						let deserialized: LlmRequest = serde_json::from_str(&json).expect("deserialization should succeed");

						prop_assert_eq!(request.model, deserialized.model);
						prop_assert_eq!(request.system_prompt, deserialized.system_prompt);
						prop_assert_eq!(request.max_tokens, deserialized.max_tokens);
				}
		}
	}

	#[test]
	fn test_stop_reason_names() {
		assert_eq!(StopReason::Complete.name(), "complete");
		assert_eq!(
			StopReason::RateLimit {
				retry_after_secs: 3
			}
			.name(),
			"rate_limit"
		);
		assert!(!StopReason::StreamingToolUse.is_terminal());
		assert!(StopReason::Cancelled.is_terminal());
	}

	#[tokio::test]
	async fn test_from_events_replays_in_order() {
		let mut stream = LlmStream::from_events(vec![
			LlmEvent::Start,
			LlmEvent::TextDelta {
				content: "hi".to_string(),
			},
			LlmEvent::Stop(StopReason::Complete),
		]);

		assert!(matches!(stream.next().await, Some(LlmEvent::Start)));
		assert!(matches!(stream.next().await, Some(LlmEvent::TextDelta { .. })));
		assert!(matches!(
			stream.next().await,
			Some(LlmEvent::Stop(StopReason::Complete))
		));
		assert!(stream.next().await.is_none());
	}
}
