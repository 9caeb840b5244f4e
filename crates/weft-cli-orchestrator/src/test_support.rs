// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Scripted model backend for orchestrator tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use weft_common_core::{LlmClient, LlmError, LlmEvent, LlmRequest, LlmStream, StopReason, Usage};

pub(crate) enum Reply {
	Events(Vec<LlmEvent>),
	/// Streams `Start`, then waits for cancellation.
	Hang,
	Fail(LlmError),
}

pub(crate) fn text_reply(text: &str) -> Reply {
	Reply::Events(vec![
		LlmEvent::Start,
		LlmEvent::TextDelta {
			content: text.to_string(),
		},
		LlmEvent::Usage(Usage {
			input_tokens: 10,
			output_tokens: 5,
		}),
		LlmEvent::Stop(StopReason::Complete),
	])
}

pub(crate) fn tool_reply(id: &str, name: &str, input: Value) -> Reply {
	Reply::Events(vec![
		LlmEvent::Start,
		LlmEvent::ToolUseStart {
			index: 0,
			id: id.to_string(),
			name: name.to_string(),
		},
		LlmEvent::ToolUseDone {
			index: 0,
			id: id.to_string(),
			name: name.to_string(),
			input,
		},
		LlmEvent::Stop(StopReason::ToolUse),
	])
}

pub(crate) fn stop_reply(reason: StopReason) -> Reply {
	Reply::Events(vec![LlmEvent::Start, LlmEvent::Stop(reason)])
}

pub(crate) struct ScriptedClient {
	name: String,
	replies: Mutex<VecDeque<Reply>>,
	requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedClient {
	pub(crate) fn new(replies: Vec<Reply>) -> Self {
		Self::named("scripted", replies)
	}

	pub(crate) fn named(name: &str, replies: Vec<Reply>) -> Self {
		Self {
			name: name.to_string(),
			replies: Mutex::new(replies.into()),
			requests: Mutex::new(Vec::new()),
		}
	}

	pub(crate) fn requests(&self) -> Vec<LlmRequest> {
		self.requests.lock().unwrap().clone()
	}
}

#[async_trait]
impl LlmClient for ScriptedClient {
	fn name(&self) -> &str {
		&self.name
	}

	async fn complete_streaming(
		&self,
		request: LlmRequest,
		cancel: CancellationToken,
	) -> Result<LlmStream, LlmError> {
		self.requests.lock().unwrap().push(request);
		let reply = self
			.replies
			.lock()
			.unwrap()
			.pop_front()
			.ok_or_else(|| LlmError::InvalidResponse("script exhausted".to_string()))?;
		match reply {
			Reply::Events(events) => Ok(LlmStream::from_events(events)),
			Reply::Fail(e) => Err(e),
			Reply::Hang => {
				let stream = futures::stream::iter(vec![LlmEvent::Start]).chain(futures::stream::once(
					async move {
						cancel.cancelled().await;
						LlmEvent::Stop(StopReason::Cancelled)
					},
				));
				Ok(LlmStream::new(Box::pin(stream)))
			}
		}
	}
}
