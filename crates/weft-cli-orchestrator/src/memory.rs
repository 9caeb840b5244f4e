// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Rolling memory: older history folded into one summary.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use weft_common_core::{
	estimate_message_tokens, estimate_tokens, ContentBlock, HistoryMessage, LlmClient, LlmError,
	LlmEvent, LlmRequest, Memory, Role, StopReason, TurnConfig,
};
use weft_common_history::HistoryStore;

use crate::error::{OrchestratorError, OrchestratorResult};

pub const SUMMARY_SYSTEM_PROMPT: &str = "You maintain the long-term memory of a coding \
conversation. Summarize the transcript you are given into concise notes: the user's goals, \
decisions made, files touched and anything still unresolved. If earlier memory is provided, \
fold it into the new notes. Reply with the notes only.";

#[derive(Clone, Debug)]
pub struct Summarizer {
	system_prompt: String,
	max_tokens: u32,
}

impl Default for Summarizer {
	fn default() -> Self {
		Self {
			system_prompt: SUMMARY_SYSTEM_PROMPT.to_string(),
			max_tokens: 2048,
		}
	}
}

impl Summarizer {
	pub fn new(system_prompt: impl Into<String>, max_tokens: u32) -> Self {
		Self {
			system_prompt: system_prompt.into(),
			max_tokens,
		}
	}

	pub fn needs_compaction(tracked_tokens: usize, config: &TurnConfig) -> bool {
		tracked_tokens > config.compaction_limit()
	}

	/// Summarizes everything but the most recent messages into a new
	/// [`Memory`] that replaces `memory`, then drops the summarized slice.
	///
	/// Returns the number of messages removed; `None` when there was
	/// nothing old enough to fold.
	#[instrument(skip_all, fields(history_len = history.len()))]
	pub async fn summarize(
		&self,
		client: &dyn LlmClient,
		history: &mut HistoryStore,
		memory: &mut Option<Memory>,
		config: &TurnConfig,
		cancel: &CancellationToken,
	) -> OrchestratorResult<Option<usize>> {
		let cut = history.compaction_cut(config.keep_recent_messages);
		let Some(last) = history.messages()[..cut].last() else {
			debug!("nothing to summarize");
			return Ok(None);
		};
		let (anchor_id, anchor_time) = (last.id.clone(), last.timestamp);

		let mut messages = Vec::new();
		if let Some(prior) = memory.as_ref() {
			messages.push(prior.to_context_message());
		}
		messages.push(HistoryMessage::user(transcript(&history.messages()[..cut])));

		let request = LlmRequest::new(config.model_name.clone())
			.with_system_prompt(self.system_prompt.clone())
			.with_messages(messages)
			.with_max_tokens(self.max_tokens);

		info!(summarized = cut, model = %config.model_name, "summarizing history into memory");
		let mut stream = client
			.complete_streaming(request, cancel.child_token())
			.await?;

		let mut summary = String::new();
		let mut stop = None;
		while let Some(event) = stream.next().await {
			match event {
				LlmEvent::TextDelta { content } => summary.push_str(&content),
				LlmEvent::Stop(reason) if reason.is_terminal() => {
					stop = Some(reason);
					break;
				}
				_ => {}
			}
		}

		match stop {
			Some(StopReason::Complete) | Some(StopReason::ToolUse) => {}
			Some(StopReason::Cancelled) => return Err(LlmError::Cancelled.into()),
			Some(StopReason::Error(e)) => return Err(e.into()),
			Some(StopReason::RateLimit { retry_after_secs }) => {
				return Err(LlmError::RateLimited { retry_after_secs }.into())
			}
			Some(StopReason::StreamingToolUse) | None => {
				return Err(OrchestratorError::Summarization(
					"summary stream ended without a stop".to_string(),
				))
			}
		}

		let summary = summary.trim();
		if summary.is_empty() {
			warn!("model returned an empty summary, keeping history");
			return Err(OrchestratorError::Summarization("empty summary".to_string()));
		}

		*memory = Some(Memory {
			content: summary.to_string(),
			last_summarized_timestamp: anchor_time,
			last_message_uuid: anchor_id,
		});
		history.drain_front(cut);
		info!(removed = cut, remaining = history.len(), "memory updated");
		Ok(Some(cut))
	}
}

/// Token estimate for what the next prompt will carry.
pub fn estimate_live_tokens(history: &HistoryStore, memory: Option<&Memory>) -> usize {
	let memory_tokens = memory.map_or(0, |m| estimate_tokens(&m.content));
	memory_tokens + history.replayable().map(estimate_message_tokens).sum::<usize>()
}

fn transcript(messages: &[HistoryMessage]) -> String {
	let mut out = String::from("<transcript>\n");
	for msg in messages.iter().filter(|m| m.is_replayable() && !m.flags.is_context) {
		let role = match msg.role {
			Role::User => "user",
			Role::Assistant => "assistant",
		};
		let text = msg.text();
		if !text.is_empty() {
			out.push_str(&format!("[{role}]: {text}\n"));
		}
		for block in msg.blocks() {
			match block {
				ContentBlock::ToolUse { name, input, .. } => {
					out.push_str(&format!("[tool_use {name}]: {input}\n"));
				}
				ContentBlock::ToolResult {
					content, is_error, ..
				} => {
					let tag = if *is_error { "tool_error" } else { "tool_result" };
					out.push_str(&format!("[{tag}]: {content}\n"));
				}
				_ => {}
			}
		}
	}
	out.push_str("</transcript>");
	out
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{stop_reply, text_reply, ScriptedClient};
	use weft_common_core::ToolUseState;

	fn config(keep: usize) -> TurnConfig {
		TurnConfig {
			keep_recent_messages: keep,
			..TurnConfig::default()
		}
	}

	fn history(n: usize) -> HistoryStore {
		let mut store = HistoryStore::new();
		for i in 0..n {
			if i % 2 == 0 {
				store.upsert(HistoryMessage::user(format!("question {i}")));
			} else {
				store.upsert(HistoryMessage::assistant(format!("answer {i}")));
			}
		}
		store
	}

	/// **Test: summarization folds the old slice into a new memory**
	#[tokio::test]
	async fn test_summarize_replaces_memory_and_drains() {
		let client = ScriptedClient::new(vec![text_reply("notes v2")]);
		let mut store = history(6);
		let anchor = store.messages()[1].id.clone();
		let mut memory = Some(Memory {
			content: "notes v1".to_string(),
			last_summarized_timestamp: store.messages()[0].timestamp,
			last_message_uuid: store.messages()[0].id.clone(),
		});

		let removed = Summarizer::default()
			.summarize(&client, &mut store, &mut memory, &config(4), &CancellationToken::new())
			.await
			.unwrap();

		assert_eq!(removed, Some(2));
		assert_eq!(store.len(), 4);
		assert_eq!(store.messages()[0].text(), "question 2");
		let memory = memory.unwrap();
		assert_eq!(memory.content, "notes v2");
		assert_eq!(memory.last_message_uuid, anchor);

		let request = &client.requests()[0];
		assert_eq!(request.system_prompt, SUMMARY_SYSTEM_PROMPT);
		assert!(request.messages[0].text().contains("notes v1"));
		assert!(request.messages[1].text().contains("[user]: question 0"));
		assert!(!request.messages[1].text().contains("question 2"));
	}

	#[tokio::test]
	async fn test_nothing_old_enough() {
		let client = ScriptedClient::new(vec![]);
		let mut store = history(3);
		let mut memory = None;
		let removed = Summarizer::default()
			.summarize(&client, &mut store, &mut memory, &config(4), &CancellationToken::new())
			.await
			.unwrap();
		assert_eq!(removed, None);
		assert!(client.requests().is_empty());
		assert_eq!(store.len(), 3);
	}

	/// **Test: a failed summary leaves history and memory untouched**
	#[tokio::test]
	async fn test_failed_summary_keeps_history() {
		let client = ScriptedClient::new(vec![stop_reply(StopReason::Error(LlmError::Api(
			"overloaded".into(),
		)))]);
		let mut store = history(8);
		let mut memory = None;
		let err = Summarizer::default()
			.summarize(&client, &mut store, &mut memory, &config(2), &CancellationToken::new())
			.await
			.unwrap_err();
		assert!(matches!(err, OrchestratorError::Llm(LlmError::Api(_))));
		assert_eq!(store.len(), 8);
		assert!(memory.is_none());
	}

	#[test]
	fn test_transcript_renders_tools() {
		let msgs = vec![
			HistoryMessage::user("read it"),
			HistoryMessage::tool_use(
				None,
				"t1",
				"read_file",
				serde_json::json!({"path": "a.rs"}),
				ToolUseState::Generated,
			),
			HistoryMessage::tool_result(None, "t1", "fn a() {}", false, false),
			HistoryMessage::display_notice(None, "request cancelled"),
		];
		let text = transcript(&msgs);
		assert!(text.contains("[tool_use read_file]: {\"path\":\"a.rs\"}"));
		assert!(text.contains("[tool_result]: fn a() {}"));
		assert!(!text.contains("cancelled"));
	}

	#[test]
	fn test_compaction_threshold() {
		let config = TurnConfig {
			context_window: 1000,
			..TurnConfig::default()
		};
		assert!(!Summarizer::needs_compaction(900, &config));
		assert!(Summarizer::needs_compaction(901, &config));
	}
}
