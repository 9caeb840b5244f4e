// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Bounded transcript of prior history for a fresh agent session.
//!
//! A newly created session knows nothing about the conversation, so the
//! first prompt carries a rendered transcript of earlier exchanges. An
//! exchange is a user submission plus everything that followed it. Only
//! complete exchanges are kept, newest first, and the kept span is always
//! contiguous with the present.

use tracing::debug;
use weft_common_core::{ContentBlock, HistoryMessage, MessageContent, Role};

const TRUNCATION_MARKER: &str = "…[truncated]";

#[derive(Clone, Debug)]
pub struct TruncationConfig {
	pub max_messages: usize,
	/// Per-message character cap. Tool activity in one exchange above this
	/// size is dropped before the exchange itself is.
	pub max_message_chars: usize,
	pub max_total_chars: usize,
}

impl Default for TruncationConfig {
	fn default() -> Self {
		Self {
			max_messages: 20,
			max_message_chars: 4_000,
			max_total_chars: 40_000,
		}
	}
}

/// Selects the messages to replay, in chronological order.
pub fn truncate_history(messages: &[HistoryMessage], config: &TruncationConfig) -> Vec<HistoryMessage> {
	let mut exchanges: Vec<Vec<&HistoryMessage>> = Vec::new();
	for msg in messages
		.iter()
		.filter(|m| m.is_replayable() && !m.flags.is_context)
	{
		match exchanges.last_mut() {
			Some(current) if !msg.flags.is_user_submission => current.push(msg),
			_ => exchanges.push(vec![msg]),
		}
	}

	let mut kept: Vec<Vec<HistoryMessage>> = Vec::new();
	let (mut count, mut chars) = (0usize, 0usize);
	for exchange in exchanges.iter().rev() {
		let Some(exchange) = compact_exchange(exchange, config) else {
			// The in-flight exchange at the tail has no answer yet.
			if kept.is_empty() {
				continue;
			}
			break;
		};
		let size: usize = exchange.iter().map(message_chars).sum();
		if count + exchange.len() > config.max_messages || chars + size > config.max_total_chars {
			break;
		}
		count += exchange.len();
		chars += size;
		kept.push(exchange);
	}
	kept.reverse();

	debug!(
		exchanges = exchanges.len(),
		kept_exchanges = kept.len(),
		messages = count,
		chars,
		"truncated history for replay"
	);
	kept.into_iter().flatten().collect()
}

/// Caps an exchange, or `None` if it is not a complete user/assistant pair.
fn compact_exchange(exchange: &[&HistoryMessage], config: &TruncationConfig) -> Option<Vec<HistoryMessage>> {
	let first = exchange.first()?;
	if !first.flags.is_user_submission {
		return None;
	}

	let tool_chars: usize = exchange
		.iter()
		.filter(|m| is_tool_message(m))
		.map(|m| message_chars(m))
		.sum();
	let drop_tools = tool_chars > config.max_message_chars;

	let compacted: Vec<HistoryMessage> = exchange
		.iter()
		.filter(|m| !(drop_tools && is_tool_message(m)))
		.map(|m| cap_message(m, config.max_message_chars))
		.enumerate()
		.filter(|(i, m)| *i == 0 || message_chars(m) > 0)
		.map(|(_, m)| m)
		.collect();

	let answered = compacted
		.iter()
		.skip(1)
		.any(|m| m.role == Role::Assistant && !m.text().is_empty());
	answered.then_some(compacted)
}

fn is_tool_message(msg: &HistoryMessage) -> bool {
	msg.has_tool_use() || msg.has_tool_result()
}

fn message_chars(msg: &HistoryMessage) -> usize {
	match &msg.content {
		MessageContent::Text(text) => text.chars().count(),
		MessageContent::Blocks(blocks) => blocks
			.iter()
			.map(|b| match b {
				ContentBlock::Text { text } => text.chars().count(),
				ContentBlock::Thinking { .. } => 0,
				ContentBlock::ToolUse { name, input, .. } => name.len() + input.to_string().chars().count(),
				ContentBlock::ToolResult { content, .. } => content.chars().count(),
			})
			.sum(),
	}
}

fn cap_text(text: &str, max_chars: usize) -> String {
	if text.chars().count() <= max_chars {
		return text.to_string();
	}
	let mut capped: String = text.chars().take(max_chars).collect();
	capped.push_str(TRUNCATION_MARKER);
	capped
}

fn cap_message(msg: &HistoryMessage, max_chars: usize) -> HistoryMessage {
	let mut capped = msg.clone();
	capped.content = match &msg.content {
		MessageContent::Text(text) => MessageContent::Text(cap_text(text, max_chars)),
		MessageContent::Blocks(blocks) => MessageContent::Blocks(
			blocks
				.iter()
				.filter(|b| !matches!(b, ContentBlock::Thinking { .. }))
				.map(|b| match b {
					ContentBlock::Text { text } => ContentBlock::Text {
						text: cap_text(text, max_chars),
					},
					ContentBlock::ToolResult {
						tool_use_id,
						content,
						is_error,
						is_user_declined,
					} => ContentBlock::ToolResult {
						tool_use_id: tool_use_id.clone(),
						content: cap_text(content, max_chars),
						is_error: *is_error,
						is_user_declined: *is_user_declined,
					},
					other => other.clone(),
				})
				.collect(),
		),
	};
	capped
}

/// Renders kept messages as one text block for the first prompt of a new
/// session.
pub fn render_transcript(messages: &[HistoryMessage]) -> String {
	let mut out = String::from("<previous_conversation>\n");
	for msg in messages {
		match &msg.content {
			MessageContent::Text(text) => push_line(&mut out, role_label(msg.role), text),
			MessageContent::Blocks(blocks) => {
				for block in blocks {
					match block {
						ContentBlock::Text { text } => push_line(&mut out, role_label(msg.role), text),
						ContentBlock::ToolUse { name, input, .. } => {
							push_line(&mut out, &format!("tool_use {name}"), &input.to_string())
						}
						ContentBlock::ToolResult {
							content, is_error, ..
						} => {
							let label = if *is_error { "tool_error" } else { "tool_result" };
							push_line(&mut out, label, content)
						}
						ContentBlock::Thinking { .. } => {}
					}
				}
			}
		}
	}
	out.push_str("</previous_conversation>\n\nContinue the conversation above.");
	out
}

fn role_label(role: Role) -> &'static str {
	match role {
		Role::User => "user",
		Role::Assistant => "assistant",
	}
}

fn push_line(out: &mut String, label: &str, text: &str) {
	out.push('[');
	out.push_str(label);
	out.push_str("]: ");
	out.push_str(text);
	out.push('\n');
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use weft_common_core::ToolUseState;

	fn alternating(n: usize) -> Vec<HistoryMessage> {
		(0..n)
			.map(|i| {
				if i % 2 == 0 {
					HistoryMessage::user(format!("question {i}"))
				} else {
					HistoryMessage::assistant(format!("answer {i}"))
				}
			})
			.collect()
	}

	fn assert_complete_pairs(kept: &[HistoryMessage]) {
		for pair in kept.chunks(2) {
			assert_eq!(pair.len(), 2);
			assert!(pair[0].flags.is_user_submission);
			assert_eq!(pair[1].role, Role::Assistant);
		}
	}

	/// **Test: 25 alternating messages under a cap of 20 keep the newest whole pairs**
	#[test]
	fn test_alternating_history_keeps_complete_pairs() {
		let history = alternating(25);
		let kept = truncate_history(&history, &TruncationConfig::default());

		assert!(kept.len() <= 20);
		assert_eq!(kept.len(), 20);
		assert_complete_pairs(&kept);
		// Trailing unanswered question (index 24) is not replayed.
		assert_eq!(kept.last().unwrap().text(), "answer 23");
		assert_eq!(kept.first().unwrap().text(), "question 4");
	}

	/// **Test: heavy tool output is dropped before the exchange**
	#[test]
	fn test_tool_heavy_exchange_loses_tools_first() {
		let config = TruncationConfig {
			max_message_chars: 50,
			..TruncationConfig::default()
		};
		let history = vec![
			HistoryMessage::user("read it"),
			HistoryMessage::tool_use(None, "t1", "read_file", serde_json::json!({"path": "a"}), ToolUseState::Generated),
			HistoryMessage::tool_result(None, "t1", "x".repeat(500), false, false),
			HistoryMessage::assistant("it says x"),
		];
		let kept = truncate_history(&history, &config);
		assert_eq!(kept.len(), 2);
		assert_eq!(kept[0].text(), "read it");
		assert_eq!(kept[1].text(), "it says x");
	}

	#[test]
	fn test_small_tool_exchange_is_kept_whole() {
		let history = vec![
			HistoryMessage::user("read it"),
			HistoryMessage::tool_use(None, "t1", "read_file", serde_json::json!({"path": "a"}), ToolUseState::Generated),
			HistoryMessage::tool_result(None, "t1", "tiny", false, false),
			HistoryMessage::assistant("tiny"),
		];
		let kept = truncate_history(&history, &TruncationConfig::default());
		assert_eq!(kept.len(), 4);
	}

	#[test]
	fn test_skips_context_and_display_only_messages() {
		let history = vec![
			HistoryMessage::context("<memory>...</memory>"),
			HistoryMessage::user("hi"),
			HistoryMessage::display_notice(None, "request cancelled"),
			HistoryMessage::assistant("hello"),
		];
		let kept = truncate_history(&history, &TruncationConfig::default());
		assert_eq!(kept.len(), 2);
		assert_complete_pairs(&kept);
	}

	#[test]
	fn test_long_message_is_capped() {
		let config = TruncationConfig {
			max_message_chars: 10,
			..TruncationConfig::default()
		};
		let history = vec![HistoryMessage::user("a".repeat(100)), HistoryMessage::assistant("ok")];
		let kept = truncate_history(&history, &config);
		assert_eq!(kept[0].text(), format!("{}{}", "a".repeat(10), TRUNCATION_MARKER));
	}

	#[test]
	fn test_render_transcript_labels_roles() {
		let kept = alternating(2);
		let text = render_transcript(&kept);
		assert!(text.starts_with("<previous_conversation>\n[user]: question 0\n[assistant]: answer 1\n"));
		assert!(text.ends_with("Continue the conversation above."));
	}

	proptest! {
		/// **Property: replay never exceeds the message or character caps**
		#[test]
		fn truncation_respects_caps(
			turns in proptest::collection::vec((any::<bool>(), 0usize..300), 0..60),
			max_messages in 0usize..30,
			max_total_chars in 0usize..5_000,
		) {
			let history: Vec<HistoryMessage> = turns
				.iter()
				.map(|(is_user, len)| {
					let text = "y".repeat(*len);
					if *is_user { HistoryMessage::user(text) } else { HistoryMessage::assistant(text) }
				})
				.collect();
			let config = TruncationConfig { max_messages, max_message_chars: 100, max_total_chars };
			let kept = truncate_history(&history, &config);

			prop_assert!(kept.len() <= max_messages);
			let total: usize = kept.iter().map(message_chars).sum();
			prop_assert!(total <= max_total_chars);
			if let Some(first) = kept.first() {
				prop_assert!(first.flags.is_user_submission);
			}
			for msg in &kept {
				prop_assert!(message_chars(msg) <= 100 + TRUNCATION_MARKER.chars().count());
			}
		}
	}
}
