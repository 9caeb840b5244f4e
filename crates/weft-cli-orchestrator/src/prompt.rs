// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Prompt resolution: system prompt, leading context, budgeted history.

use std::collections::HashSet;

use tracing::debug;
use weft_common_core::{
	estimate_message_tokens, ContentBlock, HistoryMessage, LlmRequest, Memory, MessageContent,
	ToolDefinition, ToolUseState, TurnConfig,
};
use weft_common_history::HistoryStore;

/// Caller-supplied prompt material. Rendering it is the caller's concern.
#[derive(Clone, Debug, Default)]
pub struct PromptContext {
	pub system_prompt: String,
	pub project_context: Option<String>,
	pub diagnostics: Option<String>,
	pub selected_code: Option<String>,
}

impl PromptContext {
	pub fn new(system_prompt: impl Into<String>) -> Self {
		Self {
			system_prompt: system_prompt.into(),
			..Self::default()
		}
	}
}

pub fn resolve_prompt(
	history: &HistoryStore,
	memory: Option<&Memory>,
	context: &PromptContext,
	config: &TurnConfig,
	tools: Vec<ToolDefinition>,
) -> LlmRequest {
	let mut messages = context_messages(memory, context);
	let leading = messages.len();
	messages.extend(select_history(history, config.history_budget()));
	debug!(
		context_messages = leading,
		history_messages = messages.len() - leading,
		tools = tools.len(),
		"resolved prompt"
	);

	let request = LlmRequest::new(config.model_name.clone())
		.with_system_prompt(context.system_prompt.clone())
		.with_messages(messages)
		.with_tools(tools)
		.with_max_tokens(config.max_tokens);
	match config.temperature {
		Some(temperature) => request.with_temperature(temperature),
		None => request,
	}
}

/// Memory first, then project context, diagnostics and selected code.
fn context_messages(memory: Option<&Memory>, context: &PromptContext) -> Vec<HistoryMessage> {
	let mut messages: Vec<HistoryMessage> = memory.map(Memory::to_context_message).into_iter().collect();
	let blocks = [
		("project_context", &context.project_context),
		("diagnostics", &context.diagnostics),
		("selected_code", &context.selected_code),
	];
	for (tag, body) in blocks {
		if let Some(body) = body.as_deref().filter(|b| !b.trim().is_empty()) {
			messages.push(HistoryMessage::context(format!("<{tag}>\n{body}\n</{tag}>")));
		}
	}
	messages
}

/// Newest replayable messages within `budget` tokens.
///
/// When not even the newest message fits, the last two are kept anyway.
pub fn select_history(history: &HistoryStore, budget: usize) -> Vec<HistoryMessage> {
	let replayable: Vec<&HistoryMessage> = history.replayable().collect();

	let mut used = 0usize;
	let mut start = replayable.len();
	for (i, msg) in replayable.iter().enumerate().rev() {
		let cost = estimate_message_tokens(msg);
		if used + cost > budget {
			break;
		}
		used += cost;
		start = i;
	}
	if start == replayable.len() {
		start = replayable.len().saturating_sub(2);
		debug!(budget, "history exceeds token budget, keeping the last two messages");
	} else if start > 0 {
		debug!(dropped = start, budget, used, "trimmed oldest history");
	}

	pair_tool_blocks(&replayable[start..])
}

/// Drops tool_use blocks with no tool_result (or still generating), and
/// tool_result blocks whose tool_use is not in the slice.
fn pair_tool_blocks(messages: &[&HistoryMessage]) -> Vec<HistoryMessage> {
	let mut uses: HashSet<&str> = HashSet::new();
	let mut results: HashSet<&str> = HashSet::new();
	for msg in messages {
		for block in msg.blocks() {
			match block {
				ContentBlock::ToolUse { id, state, .. } if *state == ToolUseState::Generated => {
					uses.insert(id);
				}
				ContentBlock::ToolResult { tool_use_id, .. } => {
					results.insert(tool_use_id);
				}
				_ => {}
			}
		}
	}

	messages
		.iter()
		.filter_map(|msg| {
			let MessageContent::Blocks(blocks) = &msg.content else {
				return Some((*msg).clone());
			};
			let kept: Vec<ContentBlock> = blocks
				.iter()
				.filter(|b| match b {
					ContentBlock::ToolUse { id, state, .. } => {
						*state == ToolUseState::Generated && results.contains(id.as_str())
					}
					ContentBlock::ToolResult { tool_use_id, .. } => uses.contains(tool_use_id.as_str()),
					_ => true,
				})
				.cloned()
				.collect();
			if kept.is_empty() {
				return None;
			}
			let mut msg = (*msg).clone();
			msg.content = MessageContent::Blocks(kept);
			Some(msg)
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn memory(content: &str) -> Memory {
		let anchor = HistoryMessage::user("anchor");
		Memory {
			content: content.to_string(),
			last_summarized_timestamp: anchor.timestamp,
			last_message_uuid: anchor.id,
		}
	}

	fn tool_pair(store: &mut HistoryStore, id: &str) {
		store.upsert(HistoryMessage::tool_use(
			None,
			id,
			"read_file",
			json!({"path": "a"}),
			ToolUseState::Generated,
		));
		store.upsert(HistoryMessage::tool_result(None, id, "contents", false, false));
	}

	/// **Test: oldest history is dropped first to fit the budget**
	#[test]
	fn test_budget_drops_oldest() {
		let mut store = HistoryStore::new();
		for i in 0..5 {
			// 8 chars = 2 tokens each
			store.upsert(HistoryMessage::user(format!("message{i}")));
		}
		let kept = select_history(&store, 6);
		let texts: Vec<String> = kept.iter().map(|m| m.text()).collect();
		assert_eq!(texts, vec!["message2", "message3", "message4"]);
	}

	/// **Test: when nothing fits, the last two messages are still sent**
	#[test]
	fn test_nothing_fits_keeps_last_two() {
		let mut store = HistoryStore::new();
		store.upsert(HistoryMessage::user("x".repeat(400)));
		store.upsert(HistoryMessage::assistant("y".repeat(400)));
		store.upsert(HistoryMessage::user("z".repeat(400)));
		let kept = select_history(&store, 10);
		assert_eq!(kept.len(), 2);
		assert!(kept[1].text().starts_with('z'));
	}

	/// **Test: orphaned and still-generating tool uses are never replayed**
	#[test]
	fn test_orphan_tool_uses_dropped() {
		let mut store = HistoryStore::new();
		store.upsert(HistoryMessage::user("go"));
		tool_pair(&mut store, "t1");
		store.upsert(HistoryMessage::tool_use(
			None,
			"t2",
			"read_file",
			json!({}),
			ToolUseState::Generated,
		));
		store.upsert(HistoryMessage::tool_use(
			None,
			"t3",
			"read_file",
			json!({}),
			ToolUseState::Generating,
		));

		let kept = select_history(&store, 10_000);
		assert_eq!(kept.len(), 3);
		assert_eq!(kept[1].tool_uses()[0].id, "t1");
		assert_eq!(kept[2].tool_result_ids(), vec!["t1"]);
	}

	#[test]
	fn test_result_without_use_in_window_dropped() {
		let mut store = HistoryStore::new();
		store.upsert(HistoryMessage::user("x".repeat(4000)));
		tool_pair(&mut store, "t1");
		store.upsert(HistoryMessage::assistant("done"));
		// Budget only fits the result and the final answer.
		let kept = select_history(&store, 3);
		assert!(kept.iter().all(|m| m.tool_result_ids().is_empty()));
	}

	/// **Test: display-only notices stay out of the prompt, context leads in order**
	#[test]
	fn test_resolve_prompt_layout() {
		let mut store = HistoryStore::new();
		store.upsert(HistoryMessage::user("hi"));
		store.upsert(HistoryMessage::display_notice(None, "request cancelled"));
		let context = PromptContext {
			system_prompt: "be brief".to_string(),
			project_context: Some("rust workspace".to_string()),
			diagnostics: Some("  ".to_string()),
			selected_code: Some("fn main() {}".to_string()),
		};
		let memory = memory("earlier work");
		let config = TurnConfig {
			temperature: Some(0.2),
			..TurnConfig::default()
		};

		let request = resolve_prompt(&store, Some(&memory), &context, &config, vec![]);

		assert_eq!(request.system_prompt, "be brief");
		assert_eq!(request.temperature, Some(0.2));
		assert_eq!(request.max_tokens, Some(config.max_tokens));
		let texts: Vec<String> = request.messages.iter().map(|m| m.text()).collect();
		assert_eq!(texts.len(), 4);
		assert!(texts[0].starts_with("<memory>"));
		assert!(texts[1].starts_with("<project_context>"));
		assert!(texts[2].starts_with("<selected_code>"));
		assert_eq!(texts[3], "hi");
		assert!(request.messages[..3].iter().all(|m| m.flags.is_context));
	}
}
