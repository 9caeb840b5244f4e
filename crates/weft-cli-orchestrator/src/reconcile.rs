// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Folds streaming events of one turn into the history store.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, trace};
use weft_common_core::{ContentBlock, HistoryMessage, MessageId, ToolUseState, TurnId};
use weft_common_history::HistoryStore;

struct Segment {
	message_id: MessageId,
	content: String,
}

struct StreamingTool {
	message_id: MessageId,
	id: String,
	name: String,
	partial: String,
	input: Value,
}

/// Per-turn accumulator. Every method upserts the affected message and
/// returns the stored copy so the caller can forward it to the observer.
pub struct StreamReconciler {
	turn_id: TurnId,
	text: Option<Segment>,
	thinking: Option<Segment>,
	tools: BTreeMap<usize, StreamingTool>,
}

impl StreamReconciler {
	pub fn new(turn_id: TurnId) -> Self {
		Self {
			turn_id,
			text: None,
			thinking: None,
			tools: BTreeMap::new(),
		}
	}

	pub fn text(&mut self, store: &mut HistoryStore, delta: &str) -> HistoryMessage {
		let segment = extend_segment(&mut self.text, store, delta);
		let msg = HistoryMessage::assistant_blocks(
			Some(self.turn_id.clone()),
			vec![ContentBlock::Text {
				text: segment.content.clone(),
			}],
		)
		.with_id(segment.message_id.clone());
		store.upsert(msg.clone());
		msg
	}

	pub fn thinking(&mut self, store: &mut HistoryStore, delta: &str) -> HistoryMessage {
		let segment = extend_segment(&mut self.thinking, store, delta);
		let msg = HistoryMessage::assistant_blocks(
			Some(self.turn_id.clone()),
			vec![ContentBlock::Thinking {
				thinking: segment.content.clone(),
				signature: None,
			}],
		)
		.with_id(segment.message_id.clone());
		store.upsert(msg.clone());
		msg
	}

	pub fn tool_start(
		&mut self,
		store: &mut HistoryStore,
		index: usize,
		id: &str,
		name: &str,
	) -> HistoryMessage {
		debug!(turn_id = %self.turn_id, index, tool_id = %id, tool_name = %name, "tool use started");
		let tool = StreamingTool {
			message_id: MessageId::new(),
			id: id.to_string(),
			name: name.to_string(),
			partial: String::new(),
			input: Value::Object(Default::default()),
		};
		let msg = self.tool_message(&tool, ToolUseState::Generating);
		self.tools.insert(index, tool);
		store.upsert(msg.clone());
		msg
	}

	/// Returns the updated message only when the repaired input changed.
	pub fn tool_delta(
		&mut self,
		store: &mut HistoryStore,
		index: usize,
		fragment: &str,
	) -> Option<HistoryMessage> {
		let tool = self.tools.get_mut(&index)?;
		tool.partial.push_str(fragment);
		let repaired = repair_partial_json(&tool.partial)?;
		if repaired == tool.input {
			return None;
		}
		trace!(index, tool_id = %tool.id, "tool input advanced");
		tool.input = repaired;
		let msg = tool_use_message(&self.turn_id, tool, ToolUseState::Generating);
		store.upsert(msg.clone());
		Some(msg)
	}

	pub fn tool_done(
		&mut self,
		store: &mut HistoryStore,
		index: usize,
		id: &str,
		name: &str,
		input: Value,
	) -> HistoryMessage {
		let tool = self.tools.entry(index).or_insert_with(|| StreamingTool {
			message_id: MessageId::new(),
			id: id.to_string(),
			name: name.to_string(),
			partial: String::new(),
			input: Value::Null,
		});
		tool.input = input;
		let msg = tool_use_message(&self.turn_id, tool, ToolUseState::Generated);
		debug!(turn_id = %self.turn_id, index, tool_id = %id, "tool use generated");
		store.upsert(msg.clone());
		msg
	}

	/// True once any tool_use block has been seen this turn.
	pub fn saw_tool_use(&self) -> bool {
		!self.tools.is_empty()
	}

	fn tool_message(&self, tool: &StreamingTool, state: ToolUseState) -> HistoryMessage {
		tool_use_message(&self.turn_id, tool, state)
	}
}

fn tool_use_message(turn_id: &TurnId, tool: &StreamingTool, state: ToolUseState) -> HistoryMessage {
	HistoryMessage::tool_use(
		Some(turn_id.clone()),
		tool.id.clone(),
		tool.name.clone(),
		tool.input.clone(),
		state,
	)
	.with_id(tool.message_id.clone())
}

/// Continues the open segment while it is still the newest message,
/// otherwise starts a fresh one.
fn extend_segment<'a>(
	slot: &'a mut Option<Segment>,
	store: &HistoryStore,
	delta: &str,
) -> &'a Segment {
	let is_last = slot
		.as_ref()
		.is_some_and(|s| store.last().is_some_and(|m| m.id == s.message_id));
	if !is_last {
		*slot = None;
	}
	let segment = slot.get_or_insert_with(|| Segment {
		message_id: MessageId::new(),
		content: String::new(),
	});
	segment.content.push_str(delta);
	segment
}

/// Best-effort parse of a truncated JSON document.
///
/// Open strings, objects and arrays are closed, a dangling comma is
/// dropped and a dangling key gets a `null` value. When that still does
/// not parse, the input is cut back to the previous separator and retried.
pub fn repair_partial_json(partial: &str) -> Option<Value> {
	let trimmed = partial.trim();
	if trimmed.is_empty() {
		return None;
	}

	let mut end = trimmed.len();
	loop {
		let candidate = close_json(&trimmed[..end]);
		if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
			return Some(value);
		}

		let search = &trimmed[..end];
		let cut = match search.rfind([',', '{', '[']) {
			Some(p) if search.as_bytes()[p] == b',' => p,
			Some(p) if p + 1 < end => p + 1,
			Some(p) => p,
			None => return None,
		};
		if cut == 0 || cut >= end {
			return None;
		}
		end = cut;
	}
}

fn close_json(prefix: &str) -> String {
	let mut closers: Vec<char> = Vec::new();
	let mut in_string = false;
	let mut escaped = false;

	for c in prefix.chars() {
		if in_string {
			match c {
				_ if escaped => escaped = false,
				'\\' => escaped = true,
				'"' => in_string = false,
				_ => {}
			}
			continue;
		}
		match c {
			'"' => in_string = true,
			'{' => closers.push('}'),
			'[' => closers.push(']'),
			'}' | ']' => {
				closers.pop();
			}
			_ => {}
		}
	}

	let mut out = prefix.to_string();
	if in_string {
		if escaped {
			out.pop();
		}
		out.push('"');
	}
	let kept = out.trim_end().len();
	out.truncate(kept);
	if out.ends_with(',') {
		out.pop();
	} else if out.ends_with(':') {
		out.push_str("null");
	}
	while let Some(closer) = closers.pop() {
		out.push(closer);
	}
	out
}
