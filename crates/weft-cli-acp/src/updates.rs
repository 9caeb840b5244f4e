// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Reconciles streamed `session/update` notifications into history.

use std::collections::{HashMap, HashSet};

use agent_client_protocol as acp;
use serde_json::Value;
use tracing::{debug, trace};
use weft_common_core::{
	ContentBlock, HistoryMessage, MessageContent, MessageId, Plan, SharedPlan, TodoItem,
	TodoPriority, TodoStatus, ToolUseState, TurnId,
};
use weft_common_history::HistoryStore;

use crate::permission::kind_name;

/// Observer of what an ACP prompt changes.
pub trait AcpEvents: Send + Sync {
	fn on_message(&self, _message: &HistoryMessage) {}

	fn on_plan(&self, _plan: &Plan) {}

	fn on_mode(&self, _mode_id: &str) {}

	fn on_commands(&self, _commands: &[acp::AvailableCommand]) {}
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEvents;

impl AcpEvents for NoopEvents {}

pub fn tool_message_id(tool_call_id: &str) -> MessageId {
	MessageId::from_string(format!("acp-tool-{tool_call_id}"))
}

pub fn tool_result_message_id(tool_call_id: &str) -> MessageId {
	MessageId::from_string(format!("acp-result-{tool_call_id}"))
}

/// What is known about one tool call so far.
#[derive(Clone, Debug, Default)]
struct CallState {
	title: Option<String>,
	kind: Option<acp::ToolKind>,
	status: Option<acp::ToolCallStatus>,
	content: Vec<acp::ToolCallContent>,
	raw_input: Option<Value>,
	raw_output: Option<Value>,
}

impl CallState {
	fn from_call(call: acp::ToolCall) -> Self {
		Self {
			title: Some(call.title).filter(|t| !t.is_empty()),
			kind: Some(call.kind),
			status: Some(call.status),
			content: call.content,
			raw_input: call.raw_input,
			raw_output: call.raw_output,
		}
	}

	fn merge(&mut self, fields: acp::ToolCallUpdateFields) {
		if fields.title.is_some() {
			self.title = fields.title;
		}
		if fields.kind.is_some() {
			self.kind = fields.kind;
		}
		if fields.status.is_some() {
			self.status = fields.status;
		}
		if let Some(content) = fields.content {
			self.content = content;
		}
		if fields.raw_input.is_some() {
			self.raw_input = fields.raw_input;
		}
		if fields.raw_output.is_some() {
			self.raw_output = fields.raw_output;
		}
	}
}

/// Applies updates for one prompt to the history and plan.
pub struct UpdateApplier<'a> {
	history: &'a mut HistoryStore,
	plan: &'a SharedPlan,
	events: &'a dyn AcpEvents,
	turn_id: TurnId,
	text_message: Option<MessageId>,
	thought_message: Option<MessageId>,
	calls: HashMap<String, CallState>,
	declined: HashSet<String>,
}

impl<'a> UpdateApplier<'a> {
	pub fn new(
		history: &'a mut HistoryStore,
		plan: &'a SharedPlan,
		events: &'a dyn AcpEvents,
		turn_id: TurnId,
	) -> Self {
		Self {
			history,
			plan,
			events,
			turn_id,
			text_message: None,
			thought_message: None,
			calls: HashMap::new(),
			declined: HashSet::new(),
		}
	}

	/// Records that the user rejected a tool call, so its eventual result is
	/// marked as declined.
	pub fn mark_declined(&mut self, tool_call_id: &str) {
		self.declined.insert(tool_call_id.to_string());
	}

	pub fn apply(&mut self, update: acp::SessionUpdate) {
		match update {
			acp::SessionUpdate::AgentMessageChunk(chunk) => {
				if let Some(text) = text_of(&chunk.content) {
					self.append_text(text);
				}
			}
			acp::SessionUpdate::AgentThoughtChunk(chunk) => {
				if let Some(text) = text_of(&chunk.content) {
					self.append_thought(text);
				}
			}
			acp::SessionUpdate::ToolCall(call) => {
				let id = call.tool_call_id.to_string();
				self.apply_tool_call(id, CallState::from_call(call));
			}
			acp::SessionUpdate::ToolCallUpdate(update) => {
				let id = update.tool_call_id.to_string();
				let mut state = self.calls.remove(&id).unwrap_or_default();
				state.merge(update.fields);
				self.apply_tool_call(id, state);
			}
			acp::SessionUpdate::Plan(plan) => {
				let entries = plan.entries.into_iter().map(todo_item).collect();
				let snapshot = {
					let mut plan = self.plan.lock();
					plan.replace(entries);
					plan.clone()
				};
				debug!(entries = snapshot.entries.len(), "plan replaced by agent");
				self.events.on_plan(&snapshot);
			}
			// Echo of our own prompt.
			acp::SessionUpdate::UserMessageChunk(_) => {}
			_ => trace!("session update not reflected in history"),
		}
	}

	fn is_last(&self, id: &Option<MessageId>) -> bool {
		match (id, self.history.last()) {
			(Some(id), Some(last)) => &last.id == id,
			_ => false,
		}
	}

	fn append_text(&mut self, chunk: &str) {
		if self.is_last(&self.text_message) {
			if let Some(id) = &self.text_message {
				if let Some(updated) = self.history.update(id, |m| {
					if let MessageContent::Text(text) = &mut m.content {
						text.push_str(chunk);
					}
				}) {
					self.events.on_message(&updated);
				}
			}
			return;
		}
		let mut msg = HistoryMessage::assistant(chunk);
		msg.turn_id = Some(self.turn_id.clone());
		self.text_message = Some(msg.id.clone());
		self.events.on_message(&msg);
		self.history.upsert(msg);
	}

	fn append_thought(&mut self, chunk: &str) {
		if self.is_last(&self.thought_message) {
			if let Some(id) = &self.thought_message {
				if let Some(updated) = self.history.update(id, |m| {
					if let MessageContent::Blocks(blocks) = &mut m.content {
						if let Some(ContentBlock::Thinking { thinking, .. }) = blocks.first_mut() {
							thinking.push_str(chunk);
						}
					}
				}) {
					self.events.on_message(&updated);
				}
			}
			return;
		}
		let msg = HistoryMessage::assistant_blocks(
			Some(self.turn_id.clone()),
			vec![ContentBlock::Thinking {
				thinking: chunk.to_string(),
				signature: None,
			}],
		);
		self.thought_message = Some(msg.id.clone());
		self.events.on_message(&msg);
		self.history.upsert(msg);
	}

	fn apply_tool_call(&mut self, id: String, call: CallState) {
		let status = call.status.clone().unwrap_or(acp::ToolCallStatus::Pending);
		trace!(tool_call_id = %id, ?status, "tool call update");

		let name = call
			.title
			.clone()
			.or_else(|| call.kind.as_ref().map(|k| kind_name(k).to_string()))
			.unwrap_or_else(|| "tool".to_string());
		let input = call
			.raw_input
			.clone()
			.unwrap_or_else(|| Value::Object(Default::default()));
		let mut tool_msg = HistoryMessage::tool_use(
			Some(self.turn_id.clone()),
			&id,
			name,
			input,
			ToolUseState::Generated,
		)
		.with_id(tool_message_id(&id));
		tool_msg.flags.is_calling = status == acp::ToolCallStatus::InProgress;
		if let Some(existing) = self.history.get(&tool_msg.id) {
			tool_msg.timestamp = existing.timestamp;
		}
		self.events.on_message(&tool_msg);
		self.history.upsert(tool_msg);

		let failed = status == acp::ToolCallStatus::Failed;
		let finished = failed || status == acp::ToolCallStatus::Completed;
		if finished && !self.history.has_tool_result(&id) {
			let result = HistoryMessage::tool_result(
				Some(self.turn_id.clone()),
				&id,
				render_output(&call, failed),
				failed,
				self.declined.contains(&id),
			)
			.with_id(tool_result_message_id(&id));
			debug!(tool_call_id = %id, ?status, "tool call finished");
			self.events.on_message(&result);
			self.history.upsert(result);
		}

		self.calls.insert(id, call);
	}
}

fn text_of(content: &acp::ContentBlock) -> Option<&str> {
	match content {
		acp::ContentBlock::Text(text) => Some(&text.text),
		_ => None,
	}
}

fn todo_item(entry: acp::PlanEntry) -> TodoItem {
	TodoItem {
		content: entry.content,
		status: match entry.status {
			acp::PlanEntryStatus::InProgress => TodoStatus::InProgress,
			acp::PlanEntryStatus::Completed => TodoStatus::Completed,
			_ => TodoStatus::Pending,
		},
		priority: match entry.priority {
			acp::PlanEntryPriority::High => TodoPriority::High,
			acp::PlanEntryPriority::Low => TodoPriority::Low,
			_ => TodoPriority::Medium,
		},
	}
}

fn render_content(content: &acp::ToolCallContent) -> Option<String> {
	match content {
		acp::ToolCallContent::Content(inner) => text_of(&inner.content).map(str::to_string),
		acp::ToolCallContent::Diff(diff) => Some(format!("edited {}", diff.path.display())),
		_ => None,
	}
}

fn render_output(call: &CallState, failed: bool) -> String {
	let rendered: Vec<String> = call.content.iter().filter_map(render_content).collect();
	if !rendered.is_empty() {
		return rendered.join("\n");
	}
	match &call.raw_output {
		Some(Value::String(s)) => s.clone(),
		Some(other) => other.to_string(),
		None if failed => "tool call failed".to_string(),
		None => "tool call completed".to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn update(raw: Value) -> acp::SessionUpdate {
		serde_json::from_value(raw).unwrap()
	}

	fn chunk(text: &str) -> acp::SessionUpdate {
		update(json!({
			"sessionUpdate": "agent_message_chunk",
			"content": {"type": "text", "text": text}
		}))
	}

	fn status(id: &str, status: &str) -> acp::SessionUpdate {
		update(json!({"sessionUpdate": "tool_call_update", "toolCallId": id, "status": status}))
	}

	/// **Test: consecutive text chunks grow one assistant message**
	#[test]
	fn test_text_chunks_append() {
		let mut history = HistoryStore::new();
		let plan = SharedPlan::default();
		let mut applier = UpdateApplier::new(&mut history, &plan, &NoopEvents, TurnId::new());
		applier.apply(chunk("Hel"));
		applier.apply(chunk("lo"));
		drop(applier);

		assert_eq!(history.len(), 1);
		assert_eq!(history.messages()[0].text(), "Hello");
	}

	/// **Test: a tool call splits surrounding text into separate messages**
	#[test]
	fn test_tool_call_splits_text() {
		let mut history = HistoryStore::new();
		let plan = SharedPlan::default();
		let mut applier = UpdateApplier::new(&mut history, &plan, &NoopEvents, TurnId::new());
		applier.apply(chunk("before"));
		applier.apply(update(json!({
			"sessionUpdate": "tool_call", "toolCallId": "c1", "title": "Read a.rs",
			"kind": "read", "status": "pending", "rawInput": {"path": "a.rs"}
		})));
		applier.apply(chunk("after"));
		drop(applier);

		let texts: Vec<String> = history.iter().map(|m| m.text()).collect();
		assert_eq!(texts, vec!["before".to_string(), String::new(), "after".to_string()]);
		let uses = history.messages()[1].tool_uses();
		assert_eq!(uses[0].name, "Read a.rs");
		assert_eq!(uses[0].input, json!({"path": "a.rs"}));
	}

	/// **Test: a tool call lifecycle yields one tool_use and exactly one result**
	#[test]
	fn test_tool_call_lifecycle_single_result() {
		let mut history = HistoryStore::new();
		let plan = SharedPlan::default();
		let mut applier = UpdateApplier::new(&mut history, &plan, &NoopEvents, TurnId::new());
		applier.apply(update(json!({
			"sessionUpdate": "tool_call", "toolCallId": "c1", "title": "Run tests", "status": "pending"
		})));
		applier.apply(status("c1", "in_progress"));
		assert!(applier.history.get(&tool_message_id("c1")).unwrap().flags.is_calling);

		applier.apply(update(json!({
			"sessionUpdate": "tool_call_update", "toolCallId": "c1",
			"status": "completed", "rawOutput": "3 passed"
		})));
		applier.apply(status("c1", "completed"));
		drop(applier);

		assert_eq!(history.len(), 2);
		let tool = history.get(&tool_message_id("c1")).unwrap();
		assert!(!tool.flags.is_calling);
		assert_eq!(tool.tool_uses()[0].name, "Run tests");
		let result = history.get(&tool_result_message_id("c1")).unwrap();
		assert_eq!(result.tool_result_ids(), vec!["c1"]);
		assert!(matches!(
			&result.blocks()[0],
			ContentBlock::ToolResult { content, is_error: false, .. } if content == "3 passed"
		));
	}

	#[test]
	fn test_failed_and_declined_results() {
		let mut history = HistoryStore::new();
		let plan = SharedPlan::default();
		let mut applier = UpdateApplier::new(&mut history, &plan, &NoopEvents, TurnId::new());
		applier.mark_declined("c2");
		applier.apply(update(json!({
			"sessionUpdate": "tool_call", "toolCallId": "c2", "title": "", "kind": "edit"
		})));
		applier.apply(status("c2", "failed"));
		drop(applier);

		assert_eq!(history.get(&tool_message_id("c2")).unwrap().tool_uses()[0].name, "edit");
		let result = history.get(&tool_result_message_id("c2")).unwrap();
		assert!(matches!(
			&result.blocks()[0],
			ContentBlock::ToolResult {
				is_error: true,
				is_user_declined: true,
				..
			}
		));
	}

	#[test]
	fn test_diff_content_rendered_as_edit() {
		let mut history = HistoryStore::new();
		let plan = SharedPlan::default();
		let mut applier = UpdateApplier::new(&mut history, &plan, &NoopEvents, TurnId::new());
		applier.apply(update(json!({
			"sessionUpdate": "tool_call", "toolCallId": "c3", "title": "Edit lib.rs",
			"status": "completed",
			"content": [{"type": "diff", "path": "/src/lib.rs", "oldText": "a", "newText": "b"}]
		})));
		drop(applier);

		let result = history.get(&tool_result_message_id("c3")).unwrap();
		assert!(matches!(
			&result.blocks()[0],
			ContentBlock::ToolResult { content, .. } if content == "edited /src/lib.rs"
		));
	}

	#[test]
	fn test_plan_update_replaces_plan() {
		let mut history = HistoryStore::new();
		let plan = SharedPlan::default();
		plan.lock().replace(vec![TodoItem::new("old")]);
		let mut applier = UpdateApplier::new(&mut history, &plan, &NoopEvents, TurnId::new());
		applier.apply(update(json!({
			"sessionUpdate": "plan",
			"entries": [{"content": "new", "status": "in_progress", "priority": "high"}]
		})));
		drop(applier);

		let snapshot = plan.snapshot();
		assert_eq!(snapshot.entries.len(), 1);
		assert_eq!(snapshot.entries[0].content, "new");
		assert_eq!(snapshot.entries[0].status, TodoStatus::InProgress);
		assert_eq!(snapshot.entries[0].priority, TodoPriority::High);
		assert!(history.is_empty());
	}

	#[test]
	fn test_thought_chunks_append() {
		let mut history = HistoryStore::new();
		let plan = SharedPlan::default();
		let mut applier = UpdateApplier::new(&mut history, &plan, &NoopEvents, TurnId::new());
		let thought = |t: &str| {
			update(json!({
				"sessionUpdate": "agent_thought_chunk",
				"content": {"type": "text", "text": t}
			}))
		};
		applier.apply(thought("think"));
		applier.apply(thought("ing"));
		drop(applier);

		assert_eq!(history.len(), 1);
		assert!(matches!(
			&history.messages()[0].blocks()[0],
			ContentBlock::Thinking { thinking, .. } if thinking == "thinking"
		));
	}
}
