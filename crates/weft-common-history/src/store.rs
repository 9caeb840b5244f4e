// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Ordered conversation history keyed by stable message id.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use weft_common_core::{HistoryMessage, MessageId, ToolUseRef};

/// What an upsert did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upsert {
	Inserted,
	Replaced,
}

/// Append/upsert list of conversation messages.
///
/// Backed by a vector plus an id→index map. Re-adding a message with a known
/// id replaces it in place, so order is always order of first insertion.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(from = "Vec<HistoryMessage>", into = "Vec<HistoryMessage>")]
pub struct HistoryStore {
	messages: Vec<HistoryMessage>,
	index: HashMap<MessageId, usize>,
}

impl From<Vec<HistoryMessage>> for HistoryStore {
	fn from(messages: Vec<HistoryMessage>) -> Self {
		let mut store = Self::new();
		for msg in messages {
			store.upsert(msg);
		}
		store
	}
}

impl From<HistoryStore> for Vec<HistoryMessage> {
	fn from(store: HistoryStore) -> Self {
		store.messages
	}
}

impl HistoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn upsert(&mut self, message: HistoryMessage) -> Upsert {
		match self.index.get(&message.id) {
			Some(&pos) => {
				trace!(message_id = %message.id, position = pos, "replacing history message");
				self.messages[pos] = message;
				Upsert::Replaced
			}
			None => {
				trace!(message_id = %message.id, position = self.messages.len(), "appending history message");
				self.index.insert(message.id.clone(), self.messages.len());
				self.messages.push(message);
				Upsert::Inserted
			}
		}
	}

	/// Mutates a message in place. Returns the updated copy if it existed.
	pub fn update<F>(&mut self, id: &MessageId, f: F) -> Option<HistoryMessage>
	where
		F: FnOnce(&mut HistoryMessage),
	{
		let pos = *self.index.get(id)?;
		let msg = &mut self.messages[pos];
		f(msg);
		// The id is the key; a closure must not move the message.
		msg.id = id.clone();
		Some(msg.clone())
	}

	pub fn get(&self, id: &MessageId) -> Option<&HistoryMessage> {
		self.index.get(id).map(|&pos| &self.messages[pos])
	}

	pub fn position(&self, id: &MessageId) -> Option<usize> {
		self.index.get(id).copied()
	}

	pub fn contains(&self, id: &MessageId) -> bool {
		self.index.contains_key(id)
	}

	pub fn remove(&mut self, id: &MessageId) -> Option<HistoryMessage> {
		let pos = self.index.remove(id)?;
		let removed = self.messages.remove(pos);
		self.reindex_from(pos);
		Some(removed)
	}

	pub fn messages(&self) -> &[HistoryMessage] {
		&self.messages
	}

	pub fn iter(&self) -> impl Iterator<Item = &HistoryMessage> {
		self.messages.iter()
	}

	pub fn len(&self) -> usize {
		self.messages.len()
	}

	pub fn is_empty(&self) -> bool {
		self.messages.is_empty()
	}

	pub fn last(&self) -> Option<&HistoryMessage> {
		self.messages.last()
	}

	/// Messages that may be sent back to the model.
	pub fn replayable(&self) -> impl Iterator<Item = &HistoryMessage> {
		self.messages.iter().filter(|m| m.is_replayable())
	}

	/// True if any message carries a tool_result for `tool_use_id`.
	pub fn has_tool_result(&self, tool_use_id: &str) -> bool {
		self
			.messages
			.iter()
			.any(|m| m.tool_result_ids().contains(&tool_use_id))
	}

	/// The message holding the tool_use block with `tool_use_id`.
	pub fn find_tool_use(&self, tool_use_id: &str) -> Option<&HistoryMessage> {
		self
			.messages
			.iter()
			.find(|m| m.tool_uses().iter().any(|t| t.id == tool_use_id))
	}

	/// Tool uses with no tool_result later in the history, in history order.
	pub fn pending_tool_uses(&self) -> Vec<ToolUseRef> {
		let mut answered: HashSet<String> = HashSet::new();
		let mut pending = Vec::new();

		for msg in self.messages.iter().rev() {
			for id in msg.tool_result_ids() {
				answered.insert(id.to_string());
			}
			let mut uses = msg.tool_uses();
			uses.reverse();
			for tool_use in uses {
				if !answered.contains(&tool_use.id) {
					pending.push(tool_use);
				}
			}
		}

		pending.reverse();
		debug!(count = pending.len(), "computed pending tool uses");
		pending
	}

	/// Number of leading messages to summarize so that at most `keep_recent`
	/// stay live. The cut never separates a tool_result from its tool_use.
	pub fn compaction_cut(&self, keep_recent: usize) -> usize {
		let mut cut = self.messages.len().saturating_sub(keep_recent);
		while cut > 0 && cut < self.messages.len() {
			let splits_pair = self.messages[cut..].iter().any(|m| {
				m.tool_result_ids().iter().any(|id| {
					self.messages[..cut]
						.iter()
						.any(|earlier| earlier.tool_uses().iter().any(|t| t.id == *id))
				})
			});
			if !splits_pair {
				break;
			}
			cut -= 1;
		}
		cut
	}

	/// Removes and returns the first `count` messages.
	pub fn drain_front(&mut self, count: usize) -> Vec<HistoryMessage> {
		let count = count.min(self.messages.len());
		let drained: Vec<HistoryMessage> = self.messages.drain(..count).collect();
		for msg in &drained {
			self.index.remove(&msg.id);
		}
		self.reindex_from(0);
		debug!(drained = drained.len(), remaining = self.messages.len(), "drained history front");
		drained
	}

	fn reindex_from(&mut self, start: usize) {
		for (pos, msg) in self.messages.iter().enumerate().skip(start) {
			self.index.insert(msg.id.clone(), pos);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use weft_common_core::{ContentBlock, MessageContent, ToolUseState};

	fn tool_use(id: &str) -> HistoryMessage {
		HistoryMessage::tool_use(
			None,
			id,
			"read_file",
			serde_json::json!({}),
			ToolUseState::Generated,
		)
	}

	fn tool_result(id: &str) -> HistoryMessage {
		HistoryMessage::tool_result(None, id, "ok", false, false)
	}

	proptest! {
			/// **Property: upserting an existing id keeps one entry at its original position**
			///
			/// Streaming output re-adds the same message many times; the history
			/// must never grow or reorder because of it.
			#[test]
			fn upsert_same_id_keeps_original_position(
					before in 0usize..6,
					after in 0usize..6,
					replacement in "[a-z ]{0,20}",
			) {
					let mut store = HistoryStore::new();
					for i in 0..before {
							store.upsert(HistoryMessage::user(format!("before {i}")));
					}
					let target = HistoryMessage::assistant("first");
					let id = target.id.clone();
					prop_assert_eq!(store.upsert(target), Upsert::Inserted);
					for i in 0..after {
							store.upsert(HistoryMessage::user(format!("after {i}")));
					}

					let replaced = HistoryMessage::assistant(replacement.clone()).with_id(id.clone());
					prop_assert_eq!(store.upsert(replaced), Upsert::Replaced);

					prop_assert_eq!(store.len(), before + after + 1);
					prop_assert_eq!(store.position(&id), Some(before));
					prop_assert_eq!(store.messages().iter().filter(|m| m.id == id).count(), 1);
					prop_assert_eq!(store.get(&id).unwrap().text(), replacement);
			}
	}

	/// **Test: a tool_use stays pending until a later tool_result exists**
	#[test]
	fn test_pending_tool_uses_in_order() {
		let mut store = HistoryStore::new();
		store.upsert(HistoryMessage::user("go"));
		store.upsert(tool_use("a"));
		store.upsert(tool_use("b"));
		store.upsert(tool_result("a"));
		store.upsert(tool_use("c"));

		let pending: Vec<String> = store.pending_tool_uses().into_iter().map(|t| t.id).collect();
		assert_eq!(pending, vec!["b".to_string(), "c".to_string()]);
	}

	/// **Test: a tool_result before its tool_use does not answer it**
	#[test]
	fn test_result_must_come_later() {
		let mut store = HistoryStore::new();
		store.upsert(tool_result("x"));
		store.upsert(tool_use("x"));
		assert_eq!(store.pending_tool_uses().len(), 1);
	}

	#[test]
	fn test_remove_reindexes() {
		let mut store = HistoryStore::new();
		let a = HistoryMessage::user("a");
		let b = HistoryMessage::user("b");
		let c = HistoryMessage::user("c");
		let (a_id, c_id) = (a.id.clone(), c.id.clone());
		store.upsert(a);
		store.upsert(b);
		store.upsert(c);

		assert!(store.remove(&a_id).is_some());
		assert_eq!(store.position(&c_id), Some(1));
		assert!(!store.contains(&a_id));
	}

	#[test]
	fn test_update_in_place() {
		let mut store = HistoryStore::new();
		let msg = tool_use("t1");
		let id = msg.id.clone();
		store.upsert(msg);

		let updated = store
			.update(&id, |m| m.flags.is_calling = true)
			.expect("message exists");
		assert!(updated.flags.is_calling);
		assert!(store.get(&id).unwrap().flags.is_calling);
		assert!(store.update(&MessageId::new(), |_| {}).is_none());
	}

	/// **Test: compaction never separates a tool_use from its tool_result**
	#[test]
	fn test_compaction_cut_respects_tool_pairs() {
		let mut store = HistoryStore::new();
		store.upsert(HistoryMessage::user("1"));
		store.upsert(HistoryMessage::assistant("2"));
		store.upsert(HistoryMessage::user("3"));
		store.upsert(tool_use("t"));
		store.upsert(tool_result("t"));
		store.upsert(HistoryMessage::assistant("done"));

		// keep 2 would cut between tool_use (3) and tool_result (4)
		assert_eq!(store.compaction_cut(2), 3);
		assert_eq!(store.compaction_cut(3), 3);
		assert_eq!(store.compaction_cut(10), 0);
	}

	#[test]
	fn test_drain_front() {
		let mut store = HistoryStore::new();
		for i in 0..5 {
			store.upsert(HistoryMessage::user(format!("{i}")));
		}
		let last_id = store.last().unwrap().id.clone();
		let drained = store.drain_front(3);
		assert_eq!(drained.len(), 3);
		assert_eq!(store.len(), 2);
		assert_eq!(store.position(&last_id), Some(1));
	}

	#[test]
	fn test_serde_roundtrip_rebuilds_index() {
		let mut store = HistoryStore::new();
		store.upsert(HistoryMessage::user("hi"));
		store.upsert(HistoryMessage::assistant_blocks(
			None,
			vec![ContentBlock::Text {
				text: "hello".to_string(),
			}],
		));
		let json = serde_json::to_string(&store).unwrap();
		let back: HistoryStore = serde_json::from_str(&json).unwrap();
		assert_eq!(back.len(), 2);
		let id = &store.messages()[1].id;
		assert_eq!(back.position(id), Some(1));
		assert!(matches!(
			back.get(id).unwrap().content,
			MessageContent::Blocks(_)
		));
	}
}
