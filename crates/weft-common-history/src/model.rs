// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use weft_common_core::{Memory, Plan};

use crate::error::ConversationIdError;
use crate::store::HistoryStore;

/// Identity of a conversation on disk.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
	pub fn new() -> Self {
		Self(format!("C-{}", uuid::Uuid::new_v4()))
	}

	pub fn parse(s: &str) -> Result<Self, ConversationIdError> {
		let Some(uuid_part) = s.strip_prefix("C-") else {
			return Err(ConversationIdError::InvalidPrefix(
				s.chars().take(2).collect::<String>(),
			));
		};
		uuid::Uuid::parse_str(uuid_part)?;
		Ok(Self(s.to_string()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Default for ConversationId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for ConversationId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for ConversationId {
	type Err = ConversationIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

/// Everything persisted for one conversation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationRecord {
	pub id: ConversationId,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub acp_session_id: Option<String>,
	#[serde(default)]
	pub history: HistoryStore,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub memory: Option<Memory>,
	#[serde(default)]
	pub plan: Plan,
	pub updated_at: DateTime<Utc>,
}

impl ConversationRecord {
	pub fn new(id: ConversationId) -> Self {
		Self {
			id,
			acp_session_id: None,
			history: HistoryStore::new(),
			memory: None,
			plan: Plan::default(),
			updated_at: Utc::now(),
		}
	}

	pub fn touch(&mut self) {
		self.updated_at = Utc::now();
	}
}
