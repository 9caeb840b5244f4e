// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{HistoryMessage, MessageId};

/// Rolling summary of compacted history.
///
/// Each summarization produces a new value that replaces the old one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Memory {
	pub content: String,
	pub last_summarized_timestamp: DateTime<Utc>,
	pub last_message_uuid: MessageId,
}

impl Memory {
	/// Synthetic context message prepended to future prompts.
	pub fn to_context_message(&self) -> HistoryMessage {
		HistoryMessage::context(format!("<memory>\n{}\n</memory>", self.content))
	}
}
