// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Name of the tool the model calls to declare an agentic task finished.
pub const COMPLETION_TOOL_NAME: &str = "attempt_completion";

/// Runtime knobs for the turn orchestrator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TurnConfig {
	pub model_name: String,
	pub max_tokens: u32,
	pub temperature: Option<f32>,
	/// Model context window in tokens.
	pub context_window: u32,
	/// Token budget for history in a resolved prompt. Defaults to half the
	/// context window when unset.
	pub prompt_token_budget: Option<u32>,
	/// Fraction of the context window that triggers memory summarization.
	pub compaction_threshold: f32,
	/// Messages kept live when history is summarized.
	pub keep_recent_messages: usize,
	/// Agentic mode enables completion reminders.
	pub agentic: bool,
	pub max_completion_reminders: u32,
	/// Hard ceiling on reminders while todos are outstanding.
	pub max_todo_reminders: u32,
	pub completion_tool_name: String,
	#[serde(with = "humantime_serde")]
	pub tool_timeout: Duration,
}

impl TurnConfig {
	pub fn history_budget(&self) -> usize {
		self
			.prompt_token_budget
			.unwrap_or(self.context_window / 2) as usize
	}

	pub fn compaction_limit(&self) -> usize {
		(self.context_window as f64 * self.compaction_threshold as f64) as usize
	}
}

impl Default for TurnConfig {
	fn default() -> Self {
		Self {
			model_name: "claude-sonnet-4-20250514".to_string(),
			max_tokens: 8192,
			temperature: None,
			context_window: 200_000,
			prompt_token_budget: None,
			compaction_threshold: 0.9,
			keep_recent_messages: 4,
			agentic: true,
			max_completion_reminders: 3,
			max_todo_reminders: 10,
			completion_tool_name: COMPLETION_TOOL_NAME.to_string(),
			tool_timeout: Duration::from_secs(120),
		}
	}
}

mod humantime_serde {
	use serde::{Deserialize, Deserializer, Serialize, Serializer};
	use std::time::Duration;

	pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		duration.as_secs().serialize(serializer)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let secs = u64::deserialize(deserializer)?;
		Ok(Duration::from_secs(secs))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_compaction_limit_is_ninety_percent() {
		let config = TurnConfig {
			context_window: 1000,
			..TurnConfig::default()
		};
		assert_eq!(config.compaction_limit(), 900);
		assert_eq!(config.history_budget(), 500);
	}

	#[test]
	fn test_timeout_serializes_as_seconds() {
		let config = TurnConfig::default();
		let json = serde_json::to_value(&config).unwrap();
		assert_eq!(json["tool_timeout"], 120);
	}
}
