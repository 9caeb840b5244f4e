// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Partially specified configuration, one per source.
//!
//! Every field is optional so a source only states what it knows. Layers are
//! merged in precedence order; a `Some` in the later layer wins, maps are
//! merged key by key.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Wire dialect spoken by an HTTP provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
	Anthropic,
	OpenAi,
}

impl std::fmt::Display for ProviderKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ProviderKind::Anthropic => write!(f, "anthropic"),
			ProviderKind::OpenAi => write!(f, "openai"),
		}
	}
}

impl std::str::FromStr for ProviderKind {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"anthropic" => Ok(ProviderKind::Anthropic),
			"openai" => Ok(ProviderKind::OpenAi),
			_ => Err(ConfigError::invalid_value(
				"kind",
				format!("unknown provider kind '{s}', expected 'anthropic' or 'openai'"),
			)),
		}
	}
}

pub(crate) trait Merge {
	fn merge(&mut self, other: Self);
}

fn overlay<T>(slot: &mut Option<T>, value: Option<T>) {
	if value.is_some() {
		*slot = value;
	}
}

fn merge_section<T: Merge>(slot: &mut Option<T>, value: Option<T>) {
	let Some(next) = value else {
		return;
	};
	match slot {
		Some(current) => current.merge(next),
		None => *slot = Some(next),
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfigLayer {
	pub kind: Option<ProviderKind>,
	pub endpoint: Option<String>,
	pub model: Option<String>,
	/// Name of the environment variable holding the API key.
	pub api_key_env: Option<String>,
	pub context_window: Option<u32>,
	pub max_tokens: Option<u32>,
	pub disable_stream: Option<bool>,
	pub timeout_secs: Option<u64>,
}

impl Merge for ProviderConfigLayer {
	fn merge(&mut self, other: Self) {
		overlay(&mut self.kind, other.kind);
		overlay(&mut self.endpoint, other.endpoint);
		overlay(&mut self.model, other.model);
		overlay(&mut self.api_key_env, other.api_key_env);
		overlay(&mut self.context_window, other.context_window);
		overlay(&mut self.max_tokens, other.max_tokens);
		overlay(&mut self.disable_stream, other.disable_stream);
		overlay(&mut self.timeout_secs, other.timeout_secs);
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcpConfigLayer {
	pub command: Option<String>,
	pub args: Option<Vec<String>>,
	pub env: Option<BTreeMap<String, String>>,
	pub auto_reject_in_plan_mode: Option<bool>,
}

impl Merge for AcpConfigLayer {
	fn merge(&mut self, other: Self) {
		overlay(&mut self.command, other.command);
		overlay(&mut self.args, other.args);
		if let Some(env) = other.env {
			self.env.get_or_insert_with(BTreeMap::new).extend(env);
		}
		overlay(
			&mut self.auto_reject_in_plan_mode,
			other.auto_reject_in_plan_mode,
		);
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviourConfigLayer {
	pub agentic: Option<bool>,
	pub max_completion_reminders: Option<u32>,
	pub compaction_threshold: Option<f32>,
	pub keep_turn_artifacts: Option<bool>,
	pub prompt_token_budget: Option<u32>,
}

impl Merge for BehaviourConfigLayer {
	fn merge(&mut self, other: Self) {
		overlay(&mut self.agentic, other.agentic);
		overlay(
			&mut self.max_completion_reminders,
			other.max_completion_reminders,
		);
		overlay(&mut self.compaction_threshold, other.compaction_threshold);
		overlay(&mut self.keep_turn_artifacts, other.keep_turn_artifacts);
		overlay(&mut self.prompt_token_budget, other.prompt_token_budget);
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DualBoostConfigLayer {
	pub enabled: Option<bool>,
	pub first_provider: Option<String>,
	pub second_provider: Option<String>,
	pub template: Option<String>,
	pub timeout_ms: Option<u64>,
}

impl Merge for DualBoostConfigLayer {
	fn merge(&mut self, other: Self) {
		overlay(&mut self.enabled, other.enabled);
		overlay(&mut self.first_provider, other.first_provider);
		overlay(&mut self.second_provider, other.second_provider);
		overlay(&mut self.template, other.template);
		overlay(&mut self.timeout_ms, other.timeout_ms);
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryConfigLayer {
	pub max_messages: Option<usize>,
	pub max_message_chars: Option<usize>,
}

impl Merge for RecoveryConfigLayer {
	fn merge(&mut self, other: Self) {
		overlay(&mut self.max_messages, other.max_messages);
		overlay(&mut self.max_message_chars, other.max_message_chars);
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfigLayer {
	pub level: Option<String>,
}

impl Merge for LoggingConfigLayer {
	fn merge(&mut self, other: Self) {
		overlay(&mut self.level, other.level);
	}
}

/// One source's view of the whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeftConfigLayer {
	/// Name of the selected entry in `providers`.
	pub provider: Option<String>,
	pub providers: Option<BTreeMap<String, ProviderConfigLayer>>,
	pub acp: Option<AcpConfigLayer>,
	pub behaviour: Option<BehaviourConfigLayer>,
	pub dual_boost: Option<DualBoostConfigLayer>,
	pub recovery: Option<RecoveryConfigLayer>,
	pub logging: Option<LoggingConfigLayer>,
}

impl WeftConfigLayer {
	/// Merges another layer on top of this one.
	/// Values from `other` take precedence when present.
	pub fn merge(&mut self, other: WeftConfigLayer) {
		overlay(&mut self.provider, other.provider);
		if let Some(providers) = other.providers {
			let current = self.providers.get_or_insert_with(BTreeMap::new);
			for (name, layer) in providers {
				match current.get_mut(&name) {
					Some(existing) => existing.merge(layer),
					None => {
						current.insert(name, layer);
					}
				}
			}
		}
		merge_section(&mut self.acp, other.acp);
		merge_section(&mut self.behaviour, other.behaviour);
		merge_section(&mut self.dual_boost, other.dual_boost);
		merge_section(&mut self.recovery, other.recovery);
		merge_section(&mut self.logging, other.logging);
	}
}
