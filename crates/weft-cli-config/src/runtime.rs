// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Fully resolved configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::info;
use weft_common_core::TurnConfig;

use crate::error::ConfigError;
use crate::layer::{ProviderConfigLayer, ProviderKind, WeftConfigLayer};
use crate::paths::PathsConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
	pub name: String,
	pub kind: ProviderKind,
	pub endpoint: String,
	pub model: String,
	pub api_key_env: String,
	pub context_window: u32,
	pub max_tokens: u32,
	/// Parse the full body once instead of streaming frames.
	pub disable_stream: bool,
	pub timeout_secs: u64,
}

impl ProviderConfig {
	fn finalize(name: &str, layer: ProviderConfigLayer) -> Result<Self, ConfigError> {
		let kind = match layer.kind {
			Some(kind) => kind,
			None => name.parse().map_err(|_| {
				ConfigError::invalid_value(format!("providers.{name}.kind"), "missing provider kind")
			})?,
		};
		let (endpoint, model, api_key_env, context_window, max_tokens) = match kind {
			ProviderKind::Anthropic => (
				"https://api.anthropic.com",
				"claude-sonnet-4-20250514",
				"ANTHROPIC_API_KEY",
				200_000,
				8192,
			),
			ProviderKind::OpenAi => (
				"https://api.openai.com/v1",
				"gpt-4o",
				"OPENAI_API_KEY",
				128_000,
				4096,
			),
		};
		Ok(Self {
			name: name.to_string(),
			kind,
			endpoint: layer.endpoint.unwrap_or_else(|| endpoint.to_string()),
			model: layer.model.unwrap_or_else(|| model.to_string()),
			api_key_env: layer.api_key_env.unwrap_or_else(|| api_key_env.to_string()),
			context_window: layer.context_window.unwrap_or(context_window),
			max_tokens: layer.max_tokens.unwrap_or(max_tokens),
			disable_stream: layer.disable_stream.unwrap_or(false),
			timeout_secs: layer.timeout_secs.unwrap_or(300),
		})
	}

	/// Reads the API key from the configured environment variable.
	pub fn api_key(&self) -> Result<String, ConfigError> {
		std::env::var(&self.api_key_env)
			.ok()
			.filter(|k| !k.is_empty())
			.ok_or_else(|| {
				ConfigError::invalid_value(&self.api_key_env, "environment variable is not set")
			})
	}

	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_secs)
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcpSettings {
	/// Agent executable. ACP mode is unavailable when unset.
	pub command: Option<String>,
	pub args: Vec<String>,
	pub env: Vec<(String, String)>,
	pub auto_reject_in_plan_mode: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BehaviourConfig {
	pub agentic: bool,
	pub max_completion_reminders: u32,
	pub compaction_threshold: f32,
	pub keep_turn_artifacts: bool,
	pub prompt_token_budget: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DualBoostConfig {
	pub enabled: bool,
	pub first_provider: String,
	pub second_provider: String,
	/// Merge prompt template; the built-in one is used when unset.
	pub template: Option<String>,
	pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryConfig {
	pub max_messages: usize,
	pub max_message_chars: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
	pub level: String,
}

/// Fully resolved weft configuration.
#[derive(Debug, Clone)]
pub struct WeftConfig {
	pub provider: String,
	pub providers: BTreeMap<String, ProviderConfig>,
	pub acp: AcpSettings,
	pub behaviour: BehaviourConfig,
	pub dual_boost: DualBoostConfig,
	pub recovery: RecoveryConfig,
	pub logging: LoggingConfig,
	pub paths: PathsConfig,
}

impl WeftConfig {
	/// The provider named by `provider`.
	pub fn selected_provider(&self) -> Result<&ProviderConfig, ConfigError> {
		self.provider(&self.provider)
	}

	pub fn provider(&self, name: &str) -> Result<&ProviderConfig, ConfigError> {
		self
			.providers
			.get(name)
			.ok_or_else(|| ConfigError::ProviderNotFound(name.to_string()))
	}

	/// Engine knobs for the selected provider.
	pub fn turn_config(&self) -> Result<TurnConfig, ConfigError> {
		let provider = self.selected_provider()?;
		Ok(TurnConfig {
			model_name: provider.model.clone(),
			max_tokens: provider.max_tokens,
			context_window: provider.context_window,
			prompt_token_budget: self.behaviour.prompt_token_budget,
			compaction_threshold: self.behaviour.compaction_threshold,
			agentic: self.behaviour.agentic,
			max_completion_reminders: self.behaviour.max_completion_reminders,
			..TurnConfig::default()
		})
	}
}

/// Resolves a merged layer into a validated [`WeftConfig`].
pub fn finalize(layer: WeftConfigLayer, paths: PathsConfig) -> Result<WeftConfig, ConfigError> {
	let defaults = TurnConfig::default();

	let mut providers = BTreeMap::new();
	for (name, provider) in layer.providers.unwrap_or_default() {
		let resolved = ProviderConfig::finalize(&name, provider)?;
		providers.insert(name, resolved);
	}

	let provider = layer.provider.unwrap_or_else(|| "anthropic".to_string());

	let acp = layer.acp.unwrap_or_default();
	let acp = AcpSettings {
		command: acp.command,
		args: acp.args.unwrap_or_default(),
		env: acp.env.unwrap_or_default().into_iter().collect(),
		auto_reject_in_plan_mode: acp.auto_reject_in_plan_mode.unwrap_or(true),
	};

	let behaviour = layer.behaviour.unwrap_or_default();
	let behaviour = BehaviourConfig {
		agentic: behaviour.agentic.unwrap_or(defaults.agentic),
		max_completion_reminders: behaviour
			.max_completion_reminders
			.unwrap_or(defaults.max_completion_reminders),
		compaction_threshold: behaviour
			.compaction_threshold
			.unwrap_or(defaults.compaction_threshold),
		keep_turn_artifacts: behaviour.keep_turn_artifacts.unwrap_or(false),
		prompt_token_budget: behaviour.prompt_token_budget,
	};

	let dual_boost = layer.dual_boost.unwrap_or_default();
	let dual_boost = DualBoostConfig {
		enabled: dual_boost.enabled.unwrap_or(false),
		first_provider: dual_boost
			.first_provider
			.unwrap_or_else(|| "anthropic".to_string()),
		second_provider: dual_boost
			.second_provider
			.unwrap_or_else(|| "openai".to_string()),
		template: dual_boost.template,
		timeout_ms: dual_boost.timeout_ms.unwrap_or(60_000),
	};

	let recovery = layer.recovery.unwrap_or_default();
	let recovery = RecoveryConfig {
		max_messages: recovery.max_messages.unwrap_or(20),
		max_message_chars: recovery.max_message_chars.unwrap_or(4_000),
	};

	let logging = LoggingConfig {
		level: layer
			.logging
			.and_then(|l| l.level)
			.unwrap_or_else(|| "info".to_string())
			.to_lowercase(),
	};

	let config = WeftConfig {
		provider,
		providers,
		acp,
		behaviour,
		dual_boost,
		recovery,
		logging,
		paths,
	};
	validate_config(&config)?;

	info!(
		provider = %config.provider,
		providers = config.providers.len(),
		acp_configured = config.acp.command.is_some(),
		dual_boost = config.dual_boost.enabled,
		agentic = config.behaviour.agentic,
		"weft configuration loaded"
	);

	Ok(config)
}

/// Validate cross-field configuration rules.
fn validate_config(config: &WeftConfig) -> Result<(), ConfigError> {
	if !config.providers.contains_key(&config.provider) {
		return Err(ConfigError::validation(format!(
			"selected provider '{}' is not defined under [providers]",
			config.provider
		)));
	}

	let threshold = config.behaviour.compaction_threshold;
	if !(threshold > 0.0 && threshold <= 1.0) {
		return Err(ConfigError::validation(format!(
			"behaviour.compaction_threshold must be in (0, 1], got {threshold}"
		)));
	}

	if config.behaviour.prompt_token_budget == Some(0) {
		return Err(ConfigError::validation(
			"behaviour.prompt_token_budget must be positive",
		));
	}

	for provider in config.providers.values() {
		if provider.context_window == 0 || provider.max_tokens == 0 {
			return Err(ConfigError::validation(format!(
				"providers.{}: context_window and max_tokens must be positive",
				provider.name
			)));
		}
	}

	if config.dual_boost.enabled {
		for name in [
			&config.dual_boost.first_provider,
			&config.dual_boost.second_provider,
		] {
			if !config.providers.contains_key(name) {
				return Err(ConfigError::validation(format!(
					"dual_boost provider '{name}' is not defined under [providers]"
				)));
			}
		}
		if config.dual_boost.timeout_ms == 0 {
			return Err(ConfigError::validation(
				"dual_boost.timeout_ms must be positive",
			));
		}
	}

	if config.recovery.max_messages == 0 || config.recovery.max_message_chars == 0 {
		return Err(ConfigError::validation(
			"recovery.max_messages and recovery.max_message_chars must be positive",
		));
	}

	if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
		return Err(ConfigError::invalid_value(
			"logging.level",
			format!("expected one of {}", LOG_LEVELS.join(", ")),
		));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sources::{ConfigSource, DefaultsSource};
	use std::path::PathBuf;

	fn paths() -> PathsConfig {
		PathsConfig {
			user_config_file: PathBuf::from("/tmp/weft/config.toml"),
			data_dir: PathBuf::from("/tmp/weft/data"),
			cache_dir: PathBuf::from("/tmp/weft/cache"),
		}
	}

	fn with_defaults(overlay: &str) -> WeftConfigLayer {
		let mut layer = DefaultsSource.load().unwrap();
		layer.merge(toml::from_str(overlay).unwrap());
		layer
	}

	#[test]
	fn test_defaults_resolve() {
		let config = finalize(DefaultsSource.load().unwrap(), paths()).unwrap();
		let provider = config.selected_provider().unwrap();
		assert_eq!(provider.kind, ProviderKind::Anthropic);
		assert_eq!(provider.api_key_env, "ANTHROPIC_API_KEY");
		assert_eq!(config.providers["openai"].context_window, 128_000);
		assert!(config.acp.auto_reject_in_plan_mode);
		assert_eq!(config.logging.level, "info");
		assert!(!config.dual_boost.enabled);
	}

	/// **Test: an unknown selected provider is a validation error**
	#[test]
	fn test_unknown_provider_rejected() {
		let err = finalize(with_defaults(r#"provider = "nope""#), paths()).unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
		assert!(err.to_string().contains("nope"));
	}

	#[test]
	fn test_threshold_out_of_range_rejected() {
		for value in ["0.0", "1.5", "-0.2"] {
			let overlay = format!("[behaviour]\ncompaction_threshold = {value}");
			let err = finalize(with_defaults(&overlay), paths()).unwrap_err();
			assert!(matches!(err, ConfigError::Validation(_)), "{value}");
		}
		assert!(finalize(
			with_defaults("[behaviour]\ncompaction_threshold = 1.0"),
			paths()
		)
		.is_ok());
	}

	#[test]
	fn test_dual_boost_requires_known_providers() {
		let err = finalize(
			with_defaults(
				r#"
				[dual_boost]
				enabled = true
				second_provider = "missing"
				"#,
			),
			paths(),
		)
		.unwrap_err();
		assert!(err.to_string().contains("missing"));
	}

	#[test]
	fn test_custom_provider_needs_kind() {
		let err = finalize(
			with_defaults("[providers.local]\nendpoint = \"http://localhost\""),
			paths(),
		)
		.unwrap_err();
		assert!(matches!(err, ConfigError::InvalidValue { .. }));
	}

	#[test]
	fn test_bad_log_level_rejected() {
		let err = finalize(with_defaults("[logging]\nlevel = \"loud\""), paths()).unwrap_err();
		assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "logging.level"));
	}

	/// **Test: engine knobs come from the selected provider and behaviour section**
	#[test]
	fn test_turn_config_mapping() {
		let config = finalize(
			with_defaults(
				r#"
				provider = "local"

				[providers.local]
				kind = "openai"
				model = "qwen"
				context_window = 32000
				max_tokens = 2048

				[behaviour]
				agentic = false
				max_completion_reminders = 1
				prompt_token_budget = 10000
				"#,
			),
			paths(),
		)
		.unwrap();

		let turn = config.turn_config().unwrap();
		assert_eq!(turn.model_name, "qwen");
		assert_eq!(turn.context_window, 32_000);
		assert_eq!(turn.max_tokens, 2048);
		assert!(!turn.agentic);
		assert_eq!(turn.max_completion_reminders, 1);
		assert_eq!(turn.history_budget(), 10_000);
		assert_eq!(
			config.selected_provider().unwrap().endpoint,
			"https://api.openai.com/v1"
		);
	}

	#[test]
	fn test_api_key_missing_variable() {
		let config = finalize(
			with_defaults("[providers.anthropic]\napi_key_env = \"WEFT_TEST_KEY_THAT_IS_NEVER_SET\""),
			paths(),
		)
		.unwrap();
		let err = config.selected_provider().unwrap().api_key().unwrap_err();
		assert!(err.to_string().contains("WEFT_TEST_KEY_THAT_IS_NEVER_SET"));
	}
}
