// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Configuration sources: defaults, TOML files, environment, command line.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::{
	AcpConfigLayer, BehaviourConfigLayer, DualBoostConfigLayer, LoggingConfigLayer, ProviderConfigLayer,
	ProviderKind, RecoveryConfigLayer, WeftConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	UserFile = 20,
	WorkspaceFile = 30,
	Environment = 50,
	Cli = 60,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<WeftConfigLayer, ConfigError>;
}

/// Built-in defaults: both known providers, Anthropic selected.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<WeftConfigLayer, ConfigError> {
		debug!("loading defaults");
		let providers = BTreeMap::from([
			(
				"anthropic".to_string(),
				ProviderConfigLayer {
					kind: Some(ProviderKind::Anthropic),
					..Default::default()
				},
			),
			(
				"openai".to_string(),
				ProviderConfigLayer {
					kind: Some(ProviderKind::OpenAi),
					..Default::default()
				},
			),
		]);
		Ok(WeftConfigLayer {
			provider: Some("anthropic".to_string()),
			providers: Some(providers),
			..Default::default()
		})
	}
}

/// TOML file configuration source. A missing file yields an empty layer.
pub struct TomlSource {
	path: PathBuf,
	precedence: Precedence,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>, precedence: Precedence) -> Self {
		Self {
			path: path.into(),
			precedence,
		}
	}

	pub fn user(path: impl Into<PathBuf>) -> Self {
		Self::new(path, Precedence::UserFile)
	}

	pub fn workspace(path: impl Into<PathBuf>) -> Self {
		Self::new(path, Precedence::WorkspaceFile)
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		match self.precedence {
			Precedence::WorkspaceFile => "workspace-config",
			_ => "user-config",
		}
	}

	fn precedence(&self) -> Precedence {
		self.precedence
	}

	fn load(&self) -> Result<WeftConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(WeftConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: WeftConfigLayer = toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
			path: self.path.clone(),
			source: e,
		})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: `WEFT_<FIELD>` for top-level behaviour knobs and
/// `WEFT_<SECTION>_<FIELD>` otherwise.
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<WeftConfigLayer, ConfigError> {
		debug!("loading environment variables");
		layer_from_env(|name| std::env::var(name).ok())
	}
}

/// Builds the environment layer from an arbitrary variable lookup.
pub(crate) fn layer_from_env<F>(lookup: F) -> Result<WeftConfigLayer, ConfigError>
where
	F: Fn(&str) -> Option<String>,
{
	let env = EnvReader { lookup };
	Ok(WeftConfigLayer {
		provider: env.var("WEFT_PROVIDER"),
		providers: None,
		acp: Some(AcpConfigLayer {
			command: env.var("WEFT_ACP_COMMAND"),
			args: env
				.var("WEFT_ACP_ARGS")
				.map(|v| v.split_whitespace().map(str::to_string).collect()),
			env: None,
			auto_reject_in_plan_mode: env.bool("WEFT_ACP_AUTO_REJECT_IN_PLAN_MODE"),
		}),
		behaviour: Some(BehaviourConfigLayer {
			agentic: env.bool("WEFT_AGENTIC"),
			max_completion_reminders: env.parse("WEFT_MAX_COMPLETION_REMINDERS")?,
			compaction_threshold: env.parse("WEFT_COMPACTION_THRESHOLD")?,
			keep_turn_artifacts: env.bool("WEFT_KEEP_TURN_ARTIFACTS"),
			prompt_token_budget: env.parse("WEFT_PROMPT_TOKEN_BUDGET")?,
		}),
		dual_boost: Some(DualBoostConfigLayer {
			enabled: env.bool("WEFT_DUAL_BOOST_ENABLED"),
			first_provider: env.var("WEFT_DUAL_BOOST_FIRST_PROVIDER"),
			second_provider: env.var("WEFT_DUAL_BOOST_SECOND_PROVIDER"),
			template: None,
			timeout_ms: env.parse("WEFT_DUAL_BOOST_TIMEOUT_MS")?,
		}),
		recovery: Some(RecoveryConfigLayer {
			max_messages: env.parse("WEFT_RECOVERY_MAX_MESSAGES")?,
			max_message_chars: env.parse("WEFT_RECOVERY_MAX_MESSAGE_CHARS")?,
		}),
		logging: Some(LoggingConfigLayer {
			level: env.var("WEFT_LOG_LEVEL"),
		}),
	})
}

struct EnvReader<F> {
	lookup: F,
}

impl<F> EnvReader<F>
where
	F: Fn(&str) -> Option<String>,
{
	fn var(&self, name: &str) -> Option<String> {
		(self.lookup)(name).filter(|s| !s.is_empty())
	}

	fn bool(&self, name: &str) -> Option<bool> {
		self
			.var(name)
			.map(|v| v.eq_ignore_ascii_case("true") || v == "1")
	}

	fn parse<T: std::str::FromStr>(&self, name: &str) -> Result<Option<T>, ConfigError> {
		match self.var(name) {
			Some(v) => v.parse().map(Some).map_err(|_| {
				ConfigError::invalid_value(name, format!("cannot parse '{v}'"))
			}),
			None => Ok(None),
		}
	}
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
	pub provider: Option<String>,
	pub dual_boost: Option<bool>,
	pub log_level: Option<String>,
}

pub struct CliSource {
	overrides: CliOverrides,
}

impl CliSource {
	pub fn new(overrides: CliOverrides) -> Self {
		Self { overrides }
	}
}

impl ConfigSource for CliSource {
	fn name(&self) -> &'static str {
		"cli"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Cli
	}

	fn load(&self) -> Result<WeftConfigLayer, ConfigError> {
		let overrides = self.overrides.clone();
		Ok(WeftConfigLayer {
			provider: overrides.provider,
			dual_boost: overrides.dual_boost.map(|enabled| DualBoostConfigLayer {
				enabled: Some(enabled),
				..Default::default()
			}),
			logging: overrides
				.log_level
				.map(|level| LoggingConfigLayer { level: Some(level) }),
			..Default::default()
		})
	}
}
