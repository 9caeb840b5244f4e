// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Builds backends from resolved configuration.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use weft_cli_acp::{
	AcpConfig, AcpSessionManager, PermissionConfirmer, SubprocessLauncher, TruncationConfig,
	WorkspaceFiles,
};
use weft_cli_config::{ProviderConfig, ProviderKind, WeftConfig};
use weft_cli_orchestrator::DualBoost;
use weft_common_core::LlmClient;
use weft_llm_anthropic::{AnthropicAdapter, AnthropicConfig};
use weft_llm_openai::{OpenAIAdapter, OpenAIConfig};
use weft_llm_transport::{HttpLlmClient, ProviderAdapter, TransportClient, TransportOptions};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Streaming HTTP client for one configured provider.
pub fn http_client(provider: &ProviderConfig, config: &WeftConfig) -> Result<Arc<dyn LlmClient>> {
	let api_key = provider
		.api_key()
		.with_context(|| format!("no API key for provider '{}'", provider.name))?;

	let adapter: Arc<dyn ProviderAdapter> = match provider.kind {
		ProviderKind::Anthropic => Arc::new(
			AnthropicAdapter::new(
				AnthropicConfig::new(api_key)
					.with_base_url(&provider.endpoint)
					.with_model(&provider.model),
			)
			.with_disable_stream(provider.disable_stream),
		),
		ProviderKind::OpenAi => Arc::new(
			OpenAIAdapter::new(
				OpenAIConfig::new(api_key)
					.with_base_url(&provider.endpoint)
					.with_model(&provider.model),
			)
			.with_disable_stream(provider.disable_stream),
		),
	};

	let http = weft_llm_transport::builder()
		.connect_timeout(CONNECT_TIMEOUT)
		.build()
		.context("failed to build HTTP client")?;
	let options = TransportOptions {
		keep_artifacts: config.behaviour.keep_turn_artifacts,
		artifact_dir: Some(config.paths.artifacts_dir()),
		idle_timeout: provider.timeout(),
	};

	info!(
		provider = %provider.name,
		kind = %provider.kind,
		model = %provider.model,
		"created HTTP LLM client"
	);
	Ok(Arc::new(HttpLlmClient::new(
		TransportClient::new(http, options),
		adapter,
	)))
}

/// The aggregator over the two configured dual-boost providers.
pub fn dual_boost(config: &WeftConfig) -> Result<DualBoost> {
	let settings = &config.dual_boost;
	let first = http_client(config.provider(&settings.first_provider)?, config)?;
	let second = http_client(config.provider(&settings.second_provider)?, config)?;

	let mut boost =
		DualBoost::new(first, second).with_timeout(Duration::from_millis(settings.timeout_ms));
	if let Some(template) = &settings.template {
		boost = boost.with_template(template.clone());
	}
	Ok(boost)
}

/// Session manager for the configured agent subprocess.
pub fn acp_manager(
	config: &WeftConfig,
	workspace: &Path,
	confirmer: Arc<dyn PermissionConfirmer>,
) -> Result<AcpSessionManager> {
	let command = config
		.acp
		.command
		.clone()
		.context("ACP mode needs `command` in the [acp] configuration section")?;

	let launcher = SubprocessLauncher::new(command)
		.with_args(config.acp.args.clone())
		.with_env(config.acp.env.clone())
		.with_cwd(workspace);

	let mut acp_config = AcpConfig::new(workspace);
	acp_config.auto_reject_in_plan_mode = config.acp.auto_reject_in_plan_mode;
	acp_config.truncation = TruncationConfig {
		max_messages: config.recovery.max_messages,
		max_message_chars: config.recovery.max_message_chars,
		..TruncationConfig::default()
	};

	Ok(AcpSessionManager::new(
		Arc::new(launcher),
		confirmer,
		Arc::new(WorkspaceFiles::new()),
		acp_config,
	))
}

#[cfg(test)]
mod tests {
	use super::*;
	use weft_cli_acp::{ConnectionState, FixedConfirmer, PermissionDecision};
	use weft_cli_config::{ConfigSource, DefaultsSource, PathsConfig, WeftConfigLayer};

	fn config_from(overlay: &str) -> WeftConfig {
		let dir = std::env::temp_dir();
		let mut layer = DefaultsSource.load().unwrap();
		layer.merge(toml_layer(overlay));
		weft_cli_config::finalize(
			layer,
			PathsConfig {
				user_config_file: dir.join("weft-test/config.toml"),
				data_dir: dir.join("weft-test/data"),
				cache_dir: dir.join("weft-test/cache"),
			},
		)
		.unwrap()
	}

	fn toml_layer(text: &str) -> WeftConfigLayer {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.toml");
		std::fs::write(&path, text).unwrap();
		weft_cli_config::TomlSource::user(&path).load().unwrap()
	}

	#[test]
	fn test_http_client_requires_api_key() {
		let config = config_from(
			r#"
[providers.anthropic]
api_key_env = "WEFT_CLI_TEST_UNSET_KEY"
"#,
		);
		let err = match http_client(config.selected_provider().unwrap(), &config) {
			Ok(_) => panic!("client built without a key"),
			Err(e) => e,
		};
		assert!(err.to_string().contains("no API key"));
	}

	#[test]
	fn test_http_client_named_after_dialect() {
		std::env::set_var("WEFT_CLI_TEST_OPENAI_KEY", "sk-test");
		let config = config_from(
			r#"
provider = "local"

[providers.local]
kind = "openai"
endpoint = "http://127.0.0.1:9/v1"
api_key_env = "WEFT_CLI_TEST_OPENAI_KEY"
"#,
		);
		let client = http_client(config.selected_provider().unwrap(), &config).unwrap();
		assert_eq!(client.name(), "openai");
	}

	#[test]
	fn test_acp_manager_requires_command() {
		let config = config_from("");
		let confirmer = Arc::new(FixedConfirmer(PermissionDecision::RejectOnce));
		assert!(acp_manager(&config, Path::new("/tmp"), confirmer).is_err());
	}

	#[test]
	fn test_acp_manager_starts_disconnected() {
		let config = config_from(
			r#"
[acp]
command = "my-agent"
args = ["--acp"]
"#,
		);
		let confirmer = Arc::new(FixedConfirmer(PermissionDecision::AllowOnce));
		let manager = acp_manager(&config, Path::new("/tmp"), confirmer).unwrap();
		assert_eq!(manager.state(), ConnectionState::Disconnected);
		assert!(manager.session_id().is_none());
	}
}
