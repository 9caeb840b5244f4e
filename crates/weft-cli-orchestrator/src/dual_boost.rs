// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Fan one prompt out to two providers and merge their answers.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use weft_common_core::{LlmClient, LlmError, LlmEvent, LlmRequest, StopReason};

use crate::error::{OrchestratorError, OrchestratorResult};

pub const FIRST_OUTPUT_PLACEHOLDER: &str = "{{provider1_output}}";
pub const SECOND_OUTPUT_PLACEHOLDER: &str = "{{provider2_output}}";

pub const DEFAULT_MERGE_TEMPLATE: &str = "Two assistants answered the request above \
independently.\n\n<first_answer>\n{{provider1_output}}\n</first_answer>\n\n<second_answer>\n\
{{provider2_output}}\n</second_answer>\n\nUse both answers as reference and reply with the \
best combined answer.";

pub struct DualBoost {
	first: Arc<dyn LlmClient>,
	second: Arc<dyn LlmClient>,
	template: String,
	timeout: Duration,
}

impl DualBoost {
	pub fn new(first: Arc<dyn LlmClient>, second: Arc<dyn LlmClient>) -> Self {
		Self {
			first,
			second,
			template: DEFAULT_MERGE_TEMPLATE.to_string(),
			timeout: Duration::from_secs(60),
		}
	}

	pub fn with_template(mut self, template: impl Into<String>) -> Self {
		self.template = template.into();
		self
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	/// Runs both providers on `request` and returns the merge prompt.
	///
	/// When the timeout fires first, whatever each side produced so far is
	/// merged. An error on either side fails the whole aggregation.
	#[instrument(skip_all, fields(first = self.first.name(), second = self.second.name()))]
	pub async fn aggregate(
		&self,
		request: &LlmRequest,
		cancel: &CancellationToken,
	) -> OrchestratorResult<String> {
		let streams = cancel.child_token();
		let mut first_output = String::new();
		let mut second_output = String::new();

		let result = {
			let both = futures::future::try_join(
				collect(self.first.as_ref(), request.clone(), streams.clone(), &mut first_output),
				collect(self.second.as_ref(), request.clone(), streams.clone(), &mut second_output),
			);
			tokio::select! {
				biased;
				_ = cancel.cancelled() => Err(OrchestratorError::Llm(LlmError::Cancelled)),
				result = both => result.map(|_| ()),
				_ = tokio::time::sleep(self.timeout) => {
					warn!(timeout_ms = self.timeout.as_millis() as u64, "dual boost timed out, merging partial output");
					Ok(())
				}
			}
		};
		streams.cancel();
		result?;

		info!(
			first_chars = first_output.len(),
			second_chars = second_output.len(),
			"dual boost aggregated"
		);
		Ok(render_merge(&self.template, &first_output, &second_output))
	}
}

pub fn render_merge(template: &str, first: &str, second: &str) -> String {
	template
		.replace(FIRST_OUTPUT_PLACEHOLDER, first)
		.replace(SECOND_OUTPUT_PLACEHOLDER, second)
}

async fn collect(
	client: &dyn LlmClient,
	request: LlmRequest,
	cancel: CancellationToken,
	output: &mut String,
) -> OrchestratorResult<()> {
	let name = client.name().to_string();
	let mut stream = client
		.complete_streaming(request, cancel)
		.await
		.map_err(|e| OrchestratorError::DualBoost(format!("{name}: {e}")))?;

	while let Some(event) = stream.next().await {
		match event {
			LlmEvent::TextDelta { content } => output.push_str(&content),
			LlmEvent::Stop(reason) if reason.is_terminal() => {
				debug!(provider = %name, reason = reason.name(), "dual boost side stopped");
				return match reason {
					StopReason::Cancelled => Err(OrchestratorError::Llm(LlmError::Cancelled)),
					StopReason::Error(e) => Err(OrchestratorError::DualBoost(format!("{name}: {e}"))),
					StopReason::RateLimit { retry_after_secs } => Err(OrchestratorError::DualBoost(
						format!("{name}: rate limited, retry after {retry_after_secs}s"),
					)),
					_ => Ok(()),
				};
			}
			_ => {}
		}
	}
	Ok(())
}
