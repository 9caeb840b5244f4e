// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use thiserror::Error;
use weft_cli_acp::AcpError;
use weft_common_core::LlmError;

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
	#[error("LLM error: {0}")]
	Llm(#[from] LlmError),

	#[error("agent error: {0}")]
	Acp(#[from] AcpError),

	#[error("summarization failed: {0}")]
	Summarization(String),

	#[error("dual boost failed: {0}")]
	DualBoost(String),
}

impl OrchestratorError {
	pub fn is_cancelled(&self) -> bool {
		matches!(
			self,
			OrchestratorError::Llm(LlmError::Cancelled) | OrchestratorError::Acp(AcpError::Cancelled)
		)
	}
}
