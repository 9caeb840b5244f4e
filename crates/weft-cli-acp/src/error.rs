// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Error types for ACP integration.

use agent_client_protocol as acp;
use thiserror::Error;
use weft_common_core::LlmError;

/// Errors that can occur during ACP operations.
#[derive(Debug, Error)]
pub enum AcpError {
	/// The agent no longer knows the session.
	#[error("session not found: {0}")]
	SessionNotFound(String),

	/// Recovery already ran once for this prompt and the session was lost again.
	#[error("session recovery exhausted: {0}")]
	SessionRecoveryExhausted(String),

	#[error("no active session")]
	NoSession,

	#[error("not connected to agent")]
	NotConnected,

	#[error("agent process exited")]
	ProcessExited,

	/// Error response from the agent.
	#[error("agent error: {0}")]
	Agent(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("cancelled")]
	Cancelled,
}

impl AcpError {
	pub fn is_session_not_found(&self) -> bool {
		matches!(self, AcpError::SessionNotFound(_))
	}
}

impl From<acp::Error> for AcpError {
	/// Classifies an error response from the agent.
	fn from(err: acp::Error) -> Self {
		let data = err
			.data
			.as_ref()
			.map(|d| d.to_string())
			.unwrap_or_default();
		if is_session_not_found(&err.message) || is_session_not_found(&data) {
			return AcpError::SessionNotFound(err.message);
		}
		if data.is_empty() {
			AcpError::Agent(err.message)
		} else {
			AcpError::Agent(format!("{}: {data}", err.message))
		}
	}
}

fn is_session_not_found(text: &str) -> bool {
	let lower = text.to_ascii_lowercase();
	lower.contains("session not found")
		|| (lower.contains("session") && lower.contains("not found"))
		|| lower.contains("unknown session")
}

/// Internal error carrying `detail` for the agent.
pub(crate) fn internal_error(detail: impl Into<String>) -> acp::Error {
	let mut err = acp::Error::internal_error();
	err.data = Some(serde_json::Value::String(detail.into()));
	err
}

impl From<AcpError> for LlmError {
	fn from(err: AcpError) -> Self {
		match err {
			AcpError::SessionNotFound(msg) | AcpError::SessionRecoveryExhausted(msg) => {
				LlmError::SessionInvalid(msg)
			}
			AcpError::Cancelled => LlmError::Cancelled,
			AcpError::Agent(message) => LlmError::Api(message),
			other => LlmError::Transport(other.to_string()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn agent_error(message: &str, data: Option<serde_json::Value>) -> acp::Error {
		let mut err = acp::Error::internal_error();
		err.message = message.to_string();
		err.data = data;
		err
	}

	#[test]
	fn test_session_not_found_detected_in_message_or_data() {
		let err = AcpError::from(agent_error("Session not found: abc", None));
		assert!(err.is_session_not_found());

		let err = AcpError::from(agent_error(
			"Invalid params",
			Some(serde_json::json!({"reason": "session abc not found"})),
		));
		assert!(err.is_session_not_found());

		let err = AcpError::from(agent_error("model overloaded", None));
		assert!(matches!(err, AcpError::Agent(ref m) if m == "model overloaded"));
	}

	#[test]
	fn test_internal_error_carries_detail() {
		let err = AcpError::from(internal_error("disk full"));
		assert!(matches!(err, AcpError::Agent(ref m) if m.contains("disk full")));
	}

	#[test]
	fn test_maps_to_llm_error() {
		let err: LlmError = AcpError::SessionRecoveryExhausted("gone".to_string()).into();
		assert_eq!(err, LlmError::SessionInvalid("gone".to_string()));
		let err: LlmError = AcpError::ProcessExited.into();
		assert!(matches!(err, LlmError::Transport(_)));
		let err: LlmError = AcpError::Agent("refused".to_string()).into();
		assert_eq!(err, LlmError::Api("refused".to_string()));
	}
}
