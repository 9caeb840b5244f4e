// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Error-message prefix that marks an explicit user rejection of a tool call.
pub const USER_DECLINED_PREFIX: &str = "User declined";

/// Result type alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Top-level error type for agent operations.
#[derive(Error, Debug)]
pub enum AgentError {
	#[error("LLM error: {0}")]
	Llm(#[from] LlmError),

	#[error("Tool error: {0}")]
	Tool(#[from] ToolError),

	#[error("Session error: {0}")]
	Session(String),

	#[error("Invalid state: {0}")]
	InvalidState(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("Operation timed out: {0}")]
	Timeout(String),

	#[error("Internal error: {0}")]
	Internal(String),
}

/// Errors that can occur while talking to a model backend.
#[derive(Clone, Error, Debug, PartialEq, Eq)]
pub enum LlmError {
	/// Network or process failure.
	#[error("transport error: {0}")]
	Transport(String),

	/// Non-success HTTP status other than 429.
	#[error("HTTP {status}: {body}")]
	HttpStatus { status: u16, body: String },

	#[error("API error: {0}")]
	Api(String),

	#[error("Request timed out")]
	Timeout,

	#[error("Invalid response: {0}")]
	InvalidResponse(String),

	#[error("Rate limited: retry after {retry_after_secs} seconds")]
	RateLimited { retry_after_secs: u64 },

	#[error("request cancelled")]
	Cancelled,

	/// The remote agent no longer knows the session.
	#[error("session invalid: {0}")]
	SessionInvalid(String),
}

/// Errors that can occur during tool execution.
#[derive(Clone, Error, Debug, PartialEq, Eq)]
pub enum ToolError {
	#[error("Tool not found: {0}")]
	NotFound(String),

	#[error("Invalid arguments: {0}")]
	InvalidArguments(String),

	#[error("IO error: {0}")]
	Io(String),

	#[error("Tool execution timed out")]
	Timeout,

	#[error("Internal error: {0}")]
	Internal(String),

	#[error("Path outside workspace: {0}")]
	PathOutsideWorkspace(std::path::PathBuf),

	#[error("File not found: {0}")]
	FileNotFound(std::path::PathBuf),

	#[error("Serialization error: {0}")]
	Serialization(String),

	/// The user explicitly rejected the call. Not retried automatically.
	#[error("User declined: {0}")]
	UserDeclined(String),

	/// Cancellation sentinel; stops the remaining tool queue.
	#[error("Tool execution cancelled")]
	Cancelled,

	#[error("{0}")]
	Failed(String),
}

impl ToolError {
	/// Classifies a plain error message coming back from a tool collaborator.
	pub fn from_message(message: impl Into<String>) -> Self {
		let message = message.into();
		match message.strip_prefix(USER_DECLINED_PREFIX) {
			Some(rest) => {
				let reason = rest.trim_start_matches([':', ' ']).to_string();
				ToolError::UserDeclined(reason)
			}
			None => ToolError::Failed(message),
		}
	}

	pub fn is_user_declined(&self) -> bool {
		match self {
			ToolError::UserDeclined(_) => true,
			ToolError::Failed(message) => message.starts_with(USER_DECLINED_PREFIX),
			_ => false,
		}
	}

	pub fn is_cancelled(&self) -> bool {
		matches!(self, ToolError::Cancelled)
	}
}

impl From<std::io::Error> for ToolError {
	fn from(err: std::io::Error) -> Self {
		ToolError::Io(err.to_string())
	}
}
