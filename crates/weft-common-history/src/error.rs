// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConversationIdError {
	#[error("invalid conversation ID prefix: expected 'C-', got '{0}'")]
	InvalidPrefix(String),

	#[error("invalid UUID in conversation ID: {0}")]
	InvalidUuid(#[from] uuid::Error),
}

#[derive(Debug, Error)]
pub enum HistoryStoreError {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("conversation not found: {0}")]
	NotFound(String),
}
