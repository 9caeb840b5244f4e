// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Anthropic Messages API dialect.

mod adapter;
mod stream;
mod types;

pub use adapter::AnthropicAdapter;
pub use stream::{process_stream_event, StreamEvent};
pub use types::{
	AnthropicConfig, AnthropicContent, AnthropicError, AnthropicMessage, AnthropicMessageContent,
	AnthropicRequest, AnthropicResponse, AnthropicTool,
};
