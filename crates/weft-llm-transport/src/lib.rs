// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Streaming HTTP transport for one provider turn.
//!
//! This crate provides:
//! - A pre-configured HTTP client with a consistent User-Agent header
//! - `event:`/`data:` frame decoding of streaming responses
//! - The [`ProviderAdapter`] contract each provider dialect implements
//! - [`TransportClient`], which drives one request and guarantees a single
//!   terminal stop event per turn

mod adapter;
mod artifact;
mod client;
mod sse;
mod transport;

pub use adapter::{ParseState, PartialToolUse, ProviderAdapter, RequestSpec};
pub use artifact::TurnArtifact;
pub use client::{builder, new_client_with_timeout, user_agent};
pub use sse::{FrameDecoder, SseFrame};
pub use transport::{
	retry_after_from_headers, HttpLlmClient, TransportClient, TransportOptions,
	DEFAULT_RETRY_AFTER_SECS,
};
