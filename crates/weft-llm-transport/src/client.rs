// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Shared HTTP client with consistent User-Agent header.

use reqwest::{Client, ClientBuilder};
use std::time::Duration;

/// Creates a new HTTP client builder with the standard weft User-Agent header.
///
/// # Example
/// ```ignore
/// let client = weft_llm_transport::builder()
///     .connect_timeout(Duration::from_secs(10))
///     .build()?;
/// ```
pub fn builder() -> ClientBuilder {
	Client::builder().user_agent(user_agent())
}

/// Creates a new HTTP client with a custom timeout and the standard User-Agent.
pub fn new_client_with_timeout(timeout: Duration) -> reqwest::Result<Client> {
	builder().timeout(timeout).build()
}

/// Returns the standard weft User-Agent string.
///
/// Format: `weft/{os}-{arch}/{version}`
pub fn user_agent() -> String {
	format!(
		"weft/{}-{}/{}",
		std::env::consts::OS,
		std::env::consts::ARCH,
		env!("CARGO_PKG_VERSION")
	)
}
