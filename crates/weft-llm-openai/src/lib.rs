// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! OpenAI-compatible chat completions dialect.

mod adapter;
mod stream;
mod types;

pub use adapter::{parse_wait_hint, OpenAIAdapter};
pub use stream::process_chunk;
pub use types::{OpenAIConfig, OpenAIError, OpenAIMessage, OpenAIRequest, OpenAIStreamChunk};
