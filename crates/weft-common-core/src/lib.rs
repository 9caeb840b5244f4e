// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod message;
pub mod plan;
pub mod tokens;
pub mod tool;

pub use config::*;
pub use error::*;
pub use llm::*;
pub use memory::*;
pub use message::*;
pub use plan::*;
pub use tokens::*;
pub use tool::*;

pub use tokio_util::sync::CancellationToken;
