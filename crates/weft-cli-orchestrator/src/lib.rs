// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Turn orchestration for weft.
//!
//! [`Orchestrator::run`] takes one user request from submission to a
//! terminal stop: it resolves the prompt, streams the model's output into
//! history, runs requested tools, nudges agentic runs towards completion,
//! waits out rate limits and folds old history into memory.

pub mod countdown;
pub mod dual_boost;
pub mod error;
pub mod memory;
pub mod observer;
pub mod pipeline;
pub mod prompt;
pub mod reconcile;
pub mod turn;

#[cfg(test)]
mod test_support;

pub use countdown::{CountdownOutcome, RetryTimer};
pub use dual_boost::{render_merge, DualBoost, DEFAULT_MERGE_TEMPLATE};
pub use error::{OrchestratorError, OrchestratorResult};
pub use memory::{estimate_live_tokens, Summarizer, SUMMARY_SYSTEM_PROMPT};
pub use observer::{NoopObserver, TurnObserver};
pub use pipeline::{PipelineOutcome, ToolPipeline};
pub use prompt::{resolve_prompt, PromptContext};
pub use reconcile::{repair_partial_json, StreamReconciler};
pub use turn::{Backend, Conversation, Orchestrator, TurnOptions, TurnOutcome, CANCELLED_NOTICE};
