// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! What the caller sees while a request runs.

use weft_cli_acp::{AcpEvents, AvailableCommand};
use weft_common_core::{HistoryMessage, Plan, StopReason, TurnId};

/// Callbacks for the editor-facing layer.
///
/// Per turn, `on_start` fires before any `on_chunk`, and exactly one
/// terminal `on_stop` fires after the last chunk. Non-terminal stops
/// (streaming tool previews) may appear in between.
pub trait TurnObserver: Send + Sync {
	fn on_start(&self, _turn_id: &TurnId) {}

	fn on_chunk(&self, _turn_id: &TurnId, _text: &str) {}

	/// A history message was inserted or replaced.
	fn on_message(&self, _message: &HistoryMessage) {}

	fn on_stop(&self, _turn_id: &TurnId, _reason: &StopReason) {}

	/// Seconds left before a rate-limited turn is retried.
	fn on_countdown(&self, _remaining_secs: u64) {}

	fn on_plan(&self, _plan: &Plan) {}
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl TurnObserver for NoopObserver {}

/// Presents a [`TurnObserver`] to the ACP session manager.
pub(crate) struct ObserverEvents<'a>(pub &'a dyn TurnObserver);

impl AcpEvents for ObserverEvents<'_> {
	fn on_message(&self, message: &HistoryMessage) {
		self.0.on_message(message);
	}

	fn on_plan(&self, plan: &Plan) {
		self.0.on_plan(plan);
	}

	fn on_commands(&self, commands: &[AvailableCommand]) {
		tracing::debug!(count = commands.len(), "agent commands updated");
	}
}
