// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Ctrl-C handling.
//!
//! While a request runs, every interrupt cancels it. With nothing in
//! flight the first interrupt arms the exit and the second one exits.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt {
	/// The in-flight request was cancelled.
	Cancelled,
	/// Idle; one more interrupt exits.
	Armed,
	Exit,
}

#[derive(Default)]
struct State {
	in_flight: Option<CancellationToken>,
	armed: bool,
}

#[derive(Clone, Default)]
pub struct Interrupts {
	state: Arc<Mutex<State>>,
	shutdown: CancellationToken,
}

impl Interrupts {
	pub fn new() -> Self {
		Self::default()
	}

	/// Starts tracking a request and returns its cancellation token.
	pub fn begin(&self) -> CancellationToken {
		let token = self.shutdown.child_token();
		let mut state = self.lock();
		state.in_flight = Some(token.clone());
		state.armed = false;
		token
	}

	pub fn finish(&self) {
		self.lock().in_flight = None;
	}

	pub fn interrupt(&self) -> Interrupt {
		let mut state = self.lock();
		if let Some(token) = &state.in_flight {
			info!("interrupt: cancelling request");
			token.cancel();
			return Interrupt::Cancelled;
		}
		if state.armed {
			info!("interrupt: exiting");
			self.shutdown.cancel();
			return Interrupt::Exit;
		}
		state.armed = true;
		Interrupt::Armed
	}

	/// Cancelled once the user asked to exit.
	pub fn shutdown(&self) -> CancellationToken {
		self.shutdown.clone()
	}

	fn lock(&self) -> MutexGuard<'_, State> {
		self.state.lock().unwrap_or_else(|e| e.into_inner())
	}
}

/// Feeds process Ctrl-C signals into `interrupts` until exit.
pub fn spawn_ctrl_c_listener(interrupts: Interrupts) {
	tokio::spawn(async move {
		while tokio::signal::ctrl_c().await.is_ok() {
			match interrupts.interrupt() {
				Interrupt::Cancelled => eprintln!("\n(cancelling)"),
				Interrupt::Armed => eprintln!("\n(press Ctrl-C again to exit)"),
				Interrupt::Exit => {
					eprintln!();
					break;
				}
			}
		}
	});
}
