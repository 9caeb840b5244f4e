// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Rate-limit countdown shared by both transports.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountdownOutcome {
	/// Reached zero; the caller should retry.
	Elapsed,
	/// The turn's cancellation token fired.
	Aborted,
	/// A newer countdown was started on the same timer.
	Superseded,
}

/// Restartable one-second countdown.
///
/// Starting a new countdown stops the one already running, so recursing
/// turns never see two overlapping timers.
#[derive(Clone, Debug, Default)]
pub struct RetryTimer {
	active: Arc<Mutex<Option<(u64, CancellationToken)>>>,
}

impl RetryTimer {
	pub fn new() -> Self {
		Self::default()
	}

	/// Ticks `secs, secs-1, .., 1` one second apart, then returns.
	pub async fn run<F>(&self, secs: u64, cancel: &CancellationToken, mut on_tick: F) -> CountdownOutcome
	where
		F: FnMut(u64),
	{
		let (generation, stop) = self.start();
		info!(retry_after_secs = secs, "starting retry countdown");

		let mut outcome = CountdownOutcome::Elapsed;
		for remaining in (1..=secs).rev() {
			on_tick(remaining);
			tokio::select! {
				biased;
				_ = cancel.cancelled() => {
					outcome = CountdownOutcome::Aborted;
					break;
				}
				_ = stop.cancelled() => {
					outcome = CountdownOutcome::Superseded;
					break;
				}
				_ = tokio::time::sleep(Duration::from_secs(1)) => {}
			}
		}

		self.finish(generation);
		debug!(?outcome, "retry countdown finished");
		outcome
	}

	/// Stops the running countdown, if any.
	pub fn stop(&self) {
		if let Some((_, token)) = self.slot().take() {
			token.cancel();
		}
	}

	pub fn is_running(&self) -> bool {
		self.slot().is_some()
	}

	fn start(&self) -> (u64, CancellationToken) {
		let mut slot = self.slot();
		let generation = match slot.take() {
			Some((previous, token)) => {
				debug!("stopping previous retry countdown");
				token.cancel();
				previous.wrapping_add(1)
			}
			None => 0,
		};
		let token = CancellationToken::new();
		*slot = Some((generation, token.clone()));
		(generation, token)
	}

	fn finish(&self, generation: u64) {
		let mut slot = self.slot();
		if slot.as_ref().is_some_and(|(g, _)| *g == generation) {
			*slot = None;
		}
	}

	fn slot(&self) -> std::sync::MutexGuard<'_, Option<(u64, CancellationToken)>> {
		self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	/// **Test: retry_after=3 gives exactly three ticks, then the retry**
	#[tokio::test(start_paused = true)]
	async fn test_three_ticks_then_elapsed() {
		let timer = RetryTimer::new();
		let cancel = CancellationToken::new();
		let mut ticks = Vec::new();
		let started = tokio::time::Instant::now();

		let outcome = timer.run(3, &cancel, |s| ticks.push(s)).await;

		assert_eq!(outcome, CountdownOutcome::Elapsed);
		assert_eq!(ticks, vec![3, 2, 1]);
		assert_eq!(started.elapsed(), Duration::from_secs(3));
		assert!(!timer.is_running());
	}

	/// **Test: aborting mid-countdown prevents the retry**
	#[tokio::test(start_paused = true)]
	async fn test_abort_midway() {
		let timer = RetryTimer::new();
		let cancel = CancellationToken::new();
		let trigger = cancel.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(1500)).await;
			trigger.cancel();
		});

		let mut ticks = Vec::new();
		let outcome = timer.run(5, &cancel, |s| ticks.push(s)).await;

		assert_eq!(outcome, CountdownOutcome::Aborted);
		assert_eq!(ticks, vec![5, 4]);
	}

	/// **Test: a restarted timer stops the earlier countdown**
	#[tokio::test(start_paused = true)]
	async fn test_restart_supersedes_previous() {
		let timer = RetryTimer::new();
		let cancel = CancellationToken::new();
		let first = {
			let timer = timer.clone();
			let cancel = cancel.clone();
			tokio::spawn(async move { timer.run(10, &cancel, |_| {}).await })
		};
		tokio::time::sleep(Duration::from_millis(2500)).await;

		let second = timer.run(1, &cancel, |_| {}).await;

		assert_eq!(first.await.unwrap(), CountdownOutcome::Superseded);
		assert_eq!(second, CountdownOutcome::Elapsed);
		assert!(!timer.is_running());
	}

	#[tokio::test(start_paused = true)]
	async fn test_zero_seconds_elapses_immediately() {
		let timer = RetryTimer::new();
		let mut ticks = 0;
		let outcome = timer.run(0, &CancellationToken::new(), |_| ticks += 1).await;
		assert_eq!(outcome, CountdownOutcome::Elapsed);
		assert_eq!(ticks, 0);
	}
}
