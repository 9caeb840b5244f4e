// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Drives one streaming HTTP request and emits normalized turn events.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use weft_common_core::{LlmClient, LlmError, LlmEvent, LlmRequest, LlmStream, StopReason};

use crate::adapter::{ParseState, ProviderAdapter, RequestSpec};
use crate::artifact::TurnArtifact;
use crate::sse::FrameDecoder;

/// Wait applied to a 429 that names no retry interval.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 10;

#[derive(Clone, Debug)]
pub struct TransportOptions {
	/// Keep request body artifacts on disk after the turn.
	pub keep_artifacts: bool,
	pub artifact_dir: Option<PathBuf>,
	/// Longest gap between two body chunks before the turn errors.
	pub idle_timeout: Duration,
}

impl Default for TransportOptions {
	fn default() -> Self {
		Self {
			keep_artifacts: false,
			artifact_dir: None,
			idle_timeout: Duration::from_secs(300),
		}
	}
}

/// Parses a `Retry-After` header given in whole seconds.
pub fn retry_after_from_headers(headers: &HeaderMap) -> Option<u64> {
	headers
		.get(RETRY_AFTER)
		.and_then(|v| v.to_str().ok())
		.and_then(|v| v.trim().parse::<u64>().ok())
}

/// Forwards events to the consumer and lets exactly one `Stop` through.
struct Emitter {
	tx: mpsc::UnboundedSender<LlmEvent>,
	stopped: bool,
}

impl Emitter {
	fn new(tx: mpsc::UnboundedSender<LlmEvent>) -> Self {
		Self { tx, stopped: false }
	}

	fn emit(&mut self, event: LlmEvent) {
		if self.stopped {
			return;
		}
		if let LlmEvent::Stop(reason) = &event {
			if !reason.is_terminal() {
				let _ = self.tx.send(event);
				return;
			}
			debug!(reason = reason.name(), "turn stopped");
			self.stopped = true;
		}
		// The receiver going away only means nobody is listening any more.
		let _ = self.tx.send(event);
	}

	fn stop(&mut self, reason: StopReason) {
		self.emit(LlmEvent::Stop(reason));
	}

	fn is_stopped(&self) -> bool {
		self.stopped
	}
}

/// Issues provider requests over one shared HTTP client.
#[derive(Clone)]
pub struct TransportClient {
	http: Client,
	options: TransportOptions,
}

impl TransportClient {
	pub fn new(http: Client, options: TransportOptions) -> Self {
		Self { http, options }
	}

	/// Starts the request in a background task and returns its event stream.
	///
	/// The stream begins with `Start` and carries exactly one terminal
	/// `Stop`. Cancelling `cancel` aborts the request; cancelling again or
	/// after the stop is a no-op.
	pub fn send(
		&self,
		adapter: Arc<dyn ProviderAdapter>,
		spec: RequestSpec,
		cancel: CancellationToken,
	) -> LlmStream {
		let (tx, rx) = mpsc::unbounded_channel();
		let http = self.http.clone();
		let options = self.options.clone();

		tokio::spawn(async move {
			let mut emitter = Emitter::new(tx);
			emitter.emit(LlmEvent::Start);

			let outcome = tokio::select! {
				biased;
				_ = cancel.cancelled() => None,
				result = drive(&http, adapter.as_ref(), spec, &options, &mut emitter) => Some(result),
			};

			match outcome {
				None => {
					info!(provider = adapter.name(), "request cancelled");
					emitter.stop(StopReason::Cancelled);
				}
				Some(Ok(())) => {}
				Some(Err(e)) => {
					error!(provider = adapter.name(), error = %e, "turn failed");
					emitter.stop(StopReason::Error(e));
				}
			}
		});

		LlmStream::new(Box::pin(futures::stream::unfold(rx, |mut rx| async move {
			rx.recv().await.map(|event| (event, rx))
		})))
	}
}

#[instrument(skip_all, fields(provider = adapter.name(), url = %spec.url))]
async fn drive(
	http: &Client,
	adapter: &dyn ProviderAdapter,
	spec: RequestSpec,
	options: &TransportOptions,
	emitter: &mut Emitter,
) -> Result<(), LlmError> {
	let artifact = TurnArtifact::write(
		&spec.body,
		options.artifact_dir.as_deref(),
		options.keep_artifacts,
	)?;

	let mut builder = http
		.post(&spec.url)
		.header(reqwest::header::CONTENT_TYPE, "application/json");
	for (name, value) in &spec.headers {
		builder = builder.header(name.as_str(), value.as_str());
	}

	debug!(
		artifact = ?artifact.path(),
		stream = spec.stream,
		"sending provider request"
	);

	let response = builder
		.body(artifact.body().to_vec())
		.send()
		.await
		.map_err(|e| {
			if e.is_timeout() {
				LlmError::Timeout
			} else {
				LlmError::Transport(e.to_string())
			}
		})?;

	let status = response.status();
	let headers = response.headers().clone();
	emitter.emit(LlmEvent::Headers(headers.clone()));

	if status.as_u16() >= 400 {
		let body = response.text().await.unwrap_or_default();
		if status == StatusCode::TOO_MANY_REQUESTS {
			let retry_after_secs = retry_after_from_headers(&headers)
				.or_else(|| adapter.rate_limit_sleep_hint(&headers, &body))
				.unwrap_or(DEFAULT_RETRY_AFTER_SECS);
			warn!(retry_after_secs, "rate limited by provider");
			emitter.stop(StopReason::RateLimit { retry_after_secs });
			return Ok(());
		}
		error!(status = %status, body = %body, "provider returned error status");
		emitter.stop(StopReason::Error(adapter.on_http_error(status, &body)));
		return Ok(());
	}

	let mut state = ParseState::new();

	if !spec.stream || adapter.is_streaming_disabled() {
		let body = response
			.text()
			.await
			.map_err(|e| LlmError::Transport(e.to_string()))?;
		for event in adapter.parse_response(&body, &mut state)? {
			emitter.emit(event);
		}
	} else {
		let mut decoder = FrameDecoder::new();
		let mut body = response.bytes_stream();

		loop {
			let next = tokio::time::timeout(options.idle_timeout, body.next())
				.await
				.map_err(|_| LlmError::Timeout)?;
			let (frames, ended) = match next {
				None => (decoder.finish().into_iter().collect::<Vec<_>>(), true),
				Some(Err(e)) => return Err(LlmError::Transport(e.to_string())),
				Some(Ok(chunk)) => (decoder.push(&chunk), false),
			};
			for frame in frames {
				for event in adapter.parse_event(&frame, &mut state)? {
					emitter.emit(event);
				}
				if emitter.is_stopped() {
					return Ok(());
				}
			}
			if ended {
				break;
			}
		}
	}

	for event in state.finish_all() {
		emitter.emit(event);
	}
	if !emitter.is_stopped() {
		emitter.emit(LlmEvent::Usage(state.usage.clone()));
		emitter.stop(state.final_stop_reason());
	}
	Ok(())
}

/// [`ProviderAdapter`] plus [`TransportClient`] as a [`LlmClient`].
pub struct HttpLlmClient {
	transport: TransportClient,
	adapter: Arc<dyn ProviderAdapter>,
}

impl HttpLlmClient {
	pub fn new(transport: TransportClient, adapter: Arc<dyn ProviderAdapter>) -> Self {
		Self { transport, adapter }
	}
}

#[async_trait]
impl LlmClient for HttpLlmClient {
	fn name(&self) -> &str {
		self.adapter.name()
	}

	async fn complete_streaming(
		&self,
		request: LlmRequest,
		cancel: CancellationToken,
	) -> Result<LlmStream, LlmError> {
		let spec = self.adapter.build_request(&request)?;
		Ok(self.transport.send(self.adapter.clone(), spec, cancel))
	}
}
