// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! ACP session lifecycle: connect, open or load a session, prompt, recover.
//!
//! The connection is `!Send`; drive the manager from a
//! `tokio::task::LocalSet`.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use agent_client_protocol::{self as acp, Agent as _};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use weft_common_core::{LlmError, SharedPlan, StopReason, TurnId};
use weft_common_history::HistoryStore;

use crate::client::{ActivePrompt, ClientShared, PromptEvent, SessionInfo, SharedClientState, WeftClient};
use crate::connection::{AgentConnection, AgentLauncher};
use crate::error::AcpError;
use crate::files::FileAccess;
use crate::permission::PermissionConfirmer;
use crate::truncate::{render_transcript, truncate_history, TruncationConfig};
use crate::updates::{AcpEvents, UpdateApplier};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
	Disconnected,
	Connecting,
	SessionLess,
	SessionActive,
	Invalidated,
	Recovering,
}

#[derive(Clone, Debug)]
pub struct AcpConfig {
	/// Project root handed to the agent on session creation.
	pub cwd: PathBuf,
	pub truncation: TruncationConfig,
	/// How long to wait for the agent to answer a cancelled prompt.
	pub cancel_grace: Duration,
	pub auto_reject_in_plan_mode: bool,
	/// Mode to switch to right after a session is created.
	pub default_mode: Option<String>,
}

impl AcpConfig {
	pub fn new(cwd: impl Into<PathBuf>) -> Self {
		Self {
			cwd: cwd.into(),
			truncation: TruncationConfig::default(),
			cancel_grace: Duration::from_secs(5),
			auto_reject_in_plan_mode: true,
			default_mode: None,
		}
	}
}

/// One prompt submission.
pub struct AcpTurn<'a> {
	pub history: &'a mut HistoryStore,
	pub plan: &'a SharedPlan,
	pub turn_id: TurnId,
	pub text: String,
	pub events: &'a dyn AcpEvents,
}

/// Client side of an ACP agent connection.
pub struct AcpSessionManager {
	launcher: Arc<dyn AgentLauncher>,
	confirmer: Arc<dyn PermissionConfirmer>,
	files: Arc<dyn FileAccess>,
	config: AcpConfig,
	connection: Option<AgentConnection>,
	shared: SharedClientState,
	state: ConnectionState,
	capabilities: acp::AgentCapabilities,
	session_id: Option<String>,
	/// Set for fresh sessions that have not yet seen the prior history.
	needs_replay: bool,
}

impl AcpSessionManager {
	pub fn new(
		launcher: Arc<dyn AgentLauncher>,
		confirmer: Arc<dyn PermissionConfirmer>,
		files: Arc<dyn FileAccess>,
		config: AcpConfig,
	) -> Self {
		Self {
			launcher,
			confirmer,
			files,
			config,
			connection: None,
			shared: Rc::new(RefCell::new(ClientShared::default())),
			state: ConnectionState::Disconnected,
			capabilities: acp::AgentCapabilities::default(),
			session_id: None,
			needs_replay: false,
		}
	}

	pub fn state(&self) -> ConnectionState {
		self.state
	}

	pub fn session_id(&self) -> Option<&str> {
		self.session_id.as_deref()
	}

	pub fn capabilities(&self) -> &acp::AgentCapabilities {
		&self.capabilities
	}

	pub fn session_info(&self) -> SessionInfo {
		self.shared.borrow().info.clone()
	}

	pub fn current_mode(&self) -> Option<String> {
		self.shared.borrow().info.current_mode.clone()
	}

	pub fn available_modes(&self) -> Vec<acp::SessionMode> {
		self.shared.borrow().info.available_modes.clone()
	}

	pub fn available_commands(&self) -> Vec<acp::AvailableCommand> {
		self.shared.borrow().info.available_commands.clone()
	}

	fn transition(&mut self, to: ConnectionState) {
		if self.state != to {
			info!(from = ?self.state, to = ?to, "acp state transition");
			self.state = to;
		}
	}

	fn set_session(&mut self, session_id: Option<String>) {
		self.shared.borrow_mut().session_id = session_id.clone();
		self.session_id = session_id;
	}

	fn connection(&self) -> Result<&AgentConnection, AcpError> {
		self.connection.as_ref().ok_or(AcpError::NotConnected)
	}

	/// Drops the connection when a call found the agent gone.
	fn settle<T>(&mut self, result: Result<T, AcpError>) -> Result<T, AcpError> {
		if let Err(AcpError::ProcessExited | AcpError::Io(_)) = &result {
			self.disconnect();
		}
		result
	}

	/// Spawns the agent and negotiates capabilities.
	#[instrument(skip(self))]
	pub async fn connect(&mut self) -> Result<(), AcpError> {
		self.transition(ConnectionState::Connecting);
		match self.establish().await {
			Ok(()) => {
				self.transition(ConnectionState::SessionLess);
				Ok(())
			}
			Err(e) => {
				self.disconnect();
				Err(e)
			}
		}
	}

	async fn establish(&mut self) -> Result<(), AcpError> {
		self.connection = None;
		self.set_session(None);
		let io = self.launcher.launch()?;
		let client = WeftClient::new(
			self.shared.clone(),
			self.confirmer.clone(),
			self.files.clone(),
			self.config.auto_reject_in_plan_mode,
		);
		let connection = self.connection.insert(AgentConnection::start(io, client));

		let init = connection
			.call(connection.agent().initialize(initialize_request()))
			.await?;
		if init.protocol_version != acp::ProtocolVersion::V1 {
			warn!(
				agent_version = %init.protocol_version,
				client_version = %acp::ProtocolVersion::V1,
				"agent speaks a different protocol version"
			);
		}
		debug!(load_session = init.agent_capabilities.load_session, "agent capabilities");
		self.capabilities = init.agent_capabilities;
		Ok(())
	}

	/// Drops the agent process.
	pub fn disconnect(&mut self) {
		self.connection = None;
		self.set_session(None);
		self.transition(ConnectionState::Disconnected);
	}

	/// Loads `stored` when the agent supports it, otherwise creates a new
	/// session. Connects first if needed.
	#[instrument(skip(self))]
	pub async fn open_session(&mut self, stored: Option<&str>) -> Result<(), AcpError> {
		if self.connection.is_none() {
			self.connect().await?;
		}

		if let (Some(id), true) = (stored, self.capabilities.load_session) {
			self.set_session(Some(id.to_string()));
			let request = acp::LoadSessionRequest::new(acp::SessionId::new(id), self.config.cwd.clone());
			let connection = self.connection()?;
			let result = connection.call(connection.agent().load_session(request)).await;
			match self.settle(result) {
				Ok(response) => {
					self.apply_modes(response.modes);
					self.needs_replay = false;
					info!(session_id = id, "loaded acp session");
					self.transition(ConnectionState::SessionActive);
					return Ok(());
				}
				Err(e @ (AcpError::SessionNotFound(_) | AcpError::Agent(_))) => {
					warn!(session_id = id, error = %e, "stored session could not be loaded");
					self.set_session(None);
				}
				Err(e) => {
					self.set_session(None);
					return Err(e);
				}
			}
		}

		self.new_session().await
	}

	async fn new_session(&mut self) -> Result<(), AcpError> {
		let request = acp::NewSessionRequest::new(self.config.cwd.clone());
		let connection = self.connection()?;
		let result = connection.call(connection.agent().new_session(request)).await;
		let response = self.settle(result)?;
		info!(session_id = %response.session_id, "created acp session");
		self.set_session(Some(response.session_id.to_string()));
		self.needs_replay = true;
		self.apply_modes(response.modes);
		self.transition(ConnectionState::SessionActive);

		if let Some(mode) = self.config.default_mode.clone() {
			if self.current_mode().as_deref() != Some(mode.as_str()) {
				self.set_mode(&mode).await?;
			}
		}
		Ok(())
	}

	fn apply_modes(&mut self, modes: Option<acp::SessionModeState>) {
		if let Some(modes) = modes {
			let mut shared = self.shared.borrow_mut();
			shared.info.current_mode = Some(modes.current_mode_id.to_string());
			shared.info.available_modes = modes.available_modes;
		}
	}

	pub async fn set_mode(&mut self, mode_id: &str) -> Result<(), AcpError> {
		let session_id = self.session_id.clone().ok_or(AcpError::NoSession)?;
		let request = acp::SetSessionModeRequest::new(
			acp::SessionId::new(session_id),
			acp::SessionModeId::new(mode_id),
		);
		let connection = self.connection()?;
		let result = connection.call(connection.agent().set_session_mode(request)).await;
		self.settle(result)?;
		info!(mode = mode_id, "acp mode set");
		self.shared.borrow_mut().info.current_mode = Some(mode_id.to_string());
		Ok(())
	}

	/// Submits a prompt, streaming updates into `turn.history`.
	///
	/// A "session not found" failure is recovered once by reconnecting,
	/// creating a new session and resubmitting with a truncated transcript.
	/// A second failure within the same prompt is
	/// [`AcpError::SessionRecoveryExhausted`].
	#[instrument(skip_all, fields(turn_id = %turn.turn_id))]
	pub async fn prompt(
		&mut self,
		mut turn: AcpTurn<'_>,
		cancel: &CancellationToken,
	) -> Result<StopReason, AcpError> {
		let mut recovery_attempted = false;
		loop {
			if self.session_id.is_none() {
				self.open_session(None).await?;
			}
			match self.submit(&mut turn, cancel).await {
				Err(AcpError::SessionNotFound(message)) if recovery_attempted => {
					warn!(error = %message, "session lost again after recovery");
					self.disconnect();
					return Err(AcpError::SessionRecoveryExhausted(message));
				}
				Err(AcpError::SessionNotFound(message)) => {
					warn!(error = %message, "acp session invalidated, recovering");
					recovery_attempted = true;
					if let Err(e) = self.recover().await {
						self.disconnect();
						return Err(e);
					}
				}
				other => return other,
			}
		}
	}

	async fn recover(&mut self) -> Result<(), AcpError> {
		self.transition(ConnectionState::Invalidated);
		self.set_session(None);
		self.transition(ConnectionState::Recovering);
		self.establish().await?;
		self.new_session().await
	}

	async fn submit(
		&mut self,
		turn: &mut AcpTurn<'_>,
		cancel: &CancellationToken,
	) -> Result<StopReason, AcpError> {
		let session_id = acp::SessionId::new(self.session_id.clone().ok_or(AcpError::NoSession)?);

		let mut prompt: Vec<acp::ContentBlock> = Vec::new();
		if self.needs_replay {
			let kept = truncate_history(turn.history.messages(), &self.config.truncation);
			if !kept.is_empty() {
				info!(messages = kept.len(), "replaying history into new session");
				prompt.push(render_transcript(&kept).into());
			}
		}
		prompt.push(turn.text.clone().into());

		let connection = self.connection.as_ref().ok_or(AcpError::NotConnected)?;
		let (events_tx, mut events_rx) = mpsc::unbounded_channel();
		self.shared.borrow_mut().prompt = Some(ActivePrompt {
			events: events_tx,
			cancel: cancel.clone(),
		});

		let mut applier = UpdateApplier::new(
			&mut *turn.history,
			turn.plan,
			turn.events,
			turn.turn_id.clone(),
		);
		let request = acp::PromptRequest::new(session_id.clone(), prompt);
		let mut run = PromptRun {
			connection,
			session_id,
			cancel,
			grace: self.config.cancel_grace,
			events: turn.events,
			updates: &mut events_rx,
			applier: &mut applier,
		};
		let result = run.drive(request).await;
		let closed = connection.closed().is_cancelled();
		self.shared.borrow_mut().prompt = None;
		drop(applier);

		match &result {
			_ if closed => self.disconnect(),
			Ok(_) => self.needs_replay = false,
			Err(_) => {}
		}
		result
	}
}

fn initialize_request() -> acp::InitializeRequest {
	let mut capabilities = acp::ClientCapabilities::default();
	capabilities.fs.read_text_file = true;
	capabilities.fs.write_text_file = true;
	acp::InitializeRequest::new(acp::ProtocolVersion::V1)
		.client_capabilities(capabilities)
		.client_info(acp::Implementation::new("weft", env!("CARGO_PKG_VERSION")))
}

/// One outstanding `session/prompt`.
struct PromptRun<'a, 'b> {
	connection: &'a AgentConnection,
	session_id: acp::SessionId,
	cancel: &'a CancellationToken,
	grace: Duration,
	events: &'a dyn AcpEvents,
	updates: &'a mut mpsc::UnboundedReceiver<PromptEvent>,
	applier: &'a mut UpdateApplier<'b>,
}

impl PromptRun<'_, '_> {
	/// Applies agent traffic until the prompt is answered. After a cancel,
	/// waits up to the grace period and reports Cancelled whatever the
	/// agent answers.
	async fn drive(&mut self, request: acp::PromptRequest) -> Result<StopReason, AcpError> {
		let connection = self.connection;
		let call = connection.call(connection.agent().prompt(request));
		tokio::pin!(call);
		let grace = tokio::time::sleep(self.grace);
		tokio::pin!(grace);
		let mut cancel_sent = false;

		loop {
			tokio::select! {
				biased;

				Some(event) = self.updates.recv() => self.apply(event),

				_ = self.cancel.cancelled(), if !cancel_sent => {
					info!("cancelling acp prompt");
					cancel_sent = true;
					grace.as_mut().reset(tokio::time::Instant::now() + self.grace);
					let notification = acp::CancelNotification::new(self.session_id.clone());
					if let Err(e) = connection.agent().cancel(notification).await {
						warn!(error = %e, "failed to send cancel to agent");
					}
				}

				result = &mut call => {
					while let Ok(event) = self.updates.try_recv() {
						self.apply(event);
					}
					return match result {
						Ok(_) if cancel_sent => {
							debug!("agent acknowledged cancel");
							Ok(StopReason::Cancelled)
						}
						Ok(response) => Ok(map_stop_reason(&response.stop_reason)),
						Err(e) if cancel_sent => {
							warn!(error = %e, "agent failed while cancelling");
							Ok(StopReason::Cancelled)
						}
						Err(e) => Err(e),
					};
				}

				_ = &mut grace, if cancel_sent => {
					warn!(grace = ?self.grace, "agent did not acknowledge cancel");
					return Ok(StopReason::Cancelled);
				}
			}
		}
	}

	fn apply(&mut self, event: PromptEvent) {
		match event {
			PromptEvent::Declined(tool_call_id) => self.applier.mark_declined(&tool_call_id),
			PromptEvent::Update(acp::SessionUpdate::AvailableCommandsUpdate(update)) => {
				self.events.on_commands(&update.available_commands);
			}
			PromptEvent::Update(acp::SessionUpdate::CurrentModeUpdate(update)) => {
				self.events.on_mode(&update.current_mode_id.to_string());
			}
			PromptEvent::Update(update) => self.applier.apply(update),
		}
	}
}

fn map_stop_reason(reason: &acp::StopReason) -> StopReason {
	match reason {
		acp::StopReason::Cancelled => StopReason::Cancelled,
		acp::StopReason::Refusal => {
			StopReason::Error(LlmError::Api("agent refused the request".to_string()))
		}
		acp::StopReason::EndTurn | acp::StopReason::MaxTokens | acp::StopReason::MaxTurnRequests => {
			StopReason::Complete
		}
		#[allow(unreachable_patterns)]
		other => {
			debug!(stop_reason = ?other, "unknown acp stop reason");
			StopReason::Complete
		}
	}
}
