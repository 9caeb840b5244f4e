// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! The client half of the protocol: answers agent requests and routes
//! session updates to the prompt in flight.
//!
//! Uses `Rc<RefCell<..>>` because the ACP `Client` trait is `?Send` and the
//! connection runs on a `LocalSet`.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use agent_client_protocol as acp;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::internal_error;
use crate::files::FileAccess;
use crate::permission::{
	permission_response, should_auto_reject, PermissionConfirmer, PermissionDecision,
	PermissionPrompt,
};

/// Session facts reported by the agent.
#[derive(Clone, Debug, Default)]
pub struct SessionInfo {
	pub current_mode: Option<String>,
	pub available_modes: Vec<acp::SessionMode>,
	pub available_commands: Vec<acp::AvailableCommand>,
}

/// Agent traffic delivered to the prompt in flight.
#[derive(Debug)]
pub(crate) enum PromptEvent {
	Update(acp::SessionUpdate),
	/// The user rejected this tool call.
	Declined(String),
}

/// Registered while a `session/prompt` is outstanding.
pub(crate) struct ActivePrompt {
	pub events: mpsc::UnboundedSender<PromptEvent>,
	pub cancel: CancellationToken,
}

/// State shared between the session manager and the client handler.
#[derive(Default)]
pub(crate) struct ClientShared {
	pub session_id: Option<String>,
	pub info: SessionInfo,
	pub prompt: Option<ActivePrompt>,
}

pub(crate) type SharedClientState = Rc<RefCell<ClientShared>>;

pub(crate) struct WeftClient {
	shared: SharedClientState,
	confirmer: Arc<dyn PermissionConfirmer>,
	files: Arc<dyn FileAccess>,
	auto_reject: bool,
}

impl WeftClient {
	pub fn new(
		shared: SharedClientState,
		confirmer: Arc<dyn PermissionConfirmer>,
		files: Arc<dyn FileAccess>,
		auto_reject: bool,
	) -> Self {
		Self {
			shared,
			confirmer,
			files,
			auto_reject,
		}
	}

	fn known_session(&self, session_id: &acp::SessionId) -> bool {
		let shared = self.shared.borrow();
		match &shared.session_id {
			Some(current) => *current == session_id.to_string(),
			// Updates can race the response that names the session.
			None => true,
		}
	}

	async fn decide(&self, prompt: &PermissionPrompt) -> Option<PermissionDecision> {
		let (mode, cancel) = {
			let shared = self.shared.borrow();
			(
				shared.info.current_mode.clone(),
				shared.prompt.as_ref().map(|p| p.cancel.clone()),
			)
		};

		if should_auto_reject(self.auto_reject, mode.as_deref(), prompt.kind.as_deref()) {
			info!(tool_call_id = %prompt.tool_call_id, kind = ?prompt.kind, "auto-rejecting tool in plan mode");
			return Some(PermissionDecision::RejectOnce);
		}

		let Some(cancel) = cancel else {
			return Some(self.confirmer.confirm(prompt).await);
		};
		tokio::select! {
			biased;

			_ = cancel.cancelled() => None,
			decision = self.confirmer.confirm(prompt) => Some(decision),
		}
	}
}

#[async_trait::async_trait(?Send)]
impl acp::Client for WeftClient {
	async fn request_permission(
		&self,
		args: acp::RequestPermissionRequest,
	) -> acp::Result<acp::RequestPermissionResponse> {
		let prompt = PermissionPrompt::new(&args.tool_call, args.options);
		let Some(decision) = self.decide(&prompt).await else {
			info!(tool_call_id = %prompt.tool_call_id, "prompt cancelled while awaiting permission");
			return Ok(acp::RequestPermissionResponse::new(
				acp::RequestPermissionOutcome::Cancelled,
			));
		};

		if decision.is_reject() {
			let shared = self.shared.borrow();
			if let Some(active) = &shared.prompt {
				active
					.events
					.send(PromptEvent::Declined(prompt.tool_call_id.clone()))
					.ok();
			}
		}
		Ok(permission_response(decision, &prompt.options))
	}

	async fn session_notification(&self, args: acp::SessionNotification) -> acp::Result<()> {
		if !self.known_session(&args.session_id) {
			debug!(session_id = %args.session_id, "update for another session");
			return Ok(());
		}

		let mut shared = self.shared.borrow_mut();
		match &args.update {
			acp::SessionUpdate::AvailableCommandsUpdate(update) => {
				shared.info.available_commands = update.available_commands.clone();
			}
			acp::SessionUpdate::CurrentModeUpdate(update) => {
				info!(mode = %update.current_mode_id, "agent switched mode");
				shared.info.current_mode = Some(update.current_mode_id.to_string());
			}
			_ => {}
		}
		match &shared.prompt {
			Some(active) => {
				active.events.send(PromptEvent::Update(args.update)).ok();
			}
			None => debug!("ignoring session update outside of a prompt"),
		}
		Ok(())
	}

	async fn read_text_file(
		&self,
		args: acp::ReadTextFileRequest,
	) -> acp::Result<acp::ReadTextFileResponse> {
		debug!(session_id = %args.session_id, path = %args.path.display(), "agent reads file");
		let content = self
			.files
			.read_text(&args.path, args.line, args.limit)
			.await
			.map_err(|e| internal_error(e.to_string()))?;
		Ok(acp::ReadTextFileResponse::new(content))
	}

	async fn write_text_file(
		&self,
		args: acp::WriteTextFileRequest,
	) -> acp::Result<acp::WriteTextFileResponse> {
		debug!(session_id = %args.session_id, path = %args.path.display(), "agent writes file");
		self
			.files
			.write_text(&args.path, &args.content)
			.await
			.map_err(|e| internal_error(e.to_string()))?;
		Ok(acp::WriteTextFileResponse::default())
	}

	async fn ext_method(&self, args: acp::ExtRequest) -> acp::Result<acp::ExtResponse> {
		debug!(method = %args.method, "ignoring agent extension request");
		Err(acp::Error::method_not_found())
	}

	async fn ext_notification(&self, args: acp::ExtNotification) -> acp::Result<()> {
		debug!(method = %args.method, "ignoring agent extension notification");
		Ok(())
	}
}
