// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Scripted in-memory ACP agent.
//!
//! Each launch serves a real `AgentSideConnection` over an in-memory duplex
//! pipe, so it must run inside a `tokio::task::LocalSet`.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::{Rc, Weak};
use std::sync::{Arc, Mutex, MutexGuard};

use agent_client_protocol::{self as acp, Client as _};
use serde_json::{json, Value};
use tokio_util::compat::{TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};
use tokio_util::sync::CancellationToken;

use crate::connection::{AgentIo, AgentLauncher};
use crate::error::AcpError;

/// One thing the agent does while answering a prompt.
#[derive(Clone, Debug)]
pub enum AgentStep {
	/// Sends `session/update` with this update body.
	Update(Value),
	/// Sends `session/request_permission` with these params and waits.
	Permission(Value),
	/// Sends `fs/read_text_file` with these params and waits.
	ReadFile(Value),
	/// Sends `fs/write_text_file` with these params and waits.
	WriteFile(Value),
	/// Stops producing output until the prompt is cancelled.
	Hang,
	/// The process exits.
	Exit,
}

#[derive(Clone, Debug)]
pub struct AgentScript {
	pub load_session: bool,
	/// How many upcoming prompts fail with "session not found".
	pub lose_session: usize,
	/// Steps per prompt, in order. The last entry repeats.
	pub prompts: Vec<Vec<AgentStep>>,
	pub stop_reason: acp::StopReason,
}

impl Default for AgentScript {
	fn default() -> Self {
		Self {
			load_session: false,
			lose_session: 0,
			prompts: Vec::new(),
			stop_reason: acp::StopReason::EndTurn,
		}
	}
}

/// What the agent observed.
#[derive(Clone, Debug, Default)]
pub struct AgentRecord {
	pub launches: usize,
	pub methods: Vec<String>,
	/// Text blocks of each `session/prompt`.
	pub prompts: Vec<Vec<String>>,
	/// Client replies to agent requests, as sent on the wire.
	pub replies: Vec<Value>,
	pub cancels: usize,
	pub created_sessions: Vec<String>,
	pub loaded_sessions: Vec<String>,
	pub modes: Vec<String>,
}

struct Shared {
	script: AgentScript,
	record: AgentRecord,
	known_sessions: HashSet<String>,
}

/// Launcher for a scripted agent. Sessions survive relaunches, as they
/// would for an agent that persists them.
#[derive(Clone)]
pub struct ScriptedAgent {
	shared: Arc<Mutex<Shared>>,
}

impl ScriptedAgent {
	pub fn new(script: AgentScript) -> Self {
		Self {
			shared: Arc::new(Mutex::new(Shared {
				script,
				record: AgentRecord::default(),
				known_sessions: HashSet::new(),
			})),
		}
	}

	pub fn record(&self) -> AgentRecord {
		self.lock().record.clone()
	}

	/// Forgets every session, as if the agent restarted without state.
	pub fn forget_sessions(&self) {
		self.lock().known_sessions.clear();
	}

	fn lock(&self) -> MutexGuard<'_, Shared> {
		lock(&self.shared)
	}
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
	shared.lock().unwrap_or_else(|e| e.into_inner())
}

impl AgentLauncher for ScriptedAgent {
	fn launch(&self) -> Result<AgentIo, AcpError> {
		self.lock().record.launches += 1;

		let (client_end, agent_end) = tokio::io::duplex(64 * 1024);
		let (agent_read, agent_write) = tokio::io::split(agent_end);
		let (client_read, client_write) = tokio::io::split(client_end);

		let conn_slot = Rc::new(RefCell::new(Weak::new()));
		let exit = CancellationToken::new();
		let agent = ScriptedSession {
			shared: self.shared.clone(),
			conn: conn_slot.clone(),
			cancel: RefCell::new(CancellationToken::new()),
			exit: exit.clone(),
		};
		let (conn, io_task) = acp::AgentSideConnection::new(
			agent,
			agent_write.compat_write(),
			agent_read.compat(),
			|fut| {
				tokio::task::spawn_local(fut);
			},
		);
		let conn = Rc::new(conn);
		*conn_slot.borrow_mut() = Rc::downgrade(&conn);

		tokio::task::spawn_local(async move {
			let _conn = conn;
			tokio::select! {
				_ = io_task => {}
				_ = exit.cancelled() => {}
			}
		});

		Ok(AgentIo {
			incoming: Box::new(client_read),
			outgoing: Box::new(client_write),
			process: None,
		})
	}
}

/// The agent behind one launch.
struct ScriptedSession {
	shared: Arc<Mutex<Shared>>,
	conn: Rc<RefCell<Weak<acp::AgentSideConnection>>>,
	/// Replaced at the start of every prompt.
	cancel: RefCell<CancellationToken>,
	/// Dropping the connection closes the pipe, as a process exit would.
	exit: CancellationToken,
}

impl ScriptedSession {
	fn record_method(&self, method: &str) {
		lock(&self.shared).record.methods.push(method.to_string());
	}

	fn connection(&self) -> acp::Result<Rc<acp::AgentSideConnection>> {
		self
			.conn
			.borrow()
			.upgrade()
			.ok_or_else(acp::Error::internal_error)
	}

	fn record_reply(&self, reply: serde_json::Result<Value>) {
		lock(&self.shared)
			.record
			.replies
			.push(reply.unwrap_or(Value::Null));
	}

	async fn run_step(&self, session_id: &acp::SessionId, step: AgentStep) -> acp::Result<()> {
		let conn = self.connection()?;
		match step {
			AgentStep::Update(update) => {
				let notification = serde_json::from_value(json!({
					"sessionId": session_id.to_string(),
					"update": update,
				}))?;
				conn.session_notification(notification).await?;
			}
			AgentStep::Permission(params) => {
				let reply = conn.request_permission(serde_json::from_value(params)?).await?;
				self.record_reply(serde_json::to_value(&reply));
			}
			AgentStep::ReadFile(params) => {
				let reply = conn.read_text_file(serde_json::from_value(params)?).await?;
				self.record_reply(serde_json::to_value(&reply));
			}
			AgentStep::WriteFile(params) => {
				let reply = conn.write_text_file(serde_json::from_value(params)?).await?;
				self.record_reply(serde_json::to_value(&reply));
			}
			AgentStep::Hang | AgentStep::Exit => {}
		}
		Ok(())
	}
}

fn session_not_found(session_id: &acp::SessionId) -> acp::Error {
	let mut err = acp::Error::internal_error();
	err.message = format!("Session not found: {session_id}");
	err
}

#[async_trait::async_trait(?Send)]
impl acp::Agent for ScriptedSession {
	async fn initialize(&self, _req: acp::InitializeRequest) -> acp::Result<acp::InitializeResponse> {
		self.record_method("initialize");
		let mut capabilities = acp::AgentCapabilities::default();
		capabilities.load_session = lock(&self.shared).script.load_session;
		Ok(acp::InitializeResponse::new(acp::ProtocolVersion::V1).agent_capabilities(capabilities))
	}

	async fn authenticate(
		&self,
		_req: acp::AuthenticateRequest,
	) -> acp::Result<acp::AuthenticateResponse> {
		self.record_method("authenticate");
		Ok(acp::AuthenticateResponse::default())
	}

	async fn new_session(
		&self,
		_req: acp::NewSessionRequest,
	) -> acp::Result<acp::NewSessionResponse> {
		let session_id = {
			let mut shared = lock(&self.shared);
			shared.record.methods.push("session/new".to_string());
			let session_id = format!("sess-{}", shared.record.created_sessions.len() + 1);
			shared.record.created_sessions.push(session_id.clone());
			shared.known_sessions.insert(session_id.clone());
			session_id
		};
		let response = serde_json::from_value(json!({
			"sessionId": session_id,
			"modes": {
				"currentModeId": "default",
				"availableModes": [
					{"id": "default", "name": "Default"},
					{"id": "plan", "name": "Plan"}
				]
			}
		}))?;
		Ok(response)
	}

	async fn load_session(
		&self,
		req: acp::LoadSessionRequest,
	) -> acp::Result<acp::LoadSessionResponse> {
		let known = {
			let mut shared = lock(&self.shared);
			shared.record.methods.push("session/load".to_string());
			let id = req.session_id.to_string();
			let known = shared.known_sessions.contains(&id);
			if known {
				shared.record.loaded_sessions.push(id);
			}
			known
		};
		if !known {
			return Err(session_not_found(&req.session_id));
		}

		// Agents replay the stored conversation while loading.
		self
			.run_step(
				&req.session_id,
				AgentStep::Update(json!({
					"sessionUpdate": "agent_message_chunk",
					"content": {"type": "text", "text": "replayed"}
				})),
			)
			.await?;
		Ok(acp::LoadSessionResponse::default())
	}

	async fn prompt(&self, req: acp::PromptRequest) -> acp::Result<acp::PromptResponse> {
		let texts: Vec<String> = req
			.prompt
			.iter()
			.filter_map(|block| match block {
				acp::ContentBlock::Text(text) => Some(text.text.clone()),
				_ => None,
			})
			.collect();
		let session_id = req.session_id.to_string();

		let (steps, stop_reason) = {
			let mut shared = lock(&self.shared);
			shared.record.methods.push("session/prompt".to_string());
			let index = shared.record.prompts.len();
			shared.record.prompts.push(texts);

			if shared.script.lose_session > 0 || !shared.known_sessions.contains(&session_id) {
				shared.script.lose_session = shared.script.lose_session.saturating_sub(1);
				shared.known_sessions.remove(&session_id);
				drop(shared);
				return Err(session_not_found(&req.session_id));
			}

			let steps = shared
				.script
				.prompts
				.get(index)
				.or_else(|| shared.script.prompts.last())
				.cloned()
				.unwrap_or_default();
			(steps, shared.script.stop_reason.clone())
		};

		let cancel = CancellationToken::new();
		*self.cancel.borrow_mut() = cancel.clone();

		for step in steps {
			if cancel.is_cancelled() {
				return Ok(acp::PromptResponse::new(acp::StopReason::Cancelled));
			}
			match step {
				AgentStep::Hang => {
					cancel.cancelled().await;
				}
				AgentStep::Exit => {
					self.exit.cancel();
					std::future::pending::<()>().await;
				}
				step => self.run_step(&req.session_id, step).await?,
			}
		}

		if cancel.is_cancelled() {
			return Ok(acp::PromptResponse::new(acp::StopReason::Cancelled));
		}
		Ok(acp::PromptResponse::new(stop_reason))
	}

	async fn cancel(&self, _args: acp::CancelNotification) -> acp::Result<()> {
		{
			let mut shared = lock(&self.shared);
			shared.record.methods.push("session/cancel".to_string());
			shared.record.cancels += 1;
		}
		self.cancel.borrow().cancel();
		Ok(())
	}

	async fn set_session_mode(
		&self,
		args: acp::SetSessionModeRequest,
	) -> acp::Result<acp::SetSessionModeResponse> {
		{
			let mut shared = lock(&self.shared);
			shared.record.methods.push("session/set_mode".to_string());
			shared.record.modes.push(args.mode_id.to_string());
		}
		Ok(acp::SetSessionModeResponse::default())
	}

	async fn ext_method(&self, _args: acp::ExtRequest) -> acp::Result<acp::ExtResponse> {
		Err(acp::Error::method_not_found())
	}

	async fn ext_notification(&self, _args: acp::ExtNotification) -> acp::Result<()> {
		Ok(())
	}
}
