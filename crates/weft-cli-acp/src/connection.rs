// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Agent subprocess launch and the protocol connection over its stdio.

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;

use agent_client_protocol as acp;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio_util::compat::{TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::WeftClient;
use crate::error::AcpError;

/// Byte streams to a running agent.
pub struct AgentIo {
	/// What the agent writes.
	pub incoming: Box<dyn AsyncRead + Unpin>,
	/// What the agent reads.
	pub outgoing: Box<dyn AsyncWrite + Unpin>,
	/// Kept alive for as long as the connection.
	pub process: Option<Child>,
}

/// Starts agent processes. Called again on every reconnect.
pub trait AgentLauncher: Send + Sync {
	fn launch(&self) -> Result<AgentIo, AcpError>;
}

/// Launches the agent as a child process speaking the protocol over stdio.
#[derive(Clone, Debug)]
pub struct SubprocessLauncher {
	pub command: String,
	pub args: Vec<String>,
	pub env: Vec<(String, String)>,
	pub cwd: Option<PathBuf>,
}

impl SubprocessLauncher {
	pub fn new(command: impl Into<String>) -> Self {
		Self {
			command: command.into(),
			args: Vec::new(),
			env: Vec::new(),
			cwd: None,
		}
	}

	pub fn with_args(mut self, args: Vec<String>) -> Self {
		self.args = args;
		self
	}

	pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
		self.env = env;
		self
	}

	pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
		self.cwd = Some(cwd.into());
		self
	}
}

impl AgentLauncher for SubprocessLauncher {
	fn launch(&self) -> Result<AgentIo, AcpError> {
		let mut command = Command::new(&self.command);
		command
			.args(&self.args)
			.envs(self.env.iter().cloned())
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true);
		if let Some(cwd) = &self.cwd {
			command.current_dir(cwd);
		}

		let mut child = command.spawn()?;
		debug!(command = %self.command, pid = ?child.id(), "spawned acp agent");

		let stdin = child
			.stdin
			.take()
			.ok_or_else(|| std::io::Error::other("agent stdin unavailable"))?;
		let stdout = child
			.stdout
			.take()
			.ok_or_else(|| std::io::Error::other("agent stdout unavailable"))?;
		if let Some(stderr) = child.stderr.take() {
			let mut lines = BufReader::new(stderr).lines();
			tokio::spawn(async move {
				while let Ok(Some(line)) = lines.next_line().await {
					debug!(target: "weft_acp::agent_stderr", "{line}");
				}
			});
		}

		Ok(AgentIo {
			incoming: Box::new(stdout),
			outgoing: Box::new(stdin),
			process: Some(child),
		})
	}
}

/// A live protocol connection. Dropping it closes the streams and kills
/// the agent process.
pub(crate) struct AgentConnection {
	conn: acp::ClientSideConnection,
	closed: CancellationToken,
	_process: Option<Child>,
}

impl AgentConnection {
	/// Must be called from within a `tokio::task::LocalSet`.
	pub fn start(io: AgentIo, client: WeftClient) -> Self {
		let closed = CancellationToken::new();
		let (conn, io_task) = acp::ClientSideConnection::new(
			client,
			io.outgoing.compat_write(),
			io.incoming.compat(),
			|fut| {
				tokio::task::spawn_local(fut);
			},
		);

		let guard = closed.clone();
		tokio::task::spawn_local(async move {
			tokio::select! {
				result = io_task => match result {
					Ok(()) => debug!("agent closed the connection"),
					Err(e) => warn!(error = %e, "acp i/o error"),
				},
				_ = guard.cancelled() => debug!("acp connection dropped"),
			}
			guard.cancel();
		});

		Self {
			conn,
			closed,
			_process: io.process,
		}
	}

	pub fn agent(&self) -> &acp::ClientSideConnection {
		&self.conn
	}

	pub fn closed(&self) -> &CancellationToken {
		&self.closed
	}

	/// Awaits a call on [`Self::agent`], failing with
	/// [`AcpError::ProcessExited`] once the agent is gone.
	pub async fn call<T>(
		&self,
		request: impl Future<Output = acp::Result<T>>,
	) -> Result<T, AcpError> {
		if self.closed.is_cancelled() {
			return Err(AcpError::ProcessExited);
		}
		let result = tokio::select! {
			biased;

			result = request => result.map_err(AcpError::from),
			_ = self.closed.cancelled() => Err(AcpError::ProcessExited),
		};
		match result {
			Err(AcpError::Agent(_)) if self.closed.is_cancelled() => Err(AcpError::ProcessExited),
			other => other,
		}
	}
}

impl Drop for AgentConnection {
	fn drop(&mut self) {
		self.closed.cancel();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::cell::RefCell;
	use std::rc::Rc;
	use std::sync::Arc;
	use std::time::Duration;

	use acp::Agent as _;

	use crate::client::ClientShared;
	use crate::files::WorkspaceFiles;
	use crate::permission::{FixedConfirmer, PermissionDecision};

	fn client() -> WeftClient {
		WeftClient::new(
			Rc::new(RefCell::new(ClientShared::default())),
			Arc::new(FixedConfirmer(PermissionDecision::RejectOnce)),
			Arc::new(WorkspaceFiles::new()),
			true,
		)
	}

	#[tokio::test]
	async fn test_missing_command_fails_to_launch() {
		let launcher = SubprocessLauncher::new("weft-test-no-such-agent").with_args(vec!["--acp".into()]);
		assert!(matches!(launcher.launch(), Err(AcpError::Io(_))));
	}

	/// **Test: an agent that exits closes the connection and fails later calls**
	#[cfg(unix)]
	#[tokio::test]
	async fn test_exited_agent_is_process_exit() {
		tokio::task::LocalSet::new()
			.run_until(async {
				let io = SubprocessLauncher::new("true").launch().unwrap();
				let connection = AgentConnection::start(io, client());

				tokio::time::timeout(Duration::from_secs(5), connection.closed().cancelled())
					.await
					.expect("connection should close when the agent exits");

				let request = acp::InitializeRequest::new(acp::ProtocolVersion::V1);
				let err = connection
					.call(connection.agent().initialize(request))
					.await
					.unwrap_err();
				assert!(matches!(err, AcpError::ProcessExited));
			})
			.await;
	}
}
