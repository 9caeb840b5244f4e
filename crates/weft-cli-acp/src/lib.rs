// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Client side of the Agent Client Protocol (ACP).
//!
//! weft can drive an external coding agent as a subprocess instead of
//! calling a model provider directly. The agent owns tool execution; weft
//! streams its session updates into history, answers permission and file
//! requests, and recovers when the agent forgets a session.
//!
//! The protocol connection is built on `agent-client-protocol` and is not
//! `Send`; everything here runs on a `tokio::task::LocalSet`.

mod client;
pub mod connection;
pub mod error;
pub mod files;
pub mod permission;
pub mod session;
pub mod truncate;
pub mod updates;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use agent_client_protocol::{AvailableCommand, SessionMode};
pub use client::SessionInfo;
pub use connection::{AgentIo, AgentLauncher, SubprocessLauncher};
pub use error::AcpError;
pub use files::{FileAccess, WorkspaceFiles};
pub use permission::{
	FixedConfirmer, PermissionConfirmer, PermissionDecision, PermissionPrompt, PLAN_MODE,
};
pub use session::{AcpConfig, AcpSessionManager, AcpTurn, ConnectionState};
pub use truncate::{render_transcript, truncate_history, TruncationConfig};
pub use updates::{AcpEvents, NoopEvents};
