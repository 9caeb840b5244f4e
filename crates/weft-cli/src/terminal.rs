// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Terminal surface: streamed output, stdin prompts and confirmations.

use std::io::{self, Write};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::sync::Mutex;
use weft_cli_acp::{PermissionConfirmer, PermissionDecision, PermissionPrompt};
use weft_cli_orchestrator::TurnObserver;
use weft_common_core::{
	HistoryMessage, Plan, StopReason, TodoStatus, ToolApprover, TurnId,
};

type LineSource = Lines<BufReader<Box<dyn AsyncRead + Send + Unpin>>>;

/// Line reader shared by the prompt loop and the confirmers.
#[derive(Clone)]
pub struct Prompter {
	lines: Arc<Mutex<LineSource>>,
}

impl std::fmt::Debug for Prompter {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Prompter").finish_non_exhaustive()
	}
}

impl Prompter {
	pub fn new(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
		let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
		Self {
			lines: Arc::new(Mutex::new(BufReader::new(reader).lines())),
		}
	}

	pub fn stdin() -> Self {
		Self::new(tokio::io::stdin())
	}

	/// Next line without its terminator; `None` at end of input.
	pub async fn read_line(&self) -> io::Result<Option<String>> {
		self.lines.lock().await.next_line().await
	}

	/// Prints `question` to stderr and reads the answer.
	pub async fn ask(&self, question: &str) -> Option<String> {
		eprint!("{question} ");
		let _ = io::stderr().flush();
		match self.read_line().await {
			Ok(line) => line,
			Err(e) => {
				tracing::warn!(error = %e, "failed to read answer");
				None
			}
		}
	}
}

pub fn parse_decision(answer: &str) -> PermissionDecision {
	match answer.trim().to_lowercase().as_str() {
		"y" | "yes" => PermissionDecision::AllowOnce,
		"a" | "always" => PermissionDecision::AllowAlways,
		"never" => PermissionDecision::RejectAlways,
		_ => PermissionDecision::RejectOnce,
	}
}

/// Answers agent permission requests from stdin.
#[derive(Clone, Debug)]
pub struct TerminalConfirmer {
	prompter: Prompter,
}

impl TerminalConfirmer {
	pub fn new(prompter: Prompter) -> Self {
		Self { prompter }
	}
}

#[async_trait]
impl PermissionConfirmer for TerminalConfirmer {
	async fn confirm(&self, prompt: &PermissionPrompt) -> PermissionDecision {
		let kind = prompt.kind.as_deref().unwrap_or("tool");
		let question = format!(
			"\nallow {kind} `{}`? [y]es / [a]lways / [n]o / never:",
			prompt.title
		);
		match self.prompter.ask(&question).await {
			Some(answer) => parse_decision(&answer),
			None => PermissionDecision::Cancelled,
		}
	}
}

/// Approves local tool side effects from stdin.
#[derive(Clone, Debug)]
pub struct TerminalApprover {
	prompter: Prompter,
}

impl TerminalApprover {
	pub fn new(prompter: Prompter) -> Self {
		Self { prompter }
	}
}

#[async_trait]
impl ToolApprover for TerminalApprover {
	async fn approve(&self, tool_name: &str, summary: &str) -> bool {
		let question = format!("\n{tool_name}: {summary}. proceed? [y/N]");
		self
			.prompter
			.ask(&question)
			.await
			.is_some_and(|a| {
				matches!(
					parse_decision(&a),
					PermissionDecision::AllowOnce | PermissionDecision::AllowAlways
				)
			})
	}
}

/// Writes assistant output to stdout and status lines to stderr.
#[derive(Clone, Copy, Debug, Default)]
pub struct TerminalObserver;

impl TurnObserver for TerminalObserver {
	fn on_chunk(&self, _turn_id: &TurnId, text: &str) {
		let mut stdout = io::stdout().lock();
		let _ = stdout.write_all(text.as_bytes());
		let _ = stdout.flush();
	}

	fn on_message(&self, message: &HistoryMessage) {
		if let Some(line) = render_message(message) {
			eprintln!("{line}");
		}
	}

	fn on_stop(&self, _turn_id: &TurnId, reason: &StopReason) {
		if let Some(line) = render_stop(reason) {
			eprintln!("{line}");
		} else if reason.is_terminal() {
			println!();
		}
	}

	fn on_countdown(&self, remaining_secs: u64) {
		eprint!("\rrate limited, retrying in {remaining_secs}s ");
		let _ = io::stderr().flush();
	}

	fn on_plan(&self, plan: &Plan) {
		eprintln!("{}", render_plan(plan));
	}
}

/// Status line for a history update, if it is worth showing.
pub fn render_message(message: &HistoryMessage) -> Option<String> {
	if message.flags.just_for_display {
		return Some(format!("[{}]", message.text()));
	}
	if message.flags.is_calling {
		let names: Vec<String> = message.tool_uses().into_iter().map(|t| t.name).collect();
		return Some(format!("→ {}", names.join(", ")));
	}
	None
}

pub fn render_stop(reason: &StopReason) -> Option<String> {
	match reason {
		StopReason::Error(e) => Some(format!("\nerror: {e}")),
		_ => None,
	}
}

pub fn render_plan(plan: &Plan) -> String {
	let mut out = String::from("plan:");
	for item in &plan.entries {
		let mark = match item.status {
			TodoStatus::Pending => "[ ]",
			TodoStatus::InProgress => "[~]",
			TodoStatus::Completed => "[x]",
		};
		out.push_str(&format!("\n  {mark} {}", item.content));
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;
	use weft_common_core::{LlmError, TodoItem, ToolUseState};

	#[test]
	fn test_parse_decision() {
		assert_eq!(parse_decision("Y"), PermissionDecision::AllowOnce);
		assert_eq!(parse_decision(" always "), PermissionDecision::AllowAlways);
		assert_eq!(parse_decision("never"), PermissionDecision::RejectAlways);
		assert_eq!(parse_decision(""), PermissionDecision::RejectOnce);
		assert_eq!(parse_decision("maybe"), PermissionDecision::RejectOnce);
	}

	/// **Test: prompts and confirmations read from one shared line source**
	#[tokio::test]
	async fn test_prompter_shared_between_readers() {
		let prompter = Prompter::new(&b"first prompt\ny\n"[..]);
		let approver = TerminalApprover::new(prompter.clone());

		assert_eq!(
			prompter.read_line().await.unwrap().as_deref(),
			Some("first prompt")
		);
		assert!(approver.approve("write_file", "write a.txt").await);
		assert_eq!(prompter.read_line().await.unwrap(), None);
	}

	#[tokio::test]
	async fn test_confirmer_eof_is_cancelled() {
		let confirmer = TerminalConfirmer::new(Prompter::new(&b""[..]));
		let prompt = PermissionPrompt {
			tool_call_id: "t1".to_string(),
			title: "edit main.rs".to_string(),
			kind: Some("edit".to_string()),
			options: Vec::new(),
		};
		assert_eq!(
			confirmer.confirm(&prompt).await,
			PermissionDecision::Cancelled
		);
	}

	#[tokio::test]
	async fn test_approver_rejects_by_default() {
		let approver = TerminalApprover::new(Prompter::new(&b"\n"[..]));
		assert!(!approver.approve("write_file", "write a.txt").await);
	}

	#[test]
	fn test_render_message() {
		let notice = HistoryMessage::display_notice(None, "request cancelled");
		assert_eq!(
			render_message(&notice).as_deref(),
			Some("[request cancelled]")
		);

		let mut call = HistoryMessage::tool_use(
			None,
			"t1",
			"read_file",
			serde_json::json!({}),
			ToolUseState::Generated,
		);
		assert!(render_message(&call).is_none());
		call.flags.is_calling = true;
		assert_eq!(render_message(&call).as_deref(), Some("→ read_file"));
	}

	#[test]
	fn test_render_plan_and_stop() {
		let mut done = TodoItem::new("write tests");
		done.status = TodoStatus::Completed;
		let plan = Plan {
			entries: vec![TodoItem::new("ship"), done],
		};
		assert_eq!(
			render_plan(&plan),
			"plan:\n  [ ] ship\n  [x] write tests"
		);
		assert!(render_stop(&StopReason::Complete).is_none());
		assert!(render_stop(&StopReason::Error(LlmError::Timeout))
			.unwrap()
			.starts_with("\nerror:"));
	}
}
