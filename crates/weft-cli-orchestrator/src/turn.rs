// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! The turn loop: send, reconcile, run tools, remind, back off, finish.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use weft_cli_acp::{AcpError, AcpSessionManager, AcpTurn};
use weft_common_core::{
	estimate_message_tokens, HistoryMessage, LlmClient, LlmError, LlmEvent, Memory, MessageId,
	SharedPlan, StopReason, ToolContext, ToolUseRef, TurnConfig, TurnId,
};
use weft_common_history::{ConversationRecord, HistoryStore};

use crate::countdown::{CountdownOutcome, RetryTimer};
use crate::dual_boost::DualBoost;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::memory::{estimate_live_tokens, Summarizer};
use crate::observer::{ObserverEvents, TurnObserver};
use crate::pipeline::{PipelineOutcome, ToolPipeline};
use crate::prompt::{resolve_prompt, PromptContext};
use crate::reconcile::StreamReconciler;

pub const CANCELLED_NOTICE: &str = "request cancelled";

/// Long-lived state the caller owns and lends to each request.
#[derive(Debug, Default)]
pub struct Conversation {
	pub history: HistoryStore,
	pub memory: Option<Memory>,
	pub plan: SharedPlan,
	/// Prompt size of the latest turn, as reported by the provider.
	pub tracked_tokens: usize,
}

impl Conversation {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_record(record: &ConversationRecord) -> Self {
		let tracked_tokens = estimate_live_tokens(&record.history, record.memory.as_ref());
		Self {
			history: record.history.clone(),
			memory: record.memory.clone(),
			plan: SharedPlan::new(record.plan.clone()),
			tracked_tokens,
		}
	}

	pub fn store_into(&self, record: &mut ConversationRecord) {
		record.history = self.history.clone();
		record.memory = self.memory.clone();
		record.plan = self.plan.snapshot();
		record.touch();
	}
}

#[derive(Clone, Debug, Default)]
pub struct TurnOptions {
	pub prompt: String,
	pub context: PromptContext,
	/// Fan the first turn out to both dual-boost providers.
	pub dual_boost: bool,
}

impl TurnOptions {
	pub fn new(prompt: impl Into<String>) -> Self {
		Self {
			prompt: prompt.into(),
			..Self::default()
		}
	}

	pub fn with_context(mut self, context: PromptContext) -> Self {
		self.context = context;
		self
	}

	pub fn with_dual_boost(mut self, enabled: bool) -> Self {
		self.dual_boost = enabled;
		self
	}
}

/// Where a request is sent.
pub enum Backend<'a> {
	Http(&'a dyn LlmClient),
	Acp(&'a mut AcpSessionManager),
}

#[derive(Clone, Debug, PartialEq)]
pub struct TurnOutcome {
	pub stop: StopReason,
	/// Model turns issued, excluding summarization and dual-boost fan-out.
	pub turns: u32,
	pub reminders: u32,
}

enum Next {
	Send,
	Summarize,
	Tools {
		turn_id: TurnId,
		pending: Vec<ToolUseRef>,
	},
	Remind(String),
	Wait(u64),
	Finish(StopReason),
}

impl Next {
	fn name(&self) -> &'static str {
		match self {
			Next::Send => "Send",
			Next::Summarize => "Summarize",
			Next::Tools { .. } => "RunTools",
			Next::Remind(_) => "Remind",
			Next::Wait(_) => "WaitRetry",
			Next::Finish(_) => "Finish",
		}
	}
}

#[derive(Default)]
struct RequestState {
	turns: u32,
	reminders: u32,
	completion_called: bool,
	boost_pending: bool,
	compaction_stalled: bool,
}

pub struct Orchestrator {
	config: TurnConfig,
	pipeline: ToolPipeline,
	tool_ctx: ToolContext,
	summarizer: Summarizer,
	dual_boost: Option<DualBoost>,
	retry_timer: RetryTimer,
}

impl Orchestrator {
	pub fn new(config: TurnConfig, pipeline: ToolPipeline, tool_ctx: ToolContext) -> Self {
		Self {
			config,
			pipeline,
			tool_ctx,
			summarizer: Summarizer::default(),
			dual_boost: None,
			retry_timer: RetryTimer::new(),
		}
	}

	pub fn with_summarizer(mut self, summarizer: Summarizer) -> Self {
		self.summarizer = summarizer;
		self
	}

	pub fn with_dual_boost(mut self, dual_boost: DualBoost) -> Self {
		self.dual_boost = Some(dual_boost);
		self
	}

	pub fn with_retry_timer(mut self, retry_timer: RetryTimer) -> Self {
		self.retry_timer = retry_timer;
		self
	}

	pub fn config(&self) -> &TurnConfig {
		&self.config
	}

	/// Drives one user request to a terminal stop.
	///
	/// The observer sees exactly one terminal `on_stop` per model turn.
	/// Cancelling `cancel` any number of times ends the request with a single
	/// `Cancelled` stop and one display-only notice.
	#[instrument(skip_all)]
	pub async fn run(
		&self,
		backend: Backend<'_>,
		conversation: &mut Conversation,
		options: TurnOptions,
		observer: &dyn TurnObserver,
		cancel: &CancellationToken,
	) -> OrchestratorResult<TurnOutcome> {
		match backend {
			Backend::Http(client) => {
				self
					.run_http(client, conversation, options, observer, cancel)
					.await
			}
			Backend::Acp(manager) => {
				self
					.run_acp(manager, conversation, options, observer, cancel)
					.await
			}
		}
	}

	async fn run_http(
		&self,
		client: &dyn LlmClient,
		conversation: &mut Conversation,
		options: TurnOptions,
		observer: &dyn TurnObserver,
		cancel: &CancellationToken,
	) -> OrchestratorResult<TurnOutcome> {
		let user = HistoryMessage::user(options.prompt.clone());
		conversation.tracked_tokens += estimate_message_tokens(&user);
		conversation.history.upsert(user.clone());
		observer.on_message(&user);

		let mut state = RequestState {
			boost_pending: options.dual_boost,
			..RequestState::default()
		};
		info!(provider = client.name(), "request started");

		let mut next = Next::Send;
		loop {
			let from = next.name();
			next = match next {
				Next::Send => {
					if !state.compaction_stalled
						&& Summarizer::needs_compaction(conversation.tracked_tokens, &self.config)
					{
						Next::Summarize
					} else {
						let turn_id = TurnId::new();
						let stop = self
							.send(client, conversation, &options.context, &turn_id, &mut state, observer, cancel)
							.await?;
						self.after_stop(stop, conversation, turn_id, &mut state)?
					}
				}
				Next::Summarize => {
					let result = self
						.summarizer
						.summarize(
							client,
							&mut conversation.history,
							&mut conversation.memory,
							&self.config,
							cancel,
						)
						.await;
					match result {
						Ok(Some(_)) => {
							conversation.tracked_tokens =
								estimate_live_tokens(&conversation.history, conversation.memory.as_ref());
							Next::Send
						}
						Ok(None) => {
							debug!("history too short to compact further");
							state.compaction_stalled = true;
							Next::Send
						}
						Err(e) if e.is_cancelled() => Next::Finish(StopReason::Cancelled),
						// Waiting lands back in Send, which summarizes again.
						Err(OrchestratorError::Llm(LlmError::RateLimited { retry_after_secs })) => {
							warn!(retry_after_secs, "summarization rate limited");
							Next::Wait(retry_after_secs)
						}
						Err(e) => return Err(e),
					}
				}
				Next::Tools { turn_id, pending } => {
					self
						.run_tools(turn_id, pending, conversation, &mut state, observer, cancel)
						.await
				}
				Next::Remind(text) => {
					let reminder = HistoryMessage::context(text);
					conversation.history.upsert(reminder.clone());
					observer.on_message(&reminder);
					Next::Send
				}
				Next::Wait(secs) => self.wait_retry(secs, conversation, observer, cancel).await,
				Next::Finish(stop) => {
					if stop == StopReason::Cancelled {
						append_cancelled_notice(&mut conversation.history, None, observer);
					}
					info!(
						stop = stop.name(),
						turns = state.turns,
						reminders = state.reminders,
						"request finished"
					);
					return Ok(TurnOutcome {
						stop,
						turns: state.turns,
						reminders: state.reminders,
					});
				}
			};
			info!(from, to = next.name(), "state transition");
		}
	}

	/// One model turn. Returns its single terminal stop reason.
	#[allow(clippy::too_many_arguments)]
	#[instrument(skip_all, fields(turn_id = %turn_id))]
	async fn send(
		&self,
		client: &dyn LlmClient,
		conversation: &mut Conversation,
		context: &PromptContext,
		turn_id: &TurnId,
		state: &mut RequestState,
		observer: &dyn TurnObserver,
		cancel: &CancellationToken,
	) -> OrchestratorResult<StopReason> {
		let mut request = resolve_prompt(
			&conversation.history,
			conversation.memory.as_ref(),
			context,
			&self.config,
			self.pipeline.definitions(),
		);

		if std::mem::take(&mut state.boost_pending) {
			if let Some(boost) = &self.dual_boost {
				match boost.aggregate(&request, cancel).await {
					Ok(merged) => request.messages.push(HistoryMessage::context(merged)),
					Err(e) if e.is_cancelled() => return Ok(StopReason::Cancelled),
					Err(e) => return Err(e),
				}
			} else {
				warn!("dual boost requested but not configured");
			}
		}

		state.turns += 1;
		observer.on_start(turn_id);
		let turn_cancel = cancel.child_token();
		let tool_ctx = self.tool_context(conversation, turn_id, &turn_cancel);

		let stop = match client.complete_streaming(request, turn_cancel.clone()).await {
			Ok(mut stream) => {
				let mut reconciler = StreamReconciler::new(turn_id.clone());
				let mut usage = None;
				let stop = loop {
					let event = tokio::select! {
						biased;
						_ = cancel.cancelled() => break StopReason::Cancelled,
						event = stream.next() => event,
					};
					let Some(event) = event else {
						break StopReason::Error(LlmError::InvalidResponse(
							"stream ended without a stop reason".to_string(),
						));
					};
					match event {
						LlmEvent::TextDelta { content } => {
							let msg = reconciler.text(&mut conversation.history, &content);
							observer.on_chunk(turn_id, &content);
							observer.on_message(&msg);
						}
						LlmEvent::ThinkingDelta { content } => {
							let msg = reconciler.thinking(&mut conversation.history, &content);
							observer.on_message(&msg);
						}
						LlmEvent::ToolUseStart { index, id, name } => {
							let msg = reconciler.tool_start(&mut conversation.history, index, &id, &name);
							observer.on_message(&msg);
						}
						LlmEvent::ToolUseDelta {
							index,
							partial_json,
						} => {
							if let Some(msg) =
								reconciler.tool_delta(&mut conversation.history, index, &partial_json)
							{
								observer.on_message(&msg);
								self.preview_tool(&msg, &tool_ctx, turn_id, observer).await;
							}
						}
						LlmEvent::ToolUseDone {
							index,
							id,
							name,
							input,
						} => {
							let msg =
								reconciler.tool_done(&mut conversation.history, index, &id, &name, input);
							observer.on_message(&msg);
						}
						LlmEvent::Usage(reported) => usage = Some(reported),
						LlmEvent::Stop(reason) if reason.is_terminal() => break reason,
						LlmEvent::Start | LlmEvent::Headers(_) | LlmEvent::Stop(_) => {}
					}
				};
				conversation.tracked_tokens = match usage {
					Some(usage) => usage.total() as usize,
					None => estimate_live_tokens(&conversation.history, conversation.memory.as_ref()),
				};
				// Some providers end a turn that carried tool calls with a plain stop.
				if stop == StopReason::Complete && reconciler.saw_tool_use() {
					debug!("turn carried tool calls, stopping as tool_use");
					StopReason::ToolUse
				} else {
					stop
				}
			}
			Err(LlmError::RateLimited { retry_after_secs }) => StopReason::RateLimit { retry_after_secs },
			Err(LlmError::Cancelled) => StopReason::Cancelled,
			Err(e) => StopReason::Error(e),
		};

		turn_cancel.cancel();
		debug!(stop = stop.name(), "turn stopped");
		observer.on_stop(turn_id, &stop);
		Ok(stop)
	}

	async fn preview_tool(
		&self,
		msg: &HistoryMessage,
		ctx: &ToolContext,
		turn_id: &TurnId,
		observer: &dyn TurnObserver,
	) {
		let Some(tool_use) = msg.tool_uses().into_iter().next() else {
			return;
		};
		if !self.pipeline.supports_streaming(&tool_use.name) {
			return;
		}
		if self.pipeline.preview(&tool_use, ctx).await.is_some() {
			observer.on_stop(turn_id, &StopReason::StreamingToolUse);
		}
	}

	fn after_stop(
		&self,
		stop: StopReason,
		conversation: &Conversation,
		turn_id: TurnId,
		state: &mut RequestState,
	) -> OrchestratorResult<Next> {
		Ok(match stop {
			StopReason::Complete => self.completion_policy(conversation, state),
			StopReason::ToolUse => {
				let pending: Vec<ToolUseRef> = conversation
					.history
					.pending_tool_uses()
					.into_iter()
					.filter(|t| {
						conversation
							.history
							.get(&t.message_id)
							.and_then(|m| m.turn_id.as_ref())
							== Some(&turn_id)
					})
					.collect();
				if pending.is_empty() {
					warn!(turn_id = %turn_id, "tool_use stop without pending tool uses");
					self.completion_policy(conversation, state)
				} else {
					Next::Tools { turn_id, pending }
				}
			}
			StopReason::RateLimit { retry_after_secs } => Next::Wait(retry_after_secs),
			StopReason::Cancelled => Next::Finish(StopReason::Cancelled),
			StopReason::Error(e) => return Err(OrchestratorError::Llm(e)),
			StopReason::StreamingToolUse => Next::Send,
		})
	}

	/// Agentic mode nudges the model until it calls the completion tool,
	/// within a bounded number of reminders.
	fn completion_policy(&self, conversation: &Conversation, state: &mut RequestState) -> Next {
		if !self.config.agentic || state.completion_called {
			return Next::Finish(StopReason::Complete);
		}
		let unfinished = conversation.plan.unfinished();
		let cap = if unfinished > 0 {
			self.config.max_todo_reminders
		} else {
			self.config.max_completion_reminders
		};
		if state.reminders >= cap {
			info!(reminders = state.reminders, unfinished, "reminder budget exhausted");
			return Next::Finish(StopReason::Complete);
		}
		state.reminders += 1;
		Next::Remind(reminder_text(unfinished, &self.config.completion_tool_name))
	}

	async fn run_tools(
		&self,
		turn_id: TurnId,
		pending: Vec<ToolUseRef>,
		conversation: &mut Conversation,
		state: &mut RequestState,
		observer: &dyn TurnObserver,
		cancel: &CancellationToken,
	) -> Next {
		let completion_ids: Vec<String> = pending
			.iter()
			.filter(|t| t.name == self.config.completion_tool_name)
			.map(|t| t.id.clone())
			.collect();
		let ctx = self.tool_context(conversation, &turn_id, &cancel.child_token());
		let plan_before = conversation.plan.snapshot();

		let outcome = self
			.pipeline
			.run(pending, &mut conversation.history, &ctx, observer)
			.await;

		let plan_after = conversation.plan.snapshot();
		if plan_after != plan_before {
			observer.on_plan(&plan_after);
		}

		match outcome {
			PipelineOutcome::Cancelled => Next::Finish(StopReason::Cancelled),
			PipelineOutcome::Completed { executed } => {
				debug!(executed, "tool pipeline finished");
				let completed = completion_ids
					.iter()
					.any(|id| tool_succeeded(&conversation.history, id));
				if completed {
					info!("completion tool called, finishing");
					state.completion_called = true;
					Next::Finish(StopReason::Complete)
				} else {
					Next::Send
				}
			}
		}
	}

	async fn wait_retry(
		&self,
		secs: u64,
		conversation: &mut Conversation,
		observer: &dyn TurnObserver,
		cancel: &CancellationToken,
	) -> Next {
		let notice_id = MessageId::new();
		let history = &mut conversation.history;
		let outcome = self
			.retry_timer
			.run(secs, cancel, |remaining| {
				let notice = HistoryMessage::display_notice(
					None,
					format!("rate limited, retrying in {remaining}s"),
				)
				.with_id(notice_id.clone());
				history.upsert(notice.clone());
				observer.on_message(&notice);
				observer.on_countdown(remaining);
			})
			.await;

		match outcome {
			CountdownOutcome::Elapsed => {
				if let Some(notice) = history.update(&notice_id, |m| {
					*m = HistoryMessage::display_notice(None, "rate limited, retrying now");
				}) {
					observer.on_message(&notice);
				}
				Next::Send
			}
			CountdownOutcome::Aborted | CountdownOutcome::Superseded => {
				Next::Finish(StopReason::Cancelled)
			}
		}
	}

	#[instrument(skip_all)]
	async fn run_acp(
		&self,
		manager: &mut AcpSessionManager,
		conversation: &mut Conversation,
		options: TurnOptions,
		observer: &dyn TurnObserver,
		cancel: &CancellationToken,
	) -> OrchestratorResult<TurnOutcome> {
		let user = HistoryMessage::user(options.prompt.clone());
		conversation.history.upsert(user.clone());
		observer.on_message(&user);

		let turn_id = TurnId::new();
		observer.on_start(&turn_id);
		let events = ObserverEvents(observer);
		let result = manager
			.prompt(
				AcpTurn {
					history: &mut conversation.history,
					plan: &conversation.plan,
					turn_id: turn_id.clone(),
					text: options.prompt,
					events: &events,
				},
				cancel,
			)
			.await;

		let stop = match result {
			Ok(stop) => stop,
			Err(AcpError::Cancelled) => StopReason::Cancelled,
			Err(e) => {
				observer.on_stop(&turn_id, &StopReason::Error(LlmError::Transport(e.to_string())));
				return Err(e.into());
			}
		};
		observer.on_stop(&turn_id, &stop);

		match stop {
			StopReason::Cancelled => {
				append_cancelled_notice(&mut conversation.history, Some(turn_id), observer);
			}
			StopReason::Error(e) => return Err(e.into()),
			_ => {}
		}
		Ok(TurnOutcome {
			stop,
			turns: 1,
			reminders: 0,
		})
	}

	fn tool_context(
		&self,
		conversation: &Conversation,
		turn_id: &TurnId,
		cancel: &CancellationToken,
	) -> ToolContext {
		self
			.tool_ctx
			.clone()
			.with_plan(conversation.plan.clone())
			.for_turn(turn_id.clone(), cancel.clone())
	}
}

fn append_cancelled_notice(
	history: &mut HistoryStore,
	turn_id: Option<TurnId>,
	observer: &dyn TurnObserver,
) {
	let notice = HistoryMessage::display_notice(turn_id, CANCELLED_NOTICE);
	history.upsert(notice.clone());
	observer.on_message(&notice);
}

fn tool_succeeded(history: &HistoryStore, tool_use_id: &str) -> bool {
	history.iter().any(|m| {
		m.blocks().iter().any(|b| {
			matches!(
				b,
				weft_common_core::ContentBlock::ToolResult { tool_use_id: id, is_error: false, .. }
					if id == tool_use_id
			)
		})
	})
}

fn reminder_text(unfinished: usize, completion_tool: &str) -> String {
	if unfinished > 0 {
		format!(
			"<system-reminder>\nYou still have {unfinished} unfinished todo item(s). Keep working \
			 on them and call `{completion_tool}` once everything is done.\n</system-reminder>"
		)
	} else {
		format!(
			"<system-reminder>\nIf the task is finished, call `{completion_tool}` with a short \
			 summary of the result. Otherwise continue working.\n</system-reminder>"
		)
	}
}
