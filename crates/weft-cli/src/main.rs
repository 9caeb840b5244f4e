// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! weft: terminal front end for the turn orchestrator.
//!
//! Runs one prompt given on the command line, or reads prompts from stdin
//! until end of input. Conversations persist under the XDG data directory.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use weft_cli_acp::AcpSessionManager;
use weft_cli_config::{load_config, CliOverrides, LoadOptions, LoggingConfig, WeftConfig};
use weft_cli_orchestrator::{
	Backend, Conversation, Orchestrator, OrchestratorResult, ToolPipeline, TurnOptions, TurnOutcome,
};
use weft_common_core::{LlmClient, ToolContext};
use weft_common_history::{
	ConversationId, ConversationRecord, ConversationStore, LocalConversationStore,
};

mod interrupt;
mod terminal;
mod wiring;

use interrupt::Interrupts;
use terminal::{Prompter, TerminalApprover, TerminalConfirmer, TerminalObserver};

/// weft - AI coding assistant
#[derive(Parser, Debug)]
#[command(name = "weft", version, about, long_about = None)]
struct Args {
	/// Path to a configuration file used instead of ~/.config/weft/config.toml
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// Workspace directory for file operations (default: current directory)
	#[arg(short, long)]
	workspace: Option<PathBuf>,

	/// Provider entry to use (overrides config)
	#[arg(short, long, env = "WEFT_PROVIDER")]
	provider: Option<String>,

	/// Talk to the configured ACP agent instead of an HTTP provider
	#[arg(long)]
	acp: bool,

	/// Fan the first turn of each request out to both dual-boost providers
	#[arg(long)]
	dual_boost: bool,

	/// Log level (overrides config)
	#[arg(short, long)]
	log_level: Option<String>,

	/// Output logs as JSON
	#[arg(long)]
	log_json: bool,

	/// Conversation to resume; a new one is started when omitted
	#[arg(long)]
	conversation: Option<String>,

	/// Prompt to run; reads prompts from stdin when omitted
	#[arg(trailing_var_arg = true)]
	prompt: Vec<String>,
}

impl From<&Args> for CliOverrides {
	fn from(args: &Args) -> Self {
		CliOverrides {
			provider: args.provider.clone(),
			dual_boost: args.dual_boost.then_some(true),
			log_level: args.log_level.clone(),
		}
	}
}

fn init_tracing(logging: &LoggingConfig, json: bool) {
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(format!("weft={}", logging.level)));

	if json {
		tracing_subscriber::registry()
			.with(filter)
			.with(fmt::layer().json().with_writer(io::stderr))
			.init();
	} else {
		tracing_subscriber::registry()
			.with(filter)
			.with(fmt::layer().compact().with_writer(io::stderr))
			.init();
	}
}

enum Mode {
	Http(Arc<dyn LlmClient>),
	Acp(Box<AcpSessionManager>),
}

struct App {
	orchestrator: Orchestrator,
	mode: Mode,
	conversation: Conversation,
	record: ConversationRecord,
	store: LocalConversationStore,
	interrupts: Interrupts,
	observer: TerminalObserver,
	dual_boost: bool,
}

impl App {
	async fn run_request(&mut self, prompt: String) -> OrchestratorResult<TurnOutcome> {
		let cancel = self.interrupts.begin();
		let options = TurnOptions::new(prompt).with_dual_boost(self.dual_boost);
		let backend = match &mut self.mode {
			Mode::Http(client) => Backend::Http(&**client),
			Mode::Acp(manager) => Backend::Acp(manager.as_mut()),
		};
		let result = self
			.orchestrator
			.run(
				backend,
				&mut self.conversation,
				options,
				&self.observer,
				&cancel,
			)
			.await;
		self.interrupts.finish();

		if let Err(e) = self.persist().await {
			warn!(error = %e, "failed to save conversation");
		}
		result
	}

	async fn persist(&mut self) -> Result<()> {
		self.conversation.store_into(&mut self.record);
		if let Mode::Acp(manager) = &self.mode {
			self.record.acp_session_id = manager.session_id().map(str::to_string);
		}
		self
			.store
			.save(&self.record)
			.await
			.context("failed to save conversation")
	}

	async fn repl(&mut self, prompter: &Prompter) -> Result<()> {
		eprintln!("weft: conversation {}", self.record.id);
		eprintln!("Ctrl-C cancels a request; Ctrl-C twice or end of input exits.\n");
		let shutdown = self.interrupts.shutdown();

		loop {
			print!("> ");
			io::stdout().flush()?;

			let line = tokio::select! {
				biased;

				_ = shutdown.cancelled() => {
					info!("shutdown requested");
					break;
				}

				line = prompter.read_line() => line.context("failed to read stdin")?,
			};

			let Some(line) = line else {
				info!("EOF received, shutting down");
				break;
			};
			let input = line.trim();
			if input.is_empty() {
				continue;
			}

			debug!(input_length = input.len(), "received user input");
			match self.run_request(input.to_string()).await {
				Ok(outcome) => debug!(
					stop = outcome.stop.name(),
					turns = outcome.turns,
					"request finished"
				),
				Err(e) if e.is_cancelled() => {}
				Err(e) => eprintln!("error: {e}"),
			}
		}

		self.persist().await
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	let args = Args::parse();
	// The ACP connection is not Send, so everything runs on one local set.
	let local = tokio::task::LocalSet::new();
	local.run_until(run(args)).await
}

async fn run(args: Args) -> Result<()> {
	let workspace = match &args.workspace {
		Some(path) => path.clone(),
		None => std::env::current_dir().context("failed to read current directory")?,
	};
	let workspace = workspace
		.canonicalize()
		.with_context(|| format!("workspace {} does not exist", workspace.display()))?;

	let config = load_config(LoadOptions {
		config_file: args.config.clone(),
		workspace: Some(workspace.clone()),
		cli: CliOverrides::from(&args),
	})
	.context("failed to load configuration")?;

	init_tracing(&config.logging, args.log_json);
	info!(
		provider = %config.provider,
		acp = args.acp,
		workspace = %workspace.display(),
		"starting weft"
	);

	let store = LocalConversationStore::new(config.paths.conversations_dir());
	let id = match &args.conversation {
		Some(raw) => ConversationId::parse(raw).context("invalid conversation id")?,
		None => ConversationId::new(),
	};
	let record = store
		.load(&id)
		.await
		.context("failed to load conversation")?
		.unwrap_or_else(|| ConversationRecord::new(id));
	let conversation = Conversation::from_record(&record);

	let prompter = Prompter::stdin();
	let mode = build_mode(&args, &config, &workspace, &prompter, &record).await?;
	let orchestrator = build_orchestrator(&config, &workspace, &prompter, &conversation)?;

	let interrupts = Interrupts::new();
	interrupt::spawn_ctrl_c_listener(interrupts.clone());

	let mut app = App {
		orchestrator,
		mode,
		conversation,
		record,
		store,
		interrupts,
		observer: TerminalObserver,
		dual_boost: config.dual_boost.enabled,
	};

	if args.prompt.is_empty() {
		return app.repl(&prompter).await;
	}

	let outcome = app.run_request(args.prompt.join(" ")).await;
	eprintln!("conversation: {}", app.record.id);
	match outcome {
		Ok(_) => Ok(()),
		Err(e) if e.is_cancelled() => Ok(()),
		Err(e) => Err(e).context("request failed"),
	}
}

async fn build_mode(
	args: &Args,
	config: &WeftConfig,
	workspace: &std::path::Path,
	prompter: &Prompter,
	record: &ConversationRecord,
) -> Result<Mode> {
	if !args.acp {
		let client = wiring::http_client(config.selected_provider()?, config)?;
		return Ok(Mode::Http(client));
	}

	let confirmer = Arc::new(TerminalConfirmer::new(prompter.clone()));
	let mut manager = wiring::acp_manager(config, workspace, confirmer)?;
	manager
		.open_session(record.acp_session_id.as_deref())
		.await
		.context("failed to open ACP session")?;
	Ok(Mode::Acp(Box::new(manager)))
}

fn build_orchestrator(
	config: &WeftConfig,
	workspace: &std::path::Path,
	prompter: &Prompter,
	conversation: &Conversation,
) -> Result<Orchestrator> {
	let turn_config = config.turn_config()?;
	let registry = Arc::new(weft_cli_tools::default_registry());
	let pipeline = ToolPipeline::new(registry, turn_config.tool_timeout);
	let tool_ctx = ToolContext::new(workspace)
		.with_plan(conversation.plan.clone())
		.with_approver(Arc::new(TerminalApprover::new(prompter.clone())));

	let mut orchestrator = Orchestrator::new(turn_config, pipeline, tool_ctx);
	if config.dual_boost.enabled {
		orchestrator = orchestrator.with_dual_boost(wiring::dual_boost(config)?);
	}
	Ok(orchestrator)
}
