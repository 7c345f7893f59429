//! Main chat loop orchestration.
//!
//! Registers a session, loads the dataset, shows its statistics, then feeds
//! each line to the engine and prints what comes back. The session is
//! removed from the registry on every exit path.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use tabula_core::session::state::SessionState;
use tabula_types::message::{EngineOutput, InboundMessage};

use crate::state::AppState;

use super::banner::print_welcome_banner;
use super::commands::{self, ChatCommand};
use super::input::{ChatInput, InputEvent};

fn spinner(message: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

fn print_output(output: &EngineOutput) {
    match output {
        EngineOutput::Stats { text } => {
            println!();
            println!("  {}", style("📊 Statistics").bold());
            for line in text.lines() {
                println!("  {}", style(line).dim());
            }
            println!();
        }
        EngineOutput::Chat { text } => {
            println!();
            println!("  {} {}", style("tabula >").cyan().bold(), text.trim());
            println!();
        }
    }
}

/// Run an interactive session on `file`.
pub async fn run_chat_loop(state: &AppState, file: &Path) -> anyhow::Result<()> {
    let (session_id, slot) = state.sessions.create();
    let result = {
        let mut session = slot.lock().await;
        drive(state, &mut session, slot.cancel_token(), file).await
    };
    let _ = state.sessions.remove(&session_id);
    result
}

async fn drive(
    state: &AppState,
    session: &mut SessionState,
    cancel: &tokio_util::sync::CancellationToken,
    file: &Path,
) -> anyhow::Result<()> {
    let engine = &state.engine;

    let loading = spinner("loading dataset...");
    let loaded = engine.load_path(session, file).await;
    loading.finish_and_clear();
    loaded.with_context(|| format!("cannot load {}", file.display()))?;

    print_welcome_banner(file, &state.config.llm.model, &session.id().to_string());

    let first = engine.advance(session, cancel).await?;
    first.outputs.iter().for_each(print_output);

    let prompt = format!("  {} ", style("You >").green().bold());
    let (mut input, _writer) =
        ChatInput::new(prompt).map_err(|e| anyhow::anyhow!("Failed to initialize input: {e}"))?;

    loop {
        let text = match input.read_line().await {
            InputEvent::Eof => {
                engine.finish(session)?;
                println!("\n  {}", style("Session ended.").dim());
                break;
            }
            InputEvent::Interrupted => {
                println!("\n  {}", style("Press Ctrl+D or type quit to exit.").dim());
                continue;
            }
            InputEvent::Line(text) => text,
        };

        if let Some(cmd) = commands::parse(&text) {
            match cmd {
                ChatCommand::Help => commands::print_help(),
                ChatCommand::History => commands::print_history(session.history()),
                ChatCommand::Clear => input.clear(),
                ChatCommand::Exit => {
                    engine.finish(session)?;
                    println!("\n  {}", style("Session ended.").dim());
                    break;
                }
                ChatCommand::Unknown(name) => println!(
                    "\n  {} Unknown command: {}. Type /help for available commands.\n",
                    style("?").yellow().bold(),
                    style(name).dim()
                ),
            }
            continue;
        }

        let working = spinner("working...");
        let result = engine
            .respond(session, InboundMessage::Chat { text }, cancel)
            .await;
        working.finish_and_clear();

        match result {
            Ok(turn) => {
                turn.outputs.iter().for_each(print_output);
                if turn.is_terminal() {
                    println!("  {}", style("Session ended.").dim());
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(session_id = %session.id(), error = %e, "turn failed");
                println!("\n  {} {e}\n", style("✗").red().bold());
            }
        }
    }

    Ok(())
}
