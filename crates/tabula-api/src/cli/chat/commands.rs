//! Slash commands handled by the terminal itself.
//!
//! Anything not starting with `/` goes to the workflow engine, including the
//! plain-word commands (`undo`, `reset`, `stats`, `export`, `quit`).

use console::style;

use tabula_types::session::UndoEntry;

/// Terminal-local commands.
#[derive(Debug, PartialEq)]
pub enum ChatCommand {
    Help,
    /// List the undo log, oldest first.
    History,
    Clear,
    Exit,
    Unknown(String),
}

/// Parse `input` as a slash command. `None` means it belongs to the engine.
pub fn parse(input: &str) -> Option<ChatCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let cmd = trimmed
        .split_whitespace()
        .next()
        .unwrap_or(trimmed)
        .to_lowercase();

    match cmd.as_str() {
        "/help" | "/h" | "/?" => Some(ChatCommand::Help),
        "/history" | "/log" => Some(ChatCommand::History),
        "/clear" | "/cls" => Some(ChatCommand::Clear),
        "/exit" | "/quit" | "/q" => Some(ChatCommand::Exit),
        other => Some(ChatCommand::Unknown(other.to_string())),
    }
}

pub fn print_help() {
    println!();
    println!("  {}", style("Engine commands:").bold());
    println!();
    println!("  {}            {}", style("undo").cyan(), "Revert the last change");
    println!("  {}           {}", style("reset").cyan(), "Return to the original dataset");
    println!("  {}           {}", style("stats").cyan(), "Show statistics for the current data");
    println!("  {} {}", style("export <file.csv>").cyan(), "Write the current data to a file");
    println!("  {}            {}", style("quit").cyan(), "End the session");
    println!();
    println!("  {}", style("Terminal commands:").bold());
    println!();
    println!("  {}    {}", style("/help").cyan(), "Show this help message");
    println!("  {} {}", style("/history").cyan(), "List changes that can be undone");
    println!("  {}   {}", style("/clear").cyan(), "Clear the screen");
    println!("  {}    {}", style("/exit").cyan(), "Leave without exporting");
    println!();
    println!("  {}", style("Anything else is sent as a cleaning request.").dim());
    println!();
}

/// Print the undo log, oldest first.
pub fn print_history(entries: &[UndoEntry]) {
    println!();
    if entries.is_empty() {
        println!("  {}", style("No changes yet.").dim());
        println!();
        return;
    }
    for (i, entry) in entries.iter().enumerate() {
        println!(
            "  {} {} {}",
            style(format!("{:>2}.", i + 1)).dim(),
            style(entry.recorded_at.format("%H:%M:%S")).dim(),
            entry.description
        );
    }
    println!();
}
