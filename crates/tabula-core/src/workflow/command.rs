//! Classification of free-form user input at `AwaitInput`.
//!
//! Routing is keyword based: any message mentioning "undo" reverts, any
//! message mentioning "export" or "save" exports, and a bare "quit"/"exit"
//! ends the session. Everything else goes to the proposal generator.

use tabula_types::session::UserCommand;

const QUIT_WORDS: &[&str] = &["quit", "exit", "bye"];
const RESET_PHRASES: &[&str] = &["reset", "start over", "reset to original", "restore original"];
const STATS_PHRASES: &[&str] = &["stats", "statistics", "show stats", "describe"];

/// Words that may sit between the export keyword and a destination name.
const EXPORT_FILLER: &[&str] = &["export", "save", "as", "to", "into", "it"];

/// Classify `input`. Returns `None` for blank input.
///
/// A leading `/` is accepted so `/undo` and `undo` mean the same thing.
pub fn parse_command(input: &str) -> Option<UserCommand> {
    let trimmed = input.trim();
    let body = trimmed.strip_prefix('/').unwrap_or(trimmed).trim();
    if body.is_empty() {
        return None;
    }

    let lower = body.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .collect();
    let has_word = |w: &str| words.contains(&w);

    let command = if has_word("undo") {
        UserCommand::Undo
    } else if has_word("export") || has_word("save") {
        UserCommand::Export {
            filename: export_filename(body),
        }
    } else if QUIT_WORDS.contains(&lower.as_str()) {
        UserCommand::Quit
    } else if RESET_PHRASES.contains(&lower.as_str()) {
        UserCommand::Reset
    } else if STATS_PHRASES.contains(&lower.as_str()) {
        UserCommand::Stats
    } else {
        UserCommand::Request {
            text: trimmed.to_string(),
        }
    };
    Some(command)
}

/// Destination named in an export request, if any.
///
/// A token ending in `.csv` wins wherever it appears. Otherwise, when the
/// request is `export <name>` or `save as <name>` with exactly one other
/// word, that word (plus `.csv`) is the destination.
pub fn export_filename(input: &str) -> Option<String> {
    let tokens: Vec<String> = input
        .split_whitespace()
        .map(|t| {
            t.trim_end_matches('.')
                .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | ',' | ';' | '!' | '?' | '(' | ')'))
                .trim_end_matches('.')
                .to_string()
        })
        .filter(|t| !t.is_empty())
        .collect();

    if let Some(csv) = tokens
        .iter()
        .find(|t| t.to_lowercase().ends_with(".csv") && t.len() > ".csv".len())
    {
        return sanitize_filename(csv);
    }

    let rest: Vec<&String> = tokens
        .iter()
        .filter(|t| !EXPORT_FILLER.contains(&t.to_lowercase().trim_start_matches('/')))
        .collect();
    match rest.as_slice() {
        [name] => sanitize_filename(&format!("{name}.csv")),
        _ => None,
    }
}

/// Accept only a bare file name: no directories, no traversal.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));
    valid.then(|| name.to_string())
}
