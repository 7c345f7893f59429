//! Interactive terminal session: `tabula chat <file.csv>`.
//!
//! Loads the file as the session's original dataset, prints its statistics
//! and then relays each line to the workflow engine until the user quits.
//! Entry point: [`loop_runner::run_chat_loop`].

pub mod banner;
pub mod commands;
pub mod input;
pub mod loop_runner;
