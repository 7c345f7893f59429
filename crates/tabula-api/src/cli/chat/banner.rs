//! Welcome banner for chat sessions.

use std::path::Path;

use console::style;

/// Print the banner shown once the dataset is loaded.
pub fn print_welcome_banner(file: &Path, model: &str, session_id: &str) {
    println!();
    println!("  {} {}", style("▦").cyan(), style("tabula").cyan().bold());
    println!(
        "  {}",
        style("Describe a cleaning step in plain words; generated code runs on a copy.").dim()
    );
    println!();
    println!("  {}  {}", style("Dataset:").bold(), style(file.display()).dim());
    println!("  {}    {}", style("Model:").bold(), style(model).dim());
    println!(
        "  {}  {}",
        style("Session:").bold(),
        style(&session_id[..8.min(session_id.len())]).dim()
    );
    println!();
    println!(
        "  {}",
        style("Try: undo, reset, stats, export <file.csv>, quit. /help for more").dim()
    );
    println!("  {}", style("---").dim());
    println!();
}
