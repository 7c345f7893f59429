//! tabula CLI and HTTP server entry point.
//!
//! Binary name: `tabula`
//!
//! Parses CLI arguments, initializes tracing and the engine, then runs the
//! chosen presentation adapter.

mod cli;
mod http;
mod state;

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use clap_complete::generate;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tabula_observe::tracing_setup::init_tracing(cli.log_filter(), cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    tabula_observe::tracing_setup::shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match &cli.command {
        // Neither needs engine state or an API key.
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(*shell, &mut cmd, "tabula", &mut std::io::stdout());
            Ok(())
        }
        Commands::Inspect { file } => cli::inspect::inspect(file, cli.json).await,

        Commands::Chat { file } => {
            let cwd = std::env::current_dir().context("cannot resolve current directory")?;
            let state = AppState::init(&cli.overrides(), cwd).await?;
            cli::chat::loop_runner::run_chat_loop(&state, file).await
        }

        Commands::Serve { port, host } => {
            let data_dir = tabula_infra::filesystem::resolve_data_dir();
            let export_dir = tabula_infra::filesystem::exports_dir(&data_dir);
            let state = AppState::init(&cli.overrides(), export_dir).await?;
            serve(state, host.clone(), *port).await
        }
    }
}

async fn serve(state: AppState, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| state.config.server.host.clone());
    let port = port.unwrap_or(state.config.server.port);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;

    let shutdown = CancellationToken::new();
    let idle_timeout = Duration::from_secs(state.config.server.session_idle_timeout_secs);
    let sweeper =
        http::sweeper::spawn_idle_sweeper(state.sessions.clone(), idle_timeout, shutdown.clone());

    println!();
    println!(
        "  {} tabula listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{addr}")).cyan()
    );
    println!(
        "  {}",
        console::style(format!("Exports go to {}", state.export_dir().display())).dim()
    );
    println!("  {}", console::style("Press Ctrl+C to stop").dim());
    tracing::info!(%addr, idle_timeout_secs = idle_timeout.as_secs(), "server started");

    let router = http::router::build_router(state.clone());
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    let _ = sweeper.await;
    for id in state.sessions.ids() {
        let _ = state.sessions.remove(&id);
    }

    println!("\n  Server stopped.");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
