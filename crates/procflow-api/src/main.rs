//! procflow CLI and REST API entry point.
//!
//! Binary name: `procflow`
//!
//! Parses CLI arguments, initializes the database and engine, then
//! dispatches to the appropriate command handler or starts the REST API
//! server together with the resume ticker.

mod cli;
mod http;
mod state;

use std::sync::Arc;

use clap::Parser;
use clap_complete::generate;
use futures_util::FutureExt;
use procflow_core::workflow::scheduler::{ResumeTicker, TickCallback};
use procflow_observe::tracing_setup::{filter_for_verbosity, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(
        cli.otel,
        cli.log_format,
        filter_for_verbosity(cli.verbose, cli.quiet),
    )
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "procflow", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init().await?;

    match cli.command {
        Commands::Workflow { action } => {
            cli::workflow::handle_workflow_command(action, &state, cli.json).await?;
        }

        Commands::Run { action } => {
            cli::run::handle_run_command(action, &state, cli.json).await?;
        }

        Commands::User { action } => {
            cli::user::handle_user_command(action, &state, cli.json).await?;
        }

        Commands::Tick => {
            cli::trigger::handle_tick(&state, cli.json).await?;
        }

        Commands::Trigger {
            path,
            org,
            metadata,
        } => {
            cli::trigger::handle_trigger(path, org, metadata, &state, cli.json).await?;
        }

        Commands::Watch {
            dir,
            org,
            debounce_ms,
        } => {
            cli::trigger::handle_watch(&dir, org, debounce_ms, &state, cli.json).await?;
        }

        Commands::Serve {
            port,
            host,
            no_ticker,
        } => {
            serve(state, host, port, no_ticker).await?;
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}

/// Serve the REST API, running the resume ticker alongside.
async fn serve(
    state: AppState,
    host: Option<String>,
    port: Option<u16>,
    no_ticker: bool,
) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| state.config.server.host.clone());
    let port = port.unwrap_or(state.config.server.port);

    let event_log = state.engine.event_bus().spawn_event_log();

    let ticker = ResumeTicker::new();
    if !no_ticker {
        let scheduler = state.scheduler.clone();
        let callback: TickCallback = Arc::new(move |now: chrono::DateTime<chrono::Utc>| {
            let scheduler = scheduler.clone();
            async move {
                match scheduler.tick_at(now).await {
                    Ok(report) if report.attempted > 0 => {
                        tracing::info!(
                            attempted = report.attempted,
                            succeeded = report.succeeded,
                            failed = report.failed,
                            skipped = report.skipped,
                            "resume tick finished"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "resume tick failed"),
                }
            }
            .boxed()
        });
        ticker
            .start(&state.config.scheduler.schedule, callback)
            .await?;
    }

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!(
        "  {} procflow API listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{addr}")).cyan()
    );
    println!("  {}", console::style("Press Ctrl+C to stop").dim());

    let router = http::router::build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ticker.stop().await?;
    event_log.abort();
    println!("\n  Server stopped.");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
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
