//! Agora CLI and WebSocket server entry point.
//!
//! Binary name: `agora`
//!
//! Parses CLI arguments, sets up tracing, loads configuration, then either
//! serves the chat endpoint or runs a one-shot command.

mod cli;
mod http;
mod server;
mod state;

use clap::Parser;
use clap_complete::generate;

use agora_infra::config::resolve_data_dir;
use agora_observe::tracing_setup::{TracingOptions, default_filter, init_tracing, shutdown_tracing};
use cli::{Cli, Commands};
use state::{AppState, load_effective_config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need tracing or config
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "agora", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing(&TracingOptions {
        default_filter: default_filter(cli.verbose, cli.quiet).to_string(),
        json: cli.json,
        enable_otel: cli.otel,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let data_dir = resolve_data_dir();
    let mut config = load_effective_config(cli.config.as_deref(), &data_dir).await?;

    match cli.command {
        Commands::Serve { port, host } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }

            let addr = format!("{}:{}", config.server.host, config.server.port);
            let state = AppState::from_config(config, &data_dir).await?;
            let tcp = tokio::net::TcpListener::bind(&addr).await?;

            if !cli.quiet && !cli.json {
                println!();
                println!(
                    "  {} Agora chat listening on {}",
                    console::style("⚡").bold(),
                    console::style(format!("ws://{addr}/ws/{{identity}}")).cyan()
                );
                println!(
                    "  {}",
                    console::style(format!("Bus: {}", state.bus.backend())).dim()
                );
                println!("  {}", console::style("Press Ctrl+C to stop").dim());
            }

            let report = server::run_server(state, tcp, server::shutdown_signal()).await?;

            if !cli.quiet && !cli.json {
                println!(
                    "\n  Server stopped ({} session(s) closed, {} event(s) delivered).",
                    report.sessions_closed, report.listener.events_delivered
                );
            }
        }

        Commands::History { limit } => {
            cli::history::show_history(&config, &data_dir, limit, cli.json).await?;
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}
