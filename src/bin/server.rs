use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use huddle::dedup::Semantics;
use huddle::monitor;
use huddle::observability;
use huddle::server::ServerState;

#[derive(Parser)]
#[command(
    name = "huddle-server",
    about = "Facility reservation server over UDP"
)]
struct Cli {
    /// UDP port to listen on
    #[arg(long, default_value_t = 2222)]
    port: u16,

    /// Invocation semantics: at-least-once or at-most-once
    #[arg(long, default_value = "at-least-once")]
    semantics: Semantics,

    /// Serve Prometheus metrics on this port
    #[arg(long = "metricsPort")]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "huddle=info".into()),
        )
        .init();

    let cli = Cli::parse();
    observability::init(cli.metrics_port);

    let state = ServerState::bind(("0.0.0.0", cli.port), cli.semantics)
        .await
        .with_context(|| format!("failed to bind UDP port {}", cli.port))?;
    info!(
        "huddle listening on {} with semantics={}",
        state.local_addr()?,
        state.semantics()
    );

    tokio::spawn(monitor::run_sweeper(state.monitors.clone()));

    tokio::select! {
        result = state.clone().run() => {
            result.context("receive loop failed")?;
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received, stopping");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
