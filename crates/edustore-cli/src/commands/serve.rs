// `edustore serve`: run the HTTP API until SIGINT or SIGTERM.

use std::time::Duration;

use clap::Args;
use colored::Colorize;

use edustore_axum::EduStore;

use super::{connect, CliResult, ConfigArgs};

/// How often stale rate-limit windows are dropped.
const SWEEP_INTERVAL_SECS: u64 = 300;

#[derive(Args)]
pub struct ServeArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Bind address (default: server.host)
    #[arg(long)]
    host: Option<String>,

    /// Port (default: server.port, or PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

pub async fn run(args: ServeArgs) -> CliResult {
    edustore_core::env::init_logger();

    let mut options = args.config.read_options()?;
    if let Some(host) = args.host {
        options.server.host = host;
    }
    if let Some(port) = args.port {
        options.server.port = port;
    }
    options.validate()?;

    let (adapter, status) = connect(&options).await?;
    tracing::info!(?status, "database schema checked");

    let addr = format!("{}:{}", options.server.host, options.server.port);
    let base_path = options.base_path.clone();
    let edustore = EduStore::new(options, adapter.clone());
    let app = edustore.router_with_cors();

    let limiter = edustore.context().rate_limiter.clone();
    let sweeper = tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
        loop {
            tick.tick().await;
            limiter.cleanup();
        }
    });

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("cannot bind {addr}: {e}"))?;
    println!(
        "{} EduStore listening on {}{}",
        "●".cyan(),
        format!("http://{addr}").green(),
        base_path
    );
    tracing::info!(%addr, "server started");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweeper.abort();
    // The pool is closed even when the server stopped with an error.
    adapter.close().await;
    tracing::info!("server stopped");
    served.map_err(|e| format!("server failed: {e}").into())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("shutdown requested, draining connections");
}
