use anyhow::{Context, Result};
use clap::Parser;
use mic_guardian::config::{ProviderKind, SourceKind};
use mic_guardian::{create_router, AppState, Config, LogListener, MonitorService};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Audit which applications use the microphone, when, and for how long
#[derive(Debug, Parser)]
#[command(name = "mic-guardian", version)]
struct Args {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/guardian")]
    config: String,

    /// Replay a JSON-lines script instead of watching the real microphone
    #[arg(long)]
    script: Option<PathBuf>,

    /// Do not serve the HTTP API
    #[arg(long)]
    no_http: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut cfg = Config::load(&args.config)?;

    if let Some(script) = args.script {
        cfg.source.kind = SourceKind::Replay;
        cfg.source.script = Some(script);
        if cfg.attribution.kind == ProviderKind::Disabled {
            cfg.attribution.kind = ProviderKind::Replay;
        }
    }

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!(
        "Source: {:?}, attribution: {:?}, history: {} sessions",
        cfg.source.kind, cfg.attribution.kind, cfg.monitor.log_capacity
    );

    let service = Arc::new(MonitorService::from_config(&cfg)?);
    service.sink().subscribe(LogListener)?;
    service.start().await?;

    let server = if cfg.service.http.enabled && !args.no_http {
        let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind HTTP API to {}", addr))?;
        info!("HTTP API listening on http://{}", addr);

        let app = create_router(AppState::new(Arc::clone(&service)));
        Some(tokio::spawn(async move { axum::serve(listener, app).await }))
    } else {
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutting down");

    service.stop().await?;
    if let Some(server) = server {
        server.abort();
    }
    service.sink().close().await;

    let status = service.status();
    info!("{} sessions in history", status.sessions_logged);

    Ok(())
}
