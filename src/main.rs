use anyhow::Result;
use clap::Parser;
use tracing::info;
use viva_session::{create_router, AppState, Config};

#[derive(Debug, Parser)]
#[command(name = "viva-session", about = "Voice assessment session orchestrator")]
struct Args {
    /// Config file path (without extension)
    #[arg(long, default_value = "config/viva-session")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Realtime endpoint: {} ({})", cfg.realtime.base_url, cfg.realtime.model);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let state = AppState::new(cfg);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, router).await?;

    Ok(())
}
