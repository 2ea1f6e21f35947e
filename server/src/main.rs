use anyhow::Result;
use axum::Router;
use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, EnvFilter};
use server::build_app;
use tokio::net::TcpListener;

/// Serve top-N recommendations from a built artifact.
///
/// `ADMIN_TOKEN` enables `POST /admin/reload`; `CORS_ALLOW_ORIGIN` restricts
/// browser origins (comma-separated).
#[derive(Parser)]
#[command(name = "server")]
struct Args {
    /// Artifact directory written by `builder build`; reloads read the same path
    #[arg(long, default_value = "./model")]
    artifact: String,
    /// Interface the recommendation API listens on
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port the recommendation API listens on
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let app: Router = build_app(args.artifact.clone())?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, artifact = %args.artifact, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
