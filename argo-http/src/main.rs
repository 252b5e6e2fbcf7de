use std::net::SocketAddr;

use anyhow::Context;
use argo_config::AppConfig;
use argo_core::bootstrap::bootstrap;
use argo_http::{router, AppState};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AppConfig::load()?;
    argo_config::logging::init(&cfg.logging);

    let services = bootstrap(&cfg).await?;
    info!(
        tables = ?services.relational.tables(),
        model = %cfg.completion.model,
        "argo services ready"
    );

    let app = router(AppState {
        resolver: services.resolver,
    });

    let addr: SocketAddr = cfg
        .server
        .addr
        .parse()
        .with_context(|| format!("invalid server.addr {:?}", cfg.server.addr))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "argo chat server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
