use anyhow::Context;

use ainventory_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ainventory_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let bind_addr = config.bind_addr.clone();
    let storage = config.storage;

    let app = ainventory_api::app::build_app(config).await?;

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        storage = storage.as_str(),
        "listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
