use anyhow::Context;
use image2pdf_api::{app, spawn_retention_sweep, OutputStorage, ResponseMode, ServerConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "image2pdf_api=debug,image2pdf=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env().context("invalid server configuration")?;
    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "failed to create output directory {}",
            config.output_dir.display()
        )
    })?;
    if !config.static_dir.join("index.html").is_file() {
        tracing::warn!(
            static_dir = %config.static_dir.display(),
            "index.html not found; the landing page will return 404"
        );
    }

    if config.response_mode == ResponseMode::Link {
        match config.output_retention {
            Some(retention) => {
                spawn_retention_sweep(OutputStorage::new(config.output_dir.clone()), retention);
                info!(retention_secs = retention.as_secs(), "output retention sweep started");
            }
            None => tracing::warn!("output retention disabled; outputs are kept until removed"),
        }
    }

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    info!(
        mode = %config.response_mode,
        output_dir = %config.output_dir.display(),
        "image2pdf API listening on http://{}",
        config.bind
    );

    axum::serve(listener, app(config)).await?;
    Ok(())
}
