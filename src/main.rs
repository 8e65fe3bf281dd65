use ativeplay_catalog::{Catalog, Config, PlaylistSource, RefreshStatus};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ativeplay_catalog=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Load configuration
    let config = Config::from_env();
    if config.playlist_url.is_empty() {
        anyhow::bail!("PLAYLIST_URL is not set");
    }

    tracing::info!("Starting AtivePlay Catalog v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Data directory: {}", config.data_dir.display());

    let catalog = Catalog::new(&config)?;
    let mut source = PlaylistSource::new(&config.playlist_url, &config.playlist_name);
    if let Some(logo_list_url) = &config.logo_list_url {
        source = source.with_logo_list(logo_list_url);
    }
    catalog.initialize(source, config.load_cache).await?;

    if catalog.status()? == RefreshStatus::Ready {
        tracing::info!("Serving {} cached items until refresh completes", catalog.stats()?.total_items);
    }

    catalog.subscribe_ended(|status| tracing::info!(status = %status, "Refresh ended"))?;

    let status = catalog.refresh().await?;
    if status == RefreshStatus::TimedOut {
        tracing::warn!(
            "Refresh did not finish within {}ms, showing previous list",
            config.refresh_timeout_ms
        );
    }

    let stats = catalog.stats()?;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
