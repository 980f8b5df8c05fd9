use std::sync::Arc;

use site_feed::config::{FeedConfig, ServerConfig};
use site_feed::feed::FeedService;
use site_feed::repository::load_from_path;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    tracing::info!("Starting site feed service");

    let config = ServerConfig::from_env()?;

    // No listener until the record set is known
    let (repository, report) = load_from_path(&config.data_path).await?;

    let feed = FeedService::new(Arc::new(repository), FeedConfig::default());
    feed.metrics().record_load(&report);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    let signal_feed = feed.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            signal_feed.shutdown();
        }
    });

    site_feed::serve(listener, feed).await?;

    tracing::info!("Site feed service stopped");
    Ok(())
}
