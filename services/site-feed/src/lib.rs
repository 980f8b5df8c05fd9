//! Live Site Feed Service
//!
//! Loads a fixed set of network sites at startup and pushes each connected
//! dashboard client the most urgent sites, ranked by severity, on a fixed
//! interval:
//! - Snapshot-isolated in-memory repository loaded from a JSON document
//! - Per-subscription tick tasks with an immediate connect-time push
//! - Bounded per-client channels with a drop policy for slow readers
//! - Idempotent teardown on unsubscribe, disconnect or shutdown
//! - Server-Sent Events transport plus health and metrics endpoints
//!
//! # Architecture
//!
//! ```text
//!   sites.json
//!       │
//!   ┌───▼──────┐
//!   │Repository│  ← validated once at startup, read-only afterwards
//!   └───┬──────┘
//!       │ snapshot()
//!   ┌───▼──────────────────────┐
//!   │ FeedService              │
//!   │  ┌──────┐ ┌──────┐       │
//!   │  │tick 1│ │tick 2│ ...   │  ← one task per subscription
//!   │  └──┬───┘ └──┬───┘       │
//!   └─────┼────────┼───────────┘
//!         │        │   bounded channels
//!   ┌─────▼────────▼───────────┐
//!   │   GET /stream (SSE)      │
//!   └──────────────────────────┘
//! ```

pub mod backpressure;
pub mod clock;
pub mod config;
pub mod error;
pub mod feed;
pub mod handlers;
pub mod metrics;
pub mod ranking;
pub mod repository;
pub mod router;
pub mod snapshot;
pub mod state;
pub mod subscription;

pub use config::{FeedConfig, ServerConfig};
pub use feed::FeedService;
pub use router::create_router;
pub use state::AppState;

use tokio::net::TcpListener;
use tracing::info;

/// Serve the HTTP surface until the feed is shut down.
///
/// Open event streams end as soon as `FeedService::shutdown` runs, which
/// lets the graceful shutdown complete.
pub async fn serve(listener: TcpListener, feed: FeedService) -> std::io::Result<()> {
    let app = create_router(AppState::new(feed.clone()));
    info!(addr = ?listener.local_addr().ok(), "Serving site feed");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { feed.closed().await })
        .await
}
