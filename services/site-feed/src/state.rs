use std::time::Instant;

use crate::feed::FeedService;

#[derive(Clone)]
pub struct AppState {
    pub feed: FeedService,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(feed: FeedService) -> Self {
        Self {
            feed,
            started_at: Instant::now(),
        }
    }
}
