use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{future, Stream, StreamExt};
use std::convert::Infallible;
use tracing::{info, warn};

/// SSE endpoint: one subscription per connection.
///
/// Each snapshot becomes one event whose `id` is the delivery sequence and
/// whose data is the ranked JSON array. Dropping the response (client gone)
/// drops the subscription, which tears it down.
pub async fn stream_handler(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let subscription = state.feed.subscribe()?;
    let subscription_id = subscription.id();
    info!(%subscription_id, "SSE client connected");

    let metrics = state.feed.metrics();
    let stream = subscription.filter_map(move |snapshot| {
        let event = match snapshot.payload() {
            Ok(json) => Some(Ok(Event::default()
                .id(snapshot.sequence.to_string())
                .data(json))),
            Err(e) => {
                // skip this tick, the next one retries
                warn!(%subscription_id, sequence = snapshot.sequence, error = %e, "Failed to serialize snapshot");
                metrics.record_serialization_failure();
                None
            }
        };
        future::ready(event)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
