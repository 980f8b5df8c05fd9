use crate::repository::SiteRepository;
use crate::state::AppState;
use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "records": state.feed.repository().len(),
        "subscriptions": state.feed.active_subscriptions(),
    }))
}

/// Feed counters plus the live subscription count and uptime.
pub async fn metrics_handler(State(state): State<AppState>) -> Json<BTreeMap<String, u64>> {
    let mut exported = state.feed.metrics().export();
    exported.insert(
        "active_subscriptions".to_string(),
        state.feed.active_subscriptions() as u64,
    );
    exported.insert(
        "uptime_seconds".to_string(),
        state.started_at.elapsed().as_secs(),
    );
    Json(exported)
}
