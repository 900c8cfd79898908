use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: liveness probe with the number of armed giveaway timers.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let announcer = match state.config.announcer.webhook_url {
        Some(_) => "webhook",
        None => "log",
    };
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timers": state.giveaways.scheduler().len(),
        "announcer": announcer,
    }))
}
