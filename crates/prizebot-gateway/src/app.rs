use axum::{
    routing::{delete, get, post},
    Router,
};
use prizebot_core::PrizebotConfig;
use prizebot_giveaway::GiveawayService;
use std::sync::Arc;

use crate::http::{giveaways, health};

/// Central shared state, passed as `Arc<AppState>` to all Axum handlers.
pub struct AppState {
    pub config: PrizebotConfig,
    pub giveaways: Arc<GiveawayService>,
}

impl AppState {
    pub fn new(config: PrizebotConfig, giveaways: Arc<GiveawayService>) -> Self {
        Self { config, giveaways }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/giveaways",
            post(giveaways::create_handler).get(giveaways::list_handler),
        )
        .route("/giveaways/{id}", get(giveaways::info_handler))
        .route("/giveaways/{id}/end", post(giveaways::end_handler))
        .route("/giveaways/{id}/reroll", post(giveaways::reroll_handler))
        .route(
            "/giveaways/{id}/participants",
            post(giveaways::join_handler),
        )
        .route(
            "/giveaways/{id}/participants/{participant}",
            delete(giveaways::leave_handler),
        )
        .route("/giveaways/{id}/toggle", post(giveaways::toggle_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
