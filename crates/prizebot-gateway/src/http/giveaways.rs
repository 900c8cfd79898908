//! Administrative giveaway commands, a thin JSON layer over
//! [`GiveawayService`](prizebot_giveaway::GiveawayService).
//!
//! Every response is either `{"ok": true, "payload": ...}` or
//! `{"ok": false, "error": {"code": ..., "message": ...}}`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, TimeDelta, Utc};
use prizebot_core::GiveawayId;
use prizebot_giveaway::{CreateGiveaway, GiveawayError, Scope};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::app::AppState;

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

// ── Request bodies ───────────────────────────────────────────────────────────

/// POST /giveaways body. Exactly one of `end_time` / `duration_secs`.
#[derive(Debug, Deserialize)]
pub struct CreateBody {
    pub guild_id: String,
    pub channel_id: String,
    pub prize: String,
    pub created_by: String,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub guild_id: Option<String>,
    pub channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ParticipantBody {
    pub participant_id: String,
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST /giveaways
pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateBody>,
) -> ApiResult {
    let end_time = match (body.end_time, body.duration_secs) {
        (Some(end), None) => end,
        (None, Some(secs)) => {
            let now = state.giveaways.clock().now();
            i64::try_from(secs)
                .ok()
                .and_then(TimeDelta::try_seconds)
                .and_then(|d| now.checked_add_signed(d))
                .ok_or_else(|| {
                    api_error(GiveawayError::InvalidRequest("duration_secs is too large".into()))
                })?
        }
        _ => {
            return Err(api_error(GiveawayError::InvalidRequest(
                "exactly one of end_time or duration_secs is required".into(),
            )))
        }
    };

    let giveaway = state
        .giveaways
        .create(CreateGiveaway {
            guild_id: body.guild_id,
            channel_id: body.channel_id,
            prize: body.prize,
            created_by: body.created_by,
            end_time,
        })
        .await
        .map_err(api_error)?;
    Ok(ok(giveaway))
}

/// GET /giveaways?guild_id=&channel_id=
pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    let guild_id = query
        .guild_id
        .filter(|g| !g.is_empty())
        .ok_or_else(|| api_error(GiveawayError::InvalidRequest("guild_id is required".into())))?;
    let scope = Scope {
        guild_id,
        channel_id: query.channel_id.filter(|c| !c.is_empty()),
    };
    let giveaways = state.giveaways.list(&scope).map_err(api_error)?;
    Ok(ok(giveaways))
}

/// GET /giveaways/{id}
pub async fn info_handler(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let summary = state
        .giveaways
        .info(&GiveawayId::from(id))
        .map_err(api_error)?;
    Ok(ok(summary))
}

/// POST /giveaways/{id}/end
pub async fn end_handler(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let id = GiveawayId::from(id);
    let outcome = state.giveaways.end(&id).await.map_err(api_error)?;
    info!(giveaway_id = %id, ?outcome, "giveaway ended by command");
    Ok(ok(outcome))
}

/// POST /giveaways/{id}/reroll
pub async fn reroll_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    let winner_id = state
        .giveaways
        .reroll(&GiveawayId::from(id))
        .await
        .map_err(api_error)?;
    Ok(ok(json!({ "winner_id": winner_id })))
}

/// POST /giveaways/{id}/participants
pub async fn join_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ParticipantBody>,
) -> ApiResult {
    let change = state
        .giveaways
        .join(&GiveawayId::from(id), &body.participant_id)
        .await
        .map_err(api_error)?;
    Ok(ok(change))
}

/// DELETE /giveaways/{id}/participants/{participant}
pub async fn leave_handler(
    State(state): State<Arc<AppState>>,
    Path((id, participant)): Path<(String, String)>,
) -> ApiResult {
    let change = state
        .giveaways
        .leave(&GiveawayId::from(id), &participant)
        .await
        .map_err(api_error)?;
    Ok(ok(change))
}

/// POST /giveaways/{id}/toggle
pub async fn toggle_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ParticipantBody>,
) -> ApiResult {
    let toggled = state
        .giveaways
        .toggle(&GiveawayId::from(id), &body.participant_id)
        .await
        .map_err(api_error)?;
    Ok(ok(toggled))
}

// ── Response helpers ─────────────────────────────────────────────────────────

fn ok(payload: impl Serialize) -> Json<Value> {
    Json(json!({ "ok": true, "payload": payload }))
}

fn api_error(e: GiveawayError) -> (StatusCode, Json<Value>) {
    let status = match e {
        GiveawayError::NotFound { .. } => StatusCode::NOT_FOUND,
        GiveawayError::InvalidState { .. } | GiveawayError::NoParticipants { .. } => {
            StatusCode::CONFLICT
        }
        GiveawayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        GiveawayError::StoreUnavailable(_) => {
            warn!(error = %e, "command failed on the store");
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    (
        status,
        Json(json!({
            "ok": false,
            "error": { "code": e.code(), "message": e.to_string() },
        })),
    )
}
