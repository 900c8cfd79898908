//! Webhook announcer: posts giveaway notifications to a Discord-compatible
//! incoming webhook.
//!
//! Rendering is kept in pure functions so the message shapes can be tested
//! without a network.

use std::time::Duration;

use async_trait::async_trait;
use prizebot_giveaway::{AnnounceError, Announcer, DrawResult, Giveaway};
use serde_json::{json, Value};
use tracing::{debug, warn};

const COLOR_OPEN: u32 = 0x2ecc71;
const COLOR_ENDED: u32 = 0x95a5a6;
const COLOR_WINNER: u32 = 0xf1c40f;

pub struct WebhookAnnouncer {
    client: reqwest::Client,
    url: String,
}

impl WebhookAnnouncer {
    pub fn new(url: String, timeout: Duration) -> Result<Self, AnnounceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AnnounceError::Render(e.to_string()))?;
        Ok(Self { client, url })
    }

    async fn post(&self, body: Value) -> Result<(), AnnounceError> {
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnnounceError::Render(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %text, "webhook rejected announcement");
            return Err(AnnounceError::Render(format!("webhook returned {status}")));
        }
        debug!(status = status.as_u16(), "announcement delivered");
        Ok(())
    }
}

#[async_trait]
impl Announcer for WebhookAnnouncer {
    async fn on_created(&self, giveaway: &Giveaway) -> Result<(), AnnounceError> {
        self.post(render_created(giveaway)).await
    }

    async fn on_participants_changed(
        &self,
        giveaway: &Giveaway,
        count: usize,
    ) -> Result<(), AnnounceError> {
        self.post(render_participants(giveaway, count)).await
    }

    async fn on_concluded(
        &self,
        giveaway: &Giveaway,
        result: &DrawResult,
    ) -> Result<(), AnnounceError> {
        self.post(render_concluded(giveaway, result)).await
    }

    async fn on_rerolled(&self, giveaway: &Giveaway, winner_id: &str) -> Result<(), AnnounceError> {
        self.post(render_rerolled(giveaway, winner_id)).await
    }
}

// ── Rendering ────────────────────────────────────────────────────────────────

fn mention(user_id: &str) -> String {
    format!("<@{user_id}>")
}

fn embed(giveaway: &Giveaway, description: String, color: u32) -> Value {
    json!({
        "title": giveaway.prize,
        "description": description,
        "color": color,
        "footer": { "text": format!("Giveaway {}", giveaway.id) },
        "timestamp": giveaway.end_time.to_rfc3339(),
    })
}

pub fn render_created(giveaway: &Giveaway) -> Value {
    let description = format!(
        "Hosted by {}\nEnds <t:{}:R>\nUse the join button to enter.",
        mention(&giveaway.created_by),
        giveaway.end_time.timestamp()
    );
    json!({
        "content": "🎉 **GIVEAWAY** 🎉",
        "embeds": [embed(giveaway, description, COLOR_OPEN)],
    })
}

pub fn render_participants(giveaway: &Giveaway, count: usize) -> Value {
    let noun = if count == 1 { "entry" } else { "entries" };
    json!({
        "embeds": [embed(giveaway, format!("{count} {noun} so far"), COLOR_OPEN)],
    })
}

pub fn render_concluded(giveaway: &Giveaway, result: &DrawResult) -> Value {
    match result {
        DrawResult::Winner(winner) => json!({
            "content": format!("Congratulations {}! You won **{}**!", mention(winner), giveaway.prize),
            "embeds": [embed(giveaway, format!("Winner: {}", mention(winner)), COLOR_WINNER)],
        }),
        DrawResult::NoParticipants => json!({
            "content": format!("The giveaway for **{}** ended with no entries.", giveaway.prize),
            "embeds": [embed(giveaway, "No valid entries, no winner.".to_string(), COLOR_ENDED)],
        }),
    }
}

pub fn render_rerolled(giveaway: &Giveaway, winner_id: &str) -> Value {
    json!({
        "content": format!("🔁 New winner for **{}**: {}!", giveaway.prize, mention(winner_id)),
        "embeds": [embed(giveaway, format!("Rerolled winner: {}", mention(winner_id)), COLOR_WINNER)],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use prizebot_giveaway::GiveawayStatus;

    fn giveaway() -> Giveaway {
        let end = Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap();
        Giveaway {
            id: "g-1".into(),
            guild_id: "guild".into(),
            channel_id: "chan".into(),
            prize: "Steam Deck".into(),
            created_by: "42".into(),
            created_at: end - chrono::Duration::days(1),
            end_time: end,
            status: GiveawayStatus::Active,
            winner_id: None,
            concluded_at: None,
        }
    }

    #[test]
    fn created_mentions_host_and_relative_deadline() {
        let body = render_created(&giveaway());
        let embed = &body["embeds"][0];
        assert_eq!(embed["title"], "Steam Deck");
        let description = embed["description"].as_str().unwrap();
        assert!(description.contains("<@42>"));
        assert!(description.contains(&format!("<t:{}:R>", giveaway().end_time.timestamp())));
        assert_eq!(embed["footer"]["text"], "Giveaway g-1");
    }

    #[test]
    fn participant_count_is_pluralized() {
        let one = render_participants(&giveaway(), 1);
        assert_eq!(one["embeds"][0]["description"], "1 entry so far");
        let many = render_participants(&giveaway(), 3);
        assert_eq!(many["embeds"][0]["description"], "3 entries so far");
    }

    #[test]
    fn concluded_renders_both_outcomes() {
        let won = render_concluded(&giveaway(), &DrawResult::Winner("7".into()));
        assert!(won["content"].as_str().unwrap().contains("<@7>"));
        assert_eq!(won["embeds"][0]["color"], COLOR_WINNER);

        let empty = render_concluded(&giveaway(), &DrawResult::NoParticipants);
        assert!(empty["content"].as_str().unwrap().contains("no entries"));
        assert_eq!(empty["embeds"][0]["color"], COLOR_ENDED);
    }

    #[test]
    fn reroll_names_new_winner() {
        let body = render_rerolled(&giveaway(), "9");
        assert!(body["content"].as_str().unwrap().contains("<@9>"));
    }
}
