use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use prizebot_core::GiveawayId;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, instrument};

use crate::error::{GiveawayError, Result};
use crate::store::GiveawayStore;
use crate::types::{ConclusionClaim, Giveaway, GiveawayStatus, MembershipChange, Scope};

const SELECT_GIVEAWAY: &str = "SELECT id, guild_id, channel_id, prize, created_by, created_at,
        end_time, status, winner_id, concluded_at
 FROM giveaways";

/// SQLite-backed [`GiveawayStore`].
///
/// Wraps a single connection in a `Mutex`; every trait method runs inside one
/// lock acquisition, which is what makes the guarded updates atomic with
/// respect to each other.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    /// Open an in-memory database with the schema applied.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        crate::db::init_db(&conn)?;
        Ok(Self::new(conn))
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| GiveawayError::StoreUnavailable("store lock poisoned".to_string()))
    }
}

impl GiveawayStore for SqliteStore {
    #[instrument(skip(self, giveaway), fields(giveaway_id = %giveaway.id))]
    fn create_event(&self, giveaway: &Giveaway) -> Result<GiveawayId> {
        let db = self.conn()?;
        db.execute(
            "INSERT INTO giveaways
             (id, guild_id, channel_id, prize, created_by, created_at, end_time,
              status, winner_id, concluded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                giveaway.id.as_str(),
                giveaway.guild_id,
                giveaway.channel_id,
                giveaway.prize,
                giveaway.created_by,
                ts(&giveaway.created_at),
                ts(&giveaway.end_time),
                giveaway.status.to_string(),
                giveaway.winner_id,
                giveaway.concluded_at.as_ref().map(ts),
            ],
        )?;
        info!("giveaway persisted");
        Ok(giveaway.id.clone())
    }

    #[instrument(skip(self), fields(giveaway_id = %id))]
    fn get_event(&self, id: &GiveawayId) -> Result<Giveaway> {
        let db = self.conn()?;
        fetch(&db, id)
    }

    #[instrument(skip(self))]
    fn active_events(&self, scope: Option<&Scope>) -> Result<Vec<Giveaway>> {
        let db = self.conn()?;
        let guild = scope.map(|s| s.guild_id.as_str());
        let channel = scope.and_then(|s| s.channel_id.as_deref());
        let mut stmt = db.prepare(&format!(
            "{SELECT_GIVEAWAY}
             WHERE status = 'active'
               AND (?1 IS NULL OR guild_id = ?1)
               AND (?2 IS NULL OR channel_id = ?2)
             ORDER BY end_time"
        ))?;
        let rows = stmt.query_map(params![guild, channel], row_to_giveaway)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    #[instrument(skip(self))]
    fn concluding_events(&self) -> Result<Vec<Giveaway>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!(
            "{SELECT_GIVEAWAY} WHERE status = 'concluding' ORDER BY end_time"
        ))?;
        let rows = stmt.query_map([], row_to_giveaway)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    #[instrument(skip(self, joined_at), fields(giveaway_id = %id))]
    fn add_participant(
        &self,
        id: &GiveawayId,
        participant_id: &str,
        joined_at: DateTime<Utc>,
    ) -> Result<MembershipChange> {
        let db = self.conn()?;
        let inserted = db.execute(
            "INSERT OR IGNORE INTO giveaway_participants (giveaway_id, participant_id, joined_at)
             SELECT ?1, ?2, ?3
             WHERE EXISTS (SELECT 1 FROM giveaways WHERE id = ?1 AND status = 'active')",
            params![id.as_str(), participant_id, ts(&joined_at)],
        )?;
        if inserted == 0 {
            // Either already a member, or the giveaway is gone / no longer active.
            require_active(&db, id)?;
        }
        let count = count_participants(&db, id)?;
        debug!(changed = inserted > 0, count, "participant add");
        Ok(MembershipChange {
            changed: inserted > 0,
            count,
        })
    }

    #[instrument(skip(self), fields(giveaway_id = %id))]
    fn remove_participant(
        &self,
        id: &GiveawayId,
        participant_id: &str,
    ) -> Result<MembershipChange> {
        let db = self.conn()?;
        let deleted = db.execute(
            "DELETE FROM giveaway_participants
             WHERE giveaway_id = ?1 AND participant_id = ?2
               AND EXISTS (SELECT 1 FROM giveaways WHERE id = ?1 AND status = 'active')",
            params![id.as_str(), participant_id],
        )?;
        if deleted == 0 {
            require_active(&db, id)?;
        }
        let count = count_participants(&db, id)?;
        debug!(changed = deleted > 0, count, "participant remove");
        Ok(MembershipChange {
            changed: deleted > 0,
            count,
        })
    }

    fn is_participant(&self, id: &GiveawayId, participant_id: &str) -> Result<bool> {
        let db = self.conn()?;
        let found = db
            .query_row(
                "SELECT 1 FROM giveaway_participants
                 WHERE giveaway_id = ?1 AND participant_id = ?2",
                params![id.as_str(), participant_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn list_participants(&self, id: &GiveawayId) -> Result<Vec<String>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT participant_id FROM giveaway_participants
             WHERE giveaway_id = ?1
             ORDER BY joined_at, rowid",
        )?;
        let rows = stmt.query_map([id.as_str()], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn participant_count(&self, id: &GiveawayId) -> Result<usize> {
        let db = self.conn()?;
        count_participants(&db, id)
    }

    #[instrument(skip(self), fields(giveaway_id = %id))]
    fn begin_conclusion(&self, id: &GiveawayId) -> Result<ConclusionClaim> {
        let db = self.conn()?;
        let claimed = db.execute(
            "UPDATE giveaways SET status = 'concluding' WHERE id = ?1 AND status = 'active'",
            [id.as_str()],
        )?;
        let giveaway = fetch(&db, id)?;
        if claimed == 1 {
            return Ok(ConclusionClaim::Claimed(giveaway));
        }
        match giveaway.status {
            GiveawayStatus::Concluding => Ok(ConclusionClaim::Stranded(giveaway)),
            GiveawayStatus::Concluded => Ok(ConclusionClaim::Finished(giveaway)),
            // The UPDATE above would have matched; only reachable if the row
            // changed under the lock, which the Mutex rules out.
            GiveawayStatus::Active => Err(GiveawayError::InvalidState {
                id: id.clone(),
                status: giveaway.status,
            }),
        }
    }

    #[instrument(skip(self, concluded_at), fields(giveaway_id = %id))]
    fn mark_concluded(
        &self,
        id: &GiveawayId,
        winner_id: Option<&str>,
        concluded_at: DateTime<Utc>,
    ) -> Result<bool> {
        let db = self.conn()?;
        let n = db.execute(
            "UPDATE giveaways
             SET status = 'concluded', winner_id = ?2, concluded_at = ?3
             WHERE id = ?1 AND status = 'concluding'",
            params![id.as_str(), winner_id, ts(&concluded_at)],
        )?;
        Ok(n == 1)
    }

    #[instrument(skip(self), fields(giveaway_id = %id))]
    fn set_winner(&self, id: &GiveawayId, winner_id: &str) -> Result<bool> {
        let db = self.conn()?;
        let n = db.execute(
            "UPDATE giveaways SET winner_id = ?2 WHERE id = ?1 AND status = 'concluded'",
            params![id.as_str(), winner_id],
        )?;
        Ok(n == 1)
    }
}

// --- private helpers -------------------------------------------------------

/// Fixed-width nanosecond RFC 3339, so stored values round-trip exactly and
/// still sort lexically.
fn ts(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn fetch(db: &Connection, id: &GiveawayId) -> Result<Giveaway> {
    db.query_row(
        &format!("{SELECT_GIVEAWAY} WHERE id = ?1"),
        [id.as_str()],
        row_to_giveaway,
    )
    .optional()?
    .ok_or_else(|| GiveawayError::NotFound { id: id.clone() })
}

/// `Ok(())` if the giveaway exists and is active, otherwise the matching error.
fn require_active(db: &Connection, id: &GiveawayId) -> Result<()> {
    let status: Option<String> = db
        .query_row(
            "SELECT status FROM giveaways WHERE id = ?1",
            [id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    let status: GiveawayStatus = status
        .ok_or_else(|| GiveawayError::NotFound { id: id.clone() })?
        .parse()
        .map_err(GiveawayError::StoreUnavailable)?;
    if status != GiveawayStatus::Active {
        return Err(GiveawayError::InvalidState {
            id: id.clone(),
            status,
        });
    }
    Ok(())
}

fn count_participants(db: &Connection, id: &GiveawayId) -> Result<usize> {
    let n: i64 = db.query_row(
        "SELECT COUNT(*) FROM giveaway_participants WHERE giveaway_id = ?1",
        [id.as_str()],
        |row| row.get(0),
    )?;
    Ok(n as usize)
}

/// Map a SQLite row to a `Giveaway`.
fn row_to_giveaway(row: &rusqlite::Row<'_>) -> rusqlite::Result<Giveaway> {
    let status_str: String = row.get(7)?;
    let status = status_str.parse::<GiveawayStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })?;
    Ok(Giveaway {
        id: GiveawayId(row.get(0)?),
        guild_id: row.get(1)?,
        channel_id: row.get(2)?,
        prize: row.get(3)?,
        created_by: row.get(4)?,
        created_at: parse_ts(5, row.get(5)?)?,
        end_time: parse_ts(6, row.get(6)?)?,
        status,
        winner_id: row.get(8)?,
        concluded_at: row
            .get::<_, Option<String>>(9)?
            .map(|raw| parse_ts(9, raw))
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(id: &str, guild: &str, channel: &str, end_in_secs: i64) -> Giveaway {
        let now = Utc::now();
        Giveaway {
            id: GiveawayId::from(id),
            guild_id: guild.into(),
            channel_id: channel.into(),
            prize: "Steam key".into(),
            created_by: "admin".into(),
            created_at: now,
            end_time: now + Duration::seconds(end_in_secs),
            status: GiveawayStatus::Active,
            winner_id: None,
            concluded_at: None,
        }
    }

    fn store_with(giveaways: &[Giveaway]) -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        for g in giveaways {
            store.create_event(g).unwrap();
        }
        store
    }

    #[test]
    fn create_then_get_roundtrips_fields() {
        let g = sample("g1", "guild", "chan", 60);
        let store = store_with(&[g.clone()]);
        let loaded = store.get_event(&g.id).unwrap();
        assert_eq!(loaded, g);
        assert!(loaded.winner_id.is_none());
    }

    #[test]
    fn sub_millisecond_deadlines_keep_their_order() {
        let base = Utc::now();
        let mut early = sample("early", "guild", "chan", 60);
        let mut later = sample("later", "guild", "chan", 60);
        early.end_time = base + Duration::nanoseconds(100);
        later.end_time = base + Duration::nanoseconds(120_000);
        let store = store_with(&[later.clone(), early.clone()]);

        let listed = store.active_events(None).unwrap();
        assert_eq!(listed, vec![early, later]);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let store = store_with(&[]);
        let err = store.get_event(&GiveawayId::from("nope")).unwrap_err();
        assert!(matches!(err, GiveawayError::NotFound { .. }));
    }

    #[test]
    fn active_events_filters_by_scope_and_orders_by_deadline() {
        let store = store_with(&[
            sample("late", "g1", "c1", 600),
            sample("soon", "g1", "c2", 60),
            sample("other", "g2", "c1", 30),
        ]);
        let all = store.active_events(None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id.as_str(), "other");

        let guild = store.active_events(Some(&Scope::guild("g1"))).unwrap();
        let ids: Vec<_> = guild.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["soon", "late"]);

        let channel = store
            .active_events(Some(&Scope::channel("g1", "c1")))
            .unwrap();
        assert_eq!(channel.len(), 1);
        assert_eq!(channel[0].id.as_str(), "late");
    }

    #[test]
    fn membership_is_idempotent() {
        let g = sample("g1", "guild", "chan", 60);
        let store = store_with(&[g.clone()]);
        let now = Utc::now();

        let first = store.add_participant(&g.id, "alice", now).unwrap();
        assert_eq!(first, MembershipChange { changed: true, count: 1 });
        let again = store.add_participant(&g.id, "alice", now).unwrap();
        assert_eq!(again, MembershipChange { changed: false, count: 1 });

        let absent = store.remove_participant(&g.id, "bob").unwrap();
        assert_eq!(absent, MembershipChange { changed: false, count: 1 });
        let removed = store.remove_participant(&g.id, "alice").unwrap();
        assert_eq!(removed, MembershipChange { changed: true, count: 0 });
    }

    #[test]
    fn participants_listed_in_join_order() {
        let g = sample("g1", "guild", "chan", 60);
        let store = store_with(&[g.clone()]);
        let now = Utc::now();
        for p in ["carol", "alice", "bob"] {
            store.add_participant(&g.id, p, now).unwrap();
        }
        assert_eq!(
            store.list_participants(&g.id).unwrap(),
            vec!["carol", "alice", "bob"]
        );
        assert!(store.is_participant(&g.id, "bob").unwrap());
        assert!(!store.is_participant(&g.id, "dave").unwrap());
        assert_eq!(store.participant_count(&g.id).unwrap(), 3);
    }

    #[test]
    fn membership_rejected_once_conclusion_claimed() {
        let g = sample("g1", "guild", "chan", 60);
        let store = store_with(&[g.clone()]);
        store.add_participant(&g.id, "alice", Utc::now()).unwrap();
        assert!(matches!(
            store.begin_conclusion(&g.id).unwrap(),
            ConclusionClaim::Claimed(_)
        ));

        let join = store.add_participant(&g.id, "bob", Utc::now()).unwrap_err();
        assert!(matches!(
            join,
            GiveawayError::InvalidState {
                status: GiveawayStatus::Concluding,
                ..
            }
        ));
        let leave = store.remove_participant(&g.id, "alice").unwrap_err();
        assert!(matches!(leave, GiveawayError::InvalidState { .. }));
        assert_eq!(store.participant_count(&g.id).unwrap(), 1);

        let missing = store
            .add_participant(&GiveawayId::from("nope"), "bob", Utc::now())
            .unwrap_err();
        assert!(matches!(missing, GiveawayError::NotFound { .. }));
    }

    #[test]
    fn conclusion_claim_is_compare_and_swap() {
        let g = sample("g1", "guild", "chan", 60);
        let store = store_with(&[g.clone()]);

        assert!(matches!(
            store.begin_conclusion(&g.id).unwrap(),
            ConclusionClaim::Claimed(_)
        ));
        assert!(matches!(
            store.begin_conclusion(&g.id).unwrap(),
            ConclusionClaim::Stranded(_)
        ));
        assert_eq!(store.concluding_events().unwrap().len(), 1);
        assert!(store.active_events(None).unwrap().is_empty());

        let at = Utc::now();
        assert!(store.mark_concluded(&g.id, Some("alice"), at).unwrap());
        // Guarded by status = 'concluding'; a second write is refused.
        assert!(!store.mark_concluded(&g.id, Some("bob"), at).unwrap());

        let done = store.get_event(&g.id).unwrap();
        assert_eq!(done.status, GiveawayStatus::Concluded);
        assert_eq!(done.winner_id.as_deref(), Some("alice"));
        assert!(done.concluded_at.is_some());
        assert!(matches!(
            store.begin_conclusion(&g.id).unwrap(),
            ConclusionClaim::Finished(_)
        ));
    }

    #[test]
    fn set_winner_requires_concluded() {
        let g = sample("g1", "guild", "chan", 60);
        let store = store_with(&[g.clone()]);
        assert!(!store.set_winner(&g.id, "alice").unwrap());

        store.begin_conclusion(&g.id).unwrap();
        store.mark_concluded(&g.id, Some("alice"), Utc::now()).unwrap();
        let before = store.get_event(&g.id).unwrap();

        assert!(store.set_winner(&g.id, "bob").unwrap());
        let after = store.get_event(&g.id).unwrap();
        assert_eq!(after.winner_id.as_deref(), Some("bob"));
        assert_eq!(after.concluded_at, before.concluded_at);
        assert_eq!(after.status, GiveawayStatus::Concluded);
    }
}
