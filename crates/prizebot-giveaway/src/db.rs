use rusqlite::Connection;

use crate::error::Result;

/// Initialise the giveaway schema in `conn`.
///
/// Creates the `giveaways` and `giveaway_participants` tables (idempotent).
/// The `status` index keeps the startup recovery queries cheap.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS giveaways (
            id            TEXT NOT NULL PRIMARY KEY,
            guild_id      TEXT NOT NULL,
            channel_id    TEXT NOT NULL,
            prize         TEXT NOT NULL,
            created_by    TEXT NOT NULL,
            created_at    TEXT NOT NULL,   -- RFC 3339
            end_time      TEXT NOT NULL,   -- RFC 3339
            status        TEXT NOT NULL DEFAULT 'active'
                          CHECK (status IN ('active', 'concluding', 'concluded')),
            winner_id     TEXT,            -- NULL until concluded with participants
            concluded_at  TEXT             -- NULL until concluded
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_giveaways_status ON giveaways (status, guild_id);

        CREATE TABLE IF NOT EXISTS giveaway_participants (
            giveaway_id     TEXT NOT NULL REFERENCES giveaways (id) ON DELETE CASCADE,
            participant_id  TEXT NOT NULL,
            joined_at       TEXT NOT NULL,
            PRIMARY KEY (giveaway_id, participant_id)
        ) STRICT;
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type = 'table' AND name IN ('giveaways', 'giveaway_participants')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }

    #[test]
    fn unknown_status_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        let res = conn.execute(
            "INSERT INTO giveaways
             (id, guild_id, channel_id, prize, created_by, created_at, end_time, status)
             VALUES ('g', 'guild', 'chan', 'prize', 'admin', 't0', 't1', 'paused')",
            [],
        );
        assert!(res.is_err());
    }
}
