use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| {
            r.get(0)
        })?;

    if version < 1 {
        info!("Chat DB: running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE chat_groups (
                id          TEXT PRIMARY KEY,
                trip_id     TEXT NOT NULL,
                name        TEXT NOT NULL,
                description TEXT,
                created_by  TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                deleted_at  TEXT
            );

            CREATE INDEX idx_chat_groups_trip
                ON chat_groups(trip_id, created_at DESC, id DESC);

            CREATE TABLE chat_group_members (
                group_id    TEXT NOT NULL REFERENCES chat_groups(id),
                user_id     TEXT NOT NULL,
                joined_at   TEXT NOT NULL,
                PRIMARY KEY (group_id, user_id)
            );

            CREATE TABLE chat_messages (
                id              TEXT PRIMARY KEY,
                group_id        TEXT NOT NULL REFERENCES chat_groups(id),
                trip_id         TEXT NOT NULL,
                user_id         TEXT NOT NULL,
                content         TEXT NOT NULL,
                content_type    TEXT NOT NULL DEFAULT 'text',
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                deleted_at      TEXT
            );

            CREATE INDEX idx_chat_messages_group
                ON chat_messages(group_id, created_at DESC, id DESC);

            CREATE TRIGGER chat_messages_trip_immutable
                BEFORE UPDATE OF trip_id ON chat_messages
                WHEN NEW.trip_id <> OLD.trip_id
            BEGIN
                SELECT RAISE(ABORT, 'chat_messages.trip_id is immutable');
            END;

            CREATE TABLE chat_reactions (
                message_id  TEXT NOT NULL REFERENCES chat_messages(id),
                user_id     TEXT NOT NULL,
                reaction    TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (message_id, user_id, reaction)
            );

            CREATE TABLE chat_last_read (
                group_id             TEXT NOT NULL REFERENCES chat_groups(id),
                user_id              TEXT NOT NULL,
                last_read_message_id TEXT REFERENCES chat_messages(id),
                updated_at           TEXT NOT NULL,
                PRIMARY KEY (group_id, user_id)
            );

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Chat DB migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn message_trip_id_cannot_change() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO chat_groups VALUES ('g1','t1','General',NULL,'u1','a','a',NULL);
             INSERT INTO chat_messages VALUES ('m1','g1','t1','u1','hi','text','a','a',NULL);",
        )
        .unwrap();

        let err = conn
            .execute("UPDATE chat_messages SET trip_id = 't2' WHERE id = 'm1'", [])
            .unwrap_err();
        assert!(err.to_string().contains("immutable"));
    }
}
