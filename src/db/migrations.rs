use anyhow::Result;
use rusqlite::Connection;

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch("
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL UNIQUE COLLATE NOCASE,
            created_at  TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS habits (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id       INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name          TEXT NOT NULL,
            category      TEXT NOT NULL,
            habit_type    TEXT NOT NULL DEFAULT 'checkbox'
                          CHECK(habit_type IN ('checkbox','timer','count')),
            color         TEXT NOT NULL DEFAULT '#6366f1',
            icon          TEXT,
            target_count  INTEGER,
            schedule_days TEXT NOT NULL DEFAULT '',
            archived      INTEGER DEFAULT 0,
            created_at    TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS habit_logs (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            habit_id   INTEGER NOT NULL REFERENCES habits(id) ON DELETE CASCADE,
            user_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            date       TEXT NOT NULL,
            completed  INTEGER DEFAULT 0,
            duration   INTEGER,
            count      INTEGER,
            note       TEXT,
            UNIQUE(habit_id, date)
        );

        CREATE INDEX IF NOT EXISTS idx_habit_logs_user_date ON habit_logs(user_id, date);

        CREATE TABLE IF NOT EXISTS habit_groups (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            name         TEXT NOT NULL,
            description  TEXT,
            emoji        TEXT NOT NULL DEFAULT '🎯',
            color        TEXT NOT NULL DEFAULT '#6366f1',
            join_code    TEXT NOT NULL UNIQUE,
            end_date     TEXT,
            owner_id     INTEGER NOT NULL REFERENCES users(id),
            created_at   TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS group_members (
            group_id   INTEGER NOT NULL REFERENCES habit_groups(id) ON DELETE CASCADE,
            user_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            role       TEXT NOT NULL DEFAULT 'member'
                       CHECK(role IN ('owner','admin','member')),
            joined_at  TEXT DEFAULT (datetime('now')),
            PRIMARY KEY (group_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS group_habits (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id      INTEGER NOT NULL REFERENCES habit_groups(id) ON DELETE CASCADE,
            name          TEXT NOT NULL,
            habit_type    TEXT NOT NULL DEFAULT 'checkbox'
                          CHECK(habit_type IN ('checkbox','timer','count')),
            color         TEXT NOT NULL DEFAULT '#6366f1',
            target_count  INTEGER
        );

        CREATE TABLE IF NOT EXISTS group_habit_logs (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            habit_id   INTEGER NOT NULL REFERENCES group_habits(id) ON DELETE CASCADE,
            user_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            date       TEXT NOT NULL,
            completed  INTEGER DEFAULT 0,
            duration   INTEGER,
            count      INTEGER,
            UNIQUE(habit_id, user_id, date)
        );

        CREATE TABLE IF NOT EXISTS group_messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id    INTEGER NOT NULL REFERENCES habit_groups(id) ON DELETE CASCADE,
            user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            text        TEXT NOT NULL,
            created_at  TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS app_meta (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
    ")?;

    log::debug!("schema up to date");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 9);
    }
}
