//! SQLite schema for the catalog.
//!
//! Tables:
//! - entries: one row per catalogued image; digest is UNIQUE and is the
//!   authoritative guard against concurrent duplicate inserts
//! - tags / entry_tags: tag vocabulary with explicitly maintained counts
//! - favorites: who favorited what and when (drives the recency fallback)
//! - entry_text: FTS5 index over each entry's tag names (rowid = entry id)

use std::time::Duration;

use rusqlite::Connection;

use crate::error::StoreResult;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Bumped when the schema changes shape.
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    digest TEXT NOT NULL UNIQUE,
    width INTEGER NOT NULL CHECK (width > 0),
    height INTEGER NOT NULL CHECK (height > 0),
    ratio REAL NOT NULL,
    mimetype TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    board INTEGER NOT NULL CHECK (board > 0),
    purity INTEGER NOT NULL CHECK (purity > 0),
    average_color BLOB NOT NULL,
    palette BLOB NOT NULL,
    luminance BLOB NOT NULL,
    views INTEGER NOT NULL DEFAULT 0,
    favorites INTEGER NOT NULL DEFAULT 0,
    featured INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    entry_count INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS entry_tags (
    entry_id INTEGER NOT NULL,
    tag_id INTEGER NOT NULL,
    PRIMARY KEY (entry_id, tag_id),
    FOREIGN KEY (entry_id) REFERENCES entries(id) ON DELETE CASCADE,
    FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS favorites (
    entry_id INTEGER NOT NULL,
    user TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (entry_id, user),
    FOREIGN KEY (entry_id) REFERENCES entries(id) ON DELETE CASCADE
);

CREATE VIRTUAL TABLE IF NOT EXISTS entry_text USING fts5(tags);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entries_created_at ON entries(created_at);
CREATE INDEX IF NOT EXISTS idx_entries_views ON entries(views);
CREATE INDEX IF NOT EXISTS idx_entries_favorites ON entries(favorites);
CREATE INDEX IF NOT EXISTS idx_entries_ratio ON entries(ratio);
CREATE INDEX IF NOT EXISTS idx_entry_tags_tag_id ON entry_tags(tag_id);
CREATE INDEX IF NOT EXISTS idx_favorites_created_at ON favorites(created_at);
";

/// Connection settings shared by writer and reader connections.
pub fn configure(conn: &Connection) -> StoreResult<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}

/// Create tables and indexes if missing.
pub fn initialize(conn: &Connection) -> StoreResult<()> {
    configure(conn)?;
    conn.execute_batch(SCHEMA)?;
    conn.execute(
        "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        initialize(&conn).unwrap();
        let version: String = conn
            .query_row("SELECT value FROM meta WHERE key = 'schema_version'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION.to_string());
    }

    #[test]
    fn test_fts5_available() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn.execute("INSERT INTO entry_text (rowid, tags) VALUES (1, 'sunset beach')", [])
            .unwrap();
        let hit: i64 = conn
            .query_row(
                "SELECT rowid FROM entry_text WHERE entry_text MATCH '\"beach\"'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(hit, 1);
    }
}
