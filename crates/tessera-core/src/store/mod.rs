//! SQLite-backed catalog store.
//!
//! The store is the single serialization point of the catalog. One writer
//! connection sits behind a mutex; file-backed catalogs additionally keep a
//! small pool of read-only connections so searches and similarity ranking do
//! not queue behind ingestion. The `UNIQUE` constraint on `entries.digest`
//! is the authoritative guard against duplicate content.
//!
//! Counters and tag counts are maintained here, explicitly, by the operation
//! that changes them. There are no triggers.

pub mod row;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Transaction};

use crate::error::{StoreError, StoreResult};
use crate::flags::{BoardSet, PuritySet};
use crate::search::QueryPlan;
use crate::similarity;
use crate::types::{CatalogEntry, Digest, EntryId, Features, NewEntry, ScoredEntry};

pub use row::{FeatureLayout, ENTRY_COLUMNS, ENTRY_COLUMN_COUNT};
use row::{encode_palette, EntryRow};

/// Idle read-only connections kept per file-backed store.
const MAX_IDLE_READERS: usize = 8;

/// The catalog database.
pub struct CatalogStore {
    writer: Mutex<Connection>,
    readers: Option<ReaderPool>,
    layout: FeatureLayout,
    generation: AtomicU64,
}

struct ReaderPool {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
}

impl ReaderPool {
    fn checkout(&self) -> StoreResult<Connection> {
        let pooled = self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop();
        match pooled {
            Some(conn) => Ok(conn),
            None => {
                let conn = Connection::open_with_flags(
                    &self.path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )?;
                schema::configure(&conn)?;
                similarity::register_sql_function(&conn)?;
                Ok(conn)
            }
        }
    }

    fn checkin(&self, conn: Connection) {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < MAX_IDLE_READERS {
            idle.push(conn);
        }
    }
}

impl CatalogStore {
    /// Open or create a catalog database at `path` in WAL mode.
    pub fn open(path: &Path, layout: FeatureLayout) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        schema::initialize(&conn)?;
        similarity::register_sql_function(&conn)?;

        tracing::debug!("Catalog opened at {:?}", path);

        Ok(Self {
            writer: Mutex::new(conn),
            readers: Some(ReaderPool {
                path: path.to_path_buf(),
                idle: Mutex::new(Vec::new()),
            }),
            layout,
            generation: AtomicU64::new(0),
        })
    }

    /// Open a private in-memory catalog. Reads share the writer connection.
    pub fn open_in_memory(layout: FeatureLayout) -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        similarity::register_sql_function(&conn)?;
        Ok(Self {
            writer: Mutex::new(conn),
            readers: None,
            layout,
            generation: AtomicU64::new(0),
        })
    }

    pub fn layout(&self) -> FeatureLayout {
        self.layout
    }

    /// Monotonic counter bumped by every change that can alter similarity
    /// results: inserts, deletes and feature updates.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    fn writer(&self) -> MutexGuard<'_, Connection> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_reader<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        match &self.readers {
            Some(pool) => {
                let conn = pool.checkout()?;
                let result = f(&conn);
                pool.checkin(conn);
                result
            }
            None => {
                let conn = self.writer();
                f(&*conn)
            }
        }
    }

    // ── Entries ──────────────────────────────────────────────────────

    /// Insert a new entry. A digest already present fails with
    /// [`StoreError::UniqueViolation`] and leaves the store unchanged.
    pub fn insert(&self, entry: &NewEntry) -> StoreResult<EntryId> {
        let now = Utc::now().timestamp();
        let ratio = f64::from(entry.width) / f64::from(entry.height);
        let conn = self.writer();
        let result = conn.execute(
            "INSERT INTO entries (digest, width, height, ratio, mimetype, file_size, board, purity,
                                  average_color, palette, luminance, featured, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
            params![
                entry.digest.as_str(),
                entry.width,
                entry.height,
                ratio,
                entry.mimetype,
                entry.file_size as i64,
                entry.boards.bits(),
                entry.purity.bits(),
                entry.features.average_color.0.to_vec(),
                encode_palette(&entry.features.palette),
                entry.features.luminance,
                entry.featured,
                now,
            ],
        );
        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::UniqueViolation {
                    digest: entry.digest.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        }
        let id = EntryId(conn.last_insert_rowid());
        drop(conn);

        self.bump_generation();
        tracing::trace!("Inserted entry {} ({})", id, entry.digest);
        Ok(id)
    }

    /// Look up the entry holding `digest`, returning its id and mimetype.
    pub fn find_by_digest(&self, digest: &Digest) -> StoreResult<Option<(EntryId, String)>> {
        self.with_reader(|conn| {
            let found = conn
                .query_row(
                    "SELECT id, mimetype FROM entries WHERE digest = ?1",
                    [digest.as_str()],
                    |row| Ok((EntryId(row.get(0)?), row.get(1)?)),
                )
                .optional()?;
            Ok(found)
        })
    }

    /// Fetch one entry with its tags.
    pub fn get(&self, id: EntryId) -> StoreResult<CatalogEntry> {
        self.with_reader(|conn| load_entry(conn, id, self.layout))
    }

    /// Ids and mimetypes of every entry, oldest first.
    pub fn entry_files(&self) -> StoreResult<Vec<(EntryId, String)>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare("SELECT id, mimetype FROM entries ORDER BY id")?;
            let rows = stmt
                .query_map([], |row| Ok((EntryId(row.get(0)?), row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Entries whose stored palette or grid length differs from this
    /// store's layout, e.g. after `features.grid_size` changed. Such rows
    /// fail to map until their features are recomputed.
    pub fn count_layout_mismatches(&self) -> StoreResult<u64> {
        self.with_reader(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM entries WHERE length(palette) != ?1 OR length(luminance) != ?2",
                params![
                    (self.layout.palette_size * 3) as i64,
                    self.layout.grid_len as i64
                ],
                |row| row.get(0),
            )?;
            Ok(n.max(0) as u64)
        })
    }

    pub fn count(&self) -> StoreResult<u64> {
        self.with_reader(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
            Ok(n.max(0) as u64)
        })
    }

    /// Remove an entry, its tag links, favorites and text row in one
    /// transaction. Returns the entry as it was so the caller can remove its
    /// files after the commit.
    pub fn delete(&self, id: EntryId) -> StoreResult<CatalogEntry> {
        let mut conn = self.writer();
        let tx = conn.transaction()?;
        let entry = load_entry(&tx, id, self.layout)?;

        tx.execute(
            "UPDATE tags SET entry_count = MAX(entry_count - 1, 0)
             WHERE id IN (SELECT tag_id FROM entry_tags WHERE entry_id = ?1)",
            [id.0],
        )?;
        tx.execute("DELETE FROM entry_text WHERE rowid = ?1", [id.0])?;
        tx.execute("DELETE FROM entries WHERE id = ?1", [id.0])?;
        tx.commit()?;
        drop(conn);

        self.bump_generation();
        Ok(entry)
    }

    /// Replace the stored perceptual features of an entry.
    pub fn update_features(&self, id: EntryId, features: &Features) -> StoreResult<()> {
        let changed = self.writer().execute(
            "UPDATE entries SET average_color = ?1, palette = ?2, luminance = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                features.average_color.0.to_vec(),
                encode_palette(&features.palette),
                features.luminance,
                Utc::now().timestamp(),
                id.0,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        self.bump_generation();
        Ok(())
    }

    // ── Classification ───────────────────────────────────────────────

    pub fn set_boards(&self, id: EntryId, boards: BoardSet) -> StoreResult<()> {
        if boards.is_empty() {
            return Err(StoreError::InvalidValue("board set must not be empty".into()));
        }
        self.update_column(id, "board", i64::from(boards.bits()))
    }

    pub fn set_purity(&self, id: EntryId, purity: PuritySet) -> StoreResult<()> {
        if purity.is_empty() {
            return Err(StoreError::InvalidValue("purity set must not be empty".into()));
        }
        self.update_column(id, "purity", i64::from(purity.bits()))
    }

    pub fn set_featured(&self, id: EntryId, featured: bool) -> StoreResult<()> {
        self.update_column(id, "featured", i64::from(featured))
    }

    fn update_column(&self, id: EntryId, column: &'static str, value: i64) -> StoreResult<()> {
        let sql = format!("UPDATE entries SET {column} = ?1, updated_at = ?2 WHERE id = ?3");
        let changed = self
            .writer()
            .execute(&sql, params![value, Utc::now().timestamp(), id.0])?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    // ── Counters ─────────────────────────────────────────────────────

    pub fn record_view(&self, id: EntryId) -> StoreResult<u64> {
        let views: Option<i64> = self
            .writer()
            .query_row(
                "UPDATE entries SET views = views + 1 WHERE id = ?1 RETURNING views",
                [id.0],
                |row| row.get(0),
            )
            .optional()?;
        views
            .map(|v| v.max(0) as u64)
            .ok_or(StoreError::NotFound(id))
    }

    /// Record that `user` favorited the entry. Returns `false` if they
    /// already had.
    pub fn add_favorite(&self, id: EntryId, user: &str) -> StoreResult<bool> {
        let mut conn = self.writer();
        let tx = conn.transaction()?;
        ensure_exists(&tx, id)?;
        let added = tx.execute(
            "INSERT OR IGNORE INTO favorites (entry_id, user, created_at) VALUES (?1, ?2, ?3)",
            params![id.0, user, Utc::now().timestamp()],
        )? > 0;
        if added {
            tx.execute(
                "UPDATE entries SET favorites = favorites + 1 WHERE id = ?1",
                [id.0],
            )?;
        }
        tx.commit()?;
        Ok(added)
    }

    /// Withdraw a favorite. Returns `false` if `user` had not favorited it.
    pub fn remove_favorite(&self, id: EntryId, user: &str) -> StoreResult<bool> {
        let mut conn = self.writer();
        let tx = conn.transaction()?;
        ensure_exists(&tx, id)?;
        let removed = tx.execute(
            "DELETE FROM favorites WHERE entry_id = ?1 AND user = ?2",
            params![id.0, user],
        )? > 0;
        if removed {
            tx.execute(
                "UPDATE entries SET favorites = MAX(favorites - 1, 0) WHERE id = ?1",
                [id.0],
            )?;
        }
        tx.commit()?;
        Ok(removed)
    }

    // ── Tags ─────────────────────────────────────────────────────────

    /// Attach tags to an entry, creating unknown names. Names are
    /// normalized first; ones already attached are skipped. Returns the
    /// entry's full tag list afterwards.
    pub fn attach_tags(&self, id: EntryId, names: &[String]) -> StoreResult<Vec<String>> {
        let names = normalize_tags(names);
        let mut conn = self.writer();
        let tx = conn.transaction()?;
        ensure_exists(&tx, id)?;

        let mut attached = 0;
        for name in &names {
            tx.execute(
                "INSERT INTO tags (name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
                [name],
            )?;
            let tag_id: i64 = tx.query_row("SELECT id FROM tags WHERE name = ?1", [name], |row| {
                row.get(0)
            })?;
            let linked = tx.execute(
                "INSERT OR IGNORE INTO entry_tags (entry_id, tag_id) VALUES (?1, ?2)",
                [id.0, tag_id],
            )?;
            if linked > 0 {
                tx.execute(
                    "UPDATE tags SET entry_count = entry_count + 1 WHERE id = ?1",
                    [tag_id],
                )?;
                attached += 1;
            }
        }

        if attached > 0 {
            touch(&tx, id)?;
        }
        let tags = rebuild_text(&tx, id)?;
        tx.commit()?;
        Ok(tags)
    }

    /// Detach one tag. Returns `false` if it was not attached.
    pub fn detach_tag(&self, id: EntryId, name: &str) -> StoreResult<bool> {
        let Some(name) = normalize_tag(name) else {
            return Ok(false);
        };
        let mut conn = self.writer();
        let tx = conn.transaction()?;
        ensure_exists(&tx, id)?;

        let tag_id: Option<i64> = tx
            .query_row("SELECT id FROM tags WHERE name = ?1", [&name], |row| row.get(0))
            .optional()?;
        let Some(tag_id) = tag_id else {
            return Ok(false);
        };
        let unlinked = tx.execute(
            "DELETE FROM entry_tags WHERE entry_id = ?1 AND tag_id = ?2",
            [id.0, tag_id],
        )? > 0;
        if unlinked {
            tx.execute(
                "UPDATE tags SET entry_count = MAX(entry_count - 1, 0) WHERE id = ?1",
                [tag_id],
            )?;
            touch(&tx, id)?;
            rebuild_text(&tx, id)?;
        }
        tx.commit()?;
        Ok(unlinked)
    }

    /// Every tag with its maintained entry count, by name.
    pub fn tag_counts(&self) -> StoreResult<Vec<(String, u64)>> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare("SELECT name, entry_count FROM tags ORDER BY name")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?.max(0) as u64))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Run a planned search. The count and the page come from the same
    /// predicate inside one read transaction.
    pub fn execute_search(&self, plan: &QueryPlan) -> StoreResult<(Vec<CatalogEntry>, u64)> {
        self.with_reader(|conn| {
            let tx = conn.unchecked_transaction()?;

            let total: i64 = tx.query_row(
                &plan.count_sql(),
                params_from_iter(plan.count_params()),
                |row| row.get(0),
            )?;

            let rows = tx
                .prepare(&plan.page_sql())?
                .query_map(params_from_iter(plan.page_params()), EntryRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            let entries = rows
                .into_iter()
                .map(|row| {
                    let tags = load_tags(&tx, row.id)?;
                    row.into_entry(tags, self.layout)
                })
                .collect::<StoreResult<Vec<_>>>()?;

            tx.finish()?;
            Ok((entries, total.max(0) as u64))
        })
    }

    /// Rank every other entry by luminance similarity to `id`, highest
    /// first, ties broken by ascending id.
    ///
    /// Returns the requested window and the number of comparable entries.
    pub fn similar(&self, id: EntryId, limit: u32, offset: u64) -> StoreResult<(Vec<ScoredEntry>, u64)> {
        self.with_reader(|conn| {
            let tx = conn.unchecked_transaction()?;

            let reference: Vec<u8> = tx
                .query_row("SELECT luminance FROM entries WHERE id = ?1", [id.0], |row| {
                    row.get(0)
                })
                .optional()?
                .ok_or(StoreError::NotFound(id))?;

            let predicate = format!(
                "FROM entries e
                 WHERE e.id != ?2 AND {f}(e.luminance, ?1) IS NOT NULL",
                f = similarity::SQL_FUNCTION
            );

            let total: i64 = tx.query_row(
                &format!("SELECT COUNT(*) {predicate}"),
                params![reference, id.0],
                |row| row.get(0),
            )?;

            let sql = format!(
                "SELECT {ENTRY_COLUMNS}, {f}(e.luminance, ?1) AS score
                 {predicate}
                 ORDER BY score DESC, e.id ASC
                 LIMIT ?3 OFFSET ?4",
                f = similarity::SQL_FUNCTION
            );
            let rows = {
                let mut stmt = tx.prepare(&sql)?;
                let rows = stmt
                    .query_map(
                        params![reference, id.0, i64::from(limit), offset as i64],
                        |row| Ok((EntryRow::from_row(row)?, row.get::<_, f64>(ENTRY_COLUMN_COUNT)?)),
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            };
            let scored = rows
                .into_iter()
                .map(|(row, score)| {
                    let tags = load_tags(&tx, row.id)?;
                    Ok(ScoredEntry {
                        entry: row.into_entry(tags, self.layout)?,
                        score,
                    })
                })
                .collect::<StoreResult<Vec<_>>>()?;

            tx.finish()?;
            Ok((scored, total.max(0) as u64))
        })
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn ensure_exists(tx: &Transaction<'_>, id: EntryId) -> StoreResult<()> {
    let found: Option<i64> = tx
        .query_row("SELECT 1 FROM entries WHERE id = ?1", [id.0], |row| row.get(0))
        .optional()?;
    found.map(|_| ()).ok_or(StoreError::NotFound(id))
}

fn touch(tx: &Transaction<'_>, id: EntryId) -> StoreResult<()> {
    tx.execute(
        "UPDATE entries SET updated_at = ?1 WHERE id = ?2",
        params![Utc::now().timestamp(), id.0],
    )?;
    Ok(())
}

fn load_entry(conn: &Connection, id: EntryId, layout: FeatureLayout) -> StoreResult<CatalogEntry> {
    let row = conn
        .query_row(
            &format!("SELECT {ENTRY_COLUMNS} FROM entries e WHERE e.id = ?1"),
            [id.0],
            EntryRow::from_row,
        )
        .optional()?
        .ok_or(StoreError::NotFound(id))?;
    let tags = load_tags(conn, id.0)?;
    row.into_entry(tags, layout)
}

fn load_tags(conn: &Connection, entry_id: i64) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT t.name FROM entry_tags et JOIN tags t ON t.id = et.tag_id
         WHERE et.entry_id = ?1 ORDER BY t.name",
    )?;
    let tags = stmt
        .query_map([entry_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(tags)
}

/// Rebuild the full-text row of an entry from its current tag names.
fn rebuild_text(tx: &Transaction<'_>, id: EntryId) -> StoreResult<Vec<String>> {
    let tags = load_tags(tx, id.0)?;
    tx.execute("DELETE FROM entry_text WHERE rowid = ?1", [id.0])?;
    if !tags.is_empty() {
        tx.execute(
            "INSERT INTO entry_text (rowid, tags) VALUES (?1, ?2)",
            params![id.0, tags.join(" ")],
        )?;
    }
    Ok(tags)
}

/// Trim, lowercase and collapse internal whitespace. Blank names yield `None`.
pub fn normalize_tag(name: &str) -> Option<String> {
    let normalized = name
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ");
    (!normalized.is_empty()).then_some(normalized)
}

/// Normalize a list of tag names, dropping blanks and duplicates while
/// keeping first-seen order.
pub fn normalize_tags(names: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names.iter().filter_map(|n| normalize_tag(n)) {
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{Board, Purity};
    use crate::pipeline::hash::Hasher;
    use crate::types::Rgb;

    const LAYOUT: FeatureLayout = FeatureLayout {
        palette_size: 2,
        grid_len: 4,
    };

    fn new_entry(seed: &str, luminance: u8) -> NewEntry {
        NewEntry {
            digest: Hasher::digest_bytes(seed.as_bytes()),
            width: 800,
            height: 600,
            mimetype: "image/png".into(),
            file_size: 100,
            boards: BoardSet::only(Board::General),
            purity: PuritySet::only(Purity::Sfw),
            features: Features {
                average_color: Rgb::new(luminance, luminance, luminance),
                palette: vec![Rgb::new(luminance, luminance, luminance); 2],
                luminance: vec![luminance; 4],
            },
            featured: false,
        }
    }

    fn store() -> CatalogStore {
        CatalogStore::open_in_memory(LAYOUT).unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let store = store();
        let id = store.insert(&new_entry("a", 10)).unwrap();
        let entry = store.get(id).unwrap();
        assert_eq!(entry.id, id);
        assert_eq!(entry.width, 800);
        assert_eq!(entry.features.luminance, vec![10; 4]);
        assert_eq!(entry.counters.views, 0);
        assert!(entry.tags.is_empty());
    }

    #[test]
    fn test_duplicate_digest_is_unique_violation() {
        let store = store();
        store.insert(&new_entry("a", 10)).unwrap();
        let err = store.insert(&new_entry("a", 20)).unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation { .. }));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_find_by_digest() {
        let store = store();
        let entry = new_entry("a", 10);
        let id = store.insert(&entry).unwrap();
        let (found, mimetype) = store.find_by_digest(&entry.digest).unwrap().unwrap();
        assert_eq!(found, id);
        assert_eq!(mimetype, "image/png");
        assert!(store
            .find_by_digest(&Hasher::digest_bytes(b"other"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let err = store().get(EntryId(99)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(EntryId(99))));
    }

    #[test]
    fn test_generation_moves_on_insert_and_delete() {
        let store = store();
        let g0 = store.generation();
        let id = store.insert(&new_entry("a", 10)).unwrap();
        let g1 = store.generation();
        assert!(g1 > g0);
        store.record_view(id).unwrap();
        assert_eq!(store.generation(), g1);
        store.delete(id).unwrap();
        assert!(store.generation() > g1);
    }

    #[test]
    fn test_tags_are_normalized_and_counted() {
        let store = store();
        let a = store.insert(&new_entry("a", 10)).unwrap();
        let b = store.insert(&new_entry("b", 20)).unwrap();

        let tags = store
            .attach_tags(a, &["  Blue   Sky ".into(), "blue sky".into(), "sea".into()])
            .unwrap();
        assert_eq!(tags, vec!["blue sky".to_string(), "sea".to_string()]);
        store.attach_tags(b, &["sea".into()]).unwrap();
        // Re-attaching is a no-op for the count.
        store.attach_tags(b, &["SEA".into()]).unwrap();

        let counts = store.tag_counts().unwrap();
        assert_eq!(
            counts,
            vec![("blue sky".to_string(), 1), ("sea".to_string(), 2)]
        );

        assert!(store.detach_tag(b, "sea").unwrap());
        assert!(!store.detach_tag(b, "sea").unwrap());
        store.delete(a).unwrap();
        let counts = store.tag_counts().unwrap();
        assert_eq!(
            counts,
            vec![("blue sky".to_string(), 0), ("sea".to_string(), 0)]
        );
    }

    #[test]
    fn test_text_row_tracks_tags() {
        let store = store();
        let id = store.insert(&new_entry("a", 10)).unwrap();
        store.attach_tags(id, &["sunset".into()]).unwrap();

        let hits = |term: &str| -> i64 {
            store
                .writer()
                .query_row(
                    "SELECT COUNT(*) FROM entry_text WHERE entry_text MATCH ?1",
                    [term],
                    |row| row.get(0),
                )
                .unwrap()
        };
        assert_eq!(hits("sunset"), 1);
        store.detach_tag(id, "sunset").unwrap();
        assert_eq!(hits("sunset"), 0);
    }

    #[test]
    fn test_favorites_ledger_and_counter() {
        let store = store();
        let id = store.insert(&new_entry("a", 10)).unwrap();

        assert!(store.add_favorite(id, "ana").unwrap());
        assert!(!store.add_favorite(id, "ana").unwrap());
        assert!(store.add_favorite(id, "bo").unwrap());
        assert_eq!(store.get(id).unwrap().counters.favorites, 2);

        assert!(store.remove_favorite(id, "ana").unwrap());
        assert!(!store.remove_favorite(id, "ana").unwrap());
        assert_eq!(store.get(id).unwrap().counters.favorites, 1);

        assert!(matches!(
            store.add_favorite(EntryId(42), "ana"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_record_view() {
        let store = store();
        let id = store.insert(&new_entry("a", 10)).unwrap();
        assert_eq!(store.record_view(id).unwrap(), 1);
        assert_eq!(store.record_view(id).unwrap(), 2);
        assert!(matches!(
            store.record_view(EntryId(7)),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_classification_updates() {
        let store = store();
        let id = store.insert(&new_entry("a", 10)).unwrap();

        let boards: BoardSet = [Board::General, Board::Anime].into_iter().collect();
        store.set_boards(id, boards).unwrap();
        store.set_purity(id, PuritySet::only(Purity::Sketchy)).unwrap();
        store.set_featured(id, true).unwrap();

        let entry = store.get(id).unwrap();
        assert_eq!(entry.boards, boards);
        assert_eq!(entry.purity, PuritySet::only(Purity::Sketchy));
        assert!(entry.featured);

        assert!(matches!(
            store.set_boards(id, BoardSet::empty()),
            Err(StoreError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_delete_returns_entry_and_removes_row() {
        let store = store();
        let id = store.insert(&new_entry("a", 10)).unwrap();
        store.add_favorite(id, "ana").unwrap();
        let deleted = store.delete(id).unwrap();
        assert_eq!(deleted.id, id);
        assert!(matches!(store.get(id), Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete(id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_similar_excludes_reference_and_ranks() {
        let store = store();
        let a = store.insert(&new_entry("a", 10)).unwrap();
        let b = store.insert(&new_entry("b", 250)).unwrap();
        let c = store.insert(&new_entry("c", 12)).unwrap();
        let d = store.insert(&new_entry("d", 12)).unwrap();

        let (page, total) = store.similar(a, 10, 0).unwrap();
        assert_eq!(total, 3);
        let ids: Vec<_> = page.iter().map(|s| s.entry.id).collect();
        // c and d tie; ascending id breaks it.
        assert_eq!(ids, vec![c, d, b]);
        assert!(page.iter().all(|s| s.entry.id != a));
        assert!((page[2].score - (100.0 - 100.0 * 240.0 / 255.0)).abs() < 1e-9);

        let (window, total) = store.similar(a, 1, 1).unwrap();
        assert_eq!(total, 3);
        assert_eq!(window[0].entry.id, d);
    }

    #[test]
    fn test_similar_missing_reference() {
        assert!(matches!(
            store().similar(EntryId(5), 10, 0),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_features() {
        let store = store();
        let id = store.insert(&new_entry("a", 10)).unwrap();
        let features = new_entry("x", 99).features;
        store.update_features(id, &features).unwrap();
        assert_eq!(store.get(id).unwrap().features, features);
    }

    #[test]
    fn test_file_store_reads_through_pool() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::open(&dir.path().join("catalog.db"), LAYOUT).unwrap();
        let a = store.insert(&new_entry("a", 10)).unwrap();
        store.insert(&new_entry("b", 20)).unwrap();
        assert_eq!(store.get(a).unwrap().id, a);
        let (page, total) = store.similar(a, 5, 0).unwrap();
        assert_eq!((page.len(), total), (1, 1));
    }

    #[test]
    fn test_layout_mismatch_is_counted_and_cleared_by_update() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        let id = {
            let store = CatalogStore::open(&path, LAYOUT).unwrap();
            let id = store.insert(&new_entry("a", 10)).unwrap();
            assert_eq!(store.count_layout_mismatches().unwrap(), 0);
            id
        };

        let wider = FeatureLayout {
            palette_size: 2,
            grid_len: 9,
        };
        let store = CatalogStore::open(&path, wider).unwrap();
        assert_eq!(store.count_layout_mismatches().unwrap(), 1);
        assert!(matches!(store.get(id), Err(StoreError::CorruptRow { .. })));

        let mut features = new_entry("a", 10).features;
        features.luminance = vec![10; 9];
        store.update_features(id, &features).unwrap();
        assert_eq!(store.count_layout_mismatches().unwrap(), 0);
        assert_eq!(store.get(id).unwrap().features.luminance.len(), 9);
    }

    #[test]
    fn test_normalize_tags() {
        assert_eq!(normalize_tag("  Hello\tWorld "), Some("hello world".into()));
        assert_eq!(normalize_tag("   "), None);
        assert_eq!(
            normalize_tags(&["A".into(), "a".into(), " ".into(), "b".into()]),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
