use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::conditions::FilterConditions;
use crate::repository::{NoteRepository, RepositoryError};
use crate::types::Note;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS notes (
        id           TEXT PRIMARY KEY,
        title        TEXT NOT NULL DEFAULT '',
        body         TEXT NOT NULL DEFAULT '',
        archived     INTEGER NOT NULL DEFAULT 0,
        trashed      INTEGER NOT NULL DEFAULT 0,
        updated_time INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS tags (
        id   INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS note_tags (
        note_id TEXT NOT NULL REFERENCES notes(id),
        tag_id  INTEGER NOT NULL REFERENCES tags(id),
        PRIMARY KEY (note_id, tag_id)
    );
    CREATE INDEX IF NOT EXISTS idx_notes_updated ON notes(updated_time DESC);";

/// Default location of the notes database: `<data dir>/note-finder/notes.sqlite`.
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("note-finder")
        .join("notes.sqlite")
}

/// Open (creating if needed) the notes database and make sure the schema exists.
pub fn open_notes_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open notes database at {}", path.display()))?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;",
    )?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Escape `%`, `_` and the escape char itself so the query is matched literally.
fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Case-insensitive substring match over title and body (and tag names when
/// `include_tags` is set). Archived and trashed notes are skipped unless the
/// matching toggle is on. Newest first.
pub fn search_notes(
    conn: &Connection,
    text: &str,
    conditions: FilterConditions,
) -> rusqlite::Result<Vec<Note>> {
    let mut stmt = conn.prepare_cached(
        "SELECT n.id, n.title, n.body, n.archived, n.trashed, n.updated_time
         FROM notes n
         WHERE (?2 OR n.trashed = 0)
           AND (?3 OR n.archived = 0)
           AND (n.title LIKE ?1 ESCAPE '\\'
                OR n.body LIKE ?1 ESCAPE '\\'
                OR (?4 AND EXISTS (
                    SELECT 1 FROM note_tags nt
                    JOIN tags t ON t.id = nt.tag_id
                    WHERE nt.note_id = n.id AND t.name LIKE ?1 ESCAPE '\\')))
         ORDER BY n.updated_time DESC",
    )?;

    let mut notes = stmt
        .query_map(
            params![
                like_pattern(text),
                conditions.include_trashed,
                conditions.include_archived,
                conditions.include_tags,
            ],
            note_from_row,
        )?
        .collect::<rusqlite::Result<Vec<Note>>>()?;

    for note in &mut notes {
        note.tags = tags_for_note(conn, &note.id)?;
    }
    Ok(notes)
}

fn note_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Note> {
    Ok(Note {
        id: row.get(0)?,
        title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        body: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        tags: Vec::new(),
        archived: row.get(3)?,
        trashed: row.get(4)?,
        updated_time: row.get(5)?,
    })
}

fn tags_for_note(conn: &Connection, id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT t.name FROM tags t
         JOIN note_tags nt ON nt.tag_id = t.id
         WHERE nt.note_id = ?1
         ORDER BY t.name",
    )?;
    let tags = stmt
        .query_map([id], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(tags)
}

/// Fetch a single note by ID. Returns None if not found.
pub fn get_note_by_id(conn: &Connection, id: &str) -> Result<Option<Note>> {
    let note = conn
        .query_row(
            "SELECT id, title, body, archived, trashed, updated_time FROM notes WHERE id = ?1",
            [id],
            note_from_row,
        )
        .optional()?;
    match note {
        Some(mut note) => {
            note.tags = tags_for_note(conn, id)?;
            Ok(Some(note))
        }
        None => Ok(None),
    }
}

/// Insert or replace a note together with its tags.
pub fn upsert_note(conn: &mut Connection, note: &Note) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT OR REPLACE INTO notes (id, title, body, archived, trashed, updated_time)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![note.id, note.title, note.body, note.archived, note.trashed, note.updated_time],
    )?;
    tx.execute("DELETE FROM note_tags WHERE note_id = ?1", [&note.id])?;
    for tag in &note.tags {
        tx.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", [tag])?;
        tx.execute(
            "INSERT OR IGNORE INTO note_tags (note_id, tag_id)
             SELECT ?1, id FROM tags WHERE name = ?2",
            params![note.id, tag],
        )?;
    }
    tx.commit()?;
    Ok(())
}

/// Replace a note's body. Returns false when no note has that ID.
pub fn update_note_body(conn: &Connection, id: &str, body: &str, updated_time: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE notes SET body = ?2, updated_time = ?3 WHERE id = ?1",
        params![id, body, updated_time],
    )?;
    Ok(changed > 0)
}

/// `NoteRepository` backed by a single SQLite connection.
/// Lookups run on the blocking pool so the session task never stalls on disk.
#[derive(Clone)]
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_connection(open_notes_db(path)?))
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self { conn: Arc::new(Mutex::new(conn)) }
    }

    /// Run `f` against the connection on the calling thread.
    pub fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("connection lock poisoned: {e}"))?;
        f(&mut *conn)
    }

    pub fn upsert(&self, note: &Note) -> Result<()> {
        self.with_conn(|conn| upsert_note(conn, note))
    }

    pub fn get(&self, id: &str) -> Result<Option<Note>> {
        self.with_conn(|conn| get_note_by_id(conn, id))
    }

    pub fn update_body(&self, id: &str, body: &str, updated_time: i64) -> Result<bool> {
        self.with_conn(|conn| update_note_body(conn, id, body, updated_time))
    }
}

impl NoteRepository for SqliteRepository {
    fn search(
        &self,
        text: &str,
        conditions: FilterConditions,
    ) -> impl Future<Output = Result<Vec<Note>, RepositoryError>> + Send {
        let repo = self.clone();
        let text = text.to_owned();
        async move {
            tokio::task::spawn_blocking(move || -> Result<Vec<Note>, RepositoryError> {
                let conn = repo
                    .conn
                    .lock()
                    .map_err(|e| anyhow::anyhow!("connection lock poisoned: {e}"))?;
                Ok(search_notes(&conn, &text, conditions)?)
            })
            .await?
        }
    }
}
