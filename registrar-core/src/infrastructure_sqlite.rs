//! SQLite-backed Repository implementation.
//! Keeps people, sections and rooms across restarts of the server.
//!
//! Enable with the `sqlite` feature flag:
//! ```toml
//! registrar-core = { path = "../registrar-core", features = ["sqlite"] }
//! ```

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

use crate::error::Result;
use crate::infrastructure::{Filter, Repository, matches_filter};
use crate::types::Entity;

/// A persistent repository backed by SQLite, one table per entity kind.
///
/// Records are stored as JSON documents. Uses WAL mode so several
/// repositories can share one database file.
pub struct SqliteRepository<T> {
    conn: Mutex<Connection>,
    table: String,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> SqliteRepository<T> {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// A private in-memory database, mostly useful in tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        // Enable WAL mode for better concurrent read performance
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let table = format!("{}_records", T::KIND);
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id         TEXT PRIMARY KEY,
                body       TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );"
        ))?;

        Ok(Self {
            conn: Mutex::new(conn),
            table,
            _entity: PhantomData,
        })
    }
}

impl<T> Repository<T> for SqliteRepository<T>
where
    T: Entity + Serialize + DeserializeOwned,
{
    fn save(&self, entity: &T) -> Result<()> {
        let body = serde_json::to_string(entity)?;
        self.conn.lock().execute(
            &format!(
                "INSERT INTO {} (id, body, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
                self.table
            ),
            params![entity.id(), body, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn find_by_id(&self, id: &str) -> Result<Option<T>> {
        let body: Option<String> = self
            .conn
            .lock()
            .query_row(
                &format!("SELECT body FROM {} WHERE id = ?1", self.table),
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    fn find_all(&self, filter: Option<&Filter>) -> Result<Vec<T>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT body FROM {} ORDER BY id", self.table))?;
        let bodies = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        let mut out = Vec::with_capacity(bodies.len());
        for body in bodies {
            let value: serde_json::Value = serde_json::from_str(&body)?;
            if matches_filter(&value, filter) {
                out.push(serde_json::from_value(value)?);
            }
        }
        Ok(out)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let rows = self.conn.lock().execute(
            &format!("DELETE FROM {} WHERE id = ?1", self.table),
            params![id],
        )?;
        Ok(rows > 0)
    }
}
