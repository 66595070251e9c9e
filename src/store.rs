//! Durable key/value state scoped to one local profile: the active session
//! id and the once-per-day briefing marker.

use anyhow::Result;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

const SESSION_ID_KEY: &str = "assistant_session_id";
const BRIEFING_MARKER_KEY: &str = "last_briefing_date";

pub struct AssistantStore {
    conn: Mutex<Connection>,
}

impl AssistantStore {
    /// Create or open the store.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Store lock poisoned: {}", e))
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            r#"CREATE TABLE IF NOT EXISTS assistant_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )"#,
            [],
        )?;
        Ok(())
    }

    fn get_state(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT value FROM assistant_state WHERE key = ?1")?;
        let mut rows = stmt.query_map([key], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(value) => Ok(Some(value?)),
            None => Ok(None),
        }
    }

    fn set_state(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO assistant_state (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn clear_state(&self, key: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute("DELETE FROM assistant_state WHERE key = ?1", [key])?;
        Ok(())
    }

    /// The persisted session id, if any. No validation is performed here; a
    /// stale id is tolerated by downstream fetch failures.
    pub fn session_id(&self) -> Result<Option<String>> {
        self.get_state(SESSION_ID_KEY)
    }

    pub fn set_session_id(&self, session_id: &str) -> Result<()> {
        self.set_state(SESSION_ID_KEY, session_id)
    }

    pub fn clear_session_id(&self) -> Result<()> {
        self.clear_state(SESSION_ID_KEY)
    }

    /// Local calendar date of the last automated briefing, as an opaque
    /// string compared for equality, never parsed.
    pub fn briefing_marker(&self) -> Result<Option<String>> {
        self.get_state(BRIEFING_MARKER_KEY)
    }

    pub fn set_briefing_marker(&self, date_key: &str) -> Result<()> {
        self.set_state(BRIEFING_MARKER_KEY, date_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store(dir: &TempDir) -> AssistantStore {
        AssistantStore::new(dir.path().join("assistant.db")).expect("store init")
    }

    #[test]
    fn session_id_roundtrip_and_clear() {
        let dir = TempDir::new().expect("tempdir");
        let store = temp_store(&dir);

        assert_eq!(store.session_id().expect("get"), None);

        store.set_session_id("abc-123").expect("set");
        assert_eq!(store.session_id().expect("get").as_deref(), Some("abc-123"));

        store.set_session_id("def-456").expect("overwrite");
        assert_eq!(store.session_id().expect("get").as_deref(), Some("def-456"));

        store.clear_session_id().expect("clear");
        assert_eq!(store.session_id().expect("get"), None);
    }

    #[test]
    fn briefing_marker_persists_across_reopen() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("assistant.db");

        {
            let store = AssistantStore::new(&path).expect("store init");
            store.set_briefing_marker("2026-08-29").expect("set marker");
        }

        let reopened = AssistantStore::new(&path).expect("reopen");
        assert_eq!(
            reopened.briefing_marker().expect("get").as_deref(),
            Some("2026-08-29")
        );
        assert_eq!(reopened.session_id().expect("get"), None);
    }
}
