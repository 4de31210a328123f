use crate::api::{FilterVocabulary, SearchResult};
use rusqlite::{Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::Mutex;

/// Client-side state that outlives a single invocation: the cached filter
/// vocabulary, the current result set, the folder-browser path and the
/// one-time migration flag.
pub struct LocalState {
    conn: Mutex<Connection>,
}

/// The current result set and whether the server allowed merging it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResults {
    pub results: Vec<SearchResult>,
    /// `None` for single search; the server's `can_merge` for bulk search.
    pub mergeable: Option<bool>,
}

const KEY_VOCABULARY: &str = "vocabulary";
const KEY_BROWSER_PATH: &str = "browser_path";
const KEY_BACKFILL_DONE: &str = "hash_backfill_done";
const KEY_RESULTS_MERGEABLE: &str = "results_mergeable";

impl LocalState {
    pub fn open() -> anyhow::Result<Self> {
        let db_path = Self::db_path()?;
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&db_path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn db_path() -> anyhow::Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("com", "docsearch", "docsearch")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(dirs.data_local_dir().join("state.db"))
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("db lock: {}", e))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS results (
                position INTEGER PRIMARY KEY,
                filename TEXT NOT NULL,
                body TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS client_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("db lock: {}", e))?;
        let value = conn
            .query_row(
                "SELECT value FROM client_state WHERE key = ?",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let now = chrono::Utc::now().timestamp();
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("db lock: {}", e))?;
        conn.execute(
            "INSERT OR REPLACE INTO client_state (key, value, updated_at) VALUES (?, ?, ?)",
            (key, value, now),
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("db lock: {}", e))?;
        conn.execute("DELETE FROM client_state WHERE key = ?", [key])?;
        Ok(())
    }

    pub fn vocabulary(&self) -> anyhow::Result<Option<FilterVocabulary>> {
        match self.get(KEY_VOCABULARY)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn store_vocabulary(&self, vocabulary: &FilterVocabulary) -> anyhow::Result<()> {
        self.set(KEY_VOCABULARY, &serde_json::to_string(vocabulary)?)
    }

    /// Replace the stored result set wholesale.
    pub fn store_results(&self, results: &[SearchResult], mergeable: Option<bool>) -> anyhow::Result<()> {
        {
            let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("db lock: {}", e))?;
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM results", [])?;
            for (position, result) in results.iter().enumerate() {
                tx.execute(
                    "INSERT INTO results (position, filename, body) VALUES (?, ?, ?)",
                    (position as i64, &result.filename, serde_json::to_string(result)?),
                )?;
            }
            tx.commit()?;
        }
        match mergeable {
            Some(flag) => self.set(KEY_RESULTS_MERGEABLE, if flag { "1" } else { "0" }),
            None => self.remove(KEY_RESULTS_MERGEABLE),
        }
    }

    pub fn results(&self) -> anyhow::Result<StoredResults> {
        let results = {
            let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("db lock: {}", e))?;
            let mut stmt = conn.prepare("SELECT body FROM results ORDER BY position")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut results: Vec<SearchResult> = Vec::new();
            for row in rows {
                results.push(serde_json::from_str(&row?)?);
            }
            results
        };
        let mergeable = self.get(KEY_RESULTS_MERGEABLE)?.map(|v| v == "1");
        Ok(StoredResults { results, mergeable })
    }

    pub fn browser_path(&self) -> anyhow::Result<String> {
        Ok(self.get(KEY_BROWSER_PATH)?.unwrap_or_default())
    }

    pub fn set_browser_path(&self, path: &str) -> anyhow::Result<()> {
        self.set(KEY_BROWSER_PATH, path)
    }

    pub fn backfill_done(&self) -> anyhow::Result<bool> {
        Ok(self.get(KEY_BACKFILL_DONE)?.is_some())
    }

    pub fn mark_backfill_done(&self) -> anyhow::Result<()> {
        self.set(KEY_BACKFILL_DONE, &chrono::Utc::now().to_rfc3339())
    }

    /// Forget everything tied to the session. The migration flag is a
    /// property of the deployment and survives.
    pub fn clear_session_state(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("db lock: {}", e))?;
        conn.execute_batch(&format!(
            "DELETE FROM results;
             DELETE FROM client_state WHERE key IN ('{}', '{}', '{}');",
            KEY_VOCABULARY, KEY_BROWSER_PATH, KEY_RESULTS_MERGEABLE
        ))?;
        Ok(())
    }

    /// Open an in-memory database (for testing).
    #[cfg(test)]
    pub fn open_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }
}
