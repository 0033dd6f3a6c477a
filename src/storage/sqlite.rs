use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};
use serde::Deserialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

use crate::error::StorageError;
use crate::models::{DiscoveryMethod, HistoryEntry, SaveStatus, SavedPageEntry, Title};
use crate::storage::DataStore;

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

/// Shape of a legacy export accepted by `import_from_json`.
#[derive(Debug, Default, Deserialize)]
struct LegacyExport {
    #[serde(default)]
    history: Vec<HistoryEntry>,
    #[serde(default)]
    saved: Vec<SavedPageEntry>,
}

impl SqliteStore {
    pub async fn new(db_path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("sqlite connection lock poisoned".to_string()))
    }

    pub async fn migrate(&self) -> Result<(), StorageError> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS history (
                site TEXT NOT NULL,
                title_key TEXT NOT NULL,
                title_text TEXT NOT NULL,
                discovery_method TEXT NOT NULL,
                visited_at TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                PRIMARY KEY (site, title_key)
            )",
            [],
        )?;

        // Create index for recency ordering
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_history_sequence ON history(sequence)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS saved_pages (
                site TEXT NOT NULL,
                title_key TEXT NOT NULL,
                title_text TEXT NOT NULL,
                status TEXT NOT NULL,
                saved_at TEXT NOT NULL,
                PRIMARY KEY (site, title_key)
            )",
            [],
        )?;

        info!("Database migration completed");
        Ok(())
    }

    /// Imports a JSON export of the form `{"history": [...], "saved": [...]}`.
    /// A missing file is not an error.
    pub async fn import_from_json(&self, json_path: &str) -> Result<(), StorageError> {
        if !Path::new(json_path).exists() {
            info!("No existing JSON file to import");
            return Ok(());
        }

        let content = std::fs::read_to_string(json_path)?;
        let data: LegacyExport = serde_json::from_str(&content)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        for entry in &data.history {
            upsert_history(&tx, entry)?;
        }
        for entry in &data.saved {
            upsert_saved(&tx, entry)?;
        }

        tx.commit()?;
        info!(
            "Successfully imported {} history and {} saved entries from {}",
            data.history.len(),
            data.saved.len(),
            json_path
        );
        Ok(())
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StorageError::Malformed(format!("timestamp {:?}: {}", raw, e)))
}

fn row_title(site: &str, text: &str) -> Result<Title, StorageError> {
    Title::from_text(site, text).map_err(|e| StorageError::Malformed(e.to_string()))
}

// A row that no longer parses is skipped so the rest of the table still loads.
fn readable_rows<T>(
    table: &str,
    rows: impl Iterator<Item = Result<T, StorageError>>,
) -> Vec<T> {
    rows.filter_map(|row| match row {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!("Skipping unreadable row in {}: {}", table, e);
            None
        }
    })
    .collect()
}

fn upsert_history(conn: &Connection, entry: &HistoryEntry) -> Result<(), StorageError> {
    let sequence = i64::try_from(entry.sequence)
        .map_err(|_| StorageError::Malformed(format!("sequence {} out of range", entry.sequence)))?;
    conn.execute(
        "INSERT INTO history (site, title_key, title_text, discovery_method, visited_at, sequence)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(site, title_key) DO UPDATE SET
            title_text = excluded.title_text,
            discovery_method = excluded.discovery_method,
            visited_at = excluded.visited_at,
            sequence = excluded.sequence",
        params![
            entry.title.site().as_str(),
            entry.title.key(),
            entry.title.text(),
            entry.discovery_method.key(),
            timestamp(&entry.visited_at),
            sequence,
        ],
    )?;
    Ok(())
}

// Upserts keep the rowid, so a status change does not move the page in the
// saved order.
fn upsert_saved(conn: &Connection, entry: &SavedPageEntry) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO saved_pages (site, title_key, title_text, status, saved_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(site, title_key) DO UPDATE SET
            title_text = excluded.title_text,
            status = excluded.status,
            saved_at = excluded.saved_at",
        params![
            entry.title.site().as_str(),
            entry.title.key(),
            entry.title.text(),
            entry.status.key(),
            timestamp(&entry.saved_at),
        ],
    )?;
    Ok(())
}

struct HistoryRow {
    site: String,
    text: String,
    method: String,
    visited_at: String,
    sequence: i64,
}

impl HistoryRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            site: row.get(0)?,
            text: row.get(1)?,
            method: row.get(2)?,
            visited_at: row.get(3)?,
            sequence: row.get(4)?,
        })
    }

    fn into_entry(self) -> Result<HistoryEntry, StorageError> {
        let discovery_method = DiscoveryMethod::from_key(&self.method).unwrap_or_else(|| {
            warn!("Unknown discovery method {:?} in history, using unknown", self.method);
            DiscoveryMethod::Unknown
        });
        let sequence = u64::try_from(self.sequence)
            .map_err(|_| StorageError::Malformed(format!("negative sequence {}", self.sequence)))?;
        Ok(HistoryEntry {
            title: row_title(&self.site, &self.text)?,
            discovery_method,
            visited_at: parse_timestamp(&self.visited_at)?,
            sequence,
        })
    }
}

struct SavedRow {
    site: String,
    text: String,
    status: String,
    saved_at: String,
}

impl SavedRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            site: row.get(0)?,
            text: row.get(1)?,
            status: row.get(2)?,
            saved_at: row.get(3)?,
        })
    }

    fn into_entry(self) -> Result<SavedPageEntry, StorageError> {
        let status = SaveStatus::from_key(&self.status)
            .ok_or_else(|| StorageError::Malformed(format!("save status {:?}", self.status)))?;
        Ok(SavedPageEntry {
            title: row_title(&self.site, &self.text)?,
            status,
            saved_at: parse_timestamp(&self.saved_at)?,
        })
    }
}

#[async_trait]
impl DataStore for SqliteStore {
    async fn load_history(&self) -> Result<Vec<HistoryEntry>, StorageError> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT site, title_text, discovery_method, visited_at, sequence
             FROM history ORDER BY sequence DESC",
        )?;
        let rows = stmt
            .query_map([], HistoryRow::read)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(readable_rows("history", rows.into_iter().map(HistoryRow::into_entry)))
    }

    async fn load_saved(&self) -> Result<Vec<SavedPageEntry>, StorageError> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT site, title_text, status, saved_at FROM saved_pages ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([], SavedRow::read)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(readable_rows("saved_pages", rows.into_iter().map(SavedRow::into_entry)))
    }

    async fn persist_history_delta(&self, entry: &HistoryEntry) -> Result<(), StorageError> {
        let conn = self.lock()?;
        upsert_history(&conn, entry)
    }

    async fn persist_saved_delta(&self, entry: &SavedPageEntry) -> Result<(), StorageError> {
        let conn = self.lock()?;
        upsert_saved(&conn, entry)
    }

    async fn delete_history(&self, title: &Title) -> Result<(), StorageError> {
        let conn = self.lock()?;

        conn.execute(
            "DELETE FROM history WHERE site = ?1 AND title_key = ?2",
            params![title.site().as_str(), title.key()],
        )?;

        Ok(())
    }

    async fn delete_saved(&self, title: &Title) -> Result<(), StorageError> {
        let conn = self.lock()?;

        conn.execute(
            "DELETE FROM saved_pages WHERE site = ?1 AND title_key = ?2",
            params![title.site().as_str(), title.key()],
        )?;

        Ok(())
    }

    async fn clear_history(&self) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM history", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn title(name: &str) -> Title {
        Title::new("en.wikipedia.org", name).unwrap()
    }

    async fn store() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store.migrate().await.unwrap();
        store
    }

    fn visit(name: &str, sequence: u64) -> HistoryEntry {
        HistoryEntry {
            title: title(name),
            discovery_method: DiscoveryMethod::Search,
            visited_at: Utc.timestamp_nanos(1_700_000_000_123_456_789 + sequence as i64),
            sequence,
        }
    }

    #[tokio::test]
    async fn history_loads_most_recent_first_with_upserts() {
        let store = store().await;
        store.persist_history_delta(&visit("A", 1)).await.unwrap();
        store.persist_history_delta(&visit("B", 2)).await.unwrap();
        let mut revisit = visit("a", 3);
        revisit.discovery_method = DiscoveryMethod::History;
        store.persist_history_delta(&revisit).await.unwrap();

        let loaded = store.load_history().await.unwrap();
        assert_eq!(loaded, vec![revisit, visit("B", 2)]);

        store.delete_history(&title("B")).await.unwrap();
        assert_eq!(store.load_history().await.unwrap().len(), 1);
        store.clear_history().await.unwrap();
        assert!(store.load_history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn saved_order_survives_status_updates() {
        let store = store().await;
        let at = Utc.with_ymd_and_hms(2024, 5, 4, 10, 0, 0).unwrap();
        let mut first = SavedPageEntry {
            title: title("First"),
            status: SaveStatus::Queued,
            saved_at: at,
        };
        let second = SavedPageEntry {
            title: title("Second"),
            status: SaveStatus::Queued,
            saved_at: at,
        };
        store.persist_saved_delta(&first).await.unwrap();
        store.persist_saved_delta(&second).await.unwrap();
        first.status = SaveStatus::Downloading;
        store.persist_saved_delta(&first).await.unwrap();

        let loaded = store.load_saved().await.unwrap();
        assert_eq!(loaded, vec![first.clone(), second.clone()]);

        store.delete_saved(&title("first")).await.unwrap();
        assert_eq!(store.load_saved().await.unwrap(), vec![second]);
    }

    #[test]
    fn unreadable_status_is_malformed() {
        let row = SavedRow {
            site: "en.wikipedia.org".to_string(),
            text: "X".to_string(),
            status: "archived".to_string(),
            saved_at: "2024-01-01T00:00:00Z".to_string(),
        };
        let err = row.into_entry().unwrap_err();
        assert!(matches!(err, StorageError::Malformed(_)));
    }

    #[tokio::test]
    async fn unreadable_rows_are_skipped_on_load() {
        let store = store().await;
        store.persist_history_delta(&visit("Good", 2)).await.unwrap();
        store
            .persist_saved_delta(&SavedPageEntry {
                title: title("Kept"),
                status: SaveStatus::Saved,
                saved_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            })
            .await
            .unwrap();
        {
            let conn = store.lock().unwrap();
            conn.execute(
                "INSERT INTO saved_pages VALUES ('en.wikipedia.org', 'x', 'X', 'archived', '2024-01-01T00:00:00Z')",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO history VALUES ('en.wikipedia.org', 'bad', 'Bad', 'link', 'yesterday', 1)",
                [],
            )
            .unwrap();
        }

        assert_eq!(store.load_history().await.unwrap(), vec![visit("Good", 2)]);
        let saved = store.load_saved().await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].title, title("Kept"));
    }

    #[tokio::test]
    async fn escaped_names_reload_as_the_same_title() {
        let store = store().await;
        store.persist_history_delta(&visit("Normal", 1)).await.unwrap();
        store.persist_history_delta(&visit("%255F", 2)).await.unwrap();
        store.persist_history_delta(&visit("A%2541", 3)).await.unwrap();

        let loaded = store.load_history().await.unwrap();
        assert_eq!(loaded, vec![visit("A%2541", 3), visit("%255F", 2), visit("Normal", 1)]);
        assert_eq!(loaded[0].title.text(), "A%41");
        assert_eq!(loaded[1].title.text(), "%5F");

        // the reloaded key still addresses the stored row
        store.delete_history(&loaded[0].title).await.unwrap();
        assert_eq!(store.load_history().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn imports_legacy_json_export() {
        let store = store().await;
        let path = std::env::temp_dir().join(format!("article-tracker-import-{}.json", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{
                "history": [{{
                    "title": {{"site": "en.wikipedia.org", "text": "Ada_Lovelace"}},
                    "discovery_method": "link",
                    "visited_at": "2024-02-01T08:00:00Z",
                    "sequence": 4
                }}],
                "saved": [{{
                    "title": {{"site": "en.wikipedia.org", "text": "Analytical Engine"}},
                    "status": "saved",
                    "saved_at": "2024-02-01T08:05:00Z"
                }}]
            }}"#
        )
        .unwrap();
        drop(file);

        store.import_from_json(path.to_str().unwrap()).await.unwrap();
        std::fs::remove_file(&path).unwrap();

        let history = store.load_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].title, title("Ada Lovelace"));
        assert_eq!(history[0].discovery_method, DiscoveryMethod::Link);
        let saved = store.load_saved().await.unwrap();
        assert_eq!(saved[0].status, SaveStatus::Saved);

        store.import_from_json("/nonexistent/export.json").await.unwrap();
    }
}
