use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{Message, NewSource, Notebook, Role, Source};

use super::schema::SCHEMA;

/// Durable storage for notebooks, sources, messages and settings.
///
/// Every operation is a single auto-committed statement. Child rows are
/// removed by the store's `ON DELETE CASCADE`, so nothing here cleans up
/// sources or messages by hand.
#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        let store_open_error = |source| AppError::StoreOpen {
            path: db_path.display().to_string(),
            source,
        };

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| AppError::StoreOpen {
                    path: db_path.display().to_string(),
                    source: tokio_rusqlite::Error::Other(Box::new(e)),
                })?;
            }
        }

        let conn = Connection::open(db_path).await.map_err(store_open_error)?;
        Self::initialize(&conn).await.map_err(store_open_error)?;

        tracing::info!("Opened notebook store at {}", db_path.display());
        Ok(Self { conn })
    }

    pub async fn open_in_memory() -> Result<Self> {
        let store_open_error = |source| AppError::StoreOpen {
            path: ":memory:".to_string(),
            source,
        };
        let conn = Connection::open_in_memory()
            .await
            .map_err(store_open_error)?;
        Self::initialize(&conn).await.map_err(store_open_error)?;
        Ok(Self { conn })
    }

    /// Creates any missing tables and turns on foreign-key enforcement for
    /// this connection. Safe to run against an existing database.
    async fn initialize(conn: &Connection) -> tokio_rusqlite::Result<()> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
    }

    pub async fn close(self) -> Result<()> {
        self.conn.close().await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn execute_batch(&self, sql: &'static str) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute_batch(sql)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Notebook operations

    pub async fn get_all_notebooks(&self) -> Result<Vec<Notebook>> {
        let notebooks = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, created_at FROM notebooks ORDER BY created_at DESC, rowid DESC",
                )?;
                let notebooks = stmt
                    .query_map([], notebook_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(notebooks)
            })
            .await?;
        Ok(notebooks)
    }

    pub async fn notebook_exists(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        let exists = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM notebooks WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
            .await?;
        Ok(exists)
    }

    pub async fn insert_notebook(&self, id: &str, name: &str) -> Result<Notebook> {
        let (id, name) = (id.to_string(), name.to_string());
        let notebook = self
            .conn
            .call(move |conn| {
                let notebook = conn.query_row(
                    "INSERT INTO notebooks (id, name) VALUES (?1, ?2) RETURNING id, name, created_at",
                    params![id, name],
                    notebook_from_row,
                )?;
                Ok(notebook)
            })
            .await?;
        Ok(notebook)
    }

    pub async fn update_notebook_name(&self, id: &str, name: &str) -> Result<usize> {
        let (id, name) = (id.to_string(), name.to_string());
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE notebooks SET name = ?1 WHERE id = ?2",
                    params![name, id],
                )?;
                Ok(changed)
            })
            .await?;
        Ok(changed)
    }

    pub async fn delete_notebook(&self, id: &str) -> Result<usize> {
        let id = id.to_string();
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute("DELETE FROM notebooks WHERE id = ?1", params![id])?;
                Ok(changed)
            })
            .await?;
        Ok(changed)
    }

    // Source operations

    pub async fn get_sources_for_notebook(&self, notebook_id: &str) -> Result<Vec<Source>> {
        let notebook_id = notebook_id.to_string();
        let sources = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, notebook_id, name, type, content, created_at
                       FROM sources
                       WHERE notebook_id = ?1
                       ORDER BY created_at ASC, rowid ASC"#,
                )?;
                let sources = stmt
                    .query_map(params![notebook_id], source_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(sources)
            })
            .await?;
        Ok(sources)
    }

    /// Insert a source, or replace every mutable field of the row with the
    /// same id. `created_at` keeps the value from the first insert.
    pub async fn upsert_source(&self, source: NewSource, notebook_id: &str) -> Result<Source> {
        let notebook_id = notebook_id.to_string();
        let stored = self
            .conn
            .call(move |conn| {
                let stored = conn.query_row(
                    r#"INSERT INTO sources (id, notebook_id, name, type, content)
                       VALUES (?1, ?2, ?3, ?4, ?5)
                       ON CONFLICT(id) DO UPDATE SET
                           notebook_id = excluded.notebook_id,
                           name = excluded.name,
                           type = excluded.type,
                           content = excluded.content
                       RETURNING id, notebook_id, name, type, content, created_at"#,
                    params![
                        source.id,
                        notebook_id,
                        source.name,
                        source.source_type,
                        source.content,
                    ],
                    source_from_row,
                )?;
                Ok(stored)
            })
            .await?;
        Ok(stored)
    }

    pub async fn delete_source(&self, id: &str) -> Result<usize> {
        let id = id.to_string();
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute("DELETE FROM sources WHERE id = ?1", params![id])?;
                Ok(changed)
            })
            .await?;
        Ok(changed)
    }

    // Message operations

    pub async fn get_messages_for_notebook(&self, notebook_id: &str) -> Result<Vec<Message>> {
        let notebook_id = notebook_id.to_string();
        let messages = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, notebook_id, role, content, created_at
                       FROM messages
                       WHERE notebook_id = ?1
                       ORDER BY id ASC"#,
                )?;
                let messages = stmt
                    .query_map(params![notebook_id], message_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(messages)
            })
            .await?;
        Ok(messages)
    }

    pub async fn insert_message(&self, notebook_id: &str, role: Role, content: &str) -> Result<Message> {
        let (notebook_id, content) = (notebook_id.to_string(), content.to_string());
        let message = self
            .conn
            .call(move |conn| {
                let message = conn.query_row(
                    r#"INSERT INTO messages (notebook_id, role, content)
                       VALUES (?1, ?2, ?3)
                       RETURNING id, notebook_id, role, content, created_at"#,
                    params![notebook_id, role, content],
                    message_from_row,
                )?;
                Ok(message)
            })
            .await?;
        Ok(message)
    }

    pub async fn delete_messages_for_notebook(&self, notebook_id: &str) -> Result<usize> {
        let notebook_id = notebook_id.to_string();
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "DELETE FROM messages WHERE notebook_id = ?1",
                    params![notebook_id],
                )?;
                Ok(changed)
            })
            .await?;
        Ok(changed)
    }

    // Settings

    pub async fn get_all_settings(&self) -> Result<HashMap<String, String>> {
        let settings = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
                let settings = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                    .collect::<std::result::Result<HashMap<_, _>, _>>()?;
                Ok(settings)
            })
            .await?;
        Ok(settings)
    }

    pub async fn save_setting(&self, key: &str, value: &str) -> Result<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                    params![key, value],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // SQLite strftime with milliseconds (e.g., "2026-01-11 12:34:56.789")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    // SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    None
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    Ok(parse_datetime(&raw).unwrap_or_else(|| {
        tracing::warn!("Unparseable timestamp {:?} in column {}", raw, idx);
        Utc::now()
    }))
}

fn notebook_from_row(row: &Row) -> rusqlite::Result<Notebook> {
    Ok(Notebook {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: timestamp_column(row, 2)?,
    })
}

fn source_from_row(row: &Row) -> rusqlite::Result<Source> {
    Ok(Source {
        id: row.get(0)?,
        notebook_id: row.get(1)?,
        name: row.get(2)?,
        source_type: row.get(3)?,
        content: row.get(4)?,
        created_at: timestamp_column(row, 5)?,
    })
}

fn message_from_row(row: &Row) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        notebook_id: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        created_at: timestamp_column(row, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;
    use tokio_test::assert_err;

    fn text_source(id: &str, name: &str, content: &str) -> NewSource {
        NewSource {
            id: id.to_string(),
            name: name.to_string(),
            source_type: SourceType::Text,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_open_twice_keeps_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("notebooks.db");

        let repo = Repository::open(&path).await.unwrap();
        repo.insert_notebook("n1", "Research").await.unwrap();
        repo.upsert_source(text_source("s1", "a.txt", "Alpha"), "n1").await.unwrap();
        repo.close().await.unwrap();

        let repo = Repository::open(&path).await.unwrap();
        let notebooks = repo.get_all_notebooks().await.unwrap();
        assert_eq!(notebooks.len(), 1);
        assert_eq!(notebooks[0].name, "Research");
        assert_eq!(repo.get_sources_for_notebook("n1").await.unwrap().len(), 1);

        // Foreign keys are enforced again after reopening.
        assert_err!(repo.upsert_source(text_source("s2", "b.txt", "Beta"), "missing").await);
    }

    #[tokio::test]
    async fn test_open_unwritable_path_is_store_open_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a database file.
        let err = Repository::open(dir.path()).await.err().unwrap();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_delete_notebook_cascades_only_its_children() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.insert_notebook("n1", "One").await.unwrap();
        repo.insert_notebook("n2", "Two").await.unwrap();

        repo.upsert_source(text_source("s1", "a", "A"), "n1").await.unwrap();
        repo.upsert_source(text_source("s2", "b", "B"), "n2").await.unwrap();
        repo.insert_message("n1", Role::User, "Hi").await.unwrap();
        repo.insert_message("n2", Role::User, "Hey").await.unwrap();

        assert_eq!(repo.delete_notebook("n1").await.unwrap(), 1);

        assert!(repo.get_sources_for_notebook("n1").await.unwrap().is_empty());
        assert!(repo.get_messages_for_notebook("n1").await.unwrap().is_empty());
        assert_eq!(repo.get_sources_for_notebook("n2").await.unwrap().len(), 1);
        assert_eq!(repo.get_messages_for_notebook("n2").await.unwrap().len(), 1);
        assert!(!repo.notebook_exists("n1").await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_source_replaces_whole_row() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.insert_notebook("n1", "One").await.unwrap();

        let first = repo.upsert_source(text_source("s1", "Draft", "old"), "n1").await.unwrap();
        let second = repo
            .upsert_source(
                NewSource {
                    id: "s1".to_string(),
                    name: "Final".to_string(),
                    source_type: SourceType::Note,
                    content: "new".to_string(),
                },
                "n1",
            )
            .await
            .unwrap();

        let sources = repo.get_sources_for_notebook("n1").await.unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0], second);
        assert_eq!(sources[0].name, "Final");
        assert_eq!(sources[0].source_type, SourceType::Note);
        assert_eq!(sources[0].content, "new");
        assert_eq!(sources[0].created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_messages_keep_call_order_across_notebooks() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.insert_notebook("n1", "One").await.unwrap();
        repo.insert_notebook("n2", "Two").await.unwrap();

        for i in 0..5 {
            repo.insert_message("n1", Role::User, &format!("n1-{i}")).await.unwrap();
            repo.insert_message("n2", Role::Ai, &format!("n2-{i}")).await.unwrap();
        }

        let contents: Vec<String> = repo
            .get_messages_for_notebook("n1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["n1-0", "n1-1", "n1-2", "n1-3", "n1-4"]);
    }

    #[tokio::test]
    async fn test_notebooks_listed_newest_first() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.insert_notebook("a", "First").await.unwrap();
        repo.insert_notebook("b", "Second").await.unwrap();
        repo.insert_notebook("c", "Third").await.unwrap();

        let ids: Vec<String> = repo
            .get_all_notebooks()
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_duplicate_notebook_id_is_rejected() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.insert_notebook("n1", "One").await.unwrap();
        assert_err!(repo.insert_notebook("n1", "Again").await);
        assert_eq!(repo.get_all_notebooks().await.unwrap()[0].name, "One");
    }

    #[test]
    fn test_parse_datetime_formats() {
        assert!(parse_datetime("2026-01-11 12:34:56.789").is_some());
        assert!(parse_datetime("2026-01-11 12:34:56").is_some());
        assert!(parse_datetime("2026-01-11T12:34:56+00:00").is_some());
        assert!(parse_datetime("yesterday").is_none());
    }
}
