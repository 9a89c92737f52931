//! SQLite store for fixture snapshots of the REDCap tables

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::store::{RedcapStore, DATA_TABLE, LOG_TABLE};
use crate::types::{FieldRow, LogEntry, RecordScope};
use crate::{Error, Result};

/// SQLite-backed [`RedcapStore`]
///
/// The schema mirrors the columns the suite reads from REDCap; fixture
/// helpers insert rows for tests and offline runs.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteStore {
    /// Open or create a snapshot database at path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        let store = Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        };
        store.init_schema()?;

        info!("Opened snapshot database at {:?}", path.as_ref());
        Ok(store)
    }

    /// Open in-memory database (for testing)
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(Error::Closed)?;
        f(conn)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS redcap_data (
                    project_id INTEGER NOT NULL,
                    event_id INTEGER NOT NULL,
                    record TEXT NOT NULL,
                    field_name TEXT NOT NULL,
                    value TEXT,
                    instance INTEGER
                );
                CREATE INDEX IF NOT EXISTS idx_data_record
                    ON redcap_data(project_id, record, event_id);

                CREATE TABLE IF NOT EXISTS redcap_log_event (
                    log_event_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    project_id INTEGER NOT NULL,
                    ts INTEGER,
                    user TEXT,
                    page TEXT,
                    event TEXT,
                    object_type TEXT,
                    sql_log TEXT,
                    pk TEXT,
                    event_id INTEGER,
                    data_values TEXT,
                    description TEXT,
                    change_reason TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_log_project_event
                    ON redcap_log_event(project_id, event_id);
                "#,
            )?;
            Ok(())
        })
    }

    // ========================================================================
    // Fixture helpers
    // ========================================================================

    /// Insert one stored field value
    pub fn insert_field(
        &self,
        scope: &RecordScope,
        field_name: &str,
        value: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO {} (project_id, event_id, record, field_name, value) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    DATA_TABLE
                ),
                params![
                    scope.project_id,
                    scope.event_id,
                    scope.record.to_string(),
                    field_name,
                    value
                ],
            )?;
            Ok(())
        })
    }

    /// Append an audit-log row and return its `log_event_id`
    pub fn insert_log_event(&self, project_id: u32, event_id: u32, entry: &LogEntry) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO {} (project_id, event_id, ts, pk, sql_log, data_values, description, change_reason) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    LOG_TABLE
                ),
                params![
                    project_id,
                    event_id,
                    entry.ts,
                    entry.pk,
                    entry.sql_log,
                    entry.data_values,
                    entry.description,
                    entry.change_reason
                ],
            )?;
            let id = conn.last_insert_rowid();
            debug!("Inserted log event {}", id);
            Ok(id)
        })
    }
}

#[async_trait]
impl RedcapStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn field_rows(&self, scope: &RecordScope) -> Result<Vec<FieldRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT field_name, value FROM {} \
                 WHERE project_id = ?1 AND record = ?2 AND event_id = ?3",
                DATA_TABLE
            ))?;

            let rows = stmt.query_map(
                params![scope.project_id, scope.record.to_string(), scope.event_id],
                |row| {
                    Ok(FieldRow {
                        field_name: row.get(0)?,
                        value: row.get(1)?,
                    })
                },
            )?;

            let mut results = Vec::new();
            for row in rows {
                results.push(row?);
            }
            Ok(results)
        })
    }

    async fn recent_log_events(
        &self,
        project_id: u32,
        event_id: u32,
        limit: u32,
    ) -> Result<Vec<LogEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT log_event_id, ts, pk, sql_log, data_values, description, change_reason \
                 FROM {} WHERE project_id = ?1 AND event_id = ?2 \
                 ORDER BY log_event_id DESC LIMIT ?3",
                LOG_TABLE
            ))?;

            let rows = stmt.query_map(params![project_id, event_id, limit], |row| {
                Ok(LogEntry {
                    log_event_id: row.get(0)?,
                    ts: row.get(1)?,
                    pk: row.get(2)?,
                    sql_log: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    data_values: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                    description: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                    change_reason: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                })
            })?;

            let mut results = Vec::new();
            for row in rows {
                results.push(row?);
            }
            Ok(results)
        })
    }

    async fn first_column(&self, sql: &str) -> Result<Vec<Option<String>>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let mut rows = stmt.query([])?;
            let mut values = Vec::new();
            while let Some(row) = rows.next()? {
                values.push(value_to_text(row.get_ref(0)?));
            }
            Ok(values)
        })
    }

    async fn close(&self) -> Result<()> {
        if let Some(conn) = self.conn.lock().take() {
            conn.close().map_err(|(_, e)| Error::Database(e))?;
        }
        Ok(())
    }
}

fn value_to_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    }
}
