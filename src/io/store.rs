use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::model::client::{ClientOverrides, ClientStatus, EditLogEntry, Metrics};
use crate::model::history::HistoricalCloseMetric;
use crate::util::dates::utc_now_rfc3339;

/// Error type for the SQLite store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("metrics JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS client_status (
    sf_id TEXT PRIMARY KEY,
    task_id TEXT NOT NULL,
    task_name TEXT NOT NULL,
    task_status TEXT NOT NULL,
    task_url TEXT NOT NULL,
    metrics_json TEXT NOT NULL,
    source_updated_at TEXT,
    synced_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS ecd_override (
    sf_id TEXT NOT NULL,
    step_slug TEXT NOT NULL,
    ecd_value TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (sf_id, step_slug)
);
CREATE TABLE IF NOT EXISTS acd_anchor_preference (
    sf_id TEXT NOT NULL,
    step_slug TEXT NOT NULL,
    use_acd INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (sf_id, step_slug)
);
CREATE TABLE IF NOT EXISTS edit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    logged_at TEXT NOT NULL,
    sf_id TEXT NOT NULL,
    task_id TEXT,
    field_key TEXT NOT NULL,
    old_value TEXT,
    new_value TEXT,
    source TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS historical_close_metric (
    source_key TEXT PRIMARY KEY,
    sf_id TEXT,
    company TEXT NOT NULL,
    track TEXT NOT NULL,
    kickoff_date TEXT NOT NULL,
    final_date TEXT NOT NULL,
    close_days INTEGER NOT NULL,
    quarter_label TEXT NOT NULL,
    source TEXT NOT NULL,
    imported_at TEXT NOT NULL
);
";

const UPSERT_CLIENT_SQL: &str = "
INSERT INTO client_status (
    sf_id, task_id, task_name, task_status, task_url,
    task_created_at, task_closed_at, metrics_json, source_updated_at, synced_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
ON CONFLICT(sf_id) DO UPDATE SET
    task_id = excluded.task_id,
    task_name = excluded.task_name,
    task_status = excluded.task_status,
    task_url = excluded.task_url,
    task_created_at = excluded.task_created_at,
    task_closed_at = excluded.task_closed_at,
    metrics_json = excluded.metrics_json,
    source_updated_at = excluded.source_updated_at,
    synced_at = excluded.synced_at";

const SELECT_CLIENT_SQL: &str = "
SELECT sf_id, task_id, task_name, task_status, task_url,
       task_created_at, task_closed_at, metrics_json, source_updated_at, synced_at
FROM client_status";

/// SQLite persistence. Every call opens its own connection.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Open (creating if needed) the database at `path` and bring the schema up to date.
    pub fn open(path: impl AsRef<Path>) -> Result<Store, StoreError> {
        let store = Store {
            path: path.as_ref().to_path_buf(),
        };
        let conn = store.connect()?;
        conn.execute_batch(SCHEMA_SQL)?;
        ensure_column(&conn, "client_status", "task_created_at", "TEXT")?;
        ensure_column(&conn, "client_status", "task_closed_at", "TEXT")?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        Ok(Connection::open(&self.path)?)
    }

    // --- client_status ---

    pub fn get_client_status(&self, sf_id: &str) -> Result<Option<ClientStatus>, StoreError> {
        let conn = self.connect()?;
        let sql = format!("{SELECT_CLIENT_SQL} WHERE sf_id = ?1");
        Ok(conn.query_row(&sql, [sf_id], client_from_row).optional()?)
    }

    /// All clients, by name then id.
    pub fn list_client_statuses(&self) -> Result<Vec<ClientStatus>, StoreError> {
        let conn = self.connect()?;
        let sql = format!("{SELECT_CLIENT_SQL} ORDER BY lower(task_name), sf_id");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], client_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Insert or replace one client row; `synced_at` is stamped now.
    pub fn upsert_client_status(&self, status: &ClientStatus) -> Result<(), StoreError> {
        let conn = self.connect()?;
        write_client(&conn, status, &utc_now_rfc3339())?;
        Ok(())
    }

    /// Upsert many rows in one transaction. Returns the number written.
    pub fn upsert_client_statuses(&self, statuses: &[ClientStatus]) -> Result<usize, StoreError> {
        if statuses.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let synced_at = utc_now_rfc3339();
        for status in statuses {
            write_client(&tx, status, &synced_at)?;
        }
        tx.commit()?;
        Ok(statuses.len())
    }

    /// Latest `source_updated_at` across all clients.
    pub fn max_source_updated_at(&self) -> Result<Option<String>, StoreError> {
        let conn = self.connect()?;
        let max: Option<String> = conn.query_row(
            "SELECT MAX(source_updated_at) FROM client_status WHERE source_updated_at <> ''",
            [],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    // --- overrides ---

    pub fn get_ecd_overrides(&self, sf_id: &str) -> Result<IndexMap<String, String>, StoreError> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT step_slug, ecd_value FROM ecd_override WHERE sf_id = ?1 ORDER BY step_slug")?;
        let rows = stmt.query_map([sf_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<Result<IndexMap<_, _>, _>>()?)
    }

    /// Set an ECD override; a blank value deletes it.
    pub fn upsert_ecd_override(&self, sf_id: &str, step_slug: &str, ecd_value: &str) -> Result<(), StoreError> {
        let conn = self.connect()?;
        if ecd_value.trim().is_empty() {
            conn.execute(
                "DELETE FROM ecd_override WHERE sf_id = ?1 AND step_slug = ?2",
                params![sf_id, step_slug],
            )?;
        } else {
            conn.execute(
                "INSERT INTO ecd_override (sf_id, step_slug, ecd_value, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(sf_id, step_slug) DO UPDATE SET
                     ecd_value = excluded.ecd_value,
                     updated_at = excluded.updated_at",
                params![sf_id, step_slug, ecd_value.trim(), utc_now_rfc3339()],
            )?;
        }
        Ok(())
    }

    pub fn get_anchor_preferences(&self, sf_id: &str) -> Result<IndexMap<String, bool>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT step_slug, use_acd FROM acd_anchor_preference WHERE sf_id = ?1 ORDER BY step_slug",
        )?;
        let rows = stmt.query_map([sf_id], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? != 0)))?;
        Ok(rows.collect::<Result<IndexMap<_, _>, _>>()?)
    }

    pub fn set_anchor_preference(&self, sf_id: &str, step_slug: &str, use_acd: bool) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO acd_anchor_preference (sf_id, step_slug, use_acd, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(sf_id, step_slug) DO UPDATE SET
                 use_acd = excluded.use_acd,
                 updated_at = excluded.updated_at",
            params![sf_id, step_slug, use_acd as i64, utc_now_rfc3339()],
        )?;
        Ok(())
    }

    /// Both side tables for one client.
    pub fn client_overrides(&self, sf_id: &str) -> Result<ClientOverrides, StoreError> {
        Ok(ClientOverrides {
            ecd: self.get_ecd_overrides(sf_id)?,
            anchor_on_acd: self.get_anchor_preferences(sf_id)?,
        })
    }

    // --- edit log ---

    /// Append an audit entry. `logged_at` is stamped now when blank.
    pub fn log_edit(&self, entry: &EditLogEntry) -> Result<(), StoreError> {
        let conn = self.connect()?;
        let logged_at = if entry.logged_at.trim().is_empty() {
            utc_now_rfc3339()
        } else {
            entry.logged_at.clone()
        };
        conn.execute(
            "INSERT INTO edit_log (logged_at, sf_id, task_id, field_key, old_value, new_value, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                logged_at,
                entry.sf_id,
                entry.task_id,
                entry.field_key,
                entry.old_value,
                entry.new_value,
                entry.source,
            ],
        )?;
        Ok(())
    }

    /// Audit entries for one client, oldest first.
    pub fn list_edit_log(&self, sf_id: &str) -> Result<Vec<EditLogEntry>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT logged_at, sf_id, task_id, field_key, old_value, new_value, source
             FROM edit_log WHERE sf_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([sf_id], |row| {
            Ok(EditLogEntry {
                logged_at: row.get(0)?,
                sf_id: row.get(1)?,
                task_id: text(row, 2)?,
                field_key: row.get(3)?,
                old_value: text(row, 4)?,
                new_value: text(row, 5)?,
                source: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // --- historical metrics ---

    /// Insert rows whose `source_key` is new; existing rows are left as they are.
    /// Returns the number inserted.
    pub fn upsert_historical_metrics(&self, rows: &[HistoricalCloseMetric]) -> Result<usize, StoreError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO historical_close_metric (
                     source_key, sf_id, company, track, kickoff_date, final_date,
                     close_days, quarter_label, source, imported_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(source_key) DO NOTHING",
            )?;
            for row in rows {
                inserted += stmt.execute(params![
                    row.source_key,
                    row.sf_id,
                    row.company,
                    row.track,
                    row.kickoff_date,
                    row.final_date,
                    row.close_days,
                    row.quarter_label,
                    row.source,
                    row.imported_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn list_historical_metrics(&self) -> Result<Vec<HistoricalCloseMetric>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT source_key, sf_id, company, track, kickoff_date, final_date,
                    close_days, quarter_label, source, imported_at
             FROM historical_close_metric
             ORDER BY imported_at, rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(HistoricalCloseMetric {
                source_key: row.get(0)?,
                sf_id: row.get(1)?,
                company: row.get(2)?,
                track: row.get(3)?,
                kickoff_date: row.get(4)?,
                final_date: row.get(5)?,
                close_days: row.get(6)?,
                quarter_label: row.get(7)?,
                source: row.get(8)?,
                imported_at: row.get(9)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn write_client(conn: &Connection, status: &ClientStatus, synced_at: &str) -> Result<(), StoreError> {
    let metrics_json = serde_json::to_string(&status.metrics)?;
    conn.execute(
        UPSERT_CLIENT_SQL,
        params![
            status.sf_id,
            status.task_id,
            status.task_name,
            status.task_status,
            status.task_url,
            status.task_created_at,
            status.task_closed_at,
            metrics_json,
            status.source_updated_at,
            synced_at,
        ],
    )?;
    Ok(())
}

/// Nullable text column as a plain string.
fn text(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
}

fn client_from_row(row: &Row<'_>) -> rusqlite::Result<ClientStatus> {
    let metrics_json = text(row, 7)?;
    let metrics: Metrics = if metrics_json.trim().is_empty() {
        Metrics::new()
    } else {
        serde_json::from_str(&metrics_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?
    };
    Ok(ClientStatus {
        sf_id: row.get(0)?,
        task_id: row.get(1)?,
        task_name: row.get(2)?,
        task_status: row.get(3)?,
        task_closed: false,
        task_url: row.get(4)?,
        task_created_at: text(row, 5)?,
        task_closed_at: text(row, 6)?,
        metrics,
        source_updated_at: text(row, 8)?,
        synced_at: row.get(9)?,
    })
}

/// Add `column` to `table` when an older database lacks it.
fn ensure_column(conn: &Connection, table: &str, column: &str, column_type: &str) -> Result<(), StoreError> {
    if !column_exists(conn, table, column)? {
        conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {column} {column_type}"), [])?;
    }
    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    fn client(sf_id: &str, name: &str) -> ClientStatus {
        let mut metrics = Metrics::new();
        metrics.insert("sra.sra_kickoff.date".into(), "03/03/2025".into());
        metrics.insert("project.location".into(), "Remote".into());
        ClientStatus {
            sf_id: sf_id.into(),
            task_id: format!("task-{sf_id}"),
            task_name: name.into(),
            task_status: "in progress".into(),
            task_url: "https://app.clickup.com/t/1".into(),
            metrics,
            source_updated_at: "2025-03-01T00:00:00+00:00".into(),
            ..Default::default()
        }
    }

    #[test]
    fn client_round_trip_keeps_metric_order() {
        let (_dir, store) = store();
        store.upsert_client_status(&client("SF-1", "Acme")).unwrap();

        let loaded = store.get_client_status("SF-1").unwrap().unwrap();
        assert_eq!(loaded.task_name, "Acme");
        let keys: Vec<&str> = loaded.metrics.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["sra.sra_kickoff.date", "project.location"]);
        assert!(!loaded.synced_at.is_empty());
        assert!(store.get_client_status("missing").unwrap().is_none());
    }

    #[test]
    fn bulk_upsert_replaces_and_lists_by_name() {
        let (_dir, store) = store();
        assert_eq!(store.upsert_client_statuses(&[]).unwrap(), 0);
        let written = store
            .upsert_client_statuses(&[client("SF-2", "beta"), client("SF-1", "Acme")])
            .unwrap();
        assert_eq!(written, 2);

        let mut renamed = client("SF-2", "Alpha");
        renamed.source_updated_at = "2025-04-01T00:00:00+00:00".into();
        store.upsert_client_status(&renamed).unwrap();

        let names: Vec<String> = store
            .list_client_statuses()
            .unwrap()
            .into_iter()
            .map(|c| c.task_name)
            .collect();
        assert_eq!(names, vec!["Acme", "Alpha"]);
        assert_eq!(
            store.max_source_updated_at().unwrap().as_deref(),
            Some("2025-04-01T00:00:00+00:00")
        );
    }

    #[test]
    fn blank_override_deletes() {
        let (_dir, store) = store();
        store.upsert_ecd_override("SF-1", "review_sra", "04/01/2025").unwrap();
        store.upsert_ecd_override("SF-1", "review_sra", "04/02/2025").unwrap();
        assert_eq!(store.get_ecd_overrides("SF-1").unwrap()["review_sra"], "04/02/2025");

        store.upsert_ecd_override("SF-1", "review_sra", "  ").unwrap();
        assert!(store.get_ecd_overrides("SF-1").unwrap().is_empty());
    }

    #[test]
    fn anchor_preferences_are_per_client() {
        let (_dir, store) = store();
        store.set_anchor_preference("SF-1", "review_sra", false).unwrap();
        store.set_anchor_preference("SF-2", "review_sra", true).unwrap();

        let overrides = store.client_overrides("SF-1").unwrap();
        assert_eq!(overrides.anchor_on_acd.get("review_sra"), Some(&false));
        assert!(overrides.ecd.is_empty());
    }

    #[test]
    fn edit_log_appends_in_order() {
        let (_dir, store) = store();
        for (i, source) in ["admin_update_override", "admin_update_clickup"].iter().enumerate() {
            store
                .log_edit(&EditLogEntry {
                    logged_at: String::new(),
                    sf_id: "SF-1".into(),
                    task_id: "t1".into(),
                    field_key: format!("key-{i}"),
                    old_value: String::new(),
                    new_value: "04/01/2025".into(),
                    source: source.to_string(),
                })
                .unwrap();
        }
        let log = store.list_edit_log("SF-1").unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].field_key, "key-0");
        assert_eq!(log[1].source, "admin_update_clickup");
        assert!(!log[0].logged_at.is_empty());
    }

    #[test]
    fn historical_rows_are_inserted_once() {
        let (_dir, store) = store();
        let row = HistoricalCloseMetric {
            source_key: "abc".into(),
            sf_id: None,
            company: "Acme".into(),
            track: "SRA".into(),
            kickoff_date: "01/06/2025".into(),
            final_date: "03/14/2025".into(),
            close_days: 50,
            quarter_label: "2025 Q1".into(),
            source: "paste:tab".into(),
            imported_at: "2025-06-01T00:00:00+00:00".into(),
        };
        assert_eq!(store.upsert_historical_metrics(&[row.clone()]).unwrap(), 1);

        let mut changed = row.clone();
        changed.close_days = 99;
        assert_eq!(store.upsert_historical_metrics(&[changed]).unwrap(), 0);

        assert_eq!(store.list_historical_metrics().unwrap(), vec![row]);
    }

    #[test]
    fn old_databases_gain_timestamp_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE client_status (
                    sf_id TEXT PRIMARY KEY, task_id TEXT NOT NULL, task_name TEXT NOT NULL,
                    task_status TEXT NOT NULL, task_url TEXT NOT NULL, metrics_json TEXT NOT NULL,
                    source_updated_at TEXT, synced_at TEXT NOT NULL
                );",
            )
            .unwrap();
        }
        let store = Store::open(&path).unwrap();
        let conn = Connection::open(&store.path).unwrap();
        assert!(column_exists(&conn, "client_status", "task_created_at").unwrap());
        assert!(column_exists(&conn, "client_status", "task_closed_at").unwrap());
    }
}
