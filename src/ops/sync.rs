use indexmap::IndexMap;
use serde_json::Value;

use crate::io::clickup::{ClickUpError, Task, TaskSource, normalize_task};
use crate::io::store::{Store, StoreError};
use crate::model::client::ClientStatus;
use crate::model::config::AppConfig;
use crate::util::dates::parse_timestamp;

const NEXT_STEPS_KEY: &str = "project.next_steps";

/// Error type for sync operations
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Upstream(#[from] ClickUpError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a webhook delivery did not update anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    MissingTaskId,
    MissingSfId,
}

impl IgnoreReason {
    pub fn as_str(self) -> &'static str {
        match self {
            IgnoreReason::MissingTaskId => "missing_task_id",
            IgnoreReason::MissingSfId => "missing_sf_id",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Updated { sf_id: String },
    Ignored(IgnoreReason),
}

/// Whether `candidate` should replace `current` for the same CRM id:
/// open tasks beat closed ones, then the more recently updated wins (ties go
/// to the candidate).
pub fn is_better_record(candidate: &ClientStatus, current: &ClientStatus) -> bool {
    if candidate.task_closed != current.task_closed {
        return !candidate.task_closed;
    }
    parse_timestamp(&candidate.source_updated_at) >= parse_timestamp(&current.source_updated_at)
}

/// Collapse rows sharing an `sf_id`, keeping the first-seen position.
pub fn dedup_by_sf_id(statuses: impl IntoIterator<Item = ClientStatus>) -> Vec<ClientStatus> {
    let mut by_sf_id: IndexMap<String, ClientStatus> = IndexMap::new();
    for status in statuses {
        match by_sf_id.get_mut(&status.sf_id) {
            Some(current) => {
                if is_better_record(&status, current) {
                    *current = status;
                }
            }
            None => {
                by_sf_id.insert(status.sf_id.clone(), status);
            }
        }
    }
    by_sf_id.into_values().collect()
}

/// Task id from a webhook body: top-level `task_id`, else `task.id`.
pub fn webhook_task_id(payload: &Value) -> Option<String> {
    let text = |v: &Value| match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    };
    [payload.get("task_id"), payload.get("task").and_then(|t| t.get("id"))]
        .into_iter()
        .flatten()
        .map(text)
        .find(|id| !id.is_empty())
}

/// Pulls tasks from the tracker into the store.
pub struct Syncer<'a, S: TaskSource + ?Sized> {
    source: &'a S,
    store: &'a Store,
    config: &'a AppConfig,
}

impl<'a, S: TaskSource + ?Sized> Syncer<'a, S> {
    pub fn new(source: &'a S, store: &'a Store, config: &'a AppConfig) -> Self {
        Syncer { source, store, config }
    }

    /// Normalize a task and attach its latest comment as next steps.
    fn normalize(&self, task: &Task) -> Result<Option<ClientStatus>, SyncError> {
        let Some(mut status) = normalize_task(task, &self.config.clickup.sf_id_field_id, &self.config.field_map)
        else {
            return Ok(None);
        };
        let comment = self.source.fetch_latest_task_comment(&status.task_id)?;
        status.metrics.insert(NEXT_STEPS_KEY.to_string(), comment);
        Ok(Some(status))
    }

    /// Fetch one task, store it, and return the stored row.
    pub fn sync_task(&self, task_id: &str) -> Result<Option<ClientStatus>, SyncError> {
        let task = self.source.fetch_task_by_id(task_id)?;
        let Some(status) = self.normalize(&task)? else {
            return Ok(None);
        };
        self.store.upsert_client_status(&status)?;
        Ok(Some(status))
    }

    /// Re-pull a known client's task. `false` when the client or its task is unknown.
    pub fn refresh_client(&self, sf_id: &str) -> Result<bool, SyncError> {
        let Some(existing) = self.store.get_client_status(sf_id)? else {
            return Ok(false);
        };
        if existing.task_id.trim().is_empty() {
            return Ok(false);
        }
        let refreshed = self.sync_task(&existing.task_id)?;
        tracing::debug!(sf_id, refreshed = refreshed.is_some(), "refreshed client");
        Ok(refreshed.is_some())
    }

    /// Pull the whole list and bulk-write it. Nothing is written when any
    /// fetch fails.
    pub fn refresh_all(&self) -> Result<usize, SyncError> {
        let tasks = self.source.fetch_tasks_for_list(&self.config.clickup.list_id)?;
        let fetched = tasks.len();
        let mut statuses = Vec::with_capacity(fetched);
        for task in &tasks {
            if let Some(status) = self.normalize(task)? {
                statuses.push(status);
            }
        }
        let statuses = dedup_by_sf_id(statuses);
        let written = self.store.upsert_client_statuses(&statuses)?;
        let latest = self.store.max_source_updated_at()?.unwrap_or_default();
        tracing::info!(fetched, clients = written, %latest, "synced task list");
        Ok(written)
    }

    pub fn handle_webhook(&self, payload: &Value) -> Result<WebhookOutcome, SyncError> {
        let Some(task_id) = webhook_task_id(payload) else {
            return Ok(WebhookOutcome::Ignored(IgnoreReason::MissingTaskId));
        };
        match self.sync_task(&task_id)? {
            Some(status) => {
                tracing::info!(%task_id, sf_id = %status.sf_id, "webhook updated client");
                Ok(WebhookOutcome::Updated { sf_id: status.sf_id })
            }
            None => Ok(WebhookOutcome::Ignored(IgnoreReason::MissingSfId)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::test_support::{FakeSource, config, task};
    use serde_json::json;
    use tempfile::TempDir;

    fn row(sf_id: &str, closed: bool, updated: &str) -> ClientStatus {
        ClientStatus {
            sf_id: sf_id.into(),
            task_closed: closed,
            source_updated_at: updated.into(),
            ..Default::default()
        }
    }

    #[test]
    fn open_task_beats_closed_task() {
        let open = row("1", false, "2024-01-01T00:00:00+00:00");
        let closed = row("1", true, "2025-01-01T00:00:00+00:00");
        assert!(is_better_record(&open, &closed));
        assert!(!is_better_record(&closed, &open));
    }

    #[test]
    fn later_update_wins_and_ties_go_to_candidate() {
        let old = row("1", false, "2025-01-01T00:00:00+00:00");
        let new = row("1", false, "2025-02-01T00:00:00Z");
        assert!(is_better_record(&new, &old));
        assert!(!is_better_record(&old, &new));
        assert!(is_better_record(&old.clone(), &old));
        assert!(is_better_record(&old, &row("1", false, "garbage")));
        assert!(!is_better_record(&row("1", false, ""), &old));
    }

    #[test]
    fn dedup_keeps_best_row_per_sf_id() {
        let mut a_old = row("A", false, "2025-01-01T00:00:00+00:00");
        a_old.task_id = "t1".into();
        let mut a_new = row("A", false, "2025-03-01T00:00:00+00:00");
        a_new.task_id = "t2".into();
        let b = row("B", true, "");
        let out = dedup_by_sf_id(vec![a_old, b, a_new]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].sf_id, "A");
        assert_eq!(out[0].task_id, "t2");
        assert_eq!(out[1].sf_id, "B");
    }

    #[test]
    fn webhook_task_id_sources() {
        assert_eq!(webhook_task_id(&json!({ "task_id": " abc " })).as_deref(), Some("abc"));
        assert_eq!(webhook_task_id(&json!({ "task": { "id": "xyz" } })).as_deref(), Some("xyz"));
        assert_eq!(webhook_task_id(&json!({ "task_id": "", "task": { "id": "xyz" } })).as_deref(), Some("xyz"));
        assert_eq!(webhook_task_id(&json!({ "event": "taskUpdated" })), None);
    }

    #[test]
    fn refresh_all_dedups_and_attaches_comments() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path().join("s.db")).unwrap();
        let cfg = config(&[("sra.sra_kickoff.date", "cf-kick")]);
        let mut source = FakeSource::with_tasks(vec![
            task("t1", "001", "complete", 1_740_000_000_000, &[]),
            task("t2", "001", "in progress", 1_700_000_000_000, &[("cf-kick", 1_741_003_200_000)]),
            task("t3", "002", "in progress", 1_740_000_000_000, &[]),
            task("t4", "", "in progress", 1_740_000_000_000, &[]),
        ]);
        source.comments.insert("t2".into(), "Waiting on policies".into());

        let written = Syncer::new(&source, &store, &cfg).refresh_all().unwrap();
        assert_eq!(written, 2);

        let stored = store.get_client_status("001").unwrap().unwrap();
        assert_eq!(stored.task_id, "t2");
        assert_eq!(stored.metric("sra.sra_kickoff.date"), "03/03/2025");
        assert_eq!(stored.metric("project.next_steps"), "Waiting on policies");

        let newest = store.get_client_status("002").unwrap().unwrap().source_updated_at;
        assert_eq!(store.max_source_updated_at().unwrap(), Some(newest));
    }

    #[test]
    fn refresh_all_writes_nothing_when_upstream_fails() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path().join("s.db")).unwrap();
        let cfg = config(&[]);
        let source = FakeSource {
            offline: true,
            ..FakeSource::with_tasks(vec![task("t1", "001", "open", 0, &[])])
        };
        assert!(matches!(
            Syncer::new(&source, &store, &cfg).refresh_all(),
            Err(SyncError::Upstream(_))
        ));
        assert!(store.list_client_statuses().unwrap().is_empty());
    }

    #[test]
    fn refresh_client_requires_known_client() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path().join("s.db")).unwrap();
        let cfg = config(&[]);
        let source = FakeSource::with_tasks(vec![task("t1", "001", "open", 0, &[])]);
        let syncer = Syncer::new(&source, &store, &cfg);

        assert!(!syncer.refresh_client("001").unwrap());
        syncer.refresh_all().unwrap();
        assert!(syncer.refresh_client("001").unwrap());
    }

    #[test]
    fn webhook_outcomes() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path().join("s.db")).unwrap();
        let cfg = config(&[]);
        let source = FakeSource::with_tasks(vec![
            task("t1", "001", "open", 0, &[]),
            task("t2", "", "open", 0, &[]),
        ]);
        let syncer = Syncer::new(&source, &store, &cfg);

        assert_eq!(
            syncer.handle_webhook(&json!({})).unwrap(),
            WebhookOutcome::Ignored(IgnoreReason::MissingTaskId)
        );
        assert_eq!(
            syncer.handle_webhook(&json!({ "task_id": "t2" })).unwrap(),
            WebhookOutcome::Ignored(IgnoreReason::MissingSfId)
        );
        assert_eq!(
            syncer.handle_webhook(&json!({ "task": { "id": "t1" } })).unwrap(),
            WebhookOutcome::Updated { sf_id: "001".into() }
        );
        assert!(store.get_client_status("001").unwrap().is_some());
    }
}
