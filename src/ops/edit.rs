use serde_json::Value;

use crate::io::clickup::{ClickUpError, TaskSource};
use crate::io::store::{Store, StoreError};
use crate::model::client::EditLogEntry;
use crate::model::config::AppConfig;
use crate::model::step::Track;
use crate::ops::dashboard::override_slug;
use crate::ops::sync::{SyncError, Syncer};
use crate::parse::metric_keys::{FieldLabel, field_label};
use crate::util::dates::{format_us_date, parse_ymd, utc_now_rfc3339, ymd_to_epoch_ms_noon};

pub const SOURCE_CLICKUP: &str = "admin_update_clickup";
pub const SOURCE_OVERRIDE: &str = "admin_update_override";

/// Error type for staff date edits
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("either metric_key or override_key is required")]
    MissingKey,
    #[error("no client with sf_id {0}")]
    UnknownClient(String),
    #[error("{0} is not an editable field")]
    NotEditable(String),
    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error(transparent)]
    Upstream(#[from] ClickUpError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<SyncError> for EditError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Upstream(e) => EditError::Upstream(e),
            SyncError::Store(e) => EditError::Store(e),
        }
    }
}

/// A single date change submitted from the dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditRequest {
    pub metric_key: String,
    pub override_key: String,
    /// `YYYY-MM-DD`; blank clears the date
    pub value: String,
    /// For ACD edits: whether later steps should anchor on the ACD
    pub use_acd: Option<bool>,
}

/// Step slug when `metric_key` is a track step's ACD field.
fn acd_step_slug(metric_key: &str) -> Option<String> {
    let parts: Vec<&str> = metric_key.split('.').collect();
    if parts.len() < 3 || Track::from_section(&parts[0].trim().to_lowercase()).is_none() {
        return None;
    }
    (field_label(parts[2]) == FieldLabel::Acd).then(|| parts[1].trim().to_lowercase())
}

/// Apply one edit: write the date to the task tracker (mapped metric keys) or
/// to the local override table (override keys), then append to the edit log.
pub fn apply_edit<S: TaskSource + ?Sized>(
    source: &S,
    store: &Store,
    config: &AppConfig,
    sf_id: &str,
    request: &EditRequest,
) -> Result<EditLogEntry, EditError> {
    let metric_key = request.metric_key.trim();
    let override_key = request.override_key.trim();
    if metric_key.is_empty() && override_key.is_empty() {
        return Err(EditError::MissingKey);
    }

    let value = request.value.trim();
    let date = match value {
        "" => None,
        v => Some(parse_ymd(v).ok_or_else(|| EditError::InvalidDate(v.to_string()))?),
    };
    let new_value = date.map(format_us_date).unwrap_or_default();

    let Some(status) = store.get_client_status(sf_id)? else {
        return Err(EditError::UnknownClient(sf_id.to_string()));
    };

    let (field_key, old_value, source_tag) = if let Some(field_id) = config.field_map.get(metric_key) {
        let old_value = status.metric(metric_key).to_string();
        let payload = ymd_to_epoch_ms_noon(value).map(Value::from).unwrap_or(Value::Null);
        source.set_custom_field(&status.task_id, field_id, payload)?;
        Syncer::new(source, store, config).sync_task(&status.task_id)?;

        if let Some(use_acd) = request.use_acd
            && let Some(slug) = acd_step_slug(metric_key)
        {
            store.set_anchor_preference(sf_id, &slug, use_acd)?;
        }
        (metric_key, old_value, SOURCE_CLICKUP)
    } else if let Some(slug) = override_slug(override_key) {
        let old_value = store.get_ecd_overrides(sf_id)?.get(slug).cloned().unwrap_or_default();
        store.upsert_ecd_override(sf_id, slug, &new_value)?;
        (override_key, old_value, SOURCE_OVERRIDE)
    } else {
        let key = if metric_key.is_empty() { override_key } else { metric_key };
        return Err(EditError::NotEditable(key.to_string()));
    };

    let entry = EditLogEntry {
        logged_at: utc_now_rfc3339(),
        sf_id: sf_id.to_string(),
        task_id: status.task_id.clone(),
        field_key: field_key.to_string(),
        old_value,
        new_value,
        source: source_tag.to_string(),
    };
    store.log_edit(&entry)?;
    tracing::info!(
        sf_id,
        field = %entry.field_key,
        old = %entry.old_value,
        new = %entry.new_value,
        source = %entry.source,
        "date edited"
    );
    Ok(entry)
}
