use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Dotted metric key → string value, in source order
pub type Metrics = IndexMap<String, String>;

/// Mirrored status of one client's project task
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientStatus {
    /// CRM identifier; unique per row
    pub sf_id: String,
    pub task_id: String,
    pub task_name: String,
    /// Raw status text from the task tracker
    pub task_status: String,
    /// Whether the tracker reports the status as closed. Only used while
    /// collapsing duplicate tasks; not persisted.
    #[serde(skip)]
    pub task_closed: bool,
    pub task_url: String,
    pub task_created_at: String,
    pub task_closed_at: String,
    /// Every workflow field, keyed `<section>.<step>.<field>` or `project.<field>`
    pub metrics: Metrics,
    pub source_updated_at: String,
    pub synced_at: String,
}

impl ClientStatus {
    /// Display name used as the default owner of client-side steps.
    pub fn display_name(&self) -> &str {
        let name = self.task_name.trim();
        if name.is_empty() { "Not assigned" } else { name }
    }

    pub fn metric(&self, key: &str) -> &str {
        self.metrics.get(key).map(String::as_str).unwrap_or("")
    }
}

/// Staff edits layered over the computed schedule for one client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientOverrides {
    /// step slug → ECD override (`MM/DD/YYYY`)
    pub ecd: IndexMap<String, String>,
    /// step slug → anchor on ACD (true) or ECD (false)
    pub anchor_on_acd: IndexMap<String, bool>,
}

/// One row of the append-only edit audit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditLogEntry {
    pub logged_at: String,
    pub sf_id: String,
    pub task_id: String,
    pub field_key: String,
    pub old_value: String,
    pub new_value: String,
    pub source: String,
}
