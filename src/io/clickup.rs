//! ClickUp REST client and task normalization.
//!
//! Uses `reqwest::blocking` with the personal API token in the
//! `Authorization` header. All requests target `https://api.clickup.com/api/v2`.

use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::model::client::{ClientStatus, Metrics};
use crate::util::dates::{epoch_ms_to_rfc3339, epoch_ms_to_us_date};

const CLICKUP_API_URL: &str = "https://api.clickup.com/api/v2";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(25);

/// Error type for task-tracker calls
#[derive(Debug, thiserror::Error)]
pub enum ClickUpError {
    #[error("ClickUp request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("ClickUp API error {status}: {body}")]
    Status { status: u16, body: String },
}

/// A task as returned by the ClickUp API. Only the fields we read.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: Option<TaskState>,
    #[serde(default)]
    pub url: String,
    /// Epoch milliseconds, sent as strings
    #[serde(default)]
    pub date_created: Option<Value>,
    #[serde(default)]
    pub date_closed: Option<Value>,
    #[serde(default)]
    pub date_done: Option<Value>,
    #[serde(default)]
    pub date_updated: Option<Value>,
    #[serde(default)]
    pub custom_fields: Vec<CustomField>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TaskState {
    #[serde(default)]
    pub status: String,
    /// `open`, `custom`, `done` or `closed`
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CustomField {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub type_config: Option<TypeConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TypeConfig {
    #[serde(default)]
    pub options: Vec<DropdownOption>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DropdownOption {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub orderindex: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TaskPage {
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    last_page: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct CommentList {
    #[serde(default)]
    comments: Vec<Comment>,
}

#[derive(Debug, Deserialize)]
struct Comment {
    #[serde(default)]
    date: Option<Value>,
    #[serde(default)]
    comment_text: String,
}

/// The task-tracker operations the sync and edit flows depend on
pub trait TaskSource {
    /// Every task in a list, closed ones and subtasks included.
    fn fetch_tasks_for_list(&self, list_id: &str) -> Result<Vec<Task>, ClickUpError>;
    fn fetch_task_by_id(&self, task_id: &str) -> Result<Task, ClickUpError>;
    /// Text of the newest comment, or empty.
    fn fetch_latest_task_comment(&self, task_id: &str) -> Result<String, ClickUpError>;
    /// Set a custom field; `Value::Null` clears it.
    fn set_custom_field(&self, task_id: &str, field_id: &str, value: Value) -> Result<(), ClickUpError>;
}

pub struct ClickUpClient {
    http: reqwest::blocking::Client,
    api_token: String,
}

impl ClickUpClient {
    pub fn new(api_token: &str) -> Result<Self, ClickUpError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_token: api_token.to_string(),
        })
    }

    fn get<T: serde::de::DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ClickUpError> {
        let resp = self
            .http
            .get(format!("{CLICKUP_API_URL}{path}"))
            .header("Authorization", &self.api_token)
            .query(query)
            .send()?;
        Ok(check_status(resp)?.json()?)
    }
}

fn check_status(resp: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, ClickUpError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(ClickUpError::Status {
        status: status.as_u16(),
        body,
    })
}

impl TaskSource for ClickUpClient {
    fn fetch_tasks_for_list(&self, list_id: &str) -> Result<Vec<Task>, ClickUpError> {
        let mut tasks = Vec::new();
        let mut page = 0u32;
        loop {
            let data: TaskPage = self.get(
                &format!("/list/{list_id}/task"),
                &[
                    ("page", page.to_string()),
                    ("subtasks", "true".to_string()),
                    ("include_closed", "true".to_string()),
                ],
            )?;
            let empty = data.tasks.is_empty();
            tasks.extend(data.tasks);
            tracing::debug!(page, total = tasks.len(), "fetched task page");
            if data.last_page == Some(true) || empty {
                break;
            }
            page += 1;
        }
        Ok(tasks)
    }

    fn fetch_task_by_id(&self, task_id: &str) -> Result<Task, ClickUpError> {
        self.get(&format!("/task/{task_id}"), &[])
    }

    fn fetch_latest_task_comment(&self, task_id: &str) -> Result<String, ClickUpError> {
        let list: CommentList = self.get(&format!("/task/{task_id}/comment"), &[])?;
        Ok(latest_comment_text(&list.comments))
    }

    fn set_custom_field(&self, task_id: &str, field_id: &str, value: Value) -> Result<(), ClickUpError> {
        let resp = self
            .http
            .post(format!("{CLICKUP_API_URL}/task/{task_id}/field/{field_id}"))
            .header("Authorization", &self.api_token)
            .json(&serde_json::json!({ "value": value }))
            .send()?;
        check_status(resp)?;
        Ok(())
    }
}

fn latest_comment_text(comments: &[Comment]) -> String {
    comments
        .iter()
        .max_by_key(|c| c.date.as_ref().and_then(value_ms).unwrap_or(0))
        .map(|c| c.comment_text.trim().to_string())
        .unwrap_or_default()
}

/// Scalar JSON as display text; null is empty.
fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Epoch milliseconds from a string or number.
fn value_ms(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn ms_to_rfc3339(value: Option<&Value>) -> String {
    value
        .and_then(value_ms)
        .filter(|ms| *ms != 0)
        .and_then(epoch_ms_to_rfc3339)
        .unwrap_or_default()
}

pub fn custom_field<'t>(task: &'t Task, field_id: &str) -> Option<&'t CustomField> {
    task.custom_fields.iter().find(|f| f.id == field_id)
}

fn format_dropdown(field: &CustomField, value: &Value) -> String {
    let wanted = value_text(value);
    let options = field.type_config.as_ref().map(|c| c.options.as_slice()).unwrap_or(&[]);
    options
        .iter()
        .find(|o| {
            o.id.as_ref().is_some_and(|id| value_text(id) == wanted)
                || o.orderindex.as_ref().is_some_and(|ix| value_text(ix) == wanted)
        })
        .map(|o| o.name.clone())
        .unwrap_or(wanted)
}

/// Render a custom field value the way the dashboard shows it.
pub fn format_custom_field(field: Option<&CustomField>) -> String {
    let Some(field) = field else {
        return String::new();
    };
    let Some(value) = field.value.as_ref().filter(|v| !v.is_null()) else {
        return String::new();
    };
    if value.as_str() == Some("") {
        return String::new();
    }

    match field.kind.as_str() {
        "date" => value_ms(value).and_then(epoch_ms_to_us_date).unwrap_or_default(),
        "drop_down" => format_dropdown(field, value),
        _ => match value {
            Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(", "),
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| format!("{k}: {}", value_text(v)))
                .collect::<Vec<_>>()
                .join("; "),
            scalar => value_text(scalar),
        },
    }
}

/// Map a raw task onto a client row. `None` when the CRM id field is blank.
pub fn normalize_task(task: &Task, sf_id_field_id: &str, field_map: &IndexMap<String, String>) -> Option<ClientStatus> {
    let sf_id = custom_field(task, sf_id_field_id)
        .and_then(|f| f.value.as_ref())
        .map(|v| value_text(v).trim().to_string())
        .filter(|id| !id.is_empty())?;

    let metrics: Metrics = field_map
        .iter()
        .map(|(label, field_id)| (label.clone(), format_custom_field(custom_field(task, field_id))))
        .collect();

    let state = task.status.clone().unwrap_or_default();
    let closed_ms = task
        .date_closed
        .as_ref()
        .filter(|v| value_ms(v).is_some_and(|ms| ms != 0))
        .or(task.date_done.as_ref());

    Some(ClientStatus {
        sf_id,
        task_id: task.id.clone(),
        task_name: task.name.clone(),
        task_status: state.status,
        task_closed: state.kind == "closed",
        task_url: task.url.clone(),
        task_created_at: ms_to_rfc3339(task.date_created.as_ref()),
        task_closed_at: ms_to_rfc3339(closed_ms),
        metrics,
        source_updated_at: ms_to_rfc3339(task.date_updated.as_ref()),
        synced_at: String::new(),
    })
}
