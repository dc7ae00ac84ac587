use std::cell::RefCell;
use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::{Value, json};

use crate::io::clickup::{ClickUpError, CustomField, Task, TaskSource};
use crate::model::config::{AppConfig, AuthConfig, ClickUpConfig, ServerConfig};

pub const SF_FIELD: &str = "cf-sf";

/// In-memory task tracker. Field writes are applied to the stored tasks so a
/// re-fetch sees them.
#[derive(Default)]
pub struct FakeSource {
    pub tasks: RefCell<Vec<Task>>,
    pub comments: HashMap<String, String>,
    pub writes: RefCell<Vec<(String, String, Value)>>,
    pub offline: bool,
}

impl FakeSource {
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        FakeSource {
            tasks: RefCell::new(tasks),
            ..Default::default()
        }
    }

    fn check_online(&self) -> Result<(), ClickUpError> {
        if self.offline {
            return Err(ClickUpError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(())
    }
}

impl TaskSource for FakeSource {
    fn fetch_tasks_for_list(&self, _list_id: &str) -> Result<Vec<Task>, ClickUpError> {
        self.check_online()?;
        Ok(self.tasks.borrow().clone())
    }

    fn fetch_task_by_id(&self, task_id: &str) -> Result<Task, ClickUpError> {
        self.check_online()?;
        self.tasks
            .borrow()
            .iter()
            .find(|t| t.id == task_id)
            .cloned()
            .ok_or(ClickUpError::Status {
                status: 404,
                body: format!("no task {task_id}"),
            })
    }

    fn fetch_latest_task_comment(&self, task_id: &str) -> Result<String, ClickUpError> {
        self.check_online()?;
        Ok(self.comments.get(task_id).cloned().unwrap_or_default())
    }

    fn set_custom_field(&self, task_id: &str, field_id: &str, value: Value) -> Result<(), ClickUpError> {
        self.check_online()?;
        self.writes
            .borrow_mut()
            .push((task_id.to_string(), field_id.to_string(), value.clone()));
        let mut tasks = self.tasks.borrow_mut();
        if let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) {
            let stored = if value.is_null() { None } else { Some(json!(value.to_string())) };
            match task.custom_fields.iter_mut().find(|f| f.id == field_id) {
                Some(field) => field.value = stored,
                None => task.custom_fields.push(CustomField {
                    id: field_id.to_string(),
                    kind: "date".into(),
                    value: stored,
                    type_config: None,
                }),
            }
        }
        Ok(())
    }
}

/// A task carrying `sf_id` and date fields given as epoch ms.
pub fn task(id: &str, sf_id: &str, status: &str, updated_ms: i64, dates: &[(&str, i64)]) -> Task {
    let mut fields = vec![json!({ "id": SF_FIELD, "type": "short_text", "value": sf_id })];
    for (field_id, ms) in dates {
        fields.push(json!({ "id": field_id, "type": "date", "value": ms.to_string() }));
    }
    serde_json::from_value(json!({
        "id": id,
        "name": format!("Client {sf_id}"),
        "status": { "status": status, "type": if status == "complete" { "closed" } else { "custom" } },
        "url": format!("https://app.clickup.com/t/{id}"),
        "date_created": "1740830400000",
        "date_updated": updated_ms.to_string(),
        "custom_fields": fields
    }))
    .unwrap_or_default()
}

pub fn config(field_map: &[(&str, &str)]) -> AppConfig {
    AppConfig {
        clickup: ClickUpConfig {
            api_token: "pk_test".into(),
            list_id: "list-1".into(),
            sf_id_field_id: SF_FIELD.into(),
        },
        auth: AuthConfig {
            client_link_secret: "secret".into(),
            admin_api_key: String::new(),
            webhook_token: String::new(),
        },
        server: ServerConfig::default(),
        field_map: field_map
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<IndexMap<_, _>>(),
    }
}
