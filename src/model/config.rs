use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Runtime configuration, loaded once at startup and passed around immutably
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub clickup: ClickUpConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Metric key → ClickUp custom field id. Only mapped keys are writable.
    #[serde(default)]
    pub field_map: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickUpConfig {
    pub api_token: String,
    pub list_id: String,
    /// Custom field holding the CRM id that identifies a client
    pub sf_id_field_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret for signing client status links
    pub client_link_secret: String,
    /// Empty means admin routes are open
    #[serde(default)]
    pub admin_api_key: String,
    /// Empty means the webhook is open
    #[serde(default)]
    pub webhook_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            database_path: default_database_path(),
            port: default_port(),
        }
    }
}

fn default_database_path() -> String {
    "client_status.db".to_string()
}

fn default_port() -> u16 {
    8080
}

impl AppConfig {
    /// Whether `metric_key` maps to a writable ClickUp field.
    pub fn is_writable(&self, metric_key: &str) -> bool {
        !metric_key.is_empty() && self.field_map.contains_key(metric_key)
    }
}
