use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::model::config::{AppConfig, AuthConfig, ClickUpConfig, ServerConfig};

pub const CONFIG_FILE_NAME: &str = "statusboard.toml";

/// Error type for loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("CLICKUP_FIELD_MAP_JSON must be a JSON object: {0}")]
    FieldMap(String),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse config file: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// The TOML file mirrors `AppConfig`, but every value is optional so the
/// environment can fill the gaps.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    clickup: FileClickUp,
    auth: FileAuth,
    server: FileServer,
    field_map: IndexMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileClickUp {
    api_token: Option<String>,
    list_id: Option<String>,
    sf_id_field_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileAuth {
    client_link_secret: Option<String>,
    admin_api_key: Option<String>,
    webhook_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileServer {
    database_path: Option<String>,
    port: Option<u16>,
}

/// Walk up from `start` looking for `statusboard.toml`.
pub fn discover_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let candidate = current.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Load configuration from the TOML file (explicit path, or discovered from
/// the working directory), then `.env`, then the process environment.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let cwd = std::env::current_dir().map_err(|e| ConfigError::ReadError {
        path: PathBuf::from("."),
        source: e,
    })?;

    let file_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => discover_config_file(&cwd),
    };
    let file_text = match &file_path {
        Some(p) => Some(read_file(p)?),
        None => None,
    };

    let dotenv_path = cwd.join(".env");
    let dotenv = if dotenv_path.is_file() {
        parse_dotenv(&read_file(&dotenv_path)?)
    } else {
        HashMap::new()
    };

    let env: HashMap<String, String> = std::env::vars().collect();
    let config = resolve_config(file_text.as_deref(), &merge_env(dotenv, env))?;
    tracing::debug!(
        file = ?file_path,
        fields = config.field_map.len(),
        "loaded configuration"
    );
    Ok(config)
}

/// `.env` values only fill variables the environment does not already set.
fn merge_env(dotenv: HashMap<String, String>, env: HashMap<String, String>) -> HashMap<String, String> {
    let mut vars = dotenv;
    vars.extend(env);
    vars
}

/// Parse `KEY=VALUE` lines. Comments, blank lines and lines without `=` are
/// skipped; matching surrounding quotes are stripped.
pub fn parse_dotenv(text: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        vars.insert(key.to_string(), strip_quotes(value.trim()).to_string());
    }
    vars
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Parse the field map JSON. Entries with a blank label or field id are dropped.
pub fn parse_field_map(raw: &str) -> Result<IndexMap<String, String>, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(IndexMap::new());
    }
    let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| ConfigError::FieldMap(e.to_string()))?;
    let serde_json::Value::Object(entries) = value else {
        return Err(ConfigError::FieldMap(format!("got {value}")));
    };
    Ok(clean_field_map(entries.into_iter().map(|(label, id)| {
        let id = match id {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        (label, id)
    })))
}

fn clean_field_map(entries: impl IntoIterator<Item = (String, String)>) -> IndexMap<String, String> {
    entries
        .into_iter()
        .map(|(label, id)| (label.trim().to_string(), id.trim().to_string()))
        .filter(|(label, id)| !label.is_empty() && !id.is_empty())
        .collect()
}

/// Environment value if set and non-blank, else the file value.
fn pick(vars: &HashMap<String, String>, name: &str, file: Option<String>) -> Option<String> {
    vars.get(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| file.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()))
}

fn require(vars: &HashMap<String, String>, name: &'static str, file: Option<String>) -> Result<String, ConfigError> {
    pick(vars, name, file).ok_or(ConfigError::Missing(name))
}

fn resolve_config(file_text: Option<&str>, vars: &HashMap<String, String>) -> Result<AppConfig, ConfigError> {
    let file: FileConfig = match file_text {
        Some(text) => toml::from_str(text)?,
        None => FileConfig::default(),
    };

    let port = match vars.get("PORT").map(|v| v.trim()).filter(|v| !v.is_empty()) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            name: "PORT",
            value: raw.to_string(),
        })?,
        None => file.server.port.unwrap_or(ServerConfig::default().port),
    };

    let field_map = match vars.get("CLICKUP_FIELD_MAP_JSON").filter(|v| !v.trim().is_empty()) {
        Some(raw) => parse_field_map(raw)?,
        None => clean_field_map(file.field_map),
    };

    Ok(AppConfig {
        clickup: ClickUpConfig {
            api_token: require(vars, "CLICKUP_API_TOKEN", file.clickup.api_token)?,
            list_id: require(vars, "CLICKUP_LIST_ID", file.clickup.list_id)?,
            sf_id_field_id: require(vars, "CLICKUP_SF_ID_FIELD_ID", file.clickup.sf_id_field_id)?,
        },
        auth: AuthConfig {
            client_link_secret: require(vars, "CLIENT_LINK_SECRET", file.auth.client_link_secret)?,
            admin_api_key: pick(vars, "ADMIN_API_KEY", file.auth.admin_api_key).unwrap_or_default(),
            webhook_token: pick(vars, "WEBHOOK_TOKEN", file.auth.webhook_token).unwrap_or_default(),
        },
        server: ServerConfig {
            database_path: pick(vars, "DATABASE_PATH", file.server.database_path)
                .unwrap_or_else(|| ServerConfig::default().database_path),
            port,
        },
        field_map,
    })
}
