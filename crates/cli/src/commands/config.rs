use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use collaborator_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str| {
        field_source(key_path, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let fields = effective_fields(&config);
    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(fields.iter().map(|(key, value)| render_line(key, value, source(key))));
    lines.join("\n")
}

/// Every inspectable key with its rendered value. Secrets are redacted.
fn effective_fields(config: &AppConfig) -> Vec<(&'static str, String)> {
    vec![
        ("database.url", config.database.url.clone()),
        ("database.max_connections", config.database.max_connections.to_string()),
        ("database.timeout_secs", config.database.timeout_secs.to_string()),
        ("teams.app_id", or_unset(&config.teams.app_id)),
        ("teams.app_password", redact_secret(Some(&config.teams.app_password))),
        ("teams.tenant_id", or_unset(config.teams.tenant_id.as_deref().unwrap_or_default())),
        ("llm.provider", config.llm.provider.as_str().to_string()),
        ("llm.api_key", redact_secret(config.llm.api_key.as_ref())),
        ("llm.base_url", or_unset(config.llm.base_url.as_deref().unwrap_or_default())),
        ("llm.api_version", or_unset(config.llm.api_version.as_deref().unwrap_or_default())),
        ("llm.manager_model", config.llm.manager_model.clone()),
        ("llm.capability_model", config.llm.capability_model.clone()),
        ("llm.timeout_secs", config.llm.timeout_secs.to_string()),
        ("agent.dispatch", config.agent.dispatch.as_str().to_string()),
        ("agent.default_window_hours", config.agent.default_window_hours.to_string()),
        ("agent.max_search_results", config.agent.max_search_results.to_string()),
        ("agent.max_tool_rounds", config.agent.max_tool_rounds.to_string()),
        ("server.bind_address", config.server.bind_address.clone()),
        ("server.port", config.server.port.to_string()),
        ("server.health_check_port", config.server.health_check_port.to_string()),
        ("server.graceful_shutdown_secs", config.server.graceful_shutdown_secs.to_string()),
        ("logging.level", config.logging.level.clone()),
        ("logging.format", format!("{:?}", config.logging.format).to_lowercase()),
    ]
}

/// `database.max_connections` is read from `COLLABORATOR_DATABASE_MAX_CONNECTIONS`.
fn env_key(key_path: &str) -> String {
    format!("COLLABORATOR_{}", key_path.replace('.', "_").to_uppercase())
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    let env_key = env_key(key_path);
    if env::var_os(&env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn or_unset(value: &str) -> String {
    if value.trim().is_empty() {
        "<unset>".to_string()
    } else {
        value.to_string()
    }
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    match secret.map(|secret| secret.expose_secret().trim().is_empty()) {
        Some(false) => "<redacted>".to_string(),
        _ => "<unset>".to_string(),
    }
}
