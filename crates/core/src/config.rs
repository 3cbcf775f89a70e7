use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "collaborator.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub teams: TeamsConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Bot Framework credentials. An empty `app_id` runs the connector anonymously,
/// which is what the local emulator expects.
#[derive(Clone, Debug)]
pub struct TeamsConfig {
    pub app_id: String,
    pub app_password: SecretString,
    pub tenant_id: Option<String>,
}

impl TeamsConfig {
    pub fn is_anonymous(&self) -> bool {
        self.app_id.trim().is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub api_version: Option<String>,
    pub manager_model: String,
    pub capability_model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub dispatch: DispatchMode,
    pub default_window_hours: i64,
    pub max_search_results: u32,
    pub max_tool_rounds: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "azure_openai")]
    AzureOpenAi,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::AzureOpenAi => "azure_openai",
        }
    }
}

/// How the manager picks a capability for a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// The manager model calls `delegate_to_<name>` functions itself.
    Delegation,
    /// Deterministic keyword routing.
    Keyword,
    /// One-shot model classification followed by direct delegation.
    LlmRouter,
}

impl DispatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delegation => "delegation",
            Self::Keyword => "keyword",
            Self::LlmRouter => "llm_router",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_api_key: Option<String>,
    pub manager_model: Option<String>,
    pub capability_model: Option<String>,
    pub dispatch: Option<DispatchMode>,
    pub teams_app_id: Option<String>,
    pub teams_app_password: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://collaborator.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            teams: TeamsConfig {
                app_id: String::new(),
                app_password: String::new().into(),
                tenant_id: None,
            },
            llm: LlmConfig {
                provider: LlmProvider::OpenAi,
                api_key: None,
                base_url: None,
                api_version: None,
                manager_model: "gpt-4o-mini".to_string(),
                capability_model: "gpt-4o".to_string(),
                timeout_secs: 60,
            },
            agent: AgentConfig {
                dispatch: DispatchMode::Delegation,
                default_window_hours: 24,
                max_search_results: 5,
                max_tool_rounds: 8,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3978,
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "azure_openai" | "azure" => Ok(Self::AzureOpenAi),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|azure_openai)"
            ))),
        }
    }
}

impl std::str::FromStr for DispatchMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "delegation" => Ok(Self::Delegation),
            "keyword" => Ok(Self::Keyword),
            "llm_router" => Ok(Self::LlmRouter),
            other => Err(ConfigError::Validation(format!(
                "unsupported agent.dispatch `{other}` (expected delegation|keyword|llm_router)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(teams) = patch.teams {
            if let Some(app_id) = teams.app_id {
                self.teams.app_id = app_id;
            }
            if let Some(app_password) = teams.app_password {
                self.teams.app_password = secret_value(app_password);
            }
            if let Some(tenant_id) = teams.tenant_id {
                self.teams.tenant_id = Some(tenant_id);
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(api_version) = llm.api_version {
                self.llm.api_version = Some(api_version);
            }
            if let Some(manager_model) = llm.manager_model {
                self.llm.manager_model = manager_model;
            }
            if let Some(capability_model) = llm.capability_model {
                self.llm.capability_model = capability_model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(dispatch) = agent.dispatch {
                self.agent.dispatch = dispatch;
            }
            if let Some(default_window_hours) = agent.default_window_hours {
                self.agent.default_window_hours = default_window_hours;
            }
            if let Some(max_search_results) = agent.max_search_results {
                self.agent.max_search_results = max_search_results;
            }
            if let Some(max_tool_rounds) = agent.max_tool_rounds {
                self.agent.max_tool_rounds = max_tool_rounds;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("COLLABORATOR_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("COLLABORATOR_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("COLLABORATOR_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("COLLABORATOR_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("COLLABORATOR_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("COLLABORATOR_TEAMS_APP_ID") {
            self.teams.app_id = value;
        }
        if let Some(value) = read_env("COLLABORATOR_TEAMS_APP_PASSWORD") {
            self.teams.app_password = secret_value(value);
        }
        if let Some(value) = read_env("COLLABORATOR_TEAMS_TENANT_ID") {
            self.teams.tenant_id = Some(value);
        }

        if let Some(value) = read_env("COLLABORATOR_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("COLLABORATOR_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("COLLABORATOR_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("COLLABORATOR_LLM_API_VERSION") {
            self.llm.api_version = Some(value);
        }
        if let Some(value) = read_env("COLLABORATOR_LLM_MANAGER_MODEL") {
            self.llm.manager_model = value;
        }
        if let Some(value) = read_env("COLLABORATOR_LLM_CAPABILITY_MODEL") {
            self.llm.capability_model = value;
        }
        if let Some(value) = read_env("COLLABORATOR_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("COLLABORATOR_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("COLLABORATOR_AGENT_DISPATCH") {
            self.agent.dispatch = value.parse()?;
        }
        if let Some(value) = read_env("COLLABORATOR_AGENT_DEFAULT_WINDOW_HOURS") {
            self.agent.default_window_hours =
                parse_i64("COLLABORATOR_AGENT_DEFAULT_WINDOW_HOURS", &value)?;
        }
        if let Some(value) = read_env("COLLABORATOR_AGENT_MAX_SEARCH_RESULTS") {
            self.agent.max_search_results =
                parse_u32("COLLABORATOR_AGENT_MAX_SEARCH_RESULTS", &value)?;
        }
        if let Some(value) = read_env("COLLABORATOR_AGENT_MAX_TOOL_ROUNDS") {
            self.agent.max_tool_rounds = parse_u32("COLLABORATOR_AGENT_MAX_TOOL_ROUNDS", &value)?;
        }

        if let Some(value) = read_env("COLLABORATOR_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        let port = read_env("COLLABORATOR_SERVER_PORT").or_else(|| read_env("PORT"));
        if let Some(value) = port {
            self.server.port = parse_u16("COLLABORATOR_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("COLLABORATOR_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("COLLABORATOR_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("COLLABORATOR_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("COLLABORATOR_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("COLLABORATOR_LOGGING_LEVEL")
            .or_else(|| read_env("COLLABORATOR_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("COLLABORATOR_LOGGING_FORMAT")
            .or_else(|| read_env("COLLABORATOR_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(manager_model) = overrides.manager_model {
            self.llm.manager_model = manager_model;
        }
        if let Some(capability_model) = overrides.capability_model {
            self.llm.capability_model = capability_model;
        }
        if let Some(dispatch) = overrides.dispatch {
            self.agent.dispatch = dispatch;
        }
        if let Some(app_id) = overrides.teams_app_id {
            self.teams.app_id = app_id;
        }
        if let Some(app_password) = overrides.teams_app_password {
            self.teams.app_password = secret_value(app_password);
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_teams(&self.teams)?;
        validate_llm(&self.llm)?;
        validate_agent(&self.agent)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_teams(teams: &TeamsConfig) -> Result<(), ConfigError> {
    if teams.is_anonymous() {
        return Ok(());
    }

    if teams.app_password.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "teams.app_password is required when teams.app_id is set. \
             Create a client secret for the bot's app registration"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    let missing_key =
        llm.api_key.as_ref().map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true);
    if missing_key {
        return Err(ConfigError::Validation(format!(
            "llm.api_key is required for the {} provider",
            llm.provider.as_str()
        )));
    }

    if llm.manager_model.trim().is_empty() || llm.capability_model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.manager_model and llm.capability_model must not be empty".to_string(),
        ));
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if llm.provider == LlmProvider::AzureOpenAi {
        let missing_endpoint =
            llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
        if missing_endpoint {
            return Err(ConfigError::Validation(
                "llm.base_url is required for the azure_openai provider".to_string(),
            ));
        }
        let missing_version =
            llm.api_version.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
        if missing_version {
            return Err(ConfigError::Validation(
                "llm.api_version is required for the azure_openai provider".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.default_window_hours <= 0 || agent.default_window_hours > 24 * 366 {
        return Err(ConfigError::Validation(
            "agent.default_window_hours must be in range 1..=8784".to_string(),
        ));
    }

    if agent.max_search_results == 0 || agent.max_search_results > 50 {
        return Err(ConfigError::Validation(
            "agent.max_search_results must be in range 1..=50".to_string(),
        ));
    }

    if agent.max_tool_rounds == 0 || agent.max_tool_rounds > 32 {
        return Err(ConfigError::Validation(
            "agent.max_tool_rounds must be in range 1..=32".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    teams: Option<TeamsPatch>,
    llm: Option<LlmPatch>,
    agent: Option<AgentPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TeamsPatch {
    app_id: Option<String>,
    app_password: Option<String>,
    tenant_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    api_version: Option<String>,
    manager_model: Option<String>,
    capability_model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    dispatch: Option<DispatchMode>,
    default_window_hours: Option<i64>,
    max_search_results: Option<u32>,
    max_tool_rounds: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, DispatchMode, LlmProvider, LoadOptions, LogFormat,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_COLLABORATOR_OPENAI_KEY", "sk-from-env");
        env::set_var("TEST_COLLABORATOR_BOT_PASSWORD", "bot-secret-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("collaborator.toml");
            fs::write(
                &path,
                r#"
[teams]
app_id = "00000000-0000-0000-0000-000000000001"
app_password = "${TEST_COLLABORATOR_BOT_PASSWORD}"

[llm]
api_key = "${TEST_COLLABORATOR_OPENAI_KEY}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let api_key = config.llm.api_key.as_ref().map(|key| key.expose_secret().to_string());
            ensure(api_key.as_deref() == Some("sk-from-env"), "api key should come from env")?;
            ensure(
                config.teams.app_password.expose_secret() == "bot-secret-from-env",
                "bot password should come from env",
            )?;
            ensure(!config.teams.is_anonymous(), "app id from file should disable anonymous mode")?;
            Ok(())
        })();

        clear_vars(&["TEST_COLLABORATOR_OPENAI_KEY", "TEST_COLLABORATOR_BOT_PASSWORD"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("COLLABORATOR_LLM_API_KEY", "sk-test");
        env::set_var("COLLABORATOR_LOG_LEVEL", "warn");
        env::set_var("COLLABORATOR_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&[
            "COLLABORATOR_LLM_API_KEY",
            "COLLABORATOR_LOG_LEVEL",
            "COLLABORATOR_LOG_FORMAT",
        ]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("COLLABORATOR_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("COLLABORATOR_AGENT_DISPATCH", "keyword");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("collaborator.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[llm]
api_key = "sk-from-file"
manager_model = "gpt-4.1-mini"

[agent]
dispatch = "llm_router"
max_search_results = 10

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.agent.dispatch == DispatchMode::Keyword,
                "env dispatch mode should win over file",
            )?;
            ensure(config.agent.max_search_results == 10, "file value should beat defaults")?;
            ensure(config.llm.manager_model == "gpt-4.1-mini", "file model should be used")?;
            ensure(config.llm.capability_model == "gpt-4o", "default model should remain")?;
            Ok(())
        })();

        clear_vars(&["COLLABORATOR_DATABASE_URL", "COLLABORATOR_AGENT_DISPATCH"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("COLLABORATOR_LLM_API_KEY", "sk-test");
        env::set_var("COLLABORATOR_LLM_PROVIDER", "azure_openai");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.base_url")
            );
            ensure(has_message, "validation failure should mention llm.base_url")
        })();

        clear_vars(&["COLLABORATOR_LLM_API_KEY", "COLLABORATOR_LLM_PROVIDER"]);
        result
    }

    #[test]
    fn missing_api_key_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => return Err("expected missing api key to fail validation".to_string()),
            Err(error) => error,
        };
        ensure(
            matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.api_key")
            ),
            "validation failure should mention llm.api_key",
        )
    }

    #[test]
    fn bot_password_required_outside_anonymous_mode() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                llm_api_key: Some("sk-test".to_string()),
                teams_app_id: Some("app-id".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        ensure(
            matches!(
                result,
                Err(ConfigError::Validation(ref message)) if message.contains("teams.app_password")
            ),
            "validation failure should mention teams.app_password",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("COLLABORATOR_LLM_API_KEY", "sk-secret-value");
        env::set_var("COLLABORATOR_TEAMS_APP_ID", "app-id");
        env::set_var("COLLABORATOR_TEAMS_APP_PASSWORD", "bot-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                !debug.contains("bot-secret-value"),
                "debug output should not contain bot password",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            ensure(config.llm.provider == LlmProvider::OpenAi, "default provider is openai")?;
            Ok(())
        })();

        clear_vars(&[
            "COLLABORATOR_LLM_API_KEY",
            "COLLABORATOR_TEAMS_APP_ID",
            "COLLABORATOR_TEAMS_APP_PASSWORD",
        ]);
        result
    }
}
