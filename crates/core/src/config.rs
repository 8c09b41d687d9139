use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::escalation_policy::EscalationThresholds;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub messaging: MessagingConfig,
    pub sla: SlaConfig,
    pub escalation: EscalationConfig,
    pub autopilot: AutopilotConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct MessagingConfig {
    pub provider: MessagingProvider,
    pub webhook_url: Option<String>,
    pub auth_token: Option<SecretString>,
    pub callback_secret: Option<SecretString>,
    pub send_timeout_secs: u64,
    pub dispatch_batch_size: u32,
}

#[derive(Clone, Debug)]
pub struct SlaConfig {
    pub default_response_minutes: u32,
}

#[derive(Clone, Debug)]
pub struct EscalationConfig {
    pub reminder_ratio: f64,
    pub reassign_ratio: f64,
    pub manager_alert_ratio: f64,
}

#[derive(Clone, Debug)]
pub struct AutopilotConfig {
    pub handover_confirmation_minutes: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    pub maintenance_token: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagingProvider {
    Noop,
    Webhook,
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
    pub llm_model: Option<String>,
    pub messaging_provider: Option<MessagingProvider>,
    pub messaging_webhook_url: Option<String>,
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
        let thresholds = EscalationThresholds::default();
        Self {
            database: DatabaseConfig {
                url: "sqlite://leadline.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 10,
            },
            messaging: MessagingConfig {
                provider: MessagingProvider::Noop,
                webhook_url: None,
                auth_token: None,
                callback_secret: None,
                send_timeout_secs: 15,
                dispatch_batch_size: 25,
            },
            sla: SlaConfig { default_response_minutes: 15 },
            escalation: EscalationConfig {
                reminder_ratio: thresholds.reminder,
                reassign_ratio: thresholds.reassign,
                manager_alert_ratio: thresholds.manager_alert,
            },
            autopilot: AutopilotConfig { handover_confirmation_minutes: 30 },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
                maintenance_token: None,
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
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for MessagingProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "noop" => Ok(Self::Noop),
            "webhook" => Ok(Self::Webhook),
            other => Err(ConfigError::Validation(format!(
                "unsupported messaging provider `{other}` (expected noop|webhook)"
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("leadline.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn escalation_thresholds(&self) -> EscalationThresholds {
        EscalationThresholds {
            reminder: self.escalation.reminder_ratio,
            reassign: self.escalation.reassign_ratio,
            manager_alert: self.escalation.manager_alert_ratio,
        }
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
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(messaging) = patch.messaging {
            if let Some(provider) = messaging.provider {
                self.messaging.provider = provider;
            }
            if let Some(webhook_url) = messaging.webhook_url {
                self.messaging.webhook_url = Some(webhook_url);
            }
            if let Some(auth_token) = messaging.auth_token {
                self.messaging.auth_token = Some(secret_value(auth_token));
            }
            if let Some(callback_secret) = messaging.callback_secret {
                self.messaging.callback_secret = Some(secret_value(callback_secret));
            }
            if let Some(send_timeout_secs) = messaging.send_timeout_secs {
                self.messaging.send_timeout_secs = send_timeout_secs;
            }
            if let Some(dispatch_batch_size) = messaging.dispatch_batch_size {
                self.messaging.dispatch_batch_size = dispatch_batch_size;
            }
        }

        if let Some(sla) = patch.sla {
            if let Some(minutes) = sla.default_response_minutes {
                self.sla.default_response_minutes = minutes;
            }
        }

        if let Some(escalation) = patch.escalation {
            if let Some(ratio) = escalation.reminder_ratio {
                self.escalation.reminder_ratio = ratio;
            }
            if let Some(ratio) = escalation.reassign_ratio {
                self.escalation.reassign_ratio = ratio;
            }
            if let Some(ratio) = escalation.manager_alert_ratio {
                self.escalation.manager_alert_ratio = ratio;
            }
        }

        if let Some(autopilot) = patch.autopilot {
            if let Some(minutes) = autopilot.handover_confirmation_minutes {
                self.autopilot.handover_confirmation_minutes = minutes;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
            if let Some(token) = server.maintenance_token {
                self.server.maintenance_token = Some(secret_value(token));
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
        if let Some(value) = read_env("LEADLINE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("LEADLINE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("LEADLINE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("LEADLINE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("LEADLINE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEADLINE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("LEADLINE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("LEADLINE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("LEADLINE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("LEADLINE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("LEADLINE_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEADLINE_MESSAGING_PROVIDER") {
            self.messaging.provider = value.parse()?;
        }
        if let Some(value) = read_env("LEADLINE_MESSAGING_WEBHOOK_URL") {
            self.messaging.webhook_url = Some(value);
        }
        if let Some(value) = read_env("LEADLINE_MESSAGING_AUTH_TOKEN") {
            self.messaging.auth_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("LEADLINE_MESSAGING_CALLBACK_SECRET") {
            self.messaging.callback_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("LEADLINE_MESSAGING_SEND_TIMEOUT_SECS") {
            self.messaging.send_timeout_secs =
                parse_u64("LEADLINE_MESSAGING_SEND_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("LEADLINE_MESSAGING_DISPATCH_BATCH_SIZE") {
            self.messaging.dispatch_batch_size =
                parse_u32("LEADLINE_MESSAGING_DISPATCH_BATCH_SIZE", &value)?;
        }

        if let Some(value) = read_env("LEADLINE_SLA_DEFAULT_RESPONSE_MINUTES") {
            self.sla.default_response_minutes =
                parse_u32("LEADLINE_SLA_DEFAULT_RESPONSE_MINUTES", &value)?;
        }

        if let Some(value) = read_env("LEADLINE_ESCALATION_REMINDER_RATIO") {
            self.escalation.reminder_ratio =
                parse_f64("LEADLINE_ESCALATION_REMINDER_RATIO", &value)?;
        }
        if let Some(value) = read_env("LEADLINE_ESCALATION_REASSIGN_RATIO") {
            self.escalation.reassign_ratio =
                parse_f64("LEADLINE_ESCALATION_REASSIGN_RATIO", &value)?;
        }
        if let Some(value) = read_env("LEADLINE_ESCALATION_MANAGER_ALERT_RATIO") {
            self.escalation.manager_alert_ratio =
                parse_f64("LEADLINE_ESCALATION_MANAGER_ALERT_RATIO", &value)?;
        }

        if let Some(value) = read_env("LEADLINE_AUTOPILOT_HANDOVER_CONFIRMATION_MINUTES") {
            self.autopilot.handover_confirmation_minutes =
                parse_u32("LEADLINE_AUTOPILOT_HANDOVER_CONFIRMATION_MINUTES", &value)?;
        }

        if let Some(value) = read_env("LEADLINE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("LEADLINE_SERVER_PORT") {
            self.server.port = parse_u16("LEADLINE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("LEADLINE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("LEADLINE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("LEADLINE_SERVER_MAINTENANCE_TOKEN") {
            self.server.maintenance_token = Some(secret_value(value));
        }

        let log_level =
            read_env("LEADLINE_LOGGING_LEVEL").or_else(|| read_env("LEADLINE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("LEADLINE_LOGGING_FORMAT").or_else(|| read_env("LEADLINE_LOG_FORMAT"));
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
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(provider) = overrides.messaging_provider {
            self.messaging.provider = provider;
        }
        if let Some(webhook_url) = overrides.messaging_webhook_url {
            self.messaging.webhook_url = Some(webhook_url);
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_messaging(&self.messaging)?;
        validate_sla(&self.sla)?;
        validate_escalation(&self.escalation)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("leadline.toml"), PathBuf::from("config/leadline.toml")]
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

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_messaging(messaging: &MessagingConfig) -> Result<(), ConfigError> {
    if messaging.provider == MessagingProvider::Webhook {
        let url = messaging.webhook_url.as_deref().map(str::trim).unwrap_or_default();
        if url.is_empty() {
            return Err(ConfigError::Validation(
                "messaging.webhook_url is required for the webhook provider".to_string(),
            ));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "messaging.webhook_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if messaging.send_timeout_secs == 0 || messaging.send_timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "messaging.send_timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    if messaging.dispatch_batch_size == 0 {
        return Err(ConfigError::Validation(
            "messaging.dispatch_batch_size must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_sla(sla: &SlaConfig) -> Result<(), ConfigError> {
    if sla.default_response_minutes == 0 {
        return Err(ConfigError::Validation(
            "sla.default_response_minutes must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_escalation(escalation: &EscalationConfig) -> Result<(), ConfigError> {
    let ratios =
        [escalation.reminder_ratio, escalation.reassign_ratio, escalation.manager_alert_ratio];
    if ratios.iter().any(|ratio| !ratio.is_finite() || *ratio <= 0.0) {
        return Err(ConfigError::Validation(
            "escalation ratios must be positive finite numbers".to_string(),
        ));
    }
    if !(escalation.reminder_ratio < escalation.reassign_ratio
        && escalation.reassign_ratio < escalation.manager_alert_ratio)
    {
        return Err(ConfigError::Validation(
            "escalation ratios must be strictly increasing (reminder < reassign < manager_alert)"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
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

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid(key, value))
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| invalid(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    messaging: Option<MessagingPatch>,
    sla: Option<SlaPatch>,
    escalation: Option<EscalationPatch>,
    autopilot: Option<AutopilotPatch>,
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
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct MessagingPatch {
    provider: Option<MessagingProvider>,
    webhook_url: Option<String>,
    auth_token: Option<String>,
    callback_secret: Option<String>,
    send_timeout_secs: Option<u64>,
    dispatch_batch_size: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct SlaPatch {
    default_response_minutes: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct EscalationPatch {
    reminder_ratio: Option<f64>,
    reassign_ratio: Option<f64>,
    manager_alert_ratio: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct AutopilotPatch {
    handover_confirmation_minutes: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    maintenance_token: Option<String>,
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
        AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, MessagingProvider,
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

        env::set_var("TEST_LEADLINE_WEBHOOK_TOKEN", "tok-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("leadline.toml");
            fs::write(
                &path,
                r#"
[messaging]
provider = "webhook"
webhook_url = "https://sms.example.test/send"
auth_token = "${TEST_LEADLINE_WEBHOOK_TOKEN}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.messaging.provider == MessagingProvider::Webhook,
                "provider should come from the file",
            )?;
            ensure(
                config
                    .messaging
                    .auth_token
                    .as_ref()
                    .map(|token| token.expose_secret() == "tok-from-env")
                    .unwrap_or(false),
                "auth token should be interpolated from environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_LEADLINE_WEBHOOK_TOKEN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LEADLINE_LOG_LEVEL", "warn");
        env::set_var("LEADLINE_LOG_FORMAT", "pretty");

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

        clear_vars(&["LEADLINE_LOG_LEVEL", "LEADLINE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LEADLINE_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("LEADLINE_SLA_DEFAULT_RESPONSE_MINUTES", "20");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("leadline.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[sla]
default_response_minutes = 5

[escalation]
reminder_ratio = 0.4

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
                config.sla.default_response_minutes == 20,
                "env response window should win over file",
            )?;
            ensure(
                (config.escalation.reminder_ratio - 0.4).abs() < f64::EPSILON,
                "file reminder ratio should win over default",
            )?;
            Ok(())
        })();

        clear_vars(&["LEADLINE_DATABASE_URL", "LEADLINE_SLA_DEFAULT_RESPONSE_MINUTES"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LEADLINE_MESSAGING_PROVIDER", "webhook");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("messaging.webhook_url")
            );
            ensure(has_message, "validation failure should mention messaging.webhook_url")
        })();

        clear_vars(&["LEADLINE_MESSAGING_PROVIDER"]);
        result
    }

    #[test]
    fn escalation_ratios_must_increase() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LEADLINE_ESCALATION_REASSIGN_RATIO", "0.95");

        let result = (|| -> Result<(), String> {
            let failed = matches!(
                AppConfig::load(LoadOptions::default()),
                Err(ConfigError::Validation(ref message)) if message.contains("strictly increasing")
            );
            ensure(failed, "non-monotonic thresholds should be rejected")
        })();

        clear_vars(&["LEADLINE_ESCALATION_REASSIGN_RATIO"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LEADLINE_MESSAGING_CALLBACK_SECRET", "whsec-secret-value");
        env::set_var("LEADLINE_SERVER_MAINTENANCE_TOKEN", "maint-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("whsec-secret-value"),
                "debug output should not contain callback secret",
            )?;
            ensure(
                !debug.contains("maint-secret-value"),
                "debug output should not contain maintenance token",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["LEADLINE_MESSAGING_CALLBACK_SECRET", "LEADLINE_SERVER_MAINTENANCE_TOKEN"]);
        result
    }
}
