use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use leadline_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

struct Field {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

impl Field {
    fn new(key: &'static str, env_key: &'static str, value: impl Into<String>) -> Self {
        Self { key, env_key, value: value.into() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key,
            Some(field.env_key),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    vec![
        Field::new("database.url", "LEADLINE_DATABASE_URL", config.database.url.clone()),
        Field::new(
            "database.max_connections",
            "LEADLINE_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        Field::new(
            "database.timeout_secs",
            "LEADLINE_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        Field::new("llm.provider", "LEADLINE_LLM_PROVIDER", format!("{:?}", config.llm.provider)),
        Field::new("llm.model", "LEADLINE_LLM_MODEL", config.llm.model.clone()),
        Field::new(
            "llm.base_url",
            "LEADLINE_LLM_BASE_URL",
            config.llm.base_url.as_deref().unwrap_or("<unset>"),
        ),
        Field::new("llm.api_key", "LEADLINE_LLM_API_KEY", redact_secret(config.llm.api_key.as_ref())),
        Field::new(
            "messaging.provider",
            "LEADLINE_MESSAGING_PROVIDER",
            format!("{:?}", config.messaging.provider),
        ),
        Field::new(
            "messaging.webhook_url",
            "LEADLINE_MESSAGING_WEBHOOK_URL",
            config.messaging.webhook_url.as_deref().unwrap_or("<unset>"),
        ),
        Field::new(
            "messaging.auth_token",
            "LEADLINE_MESSAGING_AUTH_TOKEN",
            redact_secret(config.messaging.auth_token.as_ref()),
        ),
        Field::new(
            "messaging.callback_secret",
            "LEADLINE_MESSAGING_CALLBACK_SECRET",
            redact_secret(config.messaging.callback_secret.as_ref()),
        ),
        Field::new(
            "messaging.dispatch_batch_size",
            "LEADLINE_MESSAGING_DISPATCH_BATCH_SIZE",
            config.messaging.dispatch_batch_size.to_string(),
        ),
        Field::new(
            "sla.default_response_minutes",
            "LEADLINE_SLA_DEFAULT_RESPONSE_MINUTES",
            config.sla.default_response_minutes.to_string(),
        ),
        Field::new(
            "escalation.reminder_ratio",
            "LEADLINE_ESCALATION_REMINDER_RATIO",
            config.escalation.reminder_ratio.to_string(),
        ),
        Field::new(
            "escalation.reassign_ratio",
            "LEADLINE_ESCALATION_REASSIGN_RATIO",
            config.escalation.reassign_ratio.to_string(),
        ),
        Field::new(
            "escalation.manager_alert_ratio",
            "LEADLINE_ESCALATION_MANAGER_ALERT_RATIO",
            config.escalation.manager_alert_ratio.to_string(),
        ),
        Field::new(
            "autopilot.handover_confirmation_minutes",
            "LEADLINE_AUTOPILOT_HANDOVER_CONFIRMATION_MINUTES",
            config.autopilot.handover_confirmation_minutes.to_string(),
        ),
        Field::new(
            "server.bind_address",
            "LEADLINE_SERVER_BIND_ADDRESS",
            config.server.bind_address.clone(),
        ),
        Field::new("server.port", "LEADLINE_SERVER_PORT", config.server.port.to_string()),
        Field::new(
            "server.maintenance_token",
            "LEADLINE_SERVER_MAINTENANCE_TOKEN",
            redact_secret(config.server.maintenance_token.as_ref()),
        ),
        Field::new("logging.level", "LEADLINE_LOGGING_LEVEL", config.logging.level.clone()),
        Field::new(
            "logging.format",
            "LEADLINE_LOGGING_FORMAT",
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["leadline.toml", "config/leadline.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
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

fn redact_secret(secret: Option<&SecretString>) -> String {
    match secret.map(|value| value.expose_secret().trim().to_owned()) {
        None => "<unset>".to_string(),
        Some(value) if value.is_empty() => "<empty>".to_string(),
        Some(_) => "<redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use toml::Value;

    use super::{contains_path, redact_secret};

    #[test]
    fn secrets_are_never_rendered() {
        let secret = SecretString::from("whsec-super-secret".to_owned());
        assert_eq!(redact_secret(Some(&secret)), "<redacted>");
        assert_eq!(redact_secret(None), "<unset>");
        assert_eq!(redact_secret(Some(&SecretString::from("  ".to_owned()))), "<empty>");
    }

    #[test]
    fn nested_keys_are_found_in_the_config_file() {
        let doc: Value = "[messaging]\nprovider = \"webhook\"\n".parse().expect("valid toml");
        assert!(contains_path(&doc, "messaging.provider"));
        assert!(!contains_path(&doc, "messaging.webhook_url"));
        assert!(!contains_path(&doc, "sla.default_response_minutes"));
    }
}
