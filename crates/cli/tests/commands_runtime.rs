use std::env;
use std::sync::{Mutex, OnceLock};

use leadline_cli::commands::{config, doctor, migrate, seed, sweep};
use serde_json::Value;

const IN_MEMORY_DB: (&str, &str) = ("LEADLINE_DATABASE_URL", "sqlite::memory:");

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[IN_MEMORY_DB], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["details"]["applied"], serde_json::json!([1]));
        assert_eq!(payload["details"]["current"], serde_json::json!([1]));
    });
}

#[test]
fn migrate_returns_config_failure_for_webhook_without_url() {
    with_env(&[IN_MEMORY_DB, ("LEADLINE_MESSAGING_PROVIDER", "webhook")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
        assert!(payload["message"].as_str().unwrap_or_default().contains("webhook_url"));
    });
}

#[test]
fn seed_reports_demo_workspace_and_leads() {
    with_env(&[IN_MEMORY_DB], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected seed success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("ws-demo-001"));
        assert!(message.contains("lead-demo-001, lead-demo-002"));
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    with_env(&[IN_MEMORY_DB], || {
        let first = parse_payload(&seed::run().output);
        let second = parse_payload(&seed::run().output);

        assert_eq!(first["status"], "ok");
        assert_eq!(second["status"], "ok");
        assert_eq!(first["message"], second["message"]);
    });
}

#[test]
fn sweep_runs_a_maintenance_pass_on_an_empty_database() {
    with_env(&[IN_MEMORY_DB], || {
        let result = sweep::run(Some(10));
        assert_eq!(result.exit_code, 0, "expected sweep success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "sweep");
        assert_eq!(payload["details"]["breaches"]["breached"], 0);
        assert_eq!(payload["details"]["dispatch"]["processed"], 0);
        assert_eq!(payload["details"]["expiredReplies"], 0);
    });
}

#[test]
fn sweep_returns_config_failure_for_invalid_ratio() {
    with_env(&[IN_MEMORY_DB, ("LEADLINE_ESCALATION_REMINDER_RATIO", "1.5")], || {
        let result = sweep::run(None);
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "config_validation");
    });
}

#[test]
fn doctor_json_passes_with_in_memory_database() {
    with_env(&[IN_MEMORY_DB], || {
        let payload = parse_payload(&doctor::run(true));
        assert_eq!(payload["overall_status"], "pass", "{payload}");

        let names = payload["checks"]
            .as_array()
            .map(|checks| checks.iter().filter_map(|check| check["name"].as_str()).collect::<Vec<_>>())
            .unwrap_or_default();
        assert_eq!(
            names,
            vec![
                "config_validation",
                "messaging_provider_readiness",
                "llm_client_readiness",
                "database_connectivity",
            ]
        );
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[IN_MEMORY_DB, ("LEADLINE_MESSAGING_PROVIDER", "webhook")], || {
        let output = doctor::run(false);
        assert!(output.starts_with("doctor: one or more readiness checks failed"));
        assert!(output.contains("- [fail] config_validation"));
        assert!(output.contains("- [skip] database_connectivity"));
    });
}

#[test]
fn config_attributes_sources_and_redacts_secrets() {
    with_env(
        &[IN_MEMORY_DB, ("LEADLINE_SERVER_MAINTENANCE_TOKEN", "maint-very-secret")],
        || {
            let output = config::run();
            assert!(output.contains(
                "- database.url = sqlite::memory: (source: env (LEADLINE_DATABASE_URL))"
            ));
            assert!(output.contains(
                "- server.maintenance_token = <redacted> (source: env (LEADLINE_SERVER_MAINTENANCE_TOKEN))"
            ));
            assert!(output.contains("- messaging.callback_secret = <unset> (source: default)"));
            assert!(!output.contains("maint-very-secret"));
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "LEADLINE_DATABASE_URL",
        "LEADLINE_DATABASE_MAX_CONNECTIONS",
        "LEADLINE_DATABASE_TIMEOUT_SECS",
        "LEADLINE_LLM_PROVIDER",
        "LEADLINE_LLM_API_KEY",
        "LEADLINE_LLM_BASE_URL",
        "LEADLINE_LLM_MODEL",
        "LEADLINE_LLM_TIMEOUT_SECS",
        "LEADLINE_MESSAGING_PROVIDER",
        "LEADLINE_MESSAGING_WEBHOOK_URL",
        "LEADLINE_MESSAGING_AUTH_TOKEN",
        "LEADLINE_MESSAGING_CALLBACK_SECRET",
        "LEADLINE_MESSAGING_SEND_TIMEOUT_SECS",
        "LEADLINE_MESSAGING_DISPATCH_BATCH_SIZE",
        "LEADLINE_SLA_DEFAULT_RESPONSE_MINUTES",
        "LEADLINE_ESCALATION_REMINDER_RATIO",
        "LEADLINE_ESCALATION_REASSIGN_RATIO",
        "LEADLINE_ESCALATION_MANAGER_ALERT_RATIO",
        "LEADLINE_AUTOPILOT_HANDOVER_CONFIRMATION_MINUTES",
        "LEADLINE_SERVER_BIND_ADDRESS",
        "LEADLINE_SERVER_PORT",
        "LEADLINE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "LEADLINE_SERVER_MAINTENANCE_TOKEN",
        "LEADLINE_LOGGING_LEVEL",
        "LEADLINE_LOGGING_FORMAT",
        "LEADLINE_LOG_LEVEL",
        "LEADLINE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
