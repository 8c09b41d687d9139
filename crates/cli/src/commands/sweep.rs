use chrono::Utc;
use leadline_core::config::{AppConfig, LoadOptions};
use leadline_db::{connect_from_config, migrations};
use leadline_engine::Engine;

use crate::commands::{runtime, CommandResult};

/// One maintenance pass: breach detection, escalation, a dispatch batch and reply expiry.
pub fn run(limit: Option<u32>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "sweep",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match runtime("sweep") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let engine = Engine::from_config(pool.clone(), &config)
            .map_err(|error| ("engine_setup", error.to_string(), 2u8))?;
        let report = engine
            .run_maintenance(Utc::now(), limit)
            .await
            .map_err(|error| ("maintenance", error.to_string(), 7u8))?;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(report)
    });

    match result {
        Ok(report) => CommandResult::success_with_details(
            "sweep",
            format!(
                "maintenance pass complete: {} breaches, {} escalations raised, {} messages sent",
                report.breaches.breached, report.escalations.raised, report.dispatch.sent
            ),
            serde_json::to_value(report).ok(),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("sweep", error_class, message, exit_code)
        }
    }
}
