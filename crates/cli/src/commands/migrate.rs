use leadline_core::config::{AppConfig, LoadOptions};
use leadline_db::{connect_from_config, migrations};
use serde_json::json;

use crate::commands::{runtime, CommandResult};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match runtime("migrate") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        let before = migrations::applied_versions(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        let after = migrations::applied_versions(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        pool.close().await;

        let newly_applied =
            after.iter().copied().filter(|version| !before.contains(version)).collect::<Vec<_>>();
        Ok::<_, (&'static str, String, u8)>((newly_applied, after))
    });

    match result {
        Ok((newly_applied, all)) => {
            let message = if newly_applied.is_empty() {
                "schema already up to date".to_string()
            } else {
                format!("applied {} pending migration(s)", newly_applied.len())
            };
            CommandResult::success_with_details(
                "migrate",
                message,
                Some(json!({ "applied": newly_applied, "current": all })),
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
