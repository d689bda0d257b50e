//! payout_core daemon
//!
//! Wires the withdrawal service to its collaborators and runs the expiry
//! sweep. The HTTP gateway binding the API surface lives in its own service;
//! this process owns the money core and the scheduled reclaim.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use payout_core::config::AppConfig;
use payout_core::db::Database;
use payout_core::withdrawal::adapters::{HttpOtpVerifier, PgSettingsStore, WebhookNotifier};
use payout_core::withdrawal::{
    ExpirerConfig, ExpirerWorker, WithdrawalDb, WithdrawalPolicy, WithdrawalService,
};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env);
    let _log_guard = payout_core::logging::init_logging(&app_config);

    info!("Starting payout_core in {} mode", env);

    let database_url = app_config
        .database_url()
        .context("No database URL: set DATABASE_URL or postgres_url in config")?;

    let database = Database::connect(&database_url).await?;

    info!("Running database migrations");
    sqlx::migrate!("./migrations").run(database.pool()).await?;
    database.health_check().await?;

    let collaborator_timeout = Duration::from_millis(app_config.withdrawal.otp_timeout_ms);

    let otp = Arc::new(HttpOtpVerifier::new(
        app_config.collaborators.otp_base_url.clone(),
        collaborator_timeout,
    )?);
    let notifier = Arc::new(WebhookNotifier::new(
        app_config.collaborators.notify_webhook_url.clone(),
        collaborator_timeout,
    )?);
    let settings = Arc::new(PgSettingsStore::new(database.pool().clone()));

    let policy = WithdrawalPolicy::from_config(&app_config.withdrawal)
        .context("Invalid withdrawal policy in config")?;

    let service = Arc::new(WithdrawalService::new(
        WithdrawalDb::new(database.pool().clone()),
        otp,
        notifier,
        settings,
        policy,
    ));

    let expirer = ExpirerWorker::new(
        service.clone(),
        ExpirerConfig::from_settings(&app_config.expirer),
    );
    tokio::spawn(async move { expirer.run().await });

    info!("payout_core started; expirer running");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down payout_core");

    Ok(())
}
