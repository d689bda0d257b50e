//! Withdrawal Expirer
//!
//! Background worker that reclaims stale withdrawal requests: anything still
//! in {requested, otp_sent} past the age limit is force-transitioned to
//! `expired` with its funds restored. Each withdrawal is processed in its own
//! transaction so one failure never poisons the rest of the batch.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use super::service::WithdrawalService;

/// Configuration for the expiry worker
#[derive(Debug, Clone)]
pub struct ExpirerConfig {
    /// How often to run the sweep
    pub scan_interval: Duration,
    /// How old a withdrawal must be before it is reclaimed
    pub max_age: Duration,
    /// Maximum withdrawals to process per sweep
    pub batch_size: usize,
}

impl Default for ExpirerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(3_600),
            max_age: Duration::from_secs(24 * 3_600),
            batch_size: 100,
        }
    }
}

impl ExpirerConfig {
    pub fn from_settings(settings: &crate::config::ExpirerSettings) -> Self {
        Self {
            scan_interval: Duration::from_secs(settings.scan_interval_secs),
            max_age: Duration::from_secs(settings.max_age_hours * 3_600),
            batch_size: settings.batch_size,
        }
    }
}

/// Outcome of one sweep: how many stale rows were found vs. actually
/// expired (the difference lost races to user/admin actions, or errored).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub found: usize,
    pub expired: usize,
}

/// Expiry Worker
///
/// Periodically scans for stale withdrawal requests and reclaims them.
/// Races with user or admin actions resolve through the conditional status
/// update: whichever transaction commits first wins and the loser's sweep
/// entry is a no-op.
pub struct ExpirerWorker {
    service: Arc<WithdrawalService>,
    config: ExpirerConfig,
}

impl ExpirerWorker {
    /// Create a new ExpirerWorker
    pub fn new(service: Arc<WithdrawalService>, config: ExpirerConfig) -> Self {
        Self { service, config }
    }

    /// Create with default configuration
    pub fn with_defaults(service: Arc<WithdrawalService>) -> Self {
        Self::new(service, ExpirerConfig::default())
    }

    /// Run the expiry loop forever.
    pub async fn run(&self) {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            max_age_secs = self.config.max_age.as_secs(),
            "Starting withdrawal expirer"
        );

        loop {
            match self.sweep().await {
                Ok(report) if report.found > 0 => {
                    info!(
                        found = report.found,
                        expired = report.expired,
                        "Expiry sweep completed"
                    );
                }
                Ok(_) => debug!("Expiry sweep found nothing to reclaim"),
                Err(e) => error!(error = %e, "Expiry sweep failed"),
            }

            tokio::time::sleep(self.config.scan_interval).await;
        }
    }

    /// Run a single sweep. Per-withdrawal failures are logged and skipped;
    /// the sweep itself only fails if the candidate query does.
    pub async fn sweep(&self) -> Result<SweepReport, super::error::WithdrawalError> {
        let stale = self
            .service
            .find_expirable(self.config.max_age, self.config.batch_size as i64)
            .await?;

        let found = stale.len();
        let mut expired = 0;

        for withdrawal in &stale {
            debug!(
                withdrawal_id = %withdrawal.id,
                status = %withdrawal.status,
                age_hours = (chrono::Utc::now() - withdrawal.created_at).num_hours(),
                "Expiring stale withdrawal"
            );

            match self.service.expire(withdrawal).await {
                Ok(true) => expired += 1,
                Ok(false) => {
                    // Lost the race to a user/admin action - fine
                    debug!(
                        withdrawal_id = %withdrawal.id,
                        "Withdrawal moved before expiry, skipping"
                    );
                }
                Err(e) => {
                    error!(
                        withdrawal_id = %withdrawal.id,
                        error = %e,
                        "Failed to expire withdrawal, continuing batch"
                    );
                }
            }
        }

        Ok(SweepReport { found, expired })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ExpirerConfig::default();
        assert_eq!(config.scan_interval, Duration::from_secs(3_600));
        assert_eq!(config.max_age, Duration::from_secs(86_400));
        assert_eq!(config.batch_size, 100);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = crate::config::ExpirerSettings {
            scan_interval_secs: 60,
            max_age_hours: 48,
            batch_size: 10,
        };
        let config = ExpirerConfig::from_settings(&settings);
        assert_eq!(config.scan_interval, Duration::from_secs(60));
        assert_eq!(config.max_age, Duration::from_secs(48 * 3_600));
        assert_eq!(config.batch_size, 10);
    }
}
