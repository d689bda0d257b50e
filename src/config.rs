use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub enable_tracing: bool,
    /// PostgreSQL connection URL; DATABASE_URL overrides when set
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub withdrawal: WithdrawalConfig,
    #[serde(default)]
    pub expirer: ExpirerSettings,
    #[serde(default)]
    pub collaborators: CollaboratorConfig,
}

/// Withdrawal policy knobs. `min_amount_usdt` / `fee_usdt` are the fallback
/// values when `settings_tb` has no override.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WithdrawalConfig {
    pub min_amount_usdt: String,
    pub fee_usdt: String,
    /// Bound on OTP issue/verify round-trips (milliseconds)
    pub otp_timeout_ms: u64,
}

impl Default for WithdrawalConfig {
    fn default() -> Self {
        Self {
            min_amount_usdt: "10".to_string(),
            fee_usdt: "0".to_string(),
            otp_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExpirerSettings {
    pub scan_interval_secs: u64,
    pub max_age_hours: u64,
    pub batch_size: usize,
}

impl Default for ExpirerSettings {
    fn default() -> Self {
        Self {
            scan_interval_secs: 3_600,
            max_age_hours: 24,
            batch_size: 100,
        }
    }
}

/// Endpoints of the out-of-process collaborators.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CollaboratorConfig {
    pub otp_base_url: String,
    pub notify_webhook_url: Option<String>,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            otp_base_url: "http://127.0.0.1:9090".to_string(),
            notify_webhook_url: None,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Self {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .unwrap_or_else(|_| panic!("Failed to read config file: {}", config_path));
        serde_yaml::from_str(&content).expect("Failed to parse config yaml")
    }

    /// Connection URL with the conventional environment override.
    pub fn database_url(&self) -> Option<String> {
        std::env::var("DATABASE_URL")
            .ok()
            .or_else(|| self.postgres_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let w = WithdrawalConfig::default();
        assert_eq!(w.min_amount_usdt, "10");
        assert_eq!(w.otp_timeout_ms, 5_000);

        let e = ExpirerSettings::default();
        assert_eq!(e.scan_interval_secs, 3_600);
        assert_eq!(e.max_age_hours, 24);
        assert_eq!(e.batch_size, 100);
    }

    #[test]
    fn test_parse_minimal_yaml() {
        let yaml = r#"
log_level: info
log_dir: ./logs
log_file: payout_core.log
use_json: false
rotation: daily
enable_tracing: true
"#;
        let cfg: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.log_level, "info");
        assert!(cfg.postgres_url.is_none());
        assert_eq!(cfg.withdrawal.min_amount_usdt, "10");
        assert_eq!(cfg.expirer.max_age_hours, 24);
    }
}
