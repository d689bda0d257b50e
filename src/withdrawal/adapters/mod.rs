//! Collaborator Adapters
//!
//! The withdrawal lifecycle consults three out-of-process collaborators: the
//! OTP verifier (issues and checks one-time codes; owns all attempt state),
//! the notification dispatcher (fire-and-forget), and the settings store.
//! All three sit behind traits so the service is wired by explicit dependency
//! injection - no process-wide singletons.

pub mod http;
pub mod settings;

pub use http::{HttpOtpVerifier, WebhookNotifier};
pub use settings::PgSettingsStore;

use async_trait::async_trait;
use thiserror::Error;

use super::types::WithdrawalId;

/// Setting keys consumed by the withdrawal service.
pub mod keys {
    pub const MIN_WITHDRAWAL_AMOUNT: &str = "min_withdrawal_amount";
    pub const WITHDRAWAL_FEE_USDT: &str = "withdrawal_fee_usdt";
}

/// Failure talking to a collaborator. A `Timeout` means the outcome is
/// unknown; callers must treat it as retryable, never as a confirmed result.
#[derive(Debug, Error, Clone)]
pub enum AdapterError {
    #[error("{0} unavailable: {1}")]
    Unavailable(&'static str, String),

    #[error("{0} timed out")]
    Timeout(&'static str),
}

/// Successful OTP issuance: the verifier minted an attempt for this
/// withdrawal and delivered the code out of band.
#[derive(Debug, Clone)]
pub struct OtpIssued {
    pub otp_id: String,
}

/// Verdict for a submitted code. `user_id` and `kind` are only meaningful
/// when `valid` is true.
#[derive(Debug, Clone)]
pub struct OtpVerdict {
    pub valid: bool,
    pub user_id: Option<i64>,
    pub kind: Option<String>,
}

/// OTP verifier collaborator. Attempt state (codes, validity windows) lives
/// entirely on the other side; this core only stores the opaque `otp_id`.
#[async_trait]
pub trait OtpVerifier: Send + Sync {
    /// Adapter name for logging
    fn name(&self) -> &'static str;

    /// Mint an OTP attempt scoped to one withdrawal and deliver the code.
    async fn issue(
        &self,
        user_id: i64,
        withdrawal_id: WithdrawalId,
        amount: u64,
    ) -> Result<OtpIssued, AdapterError>;

    /// Check a submitted code against an attempt.
    async fn verify(&self, otp_id: &str, code: &str) -> Result<OtpVerdict, AdapterError>;
}

/// Notification dispatcher. Fire-and-forget: the service logs failures and
/// never lets them block or abort a transition.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &str, payload: serde_json::Value) -> Result<(), AdapterError>;
}

/// Settings store collaborator (read-only key/value).
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AdapterError>;
}

/// Mock collaborators for testing
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct IssuedOtp {
        user_id: i64,
        code: String,
    }

    /// Scriptable OTP verifier: codes are deterministic ("code-N"), failure
    /// modes are toggled per test.
    pub struct MockOtpVerifier {
        attempts: Mutex<HashMap<String, IssuedOtp>>,
        issue_count: AtomicUsize,
        verify_count: AtomicUsize,
        fail_issue: Mutex<bool>,
        timeout_issue: Mutex<bool>,
        force_invalid: Mutex<bool>,
        /// When set, verify reports this user as the code owner
        report_user: Mutex<Option<i64>>,
    }

    impl MockOtpVerifier {
        pub fn new() -> Self {
            Self {
                attempts: Mutex::new(HashMap::new()),
                issue_count: AtomicUsize::new(0),
                verify_count: AtomicUsize::new(0),
                fail_issue: Mutex::new(false),
                timeout_issue: Mutex::new(false),
                force_invalid: Mutex::new(false),
                report_user: Mutex::new(None),
            }
        }

        pub fn set_fail_issue(&self, fail: bool) {
            *self.fail_issue.lock().unwrap() = fail;
        }

        pub fn set_timeout_issue(&self, timeout: bool) {
            *self.timeout_issue.lock().unwrap() = timeout;
        }

        pub fn set_force_invalid(&self, invalid: bool) {
            *self.force_invalid.lock().unwrap() = invalid;
        }

        pub fn set_report_user(&self, user_id: Option<i64>) {
            *self.report_user.lock().unwrap() = user_id;
        }

        pub fn issue_count(&self) -> usize {
            self.issue_count.load(Ordering::SeqCst)
        }

        pub fn verify_count(&self) -> usize {
            self.verify_count.load(Ordering::SeqCst)
        }

        /// The deliverable code for an issued otp_id
        pub fn code_for(&self, otp_id: &str) -> Option<String> {
            self.attempts
                .lock()
                .unwrap()
                .get(otp_id)
                .map(|a| a.code.clone())
        }
    }

    impl Default for MockOtpVerifier {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl OtpVerifier for MockOtpVerifier {
        fn name(&self) -> &'static str {
            "mock-otp"
        }

        async fn issue(
            &self,
            user_id: i64,
            _withdrawal_id: WithdrawalId,
            _amount: u64,
        ) -> Result<OtpIssued, AdapterError> {
            if *self.timeout_issue.lock().unwrap() {
                return Err(AdapterError::Timeout("otp verifier"));
            }
            if *self.fail_issue.lock().unwrap() {
                return Err(AdapterError::Unavailable(
                    "otp verifier",
                    "mock issue failure".to_string(),
                ));
            }

            let n = self.issue_count.fetch_add(1, Ordering::SeqCst) + 1;
            let otp_id = format!("otp-{}", n);
            let code = format!("code-{}", n);

            self.attempts
                .lock()
                .unwrap()
                .insert(otp_id.clone(), IssuedOtp { user_id, code });

            Ok(OtpIssued { otp_id })
        }

        async fn verify(&self, otp_id: &str, code: &str) -> Result<OtpVerdict, AdapterError> {
            self.verify_count.fetch_add(1, Ordering::SeqCst);

            if *self.force_invalid.lock().unwrap() {
                return Ok(OtpVerdict {
                    valid: false,
                    user_id: None,
                    kind: None,
                });
            }

            let attempts = self.attempts.lock().unwrap();
            match attempts.get(otp_id) {
                Some(attempt) if attempt.code == code => {
                    let user_id = self
                        .report_user
                        .lock()
                        .unwrap()
                        .unwrap_or(attempt.user_id);
                    Ok(OtpVerdict {
                        valid: true,
                        user_id: Some(user_id),
                        kind: Some("withdrawal".to_string()),
                    })
                }
                _ => Ok(OtpVerdict {
                    valid: false,
                    user_id: None,
                    kind: None,
                }),
            }
        }
    }

    /// Records every event; optionally fails to exercise the swallow path.
    pub struct MockNotifier {
        pub events: Mutex<Vec<(String, serde_json::Value)>>,
        fail: Mutex<bool>,
    }

    impl MockNotifier {
        pub fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                fail: Mutex::new(false),
            }
        }

        pub fn set_fail(&self, fail: bool) {
            *self.fail.lock().unwrap() = fail;
        }

        pub fn event_names(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|(e, _)| e.clone())
                .collect()
        }
    }

    impl Default for MockNotifier {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn notify(
            &self,
            event: &str,
            payload: serde_json::Value,
        ) -> Result<(), AdapterError> {
            if *self.fail.lock().unwrap() {
                return Err(AdapterError::Unavailable(
                    "notifier",
                    "mock notify failure".to_string(),
                ));
            }
            self.events
                .lock()
                .unwrap()
                .push((event.to_string(), payload));
            Ok(())
        }
    }

    /// In-memory settings store.
    pub struct MockSettings {
        values: Mutex<HashMap<String, String>>,
    }

    impl MockSettings {
        pub fn new() -> Self {
            Self {
                values: Mutex::new(HashMap::new()),
            }
        }

        pub fn set(&self, key: &str, value: &str) {
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
        }
    }

    impl Default for MockSettings {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl SettingsStore for MockSettings {
        async fn get(&self, key: &str) -> Result<Option<String>, AdapterError> {
            Ok(self.values.lock().unwrap().get(key).cloned())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_otp_issue_and_verify() {
            let otp = MockOtpVerifier::new();

            let issued = otp.issue(1001, WithdrawalId::new(), 10_000_000).await.unwrap();
            assert_eq!(otp.issue_count(), 1);

            let code = otp.code_for(&issued.otp_id).unwrap();
            let verdict = otp.verify(&issued.otp_id, &code).await.unwrap();
            assert!(verdict.valid);
            assert_eq!(verdict.user_id, Some(1001));
            assert_eq!(verdict.kind.as_deref(), Some("withdrawal"));
        }

        #[tokio::test]
        async fn test_mock_otp_wrong_code() {
            let otp = MockOtpVerifier::new();
            let issued = otp.issue(1001, WithdrawalId::new(), 10_000_000).await.unwrap();

            let verdict = otp.verify(&issued.otp_id, "wrong").await.unwrap();
            assert!(!verdict.valid);
        }

        #[tokio::test]
        async fn test_mock_otp_issue_failure() {
            let otp = MockOtpVerifier::new();
            otp.set_fail_issue(true);

            let result = otp.issue(1001, WithdrawalId::new(), 10_000_000).await;
            assert!(matches!(result, Err(AdapterError::Unavailable(_, _))));
        }

        #[tokio::test]
        async fn test_mock_notifier_records_events() {
            let notifier = MockNotifier::new();
            notifier
                .notify("withdrawal.requested", serde_json::json!({"amount": "10.000000"}))
                .await
                .unwrap();
            assert_eq!(notifier.event_names(), vec!["withdrawal.requested"]);
        }

        #[tokio::test]
        async fn test_mock_settings() {
            let settings = MockSettings::new();
            settings.set(keys::MIN_WITHDRAWAL_AMOUNT, "25");
            assert_eq!(
                settings.get(keys::MIN_WITHDRAWAL_AMOUNT).await.unwrap(),
                Some("25".to_string())
            );
            assert_eq!(settings.get("missing").await.unwrap(), None);
        }
    }
}

#[cfg(test)]
pub use mock::{MockNotifier, MockOtpVerifier, MockSettings};
