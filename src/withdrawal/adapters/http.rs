//! HTTP Collaborator Clients
//!
//! Production adapters for the OTP verifier and the notification webhook.
//! Both use a bounded-timeout reqwest client; the delivery channel behind the
//! OTP endpoint (messaging bot, SMS, ...) is opaque to this core.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{AdapterError, Notifier, OtpIssued, OtpVerdict, OtpVerifier};
use crate::withdrawal::types::WithdrawalId;

#[derive(Serialize)]
struct IssueRequest<'a> {
    user_id: i64,
    withdrawal_id: &'a str,
    /// micro-USDT, rendered for the delivery template
    amount: String,
}

#[derive(Deserialize)]
struct IssueResponse {
    success: bool,
    otp_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    otp_id: &'a str,
    code: &'a str,
}

#[derive(Deserialize)]
struct VerifyResponse {
    valid: bool,
    user_id: Option<i64>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// OTP verifier spoken to over JSON/HTTP.
pub struct HttpOtpVerifier {
    client: reqwest::Client,
    base_url: String,
}

impl HttpOtpVerifier {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Unavailable("otp verifier", e.to_string()))?;

        Ok(Self { client, base_url })
    }

    fn map_send_error(e: reqwest::Error) -> AdapterError {
        if e.is_timeout() {
            AdapterError::Timeout("otp verifier")
        } else {
            AdapterError::Unavailable("otp verifier", e.to_string())
        }
    }
}

#[async_trait]
impl OtpVerifier for HttpOtpVerifier {
    fn name(&self) -> &'static str {
        "http-otp"
    }

    async fn issue(
        &self,
        user_id: i64,
        withdrawal_id: WithdrawalId,
        amount: u64,
    ) -> Result<OtpIssued, AdapterError> {
        let url = format!("{}/otp/issue", self.base_url);
        let withdrawal_id = withdrawal_id.to_string();

        let response = self
            .client
            .post(&url)
            .json(&IssueRequest {
                user_id,
                withdrawal_id: &withdrawal_id,
                amount: crate::money::format_amount(amount),
            })
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let body: IssueResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Unavailable("otp verifier", e.to_string()))?;

        match (body.success, body.otp_id) {
            (true, Some(otp_id)) => {
                debug!(withdrawal_id = %withdrawal_id, otp_id = %otp_id, "OTP issued");
                Ok(OtpIssued { otp_id })
            }
            _ => Err(AdapterError::Unavailable(
                "otp verifier",
                body.error.unwrap_or_else(|| "issuance refused".to_string()),
            )),
        }
    }

    async fn verify(&self, otp_id: &str, code: &str) -> Result<OtpVerdict, AdapterError> {
        let url = format!("{}/otp/verify", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&VerifyRequest { otp_id, code })
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Unavailable("otp verifier", e.to_string()))?;

        Ok(OtpVerdict {
            valid: body.valid,
            user_id: body.user_id,
            kind: body.kind,
        })
    }
}

/// Fire-and-forget webhook notifier. With no URL configured every event is
/// just logged at debug level.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: Option<String>, timeout: Duration) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Unavailable("notifier", e.to_string()))?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &str, payload: serde_json::Value) -> Result<(), AdapterError> {
        let Some(url) = &self.url else {
            debug!(event = %event, "No notify webhook configured, dropping event");
            return Ok(());
        };

        let body = serde_json::json!({ "event": event, "payload": payload });

        match self.client.post(url).json(&body).send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => {
                warn!(event = %event, status = %response.status(), "Notify webhook rejected event");
                Err(AdapterError::Unavailable(
                    "notifier",
                    format!("webhook returned {}", response.status()),
                ))
            }
            Err(e) => {
                warn!(event = %event, error = %e, "Notify webhook unreachable");
                Err(AdapterError::Unavailable("notifier", e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_response_parses_type_field() {
        let body: VerifyResponse = serde_json::from_str(
            r#"{"valid": true, "user_id": 1001, "type": "withdrawal"}"#,
        )
        .unwrap();
        assert!(body.valid);
        assert_eq!(body.user_id, Some(1001));
        assert_eq!(body.kind.as_deref(), Some("withdrawal"));
    }

    #[test]
    fn test_issue_response_tolerates_missing_error() {
        let body: IssueResponse =
            serde_json::from_str(r#"{"success": true, "otp_id": "abc"}"#).unwrap();
        assert!(body.success);
        assert_eq!(body.otp_id.as_deref(), Some("abc"));
        assert!(body.error.is_none());
    }

    #[tokio::test]
    async fn test_webhook_notifier_without_url_is_noop() {
        let notifier = WebhookNotifier::new(None, Duration::from_millis(100)).unwrap();
        let result = notifier
            .notify("withdrawal.requested", serde_json::json!({}))
            .await;
        assert!(result.is_ok());
    }
}
