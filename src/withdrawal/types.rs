//! Withdrawal Core Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::state::WithdrawalStatus;

/// Withdrawal ID - ULID-based unique identifier
///
/// Monotonic, sortable, no coordination needed. Stored as TEXT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WithdrawalId(ulid::Ulid);

impl WithdrawalId {
    /// Generate a new unique WithdrawalId
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Get the inner ULID value
    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for WithdrawalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WithdrawalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WithdrawalId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

impl Serialize for WithdrawalId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for WithdrawalId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for WithdrawalStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i16(self.id())
    }
}

impl<'de> Deserialize<'de> for WithdrawalStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = i16::deserialize(deserializer)?;
        WithdrawalStatus::from_id(id)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid status id: {}", id)))
    }
}

/// One withdrawal attempt as stored in `withdrawals_tb`.
///
/// Rows are never deleted; terminal states are final. Exactly one ledger
/// debit exists once the row exists, and exactly one compensating credit
/// exists iff the row reaches rejected/canceled/expired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: WithdrawalId,
    pub user_id: i64,
    /// micro-USDT
    pub amount: u64,
    pub payout_address: String,
    pub status: WithdrawalStatus,
    /// Opaque token minted by the OTP verifier; attempt state lives there
    pub otp_id: Option<String>,
    pub otp_sent_at: Option<DateTime<Utc>>,
    pub otp_verified_at: Option<DateTime<Utc>>,
    pub approved_by_admin_id: Option<i64>,
    pub paid_tx_hash: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for Withdrawal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Withdrawal[{}] user={} amount={} status={}",
            self.id, self.user_id, self.amount, self.status
        )
    }
}

/// Validated input for creating a withdrawal.
#[derive(Debug, Clone)]
pub struct CreateWithdrawal {
    pub user_id: i64,
    /// micro-USDT
    pub amount: u64,
    pub payout_address: String,
}

/// Outcome of the post-create OTP issuance step.
///
/// Issuance is best-effort: a failure never rolls back the held debit, it is
/// surfaced as retryable alongside the created withdrawal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpIssueOutcome {
    Issued { otp_id: String },
    Failed { reason: String },
}

impl OtpIssueOutcome {
    #[inline]
    pub fn is_issued(&self) -> bool {
        matches!(self, OtpIssueOutcome::Issued { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_withdrawal_id_roundtrip() {
        let id = WithdrawalId::new();
        let parsed: WithdrawalId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_withdrawal_id_rejects_garbage() {
        assert!("not-a-ulid!".parse::<WithdrawalId>().is_err());
    }

    #[test]
    fn test_withdrawal_serde_roundtrip() {
        let w = Withdrawal {
            id: WithdrawalId::new(),
            user_id: 1001,
            amount: 10_000_000,
            payout_address: "TXYZabc123".to_string(),
            status: WithdrawalStatus::Approved,
            otp_id: Some("otp-1".to_string()),
            otp_sent_at: Some(Utc::now()),
            otp_verified_at: Some(Utc::now()),
            approved_by_admin_id: Some(7),
            paid_tx_hash: None,
            paid_at: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(&w).unwrap();
        let back: Withdrawal = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, w.id);
        assert_eq!(back.status, WithdrawalStatus::Approved);
        assert_eq!(back.amount, 10_000_000);
    }

    #[test]
    fn test_status_serde_rejects_unknown_id() {
        let result: Result<WithdrawalStatus, _> = serde_json::from_value(serde_json::json!(77));
        assert!(result.is_err());
    }

    #[test]
    fn test_otp_issue_outcome() {
        assert!(OtpIssueOutcome::Issued { otp_id: "x".into() }.is_issued());
        assert!(
            !OtpIssueOutcome::Failed {
                reason: "timeout".into()
            }
            .is_issued()
        );
    }
}
