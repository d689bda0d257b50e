//! Ledger Core Types

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Direction of a ledger entry. Stored as TEXT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryDirection {
    Credit,
    Debit,
}

impl EntryDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryDirection::Credit => "credit",
            EntryDirection::Debit => "debit",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "credit" => Some(EntryDirection::Credit),
            "debit" => Some(EntryDirection::Debit),
            _ => None,
        }
    }

    /// Sign applied when aggregating the user's position.
    #[inline]
    pub fn sign(&self) -> i64 {
        match self {
            EntryDirection::Credit => 1,
            EntryDirection::Debit => -1,
        }
    }
}

impl fmt::Display for EntryDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What an entry references. Stored as TEXT.
///
/// `WithdrawalPayout` is the mark-paid audit debit; it is tagged separately
/// from `Withdrawal` so that "exactly one withdrawal debit per withdrawal"
/// stays checkable and position arithmetic can exclude audit rows by type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryRefType {
    Withdrawal,
    WithdrawalPayout,
    ReferralCommission,
    Bonus,
    AdminAdjustment,
    LicenseEarning,
}

impl EntryRefType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryRefType::Withdrawal => "withdrawal",
            EntryRefType::WithdrawalPayout => "withdrawal_payout",
            EntryRefType::ReferralCommission => "referral_commission",
            EntryRefType::Bonus => "bonus",
            EntryRefType::AdminAdjustment => "admin_adjustment",
            EntryRefType::LicenseEarning => "license_earning",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "withdrawal" => Some(EntryRefType::Withdrawal),
            "withdrawal_payout" => Some(EntryRefType::WithdrawalPayout),
            "referral_commission" => Some(EntryRefType::ReferralCommission),
            "bonus" => Some(EntryRefType::Bonus),
            "admin_adjustment" => Some(EntryRefType::AdminAdjustment),
            "license_earning" => Some(EntryRefType::LicenseEarning),
            _ => None,
        }
    }
}

impl fmt::Display for EntryRefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One immutable ledger row.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: i64,
    pub direction: EntryDirection,
    /// micro-USDT, always positive; the sign lives in `direction`
    pub amount: u64,
    pub ref_type: EntryRefType,
    pub ref_id: String,
    /// Free-form audit payload
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Input for appending a row.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub user_id: i64,
    pub direction: EntryDirection,
    pub amount: u64,
    pub ref_type: EntryRefType,
    pub ref_id: String,
    pub meta: serde_json::Value,
}

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger amount must be positive")]
    InvalidAmount,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt ledger row: {0}")]
    CorruptRow(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_roundtrip() {
        for d in [EntryDirection::Credit, EntryDirection::Debit] {
            assert_eq!(EntryDirection::from_str(d.as_str()), Some(d));
        }
        assert_eq!(EntryDirection::from_str("refund"), None);
    }

    #[test]
    fn test_direction_sign() {
        assert_eq!(EntryDirection::Credit.sign(), 1);
        assert_eq!(EntryDirection::Debit.sign(), -1);
    }

    #[test]
    fn test_ref_type_roundtrip() {
        let all = [
            EntryRefType::Withdrawal,
            EntryRefType::WithdrawalPayout,
            EntryRefType::ReferralCommission,
            EntryRefType::Bonus,
            EntryRefType::AdminAdjustment,
            EntryRefType::LicenseEarning,
        ];
        for r in all {
            assert_eq!(EntryRefType::from_str(r.as_str()), Some(r));
        }
        assert_eq!(EntryRefType::from_str("deposit"), None);
    }
}
