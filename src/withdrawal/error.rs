//! Withdrawal Error Types

use thiserror::Error;

use super::state::WithdrawalStatus;

/// Withdrawal lifecycle errors
///
/// Error codes are stable strings for API responses; OTP failures carry a
/// deliberately generic message so verification internals never leak.
#[derive(Error, Debug, Clone)]
pub enum WithdrawalError {
    // === Validation Errors ===
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Amount is below the minimum withdrawal of {min} USDT")]
    BelowMinimum { min: String },

    #[error("Payout address is required")]
    MissingPayoutAddress,

    #[error("Transaction hash is required")]
    MissingTxHash,

    #[error("Idempotency key is required")]
    MissingIdempotencyKey,

    // === Balance Errors ===
    #[error("Insufficient balance")]
    InsufficientBalance,

    // === Ownership / Lookup ===
    #[error("Withdrawal not found: {0}")]
    NotFound(String),

    #[error("Withdrawal does not belong to the caller")]
    Unauthorized,

    // === State Machine ===
    #[error("Withdrawal is not in {expected} status. Current status: '{current}'")]
    InvalidStateTransition {
        expected: &'static str,
        current: WithdrawalStatus,
    },

    // === OTP ===
    #[error("Invalid or expired OTP code")]
    InvalidOtp,

    #[error("Invalid or expired OTP code")]
    OtpOwnershipMismatch,

    // === Idempotency ===
    #[error("Idempotency key already used for a different withdrawal")]
    IdempotencyConflict,

    // === External Collaborators ===
    #[error("External service failure: {0}")]
    ExternalServiceFailure(String),

    // === System ===
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal system error: {0}")]
    SystemError(String),
}

impl WithdrawalError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            WithdrawalError::InvalidAmount => "INVALID_AMOUNT",
            WithdrawalError::BelowMinimum { .. } => "BELOW_MINIMUM",
            WithdrawalError::MissingPayoutAddress => "MISSING_PAYOUT_ADDRESS",
            WithdrawalError::MissingTxHash => "MISSING_TX_HASH",
            WithdrawalError::MissingIdempotencyKey => "MISSING_IDEMPOTENCY_KEY",
            WithdrawalError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            WithdrawalError::NotFound(_) => "NOT_FOUND",
            WithdrawalError::Unauthorized => "UNAUTHORIZED",
            WithdrawalError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            WithdrawalError::InvalidOtp => "INVALID_OTP",
            WithdrawalError::OtpOwnershipMismatch => "OTP_OWNERSHIP_MISMATCH",
            WithdrawalError::IdempotencyConflict => "IDEMPOTENCY_CONFLICT",
            WithdrawalError::ExternalServiceFailure(_) => "EXTERNAL_SERVICE_FAILURE",
            WithdrawalError::DatabaseError(_) => "DATABASE_ERROR",
            WithdrawalError::SystemError(_) => "SYSTEM_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            WithdrawalError::InvalidAmount
            | WithdrawalError::BelowMinimum { .. }
            | WithdrawalError::MissingPayoutAddress
            | WithdrawalError::MissingTxHash
            | WithdrawalError::MissingIdempotencyKey => 400,
            WithdrawalError::Unauthorized => 403,
            WithdrawalError::NotFound(_) => 404,
            WithdrawalError::IdempotencyConflict => 409,
            WithdrawalError::InsufficientBalance
            | WithdrawalError::InvalidStateTransition { .. }
            | WithdrawalError::InvalidOtp
            | WithdrawalError::OtpOwnershipMismatch => 422,
            WithdrawalError::ExternalServiceFailure(_) => 503,
            WithdrawalError::DatabaseError(_) | WithdrawalError::SystemError(_) => 500,
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WithdrawalError::ExternalServiceFailure(_) | WithdrawalError::DatabaseError(_)
        )
    }
}

impl From<sqlx::Error> for WithdrawalError {
    fn from(e: sqlx::Error) -> Self {
        WithdrawalError::DatabaseError(e.to_string())
    }
}

impl From<crate::ledger::LedgerError> for WithdrawalError {
    fn from(e: crate::ledger::LedgerError) -> Self {
        match e {
            crate::ledger::LedgerError::InvalidAmount => WithdrawalError::InvalidAmount,
            crate::ledger::LedgerError::Database(e) => WithdrawalError::DatabaseError(e.to_string()),
            crate::ledger::LedgerError::CorruptRow(msg) => WithdrawalError::SystemError(msg),
        }
    }
}

impl From<crate::balance::BalanceError> for WithdrawalError {
    fn from(e: crate::balance::BalanceError) -> Self {
        match e {
            crate::balance::BalanceError::Database(e) => {
                WithdrawalError::DatabaseError(e.to_string())
            }
            crate::balance::BalanceError::CorruptAggregate(msg) => {
                WithdrawalError::SystemError(msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            WithdrawalError::InsufficientBalance.code(),
            "INSUFFICIENT_BALANCE"
        );
        assert_eq!(WithdrawalError::InvalidOtp.code(), "INVALID_OTP");
        assert_eq!(WithdrawalError::Unauthorized.code(), "UNAUTHORIZED");
    }

    #[test]
    fn test_http_status() {
        assert_eq!(WithdrawalError::MissingPayoutAddress.http_status(), 400);
        assert_eq!(WithdrawalError::Unauthorized.http_status(), 403);
        assert_eq!(WithdrawalError::NotFound("x".into()).http_status(), 404);
        assert_eq!(WithdrawalError::IdempotencyConflict.http_status(), 409);
        assert_eq!(WithdrawalError::InsufficientBalance.http_status(), 422);
        assert_eq!(
            WithdrawalError::ExternalServiceFailure("otp".into()).http_status(),
            503
        );
    }

    #[test]
    fn test_state_transition_message_names_current_status() {
        let err = WithdrawalError::InvalidStateTransition {
            expected: "requested",
            current: WithdrawalStatus::Approved,
        };
        let msg = err.to_string();
        assert!(msg.contains("approved"), "message was: {}", msg);
        assert!(msg.contains("requested"), "message was: {}", msg);
    }

    #[test]
    fn test_otp_errors_share_generic_message() {
        // Ownership mismatches must be indistinguishable from a bad code
        assert_eq!(
            WithdrawalError::InvalidOtp.to_string(),
            WithdrawalError::OtpOwnershipMismatch.to_string()
        );
    }

    #[test]
    fn test_retryable() {
        assert!(WithdrawalError::ExternalServiceFailure("timeout".into()).is_retryable());
        assert!(!WithdrawalError::InsufficientBalance.is_retryable());
        assert!(!WithdrawalError::InvalidOtp.is_retryable());
    }
}
