//! Withdrawal Database Layer
//!
//! PostgreSQL persistence for withdrawal state. Every transition helper is a
//! conditional UPDATE (atomic CAS on the expected status): zero rows affected
//! means another actor won the race, and the caller decides whether that is
//! an error or a no-op. Transition helpers take a caller-supplied executor so
//! the service can run them inside the same transaction as the matching
//! ledger write.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::time::Duration;

use crate::money;

use super::error::WithdrawalError;
use super::state::WithdrawalStatus;
use super::types::{Withdrawal, WithdrawalId};

/// Withdrawal database operations
pub struct WithdrawalDb {
    pool: PgPool,
}

impl WithdrawalDb {
    /// Create a new WithdrawalDb with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for the service to open transactions on.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a freshly constructed withdrawal row.
    pub async fn insert_with<'e>(
        exec: impl sqlx::PgExecutor<'e>,
        w: &Withdrawal,
    ) -> Result<(), WithdrawalError> {
        sqlx::query(
            r#"
            INSERT INTO withdrawals_tb
                (id, user_id, amount, payout_address, status, notes, created_at, updated_at)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(w.id.to_string())
        .bind(w.user_id)
        .bind(money::to_db_decimal(w.amount))
        .bind(&w.payout_address)
        .bind(w.status.id())
        .bind(&w.notes)
        .bind(w.created_at)
        .bind(w.updated_at)
        .execute(exec)
        .await?;

        Ok(())
    }

    /// Get a withdrawal by id
    pub async fn get(&self, id: WithdrawalId) -> Result<Option<Withdrawal>, WithdrawalError> {
        Self::get_with(&self.pool, id).await
    }

    /// Get a withdrawal by id on a caller-supplied executor
    pub async fn get_with<'e>(
        exec: impl sqlx::PgExecutor<'e>,
        id: WithdrawalId,
    ) -> Result<Option<Withdrawal>, WithdrawalError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, amount, payout_address, status, otp_id, otp_sent_at,
                   otp_verified_at, approved_by_admin_id, paid_tx_hash, paid_at, notes,
                   created_at, updated_at
            FROM withdrawals_tb
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(exec)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_withdrawal(&row)?)),
            None => Ok(None),
        }
    }

    /// All withdrawals for a user, newest first.
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<Withdrawal>, WithdrawalError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, amount, payout_address, status, otp_id, otp_sent_at,
                   otp_verified_at, approved_by_admin_id, paid_tx_hash, paid_at, notes,
                   created_at, updated_at
            FROM withdrawals_tb
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(row_to_withdrawal(&row)?);
        }

        Ok(records)
    }

    /// Atomic CAS update: set `new` only if the current status is one of
    /// `expected`. Returns true if the update landed.
    pub async fn update_status_if<'e>(
        exec: impl sqlx::PgExecutor<'e>,
        id: WithdrawalId,
        expected: &[WithdrawalStatus],
        new: WithdrawalStatus,
    ) -> Result<bool, WithdrawalError> {
        let expected_ids: Vec<i16> = expected.iter().map(|s| s.id()).collect();

        let result = sqlx::query(
            r#"
            UPDATE withdrawals_tb
            SET status = $1, updated_at = NOW()
            WHERE id = $2 AND status = ANY($3)
            "#,
        )
        .bind(new.id())
        .bind(id.to_string())
        .bind(&expected_ids)
        .execute(exec)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a successful OTP issuance: otp_id, otp_sent_at and the
    /// requested -> otp_sent transition land in one conditional UPDATE.
    /// Re-issuance over an existing otp_sent row replaces the otp_id.
    pub async fn set_otp_issued<'e>(
        exec: impl sqlx::PgExecutor<'e>,
        id: WithdrawalId,
        otp_id: &str,
    ) -> Result<bool, WithdrawalError> {
        let expected: Vec<i16> = [WithdrawalStatus::Requested, WithdrawalStatus::OtpSent]
            .iter()
            .map(|s| s.id())
            .collect();

        let result = sqlx::query(
            r#"
            UPDATE withdrawals_tb
            SET status = $1, otp_id = $2, otp_sent_at = NOW(), updated_at = NOW()
            WHERE id = $3 AND status = ANY($4)
            "#,
        )
        .bind(WithdrawalStatus::OtpSent.id())
        .bind(otp_id)
        .bind(id.to_string())
        .bind(&expected)
        .execute(exec)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// otp_sent -> otp_verified
    pub async fn set_otp_verified<'e>(
        exec: impl sqlx::PgExecutor<'e>,
        id: WithdrawalId,
    ) -> Result<bool, WithdrawalError> {
        let result = sqlx::query(
            r#"
            UPDATE withdrawals_tb
            SET status = $1, otp_verified_at = NOW(), updated_at = NOW()
            WHERE id = $2 AND status = $3
            "#,
        )
        .bind(WithdrawalStatus::OtpVerified.id())
        .bind(id.to_string())
        .bind(WithdrawalStatus::OtpSent.id())
        .execute(exec)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// otp_verified -> approved, recording the acting admin
    pub async fn set_approved<'e>(
        exec: impl sqlx::PgExecutor<'e>,
        id: WithdrawalId,
        admin_id: i64,
    ) -> Result<bool, WithdrawalError> {
        let result = sqlx::query(
            r#"
            UPDATE withdrawals_tb
            SET status = $1, approved_by_admin_id = $2, updated_at = NOW()
            WHERE id = $3 AND status = $4
            "#,
        )
        .bind(WithdrawalStatus::Approved.id())
        .bind(admin_id)
        .bind(id.to_string())
        .bind(WithdrawalStatus::OtpVerified.id())
        .execute(exec)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// approved -> paid, recording the payout attestation
    pub async fn set_paid<'e>(
        exec: impl sqlx::PgExecutor<'e>,
        id: WithdrawalId,
        tx_hash: &str,
    ) -> Result<bool, WithdrawalError> {
        let result = sqlx::query(
            r#"
            UPDATE withdrawals_tb
            SET status = $1, paid_tx_hash = $2, paid_at = NOW(), updated_at = NOW()
            WHERE id = $3 AND status = $4
            "#,
        )
        .bind(WithdrawalStatus::Paid.id())
        .bind(tx_hash)
        .bind(id.to_string())
        .bind(WithdrawalStatus::Approved.id())
        .execute(exec)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// any pre-payout status -> rejected, storing the reason in notes
    pub async fn set_rejected<'e>(
        exec: impl sqlx::PgExecutor<'e>,
        id: WithdrawalId,
        reason: &str,
    ) -> Result<bool, WithdrawalError> {
        let expected: Vec<i16> = WithdrawalStatus::rejectable()
            .iter()
            .map(|s| s.id())
            .collect();

        let result = sqlx::query(
            r#"
            UPDATE withdrawals_tb
            SET status = $1, notes = $2, updated_at = NOW()
            WHERE id = $3 AND status = ANY($4)
            "#,
        )
        .bind(WithdrawalStatus::Rejected.id())
        .bind(reason)
        .bind(id.to_string())
        .bind(&expected)
        .execute(exec)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Find stale withdrawals the expiry sweep should reclaim: still in
    /// {requested, otp_sent} and older than `max_age`.
    pub async fn find_expirable(
        &self,
        max_age: Duration,
        limit: i64,
    ) -> Result<Vec<Withdrawal>, WithdrawalError> {
        let expirable: Vec<i16> = WithdrawalStatus::expirable()
            .iter()
            .map(|s| s.id())
            .collect();
        let max_age_secs = max_age.as_secs() as i64;

        let rows = sqlx::query(
            r#"
            SELECT id, user_id, amount, payout_address, status, otp_id, otp_sent_at,
                   otp_verified_at, approved_by_admin_id, paid_tx_hash, paid_at, notes,
                   created_at, updated_at
            FROM withdrawals_tb
            WHERE status = ANY($1)
              AND created_at < NOW() - INTERVAL '1 second' * $2
            ORDER BY created_at ASC
            LIMIT $3
            "#,
        )
        .bind(&expirable)
        .bind(max_age_secs)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(row_to_withdrawal(&row)?);
        }

        Ok(records)
    }
}

// === Payout Receipts (mark-paid idempotency) ===

/// Cached mark-paid response keyed by the caller's idempotency key.
#[derive(Debug, Clone)]
pub struct PayoutReceipt {
    pub idempotency_key: String,
    pub withdrawal_id: String,
    pub response: serde_json::Value,
}

/// Look up a receipt by idempotency key.
pub async fn get_receipt<'e>(
    exec: impl sqlx::PgExecutor<'e>,
    idempotency_key: &str,
) -> Result<Option<PayoutReceipt>, WithdrawalError> {
    let row = sqlx::query(
        r#"
        SELECT idempotency_key, withdrawal_id, response
        FROM payout_receipts_tb
        WHERE idempotency_key = $1
        "#,
    )
    .bind(idempotency_key)
    .fetch_optional(exec)
    .await?;

    Ok(row.map(|r| PayoutReceipt {
        idempotency_key: r.get("idempotency_key"),
        withdrawal_id: r.get("withdrawal_id"),
        response: r.get("response"),
    }))
}

/// Record a mark-paid receipt. Returns true if inserted, false if the key
/// already existed (concurrent duplicate).
pub async fn insert_receipt<'e>(
    exec: impl sqlx::PgExecutor<'e>,
    idempotency_key: &str,
    withdrawal_id: WithdrawalId,
    response: &serde_json::Value,
) -> Result<bool, WithdrawalError> {
    let result = sqlx::query(
        r#"
        INSERT INTO payout_receipts_tb (idempotency_key, withdrawal_id, response)
        VALUES ($1, $2, $3)
        ON CONFLICT (idempotency_key) DO NOTHING
        "#,
    )
    .bind(idempotency_key)
    .bind(withdrawal_id.to_string())
    .bind(response)
    .execute(exec)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Convert a database row to a Withdrawal
fn row_to_withdrawal(row: &sqlx::postgres::PgRow) -> Result<Withdrawal, WithdrawalError> {
    let id_str: String = row.get("id");
    let id: WithdrawalId = id_str
        .parse()
        .map_err(|_| WithdrawalError::SystemError(format!("Invalid withdrawal id: {}", id_str)))?;

    let status_id: i16 = row.get("status");
    let status = WithdrawalStatus::from_id(status_id)
        .ok_or_else(|| WithdrawalError::SystemError(format!("Invalid status ID: {}", status_id)))?;

    let amount: rust_decimal::Decimal = row.get("amount");
    let amount = money::from_db_decimal(amount)
        .map_err(|e| WithdrawalError::SystemError(format!("Invalid amount: {}", e)))?;

    let created_at: DateTime<Utc> = row.get("created_at");
    let updated_at: DateTime<Utc> = row.get("updated_at");

    Ok(Withdrawal {
        id,
        user_id: row.get("user_id"),
        amount,
        payout_address: row.get("payout_address"),
        status,
        otp_id: row.get("otp_id"),
        otp_sent_at: row.get("otp_sent_at"),
        otp_verified_at: row.get("otp_verified_at"),
        approved_by_admin_id: row.get("approved_by_admin_id"),
        paid_tx_hash: row.get("paid_tx_hash"),
        paid_at: row.get("paid_at"),
        notes: row.get("notes"),
        created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expirable_filter_ids() {
        let ids: Vec<i16> = WithdrawalStatus::expirable()
            .iter()
            .map(|s| s.id())
            .collect();
        assert_eq!(ids, vec![10, 20]);
    }

    #[test]
    fn test_receipt_shape() {
        let receipt = PayoutReceipt {
            idempotency_key: "admin-7-retry-1".to_string(),
            withdrawal_id: WithdrawalId::new().to_string(),
            response: serde_json::json!({"status": 50}),
        };
        assert_eq!(receipt.response["status"], 50);
    }
}
