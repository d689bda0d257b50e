//! Balance Calculator
//!
//! Derives a user's balance snapshot from persisted state: license cashback
//! accrual, released referral commissions and bonuses, minus every
//! withdrawal that still holds funds. Pure read - this module never mutates
//! anything, and it is advisory only: the authoritative balance check for a
//! new withdrawal runs inside the create transaction via [`snapshot_with`].
//!
//! `available = max(0, total_earned - total_withdrawals_held)`, floored at
//! zero. The floor is defensive against accounting inconsistency, not a
//! correctness proof.
//!
//! [`snapshot_with`]: BalanceCalculator::snapshot_with

use serde::Serialize;
use sqlx::{PgPool, Row};
use thiserror::Error;

use crate::money;
use crate::withdrawal::state::WithdrawalStatus;

/// Derived balance figures, all micro-USDT. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceSnapshot {
    /// Earned funds not held by any non-reversed withdrawal
    pub available: u64,
    /// Sum over withdrawals not yet paid and not yet reversed
    pub pending_withdrawals: u64,
    /// License accrual + released commissions + released bonuses
    pub total_earned: u64,
    /// Referral commissions not yet released
    pub pending_commissions: u64,
}

#[derive(Debug, Error)]
pub enum BalanceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt balance aggregate: {0}")]
    CorruptAggregate(String),
}

/// Read-only balance aggregation over the persisted tables.
pub struct BalanceCalculator {
    pool: PgPool,
}

impl BalanceCalculator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Compute the snapshot for one user.
    pub async fn snapshot(&self, user_id: i64) -> Result<BalanceSnapshot, BalanceError> {
        Self::snapshot_with(&self.pool, user_id).await
    }

    /// Same aggregate on a caller-supplied executor.
    ///
    /// The withdrawal service runs this inside its create transaction, after
    /// taking the per-user advisory lock, so the check and the debit see one
    /// consistent state.
    pub async fn snapshot_with<'e>(
        exec: impl sqlx::PgExecutor<'e>,
        user_id: i64,
    ) -> Result<BalanceSnapshot, BalanceError> {
        let held: Vec<i16> = WithdrawalStatus::holding_funds()
            .iter()
            .map(|s| s.id())
            .collect();
        let pending: Vec<i16> = WithdrawalStatus::pending().iter().map(|s| s.id()).collect();

        let row = sqlx::query(
            r#"
            SELECT
              (SELECT COALESCE(SUM(cashback_accrued), 0) FROM licenses_tb
                 WHERE user_id = $1 AND status IN ('active', 'paused', 'completed')) AS license_earned,
              (SELECT COALESCE(SUM(amount), 0) FROM referral_commissions_tb
                 WHERE user_id = $1 AND status = 'released')                         AS commissions_released,
              (SELECT COALESCE(SUM(amount), 0) FROM referral_commissions_tb
                 WHERE user_id = $1 AND status = 'pending')                          AS commissions_pending,
              (SELECT COALESCE(SUM(amount), 0) FROM bonuses_tb
                 WHERE user_id = $1 AND status = 'released')                         AS bonuses_released,
              (SELECT COALESCE(SUM(amount), 0) FROM withdrawals_tb
                 WHERE user_id = $1 AND status = ANY($2))                            AS withdrawals_held,
              (SELECT COALESCE(SUM(amount), 0) FROM withdrawals_tb
                 WHERE user_id = $1 AND status = ANY($3))                            AS withdrawals_pending
            "#,
        )
        .bind(user_id)
        .bind(&held)
        .bind(&pending)
        .fetch_one(exec)
        .await?;

        let license_earned = column_amount(&row, "license_earned")?;
        let commissions_released = column_amount(&row, "commissions_released")?;
        let commissions_pending = column_amount(&row, "commissions_pending")?;
        let bonuses_released = column_amount(&row, "bonuses_released")?;
        let withdrawals_held = column_amount(&row, "withdrawals_held")?;
        let withdrawals_pending = column_amount(&row, "withdrawals_pending")?;

        let total_earned = license_earned + commissions_released + bonuses_released;

        Ok(BalanceSnapshot {
            available: compute_available(total_earned, withdrawals_held),
            pending_withdrawals: withdrawals_pending,
            total_earned,
            pending_commissions: commissions_pending,
        })
    }
}

/// `max(0, earned - held)` in unsigned arithmetic.
fn compute_available(total_earned: u64, withdrawals_held: u64) -> u64 {
    total_earned.saturating_sub(withdrawals_held)
}

fn column_amount(row: &sqlx::postgres::PgRow, column: &str) -> Result<u64, BalanceError> {
    let value: rust_decimal::Decimal = row.get(column);
    money::from_db_decimal(value)
        .map_err(|e| BalanceError::CorruptAggregate(format!("{}: {}", column, e)))
}
