//! Withdrawal Service
//!
//! The state machine that mediates every withdrawal-linked ledger mutation.
//! All transitions that both change status and move money run as one
//! transaction: a conditional status UPDATE plus the matching ledger row
//! commit together or not at all. Conditional updates double as the race
//! guard - whichever transaction commits first wins and the loser sees zero
//! rows affected.
//!
//! # Safety Invariants
//!
//! 1. Exactly one `withdrawal` debit per withdrawal, held from creation.
//! 2. Exactly one compensating credit iff the row reaches
//!    canceled/rejected/expired; none for paid.
//! 3. The balance check for create runs inside the create transaction under
//!    a per-user advisory lock - two concurrent creates cannot both spend
//!    the same funds.
//! 4. OTP failures never roll back the held debit; retry or expiry resolves.

use std::sync::Arc;
use tracing::{info, warn};

use crate::balance::{BalanceCalculator, BalanceSnapshot};
use crate::config::WithdrawalConfig;
use crate::ledger::{EntryDirection, EntryRefType, LedgerStore, NewLedgerEntry};
use crate::money;

use super::adapters::{self, Notifier, OtpVerifier, SettingsStore};
use super::db::{self, WithdrawalDb};
use super::error::WithdrawalError;
use super::state::WithdrawalStatus;
use super::types::{CreateWithdrawal, OtpIssueOutcome, Withdrawal, WithdrawalId};

/// Fallback policy values, parsed once from config. `settings_tb` overrides
/// them per key at request time.
#[derive(Debug, Clone, Copy)]
pub struct WithdrawalPolicy {
    /// micro-USDT
    pub min_amount: u64,
    /// micro-USDT, informational only - never debited
    pub fee: u64,
}

impl WithdrawalPolicy {
    pub fn from_config(config: &WithdrawalConfig) -> Result<Self, money::MoneyError> {
        Ok(Self {
            min_amount: money::parse_amount(&config.min_amount_usdt)?,
            fee: money::parse_non_negative(&config.fee_usdt)?,
        })
    }
}

impl Default for WithdrawalPolicy {
    fn default() -> Self {
        Self {
            min_amount: 10 * money::USDT_SCALE,
            fee: 0,
        }
    }
}

/// Withdrawal lifecycle service. Owns the `withdrawals_tb` entity and is the
/// only writer of withdrawal-linked ledger rows.
pub struct WithdrawalService {
    db: WithdrawalDb,
    otp: Arc<dyn OtpVerifier>,
    notifier: Arc<dyn Notifier>,
    settings: Arc<dyn SettingsStore>,
    policy: WithdrawalPolicy,
}

impl WithdrawalService {
    pub fn new(
        db: WithdrawalDb,
        otp: Arc<dyn OtpVerifier>,
        notifier: Arc<dyn Notifier>,
        settings: Arc<dyn SettingsStore>,
        policy: WithdrawalPolicy,
    ) -> Self {
        Self {
            db,
            otp,
            notifier,
            settings,
            policy,
        }
    }

    /// Create a withdrawal request: hold the funds, then best-effort issue
    /// the OTP.
    ///
    /// The insert and the ledger debit commit atomically under a per-user
    /// advisory lock, with the balance authority check inside the same
    /// transaction. OTP issuance happens after commit; its failure leaves
    /// the row in `requested` and is reported in the returned outcome.
    pub async fn create(
        &self,
        req: CreateWithdrawal,
    ) -> Result<(Withdrawal, OtpIssueOutcome), WithdrawalError> {
        if req.payout_address.trim().is_empty() {
            return Err(WithdrawalError::MissingPayoutAddress);
        }
        if req.amount == 0 {
            return Err(WithdrawalError::InvalidAmount);
        }

        let min = self.min_withdrawal().await;
        if req.amount < min {
            return Err(WithdrawalError::BelowMinimum {
                min: money::format_amount(min),
            });
        }

        let mut tx = self.db.pool().begin().await?;

        // Serialize concurrent creates per user; the balance is derived, so
        // the advisory lock stands in for a balance-row lock.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(req.user_id)
            .execute(&mut *tx)
            .await?;

        let snapshot = BalanceCalculator::snapshot_with(&mut *tx, req.user_id).await?;
        if snapshot.available < req.amount {
            return Err(WithdrawalError::InsufficientBalance);
        }

        let now = chrono::Utc::now();
        let mut withdrawal = Withdrawal {
            id: WithdrawalId::new(),
            user_id: req.user_id,
            amount: req.amount,
            payout_address: req.payout_address,
            status: WithdrawalStatus::Requested,
            otp_id: None,
            otp_sent_at: None,
            otp_verified_at: None,
            approved_by_admin_id: None,
            paid_tx_hash: None,
            paid_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
        };

        WithdrawalDb::insert_with(&mut *tx, &withdrawal).await?;

        LedgerStore::append_with(
            &mut *tx,
            NewLedgerEntry {
                user_id: withdrawal.user_id,
                direction: EntryDirection::Debit,
                amount: withdrawal.amount,
                ref_type: EntryRefType::Withdrawal,
                ref_id: withdrawal.id.to_string(),
                meta: serde_json::json!({
                    "event": "withdrawal_requested",
                    "payout_address": withdrawal.payout_address,
                }),
            },
        )
        .await?;

        tx.commit().await?;

        info!(
            withdrawal_id = %withdrawal.id,
            user_id = withdrawal.user_id,
            amount = %money::format_amount(withdrawal.amount),
            "Withdrawal created"
        );

        self.notify("withdrawal.requested", &withdrawal).await;

        let outcome = self.issue_otp(&mut withdrawal).await;

        Ok((withdrawal, outcome))
    }

    /// Re-issue the OTP for a withdrawal stuck in `requested` (issuance
    /// failed earlier) or `otp_sent` (code lost/expired channel-side).
    pub async fn request_otp(
        &self,
        id: WithdrawalId,
        user_id: i64,
    ) -> Result<Withdrawal, WithdrawalError> {
        let mut withdrawal = self.get_owned(id, user_id).await?;

        if !matches!(
            withdrawal.status,
            WithdrawalStatus::Requested | WithdrawalStatus::OtpSent
        ) {
            return Err(WithdrawalError::InvalidStateTransition {
                expected: "requested or otp_sent",
                current: withdrawal.status,
            });
        }

        match self.issue_otp(&mut withdrawal).await {
            OtpIssueOutcome::Issued { .. } => Ok(withdrawal),
            OtpIssueOutcome::Failed { reason } => {
                Err(WithdrawalError::ExternalServiceFailure(reason))
            }
        }
    }

    /// Confirm the OTP: delegates the code check to the verifier, then makes
    /// the otp_sent -> otp_verified transition. No ledger effect; re-confirm
    /// attempts fail on the status precondition before any verifier call.
    pub async fn confirm_otp(
        &self,
        id: WithdrawalId,
        user_id: i64,
        otp_id: &str,
        code: &str,
    ) -> Result<Withdrawal, WithdrawalError> {
        let withdrawal = self.get_owned(id, user_id).await?;

        if withdrawal.status != WithdrawalStatus::OtpSent {
            return Err(WithdrawalError::InvalidStateTransition {
                expected: "otp_sent",
                current: withdrawal.status,
            });
        }

        // The attempt must be the one recorded for this withdrawal
        if withdrawal.otp_id.as_deref() != Some(otp_id) {
            return Err(WithdrawalError::InvalidOtp);
        }

        let verdict = self
            .otp
            .verify(otp_id, code)
            .await
            .map_err(|e| WithdrawalError::ExternalServiceFailure(e.to_string()))?;

        if !verdict.valid {
            return Err(WithdrawalError::InvalidOtp);
        }
        if let Some(kind) = &verdict.kind
            && kind != "withdrawal"
        {
            return Err(WithdrawalError::InvalidOtp);
        }
        if verdict.user_id != Some(user_id) {
            return Err(WithdrawalError::OtpOwnershipMismatch);
        }

        let updated = WithdrawalDb::set_otp_verified(self.db.pool(), id).await?;
        if !updated {
            // Lost the race (expirer or a concurrent confirm) - report the
            // state we actually landed in
            let current = self.reload(id).await?;
            return Err(WithdrawalError::InvalidStateTransition {
                expected: "otp_sent",
                current: current.status,
            });
        }

        let withdrawal = self.reload(id).await?;
        info!(withdrawal_id = %id, user_id = user_id, "Withdrawal OTP verified");
        self.notify("withdrawal.otp_verified", &withdrawal).await;

        Ok(withdrawal)
    }

    /// User-initiated cancellation. Only pre-confirmation rows qualify
    /// ({requested, otp_sent}); once the OTP is confirmed, expiry or the
    /// admin path takes over.
    pub async fn cancel(
        &self,
        id: WithdrawalId,
        user_id: i64,
    ) -> Result<Withdrawal, WithdrawalError> {
        let withdrawal = self.get_owned(id, user_id).await?;

        let mut tx = self.db.pool().begin().await?;

        let updated = WithdrawalDb::update_status_if(
            &mut *tx,
            id,
            WithdrawalStatus::cancelable(),
            WithdrawalStatus::Canceled,
        )
        .await?;

        if !updated {
            drop(tx);
            let current = self.reload(id).await?;
            return Err(WithdrawalError::InvalidStateTransition {
                expected: "requested or otp_sent",
                current: current.status,
            });
        }

        LedgerStore::append_with(
            &mut *tx,
            NewLedgerEntry {
                user_id: withdrawal.user_id,
                direction: EntryDirection::Credit,
                amount: withdrawal.amount,
                ref_type: EntryRefType::Withdrawal,
                ref_id: withdrawal.id.to_string(),
                meta: serde_json::json!({ "event": "withdrawal_canceled" }),
            },
        )
        .await?;

        tx.commit().await?;

        let withdrawal = self.reload(id).await?;
        info!(withdrawal_id = %id, user_id = user_id, "Withdrawal canceled, funds restored");
        self.notify("withdrawal.canceled", &withdrawal).await;

        Ok(withdrawal)
    }

    /// Admin approval: otp_verified -> approved. No ledger effect - the
    /// debit was applied at creation.
    pub async fn approve(
        &self,
        id: WithdrawalId,
        admin_id: i64,
    ) -> Result<Withdrawal, WithdrawalError> {
        let _ = self
            .db
            .get(id)
            .await?
            .ok_or_else(|| WithdrawalError::NotFound(id.to_string()))?;

        let updated = WithdrawalDb::set_approved(self.db.pool(), id, admin_id).await?;
        if !updated {
            let current = self.reload(id).await?;
            return Err(WithdrawalError::InvalidStateTransition {
                expected: "otp_verified",
                current: current.status,
            });
        }

        let withdrawal = self.reload(id).await?;
        info!(withdrawal_id = %id, admin_id = admin_id, "Withdrawal approved");
        self.notify("withdrawal.approved", &withdrawal).await;

        Ok(withdrawal)
    }

    /// Admin rejection from any pre-payout status, restoring the funds.
    pub async fn reject(
        &self,
        id: WithdrawalId,
        admin_id: i64,
        reason: &str,
    ) -> Result<Withdrawal, WithdrawalError> {
        let withdrawal = self
            .db
            .get(id)
            .await?
            .ok_or_else(|| WithdrawalError::NotFound(id.to_string()))?;

        let mut tx = self.db.pool().begin().await?;

        let updated = WithdrawalDb::set_rejected(&mut *tx, id, reason).await?;
        if !updated {
            drop(tx);
            let current = self.reload(id).await?;
            return Err(WithdrawalError::InvalidStateTransition {
                expected: "pre-payout",
                current: current.status,
            });
        }

        LedgerStore::append_with(
            &mut *tx,
            NewLedgerEntry {
                user_id: withdrawal.user_id,
                direction: EntryDirection::Credit,
                amount: withdrawal.amount,
                ref_type: EntryRefType::Withdrawal,
                ref_id: withdrawal.id.to_string(),
                meta: serde_json::json!({
                    "event": "withdrawal_rejected",
                    "admin_id": admin_id,
                    "reason": reason,
                }),
            },
        )
        .await?;

        tx.commit().await?;

        let withdrawal = self.reload(id).await?;
        info!(
            withdrawal_id = %id,
            admin_id = admin_id,
            reason = %reason,
            "Withdrawal rejected, funds restored"
        );
        self.notify("withdrawal.rejected", &withdrawal).await;

        Ok(withdrawal)
    }

    /// Mark a withdrawal paid, attested by a transaction hash. Idempotent
    /// via the caller-supplied key: a repeat with the same key returns the
    /// cached response instead of re-executing.
    ///
    /// The payout audit debit uses `ref_type = withdrawal_payout`: it records
    /// the event without representing a second hold (available already
    /// excludes paid withdrawals by status).
    pub async fn mark_paid(
        &self,
        id: WithdrawalId,
        tx_hash: &str,
        admin_id: i64,
        idempotency_key: &str,
    ) -> Result<Withdrawal, WithdrawalError> {
        if tx_hash.trim().is_empty() {
            return Err(WithdrawalError::MissingTxHash);
        }
        if idempotency_key.trim().is_empty() {
            return Err(WithdrawalError::MissingIdempotencyKey);
        }

        if let Some(cached) = self.cached_receipt(id, idempotency_key).await? {
            return Ok(cached);
        }

        let _ = self
            .db
            .get(id)
            .await?
            .ok_or_else(|| WithdrawalError::NotFound(id.to_string()))?;

        let mut tx = self.db.pool().begin().await?;

        let updated = WithdrawalDb::set_paid(&mut *tx, id, tx_hash).await?;
        if !updated {
            drop(tx);
            // A concurrent call with this key may have just won; prefer its
            // cached response over a state error
            if let Some(cached) = self.cached_receipt(id, idempotency_key).await? {
                return Ok(cached);
            }
            let current = self.reload(id).await?;
            return Err(WithdrawalError::InvalidStateTransition {
                expected: "approved",
                current: current.status,
            });
        }

        let withdrawal = WithdrawalDb::get_with(&mut *tx, id)
            .await?
            .ok_or_else(|| WithdrawalError::SystemError("paid row vanished".to_string()))?;

        LedgerStore::append_with(
            &mut *tx,
            NewLedgerEntry {
                user_id: withdrawal.user_id,
                direction: EntryDirection::Debit,
                amount: withdrawal.amount,
                ref_type: EntryRefType::WithdrawalPayout,
                ref_id: withdrawal.id.to_string(),
                meta: serde_json::json!({
                    "event": "withdrawal_paid",
                    "admin_id": admin_id,
                    "tx_hash": tx_hash,
                }),
            },
        )
        .await?;

        let response = serde_json::to_value(&withdrawal)
            .map_err(|e| WithdrawalError::SystemError(e.to_string()))?;

        let inserted = db::insert_receipt(&mut *tx, idempotency_key, id, &response).await?;
        if !inserted {
            // Key raced in for a different withdrawal (same-withdrawal racers
            // already failed the status CAS above)
            drop(tx);
            return Err(WithdrawalError::IdempotencyConflict);
        }

        tx.commit().await?;

        info!(
            withdrawal_id = %id,
            admin_id = admin_id,
            tx_hash = %tx_hash,
            "Withdrawal marked paid"
        );
        self.notify("withdrawal.paid", &withdrawal).await;

        Ok(withdrawal)
    }

    /// Expire one stale withdrawal. Returns false when another actor already
    /// moved it - a no-op for the sweep, not an error.
    pub async fn expire(&self, withdrawal: &Withdrawal) -> Result<bool, WithdrawalError> {
        let mut tx = self.db.pool().begin().await?;

        let updated = WithdrawalDb::update_status_if(
            &mut *tx,
            withdrawal.id,
            WithdrawalStatus::expirable(),
            WithdrawalStatus::Expired,
        )
        .await?;

        if !updated {
            return Ok(false);
        }

        LedgerStore::append_with(
            &mut *tx,
            NewLedgerEntry {
                user_id: withdrawal.user_id,
                direction: EntryDirection::Credit,
                amount: withdrawal.amount,
                ref_type: EntryRefType::Withdrawal,
                ref_id: withdrawal.id.to_string(),
                meta: serde_json::json!({
                    "event": "withdrawal_expired",
                    "expired_from": withdrawal.status.as_str(),
                }),
            },
        )
        .await?;

        tx.commit().await?;

        info!(
            withdrawal_id = %withdrawal.id,
            user_id = withdrawal.user_id,
            "Stale withdrawal expired, funds restored"
        );
        let mut expired = withdrawal.clone();
        expired.status = WithdrawalStatus::Expired;
        self.notify("withdrawal.expired", &expired).await;

        Ok(true)
    }

    /// Candidates for the expiry sweep.
    pub async fn find_expirable(
        &self,
        max_age: std::time::Duration,
        limit: i64,
    ) -> Result<Vec<Withdrawal>, WithdrawalError> {
        self.db.find_expirable(max_age, limit).await
    }

    pub async fn get(&self, id: WithdrawalId) -> Result<Option<Withdrawal>, WithdrawalError> {
        self.db.get(id).await
    }

    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<Withdrawal>, WithdrawalError> {
        self.db.list_for_user(user_id).await
    }

    /// Effective minimum, settings override over config fallback.
    pub async fn min_withdrawal(&self) -> u64 {
        self.setting_amount(adapters::keys::MIN_WITHDRAWAL_AMOUNT, self.policy.min_amount)
            .await
    }

    /// Informational fee quoted on responses and notifications.
    pub async fn withdrawal_fee(&self) -> u64 {
        self.setting_amount(adapters::keys::WITHDRAWAL_FEE_USDT, self.policy.fee)
            .await
    }

    /// Balance snapshot pass-through for the API surface.
    pub async fn balance(&self, user_id: i64) -> Result<BalanceSnapshot, WithdrawalError> {
        Ok(BalanceCalculator::snapshot_with(self.db.pool(), user_id).await?)
    }

    // === helpers ===

    async fn get_owned(
        &self,
        id: WithdrawalId,
        user_id: i64,
    ) -> Result<Withdrawal, WithdrawalError> {
        let withdrawal = self
            .db
            .get(id)
            .await?
            .ok_or_else(|| WithdrawalError::NotFound(id.to_string()))?;

        if withdrawal.user_id != user_id {
            return Err(WithdrawalError::Unauthorized);
        }

        Ok(withdrawal)
    }

    /// Cached mark-paid response for this key, if any. A key bound to a
    /// different withdrawal is a conflict, not a cache hit.
    async fn cached_receipt(
        &self,
        id: WithdrawalId,
        idempotency_key: &str,
    ) -> Result<Option<Withdrawal>, WithdrawalError> {
        match db::get_receipt(self.db.pool(), idempotency_key).await? {
            Some(receipt) if receipt.withdrawal_id == id.to_string() => {
                let withdrawal: Withdrawal = serde_json::from_value(receipt.response)
                    .map_err(|e| WithdrawalError::SystemError(e.to_string()))?;
                Ok(Some(withdrawal))
            }
            Some(_) => Err(WithdrawalError::IdempotencyConflict),
            None => Ok(None),
        }
    }

    async fn reload(&self, id: WithdrawalId) -> Result<Withdrawal, WithdrawalError> {
        self.db
            .get(id)
            .await?
            .ok_or_else(|| WithdrawalError::NotFound(id.to_string()))
    }

    /// Issue an OTP and record it. Best-effort: every failure path leaves
    /// the withdrawal untouched and the held debit in place.
    async fn issue_otp(&self, withdrawal: &mut Withdrawal) -> OtpIssueOutcome {
        let issued = match self
            .otp
            .issue(withdrawal.user_id, withdrawal.id, withdrawal.amount)
            .await
        {
            Ok(issued) => issued,
            Err(e) => {
                warn!(
                    withdrawal_id = %withdrawal.id,
                    error = %e,
                    "OTP issuance failed, withdrawal stays in '{}'",
                    withdrawal.status
                );
                return OtpIssueOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        match WithdrawalDb::set_otp_issued(self.db.pool(), withdrawal.id, &issued.otp_id).await {
            Ok(true) => match self.reload(withdrawal.id).await {
                Ok(fresh) => {
                    *withdrawal = fresh;
                    self.notify("withdrawal.otp_sent", withdrawal).await;
                    OtpIssueOutcome::Issued {
                        otp_id: issued.otp_id,
                    }
                }
                Err(e) => OtpIssueOutcome::Failed {
                    reason: e.to_string(),
                },
            },
            Ok(false) => {
                warn!(
                    withdrawal_id = %withdrawal.id,
                    "Withdrawal state changed during OTP issuance, otp_id dropped"
                );
                OtpIssueOutcome::Failed {
                    reason: "withdrawal state changed during OTP issuance".to_string(),
                }
            }
            Err(e) => {
                warn!(withdrawal_id = %withdrawal.id, error = %e, "Failed to record issued OTP");
                OtpIssueOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn setting_amount(&self, key: &str, fallback: u64) -> u64 {
        match self.settings.get(key).await {
            Ok(Some(value)) => match money::parse_non_negative(&value) {
                Ok(amount) => amount,
                Err(e) => {
                    warn!(key = %key, value = %value, error = %e, "Unparseable setting, using fallback");
                    fallback
                }
            },
            Ok(None) => fallback,
            Err(e) => {
                warn!(key = %key, error = %e, "Settings store unavailable, using fallback");
                fallback
            }
        }
    }

    /// Post-commit notification; failures are logged and swallowed.
    async fn notify(&self, event: &'static str, withdrawal: &Withdrawal) {
        let payload = serde_json::json!({
            "withdrawal_id": withdrawal.id.to_string(),
            "user_id": withdrawal.user_id,
            "amount": money::format_amount(withdrawal.amount),
            "fee": money::format_amount(self.withdrawal_fee().await),
            "status": withdrawal.status.as_str(),
            "payout_address": withdrawal.payout_address,
        });

        if let Err(e) = self.notifier.notify(event, payload).await {
            warn!(event = %event, withdrawal_id = %withdrawal.id, error = %e, "Notification dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_config() {
        let config = WithdrawalConfig {
            min_amount_usdt: "10".to_string(),
            fee_usdt: "1.5".to_string(),
            otp_timeout_ms: 5_000,
        };
        let policy = WithdrawalPolicy::from_config(&config).unwrap();
        assert_eq!(policy.min_amount, 10_000_000);
        assert_eq!(policy.fee, 1_500_000);
    }

    #[test]
    fn test_policy_allows_zero_fee() {
        let config = WithdrawalConfig::default();
        let policy = WithdrawalPolicy::from_config(&config).unwrap();
        assert_eq!(policy.fee, 0);
        assert_eq!(policy.min_amount, 10_000_000);
    }

    #[test]
    fn test_policy_rejects_zero_minimum() {
        let config = WithdrawalConfig {
            min_amount_usdt: "0".to_string(),
            fee_usdt: "0".to_string(),
            otp_timeout_ms: 5_000,
        };
        assert!(WithdrawalPolicy::from_config(&config).is_err());
    }
}
