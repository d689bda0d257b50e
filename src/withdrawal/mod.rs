//! Withdrawal Lifecycle
//!
//! OTP-gated withdrawal state machine over PostgreSQL, mediating every
//! withdrawal-linked ledger mutation.
//!
//! # State Machine
//!
//! ```text
//! requested → otp_sent → otp_verified → approved → paid
//!     ↓           ↓            ↓            ↓
//!  canceled    expired     rejected     rejected
//!  rejected    rejected
//!  expired
//! ```
//!
//! Terminal states: `paid`, `rejected`, `canceled`, `expired`. Every
//! terminal failure carries exactly one compensating ledger credit.
//!
//! # Safety Invariants
//!
//! 1. **Atomic transitions**: status change + ledger row commit together or
//!    not at all
//! 2. **Conditional updates**: every transition checks the expected status
//!    in the UPDATE itself; races resolve to exactly one winner
//! 3. **Held debit**: the ledger debit lands with the insert; OTP or
//!    notification failures never roll it back
//! 4. **Idempotent payout**: mark-paid replays return the cached receipt

pub mod adapters;
pub mod api;
pub mod db;
pub mod error;
pub mod expirer;
pub mod service;
pub mod state;
pub mod types;

#[cfg(test)]
mod integration_tests;

// Re-exports for convenience
pub use db::WithdrawalDb;
pub use error::WithdrawalError;
pub use expirer::{ExpirerConfig, ExpirerWorker, SweepReport};
pub use service::{WithdrawalPolicy, WithdrawalService};
pub use state::WithdrawalStatus;
pub use types::{CreateWithdrawal, OtpIssueOutcome, Withdrawal, WithdrawalId};
