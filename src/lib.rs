//! payout_core - Withdrawal Lifecycle & Balance Ledger
//!
//! The money core of the platform back-end: users accrue earnings (license
//! cashback, referral commissions, bonuses), and convert them into external
//! payouts through an OTP-gated, admin-approved withdrawal flow.
//!
//! # Modules
//!
//! - [`money`] - fixed-point micro-USDT conversion (6 decimals)
//! - [`ledger`] - append-only ledger of signed monetary movements
//! - [`balance`] - derived balance snapshots (pure read)
//! - [`withdrawal`] - the withdrawal state machine, expirer, adapters and
//!   API surface
//! - [`config`] / [`logging`] / [`db`] - service plumbing

pub mod config;
pub mod db;
pub mod logging;
pub mod money;

pub mod balance;
pub mod ledger;
pub mod withdrawal;

// Convenient re-exports at crate root
pub use balance::{BalanceCalculator, BalanceSnapshot};
pub use ledger::{EntryDirection, EntryRefType, LedgerEntry, LedgerStore};
pub use withdrawal::{
    ExpirerConfig, ExpirerWorker, Withdrawal, WithdrawalError, WithdrawalId, WithdrawalService,
    WithdrawalStatus,
};
