//! Balance Ledger
//!
//! Append-only log of signed monetary movements per user. Entries are never
//! updated or deleted: the signed sum of a user's entries (credit positive,
//! debit negative) is that user's net ledger position.
//!
//! Writers: the withdrawal lifecycle (debit on request, compensating credit
//! on cancel/reject/expire, payout audit debit on mark-paid) and the external
//! accrual/commission/bonus producers. Everything that moves money leaves a
//! row here.

pub mod store;
pub mod types;

pub use store::LedgerStore;
pub use types::{EntryDirection, EntryRefType, LedgerEntry, LedgerError, NewLedgerEntry};
