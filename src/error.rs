//! Ledger error taxonomy (spec §7).
//!
//! One variant per documented failure kind, plus a `Storage` variant that
//! wraps whatever the backing [`crate::persistence`] implementation reports.
//! Modeled on the teacher's `MoneyError`/`ScannerError` style: explicit,
//! enumerated `#[error(...)]` variants, no stringly-typed catch-all except
//! the documented `IntegrityViolation` fallback.

use thiserror::Error;

use crate::ids::{AccountId, TransactionId};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("account name already exists: {0}")]
    DuplicateName(String),

    #[error("idempotency key already used")]
    DuplicateIdempotencyKey,

    #[error("expected head {expected} is not the current head of its chain")]
    ConcurrentModification { expected: TransactionId },

    #[error("unknown account: {0}")]
    UnknownAccount(AccountId),

    #[error("unknown group: {0}")]
    UnknownGroup(TransactionId),

    #[error("event {0} is not a group root (PENDING)")]
    NotAGroupRoot(TransactionId),

    #[error("invalid refund: {0}")]
    InvalidRefund(&'static str),

    #[error("insufficient funds: available balance would go negative")]
    InsufficientFunds,

    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}
