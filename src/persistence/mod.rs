//! The persistence contract (spec §6).
//!
//! [`LedgerStore`] is the seam the rest of the crate is built against — the
//! same shape of abstraction as the teacher's `OrderRepository`/
//! `BalanceRepository` traits (`persistence/repository.rs` in the source
//! tree), but expressed as whole-operation methods rather than raw reads,
//! because every ledger write is a read-validate-append unit that must stay
//! atomic. Two implementations satisfy it: [`postgres::PgLedgerStore`] for
//! production and [`memory::MemoryLedgerStore`] for tests, matching the way
//! the source splits a real `TDengineClient` from nothing more than mocks —
//! here both sides are real, because the invariant engine is cheap enough to
//! run against memory without faking anything.
//!
//! Native `async fn` in the trait is enough: [`crate::ledger::Ledger`] is
//! generic over `S: LedgerStore`, never boxes a `dyn LedgerStore`, so the
//! object-safety loss that async trait methods normally carry never bites.

pub mod memory;
pub mod postgres;
pub mod schema;

use crate::error::LedgerError;
use crate::event::Tx;
use crate::ids::{AccountId, IdempotencyKey, TransactionId};
use crate::money::Money;

/// An account's current balances, returned by [`LedgerStore::balance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balance {
    pub current_balance: Money,
    pub available_balance: Money,
}

/// The atomic operation surface a ledger backend must provide (spec §4.3,
/// §6). Every method here is a single all-or-nothing unit: it reads the
/// relevant chain head(s), asks [`crate::invariant`] to build the next
/// event, and appends it, or fails leaving no trace.
pub trait LedgerStore: Send + Sync {
    /// Create a new account and its root NEW_ACCOUNT event. Fails with
    /// [`LedgerError::DuplicateName`] if the name is taken.
    async fn create_account(
        &self,
        name: &str,
        idempotency_key: IdempotencyKey,
    ) -> Result<Tx, LedgerError>;

    /// Resolve an account name to its id.
    async fn account_id(&self, name: &str) -> Result<AccountId, LedgerError>;

    /// Open a new PENDING group on `account_id`.
    ///
    /// `expected_prev_tx_id` is the optimistic-lock parameter (spec §4.3.2):
    /// `None` appends to "whatever is head now"; `Some(id)` fails with
    /// [`LedgerError::ConcurrentModification`] unless `id` is still the
    /// current account head at append time.
    async fn open_pending(
        &self,
        account_id: AccountId,
        idempotency_key: IdempotencyKey,
        amount: Money,
        expected_prev_tx_id: Option<TransactionId>,
    ) -> Result<Tx, LedgerError>;

    /// Close `group_tx_id` with a SETTLEMENT event. `expected_prev_tx_id` is
    /// the same account-chain optimistic lock as [`LedgerStore::open_pending`].
    async fn settle(
        &self,
        account_id: AccountId,
        group_tx_id: TransactionId,
        idempotency_key: IdempotencyKey,
        expected_prev_tx_id: Option<TransactionId>,
    ) -> Result<Tx, LedgerError>;

    /// Append a partial (or final) REFUND against an open credit group.
    /// `expected_prev_tx_id` is the same account-chain optimistic lock as
    /// [`LedgerStore::open_pending`].
    async fn refund(
        &self,
        account_id: AccountId,
        group_tx_id: TransactionId,
        idempotency_key: IdempotencyKey,
        amount: Money,
        expected_prev_tx_id: Option<TransactionId>,
    ) -> Result<Tx, LedgerError>;

    /// The account's current balances, derived from its chain head.
    async fn balance(&self, account_id: AccountId) -> Result<Balance, LedgerError>;

    /// The full, chain-ordered event history for an account.
    async fn history(&self, account_id: AccountId) -> Result<Vec<Tx>, LedgerError>;

    /// A single event by id, for audit/tamper-check lookups (spec §8).
    async fn event(&self, id: TransactionId) -> Result<Tx, LedgerError>;
}
