//! The ledger API (spec §4.3): the façade application code calls.
//!
//! `Ledger<S>` validates caller input, defaults an omitted idempotency key,
//! and delegates to a [`LedgerStore`] — the same two-layer split as the
//! teacher's `TransferCoordinator` sitting in front of `TransferDb`
//! (`internal_transfer/coordinator.rs`): request shaping and logging up
//! here, atomic state transitions down there.

use tracing::{info, instrument};

use crate::error::LedgerError;
use crate::event::Tx;
use crate::ids::{AccountId, IdempotencyKey, TransactionId};
use crate::money::Money;
use crate::persistence::{Balance, LedgerStore};

/// The ledger API, generic over its backing store.
pub struct Ledger<S: LedgerStore> {
    store: S,
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create a new account (spec §4.3.1). `idempotency_key` defaults to a
    /// fresh key when omitted, since account creation has no natural
    /// client-supplied retry key.
    #[instrument(skip(self))]
    pub async fn create_account(
        &self,
        name: &str,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Result<AccountId, LedgerError> {
        let key = idempotency_key.unwrap_or_default();
        let tx = self.store.create_account(name, key).await?;
        info!(account_id = %tx.account_id, name, "account created");
        Ok(tx.account_id)
    }

    pub async fn account_id(&self, name: &str) -> Result<AccountId, LedgerError> {
        self.store.account_id(name).await
    }

    /// Open a new PENDING group (spec §4.3.2). A positive `amount` is a
    /// debit (authorization hold on funds not yet received); a negative
    /// amount is a credit (reservation against `available_balance`).
    ///
    /// `prev_tx_id` is the optimistic-lock parameter: omit it to append to
    /// whatever the account head is at call time, or pass the id the caller
    /// last read to fail with [`LedgerError::ConcurrentModification`] if
    /// another writer got there first (spec §8 Scenario 6).
    #[instrument(skip(self))]
    pub async fn create_pending_transaction(
        &self,
        account_id: AccountId,
        amount: Money,
        idempotency_key: Option<IdempotencyKey>,
        prev_tx_id: Option<TransactionId>,
    ) -> Result<Tx, LedgerError> {
        let key = idempotency_key.unwrap_or_default();
        let tx = self
            .store
            .open_pending(account_id, key, amount, prev_tx_id)
            .await?;
        info!(account_id = %account_id, tx_id = %tx.id, amount = %amount, "pending transaction opened");
        Ok(tx)
    }

    /// Close `group_tx_id` with a SETTLEMENT event (spec §4.3.3). `prev_tx_id`
    /// is the same account-chain optimistic lock as
    /// [`Ledger::create_pending_transaction`].
    #[instrument(skip(self))]
    pub async fn settle_transaction(
        &self,
        account_id: AccountId,
        group_tx_id: TransactionId,
        idempotency_key: Option<IdempotencyKey>,
        prev_tx_id: Option<TransactionId>,
    ) -> Result<Tx, LedgerError> {
        let key = idempotency_key.unwrap_or_default();
        let tx = self
            .store
            .settle(account_id, group_tx_id, key, prev_tx_id)
            .await?;
        info!(account_id = %account_id, group_tx_id = %group_tx_id, tx_id = %tx.id, "group settled");
        Ok(tx)
    }

    /// Refund part or all of an open credit group (spec §4.3.4). `prev_tx_id`
    /// is the same account-chain optimistic lock as
    /// [`Ledger::create_pending_transaction`].
    #[instrument(skip(self))]
    pub async fn refund_pending_transaction(
        &self,
        account_id: AccountId,
        group_tx_id: TransactionId,
        amount: Money,
        idempotency_key: Option<IdempotencyKey>,
        prev_tx_id: Option<TransactionId>,
    ) -> Result<Tx, LedgerError> {
        let key = idempotency_key.unwrap_or_default();
        let tx = self
            .store
            .refund(account_id, group_tx_id, key, amount, prev_tx_id)
            .await?;
        info!(account_id = %account_id, group_tx_id = %group_tx_id, amount = %amount, "refund recorded");
        Ok(tx)
    }

    pub async fn balance(&self, account_id: AccountId) -> Result<Balance, LedgerError> {
        self.store.balance(account_id).await
    }

    pub async fn history(&self, account_id: AccountId) -> Result<Vec<Tx>, LedgerError> {
        self.store.history(account_id).await
    }

    /// Look up a single event and verify its content hash still matches its
    /// stored id (spec §8 tamper detection).
    pub async fn verify_event(&self, id: TransactionId) -> Result<bool, LedgerError> {
        let tx = self.store.event(id).await?;
        Ok(!tx.is_tampered())
    }
}
