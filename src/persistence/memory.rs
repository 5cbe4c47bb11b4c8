//! In-process [`LedgerStore`] used by unit and scenario tests (spec §8).
//!
//! Holds the same chain the Postgres store persists, just in a
//! `tokio::sync::Mutex` instead of a table, and resolves heads with
//! [`head_by_set_difference`] directly rather than its SQL restatement.
//! Modeled on the teacher's habit of testing FSM logic against a plain
//! struct (`internal_transfer/integration_tests.rs`'s `MockAdapter`) instead
//! of a trait-object mock.

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::chain::{check_expected_head, head_by_set_difference, AccountHead, GroupHead};
use crate::error::LedgerError;
use crate::event::{Tx, TxKind};
use crate::ids::{AccountId, IdempotencyKey, TransactionId};
use crate::invariant;
use crate::money::Money;

use super::{Balance, LedgerStore};

#[derive(Default)]
struct State {
    names: HashMap<String, AccountId>,
    events_by_account: HashMap<AccountId, Vec<TransactionId>>,
    events: HashMap<TransactionId, Tx>,
    idempotency: HashMap<IdempotencyKey, TransactionId>,
}

impl State {
    fn account_events(&self, account_id: AccountId) -> Result<Vec<Tx>, LedgerError> {
        self.events_by_account
            .get(&account_id)
            .ok_or(LedgerError::UnknownAccount(account_id))?
            .iter()
            .map(|id| self.events.get(id).cloned().expect("indexed event missing"))
            .map(Ok)
            .collect()
    }

    fn account_head(&self, account_id: AccountId) -> Result<AccountHead, LedgerError> {
        let events = self.account_events(account_id)?;
        let heads = head_by_set_difference(&events, |e| e.prev_tx_id);
        let head_id = *heads
            .first()
            .filter(|_| heads.len() == 1)
            .ok_or_else(|| LedgerError::IntegrityViolation("account chain has no unique head".into()))?;
        let tx = events.into_iter().find(|e| e.id == head_id).unwrap();
        Ok(AccountHead {
            tx_id: tx.id,
            current_balance: tx.current_balance,
            available_balance: tx.available_balance,
        })
    }

    fn group_head(&self, account_id: AccountId, group_tx_id: TransactionId) -> Result<GroupHead, LedgerError> {
        let events = self.account_events(account_id)?;
        let root = events
            .iter()
            .find(|e| e.id == group_tx_id)
            .ok_or(LedgerError::UnknownGroup(group_tx_id))?;
        if !matches!(root.kind, TxKind::Pending) {
            return Err(LedgerError::NotAGroupRoot(group_tx_id));
        }
        let root_is_debit = root.amount.is_positive();

        let members: Vec<Tx> = events
            .into_iter()
            .filter(|e| e.id == group_tx_id || e.group_tx_id == Some(group_tx_id))
            .collect();
        let closed = members.iter().any(|e| matches!(e.kind, TxKind::Settlement));
        let heads = head_by_set_difference(&members, |e| e.group_prev_tx_id);
        let head_id = *heads
            .first()
            .filter(|_| heads.len() == 1)
            .ok_or_else(|| LedgerError::IntegrityViolation("group chain has no unique head".into()))?;
        let head = members.into_iter().find(|e| e.id == head_id).unwrap();
        Ok(GroupHead {
            tx_id: head.id,
            group_tx_id,
            pending_amount: head.pending_amount,
            root_is_debit,
            closed,
        })
    }

    fn insert(&mut self, tx: Tx) -> Result<(), LedgerError> {
        if self.idempotency.contains_key(&tx.idempotency_key) {
            return Err(LedgerError::DuplicateIdempotencyKey);
        }
        if let Some(prev) = tx.prev_tx_id {
            if self
                .events
                .values()
                .any(|existing| existing.prev_tx_id == Some(prev))
            {
                return Err(LedgerError::ConcurrentModification { expected: prev });
            }
        }
        self.idempotency.insert(tx.idempotency_key, tx.id);
        self.events_by_account
            .entry(tx.account_id)
            .or_default()
            .push(tx.id);
        self.events.insert(tx.id, tx);
        Ok(())
    }
}

/// In-memory ledger store.
#[derive(Default)]
pub struct MemoryLedgerStore {
    state: Mutex<State>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryLedgerStore {
    async fn create_account(
        &self,
        name: &str,
        idempotency_key: IdempotencyKey,
    ) -> Result<Tx, LedgerError> {
        let mut state = self.state.lock().await;
        if state.names.contains_key(name) {
            return Err(LedgerError::DuplicateName(name.to_string()));
        }
        let account_id = AccountId::new();
        let tx = invariant::build_new_account(account_id, idempotency_key).into_tx();
        state.insert(tx.clone())?;
        state.names.insert(name.to_string(), account_id);
        Ok(tx)
    }

    async fn account_id(&self, name: &str) -> Result<AccountId, LedgerError> {
        let state = self.state.lock().await;
        state
            .names
            .get(name)
            .copied()
            .ok_or_else(|| LedgerError::DuplicateName(format!("no such account: {name}")))
    }

    async fn open_pending(
        &self,
        account_id: AccountId,
        idempotency_key: IdempotencyKey,
        amount: Money,
        expected_prev_tx_id: Option<TransactionId>,
    ) -> Result<Tx, LedgerError> {
        let mut state = self.state.lock().await;
        let head = state.account_head(account_id)?;
        check_expected_head(head.tx_id, expected_prev_tx_id)?;
        let draft = invariant::build_pending(account_id, idempotency_key, amount, &head)?;
        let mut tx = draft.into_tx();
        tx.group_tx_id = Some(tx.id);
        invariant::check_universal_invariants(&tx.as_draft())?;
        state.insert(tx.clone())?;
        Ok(tx)
    }

    async fn settle(
        &self,
        account_id: AccountId,
        group_tx_id: TransactionId,
        idempotency_key: IdempotencyKey,
        expected_prev_tx_id: Option<TransactionId>,
    ) -> Result<Tx, LedgerError> {
        let mut state = self.state.lock().await;
        let head = state.account_head(account_id)?;
        check_expected_head(head.tx_id, expected_prev_tx_id)?;
        let group = state.group_head(account_id, group_tx_id)?;
        let draft = invariant::build_settlement(account_id, idempotency_key, &head, &group)?;
        invariant::check_universal_invariants(&draft)?;
        let tx = draft.into_tx();
        state.insert(tx.clone())?;
        Ok(tx)
    }

    async fn refund(
        &self,
        account_id: AccountId,
        group_tx_id: TransactionId,
        idempotency_key: IdempotencyKey,
        amount: Money,
        expected_prev_tx_id: Option<TransactionId>,
    ) -> Result<Tx, LedgerError> {
        let mut state = self.state.lock().await;
        let head = state.account_head(account_id)?;
        check_expected_head(head.tx_id, expected_prev_tx_id)?;
        let group = state.group_head(account_id, group_tx_id)?;
        let draft = invariant::build_refund(account_id, idempotency_key, amount, &head, &group)?;
        invariant::check_universal_invariants(&draft)?;
        let tx = draft.into_tx();
        state.insert(tx.clone())?;
        Ok(tx)
    }

    async fn balance(&self, account_id: AccountId) -> Result<Balance, LedgerError> {
        let state = self.state.lock().await;
        let head = state.account_head(account_id)?;
        Ok(Balance {
            current_balance: head.current_balance,
            available_balance: head.available_balance,
        })
    }

    async fn history(&self, account_id: AccountId) -> Result<Vec<Tx>, LedgerError> {
        let state = self.state.lock().await;
        state.account_events(account_id)
    }

    async fn event(&self, id: TransactionId) -> Result<Tx, LedgerError> {
        let state = self.state.lock().await;
        state
            .events
            .get(&id)
            .cloned()
            .ok_or(LedgerError::UnknownGroup(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[tokio::test]
    async fn scenario_debit_open_then_settle() {
        let store = MemoryLedgerStore::new();
        let acc = store
            .create_account("alice", IdempotencyKey::new())
            .await
            .unwrap()
            .account_id;
        let pending = store
            .open_pending(acc, IdempotencyKey::new(), Money::from_str("100").unwrap(), None)
            .await
            .unwrap();
        let balance = store.balance(acc).await.unwrap();
        assert_eq!(balance.current_balance, Money::ZERO);
        assert_eq!(balance.available_balance, Money::ZERO);

        store
            .settle(acc, pending.id, IdempotencyKey::new(), None)
            .await
            .unwrap();
        let balance = store.balance(acc).await.unwrap();
        assert_eq!(balance.current_balance, Money::from_str("100").unwrap());
        assert_eq!(balance.available_balance, Money::from_str("100").unwrap());
    }

    #[tokio::test]
    async fn scenario_credit_reserves_and_partial_refund() {
        let store = MemoryLedgerStore::new();
        let acc = store
            .create_account("bob", IdempotencyKey::new())
            .await
            .unwrap()
            .account_id;
        let debit = store
            .open_pending(acc, IdempotencyKey::new(), Money::from_str("200").unwrap(), None)
            .await
            .unwrap();
        store
            .settle(acc, debit.id, IdempotencyKey::new(), None)
            .await
            .unwrap();

        let credit = store
            .open_pending(acc, IdempotencyKey::new(), Money::from_str("-50").unwrap(), None)
            .await
            .unwrap();
        let balance = store.balance(acc).await.unwrap();
        assert_eq!(balance.current_balance, Money::from_str("200").unwrap());
        assert_eq!(balance.available_balance, Money::from_str("150").unwrap());

        let refunded = store
            .refund(acc, credit.id, IdempotencyKey::new(), Money::from_str("20").unwrap(), None)
            .await
            .unwrap();
        assert_eq!(refunded.pending_amount, Money::from_str("-30").unwrap());
        let balance = store.balance(acc).await.unwrap();
        assert_eq!(balance.available_balance, Money::from_str("170").unwrap());
    }

    #[tokio::test]
    async fn concurrent_pending_on_the_same_head_collides() {
        // Two debits built against the same account head, simulating two
        // workers that read the head before either writes back (spec §8
        // Scenario 6). The first append wins; the second must fail with
        // ConcurrentModification rather than silently rebasing.
        let store = MemoryLedgerStore::new();
        let acc = store
            .create_account("frank", IdempotencyKey::new())
            .await
            .unwrap()
            .account_id;

        let head = {
            let state = store.state.lock().await;
            state.account_head(acc).unwrap()
        };
        let draft_a = invariant::build_pending(acc, IdempotencyKey::new(), Money::from_str("10").unwrap(), &head).unwrap();
        let draft_b = invariant::build_pending(acc, IdempotencyKey::new(), Money::from_str("20").unwrap(), &head).unwrap();
        let tx_a = draft_a.into_tx();
        let tx_b = draft_b.into_tx();

        {
            let mut state = store.state.lock().await;
            state.insert(tx_a).unwrap();
            let err = state.insert(tx_b).unwrap_err();
            assert!(matches!(err, LedgerError::ConcurrentModification { .. }));
        }

        let history = store.history(acc).await.unwrap();
        assert_eq!(history.len(), 2); // NEW_ACCOUNT + the one winning PENDING
    }

    #[tokio::test]
    async fn explicit_stale_prev_tx_id_is_rejected_through_the_public_api() {
        let store = MemoryLedgerStore::new();
        let new_account = store
            .create_account("gina", IdempotencyKey::new())
            .await
            .unwrap();
        let stale_head = new_account.id;

        // Someone else appends first, moving the head forward...
        store
            .open_pending(new_account.account_id, IdempotencyKey::new(), Money::from_str("5").unwrap(), None)
            .await
            .unwrap();

        // ...so a caller still holding the old head id must be rejected, not
        // silently rebased onto the new one.
        let err = store
            .open_pending(
                new_account.account_id,
                IdempotencyKey::new(),
                Money::from_str("10").unwrap(),
                Some(stale_head),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::ConcurrentModification { expected } if expected == stale_head
        ));
    }

    #[tokio::test]
    async fn duplicate_account_name_rejected() {
        let store = MemoryLedgerStore::new();
        store
            .create_account("carol", IdempotencyKey::new())
            .await
            .unwrap();
        let err = store
            .create_account("carol", IdempotencyKey::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateName(_)));
    }

    #[tokio::test]
    async fn reused_idempotency_key_rejected() {
        let store = MemoryLedgerStore::new();
        let key = IdempotencyKey::new();
        let acc = store.create_account("dan", key).await.unwrap().account_id;
        let err = store
            .open_pending(acc, key, Money::from_str("10").unwrap(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateIdempotencyKey));
    }

    #[tokio::test]
    async fn settling_unknown_group_fails() {
        let store = MemoryLedgerStore::new();
        let acc = store
            .create_account("erin", IdempotencyKey::new())
            .await
            .unwrap()
            .account_id;
        let bogus = TransactionId::from_str(&"00".repeat(32)).unwrap();
        let err = store
            .settle(acc, bogus, IdempotencyKey::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnknownGroup(_)));
    }
}
