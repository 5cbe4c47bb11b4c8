//! Balance & invariant engine (spec §3, §4.3, §4.4).
//!
//! Pure functions that turn a predecessor snapshot plus an operation's
//! inputs into a fully-populated [`TxDraft`], applying the state-transition
//! rules for each [`TxKind`] and rejecting anything that would violate a
//! spec §3 invariant before a hash is ever computed or a row ever written.
//! Both [`crate::persistence::memory::MemoryLedgerStore`] and
//! [`crate::persistence::postgres::PgLedgerStore`] call into these — this is
//! the "enforce in code" half of the persistence contract spec §6 allows in
//! place of (or alongside) database constraints, modeled on the teacher's
//! `Balance` type (`balance.rs`): private invariants, validated constructors,
//! `Result`-returning mutations, no unchecked arithmetic.

use crate::chain::{AccountHead, GroupHead};
use crate::error::LedgerError;
use crate::event::{TxDraft, TxKind};
use crate::ids::{AccountId, IdempotencyKey};
use crate::money::Money;

/// Build the root NEW_ACCOUNT event for a brand new account. All monetary
/// fields are zero and there is no predecessor (spec §3).
pub fn build_new_account(account_id: AccountId, idempotency_key: IdempotencyKey) -> TxDraft {
    TxDraft {
        idempotency_key,
        account_id,
        kind: TxKind::NewAccount,
        amount: Money::ZERO,
        pending_amount: Money::ZERO,
        group_tx_id: None,
        group_prev_tx_id: None,
        group_prev_pending_amount: Money::ZERO,
        prev_tx_id: None,
        prev_current_balance: Money::ZERO,
        prev_available_balance: Money::ZERO,
        current_balance: Money::ZERO,
        available_balance: Money::ZERO,
    }
}

/// Build a PENDING event opening a new group (spec §4.3.2).
///
/// A debit (`amount > 0`) leaves both balances untouched. A credit
/// (`amount < 0`) reduces `available_balance` and fails with
/// [`LedgerError::InsufficientFunds`] if that would drive it negative.
pub fn build_pending(
    account_id: AccountId,
    idempotency_key: IdempotencyKey,
    amount: Money,
    prev: &AccountHead,
) -> Result<TxDraft, LedgerError> {
    let available_balance = if amount.is_negative() {
        let candidate = prev.available_balance + amount;
        if candidate.is_negative() {
            return Err(LedgerError::InsufficientFunds);
        }
        candidate
    } else {
        prev.available_balance
    };

    Ok(TxDraft {
        idempotency_key,
        account_id,
        kind: TxKind::Pending,
        amount,
        pending_amount: amount,
        group_tx_id: None, // self-root: filled in with the computed id by the caller
        group_prev_tx_id: None,
        group_prev_pending_amount: Money::ZERO,
        prev_tx_id: Some(prev.tx_id),
        prev_current_balance: prev.current_balance,
        prev_available_balance: prev.available_balance,
        current_balance: prev.current_balance,
        available_balance,
    })
}

/// Build a SETTLEMENT event closing a group (spec §4.3.3).
///
/// `amount` and the new `pending_amount` both become the group's current
/// `pending_amount`. A debit group (`pending_amount > 0`) increases both
/// balances; a credit group (`pending_amount < 0`) releases the hold by
/// increasing only `current_balance`.
pub fn build_settlement(
    account_id: AccountId,
    idempotency_key: IdempotencyKey,
    prev: &AccountHead,
    group: &GroupHead,
) -> Result<TxDraft, LedgerError> {
    if group.closed {
        return Err(LedgerError::IntegrityViolation(
            "group already has a SETTLEMENT".into(),
        ));
    }

    let settled_amount = group.pending_amount;
    let (current_balance, available_balance) = if settled_amount.is_positive() {
        (prev.current_balance + settled_amount, prev.available_balance + settled_amount)
    } else {
        (prev.current_balance + settled_amount, prev.available_balance)
    };

    Ok(TxDraft {
        idempotency_key,
        account_id,
        kind: TxKind::Settlement,
        amount: settled_amount,
        pending_amount: settled_amount,
        group_tx_id: Some(group.group_tx_id),
        group_prev_tx_id: Some(group.tx_id),
        group_prev_pending_amount: group.pending_amount,
        prev_tx_id: Some(prev.tx_id),
        prev_current_balance: prev.current_balance,
        prev_available_balance: prev.available_balance,
        current_balance,
        available_balance,
    })
}

/// Build a REFUND event against an open credit group (spec §4.3.4).
///
/// Rejects a non-positive `amount`, a refund against a debit group, and an
/// over-refund (one that would drive `pending_amount` positive). This is the
/// engine-level form of the over-refund check the source leaves to a
/// database `CHECK` constraint (spec §9 Open Question (a)).
pub fn build_refund(
    account_id: AccountId,
    idempotency_key: IdempotencyKey,
    amount: Money,
    prev: &AccountHead,
    group: &GroupHead,
) -> Result<TxDraft, LedgerError> {
    if !amount.is_positive() {
        return Err(LedgerError::InvalidRefund("amount must be positive"));
    }
    if group.root_is_debit {
        return Err(LedgerError::InvalidRefund(
            "cannot refund a debit (authorization) group",
        ));
    }
    if group.closed {
        return Err(LedgerError::InvalidRefund("group is already settled"));
    }

    let new_pending_amount = group.pending_amount + amount;
    if new_pending_amount.is_positive() {
        return Err(LedgerError::InvalidRefund(
            "refund would overshoot the original credit (over-refund)",
        ));
    }

    Ok(TxDraft {
        idempotency_key,
        account_id,
        kind: TxKind::Refund,
        amount,
        pending_amount: new_pending_amount,
        group_tx_id: Some(group.group_tx_id),
        group_prev_tx_id: Some(group.tx_id),
        group_prev_pending_amount: group.pending_amount,
        prev_tx_id: Some(prev.tx_id),
        prev_current_balance: prev.current_balance,
        prev_available_balance: prev.available_balance,
        current_balance: prev.current_balance,
        available_balance: prev.available_balance + amount,
    })
}

/// Invariants that must hold of every committed event (spec §3, §8),
/// checked independently of how the draft was built — a last line of
/// defense shared by both store backends before a row is ever persisted.
pub fn check_universal_invariants(draft: &TxDraft) -> Result<(), LedgerError> {
    if draft.current_balance.is_negative() {
        return Err(LedgerError::IntegrityViolation(
            "current_balance must be >= 0".into(),
        ));
    }
    if draft.available_balance.is_negative() {
        return Err(LedgerError::IntegrityViolation(
            "available_balance must be >= 0".into(),
        ));
    }
    if draft.available_balance > draft.current_balance {
        return Err(LedgerError::IntegrityViolation(
            "available_balance must be <= current_balance".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::TransactionId;
    use std::str::FromStr;

    fn head(current: &str, available: &str) -> AccountHead {
        AccountHead {
            tx_id: TransactionId::from_bytes([1; 32]),
            current_balance: Money::from_str(current).unwrap(),
            available_balance: Money::from_str(available).unwrap(),
        }
    }

    #[test]
    fn debit_pending_leaves_balances_unchanged() {
        let prev = head("100", "100");
        let draft = build_pending(
            AccountId::new(),
            IdempotencyKey::new(),
            Money::from_str("50").unwrap(),
            &prev,
        )
        .unwrap();
        assert_eq!(draft.current_balance, Money::from_str("100").unwrap());
        assert_eq!(draft.available_balance, Money::from_str("100").unwrap());
        assert_eq!(draft.pending_amount, Money::from_str("50").unwrap());
    }

    #[test]
    fn credit_pending_reserves_available_balance() {
        let prev = head("100", "100");
        let draft = build_pending(
            AccountId::new(),
            IdempotencyKey::new(),
            Money::from_str("-30").unwrap(),
            &prev,
        )
        .unwrap();
        assert_eq!(draft.current_balance, Money::from_str("100").unwrap());
        assert_eq!(draft.available_balance, Money::from_str("70").unwrap());
    }

    #[test]
    fn credit_pending_rejects_overdraw() {
        let prev = head("100", "100");
        let err = build_pending(
            AccountId::new(),
            IdempotencyKey::new(),
            Money::from_str("-150").unwrap(),
            &prev,
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds));
    }

    #[test]
    fn settlement_of_debit_group_increases_both_balances() {
        let prev = head("100", "100");
        let group = GroupHead {
            tx_id: TransactionId::from_bytes([2; 32]),
            group_tx_id: TransactionId::from_bytes([2; 32]),
            pending_amount: Money::from_str("50").unwrap(),
            root_is_debit: true,
            closed: false,
        };
        let draft = build_settlement(AccountId::new(), IdempotencyKey::new(), &prev, &group).unwrap();
        assert_eq!(draft.current_balance, Money::from_str("150").unwrap());
        assert_eq!(draft.available_balance, Money::from_str("150").unwrap());
    }

    #[test]
    fn settlement_of_credit_group_only_moves_current_balance() {
        let prev = head("100", "70");
        let group = GroupHead {
            tx_id: TransactionId::from_bytes([2; 32]),
            group_tx_id: TransactionId::from_bytes([2; 32]),
            pending_amount: Money::from_str("-30").unwrap(),
            root_is_debit: false,
            closed: false,
        };
        let draft = build_settlement(AccountId::new(), IdempotencyKey::new(), &prev, &group).unwrap();
        assert_eq!(draft.current_balance, Money::from_str("70").unwrap());
        assert_eq!(draft.available_balance, Money::from_str("70").unwrap());
    }

    #[test]
    fn partial_refund_increases_available_balance_toward_zero() {
        let prev = head("100", "50");
        let group = GroupHead {
            tx_id: TransactionId::from_bytes([2; 32]),
            group_tx_id: TransactionId::from_bytes([2; 32]),
            pending_amount: Money::from_str("-50").unwrap(),
            root_is_debit: false,
            closed: false,
        };
        let draft = build_refund(
            AccountId::new(),
            IdempotencyKey::new(),
            Money::from_str("20").unwrap(),
            &prev,
            &group,
        )
        .unwrap();
        assert_eq!(draft.available_balance, Money::from_str("70").unwrap());
        assert_eq!(draft.pending_amount, Money::from_str("-30").unwrap());
        assert_eq!(draft.current_balance, Money::from_str("100").unwrap());
    }

    #[test]
    fn over_refund_rejected() {
        let prev = head("100", "80");
        let group = GroupHead {
            tx_id: TransactionId::from_bytes([2; 32]),
            group_tx_id: TransactionId::from_bytes([2; 32]),
            pending_amount: Money::from_str("-20").unwrap(),
            root_is_debit: false,
            closed: false,
        };
        let err = build_refund(
            AccountId::new(),
            IdempotencyKey::new(),
            Money::from_str("30").unwrap(),
            &prev,
            &group,
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidRefund(_)));
    }

    #[test]
    fn refund_of_debit_group_rejected() {
        let prev = head("100", "100");
        let group = GroupHead {
            tx_id: TransactionId::from_bytes([2; 32]),
            group_tx_id: TransactionId::from_bytes([2; 32]),
            pending_amount: Money::from_str("50").unwrap(),
            root_is_debit: true,
            closed: false,
        };
        let err = build_refund(
            AccountId::new(),
            IdempotencyKey::new(),
            Money::from_str("10").unwrap(),
            &prev,
            &group,
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidRefund(_)));
    }

    #[test]
    fn settling_a_closed_group_is_rejected() {
        let prev = head("100", "100");
        let group = GroupHead {
            tx_id: TransactionId::from_bytes([2; 32]),
            group_tx_id: TransactionId::from_bytes([2; 32]),
            pending_amount: Money::from_str("50").unwrap(),
            root_is_debit: true,
            closed: true,
        };
        let err = build_settlement(AccountId::new(), IdempotencyKey::new(), &prev, &group).unwrap_err();
        assert!(matches!(err, LedgerError::IntegrityViolation(_)));
    }
}
