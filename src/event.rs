//! The immutable ledger event (`Tx`) and its content hash.
//!
//! Mirrors spec §3/§4.2: an event carries its own post-apply balances
//! alongside a denormalized copy of its predecessor's balances, the
//! account-chain link (`prev_tx_id`) and the group-chain link
//! (`group_tx_id`/`group_prev_tx_id`). Its `id` is the SHA-256 of a
//! deterministic, sorted-by-field-name serialization of everything else.
//!
//! Modeled as a plain value record with id-valued predecessor handles (per
//! spec §9's design note), the way the teacher's `TransferRecord`
//! (`internal_transfer/types.rs`) is a flat struct addressed by
//! `InternalTransferId`, not an interlinked graph of `Rc`/`Arc` nodes.

use std::collections::BTreeMap;
use std::fmt;

use sha2::{Digest, Sha256};

use crate::ids::{AccountId, IdempotencyKey, TransactionId};
use crate::money::Money;

/// The kind of ledger event (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxKind {
    NewAccount,
    Pending,
    Refund,
    Settlement,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::NewAccount => "NEW_ACCOUNT",
            TxKind::Pending => "PENDING",
            TxKind::Refund => "REFUND",
            TxKind::Settlement => "SETTLEMENT",
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TxKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW_ACCOUNT" => Ok(TxKind::NewAccount),
            "PENDING" => Ok(TxKind::Pending),
            "REFUND" => Ok(TxKind::Refund),
            "SETTLEMENT" => Ok(TxKind::Settlement),
            other => Err(format!("unknown tx kind: {other}")),
        }
    }
}

/// A single immutable ledger event.
///
/// Fields map directly onto spec §3's table. `id` is always derived via
/// [`Tx::compute_id`] — nothing else may set it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tx {
    pub id: TransactionId,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub idempotency_key: IdempotencyKey,
    pub account_id: AccountId,
    pub kind: TxKind,
    pub amount: Money,
    pub pending_amount: Money,
    pub group_tx_id: Option<TransactionId>,
    pub group_prev_tx_id: Option<TransactionId>,
    pub group_prev_pending_amount: Money,
    pub prev_tx_id: Option<TransactionId>,
    pub prev_current_balance: Money,
    pub prev_available_balance: Money,
    pub current_balance: Money,
    pub available_balance: Money,
}

/// Everything about a `Tx` except its `id` — the payload the content hash
/// covers. Kept as a separate, `Copy`-free struct so `Tx::compute_id` can
/// take a draft record before the id field even exists.
#[derive(Debug, Clone)]
pub struct TxDraft {
    pub idempotency_key: IdempotencyKey,
    pub account_id: AccountId,
    pub kind: TxKind,
    pub amount: Money,
    pub pending_amount: Money,
    pub group_tx_id: Option<TransactionId>,
    pub group_prev_tx_id: Option<TransactionId>,
    pub group_prev_pending_amount: Money,
    pub prev_tx_id: Option<TransactionId>,
    pub prev_current_balance: Money,
    pub prev_available_balance: Money,
    pub current_balance: Money,
    pub available_balance: Money,
}

impl TxDraft {
    /// A root PENDING's `group_tx_id` equals its own `id`, which does not
    /// exist yet at hashing time — spec §4.2 excludes it from the hash input
    /// in exactly that case. NEW_ACCOUNT has no group at all.
    fn hash_includes_group_tx_id(&self) -> bool {
        let is_root_pending = matches!(self.kind, TxKind::Pending) && self.group_prev_tx_id.is_none();
        !matches!(self.kind, TxKind::NewAccount) && !is_root_pending
    }

    fn opt_hex(id: Option<TransactionId>) -> String {
        id.map(|t| t.to_hex()).unwrap_or_default()
    }

    /// Deterministic `key=value\n` serialization, fields sorted by name,
    /// Money canonicalized (no trailing zeroes), id-valued fields lowercase
    /// hex with `""` for null. See spec §4.2.
    pub fn canonical_serialize(&self) -> String {
        let mut fields: BTreeMap<&'static str, String> = BTreeMap::new();
        fields.insert("account_id", self.account_id.to_string());
        fields.insert("amount", self.amount.canonical_string());
        fields.insert("available_balance", self.available_balance.canonical_string());
        fields.insert("current_balance", self.current_balance.canonical_string());
        fields.insert(
            "group_prev_pending_amount",
            self.group_prev_pending_amount.canonical_string(),
        );
        fields.insert("group_prev_tx_id", Self::opt_hex(self.group_prev_tx_id));
        if self.hash_includes_group_tx_id() {
            fields.insert("group_tx_id", Self::opt_hex(self.group_tx_id));
        }
        fields.insert("idempotency_key", self.idempotency_key.to_string());
        fields.insert("kind", self.kind.as_str().to_string());
        fields.insert("pending_amount", self.pending_amount.canonical_string());
        fields.insert(
            "prev_available_balance",
            self.prev_available_balance.canonical_string(),
        );
        fields.insert(
            "prev_current_balance",
            self.prev_current_balance.canonical_string(),
        );
        fields.insert("prev_tx_id", Self::opt_hex(self.prev_tx_id));

        let mut out = String::new();
        for (key, value) in &fields {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    pub fn compute_id(&self) -> TransactionId {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_serialize().as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        TransactionId::from_bytes(bytes)
    }

    pub fn into_tx(self) -> Tx {
        let id = self.compute_id();
        Tx {
            id,
            created_at: chrono::Utc::now(),
            idempotency_key: self.idempotency_key,
            account_id: self.account_id,
            kind: self.kind,
            amount: self.amount,
            pending_amount: self.pending_amount,
            group_tx_id: self.group_tx_id,
            group_prev_tx_id: self.group_prev_tx_id,
            group_prev_pending_amount: self.group_prev_pending_amount,
            prev_tx_id: self.prev_tx_id,
            prev_current_balance: self.prev_current_balance,
            prev_available_balance: self.prev_available_balance,
            current_balance: self.current_balance,
            available_balance: self.available_balance,
        }
    }
}

impl Tx {
    /// The draft view of this event — used to recompute its hash for tamper
    /// detection (spec §8: "altering any historical event's non-id field and
    /// recomputing its hash yields a value other than its stored id").
    pub fn as_draft(&self) -> TxDraft {
        TxDraft {
            idempotency_key: self.idempotency_key,
            account_id: self.account_id,
            kind: self.kind,
            amount: self.amount,
            pending_amount: self.pending_amount,
            group_tx_id: self.group_tx_id,
            group_prev_tx_id: self.group_prev_tx_id,
            group_prev_pending_amount: self.group_prev_pending_amount,
            prev_tx_id: self.prev_tx_id,
            prev_current_balance: self.prev_current_balance,
            prev_available_balance: self.prev_available_balance,
            current_balance: self.current_balance,
            available_balance: self.available_balance,
        }
    }

    pub fn recompute_id(&self) -> TransactionId {
        self.as_draft().compute_id()
    }

    pub fn is_tampered(&self) -> bool {
        self.recompute_id() != self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sample_draft() -> TxDraft {
        TxDraft {
            idempotency_key: IdempotencyKey::new(),
            account_id: AccountId::new(),
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

    #[test]
    fn id_is_deterministic_sha256_of_canonical_form() {
        let draft = sample_draft();
        let id1 = draft.compute_id();
        let id2 = draft.compute_id();
        assert_eq!(id1, id2);
        assert_eq!(id1.as_bytes().len(), 32);
    }

    #[test]
    fn different_contents_hash_differently() {
        let mut a = sample_draft();
        let mut b = sample_draft();
        a.amount = Money::from_str("1").unwrap();
        b.amount = Money::from_str("2").unwrap();
        assert_ne!(a.compute_id(), b.compute_id());
    }

    #[test]
    fn tamper_detection_recomputes_a_different_id() {
        let draft = sample_draft();
        let mut tx = draft.into_tx();
        tx.current_balance = Money::from_str("999").unwrap();
        assert!(tx.is_tampered());
    }

    #[test]
    fn root_pending_excludes_group_tx_id_from_hash_input() {
        let mut root = sample_draft();
        root.kind = TxKind::Pending;
        root.group_prev_tx_id = None;
        let without_group = root.canonical_serialize();
        root.group_tx_id = Some(TransactionId::from_bytes([9; 32]));
        let with_group_but_still_root = root.canonical_serialize();
        assert_eq!(without_group, with_group_but_still_root);
    }

    #[test]
    fn non_root_group_event_includes_group_tx_id_in_hash_input() {
        let mut refund = sample_draft();
        refund.kind = TxKind::Refund;
        refund.group_tx_id = Some(TransactionId::from_bytes([1; 32]));
        refund.group_prev_tx_id = Some(TransactionId::from_bytes([2; 32]));
        let s = refund.canonical_serialize();
        assert!(s.contains("group_tx_id="));
    }
}
