//! A hash-chained, append-only financial ledger.
//!
//! An account's balance is never stored directly — it is the denormalized
//! tail of a SHA-256 hash chain of immutable events ([`event`]), each
//! carrying its own predecessor's snapshot so any event can be re-verified
//! in isolation ([`event::Tx::is_tampered`]). [`invariant`] enforces the
//! PENDING/SETTLEMENT/REFUND lifecycle's balance rules before an event is
//! ever built; [`persistence`] provides the atomic append contract on top
//! of either PostgreSQL or an in-memory store; [`ledger::Ledger`] is the
//! API surface applications call.
//!
//! # Modules
//!
//! - [`money`] - exact, sign-aware decimal amounts
//! - [`ids`] - opaque account/idempotency/transaction identifiers
//! - [`event`] - the immutable event record and its content hash
//! - [`chain`] - account/group chain head resolution
//! - [`invariant`] - the balance & invariant engine
//! - [`persistence`] - the storage contract and its backends
//! - [`ledger`] - the public ledger API
//! - [`config`] - YAML service configuration
//! - [`logging`] - structured logging setup

pub mod chain;
pub mod config;
pub mod error;
pub mod event;
pub mod ids;
pub mod invariant;
pub mod ledger;
pub mod logging;
pub mod money;
pub mod persistence;

pub use error::LedgerError;
pub use event::{Tx, TxDraft, TxKind};
pub use ids::{AccountId, IdempotencyKey, TransactionId};
pub use ledger::Ledger;
pub use money::Money;
pub use persistence::{Balance, LedgerStore};
