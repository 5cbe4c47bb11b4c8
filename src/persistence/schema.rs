//! PostgreSQL schema for [`super::postgres::PgLedgerStore`] (spec §6).
//!
//! Mirrors the teacher's `persistence/schema.rs` `init_schema` entry point —
//! a sequence of `IF NOT EXISTS` statements run once at startup — but
//! targets a relational engine instead of TDengine's time-series one: spec
//! §6's foreign-key, uniqueness and check-constraint contract has no
//! equivalent in a tag-and-supertable store, so the constraints below are
//! the actual enforcement layer, not documentation of one.

use sqlx::PgPool;

pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("initializing ledger schema");

    sqlx::query(CREATE_ACCOUNTS_TABLE).execute(pool).await?;
    sqlx::query(CREATE_EVENTS_TABLE).execute(pool).await?;
    sqlx::query(CREATE_SINGLE_NEW_ACCOUNT_INDEX)
        .execute(pool)
        .await?;
    sqlx::query(CREATE_SINGLE_SETTLEMENT_INDEX)
        .execute(pool)
        .await?;
    sqlx::query(CREATE_ACCOUNT_EVENTS_INDEX)
        .execute(pool)
        .await?;

    tracing::info!("ledger schema ready");
    Ok(())
}

const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

/// `id`/`group_tx_id`/`group_prev_tx_id`/`prev_tx_id` are 32-byte SHA-256
/// content hashes, stored as `BYTEA` rather than text to keep the unique
/// indexes that implement optimistic concurrency (spec §4.3, §9) cheap.
///
/// The `UNIQUE`/`FOREIGN KEY` pairs below are the denormalization-correctness
/// constraints of spec §6 items 3-6: `prev_tx_id` must name a row in the same
/// account, its denormalized `prev_current_balance`/`prev_available_balance`
/// must match what that row actually recorded, and the same holds for
/// `group_prev_tx_id`/`group_prev_pending_amount` within a group. Each is
/// self-referential (a row's predecessor is another row in `events`), which
/// is why the unique side of every pair is declared on this table rather
/// than a separate one.
const CREATE_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id BYTEA PRIMARY KEY,
    idempotency_key UUID NOT NULL UNIQUE,
    account_id UUID NOT NULL REFERENCES accounts(id),
    kind TEXT NOT NULL,
    amount NUMERIC NOT NULL,
    pending_amount NUMERIC NOT NULL,
    group_tx_id BYTEA,
    group_prev_tx_id BYTEA UNIQUE,
    group_prev_pending_amount NUMERIC NOT NULL,
    prev_tx_id BYTEA UNIQUE,
    prev_current_balance NUMERIC NOT NULL,
    prev_available_balance NUMERIC NOT NULL,
    current_balance NUMERIC NOT NULL,
    available_balance NUMERIC NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT current_balance_non_negative CHECK (current_balance >= 0),
    CONSTRAINT available_balance_non_negative CHECK (available_balance >= 0),
    CONSTRAINT available_within_current CHECK (available_balance <= current_balance),
    CONSTRAINT prev_tx_id_required_except_new_account
        CHECK (prev_tx_id IS NOT NULL OR kind = 'NEW_ACCOUNT'),
    CONSTRAINT group_tx_id_required_except_new_account
        CHECK (group_tx_id IS NOT NULL OR kind = 'NEW_ACCOUNT'),
    CONSTRAINT group_prev_tx_id_required_except_root
        CHECK (group_prev_tx_id IS NOT NULL OR kind IN ('NEW_ACCOUNT', 'PENDING')),
    -- spec §6 items 11-12: kind-specific balance arithmetic, mirroring
    -- invariant::build_{new_account,pending,settlement,refund} exactly, so a
    -- row can't be inserted by any path that skips the Rust-side builders.
    CONSTRAINT kind_specific_balance_arithmetic CHECK (
        CASE kind
            WHEN 'NEW_ACCOUNT' THEN
                amount = 0 AND pending_amount = 0 AND group_prev_pending_amount = 0
                AND prev_current_balance = 0 AND prev_available_balance = 0
                AND current_balance = 0 AND available_balance = 0
            WHEN 'PENDING' THEN
                current_balance = prev_current_balance
                AND available_balance = prev_available_balance + LEAST(amount, 0)
            WHEN 'SETTLEMENT' THEN
                current_balance = prev_current_balance + pending_amount
                AND available_balance = prev_available_balance + GREATEST(pending_amount, 0)
            WHEN 'REFUND' THEN
                current_balance = prev_current_balance
                AND available_balance = prev_available_balance + amount
                AND pending_amount = group_prev_pending_amount + amount
                AND pending_amount <= 0
            ELSE FALSE
        END
    ),
    UNIQUE (account_id, id),
    UNIQUE (id, current_balance, available_balance),
    UNIQUE (account_id, group_tx_id, id),
    UNIQUE (id, pending_amount),
    FOREIGN KEY (account_id, prev_tx_id)
        REFERENCES events (account_id, id),
    FOREIGN KEY (prev_tx_id, prev_current_balance, prev_available_balance)
        REFERENCES events (id, current_balance, available_balance),
    FOREIGN KEY (account_id, group_tx_id, group_prev_tx_id)
        REFERENCES events (account_id, group_tx_id, id),
    FOREIGN KEY (group_prev_tx_id, group_prev_pending_amount)
        REFERENCES events (id, pending_amount)
)
"#;

/// At most one NEW_ACCOUNT event per account (spec §6).
const CREATE_SINGLE_NEW_ACCOUNT_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS one_new_account_per_account
    ON events (account_id)
    WHERE kind = 'NEW_ACCOUNT'
"#;

/// At most one SETTLEMENT event per group (spec §6).
const CREATE_SINGLE_SETTLEMENT_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS one_settlement_per_group
    ON events (group_tx_id)
    WHERE kind = 'SETTLEMENT'
"#;

const CREATE_ACCOUNT_EVENTS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS events_by_account ON events (account_id)
"#;
