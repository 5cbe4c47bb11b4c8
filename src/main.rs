//! Ledger demo binary.
//!
//! Boots logging from an optional YAML config path (first CLI argument,
//! falling back to in-process defaults), then runs a debit-open-settle
//! walkthrough against an in-memory store and prints the resulting
//! balances — the same Config -> run -> report shape as the teacher's
//! `main.rs`, minus the CSV order-book plumbing this domain has no use for.

use std::str::FromStr;

use hashchain_ledger::config::{AppConfig, LogConfig};
use hashchain_ledger::ledger::Ledger;
use hashchain_ledger::logging;
use hashchain_ledger::persistence::memory::MemoryLedgerStore;
use hashchain_ledger::Money;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_config = match std::env::args().nth(1) {
        Some(path) => AppConfig::from_file(&path)
            .map(|c| c.log)
            .unwrap_or_else(|err| {
                eprintln!("failed to load config at {path}: {err}, using defaults");
                LogConfig::default()
            }),
        None => LogConfig::default(),
    };
    let _guard = logging::init_logging(&log_config);
    tracing::info!(git_hash = env!("GIT_HASH"), "starting hashchain-ledger demo");

    let ledger = Ledger::new(MemoryLedgerStore::new());

    let account = ledger.create_account("demo-account", None).await?;
    tracing::info!(%account, "opened account");

    let pending = ledger
        .create_pending_transaction(account, Money::from_str("150.00")?, None, None)
        .await?;
    tracing::info!(tx_id = %pending.id, "opened debit hold");

    let settlement = ledger
        .settle_transaction(account, pending.id, None, None)
        .await?;
    tracing::info!(tx_id = %settlement.id, "settled");

    let balance = ledger.balance(account).await?;
    println!(
        "account {account}: current_balance={} available_balance={}",
        balance.current_balance, balance.available_balance
    );

    Ok(())
}
