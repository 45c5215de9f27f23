//! wallet_ledger - ledger maintenance tool
//!
//! Usage:
//!   wallet_ledger migrate     apply the ledger schema
//!   wallet_ledger reconcile   recompute balances from the ledger and report

use wallet_ledger::store::PgLedgerStore;
use wallet_ledger::{db, telemetry, Config, WalletLedger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    telemetry::init_tracing(config.log_format);

    let command = std::env::args().nth(1).unwrap_or_else(|| "reconcile".to_string());

    tracing::info!(
        environment = %config.environment,
        command = %command,
        "Starting wallet_ledger"
    );

    let pool = db::connect(&config).await?;

    match command.as_str() {
        "migrate" => {
            db::apply_schema(&pool).await?;
        }
        "reconcile" => {
            if !db::check_schema(&pool).await? {
                anyhow::bail!("Database schema is missing; run `wallet_ledger migrate` first");
            }

            let store = PgLedgerStore::new(pool).with_lock_timeout(config.lock_timeout);
            let ledger = WalletLedger::from_config(store, &config);
            let report = ledger.reconcile().await?;

            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_consistent() {
                std::process::exit(1);
            }
        }
        other => anyhow::bail!("Unknown command: {other} (expected `migrate` or `reconcile`)"),
    }

    Ok(())
}
