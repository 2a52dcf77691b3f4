use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use wallet_ledger::application::engine::{LedgerEngine, NewWalletAccount};
use wallet_ledger::domain::account::Amount;
use wallet_ledger::domain::entry::{EntryType, LedgerEntry};
use wallet_ledger::domain::ports::LedgerStoreBox;
use wallet_ledger::infrastructure::in_memory::InMemoryLedgerStore;
use wallet_ledger::interfaces::csv::account_writer::AccountWriter;
use wallet_ledger::interfaces::csv::request_reader::{LedgerRecord, LedgerRecordReader};
use wallet_ledger::settings::Settings;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input ledger requests CSV file
    input: PathBuf,

    /// Optional config file path (TOML).
    #[arg(long)]
    config: Option<String>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Override the log level (e.g. debug, info, warn).
    #[arg(long)]
    log_level: Option<String>,

    /// Mark a dependency as unavailable before processing. Repeatable.
    #[arg(long = "unavailable", value_name = "DEPENDENCY")]
    unavailable: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        settings.log_level = level;
    }
    if cli.db_path.is_some() {
        settings.storage.db_path = cli.db_path;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wallet_ledger={}", settings.log_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();

    let registry = settings.health_registry();
    for name in &cli.unavailable {
        registry.mark_unavailable(name, "marked unavailable from the command line");
    }
    let gate = settings.health_gate(registry);

    let engine = LedgerEngine::new(open_store(&settings)?, gate)
        .with_default_currency(&settings.default_currency)?;

    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = LedgerRecordReader::new(file);
    for (line, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(line = line + 1, "Error reading ledger record: {e}");
                continue;
            }
        };

        let result = record_one(&engine, record).await;
        if let Err(e) = result {
            tracing::error!(line = line + 1, kind = e.kind(), "Error recording ledger entry: {e}");
        }
    }

    let accounts = engine.accounts().await?;

    let stdout = io::stdout();
    let mut writer = AccountWriter::new(stdout.lock());
    writer.write_accounts(accounts)?;

    Ok(())
}

async fn record_one(
    engine: &LedgerEngine,
    record: LedgerRecord,
) -> wallet_ledger::error::Result<LedgerEntry> {
    // Rows that can never be recorded must not open an account.
    let entry_type: EntryType = record.r#type.parse()?;
    Amount::new(record.amount)?;
    engine.ensure_accepting(entry_type)?;

    let (account, _) = engine
        .open_account(NewWalletAccount {
            currency_code: record.currency.clone(),
            ..NewWalletAccount::for_owner(record.owner())
        })
        .await?;
    engine
        .record_ledger_entry(account.id, record.into_request())
        .await
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(settings: &Settings) -> Result<LedgerStoreBox> {
    use wallet_ledger::infrastructure::rocksdb::RocksDBStore;

    match &settings.storage.db_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "using RocksDB storage");
            Ok(Box::new(RocksDBStore::open(path)?))
        }
        None => Ok(Box::new(InMemoryLedgerStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(settings: &Settings) -> Result<LedgerStoreBox> {
    if settings.storage.db_path.is_some() {
        tracing::warn!(
            "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Box::new(InMemoryLedgerStore::new()))
}
