use chrono::NaiveDate;
use clap::Parser;
use lendledger::application::engine::LendingEngine;
use lendledger::config::{DEFAULT_UTC_OFFSET_HOURS, EngineConfig};
use lendledger::domain::ports::{ClockRef, LedgerStoreRef};
use lendledger::infrastructure::clock::SystemClock;
use lendledger::infrastructure::in_memory::{InMemoryCustomerDirectory, InMemoryLedgerStore};
use lendledger::interfaces::batch::BatchRunner;
use lendledger::interfaces::csv::command_reader::CommandReader;
use lendledger::interfaces::csv::report_writer::ReportWriter;
use lendledger::telemetry;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input ledger commands CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// UTC offset, in hours, of the time zone due dates are computed in
    #[arg(long, default_value_t = DEFAULT_UTC_OFFSET_HOURS, allow_hyphen_values = true)]
    utc_offset_hours: i32,

    /// Also report unpaid installments due on this date (YYYY-MM-DD)
    #[arg(long)]
    due_on: Option<NaiveDate>,
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(db_path: Option<PathBuf>) -> Result<LedgerStoreRef> {
    use lendledger::config::RocksDbConfig;
    use lendledger::infrastructure::rocksdb::RocksDbLedgerStore;

    let store: LedgerStoreRef = match db_path {
        Some(path) => {
            Arc::new(RocksDbLedgerStore::open(path, RocksDbConfig::default()).into_diagnostic()?)
        }
        None => Arc::new(InMemoryLedgerStore::new()),
    };
    Ok(store)
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(db_path: Option<PathBuf>) -> Result<LedgerStoreRef> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Arc::new(InMemoryLedgerStore::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();

    let config = EngineConfig::with_offset_hours(cli.utc_offset_hours).into_diagnostic()?;
    let store = open_store(cli.db_path)?;
    let directory = InMemoryCustomerDirectory::new();
    let clock: ClockRef = Arc::new(SystemClock);
    let engine = LendingEngine::new(store, Arc::new(directory.clone()), clock.clone(), config);

    // Process commands
    let file = File::open(cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    let runner = BatchRunner::new(engine.clone(), directory, clock);
    let summary = runner.run(reader.commands()).await;
    info!(
        applied = summary.applied,
        rejected = summary.rejected,
        failed = summary.failed,
        "batch finished"
    );

    // Output final state
    let stdout = io::stdout();
    let mut writer = ReportWriter::new(stdout.lock());
    writer
        .write_buckets(engine.all_buckets().await.into_diagnostic()?)
        .into_diagnostic()?;
    writer
        .write_transactions(&engine.transaction_report().await.into_diagnostic()?)
        .into_diagnostic()?;
    if let Some(date) = cli.due_on {
        writer
            .write_due(&engine.list_due_installments(date).await.into_diagnostic()?)
            .into_diagnostic()?;
    }

    Ok(())
}
