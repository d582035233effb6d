use acquirer::application::dispatch::SchemeConnections;
use acquirer::application::processor::{Collaborators, PaymentProcessor};
use acquirer::application::sequence::{Clock, SequenceAllocator, SystemClock};
use acquirer::config::ProcessorConfig;
use acquirer::domain::card::Scheme;
use acquirer::domain::ports::SequenceStoreRef;
use acquirer::domain::sequence::{Block, rollover_tag};
use acquirer::infrastructure::in_memory::{
    InMemoryAuthorizationRepository, InMemoryCaptureRepository, InMemoryPublisher,
    InMemoryRefundRepository, InMemoryReversalRepository, InMemorySequenceStore, InMemoryTokenizer,
};
use acquirer::infrastructure::simulated::SimulatedConnection;
use acquirer::interfaces::csv::command_reader::CommandReader;
use acquirer::interfaces::csv::outcome_writer::OutcomeWriter;
use acquirer::interfaces::csv::replay::Replay;
use acquirer::telemetry;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input commands CSV file
    input: PathBuf,

    /// JSON config file (optional). Defaults apply to every missing field.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to persistent sequence database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_json);

    let config = match &cli.config {
        Some(path) => ProcessorConfig::from_path(path).into_diagnostic()?,
        None => ProcessorConfig::default(),
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let initial = Block::new(config.sequence.min_value, rollover_tag(clock.today()));
    let store = sequence_store(cli.db_path, &config, initial).await?;

    let stans = Arc::new(
        SequenceAllocator::start(&config.sequence, store, clock).into_diagnostic()?,
    );
    let connections = SchemeConnections::new()
        .with(
            Scheme::Mastercard,
            Arc::new(SimulatedConnection::new(Scheme::Mastercard, stans.clone())),
        )
        .with(
            Scheme::Visa,
            Arc::new(SimulatedConnection::new(Scheme::Visa, stans.clone())),
        );

    let processor = PaymentProcessor::new(
        &config,
        Collaborators {
            tokenizer: Arc::new(InMemoryTokenizer::new()),
            authorizations: Arc::new(InMemoryAuthorizationRepository::new()),
            refunds: Arc::new(InMemoryRefundRepository::new()),
            captures: Arc::new(InMemoryCaptureRepository::new()),
            reversals: Arc::new(InMemoryReversalRepository::new()),
            publisher: Arc::new(InMemoryPublisher::new()),
            connections,
        },
    );
    let mut replay = Replay::new(processor);

    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    let stdout = io::stdout();
    let mut writer = OutcomeWriter::new(stdout.lock());

    for command in reader.commands() {
        match command {
            Ok(command) => {
                let outcome = replay.apply(command).await;
                writer.write(&outcome).into_diagnostic()?;
            }
            Err(e) => {
                eprintln!("Error reading command: {}", e);
            }
        }
    }
    writer.flush().into_diagnostic()?;

    stans.shutdown();
    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
async fn sequence_store(
    db_path: Option<PathBuf>,
    config: &ProcessorConfig,
    initial: Block,
) -> Result<SequenceStoreRef> {
    use acquirer::infrastructure::rocksdb::RocksDbSequenceStore;

    if let Some(db_path) = db_path {
        let store = RocksDbSequenceStore::open(db_path).into_diagnostic()?;
        if store
            .provision(&config.sequence.name, &initial)
            .into_diagnostic()?
        {
            tracing::info!(sequence = %config.sequence.name, "provisioned sequence");
        }
        return Ok(Arc::new(store));
    }
    in_memory_store(config, initial).await
}

#[cfg(not(feature = "storage-rocksdb"))]
async fn sequence_store(
    db_path: Option<PathBuf>,
    config: &ProcessorConfig,
    initial: Block,
) -> Result<SequenceStoreRef> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    in_memory_store(config, initial).await
}

async fn in_memory_store(config: &ProcessorConfig, initial: Block) -> Result<SequenceStoreRef> {
    let store = InMemorySequenceStore::new();
    store.provision(&config.sequence.name, initial).await;
    Ok(Arc::new(store))
}
