use clap::{Parser, Subcommand};
use regex::Regex;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use table_porter::config::{MigrationConfig, DEFAULT_CONNECTION_NAME};
use table_porter::database::{SqliteStore, Store};
use table_porter::domains::export::{backup_folder, ExportOrchestrator, NamedTables};
use table_porter::domains::import::{BatchLoader, CancelSignal, ImportRunner};
use table_porter::domains::schema::SchemaIntrospector;
use table_porter::errors::{MigrationError, MigrationResult};
use table_porter::logging::init_logging;

/// Table Porter - CSV backup and restore for database tables
#[derive(Parser, Debug)]
#[command(name = "table-porter")]
#[command(version)]
#[command(about = "Export tables to zipped CSV backups and reload them from CSV files", long_about = None)]
struct Cli {
    /// Settings file (defaults to appsettings.json, appsettings.Development.json in debug builds)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Name of the connection string to use
    #[arg(long = "connection", default_value = DEFAULT_CONNECTION_NAME)]
    connection: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export every selected table into a timestamped zip archive
    Export,
    /// Truncate and reload tables from a folder of `<table>.csv` files
    Import {
        /// Folder holding the CSV files (overrides Import:Folder)
        #[arg(short = 'f', long = "folder")]
        folder: Option<PathBuf>,
    },
    /// List every table:column holding a text value that matches a pattern
    Scan {
        /// Regular expression to look for
        #[arg(short = 'p', long = "pattern")]
        pattern: String,
    },
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> MigrationResult<()> {
    let config = MigrationConfig::load(&MigrationConfig::resolve_path(cli.config.as_deref()))?;
    let url = config.connection_string(&cli.connection)?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::connect(&url).await?);

    match cli.command {
        Command::Export => export(&config, store).await,
        Command::Import { folder } => import(&config, store, folder).await,
        Command::Scan { pattern } => scan(&config, store, &pattern).await,
    }
}

fn orchestrator(config: &MigrationConfig, store: Arc<dyn Store>) -> MigrationResult<ExportOrchestrator> {
    let orchestrator = ExportOrchestrator::new(store, config.backup_encoding()?);
    if config.backup.tables.is_empty() {
        Ok(orchestrator)
    } else {
        Ok(orchestrator.with_filter(NamedTables::new(&config.backup.tables)))
    }
}

async fn export(config: &MigrationConfig, store: Arc<dyn Store>) -> MigrationResult<()> {
    let folder = backup_folder(config.backup.folder.as_deref());
    let backup = orchestrator(config, store)?
        .run_backup(&folder, config.backup_prefix())
        .await?;

    for (table, error) in &backup.summary.failed {
        log::warn!("{} was not exported: {}", table, error);
    }
    println!(
        "Backup completed: {} ({} table(s), {} row(s), sha256 {})",
        backup.path.display(),
        backup.summary.exported.len(),
        backup.summary.rows_written(),
        backup.sha256
    );
    Ok(())
}

async fn import(
    config: &MigrationConfig,
    store: Arc<dyn Store>,
    folder: Option<PathBuf>,
) -> MigrationResult<()> {
    let folder = match folder.filter(|f| f.is_dir()).or_else(|| config.import_folder()) {
        Some(folder) => folder,
        None => prompt_for_folder()?,
    };

    let cancel = CancelSignal::new();
    let loader = BatchLoader::new(SchemaIntrospector::new(config.type_aliases()), config.batch_size()?)
        .with_cancel(cancel.clone());
    let runner = ImportRunner::new(store, loader, config.import_encoding()?);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted; rolling back the batch in flight");
            cancel.cancel();
        }
    });

    let summary = runner.import_directory(&folder).await?;
    for table in summary.incomplete_tables() {
        match &table.outcome {
            Ok(report) => println!(
                "{}: {} row(s) committed, {} batch(es) failed",
                table.table,
                report.committed_rows(),
                report.failed_batches().count()
            ),
            Err(error) => println!("Error importing {}: {}", table.table, error),
        }
    }

    if summary.cancelled {
        return Err(MigrationError::Cancelled);
    }
    println!("Import completed.");
    Ok(())
}

async fn scan(config: &MigrationConfig, store: Arc<dyn Store>, pattern: &str) -> MigrationResult<()> {
    let pattern = Regex::new(pattern)
        .map_err(|e| MigrationError::Config(format!("invalid pattern: {}", e)))?;
    let matches = orchestrator(config, store)?.scan_text_cells(&pattern).await?;
    for hit in &matches {
        println!("{}", hit);
    }
    Ok(())
}

/// Ask on stdin until an existing directory is given.
fn prompt_for_folder() -> MigrationResult<PathBuf> {
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("Please input folder: ");
        std::io::stdout().flush()?;

        let line = lines
            .next()
            .ok_or_else(|| MigrationError::Config("no import folder given".to_string()))??;
        let folder = PathBuf::from(line.trim());
        if folder.is_dir() {
            return Ok(folder);
        }
        println!("Folder does not exist, please input again.");
    }
}
