//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use acctfetch_core::{
    AggregationReport, Coordinator, DocumentStore, IdentitySource, Outcome, PagedReader,
    ProgressReporter,
};
use acctfetch_providers::{
    ClientOptions, FileIdentityProvider, HttpDocumentStore, HttpIdentityProvider,
};
use acctfetch_shared::{
    AcctFetchError, AppConfig, DocumentsConfig, DocumentsKind, IdentityConfig, IdentityKind,
    PipelineConfig, init_config, load_config, load_config_from, read_token,
};
use acctfetch_storage::Storage;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

/// Message shown when any record failed enrichment.
const INCOMPLETE_MESSAGE: &str = "some records could not be fetched";

/// Message shown when the identity provider failed mid-run.
const SOURCE_FAILED_MESSAGE: &str = "accounts could not be listed";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// acctfetch: list accounts joined with their profile documents.
#[derive(Parser)]
#[command(
    name = "acctfetch",
    version,
    about = "List non-privileged accounts joined with their profile documents.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.acctfetch/acctfetch.toml).
    #[arg(long, env = "ACCTFETCH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run one aggregation and print the enriched accounts as JSON.
    Fetch {
        /// Maximum concurrent document lookups.
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Accounts requested per identity provider page.
        #[arg(long)]
        page_size: Option<usize>,

        /// Pretty-print the JSON output.
        #[arg(long)]
        pretty: bool,

        /// Do not draw the progress spinner.
        #[arg(long)]
        no_progress: bool,
    },

    /// Manage the local document database.
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Local document database subcommands.
#[derive(Subcommand)]
pub(crate) enum StoreAction {
    /// Import a `{"<uid>": {...}}` JSON file into the database.
    Import {
        /// JSON file to import.
        file: PathBuf,

        /// Database path (defaults to `documents.path`).
        #[arg(long)]
        db: Option<PathBuf>,

        /// Collection to write into (defaults to `documents.collection`).
        #[arg(long)]
        collection: Option<String>,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr; stdout is
/// reserved for results.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "acctfetch=info",
        1 => "acctfetch=debug",
        _ => "acctfetch=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Fetch {
            concurrency,
            page_size,
            pretty,
            no_progress,
        } => cmd_fetch(config_path, concurrency, page_size, pretty, no_progress).await,
        Command::Store { action } => match action {
            StoreAction::Import {
                file,
                db,
                collection,
            } => cmd_store_import(config_path, &file, db.as_deref(), collection.as_deref()).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

// ---------------------------------------------------------------------------
// fetch
// ---------------------------------------------------------------------------

async fn cmd_fetch(
    config_path: Option<&Path>,
    concurrency: Option<usize>,
    page_size: Option<usize>,
    pretty: bool,
    no_progress: bool,
) -> Result<ExitCode> {
    let config = resolve_config(config_path)?;
    let pipeline = pipeline_config(&config, concurrency, page_size)?;

    let store = build_store(&config.documents).await?;
    let mut source = build_source(&config.identity, pipeline.page_size)?;

    let mut coordinator = Coordinator::new(pipeline, store)?;
    if !no_progress {
        coordinator = coordinator.with_progress(Arc::new(CliProgress::new()));
    }

    info!(
        concurrency = coordinator.config().concurrency,
        collection = %coordinator.config().collection,
        "fetching accounts"
    );

    let report = coordinator.run(source.as_mut()).await;
    match report.into_outcome() {
        Ok(result) => {
            let body = if pretty {
                serde_json::to_string_pretty(&result.records)?
            } else {
                serde_json::to_string(&result.records)?
            };
            println!("{body}");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(error = %e, "fetch failed");
            eprintln!("error: {}", failure_message(&e));
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Runtime pipeline settings: config file values, then flag overrides.
fn pipeline_config(
    config: &AppConfig,
    concurrency: Option<usize>,
    page_size: Option<usize>,
) -> Result<PipelineConfig> {
    let mut pipeline = PipelineConfig::from(config);
    if let Some(concurrency) = concurrency {
        pipeline.concurrency = concurrency;
    }
    if let Some(page_size) = page_size {
        pipeline.page_size = page_size;
    }
    pipeline.validate()?;
    Ok(pipeline)
}

/// The one line a user sees when a run fails. Details stay in the log.
fn failure_message(error: &AcctFetchError) -> &'static str {
    match error {
        AcctFetchError::Incomplete { .. } => INCOMPLETE_MESSAGE,
        _ => SOURCE_FAILED_MESSAGE,
    }
}

/// Build the paginated identity source named by `[identity]`.
fn build_source(config: &IdentityConfig, page_size: usize) -> Result<Box<dyn IdentitySource>> {
    let source: Box<dyn IdentitySource> = match config.kind {
        IdentityKind::Http => {
            let opts = ClientOptions::default().with_token(read_token(&config.token_env));
            let provider = HttpIdentityProvider::new(&config.url()?, opts)?;
            Box::new(PagedReader::new(provider, page_size))
        }
        IdentityKind::File => {
            let path = config
                .path
                .as_deref()
                .ok_or_else(|| eyre!("identity.path is required when identity.kind = \"file\""))?;
            let provider = FileIdentityProvider::open(path)?;
            Box::new(PagedReader::new(provider, page_size))
        }
    };
    Ok(source)
}

/// Build the document store named by `[documents]`.
async fn build_store(config: &DocumentsConfig) -> Result<Arc<dyn DocumentStore>> {
    let store: Arc<dyn DocumentStore> = match config.kind {
        DocumentsKind::Http => {
            let opts = ClientOptions::default().with_token(read_token(&config.token_env));
            Arc::new(HttpDocumentStore::new(config.url()?, opts)?)
        }
        DocumentsKind::Sqlite => {
            let path = config
                .path
                .as_deref()
                .ok_or_else(|| eyre!("documents.path is required when documents.kind = \"sqlite\""))?;
            Arc::new(Storage::open_readonly(path).await?)
        }
    };
    Ok(store)
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner on stderr.
struct CliProgress {
    spinner: ProgressBar,
    scanned: AtomicUsize,
    settled: AtomicUsize,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self {
            spinner,
            scanned: AtomicUsize::new(0),
            settled: AtomicUsize::new(0),
        }
    }

    fn refresh(&self) {
        let scanned = self.scanned.load(Ordering::Relaxed);
        let settled = self.settled.load(Ordering::Relaxed);
        self.spinner
            .set_message(format!("Read {scanned} accounts, {settled} lookups settled"));
    }
}

impl ProgressReporter for CliProgress {
    fn record_read(&self, scanned: usize) {
        self.scanned.store(scanned, Ordering::Relaxed);
        self.refresh();
    }

    fn record_excluded(&self, _uid: &str) {}

    fn record_finished(&self, _outcome: &Outcome) {
        self.settled.fetch_add(1, Ordering::Relaxed);
        self.refresh();
    }

    fn done(&self, report: &AggregationReport) {
        self.spinner.finish_and_clear();
        info!(
            run_id = %report.run_id,
            elapsed_ms = report.elapsed.as_millis(),
            "run finished"
        );
    }
}

// ---------------------------------------------------------------------------
// store
// ---------------------------------------------------------------------------

async fn cmd_store_import(
    config_path: Option<&Path>,
    file: &Path,
    db: Option<&Path>,
    collection: Option<&str>,
) -> Result<ExitCode> {
    let config = resolve_config(config_path)?;
    let db_path = db
        .or(config.documents.path.as_deref())
        .ok_or_else(|| eyre!("no database path: pass --db or set documents.path"))?;
    let collection = collection.unwrap_or(&config.documents.collection);

    let content = std::fs::read_to_string(file)
        .map_err(|e| AcctFetchError::io(file, e))?;
    let documents: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&content)
        .map_err(|e| eyre!("failed to parse {}: {e}", file.display()))?;

    let storage = Storage::open(db_path).await?;
    let written = storage.import_documents(collection, documents).await?;
    let total = storage.count_documents(collection).await?;

    println!("Imported {written} documents into {collection} ({total} total)");
    Ok(ExitCode::SUCCESS)
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<ExitCode> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(ExitCode::SUCCESS)
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<ExitCode> {
    let config = resolve_config(config_path)?;
    let rendered = toml::to_string_pretty(&config)?;
    println!("{rendered}");
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fetch_flags() {
        let cli = Cli::try_parse_from([
            "acctfetch",
            "-vv",
            "fetch",
            "--concurrency",
            "4",
            "--page-size",
            "500",
            "--pretty",
        ])
        .expect("parse");
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Fetch {
                concurrency,
                page_size,
                pretty,
                no_progress,
            } => {
                assert_eq!(concurrency, Some(4));
                assert_eq!(page_size, Some(500));
                assert!(pretty);
                assert!(!no_progress);
            }
            _ => panic!("expected fetch"),
        }
    }

    #[test]
    fn parses_store_import() {
        let cli = Cli::try_parse_from([
            "acctfetch",
            "store",
            "import",
            "docs.json",
            "--collection",
            "managers",
        ])
        .expect("parse");
        match cli.command {
            Command::Store {
                action: StoreAction::Import { file, db, collection },
            } => {
                assert_eq!(file, PathBuf::from("docs.json"));
                assert!(db.is_none());
                assert_eq!(collection.as_deref(), Some("managers"));
            }
            _ => panic!("expected store import"),
        }
    }

    #[test]
    fn flags_override_config_file() {
        let mut config = AppConfig::default();
        config.pipeline.concurrency = 3;
        config.pipeline.page_size = 200;

        let from_file = pipeline_config(&config, None, None).unwrap();
        assert_eq!(from_file.concurrency, 3);
        assert_eq!(from_file.page_size, 200);

        let overridden = pipeline_config(&config, Some(12), Some(50)).unwrap();
        assert_eq!(overridden.concurrency, 12);
        assert_eq!(overridden.page_size, 50);
    }

    #[test]
    fn out_of_range_flags_are_rejected() {
        let config = AppConfig::default();
        assert!(pipeline_config(&config, Some(0), None).is_err());
        assert!(pipeline_config(&config, None, Some(5000)).is_err());
    }

    #[test]
    fn failure_messages_are_generic() {
        let incomplete = AcctFetchError::Incomplete { failed: 2 };
        assert_eq!(failure_message(&incomplete), "some records could not be fetched");

        let source = AcctFetchError::Source(
            "http://idp.internal/v1/accounts: HTTP 503 for uid u42".into(),
        );
        let message = failure_message(&source);
        assert_eq!(message, SOURCE_FAILED_MESSAGE);
        for leaked in ["u42", "http", "503", "idp.internal"] {
            assert!(!message.contains(leaked), "{message:?} leaks {leaked:?}");
        }
    }

    #[test]
    fn file_source_requires_path() {
        let config = IdentityConfig {
            kind: IdentityKind::File,
            ..IdentityConfig::default()
        };
        let err = build_source(&config, 10).err().expect("missing path");
        assert!(err.to_string().contains("identity.path"));
    }

    #[tokio::test]
    async fn sqlite_store_requires_path() {
        let config = DocumentsConfig {
            kind: DocumentsKind::Sqlite,
            ..DocumentsConfig::default()
        };
        let err = build_store(&config).await.err().expect("missing path");
        assert!(err.to_string().contains("documents.path"));
    }
}
