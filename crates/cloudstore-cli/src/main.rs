//! cloudstore: wallet-keyed encrypted file storage CLI
//!
//! Commands:
//!   upload <path> [--encrypt]    - upload a file, optionally envelope-encrypted
//!   ls [--search <text>]         - list files owned by the active address
//!   shared [--search <text>]     - list files shared with the active address
//!   get <id> [-o <out>]          - download (and decrypt) a file
//!   share <id> <recipient>       - grant another address access
//!   rm <id>                      - delete a file record and its key
//!   derive-key                   - print the wrapping key fingerprint
//!   usage [--reset]              - show per-provider API usage
//!   status                       - probe configured storage providers
//!   config show                  - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cloudstore_core::config::CloudStoreConfig;
use cloudstore_core::{FileId, FileRecord, WalletAddress};
use cloudstore_crypto::{EnvelopeKeyManager, KdfParams};
use cloudstore_session::{
    JsonKeyDirectory, LocalRegistry, Session, SessionContext, UsageTracker,
};
use cloudstore_storage::{build_blob_stores, check_health, ProviderCredentials};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "cloudstore",
    version,
    about = "Wallet-keyed encrypted file storage",
    long_about = "cloudstore: upload, share, and retrieve files on IPFS pinning services, \
                  envelope-encrypted under keys derived from a wallet address"
)]
struct Cli {
    /// Path to cloudstore.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "CLOUDSTORE_CONFIG",
        default_value = "~/.config/cloudstore/config.toml"
    )]
    config: PathBuf,

    /// Active wallet address
    #[arg(long, short = 'a', env = "CLOUDSTORE_ADDRESS")]
    address: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides config
    #[arg(long, env = "CLOUDSTORE_LOG")]
    log: Option<String>,

    /// Log format; overrides config
    #[arg(long, env = "CLOUDSTORE_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload a local file
    ///
    /// Pinning credentials are read from PINATA_API_KEY, PINATA_API_SECRET,
    /// and FILEBASE_API_KEY.
    Upload {
        /// Local file path
        path: PathBuf,
        /// Envelope-encrypt before upload (default from crypto.encrypt_by_default)
        #[arg(long, short = 'e')]
        encrypt: bool,
    },

    /// List files you own
    Ls {
        /// Only show files whose name contains this text (case-insensitive)
        #[arg(long, short = 's')]
        search: Option<String>,
    },

    /// List files shared with you
    Shared {
        /// Only show files whose name contains this text (case-insensitive)
        #[arg(long, short = 's')]
        search: Option<String>,
    },

    /// Download a file you own or that was shared with you
    Get {
        /// File id
        id: FileId,
        /// Output path (default: the uploaded file name in the current directory)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Share a file with another address
    Share {
        /// File id
        id: FileId,
        /// Recipient wallet address
        recipient: String,
    },

    /// Delete a file record and its wrapped key
    Rm {
        /// File id
        id: FileId,
    },

    /// Print the fingerprint of the wrapping key derived from the address
    #[command(name = "derive-key")]
    DeriveKey,

    /// Show per-provider API usage counters
    Usage {
        /// Clear all counters
        #[arg(long)]
        reset: bool,
    },

    /// Probe each configured storage provider
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show current configuration
    Show,
}

#[derive(Clone, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    fn from_config(name: &str) -> Self {
        if name.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cloudstore_core::config::expand_tilde(&cli.config);
    let config = load_config(&config_path).await?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| LogFormat::from_config(&config.log.format));
    init_logging(&level, &format);

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "cloudstore starting"
    );

    match cli.command {
        Commands::Upload { path, encrypt } => {
            let encrypt = encrypt || config.crypto.encrypt_by_default;
            cmd_upload(&config, cli.address.as_deref(), &path, encrypt).await
        }
        Commands::Ls { search } => {
            cmd_list(&config, cli.address.as_deref(), false, search.as_deref()).await
        }
        Commands::Shared { search } => {
            cmd_list(&config, cli.address.as_deref(), true, search.as_deref()).await
        }
        Commands::Get { id, output } => {
            cmd_get(&config, cli.address.as_deref(), id, output.as_deref()).await
        }
        Commands::Share { id, recipient } => {
            cmd_share(&config, cli.address.as_deref(), id, &recipient).await
        }
        Commands::Rm { id } => cmd_rm(&config, cli.address.as_deref(), id).await,
        Commands::DeriveKey => cmd_derive_key(&config, cli.address.as_deref()),
        Commands::Usage { reset } => cmd_usage(&config, reset),
        Commands::Status => cmd_status(&config).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &config_path),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output; logs go to stderr
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

async fn load_config(path: &Path) -> Result<CloudStoreConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))
    } else {
        Ok(CloudStoreConfig::default())
    }
}

// ── Session wiring ────────────────────────────────────────────────────────────

fn require_address(address: Option<&str>) -> Result<WalletAddress> {
    let raw = address.context(
        "no wallet address\n\
         Pass --address or set the CLOUDSTORE_ADDRESS environment variable.",
    )?;
    WalletAddress::parse(raw).with_context(|| format!("invalid wallet address {raw:?}"))
}

fn envelope_manager(config: &CloudStoreConfig) -> EnvelopeKeyManager {
    EnvelopeKeyManager::new(KdfParams {
        salt: config.crypto.kdf_salt.clone(),
        iterations: config.crypto.kdf_iterations,
    })
}

/// Open a session for `address` over the configured providers and local state.
async fn open_session(config: &CloudStoreConfig, address: Option<&str>) -> Result<Session> {
    let address = require_address(address)?;

    let blobs = build_blob_stores(&config.storage, ProviderCredentials::from_env())
        .context("configuring storage providers")?;
    let registry_path = config.session.registry_path();
    let registry = LocalRegistry::open(&registry_path)
        .await
        .with_context(|| format!("opening registry: {}", registry_path.display()))?;
    let keys = JsonKeyDirectory::new(&config.session.keys_path());
    let store = keys
        .open(&address)
        .with_context(|| format!("opening key store for {}", address.short()))?;

    let ctx = SessionContext {
        blobs: Arc::new(blobs),
        registry: Arc::new(registry),
        delivery: Arc::new(keys),
        envelope: envelope_manager(config),
    };
    let usage = UsageTracker::open(&config.session.usage_path());

    Ok(Session::open(ctx, address.as_str(), Box::new(store), usage)?)
}

// ── Progress helpers ──────────────────────────────────────────────────────────

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

// ── `cloudstore upload` ───────────────────────────────────────────────────────

async fn cmd_upload(
    config: &CloudStoreConfig,
    address: Option<&str>,
    path: &Path,
    encrypt: bool,
) -> Result<()> {
    let mut session = open_session(config, address).await?;

    let pb = make_spinner("upload");
    pb.set_message(format!(
        "{}{}",
        path.display(),
        if encrypt { " (encrypted)" } else { "" }
    ));
    let outcome = session.upload(path, encrypt).await;
    pb.finish_and_clear();
    let outcome = outcome.with_context(|| format!("uploading {}", path.display()))?;

    let record = &outcome.record;
    println!("uploaded: {}", record.name);
    println!("  id:        {}", record.id);
    println!("  size:      {}", fmt_bytes(record.size));
    println!("  provider:  {}", record.provider);
    println!("  hash:      {}", record.hash);
    println!("  url:       {}", outcome.url);
    println!("  encrypted: {}", if record.encrypted { "yes" } else { "no" });
    Ok(())
}

// ── `cloudstore ls` / `cloudstore shared` ─────────────────────────────────────

async fn cmd_list(
    config: &CloudStoreConfig,
    address: Option<&str>,
    shared: bool,
    search: Option<&str>,
) -> Result<()> {
    let session = open_session(config, address).await?;
    let records = if shared {
        session.shared_with_me().await?
    } else {
        session.my_files().await?
    };
    let records = filter_by_name(records, search);

    if records.is_empty() {
        let message = match (search, shared) {
            (Some(query), _) if !query.is_empty() => format!("no files matching {query:?}"),
            (_, true) => "nothing shared with you yet".to_string(),
            (_, false) => "no files yet".to_string(),
        };
        println!("{message}");
        return Ok(());
    }

    println!("{}", format_header(shared));
    for record in &records {
        println!("{}", format_row(record, shared));
    }
    Ok(())
}

/// Keep records whose name contains `query`, ignoring case. An empty or
/// missing query keeps everything.
fn filter_by_name(records: Vec<FileRecord>, query: Option<&str>) -> Vec<FileRecord> {
    match query {
        Some(query) if !query.is_empty() => {
            let needle = query.to_lowercase();
            records
                .into_iter()
                .filter(|r| r.name.to_lowercase().contains(&needle))
                .collect()
        }
        _ => records,
    }
}

fn format_header(shared: bool) -> String {
    let who = if shared { "OWNER" } else { "SHARED" };
    format!(
        "{:>6}  {:<32}  {:>10}  {:<4}  {:<10}  {}",
        "ID", "NAME", "SIZE", "ENC", "PROVIDER", who
    )
}

fn format_row(record: &FileRecord, shared: bool) -> String {
    let who = if shared {
        record.owner.short()
    } else {
        record.shared_with.len().to_string()
    };
    format!(
        "{:>6}  {:<32}  {:>10}  {:<4}  {:<10}  {}",
        record.id,
        truncate(&record.name, 32),
        fmt_bytes(record.size),
        if record.encrypted { "yes" } else { "no" },
        record.provider,
        who
    )
}

// ── `cloudstore get` ──────────────────────────────────────────────────────────

async fn cmd_get(
    config: &CloudStoreConfig,
    address: Option<&str>,
    id: FileId,
    output: Option<&Path>,
) -> Result<()> {
    let mut session = open_session(config, address).await?;

    let pb = make_spinner("get");
    pb.set_message(format!("file {id}"));
    let file = session.retrieve(id).await;
    pb.finish_and_clear();
    let file = file.with_context(|| format!("retrieving file {id}"))?;

    let dest = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output(&file.record.name));
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    tokio::fs::write(&dest, &file.bytes)
        .await
        .with_context(|| format!("writing {}", dest.display()))?;

    println!(
        "saved {} ({}) -> {}",
        file.record.name,
        fmt_bytes(file.bytes.len() as u64),
        dest.display()
    );
    Ok(())
}

/// Bare file name of a recorded name, so a record cannot direct writes
/// outside the current directory.
fn default_output(name: &str) -> PathBuf {
    Path::new(name)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("download"))
}

// ── `cloudstore share` / `cloudstore rm` ──────────────────────────────────────

async fn cmd_share(
    config: &CloudStoreConfig,
    address: Option<&str>,
    id: FileId,
    recipient: &str,
) -> Result<()> {
    let mut session = open_session(config, address).await?;
    session
        .share(id, recipient)
        .await
        .with_context(|| format!("sharing file {id}"))?;
    println!("shared file {id} with {}", recipient.trim().to_lowercase());
    Ok(())
}

async fn cmd_rm(config: &CloudStoreConfig, address: Option<&str>, id: FileId) -> Result<()> {
    let mut session = open_session(config, address).await?;
    let record = session
        .delete(id)
        .await
        .with_context(|| format!("deleting file {id}"))?;
    println!("deleted {} ({})", record.name, record.id);
    Ok(())
}

// ── `cloudstore derive-key` ───────────────────────────────────────────────────

fn cmd_derive_key(config: &CloudStoreConfig, address: Option<&str>) -> Result<()> {
    let address = require_address(address)?;
    let key = envelope_manager(config)
        .derive_wrapping_key(address.as_str())
        .context("deriving wrapping key")?;
    println!("address:     {address}");
    println!("fingerprint: {}", key.fingerprint());
    Ok(())
}

// ── `cloudstore usage` ────────────────────────────────────────────────────────

fn cmd_usage(config: &CloudStoreConfig, reset: bool) -> Result<()> {
    let mut usage = UsageTracker::open(&config.session.usage_path());
    if reset {
        usage.reset();
        println!("usage counters cleared");
        return Ok(());
    }

    let stats = usage.snapshot();
    if stats.is_empty() {
        println!("no API usage recorded");
        return Ok(());
    }
    let rendered = serde_json::to_string_pretty(&stats).context("serializing usage")?;
    println!("{rendered}");
    Ok(())
}

// ── `cloudstore status` ───────────────────────────────────────────────────────

async fn cmd_status(config: &CloudStoreConfig) -> Result<()> {
    let blobs = build_blob_stores(&config.storage, ProviderCredentials::from_env())
        .context("configuring storage providers")?;

    let pb = make_spinner("status");
    pb.set_message("probing providers");
    let report = check_health(&blobs).await;
    pb.finish_and_clear();

    println!("cloudstore v{}", env!("CARGO_PKG_VERSION"));
    for (rank, health) in report.iter().enumerate() {
        match &health.error {
            None => println!("  {}. {:<10} ok", rank + 1, health.provider),
            Some(e) => println!("  {}. {:<10} FAILED: {e}", rank + 1, health.provider),
        }
    }

    if !report.iter().any(|h| h.is_healthy()) {
        anyhow::bail!("no storage provider is reachable");
    }
    Ok(())
}

// ── `cloudstore config show` ──────────────────────────────────────────────────

fn cmd_config_show(config: &CloudStoreConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!(
            "# Configuration: defaults (no file at {})",
            config_path.display()
        );
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

// ── Utilities ─────────────────────────────────────────────────────────────────

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let head: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{head}...")
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
