//! Store Inspection CLI
//!
//! Views of a store's schema catalogue and the values under it. The log is
//! opened read-only: an incomplete final frame is skipped, not repaired.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use kv_shed::config::Backend;
use kv_shed::{Db, FieldKind, LogStore, ShedConfig, U64Codec};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shed-inspect")]
#[command(about = "Inspect the schema catalogue and values of a store")]
struct Cli {
    /// Config file (defaults to shed.toml lookup)
    #[arg(short, long)]
    config: Option<String>,

    /// Log file to open, overriding the configured store
    #[arg(short, long)]
    path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalogue entries
    Schema,

    /// Print the catalogue fingerprint
    Fingerprint,

    /// Print the value of a field
    Get {
        /// Field name
        name: String,
    },

    /// List entries of an index or vector
    Dump {
        /// Index or vector name
        name: String,
        /// Stop after this many entries
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

fn main() {
    let cli = Cli::parse();

    let mut config = match ShedConfig::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(path) = &cli.path {
        config.store.backend = Backend::Log;
        config.store.path = path.clone();
    }

    if let Err(e) = run(cli.command, &config) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands, config: &ShedConfig) -> anyhow::Result<()> {
    if config.store.backend == Backend::Memory {
        bail!("the memory backend holds nothing to inspect; point --path at a log file");
    }
    let path = config.store_path();
    if !path.exists() {
        bail!("no store at {}", path.display());
    }
    let store = LogStore::open_read_only(&path)
        .with_context(|| format!("opening store at {}", path.display()))?;
    let db = Db::open(Arc::new(store))?;
    let registry = db.registry();

    match command {
        Commands::Schema => {
            let entries = registry.entries();
            if entries.is_empty() {
                println!("No entries registered yet.");
            } else {
                println!("{:<6} {:<14} {:<32} created", "id", "kind", "name");
                for entry in entries {
                    println!(
                        "{:<6} {:<14} {:<32} {}",
                        entry.id.get(),
                        entry.kind,
                        entry.name,
                        entry.created_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
        }

        Commands::Fingerprint => {
            println!("{}  ({} entries)", registry.fingerprint(), registry.len());
        }

        Commands::Get { name } => {
            let entry = registry
                .lookup(&name)
                .with_context(|| format!("{} is not registered", name))?;
            if entry.kind.is_multi_entry() {
                bail!("{} is a {}; use `dump {}`", name, entry.kind, name);
            }
            match db.store().get(&entry.prefix())? {
                None => println!("(not set)"),
                Some(bytes) => println!("{}", render(entry.kind, &bytes)),
            }
        }

        Commands::Dump { name, limit } => {
            let entry = registry
                .lookup(&name)
                .with_context(|| format!("{} is not registered", name))?;
            if !entry.kind.is_multi_entry() {
                bail!("{} is a {} field; use `get {}`", name, entry.kind, name);
            }
            let prefix = entry.prefix();
            let mut shown = 0usize;
            for item in db.store().iterate(&prefix)? {
                if limit.is_some_and(|limit| shown >= limit) {
                    break;
                }
                let (key, value) = item?;
                let suffix = &key[prefix.len()..];
                let value = match entry.kind {
                    FieldKind::Uint64Vector => render(FieldKind::Uint64, &value),
                    _ => hex::encode(&value),
                };
                println!("{}  {}", hex::encode(suffix), value);
                shown += 1;
            }
            println!("{} entries shown", shown);
        }
    }

    Ok(())
}

fn render(kind: FieldKind, bytes: &[u8]) -> String {
    match kind {
        FieldKind::String => String::from_utf8_lossy(bytes).into_owned(),
        FieldKind::Uint64 => match U64Codec::from_bytes(bytes) {
            Ok(value) => value.to_string(),
            Err(e) => format!("<{}> {}", e, hex::encode(bytes)),
        },
        FieldKind::StructJson => match serde_json::from_slice::<serde_json::Value>(bytes) {
            Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| hex::encode(bytes)),
            Err(e) => format!("<{}> {}", e, hex::encode(bytes)),
        },
        _ => hex::encode(bytes),
    }
}
