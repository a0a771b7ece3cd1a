//! Inspects a message extraction layer database.

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use mel_db::{Database, DiskKeyValueStore, KeyValueStore};
use serde::Serialize;
use std::path::PathBuf;
use tracing::Level;

/// Reads states, delayed messages and batch metadata out of a MEL database.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Verbosity level (0-4)
    #[arg(long, short, help = "Verbosity level (0 [error] - 4 [trace]) - Default: 0 [error]", action = ArgAction::Count)]
    v: u8,
    /// Directory of the RocksDB database.
    #[arg(long, env = "MEL_DB_PATH")]
    db_path: PathBuf,
    /// What to print.
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Print the head state.
    Head,
    /// Print the state built from a parent chain block.
    State {
        /// The parent chain block number.
        number: u64,
    },
    /// Print a stored delayed message.
    Delayed {
        /// The delayed message index.
        index: u64,
    },
    /// Print the metadata of a batch.
    Batch {
        /// The batch sequence number.
        seq: u64,
    },
}

fn main() -> Result<()> {
    let Cli { v, db_path, command } = Cli::parse();
    init_tracing_subscriber(v)?;

    let store = DiskKeyValueStore::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    let db = Database::new(store);
    let json = render(&db, &command)?;
    println!("{json}");
    Ok(())
}

/// Looks up what `command` names and renders it as JSON.
fn render<KV: KeyValueStore>(db: &Database<KV>, command: &Command) -> Result<String> {
    tracing::debug!(target: "mel", "Running {:?}", command);
    match *command {
        Command::Head => to_json(db.get_head_state()?, "head state"),
        Command::State { number } => {
            to_json(db.get_state(number)?, &format!("state of block {number}"))
        }
        Command::Delayed { index } => {
            to_json(db.get_delayed_message(index)?, &format!("delayed message {index}"))
        }
        Command::Batch { seq } => {
            to_json(db.get_batch_metadata(seq)?, &format!("metadata of batch {seq}"))
        }
    }
}

fn to_json<T: Serialize>(value: Option<T>, what: &str) -> Result<String> {
    let value = value.ok_or_else(|| anyhow!("{what} not found"))?;
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Initializes the tracing subscriber
///
/// # Arguments
/// * `verbosity_level` - The verbosity level (0-4)
///
/// # Returns
/// * `Result<()>` - Ok if successful, Err otherwise.
fn init_tracing_subscriber(verbosity_level: u8) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(match verbosity_level {
            0 => Level::ERROR,
            1 => Level::WARN,
            2 => Level::INFO,
            3 => Level::DEBUG,
            _ => Level::TRACE,
        })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).map_err(|e| anyhow!(e))
}
