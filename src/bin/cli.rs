//! BlockKV CLI
//!
//! Command-line interface for inspecting and editing a store on disk.

use std::path::PathBuf;
use std::process;

use blockkv::{Config, KvStore};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// BlockKV CLI
#[derive(Parser, Debug)]
#[command(name = "blockkv-cli")]
#[command(about = "CLI for the BlockKV embedded key-value store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./blockkv_data")]
    data_dir: PathBuf,

    /// Store name ({name}.idx / {name}.dat)
    #[arg(short, long, default_value = "store")]
    name: String,

    /// Payload bytes per key block
    #[arg(long, default_value = "30")]
    key_bytes: usize,

    /// Payload bytes per value block
    #[arg(long, default_value = "100")]
    value_bytes: usize,

    /// Blocks per region
    #[arg(short, long, default_value = "1000")]
    blocks: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,

        /// Leave an existing value untouched
        #[arg(long)]
        if_absent: bool,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// List all keys
    Keys,

    /// Show block usage
    Stats,

    /// Log every bucket chain and value chain
    Dump,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,blockkv=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .name(&args.name)
        .key_payload_bytes(args.key_bytes)
        .value_payload_bytes(args.value_bytes)
        .block_count(args.blocks)
        .build();

    let store = match KvStore::open(config) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run(&store, args.command) {
        tracing::error!("Command failed: {}", e);
        process::exit(1);
    }

    if let Err(e) = store.close() {
        tracing::error!("Failed to close store: {}", e);
        process::exit(1);
    }
}

fn run(store: &KvStore, command: Commands) -> blockkv::Result<()> {
    match command {
        Commands::Get { key } => match store.get(key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        },
        Commands::Put {
            key,
            value,
            if_absent,
        } => {
            let stored = if if_absent {
                store.put_if_absent(key.as_bytes(), value.as_bytes())?
            } else {
                store.put(key.as_bytes(), value.as_bytes())?
            };
            println!("{}", if stored { "OK" } else { "NOT STORED" });
        }
        Commands::Del { key } => match store.remove(key.as_bytes())? {
            Some(_) => println!("1"),
            None => println!("0"),
        },
        Commands::Keys => {
            for key in store.keys() {
                println!("{}", String::from_utf8_lossy(&key));
            }
        }
        Commands::Stats => {
            let stats = store.stats();
            println!("keys          {}", stats.keys);
            println!("buckets       {}", stats.buckets);
            println!("values        {}", stats.values);
            println!("key blocks    {}/{} free", stats.key_blocks_free, stats.key_blocks);
            println!("value blocks  {}/{} free", stats.value_blocks_free, stats.value_blocks);
        }
        Commands::Dump => store.dump(),
    }
    Ok(())
}
