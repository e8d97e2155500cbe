//! Pending-queue maintenance tool.
//!
//! Opens the durable cache database directly; the app does not need to run.
//!
//! Usage:
//!   cargo run -p medstock-sync --bin queue-inspect -- list
//!   cargo run -p medstock-sync --bin queue-inspect -- --db ./cache.db count
//!   cargo run -p medstock-sync --bin queue-inspect -- clear
//!   cargo run -p medstock-sync --bin queue-inspect -- sweep

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use medstock_cache::{ExpiringCache, SqliteBackend, SqliteConfig};
use medstock_sync::{PendingQueue, SyncConfig};
use tracing_subscriber::EnvFilter;

fn print_help() {
    println!("Medstock pending queue inspector");
    println!();
    println!("Usage: queue-inspect [OPTIONS] <COMMAND>");
    println!();
    println!("Commands:");
    println!("  list     Show queued operations in dispatch order");
    println!("  count    Print the number of queued operations");
    println!("  clear    Drop every queued operation");
    println!("  sweep    Delete expired cache entries");
    println!();
    println!("Options:");
    println!("  -c, --config <PATH>  Config file (default: platform config dir)");
    println!("  -d, --db <PATH>      Cache database (default: from config)");
    println!("  -h, --help           Show this help message");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,medstock=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut db_path: Option<PathBuf> = None;
    let mut command: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => command = Some(other.to_string()),
        }
        i += 1;
    }

    let Some(command) = command else {
        print_help();
        return Ok(());
    };

    let config = SyncConfig::load(config_path)?;
    let db_path = db_path
        .or_else(|| config.database_path())
        .ok_or("no cache database path; pass --db")?;

    let backend = SqliteBackend::open(SqliteConfig::new(&db_path)).await?;
    let cache = Arc::new(ExpiringCache::with_std_ttl(
        Arc::new(backend.clone()),
        config.cache_ttl(),
    ));
    let queue = PendingQueue::new(cache.clone(), config.sync.queue_key.clone());

    match command.as_str() {
        "list" => {
            let entries = queue.drain().await?;
            if entries.is_empty() {
                println!("Queue is empty ({})", db_path.display());
            }
            for (position, entry) in entries.iter().enumerate() {
                let op = &entry.operation;
                println!(
                    "{:>4}  {}  {:<16} {:<24} {} ({} bytes)",
                    position + 1,
                    op.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    op.kind,
                    entry.dedup_key,
                    op.id,
                    op.payload.len()
                );
            }
        }
        "count" => println!("{}", queue.len().await?),
        "clear" => {
            let count = queue.len().await?;
            queue.clear().await?;
            println!("Cleared {} queued operation(s)", count);
        }
        "sweep" => {
            let purged = cache.purge_expired().await?;
            println!("Purged {} expired cache entr(ies)", purged);
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_help();
            backend.close().await;
            std::process::exit(2);
        }
    }

    backend.close().await;
    Ok(())
}
