//! rootio-dump Binary
//!
//! Walks the records stored in a region of a file and prints their headers.

use clap::Parser;
use rootio::scan::RecordWalker;
use rootio::{factory, Config, DiskFile, Key, RangeReader};
use tracing_subscriber::{fmt, EnvFilter};

/// Offset of the first record in a standard file
const DEFAULT_BEGIN: i64 = 100;

/// rootio record dump
#[derive(Parser, Debug)]
#[command(name = "rootio-dump")]
#[command(about = "List the records stored in a ROOT file")]
#[command(version)]
struct Args {
    /// File to inspect
    path: String,

    /// Offset of the first record
    #[arg(short, long, default_value_t = DEFAULT_BEGIN)]
    begin: i64,

    /// Offset to stop at (defaults to the end of the file)
    #[arg(short, long)]
    end: Option<i64>,

    /// Decode each record's object with the built-in classes
    #[arg(short, long)]
    resolve: bool,

    /// Check compression sub-headers while decoding
    #[arg(long)]
    verify_compression: bool,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rootio=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!("rootio-dump v{}", rootio::VERSION);

    let config = Config::builder()
        .verify_compression_header(args.verify_compression)
        .build();
    if let Err(e) = config.validate() {
        tracing::error!("{}", e);
        std::process::exit(1);
    }

    let file = match DiskFile::open(&args.path) {
        Ok(f) => f.into_ref(),
        Err(e) => {
            tracing::error!("Failed to open {}: {}", args.path, e);
            std::process::exit(1);
        }
    };

    let end = args.end.unwrap_or(file.size() as i64);
    let mut records = 0usize;
    let mut failures = 0usize;

    for entry in RecordWalker::new(file, args.begin, end) {
        let key = match entry {
            Ok(key) => key,
            Err(e) => {
                tracing::error!("Walk stopped: {}", e);
                failures += 1;
                break;
            }
        };
        records += 1;
        print_key(&key);

        if args.resolve && !key.is_gap() {
            match key.object_with(factory(), &config) {
                Ok(obj) => println!("    => {:?}", obj),
                Err(e) => {
                    failures += 1;
                    println!("    => error: {}", e);
                }
            }
        }
    }

    tracing::info!("{} records, {} failures", records, failures);
    if failures > 0 {
        std::process::exit(1);
    }
}

fn print_key(key: &Key) {
    if let Some(len) = key.gap_len() {
        println!("{:>10}  [GAP] {} bytes", key.seek_key(), len);
        return;
    }
    println!(
        "{:>10}  {} {:?} {:?} cycle={} bytes={} objlen={} keylen={} compressed={} {}",
        key.seek_key(),
        key.class(),
        key.name(),
        key.title(),
        key.cycle(),
        key.total_len(),
        key.obj_len(),
        key.key_len(),
        key.is_compressed(),
        key.datetime()
    );
}
