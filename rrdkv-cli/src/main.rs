//! CLI for rrdkv round-robin time-series buckets.
//!
//! Provides commands for creating, inspecting, feeding and querying buckets
//! in an rrdkv database file.

use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use rrdkv::{Stats, Store};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// rrdkv: round-robin time-series buckets in an embedded key-value store.
#[derive(Parser)]
#[command(name = "rrdkv", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create a bucket.
    Create {
        /// Path to the database file.
        db_path: PathBuf,

        /// Bucket name.
        bucket: String,

        /// Nominal seconds between samples.
        #[arg(long, default_value = "60")]
        step: u32,

        /// Maximum number of retained samples.
        #[arg(long, default_value = "1440")]
        capacity: u32,

        /// Data-source labels, in order.
        #[arg(required = true)]
        sources: Vec<String>,
    },

    /// List bucket names.
    List {
        /// Path to the database file.
        db_path: PathBuf,
    },

    /// Display every bucket with its configuration and sample count.
    Info {
        /// Path to the database file.
        db_path: PathBuf,
    },

    /// Save one reading per data source, stamped with the current time.
    Save {
        /// Path to the database file.
        db_path: PathBuf,

        /// Bucket name.
        bucket: String,

        /// One value per data source.
        #[arg(required = true, allow_negative_numbers = true)]
        values: Vec<f64>,
    },

    /// Query a bucket over a trailing time range.
    Query {
        /// Path to the database file.
        db_path: PathBuf,

        /// Bucket name.
        bucket: String,

        /// Time range to query (e.g., "1h", "30m", "7d").
        #[arg(long, default_value = "1h")]
        range: String,

        /// Output step in seconds (defaults to the bucket's step).
        #[arg(long)]
        step: Option<u32>,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },
}

/// Output format for query results.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values.
    Csv,
    /// Chart-ready JSON object.
    Json,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Create {
            db_path,
            bucket,
            step,
            capacity,
            sources,
        } => cmd_create(&db_path, &bucket, step, capacity, &sources),
        Commands::List { db_path } => cmd_list(&db_path),
        Commands::Info { db_path } => cmd_info(&db_path),
        Commands::Save {
            db_path,
            bucket,
            values,
        } => cmd_save(&db_path, &bucket, &values),
        Commands::Query {
            db_path,
            bucket,
            range,
            step,
            format,
        } => cmd_query(&db_path, &bucket, &range, step, &format),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Implements `rrdkv create <db_path> <bucket> <sources>...`.
fn cmd_create(
    db_path: &Path,
    bucket: &str,
    step: u32,
    capacity: u32,
    sources: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = Store::open(db_path)?;
    store.create_bucket(bucket, step, capacity, sources)?;
    store.close()?;

    println!(
        "Created bucket \"{bucket}\": step={}, retention={}, sources={}",
        format_duration_secs(u64::from(step)),
        format_duration_secs(u64::from(step) * u64::from(capacity)),
        sources.join(", ")
    );
    Ok(())
}

/// Implements `rrdkv list <db_path>`.
fn cmd_list(db_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(db_path)?;
    let mut names = store.list_buckets()?;
    names.sort();
    for name in names {
        println!("{name}");
    }
    Ok(())
}

/// Implements `rrdkv info <db_path>`.
fn cmd_info(db_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(db_path)?;
    let mut names = store.list_buckets()?;
    names.sort();

    println!("Database: {}", db_path.display());
    println!("Buckets: {}", names.len());
    println!();

    for name in &names {
        let bucket = store.bucket(name);
        let Some(descriptor) = bucket.descriptor() else {
            continue;
        };
        let count = bucket.sample_count()?;

        println!("  Bucket \"{name}\"");
        let step = format_duration_secs(u64::from(descriptor.step));
        println!("    Step: {step}");
        println!(
            "    Capacity: {} samples ({} retention)",
            descriptor.capacity,
            format_duration_secs(u64::from(descriptor.step) * u64::from(descriptor.capacity))
        );
        println!("    Sources: {}", descriptor.data_sources.join(", "));
        println!("    Samples: {count}/{}", descriptor.capacity);
        println!();
    }

    let size = std::fs::metadata(db_path)?.len();
    println!("Total disk usage: {} ({size} bytes)", format_bytes(size));
    Ok(())
}

/// Implements `rrdkv save <db_path> <bucket> <values>...`.
fn cmd_save(
    db_path: &Path,
    bucket: &str,
    values: &[f64],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = open_existing(db_path)?;
    store.bucket(bucket).save(values)?;
    store.close()?;
    Ok(())
}

/// Implements `rrdkv query <db_path> <bucket>`.
fn cmd_query(
    db_path: &Path,
    bucket_name: &str,
    range: &str,
    step: Option<u32>,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(db_path)?;
    let bucket = store
        .get_bucket(bucket_name)
        .ok_or_else(|| format!("Bucket '{bucket_name}' not found"))?;
    let output_step = match (step, bucket.descriptor()) {
        (Some(step), _) => step,
        (None, Some(descriptor)) => descriptor.step,
        (None, None) => return Err(format!("Bucket '{bucket_name}' not found").into()),
    };

    let range_secs = i64::try_from(parse_duration(range)?)?;
    let now = Utc::now().timestamp();
    let from = now.saturating_sub(range_secs);
    debug!(
        bucket = bucket_name,
        from,
        to = now,
        output_step,
        "querying bucket"
    );
    let stats = bucket.get_stats(from, now, output_step)?;

    match format {
        OutputFormat::Csv => print_csv(bucket_name, &stats),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
    }

    Ok(())
}

/// Opens a database, refusing to create a new file.
fn open_existing(db_path: &Path) -> Result<Store, Box<dyn std::error::Error>> {
    if !db_path.exists() {
        let message = format!("No database found at '{}'", db_path.display());
        return Err(message.into());
    }
    Ok(Store::open(db_path)?)
}

fn print_csv(bucket_name: &str, stats: &Stats) {
    println!(
        "# bucket={bucket_name}, mode={:?}, points={}",
        stats.mode,
        stats.len()
    );

    let sources: Vec<&str> = stats.datasets.iter().map(|d| d.label.as_str()).collect();
    println!("timestamp,label,{}", sources.join(","));

    let rows = stats.timestamps.iter().zip(&stats.labels);
    for (i, (timestamp, label)) in rows.enumerate() {
        let values: Vec<String> = stats
            .datasets
            .iter()
            .map(|d| d.data[i].to_string())
            .collect();
        println!("{timestamp},{label},{}", values.join(","));
    }
}

/// Parses a human-readable duration string (e.g., "1h", "30m", "7d") to seconds.
fn parse_duration(s: &str) -> Result<u64, Box<dyn std::error::Error>> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Empty duration string".into());
    }

    // The unit may be any char, so split on a char boundary.
    let (idx, unit) = s.char_indices().last().ok_or("Empty duration string")?;
    let num: u64 = s[..idx].parse()?;

    let multiplier = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        'd' => 86400,
        _ => {
            let message = format!("Unknown duration unit: '{unit}'. Use s, m, h, or d.");
            return Err(message.into());
        }
    };

    num.checked_mul(multiplier)
        .ok_or_else(|| format!("Duration too large: '{s}'").into())
}

/// Formats seconds as a human-readable duration.
fn format_duration_secs(secs: u64) -> String {
    if secs >= 86400 && secs.is_multiple_of(86400) {
        format!("{}d", secs / 86400)
    } else if secs >= 3600 && secs.is_multiple_of(3600) {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs.is_multiple_of(60) {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

/// Formats a byte count as a human-readable string.
#[allow(clippy::cast_precision_loss)] // Byte counts are display-only
fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}
