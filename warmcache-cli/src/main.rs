//! warmcache CLI
//!
//! Drives the refresh-ahead caches against a simulated slow source so their
//! behavior can be watched (`demo`) or measured (`bench`).

mod source;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use warmcache_core::CacheOptions;
use warmcache_engine::{CacheMap, CacheStats, DataCache};

use crate::source::{Record, SlowSource};

/// warmcache - refresh-ahead caches for slow data sources
#[derive(Parser)]
#[command(name = "warmcache")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read from both caches on a timer and print what comes back
    Demo {
        #[command(flatten)]
        cache: CacheArgs,
        #[command(flatten)]
        source: SourceArgs,
        /// Number of read rounds
        #[arg(short, long, default_value = "20")]
        rounds: u32,
        /// Pause between rounds, in milliseconds
        #[arg(short, long, default_value = "250")]
        interval_ms: u64,
        /// Number of keys read from the keyed cache each round
        #[arg(short, long, default_value = "4")]
        keys: u64,
    },

    /// Hammer the keyed cache from many tasks and report throughput
    Bench {
        #[command(flatten)]
        cache: CacheArgs,
        #[command(flatten)]
        source: SourceArgs,
        /// Number of concurrent reader tasks
        #[arg(short, long, default_value = "8")]
        tasks: u64,
        /// Distinct keys to spread reads over
        #[arg(short, long, default_value = "1000")]
        keys: u64,
        /// How long to run, in seconds
        #[arg(short, long, default_value = "5")]
        duration_secs: u64,
        /// Read in batches of this size through `get_many` (1 = single `get`)
        #[arg(short, long, default_value = "1")]
        batch: u64,
        /// Print final statistics as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Cache options. Unset flags fall back to `<PREFIX>_EXPIRATION_MS` and friends.
#[derive(Args)]
struct CacheArgs {
    /// Environment variable prefix for cache options
    #[arg(long, default_value = "WARMCACHE")]
    env_prefix: String,
    /// Refresh interval after a successful load
    #[arg(long)]
    expiration_ms: Option<i64>,
    /// Refresh interval after a failed load (<= 0 keeps failures out of the cache)
    #[arg(long)]
    expiration_on_err_ms: Option<i64>,
    /// Minimum spacing between refresh attempts
    #[arg(long)]
    retry_interval_ms: Option<i64>,
    /// Longest a first read waits for data
    #[arg(long)]
    wait_timeout_ms: Option<i64>,
    /// Idle time before a key is evicted
    #[arg(long)]
    evict_timeout_ms: Option<i64>,
}

impl CacheArgs {
    fn options(&self) -> Result<CacheOptions> {
        let mut options = CacheOptions::from_env(&self.env_prefix)
            .with_context(|| format!("reading {}_* cache options", self.env_prefix))?;

        if let Some(ms) = self.expiration_ms {
            options = options.expiration_ms(ms);
        }
        if let Some(ms) = self.expiration_on_err_ms {
            options = options.expiration_on_err_ms(ms);
        }
        if let Some(ms) = self.retry_interval_ms {
            options = options.retry_interval_ms(ms);
        }
        if let Some(ms) = self.wait_timeout_ms {
            options = options.wait_timeout_ms(ms);
        }
        if let Some(ms) = self.evict_timeout_ms {
            options = options.evict_timeout_ms(ms);
        }
        Ok(options)
    }
}

/// Simulated source settings.
#[derive(Args)]
struct SourceArgs {
    /// Latency of every source call
    #[arg(long, env = "WARMCACHE_SOURCE_LATENCY_MS", default_value = "100")]
    latency_ms: u64,
    /// Fail every Nth source call (0 = never)
    #[arg(long, env = "WARMCACHE_SOURCE_FAIL_EVERY", default_value = "0")]
    fail_every: u64,
}

impl SourceArgs {
    fn source(&self) -> SlowSource {
        SlowSource::new(Duration::from_millis(self.latency_ms), self.fail_every)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "warmcache=debug,info"
    } else {
        "warmcache=info,warn"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Demo {
            cache,
            source,
            rounds,
            interval_ms,
            keys,
        } => cmd_demo(&cache, &source, rounds, interval_ms, keys).await,
        Commands::Bench {
            cache,
            source,
            tasks,
            keys,
            duration_secs,
            batch,
            json,
        } => {
            let run = BenchRun {
                tasks,
                keys,
                duration: Duration::from_secs(duration_secs),
                batch,
            };
            cmd_bench(&cache, &source, run, json).await
        }
    }
}

fn describe(record: Option<&Record>) -> String {
    match record {
        Some(record) => format!("v{}", record.version).green().to_string(),
        None => "-".dimmed().to_string(),
    }
}

/// Watch both caches serve stale data while refreshing in the background
async fn cmd_demo(
    cache_args: &CacheArgs,
    source_args: &SourceArgs,
    rounds: u32,
    interval_ms: u64,
    keys: u64,
) -> Result<()> {
    let options = cache_args.options()?;
    let source = source_args.source();

    let single = DataCache::<Record>::new(source.clone(), &options);
    let map = CacheMap::<u64, Record>::builder()
        .key_loader(source.clone())
        .batch_loader(source.clone())
        .options(&options)
        .build()
        .context("building keyed cache")?;

    println!("{}", "Running warmcache demo...".cyan().bold());
    println!("   {} {:?}", "Policy:".dimmed(), single.policy());
    println!(
        "   {} {}ms latency, fail every {}",
        "Source:".dimmed(),
        source_args.latency_ms,
        source_args.fail_every
    );

    let wanted: Vec<u64> = (1..=keys).collect();
    let start = tokio::time::Instant::now();

    for round in 1..=rounds {
        let value = single.get().await;
        let values = map.get_many(&wanted).await;

        let row: Vec<String> = wanted
            .iter()
            .map(|key| {
                let record = values.get(key).and_then(|v| v.as_deref());
                format!("{}={}", key, describe(record))
            })
            .collect();
        println!(
            "   [{:>6}ms] #{:<3} single={} keys: {}",
            start.elapsed().as_millis(),
            round,
            describe(value.as_deref()),
            row.join(" ")
        );

        tokio::time::sleep(Duration::from_millis(interval_ms)).await;
    }

    // Callers that need to mutate a value take an independent copy.
    if let Some(mut record) = single.get_copy().await.context("copying cached value")? {
        record.version = 0;
        let cached = single.get().await;
        info!(?cached, copy = ?record, "copy is independent");
    }

    println!("\n{}", "Statistics:".green().bold());
    print_stats("single", &single.stats());
    print_stats("keyed", &map.stats());
    println!("   {} {}", "source calls:".dimmed(), source.calls());

    Ok(())
}

fn print_stats(label: &str, stats: &CacheStats) {
    println!(
        "   {:<7} entries={} loads={} failures={} evictions={}",
        label, stats.entries, stats.loads, stats.load_failures, stats.evictions
    );
}

struct BenchRun {
    tasks: u64,
    keys: u64,
    duration: Duration,
    batch: u64,
}

/// Concurrent readers over the keyed cache; returns total values read.
async fn run_bench(map: &CacheMap<u64, Record>, run: &BenchRun) -> Result<u64> {
    let reads = Arc::new(AtomicU64::new(0));
    let deadline = tokio::time::Instant::now() + run.duration;
    let keys = run.keys.max(1);
    let batch = run.batch.max(1);

    let mut handles = Vec::with_capacity(run.tasks as usize);
    for task in 0..run.tasks {
        let map = map.clone();
        let reads = Arc::clone(&reads);

        handles.push(tokio::spawn(async move {
            let mut i = task;
            while tokio::time::Instant::now() < deadline {
                if batch == 1 {
                    map.get(&(i % keys)).await;
                    reads.fetch_add(1, Ordering::Relaxed);
                } else {
                    let wanted: Vec<u64> = (0..batch).map(|j| (i + j * 31) % keys).collect();
                    let values = map.get_many(&wanted).await;
                    reads.fetch_add(values.len() as u64, Ordering::Relaxed);
                }
                i = i.wrapping_add(2 * task + 1);
                tokio::task::yield_now().await;
            }
        }));
    }

    for handle in handles {
        handle.await.context("bench task panicked")?;
    }
    Ok(reads.load(Ordering::Relaxed))
}

/// Measure read throughput against the simulated source
async fn cmd_bench(
    cache_args: &CacheArgs,
    source_args: &SourceArgs,
    run: BenchRun,
    json: bool,
) -> Result<()> {
    let options = cache_args.options()?;
    let source = source_args.source();
    let map = CacheMap::<u64, Record>::builder()
        .key_loader(source.clone())
        .batch_loader(source.clone())
        .options(&options)
        .build()
        .context("building keyed cache")?;

    println!(
        "{} {} tasks over {} keys for {:?}",
        "Benchmarking with".cyan().bold(),
        run.tasks,
        run.keys,
        run.duration
    );

    let start = std::time::Instant::now();
    let reads = run_bench(&map, &run).await?;
    let elapsed = start.elapsed();
    let stats = map.stats();

    if json {
        let report = serde_json::json!({
            "reads": reads,
            "elapsed_ms": elapsed.as_millis() as u64,
            "source_calls": source.calls(),
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let rate = reads as f64 / elapsed.as_secs_f64();
    println!("\n{}", "Results:".green().bold());
    println!("   Reads: {} ({:.0}/sec)", reads, rate);
    println!("   Source calls: {}", source.calls());
    print_stats("keyed", &stats);

    Ok(())
}
