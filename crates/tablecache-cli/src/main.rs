//! tablecache - browse and review restaurants, online or off.
//!
//! Reads are answered from the local cache when possible. Reviews and
//! favorites are queued locally and delivered by `tablecache sync`.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tablecache_core::{
    spawn_sync_loop, CachedData, Config, Connectivity, DrainOutcome, DrainResult, DurableStore,
    Fetched, FileStore, HttpRemote, MemoryStore, NewReview, RemoteEndpoint, Resource, Restaurant,
    Review, Session, Source, SyncTrigger, UnavailableStore,
};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "tablecache")]
#[command(about = "Offline-first client for the restaurant reviews service")]
#[command(version)]
struct Args {
    /// Path to config file (default: $XDG_CONFIG_HOME/tablecache/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Service URL, overriding the config file
    #[arg(short, long, global = true)]
    server: Option<String>,

    /// Keep nothing on disk for this run
    #[arg(long, global = true)]
    ephemeral: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Print raw JSON instead of formatted lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every restaurant
    Restaurants,
    /// Show one restaurant
    Restaurant { id: u64 },
    /// List the reviews of a restaurant
    Reviews { restaurant_id: u64 },
    /// Restaurants whose attribute equals a value
    Filter { attr: String, value: String },
    /// Distinct values of an attribute across all restaurants
    Values { attr: String },
    /// Restaurants by cuisine and neighborhood ("all" matches anything)
    Search {
        #[arg(long, default_value = "all")]
        cuisine: String,
        #[arg(long, default_value = "all")]
        neighborhood: String,
    },
    /// Queue a review for delivery
    Review {
        restaurant_id: u64,
        name: String,
        rating: u8,
        #[arg(default_value = "")]
        comments: String,
    },
    /// Queue a favorite flag change
    Favorite {
        restaurant_id: u64,
        #[arg(action = clap::ArgAction::Set)]
        is_favorite: bool,
    },
    /// Show writes waiting for delivery
    Pending,
    /// Deliver queued writes
    Sync {
        /// Keep running, probing the service every N seconds
        #[arg(long, value_name = "SECS")]
        watch: Option<u64>,
    },
}

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr, filtered by `RUST_LOG` (default `warn`). With a log
/// file, the returned guard must live until exit so buffered lines are
/// flushed.
fn init_tracing(log_file: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer().with_writer(io::stderr);

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(filter)
                .init();
            Ok(None)
        }
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let config = match &args.config {
        Some(path) => Config::load_from(path)?.with_env_overrides()?,
        None => Config::load()?,
    };
    let config = match &args.server {
        Some(server) => Config {
            server_url: server.clone(),
            ..config
        },
        None => config,
    };
    config.validate()?;
    Ok(config)
}

/// Open the on-disk store, or run without one if it cannot be opened.
fn open_store(config: &Config, ephemeral: bool) -> Result<Arc<dyn DurableStore>> {
    if ephemeral {
        info!("Using in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let dir = config.cache_dir()?;
    match FileStore::open(&dir) {
        Ok(store) => {
            info!(path = %store.root().display(), "Opened local store");
            Ok(Arc::new(store))
        }
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "Local store unavailable, continuing without offline support");
            Ok(Arc::new(UnavailableStore::new(dir, e.to_string())))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let _log_guard = init_tracing(args.log_file.as_ref())?;

    let config = load_config(&args)?;
    let store = open_store(&config, args.ephemeral)?;
    let remote = Arc::new(HttpRemote::new(config.server_url()?, config.request_timeout())?);
    info!(server = %remote.base_url(), "Using reviews service");
    let session = Session::new(store, remote.clone(), config.request_timeout());

    let result = run(&session, remote, &args).await;

    // Let refreshes started by cached reads land before exiting
    session.settle().await;
    result
}

async fn run(session: &Session, remote: Arc<HttpRemote>, args: &Args) -> Result<()> {
    let json = args.json;
    match &args.command {
        Command::Restaurants => {
            let all = session.fetch_all().await?;
            report_source(&all);
            print_restaurants(&all.value, json)?;
        }
        Command::Restaurant { id } => {
            let fetched = session.fetch_entity(*id).await?;
            report_source(&fetched);
            if json {
                print_json(&fetched.value)?;
            } else {
                print_restaurant_detail(&fetched.value);
            }
        }
        Command::Reviews { restaurant_id } => {
            let fetched = session.fetch_children_of(*restaurant_id).await?;
            report_source(&fetched);
            print_reviews(&fetched.value, json)?;
        }
        Command::Filter { attr, value } => {
            let matches = session.filter_by_attribute(attr, value).await?;
            print_restaurants(&matches, json)?;
        }
        Command::Values { attr } => {
            let values = session.distinct_values_of(attr).await?;
            if json {
                print_json(&values)?;
            } else {
                for value in values {
                    println!("{}", value);
                }
            }
        }
        Command::Search {
            cuisine,
            neighborhood,
        } => {
            let matches = session
                .filter_by_cuisine_and_neighborhood(cuisine, neighborhood)
                .await?;
            print_restaurants(&matches, json)?;
        }
        Command::Review {
            restaurant_id,
            name,
            rating,
            comments,
        } => {
            let receipt = session.submit_write(NewReview {
                restaurant_id: *restaurant_id,
                name: name.clone(),
                rating: *rating,
                comments: comments.clone(),
            })?;
            println!("Review queued ({} pending). Run `tablecache sync` to deliver.", receipt.pending);
        }
        Command::Favorite {
            restaurant_id,
            is_favorite,
        } => {
            let receipt = session.set_favorite(*restaurant_id, *is_favorite)?;
            println!("Favorite change queued ({} pending).", receipt.pending);
        }
        Command::Pending => {
            let entries = session.pending_writes()?;
            if json {
                print_json(&entries)?;
            } else if entries.is_empty() {
                println!("Nothing pending.");
            } else {
                for entry in entries {
                    println!(
                        "{}  {}",
                        entry.queued_at.format("%Y-%m-%d %H:%M:%S"),
                        entry.write.describe()
                    );
                }
            }
        }
        Command::Sync { watch: None } => {
            let result = session.drain().await;
            print_drain(&result);
            if let Some(e) = result.error() {
                bail!("Sync incomplete: {}", e);
            }
        }
        Command::Sync { watch: Some(secs) } => {
            if *secs == 0 {
                bail!("--watch interval must be greater than zero");
            }
            watch_sync(session, remote, Duration::from_secs(*secs)).await;
        }
    }
    Ok(())
}

/// Probe the service on an interval and drain whenever it is reachable.
/// Runs until the process is stopped.
async fn watch_sync(session: &Session, remote: Arc<HttpRemote>, interval: Duration) {
    let (connectivity, connectivity_rx) = watch::channel(Connectivity::Offline);
    let (trigger, trigger_rx) = SyncTrigger::channel();
    let (_handle, mut results) = spawn_sync_loop(session.drainer(), connectivity_rx, trigger_rx);

    let probe = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let state = match remote.read_collection(Resource::Restaurants).await {
                Ok(_) => Connectivity::Online,
                Err(e) => {
                    info!(server = %remote.base_url(), error = %e, "Service unreachable");
                    Connectivity::Offline
                }
            };
            let was_online = *connectivity.borrow() == Connectivity::Online;
            connectivity.send_replace(state);
            // A transition already starts a drain; otherwise nudge one
            if state == Connectivity::Online && was_online && !trigger.request() {
                break;
            }
        }
    });

    while let Some(result) = results.recv().await {
        if result.sent > 0 || result.error().is_some() {
            print_drain(&result);
        }
    }
    probe.abort();
}

fn report_source<T>(fetched: &Fetched<T>) {
    if let (Source::Cached, Some(cached_at)) = (fetched.source, fetched.cached_at) {
        let age = CachedData {
            data: (),
            cached_at,
        }
        .age_display();
        eprintln!("(from local cache, updated {})", age);
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_restaurants(restaurants: &[Restaurant], json: bool) -> Result<()> {
    if json {
        return print_json(restaurants);
    }
    for r in restaurants {
        println!(
            "{:>4}  {}  [{} / {}]",
            r.id,
            r.display_name(),
            r.cuisine_type.as_deref().unwrap_or("-"),
            r.neighborhood.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

fn print_restaurant_detail(r: &Restaurant) {
    println!("{}", r.display_name());
    for attr in ["cuisine_type", "neighborhood", "address"] {
        if let Some(value) = r.attribute(attr) {
            println!("  {:<13} {}", attr, value);
        }
    }
    if let Some(Value::Object(hours)) = r.extra.get("operating_hours") {
        println!("  hours");
        for (day, hours) in hours {
            println!("    {:<10} {}", day, hours.as_str().unwrap_or_default());
        }
    }
}

fn print_reviews(reviews: &[Review], json: bool) -> Result<()> {
    if json {
        return print_json(reviews);
    }
    if reviews.is_empty() {
        println!("No reviews yet.");
    }
    for review in reviews {
        println!("{}  {}", review.stars(), review.name);
        if !review.comments.is_empty() {
            println!("    {}", review.comments);
        }
    }
    Ok(())
}

fn print_drain(result: &DrainResult) {
    match &result.outcome {
        DrainOutcome::Complete if result.sent == 0 => println!("Nothing to sync."),
        DrainOutcome::Complete => println!("Synced {} write(s).", result.sent),
        DrainOutcome::Partial(e) => println!(
            "Synced {} write(s), {} still pending: {}",
            result.sent, result.remaining, e
        ),
        DrainOutcome::NoProgress(e) => {
            println!("Could not sync, {} still pending: {}", result.remaining, e)
        }
        DrainOutcome::Coalesced => println!("A sync is already running."),
    }
}
