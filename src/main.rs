use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use subtrack::cache::{spawn_control_loop, AssetCacheManager, CacheStorage, Fetcher, HttpFetcher};
use subtrack::config::AppConfig;
use subtrack::events::{AppEvent, EventBus};
use subtrack::notify::{NotificationScheduler, ReminderTray};
use subtrack::store::{KeyValueStore, RecordStore, SqliteStore, Statistics};
use subtrack::sync::{
    spawn_reachability_monitor, DeferredSync, LoggingPage, SubscriptionSync, SyncCoordinator,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("Invalid configuration")?;
    let args: Vec<String> = std::env::args().skip(1).collect();

    // ── Record store ─────────────────────────────────────────────────────
    let db_path = config.store.database_path();
    let kv: Arc<dyn KeyValueStore> = Arc::new(
        SqliteStore::open(&db_path, config.store.quota_bytes)
            .with_context(|| format!("Failed to open database {}", db_path.display()))?,
    );
    let events = EventBus::new();
    let store = RecordStore::open(Arc::clone(&kv), events.clone(), config.store.clone());

    match args.first().map(String::as_str) {
        None | Some("stats") => print_statistics(&store.statistics()),
        Some("export") => println!("{}", store.export_all()?),
        Some("import") => {
            let Some(path) = args.get(1) else {
                bail!("Usage: subtrack import <file>");
            };
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {path}"))?;
            let count = store.import_all(&raw)?;
            eprintln!("Imported {count} subscriptions");
        }
        Some("run") => run(config, kv, store, events).await?,
        Some(other) => bail!("Unknown command: {other} (expected stats, export, import or run)"),
    }
    Ok(())
}

/// Keep the cache, sync and reminder machinery alive until Ctrl-C.
async fn run(
    config: AppConfig,
    kv: Arc<dyn KeyValueStore>,
    store: Arc<RecordStore>,
    events: EventBus,
) -> anyhow::Result<()> {
    eprintln!("📅 Subtrack v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Data: {}", config.store.database_path().display());
    eprintln!("   Cache: {} ({})", config.cache.version, config.cache.origin);
    eprintln!("   Press Ctrl-C to exit.\n");

    // ── Asset cache ──────────────────────────────────────────────────────
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(&config.cache.origin)?);
    let (lifecycle_tx, lifecycle_rx) = broadcast::channel(16);
    let cache = AssetCacheManager::new(
        config.cache.clone(),
        Arc::new(CacheStorage::new()),
        Arc::clone(&fetcher),
        lifecycle_tx,
    );
    let (control, _control_handle) = spawn_control_loop(Arc::clone(&cache));

    // ── Reminders ────────────────────────────────────────────────────────
    let tray = Arc::new(ReminderTray::default());
    let scheduler = NotificationScheduler::new(Arc::clone(&store), tray, config.reminders.clone());
    let _scheduler_handle = scheduler.start().await;

    // ── Background sync + coordinator ────────────────────────────────────
    let task = Arc::new(SubscriptionSync::new(kv, config.store.subscriptions_key.clone()));
    let background = DeferredSync::new(task);
    let _runner_handle = background.spawn_runner();

    let coordinator = Arc::new(
        SyncCoordinator::new(
            config.sync.clone(),
            events.clone(),
            background,
            Arc::new(LoggingPage),
        )
        .with_cache_control(control)
        .with_scheduler(Arc::clone(&scheduler)),
    );
    let (connectivity_tx, connectivity_rx) = mpsc::channel(8);
    let _coordinator_handle = coordinator.spawn(connectivity_rx, lifecycle_rx);
    let _reachability_handle =
        spawn_reachability_monitor(fetcher, config.sync.reachability_interval, connectivity_tx);

    // Offline start is fine; the shell is served from cache next time.
    if let Err(e) = cache.start().await {
        warn!(error = %e, "Asset cache not installed");
    }

    let mut rx = events.subscribe();
    let log_events = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if let AppEvent::Toast { severity, message } = event {
                info!(?severity, "{message}");
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    log_events.abort();
    Ok(())
}

fn print_statistics(stats: &Statistics) {
    println!("Active subscriptions:   {}", stats.active_count);
    println!("Archived subscriptions: {}", stats.archived_count);
    println!("Monthly total:          {}", stats.monthly_total.round_dp(2));
    println!("Yearly total:           {}", stats.yearly_total.round_dp(2));
    println!("Average monthly price:  {}", stats.average_monthly_price.round_dp(2));
    for (category, total) in &stats.category_breakdown {
        println!("  {:<14} {:>3} × {}", category, total.count, total.total.round_dp(2));
    }
    if !stats.upcoming_payments.is_empty() {
        println!("Upcoming payments:");
        for sub in &stats.upcoming_payments {
            println!("  {}  {} ({} {})", sub.next_payment, sub.name, sub.price, sub.currency);
        }
    }
}
