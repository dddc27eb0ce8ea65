use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use aiwatch::analytics::{
    AlertEngine, AlertRule, BurnRateCalculator, BurnRateSnapshot, CostRateSurgeRule,
    ErrorStormRule, LoopDetectorRule,
};
use aiwatch::cli::Args;
use aiwatch::config::{Config, StoragePath};
use aiwatch::correlator::Correlator;
use aiwatch::domain::Port;
use aiwatch::persistence::{MemoryStorage, SqliteStorage, Storage};
use aiwatch::pricing::PricingTable;
use aiwatch::providers::{
    AlertsProvider, BurnRateProvider, DashboardProviders, EventsProvider, HistoryProvider,
    ScannerProvider, StateProvider, StatsProvider,
};
use aiwatch::receiver::Receiver;
use aiwatch::scanner::Scanner;
use aiwatch::store::ring_buffer::EventRingBuffer;
use aiwatch::store::SessionStore;
use aiwatch::tui::{self, CostThresholds};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.quiet);

    if args.setup {
        let settings_path = args
            .settings_path
            .or_else(default_settings_path)
            .context("could not determine a default settings file path; pass --settings-path")?;
        let grpc_port = args.grpc_port.unwrap_or(4317);
        let changed = aiwatch::setup::run(&settings_path, grpc_port)?;
        if changed {
            println!("Updated {}", settings_path.display());
        } else {
            println!("{} already configured, nothing to do", settings_path.display());
        }
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => Config::load(path).context("failed to load configuration")?,
        None => Config::default(),
    };
    if let Some(port) = args.grpc_port {
        config.receiver.grpc_port = port;
    }
    if let Some(port) = args.http_port {
        config.receiver.http_port = port;
    }

    let pricing = PricingTable::new(config.pricing.clone());
    let store = Arc::new(SessionStore::new());
    let ring_buffer = Arc::new(EventRingBuffer::new(config.display.event_buffer_size));
    let correlator = Arc::new(Correlator::new(
        Port(config.receiver.grpc_port),
        aiwatch::correlator::DEFAULT_TIMING_WINDOW_SECS,
    ));

    let storage: Arc<dyn Storage> = match &config.storage.path {
        StoragePath::Memory => Arc::new(MemoryStorage),
        StoragePath::Path(path) => match SqliteStorage::open(std::path::Path::new(path)) {
            Ok(sqlite) => Arc::new(sqlite),
            Err(err) => {
                warn!(%err, path, "failed to open persistence backend, falling back to memory-only");
                Arc::new(MemoryStorage)
            }
        },
    };

    // The ring buffer is fed exclusively through the store's event
    // subscription, not by the receiver directly — this is the hook
    // spec.md §3.5 describes as "an event subscription hook that the UI
    // consumes".
    let ring_buffer_sink = ring_buffer.clone();
    store
        .on_event(move |session_id, write| {
            if let aiwatch::store::SessionWrite::Event(event) = write {
                let formatted = aiwatch::receiver::format::format_event(session_id, event);
                ring_buffer_sink.add(aiwatch::store::ring_buffer::RingEvent {
                    session_id: session_id.clone(),
                    event_type: formatted.event_type,
                    formatted_text: formatted.text,
                });
            }
        })
        .await;

    let receiver = Arc::new(
        Receiver::new(
            store.clone(),
            correlator.clone(),
            config.receiver.session_attr_key.clone(),
            pricing,
            args.debug.as_deref(),
        )
        .context("failed to initialize receiver")?,
    );

    let scan_process_api = aiwatch::process::current();
    let correlate_process_api = aiwatch::process::current();
    let scanner = Arc::new(Scanner::new(
        scan_process_api,
        correlator.clone(),
        config.scanner.target_binary_names.clone(),
        config.receiver.grpc_port,
    ));

    let burn_rate = Arc::new(BurnRateCalculator::new(aiwatch::analytics::burn_rate::DEFAULT_WINDOW_SECS));
    let latest_burn_rate = Arc::new(RwLock::new(BurnRateSnapshot {
        total_cost: 0.0,
        hourly_rate: 0.0,
        trend: aiwatch::analytics::Trend::Flat,
        token_velocity_per_min: 0.0,
        daily_projection: 0.0,
        monthly_projection: 0.0,
        per_model: Vec::new(),
    }));
    let notifier = aiwatch::notify::notifier(config.alerts.notifications.system_notify);
    let alerts = Arc::new(AlertEngine::new(build_alert_rules(&config), notifier));

    let cancel = CancellationToken::new();

    let grpc_addr: SocketAddr = format!("0.0.0.0:{}", config.receiver.grpc_port).parse()?;
    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.receiver.http_port).parse()?;
    let receiver_task = tokio::spawn(receiver.clone().start(grpc_addr, http_addr, cancel.clone()));

    let scanner_task = tokio::spawn(scanner.clone().start_periodic_scan(
        Duration::from_secs_f64(config.scanner.interval_seconds),
        cancel.clone(),
    ));

    let correlate_task = tokio::spawn(start_periodic_correlate(
        scanner.clone(),
        correlator.clone(),
        correlate_process_api,
        Duration::from_secs_f64(config.scanner.interval_seconds),
        cancel.clone(),
    ));

    let analytics_task = tokio::spawn(aiwatch::analytics::start_periodic_analytics(
        store.clone(),
        burn_rate.clone(),
        alerts.clone(),
        storage.clone(),
        latest_burn_rate.clone(),
        Duration::from_millis(config.display.refresh_rate_ms),
        cancel.clone(),
    ));

    info!(
        grpc_port = config.receiver.grpc_port,
        http_port = config.receiver.http_port,
        "aiwatch started"
    );

    if args.headless {
        run_headless(&cancel).await;
    } else {
        let providers = DashboardProviders {
            state: StateProvider::new(store.clone(), correlator.clone(), scanner.clone()),
            burn_rate: BurnRateProvider::new(latest_burn_rate.clone()),
            events: EventsProvider::new(ring_buffer.clone()),
            alerts: AlertsProvider::new(alerts.clone()),
            stats: StatsProvider::new(store.clone(), receiver.clone()),
            scanner: ScannerProvider::new(scanner.clone()),
            history: HistoryProvider::new(storage.clone()),
        };
        let thresholds = CostThresholds {
            green_below: config.display.cost_color_green_below,
            yellow_below: config.display.cost_color_yellow_below,
        };
        let handle = tokio::runtime::Handle::current();
        let refresh = Duration::from_millis(config.display.refresh_rate_ms);
        let ui_cancel = cancel.clone();
        let ui_store = store.clone();
        let ui_result = tokio::task::spawn_blocking(move || {
            tui::run(handle, providers, ui_store, thresholds, refresh, ui_cancel)
        })
        .await
        .context("TUI task panicked")?;
        cancel.cancel();
        ui_result?;
    }

    cancel.cancel();
    let _ = receiver_task.await;
    let _ = scanner_task.await;
    let _ = correlate_task.await;
    let _ = analytics_task.await;

    Ok(())
}

/// Scans and correlates share the scanner's cadence (spec.md §5: "a periodic
/// scanner task"). The scanner owns its own `ProcessApi`; this task uses a
/// second, independent instance purely to read open ports for the
/// correlator's phase 1, since `ProcessApi` implementations are stateless.
async fn start_periodic_correlate(
    scanner: Arc<Scanner>,
    correlator: Arc<Correlator>,
    process_api: Box<dyn aiwatch::process::ProcessApi>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let active_pids: Vec<_> = scanner.processes().iter().map(|p| p.pid).collect();
                correlator.correlate(&active_pids, process_api.as_ref());
            }
            () = cancel.cancelled() => break,
        }
    }
}

async fn run_headless(cancel: &CancellationToken) {
    let mut ticker = tokio::time::interval(Duration::from_secs(10));
    loop {
        tokio::select! {
            _ = ticker.tick() => info!("aiwatch running headless"),
            () = cancel.cancelled() => break,
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl+C, shutting down");
                break;
            }
        }
    }
}

fn build_alert_rules(config: &Config) -> Vec<Box<dyn AlertRule>> {
    if config.alerts.rules.is_empty() {
        return vec![
            Box::new(CostRateSurgeRule { threshold_per_hour: 10.0 }),
            Box::new(ErrorStormRule { window_secs: 300.0, threshold: 3 }),
            Box::new(LoopDetectorRule { threshold: 3 }),
        ];
    }

    config
        .alerts
        .rules
        .iter()
        .filter_map(|rule| match rule.name.as_str() {
            "cost_rate_surge" => {
                Some(Box::new(CostRateSurgeRule { threshold_per_hour: rule.threshold }) as Box<dyn AlertRule>)
            }
            "error_storm" => Some(Box::new(ErrorStormRule {
                window_secs: 300.0,
                threshold: rule.threshold as usize,
            }) as Box<dyn AlertRule>),
            "loop_detector" => {
                Some(Box::new(LoopDetectorRule { threshold: rule.threshold as usize }) as Box<dyn AlertRule>)
            }
            other => {
                warn!(rule = other, "unrecognized alert rule name, ignoring");
                None
            }
        })
        .collect()
}

fn default_settings_path() -> Option<std::path::PathBuf> {
    dirs_home().map(|home| home.join(".claude").join("settings.json"))
}

fn dirs_home() -> Option<std::path::PathBuf> {
    std::env::var_os("HOME").map(std::path::PathBuf::from)
}

fn init_tracing(quiet: bool) {
    use tracing_subscriber::EnvFilter;
    let default_level = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
