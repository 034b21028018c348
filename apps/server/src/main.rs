//! kimp-bot: headless cross-exchange Korean-premium arbitrage engine.
//!
//! Wires the Quote Cache, per-venue feed adapters, Signal Engine, and Execution
//! Controller together; owns the CLI, logging, config loading, signal handling, and the
//! dashboard/broadcast external interfaces. Grounded on the teacher's
//! `apps/server/src/main.rs` overall shape (clap, tracing-subscriber, signal handling,
//! component wiring), narrowed away from its Telegram/Tauri/wallet-status machinery.

mod config;
mod dashboard;
mod ws_server;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kimp_core::{Exchange, SymbolId, TradingConfig};
use kimp_engine::{PositionTracker, SignalEngine, SignalSink, TrackedPair};
use kimp_executor::{build_external_position_blacklist, preset_leverage_all, load_snapshot, ExecutionController};
use kimp_feeds::{
    BithumbAdapter, BybitAdapter, ExchangeCapability, ForeignPerpCapability, GateIOAdapter, KoreanSpotCapability,
    QuoteCache, UpbitAdapter,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{load_config, AppConfig};

/// Cross-exchange Korean-premium arbitrage engine.
#[derive(Parser, Debug)]
#[command(name = "kimp-bot")]
#[command(about = "Cross-exchange spot/perpetual Korean-premium arbitrage engine", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Monitor-only mode: run the signal engine and dashboard, never place orders
    #[arg(short, long, default_value_t = false)]
    monitor: bool,
}

fn init_logging(settings: &config::LoggingSettings) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_new(format!(
        "{level},hyper=warn,reqwest=warn,rustls=warn,tokio_tungstenite=warn,tungstenite=warn",
        level = settings.level
    ))
    .unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer().with_target(false).compact();

    match &settings.path {
        Some(path) => {
            let directory = std::path::Path::new(path)
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."));
            let file_name = std::path::Path::new(path)
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_else(|| "kimp-bot.log".to_string());
            let file_appender = tracing_appender::rolling::daily(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = fmt::layer().with_ansi(false).with_writer(non_blocking);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr_layer).init();
            None
        }
    }
}

fn build_korean_adapter(
    name: &str,
    settings: &config::ExchangeSettings,
    cache: Arc<QuoteCache>,
) -> Option<Arc<dyn KoreanSpotCapability>> {
    let api_key = settings.api_key.clone().unwrap_or_default();
    let secret_key = settings.secret_key.clone().unwrap_or_default();
    match name {
        "upbit" => Some(Arc::new(UpbitAdapter::new(
            settings.rest_endpoint.clone(),
            settings.ws_endpoint.clone(),
            api_key,
            secret_key,
            cache,
        ))),
        "bithumb" => Some(Arc::new(BithumbAdapter::new(
            settings.rest_endpoint.clone(),
            settings.ws_endpoint.clone(),
            api_key,
            secret_key,
            cache,
        ))),
        _ => None,
    }
}

fn build_foreign_adapter(
    name: &str,
    settings: &config::ExchangeSettings,
    cache: Arc<QuoteCache>,
) -> Option<Arc<dyn ForeignPerpCapability>> {
    let api_key = settings.api_key.clone().unwrap_or_default();
    let secret_key = settings.secret_key.clone().unwrap_or_default();
    match name {
        "bybit" => Some(Arc::new(BybitAdapter::new(
            settings.rest_endpoint.clone(),
            settings.ws_endpoint.clone(),
            api_key,
            secret_key,
            cache,
        ))),
        "gateio" => Some(Arc::new(GateIOAdapter::new(
            settings.rest_endpoint.clone(),
            settings.ws_endpoint.clone(),
            api_key,
            secret_key,
            cache,
        ))),
        _ => None,
    }
}

fn exchange_by_name(name: &str) -> Option<Exchange> {
    match name {
        "upbit" => Some(Exchange::Upbit),
        "bithumb" => Some(Exchange::Bithumb),
        "bybit" => Some(Exchange::Bybit),
        "gateio" => Some(Exchange::GateIO),
        _ => None,
    }
}

/// Bridges the Signal Engine's entry signals to the adaptive split loop: spawns an
/// `ExecutionController` run for each qualifying symbol, skipping the write entirely
/// (`monitor_only`) when the process was started with `--monitor`.
struct ControllerSink {
    controller: Arc<ExecutionController>,
    monitor_only: bool,
}

impl SignalSink for ControllerSink {
    fn on_entry(&self, signal: kimp_core::EntrySignal) {
        if self.monitor_only {
            info!(symbol = %signal.symbol, premium = signal.premium, "monitor-only: entry signal observed, no order placed");
            return;
        }
        let controller = self.controller.clone();
        let symbol = signal.symbol.clone();
        tokio::spawn(async move {
            match controller.run_from_entry_signal(signal).await {
                Ok(outcome) => info!(%symbol, ?outcome, "execution loop finished"),
                Err(e) => error!(%symbol, error = %e, "execution loop ended with error"),
            }
        });
    }

    fn on_exit(&self, signal: kimp_core::ExitSignal) {
        info!(symbol = %signal.symbol, premium = signal.premium, "exit signal observed (handled inside the owning execution loop)");
    }
}

fn snapshot_path(data_dir: &std::path::Path, symbol: &SymbolId) -> PathBuf {
    data_dir.join(format!("positions/{}_{}.json", symbol.base, symbol.quote))
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> std::process::ExitCode {
    let args = Args::parse();

    let config: AppConfig = match load_config(std::path::Path::new(&args.config)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("fatal: failed to load config: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let _log_guard = init_logging(&config.logging);
    info!(monitor = args.monitor, "kimp-bot starting");

    let cache = Arc::new(QuoteCache::new());
    let shutdown = Arc::new(AtomicBool::new(false));

    let mut korean_adapters: HashMap<Exchange, Arc<dyn KoreanSpotCapability>> = HashMap::new();
    let mut foreign_adapters: HashMap<Exchange, Arc<dyn ForeignPerpCapability>> = HashMap::new();
    for (name, settings) in &config.exchanges {
        if !settings.enabled {
            continue;
        }
        if let Some(exchange) = exchange_by_name(name) {
            if exchange.is_korean() {
                if let Some(adapter) = build_korean_adapter(name, settings, cache.clone()) {
                    korean_adapters.insert(exchange, adapter);
                }
            } else if exchange.is_foreign_perp() {
                if let Some(adapter) = build_foreign_adapter(name, settings, cache.clone()) {
                    foreign_adapters.insert(exchange, adapter);
                }
            }
        }
    }

    let mut pairs = Vec::new();
    for p in &config.pairs {
        let (Some(korean_exchange), Some(foreign_exchange)) =
            (exchange_by_name(&p.korean_exchange), exchange_by_name(&p.foreign_exchange))
        else {
            warn!(?p, "skipping pair with unknown exchange name");
            continue;
        };
        pairs.push(TrackedPair {
            symbol: SymbolId::new(p.base.clone(), p.quote.clone()),
            korean_exchange,
            foreign_exchange,
        });
    }

    // Connect and subscribe every adapter to its symbols before the engine starts scanning.
    let all_symbols: Vec<SymbolId> = pairs.iter().map(|p| p.symbol.clone()).collect();
    for adapter in korean_adapters.values() {
        if let Err(e) = adapter.connect().await {
            error!(error = %e, "Korean adapter connect failed");
        }
        if let Err(e) = adapter.subscribe_ticker(&all_symbols).await {
            error!(error = %e, "Korean adapter subscribe failed");
        }
    }
    for adapter in foreign_adapters.values() {
        if let Err(e) = adapter.connect().await {
            error!(error = %e, "foreign adapter connect failed");
        }
        if let Err(e) = adapter.subscribe_ticker(&all_symbols).await {
            error!(error = %e, "foreign adapter subscribe failed");
        }
        preset_leverage_all(adapter.as_ref(), &all_symbols, 1).await;
    }

    // Preconditions: exclude symbols with a pre-existing external position/balance (spec
    // Non-goal: never unwind a position this process did not create).
    let mut blacklist = std::collections::HashSet::new();
    for (korean_exchange, korean_adapter) in &korean_adapters {
        for (foreign_exchange, foreign_adapter) in &foreign_adapters {
            let scoped: Vec<SymbolId> = pairs
                .iter()
                .filter(|p| p.korean_exchange == *korean_exchange && p.foreign_exchange == *foreign_exchange)
                .map(|p| p.symbol.clone())
                .collect();
            if scoped.is_empty() {
                continue;
            }
            let found = build_external_position_blacklist(korean_adapter.as_ref(), foreign_adapter.as_ref(), &scoped).await;
            blacklist.extend(found);
        }
    }
    if !blacklist.is_empty() {
        warn!(?blacklist, "excluding symbols with pre-existing external positions/balances");
    }
    pairs.retain(|p| !blacklist.contains(&p.symbol));

    let tracker = Arc::new(PositionTracker::new(config.trading.max_positions));
    let data_dir = PathBuf::from("data");
    let entry_audit_path = data_dir.join("trade_logs/entry_splits.csv");
    let exit_audit_path = data_dir.join("trade_logs/exit_splits.csv");

    // Startup recovery: re-arm an exit-only loop for every persisted position (spec §4.7).
    let mut recovered_handles = Vec::new();
    for pair in &pairs {
        let path = snapshot_path(&data_dir, &pair.symbol);
        match load_snapshot(&path).await {
            Ok(Some(position)) => {
                info!(symbol = %pair.symbol, "recovered open position from snapshot, re-arming exit-only loop");
                tracker.open_position(position);
                if let (Some(korean), Some(foreign)) =
                    (korean_adapters.get(&pair.korean_exchange), foreign_adapters.get(&pair.foreign_exchange))
                {
                    let controller = Arc::new(ExecutionController::new(
                        korean.clone(),
                        foreign.clone(),
                        cache.clone(),
                        tracker.clone(),
                        // placeholder signal engine constructed below; recovered loops don't
                        // need entry pairs, so an empty-pairs engine is sufficient here.
                        Arc::new(SignalEngine::new(
                            cache.clone(),
                            tracker.clone(),
                            config.trading.clone(),
                            Vec::new(),
                            Arc::new(NullSink),
                            shutdown.clone(),
                        )),
                        config.trading.clone(),
                        shutdown.clone(),
                        path,
                        entry_audit_path.clone(),
                        exit_audit_path.clone(),
                    ));
                    let symbol = pair.symbol.clone();
                    let korean_exchange = pair.korean_exchange;
                    let foreign_exchange = pair.foreign_exchange;
                    recovered_handles.push(tokio::spawn(async move {
                        if let Err(e) = controller.run_exit_only(symbol, korean_exchange, foreign_exchange).await {
                            error!(error = %e, "recovered exit-only loop ended with error");
                        }
                    }));
                }
            }
            Ok(None) => {}
            Err(e) => error!(symbol = %pair.symbol, error = %e, "failed to read position snapshot"),
        }
    }

    let engine = Arc::new(SignalEngine::new(
        cache.clone(),
        tracker.clone(),
        config.trading.clone(),
        pairs.clone(),
        Arc::new(NullSink),
        shutdown.clone(),
    ));

    // The only Korean/foreign venue pair this sink drives orders through; spec's Non-goal
    // bars cross-venue arbitrage across more than one pair, so a single shared controller
    // (parameterized per call by the signal's own exchange fields) is sufficient as long as
    // all configured pairs share one Korean and one foreign venue. Multi-venue configs fall
    // back to monitor-only for symbols whose venue pair lacks a matching adapter pair.
    let default_korean = korean_adapters.values().next().cloned();
    let default_foreign = foreign_adapters.values().next().cloned();

    let monitor_handle = if let (Some(korean), Some(foreign)) = (default_korean, default_foreign) {
        let controller = Arc::new(ExecutionController::new(
            korean,
            foreign,
            cache.clone(),
            tracker.clone(),
            engine.clone(),
            config.trading.clone(),
            shutdown.clone(),
            data_dir.join("positions/default.json"),
            entry_audit_path.clone(),
            exit_audit_path.clone(),
        ));
        let sink = Arc::new(ControllerSink {
            controller,
            monitor_only: args.monitor,
        });
        let engine_with_sink = Arc::new(SignalEngine::new(
            cache.clone(),
            tracker.clone(),
            config.trading.clone(),
            pairs.clone(),
            sink,
            shutdown.clone(),
        ));
        Some(tokio::spawn(engine_with_sink.run_monitor_loop()))
    } else {
        warn!("no matching Korean/foreign adapter pair configured; running signal engine in observe-only mode");
        Some(tokio::spawn(engine.clone().run_monitor_loop()))
    };

    let (router, broadcast_sender) = ws_server::build_router(256);

    let exporter_pairs: Vec<(SymbolId, Exchange, Exchange)> = pairs
        .iter()
        .map(|p| (p.symbol.clone(), p.korean_exchange, p.foreign_exchange))
        .collect();
    let exporter_handle = tokio::spawn(dashboard::run_dashboard_exporter(
        cache.clone(),
        exporter_pairs,
        data_dir.join("premiums.json"),
        Duration::from_secs(2),
        shutdown.clone(),
        broadcast_sender,
    ));

    let ws_handle = tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind("0.0.0.0:9001").await {
            Ok(l) => l,
            Err(e) => {
                error!(error = %e, "failed to bind websocket server");
                return;
            }
        };
        if let Err(e) = axum::serve(listener, router).await {
            error!(error = %e, "websocket server exited with error");
        }
    });

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, stopping");
    shutdown.store(true, Ordering::Release);

    if let Some(handle) = monitor_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }
    for handle in recovered_handles {
        let _ = tokio::time::timeout(Duration::from_secs(30), handle).await;
    }
    exporter_handle.abort();
    ws_handle.abort();

    info!("kimp-bot stopped");
    std::process::ExitCode::SUCCESS
}

struct NullSink;
impl SignalSink for NullSink {
    fn on_entry(&self, _signal: kimp_core::EntrySignal) {}
    fn on_exit(&self, _signal: kimp_core::ExitSignal) {}
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
