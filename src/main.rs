//! lysaker-board: departures and weather kiosk.
//!
//! Single-binary Tokio application that either:
//! 1. Serves the `/api/met` and `/api/entur` proxy, or
//! 2. Runs both panel poll loops against the proxy and logs what the board shows.

mod config;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use board::fit::{rows_that_fit, SETTLE_DELAY};
use board::poll::Panel;
use board::store::load_settings;
use board::view::{departure_rows, updated_label, weather_rows};
use board::{
    DepartureSource, FileStore, FitAction, FitGeometry, FitScheduler, FitTrigger, KeyValueStore,
    ListMetrics, PanelState, PanelStatus, PollController, PollPolicy, ProxyClient, WeatherSource,
};
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use common::config::{BoardConfig, LayoutConfig};
use common::{DepartureSnapshot, DisplaySettings, Error, ForecastSnapshot};
use entur_client::DeparturesQuery;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How long shutdown waits for an in-flight fetch before abandoning it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Lysaker departures and weather board
#[derive(Parser)]
#[command(name = "lysaker-board", about = "Departures and weather kiosk board")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the MET/Entur proxy.
    Serve,
    /// Poll both panels through the proxy and log their state.
    Watch {
        /// Run one attempt per panel, print the result, and exit.
        #[arg(long)]
        once: bool,
    },
    /// Print how many rows fit a panel.
    Fit {
        /// Available list height in pixels.
        #[arg(long)]
        available: f64,
        /// Measured row height in pixels.
        #[arg(long)]
        row_height: Option<f64>,
        /// Gap between rows in pixels.
        #[arg(long)]
        gap: Option<f64>,
    },
}

#[tokio::main]
async fn main() {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "lysaker_board=info,board=info,proxy=info,met_client=info,entur_client=info"
                    .into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    if let Command::Fit {
        available,
        row_height,
        gap,
    } = cli.command
    {
        println!("{}", rows_that_fit(available, row_height, gap));
        return;
    }

    // Load configuration.
    let cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Serve => run_serve(&cfg).await,
        Command::Watch { once } => run_watch(&cfg, once).await,
        Command::Fit { .. } => Ok(()),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run_serve(cfg: &BoardConfig) -> Result<(), Error> {
    info!("Starting proxy on {}", cfg.proxy.bind_addr);
    info!(
        "Upstreams: met={} entur={}",
        cfg.proxy.met_base_url, cfg.proxy.entur_base_url
    );

    tokio::select! {
        r = proxy::serve(&cfg.proxy) => r,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    }
}

fn panel_geometry(layout: &LayoutConfig) -> FitGeometry {
    FitGeometry {
        container_height: layout.container_height,
        header_height: layout.header_height,
        padding_top: layout.padding_top,
        padding_bottom: layout.padding_bottom,
        list: Some(ListMetrics {
            row_height: Some(layout.row_height),
            gap: Some(layout.gap),
        }),
    }
}

/// Row count shared by the panel loggers. Measured at startup and again
/// after the settle delay.
fn start_fit(layout: &LayoutConfig) -> (Arc<AtomicUsize>, JoinHandle<()>) {
    let geometry = panel_geometry(layout);
    let mut fit = FitScheduler::new();
    if fit.request(FitTrigger::InitialLayout) == FitAction::MeasureNow {
        fit.measure_now(&geometry);
    }
    let rows = Arc::new(AtomicUsize::new(fit.rows()));
    info!("Panels fit {} rows", fit.rows());

    let shared = rows.clone();
    let settle = tokio::spawn(async move {
        tokio::time::sleep(SETTLE_DELAY).await;
        if fit.request(FitTrigger::SettleDelay) == FitAction::RequestFrame {
            if let Some(n) = fit.on_frame(&geometry) {
                info!("Panels refit to {} rows", n);
                shared.store(n, Ordering::Relaxed);
            }
        }
    });
    (rows, settle)
}

fn log_status<T>(panel: Panel, state: &PanelState<T>, settings: &DisplaySettings) {
    let label = updated_label(
        state.last_updated,
        state.is_cached(),
        &Local,
        settings.clock24,
        settings.language,
    );
    match &state.status {
        PanelStatus::Loading => info!("[{}] loading", panel),
        PanelStatus::Live => info!("[{}] live · {}", panel, label),
        PanelStatus::Cached => warn!("[{}] showing cache · {}", panel, label),
        PanelStatus::Error(msg) => warn!("[{}] error: {} {}", panel, msg, label),
    }
}

fn log_departures(
    state: &PanelState<DepartureSnapshot>,
    settings: &DisplaySettings,
    rows: usize,
) {
    log_status(Panel::Departures, state, settings);
    let Some(snapshot) = &state.snapshot else {
        return;
    };
    let lines = departure_rows(snapshot, Utc::now(), &Local, settings.clock24, rows);
    if lines.is_empty() {
        info!("[departures] no rail departures");
    }
    for row in lines {
        let time = match (&row.aimed, &row.expected, row.delayed) {
            (Some(aimed), Some(expected), true) => format!("{} → {}", aimed, expected),
            (_, Some(expected), _) => expected.clone(),
            _ => "—".to_string(),
        };
        let minutes = row
            .minutes_until
            .map(|m| format!("{m} min"))
            .unwrap_or_else(|| "—".to_string());
        info!(
            "[departures] {:>14} {:>5} {} ({}){}",
            time,
            row.line_code,
            row.destination,
            minutes,
            if row.delayed { " delayed" } else { "" }
        );
    }
}

fn log_weather(state: &PanelState<ForecastSnapshot>, settings: &DisplaySettings, rows: usize) {
    log_status(Panel::Weather, state, settings);
    let Some(snapshot) = &state.snapshot else {
        return;
    };
    for row in weather_rows(snapshot, &Local, settings.clock24, rows) {
        let temp = row
            .temperature
            .map(|t| format!("{t}°C"))
            .unwrap_or_else(|| "—".to_string());
        let precip = row
            .precipitation
            .map(|p| format!(" · {p} mm"))
            .unwrap_or_default();
        info!(
            "[weather] {} {:>5} {} · wind {} m/s{}",
            row.time, temp, row.symbol, row.wind, precip
        );
    }
}

async fn run_watch(cfg: &BoardConfig, once: bool) -> Result<(), Error> {
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(&cfg.board.cache_path));
    let settings = load_settings(store.as_ref());
    let stop_id = settings
        .effective_stop_id(&cfg.location.stop_place_id)
        .to_string();

    info!("Board cache: {}", cfg.board.cache_path);
    info!("Proxy: {}", cfg.board.proxy_url);
    info!(
        "Stop place: {} · weather at ({}, {}){}",
        stop_id,
        cfg.location.lat,
        cfg.location.lon,
        if settings.show_weather { "" } else { " (hidden)" }
    );

    let client = ProxyClient::new(&cfg.board.proxy_url)?;
    let query = DeparturesQuery {
        stop_place_id: stop_id,
        time_range_secs: cfg.location.time_range_secs,
        num_departures: cfg.location.num_departures,
    };
    let client_name = Some(cfg.board.client_name.trim())
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    let mut departures = PollController::new(
        DepartureSource::new(client.clone(), query, client_name),
        store.clone(),
        PollPolicy::for_panel(Panel::Departures, &cfg.timing),
    );
    let mut weather = settings.show_weather.then(|| {
        PollController::new(
            WeatherSource::new(client, cfg.location.lat, cfg.location.lon),
            store.clone(),
            PollPolicy::for_panel(Panel::Weather, &cfg.timing),
        )
    });

    let (rows, settle_handle) = start_fit(&cfg.layout);

    // ── Once mode ────────────────────────────────────────────────────
    if once {
        let (_, next) = departures.poll_once().await;
        log_departures(departures.state(), &settings, rows.load(Ordering::Relaxed));
        info!("[departures] next attempt would run in {:?}", next);
        if let Some(weather) = weather.as_mut() {
            let (_, next) = weather.poll_once().await;
            log_weather(weather.state(), &settings, rows.load(Ordering::Relaxed));
            info!("[weather] next attempt would run in {:?}", next);
        }
        settle_handle.abort();
        return Ok(());
    }

    // ── Spawn panel loops ────────────────────────────────────────────
    let departures = departures.spawn();
    let weather = weather.map(PollController::spawn);

    let dep_rx = departures.subscribe();
    let dep_settings = settings.clone();
    let dep_rows = rows.clone();
    let dep_logger = tokio::spawn(async move {
        let mut rx = dep_rx;
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            log_departures(&state, &dep_settings, dep_rows.load(Ordering::Relaxed));
        }
    });

    let wx_logger: Option<JoinHandle<()>> = weather.as_ref().map(|handle| {
        let mut rx = handle.subscribe();
        let wx_settings = settings.clone();
        let wx_rows = rows.clone();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let state = rx.borrow_and_update().clone();
                log_weather(&state, &wx_settings, wx_rows.load(Ordering::Relaxed));
            }
        })
    });

    // ── Heartbeat ────────────────────────────────────────────────────
    let hb_settings = settings.clone();
    let hb_dep_fetching = departures.fetching();
    let hb_wx_fetching = weather.as_ref().map(|h| h.fetching());
    let hb_dep_state = departures.subscribe();
    let heartbeat_secs = cfg.timing.heartbeat_secs;
    let heartbeat_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(heartbeat_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let fetching = *hb_dep_fetching.borrow()
                || hb_wx_fetching.as_ref().is_some_and(|rx| *rx.borrow());
            let failures = hb_dep_state.borrow().consecutive_failures;
            let screensaver = hb_settings.screensaver_active(&Local::now());
            info!(
                "💓 Heartbeat: fetching={} departure_failures={} screensaver={}",
                fetching, failures, screensaver
            );
        }
    });

    let wx_exit = async {
        match wx_logger {
            Some(handle) => handle.await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        r = dep_logger => {
            error!("Departures logger exited: {:?}", r);
        }
        r = wx_exit => {
            error!("Weather logger exited: {:?}", r);
        }
        r = heartbeat_handle => {
            error!("Heartbeat task exited: {:?}", r);
        }
    }

    settle_handle.abort();
    departures.shutdown_within(SHUTDOWN_GRACE).await;
    if let Some(weather) = weather {
        weather.shutdown_within(SHUTDOWN_GRACE).await;
    }
    info!("Board stopped");
    Ok(())
}
