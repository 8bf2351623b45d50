//! main.rs — Tow avoidance monitor
//!
//! Runs three concurrent tasks:
//!   1. Hub: UDP listener filling the field buffer from tow publications
//!   2. Cycle loop: at cycle_hz, snapshots the buffer, updates the avoidance
//!      core and scores the candidate grid while the obstacle is relevant
//!   3. HTTP: /health and /status (last cycle as JSON)

mod cycle;
mod field_buffer;
mod hub;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use tow_core::{AvoidanceConfig, DecisionGrid, TowAvoidance};
use tow_types::AvoidanceStatus;

use cycle::Monitor;
use field_buffer::FieldBuffer;
use hub::{HubConfig, SharedBuffer};

type SharedMonitor = Arc<RwLock<Monitor>>;

// ─── Cycle Task ───────────────────────────────────────────────────────────────

async fn run_cycle_loop(monitor: SharedMonitor, buffer: SharedBuffer, period: Duration) {
    let mut interval = tokio::time::interval(period);
    info!("🔁 Avoidance cycle every {} ms", period.as_millis());

    let mut last_valid = false;
    loop {
        interval.tick().await;

        let (inputs, accepted, dropped) = {
            let b = buffer.read().await;
            (b.inputs(Instant::now()), b.accepted, b.dropped)
        };

        let mut m = monitor.write().await;
        let status = m.step(inputs, accepted, dropped);

        if status.tow_pose_valid != last_valid {
            if status.tow_pose_valid {
                info!("✅ Tow pose valid");
            } else {
                warn!("Tow pose lost — encounter tracking paused");
            }
            last_valid = status.tow_pose_valid;
        }

        if status.cycle % 20 == 0 {
            info!(
                "⏱ cycle={} | range={} | rel={:.2} | best={} | rx={} drop={}",
                status.cycle,
                status.range.map_or("-".to_string(), |r| format!("{r:.1}m")),
                status.relevance,
                status
                    .best
                    .map_or("-".to_string(), |b| format!("{:.0}°@{:.1} u={:.0}", b.course_deg, b.speed, b.utility)),
                status.accepted,
                status.dropped,
            );
        }
    }
}

// ─── HTTP ─────────────────────────────────────────────────────────────────────

async fn status(State(monitor): State<SharedMonitor>) -> Json<AvoidanceStatus> {
    Json(monitor.read().await.status().clone())
}

// ─── Main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tow_monitor=info,tow_core=info".into()),
        )
        .init();

    info!("🛟 Tow avoidance monitor starting...");

    let config = HubConfig::default();
    let period = config
        .cycle_period()
        .with_context(|| format!("TOW_CYCLE_HZ must be in (0, 1000], got {}", config.cycle_hz))?;

    let avoid_cfg = AvoidanceConfig::load(&config.avoid_config)
        .with_context(|| format!("loading {}", config.avoid_config.display()))?;
    info!(
        "⚙️  mode={:?} cable={:.0}m obstacle={} rng_flags={} cpa_flags={}",
        avoid_cfg.mode,
        avoid_cfg.cable.length,
        if avoid_cfg.obstacle.id.is_empty() { "-" } else { avoid_cfg.obstacle.id.as_str() },
        avoid_cfg.rng_flags.len(),
        avoid_cfg.cpa_flags.len()
    );
    let avoid = TowAvoidance::new(avoid_cfg)?;
    if avoid.obstacle().is_none() {
        warn!("No obstacle configured — every candidate will score neutral");
    }

    let grid = DecisionGrid::uniform(config.grid_courses, config.grid_speed_min, config.grid_speed_max, config.grid_speeds);
    info!("🧮 Candidate grid: {} decisions", grid.len());

    let buffer: SharedBuffer = Arc::new(RwLock::new(FieldBuffer::new()));
    let monitor: SharedMonitor = Arc::new(RwLock::new(Monitor::new(avoid, grid)));

    tokio::spawn(hub::start_hub(config.udp_port, buffer.clone()));
    tokio::spawn(run_cycle_loop(monitor.clone(), buffer.clone(), period));

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let app = Router::new()
        .route("/health", get(|| async { "tow-monitor ok" }))
        .route("/status", get(status))
        .with_state(monitor)
        .layer(cors);

    let addr = format!("0.0.0.0:{}", config.http_port);
    info!("🚀 Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}
