//! main.rs — Tow Simulator entry point
//!
//! Runs two concurrent tasks:
//!   1. Sim loop: advances vessel + tow body at update_rate_hz, builds a
//!      noisy `TowPublication` and sends it via UDP to the monitor
//!   2. WebSocket server: control panel (pause/resume, course/speed override,
//!      cable parameters, scenario injection, ground-truth telemetry)
//!
//! All runtime errors are logged; the sim never stops on a bad datagram or a
//! bad command.

mod scenarios;
mod sensor_noise;
mod udp_tx;
mod vessel_sim;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Router,
    extract::{State, WebSocketUpgrade, ws::{WebSocket, Message}},
    response::Response,
    routing::get,
};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use tokio::sync::{RwLock, broadcast};
use tokio::time::interval;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use tow_core::CableParams;
use scenarios::ScenarioConfig;
use sensor_noise::{NoiseConfig, SensorModel};
use udp_tx::UdpTransmitter;
use vessel_sim::{Leg, TowSim, VesselConfig};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "tow-sim", about = "Towed-body simulator for the avoidance monitor")]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// UDP monitor address
    #[arg(long, default_value = "127.0.0.1:5555")]
    hub_addr: String,
    /// Also send to the multicast group
    #[arg(long)]
    multicast: bool,
    /// Simulation speed multiplier (1.0 = real-time)
    #[arg(long, default_value = "1.0")]
    speed: f64,
    /// Scenario preset loaded on startup
    #[arg(long, default_value = "clean")]
    scenario: String,
    /// Control panel WebSocket port
    #[arg(long, default_value = "9090")]
    ctrl_port: u16,
}

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FullConfig {
    simulation: SimulationConfig,
    #[serde(default)]
    vessel: VesselConfig,
    #[serde(default)]
    cable: CableParams,
    #[serde(default)]
    noise: NoiseConfig,
    #[serde(default)]
    legs: Vec<Leg>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SimulationConfig {
    update_rate_hz: f64,
    #[serde(default = "default_source")]
    source: String,
    #[serde(default)]
    seed: Option<u64>,
}

fn default_source() -> String { "tow-sim".to_string() }

fn load_config(path: &str) -> anyhow::Result<FullConfig> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(_) => {
            info!("📄 {path} not found, using embedded config");
            include_str!("../config.toml").to_string()
        }
    };
    let cfg: FullConfig = toml::from_str(&text).context("invalid simulator config")?;
    cfg.cable.validate().context("invalid [cable] section")?;
    anyhow::ensure!(
        cfg.simulation.update_rate_hz.is_finite() && cfg.simulation.update_rate_hz > 0.0,
        "update_rate_hz must be positive"
    );
    Ok(cfg)
}

// ── Shared state ──────────────────────────────────────────────────────────────

struct SimState {
    sim: TowSim,
    scenario: ScenarioConfig,
    sensor: SensorModel,
    rng: StdRng,
    source: String,
    paused: bool,
    tick: u64,
    seq_num: u32,
    speed: f64,
    /// Ground truth telemetry snapshot, broadcast to the web UI each tick
    last_telemetry: Option<serde_json::Value>,
}

type SharedState = Arc<RwLock<SimState>>;

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tow_simulator=info,tow_core=info".into()),
        )
        .init();

    let args = Args::parse();
    let cfg = load_config(&args.config)?;

    info!(
        "🛥  Tow Simulator starting — cable {:.0} m, {} legs, {} Hz",
        cfg.cable.length,
        cfg.legs.len(),
        cfg.simulation.update_rate_hz
    );

    let scenario = scenarios::preset(&args.scenario).unwrap_or_else(|| {
        warn!("Unknown scenario preset '{}', starting clean", args.scenario);
        ScenarioConfig::default()
    });

    let rng = match cfg.simulation.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let shared: SharedState = Arc::new(RwLock::new(SimState {
        sim: TowSim::new(&cfg.vessel, cfg.cable, cfg.legs.clone()),
        scenario,
        sensor: SensorModel::new(&cfg.noise),
        rng,
        source: cfg.simulation.source.clone(),
        paused: false,
        tick: 0,
        seq_num: 0,
        speed: args.speed.clamp(0.1, 20.0),
        last_telemetry: None,
    }));

    let mc_addr = if args.multicast { Some(udp_tx::MULTICAST_ADDR) } else { None };
    let transmitter = Arc::new(
        UdpTransmitter::new(&args.hub_addr, mc_addr).context("failed to bind UDP socket")?,
    );

    let (telem_tx, _) = broadcast::channel::<String>(64);
    let telem_tx = Arc::new(telem_tx);

    let update_rate = cfg.simulation.update_rate_hz;
    tokio::spawn(sim_loop(shared.clone(), transmitter, telem_tx.clone(), update_rate));

    let ctrl_addr = format!("0.0.0.0:{}", args.ctrl_port);
    info!("🖥  Control panel WebSocket at ws://{ctrl_addr}");

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(|| async { "tow-sim ok" }))
        .with_state((shared.clone(), telem_tx.clone()))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let listener = tokio::net::TcpListener::bind(&ctrl_addr)
        .await
        .with_context(|| format!("failed to bind {ctrl_addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ── Simulation loop ───────────────────────────────────────────────────────────

async fn sim_loop(
    state: SharedState,
    tx: Arc<UdpTransmitter>,
    telem: Arc<broadcast::Sender<String>>,
    update_rate_hz: f64,
) {
    let tick_ms = ((1000.0 / update_rate_hz) as u64).max(1);
    let mut ticker = interval(Duration::from_millis(tick_ms));

    info!("⚓ Sim loop running at {update_rate_hz} Hz ({tick_ms}ms tick)");

    loop {
        ticker.tick().await;

        let (publication, telemetry_json, tick) = {
            let mut guard = state.write().await;
            let s = &mut *guard;
            if s.paused {
                continue;
            }

            // dt = real tick time × speed multiplier
            let dt = (tick_ms as f64 / 1000.0) * s.speed;
            s.sim.tick(dt);
            s.tick += 1;
            s.seq_num = s.seq_num.wrapping_add(1);

            let publication =
                s.sensor.publish(&s.sim, &s.scenario, &s.source, s.tick, s.seq_num, &mut s.rng);

            let estimated: Option<[f64; 2]> = publication
                .get(tow_types::FieldName::TowedX)
                .zip(publication.get(tow_types::FieldName::TowedY))
                .map(|(x, y)| [x.value, y.value]);

            let telem = serde_json::json!({
                "type":      "telemetry",
                "t":         s.sim.t_elapsed,
                "tick":      s.tick,
                "leg":       s.sim.leg_index(),
                "vessel": {
                    "x":       s.sim.vessel.position.x,
                    "y":       s.sim.vessel.position.y,
                    "heading": s.sim.vessel.heading_deg,
                    "speed":   s.sim.vessel_speed,
                },
                "tow": {
                    "x":        s.sim.tow.position.x,
                    "y":        s.sim.tow.position.y,
                    "speed":    s.sim.tow.speed(),
                    "heading":  s.sim.tow.heading_deg(s.sim.vessel.position),
                    "deployed": s.sim.deployed,
                    "est":      estimated,
                },
                "cable": {
                    "separation": s.sim.last_step.separation,
                    "tension":    s.sim.last_step.tension,
                    "clamped":    s.sim.last_step.clamped,
                    "bearing":    sensor_noise::cable_bearing(&s.sim),
                },
            });

            s.last_telemetry = Some(telem.clone());
            (publication, telem.to_string(), s.tick)
        };

        tx.send(&publication);
        let _ = telem.send(telemetry_json);

        if tick % 50 == 0 {
            let s = state.read().await;
            info!(
                "⏱ t={:.0}s | tick={} | sep={:.1}m | tension={:.2} | deployed={}",
                s.sim.t_elapsed, tick, s.sim.last_step.separation, s.sim.last_step.tension, s.sim.deployed
            );
        }
    }
}

// ── WebSocket control handler ─────────────────────────────────────────────────

async fn ws_handler(
    ws: WebSocketUpgrade,
    State((state, telem_tx)): State<(SharedState, Arc<broadcast::Sender<String>>)>,
) -> Response {
    ws.on_upgrade(move |socket| handle_ws(socket, state, telem_tx))
}

async fn handle_ws(
    mut socket: WebSocket,
    state: SharedState,
    telem_tx: Arc<broadcast::Sender<String>>,
) {
    let mut telem_rx = telem_tx.subscribe();

    let (snapshot, scenario_json) = {
        let s = state.read().await;
        (
            s.last_telemetry.as_ref().map(|t| t.to_string()),
            serde_json::to_value(&s.scenario).unwrap_or_default(),
        )
    };
    if let Some(t) = snapshot {
        let _ = socket.send(Message::Text(t)).await;
    }
    let _ = socket
        .send(Message::Text(serde_json::json!({"type": "scenario", "data": scenario_json}).to_string()))
        .await;

    loop {
        tokio::select! {
            Ok(msg) = telem_rx.recv() => {
                if socket.send(Message::Text(msg)).await.is_err() { break; }
            }
            Some(Ok(Message::Text(cmd))) = socket.recv() => {
                handle_command(&state, &cmd).await;
            }
            else => break,
        }
    }
}

/// Handle commands from the web control panel.
/// Commands are JSON: { "cmd": "...", "args": {...} }
async fn handle_command(state: &SharedState, raw: &str) {
    let v: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => { warn!("Bad control message: {e}"); return; }
    };
    let cmd = v["cmd"].as_str().unwrap_or("");
    let args = &v["args"];
    match cmd {
        "pause"  => { state.write().await.paused = true;  info!("⏸ Sim paused"); }
        "resume" => { state.write().await.paused = false; info!("▶ Sim resumed"); }
        "reset"  => {
            let mut s = state.write().await;
            s.sim.reset();
            s.tick = 0;
            info!("↺ Sim reset — tow stowed at start pose");
        }
        "set_speed" => {
            if let Some(sp) = args["speed"].as_f64() {
                let sp = sp.clamp(0.1, 20.0);
                state.write().await.speed = sp;
                info!("⚡ Sim speed set to {sp}×");
            }
        }
        "set_course" => {
            if let Some(c) = args["course_deg"].as_f64().filter(|c| c.is_finite()) {
                state.write().await.sim.set_course(c);
                info!("🧭 Manual course {c:.0}°");
            }
        }
        "set_vessel_speed" => {
            if let Some(sp) = args["speed_mps"].as_f64().filter(|s| s.is_finite()) {
                state.write().await.sim.set_vessel_speed(sp);
                info!("🚤 Manual vessel speed {sp:.1} m/s");
            }
        }
        "resume_schedule" => {
            state.write().await.sim.clear_manual();
            info!("🗺  Back on leg schedule");
        }
        "set_cable" => match serde_json::from_value::<CableParams>(args.clone()) {
            Ok(c) => match c.validate() {
                Ok(()) => {
                    state.write().await.sim.set_cable(c);
                    info!("🪢 Cable set — L={:.1} k={:.2} cd={:.2}", c.length, c.spring_stiffness, c.drag_coeff);
                }
                Err(e) => warn!("Rejected cable parameters: {e}"),
            },
            Err(e) => warn!("Bad set_cable args: {e}"),
        },
        "set_scenario" => match serde_json::from_value::<ScenarioConfig>(args.clone()) {
            Ok(sc) => {
                state.write().await.scenario = sc;
                info!("🎭 Scenario updated");
            }
            Err(e) => warn!("Bad scenario: {e}"),
        },
        "preset" => {
            let name = args["name"].as_str().unwrap_or("");
            match scenarios::preset(name) {
                Some(sc) => {
                    state.write().await.scenario = sc;
                    info!("🎭 Preset '{name}' loaded");
                }
                None => warn!("Unknown preset: {name}"),
            }
        }
        _ => warn!("Unknown control command: {cmd}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_config_parses() {
        let cfg: FullConfig = toml::from_str(include_str!("../config.toml")).unwrap();
        assert!(cfg.simulation.update_rate_hz > 0.0);
        assert!(!cfg.legs.is_empty());
        cfg.cable.validate().unwrap();
    }
}
