//! # hub
//!
//! Tow publication hub — receives `TowPublication` datagrams from the
//! simulator (or a real tow sensor bridge) via UDP, filters replays and
//! stores the latest value of every field in the shared `FieldBuffer`.
//!
//! ## Architecture
//! Runs as its own Tokio task next to the cycle loop and the HTTP server:
//!   1. Binds a UDP socket on `TOW_UDP_PORT` (default 5555)
//!   2. Decodes the JSON envelope
//!   3. Drops duplicates and large backward sequence jumps per source
//!   4. Writes the fields into the buffer
//!
//! UDP errors and malformed datagrams are logged; the task never exits
//! after a successful bind.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use tow_types::TowPublication;

use crate::field_buffer::FieldBuffer;

pub type SharedBuffer = Arc<RwLock<FieldBuffer>>;

// ── Configuration ─────────────────────────────────────────────────────────────

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

pub struct HubConfig {
    /// UDP port to listen on (default 5555)
    pub udp_port: u16,
    /// HTTP port for /health and /status (default 3002)
    pub http_port: u16,
    /// Avoidance configuration file (default avoid.toml)
    pub avoid_config: PathBuf,
    /// Control cycle rate (default 4 Hz)
    pub cycle_hz: f64,
    /// Candidate grid: evenly spaced courses × speeds over [speed_min, speed_max]
    pub grid_courses: usize,
    pub grid_speeds: usize,
    pub grid_speed_min: f64,
    pub grid_speed_max: f64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            udp_port: env_or("TOW_UDP_PORT", 5555),
            http_port: env_or("TOW_HTTP_PORT", 3002),
            avoid_config: std::env::var("TOW_AVOID_CONFIG")
                .unwrap_or_else(|_| "avoid.toml".to_string())
                .into(),
            cycle_hz: env_or("TOW_CYCLE_HZ", 4.0),
            grid_courses: env_or("TOW_GRID_COURSES", 36),
            grid_speeds: env_or("TOW_GRID_SPEEDS", 3),
            grid_speed_min: env_or("TOW_GRID_SPEED_MIN", 0.5),
            grid_speed_max: env_or("TOW_GRID_SPEED_MAX", 3.0),
        }
    }
}

/// Fastest supported cycle period
const MIN_CYCLE_PERIOD: Duration = Duration::from_millis(1);

impl HubConfig {
    /// Cycle period from `cycle_hz`; `None` when not positive or faster than 1 kHz
    pub fn cycle_period(&self) -> Option<Duration> {
        if !(self.cycle_hz.is_finite() && self.cycle_hz > 0.0) {
            return None;
        }
        Some(Duration::from_secs_f64(1.0 / self.cycle_hz)).filter(|p| *p >= MIN_CYCLE_PERIOD)
    }
}

// ── Sequence Number Tracker (replay protection) ───────────────────────────────

/// Tracks the last seen sequence number per source.
struct SeqTracker {
    last_seq: HashMap<String, u32>,
}

/// A publisher that restarts counts again from below this
const RESTART_GAP: u32 = 1000;
/// Backward jumps up to this size are late or replayed datagrams
const REORDER_WINDOW: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeqVerdict {
    Accept,
    /// Publisher restarted (seq back near zero); buffer should be cleared
    Restart,
    Replay,
}

impl SeqTracker {
    fn new() -> Self { Self { last_seq: HashMap::new() } }

    fn check(&mut self, source: &str, seq_num: u32) -> SeqVerdict {
        let Some(&last) = self.last_seq.get(source) else {
            self.last_seq.insert(source.to_string(), seq_num);
            return SeqVerdict::Accept;
        };
        let diff = seq_num.wrapping_sub(last);
        if diff == 0 {
            return SeqVerdict::Replay;
        }
        let verdict = if diff <= u32::MAX / 2 {
            SeqVerdict::Accept
        } else if seq_num < RESTART_GAP && last.wrapping_sub(seq_num) > REORDER_WINDOW {
            // Back near zero, further behind than any reordering
            SeqVerdict::Restart
        } else {
            return SeqVerdict::Replay;
        };
        self.last_seq.insert(source.to_string(), seq_num);
        verdict
    }
}

// ── Main UDP listener task ────────────────────────────────────────────────────

pub async fn start_hub(udp_port: u16, buffer: SharedBuffer) {
    let addr = format!("0.0.0.0:{udp_port}");
    let socket = match UdpSocket::bind(&addr).await {
        Ok(s) => {
            info!("📡 Tow hub listening on UDP {addr}");
            s
        }
        Err(e) => {
            warn!("Tow hub: could not bind UDP {addr}: {e} (monitor runs without input)");
            return;
        }
    };

    let mut seq_tracker = SeqTracker::new();
    let mut buf = vec![0u8; 8192];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, src)) => process_datagram(&buf[..len], src, &mut seq_tracker, &buffer).await,
            Err(e) => warn!("Tow hub: UDP recv error: {e}"),
        }
    }
}

async fn process_datagram(data: &[u8], src: SocketAddr, seq_tracker: &mut SeqTracker, buffer: &SharedBuffer) {
    let publication = match TowPublication::from_bytes(data) {
        Ok(p) => p,
        Err(e) => {
            debug!("Tow hub: malformed datagram from {src}: {e}");
            return;
        }
    };

    let verdict = seq_tracker.check(&publication.source, publication.seq_num);
    let mut b = buffer.write().await;
    match verdict {
        SeqVerdict::Replay => {
            b.dropped += 1;
            debug!("Tow hub: dropped seq {} from {}", publication.seq_num, publication.source);
            return;
        }
        SeqVerdict::Restart => {
            info!("🔄 Publisher {} restarted — clearing field buffer", publication.source);
            b.clear();
        }
        SeqVerdict::Accept => {}
    }
    b.ingest(&publication, Instant::now());
}
