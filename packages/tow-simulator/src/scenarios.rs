//! scenarios.rs — Injectable transport/sensor faults for the tow simulator
//!
//! Each scenario reproduces a failure mode the avoidance monitor must ride
//! through. Scenarios are toggleable at runtime via the WebSocket control API
//! and every one is recoverable: clearing it restores clean publications.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioType {
    /// Periodically withhold TOWED_X
    TowXDropout,
    /// Periodically withhold TOWED_Y
    TowYDropout,
    /// Occasional teleport of the published tow position
    PoseGlitch,
    /// TOWED_Y stamped later than TOWED_X
    StampSkew,
    /// Never publish TOWED_VX / TOWED_VY
    NoTowVelocity,
    /// Stop publishing the tow pose altogether (stale on the receiver)
    TowFreeze,
    /// Publish an invalid cable length now and then
    BadCableParam,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub active: Vec<ScenarioType>,
    /// Dropout cycle length (ticks)
    pub dropout_period_ticks: u32,
    /// Ticks withheld at the start of every cycle
    pub dropout_len_ticks: u32,
    /// Probability per tick of a position glitch
    pub glitch_rate: f64,
    /// Size of a glitch jump (m)
    pub glitch_jump_m: f64,
    /// Extra stamp delay on TOWED_Y (s)
    pub skew_s: f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            active: vec![],
            dropout_period_ticks: 30,
            dropout_len_ticks: 5,
            glitch_rate: 0.02,
            glitch_jump_m: 25.0,
            skew_s: 0.3,
        }
    }
}

impl ScenarioConfig {
    pub fn has(&self, s: ScenarioType) -> bool {
        self.active.contains(&s)
    }

    fn in_dropout(&self, tick: u64) -> bool {
        let period = self.dropout_period_ticks.max(1) as u64;
        tick % period < self.dropout_len_ticks as u64
    }

    pub fn drop_tow_x(&self, tick: u64) -> bool {
        self.has(ScenarioType::TowFreeze) || (self.has(ScenarioType::TowXDropout) && self.in_dropout(tick))
    }

    pub fn drop_tow_y(&self, tick: u64) -> bool {
        self.has(ScenarioType::TowFreeze) || (self.has(ScenarioType::TowYDropout) && self.in_dropout(tick))
    }

    pub fn y_stamp_delay(&self) -> f64 {
        if self.has(ScenarioType::StampSkew) { self.skew_s } else { 0.0 }
    }
}

/// Predefined scenario presets that can be selected from the web UI
pub fn preset(name: &str) -> Option<ScenarioConfig> {
    let active = match name {
        "clean" | "default" => vec![],
        "dropout" => vec![ScenarioType::TowXDropout],
        "glitch" => vec![ScenarioType::PoseGlitch],
        "skew" => vec![ScenarioType::StampSkew],
        "no_velocity" => vec![ScenarioType::NoTowVelocity],
        "stale" => vec![ScenarioType::TowFreeze],
        "bad_cable" => vec![ScenarioType::BadCableParam],
        "rough" => vec![ScenarioType::TowYDropout, ScenarioType::PoseGlitch, ScenarioType::StampSkew],
        _ => return None,
    };
    Some(ScenarioConfig { active, ..Default::default() })
}
