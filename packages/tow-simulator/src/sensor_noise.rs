//! sensor_noise.rs — Measurement chain from ground truth to publication
//!
//! Turns the simulated vessel/tow ground truth into one `TowPublication` per
//! tick, the way the tow's navigation sensor and the radio link would:
//! 1. Gaussian noise on published positions, velocities and headings
//! 2. Scenario faults: X/Y dropouts, teleport glitches, Y stamp skew,
//!    suppressed velocity, frozen tow pose, invalid cable parameters
//! 3. Cable parameters re-published every `cable_every_ticks` ticks

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;

use tow_core::geometry::vector_heading;
use tow_types::{FieldName, TowPublication};

use crate::scenarios::{ScenarioConfig, ScenarioType};
use crate::vessel_sim::TowSim;

// ── Noise configuration ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NoiseConfig {
    /// Position noise σ (m)
    pub sigma_pos_m: f64,
    /// Velocity noise σ (m/s)
    pub sigma_vel_mps: f64,
    /// Heading noise σ (deg)
    pub sigma_heading_deg: f64,
    /// Cable parameters are published every N ticks
    pub cable_every_ticks: u64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self { sigma_pos_m: 0.3, sigma_vel_mps: 0.05, sigma_heading_deg: 1.0, cable_every_ticks: 10 }
    }
}

/// Zero-mean Gaussian, or silence when σ is not positive
struct Jitter(Option<Normal<f64>>);

impl Jitter {
    fn new(sigma: f64) -> Self {
        Self(if sigma > 0.0 { Normal::new(0.0, sigma).ok() } else { None })
    }

    fn sample(&self, rng: &mut impl Rng) -> f64 {
        self.0.as_ref().map_or(0.0, |n| n.sample(rng))
    }
}

pub struct SensorModel {
    pos: Jitter,
    vel: Jitter,
    heading: Jitter,
    cable_every: u64,
}

impl SensorModel {
    pub fn new(cfg: &NoiseConfig) -> Self {
        Self {
            pos: Jitter::new(cfg.sigma_pos_m),
            vel: Jitter::new(cfg.sigma_vel_mps),
            heading: Jitter::new(cfg.sigma_heading_deg),
            cable_every: cfg.cable_every_ticks.max(1),
        }
    }

    /// Build the publication for one tick.
    pub fn publish(
        &self,
        sim: &TowSim,
        scenario: &ScenarioConfig,
        source: &str,
        tick: u64,
        seq_num: u32,
        rng: &mut impl Rng,
    ) -> TowPublication {
        let t = sim.t_elapsed;
        let mut p = TowPublication::new(source, seq_num, t);

        // Vessel navigation
        p.push(FieldName::NavX, sim.vessel.position.x + self.pos.sample(rng), t);
        p.push(FieldName::NavY, sim.vessel.position.y + self.pos.sample(rng), t);
        p.push(FieldName::NavHeading, (sim.vessel.heading_deg + self.heading.sample(rng)).rem_euclid(360.0), t);
        p.push(FieldName::NavSpeed, (sim.vessel_speed + self.vel.sample(rng)).max(0.0), t);

        // Tow body
        let mut tx = sim.tow.position.x + self.pos.sample(rng);
        let mut ty = sim.tow.position.y + self.pos.sample(rng);
        if scenario.has(ScenarioType::PoseGlitch) && rng.gen_bool(scenario.glitch_rate.clamp(0.0, 1.0)) {
            let a = rng.gen_range(0.0..std::f64::consts::TAU);
            tx += scenario.glitch_jump_m * a.cos();
            ty += scenario.glitch_jump_m * a.sin();
        }
        if !scenario.drop_tow_x(tick) {
            p.push(FieldName::TowedX, tx, t);
        }
        if !scenario.drop_tow_y(tick) {
            p.push(FieldName::TowedY, ty, t - scenario.y_stamp_delay());
        }

        if !scenario.has(ScenarioType::NoTowVelocity) && !scenario.has(ScenarioType::TowFreeze) {
            let v = sim.tow.velocity;
            p.push(FieldName::TowedVx, v.x + self.vel.sample(rng), t);
            p.push(FieldName::TowedVy, v.y + self.vel.sample(rng), t);
            p.push(FieldName::TowedSpeed, v.norm(), t);
            p.push(FieldName::TowedHeading, sim.tow.heading_deg(sim.vessel.position), t);
        }

        // Diagnostics
        p.push(FieldName::CableDistance, sim.last_step.separation, t);
        p.push(FieldName::CableTension, sim.last_step.tension, t);
        p.push(FieldName::TowDeployed, if sim.deployed { 1.0 } else { 0.0 }, t);

        if tick % self.cable_every == 0 {
            let c = &sim.cable;
            let length = if scenario.has(ScenarioType::BadCableParam) && tick % (self.cable_every * 3) == 0 {
                -1.0
            } else {
                c.length
            };
            p.push(FieldName::TowCableLength, length, t);
            p.push(FieldName::TowAttachOffset, c.attach_offset, t);
            p.push(FieldName::TowSpringStiffness, c.spring_stiffness, t);
            p.push(FieldName::TowDragCoeff, c.drag_coeff, t);
            p.push(FieldName::TowTanDamping, c.tangential_damping, t);
        }

        p
    }
}

/// Heading of the vessel-to-tow line, for telemetry
pub fn cable_bearing(sim: &TowSim) -> f64 {
    vector_heading(sim.tow.position - sim.vessel.position)
}
