//! vessel_sim.rs — Vessel and towed-body ground truth
//!
//! Simulates one towing vessel and its tow body:
//! - Vessel kinematics in the East-North frame: a looping schedule of legs
//!   (course, speed, duration), turn-rate limited heading, first-order speed lag
//! - Manual course/speed override from the control panel
//! - Deployment: the tow body waits at the deployment point until the vessel
//!   is one cable length away, then is released with the vessel's velocity
//! - Tow body advanced by `tow_core::cable::step` every tick
//!
//! Pure math, no panics, no unwraps.

use serde::{Deserialize, Serialize};
use tracing::info;

use tow_core::cable::{self, CableParams, StepReport, TowState};
use tow_core::geometry::{angle360, angle_diff, heading_to_vector, Vec2, VesselPose};

// ── Config (populated from config.toml) ───────────────────────────────────────

/// One segment of the vessel's route
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Leg {
    pub course_deg: f64,
    pub speed_mps: f64,
    pub duration_s: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VesselConfig {
    /// Start position [x, y] (m)
    pub start: [f64; 2],
    pub start_heading_deg: f64,
    /// Heading slew limit (deg/s); 0 turns instantly
    pub turn_rate_max_dps: f64,
}

impl Default for VesselConfig {
    fn default() -> Self {
        Self { start: [0.0, 0.0], start_heading_deg: 0.0, turn_rate_max_dps: 15.0 }
    }
}

// ── Simulation ────────────────────────────────────────────────────────────────

pub struct TowSim {
    pub vessel: VesselPose,
    /// Current speed over ground (m/s)
    pub vessel_speed: f64,
    pub tow: TowState,
    pub cable: CableParams,
    pub deployed: bool,
    pub last_step: StepReport,
    /// Seconds since start or last reset
    pub t_elapsed: f64,

    legs: Vec<Leg>,
    leg_index: usize,
    leg_elapsed: f64,
    /// Manual (course, speed) replacing the leg schedule
    manual: Option<(Option<f64>, Option<f64>)>,
    turn_rate_max: f64,
    vessel_cfg: VesselConfig,
}

impl TowSim {
    pub fn new(vessel_cfg: &VesselConfig, cable: CableParams, legs: Vec<Leg>) -> Self {
        let vessel = VesselPose::new(vessel_cfg.start[0], vessel_cfg.start[1], angle360(vessel_cfg.start_heading_deg));
        let deploy_point = cable::anchor_point(&vessel, cable.attach_offset);
        Self {
            vessel,
            vessel_speed: 0.0,
            tow: TowState::new(deploy_point, Vec2::ZERO),
            cable,
            deployed: false,
            last_step: StepReport::default(),
            t_elapsed: 0.0,
            legs: legs.into_iter().filter(|l| l.duration_s > 0.0).collect(),
            leg_index: 0,
            leg_elapsed: 0.0,
            manual: None,
            turn_rate_max: vessel_cfg.turn_rate_max_dps.max(0.0),
            vessel_cfg: vessel_cfg.clone(),
        }
    }

    /// Back to the start pose with the tow body stowed
    pub fn reset(&mut self) {
        let cable = self.cable;
        let legs = std::mem::take(&mut self.legs);
        *self = Self::new(&self.vessel_cfg.clone(), cable, legs);
    }

    pub fn set_course(&mut self, course_deg: f64) {
        let speed = self.manual.and_then(|(_, s)| s);
        self.manual = Some((Some(angle360(course_deg)), speed));
    }

    pub fn set_vessel_speed(&mut self, speed_mps: f64) {
        let course = self.manual.and_then(|(c, _)| c);
        self.manual = Some((course, Some(speed_mps.max(0.0))));
    }

    /// Return to the leg schedule
    pub fn clear_manual(&mut self) { self.manual = None; }

    pub fn set_cable(&mut self, cable: CableParams) { self.cable = cable; }

    pub fn leg_index(&self) -> usize { self.leg_index }

    /// Commanded (course, speed) for this tick
    fn command(&self) -> (f64, f64) {
        let leg = self.legs.get(self.leg_index);
        let sched_course = leg.map_or(self.vessel.heading_deg, |l| l.course_deg);
        let sched_speed = leg.map_or(0.0, |l| l.speed_mps);
        match self.manual {
            Some((c, s)) => (c.unwrap_or(sched_course), s.unwrap_or(sched_speed)),
            None => (sched_course, sched_speed),
        }
    }

    fn advance_schedule(&mut self, dt: f64) {
        if self.legs.is_empty() {
            return;
        }
        self.leg_elapsed += dt;
        while self.leg_elapsed >= self.legs[self.leg_index].duration_s {
            self.leg_elapsed -= self.legs[self.leg_index].duration_s;
            self.leg_index = (self.leg_index + 1) % self.legs.len();
            let l = self.legs[self.leg_index];
            info!("🧭 Leg {} — crs {:.0}° @ {:.1} m/s for {:.0}s", self.leg_index, l.course_deg, l.speed_mps, l.duration_s);
        }
    }

    /// Advance simulation by dt seconds
    pub fn tick(&mut self, dt: f64) {
        if dt <= 0.0 || !dt.is_finite() {
            return;
        }
        self.t_elapsed += dt;
        let (course, target_speed) = self.command();
        self.advance_schedule(dt);

        // Heading: slew toward commanded course
        let delta = angle_diff(course, self.vessel.heading_deg);
        let max_turn = self.turn_rate_max * dt;
        let turn = if self.turn_rate_max <= 0.0 { delta } else { delta.clamp(-max_turn, max_turn) };
        self.vessel.heading_deg = angle360(self.vessel.heading_deg + turn);

        // Smooth speed transition (simple first-order lag)
        self.vessel_speed += (target_speed - self.vessel_speed) * (dt * 2.0).min(1.0);

        let vessel_vel = heading_to_vector(self.vessel.heading_deg, self.vessel_speed);
        self.vessel.position += vessel_vel * dt;

        let anchor = cable::anchor_point(&self.vessel, self.cable.attach_offset);

        if !self.deployed {
            if anchor.dist(self.tow.position) >= self.cable.length {
                self.deployed = true;
                self.tow.velocity = vessel_vel;
                info!("🪝 Tow deployed at t={:.1}s ({:.1} m behind)", self.t_elapsed, self.cable.length);
            } else {
                self.last_step = StepReport {
                    separation: anchor.dist(self.tow.position),
                    tension: 0.0,
                    clamped: false,
                };
                return;
            }
        }

        self.last_step = cable::step(&mut self.tow, anchor, dt, &self.cable);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn north_leg() -> Vec<Leg> {
        vec![Leg { course_deg: 0.0, speed_mps: 2.0, duration_s: 1000.0 }]
    }

    #[test]
    fn test_tow_waits_until_cable_paid_out() {
        let mut sim = TowSim::new(&VesselConfig::default(), CableParams::default(), north_leg());
        for _ in 0..50 {
            sim.tick(0.1);
        }
        assert!(!sim.deployed);
        assert_eq!(sim.tow.position, Vec2::ZERO);

        for _ in 0..400 {
            sim.tick(0.1);
        }
        assert!(sim.deployed);
        let sep = sim.tow.position.dist(sim.vessel.position);
        assert!(sep <= 30.0 + 1e-9);
        assert!(sim.tow.position.y > 0.0);
    }

    #[test]
    fn test_turn_rate_limits_heading() {
        let legs = vec![Leg { course_deg: 90.0, speed_mps: 1.0, duration_s: 100.0 }];
        let mut sim = TowSim::new(&VesselConfig::default(), CableParams::default(), legs);
        sim.tick(1.0);
        assert_relative_eq!(sim.vessel.heading_deg, 15.0);
    }

    #[test]
    fn test_schedule_loops() {
        let legs = vec![
            Leg { course_deg: 0.0, speed_mps: 1.0, duration_s: 2.0 },
            Leg { course_deg: 180.0, speed_mps: 1.0, duration_s: 2.0 },
        ];
        let mut sim = TowSim::new(&VesselConfig::default(), CableParams::default(), legs);
        for _ in 0..25 {
            sim.tick(0.1);
        }
        assert_eq!(sim.leg_index(), 1);
        for _ in 0..20 {
            sim.tick(0.1);
        }
        assert_eq!(sim.leg_index(), 0);
    }

    #[test]
    fn test_manual_override_and_reset() {
        let mut sim = TowSim::new(&VesselConfig::default(), CableParams::default(), north_leg());
        sim.set_vessel_speed(0.0);
        for _ in 0..20 {
            sim.tick(0.1);
        }
        assert_relative_eq!(sim.vessel.position.y, 0.0);
        sim.clear_manual();
        sim.tick(0.5);
        assert!(sim.vessel.position.y > 0.0);
        sim.reset();
        assert_eq!(sim.vessel.position, Vec2::ZERO);
        assert!(!sim.deployed);
    }
}
