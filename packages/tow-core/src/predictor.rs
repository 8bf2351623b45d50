//! predictor.rs — Forward-horizon simulation of a candidate decision
//!
//! Drives the vessel kinematically along a candidate (course, speed) and the
//! tow body through `cable::step` on a scratch copy of the live state. The
//! live `TowState` is only ever borrowed immutably.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::cable::{self, check_param, CableParams, TowState, MIN_DT};
use crate::error::Result;
use crate::geometry::{angle360, angle_diff, heading_to_vector, Obstacle, VesselPose};

/// Upper bound on integration steps per evaluation
pub const MAX_HORIZON_STEPS: usize = 2000;

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PredictorConfig {
    /// Integration step (s)
    pub dt: f64,
    /// Simulated window (s); ≤ 0 uses `allowable_ttc`
    pub horizon: f64,
    /// Fallback window (s)
    pub allowable_ttc: f64,
    /// Vessel turn-rate limit (deg/s); 0 turns instantly
    pub turn_rate_max: f64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self { dt: 0.1, horizon: -1.0, allowable_ttc: 20.0, turn_rate_max: 15.0 }
    }
}

impl PredictorConfig {
    pub fn validate(&self) -> Result<()> {
        check_param("horizon.dt", self.dt, |v| v > 0.0)?;
        check_param("horizon.horizon", self.horizon, |_| true)?;
        check_param("horizon.allowable_ttc", self.allowable_ttc, |v| v > 0.0)?;
        check_param("horizon.turn_rate_max", self.turn_rate_max, |v| v >= 0.0)?;
        Ok(())
    }

    /// Effective simulated window (s)
    pub fn window(&self) -> f64 {
        if self.horizon > 0.0 { self.horizon } else { self.allowable_ttc }
    }

    pub fn step_count(&self) -> usize {
        let dt = self.dt.max(MIN_DT);
        let steps = (self.window() / dt).ceil();
        if steps.is_finite() && steps > 0.0 {
            (steps as usize).min(MAX_HORIZON_STEPS)
        } else {
            0
        }
    }
}

/// Candidate vessel command
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Commanded course, degrees true
    pub course_deg: f64,
    /// Commanded speed (m/s)
    pub speed: f64,
}

impl Decision {
    pub fn new(course_deg: f64, speed: f64) -> Self { Self { course_deg, speed } }
}

/// Outcome of one horizon run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HorizonResult {
    /// Smallest tow-to-obstacle distance seen (m, ≥ 0)
    pub min_distance: f64,
    /// Smallest predicted tow speed (m/s)
    pub min_tow_speed: f64,
    /// Tow body entered the obstacle
    pub breached: bool,
    /// Smallest vessel-to-obstacle distance seen (m, ≥ 0)
    pub min_vessel_distance: f64,
    /// Integration steps actually executed
    pub steps: usize,
}

/// Slew the heading toward the commanded course (at most `turn_rate_max`
/// deg/s, 0 = instant) and move at the commanded speed for `dt`
pub(crate) fn advance_vessel(pose: &mut VesselPose, decision: Decision, dt: f64, turn_rate_max: f64) {
    let delta = angle_diff(decision.course_deg, pose.heading_deg);
    let turn = if turn_rate_max <= 0.0 {
        delta
    } else {
        let max_turn = turn_rate_max * dt;
        delta.clamp(-max_turn, max_turn)
    };
    pose.heading_deg = angle360(pose.heading_deg + turn);
    pose.position += heading_to_vector(pose.heading_deg, decision.speed.max(0.0)) * dt;
}

// ── Predictor ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct HorizonPredictor {
    config: PredictorConfig,
}

impl HorizonPredictor {
    pub fn new(config: PredictorConfig) -> Self { Self { config } }

    pub fn config(&self) -> &PredictorConfig { &self.config }

    /// Simulate `decision` from the current vessel pose and tow state.
    pub fn predict<O: Obstacle + ?Sized>(
        &self,
        vessel: &VesselPose,
        decision: Decision,
        tow: &TowState,
        cable: &CableParams,
        obstacle: &O,
    ) -> HorizonResult {
        let mut result = HorizonResult {
            min_distance: obstacle.distance_to(tow.position).max(0.0),
            min_tow_speed: tow.speed(),
            breached: false,
            min_vessel_distance: obstacle.distance_to(vessel.position).max(0.0),
            steps: 0,
        };
        if result.min_distance <= 0.0 {
            result.min_distance = 0.0;
            result.breached = true;
            return result;
        }

        let dt = self.config.dt.max(MIN_DT);

        let mut pose = *vessel;
        let mut state = *tow;
        let mut min_speed = f64::INFINITY;

        for i in 0..self.config.step_count() {
            advance_vessel(&mut pose, decision, dt, self.config.turn_rate_max);

            let anchor = cable::anchor_point(&pose, cable.attach_offset);
            cable::step(&mut state, anchor, dt, cable);

            min_speed = min_speed.min(state.speed());
            let d = obstacle.distance_to(state.position).max(0.0);
            result.min_distance = result.min_distance.min(d);
            result.min_vessel_distance = result
                .min_vessel_distance
                .min(obstacle.distance_to(pose.position).max(0.0));
            result.steps = i + 1;

            if d <= 0.0 {
                result.breached = true;
                trace!(step = i + 1, crs = decision.course_deg, spd = decision.speed, "horizon breach");
                break;
            }
        }

        if min_speed.is_finite() {
            result.min_tow_speed = min_speed;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{ConvexPolygon, Vec2};
    use approx::assert_relative_eq;

    fn block_north() -> ConvexPolygon {
        ConvexPolygon::from_points(&[[-20.0, 100.0], [20.0, 100.0], [20.0, 140.0], [-20.0, 140.0]]).unwrap()
    }

    fn trailing_tow() -> TowState {
        TowState::new(Vec2::new(0.0, -30.0), Vec2::new(0.0, 2.0))
    }

    #[test]
    fn test_step_count_uses_fallback_and_cap() {
        let cfg = PredictorConfig { dt: 0.1, horizon: -1.0, allowable_ttc: 20.0, turn_rate_max: 0.0 };
        assert_eq!(cfg.step_count(), 200);
        let long = PredictorConfig { horizon: 10_000.0, ..cfg };
        assert_eq!(long.step_count(), MAX_HORIZON_STEPS);
        let partial = PredictorConfig { horizon: 1.05, ..cfg };
        assert_eq!(partial.step_count(), 11);
    }

    #[test]
    fn test_breach_short_circuit() {
        let p = HorizonPredictor::default();
        let tow = TowState::new(Vec2::new(0.0, 120.0), Vec2::new(0.0, 1.0));
        let r = p.predict(&VesselPose::new(0.0, 150.0, 0.0), Decision::new(0.0, 2.0), &tow,
                          &CableParams::default(), &block_north());
        assert!(r.breached);
        assert_eq!(r.min_distance, 0.0);
        assert_eq!(r.steps, 0);
    }

    #[test]
    fn test_heading_into_obstacle_breaches_early() {
        let p = HorizonPredictor::new(PredictorConfig { horizon: 120.0, ..Default::default() });
        let r = p.predict(&VesselPose::new(0.0, 0.0, 0.0), Decision::new(0.0, 3.0), &trailing_tow(),
                          &CableParams::default(), &block_north());
        assert!(r.breached);
        assert!(r.steps < p.config().step_count());
    }

    #[test]
    fn test_turning_away_keeps_clearance() {
        let p = HorizonPredictor::default();
        let cable = CableParams::default();
        let toward = p.predict(&VesselPose::new(0.0, 0.0, 0.0), Decision::new(0.0, 2.0), &trailing_tow(),
                               &cable, &block_north());
        let away = p.predict(&VesselPose::new(0.0, 0.0, 0.0), Decision::new(180.0, 2.0), &trailing_tow(),
                             &cable, &block_north());
        assert!(away.min_distance > toward.min_distance);
        assert!(!away.breached);
        assert_eq!(away.steps, 200);
    }

    #[test]
    fn test_turn_rate_limits_reversal() {
        let mut pose = VesselPose::new(0.0, 0.0, 0.0);
        for _ in 0..10 {
            advance_vessel(&mut pose, Decision::new(180.0, 2.0), 0.1, 15.0);
        }
        assert_relative_eq!(angle_diff(pose.heading_deg, 0.0).abs(), 15.0, epsilon = 1e-9);

        let mut instant = VesselPose::new(0.0, 0.0, 0.0);
        advance_vessel(&mut instant, Decision::new(180.0, 2.0), 0.1, 0.0);
        assert_relative_eq!(instant.heading_deg, 180.0);
    }

    #[test]
    fn test_live_state_untouched() {
        let p = HorizonPredictor::default();
        let tow = trailing_tow();
        let before = tow;
        p.predict(&VesselPose::new(0.0, 0.0, 0.0), Decision::new(90.0, 2.0), &tow,
                  &CableParams::default(), &block_north());
        assert_eq!(tow, before);
    }

    #[test]
    fn test_stopped_vessel_slows_tow() {
        let p = HorizonPredictor::default();
        let r = p.predict(&VesselPose::new(0.0, 0.0, 0.0), Decision::new(0.0, 0.0), &trailing_tow(),
                          &CableParams::default(), &block_north());
        assert!(r.min_tow_speed < 2.0);
        assert!(r.min_tow_speed >= 0.0);
        assert_relative_eq!(r.min_vessel_distance, 100.0);
    }
}
