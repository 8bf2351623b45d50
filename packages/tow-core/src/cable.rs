//! cable.rs — Towed-body cable dynamics
//!
//! One physics step is two stages:
//! 1. `integrate`: soft spring pull (only when the cable is over-stretched),
//!    quadratic drag and tangential damping, then explicit Euler on position.
//! 2. `project_rigid_length`: hard cap on the cable length, removing any
//!    velocity that would immediately re-stretch it.
//!
//! Both stages are free functions over plain data so the real-time simulator
//! and the forward-horizon predictor drive exactly the same model.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TowError};
use crate::geometry::{heading_to_vector, vector_heading, Vec2, VesselPose};

/// Smallest time step the integrator accepts (seconds)
pub const MIN_DT: f64 = 1e-3;
/// Below this separation tow and anchor are treated as co-located (meters)
pub const MIN_SEPARATION: f64 = 0.01;
/// Below this speed drag is skipped (m/s)
const MIN_DRAG_SPEED: f64 = 1e-6;
/// Below this speed the tow heading falls back to the cable bearing (m/s)
const HEADING_MIN_SPEED: f64 = 0.05;
/// Projection guard (meters)
const PROJECT_EPS: f64 = 1e-9;

// ── Types ─────────────────────────────────────────────────────────────────────

/// Position and velocity of the towed body
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TowState {
    pub position: Vec2,
    pub velocity: Vec2,
}

impl TowState {
    pub fn new(position: Vec2, velocity: Vec2) -> Self { Self { position, velocity } }

    pub fn at_rest(x: f64, y: f64) -> Self {
        Self { position: Vec2::new(x, y), velocity: Vec2::ZERO }
    }

    pub fn speed(&self) -> f64 { self.velocity.norm() }

    /// Heading of travel, or the bearing toward `anchor` when nearly stopped
    pub fn heading_deg(&self, anchor: Vec2) -> f64 {
        if self.speed() > HEADING_MIN_SPEED {
            vector_heading(self.velocity)
        } else {
            vector_heading(anchor - self.position)
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.velocity.is_finite()
    }
}

/// Lumped cable/tow-body parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CableParams {
    /// Maximum cable length (m)
    pub length: f64,
    /// Distance from vessel reference point back to the tow point (m)
    pub attach_offset: f64,
    /// Spring pull per meter of overshoot (1/s²)
    pub spring_stiffness: f64,
    /// Lumped quadratic drag coefficient CdA/m (1/m)
    pub drag_coeff: f64,
    /// Damping of velocity perpendicular to the cable (1/s)
    pub tangential_damping: f64,
}

impl Default for CableParams {
    fn default() -> Self {
        Self {
            length: 30.0,
            attach_offset: 0.0,
            spring_stiffness: 5.0,
            drag_coeff: 0.7,
            tangential_damping: 2.0,
        }
    }
}

impl CableParams {
    pub fn validate(&self) -> Result<()> {
        check_param("length", self.length, |v| v > 0.0)?;
        check_param("attach_offset", self.attach_offset, |v| v >= 0.0)?;
        check_param("spring_stiffness", self.spring_stiffness, |v| v >= 0.0)?;
        check_param("drag_coeff", self.drag_coeff, |v| v >= 0.0)?;
        check_param("tangential_damping", self.tangential_damping, |v| v >= 0.0)?;
        Ok(())
    }
}

pub(crate) fn check_param(name: &'static str, value: f64, ok: impl Fn(f64) -> bool) -> Result<()> {
    if value.is_finite() && ok(value) {
        Ok(())
    } else {
        Err(TowError::InvalidParameter { name, value })
    }
}

/// Tow point on the vessel: `attach_offset` meters astern of the vessel
pub fn anchor_point(vessel: &VesselPose, attach_offset: f64) -> Vec2 {
    vessel.position - heading_to_vector(vessel.heading_deg, attach_offset)
}

/// Diagnostics for one combined physics step
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StepReport {
    /// Tow-to-anchor distance after the step (m)
    pub separation: f64,
    /// Spring pull applied this step, k·overshoot (m/s²)
    pub tension: f64,
    /// Whether the rigid clamp fired
    pub clamped: bool,
}

// ── Integrator ────────────────────────────────────────────────────────────────

fn apply_drag(state: &mut TowState, params: &CableParams, dt: f64) {
    let speed = state.speed();
    if speed > MIN_DRAG_SPEED {
        let factor = (params.drag_coeff * speed * dt).min(1.0);
        state.velocity -= state.velocity * factor;
    }
}

/// Advance the tow body one step toward `anchor`. Returns the spring pull
/// applied (0 when the cable is slack or geometry is degenerate).
pub fn integrate(state: &mut TowState, anchor: Vec2, dt: f64, params: &CableParams) -> f64 {
    let dt = dt.max(MIN_DT);

    if params.length <= 0.0 {
        apply_drag(state, params, dt);
        state.position += state.velocity * dt;
        return 0.0;
    }

    let to_anchor = anchor - state.position;
    let separation = to_anchor.norm();
    if separation <= MIN_SEPARATION {
        apply_drag(state, params, dt);
        return 0.0;
    }

    let u = to_anchor * (1.0 / separation);
    let n = u.perp();

    let mut tension = 0.0;
    if separation > params.length {
        tension = params.spring_stiffness * (separation - params.length);
        state.velocity += u * (tension * dt);
    }

    apply_drag(state, params, dt);

    let vt = state.velocity.dot(n);
    let damp = (params.tangential_damping * dt).min(1.0);
    state.velocity -= n * (vt * damp);

    state.position += state.velocity * dt;
    tension
}

// ── Rigid clamp ───────────────────────────────────────────────────────────────

/// Enforce `|anchor - position| <= length`. Returns true when the clamp fired.
pub fn project_rigid_length(state: &mut TowState, anchor: Vec2, length: f64) -> bool {
    if length <= 0.0 {
        return false;
    }
    let to_anchor = anchor - state.position;
    let dist = to_anchor.norm();
    if dist <= PROJECT_EPS || dist <= length {
        return false;
    }

    state.position = anchor - to_anchor * (length / dist);

    let u = to_anchor * (1.0 / dist);
    let v_rad = state.velocity.dot(u);
    if v_rad < 0.0 {
        state.velocity -= u * v_rad;
    }
    true
}

/// Integrate then clamp: one full physics step
pub fn step(state: &mut TowState, anchor: Vec2, dt: f64, params: &CableParams) -> StepReport {
    let tension = integrate(state, anchor, dt, params);
    let clamped = project_rigid_length(state, anchor, params.length);
    StepReport {
        separation: state.position.dist(anchor),
        tension,
        clamped,
    }
}
