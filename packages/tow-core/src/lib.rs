//! tow-core — Tow-aware obstacle avoidance
//!
//! Models a passively-towed body on a cable behind a vessel and scores
//! candidate (course, speed) decisions by simulating the tow forward and
//! measuring its clearance to an obstacle polygon.
//!
//! Components, leaf first:
//! - [`cable`]: one-step cable dynamics and the rigid length clamp
//! - [`predictor`]: forward-horizon simulation of a candidate decision
//! - [`utility`]: clearance (and tow speed) to bounded utility
//! - [`lead`]: filtered tow velocity and projected lead point
//! - [`encounter`]: closing/opening tracking and CPA events
//! - [`avoidance`]: per-cycle orchestration of all of the above
//!
//! The core is synchronous and never fails after construction.

pub mod avoidance;
pub mod cable;
pub mod config;
pub mod encounter;
pub mod error;
pub mod flags;
pub mod geometry;
pub mod lead;
pub mod predictor;
pub mod relevance;
pub mod utility;

pub use avoidance::{
    best, CableOverrides, CycleInputs, CycleReport, DecisionGrid, Evaluation, ScoredDecision,
    TowAvoidance, Verdict,
};
pub use cable::{CableParams, StepReport, TowState};
pub use config::{AvoidanceConfig, EvalMode};
pub use error::{Result, TowError};
pub use geometry::{ConvexPolygon, Obstacle, Vec2, VesselPose};
pub use lead::{AxisSample, LeadEstimate, PoseSample};
pub use predictor::{Decision, HorizonPredictor, HorizonResult};
