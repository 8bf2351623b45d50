//! avoidance.rs — Per-cycle orchestration of the tow-aware avoidance core
//!
//! `update` consumes one cycle of inputs (vessel pose, raw tow samples, live
//! cable parameters) and refreshes the lead estimate, ranges, CPA tracking,
//! relevance and flags. `evaluate` then scores candidate decisions against
//! the state captured by the last `update`. Neither call can fail: missing
//! or bad inputs degrade to a neutral answer.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cable::{CableParams, TowState};
use crate::config::{AvoidanceConfig, EvalMode};
use crate::encounter::{CpaEvent, EncounterState, EncounterTracker};
use crate::error::Result;
use crate::flags::{MacroContext, PostedFlag};
use crate::geometry::{vector_heading, ConvexPolygon, Obstacle, Vec2, VesselPose};
use crate::lead::{LeadEstimate, LeadPointEstimator, PoseSample};
use crate::predictor::{Decision, HorizonPredictor, HorizonResult};
use crate::relevance::{side_of, Side, SideLock};
use crate::utility::UtilityMapper;

// ── Inputs ────────────────────────────────────────────────────────────────────

/// Cable parameters published at run time; each replaces the configured
/// value when present and valid
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CableOverrides {
    pub length: Option<f64>,
    pub attach_offset: Option<f64>,
    pub spring_stiffness: Option<f64>,
    pub drag_coeff: Option<f64>,
    pub tangential_damping: Option<f64>,
}

impl CableOverrides {
    /// Effective parameters plus the (name, value) of every rejected override
    pub fn apply(&self, base: &CableParams) -> (CableParams, Vec<(&'static str, f64)>) {
        let mut out = *base;
        let mut rejected = Vec::new();
        let mut take = |name: &'static str, v: Option<f64>, slot: &mut f64, strict: bool| {
            if let Some(v) = v {
                if v.is_finite() && (v > 0.0 || (!strict && v == 0.0)) {
                    *slot = v;
                } else {
                    rejected.push((name, v));
                }
            }
        };
        take("TOW_CABLE_LENGTH", self.length, &mut out.length, true);
        take("TOW_ATTACH_OFFSET", self.attach_offset, &mut out.attach_offset, false);
        take("TOW_SPRING_STIFFNESS", self.spring_stiffness, &mut out.spring_stiffness, false);
        take("TOW_DRAG_COEFF", self.drag_coeff, &mut out.drag_coeff, false);
        take("TOW_TAN_DAMPING", self.tangential_damping, &mut out.tangential_damping, false);
        (out, rejected)
    }
}

/// Everything the host gathered for one control cycle
#[derive(Debug, Clone, Default)]
pub struct CycleInputs {
    /// Current time (s), same clock as sample stamps
    pub now: f64,
    pub vessel: Option<VesselPose>,
    pub tow: PoseSample,
    /// Published tow velocity (TOWED_VX/VY), if both components are present
    pub tow_velocity: Option<Vec2>,
    pub overrides: CableOverrides,
}

// ── Outputs ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub lead: LeadEstimate,
    /// Padded range from the actual tow pose (drives completion)
    pub range_actual: Option<f64>,
    /// Padded range from the lead point (drives relevance, flags and CPA)
    pub range: Option<f64>,
    pub relevance: f64,
    pub encounter: EncounterState,
    pub cpa_event: Option<CpaEvent>,
    pub flags: Vec<PostedFlag>,
    pub completed: bool,
    pub side_lock: Option<Side>,
    pub cable: CableParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Inputs incomplete or encounter resolved; utility is the maximum
    Neutral,
    Scored,
    /// Predicted or current breach; utility is the minimum
    Breached,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    pub utility: f64,
    pub verdict: Verdict,
    pub horizon: Option<HorizonResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredDecision {
    pub decision: Decision,
    pub evaluation: Evaluation,
}

/// Highest utility; ties resolve to the earliest entry
pub fn best(scored: &[ScoredDecision]) -> Option<&ScoredDecision> {
    scored.iter().fold(None, |acc: Option<&ScoredDecision>, s| match acc {
        Some(b) if b.evaluation.utility >= s.evaluation.utility => Some(b),
        _ => Some(s),
    })
}

/// Candidate (course, speed) decisions to score each cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionGrid {
    decisions: Vec<Decision>,
}

impl DecisionGrid {
    pub fn new(decisions: Vec<Decision>) -> Self { Self { decisions } }

    /// `courses` evenly spaced headings from 0, crossed with `speeds` evenly
    /// spaced speeds over [speed_min, speed_max]
    pub fn uniform(courses: usize, speed_min: f64, speed_max: f64, speeds: usize) -> Self {
        let courses = courses.max(1);
        let speeds = speeds.max(1);
        let mut decisions = Vec::with_capacity(courses * speeds);
        for c in 0..courses {
            let course = 360.0 * c as f64 / courses as f64;
            for s in 0..speeds {
                let speed = if speeds == 1 {
                    speed_max
                } else {
                    speed_min + (speed_max - speed_min) * s as f64 / (speeds - 1) as f64
                };
                decisions.push(Decision::new(course, speed));
            }
        }
        Self { decisions }
    }

    pub fn decisions(&self) -> &[Decision] { &self.decisions }
    pub fn len(&self) -> usize { self.decisions.len() }
    pub fn is_empty(&self) -> bool { self.decisions.is_empty() }
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct TowAvoidance {
    config: AvoidanceConfig,
    obstacle: Option<ConvexPolygon>,
    predictor: HorizonPredictor,
    mapper: UtilityMapper,
    lead: LeadPointEstimator,
    tracker: EncounterTracker,
    side_lock: SideLock,

    cable: CableParams,
    vessel: Option<VesselPose>,
    tow_position: Option<Vec2>,
    tow_velocity: Option<Vec2>,
    relevance: f64,
    engaged: bool,
    completed: bool,
    rejected_overrides: Vec<(&'static str, f64)>,
}

impl TowAvoidance {
    pub fn new(config: AvoidanceConfig) -> Result<Self> {
        config.validate()?;
        let obstacle = config.obstacle.polygon()?;
        Ok(Self {
            obstacle,
            predictor: HorizonPredictor::new(config.horizon),
            mapper: UtilityMapper::new(config.utility),
            lead: LeadPointEstimator::new(config.lead),
            tracker: EncounterTracker::new(config.encounter.hysteresis, config.relevance.outer()),
            side_lock: SideLock::default(),
            cable: config.cable,
            vessel: None,
            tow_position: None,
            tow_velocity: None,
            relevance: 0.0,
            engaged: false,
            completed: false,
            rejected_overrides: Vec::new(),
            config,
        })
    }

    pub fn config(&self) -> &AvoidanceConfig { &self.config }

    pub fn obstacle(&self) -> Option<&ConvexPolygon> { self.obstacle.as_ref() }

    /// Replace the obstacle polygon; starts a fresh encounter
    pub fn set_obstacle(&mut self, obstacle: ConvexPolygon) {
        info!(id = obstacle.label(), vertices = obstacle.vertices().len(), "obstacle updated");
        self.obstacle = Some(obstacle);
        self.tracker.reset();
        self.side_lock.clear();
        self.engaged = false;
        self.completed = false;
    }

    /// Relevance computed by the last `update`, in [0, 1]
    pub fn relevance(&self) -> f64 { self.relevance }

    pub fn completed(&self) -> bool { self.completed }

    pub fn update(&mut self, inputs: &CycleInputs) -> CycleReport {
        let (cable, rejected) = inputs.overrides.apply(&self.config.cable);
        if rejected != self.rejected_overrides {
            for (name, value) in &rejected {
                warn!(field = *name, value = *value, "invalid cable override ignored");
            }
            self.rejected_overrides = rejected;
        }
        self.cable = cable;
        self.vessel = inputs.vessel.filter(|v| v.position.is_finite() && v.heading_deg.is_finite());

        let lead = self.lead.update(&inputs.tow, inputs.now);
        self.tow_position = lead.raw_position;
        self.tow_velocity = inputs
            .tow_velocity
            .filter(|v| v.is_finite())
            .or(lead.filtered_velocity);

        let enc = &self.config.encounter;
        let (range_actual, range) = match (&self.obstacle, lead.raw_position, lead.lead_position) {
            (Some(ob), Some(raw), Some(lp)) => (
                Some(enc.padded(ob.distance_to(raw))),
                Some(enc.padded(ob.distance_to(lp))),
            ),
            _ => (None, None),
        };

        let gated = range.filter(|_| lead.usable());
        if gated.is_some_and(|r| r < self.config.relevance.outer()) {
            self.engaged = true;
        }

        // Completion only counts once the tow has come within relevance range
        if let Some(actual) = range_actual {
            if self.engaged && !self.completed && actual > enc.completed_dist {
                info!(range = format!("{:.1}", actual), "tow clear of obstacle, encounter complete");
                self.completed = true;
            }
        }

        let cpa_event = self.tracker.update(gated);

        let heading = self.tow_heading();
        let centroid = self.obstacle.as_ref().map(|o| o.centroid());
        let side = match (lead.raw_position, heading, centroid) {
            (Some(p), Some(h), Some(c)) => side_of(p, h, c),
            _ => None,
        };

        self.relevance = 0.0;
        match gated {
            Some(r) if !self.completed => {
                let raw = self.config.relevance.raw(r);
                if raw > 0.0 {
                    self.side_lock.update(raw, self.config.relevance.side_lock_threshold, || side);
                    self.relevance = self.config.relevance.grade.apply(raw);
                } else {
                    self.side_lock.clear();
                }
            }
            _ => self.side_lock.clear(),
        }

        let mut ctx = MacroContext {
            range: gated,
            cpa: self.tracker.state().cpa_reported,
            obstacle_id: self.obstacle.as_ref().map_or("", |o| o.label()),
            min_util_cpa: self.config.utility.min_util_cpa,
            max_util_cpa: self.config.utility.max_util_cpa,
            bearing: match (lead.raw_position, centroid) {
                (Some(p), Some(c)) if p.dist(c) > 1e-6 => Some(vector_heading(c - p)),
                _ => None,
            },
            side,
            side_lock: self.side_lock.get(),
        };

        let mut flags = Vec::new();
        if let Some(r) = gated {
            flags.extend(
                self.config.rng_flags.iter()
                    .filter(|f| f.triggers(r))
                    .map(|f| ctx.post(&f.var, &f.value)),
            );
        }
        if let Some(ev) = cpa_event {
            ctx.cpa = Some(ev.cpa_range);
            flags.extend(self.config.cpa_flags.iter().map(|f| ctx.post(&f.var, &f.value)));
        }
        if !flags.is_empty() {
            debug!(count = flags.len(), "flags posted");
        }

        CycleReport {
            lead,
            range_actual,
            range,
            relevance: self.relevance,
            encounter: *self.tracker.state(),
            cpa_event,
            flags,
            completed: self.completed,
            side_lock: self.side_lock.get(),
            cable: self.cable,
        }
    }

    /// Heading of the tow: along its velocity, else along the vessel's
    fn tow_heading(&self) -> Option<f64> {
        match self.tow_velocity {
            Some(v) if v.norm() > 1e-6 => Some(vector_heading(v)),
            _ => self.vessel.map(|v| v.heading_deg),
        }
    }

    fn neutral(&self) -> Evaluation {
        Evaluation { utility: self.mapper.max_util(), verdict: Verdict::Neutral, horizon: None }
    }

    fn breached(&self, horizon: Option<HorizonResult>) -> Evaluation {
        Evaluation { utility: self.mapper.min_util(), verdict: Verdict::Breached, horizon }
    }

    /// Score one candidate against the state captured by the last `update`
    pub fn evaluate(&self, decision: Decision) -> Evaluation {
        if self.completed {
            return self.neutral();
        }
        let (Some(obstacle), Some(vessel), Some(pos), Some(vel)) =
            (&self.obstacle, &self.vessel, self.tow_position, self.tow_velocity)
        else {
            return self.neutral();
        };

        let blended = self.config.mode == EvalMode::Blended;
        if blended && obstacle.contains(vessel.position) {
            return self.breached(None);
        }

        let tow = TowState::new(pos, vel);
        let result = self.predictor.predict(vessel, decision, &tow, &self.cable, obstacle);
        if result.breached {
            return self.breached(Some(result));
        }

        let mut utility = self.mapper.map(&result);
        if blended {
            if result.min_vessel_distance <= 0.0 {
                return self.breached(Some(result));
            }
            utility = utility.min(self.mapper.clearance_utility(result.min_vessel_distance));
        }
        Evaluation { utility, verdict: Verdict::Scored, horizon: Some(result) }
    }

    pub fn evaluate_grid(&self, grid: &DecisionGrid) -> Vec<ScoredDecision> {
        grid.decisions()
            .iter()
            .map(|d| ScoredDecision { decision: *d, evaluation: self.evaluate(*d) })
            .collect()
    }
}
