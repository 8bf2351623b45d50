//! cycle.rs — Control cycle: inputs → avoidance update → grid scoring → status

use tracing::{debug, info, warn};

use tow_core::{best, CycleInputs, DecisionGrid, TowAvoidance, Verdict};
use tow_types::{AvoidanceStatus, BestDecision};

pub struct Monitor {
    avoid: TowAvoidance,
    grid: DecisionGrid,
    status: AvoidanceStatus,
    /// Every candidate scored at minimum utility on the last scoring pass
    cornered: bool,
}

impl Monitor {
    pub fn new(avoid: TowAvoidance, grid: DecisionGrid) -> Self {
        Self { avoid, grid, status: AvoidanceStatus::default(), cornered: false }
    }

    pub fn status(&self) -> &AvoidanceStatus { &self.status }

    /// Run one cycle. `inputs` is `None` until the first publication arrives.
    pub fn step(&mut self, inputs: Option<CycleInputs>, accepted: u64, dropped: u64) -> &AvoidanceStatus {
        self.status.cycle += 1;
        self.status.accepted = accepted;
        self.status.dropped = dropped;

        let Some(inputs) = inputs else {
            return &self.status;
        };

        let report = self.avoid.update(&inputs);

        if let Some(ev) = report.cpa_event {
            info!("📍 CPA {:.1} m (now {:.1} m, opening)", ev.cpa_range, ev.range);
        }
        for f in &report.flags {
            debug!("🚩 {}={}", f.var, f.value);
        }

        self.status.tow_pose_valid = report.lead.usable();
        self.status.tow_velocity_valid = report.lead.velocity_valid();
        self.status.range = report.range;
        self.status.range_actual = report.range_actual;
        self.status.relevance = report.relevance;
        self.status.closing = report.encounter.closing;
        self.status.cpa_ever = report.encounter.cpa_ever;
        self.status.completed = report.completed;
        self.status.side_lock = report.side_lock.map(|s| s.to_string());
        self.status.flags = report.flags.iter().map(|f| (f.var.clone(), f.value.clone())).collect();

        self.status.best = if report.relevance > 0.0 { self.score_grid() } else { None };
        &self.status
    }

    fn score_grid(&mut self) -> Option<BestDecision> {
        let scored = self.avoid.evaluate_grid(&self.grid);
        let pick = best(&scored)?;

        let min_util = self.avoid.config().utility.min_util;
        let cornered = scored.iter().all(|s| s.evaluation.utility <= min_util);
        if cornered && !self.cornered {
            warn!("⚠️ All {} candidates at minimum utility — no safe decision for the tow", scored.len());
        } else if !cornered && self.cornered {
            info!("✅ Safe candidates available again");
        }
        self.cornered = cornered;

        let breached = scored.iter().filter(|s| s.evaluation.verdict == Verdict::Breached).count();
        debug!(
            "🧭 best crs {:.0}° @ {:.1} m/s → {:.1} ({} of {} breach)",
            pick.decision.course_deg,
            pick.decision.speed,
            pick.evaluation.utility,
            breached,
            scored.len()
        );

        Some(BestDecision {
            course_deg: pick.decision.course_deg,
            speed: pick.decision.speed,
            utility: pick.evaluation.utility,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tow_core::flags::fmt_num;
    use tow_core::{AvoidanceConfig, PoseSample, Vec2, VesselPose};

    fn monitor() -> Monitor {
        let cfg = AvoidanceConfig::from_toml_str(
            r#"
            [obstacle]
            id = "rock"
            points = [[-10.0, 100.0], [10.0, 100.0], [10.0, 120.0], [-10.0, 120.0]]

            [[rng_flags]]
            var = "TOW_RANGE"
            value = "$[RNG]"
            "#,
        )
        .unwrap();
        Monitor::new(TowAvoidance::new(cfg).unwrap(), DecisionGrid::uniform(8, 1.0, 2.0, 2))
    }

    fn inputs(now: f64, tow_y: f64) -> CycleInputs {
        CycleInputs {
            now,
            vessel: Some(VesselPose::new(0.0, tow_y + 30.0, 0.0)),
            tow: PoseSample::stamped(0.0, tow_y, now),
            tow_velocity: Some(Vec2::new(0.0, 1.5)),
            ..Default::default()
        }
    }

    #[test]
    fn test_waits_for_first_publication() {
        let mut m = monitor();
        let s = m.step(None, 0, 0);
        assert_eq!(s.cycle, 1);
        assert!(!s.tow_pose_valid);
        assert!(s.best.is_none());
    }

    #[test]
    fn test_far_tow_is_not_scored() {
        let mut m = monitor();
        let s = m.step(Some(inputs(1.0, -400.0)), 1, 0);
        assert!(s.tow_pose_valid);
        assert_eq!(s.relevance, 0.0);
        assert!(s.best.is_none());
        assert_eq!(s.flags, vec![("TOW_RANGE".to_string(), fmt_num(s.range.unwrap()))]);
    }

    #[test]
    fn test_stale_tow_pose_reported_invalid() {
        let mut m = monitor();
        assert!(m.step(Some(inputs(1.0, 60.0)), 1, 0).tow_pose_valid);

        // tow fields stopped arriving; the vessel keeps publishing
        let mut frozen = inputs(4.0, 60.0);
        frozen.tow = PoseSample::stamped(0.0, 60.0, 1.0);
        let s = m.step(Some(frozen), 2, 0);
        assert!(!s.tow_pose_valid);
        assert_eq!(s.relevance, 0.0);
        assert!(s.best.is_none());
    }

    #[test]
    fn test_close_tow_scores_grid() {
        let mut m = monitor();
        m.step(Some(inputs(1.0, 60.0)), 1, 0);
        let s = m.step(Some(inputs(1.2, 60.3)), 2, 0);
        assert!(s.relevance > 0.0);
        let b = s.best.unwrap();
        assert!(b.utility > 0.0);
        assert_eq!(s.cycle, 2);
    }
}
