//! encounter.rs — Closing/opening state machine and CPA events
//!
//! Tracks the minimum range while closing (CPA) and the maximum while opening
//! (FPA). A CPA event is the closing→opening transition, taken once the range
//! climbs more than the hysteresis band above the CPA seen so far.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cable::check_param;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncounterConfig {
    /// Hysteresis band for both transitions (m)
    pub hysteresis: f64,
    /// Subtracted from every range to the obstacle, floored at 0 (m)
    pub tow_pad: f64,
    /// Actual tow range beyond which the encounter is resolved (m)
    pub completed_dist: f64,
}

impl Default for EncounterConfig {
    fn default() -> Self {
        Self { hysteresis: 1.0, tow_pad: 0.0, completed_dist: 225.0 }
    }
}

impl EncounterConfig {
    pub fn validate(&self) -> Result<()> {
        check_param("encounter.hysteresis", self.hysteresis, |v| v >= 0.0)?;
        check_param("encounter.tow_pad", self.tow_pad, |v| v >= 0.0)?;
        check_param("encounter.completed_dist", self.completed_dist, |v| v >= 0.0)?;
        Ok(())
    }

    /// Obstacle distance reduced by the pad
    pub fn padded(&self, distance: f64) -> f64 { (distance - self.tow_pad).max(0.0) }
}

/// Snapshot of the tracker, `None` meaning unknown
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EncounterState {
    pub closing: bool,
    pub cpa_range_so_far: Option<f64>,
    pub fpa_range_so_far: Option<f64>,
    /// Smallest valid range ever observed; survives resets
    pub cpa_ever: Option<f64>,
    /// Value reported as `$[CPA]`
    pub cpa_reported: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CpaEvent {
    /// Minimum range of the closing phase that just ended
    pub cpa_range: f64,
    /// Range that triggered the transition
    pub range: f64,
}

#[derive(Debug, Clone)]
pub struct EncounterTracker {
    hysteresis: f64,
    /// Events only fire when the CPA is inside this range
    outer_dist: f64,
    state: EncounterState,
}

impl EncounterTracker {
    pub fn new(hysteresis: f64, outer_dist: f64) -> Self {
        Self { hysteresis, outer_dist, state: EncounterState::default() }
    }

    pub fn state(&self) -> &EncounterState { &self.state }

    pub fn closing(&self) -> bool { self.state.closing }

    /// Forget the current closing/opening phase. `cpa_ever` is kept.
    pub fn reset(&mut self) {
        self.state.closing = false;
        self.state.cpa_range_so_far = None;
        self.state.fpa_range_so_far = None;
    }

    /// Feed this cycle's range, or `None` when the tow pose is unusable.
    pub fn update(&mut self, range: Option<f64>) -> Option<CpaEvent> {
        let Some(range) = range.filter(|r| r.is_finite() && *r >= 0.0) else {
            self.reset();
            return None;
        };

        let s = &mut self.state;
        s.cpa_ever = Some(s.cpa_ever.map_or(range, |c| c.min(range)));
        s.cpa_reported = s.cpa_ever;

        let mut cpa = s.cpa_range_so_far.unwrap_or(range);
        let mut fpa = s.fpa_range_so_far.unwrap_or(range);
        let mut event = None;

        if s.closing {
            cpa = cpa.min(range);
            if range > cpa + self.hysteresis {
                s.closing = false;
                fpa = range;
                if cpa < self.outer_dist {
                    info!(cpa = format!("{:.1}", cpa), range = format!("{:.1}", range), "CPA event");
                    event = Some(CpaEvent { cpa_range: cpa, range });
                }
            }
        } else {
            fpa = fpa.max(range);
            if range < fpa - self.hysteresis {
                s.closing = true;
                cpa = range;
            }
        }

        s.cpa_range_so_far = Some(cpa);
        s.fpa_range_so_far = Some(fpa);
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn run(tracker: &mut EncounterTracker, ranges: &[f64]) -> Vec<CpaEvent> {
        ranges.iter().filter_map(|r| tracker.update(Some(*r))).collect()
    }

    #[test]
    fn test_single_cpa_event_at_minimum() {
        let mut t = EncounterTracker::new(1.0, 200.0);
        let events = run(&mut t, &[50.0, 40.0, 30.0, 20.0, 30.0, 40.0, 50.0]);
        assert_eq!(events.len(), 1);
        assert_relative_eq!(events[0].cpa_range, 20.0);
        assert_relative_eq!(events[0].range, 30.0);
        assert!(!t.closing());
        assert_eq!(t.state().cpa_ever, Some(20.0));
    }

    #[test]
    fn test_jitter_inside_band_no_event() {
        let mut t = EncounterTracker::new(1.0, 200.0);
        let events = run(&mut t, &[50.0, 40.0, 30.0, 30.5, 30.2, 30.9, 29.5]);
        assert!(events.is_empty());
        assert!(t.closing());
    }

    #[test]
    fn test_cpa_outside_outer_dist_is_silent() {
        let mut t = EncounterTracker::new(1.0, 10.0);
        let events = run(&mut t, &[50.0, 40.0, 30.0, 20.0, 30.0]);
        assert!(events.is_empty());
        assert!(!t.closing());
    }

    #[test]
    fn test_invalid_range_resets_phase_but_keeps_ever() {
        let mut t = EncounterTracker::new(1.0, 200.0);
        run(&mut t, &[50.0, 40.0, 30.0]);
        assert!(t.closing());
        assert!(t.update(None).is_none());
        let s = t.state();
        assert!(!s.closing);
        assert_eq!(s.cpa_range_so_far, None);
        assert_eq!(s.fpa_range_so_far, None);
        assert_eq!(s.cpa_ever, Some(30.0));

        // resuming at a larger range must not fire a stale event
        assert!(t.update(Some(45.0)).is_none());
    }

    #[test]
    fn test_two_passes_two_events() {
        let mut t = EncounterTracker::new(1.0, 200.0);
        let events = run(&mut t, &[60.0, 40.0, 25.0, 40.0, 60.0, 45.0, 15.0, 35.0]);
        assert_eq!(events.len(), 2);
        assert_relative_eq!(events[1].cpa_range, 15.0);
    }
}
