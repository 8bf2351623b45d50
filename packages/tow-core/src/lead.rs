//! lead.rs — Lead-point estimation from noisy tow position samples
//!
//! Tow X and Y arrive as independent, individually-stamped publications that
//! can drop out, lag each other or jump. The estimator only differentiates
//! position across paired, fresh, plausibly-spaced samples and low-pass
//! filters the result before projecting a lead point ahead of the tow.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cable::check_param;
use crate::error::{Result, TowError};
use crate::geometry::Vec2;

/// Minimum stamp advance for a stamped sample to count as new (s)
const STAMP_EPS: f64 = 1e-6;

// ── Inputs ────────────────────────────────────────────────────────────────────

/// One scalar reading with its publication time, if known
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisSample {
    pub value: f64,
    pub stamp: Option<f64>,
}

impl AxisSample {
    pub fn new(value: f64, stamp: f64) -> Self { Self { value, stamp: Some(stamp) } }
    pub fn unstamped(value: f64) -> Self { Self { value, stamp: None } }
}

/// Latest tow X/Y readings available this cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    pub x: Option<AxisSample>,
    pub y: Option<AxisSample>,
}

impl PoseSample {
    pub fn stamped(x: f64, y: f64, stamp: f64) -> Self {
        Self { x: Some(AxisSample::new(x, stamp)), y: Some(AxisSample::new(y, stamp)) }
    }

    pub fn position(&self) -> Option<Vec2> {
        match (self.x, self.y) {
            (Some(x), Some(y)) => Some(Vec2::new(x.value, y.value)),
            _ => None,
        }
    }
}

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LeadConfig {
    /// Project a lead point at all
    pub enabled: bool,
    /// Projection time (s)
    pub lead_secs: f64,
    /// Low-pass weight on the newest instantaneous velocity, in (0, 1]
    pub alpha: f64,
    /// Plausibility cap on instantaneous and filtered speed (m/s)
    pub max_speed: f64,
    /// A pose older than this is stale (s)
    pub stale_after: f64,
    /// Largest X/Y stamp difference still considered paired (s)
    pub sync_eps: f64,
    /// Shortest usable sample interval (s)
    pub min_interval: f64,
    /// Longest usable sample interval (s); capped by `stale_after`
    pub max_interval: f64,
}

impl Default for LeadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lead_secs: 6.0,
            alpha: 0.3,
            max_speed: 3.0,
            stale_after: 1.0,
            sync_eps: 0.10,
            min_interval: 0.05,
            max_interval: 2.0,
        }
    }
}

impl LeadConfig {
    pub fn validate(&self) -> Result<()> {
        check_param("lead.lead_secs", self.lead_secs, |v| v >= 0.0)?;
        check_param("lead.alpha", self.alpha, |v| v > 0.0 && v <= 1.0)?;
        check_param("lead.max_speed", self.max_speed, |v| v > 0.0)?;
        check_param("lead.stale_after", self.stale_after, |v| v > 0.0)?;
        check_param("lead.sync_eps", self.sync_eps, |v| v >= 0.0)?;
        check_param("lead.min_interval", self.min_interval, |v| v >= 0.0)?;
        check_param("lead.max_interval", self.max_interval, |v| v > 0.0)?;
        if self.min_interval >= self.max_gap() {
            return Err(TowError::Config(format!(
                "lead.min_interval ({}) must be below the usable gap ({})", self.min_interval, self.max_gap()
            )));
        }
        Ok(())
    }

    /// Longest interval across which velocity is still computed
    pub fn max_gap(&self) -> f64 { self.max_interval.min(self.stale_after) }
}

// ── Output ────────────────────────────────────────────────────────────────────

/// Why the current sample did not update the velocity filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum SampleRejection {
    /// X and Y stamps too far apart (s)
    Unsynced(f64),
    /// Closer than `min_interval` to the anchor (s)
    IntervalTooShort(f64),
    /// Longer than the usable gap; anchor restarted (s)
    IntervalTooLong(f64),
    /// Instantaneous speed above the cap (m/s)
    ImplausibleSpeed(f64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LeadEstimate {
    /// Both X and Y present this cycle
    pub pose_valid: bool,
    /// Newest component no older than `stale_after`
    pub fresh: bool,
    /// X/Y stamps paired (true when unstamped)
    pub synced: bool,
    pub raw_position: Option<Vec2>,
    /// Filtered velocity, present only while valid
    pub filtered_velocity: Option<Vec2>,
    /// Raw pose projected by the filtered velocity, else the raw pose
    pub lead_position: Option<Vec2>,
    pub last_accepted_stamp: Option<f64>,
    pub rejection: Option<SampleRejection>,
}

impl LeadEstimate {
    pub fn velocity_valid(&self) -> bool { self.filtered_velocity.is_some() }

    /// Pose is trustworthy enough to drive range bookkeeping
    pub fn usable(&self) -> bool { self.pose_valid && self.fresh && self.synced }
}

// ── Estimator ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Anchor {
    position: Vec2,
    stamp: f64,
}

#[derive(Debug, Clone, Default)]
pub struct LeadPointEstimator {
    config: LeadConfig,
    anchor: Option<Anchor>,
    velocity: Option<Vec2>,
    /// Warn once per run of unsynced samples
    unsynced_warned: bool,
}

impl LeadPointEstimator {
    pub fn new(config: LeadConfig) -> Self {
        Self { config, anchor: None, velocity: None, unsynced_warned: false }
    }

    pub fn config(&self) -> &LeadConfig { &self.config }

    pub fn reset(&mut self) {
        self.anchor = None;
        self.velocity = None;
    }

    /// Consume this cycle's readings. `now` is the current time in the same
    /// clock as the sample stamps.
    pub fn update(&mut self, sample: &PoseSample, now: f64) -> LeadEstimate {
        let mut est = LeadEstimate {
            last_accepted_stamp: self.anchor.map(|a| a.stamp),
            ..Default::default()
        };

        let (Some(x), Some(y)) = (sample.x, sample.y) else {
            return est;
        };
        let pos = Vec2::new(x.value, y.value);
        if !pos.is_finite() {
            debug!(x = x.value, y = y.value, "non-finite tow pose ignored");
            return est;
        }
        est.pose_valid = true;
        est.raw_position = Some(pos);
        est.lead_position = Some(pos);

        let pose_time = match (x.stamp, y.stamp) {
            (Some(tx), Some(ty)) => tx.max(ty),
            (Some(t), None) | (None, Some(t)) => t,
            (None, None) => now,
        };
        est.synced = match (x.stamp, y.stamp) {
            (Some(tx), Some(ty)) => (tx - ty).abs() <= self.config.sync_eps,
            _ => true,
        };
        est.fresh = now - pose_time <= self.config.stale_after;

        if !est.fresh {
            self.velocity = None;
            return est;
        }
        if self.anchor.is_some_and(|a| pose_time + self.config.max_gap() < a.stamp) {
            debug!(pose_time, "tow stamps went backwards, restarting velocity estimate");
            self.reset();
        }
        if !self.config.enabled || self.config.lead_secs <= 0.0 {
            return est;
        }

        let is_new = match (self.anchor, x.stamp, y.stamp) {
            (None, _, _) => est.synced,
            (Some(a), Some(tx), Some(ty)) => {
                est.synced && tx > a.stamp + STAMP_EPS && ty > a.stamp + STAMP_EPS
            }
            (Some(a), _, _) => pose_time > a.stamp + self.config.min_interval,
        };
        if !est.synced {
            if let (Some(tx), Some(ty)) = (x.stamp, y.stamp) {
                let dt = (tx - ty).abs();
                if !self.unsynced_warned {
                    warn!(dt, "unsynced tow pose sample ignored");
                    self.unsynced_warned = true;
                }
                est.rejection = Some(SampleRejection::Unsynced(dt));
            }
        } else {
            self.unsynced_warned = false;
        }

        if is_new {
            est.rejection = self.absorb(pos, pose_time);
        }

        est.last_accepted_stamp = self.anchor.map(|a| a.stamp);
        if let Some(v) = self.velocity {
            est.filtered_velocity = Some(v);
            est.lead_position = Some(pos + v * self.config.lead_secs);
        }
        est
    }

    fn absorb(&mut self, pos: Vec2, stamp: f64) -> Option<SampleRejection> {
        let Some(anchor) = self.anchor else {
            self.anchor = Some(Anchor { position: pos, stamp });
            self.velocity = None;
            return None;
        };

        let dt = stamp - anchor.stamp;
        if dt <= self.config.min_interval {
            return Some(SampleRejection::IntervalTooShort(dt));
        }
        if dt > self.config.max_gap() {
            debug!(dt, "tow sample gap too long, restarting velocity estimate");
            self.anchor = Some(Anchor { position: pos, stamp });
            self.velocity = None;
            return Some(SampleRejection::IntervalTooLong(dt));
        }

        let inst = (pos - anchor.position) * (1.0 / dt);
        let inst_speed = inst.norm();
        if inst_speed > self.config.max_speed {
            warn!(
                speed = format!("{:.2}", inst_speed),
                cap = self.config.max_speed,
                "implausible tow speed, sample rejected"
            );
            self.velocity = None;
            return Some(SampleRejection::ImplausibleSpeed(inst_speed));
        }

        let alpha = self.config.alpha;
        let mut v = match self.velocity {
            None => inst,
            Some(prev) => inst * alpha + prev * (1.0 - alpha),
        };
        let filt_speed = v.norm();
        if filt_speed > self.config.max_speed {
            v = v * (self.config.max_speed / filt_speed);
        }
        self.velocity = Some(v);
        self.anchor = Some(Anchor { position: pos, stamp });
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn est() -> LeadPointEstimator { LeadPointEstimator::default() }

    #[test]
    fn test_missing_axis_invalidates_pose() {
        let mut e = est();
        let s = PoseSample { x: Some(AxisSample::new(1.0, 0.0)), y: None };
        let out = e.update(&s, 0.0);
        assert!(!out.pose_valid);
        assert!(out.lead_position.is_none());
    }

    #[test]
    fn test_first_sample_anchors_without_velocity() {
        let mut e = est();
        let out = e.update(&PoseSample::stamped(0.0, 0.0, 10.0), 10.0);
        assert!(out.pose_valid && out.fresh && out.synced);
        assert!(!out.velocity_valid());
        assert_eq!(out.last_accepted_stamp, Some(10.0));
        assert_eq!(out.lead_position, Some(Vec2::ZERO));
    }

    #[test]
    fn test_second_sample_initializes_filter_then_smooths() {
        let mut e = est();
        e.update(&PoseSample::stamped(0.0, 0.0, 10.0), 10.0);
        let out = e.update(&PoseSample::stamped(1.0, 0.0, 11.0), 11.0);
        let v = out.filtered_velocity.unwrap();
        assert_relative_eq!(v.x, 1.0);
        assert_relative_eq!(out.lead_position.unwrap().x, 7.0);

        let out = e.update(&PoseSample::stamped(3.0, 0.0, 12.0), 12.0);
        // 0.3 * 2 + 0.7 * 1
        assert_relative_eq!(out.filtered_velocity.unwrap().x, 1.3, epsilon = 1e-12);
    }

    #[test]
    fn test_stale_pose_has_no_lead() {
        let mut e = est();
        e.update(&PoseSample::stamped(0.0, 0.0, 10.0), 10.0);
        e.update(&PoseSample::stamped(1.0, 0.0, 10.5), 10.5);
        let out = e.update(&PoseSample::stamped(1.0, 0.0, 10.5), 12.0);
        assert!(out.pose_valid);
        assert!(!out.fresh);
        assert!(!out.velocity_valid());
        assert_eq!(out.lead_position, Some(Vec2::new(1.0, 0.0)));
    }

    #[test]
    fn test_repeated_stamp_keeps_velocity_without_refiltering() {
        let mut e = est();
        e.update(&PoseSample::stamped(0.0, 0.0, 10.0), 10.0);
        e.update(&PoseSample::stamped(1.0, 0.0, 11.0), 11.0);
        let out = e.update(&PoseSample::stamped(1.0, 0.0, 11.0), 11.2);
        assert_relative_eq!(out.filtered_velocity.unwrap().x, 1.0);
        assert!(out.rejection.is_none());
    }

    #[test]
    fn test_teleport_rejected_anchor_kept() {
        let mut e = est();
        e.update(&PoseSample::stamped(0.0, 0.0, 10.0), 10.0);
        e.update(&PoseSample::stamped(1.0, 0.0, 11.0), 11.0);
        let out = e.update(&PoseSample::stamped(50.0, 0.0, 11.5), 11.5);
        assert!(matches!(out.rejection, Some(SampleRejection::ImplausibleSpeed(_))));
        assert!(!out.velocity_valid());
        assert_eq!(out.last_accepted_stamp, Some(11.0));

        // good data resumes against the kept anchor
        let out = e.update(&PoseSample::stamped(2.0, 0.0, 12.0), 12.0);
        assert_relative_eq!(out.filtered_velocity.unwrap().x, 1.0);
    }

    #[test]
    fn test_unsynced_stamps_not_new() {
        let mut e = est();
        e.update(&PoseSample::stamped(0.0, 0.0, 10.0), 10.0);
        let s = PoseSample { x: Some(AxisSample::new(1.0, 11.0)), y: Some(AxisSample::new(0.0, 10.5)) };
        let out = e.update(&s, 11.0);
        assert!(!out.synced);
        assert!(matches!(out.rejection, Some(SampleRejection::Unsynced(_))));
        assert_eq!(out.last_accepted_stamp, Some(10.0));
    }

    #[test]
    fn test_unsynced_run_keeps_anchor_and_warns_once() {
        let mut e = est();
        e.update(&PoseSample::stamped(0.0, 0.0, 10.0), 10.0);
        e.update(&PoseSample::stamped(1.0, 0.0, 11.0), 11.0);

        let skewed = |t: f64| PoseSample {
            x: Some(AxisSample::new(40.0, t)),
            y: Some(AxisSample::new(0.0, t - 0.3)),
        };
        for t in [11.2, 11.4, 11.6] {
            let out = e.update(&skewed(t), t);
            match out.rejection {
                Some(SampleRejection::Unsynced(dt)) => assert_relative_eq!(dt, 0.3, epsilon = 1e-9),
                other => panic!("expected Unsynced, got {other:?}"),
            }
            assert_eq!(out.last_accepted_stamp, Some(11.0));
            assert_relative_eq!(out.filtered_velocity.unwrap().x, 1.0);
            assert!(e.unsynced_warned);
        }

        let out = e.update(&PoseSample::stamped(2.0, 0.0, 12.0), 12.0);
        assert!(out.rejection.is_none());
        assert!(!e.unsynced_warned);
        assert_relative_eq!(out.filtered_velocity.unwrap().x, 1.0);
    }

    #[test]
    fn test_long_gap_reanchors() {
        let cfg = LeadConfig { stale_after: 5.0, ..Default::default() };
        let mut e = LeadPointEstimator::new(cfg);
        e.update(&PoseSample::stamped(0.0, 0.0, 10.0), 10.0);
        let out = e.update(&PoseSample::stamped(3.0, 0.0, 13.0), 13.0);
        assert!(matches!(out.rejection, Some(SampleRejection::IntervalTooLong(_))));
        assert_eq!(out.last_accepted_stamp, Some(13.0));
        let out = e.update(&PoseSample::stamped(4.0, 0.0, 14.0), 14.0);
        assert_relative_eq!(out.filtered_velocity.unwrap().x, 1.0);
    }

    #[test]
    fn test_clock_restart_reanchors() {
        let mut e = est();
        e.update(&PoseSample::stamped(0.0, 0.0, 300.0), 300.0);
        e.update(&PoseSample::stamped(1.0, 0.0, 301.0), 301.0);
        let out = e.update(&PoseSample::stamped(5.0, 0.0, 0.1), 0.1);
        assert!(!out.velocity_valid());
        assert_eq!(out.last_accepted_stamp, Some(0.1));
        let out = e.update(&PoseSample::stamped(5.5, 0.0, 0.6), 0.6);
        assert_relative_eq!(out.filtered_velocity.unwrap().x, 1.0);
    }

    #[test]
    fn test_unstamped_uses_wall_time() {
        let mut e = est();
        let s = |x: f64| PoseSample { x: Some(AxisSample::unstamped(x)), y: Some(AxisSample::unstamped(0.0)) };
        e.update(&s(0.0), 1.0);
        let out = e.update(&s(0.5), 1.5);
        assert_relative_eq!(out.filtered_velocity.unwrap().x, 1.0);
    }

    #[test]
    fn test_filtered_speed_capped() {
        let cfg = LeadConfig { alpha: 1.0, ..Default::default() };
        let mut e = LeadPointEstimator::new(cfg);
        e.update(&PoseSample::stamped(0.0, 0.0, 10.0), 10.0);
        let out = e.update(&PoseSample::stamped(2.9, 0.0, 11.0), 11.0);
        assert!(out.filtered_velocity.unwrap().norm() <= 3.0);
    }

    #[test]
    fn test_validate_gap_ordering() {
        assert!(LeadConfig::default().validate().is_ok());
        let bad = LeadConfig { min_interval: 1.5, stale_after: 1.0, ..Default::default() };
        assert!(bad.validate().is_err());
    }
}
