//! relevance.rs — Range-based weighting of the avoidance objective

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cable::check_param;
use crate::error::Result;
use crate::geometry::{angle_diff, vector_heading, Vec2};

/// Shaping applied to the raw linear ramp
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevanceGrade {
    #[default]
    Linear,
    Quadratic,
    Quasi,
}

impl RelevanceGrade {
    pub fn apply(self, raw: f64) -> f64 {
        match self {
            RelevanceGrade::Linear => raw,
            RelevanceGrade::Quadratic => raw * raw,
            RelevanceGrade::Quasi => raw.powf(1.5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelevanceConfig {
    /// Full relevance at or inside this range (m)
    pub pwt_inner_dist: f64,
    /// Zero relevance at or beyond this range (m)
    pub pwt_outer_dist: f64,
    pub grade: RelevanceGrade,
    /// Raw relevance above which a passing side is locked
    pub side_lock_threshold: f64,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self { pwt_inner_dist: 50.0, pwt_outer_dist: 200.0, grade: RelevanceGrade::Linear, side_lock_threshold: 0.6 }
    }
}

impl RelevanceConfig {
    pub fn validate(&self) -> Result<()> {
        check_param("relevance.pwt_inner_dist", self.pwt_inner_dist, |v| v >= 0.0)?;
        check_param("relevance.pwt_outer_dist", self.pwt_outer_dist, |v| v >= 0.0)?;
        check_param("relevance.side_lock_threshold", self.side_lock_threshold, |v| (0.0..=1.0).contains(&v))?;
        Ok(())
    }

    /// Effective outer distance; a collapsed band gets a minimal width
    pub fn outer(&self) -> f64 {
        if self.pwt_outer_dist <= self.pwt_inner_dist {
            self.pwt_inner_dist + 0.001
        } else {
            self.pwt_outer_dist
        }
    }

    /// Linear ramp: 1 inside inner, 0 beyond outer
    pub fn raw(&self, range: f64) -> f64 {
        let inner = self.pwt_inner_dist;
        let outer = self.outer();
        if range >= outer {
            0.0
        } else if range <= inner {
            1.0
        } else {
            (outer - range) / (outer - inner)
        }
    }

    pub fn relevance(&self, range: f64) -> f64 {
        self.grade.apply(self.raw(range))
    }
}

// ── Passing side ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Port,
    Starboard,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Port => Side::Starboard,
            Side::Starboard => Side::Port,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Port => write!(f, "port"),
            Side::Starboard => write!(f, "star"),
        }
    }
}

/// Side of a body moving along `heading_deg` at `from` on which `target` lies.
/// `None` when the target is dead ahead, dead astern or co-located.
pub fn side_of(from: Vec2, heading_deg: f64, target: Vec2) -> Option<Side> {
    let to = target - from;
    if to.norm() < 1e-6 {
        return None;
    }
    let rel = angle_diff(vector_heading(to), heading_deg);
    if rel.abs() < 1e-3 || (180.0 - rel.abs()) < 1e-3 {
        None
    } else if rel > 0.0 {
        Some(Side::Starboard)
    } else {
        Some(Side::Port)
    }
}

/// Latched passing side, held while relevance stays above the threshold
#[derive(Debug, Clone, Default)]
pub struct SideLock {
    locked: Option<Side>,
}

impl SideLock {
    pub fn get(&self) -> Option<Side> { self.locked }

    pub fn clear(&mut self) { self.locked = None; }

    /// Lock onto the side away from the obstacle the first time `raw`
    /// exceeds `threshold`; release once it drops back.
    pub fn update(&mut self, raw: f64, threshold: f64, obstacle_side: impl FnOnce() -> Option<Side>) -> Option<Side> {
        if raw > threshold {
            if self.locked.is_none() {
                self.locked = obstacle_side().map(Side::opposite);
            }
        } else {
            self.locked = None;
        }
        self.locked
    }
}
