//! utility.rs — Horizon result to bounded utility
//!
//! Piecewise-linear in predicted clearance, optionally suppressed when the
//! predicted tow speed drops toward a stall.

use serde::{Deserialize, Serialize};

use crate::cable::check_param;
use crate::error::{Result, TowError};
use crate::predictor::HorizonResult;

/// Slow-tow suppression. Only ever lowers utility.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TowSpeedPenalty {
    /// Soft threshold (m/s); below this utility is scaled down
    pub spd_min: f64,
    /// Hard floor (m/s); below this utility is forced to the minimum
    pub spd_hard_min: f64,
    /// Shaping exponent on the speed fraction
    pub power: f64,
    /// Smallest scale factor applied above the hard floor, in [0, 1]
    pub floor_factor: f64,
}

impl Default for TowSpeedPenalty {
    fn default() -> Self {
        Self { spd_min: 0.5, spd_hard_min: 0.0, power: 2.0, floor_factor: 0.2 }
    }
}

impl TowSpeedPenalty {
    pub fn validate(&self) -> Result<()> {
        check_param("utility.penalty.spd_min", self.spd_min, |v| v > 0.0)?;
        check_param("utility.penalty.spd_hard_min", self.spd_hard_min, |v| v >= 0.0)?;
        check_param("utility.penalty.power", self.power, |v| v > 0.0)?;
        check_param("utility.penalty.floor_factor", self.floor_factor, |v| (0.0..=1.0).contains(&v))?;
        Ok(())
    }

    /// Scale factor in [0, 1] for a predicted minimum tow speed
    pub fn factor(&self, min_tow_speed: f64) -> f64 {
        if min_tow_speed < self.spd_hard_min {
            return 0.0;
        }
        if min_tow_speed >= self.spd_min {
            return 1.0;
        }
        let frac = (min_tow_speed / self.spd_min).clamp(0.0, 1.0).powf(self.power);
        self.floor_factor + (1.0 - self.floor_factor) * frac
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UtilityConfig {
    pub min_util: f64,
    pub max_util: f64,
    /// Clearance at or below which utility is minimal (m)
    pub min_util_cpa: f64,
    /// Clearance at or above which utility is maximal (m)
    pub max_util_cpa: f64,
    pub penalty: Option<TowSpeedPenalty>,
}

impl Default for UtilityConfig {
    fn default() -> Self {
        Self { min_util: 0.0, max_util: 100.0, min_util_cpa: 5.0, max_util_cpa: 50.0, penalty: None }
    }
}

impl UtilityConfig {
    pub fn validate(&self) -> Result<()> {
        check_param("utility.min_util", self.min_util, |_| true)?;
        check_param("utility.max_util", self.max_util, |_| true)?;
        check_param("utility.min_util_cpa", self.min_util_cpa, |v| v >= 0.0)?;
        check_param("utility.max_util_cpa", self.max_util_cpa, |v| v >= 0.0)?;
        if self.min_util >= self.max_util {
            return Err(TowError::Config(format!(
                "min_util ({}) must be below max_util ({})", self.min_util, self.max_util
            )));
        }
        if self.min_util_cpa >= self.max_util_cpa {
            return Err(TowError::Config(format!(
                "min_util_cpa ({}) must be below max_util_cpa ({})", self.min_util_cpa, self.max_util_cpa
            )));
        }
        if let Some(p) = &self.penalty {
            p.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct UtilityMapper {
    config: UtilityConfig,
}

impl UtilityMapper {
    pub fn new(config: UtilityConfig) -> Self { Self { config } }

    pub fn config(&self) -> &UtilityConfig { &self.config }

    pub fn min_util(&self) -> f64 { self.config.min_util }
    pub fn max_util(&self) -> f64 { self.config.max_util }

    /// Utility of a clearance distance alone
    pub fn clearance_utility(&self, distance: f64) -> f64 {
        let c = &self.config;
        if !(distance > c.min_util_cpa) {
            return c.min_util;
        }
        if distance >= c.max_util_cpa {
            return c.max_util;
        }
        let t = (distance - c.min_util_cpa) / (c.max_util_cpa - c.min_util_cpa);
        c.min_util + t * (c.max_util - c.min_util)
    }

    /// Full mapping of a horizon run, including the optional speed penalty
    pub fn map(&self, result: &HorizonResult) -> f64 {
        let c = &self.config;
        if result.breached {
            return c.min_util;
        }
        let base = self.clearance_utility(result.min_distance);
        match &c.penalty {
            None => base,
            Some(p) => {
                let span = c.max_util - c.min_util;
                let norm = (base - c.min_util) / span;
                c.min_util + norm * p.factor(result.min_tow_speed) * span
            }
        }
    }
}
