//! config.rs — Avoidance configuration
//!
//! Every section has defaults so a minimal file only needs the obstacle:
//!
//! ```toml
//! [obstacle]
//! id = "ob_1"
//! points = [[100.0, 100.0], [140.0, 100.0], [140.0, 140.0], [100.0, 140.0]]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cable::CableParams;
use crate::encounter::EncounterConfig;
use crate::error::{Result, TowError};
use crate::flags::{CpaFlag, RangeFlag};
use crate::geometry::ConvexPolygon;
use crate::lead::LeadConfig;
use crate::predictor::PredictorConfig;
use crate::relevance::RelevanceConfig;
use crate::utility::UtilityConfig;

/// Which bodies a candidate decision is scored against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalMode {
    /// Tow body clearance only
    #[default]
    TowOnly,
    /// Lower of tow and vessel clearance utilities
    Blended,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObstacleConfig {
    /// Label used for `$[OID]`
    #[serde(default)]
    pub id: String,
    /// Convex polygon vertices [x, y] (m)
    #[serde(default)]
    pub points: Vec<[f64; 2]>,
}

impl ObstacleConfig {
    /// `None` when no polygon is configured yet
    pub fn polygon(&self) -> Result<Option<ConvexPolygon>> {
        if self.points.is_empty() {
            return Ok(None);
        }
        Ok(Some(ConvexPolygon::from_points(&self.points)?.with_label(self.id.clone())))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AvoidanceConfig {
    pub mode: EvalMode,
    pub cable: CableParams,
    pub horizon: PredictorConfig,
    pub utility: UtilityConfig,
    pub lead: LeadConfig,
    pub relevance: RelevanceConfig,
    pub encounter: EncounterConfig,
    pub obstacle: ObstacleConfig,
    pub rng_flags: Vec<RangeFlag>,
    pub cpa_flags: Vec<CpaFlag>,
}

impl AvoidanceConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: AvoidanceConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| TowError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.cable.validate()?;
        self.horizon.validate()?;
        self.utility.validate()?;
        self.lead.validate()?;
        self.relevance.validate()?;
        self.encounter.validate()?;
        self.obstacle.polygon()?;
        for f in &self.rng_flags {
            if f.var.trim().is_empty() {
                return Err(TowError::Config("rng_flags entry with empty var".into()));
            }
        }
        for f in &self.cpa_flags {
            if f.var.trim().is_empty() {
                return Err(TowError::Config("cpa_flags entry with empty var".into()));
            }
        }
        Ok(())
    }
}
