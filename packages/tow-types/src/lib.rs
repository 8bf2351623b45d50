//! # tow-types
//!
//! Shared wire structures for the tow avoidance suite.
//!
//! These types are used by:
//! - `tow-simulator`: publishing vessel, tow and cable state every tick
//! - `tow-monitor`: receiving publications and serving avoidance status
//!
//! ## Coordinate Conventions
//!
//! - **World frame**: local East-North Cartesian, x = East, y = North (meters)
//! - **Headings**: degrees true, 0 = North, 90 = East, clockwise
//! - **Stamps**: seconds on the publisher's simulation clock
//!
//! ## Invariants
//! - Every field in a publication carries its own stamp; X and Y of the same
//!   body may legitimately arrive with different stamps
//! - `seq_num` increases monotonically per source; receivers drop replays

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── Field names ───────────────────────────────────────────────────────────────

/// Scalar variables exchanged between the simulator and the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldName {
    /// Vessel position East (m)
    NavX,
    /// Vessel position North (m)
    NavY,
    /// Vessel heading (deg)
    NavHeading,
    /// Vessel speed over ground (m/s)
    NavSpeed,
    TowedX,
    TowedY,
    TowedVx,
    TowedVy,
    TowedHeading,
    TowedSpeed,
    /// Cable parameters, published when they change or periodically
    TowCableLength,
    TowAttachOffset,
    TowSpringStiffness,
    TowDragCoeff,
    TowTanDamping,
    /// Tow-to-anchor distance after the last step (m)
    CableDistance,
    /// Spring pull of the last step (m/s²)
    CableTension,
    /// 1 once the tow body has been released behind the vessel
    TowDeployed,
}

impl FieldName {
    pub const ALL: [FieldName; 18] = [
        FieldName::NavX,
        FieldName::NavY,
        FieldName::NavHeading,
        FieldName::NavSpeed,
        FieldName::TowedX,
        FieldName::TowedY,
        FieldName::TowedVx,
        FieldName::TowedVy,
        FieldName::TowedHeading,
        FieldName::TowedSpeed,
        FieldName::TowCableLength,
        FieldName::TowAttachOffset,
        FieldName::TowSpringStiffness,
        FieldName::TowDragCoeff,
        FieldName::TowTanDamping,
        FieldName::CableDistance,
        FieldName::CableTension,
        FieldName::TowDeployed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::NavX => "NAV_X",
            FieldName::NavY => "NAV_Y",
            FieldName::NavHeading => "NAV_HEADING",
            FieldName::NavSpeed => "NAV_SPEED",
            FieldName::TowedX => "TOWED_X",
            FieldName::TowedY => "TOWED_Y",
            FieldName::TowedVx => "TOWED_VX",
            FieldName::TowedVy => "TOWED_VY",
            FieldName::TowedHeading => "TOWED_HEADING",
            FieldName::TowedSpeed => "TOWED_SPEED",
            FieldName::TowCableLength => "TOW_CABLE_LENGTH",
            FieldName::TowAttachOffset => "TOW_ATTACH_OFFSET",
            FieldName::TowSpringStiffness => "TOW_SPRING_STIFFNESS",
            FieldName::TowDragCoeff => "TOW_DRAG_COEFF",
            FieldName::TowTanDamping => "TOW_TAN_DAMPING",
            FieldName::CableDistance => "CABLE_DISTANCE",
            FieldName::CableTension => "CABLE_TENSION",
            FieldName::TowDeployed => "TOW_DEPLOYED",
        }
    }

    /// Cable-parameter fields a receiver may apply as live overrides
    pub fn is_cable_param(&self) -> bool {
        matches!(
            self,
            FieldName::TowCableLength
                | FieldName::TowAttachOffset
                | FieldName::TowSpringStiffness
                | FieldName::TowDragCoeff
                | FieldName::TowTanDamping
        )
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldName::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("unknown field name: {s}"))
    }
}

// ── Publication envelope ──────────────────────────────────────────────────────

/// One stamped scalar value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalarField {
    pub name: FieldName,
    pub value: f64,
    /// Publisher clock time of the reading (s)
    pub stamp: f64,
}

/// Datagram sent by a publisher each tick (UDP, JSON encoded).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TowPublication {
    /// Publisher identity, e.g. "tow-sim"
    pub source: String,
    /// Monotonically increasing per-source sequence number.
    pub seq_num: u32,
    /// Publisher clock time when the datagram was assembled (s)
    pub sent_at: f64,
    pub fields: Vec<ScalarField>,
}

impl TowPublication {
    pub fn new(source: impl Into<String>, seq_num: u32, sent_at: f64) -> Self {
        Self { source: source.into(), seq_num, sent_at, fields: Vec::new() }
    }

    pub fn push(&mut self, name: FieldName, value: f64, stamp: f64) {
        self.fields.push(ScalarField { name, value, stamp });
    }

    /// Last value published for `name` in this datagram
    pub fn get(&self, name: FieldName) -> Option<&ScalarField> {
        self.fields.iter().rev().find(|f| f.name == name)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(buf)
    }
}

// ── Monitor status (monitor → clients) ───────────────────────────────────────

/// Best-scoring candidate of the last evaluated grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BestDecision {
    pub course_deg: f64,
    pub speed: f64,
    pub utility: f64,
}

/// Snapshot served by the monitor's `/status` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AvoidanceStatus {
    /// Monitor cycle counter
    pub cycle: u64,
    /// Publications accepted / dropped as replays
    pub accepted: u64,
    pub dropped: u64,
    /// Tow pose present, fresh and with X/Y stamps in sync
    pub tow_pose_valid: bool,
    pub tow_velocity_valid: bool,
    /// Lead-point range to the obstacle (m)
    pub range: Option<f64>,
    /// Actual tow range to the obstacle (m)
    pub range_actual: Option<f64>,
    pub relevance: f64,
    pub closing: bool,
    pub cpa_ever: Option<f64>,
    pub completed: bool,
    pub side_lock: Option<String>,
    pub best: Option<BestDecision>,
    /// Flags posted during the last cycle as (variable, value)
    pub flags: Vec<(String, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_on_wire() {
        for f in FieldName::ALL {
            let json = serde_json::to_string(&f).unwrap();
            assert_eq!(json, format!("\"{}\"", f.as_str()));
            assert_eq!(f.as_str().parse::<FieldName>().unwrap(), f);
        }
        assert!("TOWED_Z".parse::<FieldName>().is_err());
    }

    #[test]
    fn test_publication_json() {
        let mut p = TowPublication::new("tow-sim", 7, 12.5);
        p.push(FieldName::TowedX, 3.0, 12.4);
        p.push(FieldName::TowedY, -4.0, 12.5);
        p.push(FieldName::TowedX, 3.5, 12.5);

        let back = TowPublication::from_bytes(&p.to_bytes().unwrap()).unwrap();
        assert_eq!(back.seq_num, 7);
        assert_eq!(back.get(FieldName::TowedX).map(|f| f.value), Some(3.5));
        assert!(back.get(FieldName::NavX).is_none());

        let raw = String::from_utf8(p.to_bytes().unwrap()).unwrap();
        assert!(raw.contains("\"TOWED_Y\""));
    }

    #[test]
    fn test_cable_param_fields() {
        let params: Vec<_> = FieldName::ALL.iter().filter(|f| f.is_cable_param()).collect();
        assert_eq!(params.len(), 5);
        assert!(!FieldName::CableTension.is_cable_param());
    }
}
