//! field_buffer.rs — Latest stamped value of every published field
//!
//! The hub writes every accepted publication here; the cycle loop reads a
//! consistent `CycleInputs` snapshot once per control cycle. The buffer also
//! keeps the publisher clock: the monitor's notion of "now" is the last
//! `sent_at` plus the wall time elapsed since that datagram arrived, so a
//! silent publisher makes every stamp go stale.

use std::collections::HashMap;
use std::time::Instant;

use tow_core::{AxisSample, CableOverrides, CycleInputs, PoseSample, Vec2, VesselPose};
use tow_types::{FieldName, ScalarField, TowPublication};
use tracing::info;

/// A datagram stamped this far behind the clock means the publisher restarted
const CLOCK_REWIND_S: f64 = 2.0;

#[derive(Debug, Default)]
pub struct FieldBuffer {
    latest: HashMap<FieldName, ScalarField>,
    /// Publisher clock at the last datagram and when it arrived here
    clock: Option<(f64, Instant)>,
    pub accepted: u64,
    pub dropped: u64,
}

impl FieldBuffer {
    pub fn new() -> Self { Self::default() }

    /// Store every field of an accepted publication
    pub fn ingest(&mut self, publication: &TowPublication, received: Instant) {
        if let Some((t, _)) = self.clock {
            if publication.sent_at < t - CLOCK_REWIND_S {
                info!("🔄 Publisher clock went back {:.1}s — clearing field buffer", t - publication.sent_at);
                self.clear();
            }
        }
        for f in &publication.fields {
            if f.value.is_finite() && f.stamp.is_finite() {
                self.latest.insert(f.name, *f);
            }
        }
        if publication.sent_at.is_finite() {
            let newer = self.clock.map_or(true, |(t, _)| publication.sent_at >= t);
            if newer {
                self.clock = Some((publication.sent_at, received));
            }
        }
        self.accepted += 1;
    }

    pub fn get(&self, name: FieldName) -> Option<&ScalarField> {
        self.latest.get(&name)
    }

    fn value(&self, name: FieldName) -> Option<f64> {
        self.get(name).map(|f| f.value)
    }

    /// Publisher-clock time at `at`, or `None` before the first datagram
    pub fn now(&self, at: Instant) -> Option<f64> {
        self.clock.map(|(t, rx)| t + at.saturating_duration_since(rx).as_secs_f64())
    }

    /// Forget everything, e.g. after the publisher restarted its clock
    pub fn clear(&mut self) {
        self.latest.clear();
        self.clock = None;
    }

    /// Snapshot for one avoidance cycle
    pub fn inputs(&self, at: Instant) -> Option<CycleInputs> {
        let now = self.now(at)?;

        let vessel = match (self.value(FieldName::NavX), self.value(FieldName::NavY), self.value(FieldName::NavHeading)) {
            (Some(x), Some(y), Some(h)) => Some(VesselPose::new(x, y, h)),
            _ => None,
        };

        let axis = |name| self.get(name).map(|f| AxisSample::new(f.value, f.stamp));
        let tow = PoseSample { x: axis(FieldName::TowedX), y: axis(FieldName::TowedY) };

        let tow_velocity = self
            .value(FieldName::TowedVx)
            .zip(self.value(FieldName::TowedVy))
            .map(|(vx, vy)| Vec2::new(vx, vy));

        let overrides = CableOverrides {
            length: self.value(FieldName::TowCableLength),
            attach_offset: self.value(FieldName::TowAttachOffset),
            spring_stiffness: self.value(FieldName::TowSpringStiffness),
            drag_coeff: self.value(FieldName::TowDragCoeff),
            tangential_damping: self.value(FieldName::TowTanDamping),
        };

        Some(CycleInputs { now, vessel, tow, tow_velocity, overrides })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::time::Duration;

    fn publication(seq: u32, t: f64) -> TowPublication {
        let mut p = TowPublication::new("tow-sim", seq, t);
        p.push(FieldName::NavX, 0.0, t);
        p.push(FieldName::NavY, 10.0, t);
        p.push(FieldName::NavHeading, 90.0, t);
        p.push(FieldName::TowedX, -30.0, t);
        p.push(FieldName::TowedY, 10.0, t - 0.2);
        p
    }

    #[test]
    fn test_no_inputs_before_first_datagram() {
        assert!(FieldBuffer::new().inputs(Instant::now()).is_none());
    }

    #[test]
    fn test_snapshot_keeps_per_axis_stamps() {
        let mut buf = FieldBuffer::new();
        let rx = Instant::now();
        buf.ingest(&publication(1, 5.0), rx);

        let inputs = buf.inputs(rx + Duration::from_millis(500)).unwrap();
        assert_relative_eq!(inputs.now, 5.5, epsilon = 1e-9);
        assert_eq!(inputs.vessel.unwrap().heading_deg, 90.0);
        assert_eq!(inputs.tow.x.unwrap().stamp, Some(5.0));
        assert_eq!(inputs.tow.y.unwrap().stamp, Some(4.8));
        assert!(inputs.tow_velocity.is_none());
        assert!(inputs.overrides.length.is_none());
        assert_eq!(buf.accepted, 1);
    }

    #[test]
    fn test_older_datagram_does_not_rewind_clock() {
        let mut buf = FieldBuffer::new();
        let rx = Instant::now();
        buf.ingest(&publication(2, 8.0), rx);
        buf.ingest(&publication(1, 7.0), rx);
        assert_relative_eq!(buf.now(rx).unwrap(), 8.0);

        // publisher reset its clock
        let mut p = TowPublication::new("tow-sim", 3, 0.1);
        p.push(FieldName::TowedX, 1.0, 0.1);
        buf.ingest(&p, rx);
        assert_relative_eq!(buf.now(rx).unwrap(), 0.1);
        assert!(buf.get(FieldName::NavX).is_none());
        assert_eq!(buf.accepted, 3);
    }

    #[test]
    fn test_cable_fields_become_overrides() {
        let mut buf = FieldBuffer::new();
        let mut p = publication(1, 1.0);
        p.push(FieldName::TowCableLength, 45.0, 1.0);
        p.push(FieldName::TowedVx, 1.0, 1.0);
        p.push(FieldName::TowedVy, f64::NAN, 1.0);
        let rx = Instant::now();
        buf.ingest(&p, rx);

        let inputs = buf.inputs(rx).unwrap();
        assert_eq!(inputs.overrides.length, Some(45.0));
        assert!(inputs.tow_velocity.is_none());
        buf.clear();
        assert!(buf.inputs(rx).is_none());
    }
}
