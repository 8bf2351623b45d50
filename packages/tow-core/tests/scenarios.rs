//! End-to-end scenarios across the public tow-core API.

use approx::{assert_abs_diff_eq, assert_relative_eq};
use tow_core::cable::{self, CableParams, TowState};
use tow_core::encounter::EncounterTracker;
use tow_core::lead::{LeadPointEstimator, PoseSample};
use tow_core::predictor::{HorizonPredictor, PredictorConfig};
use tow_core::utility::UtilityMapper;
use tow_core::{
    best, AvoidanceConfig, CycleInputs, Decision, DecisionGrid, HorizonResult, TowAvoidance, Vec2,
    Verdict, VesselPose,
};

#[test]
fn rigid_clamp_scenario() {
    let params = CableParams::default();
    let anchor = Vec2::ZERO;
    let mut st = TowState::at_rest(50.0, 0.0);

    // spring pull 5·20·0.1 = 10 m/s, drag keeps 30% of it, clamp lands on L
    let first = cable::step(&mut st, anchor, 0.1, &params);
    assert!(first.clamped);
    assert_relative_eq!(first.separation, 30.0, epsilon = 1e-9);
    assert_relative_eq!(first.tension, 100.0, epsilon = 1e-9);
    assert_relative_eq!(st.position.x, 30.0, epsilon = 1e-9);
    assert_relative_eq!(st.velocity.x, -3.0, epsilon = 1e-9);

    let mut last_speed = st.speed();
    for _ in 0..300 {
        let r = cable::step(&mut st, anchor, 0.1, &params);
        assert!(r.separation <= 30.0 + 1e-9);
        assert!(st.speed() <= last_speed + 1e-12);
        assert_abs_diff_eq!(st.position.y, 0.0, epsilon = 1e-9);
        last_speed = st.speed();
    }
    // slack coast under quadratic drag only: 30 m minus the 30 s drift
    assert_relative_eq!(last_speed, 0.046223, epsilon = 1e-5);
    assert_relative_eq!(st.position.dist(anchor), 24.494722, epsilon = 1e-5);
}

#[test]
fn utility_bounds_scenario() {
    let m = UtilityMapper::default();
    let r = |d: f64| HorizonResult { min_distance: d, min_tow_speed: 1.0, breached: false, min_vessel_distance: d, steps: 1 };
    assert_relative_eq!(m.map(&r(5.0)), 0.0);
    assert_relative_eq!(m.map(&r(50.0)), 100.0);
    assert_relative_eq!(m.map(&r(27.5)), 50.0);
}

#[test]
fn cpa_hysteresis_scenario() {
    let mut t = EncounterTracker::new(1.0, 200.0);
    let events: Vec<_> = [50.0, 40.0, 30.0, 20.0, 30.0, 40.0, 50.0]
        .iter()
        .filter_map(|r| t.update(Some(*r)))
        .collect();
    assert_eq!(events.len(), 1);
    assert_relative_eq!(events[0].cpa_range, 20.0);
}

#[test]
fn lead_staleness_scenario() {
    let mut e = LeadPointEstimator::default();
    e.update(&PoseSample::stamped(0.0, 0.0, 0.0), 0.0);
    let out = e.update(&PoseSample::stamped(1.0, 1.0, 1.5), 1.5);
    assert!(!out.velocity_valid());
    assert_eq!(out.lead_position, out.raw_position);
}

#[test]
fn breach_short_circuit_scenario() {
    let obstacle = tow_core::ConvexPolygon::from_points(&[[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]]).unwrap();
    let p = HorizonPredictor::new(PredictorConfig::default());
    let r = p.predict(
        &VesselPose::new(5.0, 30.0, 0.0),
        Decision::new(0.0, 2.0),
        &TowState::at_rest(5.0, 5.0),
        &CableParams::default(),
        &obstacle,
    );
    assert!(r.breached);
    assert_eq!(r.min_distance, 0.0);
    assert!(r.steps < p.config().step_count());
}

#[test]
fn approach_and_pass_scenario() {
    let cfg = AvoidanceConfig::from_toml_str(
        r#"
        [obstacle]
        id = "buoy"
        points = [[-10.0, 100.0], [10.0, 100.0], [10.0, 120.0], [-10.0, 120.0]]

        [lead]
        enabled = false

        [[cpa_flags]]
        var = "TOW_CPA"
        value = "$[OID]=$[CPA]"
        "#,
    )
    .unwrap();
    let mut av = TowAvoidance::new(cfg).unwrap();

    // tow passes the obstacle 30 m to the east heading north
    let mut flags = Vec::new();
    let mut relevant = false;
    for i in 0..=60 {
        let t = i as f64;
        let y = 4.0 * t - 10.0;
        let inputs = CycleInputs {
            now: t,
            vessel: Some(VesselPose::new(40.0, y + 30.0, 0.0)),
            tow: PoseSample::stamped(40.0, y, t),
            tow_velocity: Some(Vec2::new(0.0, 4.0)),
            ..Default::default()
        };
        let report = av.update(&inputs);
        relevant |= report.relevance > 0.0;
        flags.extend(report.flags);

        if i == 20 {
            let scored = av.evaluate_grid(&DecisionGrid::uniform(12, 1.0, 3.0, 3));
            assert!(scored.iter().any(|s| s.evaluation.verdict == Verdict::Scored));
            assert!(best(&scored).is_some());
        }
    }
    assert!(relevant);
    assert_eq!(flags.len(), 1);
    assert_eq!(flags[0].value, "buoy=30");

    let json = serde_json::to_value(av.evaluate(Decision::new(0.0, 2.0))).unwrap();
    assert!(json.get("verdict").is_some());
}
