use super::*;
use crate::core::connector::EleConnector;
use approx::assert_relative_eq;
use glam::DVec2;

fn enforcer() -> IterativeEnforcer {
    IterativeEnforcer::new(100, 1e-6, ConflictPolicy::Warn)
}

fn connector(x: f64, state: GroundState) -> EleConnector {
    EleConnector::free(DVec2::new(x, 0.0), state)
}

#[test]
fn test_exact_offset_is_honored() {
    let mut registry = ConnectorRegistry::new();
    let upper = registry.add(connector(0.0, GroundState::On));
    let lower = registry.add(connector(1.0, GroundState::Below));
    let mut constraints = ConstraintSet::new();
    constraints.require_vertical_distance(ConstraintKind::Exact, 10.0, upper, lower);

    let (eles, report) = enforcer()
        .enforce(&registry, &constraints, &[3.0, 4.0])
        .expect("Durchlauf");

    assert!(report.is_clean());
    assert_eq!(report.components, 1);
    assert_eq!(report.rigid_bodies, 1);
    assert_relative_eq!(eles[upper.0] - eles[lower.0], 10.0, epsilon = 1e-9);
}

#[test]
fn test_exact_chain_forms_one_rigid_body() {
    let mut registry = ConnectorRegistry::new();
    let ids: Vec<ConnectorId> = (0..4)
        .map(|i| registry.add(connector(i as f64, GroundState::On)))
        .collect();
    let mut constraints = ConstraintSet::new();
    for pair in ids.windows(2) {
        constraints.require_vertical_distance(ConstraintKind::Exact, 2.0, pair[1], pair[0]);
    }

    let (eles, report) = enforcer()
        .enforce(&registry, &constraints, &[0.0, 0.0, 0.0, 0.0])
        .expect("Durchlauf");

    assert!(report.is_clean());
    assert_eq!(report.rigid_bodies, 1);
    // Ausgleich um das Gelände: Offsets 0, 2, 4, 6 → Basis -3
    assert_relative_eq!(eles[0], -3.0, epsilon = 1e-9);
    assert_relative_eq!(eles[3], 3.0, epsilon = 1e-9);
}

#[test]
fn test_shared_reference_resolves_identically() {
    let mut registry = ConnectorRegistry::new();
    let a = registry.add(EleConnector::new(DVec2::new(5.0, 5.0), Some(42), GroundState::On));
    let b = registry.add(EleConnector::new(DVec2::new(5.0, 5.0), Some(42), GroundState::On));
    let c = registry.add(connector(9.0, GroundState::On));

    let (eles, report) = enforcer()
        .enforce(&registry, &ConstraintSet::new(), &[2.0, 4.0, 7.0])
        .expect("Durchlauf");

    assert!(report.is_clean());
    assert_eq!(eles[a.0], eles[b.0]);
    assert_relative_eq!(eles[a.0], 3.0);
    assert_eq!(eles[c.0], 7.0);
}

#[test]
fn test_unconstrained_connectors_keep_estimate() {
    let mut registry = ConnectorRegistry::new();
    for i in 0..5 {
        registry.add(connector(i as f64, GroundState::On));
    }
    let estimates = [1.5, -2.0, 0.25, 100.0, 3.0];

    let (eles, report) = enforcer()
        .enforce(&registry, &ConstraintSet::new(), &estimates)
        .expect("Durchlauf");

    assert_eq!(eles, estimates.to_vec());
    assert_eq!(report.components, 0);
}

#[test]
fn test_min_lifts_the_freer_side() {
    let mut registry = ConnectorRegistry::new();
    // Brückendeck ohne Referenz, Straße darunter mit Bodenkontakt und Referenz
    let deck = registry.add(connector(0.0, GroundState::Above));
    let road = registry.add(EleConnector::new(DVec2::new(0.0, 1.0), Some(7), GroundState::On));
    let mut constraints = ConstraintSet::new();
    constraints.require_vertical_distance(ConstraintKind::Min, 5.0, deck, road);

    let (eles, report) = enforcer()
        .enforce(&registry, &constraints, &[10.0, 10.0])
        .expect("Durchlauf");

    assert!(report.is_clean());
    assert_relative_eq!(eles[road.0], 10.0);
    assert_relative_eq!(eles[deck.0], 15.0);
}

#[test]
fn test_min_already_satisfied_changes_nothing() {
    let mut registry = ConnectorRegistry::new();
    let upper = registry.add(connector(0.0, GroundState::On));
    let lower = registry.add(connector(1.0, GroundState::On));
    let mut constraints = ConstraintSet::new();
    constraints.require_vertical_distance(ConstraintKind::Min, 1.0, upper, lower);

    let (eles, _) = enforcer()
        .enforce(&registry, &constraints, &[8.0, 2.0])
        .expect("Durchlauf");

    assert_eq!(eles, vec![8.0, 2.0]);
}

#[test]
fn test_max_lowers_the_freer_side() {
    let mut registry = ConnectorRegistry::new();
    let anchored = registry.add(EleConnector::new(DVec2::ZERO, Some(1), GroundState::On));
    let floating = registry.add(connector(3.0, GroundState::Floating));
    let mut constraints = ConstraintSet::new();
    // höchstens 2 m über dem Anker
    constraints.require_vertical_distance(ConstraintKind::Max, 2.0, floating, anchored);

    let (eles, report) = enforcer()
        .enforce(&registry, &constraints, &[0.0, 9.0])
        .expect("Durchlauf");

    assert!(report.is_clean());
    assert_relative_eq!(eles[anchored.0], 0.0);
    assert_relative_eq!(eles[floating.0], 2.0);
}

#[test]
fn test_above_never_ends_below_terrain() {
    let mut registry = ConnectorRegistry::new();
    let bridge = registry.add(connector(0.0, GroundState::Above));
    let pier = registry.add(connector(1.0, GroundState::Floating));
    let mut constraints = ConstraintSet::new();
    // Pfeiler zieht die Brücke nach unten, Gelände hält dagegen
    constraints.require_vertical_distance(ConstraintKind::Max, -20.0, bridge, pier);

    let (eles, report) = enforcer()
        .enforce(&registry, &constraints, &[30.0, 0.0])
        .expect("Durchlauf");

    assert!(report.is_clean());
    assert!(eles[bridge.0] >= 30.0 - 1e-6);
    assert!(eles[bridge.0] - eles[pier.0] <= -20.0 + 1e-6);
}

#[test]
fn test_below_stays_under_terrain() {
    let mut registry = ConnectorRegistry::new();
    let tunnel = registry.add(connector(0.0, GroundState::Below));
    let surface = registry.add(connector(0.0, GroundState::On));
    let mut constraints = ConstraintSet::new();
    // mindestens 8 m Überdeckung
    constraints.require_vertical_distance(ConstraintKind::Max, -8.0, tunnel, surface);

    let (eles, report) = enforcer()
        .enforce(&registry, &constraints, &[5.0, 5.0])
        .expect("Durchlauf");

    assert!(report.is_clean());
    assert_relative_eq!(eles[surface.0], 5.0);
    assert_relative_eq!(eles[tunnel.0], -3.0);
}

#[test]
fn test_conflicting_exact_is_reported() {
    let mut registry = ConnectorRegistry::new();
    let a = registry.add(connector(0.0, GroundState::On));
    let b = registry.add(connector(1.0, GroundState::On));
    let c = registry.add(connector(2.0, GroundState::On));
    let mut constraints = ConstraintSet::new();
    constraints.require_vertical_distance(ConstraintKind::Exact, 10.0, a, b);
    constraints.require_vertical_distance(ConstraintKind::Exact, 10.0, b, c);
    constraints.require_vertical_distance(ConstraintKind::Exact, 5.0, a, c);

    let (eles, report) = enforcer()
        .enforce(&registry, &constraints, &[0.0, 0.0, 0.0])
        .expect("Warn-Policy liefert Teillösung");

    assert!(!report.is_clean());
    assert!(report
        .conflicts
        .iter()
        .any(|c| matches!(c, ConstraintConflict::ContradictingExact { .. })));
    assert!(eles.iter().all(|e| e.is_finite()));
}

#[test]
fn test_fail_policy_surfaces_conflicts_as_error() {
    let mut registry = ConnectorRegistry::new();
    let a = registry.add(EleConnector::new(DVec2::ZERO, Some(3), GroundState::On));
    let b = registry.add(EleConnector::new(DVec2::ZERO, Some(3), GroundState::On));
    let mut constraints = ConstraintSet::new();
    // gleiche Referenz, aber 4 m Abstand gefordert
    constraints.require_vertical_distance(ConstraintKind::Exact, 4.0, a, b);

    let result = enforcer()
        .with_policy(ConflictPolicy::Fail)
        .enforce(&registry, &constraints, &[0.0, 0.0]);

    let err = result.expect_err("Konflikt erwartet");
    assert!(err.to_string().contains("Constraint-Konflikte"));
}

#[test]
fn test_contradicting_ground_bounds_do_not_converge() {
    let mut registry = ConnectorRegistry::new();
    let above = registry.add(connector(0.0, GroundState::Above));
    let below = registry.add(connector(1.0, GroundState::Below));
    let mut constraints = ConstraintSet::new();
    // Above über Gelände 10, Below unter Gelände 0, aber gleich hoch gefordert
    constraints.require_same_ele(above, below);

    let (_, report) = IterativeEnforcer::new(10, 1e-6, ConflictPolicy::Warn)
        .enforce(&registry, &constraints, &[10.0, 0.0])
        .expect("Warn-Policy");

    assert!(!report.is_clean());
}

#[test]
fn test_estimate_count_must_match() {
    let mut registry = ConnectorRegistry::new();
    registry.add(connector(0.0, GroundState::On));

    assert!(enforcer()
        .enforce(&registry, &ConstraintSet::new(), &[])
        .is_err());
    assert!(NoneEnforcer
        .enforce(&registry, &ConstraintSet::new(), &[1.0, 2.0])
        .is_err());
}

#[test]
fn test_none_enforcer_ignores_constraints() {
    let mut registry = ConnectorRegistry::new();
    let a = registry.add(connector(0.0, GroundState::On));
    let b = registry.add(connector(1.0, GroundState::On));
    let mut constraints = ConstraintSet::new();
    constraints.require_vertical_distance(ConstraintKind::Exact, 10.0, a, b);

    let (eles, report) = NoneEnforcer
        .enforce(&registry, &constraints, &[1.0, 2.0])
        .expect("Durchlauf");

    assert_eq!(eles, vec![1.0, 2.0]);
    assert!(report.is_clean());
}

#[test]
fn test_independent_components_counted() {
    let mut registry = ConnectorRegistry::new();
    let ids: Vec<ConnectorId> = (0..4)
        .map(|i| registry.add(connector(i as f64, GroundState::On)))
        .collect();
    let mut constraints = ConstraintSet::new();
    constraints.require_same_ele(ids[0], ids[1]);
    constraints.require_vertical_distance(ConstraintKind::Min, 1.0, ids[2], ids[3]);

    let (eles, report) = enforcer()
        .enforce(&registry, &constraints, &[1.0, 3.0, 0.0, 0.0])
        .expect("Durchlauf");

    assert_eq!(report.components, 2);
    assert_eq!(report.rigid_bodies, 3);
    assert_relative_eq!(eles[0], 2.0);
    assert_relative_eq!(eles[1], 2.0);
    assert!(eles[2] - eles[3] >= 1.0 - 1e-6);
}

#[test]
fn test_many_unconstrained_connectors_stay_untouched() {
    let count = 20_000;
    let mut registry = ConnectorRegistry::new();
    let ids: Vec<ConnectorId> = (0..count)
        .map(|i| registry.add(connector(i as f64, GroundState::On)))
        .collect();
    let mut constraints = ConstraintSet::new();
    let pairs = count / 8;
    for k in 0..pairs {
        constraints.require_vertical_distance(ConstraintKind::Min, 1.0, ids[2 * k + 1], ids[2 * k]);
    }

    let (eles, report) = enforcer()
        .enforce(&registry, &constraints, &vec![0.0; count])
        .expect("Durchlauf");

    assert!(report.is_clean());
    assert_eq!(report.components, pairs);
    assert_eq!(report.rigid_bodies, 2 * pairs);
    // je Paar: ein Durchlauf mit Korrektur, einer ohne
    assert_eq!(report.iterations, 2 * pairs);
    for k in 0..pairs {
        assert_relative_eq!(eles[2 * k], 0.0);
        assert_relative_eq!(eles[2 * k + 1], 1.0, epsilon = 1e-9);
    }
    assert!(eles[2 * pairs..].iter().all(|ele| *ele == 0.0));
}

#[test]
fn test_self_constraint_contradiction_is_reported() {
    let mut registry = ConnectorRegistry::new();
    let a = registry.add(connector(0.0, GroundState::On));
    let mut constraints = ConstraintSet::new();
    constraints.require_vertical_distance(ConstraintKind::Exact, 5.0, a, a);
    assert_eq!(constraints.len(), 1);

    let (_, report) = enforcer()
        .enforce(&registry, &constraints, &[2.0])
        .expect("Warn-Policy");
    assert!(matches!(
        report.conflicts.as_slice(),
        [ConstraintConflict::ContradictingExact { .. }]
    ));

    let fail = enforcer()
        .with_policy(ConflictPolicy::Fail)
        .enforce(&registry, &constraints, &[2.0]);
    assert!(fail.is_err());
}

#[test]
fn test_non_finite_distance_is_rejected() {
    let mut registry = ConnectorRegistry::new();
    let a = registry.add(connector(0.0, GroundState::On));
    let b = registry.add(connector(1.0, GroundState::On));

    for (kind, distance) in [
        (ConstraintKind::Exact, f64::NAN),
        (ConstraintKind::Min, f64::INFINITY),
        (ConstraintKind::Max, f64::NEG_INFINITY),
    ] {
        let mut constraints = ConstraintSet::new();
        constraints.require_vertical_distance(kind, distance, a, b);

        assert!(enforcer()
            .enforce(&registry, &constraints, &[1.0, 2.0])
            .is_err());
    }
}
