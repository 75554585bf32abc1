//! Vertikale Constraints zwischen Connectoren.
//!
//! Feature-Generatoren melden ihre Anforderungen unabhängig voneinander an.
//! Widersprüche sind erlaubt und werden erst vom Enforcer erkannt.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::connector::{ConnectorId, ConnectorRegistry};

/// Art eines vertikalen Constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// `ele(upper) - ele(lower) == distance`
    Exact,
    /// `ele(upper) - ele(lower) >= distance`
    Min,
    /// `ele(upper) - ele(lower) <= distance`
    Max,
}

/// Anforderung an den Höhenabstand zweier Connectoren
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerticalConstraint {
    pub upper: ConnectorId,
    pub lower: ConnectorId,
    pub kind: ConstraintKind,
    pub distance: f64,
}

impl VerticalConstraint {
    /// Vorzeichenbehaftete Verletzung bei gegebenen Höhen.
    ///
    /// Positiv: `upper` muss um diesen Betrag steigen (bzw. `lower` sinken).
    /// Negativ: `upper` muss sinken. Null: erfüllt.
    pub fn violation(&self, upper_ele: f64, lower_ele: f64, tolerance: f64) -> f64 {
        let actual = upper_ele - lower_ele;
        let deficit = self.distance - actual;
        let needed = match self.kind {
            ConstraintKind::Exact => deficit,
            ConstraintKind::Min => deficit.max(0.0),
            ConstraintKind::Max => deficit.min(0.0),
        };
        if needed.abs() <= tolerance {
            0.0
        } else {
            needed
        }
    }
}

/// Sammlung aller Constraints eines Durchlaufs.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    constraints: Vec<VerticalConstraint>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VerticalConstraint> {
        self.constraints.iter()
    }

    /// Fordert einen Höhenabstand zwischen `upper` und `lower`.
    pub fn require_vertical_distance(
        &mut self,
        kind: ConstraintKind,
        distance: f64,
        upper: ConnectorId,
        lower: ConnectorId,
    ) {
        let constraint = VerticalConstraint {
            upper,
            lower,
            kind,
            distance,
        };
        // Selbstbezug ist nur erfüllbar, wenn er nichts fordert
        if upper == lower && constraint.violation(0.0, 0.0, 0.0) == 0.0 {
            log::debug!(
                "Erfüllter Constraint auf Connector {} mit sich selbst wird ignoriert",
                upper.0
            );
            return;
        }
        self.constraints.push(constraint);
    }

    /// Fordert gleiche Höhe zweier Connectoren.
    pub fn require_same_ele(&mut self, a: ConnectorId, b: ConnectorId) {
        self.require_vertical_distance(ConstraintKind::Exact, 0.0, a, b);
    }

    /// Fordert gleiche Höhe für alle Connectoren (Kette über den ersten).
    pub fn require_same_ele_all(&mut self, ids: &[ConnectorId]) {
        if let Some((&first, rest)) = ids.split_first() {
            for &other in rest {
                self.require_same_ele(first, other);
            }
        }
    }

    /// Fordert eine Steigung entlang aufeinanderfolgender Connectoren.
    ///
    /// `incline` ist Höhe pro horizontaler Einheit in Laufrichtung:
    /// `Min` mit 0.0 heißt "nie fallend", `Max` mit 0.1 "höchstens 10 % Steigung".
    pub fn require_incline(
        &mut self,
        registry: &ConnectorRegistry,
        kind: ConstraintKind,
        incline: f64,
        ids: &[ConnectorId],
    ) -> Result<()> {
        for pair in ids.windows(2) {
            let (Some(from), Some(to)) = (registry.get(pair[0]), registry.get(pair[1])) else {
                bail!(
                    "Steigungs-Constraint verweist auf unbekannte Connectoren {} / {}",
                    pair[0].0,
                    pair[1].0
                );
            };
            let horizontal = from.pos.distance(to.pos);
            self.require_vertical_distance(kind, incline * horizontal, pair[1], pair[0]);
        }
        Ok(())
    }

    /// Prüft, ob alle Indizes zur Registry gehören und alle Abstände endlich sind.
    pub fn validate(&self, registry: &ConnectorRegistry) -> Result<()> {
        for constraint in &self.constraints {
            if !constraint.distance.is_finite() {
                bail!(
                    "{:?}-Constraint {} -> {} mit ungültigem Abstand {}",
                    constraint.kind,
                    constraint.upper.0,
                    constraint.lower.0,
                    constraint.distance
                );
            }
            for id in [constraint.upper, constraint.lower] {
                if !registry.contains(id) {
                    bail!(
                        "Constraint verweist auf unbekannten Connector {} (Registry: {})",
                        id.0,
                        registry.len()
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connector::{EleConnector, GroundState};
    use approx::assert_relative_eq;
    use glam::DVec2;

    #[test]
    fn test_violation_per_kind() {
        let exact = VerticalConstraint {
            upper: ConnectorId(0),
            lower: ConnectorId(1),
            kind: ConstraintKind::Exact,
            distance: 10.0,
        };
        let min = VerticalConstraint {
            kind: ConstraintKind::Min,
            ..exact
        };
        let max = VerticalConstraint {
            kind: ConstraintKind::Max,
            ..exact
        };

        assert_relative_eq!(exact.violation(4.0, 0.0, 1e-9), 6.0);
        assert_relative_eq!(exact.violation(14.0, 0.0, 1e-9), -4.0);
        assert_relative_eq!(min.violation(4.0, 0.0, 1e-9), 6.0);
        assert_eq!(min.violation(14.0, 0.0, 1e-9), 0.0);
        assert_eq!(max.violation(4.0, 0.0, 1e-9), 0.0);
        assert_relative_eq!(max.violation(14.0, 0.0, 1e-9), -4.0);
    }

    #[test]
    fn test_incline_scales_with_horizontal_distance() {
        let mut registry = ConnectorRegistry::new();
        let a = registry.add(EleConnector::free(DVec2::new(0.0, 0.0), GroundState::On));
        let b = registry.add(EleConnector::free(DVec2::new(30.0, 40.0), GroundState::On));

        let mut set = ConstraintSet::new();
        set.require_incline(&registry, ConstraintKind::Max, 0.1, &[a, b])
            .expect("bekannte Connectoren");

        let constraint = set.iter().next().expect("ein Constraint");
        assert_eq!(constraint.upper, b);
        assert_eq!(constraint.lower, a);
        assert_relative_eq!(constraint.distance, 5.0);
    }

    #[test]
    fn test_validate_rejects_foreign_ids() {
        let registry = ConnectorRegistry::new();
        let mut set = ConstraintSet::new();
        set.require_same_ele(ConnectorId(0), ConnectorId(4));

        assert!(set.validate(&registry).is_err());
    }

    #[test]
    fn test_satisfied_self_constraint_is_dropped() {
        let mut set = ConstraintSet::new();
        set.require_same_ele_all(&[ConnectorId(2), ConnectorId(2), ConnectorId(3)]);
        set.require_vertical_distance(ConstraintKind::Min, -1.0, ConnectorId(4), ConnectorId(4));
        set.require_vertical_distance(ConstraintKind::Max, 0.0, ConnectorId(4), ConnectorId(4));

        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_unsatisfiable_self_constraint_is_kept() {
        let mut set = ConstraintSet::new();
        set.require_vertical_distance(ConstraintKind::Exact, 5.0, ConnectorId(1), ConnectorId(1));
        set.require_vertical_distance(ConstraintKind::Min, 0.5, ConnectorId(1), ConnectorId(1));
        set.require_vertical_distance(ConstraintKind::Max, -0.5, ConnectorId(1), ConnectorId(1));

        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_validate_rejects_non_finite_distance() {
        let mut registry = ConnectorRegistry::new();
        let a = registry.add(EleConnector::free(DVec2::ZERO, GroundState::On));
        let b = registry.add(EleConnector::free(DVec2::X, GroundState::On));

        let mut set = ConstraintSet::new();
        set.require_vertical_distance(ConstraintKind::Exact, 2.0, a, b);
        assert!(set.validate(&registry).is_ok());

        set.require_vertical_distance(ConstraintKind::Exact, f64::NAN, a, b);
        let err = set.validate(&registry).expect_err("NaN-Abstand");
        assert!(err.to_string().contains("ungültigem Abstand"));
    }
}
