//! Durchsetzung vertikaler Constraints auf den Geländeschätzungen.
//!
//! Ablauf des [`IterativeEnforcer`]:
//! 1. Connectoren mit gleicher Referenz werden zu Clustern vereinigt
//! 2. Cluster + Constraints bilden Komponenten, die getrennt gelöst werden
//! 3. EXACT-Kanten verbinden Cluster zu starren Körpern mit festen Offsets
//! 4. Basis je Körper: gewichtete Ausgleichsrechnung über die Schätzungen
//! 5. MIN/MAX-Kanten und Geländebezug (Above/Below) werden iterativ relaxiert
//!
//! Widersprüche werden im [`EnforcementReport`] gesammelt; die
//! [`ConflictPolicy`] entscheidet, ob sie nur geloggt oder als Fehler gemeldet werden.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use anyhow::{bail, Result};

use super::connector::{ConnectorId, ConnectorRegistry, GroundState};
use super::constraint::{ConstraintKind, ConstraintSet, VerticalConstraint};
use crate::shared::options::{ConflictPolicy, EleOptions, EnforcerStrategy};

/// Gewicht eines Connectors in der Ausgleichsrechnung je Geländebezug.
fn ground_weight(state: GroundState) -> f64 {
    match state {
        GroundState::On => 1.0,
        GroundState::Above | GroundState::Below => 0.5,
        GroundState::Floating => 0.1,
    }
}

/// Berechnet die endgültigen Höhen aller Connectoren.
pub trait ConstraintEnforcer {
    /// `estimates[i]` ist die Geländeschätzung für `ConnectorId(i)`.
    ///
    /// Liefert je Connector eine Höhe (gleiche Reihenfolge) und einen Bericht.
    fn enforce(
        &self,
        registry: &ConnectorRegistry,
        constraints: &ConstraintSet,
        estimates: &[f64],
    ) -> Result<(Vec<f64>, EnforcementReport)>;

    /// Kurzname für Logs.
    fn name(&self) -> &'static str;
}

/// Erstellt den Enforcer gemäß der Optionen.
pub fn create_enforcer(options: &EleOptions) -> Box<dyn ConstraintEnforcer> {
    match options.enforcer_strategy {
        EnforcerStrategy::None => Box::new(NoneEnforcer),
        EnforcerStrategy::Iterative => Box::new(IterativeEnforcer::from_options(options)),
    }
}

/// Ein erkannter Widerspruch
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintConflict {
    /// EXACT-Kette mit abweichendem Offset
    ContradictingExact {
        constraint: VerticalConstraint,
        /// Abweichung vom geforderten Abstand
        mismatch: f64,
    },
    /// Nach der Relaxation weiterhin verletzt
    Unsatisfied {
        constraint: VerticalConstraint,
        violation: f64,
    },
    /// Geländebezug (Above/Below) weiterhin verletzt
    GroundViolated {
        connector: ConnectorId,
        state: GroundState,
        violation: f64,
    },
    /// Relaxation hat nach `iterations` Durchläufen nicht konvergiert
    NotConverged { component: usize, iterations: usize },
}

impl fmt::Display for ConstraintConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintConflict::ContradictingExact {
                constraint,
                mismatch,
            } => write!(
                f,
                "widersprüchlicher EXACT-Constraint {} -> {} ({:.3}, Abweichung {:.3})",
                constraint.upper.0, constraint.lower.0, constraint.distance, mismatch
            ),
            ConstraintConflict::Unsatisfied {
                constraint,
                violation,
            } => write!(
                f,
                "{:?}-Constraint {} -> {} ({:.3}) verletzt um {:.3}",
                constraint.kind, constraint.upper.0, constraint.lower.0, constraint.distance, violation
            ),
            ConstraintConflict::GroundViolated {
                connector,
                state,
                violation,
            } => write!(
                f,
                "Connector {} verletzt Geländebezug {:?} um {:.3}",
                connector.0, state, violation
            ),
            ConstraintConflict::NotConverged {
                component,
                iterations,
            } => write!(
                f,
                "Komponente {} nach {} Durchläufen nicht konvergiert",
                component, iterations
            ),
        }
    }
}

/// Zusammenfassung eines Enforcer-Durchlaufs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnforcementReport {
    /// Anzahl Komponenten mit mindestens einem Constraint
    pub components: usize,
    /// Anzahl starrer Körper in diesen Komponenten
    pub rigid_bodies: usize,
    /// Summe der Relaxations-Durchläufe
    pub iterations: usize,
    /// Alle erkannten Widersprüche
    pub conflicts: Vec<ConstraintConflict>,
}

impl EnforcementReport {
    /// `true` wenn kein Widerspruch erkannt wurde.
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Wendet die Konflikt-Policy an: Warnung loggen oder Fehler.
    pub fn apply_policy(&self, policy: ConflictPolicy) -> Result<()> {
        if self.is_clean() {
            return Ok(());
        }
        match policy {
            ConflictPolicy::Warn => {
                log::warn!(
                    "{} Constraint-Konflikte, verwende beste Teillösung",
                    self.conflicts.len()
                );
                for conflict in &self.conflicts {
                    log::warn!("  {}", conflict);
                }
                Ok(())
            }
            ConflictPolicy::Fail => {
                bail!(
                    "{} Constraint-Konflikte, erster: {}",
                    self.conflicts.len(),
                    self.conflicts[0]
                )
            }
        }
    }
}

// ── None ────────────────────────────────────────────────────────────

/// Übernimmt die Geländeschätzung unverändert und ignoriert alle Constraints.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneEnforcer;

impl ConstraintEnforcer for NoneEnforcer {
    fn enforce(
        &self,
        registry: &ConnectorRegistry,
        constraints: &ConstraintSet,
        estimates: &[f64],
    ) -> Result<(Vec<f64>, EnforcementReport)> {
        check_estimates(registry, estimates)?;
        if !constraints.is_empty() {
            log::debug!("{} Constraints ignoriert", constraints.len());
        }
        Ok((estimates.to_vec(), EnforcementReport::default()))
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

fn check_estimates(registry: &ConnectorRegistry, estimates: &[f64]) -> Result<()> {
    if estimates.len() != registry.len() {
        bail!(
            "Anzahl Schätzungen ({}) passt nicht zur Anzahl Connectoren ({})",
            estimates.len(),
            registry.len()
        );
    }
    Ok(())
}

// ── Iterative ───────────────────────────────────────────────────────

/// Komponentenweise Relaxation über starre Körper.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterativeEnforcer {
    max_iterations: usize,
    tolerance: f64,
    policy: ConflictPolicy,
}

impl Default for IterativeEnforcer {
    fn default() -> Self {
        Self::from_options(&EleOptions::default())
    }
}

impl IterativeEnforcer {
    pub fn new(max_iterations: usize, tolerance: f64, policy: ConflictPolicy) -> Self {
        Self {
            max_iterations: max_iterations.max(1),
            tolerance: tolerance.abs(),
            policy,
        }
    }

    pub fn from_options(options: &EleOptions) -> Self {
        Self::new(
            options.max_iterations,
            options.constraint_tolerance,
            options.conflict_policy,
        )
    }

    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl ConstraintEnforcer for IterativeEnforcer {
    fn enforce(
        &self,
        registry: &ConnectorRegistry,
        constraints: &ConstraintSet,
        estimates: &[f64],
    ) -> Result<(Vec<f64>, EnforcementReport)> {
        check_estimates(registry, estimates)?;
        constraints.validate(registry)?;

        let mut solver = Solver::new(registry, constraints, estimates, self.tolerance);
        let report = solver.solve(self.max_iterations);
        log::info!(
            "Constraints durchgesetzt: {} Komponenten, {} starre Körper, {} Durchläufe, {} Konflikte",
            report.components,
            report.rigid_bodies,
            report.iterations,
            report.conflicts.len()
        );
        report.apply_policy(self.policy)?;

        Ok((solver.elevations(), report))
    }

    fn name(&self) -> &'static str {
        "iterative"
    }
}

/// Union-Find mit Pfadkompression
#[derive(Debug, Clone)]
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // kleinerer Index wird Wurzel, damit die Reihenfolge stabil bleibt
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[child] = root;
        }
    }
}

/// Connectoren mit gemeinsamer Referenz
#[derive(Debug, Clone)]
struct Cluster {
    members: Vec<ConnectorId>,
    /// Mittelwert der Schätzungen
    estimate: f64,
    weight: f64,
    /// Anzahl Connectoren mit Referenz oder Bodenkontakt
    anchored: usize,
    body: usize,
    offset: f64,
}

/// Constraint auf Cluster-Ebene
#[derive(Debug, Clone, Copy)]
struct Edge {
    constraint: VerticalConstraint,
    upper: usize,
    lower: usize,
}

/// Starrer Körper: Cluster mit festen Offsets zur Basis
#[derive(Debug, Clone)]
struct Body {
    base: f64,
    /// Anzahl anliegender Constraints plus Verankerung, höher = schwerer zu bewegen
    rigidity: usize,
}

/// Untere/obere Schranke für die Basis eines Körpers
#[derive(Debug, Clone, Copy)]
struct GroundBound {
    connector: ConnectorId,
    state: GroundState,
    body: usize,
    /// Schranke für die Basis (Schätzung minus Offset)
    limit: f64,
}

struct Solver<'a> {
    registry: &'a ConnectorRegistry,
    estimates: &'a [f64],
    tolerance: f64,
    cluster_of: Vec<usize>,
    clusters: Vec<Cluster>,
    edges: Vec<Edge>,
    bodies: Vec<Body>,
}

impl<'a> Solver<'a> {
    fn new(
        registry: &'a ConnectorRegistry,
        constraints: &ConstraintSet,
        estimates: &'a [f64],
        tolerance: f64,
    ) -> Self {
        let mut uf = UnionFind::new(registry.len());
        for (_, ids) in registry.reference_groups() {
            if let Some((first, rest)) = ids.split_first() {
                for other in rest {
                    uf.union(first.0, other.0);
                }
            }
        }

        let mut cluster_index = vec![usize::MAX; registry.len()];
        let mut cluster_of = vec![0; registry.len()];
        let mut clusters: Vec<Cluster> = Vec::new();
        for (id, connector) in registry.iter() {
            let root = uf.find(id.0);
            if cluster_index[root] == usize::MAX {
                cluster_index[root] = clusters.len();
                clusters.push(Cluster {
                    members: Vec::new(),
                    estimate: 0.0,
                    weight: 0.0,
                    anchored: 0,
                    body: usize::MAX,
                    offset: 0.0,
                });
            }
            let index = cluster_index[root];
            cluster_of[id.0] = index;

            let cluster = &mut clusters[index];
            cluster.members.push(id);
            cluster.estimate += estimates[id.0];
            cluster.weight += ground_weight(connector.ground_state);
            if connector.reference.is_some() || connector.ground_state == GroundState::On {
                cluster.anchored += 1;
            }
        }
        for cluster in &mut clusters {
            cluster.estimate /= cluster.members.len() as f64;
        }

        let edges = constraints
            .iter()
            .map(|constraint| Edge {
                constraint: *constraint,
                upper: cluster_of[constraint.upper.0],
                lower: cluster_of[constraint.lower.0],
            })
            .collect();

        Self {
            registry,
            estimates,
            tolerance,
            cluster_of,
            clusters,
            edges,
            bodies: Vec::new(),
        }
    }

    fn solve(&mut self, max_iterations: usize) -> EnforcementReport {
        let mut report = EnforcementReport::default();

        // Constraints innerhalb eines Clusters lassen sich nicht mehr erfüllen
        for edge in &self.edges {
            if edge.upper == edge.lower {
                let violation = edge.constraint.violation(0.0, 0.0, self.tolerance);
                if violation != 0.0 {
                    report.conflicts.push(match edge.constraint.kind {
                        ConstraintKind::Exact => ConstraintConflict::ContradictingExact {
                            constraint: edge.constraint,
                            mismatch: violation,
                        },
                        _ => ConstraintConflict::Unsatisfied {
                            constraint: edge.constraint,
                            violation,
                        },
                    });
                }
            }
        }

        self.build_bodies(&mut report);
        let bounds = self.ground_bounds();

        // Kanten und Schranken einmalig nach Komponente einsortieren
        let (component_of, component_count) = self.components();
        let mut body_count = vec![0usize; component_count];
        for &component in &component_of {
            body_count[component] += 1;
        }
        let mut constrained = vec![false; component_count];
        let mut edges_of: Vec<Vec<Edge>> = vec![Vec::new(); component_count];
        for edge in &self.edges {
            if edge.upper == edge.lower {
                continue;
            }
            let upper_body = self.clusters[edge.upper].body;
            let component = component_of[upper_body];
            constrained[component] = true;
            if upper_body != self.clusters[edge.lower].body {
                edges_of[component].push(*edge);
            }
        }
        let mut bounds_of: Vec<Vec<GroundBound>> = vec![Vec::new(); component_count];
        for bound in &bounds {
            bounds_of[component_of[bound.body]].push(*bound);
        }

        for component in 0..component_count {
            if constrained[component] {
                report.components += 1;
                report.rigid_bodies += body_count[component];
            }
            let (edges, component_bounds) = (&edges_of[component], &bounds_of[component]);
            if edges.is_empty() && component_bounds.is_empty() {
                continue;
            }

            let iterations = self.relax(edges, component_bounds, max_iterations);
            report.iterations += iterations.min(max_iterations);
            if iterations > max_iterations {
                report.conflicts.push(ConstraintConflict::NotConverged {
                    component,
                    iterations: max_iterations,
                });
            }
        }

        self.collect_violations(&bounds, &mut report);
        report
    }

    /// Starre Körper per BFS über EXACT-Kanten.
    fn build_bodies(&mut self, report: &mut EnforcementReport) {
        let mut exact_adjacency: Vec<Vec<(usize, f64)>> = vec![Vec::new(); self.clusters.len()];
        let mut incident = vec![0usize; self.clusters.len()];
        for edge in &self.edges {
            if edge.upper == edge.lower {
                continue;
            }
            incident[edge.upper] += 1;
            incident[edge.lower] += 1;
            if edge.constraint.kind == ConstraintKind::Exact {
                // offset(upper) = offset(lower) + distance
                exact_adjacency[edge.lower].push((edge.upper, edge.constraint.distance));
                exact_adjacency[edge.upper].push((edge.lower, -edge.constraint.distance));
            }
        }

        for start in 0..self.clusters.len() {
            if self.clusters[start].body != usize::MAX {
                continue;
            }
            let body = self.bodies.len();
            let mut members = vec![start];
            self.clusters[start].body = body;
            self.clusters[start].offset = 0.0;

            let mut queue = VecDeque::from([start]);
            while let Some(current) = queue.pop_front() {
                let offset = self.clusters[current].offset;
                for &(next, delta) in &exact_adjacency[current] {
                    if self.clusters[next].body == usize::MAX {
                        self.clusters[next].body = body;
                        self.clusters[next].offset = offset + delta;
                        members.push(next);
                        queue.push_back(next);
                    }
                }
            }

            // gewichtete Ausgleichsrechnung: min Σ w (base + offset - estimate)²
            let (sum, weight) = members.iter().fold((0.0, 0.0), |(sum, weight), &c| {
                let cluster = &self.clusters[c];
                (
                    sum + cluster.weight * (cluster.estimate - cluster.offset),
                    weight + cluster.weight,
                )
            });
            let base = if members.len() == 1 {
                self.clusters[start].estimate
            } else if weight > 0.0 {
                sum / weight
            } else {
                members
                    .iter()
                    .map(|&c| self.clusters[c].estimate - self.clusters[c].offset)
                    .sum::<f64>()
                    / members.len() as f64
            };

            let rigidity = members
                .iter()
                .map(|&c| incident[c] + 2 * self.clusters[c].anchored)
                .sum();
            self.bodies.push(Body {
                base,
                rigidity,
            });
        }

        // Widersprüche innerhalb der Körper
        for edge in &self.edges {
            if edge.constraint.kind != ConstraintKind::Exact || edge.upper == edge.lower {
                continue;
            }
            let (upper, lower) = (&self.clusters[edge.upper], &self.clusters[edge.lower]);
            let mismatch = edge.constraint.distance - (upper.offset - lower.offset);
            if mismatch.abs() > self.tolerance {
                report.conflicts.push(ConstraintConflict::ContradictingExact {
                    constraint: edge.constraint,
                    mismatch,
                });
            }
        }
        log::debug!(
            "{} Cluster zu {} starren Körpern zusammengefasst",
            self.clusters.len(),
            self.bodies.len()
        );
    }

    /// Above/Below als Schranken für die Körper-Basis.
    fn ground_bounds(&self) -> Vec<GroundBound> {
        self.registry
            .iter()
            .filter(|(_, c)| matches!(c.ground_state, GroundState::Above | GroundState::Below))
            .map(|(id, connector)| {
                let cluster = &self.clusters[self.cluster_of[id.0]];
                GroundBound {
                    connector: id,
                    state: connector.ground_state,
                    body: cluster.body,
                    limit: self.estimates[id.0] - cluster.offset,
                }
            })
            .collect()
    }

    /// Komponente je Körper (Zusammenhang über alle Kanten) und Anzahl Komponenten.
    fn components(&self) -> (Vec<usize>, usize) {
        let mut uf = UnionFind::new(self.bodies.len());
        for edge in &self.edges {
            uf.union(self.clusters[edge.upper].body, self.clusters[edge.lower].body);
        }

        let mut index_of_root = vec![usize::MAX; self.bodies.len()];
        let mut component_of = vec![0; self.bodies.len()];
        let mut count = 0;
        for (body, component) in component_of.iter_mut().enumerate() {
            let root = uf.find(body);
            if index_of_root[root] == usize::MAX {
                index_of_root[root] = count;
                count += 1;
            }
            *component = index_of_root[root];
        }
        (component_of, count)
    }

    fn ele_of(&self, cluster: usize) -> f64 {
        let cluster = &self.clusters[cluster];
        self.bodies[cluster.body].base + cluster.offset
    }

    /// Engste Geländeschranken je Körper: (untere, obere) Grenze der Basis.
    fn body_limits(bounds: &[GroundBound]) -> HashMap<usize, (f64, f64)> {
        let mut limits: HashMap<usize, (f64, f64)> = HashMap::new();
        for bound in bounds {
            let entry = limits
                .entry(bound.body)
                .or_insert((f64::NEG_INFINITY, f64::INFINITY));
            match bound.state {
                GroundState::Above => entry.0 = entry.0.max(bound.limit),
                GroundState::Below => entry.1 = entry.1.min(bound.limit),
                GroundState::On | GroundState::Floating => {}
            }
        }
        limits
    }

    /// Prüft, ob `base` alle Geländeschranken des Körpers einhält.
    fn allows(&self, limits: &HashMap<usize, (f64, f64)>, body: usize, base: f64) -> bool {
        match limits.get(&body) {
            Some(&(lower, upper)) => {
                base >= lower - self.tolerance && base <= upper + self.tolerance
            }
            None => true,
        }
    }

    /// Relaxiert bis nichts mehr verletzt ist.
    ///
    /// Gibt die Anzahl Durchläufe zurück, `max_iterations + 1` ohne Konvergenz.
    fn relax(&mut self, edges: &[Edge], bounds: &[GroundBound], max_iterations: usize) -> usize {
        if edges.is_empty() && bounds.is_empty() {
            return 0;
        }
        let limits = Self::body_limits(bounds);

        for sweep in 1..=max_iterations {
            let mut changed = false;

            for bound in bounds {
                let base = self.bodies[bound.body].base;
                let needed = match bound.state {
                    GroundState::Above => (bound.limit - base).max(0.0),
                    GroundState::Below => (bound.limit - base).min(0.0),
                    GroundState::On | GroundState::Floating => 0.0,
                };
                if needed.abs() > self.tolerance {
                    self.bodies[bound.body].base += needed;
                    changed = true;
                }
            }

            for edge in edges {
                let violation = edge.constraint.violation(
                    self.ele_of(edge.upper),
                    self.ele_of(edge.lower),
                    self.tolerance,
                );
                if violation == 0.0 {
                    continue;
                }

                let upper = self.clusters[edge.upper].body;
                let lower = self.clusters[edge.lower].body;
                let upper_target = self.bodies[upper].base + violation;
                let lower_target = self.bodies[lower].base - violation;

                // freiere Seite bewegen, außer sie verlässt dabei ihren Geländebezug
                let prefer_upper = self.bodies[upper].rigidity <= self.bodies[lower].rigidity;
                let move_upper = match (
                    self.allows(&limits, upper, upper_target),
                    self.allows(&limits, lower, lower_target),
                ) {
                    (true, false) => true,
                    (false, true) => false,
                    _ => prefer_upper,
                };
                if move_upper {
                    self.bodies[upper].base = upper_target;
                } else {
                    self.bodies[lower].base = lower_target;
                }
                changed = true;
            }

            if !changed {
                return sweep;
            }
        }

        max_iterations + 1
    }

    /// Meldet alles, was nach der Relaxation noch verletzt ist.
    fn collect_violations(&self, bounds: &[GroundBound], report: &mut EnforcementReport) {
        for edge in &self.edges {
            if edge.upper == edge.lower {
                continue;
            }
            let same_body = self.clusters[edge.upper].body == self.clusters[edge.lower].body;
            if same_body && edge.constraint.kind == ConstraintKind::Exact {
                // bereits als ContradictingExact gemeldet
                continue;
            }
            let violation = edge.constraint.violation(
                self.ele_of(edge.upper),
                self.ele_of(edge.lower),
                self.tolerance,
            );
            if violation != 0.0 {
                report.conflicts.push(ConstraintConflict::Unsatisfied {
                    constraint: edge.constraint,
                    violation,
                });
            }
        }

        for bound in bounds {
            let base = self.bodies[bound.body].base;
            let violation = match bound.state {
                GroundState::Above => (bound.limit - base).max(0.0),
                GroundState::Below => (bound.limit - base).min(0.0),
                GroundState::On | GroundState::Floating => 0.0,
            };
            if violation.abs() > self.tolerance {
                report.conflicts.push(ConstraintConflict::GroundViolated {
                    connector: bound.connector,
                    state: bound.state,
                    violation,
                });
            }
        }
    }

    /// Endgültige Höhe je Connector (Registry-Reihenfolge).
    fn elevations(&self) -> Vec<f64> {
        self.cluster_of.iter().map(|&c| self.ele_of(c)).collect()
    }
}

#[cfg(test)]
mod tests;
