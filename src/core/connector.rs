//! Connector-Modell: 2D-Punkte, die eine aufgelöste Höhe brauchen.
//!
//! Feature-Generatoren registrieren ihre Connectoren in einer
//! [`ConnectorRegistry`] (nur Anhängen) und halten danach stabile
//! [`ConnectorId`]s. Die aufgelösten Positionen landen in einem getrennten
//! Ausgabe-Array ([`ResolvedElevations`]); Connectoren selbst werden nie
//! verändert.

use anyhow::{anyhow, Result};
use glam::{DVec2, DVec3};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::geometry::Polygon2;

/// Toleranz für die Positions-Suche in einer Gruppe (Welteinheiten).
pub const CONNECTOR_POS_TOLERANCE: f64 = 1e-6;

/// Beziehung eines Connectors zur Geländeoberfläche
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GroundState {
    /// Liegt auf dem Gelände
    #[default]
    On,
    /// Liegt über dem Gelände (z.B. Brücke)
    Above,
    /// Liegt unter dem Gelände (z.B. Tunnel)
    Below,
    /// Frei schwebend, nicht ans Gelände gebunden
    Floating,
}

/// Stabiler Index eines Connectors in der Registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectorId(pub usize);

/// Ein Punkt eines Features, der eine aufgelöste Höhe braucht.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EleConnector {
    /// Position in der XY-Ebene
    pub pos: DVec2,
    /// Verankerndes Map-Element (z.B. ein gemeinsamer Knoten), `None` für freie Punkte
    pub reference: Option<u64>,
    /// Beziehung zum Gelände
    pub ground_state: GroundState,
}

impl EleConnector {
    pub fn new(pos: DVec2, reference: Option<u64>, ground_state: GroundState) -> Self {
        Self {
            pos,
            reference,
            ground_state,
        }
    }

    /// Freier Connector ohne Referenz.
    pub fn free(pos: DVec2, ground_state: GroundState) -> Self {
        Self::new(pos, None, ground_state)
    }

    /// Zwei Connectoren beschreiben denselben Punkt: gleiche Referenz, gleiche
    /// Position und gleicher Geländebezug.
    pub fn connects_to(&self, other: &EleConnector) -> bool {
        self.reference.is_some()
            && self.reference == other.reference
            && self.ground_state == other.ground_state
            && self.pos.distance(other.pos) <= CONNECTOR_POS_TOLERANCE
    }
}

/// Registry aller Connectoren eines Durchlaufs (nur Anhängen).
#[derive(Debug, Clone, Default)]
pub struct ConnectorRegistry {
    connectors: Vec<EleConnector>,
    /// Connectoren je Referenz, in Registrierungsreihenfolge
    by_reference: IndexMap<u64, Vec<ConnectorId>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registriert einen Connector und gibt seinen stabilen Index zurück.
    pub fn add(&mut self, connector: EleConnector) -> ConnectorId {
        let id = ConnectorId(self.connectors.len());
        if let Some(reference) = connector.reference {
            self.by_reference.entry(reference).or_default().push(id);
        }
        self.connectors.push(connector);
        id
    }

    pub fn get(&self, id: ConnectorId) -> Option<&EleConnector> {
        self.connectors.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    /// Prüft, ob der Index zu dieser Registry gehört.
    pub fn contains(&self, id: ConnectorId) -> bool {
        id.0 < self.connectors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConnectorId, &EleConnector)> {
        self.connectors
            .iter()
            .enumerate()
            .map(|(index, connector)| (ConnectorId(index), connector))
    }

    /// Gruppen von Connectoren mit gemeinsamer Referenz (deterministische Reihenfolge).
    pub fn reference_groups(&self) -> impl Iterator<Item = (u64, &[ConnectorId])> {
        self.by_reference
            .iter()
            .map(|(reference, ids)| (*reference, ids.as_slice()))
    }

    /// Alle Connectoren, die dieselbe Referenz wie `id` tragen (inklusive `id`).
    pub fn sharing_reference(&self, id: ConnectorId) -> &[ConnectorId] {
        self.get(id)
            .and_then(|connector| connector.reference)
            .and_then(|reference| self.by_reference.get(&reference))
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
    }
}

/// Geordnete Connectoren eines einzelnen Features.
#[derive(Debug, Clone, Default)]
pub struct EleConnectorGroup {
    ids: Vec<ConnectorId>,
    positions: Vec<DVec2>,
}

impl EleConnectorGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registriert einen Connector und hängt ihn an die Gruppe an.
    pub fn add(&mut self, registry: &mut ConnectorRegistry, connector: EleConnector) -> ConnectorId {
        let id = registry.add(connector);
        self.ids.push(id);
        self.positions.push(connector.pos);
        id
    }

    /// Legt je Position einen Connector mit gleicher Referenz und gleichem Geländebezug an.
    pub fn add_connectors_for<I>(
        &mut self,
        registry: &mut ConnectorRegistry,
        positions: I,
        reference: Option<u64>,
        ground_state: GroundState,
    ) where
        I: IntoIterator<Item = DVec2>,
    {
        for pos in positions {
            self.add(registry, EleConnector::new(pos, reference, ground_state));
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Connector-Indizes in Einfügereihenfolge
    pub fn ids(&self) -> &[ConnectorId] {
        &self.ids
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConnectorId, DVec2)> + '_ {
        self.ids.iter().copied().zip(self.positions.iter().copied())
    }

    /// Erster Connector an der Position (innerhalb der Toleranz).
    pub fn connector_at(&self, pos: DVec2) -> Option<ConnectorId> {
        self.iter()
            .find(|(_, candidate)| candidate.distance(pos) <= CONNECTOR_POS_TOLERANCE)
            .map(|(id, _)| id)
    }

    /// Wie [`Self::connector_at`], aber mit Fehler statt `None`.
    pub fn require_connector_at(&self, pos: DVec2) -> Result<ConnectorId> {
        self.connector_at(pos)
            .ok_or_else(|| anyhow!("Kein Connector an Position ({:.3}, {:.3})", pos.x, pos.y))
    }

    /// 3D-Position des Connectors an `pos`.
    pub fn pos_xyz(&self, resolved: &ResolvedElevations, pos: DVec2) -> Option<DVec3> {
        resolved.pos_xyz(self.connector_at(pos)?)
    }

    /// 3D-Positionen aller Connectoren der Gruppe, in Einfügereihenfolge.
    pub fn positions_xyz(&self, resolved: &ResolvedElevations) -> Result<Vec<DVec3>> {
        self.ids
            .iter()
            .map(|id| {
                resolved
                    .pos_xyz(*id)
                    .ok_or_else(|| anyhow!("Connector {} ist nicht aufgelöst", id.0))
            })
            .collect()
    }

    /// Hebt einen 2D-Linienzug auf 3D an. Jeder Punkt braucht einen Connector.
    pub fn line_xyz(&self, resolved: &ResolvedElevations, points: &[DVec2]) -> Result<Vec<DVec3>> {
        points
            .iter()
            .map(|p| {
                let id = self.require_connector_at(*p)?;
                resolved
                    .pos_xyz(id)
                    .ok_or_else(|| anyhow!("Connector {} ist nicht aufgelöst", id.0))
            })
            .collect()
    }

    /// Hebt ein 2D-Polygon auf 3D an (offener Ring, gleiche Eckenreihenfolge).
    pub fn polygon_xyz(&self, resolved: &ResolvedElevations, polygon: &Polygon2) -> Result<Vec<DVec3>> {
        self.line_xyz(resolved, polygon.vertices())
    }
}

/// Ergebnis eines Durchlaufs: aufgelöste 3D-Position je Connector.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedElevations {
    positions: Vec<DVec3>,
}

impl ResolvedElevations {
    /// Baut das Ergebnis aus Registry und Höhen (gleiche Reihenfolge).
    pub(crate) fn new(registry: &ConnectorRegistry, elevations: &[f64]) -> Self {
        let positions = registry
            .iter()
            .zip(elevations)
            .map(|((_, connector), ele)| connector.pos.extend(*ele))
            .collect();
        Self { positions }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn pos_xyz(&self, id: ConnectorId) -> Option<DVec3> {
        self.positions.get(id.0).copied()
    }

    pub fn ele(&self, id: ConnectorId) -> Option<f64> {
        self.pos_xyz(id).map(|p| p.z)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConnectorId, DVec3)> + '_ {
        self.positions
            .iter()
            .enumerate()
            .map(|(index, pos)| (ConnectorId(index), *pos))
    }
}
