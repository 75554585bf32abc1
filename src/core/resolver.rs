//! Höhen-Pipeline: Sammeln → Geländeschätzung → Constraints → Ergebnis.
//!
//! Die Sammelphase läuft über eine [`EleCollection`]. [`EleResolver::resolve`]
//! verbraucht sie; aufgelöste Positionen gibt es nur im zurückgegebenen
//! [`EleResolution`]. Damit kann niemand Höhen lesen, bevor der Enforcer fertig ist.

use anyhow::{Context, Result};
use glam::{DVec2, DVec3};
use scene_spatial::Quadtree;

use super::connector::{ConnectorId, ConnectorRegistry, EleConnector, ResolvedElevations};
use super::constraint::ConstraintSet;
use super::enforcer::{create_enforcer, EnforcementReport};
use super::map_data::{MapData, MapFeature};
use super::terrain::{create_interpolator, TerrainInterpolator};
use crate::shared::options::EleOptions;

/// Sammelphase eines Durchlaufs: Connectoren, Constraints und bekannte Sites.
#[derive(Debug, Clone, Default)]
pub struct EleCollection {
    registry: ConnectorRegistry,
    constraints: ConstraintSet,
    sites: Vec<DVec3>,
}

impl EleCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &ConnectorRegistry {
        &self.registry
    }

    /// Registry zum Anlegen von Connectoren und Gruppen
    pub fn registry_mut(&mut self) -> &mut ConnectorRegistry {
        &mut self.registry
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn constraints_mut(&mut self) -> &mut ConstraintSet {
        &mut self.constraints
    }

    /// Registry und Constraints gleichzeitig (z.B. für `require_incline`).
    pub fn parts_mut(&mut self) -> (&mut ConnectorRegistry, &mut ConstraintSet) {
        (&mut self.registry, &mut self.constraints)
    }

    /// Kurzform für `registry_mut().add(connector)`.
    pub fn add_connector(&mut self, connector: EleConnector) -> ConnectorId {
        self.registry.add(connector)
    }

    /// Bekannte Geländehöhe (x, y, ele)
    pub fn add_site(&mut self, site: DVec3) {
        self.sites.push(site);
    }

    pub fn add_sites<I: IntoIterator<Item = DVec3>>(&mut self, sites: I) {
        self.sites.extend(sites);
    }

    pub fn sites(&self) -> &[DVec3] {
        &self.sites
    }

    /// Übernimmt Sites aus den Eingabedaten.
    ///
    /// Explizit getaggte Höhen werden direkt übernommen. Der Datensatzrand wird
    /// im Abstand `spacing` abgetastet; `boundary_ele` liefert dort die Höhe
    /// aus einer externen Quelle (oder `None`, wenn unbekannt).
    pub fn add_map_sites<F>(&mut self, data: &MapData, spacing: f64, boundary_ele: F) -> usize
    where
        F: Fn(DVec2) -> Option<f64>,
    {
        let before = self.sites.len();
        self.sites.extend(data.tagged_sites());
        let tagged = self.sites.len() - before;

        self.sites.extend(
            data.boundary_samples(spacing)
                .into_iter()
                .filter_map(|pos| boundary_ele(pos).map(|ele| pos.extend(ele))),
        );

        let added = self.sites.len() - before;
        log::debug!(
            "{} Sites aus Map-Daten übernommen ({} getaggt, {} Rand)",
            added,
            tagged,
            added - tagged
        );
        added
    }
}

/// Ergebnis eines Durchlaufs
pub struct EleResolution {
    /// Aufgelöste 3D-Position je Connector
    pub elevations: ResolvedElevations,
    /// Bericht des Enforcers
    pub report: EnforcementReport,
    /// Geländemodell für weitere Abfragen (z.B. Geländenetz)
    pub terrain: Box<dyn TerrainInterpolator>,
}

impl std::fmt::Debug for EleResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EleResolution")
            .field("elevations", &self.elevations)
            .field("report", &self.report)
            .field("terrain", &self.terrain.name())
            .finish()
    }
}

/// Führt einen vollständigen Höhen-Durchlauf gemäß [`EleOptions`] aus.
#[derive(Debug, Clone, Default)]
pub struct EleResolver {
    options: EleOptions,
}

impl EleResolver {
    pub fn new(options: EleOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EleOptions {
        &self.options
    }

    /// Baut den Quadtree über die Eingabedaten mit der konfigurierten Split-Schwelle.
    pub fn build_quadtree(&self, data: &MapData) -> Quadtree<MapFeature> {
        data.build_quadtree_with_split_size(self.options.quadtree_split_size)
    }

    /// Übernimmt Sites aus den Eingabedaten mit dem konfigurierten Randabstand.
    pub fn collect_map_sites<F>(
        &self,
        collection: &mut EleCollection,
        data: &MapData,
        boundary_ele: F,
    ) -> usize
    where
        F: Fn(DVec2) -> Option<f64>,
    {
        collection.add_map_sites(data, self.options.boundary_sample_spacing, boundary_ele)
    }

    /// Verbraucht die Sammelphase und liefert die aufgelösten Höhen.
    pub fn resolve(&self, collection: EleCollection) -> Result<EleResolution> {
        let EleCollection {
            registry,
            constraints,
            sites,
        } = collection;

        let mut terrain = create_interpolator(&self.options);
        terrain.set_known_sites(&sites).with_context(|| {
            format!(
                "Gelände ({}) konnte nicht aus {} Sites aufgebaut werden",
                terrain.name(),
                sites.len()
            )
        })?;

        let estimates: Vec<f64> = registry
            .iter()
            .map(|(_, connector)| terrain.interpolate_ele(connector.pos))
            .collect();
        log::debug!(
            "Geländeschätzung für {} Connectoren ({})",
            estimates.len(),
            terrain.name()
        );

        let enforcer = create_enforcer(&self.options);
        let (elevations, report) = enforcer
            .enforce(&registry, &constraints, &estimates)
            .with_context(|| {
                format!(
                    "Constraints ({}) konnten nicht durchgesetzt werden",
                    enforcer.name()
                )
            })?;

        log::info!(
            "Höhen aufgelöst: {} Connectoren, {} Constraints, {} Sites",
            registry.len(),
            constraints.len(),
            sites.len()
        );

        Ok(EleResolution {
            elevations: ResolvedElevations::new(&registry, &elevations),
            report,
            terrain,
        })
    }
}
