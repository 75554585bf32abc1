//! Geländehöhen-Schätzung aus bekannten Höhenpunkten (Sites).
//!
//! Drei Strategien hinter einem Trait:
//! - [`FlatInterpolator`]: konstante Höhe, auch ohne Sites
//! - [`NaturalNeighborInterpolator`]: Delaunay + Sibson-Gewichte
//! - [`InverseDistanceInterpolator`]: KD-Tree + inverse Distanzgewichtung

use anyhow::{bail, Result};
use glam::{DVec2, DVec3};
use kiddo::{KdTree, SquaredEuclidean};
use scene_spatial::Rect;

use super::triangulation::DelaunayTriangulation;
use crate::shared::options::{EleOptions, TerrainStrategy, SITE_PADDING_MIN};

/// Fortschritts-Log alle N eingefügten Sites.
const PROGRESS_LOG_INTERVAL: usize = 1000;

/// Schätzt Geländehöhen an beliebigen 2D-Positionen.
///
/// Nach `set_known_sites` ist ein Interpolator nur noch lesend und kann
/// von mehreren Threads gleichzeitig abgefragt werden.
pub trait TerrainInterpolator: Send + Sync {
    /// Initialisiert den Interpolator mit bekannten Höhenpunkten (x, y, ele).
    fn set_known_sites(&mut self, sites: &[DVec3]) -> Result<()>;

    /// Geschätzte Geländehöhe an `pos`.
    fn interpolate_ele(&self, pos: DVec2) -> f64;

    /// `pos` mit geschätzter Höhe als `z`.
    fn interpolate_xyz(&self, pos: DVec2) -> DVec3 {
        pos.extend(self.interpolate_ele(pos))
    }

    /// Kurzname für Logs.
    fn name(&self) -> &'static str;
}

/// Erstellt den Interpolator gemäß der Optionen.
pub fn create_interpolator(options: &EleOptions) -> Box<dyn TerrainInterpolator> {
    match options.terrain_strategy {
        TerrainStrategy::Flat => Box::new(FlatInterpolator::new(options.flat_ele)),
        TerrainStrategy::NaturalNeighbor => Box::new(NaturalNeighborInterpolator::new(
            options.effective_site_padding(),
        )),
        TerrainStrategy::InverseDistance => Box::new(InverseDistanceInterpolator::new(
            options.idw_radius,
            options.idw_power,
        )),
    }
}

/// Verwirft Sites mit NaN/Inf-Koordinaten.
fn finite_sites(sites: &[DVec3]) -> Vec<DVec3> {
    let finite: Vec<DVec3> = sites.iter().copied().filter(|s| s.is_finite()).collect();
    if finite.len() < sites.len() {
        log::warn!(
            "{} Sites mit ungültigen Koordinaten verworfen",
            sites.len() - finite.len()
        );
    }
    finite
}

// ── Flat ────────────────────────────────────────────────────────────

/// Konstante Höhe überall. Strategie für "keine Geländedaten".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatInterpolator {
    ele: f64,
}

impl FlatInterpolator {
    pub fn new(ele: f64) -> Self {
        Self { ele }
    }
}

impl Default for FlatInterpolator {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl TerrainInterpolator for FlatInterpolator {
    fn set_known_sites(&mut self, sites: &[DVec3]) -> Result<()> {
        if !sites.is_empty() {
            log::debug!(
                "Flaches Gelände ignoriert {} bekannte Sites",
                sites.len()
            );
        }
        Ok(())
    }

    fn interpolate_ele(&self, _pos: DVec2) -> f64 {
        self.ele
    }

    fn name(&self) -> &'static str {
        "flat"
    }
}

// ── Natural Neighbor ────────────────────────────────────────────────

/// Natural-Neighbor-Interpolation über eine Delaunay-Triangulierung.
#[derive(Debug, Clone)]
pub struct NaturalNeighborInterpolator {
    padding: f64,
    triangulation: Option<DelaunayTriangulation>,
}

impl NaturalNeighborInterpolator {
    /// `padding`: Rand um die Sites für den Rahmen der Triangulierung.
    pub fn new(padding: f64) -> Self {
        Self {
            padding: padding.max(SITE_PADDING_MIN),
            triangulation: None,
        }
    }

    /// Triangulierung nach `set_known_sites`
    pub fn triangulation(&self) -> Option<&DelaunayTriangulation> {
        self.triangulation.as_ref()
    }
}

impl TerrainInterpolator for NaturalNeighborInterpolator {
    fn set_known_sites(&mut self, sites: &[DVec3]) -> Result<()> {
        let sites = finite_sites(sites);
        let Some(bounds) = Rect::enclosing(sites.iter().map(|s| s.truncate())) else {
            bail!("Keine Höhendaten verfügbar (no elevation data available)");
        };

        let mut triangulation = DelaunayTriangulation::new(bounds.pad(self.padding));
        let mut inserted = 0usize;
        for (index, site) in sites.iter().enumerate() {
            match triangulation.insert(*site) {
                Ok(_) => inserted += 1,
                Err(e) => log::debug!("Site {} übersprungen: {:#}", index, e),
            }
            if (index + 1) % PROGRESS_LOG_INTERVAL == 0 {
                log::debug!("Triangulierung: {}/{} Sites eingefügt", index + 1, sites.len());
            }
        }

        log::info!(
            "Natural-Neighbor-Gelände: {} Sites, {} Dreiecke",
            triangulation.site_count(),
            triangulation.triangle_count()
        );
        if inserted == 0 {
            bail!("Keine Höhendaten verfügbar (no elevation data available)");
        }

        self.triangulation = Some(triangulation);
        Ok(())
    }

    fn interpolate_ele(&self, pos: DVec2) -> f64 {
        match &self.triangulation {
            Some(triangulation) => triangulation.interpolate(pos),
            None => 0.0,
        }
    }

    fn name(&self) -> &'static str {
        "natural_neighbor"
    }
}

// ── Inverse Distance ────────────────────────────────────────────────

/// Inverse Distanzgewichtung über einen KD-Tree.
#[derive(Debug, Clone)]
pub struct InverseDistanceInterpolator {
    radius: f64,
    power: f64,
    tree: KdTree<f64, 2>,
    elevations: Vec<f64>,
}

impl InverseDistanceInterpolator {
    pub fn new(radius: f64, power: f64) -> Self {
        Self {
            radius,
            power,
            tree: (&Vec::<[f64; 2]>::new()).into(),
            elevations: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.elevations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elevations.is_empty()
    }
}

impl TerrainInterpolator for InverseDistanceInterpolator {
    fn set_known_sites(&mut self, sites: &[DVec3]) -> Result<()> {
        let sites = finite_sites(sites);
        if sites.is_empty() {
            bail!("Keine Höhendaten verfügbar (no elevation data available)");
        }

        let entries: Vec<[f64; 2]> = sites.iter().map(|s| [s.x, s.y]).collect();
        self.tree = (&entries).into();
        self.elevations = sites.iter().map(|s| s.z).collect();

        log::info!("IDW-Gelände: {} Sites", self.elevations.len());
        Ok(())
    }

    fn interpolate_ele(&self, pos: DVec2) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let query = [pos.x, pos.y];

        let nearest = self.tree.nearest_one::<SquaredEuclidean>(&query);
        let nearest_ele = self
            .elevations
            .get(nearest.item as usize)
            .copied()
            .unwrap_or(0.0);
        if nearest.distance <= f64::EPSILON {
            return nearest_ele;
        }

        let mut weighted = 0.0;
        let mut total = 0.0;
        for entry in self
            .tree
            .within::<SquaredEuclidean>(&query, self.radius * self.radius)
        {
            let Some(ele) = self.elevations.get(entry.item as usize) else {
                continue;
            };
            let distance = entry.distance.sqrt();
            if distance <= f64::EPSILON {
                return *ele;
            }
            let weight = distance.powf(-self.power);
            weighted += weight * ele;
            total += weight;
        }

        if total > 0.0 && weighted.is_finite() {
            weighted / total
        } else {
            nearest_ele
        }
    }

    fn name(&self) -> &'static str {
        "inverse_distance"
    }
}
