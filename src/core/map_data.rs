//! Minimales Eingabemodell: Map-Features mit 2D-Geometrie und optionaler Höhe.
//!
//! Das Parsen des Quellformats ist Sache des Aufrufers; hier landen nur die
//! bereits projizierten Geometrien, damit Quadtree und Höhen-Sites daraus
//! gebaut werden können.

use glam::{DVec2, DVec3};
use scene_spatial::{Bounded, Quadtree, Rect};

use super::geometry::Polygon2;

/// Obergrenze der Randpunkte je Kante in [`MapData::boundary_samples`].
pub const MAX_BOUNDARY_SAMPLES_PER_EDGE: usize = 10_000;

/// Geometrie eines Map-Features
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureShape {
    /// Einzelner Knoten
    Node(DVec2),
    /// Wegsegment zwischen zwei Knoten
    Segment(DVec2, DVec2),
    /// Linienzug aus mindestens zwei Punkten
    Line(Vec<DVec2>),
    /// Fläche
    Area(Polygon2),
}

/// Ein Feature der Eingabedaten
#[derive(Debug, Clone, PartialEq)]
pub struct MapFeature {
    /// ID aus den Quelldaten
    pub id: u64,
    /// Geometrie in der XY-Ebene
    pub shape: FeatureShape,
    /// Explizit angegebene Höhe (z.B. aus einem `ele`-Tag)
    pub ele: Option<f64>,
}

impl MapFeature {
    pub fn node(id: u64, pos: DVec2) -> Self {
        Self {
            id,
            shape: FeatureShape::Node(pos),
            ele: None,
        }
    }

    pub fn segment(id: u64, start: DVec2, end: DVec2) -> Self {
        Self {
            id,
            shape: FeatureShape::Segment(start, end),
            ele: None,
        }
    }

    pub fn line(id: u64, points: Vec<DVec2>) -> Self {
        Self {
            id,
            shape: FeatureShape::Line(points),
            ele: None,
        }
    }

    pub fn area(id: u64, polygon: Polygon2) -> Self {
        Self {
            id,
            shape: FeatureShape::Area(polygon),
            ele: None,
        }
    }

    /// Setzt eine explizite Höhe.
    pub fn with_ele(mut self, ele: f64) -> Self {
        self.ele = Some(ele);
        self
    }

    /// Position, an der eine explizite Höhe als bekannte Site gilt.
    ///
    /// Knoten liefern ihre Position, Linien und Flächen ihren ersten Punkt.
    pub fn anchor(&self) -> Option<DVec2> {
        match &self.shape {
            FeatureShape::Node(pos) => Some(*pos),
            FeatureShape::Segment(start, _) => Some(*start),
            FeatureShape::Line(points) => points.first().copied(),
            FeatureShape::Area(polygon) => polygon.vertices().first().copied(),
        }
    }
}

impl Bounded for MapFeature {
    fn bounding_box(&self) -> Rect {
        match &self.shape {
            FeatureShape::Node(pos) => pos.bounding_box(),
            FeatureShape::Segment(start, end) => Rect::new(*start, *end),
            FeatureShape::Line(points) => Rect::enclosing(points.iter().copied())
                .unwrap_or_else(|| Rect::new(DVec2::ZERO, DVec2::ZERO)),
            FeatureShape::Area(polygon) => polygon.bounding_box(),
        }
    }

    fn intersects(&self, rect: &Rect) -> bool {
        match &self.shape {
            FeatureShape::Node(pos) => rect.contains(*pos),
            FeatureShape::Segment(start, end) => rect.intersects_segment(*start, *end),
            FeatureShape::Line(points) => match points.as_slice() {
                [] => false,
                [single] => rect.contains(*single),
                _ => points
                    .windows(2)
                    .any(|pair| rect.intersects_segment(pair[0], pair[1])),
            },
            FeatureShape::Area(polygon) => polygon.intersects(rect),
        }
    }
}

/// Ein vollständiger Eingabedatensatz
#[derive(Debug, Clone)]
pub struct MapData {
    /// Datensatzgrenzen
    pub boundary: Rect,
    /// Alle Features
    pub features: Vec<MapFeature>,
}

impl MapData {
    pub fn new(boundary: Rect) -> Self {
        Self {
            boundary,
            features: Vec::new(),
        }
    }

    pub fn add_feature(&mut self, feature: MapFeature) {
        self.features.push(feature);
    }

    /// Baut den Quadtree über alle Features.
    pub fn build_quadtree(&self) -> Quadtree<MapFeature> {
        self.build_quadtree_with_split_size(scene_spatial::LEAF_SPLIT_SIZE)
    }

    /// Wie [`Self::build_quadtree`], mit eigener Split-Schwelle.
    pub fn build_quadtree_with_split_size(&self, split_size: usize) -> Quadtree<MapFeature> {
        let mut tree = Quadtree::with_split_size(self.boundary, split_size);
        for feature in &self.features {
            tree.insert(feature.clone());
        }
        log::debug!(
            "Quadtree aufgebaut: {} Features, {} Blätter, max. {} pro Blatt",
            tree.len(),
            tree.leaf_count(),
            tree.max_leaf_len()
        );
        tree
    }

    /// Sammelt alle Features mit expliziter Höhe als bekannte Sites.
    pub fn tagged_sites(&self) -> Vec<DVec3> {
        self.features
            .iter()
            .filter_map(|feature| {
                let ele = feature.ele?;
                let pos = feature.anchor()?;
                Some(pos.extend(ele))
            })
            .collect()
    }

    /// Tastet den Datensatzrand in Abständen von höchstens `spacing` ab.
    ///
    /// Ungültige Abstände liefern nur die Ecken; sehr kleine werden auf
    /// [`MAX_BOUNDARY_SAMPLES_PER_EDGE`] Punkte je Kante begrenzt.
    ///
    /// Liefert Positionen (ohne Höhe), z.B. um dort Geländewerte
    /// aus einer externen Quelle zu ergänzen.
    pub fn boundary_samples(&self, spacing: f64) -> Vec<DVec2> {
        let corners = self.boundary.corners();
        let mut samples = Vec::new();
        for i in 0..4 {
            let start = corners[i];
            let end = corners[(i + 1) % 4];
            let length = start.distance(end);
            let steps = if spacing.is_finite() && spacing > 0.0 {
                let wanted = (length / spacing).ceil().max(1.0);
                if wanted > MAX_BOUNDARY_SAMPLES_PER_EDGE as f64 {
                    log::warn!(
                        "Randabstand {} zu klein, begrenze auf {} Punkte je Kante",
                        spacing,
                        MAX_BOUNDARY_SAMPLES_PER_EDGE
                    );
                    MAX_BOUNDARY_SAMPLES_PER_EDGE
                } else {
                    wanted as usize
                }
            } else {
                1
            };
            for step in 0..steps {
                samples.push(start.lerp(end, step as f64 / steps as f64));
            }
        }
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_data() -> MapData {
        let mut data = MapData::new(Rect::from_bounds(0.0, 0.0, 100.0, 100.0));
        data.add_feature(MapFeature::node(1, DVec2::new(10.0, 10.0)).with_ele(42.0));
        data.add_feature(MapFeature::segment(
            2,
            DVec2::new(0.0, 60.0),
            DVec2::new(100.0, 60.0),
        ));
        data.add_feature(MapFeature::area(
            3,
            Polygon2::new(vec![
                DVec2::new(70.0, 10.0),
                DVec2::new(90.0, 10.0),
                DVec2::new(90.0, 30.0),
                DVec2::new(70.0, 30.0),
            ])
            .expect("gültiges Polygon"),
        ));
        data
    }

    #[test]
    fn test_tagged_sites_only_from_features_with_ele() {
        let sites = sample_data().tagged_sites();

        assert_eq!(sites, vec![DVec3::new(10.0, 10.0, 42.0)]);
    }

    #[test]
    fn test_segment_only_in_touched_leaves() {
        let tree = sample_data().build_quadtree();

        let hits = tree.query(&Rect::from_bounds(40.0, 55.0, 45.0, 65.0));
        let ids: Vec<u64> = hits.iter().map(|(_, f)| f.id).collect();
        assert_eq!(ids, vec![2]);

        let hits = tree.query(&Rect::from_bounds(75.0, 15.0, 80.0, 20.0));
        let ids: Vec<u64> = hits.iter().map(|(_, f)| f.id).collect();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn test_boundary_samples_are_bounded() {
        let data = MapData::new(Rect::from_bounds(0.0, 0.0, 1000.0, 1000.0));

        assert_eq!(
            data.boundary_samples(1e-12).len(),
            4 * MAX_BOUNDARY_SAMPLES_PER_EDGE
        );
        for spacing in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            assert_eq!(data.boundary_samples(spacing).len(), 4);
        }
    }

    #[test]
    fn test_boundary_samples_cover_corners() {
        let samples = sample_data().boundary_samples(25.0);

        assert_eq!(samples.len(), 16);
        assert!(samples.contains(&DVec2::new(0.0, 0.0)));
        assert!(samples.contains(&DVec2::new(100.0, 100.0)));
    }
}
