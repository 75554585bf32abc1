//! Ebene Geometrie-Primitive: Orientierung, Umkreis, einfache Polygone.
//!
//! Alle Koordinaten liegen in einem lokalen, projizierten System.
//! Die Ebene ist (x, y), die Höhe steht in `z`.

use anyhow::{bail, Result};
use glam::DVec2;
use scene_spatial::{Bounded, Rect};

/// Orientierung von `c` relativ zur gerichteten Strecke `a`→`b`.
///
/// Positiv: links (gegen den Uhrzeigersinn), negativ: rechts, 0: kollinear.
/// Der Betrag entspricht der doppelten Dreiecksfläche.
pub fn orient2d(a: DVec2, b: DVec2, c: DVec2) -> f64 {
    (b - a).perp_dot(c - a)
}

/// Umkreistest: positiv, wenn `d` im Umkreis des CCW-Dreiecks `a`,`b`,`c` liegt.
pub fn in_circle(a: DVec2, b: DVec2, c: DVec2, d: DVec2) -> f64 {
    let ad = a - d;
    let bd = b - d;
    let cd = c - d;

    let ad_len = ad.length_squared();
    let bd_len = bd.length_squared();
    let cd_len = cd.length_squared();

    ad.x * (bd.y * cd_len - bd_len * cd.y) - ad.y * (bd.x * cd_len - bd_len * cd.x)
        + ad_len * (bd.x * cd.y - bd.y * cd.x)
}

/// Umkreismittelpunkt eines Dreiecks. `None` für (nahezu) kollineare Punkte.
pub fn circumcenter(a: DVec2, b: DVec2, c: DVec2) -> Option<DVec2> {
    let ab = b - a;
    let ac = c - a;
    let d = 2.0 * ab.perp_dot(ac);

    let scale = ab.length_squared().max(ac.length_squared());
    if d.abs() <= f64::EPSILON * scale {
        return None;
    }

    let ab_len = ab.length_squared();
    let ac_len = ac.length_squared();
    let offset = DVec2::new(
        ac.y * ab_len - ab.y * ac_len,
        ab.x * ac_len - ac.x * ab_len,
    ) / d;

    Some(a + offset)
}

/// Vorzeichenbehaftete Fläche eines Rings (Shoelace), positiv bei CCW.
pub fn signed_area(ring: &[DVec2]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    let mut previous = ring[ring.len() - 1];
    for &current in ring {
        sum += previous.perp_dot(current);
        previous = current;
    }
    sum * 0.5
}

/// Prüft ob ein Punkt auf einem Liniensegment liegt.
pub fn point_on_segment(point: DVec2, a: DVec2, b: DVec2, tolerance: f64) -> bool {
    let ab = b - a;
    let ap = point - a;
    let len = ab.length();
    if len <= f64::EPSILON {
        return ap.length() <= tolerance;
    }
    if ab.perp_dot(ap).abs() / len > tolerance {
        return false;
    }

    let dot = ap.dot(ab);
    dot >= -tolerance * len && dot <= ab.length_squared() + tolerance * len
}

/// Einfaches Polygon ohne Löcher, gespeichert als offener Ring.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon2 {
    vertices: Vec<DVec2>,
}

impl Polygon2 {
    /// Erstellt ein Polygon. Ein wiederholter Schlusspunkt wird entfernt.
    pub fn new(mut vertices: Vec<DVec2>) -> Result<Self> {
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        if vertices.len() < 3 {
            bail!(
                "Polygon braucht mindestens 3 Eckpunkte, erhalten: {}",
                vertices.len()
            );
        }
        Ok(Self { vertices })
    }

    /// Eckpunkte des offenen Rings
    pub fn vertices(&self) -> &[DVec2] {
        &self.vertices
    }

    /// Kanten als Paare (Start, Ende), inklusive Schlusskante.
    pub fn edges(&self) -> impl Iterator<Item = (DVec2, DVec2)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }

    /// Flächeninhalt (immer positiv)
    pub fn area(&self) -> f64 {
        signed_area(&self.vertices).abs()
    }

    /// Prüft ob ein Punkt innerhalb des Polygons liegt (Ray-Casting, Rand zählt dazu).
    pub fn contains(&self, point: DVec2) -> bool {
        let mut inside = false;
        let mut previous = self.vertices[self.vertices.len() - 1];

        for &current in &self.vertices {
            if point_on_segment(point, previous, current, 1e-9) {
                return true;
            }

            if (current.y > point.y) != (previous.y > point.y) {
                let x_cross = (previous.x - current.x) * (point.y - current.y)
                    / (previous.y - current.y)
                    + current.x;
                if point.x < x_cross {
                    inside = !inside;
                }
            }

            previous = current;
        }

        inside
    }
}

impl Bounded for Polygon2 {
    fn bounding_box(&self) -> Rect {
        // Konstruktor garantiert mindestens 3 Eckpunkte
        Rect::enclosing(self.vertices.iter().copied())
            .unwrap_or_else(|| Rect::new(DVec2::ZERO, DVec2::ZERO))
    }

    fn intersects(&self, rect: &Rect) -> bool {
        if !rect.overlaps(&self.bounding_box()) {
            return false;
        }
        if self.vertices.iter().any(|v| rect.contains(*v)) {
            return true;
        }
        if self.edges().any(|(a, b)| rect.intersects_segment(a, b)) {
            return true;
        }
        // Rechteck komplett im Polygon
        self.contains(rect.center())
    }
}
