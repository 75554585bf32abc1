//! Achsparalleles Rechteck und die `Bounded`-Schnittstelle.

use glam::DVec2;

/// Achsparalleles Rechteck in der XY-Ebene (geschlossene Grenzen).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    /// Linke untere Ecke
    pub min: DVec2,
    /// Rechte obere Ecke
    pub max: DVec2,
}

impl Rect {
    /// Erstellt ein Rechteck aus zwei beliebigen Ecken.
    pub fn new(a: DVec2, b: DVec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Erstellt ein Rechteck aus Einzelkoordinaten.
    pub fn from_bounds(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::new(DVec2::new(min_x, min_y), DVec2::new(max_x, max_y))
    }

    /// Kleinstes Rechteck, das alle Punkte umschließt. `None` bei leerer Eingabe.
    pub fn enclosing<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = DVec2>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Self { min, max })
    }

    /// Vergrößert das Rechteck um `margin` in alle Richtungen.
    pub fn pad(&self, margin: f64) -> Self {
        Self {
            min: self.min - DVec2::splat(margin),
            max: self.max + DVec2::splat(margin),
        }
    }

    /// Kleinstes Rechteck, das beide Rechtecke umschließt.
    pub fn union(&self, other: &Rect) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> DVec2 {
        (self.min + self.max) * 0.5
    }

    /// Ecken gegen den Uhrzeigersinn, beginnend links unten.
    pub fn corners(&self) -> [DVec2; 4] {
        [
            self.min,
            DVec2::new(self.max.x, self.min.y),
            self.max,
            DVec2::new(self.min.x, self.max.y),
        ]
    }

    /// Die vier Viertel des Rechtecks: SW, SE, NW, NE.
    pub fn quarters(&self) -> [Rect; 4] {
        let c = self.center();
        [
            Rect::new(self.min, c),
            Rect::new(DVec2::new(c.x, self.min.y), DVec2::new(self.max.x, c.y)),
            Rect::new(DVec2::new(self.min.x, c.y), DVec2::new(c.x, self.max.y)),
            Rect::new(c, self.max),
        ]
    }

    /// Punkt liegt im Rechteck oder auf dessen Rand.
    pub fn contains(&self, p: DVec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Rechteck liegt vollständig in diesem Rechteck.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        self.contains(other.min) && self.contains(other.max)
    }

    /// Beide Rechtecke teilen mindestens einen Punkt.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }

    /// Projiziert einen Punkt auf das Rechteck (nächster Punkt im Rechteck).
    pub fn clamp(&self, p: DVec2) -> DVec2 {
        p.clamp(self.min, self.max)
    }

    /// Prüft, ob die Strecke `a`–`b` das Rechteck berührt (Liang-Barsky-Clipping).
    pub fn intersects_segment(&self, a: DVec2, b: DVec2) -> bool {
        if self.contains(a) || self.contains(b) {
            return true;
        }

        let d = b - a;
        let mut t_min = 0.0_f64;
        let mut t_max = 1.0_f64;

        for (p, q) in [
            (-d.x, a.x - self.min.x),
            (d.x, self.max.x - a.x),
            (-d.y, a.y - self.min.y),
            (d.y, self.max.y - a.y),
        ] {
            if p == 0.0 {
                // parallel zur Kante und außerhalb
                if q < 0.0 {
                    return false;
                }
                continue;
            }
            let t = q / p;
            if p < 0.0 {
                t_min = t_min.max(t);
            } else {
                t_max = t_max.min(t);
            }
            if t_min > t_max {
                return false;
            }
        }

        true
    }
}

/// Objekt mit einer Ausdehnung in der XY-Ebene.
///
/// `intersects` ist standardmäßig ein Bounding-Box-Test. Features mit exakter
/// Geometrie überschreiben ihn, damit Quadtree-Blätter nur Features erhalten,
/// die sie tatsächlich berühren.
pub trait Bounded {
    /// Minimales achsparalleles Rechteck um das Objekt
    fn bounding_box(&self) -> Rect;

    /// Berührt das Objekt das Rechteck?
    fn intersects(&self, rect: &Rect) -> bool {
        rect.overlaps(&self.bounding_box())
    }
}

impl Bounded for Rect {
    fn bounding_box(&self) -> Rect {
        *self
    }
}

impl Bounded for DVec2 {
    fn bounding_box(&self) -> Rect {
        Rect {
            min: *self,
            max: *self,
        }
    }

    fn intersects(&self, rect: &Rect) -> bool {
        rect.contains(*self)
    }
}

impl<T: Bounded + ?Sized> Bounded for &T {
    fn bounding_box(&self) -> Rect {
        (**self).bounding_box()
    }

    fn intersects(&self, rect: &Rect) -> bool {
        (**self).intersects(rect)
    }
}
