//! Inkrementelle Delaunay-Triangulierung mit Natural-Neighbor-Abfrage.
//!
//! Die Triangulierung lebt in einem festen Rahmenrechteck. Dessen vier Ecken
//! sind Hilfsvertices (`frame`), alle echten Sites liegen strikt innerhalb.
//! Nach jedem Einfügen wird die Delaunay-Eigenschaft per Kanten-Flip
//! (Lawson) wiederhergestellt.
//!
//! Dreiecke sind CCW orientiert. `adj[i]` ist das Nachbardreieck gegenüber
//! `v[i]`, also jenseits der Kante `v[i+1]`–`v[i+2]`.

use std::collections::HashMap;

use anyhow::{bail, Result};
use glam::{DVec2, DVec3};
use scene_spatial::Rect;

use super::geometry::{circumcenter, in_circle, orient2d, signed_area};

/// Relative Toleranz der geometrischen Prädikate.
const PREDICATE_EPS: f64 = 1e-12;

/// Ein Vertex der Triangulierung
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleVertex {
    /// Position in der XY-Ebene
    pub pos: DVec2,
    /// Bekannte Höhe der Site
    pub ele: f64,
    /// Ecke des Rahmens (keine echte Site)
    pub frame: bool,
    /// Ein anliegendes Dreieck, Einstieg für den Fächer um den Vertex
    triangle: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Triangle {
    v: [usize; 3],
    adj: [Option<usize>; 3],
}

impl Triangle {
    fn local_index(&self, vertex: usize) -> Option<usize> {
        self.v.iter().position(|&v| v == vertex)
    }

    fn neighbor_index(&self, triangle: usize) -> Option<usize> {
        self.adj.iter().position(|&n| n == Some(triangle))
    }
}

/// Lage eines Punkts relativ zur Triangulierung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    /// Strikt im Dreieck
    Inside(usize),
    /// Auf der Kante gegenüber dem lokalen Vertex-Index
    OnEdge(usize, usize),
    /// Fällt mit einem Vertex zusammen
    Vertex(usize),
    /// Außerhalb des Rahmens
    Outside,
}

/// Natural-Neighbor-Koordinaten eines Abfragepunkts.
///
/// Enthält nur echte Sites; die Gewichte sind nicht negativ und summieren sich zu 1.
#[derive(Debug, Clone, PartialEq)]
pub struct NaturalNeighbors {
    /// Vertex-Indizes der natürlichen Nachbarn
    pub neighbors: Vec<usize>,
    /// Relative Gewichte (Sibson), gleiche Reihenfolge wie `neighbors`
    pub weights: Vec<f64>,
}

/// Delaunay-Triangulierung in einem festen Rahmen.
#[derive(Debug, Clone)]
pub struct DelaunayTriangulation {
    bounds: Rect,
    vertices: Vec<TriangleVertex>,
    triangles: Vec<Triangle>,
    /// Anzahl echter Sites
    sites: usize,
    /// Startdreieck für die nächste Punktsuche
    hint: usize,
}

impl DelaunayTriangulation {
    /// Erstellt eine Triangulierung aus zwei Dreiecken über dem Rahmen.
    pub fn new(bounds: Rect) -> Self {
        let vertices = bounds
            .corners()
            .into_iter()
            .enumerate()
            .map(|(index, pos)| TriangleVertex {
                pos,
                ele: 0.0,
                frame: true,
                triangle: if index == 3 { 1 } else { 0 },
            })
            .collect();

        let triangles = vec![
            Triangle {
                v: [0, 1, 2],
                adj: [None, Some(1), None],
            },
            Triangle {
                v: [0, 2, 3],
                adj: [None, None, Some(0)],
            },
        ];

        Self {
            bounds,
            vertices,
            triangles,
            sites: 0,
            hint: 0,
        }
    }

    /// Rahmen der Triangulierung
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Alle Vertices inklusive der vier Rahmenecken
    pub fn vertices(&self) -> &[TriangleVertex] {
        &self.vertices
    }

    pub fn vertex(&self, index: usize) -> Option<&TriangleVertex> {
        self.vertices.get(index)
    }

    /// Anzahl echter Sites (ohne Rahmen)
    pub fn site_count(&self) -> usize {
        self.sites
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Eckpunkte aller Dreiecke (CCW)
    pub fn triangles(&self) -> impl Iterator<Item = [DVec2; 3]> + '_ {
        self.triangles
            .iter()
            .map(move |t| t.v.map(|index| self.vertices[index].pos))
    }

    /// Fügt eine Site ein und gibt den Vertex-Index zurück.
    ///
    /// Sites müssen strikt im Rahmen liegen. Eine zweite Site an derselben
    /// Position wird ignoriert; es gilt die zuerst eingefügte Höhe.
    pub fn insert(&mut self, site: DVec3) -> Result<usize> {
        let pos = site.truncate();
        if !pos.is_finite() || !site.z.is_finite() {
            bail!("Site mit ungültigen Koordinaten: {:?}", site);
        }
        if pos.x <= self.bounds.min.x
            || pos.x >= self.bounds.max.x
            || pos.y <= self.bounds.min.y
            || pos.y >= self.bounds.max.y
        {
            bail!(
                "Site ({:.3}, {:.3}) liegt nicht strikt im Rahmen {:?}",
                pos.x,
                pos.y,
                self.bounds
            );
        }

        let location = self.locate(pos);
        if let Location::Vertex(existing) = location {
            log::debug!(
                "Doppelte Site bei ({:.3}, {:.3}) ignoriert",
                pos.x,
                pos.y
            );
            return Ok(existing);
        }

        let vertex = self.vertices.len();
        self.vertices.push(TriangleVertex {
            pos,
            ele: site.z,
            frame: false,
            triangle: 0,
        });

        match location {
            Location::Inside(t) => self.split_triangle(t, vertex),
            Location::OnEdge(t, k) => match self.triangles[t].adj[k] {
                Some(_) => self.split_edge(t, k, vertex),
                None => self.split_triangle(t, vertex),
            },
            Location::Vertex(_) | Location::Outside => {
                self.vertices.pop();
                bail!(
                    "Site ({:.3}, {:.3}) konnte nicht lokalisiert werden",
                    pos.x,
                    pos.y
                );
            }
        }

        self.sites += 1;
        Ok(vertex)
    }

    /// Natural-Neighbor-Koordinaten eines Punkts.
    ///
    /// Entspricht dem temporären Einfügen des Punkts: es wird der
    /// Bowyer-Watson-Hohlraum bestimmt und je Nachbar die Fläche berechnet,
    /// die seine Voronoi-Zelle an den neuen Punkt abgeben würde. Die
    /// Triangulierung selbst bleibt unverändert.
    ///
    /// Punkte außerhalb des Rahmens werden auf den Rahmen geklemmt. Gewichte
    /// der Rahmenecken fallen weg, der Rest wird normiert. Bleibt keine echte
    /// Site übrig, gewinnt die nächstgelegene. Ohne Sites ist das Ergebnis leer.
    pub fn probe(&self, query: DVec2) -> NaturalNeighbors {
        let empty = NaturalNeighbors {
            neighbors: Vec::new(),
            weights: Vec::new(),
        };
        if self.sites == 0 {
            return empty;
        }

        let q = self.clamp_into_frame(query);
        let start = match self.locate(q) {
            Location::Vertex(v) if !self.vertices[v].frame => {
                return NaturalNeighbors {
                    neighbors: vec![v],
                    weights: vec![1.0],
                };
            }
            Location::Vertex(_) | Location::Outside => {
                return self.nearest_site_weights(q).unwrap_or(empty);
            }
            Location::Inside(t) => (t, None),
            Location::OnEdge(t, k) => (t, self.triangles[t].adj[k]),
        };

        let raw = self
            .sibson_weights(q, start.0, start.1)
            .or_else(|| self.barycentric_weights(q, start.0));

        match raw.and_then(|raw| self.normalize_real(raw)) {
            Some(nn) => nn,
            None => self.nearest_site_weights(q).unwrap_or(empty),
        }
    }

    /// Interpolierte Höhe an einem Punkt (0.0 ohne Sites).
    pub fn interpolate(&self, query: DVec2) -> f64 {
        let nn = self.probe(query);
        nn.neighbors
            .iter()
            .zip(&nn.weights)
            .map(|(v, w)| self.vertices[*v].ele * w)
            .sum()
    }

    /// Indizes der Vertices, die mit `vertex` durch eine Kante verbunden sind.
    pub fn vertex_neighbors(&self, vertex: usize) -> Vec<usize> {
        let Some(start) = self.vertices.get(vertex).map(|v| v.triangle) else {
            return Vec::new();
        };
        let mut neighbors = Vec::new();

        // gegen den Uhrzeigersinn bis zum Rand oder zurück zum Start
        let mut current = start;
        loop {
            let tri = &self.triangles[current];
            let Some(k) = tri.local_index(vertex) else {
                return neighbors;
            };
            neighbors.push(tri.v[(k + 1) % 3]);
            match tri.adj[(k + 1) % 3] {
                Some(next) if next == start => return neighbors,
                Some(next) if neighbors.len() <= self.triangles.len() => current = next,
                Some(_) => return neighbors,
                None => {
                    neighbors.push(tri.v[(k + 2) % 3]);
                    break;
                }
            }
        }

        // Randvertex: vom Start aus im Uhrzeigersinn weiter
        let mut current = self.triangles[start]
            .local_index(vertex)
            .and_then(|k| self.triangles[start].adj[(k + 2) % 3]);
        while let Some(t) = current {
            let tri = &self.triangles[t];
            let Some(k) = tri.local_index(vertex) else {
                break;
            };
            let candidate = tri.v[(k + 1) % 3];
            if neighbors.contains(&candidate) {
                break;
            }
            neighbors.push(candidate);
            current = tri.adj[(k + 2) % 3];
        }

        neighbors
    }

    /// Prüft die lokale Delaunay-Eigenschaft und die Nachbarschafts-Symmetrie
    /// aller Dreiecke.
    pub fn is_valid_delaunay(&self) -> bool {
        for (t, tri) in self.triangles.iter().enumerate() {
            let [a, b, c] = tri.v.map(|v| self.vertices[v].pos);
            if orient2d(a, b, c) <= 0.0 {
                return false;
            }
            for (i, neighbor) in tri.adj.iter().enumerate() {
                let Some(n) = *neighbor else {
                    continue;
                };
                let other = &self.triangles[n];
                let Some(j) = other.neighbor_index(t) else {
                    return false;
                };
                // gemeinsame Kante muss übereinstimmen
                let edge = [tri.v[(i + 1) % 3], tri.v[(i + 2) % 3]];
                let back = [other.v[(j + 2) % 3], other.v[(j + 1) % 3]];
                if edge != back {
                    return false;
                }
                let d = self.vertices[other.v[j]].pos;
                if in_circle(a, b, c, d) > circle_tolerance(a, b, c, d) {
                    return false;
                }
            }
        }
        true
    }

    fn clamp_into_frame(&self, p: DVec2) -> DVec2 {
        let margin = DVec2::new(self.bounds.width(), self.bounds.height()) * 1e-9;
        p.clamp(self.bounds.min + margin, self.bounds.max - margin)
    }

    /// Sichtbarkeits-Lauf vom Hinweis-Dreieck zum Punkt.
    fn locate(&self, p: DVec2) -> Location {
        let mut t = self.hint.min(self.triangles.len() - 1);

        for _ in 0..=self.triangles.len() {
            let tri = &self.triangles[t];
            let mut next = None;
            for i in 0..3 {
                let a = self.vertices[tri.v[(i + 1) % 3]].pos;
                let b = self.vertices[tri.v[(i + 2) % 3]].pos;
                if orient2d(a, b, p) < -orient_tolerance(a, b, p) {
                    match tri.adj[i] {
                        Some(n) => next = Some(n),
                        None => return Location::Outside,
                    }
                    break;
                }
            }
            match next {
                Some(n) => t = n,
                None => return self.classify(t, p),
            }
        }

        // Lauf hängt (sollte bei gültiger Triangulierung nicht passieren)
        log::warn!(
            "Punktsuche bei ({:.3}, {:.3}) ohne Ergebnis, falle auf lineare Suche zurück",
            p.x,
            p.y
        );
        for (t, tri) in self.triangles.iter().enumerate() {
            let inside = (0..3).all(|i| {
                let a = self.vertices[tri.v[(i + 1) % 3]].pos;
                let b = self.vertices[tri.v[(i + 2) % 3]].pos;
                orient2d(a, b, p) >= -orient_tolerance(a, b, p)
            });
            if inside {
                return self.classify(t, p);
            }
        }
        Location::Outside
    }

    fn classify(&self, t: usize, p: DVec2) -> Location {
        let tri = &self.triangles[t];
        let scale = self.bounds.width().max(self.bounds.height());
        for &v in &tri.v {
            if self.vertices[v].pos.distance(p) <= scale * 1e-12 {
                return Location::Vertex(v);
            }
        }
        for i in 0..3 {
            let a = self.vertices[tri.v[(i + 1) % 3]].pos;
            let b = self.vertices[tri.v[(i + 2) % 3]].pos;
            if orient2d(a, b, p).abs() <= orient_tolerance(a, b, p) {
                return Location::OnEdge(t, i);
            }
        }
        Location::Inside(t)
    }

    fn replace_adj(&mut self, triangle: Option<usize>, old: usize, new: usize) {
        let Some(t) = triangle else {
            return;
        };
        if let Some(i) = self.triangles[t].neighbor_index(old) {
            self.triangles[t].adj[i] = Some(new);
        }
    }

    fn touch_vertices(&mut self, t: usize) {
        for v in self.triangles[t].v {
            self.vertices[v].triangle = t;
        }
    }

    /// Teilt ein Dreieck (a, b, c) am inneren Punkt p in drei Dreiecke.
    fn split_triangle(&mut self, t: usize, p: usize) {
        let Triangle {
            v: [a, b, c],
            adj: [na, nb, nc],
        } = self.triangles[t];

        let t0 = t;
        let t1 = self.triangles.len();
        let t2 = t1 + 1;

        self.triangles[t0] = Triangle {
            v: [a, b, p],
            adj: [Some(t1), Some(t2), nc],
        };
        self.triangles.push(Triangle {
            v: [b, c, p],
            adj: [Some(t2), Some(t0), na],
        });
        self.triangles.push(Triangle {
            v: [c, a, p],
            adj: [Some(t0), Some(t1), nb],
        });
        self.replace_adj(na, t, t1);
        self.replace_adj(nb, t, t2);

        for tri in [t0, t1, t2] {
            self.touch_vertices(tri);
        }
        self.legalize(p, vec![t0, t1, t2]);
    }

    /// Teilt die Kante gegenüber `v[k]` von `t` und das Nachbardreieck am Punkt p.
    fn split_edge(&mut self, t: usize, k: usize, p: usize) {
        let tri = self.triangles[t];
        let Some(u) = tri.adj[k] else {
            self.split_triangle(t, p);
            return;
        };
        let other = self.triangles[u];
        let Some(j) = other.neighbor_index(t) else {
            self.split_triangle(t, p);
            return;
        };

        let a = tri.v[k];
        let b = tri.v[(k + 1) % 3];
        let c = tri.v[(k + 2) % 3];
        let d = other.v[j];
        let n_ab = tri.adj[(k + 2) % 3];
        let n_ca = tri.adj[(k + 1) % 3];
        let n_bd = other.adj[(j + 1) % 3];
        let n_dc = other.adj[(j + 2) % 3];

        let t0 = t;
        let u0 = u;
        let t1 = self.triangles.len();
        let u1 = t1 + 1;

        self.triangles[t0] = Triangle {
            v: [a, b, p],
            adj: [Some(u1), Some(t1), n_ab],
        };
        self.triangles[u0] = Triangle {
            v: [d, c, p],
            adj: [Some(t1), Some(u1), n_dc],
        };
        self.triangles.push(Triangle {
            v: [a, p, c],
            adj: [Some(u0), n_ca, Some(t0)],
        });
        self.triangles.push(Triangle {
            v: [d, p, b],
            adj: [Some(t0), n_bd, Some(u0)],
        });
        self.replace_adj(n_ca, t, t1);
        self.replace_adj(n_bd, u, u1);

        for tri in [t0, u0, t1, u1] {
            self.touch_vertices(tri);
        }
        self.legalize(p, vec![t0, t1, u0, u1]);
    }

    /// Stellt die Delaunay-Eigenschaft um den neuen Vertex p per Flip wieder her.
    fn legalize(&mut self, p: usize, mut stack: Vec<usize>) {
        while let Some(t) = stack.pop() {
            let tri = self.triangles[t];
            let Some(k) = tri.local_index(p) else {
                continue;
            };
            let Some(u) = tri.adj[k] else {
                continue;
            };
            let other = self.triangles[u];
            let Some(j) = other.neighbor_index(t) else {
                continue;
            };

            let x = tri.v[(k + 1) % 3];
            let y = tri.v[(k + 2) % 3];
            let d = other.v[j];
            let [pp, px, py, pd] = [p, x, y, d].map(|v| self.vertices[v].pos);
            if in_circle(pp, px, py, pd) <= circle_tolerance(pp, px, py, pd) {
                continue;
            }

            let a_px = tri.adj[(k + 2) % 3];
            let a_yp = tri.adj[(k + 1) % 3];
            let b_dy = other.adj[(j + 2) % 3];
            let b_xd = other.adj[(j + 1) % 3];

            self.triangles[t] = Triangle {
                v: [p, x, d],
                adj: [b_xd, Some(u), a_px],
            };
            self.triangles[u] = Triangle {
                v: [p, d, y],
                adj: [b_dy, a_yp, Some(t)],
            };
            self.replace_adj(b_xd, u, t);
            self.replace_adj(a_yp, t, u);

            self.touch_vertices(t);
            self.touch_vertices(u);
            stack.push(t);
            stack.push(u);
        }

        self.hint = self.vertices[p].triangle;
    }

    /// Sibson-Gewichte aus dem Bowyer-Watson-Hohlraum um q (inkl. Rahmenecken).
    fn sibson_weights(
        &self,
        q: DVec2,
        start: usize,
        also: Option<usize>,
    ) -> Option<Vec<(usize, f64)>> {
        let cavity = self.cavity(q, start, also);

        // Randkanten des Hohlraums: von → (nach, Dreieck)
        let mut boundary: HashMap<usize, (usize, usize)> = HashMap::new();
        for &t in &cavity.members {
            let tri = &self.triangles[t];
            for i in 0..3 {
                let outside = match tri.adj[i] {
                    Some(n) => !cavity.contains(n),
                    None => true,
                };
                if outside {
                    boundary.insert(tri.v[(i + 1) % 3], (tri.v[(i + 2) % 3], t));
                }
            }
        }

        // Ring der natürlichen Nachbarn in CCW-Reihenfolge
        let (&first, _) = boundary.iter().min_by_key(|(v, _)| **v)?;
        let mut ring: Vec<(usize, usize)> = Vec::with_capacity(boundary.len());
        let mut current = first;
        loop {
            let &(next, t) = boundary.get(&current)?;
            ring.push((current, t));
            current = next;
            if current == first {
                break;
            }
            if ring.len() > boundary.len() {
                return None;
            }
        }
        if ring.len() != boundary.len() || ring.len() < 3 {
            return None;
        }

        let n = ring.len();
        let mut weights = Vec::with_capacity(n);
        for i in 0..n {
            let (prev, t_in) = ring[(i + n - 1) % n];
            let (vertex, t_out) = ring[i];
            let (next, _) = ring[(i + 1) % n];

            let pos = |v: usize| self.vertices[v].pos;
            let g_prev = circumcenter(q, pos(prev), pos(vertex))?;
            let g_next = circumcenter(q, pos(vertex), pos(next))?;

            let mut polygon = vec![g_prev];
            let mut t = t_in;
            for _ in 0..=cavity.members.len() {
                let tri = &self.triangles[t];
                let [a, b, c] = tri.v.map(pos);
                polygon.push(circumcenter(a, b, c)?);
                if t == t_out {
                    break;
                }
                let k = tri.local_index(vertex)?;
                t = tri.adj[(k + 2) % 3].filter(|n| cavity.contains(*n))?;
            }
            polygon.push(g_next);

            weights.push((vertex, signed_area(&polygon).abs()));
        }

        Some(weights)
    }

    /// Alle Dreiecke, deren Umkreis q enthält, zusammenhängend ab `start`.
    fn cavity(&self, q: DVec2, start: usize, also: Option<usize>) -> Cavity {
        let mut cavity = Cavity {
            members: vec![start],
        };
        if let Some(n) = also {
            cavity.members.push(n);
        }

        let mut index = 0;
        while index < cavity.members.len() {
            let t = cavity.members[index];
            index += 1;
            for neighbor in self.triangles[t].adj.into_iter().flatten() {
                if cavity.contains(neighbor) {
                    continue;
                }
                let [a, b, c] = self.triangles[neighbor].v.map(|v| self.vertices[v].pos);
                if in_circle(a, b, c, q) > circle_tolerance(a, b, c, q) {
                    cavity.members.push(neighbor);
                }
            }
        }

        cavity
    }

    /// Baryzentrische Gewichte im Dreieck, Rückfall bei degenerierten Hohlräumen.
    fn barycentric_weights(&self, q: DVec2, t: usize) -> Option<Vec<(usize, f64)>> {
        let tri = &self.triangles[t];
        let [a, b, c] = tri.v.map(|v| self.vertices[v].pos);
        let total = orient2d(a, b, c);
        if total <= 0.0 {
            return None;
        }
        let weights = [
            orient2d(b, c, q) / total,
            orient2d(c, a, q) / total,
            orient2d(a, b, q) / total,
        ];
        Some(
            tri.v
                .iter()
                .zip(weights)
                .map(|(v, w)| (*v, w.max(0.0)))
                .collect(),
        )
    }

    /// Entfernt Rahmenecken und normiert auf Summe 1.
    fn normalize_real(&self, raw: Vec<(usize, f64)>) -> Option<NaturalNeighbors> {
        let real: Vec<(usize, f64)> = raw
            .into_iter()
            .filter(|(v, w)| !self.vertices[*v].frame && w.is_finite() && *w > 0.0)
            .collect();
        let total: f64 = real.iter().map(|(_, w)| w).sum();
        if !(total > 0.0) || !total.is_finite() {
            return None;
        }
        Some(NaturalNeighbors {
            neighbors: real.iter().map(|(v, _)| *v).collect(),
            weights: real.iter().map(|(_, w)| w / total).collect(),
        })
    }

    fn nearest_site_weights(&self, q: DVec2) -> Option<NaturalNeighbors> {
        let (index, _) = self
            .vertices
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.frame)
            .min_by(|(_, a), (_, b)| {
                a.pos
                    .distance_squared(q)
                    .total_cmp(&b.pos.distance_squared(q))
            })?;
        Some(NaturalNeighbors {
            neighbors: vec![index],
            weights: vec![1.0],
        })
    }
}

/// Dreiecke im Bowyer-Watson-Hohlraum (typisch nur eine Handvoll)
struct Cavity {
    members: Vec<usize>,
}

impl Cavity {
    fn contains(&self, t: usize) -> bool {
        self.members.contains(&t)
    }
}

fn orient_tolerance(a: DVec2, b: DVec2, p: DVec2) -> f64 {
    let scale = (b - a).length_squared().max((p - a).length_squared());
    PREDICATE_EPS * scale
}

fn circle_tolerance(a: DVec2, b: DVec2, c: DVec2, d: DVec2) -> f64 {
    let scale = [a, b, c]
        .iter()
        .map(|p| p.distance_squared(d))
        .fold(0.0_f64, f64::max);
    PREDICATE_EPS * scale * scale
}
