//! Adaptiver Quadtree über 2D-Features.
//!
//! Der Baum ist ein Schnitt-Index, keine Partition: ein Feature wird in
//! *jedem* Blatt abgelegt, dessen Grenzen es berührt. Abfragen finden es daher
//! unabhängig davon, von welcher Seite einer Zellgrenze sie kommen.
//!
//! Knoten und Features liegen in Arenen und werden über Handles adressiert.
//! Ein Blatt wird zum inneren Knoten, sobald es die Split-Größe erreicht,
//! aber nur, wenn danach kein Kind alle Features des Blatts enthielte.
//! Bei stark geclusterten Daten bleiben Blätter deshalb beliebig groß.

use crate::rect::{Bounded, Rect};

/// Standard-Split-Größe eines Blatts.
pub const LEAF_SPLIT_SIZE: usize = 11;

/// Handle eines Features im Quadtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(pub usize);

/// Handle eines Knotens im Quadtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeKind {
    /// Innerer Knoten mit genau vier Kindern (SW, SE, NW, NE)
    Inner([NodeId; 4]),
    /// Blatt mit den Features, die seine Grenzen berühren
    Leaf(Vec<FeatureId>),
}

#[derive(Debug, Clone)]
struct QuadNode {
    bounds: Rect,
    kind: NodeKind,
}

/// Lesende Sicht auf ein Blatt.
#[derive(Debug, Clone, Copy)]
pub struct QuadLeaf<'a, T> {
    bounds: Rect,
    items: &'a [FeatureId],
    features: &'a [T],
}

impl<'a, T> QuadLeaf<'a, T> {
    /// Grenzen des Blatts
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Anzahl der im Blatt abgelegten Features
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Handles der Features in Einfügereihenfolge
    pub fn ids(&self) -> &'a [FeatureId] {
        self.items
    }

    /// Iterator über die Features des Blatts
    pub fn features(&self) -> impl Iterator<Item = &'a T> + 'a {
        let features = self.features;
        self.items.iter().map(move |id| &features[id.0])
    }

    /// Prüft, ob das Feature in diesem Blatt liegt.
    pub fn holds(&self, id: FeatureId) -> bool {
        self.items.contains(&id)
    }
}

/// Quadtree über Features mit 2D-Ausdehnung.
///
/// Nur zum Anhängen gedacht: Features werden während eines Durchlaufs
/// eingefügt und nie wieder entfernt, Blätter werden nie zusammengeführt.
#[derive(Debug, Clone)]
pub struct Quadtree<T> {
    nodes: Vec<QuadNode>,
    features: Vec<T>,
    split_size: usize,
}

impl<T: Bounded> Quadtree<T> {
    /// Erstellt einen leeren Quadtree mit der Standard-Split-Größe.
    pub fn new(bounds: Rect) -> Self {
        Self::with_split_size(bounds, LEAF_SPLIT_SIZE)
    }

    /// Erstellt einen leeren Quadtree mit eigener Split-Größe (mindestens 1).
    ///
    /// Die Wurzel ist immer ein innerer Knoten mit vier leeren Blättern.
    pub fn with_split_size(bounds: Rect, split_size: usize) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            features: Vec::new(),
            split_size: split_size.max(1),
        };

        tree.nodes.push(QuadNode {
            bounds,
            kind: NodeKind::Leaf(Vec::new()),
        });
        let children = tree.push_quarters(bounds, [Vec::new(), Vec::new(), Vec::new(), Vec::new()]);
        tree.nodes[0].kind = NodeKind::Inner(children);

        tree
    }

    /// Grenzen des gesamten Baums
    pub fn bounds(&self) -> Rect {
        self.nodes[0].bounds
    }

    pub fn split_size(&self) -> usize {
        self.split_size
    }

    /// Anzahl eingefügter Features (auch solcher außerhalb der Grenzen)
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Gibt das Feature zu einem Handle zurück.
    pub fn get(&self, id: FeatureId) -> Option<&T> {
        self.features.get(id.0)
    }

    /// Iterator über alle Features in Einfügereihenfolge.
    pub fn iter(&self) -> impl Iterator<Item = (FeatureId, &T)> {
        self.features
            .iter()
            .enumerate()
            .map(|(index, feature)| (FeatureId(index), feature))
    }

    /// Fügt ein Feature ein und gibt sein Handle zurück.
    ///
    /// Das Feature landet in jedem Blatt, das es berührt. Liegt es komplett
    /// außerhalb der Baumgrenzen, wird es nur gespeichert.
    pub fn insert(&mut self, feature: T) -> FeatureId {
        let id = FeatureId(self.features.len());
        let touches_root = feature.intersects(&self.nodes[0].bounds);
        self.features.push(feature);

        if touches_root {
            self.add(NodeId(0), id);
        } else {
            log::debug!(
                "Feature {} liegt außerhalb der Quadtree-Grenzen und wird keinem Blatt zugeordnet",
                id.0
            );
        }

        id
    }

    /// Alle Blätter, deren Grenzen das Objekt berühren.
    ///
    /// Steigt nur in Knoten ab, deren Grenzen das Objekt berühren.
    pub fn probe_leaves<B: Bounded + ?Sized>(&self, object: &B) -> Vec<QuadLeaf<'_, T>> {
        let mut leaves = Vec::new();
        let mut stack = vec![NodeId(0)];

        while let Some(node_id) = stack.pop() {
            let node = &self.nodes[node_id.0];
            if !object.intersects(&node.bounds) {
                continue;
            }
            match &node.kind {
                NodeKind::Inner(children) => stack.extend(children.iter().rev().copied()),
                NodeKind::Leaf(items) => leaves.push(self.leaf_view(node.bounds, items)),
            }
        }

        leaves
    }

    /// Alle Features, die das Objekt berühren, ohne Duplikate, in Einfügereihenfolge.
    ///
    /// Kandidaten aus den Blättern werden zusätzlich gegen die Bounding-Box des
    /// Objekts geprüft, damit Nachbarn in derselben Zelle nicht mitgeliefert werden.
    pub fn query<B: Bounded + ?Sized>(&self, object: &B) -> Vec<(FeatureId, &T)> {
        let region = object.bounding_box();
        let mut ids: Vec<FeatureId> = self
            .probe_leaves(object)
            .iter()
            .flat_map(|leaf| leaf.ids().iter().copied())
            .collect();
        ids.sort_unstable();
        ids.dedup();

        ids.into_iter()
            .map(|id| (id, &self.features[id.0]))
            .filter(|(_, feature)| feature.intersects(&region))
            .collect()
    }

    /// Alle Blätter des Baums (Tiefensuche, SW-SE-NW-NE).
    pub fn leaves(&self) -> Vec<QuadLeaf<'_, T>> {
        let mut leaves = Vec::new();
        self.collect_leaves(NodeId(0), &mut leaves);
        leaves
    }

    /// Anzahl der Blätter
    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node.kind, NodeKind::Leaf(_)))
            .count()
    }

    /// Größte Anzahl Features in einem einzelnen Blatt
    pub fn max_leaf_len(&self) -> usize {
        self.nodes
            .iter()
            .filter_map(|node| match &node.kind {
                NodeKind::Leaf(items) => Some(items.len()),
                NodeKind::Inner(_) => None,
            })
            .max()
            .unwrap_or(0)
    }

    fn collect_leaves<'a>(&'a self, node_id: NodeId, leaves: &mut Vec<QuadLeaf<'a, T>>) {
        let node = &self.nodes[node_id.0];
        match &node.kind {
            NodeKind::Inner(children) => {
                for child in children {
                    self.collect_leaves(*child, leaves);
                }
            }
            NodeKind::Leaf(items) => leaves.push(self.leaf_view(node.bounds, items)),
        }
    }

    fn leaf_view<'a>(&'a self, bounds: Rect, items: &'a [FeatureId]) -> QuadLeaf<'a, T> {
        QuadLeaf {
            bounds,
            items,
            features: &self.features,
        }
    }

    /// Fügt ein Feature ab einem Knoten ein (Knotengrenzen wurden bereits geprüft).
    fn add(&mut self, node_id: NodeId, id: FeatureId) {
        let children = match &mut self.nodes[node_id.0].kind {
            NodeKind::Inner(children) => *children,
            NodeKind::Leaf(items) => {
                items.push(id);
                if items.len() >= self.split_size {
                    self.try_split(node_id);
                }
                return;
            }
        };

        // Schleife läuft weiter: ein Feature darf Blattgrenzen überqueren
        for child in children {
            if self.features[id.0].intersects(&self.nodes[child.0].bounds) {
                self.add(child, id);
            }
        }
    }

    /// Versucht, ein volles Blatt in vier Viertel zu teilen.
    fn try_split(&mut self, leaf_id: NodeId) {
        let node = &self.nodes[leaf_id.0];
        let NodeKind::Leaf(items) = &node.kind else {
            return;
        };

        let bounds = node.bounds;
        let quarters = bounds.quarters();
        let mut distributed: [Vec<FeatureId>; 4] = Default::default();
        for &id in items {
            let feature = &self.features[id.0];
            for (quarter, bucket) in quarters.iter().zip(distributed.iter_mut()) {
                if feature.intersects(quarter) {
                    bucket.push(id);
                }
            }
        }

        // Ein Kind mit allen Features würde sofort wieder splitten wollen
        if distributed.iter().any(|bucket| bucket.len() == items.len()) {
            log::trace!(
                "Split von Blatt {} übersprungen: {} Features lassen sich nicht verteilen",
                leaf_id.0,
                items.len()
            );
            return;
        }

        let children = self.push_quarters(bounds, distributed);
        self.nodes[leaf_id.0].kind = NodeKind::Inner(children);

        for child in children {
            let overfull = matches!(
                &self.nodes[child.0].kind,
                NodeKind::Leaf(items) if items.len() >= self.split_size
            );
            if overfull {
                self.try_split(child);
            }
        }
    }

    fn push_quarters(&mut self, bounds: Rect, items: [Vec<FeatureId>; 4]) -> [NodeId; 4] {
        let first = self.nodes.len();
        for (quarter, items) in bounds.quarters().into_iter().zip(items) {
            self.nodes.push(QuadNode {
                bounds: quarter,
                kind: NodeKind::Leaf(items),
            });
        }
        [
            NodeId(first),
            NodeId(first + 1),
            NodeId(first + 2),
            NodeId(first + 3),
        ]
    }
}
