//! `scene_spatial`: räumlicher Index für 2D-Szenenfeatures.
//!
//! Enthält das achsparallele Rechteck [`Rect`], die Schnittstelle [`Bounded`]
//! für Objekte mit 2D-Ausdehnung und den adaptiven [`Quadtree`], über den
//! die übrigen Subsysteme abfragen, welche Features eine Region berühren.
//!
//! # Beispiel
//! ```
//! use glam::DVec2;
//! use scene_spatial::{Quadtree, Rect};
//!
//! let mut tree = Quadtree::new(Rect::from_bounds(0.0, 0.0, 100.0, 100.0));
//! tree.insert(DVec2::new(10.0, 10.0));
//! tree.insert(DVec2::new(80.0, 20.0));
//!
//! let hits = tree.query(&Rect::from_bounds(0.0, 0.0, 50.0, 50.0));
//! assert_eq!(hits.len(), 1);
//! ```

pub mod quadtree;
pub mod rect;

pub use quadtree::{FeatureId, LEAF_SPLIT_SIZE, QuadLeaf, Quadtree};
pub use rect::{Bounded, Rect};
