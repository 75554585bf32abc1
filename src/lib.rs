//! Scene Elevation Library.
//! Höhenauflösung für 2D-Kartendaten: Geländeschätzung aus bekannten Höhen,
//! vertikale Constraints zwischen Features und räumlicher Index.
//!
//! Typischer Ablauf:
//!
//! ```
//! use glam::{DVec2, DVec3};
//! use scene_elevation::{
//!     ConstraintKind, EleCollection, EleConnector, EleResolver, GroundState,
//! };
//!
//! let mut collection = EleCollection::new();
//! collection.add_sites([
//!     DVec3::new(0.0, 0.0, 10.0),
//!     DVec3::new(100.0, 0.0, 10.0),
//!     DVec3::new(0.0, 100.0, 10.0),
//! ]);
//! let road = collection.add_connector(EleConnector::new(
//!     DVec2::new(20.0, 20.0),
//!     Some(1),
//!     GroundState::On,
//! ));
//! let bridge = collection.add_connector(EleConnector::free(
//!     DVec2::new(20.0, 20.0),
//!     GroundState::Above,
//! ));
//! collection
//!     .constraints_mut()
//!     .require_vertical_distance(ConstraintKind::Min, 5.0, bridge, road);
//!
//! let resolution = EleResolver::default().resolve(collection)?;
//! let road_ele = resolution.elevations.ele(road).unwrap_or_default();
//! let bridge_ele = resolution.elevations.ele(bridge).unwrap_or_default();
//! assert!(bridge_ele - road_ele >= 5.0 - 1e-6);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod core;
pub mod shared;

pub use core::{
    ConnectorId, ConnectorRegistry, ConstraintKind, ConstraintSet, EleCollection, EleConnector,
    EleConnectorGroup, EleResolution, EleResolver, GroundState, ResolvedElevations,
    VerticalConstraint,
};
pub use core::{
    ConstraintConflict, ConstraintEnforcer, DelaunayTriangulation, EnforcementReport,
    FlatInterpolator, InverseDistanceInterpolator, IterativeEnforcer, NaturalNeighborInterpolator,
    NoneEnforcer, TerrainInterpolator,
};
pub use core::{FeatureShape, MapData, MapFeature, Polygon2};
pub use scene_spatial::{Bounded, FeatureId, QuadLeaf, Quadtree, Rect};
pub use shared::{ConflictPolicy, EleOptions, EnforcerStrategy, TerrainStrategy};
