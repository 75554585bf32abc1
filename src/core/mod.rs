//! Core-Domänentypen: Geometrie, Connectoren, Constraints, Gelände, Enforcer.

pub mod connector;
pub mod constraint;
pub mod enforcer;
pub mod geometry;
/// Eingabemodell der Map-Features
///
/// Features tragen nur 2D-Geometrie und eine optionale explizite Höhe.
/// Der Quadtree dazu kommt aus `scene_spatial`.
pub mod map_data;
pub mod resolver;
pub mod terrain;
pub mod triangulation;

pub use connector::{
    ConnectorId, ConnectorRegistry, EleConnector, EleConnectorGroup, GroundState,
    ResolvedElevations,
};
pub use constraint::{ConstraintKind, ConstraintSet, VerticalConstraint};
pub use enforcer::{
    create_enforcer, ConstraintConflict, ConstraintEnforcer, EnforcementReport, IterativeEnforcer,
    NoneEnforcer,
};
pub use geometry::Polygon2;
pub use map_data::{FeatureShape, MapData, MapFeature};
pub use resolver::{EleCollection, EleResolution, EleResolver};
pub use terrain::{
    create_interpolator, FlatInterpolator, InverseDistanceInterpolator,
    NaturalNeighborInterpolator, TerrainInterpolator,
};
pub use triangulation::{DelaunayTriangulation, NaturalNeighbors, TriangleVertex};
