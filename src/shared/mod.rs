//! Geteilte Typen für modulübergreifende Verträge.
//!
//! Enthält die Laufzeit-Optionen, die Terrain, Enforcer und Pipeline
//! gemeinsam lesen, um direkte Abhängigkeiten zu vermeiden.

pub mod options;

pub use options::{ConflictPolicy, EleOptions, EnforcerStrategy, TerrainStrategy};
