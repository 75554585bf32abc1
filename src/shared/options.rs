//! Zentrale Konfiguration der Höhenauflösung.
//!
//! `EleOptions` enthält alle einstellbaren Werte eines Durchlaufs.
//! Die `const`-Werte bleiben als Fallback/Default erhalten.

use serde::{Deserialize, Serialize};

// ── Quadtree ────────────────────────────────────────────────────────

/// Anzahl Features, ab der ein Blatt eine Teilung versucht.
pub const QUADTREE_SPLIT_SIZE: usize = scene_spatial::LEAF_SPLIT_SIZE;

// ── Terrain ─────────────────────────────────────────────────────────

/// Rand um die bekannten Sites für den Triangulierungs-Rahmen (Welteinheiten).
pub const SITE_PADDING: f64 = 100.0;
/// Untergrenze für den Rand, damit Sites strikt im Rahmen liegen.
pub const SITE_PADDING_MIN: f64 = 1e-3;
/// Höhe der flachen Strategie.
pub const FLAT_ELE: f64 = 0.0;
/// Suchradius der inversen Distanzgewichtung (Welteinheiten).
pub const IDW_RADIUS: f64 = 200.0;
/// Exponent der inversen Distanzgewichtung.
pub const IDW_POWER: f64 = 2.0;
/// Abtastabstand entlang des Datensatzrands (Welteinheiten).
pub const BOUNDARY_SAMPLE_SPACING: f64 = 50.0;

// ── Constraints ─────────────────────────────────────────────────────

/// Maximale Anzahl Relaxations-Durchläufe je Komponente.
pub const MAX_ITERATIONS: usize = 100;
/// Toleranz, unter der ein Constraint als erfüllt gilt (Meter).
pub const CONSTRAINT_TOLERANCE: f64 = 1e-6;

/// Strategie zur Schätzung der Geländehöhe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerrainStrategy {
    /// Konstante Höhe, keine Geländedaten
    Flat,
    /// Natural-Neighbor über Delaunay-Triangulierung
    #[default]
    NaturalNeighbor,
    /// Inverse Distanzgewichtung über KD-Tree
    InverseDistance,
}

/// Strategie zur Durchsetzung der vertikalen Constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcerStrategy {
    /// Nur Geländeschätzung, Constraints werden ignoriert
    None,
    /// Iterative Relaxation je Komponente
    #[default]
    Iterative,
}

/// Verhalten bei widersprüchlichen Constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Warnung loggen, beste Teillösung behalten
    #[default]
    Warn,
    /// Durchlauf mit Fehler abbrechen
    Fail,
}

// ── Laufzeit-Optionen (serialisierbar) ─────────────────────────────

/// Alle einstellbaren Optionen eines Höhen-Durchlaufs.
/// Wird als `scene_elevation.toml` neben der Binary gespeichert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EleOptions {
    // ── Quadtree ────────────────────────────────────────────────
    /// Split-Schwelle der Quadtree-Blätter
    #[serde(default = "default_quadtree_split_size")]
    pub quadtree_split_size: usize,

    // ── Terrain ─────────────────────────────────────────────────
    /// Verwendete Gelände-Strategie
    #[serde(default)]
    pub terrain_strategy: TerrainStrategy,
    /// Rand um die Sites für den Triangulierungs-Rahmen
    #[serde(default = "default_site_padding")]
    pub site_padding: f64,
    /// Höhe der flachen Strategie
    #[serde(default)]
    pub flat_ele: f64,
    /// Suchradius der inversen Distanzgewichtung
    #[serde(default = "default_idw_radius")]
    pub idw_radius: f64,
    /// Exponent der inversen Distanzgewichtung
    #[serde(default = "default_idw_power")]
    pub idw_power: f64,
    /// Abtastabstand entlang des Datensatzrands
    #[serde(default = "default_boundary_sample_spacing")]
    pub boundary_sample_spacing: f64,

    // ── Constraints ─────────────────────────────────────────────
    /// Verwendete Enforcer-Strategie
    #[serde(default)]
    pub enforcer_strategy: EnforcerStrategy,
    /// Maximale Relaxations-Durchläufe
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Toleranz für erfüllte Constraints
    #[serde(default = "default_constraint_tolerance")]
    pub constraint_tolerance: f64,
    /// Verhalten bei Konflikten
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
}

impl Default for EleOptions {
    fn default() -> Self {
        Self {
            quadtree_split_size: QUADTREE_SPLIT_SIZE,
            terrain_strategy: TerrainStrategy::default(),
            site_padding: SITE_PADDING,
            flat_ele: FLAT_ELE,
            idw_radius: IDW_RADIUS,
            idw_power: IDW_POWER,
            boundary_sample_spacing: BOUNDARY_SAMPLE_SPACING,
            enforcer_strategy: EnforcerStrategy::default(),
            max_iterations: MAX_ITERATIONS,
            constraint_tolerance: CONSTRAINT_TOLERANCE,
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

fn default_quadtree_split_size() -> usize {
    QUADTREE_SPLIT_SIZE
}

fn default_site_padding() -> f64 {
    SITE_PADDING
}

fn default_idw_radius() -> f64 {
    IDW_RADIUS
}

fn default_idw_power() -> f64 {
    IDW_POWER
}

fn default_boundary_sample_spacing() -> f64 {
    BOUNDARY_SAMPLE_SPACING
}

fn default_max_iterations() -> usize {
    MAX_ITERATIONS
}

fn default_constraint_tolerance() -> f64 {
    CONSTRAINT_TOLERANCE
}

impl EleOptions {
    /// Lädt Optionen aus einer TOML-Datei. Bei Fehler: Standardwerte.
    pub fn load_from_file(path: &std::path::Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(opts) => {
                    log::info!("Optionen geladen aus: {}", path.display());
                    opts
                }
                Err(e) => {
                    log::warn!("Optionen-Datei fehlerhaft, verwende Standardwerte: {}", e);
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("Keine Optionen-Datei gefunden, verwende Standardwerte");
                Self::default()
            }
        }
    }

    /// Speichert Optionen als TOML-Datei.
    pub fn save_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        log::info!("Optionen gespeichert nach: {}", path.display());
        Ok(())
    }

    /// Rand für den Triangulierungs-Rahmen, nach unten begrenzt.
    pub fn effective_site_padding(&self) -> f64 {
        if self.site_padding.is_finite() {
            self.site_padding.max(SITE_PADDING_MIN)
        } else {
            SITE_PADDING
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let opts = EleOptions::default();

        assert_eq!(opts.quadtree_split_size, 11);
        assert_eq!(opts.site_padding, 100.0);
        assert_eq!(opts.max_iterations, 100);
        assert_eq!(opts.terrain_strategy, TerrainStrategy::NaturalNeighbor);
        assert_eq!(opts.conflict_policy, ConflictPolicy::Warn);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let opts: EleOptions = toml::from_str(
            r#"
terrain_strategy = "inverse_distance"
conflict_policy = "fail"
idw_power = 3.0
"#,
        )
        .expect("gültiges TOML");

        assert_eq!(opts.terrain_strategy, TerrainStrategy::InverseDistance);
        assert_eq!(opts.conflict_policy, ConflictPolicy::Fail);
        assert_eq!(opts.idw_power, 3.0);
        assert_eq!(opts.idw_radius, IDW_RADIUS);
        assert_eq!(opts.max_iterations, MAX_ITERATIONS);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let path = std::env::temp_dir().join(format!(
            "scene_elevation_options_{}.toml",
            std::process::id()
        ));
        let opts = EleOptions {
            flat_ele: 12.5,
            enforcer_strategy: EnforcerStrategy::None,
            ..EleOptions::default()
        };

        opts.save_to_file(&path).expect("Speichern");
        let loaded = EleOptions::load_from_file(&path);
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, opts);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let loaded = EleOptions::load_from_file(std::path::Path::new(
            "/nonexistent/scene_elevation.toml",
        ));

        assert_eq!(loaded, EleOptions::default());
    }

    #[test]
    fn test_padding_is_clamped() {
        let opts = EleOptions {
            site_padding: -5.0,
            ..EleOptions::default()
        };

        assert_eq!(opts.effective_site_padding(), SITE_PADDING_MIN);
    }
}
