//! Integrationstests für den kompletten Höhen-Durchlauf:
//! - Tunnelportal mit drei EXACT-Constraints
//! - Brücke über Straße (MIN-Abstand, Above-Bezug)
//! - Steigungs-Constraints entlang einer Rampe
//! - Map-Daten → Sites → Quadtree

use approx::assert_relative_eq;
use glam::{DVec2, DVec3};
use scene_elevation::{
    ConflictPolicy, ConstraintKind, EleCollection, EleConnector, EleConnectorGroup, EleOptions,
    EleResolver, GroundState, MapData, MapFeature, Polygon2, Rect, TerrainStrategy,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Hügel mit Gipfel bei (50, 50): 9 Sites auf einem 3×3-Raster.
fn hill_sites() -> Vec<DVec3> {
    let mut sites = Vec::new();
    for x in 0..3 {
        for y in 0..3 {
            let ele = if x == 1 && y == 1 { 30.0 } else { 10.0 };
            sites.push(DVec3::new(x as f64 * 50.0, y as f64 * 50.0, ele));
        }
    }
    sites
}

// ─── Tunnelportal ────────────────────────────────────────────────────────────

#[test]
fn test_tunnel_entrance_keeps_portal_height() {
    init_logger();
    let mut collection = EleCollection::new();
    collection.add_sites(hill_sites());

    let node_ref = 500;
    let mut group = EleConnectorGroup::new();
    let lower: Vec<DVec2> = [40.0, 45.0, 50.0]
        .iter()
        .map(|x| DVec2::new(*x, 30.0))
        .collect();
    let upper: Vec<DVec2> = lower.iter().map(|p| *p + DVec2::new(0.0, 0.5)).collect();
    group.add_connectors_for(
        collection.registry_mut(),
        lower.iter().copied(),
        Some(node_ref),
        GroundState::On,
    );
    group.add_connectors_for(
        collection.registry_mut(),
        upper.iter().copied(),
        None,
        GroundState::On,
    );

    for (low, up) in lower.iter().zip(&upper) {
        let low_id = group.require_connector_at(*low).expect("unterer Connector");
        let up_id = group.require_connector_at(*up).expect("oberer Connector");
        collection
            .constraints_mut()
            .require_vertical_distance(ConstraintKind::Exact, 10.0, up_id, low_id);
    }

    let resolution = EleResolver::default()
        .resolve(collection)
        .expect("Durchlauf");
    assert!(resolution.report.is_clean());
    assert_eq!(resolution.report.rigid_bodies, 1);

    let lower_xyz = group
        .line_xyz(&resolution.elevations, &lower)
        .expect("untere Kante");
    let upper_xyz = group
        .line_xyz(&resolution.elevations, &upper)
        .expect("obere Kante");

    // gemeinsame Referenz → gleiche Höhe
    assert_eq!(lower_xyz[0].z, lower_xyz[1].z);
    assert_eq!(lower_xyz[1].z, lower_xyz[2].z);
    for (low, up) in lower_xyz.iter().zip(&upper_xyz) {
        assert_relative_eq!(up.z - low.z, 10.0, epsilon = 1e-9);
        assert_eq!(low.truncate(), up.truncate() - DVec2::new(0.0, 0.5));
    }
}

// ─── Brücke ──────────────────────────────────────────────────────────────────

#[test]
fn test_bridge_clears_road_and_stays_above_terrain() {
    init_logger();
    let mut collection = EleCollection::new();
    collection.add_sites(hill_sites());

    // Straße quer unter der Brücke, Brückendeck entlang x
    let road_points = [DVec2::new(60.0, 20.0), DVec2::new(60.0, 80.0)];
    let deck_points = [
        DVec2::new(20.0, 50.0),
        DVec2::new(60.0, 50.0),
        DVec2::new(100.0, 50.0),
    ];

    let mut road = EleConnectorGroup::new();
    road.add_connectors_for(
        collection.registry_mut(),
        road_points.iter().copied(),
        None,
        GroundState::On,
    );
    let crossing_on_road =
        road.add(collection.registry_mut(), EleConnector::new(DVec2::new(60.0, 50.0), Some(1), GroundState::On));

    let mut deck = EleConnectorGroup::new();
    deck.add_connectors_for(
        collection.registry_mut(),
        deck_points.iter().copied(),
        None,
        GroundState::Above,
    );
    let crossing_on_deck = deck
        .require_connector_at(DVec2::new(60.0, 50.0))
        .expect("Kreuzungspunkt");

    collection.constraints_mut().require_vertical_distance(
        ConstraintKind::Min,
        5.0,
        crossing_on_deck,
        crossing_on_road,
    );

    let resolution = EleResolver::default()
        .resolve(collection)
        .expect("Durchlauf");
    let eles = &resolution.elevations;

    assert!(resolution.report.is_clean());
    let deck_ele = eles.ele(crossing_on_deck).unwrap_or(f64::NAN);
    let road_ele = eles.ele(crossing_on_road).unwrap_or(f64::NAN);
    assert!(deck_ele - road_ele >= 5.0 - 1e-6);

    // Straße bleibt auf dem Gelände
    let terrain = resolution.terrain.interpolate_ele(DVec2::new(60.0, 50.0));
    assert_relative_eq!(road_ele, terrain, epsilon = 1e-9);

    // kein Deck-Punkt unter dem Gelände
    for (pos, xyz) in deck_points
        .iter()
        .zip(deck.positions_xyz(eles).expect("Deck aufgelöst"))
    {
        assert!(xyz.z >= resolution.terrain.interpolate_ele(*pos) - 1e-6);
    }
}

// ─── Rampe ───────────────────────────────────────────────────────────────────

#[test]
fn test_ramp_incline_is_limited() {
    init_logger();
    let options = EleOptions {
        terrain_strategy: TerrainStrategy::InverseDistance,
        ..EleOptions::default()
    };
    let mut collection = EleCollection::new();
    // steiler Anstieg: 0 m bei x=0, 20 m bei x=40
    collection.add_sites([
        DVec3::new(0.0, 0.0, 0.0),
        DVec3::new(40.0, 0.0, 20.0),
    ]);

    let mut ramp = EleConnectorGroup::new();
    let (registry, constraints) = collection.parts_mut();
    ramp.add_connectors_for(
        registry,
        (0..=4).map(|i| DVec2::new(i as f64 * 10.0, 0.0)),
        None,
        GroundState::Floating,
    );
    constraints
        .require_incline(registry, ConstraintKind::Max, 0.1, ramp.ids())
        .expect("Steigung");
    constraints
        .require_incline(registry, ConstraintKind::Min, 0.0, ramp.ids())
        .expect("nie fallend");

    let resolution = EleResolver::new(options)
        .resolve(collection)
        .expect("Durchlauf");
    let xyz = ramp
        .positions_xyz(&resolution.elevations)
        .expect("Rampe aufgelöst");

    for pair in xyz.windows(2) {
        let rise = pair[1].z - pair[0].z;
        assert!(rise <= 1.0 + 1e-6, "Steigung zu groß: {rise}");
        assert!(rise >= -1e-6, "Rampe fällt: {rise}");
    }
}

// ─── Konflikte ───────────────────────────────────────────────────────────────

#[test]
fn test_conflict_policy_warn_vs_fail() {
    init_logger();
    let build = || {
        let mut collection = EleCollection::new();
        collection.add_sites(hill_sites());
        let a = collection.add_connector(EleConnector::free(DVec2::new(10.0, 10.0), GroundState::On));
        let b = collection.add_connector(EleConnector::free(DVec2::new(20.0, 10.0), GroundState::On));
        let constraints = collection.constraints_mut();
        constraints.require_vertical_distance(ConstraintKind::Exact, 2.0, a, b);
        constraints.require_vertical_distance(ConstraintKind::Exact, -2.0, a, b);
        collection
    };

    let warn = EleResolver::default()
        .resolve(build())
        .expect("Warn liefert Teillösung");
    assert!(!warn.report.is_clean());

    let fail = EleResolver::new(EleOptions {
        conflict_policy: ConflictPolicy::Fail,
        ..EleOptions::default()
    })
    .resolve(build());
    assert!(fail.is_err());
}

// ─── Map-Daten ───────────────────────────────────────────────────────────────

#[test]
fn test_map_data_sites_and_area_promotion() {
    init_logger();
    let mut data = MapData::new(Rect::from_bounds(0.0, 0.0, 200.0, 200.0));
    data.add_feature(MapFeature::node(1, DVec2::new(100.0, 100.0)).with_ele(50.0));
    let field = Polygon2::new(vec![
        DVec2::new(90.0, 90.0),
        DVec2::new(110.0, 90.0),
        DVec2::new(110.0, 110.0),
        DVec2::new(90.0, 110.0),
    ])
    .expect("gültiges Polygon");
    data.add_feature(MapFeature::area(2, field.clone()));

    let mut collection = EleCollection::new();
    let added = collection.add_map_sites(&data, 100.0, |_| Some(0.0));
    assert_eq!(added, 1 + 8);

    let mut group = EleConnectorGroup::new();
    group.add_connectors_for(
        collection.registry_mut(),
        field.vertices().iter().copied(),
        Some(2),
        GroundState::On,
    );

    let resolver = EleResolver::default();
    let tree = resolver.build_quadtree(&data);
    let hits = tree.query(&Rect::from_bounds(95.0, 95.0, 96.0, 96.0));
    assert_eq!(hits.len(), 1);

    let resolution = resolver.resolve(collection).expect("Durchlauf");
    let ring = group
        .polygon_xyz(&resolution.elevations, &field)
        .expect("Fläche angehoben");

    assert_eq!(ring.len(), 4);
    // gemeinsame Referenz → eben
    assert!(ring.iter().all(|p| p.z == ring[0].z));
    assert!(ring[0].z > 0.0 && ring[0].z < 50.0);
}
