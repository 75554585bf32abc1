#![no_main]

use glam::{DVec2, DVec3};
use libfuzzer_sys::fuzz_target;
use scene_elevation::{DelaunayTriangulation, Rect};

fuzz_target!(|data: &[u8]| {
    // je 3 Byte eine Site: x, y, Höhe auf einem groben Raster (provoziert Kollinearität)
    let mut triangulation = DelaunayTriangulation::new(Rect::from_bounds(-10.0, -10.0, 265.0, 265.0));
    let mut chunks = data.chunks_exact(3);
    for chunk in &mut chunks {
        let site = DVec3::new(chunk[0] as f64, chunk[1] as f64, chunk[2] as f64);
        let _ = triangulation.insert(site);
    }
    assert!(triangulation.is_valid_delaunay());

    for &byte in chunks.remainder() {
        let query = DVec2::new(byte as f64 * 1.3 - 20.0, 255.0 - byte as f64);
        let nn = triangulation.probe(query);
        let total: f64 = nn.weights.iter().sum();
        assert!(nn.weights.is_empty() || (total - 1.0).abs() < 1e-6);
        assert!(triangulation.interpolate(query).is_finite());
    }
});
