use roi_occupancy::{regions, GeometryStore, Region, Size};

fn square(x0: f64, y0: f64, side: f64) -> Vec<[f64; 2]> {
    vec![[x0, y0], [x0 + side, y0], [x0 + side, y0 + side], [x0, y0 + side]]
}

#[test]
fn loading_the_same_region_twice_keeps_its_area() {
    let doc = r#"{"R": [[0, 0], [10, 0], [10, 10], [0, 10]]}"#;
    let mut store = GeometryStore::new();
    regions::load_into(&mut store, doc).unwrap();
    let once = store.get("R").unwrap().area();
    regions::load_into(&mut store, doc).unwrap();
    assert_eq!(store.len(), 1);
    assert!((store.get("R").unwrap().area() - once).abs() < 1e-9);
}

#[test]
fn disjoint_union_is_commutative_and_additive() {
    let a = Region::polygon(&square(0.0, 0.0, 4.0)).unwrap();
    let b = Region::polygon(&square(10.0, 10.0, 2.0)).unwrap();
    let ab = a.union(&b);
    let ba = b.union(&a);
    assert!(ab.is_multi());
    assert!((ab.area() - 20.0).abs() < 1e-9);
    assert!((ab.area() - ba.area()).abs() < 1e-9);
    for (x, y) in [(1.0, 1.0), (11.0, 11.0), (7.0, 7.0)] {
        assert_eq!(ab.contains(x, y), ba.contains(x, y));
    }
}

#[test]
fn rescale_round_trip_restores_vertices() {
    let mut store = GeometryStore::new();
    store.add_or_merge("a", Region::polygon(&square(13.3, 7.1, 40.9)).unwrap());
    store.add_or_merge(
        "b",
        Region::multi(&[square(0.0, 0.0, 1.0), square(300.0, 200.0, 17.5)]).unwrap(),
    );
    let canvas = Size::new(960.0, 540.0);
    let video = Size::new(1920.0, 1080.0);
    let there = store.rescaled(canvas, video).unwrap();
    let back = there.rescaled(video, canvas).unwrap();

    for (original, restored) in store.regions().iter().zip(back.regions()) {
        assert_eq!(original.region.is_multi(), restored.region.is_multi());
        let lhs = original.region.exterior_rings();
        let rhs = restored.region.exterior_rings();
        for (ring_a, ring_b) in lhs.iter().zip(&rhs) {
            for (p, q) in ring_a.iter().zip(ring_b) {
                assert!((p[0] - q[0]).abs() < 1e-9 && (p[1] - q[1]).abs() < 1e-9);
            }
        }
    }
    assert!(there.get("b").unwrap().contains(601.0, 401.0));
}

#[test]
fn rescale_from_zero_size_is_a_configuration_error() {
    let store = GeometryStore::new();
    let err = store
        .rescaled(Size::new(0.0, 540.0), Size::new(100.0, 100.0))
        .unwrap_err();
    assert!(err.is_config());
}

#[test]
fn clear_drops_regions_and_counters() {
    let mut store = GeometryStore::new();
    regions::load_into(&mut store, r#"{"R": [[0, 0], [1, 0], [1, 1]]}"#).unwrap();
    store.record_times([("R", 3.5)]);
    store.clear();
    assert!(store.is_empty());
    assert!(store.time_counters().is_empty());
    assert_eq!(store.contains("R", 0.5, 0.1), None);
}
