//! Property-based checks of the invariants enumerated in `spec.md` §8,
//! exercised through the crate's public API.

use kdforest_core::{Engine, Forest, Handle, HandleRef, Point};
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn arb_point() -> impl Strategy<Value = Point> {
    (-100.0f32..100.0, -100.0f32..100.0, -100.0f32..100.0).prop_map(|(x, y, z)| Point::new(x, y, z))
}

fn squared_distance(a: Point, b: Point) -> f32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    let dz = a.z - b.z;
    dx * dx + dy * dy + dz * dz
}

proptest! {
    /// live_count always equals the number of inserts minus removes.
    #[test]
    fn live_count_equals_inserts_minus_removes(
        points in proptest::collection::vec(arb_point(), 1..200),
        removal_mask in proptest::collection::vec(any::<bool>(), 200),
    ) {
        let mut forest = Forest::new();
        let mut inserts = 0u64;
        let mut removes = 0u64;

        for (i, &p) in points.iter().enumerate() {
            let handle = forest.insert(Handle::new(p, i)).unwrap();
            inserts += 1;

            if removal_mask[i] {
                forest.mark_removed(handle);
                removes += 1;
            }
        }

        prop_assert_eq!(forest.live_count(), inserts - removes);
    }

    /// total_count stays below 2 * (live_count + 1) after every insert returns.
    #[test]
    fn total_count_stays_bounded_by_live_count(points in proptest::collection::vec(arb_point(), 1..300)) {
        let mut forest = Forest::new();

        for (i, &p) in points.iter().enumerate() {
            forest.insert(Handle::new(p, i)).unwrap();
            prop_assert!(forest.total_count() < 2 * (forest.live_count() + 1));
        }
    }

    /// nearest() always returns the closest still-live handle, matching
    /// a brute-force scan over everything not yet removed.
    #[test]
    fn nearest_matches_brute_force_scan(
        points in proptest::collection::vec(arb_point(), 1..150),
        removal_mask in proptest::collection::vec(any::<bool>(), 150),
        query in arb_point(),
    ) {
        let mut forest = Forest::new();
        let mut live: Vec<(HandleRef, Point)> = Vec::new();

        for (i, &p) in points.iter().enumerate() {
            let handle = forest.insert(Handle::new(p, i)).unwrap();
            live.push((handle, p));

            if removal_mask[i] {
                forest.mark_removed(handle);
                live.retain(|&(h, _)| h != handle);
            }
        }

        let expected = live.iter().map(|&(_, p)| squared_distance(query, p)).fold(f32::INFINITY, f32::min);

        match forest.nearest(query) {
            Some(found) => {
                let found_point = live.iter().find(|&&(h, _)| h == found).map(|&(_, p)| p).expect("nearest must return a live handle");
                prop_assert_eq!(squared_distance(query, found_point), expected);
            }
            None => prop_assert!(live.is_empty()),
        }
    }

    /// A full run fills every pixel, drains the forest, and is
    /// bit-for-bit identical across two runs with the same seed and input.
    #[test]
    fn full_run_fills_grid_and_is_deterministic(seed in any::<u64>()) {
        let width = 5u32;
        let height = 5u32;
        let points: Vec<Point> = (0..width * height)
            .map(|i| Point::new((i as f32 * 3.1) % 17.0, (i as f32 * 2.3) % 13.0, (i as f32 * 4.7) % 19.0))
            .collect();

        let run = |seed: u64| {
            let rng = StdRng::seed_from_u64(seed);
            let mut engine = Engine::new(width, height, 2, 2, rng);
            let mut placements = Vec::new();
            for &p in &points {
                placements.push(engine.place(p, |_| {}).unwrap());
            }
            (placements, engine.filled_pixels().count(), engine.boundary_size())
        };

        let (first_placements, first_filled, first_boundary) = run(seed);
        let (second_placements, second_filled, second_boundary) = run(seed);

        prop_assert_eq!(first_filled, (width * height) as usize);
        prop_assert_eq!(first_boundary, 0);
        prop_assert_eq!(second_filled, first_filled);
        prop_assert_eq!(second_boundary, first_boundary);
        prop_assert_eq!(first_placements.len(), second_placements.len());

        for (a, b) in first_placements.iter().zip(second_placements.iter()) {
            prop_assert_eq!((a.0, a.1), (b.0, b.1));
        }
    }
}
