use aeolus_geom::{Aabb, Ray, Vec3, intersect_triangle};
use proptest::num::f32::NORMAL;
use proptest::prelude::*;
use proptest::strategy::Strategy;

fn approx_abs_rel(a: f32, b: f32, atol: f32, rtol: f32) -> bool {
    let diff = (a - b).abs();
    let scale = a.abs().max(b.abs());
    diff <= atol + rtol * scale
}

fn bounded_f32() -> impl Strategy<Value = f32> {
    NORMAL.prop_filter("bounded", |v| v.is_finite() && v.abs() <= 1e5)
}

fn arb_vec3() -> impl Strategy<Value = Vec3> {
    (bounded_f32(), bounded_f32(), bounded_f32()).prop_map(|(x, y, z)| Vec3::new(x, y, z))
}

fn arb_points() -> impl Strategy<Value = Vec<Vec3>> {
    prop::collection::vec(arb_vec3(), 1..32)
}

fn arb_valid_aabb() -> impl Strategy<Value = Aabb> {
    (arb_vec3(), arb_vec3()).prop_map(|(a, b)| Aabb::new(a.min(b), a.max(b)))
}

proptest! {
    // A box built from points is valid and contains every point
    #[test]
    fn from_points_contains_all(points in arb_points()) {
        let b = Aabb::from_points(points.iter().copied()).unwrap();
        prop_assert!(b.is_valid());
        for p in &points {
            prop_assert!(p.x >= b.min.x && p.x <= b.max.x);
            prop_assert!(p.y >= b.min.y && p.y <= b.max.y);
            prop_assert!(p.z >= b.min.z && p.z <= b.max.z);
        }
    }

    // Union is commutative and contains both operands
    #[test]
    fn union_commutative_and_covering(a in arb_valid_aabb(), b in arb_valid_aabb()) {
        let u1 = a.union(&b);
        let u2 = b.union(&a);
        prop_assert_eq!(u1, u2);
        prop_assert!(u1.min.x <= a.min.x && u1.min.x <= b.min.x);
        prop_assert!(u1.max.z >= a.max.z && u1.max.z >= b.max.z);
    }

    // Translation preserves extents
    #[test]
    fn translation_preserves_extent(a in arb_valid_aabb(), t in arb_vec3()) {
        let e1 = a.extent();
        let e2 = a.translated(t).extent();
        prop_assert!(approx_abs_rel(e1.x, e2.x, 5e-2, 1e-4));
        prop_assert!(approx_abs_rel(e1.y, e2.y, 5e-2, 1e-4));
        prop_assert!(approx_abs_rel(e1.z, e2.z, 5e-2, 1e-4));
    }

    // A downward ray through the footprint of a horizontal triangle lands on its plane
    #[test]
    fn down_ray_lands_on_plane(z in -1e3f32..1e3, u in 0.01f32..0.49, v in 0.01f32..0.49) {
        let v0 = Vec3::new(0.0, 0.0, z);
        let v1 = Vec3::new(10.0, 0.0, z);
        let v2 = Vec3::new(0.0, 10.0, z);
        let origin = Vec3::new(u * 10.0, v * 10.0, z + 50.0);
        let t = intersect_triangle(&Ray::down(origin), v0, v1, v2);
        prop_assert!(t.is_some());
        prop_assert!(approx_abs_rel(t.unwrap(), 50.0, 1e-3, 1e-4));
    }
}
