//! GJK distance/overlap queries, EPA penetration recovery and the GJK-based
//! shape cast.
//!
//! The simplex walks the Minkowski difference A ⊖ B toward the origin,
//! keeping barycentric weights so the closest pair of surface points can be
//! recovered without recomputation.

use super::shape::Shape;
use crate::math::{cross, Pose, Vec2};
use crate::settings::{
    EPA_MAX_ITERATION, EPA_TOLERANCE, GJK_MAX_ITERATION, GJK_TOLERANCE, SHAPE_CAST_MAX_ITERATION,
    SHAPE_CAST_TOLERANCE,
};

/// One vertex of the simplex: a point of A ⊖ B with the support points on
/// both surfaces that produced it.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct SupportPoint {
    pub point_a: Vec2,
    pub point_b: Vec2,
    /// `point_a - point_b`
    pub point: Vec2,
    pub weight: f64,
}

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Simplex {
    pub verts: [SupportPoint; 3],
    pub count: usize,
}

impl Simplex {
    fn push(&mut self, v: SupportPoint) {
        debug_assert!(self.count < 3);
        self.verts[self.count] = v;
        self.count += 1;
    }

    fn contains(&self, point: Vec2) -> bool {
        self.verts[..self.count]
            .iter()
            .any(|v| (v.point - point).mag_sq() < 1.0e-24)
    }

    /// Compute the point of the simplex closest to the origin, discarding
    /// vertices that do not contribute and storing barycentric weights.
    fn evolve_closest(&mut self) -> Vec2 {
        match self.count {
            1 => {
                self.verts[0].weight = 1.0;
                self.verts[0].point
            }
            2 => self.solve2(),
            3 => self.solve3(),
            _ => unreachable!(),
        }
    }

    fn solve2(&mut self) -> Vec2 {
        let w1 = self.verts[0].point;
        let w2 = self.verts[1].point;
        let e12 = w2 - w1;

        // origin in the w1 region
        let d12_2 = -w1.dot(e12);
        if d12_2 <= 0.0 {
            self.count = 1;
            self.verts[0].weight = 1.0;
            return w1;
        }
        // origin in the w2 region
        let d12_1 = w2.dot(e12);
        if d12_1 <= 0.0 {
            self.verts[0] = self.verts[1];
            self.count = 1;
            self.verts[0].weight = 1.0;
            return w2;
        }
        // between
        let inv = 1.0 / (d12_1 + d12_2);
        self.verts[0].weight = d12_1 * inv;
        self.verts[1].weight = d12_2 * inv;
        w1 * self.verts[0].weight + w2 * self.verts[1].weight
    }

    fn solve3(&mut self) -> Vec2 {
        let w1 = self.verts[0].point;
        let w2 = self.verts[1].point;
        let w3 = self.verts[2].point;

        let e12 = w2 - w1;
        let d12_1 = w2.dot(e12);
        let d12_2 = -w1.dot(e12);

        let e13 = w3 - w1;
        let d13_1 = w3.dot(e13);
        let d13_2 = -w1.dot(e13);

        let e23 = w3 - w2;
        let d23_1 = w3.dot(e23);
        let d23_2 = -w2.dot(e23);

        let n123 = cross(e12, e13);
        let d123_1 = n123 * cross(w2, w3);
        let d123_2 = n123 * cross(w3, w1);
        let d123_3 = n123 * cross(w1, w2);

        // vertex regions
        if d12_2 <= 0.0 && d13_2 <= 0.0 {
            self.count = 1;
            self.verts[0].weight = 1.0;
            return w1;
        }
        if d12_1 <= 0.0 && d23_2 <= 0.0 {
            self.verts[0] = self.verts[1];
            self.count = 1;
            self.verts[0].weight = 1.0;
            return w2;
        }
        if d13_1 <= 0.0 && d23_1 <= 0.0 {
            self.verts[0] = self.verts[2];
            self.count = 1;
            self.verts[0].weight = 1.0;
            return w3;
        }

        // edge regions
        if d12_1 > 0.0 && d12_2 > 0.0 && d123_3 <= 0.0 {
            let inv = 1.0 / (d12_1 + d12_2);
            self.verts[0].weight = d12_1 * inv;
            self.verts[1].weight = d12_2 * inv;
            self.count = 2;
            return w1 * self.verts[0].weight + w2 * self.verts[1].weight;
        }
        if d13_1 > 0.0 && d13_2 > 0.0 && d123_2 <= 0.0 {
            let inv = 1.0 / (d13_1 + d13_2);
            self.verts[0].weight = d13_1 * inv;
            self.verts[1] = self.verts[2];
            self.verts[1].weight = d13_2 * inv;
            self.count = 2;
            return w1 * self.verts[0].weight + w3 * self.verts[1].weight;
        }
        if d23_1 > 0.0 && d23_2 > 0.0 && d123_1 <= 0.0 {
            let inv = 1.0 / (d23_1 + d23_2);
            self.verts[0] = self.verts[1];
            self.verts[0].weight = d23_1 * inv;
            self.verts[1] = self.verts[2];
            self.verts[1].weight = d23_2 * inv;
            self.count = 2;
            return w2 * self.verts[0].weight + w3 * self.verts[1].weight;
        }

        // interior
        let inv = 1.0 / (d123_1 + d123_2 + d123_3);
        self.verts[0].weight = d123_1 * inv;
        self.verts[1].weight = d123_2 * inv;
        self.verts[2].weight = d123_3 * inv;
        Vec2::zero()
    }

    /// The closest points on each shape's surface, from the stored weights.
    fn witness_points(&self) -> (Vec2, Vec2) {
        let mut pa = Vec2::zero();
        let mut pb = Vec2::zero();
        for v in &self.verts[..self.count] {
            pa += v.point_a * v.weight;
            pb += v.point_b * v.weight;
        }
        (pa, pb)
    }
}

/// Support of A ⊖ B in a normalized world direction.
fn cso_support(
    a: &Shape,
    tf_a: &Pose,
    b: &Shape,
    tf_b: &Pose,
    dir: Vec2,
    include_radius: bool,
) -> SupportPoint {
    let local_dir_a = tf_a.rotation.reversed() * dir;
    let local_dir_b = tf_b.rotation.reversed() * -dir;
    let (core_a, _) = a.support_core(local_dir_a);
    let (core_b, _) = b.support_core(local_dir_b);
    let mut point_a = *tf_a * core_a;
    let mut point_b = *tf_b * core_b;
    if include_radius {
        point_a += dir * a.radius();
        point_b -= dir * b.radius();
    }
    SupportPoint {
        point_a,
        point_b,
        point: point_a - point_b,
        weight: 0.0,
    }
}

pub(crate) struct GjkResult {
    pub collide: bool,
    pub simplex: Simplex,
}

/// GJK on the full shapes (round parts included unless `include_radius` is
/// false). With `early_return` the loop exits as soon as disjointness is
/// certain; without it the simplex converges on the true closest point.
pub(crate) fn gjk(
    a: &Shape,
    tf_a: &Pose,
    b: &Shape,
    tf_b: &Pose,
    early_return: bool,
    include_radius: bool,
) -> GjkResult {
    let mut dir = Vec2::new(1.0, 0.0);
    let mut simplex = Simplex::default();
    simplex.push(cso_support(a, tf_a, b, tf_b, dir, include_radius));

    let mut collide = false;
    for _ in 0..GJK_MAX_ITERATION {
        let closest = simplex.evolve_closest();
        if closest.mag_sq() < GJK_TOLERANCE {
            collide = true;
            break;
        }

        let dist = closest.mag();
        dir = -closest / dist;
        let support = cso_support(a, tf_a, b, tf_b, dir, include_radius);

        // no progress past the current closest point means the shapes are
        // disjoint
        if early_return && dist > dir.dot(support.point - closest) {
            break;
        }
        if simplex.contains(support.point) {
            break;
        }
        simplex.push(support);
    }

    GjkResult { collide, simplex }
}

pub(crate) struct EpaResult {
    pub depth: f64,
    pub normal: Vec2,
}

/// Expand the GJK termination simplex into a polytope hugging the Minkowski
/// boundary, yielding penetration depth and the contact normal (pointing
/// from A to B).
pub(crate) fn epa(
    a: &Shape,
    tf_a: &Pose,
    b: &Shape,
    tf_b: &Pose,
    simplex: &Simplex,
    include_radius: bool,
) -> EpaResult {
    // EPA needs a full triangle to start from
    let mut polytope: Vec<Vec2> = simplex.verts[..simplex.count]
        .iter()
        .map(|v| v.point)
        .collect();
    if polytope.len() == 1 {
        let mut support = cso_support(a, tf_a, b, tf_b, Vec2::new(1.0, 0.0), include_radius).point;
        if (support - polytope[0]).mag_sq() < 1.0e-24 {
            support = cso_support(a, tf_a, b, tf_b, Vec2::new(-1.0, 0.0), include_radius).point;
        }
        polytope.push(support);
    }
    if polytope.len() == 2 {
        let e = polytope[1] - polytope[0];
        let n = Vec2::new(-e.y, e.x).normalized();
        let support = cso_support(a, tf_a, b, tf_b, n, include_radius).point;
        if polytope.iter().any(|v| (*v - support).mag_sq() < 1.0e-24) {
            polytope.push(cso_support(a, tf_a, b, tf_b, -n, include_radius).point);
        } else {
            polytope.push(support);
        }
    }

    let mut best_normal = Vec2::zero();
    let mut best_dist = 0.0;
    for _ in 0..EPA_MAX_ITERATION {
        let (index, dist, normal) = closest_edge(&polytope);
        if dist == f64::MAX {
            // fully degenerate polytope (coincident shapes); pick an axis
            return EpaResult {
                depth: 0.0,
                normal: Vec2::unit_y(),
            };
        }
        best_normal = normal;
        best_dist = dist;

        let support = cso_support(a, tf_a, b, tf_b, normal, include_radius).point;
        let new_dist = normal.dot(support);
        if (new_dist - dist).abs() > EPA_TOLERANCE {
            // the edge can still be pushed outward
            polytope.insert(index + 1, support);
        } else {
            break;
        }
    }

    EpaResult {
        depth: best_dist,
        normal: best_normal,
    }
}

/// The polytope edge closest to the origin, with its outward normal.
fn closest_edge(polytope: &[Vec2]) -> (usize, f64, Vec2) {
    let n = polytope.len();
    let mut best = (0, f64::MAX, Vec2::zero());
    for i in 0..n {
        let v1 = polytope[i];
        let v2 = polytope[(i + 1) % n];
        let e = v2 - v1;
        let len = e.mag();
        if len < f64::EPSILON {
            continue;
        }
        // normal away from the origin (the origin is inside the polytope)
        let mut normal = Vec2::new(e.y, -e.x) / len;
        let mut dist = normal.dot(v1);
        if dist < 0.0 {
            normal = -normal;
            dist = -dist;
        }
        if dist < best.1 {
            best = (i, dist, normal);
        }
    }
    best
}

//
// public queries
//

/// Distance between two shapes and the closest point on each surface.
#[derive(Clone, Copy, Debug)]
pub struct DistanceResult {
    /// Zero when the shapes overlap.
    pub distance: f64,
    pub point_a: Vec2,
    pub point_b: Vec2,
}

/// Closest-point query between two convex shapes.
pub fn compute_distance(a: &Shape, tf_a: &Pose, b: &Shape, tf_b: &Pose) -> DistanceResult {
    let result = gjk(a, tf_a, b, tf_b, false, true);
    let (point_a, point_b) = result.simplex.witness_points();
    if result.collide {
        DistanceResult {
            distance: 0.0,
            point_a,
            point_b,
        }
    } else {
        DistanceResult {
            distance: (point_a - point_b).mag(),
            point_a,
            point_b,
        }
    }
}

/// Result of a shape cast: the earliest time of impact along the given
/// translations.
#[derive(Clone, Copy, Debug)]
pub struct ShapeCastHit {
    /// Fraction of the translations at which the shapes touch.
    pub t: f64,
    /// World-space contact point at the time of impact.
    pub point: Vec2,
    /// Separating normal at impact, pointing from B back toward A.
    pub normal: Vec2,
}

/// Sweep shape A by `translation_a` and shape B by `translation_b`, finding
/// the earliest time their cores touch.
///
/// Conservative advancement: each step measures the current gap along the
/// separating axis and advances time by the gap over the closing speed,
/// which never overshoots for convex shapes under linear motion.
pub fn shape_cast(
    a: &Shape,
    tf_a: &Pose,
    b: &Shape,
    tf_b: &Pose,
    translation_a: Vec2,
    translation_b: Vec2,
) -> Option<ShapeCastHit> {
    // work relative to A: only B moves
    let relative = translation_b - translation_a;

    let mut t = 0.0;
    let mut normal = Vec2::zero();
    for _ in 0..SHAPE_CAST_MAX_ITERATION {
        let tf_b_t = Pose::new(tf_b.translation + relative * t, tf_b.rotation);
        let result = gjk(a, tf_a, b, &tf_b_t, false, false);
        let (pa, pb) = result.simplex.witness_points();

        if result.collide {
            // overlapping; only meaningful on the first iteration (initial
            // overlap), later iterations stop just short of contact
            return Some(ShapeCastHit {
                t,
                point: pa + translation_a * t,
                normal: -normal,
            });
        }

        let gap = pb - pa;
        let dist = gap.mag();
        if dist < SHAPE_CAST_TOLERANCE {
            let n_ab = if normal != Vec2::zero() {
                normal
            } else {
                gap / dist
            };
            return Some(ShapeCastHit {
                t,
                point: pa + translation_a * t,
                normal: -n_ab,
            });
        }
        normal = gap / dist; // from A toward B

        let closing = -normal.dot(relative);
        if closing <= f64::EPSILON {
            return None;
        }
        t += dist / closing;
        if t > 1.0 {
            return None;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shape::{Circle, Polygon};
    use crate::math::Rotor2;

    fn pose(x: f64, y: f64) -> Pose {
        Pose::new(Vec2::new(x, y), Rotor2::identity())
    }

    #[test]
    fn distance_between_circles() {
        let a = Shape::Circle(Circle { radius: 1.0 });
        let b = Shape::Circle(Circle { radius: 0.5 });
        let result = compute_distance(&a, &pose(0.0, 0.0), &b, &pose(4.0, 0.0));
        assert!((result.distance - 2.5).abs() < 1e-6);
        assert!((result.point_a - Vec2::new(1.0, 0.0)).mag() < 1e-6);
        assert!((result.point_b - Vec2::new(3.5, 0.0)).mag() < 1e-6);
    }

    #[test]
    fn distance_between_boxes() {
        let a = Shape::Polygon(Polygon::rect(2.0, 2.0));
        let b = Shape::Polygon(Polygon::rect(2.0, 2.0));
        let result = compute_distance(&a, &pose(0.0, 0.0), &b, &pose(5.0, 0.0));
        assert!((result.distance - 3.0).abs() < 1e-9);
    }

    #[test]
    fn overlap_reports_zero_distance() {
        let a = Shape::Circle(Circle { radius: 1.0 });
        let b = Shape::Circle(Circle { radius: 1.0 });
        let result = compute_distance(&a, &pose(0.0, 0.0), &b, &pose(1.0, 0.0));
        assert_eq!(result.distance, 0.0);
    }

    #[test]
    fn epa_finds_penetration_of_boxes() {
        let a = Shape::Polygon(Polygon::rect(2.0, 2.0));
        let b = Shape::Polygon(Polygon::rect(2.0, 2.0));
        let tf_a = pose(0.0, 0.0);
        let tf_b = pose(1.5, 0.0);
        let result = gjk(&a, &tf_a, &b, &tf_b, true, true);
        assert!(result.collide);
        let epa_result = epa(&a, &tf_a, &b, &tf_b, &result.simplex, true);
        assert!((epa_result.depth - 0.5).abs() < 1e-6);
        assert!((epa_result.normal - Vec2::new(1.0, 0.0)).mag() < 1e-6);
    }

    #[test]
    fn shape_cast_circle_into_box() {
        let a = Shape::Circle(Circle { radius: 0.5 });
        let b = Shape::Polygon(Polygon::rect(1.0, 1.0));
        let hit = shape_cast(
            &a,
            &pose(0.0, 0.0),
            &b,
            &pose(4.0, 0.0),
            Vec2::new(5.0, 0.0),
            Vec2::zero(),
        )
        .expect("should hit");
        assert!((hit.t - 0.7).abs() < 1e-3);
        assert!((hit.normal - Vec2::new(-1.0, 0.0)).mag() < 1e-3);
    }

    #[test]
    fn shape_cast_miss() {
        let a = Shape::Circle(Circle { radius: 0.5 });
        let b = Shape::Polygon(Polygon::rect(1.0, 1.0));
        assert!(shape_cast(
            &a,
            &pose(0.0, 0.0),
            &b,
            &pose(4.0, 3.0),
            Vec2::new(5.0, 0.0),
            Vec2::zero(),
        )
        .is_none());
    }
}
