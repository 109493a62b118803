//! Collision shapes and their geometric capability set: mass properties,
//! bounding boxes, support mapping, featured edges, point and ray tests.

use std::f64::consts::PI;

use super::{Aabb, RayCastHit, RayCastInput};
use crate::math::{cross, right_normal, Pose, Vec2};

/// Feature index used when a contact point does not come from a polygon
/// vertex (circle surfaces).
pub const FEATURE_NONE: u32 = u32::MAX;

/// The shape of a collider.
#[derive(Clone, Debug)]
pub enum Shape {
    Circle(Circle),
    Capsule(Capsule),
    Polygon(Polygon),
}

/// Shape discriminant. The ordering decides which collider of a pair is "A"
/// in the narrow phase, so each unordered pair maps to one detection routine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShapeKind {
    Circle,
    Capsule,
    Polygon,
}

/// A circle centered on the body-local origin.
#[derive(Clone, Copy, Debug)]
pub struct Circle {
    pub radius: f64,
}

/// Two body-local endpoints swept by a circle.
#[derive(Clone, Copy, Debug)]
pub struct Capsule {
    pub a: Vec2,
    pub b: Vec2,
    pub radius: f64,
}

/// A convex polygon with counterclockwise vertices and outward edge normals.
///
/// `normals[i]` belongs to the edge from `verts[i]` to `verts[i + 1]`.
#[derive(Clone, Debug)]
pub struct Polygon {
    verts: Vec<Vec2>,
    normals: Vec<Vec2>,
}

/// Mass, center of mass and rotational inertia about that center.
#[derive(Clone, Copy, Debug)]
pub struct MassData {
    pub mass: f64,
    pub center: Vec2,
    pub inertia: f64,
}

/// An edge of a shape's surface in world space, carrying the vertex ids of
/// its endpoints for contact feature tracking.
#[derive(Clone, Copy, Debug)]
pub struct FeaturedEdge {
    pub p1: Vec2,
    pub p2: Vec2,
    pub id1: u32,
    pub id2: u32,
}

impl FeaturedEdge {
    #[inline]
    pub fn dir(&self) -> Vec2 {
        let d = self.p2 - self.p1;
        let len = d.mag();
        if len > f64::EPSILON {
            d / len
        } else {
            Vec2::zero()
        }
    }

    #[inline]
    pub fn length(&self) -> f64 {
        (self.p2 - self.p1).mag()
    }
}

impl Polygon {
    /// Build a polygon from a point cloud. The convex hull of the points is
    /// taken, so the input does not need to be convex or ordered.
    pub fn new(points: &[Vec2]) -> Polygon {
        debug_assert!(points.len() >= 3, "a polygon needs at least 3 vertices");
        let verts = convex_hull(points);
        let n = verts.len();
        let normals = (0..n)
            .map(|i| right_normal((verts[(i + 1) % n] - verts[i]).normalized()))
            .collect();
        Polygon { verts, normals }
    }

    /// An axis-aligned box centered on the local origin.
    pub fn rect(width: f64, height: f64) -> Polygon {
        let hw = width * 0.5;
        let hh = height * 0.5;
        Polygon::new(&[
            Vec2::new(-hw, -hh),
            Vec2::new(hw, -hh),
            Vec2::new(hw, hh),
            Vec2::new(-hw, hh),
        ])
    }

    /// A regular polygon inscribed in a circle of the given radius.
    pub fn regular(radius: f64, vertex_count: usize, initial_angle: f64) -> Polygon {
        debug_assert!(vertex_count >= 3);
        let verts: Vec<Vec2> = (0..vertex_count)
            .map(|i| {
                let angle = initial_angle + i as f64 * 2.0 * PI / vertex_count as f64;
                Vec2::new(angle.cos(), angle.sin()) * radius
            })
            .collect();
        Polygon::new(&verts)
    }

    #[inline]
    pub fn verts(&self) -> &[Vec2] {
        &self.verts
    }

    #[inline]
    pub fn normals(&self) -> &[Vec2] {
        &self.normals
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.verts.len()
    }
}

impl Shape {
    #[inline]
    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Circle(_) => ShapeKind::Circle,
            Shape::Capsule(_) => ShapeKind::Capsule,
            Shape::Polygon(_) => ShapeKind::Polygon,
        }
    }

    /// The round part of the shape; zero for polygons.
    #[inline]
    pub fn radius(&self) -> f64 {
        match self {
            Shape::Circle(c) => c.radius,
            Shape::Capsule(c) => c.radius,
            Shape::Polygon(_) => 0.0,
        }
    }

    pub fn compute_mass(&self, density: f64) -> MassData {
        match self {
            Shape::Circle(c) => {
                let mass = density * PI * c.radius * c.radius;
                MassData {
                    mass,
                    center: Vec2::zero(),
                    inertia: 0.5 * mass * c.radius * c.radius,
                }
            }
            Shape::Capsule(c) => capsule_mass(c, density),
            Shape::Polygon(p) => polygon_mass(p, density),
        }
    }

    pub fn compute_aabb(&self, pose: &Pose) -> Aabb {
        match self {
            Shape::Circle(c) => {
                let r = Vec2::new(c.radius, c.radius);
                Aabb::new(pose.translation - r, pose.translation + r)
            }
            Shape::Capsule(c) => {
                let a = *pose * c.a;
                let b = *pose * c.b;
                let r = Vec2::new(c.radius, c.radius);
                Aabb::new(a.min_by_component(b) - r, a.max_by_component(b) + r)
            }
            Shape::Polygon(p) => {
                let mut min = *pose * p.verts[0];
                let mut max = min;
                for v in &p.verts[1..] {
                    let w = *pose * *v;
                    min = min.min_by_component(w);
                    max = max.max_by_component(w);
                }
                Aabb::new(min, max)
            }
        }
    }

    /// Farthest core vertex in a local direction, with its feature id.
    ///
    /// The core excludes the round part; add `radius() * dir` for the full
    /// support point.
    pub fn support_core(&self, local_dir: Vec2) -> (Vec2, u32) {
        match self {
            Shape::Circle(_) => (Vec2::zero(), FEATURE_NONE),
            Shape::Capsule(c) => {
                if (c.b - c.a).dot(local_dir) > 0.0 {
                    (c.b, 1)
                } else {
                    (c.a, 0)
                }
            }
            Shape::Polygon(p) => {
                let mut best = 0;
                let mut best_dot = p.verts[0].dot(local_dir);
                for (i, v) in p.verts.iter().enumerate().skip(1) {
                    let d = v.dot(local_dir);
                    if d > best_dot {
                        best = i;
                        best_dot = d;
                    }
                }
                (p.verts[best], best as u32)
            }
        }
    }

    /// The world-space surface edge most facing `dir`.
    ///
    /// Used by the clipping manifold builder; circles have no edge feature
    /// and are handled by dedicated detection routines.
    pub fn featured_edge(&self, pose: &Pose, dir: Vec2) -> FeaturedEdge {
        let local_dir = pose.rotation.reversed() * dir;
        match self {
            Shape::Circle(c) => {
                let p = *pose * (local_dir * c.radius);
                FeaturedEdge {
                    p1: p,
                    p2: p,
                    id1: FEATURE_NONE,
                    id2: FEATURE_NONE,
                }
            }
            Shape::Capsule(c) => {
                let offset = dir * c.radius;
                FeaturedEdge {
                    p1: *pose * c.a + offset,
                    p2: *pose * c.b + offset,
                    id1: 0,
                    id2: 1,
                }
            }
            Shape::Polygon(p) => {
                let n = p.verts.len();
                let (curr, idx) = self.support_core(local_dir);
                let idx = idx as usize;
                let prev_idx = (idx + n - 1) % n;
                let next_idx = (idx + 1) % n;
                let e1 = (curr - p.verts[prev_idx]).normalized();
                let e2 = (curr - p.verts[next_idx]).normalized();

                // pick the adjacent edge more perpendicular to the direction
                if e1.dot(local_dir).abs() <= e2.dot(local_dir).abs() {
                    FeaturedEdge {
                        p1: *pose * p.verts[prev_idx],
                        p2: *pose * curr,
                        id1: prev_idx as u32,
                        id2: idx as u32,
                    }
                } else {
                    FeaturedEdge {
                        p1: *pose * curr,
                        p2: *pose * p.verts[next_idx],
                        id1: idx as u32,
                        id2: next_idx as u32,
                    }
                }
            }
        }
    }

    pub fn test_point(&self, pose: &Pose, q: Vec2) -> bool {
        let local_q = pose.inversed() * q;
        match self {
            Shape::Circle(c) => local_q.mag_sq() <= c.radius * c.radius,
            Shape::Capsule(c) => {
                let cp = closest_on_segment(c.a, c.b, local_q);
                (local_q - cp).mag_sq() <= c.radius * c.radius
            }
            Shape::Polygon(p) => p
                .verts
                .iter()
                .zip(p.normals.iter())
                .all(|(v, n)| n.dot(local_q - *v) <= 0.0),
        }
    }

    /// The point on the shape's surface (or inside it) closest to `q`.
    pub fn closest_point(&self, pose: &Pose, q: Vec2) -> Vec2 {
        if self.test_point(pose, q) {
            return q;
        }
        let local_q = pose.inversed() * q;
        let local_cp = match self {
            Shape::Circle(c) => local_q.normalized() * c.radius,
            Shape::Capsule(c) => {
                let on_core = closest_on_segment(c.a, c.b, local_q);
                on_core + (local_q - on_core).normalized() * c.radius
            }
            Shape::Polygon(p) => {
                let n = p.verts.len();
                let mut best = p.verts[0];
                let mut best_d = f64::MAX;
                for i in 0..n {
                    let cp = closest_on_segment(p.verts[i], p.verts[(i + 1) % n], local_q);
                    let d = (local_q - cp).mag_sq();
                    if d < best_d {
                        best_d = d;
                        best = cp;
                    }
                }
                best
            }
        };
        *pose * local_cp
    }

    pub fn ray_cast(&self, pose: &Pose, input: &RayCastInput) -> Option<RayCastHit> {
        // work in local space, rotate the hit normal back out
        let inv = pose.inversed();
        let from = inv * input.from;
        let to = inv * input.to;
        let d = to - from;

        let hit = match self {
            Shape::Circle(c) => ray_circle(from, d, Vec2::zero(), c.radius, input.max_fraction),
            Shape::Capsule(c) => ray_capsule(from, d, c, input.max_fraction),
            Shape::Polygon(p) => ray_polygon(from, d, p, input.max_fraction),
        };
        hit.map(|h| RayCastHit {
            fraction: h.fraction,
            normal: pose.rotation * h.normal,
        })
    }
}

#[inline]
pub(crate) fn closest_on_segment(a: Vec2, b: Vec2, q: Vec2) -> Vec2 {
    let ab = b - a;
    let len_sq = ab.mag_sq();
    if len_sq < f64::EPSILON {
        return a;
    }
    let t = ((q - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

//
// mass properties
//

fn capsule_mass(c: &Capsule, density: f64) -> MassData {
    let length = (c.b - c.a).mag();
    let r = c.radius;
    let center = (c.a + c.b) * 0.5;

    let rect_area = length * 2.0 * r;
    let circle_area = PI * r * r;
    let mass = density * (rect_area + circle_area);

    // rectangle part about the capsule center
    let rect_inertia = rect_area * (length * length + 4.0 * r * r) / 12.0;
    // two half discs, each offset from the center by the half length plus
    // the half disc's own centroid offset 4r/3pi
    let half_circle_inertia = (PI / 4.0 - 8.0 / (9.0 * PI)) * r * r * r * r;
    let d = length * 0.5 + 4.0 * r / (3.0 * PI);
    let caps_inertia = 2.0 * (half_circle_inertia + (circle_area * 0.5) * d * d);

    MassData {
        mass,
        center,
        inertia: density * (rect_inertia + caps_inertia),
    }
}

fn polygon_mass(p: &Polygon, density: f64) -> MassData {
    // fan triangulation about the first vertex
    let ref_point = p.verts[0];
    let mut area = 0.0;
    let mut centroid = Vec2::zero();
    let mut inertia = 0.0;

    for i in 1..p.verts.len() - 1 {
        let e1 = p.verts[i] - ref_point;
        let e2 = p.verts[i + 1] - ref_point;
        let d = cross(e1, e2);
        let tri_area = 0.5 * d;
        area += tri_area;
        centroid += (e1 + e2) * (tri_area / 3.0);
        // second moment of the triangle about the reference point
        inertia += d * (e1.mag_sq() + e1.dot(e2) + e2.mag_sq()) / 12.0;
    }

    let mass = density * area;
    centroid = centroid / area;
    // shift inertia from the reference point to the centroid
    let inertia_about_centroid = density * inertia - mass * centroid.mag_sq();
    MassData {
        mass,
        center: ref_point + centroid,
        inertia: inertia_about_centroid,
    }
}

//
// ray casts
//

fn ray_circle(
    from: Vec2,
    d: Vec2,
    center: Vec2,
    radius: f64,
    max_fraction: f64,
) -> Option<RayCastHit> {
    let m = from - center;
    let a = d.mag_sq();
    if a < f64::EPSILON {
        return None;
    }
    let b = m.dot(d);
    let c = m.mag_sq() - radius * radius;
    let disc = b * b - a * c;
    if disc < 0.0 {
        return None;
    }
    let t = (-b - disc.sqrt()) / a;
    if t < 0.0 || t > max_fraction {
        return None;
    }
    Some(RayCastHit {
        fraction: t,
        normal: (m + d * t).normalized(),
    })
}

fn ray_capsule(from: Vec2, d: Vec2, c: &Capsule, max_fraction: f64) -> Option<RayCastHit> {
    let axis = c.b - c.a;
    let len = axis.mag();
    if len < f64::EPSILON {
        return ray_circle(from, d, c.a, c.radius, max_fraction);
    }
    let u = axis / len;
    let n = Vec2::new(-u.y, u.x);

    let mut best: Option<RayCastHit> = None;
    let mut consider = |hit: Option<RayCastHit>| {
        if let Some(h) = hit {
            if best.map_or(true, |b| h.fraction < b.fraction) {
                best = Some(h);
            }
        }
    };

    // side walls: the two lines offset from the axis by the radius,
    // valid only within the segment span
    for side in [1.0, -1.0] {
        let wall_n = n * side;
        let denom = d.dot(wall_n);
        if denom.abs() < f64::EPSILON {
            continue;
        }
        let t = (c.radius - (from - c.a).dot(wall_n)) / denom;
        if t < 0.0 || t > max_fraction || denom > 0.0 {
            continue;
        }
        let p = from + d * t;
        let along = (p - c.a).dot(u);
        if along >= 0.0 && along <= len {
            consider(Some(RayCastHit {
                fraction: t,
                normal: wall_n,
            }));
        }
    }

    consider(ray_circle(from, d, c.a, c.radius, max_fraction));
    consider(ray_circle(from, d, c.b, c.radius, max_fraction));
    best
}

fn ray_polygon(from: Vec2, d: Vec2, p: &Polygon, max_fraction: f64) -> Option<RayCastHit> {
    // clip the ray against every face half-plane
    let mut t_min = 0.0;
    let mut t_max = max_fraction;
    let mut normal = Vec2::zero();

    for (v, n) in p.verts.iter().zip(p.normals.iter()) {
        let num = n.dot(*v - from);
        let denom = n.dot(d);
        if denom.abs() < f64::EPSILON {
            if num < 0.0 {
                return None;
            }
        } else {
            let t = num / denom;
            if denom < 0.0 {
                // entering this half-plane
                if t > t_min {
                    t_min = t;
                    normal = *n;
                }
            } else if t < t_max {
                t_max = t;
            }
            if t_min > t_max {
                return None;
            }
        }
    }

    // a ray starting inside never clips an entering plane
    if normal == Vec2::zero() {
        return None;
    }
    Some(RayCastHit {
        fraction: t_min,
        normal,
    })
}

//
// convex hull
//

/// Andrew's monotone chain, counterclockwise output.
fn convex_hull(points: &[Vec2]) -> Vec<Vec2> {
    let mut pts: Vec<Vec2> = points.to_vec();
    pts.sort_by(|a, b| {
        a.x.partial_cmp(&b.x)
            .unwrap()
            .then(a.y.partial_cmp(&b.y).unwrap())
    });
    pts.dedup_by(|a, b| (*a - *b).mag_sq() < 1e-18);
    if pts.len() < 3 {
        return pts;
    }

    let mut hull: Vec<Vec2> = Vec::with_capacity(pts.len() * 2);
    // lower chain
    for &p in &pts {
        while hull.len() >= 2
            && cross(
                hull[hull.len() - 1] - hull[hull.len() - 2],
                p - hull[hull.len() - 2],
            ) <= 0.0
        {
            hull.pop();
        }
        hull.push(p);
    }
    // upper chain
    let lower_len = hull.len() + 1;
    for &p in pts.iter().rev().skip(1) {
        while hull.len() >= lower_len
            && cross(
                hull[hull.len() - 1] - hull[hull.len() - 2],
                p - hull[hull.len() - 2],
            ) <= 0.0
        {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();
    hull
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Rotor2;

    fn identity() -> Pose {
        Pose::new(Vec2::zero(), Rotor2::identity())
    }

    #[test]
    fn hull_drops_interior_points() {
        let poly = Polygon::new(&[
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(0.0, 2.0),
            Vec2::new(1.0, 1.0),
        ]);
        assert_eq!(poly.vertex_count(), 4);
    }

    #[test]
    fn box_mass_properties() {
        let shape = Shape::Polygon(Polygon::rect(2.0, 4.0));
        let md = shape.compute_mass(1.0);
        assert!((md.mass - 8.0).abs() < 1e-9);
        assert!(md.center.mag() < 1e-9);
        // 1/12 m (w^2 + h^2)
        assert!((md.inertia - 8.0 * (4.0 + 16.0) / 12.0).abs() < 1e-9);
    }

    #[test]
    fn circle_mass_properties() {
        let shape = Shape::Circle(Circle { radius: 2.0 });
        let md = shape.compute_mass(0.5);
        assert!((md.mass - 0.5 * PI * 4.0).abs() < 1e-9);
        assert!((md.inertia - 0.5 * md.mass * 4.0).abs() < 1e-9);
    }

    #[test]
    fn capsule_mass_reduces_to_circle() {
        // zero length capsule is a circle
        let shape = Shape::Capsule(Capsule {
            a: Vec2::zero(),
            b: Vec2::zero(),
            radius: 1.0,
        });
        let md = shape.compute_mass(1.0);
        assert!((md.mass - PI).abs() < 1e-9);
    }

    #[test]
    fn polygon_support_and_featured_edge() {
        let shape = Shape::Polygon(Polygon::rect(2.0, 2.0));
        let (v, id) = shape.support_core(Vec2::new(1.0, 1.0));
        assert!((v - Vec2::new(1.0, 1.0)).mag() < 1e-12);
        assert_eq!(id, 2);

        let edge = shape.featured_edge(&identity(), Vec2::new(0.0, 1.0));
        // the top edge, perpendicular to the query direction
        assert!((edge.p1.y - 1.0).abs() < 1e-12);
        assert!((edge.p2.y - 1.0).abs() < 1e-12);
        assert!(edge.length() > 1.9);
    }

    #[test]
    fn point_tests() {
        let poly = Shape::Polygon(Polygon::rect(2.0, 2.0));
        assert!(poly.test_point(&identity(), Vec2::new(0.9, 0.9)));
        assert!(!poly.test_point(&identity(), Vec2::new(1.1, 0.0)));

        let cap = Shape::Capsule(Capsule {
            a: Vec2::new(-1.0, 0.0),
            b: Vec2::new(1.0, 0.0),
            radius: 0.5,
        });
        assert!(cap.test_point(&identity(), Vec2::new(1.3, 0.0)));
        assert!(!cap.test_point(&identity(), Vec2::new(1.6, 0.0)));
    }

    #[test]
    fn ray_hits_box_face() {
        let shape = Shape::Polygon(Polygon::rect(2.0, 2.0));
        let hit = shape
            .ray_cast(
                &identity(),
                &RayCastInput {
                    from: Vec2::new(-5.0, 0.0),
                    to: Vec2::new(5.0, 0.0),
                    max_fraction: 1.0,
                },
            )
            .unwrap();
        assert!((hit.fraction - 0.4).abs() < 1e-9);
        assert!((hit.normal - Vec2::new(-1.0, 0.0)).mag() < 1e-9);
    }

    #[test]
    fn ray_hits_circle() {
        let shape = Shape::Circle(Circle { radius: 1.0 });
        let hit = shape
            .ray_cast(
                &identity(),
                &RayCastInput {
                    from: Vec2::new(-3.0, 0.0),
                    to: Vec2::new(3.0, 0.0),
                    max_fraction: 1.0,
                },
            )
            .unwrap();
        // enters at x = -1: fraction (3 - 1) / 6
        assert!((hit.fraction - 2.0 / 6.0).abs() < 1e-9);
        assert!((hit.normal - Vec2::new(-1.0, 0.0)).mag() < 1e-9);
    }

    #[test]
    fn ray_hits_capsule_side() {
        let shape = Shape::Capsule(Capsule {
            a: Vec2::new(-1.0, 0.0),
            b: Vec2::new(1.0, 0.0),
            radius: 0.5,
        });
        let hit = shape
            .ray_cast(
                &identity(),
                &RayCastInput {
                    from: Vec2::new(0.0, 2.0),
                    to: Vec2::new(0.0, -2.0),
                    max_fraction: 1.0,
                },
            )
            .unwrap();
        // hits the top wall at y = 0.5
        assert!((hit.fraction - 1.5 / 4.0).abs() < 1e-9);
        assert!((hit.normal - Vec2::new(0.0, 1.0)).mag() < 1e-9);
    }

    #[test]
    fn closest_point_on_polygon_edge() {
        let shape = Shape::Polygon(Polygon::rect(2.0, 2.0));
        let cp = shape.closest_point(&identity(), Vec2::new(3.0, 0.2));
        assert!((cp - Vec2::new(1.0, 0.2)).mag() < 1e-9);
    }
}
