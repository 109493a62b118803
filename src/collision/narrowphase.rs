//! Narrow phase: shape-pair detection producing contact manifolds.
//!
//! Callers pre-order the pair so `a.kind() >= b.kind()`; that leaves one
//! routine per unordered pair. Circle pairs are closed-form, every other
//! pair runs GJK/EPA and builds the manifold by clipping the incident edge
//! against the reference edge.

use super::gjk::{epa, gjk};
use super::shape::{closest_on_segment, Circle, FeaturedEdge, Shape, ShapeKind, FEATURE_NONE};
use crate::math::{left_normal, Pose, Vec2};
use crate::settings::{CONTACT_MERGE_THRESHOLD, MAX_CONTACT_POINT};

/// Normals are canonically oriented against this axis when possible, so a
/// pair that swaps roles between frames keeps coherent features.
const WEIGHT_AXIS: Vec2 = Vec2 { x: 0.0, y: 1.0 };

/// A single manifold point with a feature id packing the contributing
/// vertex indices of both shapes.
#[derive(Clone, Copy, Debug, Default)]
pub struct ManifoldPoint {
    pub position: Vec2,
    pub id: u32,
}

/// Up to two contact points sharing one normal.
///
/// With `feature_flipped` unset the normal points from collider A toward
/// collider B; when set the roles of the pair are reversed and the normal
/// points from B toward A. Solvers order the body pair accordingly.
#[derive(Clone, Copy, Debug)]
pub struct ContactManifold {
    pub points: [ManifoldPoint; MAX_CONTACT_POINT],
    pub count: usize,
    pub normal: Vec2,
    pub tangent: Vec2,
    pub penetration: f64,
    pub feature_flipped: bool,
}

impl Default for ContactManifold {
    fn default() -> Self {
        ContactManifold {
            points: [ManifoldPoint::default(); MAX_CONTACT_POINT],
            count: 0,
            normal: Vec2::zero(),
            tangent: Vec2::zero(),
            penetration: 0.0,
            feature_flipped: false,
        }
    }
}

#[inline]
fn pack_id(incident: u32, reference: u32) -> u32 {
    (incident & 0xffff) | ((reference & 0xffff) << 16)
}

/// Run the detection routine for a pre-ordered shape pair.
pub(crate) fn detect(a: &Shape, tf_a: &Pose, b: &Shape, tf_b: &Pose) -> Option<ContactManifold> {
    debug_assert!(a.kind() >= b.kind(), "callers must order the pair by shape kind");

    let mut manifold = match (a.kind(), b.kind()) {
        (ShapeKind::Circle, ShapeKind::Circle) => {
            let (Shape::Circle(ca), Shape::Circle(cb)) = (a, b) else {
                unreachable!()
            };
            circle_circle(ca, tf_a, cb, tf_b)?
        }
        (_, ShapeKind::Circle) => {
            let Shape::Circle(cb) = b else { unreachable!() };
            convex_vs_circle(a, tf_a, cb, tf_b)?
        }
        (ShapeKind::Polygon, ShapeKind::Polygon) => {
            if polygons_separated(a, tf_a, b, tf_b) {
                return None;
            }
            convex_convex(a, tf_a, b, tf_b)?
        }
        _ => convex_convex(a, tf_a, b, tf_b)?,
    };

    // canonical orientation for cross-frame coherence
    if manifold.normal.dot(WEIGHT_AXIS) < 0.0 {
        manifold.normal = -manifold.normal;
        manifold.feature_flipped = !manifold.feature_flipped;
    }
    manifold.tangent = left_normal(manifold.normal);
    Some(manifold)
}

fn circle_circle(a: &Circle, tf_a: &Pose, b: &Circle, tf_b: &Pose) -> Option<ContactManifold> {
    let pa = tf_a.translation;
    let pb = tf_b.translation;
    let radius_sum = a.radius + b.radius;

    let d = pb - pa;
    let dist_sq = d.mag_sq();
    if dist_sq > radius_sum * radius_sum {
        return None;
    }

    let dist = dist_sq.sqrt();
    let normal = if dist > f64::EPSILON {
        d / dist
    } else {
        // coincident centers
        WEIGHT_AXIS
    };

    let mut manifold = ContactManifold {
        normal,
        penetration: radius_sum - dist,
        count: 1,
        ..Default::default()
    };
    manifold.points[0] = ManifoldPoint {
        position: pa + normal * a.radius,
        id: FEATURE_NONE,
    };
    Some(manifold)
}

/// Capsule-or-polygon A against circle B: a closest-feature query against
/// A's core, pushed out by the radii.
fn convex_vs_circle(a: &Shape, tf_a: &Pose, b: &Circle, tf_b: &Pose) -> Option<ContactManifold> {
    let local_q = tf_a.inversed() * tf_b.translation;

    // closest core point and the feature it came from
    let (core_point, feature, inside) = match a {
        Shape::Capsule(c) => (closest_on_segment(c.a, c.b, local_q), 0u32, false),
        Shape::Polygon(p) => {
            let verts = p.verts();
            let normals = p.normals();
            let n = verts.len();

            let mut max_sep = f64::MIN;
            let mut face = 0;
            for i in 0..n {
                let sep = normals[i].dot(local_q - verts[i]);
                if sep > max_sep {
                    max_sep = sep;
                    face = i;
                }
            }

            if max_sep <= 0.0 {
                // center is inside: push out through the closest face
                let on_face = local_q - normals[face] * max_sep;
                (on_face, face as u32, true)
            } else {
                let cp = closest_on_segment(verts[face], verts[(face + 1) % n], local_q);
                (cp, face as u32, false)
            }
        }
        Shape::Circle(_) => unreachable!("circle pairs use the dedicated routine"),
    };

    let radius_a = a.radius();
    let d = local_q - core_point;
    let dist = d.mag();

    let local_normal = if inside {
        // `core_point - local_q` points back inside; the face normal is the
        // separation direction
        match a {
            Shape::Polygon(p) => p.normals()[feature as usize],
            _ => unreachable!(),
        }
    } else {
        if dist > radius_a + b.radius {
            return None;
        }
        if dist > f64::EPSILON {
            d / dist
        } else {
            WEIGHT_AXIS
        }
    };

    let penetration = if inside {
        radius_a + b.radius + dist
    } else {
        radius_a + b.radius - dist
    };

    let mut manifold = ContactManifold {
        normal: tf_a.rotation * local_normal,
        penetration,
        count: 1,
        ..Default::default()
    };
    manifold.points[0] = ManifoldPoint {
        position: *tf_a * (core_point + local_normal * radius_a),
        id: pack_id(FEATURE_NONE, feature),
    };
    Some(manifold)
}

/// Separating axis test over both polygons' face normals. A cheap certain
/// rejection; accepted pairs continue to GJK/EPA.
fn polygons_separated(a: &Shape, tf_a: &Pose, b: &Shape, tf_b: &Pose) -> bool {
    fn max_separation(a: &Shape, tf_a: &Pose, b: &Shape, tf_b: &Pose) -> f64 {
        let Shape::Polygon(poly) = a else {
            unreachable!()
        };
        let mut best = f64::MIN;
        for (v, n) in poly.verts().iter().zip(poly.normals()) {
            let world_n = tf_a.rotation * *n;
            let world_v = *tf_a * *v;
            let local_dir_b = tf_b.rotation.reversed() * -world_n;
            let (support, _) = b.support_core(local_dir_b);
            let sep = world_n.dot(*tf_b * support - world_v);
            if sep > best {
                best = sep;
            }
        }
        best
    }

    max_separation(a, tf_a, b, tf_b) > 0.0 || max_separation(b, tf_b, a, tf_a) > 0.0
}

fn convex_convex(a: &Shape, tf_a: &Pose, b: &Shape, tf_b: &Pose) -> Option<ContactManifold> {
    let gjk_result = gjk(a, tf_a, b, tf_b, true, true);
    if !gjk_result.collide {
        return None;
    }

    let epa_result = epa(a, tf_a, b, tf_b, &gjk_result.simplex, true);
    let mut manifold = find_contact_points(epa_result.normal, a, tf_a, b, tf_b);
    manifold.penetration = epa_result.depth;
    if manifold.count == 0 {
        return None;
    }
    Some(manifold)
}

/// Build the manifold from the featured edges on both shapes.
///
/// The edge more perpendicular to the contact normal becomes the reference;
/// the other is the incident edge, clipped against the reference side
/// planes and front plane. Surviving incident points are the contacts.
fn find_contact_points(n: Vec2, a: &Shape, tf_a: &Pose, b: &Shape, tf_b: &Pose) -> ContactManifold {
    let edge_a = a.featured_edge(tf_a, n);
    let edge_b = b.featured_edge(tf_b, -n);

    let a_perpendicularness = edge_a.dir().dot(n).abs();
    let b_perpendicularness = edge_b.dir().dot(n).abs();

    let (reference, mut incident, normal, flipped) = if a_perpendicularness <= b_perpendicularness
    {
        (edge_a, edge_b, -n, true)
    } else {
        (edge_b, edge_a, n, false)
    };

    let ref_dir = reference.dir();
    clip_edge(&mut incident, reference.p1, ref_dir, false);
    clip_edge(&mut incident, reference.p2, -ref_dir, false);
    clip_edge(&mut incident, reference.p1, normal, true);

    let mut manifold = ContactManifold {
        normal,
        feature_flipped: flipped,
        ..Default::default()
    };
    if incident.length() <= CONTACT_MERGE_THRESHOLD {
        manifold.points[0] = ManifoldPoint {
            position: incident.p1,
            id: pack_id(incident.id1, reference.id1),
        };
        manifold.count = 1;
    } else {
        manifold.points[0] = ManifoldPoint {
            position: incident.p1,
            id: pack_id(incident.id1, reference.id1),
        };
        manifold.points[1] = ManifoldPoint {
            position: incident.p2,
            id: pack_id(incident.id2, reference.id1),
        };
        manifold.count = 2;
    }
    manifold
}

/// Clip the part of `edge` behind the half-plane at `p` facing `dir`.
///
/// Clipped endpoints are moved to the plane, or dropped onto the surviving
/// endpoint (id included) when `remove_clipped` is set.
fn clip_edge(edge: &mut FeaturedEdge, p: Vec2, dir: Vec2, remove_clipped: bool) {
    let d1 = (edge.p1 - p).dot(dir);
    let d2 = (edge.p2 - p).dot(dir);

    if d1 >= 0.0 && d2 >= 0.0 {
        return;
    }

    let s = d1.abs() + d2.abs();
    if d1 < 0.0 {
        if remove_clipped {
            edge.p1 = edge.p2;
            edge.id1 = edge.id2;
        } else if s > f64::EPSILON {
            edge.p1 += (edge.p2 - edge.p1) * (-d1 / s);
        }
    } else if d2 < 0.0 {
        if remove_clipped {
            edge.p2 = edge.p1;
            edge.id2 = edge.id1;
        } else if s > f64::EPSILON {
            edge.p2 += (edge.p1 - edge.p2) * (-d2 / s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shape::{Capsule, Polygon};
    use crate::math::Rotor2;

    fn pose(x: f64, y: f64) -> Pose {
        Pose::new(Vec2::new(x, y), Rotor2::identity())
    }

    fn pose_rotated(x: f64, y: f64, angle: f64) -> Pose {
        Pose::new(Vec2::new(x, y), Rotor2::from_angle(angle))
    }

    #[test]
    fn circles_touching() {
        let a = Shape::Circle(Circle { radius: 1.0 });
        let b = Shape::Circle(Circle { radius: 1.0 });
        let m = detect(&b, &pose(0.0, 0.0), &a, &pose(1.5, 0.0)).unwrap();
        assert_eq!(m.count, 1);
        assert!((m.penetration - 0.5).abs() < 1e-9);
        assert!((m.normal.dot(Vec2::new(1.0, 0.0))).abs() > 0.99);
        assert!(detect(&a, &pose(0.0, 0.0), &b, &pose(2.5, 0.0)).is_none());
    }

    #[test]
    fn box_on_box_produces_two_points() {
        let a = Shape::Polygon(Polygon::rect(2.0, 2.0));
        let b = Shape::Polygon(Polygon::rect(2.0, 2.0));
        let m = detect(&a, &pose(0.0, 0.0), &b, &pose(0.0, 1.9)).unwrap();
        assert_eq!(m.count, 2);
        assert!((m.penetration - 0.1).abs() < 1e-6);
        // normal canonically along +y
        assert!(m.normal.dot(Vec2::new(0.0, 1.0)) > 0.99);
        assert_ne!(m.points[0].id, m.points[1].id);
    }

    #[test]
    fn feature_ids_stable_across_small_motion() {
        let a = Shape::Polygon(Polygon::rect(2.0, 2.0));
        let b = Shape::Polygon(Polygon::rect(2.0, 2.0));
        let m1 = detect(&a, &pose(0.0, 0.0), &b, &pose(0.0, 1.95)).unwrap();
        let m2 = detect(&a, &pose(0.0, 0.0), &b, &pose(0.001, 1.94)).unwrap();
        assert_eq!(m1.count, 2);
        assert_eq!(m2.count, 2);
        let ids1: Vec<u32> = m1.points[..2].iter().map(|p| p.id).collect();
        let ids2: Vec<u32> = m2.points[..2].iter().map(|p| p.id).collect();
        assert_eq!(ids1, ids2);
    }

    #[test]
    fn sat_rejects_clearly_separated_polygons() {
        let a = Shape::Polygon(Polygon::rect(2.0, 2.0));
        let b = Shape::Polygon(Polygon::rect(2.0, 2.0));
        assert!(polygons_separated(&a, &pose(0.0, 0.0), &b, &pose(5.0, 0.0)));
        assert!(!polygons_separated(&a, &pose(0.0, 0.0), &b, &pose(1.0, 0.0)));
        assert!(detect(&a, &pose(0.0, 0.0), &b, &pose_rotated(5.0, 0.0, 0.3)).is_none());
    }

    #[test]
    fn polygon_vs_circle_from_outside() {
        let a = Shape::Polygon(Polygon::rect(2.0, 2.0));
        let b = Shape::Circle(Circle { radius: 0.5 });
        // circle above the top face, overlapping by 0.1
        let m = detect(&a, &pose(0.0, 0.0), &b, &pose(0.0, 1.4)).unwrap();
        assert_eq!(m.count, 1);
        assert!((m.penetration - 0.1).abs() < 1e-9);
        assert!(m.normal.dot(Vec2::new(0.0, 1.0)) > 0.99);
        assert!((m.points[0].position - Vec2::new(0.0, 1.0)).mag() < 1e-9);
    }

    #[test]
    fn polygon_vs_circle_center_inside() {
        let a = Shape::Polygon(Polygon::rect(2.0, 2.0));
        let b = Shape::Circle(Circle { radius: 0.5 });
        let m = detect(&a, &pose(0.0, 0.0), &b, &pose(0.0, 0.9)).unwrap();
        assert_eq!(m.count, 1);
        // center is 0.1 inside the top face
        assert!((m.penetration - 0.6).abs() < 1e-9);
        assert!(m.normal.dot(Vec2::new(0.0, 1.0)) > 0.99);
    }

    #[test]
    fn capsule_vs_circle() {
        let a = Shape::Capsule(Capsule {
            a: Vec2::new(-1.0, 0.0),
            b: Vec2::new(1.0, 0.0),
            radius: 0.5,
        });
        let b = Shape::Circle(Circle { radius: 0.5 });
        let m = detect(&a, &pose(0.0, 0.0), &b, &pose(0.3, 0.9)).unwrap();
        assert_eq!(m.count, 1);
        assert!((m.penetration - 0.1).abs() < 1e-9);
        assert!(m.normal.dot(Vec2::new(0.0, 1.0)) > 0.99);
    }

    #[test]
    fn capsule_resting_on_box_gets_two_points() {
        let ground = Shape::Polygon(Polygon::rect(10.0, 1.0));
        let cap = Shape::Capsule(Capsule {
            a: Vec2::new(-1.0, 0.0),
            b: Vec2::new(1.0, 0.0),
            radius: 0.5,
        });
        // capsule axis at y = 0.95: surface overlaps the ground top (0.5) by 0.05
        let m = detect(&ground, &pose(0.0, 0.0), &cap, &pose(0.0, 0.95)).unwrap();
        assert_eq!(m.count, 2);
        assert!(m.penetration > 0.02 && m.penetration < 0.08);
    }

    #[test]
    fn clip_preserves_ids() {
        let mut edge = FeaturedEdge {
            p1: Vec2::new(-2.0, 0.0),
            p2: Vec2::new(2.0, 0.0),
            id1: 7,
            id2: 8,
        };
        // clip to the right of x = -1
        clip_edge(&mut edge, Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0), false);
        assert!((edge.p1 - Vec2::new(-1.0, 0.0)).mag() < 1e-9);
        assert_eq!(edge.id1, 7);

        // removal drops the clipped endpoint onto the survivor
        let mut edge = FeaturedEdge {
            p1: Vec2::new(-2.0, 1.0),
            p2: Vec2::new(2.0, -1.0),
            id1: 3,
            id2: 4,
        };
        clip_edge(&mut edge, Vec2::zero(), Vec2::new(0.0, -1.0), true);
        assert_eq!(edge.id1, 4);
        assert_eq!(edge.id2, 4);
    }
}
