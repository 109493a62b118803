//! Collision detection: bounding volumes, shapes, the broad phase tree and
//! the GJK/EPA narrow phase kernel.

use crate::body::{Filter, Material};
use crate::math::Vec2;
use crate::world::BodyKey;

pub mod bvh;
pub use bvh::{AabbTree, NodeIndex, NULL_NODE};

pub mod broadphase;
pub use broadphase::BroadPhase;

pub mod shape;
pub use shape::{Capsule, Circle, MassData, Polygon, Shape, ShapeKind};

pub mod gjk;
pub use gjk::{compute_distance, shape_cast, DistanceResult, ShapeCastHit};

pub mod narrowphase;
pub use narrowphase::{ContactManifold, ManifoldPoint};

//
// AABB
//

/// An axis-aligned bounding box.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    #[inline]
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Aabb { min, max }
    }

    /// The smallest box enclosing both `self` and `other`.
    #[inline]
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min_by_component(other.min),
            max: self.max.max_by_component(other.max),
        }
    }

    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    #[inline]
    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
    }

    #[inline]
    pub fn contains_point(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Grow the box by the same margin in every direction.
    #[inline]
    pub fn padded(&self, margin: f64) -> Aabb {
        let m = Vec2::new(margin, margin);
        Aabb {
            min: self.min - m,
            max: self.max + m,
        }
    }

    /// Grow the box in the direction of a displacement.
    #[inline]
    pub fn extended(&self, displacement: Vec2) -> Aabb {
        let mut out = *self;
        if displacement.x > 0.0 {
            out.max.x += displacement.x;
        } else {
            out.min.x += displacement.x;
        }
        if displacement.y > 0.0 {
            out.max.y += displacement.y;
        } else {
            out.min.y += displacement.y;
        }
        out
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    pub fn extents(&self) -> Vec2 {
        (self.max - self.min) * 0.5
    }

    /// Surface area heuristic cost of this box.
    #[inline]
    pub fn area(&self) -> f64 {
        let d = self.max - self.min;
        d.x * d.y
    }

    #[inline]
    pub fn perimeter(&self) -> f64 {
        let d = self.max - self.min;
        2.0 * (d.x + d.y)
    }
}

//
// rays
//

/// A ray defined such that a hit point is `from + fraction * (to - from)`
/// with `fraction` in `[0, max_fraction]`.
#[derive(Clone, Copy, Debug)]
pub struct RayCastInput {
    pub from: Vec2,
    pub to: Vec2,
    pub max_fraction: f64,
}

/// Result of a ray test against a single shape.
#[derive(Clone, Copy, Debug)]
pub struct RayCastHit {
    pub fraction: f64,
    /// Outward surface normal at the hit point.
    pub normal: Vec2,
}

/// Fraction at which a ray enters an AABB, or None if it misses.
///
/// A ray starting inside the box reports fraction 0.
pub(crate) fn ray_aabb(from: Vec2, dir: Vec2, aabb: &Aabb) -> Option<f64> {
    let mut t_min: f64 = 0.0;
    let mut t_max = f64::MAX;
    for axis in 0..2 {
        let (d, o, lo, hi) = match axis {
            0 => (dir.x, from.x, aabb.min.x, aabb.max.x),
            _ => (dir.y, from.y, aabb.min.y, aabb.max.y),
        };
        if d.abs() < f64::EPSILON {
            if o < lo || o > hi {
                return None;
            }
        } else {
            let inv = 1.0 / d;
            let mut t1 = (lo - o) * inv;
            let mut t2 = (hi - o) * inv;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }
    }
    Some(t_min)
}

//
// colliders
//

/// A shape attached to a body, with its own material and collision filter.
///
/// One body may carry several colliders; they share the body's pose.
#[derive(Clone, Debug)]
pub struct Collider {
    pub shape: Shape,
    pub body: BodyKey,
    pub material: Material,
    pub filter: Filter,
    pub density: f64,
    /// Leaf index in the broad phase tree.
    pub(crate) proxy: NodeIndex,
}

impl Collider {
    pub(crate) fn new(shape: Shape, body: BodyKey, density: f64) -> Self {
        Collider {
            shape,
            body,
            material: Material::default(),
            filter: Filter::default(),
            density,
            proxy: NULL_NODE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_encloses_both() {
        let a = Aabb::new(Vec2::new(-1.0, -1.0), Vec2::new(1.0, 1.0));
        let b = Aabb::new(Vec2::new(0.5, 0.5), Vec2::new(3.0, 2.0));
        let u = a.union(&b);
        assert!(u.contains(&a));
        assert!(u.contains(&b));
        assert!((u.area() - 4.0 * 3.0).abs() < 1e-12);
    }

    #[test]
    fn extend_is_directional() {
        let a = Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0));
        let e = a.extended(Vec2::new(2.0, -3.0));
        assert_eq!(e.max.x, 3.0);
        assert_eq!(e.min.x, 0.0);
        assert_eq!(e.min.y, -3.0);
        assert_eq!(e.max.y, 1.0);
    }

    #[test]
    fn ray_misses_and_hits() {
        let b = Aabb::new(Vec2::new(1.0, -1.0), Vec2::new(2.0, 1.0));
        let t = ray_aabb(Vec2::zero(), Vec2::new(1.0, 0.0), &b).unwrap();
        assert!((t - 1.0).abs() < 1e-12);
        assert!(ray_aabb(Vec2::zero(), Vec2::new(0.0, 1.0), &b).is_none());
        // starting inside
        let t = ray_aabb(Vec2::new(1.5, 0.0), Vec2::new(1.0, 0.0), &b).unwrap();
        assert_eq!(t, 0.0);
    }
}
