//! Persistent contacts: one per overlapping collider pair, carrying the
//! manifold and accumulated impulses across frames.

use crate::body::Material;
use crate::collision::narrowphase::{detect, ContactManifold};
use crate::collision::Shape;
use crate::math::Pose;
use crate::settings::MAX_CONTACT_POINT;
use crate::world::{BodyKey, ColliderKey, World};

/// Per-collider contact callbacks, invoked synchronously inside
/// [`World::step`].
///
/// Listeners get read access to the world; structural mutation (creating or
/// destroying bodies, colliders or joints) is deferred to after the step by
/// construction.
pub trait ContactListener {
    fn on_contact_begin(
        &mut self,
        _world: &World,
        _own: ColliderKey,
        _other: ColliderKey,
        _manifold: &ContactManifold,
    ) {
    }

    fn on_contact_touching(
        &mut self,
        _world: &World,
        _own: ColliderKey,
        _other: ColliderKey,
        _manifold: &ContactManifold,
    ) {
    }

    fn on_contact_end(&mut self, _world: &World, _own: ColliderKey, _other: ColliderKey) {}
}

/// Touch-state change produced by a manifold update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Transition {
    None,
    Begin,
    Touching,
    End,
}

/// A persistent contact between two colliders.
///
/// Collider A always has the greater or equal shape kind, so each ordered
/// pair maps to exactly one detection routine.
#[derive(Debug)]
pub struct Contact {
    pub(crate) collider_a: ColliderKey,
    pub(crate) collider_b: ColliderKey,
    pub(crate) body_a: BodyKey,
    pub(crate) body_b: BodyKey,

    pub(crate) manifold: ContactManifold,
    pub(crate) normal_impulses: [f64; MAX_CONTACT_POINT],
    pub(crate) tangent_impulses: [f64; MAX_CONTACT_POINT],

    pub(crate) friction: f64,
    pub(crate) restitution: f64,
    pub(crate) surface_speed: f64,

    pub(crate) touching: bool,
    pub(crate) island: bool,
}

impl Contact {
    pub(crate) fn new(
        collider_a: ColliderKey,
        collider_b: ColliderKey,
        body_a: BodyKey,
        body_b: BodyKey,
        material_a: &Material,
        material_b: &Material,
    ) -> Self {
        Contact {
            collider_a,
            collider_b,
            body_a,
            body_b,
            manifold: ContactManifold::default(),
            normal_impulses: [0.0; MAX_CONTACT_POINT],
            tangent_impulses: [0.0; MAX_CONTACT_POINT],
            friction: material_a.friction_with(material_b),
            restitution: material_a.restitution_with(material_b),
            surface_speed: material_b.surface_speed - material_a.surface_speed,
            touching: false,
            island: false,
        }
    }

    #[inline]
    pub fn colliders(&self) -> (ColliderKey, ColliderKey) {
        (self.collider_a, self.collider_b)
    }

    #[inline]
    pub fn bodies(&self) -> (BodyKey, BodyKey) {
        (self.body_a, self.body_b)
    }

    #[inline]
    pub fn manifold(&self) -> &ContactManifold {
        &self.manifold
    }

    #[inline]
    pub fn is_touching(&self) -> bool {
        self.touching
    }

    /// Accumulated normal impulse of a manifold point from the last solve.
    #[inline]
    pub fn normal_impulse(&self, point: usize) -> f64 {
        self.normal_impulses[point]
    }

    #[inline]
    pub fn tangent_impulse(&self, point: usize) -> f64 {
        self.tangent_impulses[point]
    }

    /// Mixed friction coefficient of the collider pair.
    #[inline]
    pub fn friction(&self) -> f64 {
        self.friction
    }

    /// Re-run detection and correlate the new manifold with the old one.
    ///
    /// Points whose feature id survives the frame keep their accumulated
    /// impulses for warm starting; everything else resets to zero.
    pub(crate) fn update(
        &mut self,
        shape_a: &Shape,
        tf_a: &Pose,
        shape_b: &Shape,
        tf_b: &Pose,
        allow_warm_start: bool,
    ) -> Transition {
        let old_manifold = self.manifold;
        let old_normal_impulses = self.normal_impulses;
        let old_tangent_impulses = self.tangent_impulses;
        let was_touching = self.touching;

        match detect(shape_a, tf_a, shape_b, tf_b) {
            Some(manifold) => {
                self.manifold = manifold;
                self.touching = true;
            }
            None => {
                self.manifold = ContactManifold::default();
                self.touching = false;
            }
        }

        self.normal_impulses = [0.0; MAX_CONTACT_POINT];
        self.tangent_impulses = [0.0; MAX_CONTACT_POINT];

        if !self.touching {
            return if was_touching {
                Transition::End
            } else {
                Transition::None
            };
        }

        if allow_warm_start {
            for n in 0..self.manifold.count {
                if let Some(o) = old_manifold.points[..old_manifold.count]
                    .iter()
                    .position(|old| old.id == self.manifold.points[n].id)
                {
                    self.normal_impulses[n] = old_normal_impulses[o];
                    self.tangent_impulses[n] = old_tangent_impulses[o];
                }
            }
        }

        if was_touching {
            Transition::Touching
        } else {
            Transition::Begin
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shape::{Circle, Polygon};
    use crate::math::{Rotor2, Vec2};

    fn pose(x: f64, y: f64) -> Pose {
        Pose::new(Vec2::new(x, y), Rotor2::identity())
    }

    fn dummy_contact() -> Contact {
        Contact::new(
            ColliderKey::default(),
            ColliderKey::default(),
            BodyKey::default(),
            BodyKey::default(),
            &Material::default(),
            &Material::default(),
        )
    }

    #[test]
    fn transitions_follow_touch_state() {
        let a = Shape::Circle(Circle { radius: 0.5 });
        let b = Shape::Circle(Circle { radius: 0.5 });
        let mut contact = dummy_contact();

        assert_eq!(
            contact.update(&a, &pose(0.0, 0.0), &b, &pose(0.9, 0.0), true),
            Transition::Begin
        );
        assert_eq!(
            contact.update(&a, &pose(0.0, 0.0), &b, &pose(0.9, 0.0), true),
            Transition::Touching
        );
        assert_eq!(
            contact.update(&a, &pose(0.0, 0.0), &b, &pose(5.0, 0.0), true),
            Transition::End
        );
        assert_eq!(
            contact.update(&a, &pose(0.0, 0.0), &b, &pose(5.0, 0.0), true),
            Transition::None
        );
    }

    #[test]
    fn warm_start_keeps_impulses_for_stable_features() {
        let ground = Shape::Polygon(Polygon::rect(10.0, 1.0));
        let b = Shape::Polygon(Polygon::rect(1.0, 1.0));
        let mut contact = dummy_contact();

        contact.update(&b, &pose(0.0, 0.95), &ground, &pose(0.0, 0.0), true);
        assert_eq!(contact.manifold.count, 2);
        contact.normal_impulses = [1.5, 2.5];
        contact.tangent_impulses = [0.1, -0.2];

        contact.update(&b, &pose(0.001, 0.951), &ground, &pose(0.0, 0.0), true);
        assert_eq!(contact.manifold.count, 2);
        assert_eq!(contact.normal_impulses, [1.5, 2.5]);
        assert_eq!(contact.tangent_impulses, [0.1, -0.2]);

        // with warm starting off, impulses reset
        contact.update(&b, &pose(0.001, 0.951), &ground, &pose(0.0, 0.0), false);
        assert_eq!(contact.normal_impulses, [0.0, 0.0]);
    }
}
