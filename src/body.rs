//! Rigid bodies, their mass data, materials and collision filters.

use crate::math::{Pose, Rotor2, Vec2};
use crate::world::{ColliderKey, ContactKey, JointKey};

/// The type of a rigid body determines how it is treated in physics updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub enum BodyType {
    /// Does not respond to forces and cannot move.
    Static,
    /// Moves with its set velocity but does not respond to forces.
    Kinematic,
    /// The default type of body; responds to forces and collisions.
    Dynamic,
}

/// Velocity of a body.
#[derive(Clone, Copy, Debug)]
pub struct Velocity {
    /// Linear velocity in metres per second.
    pub linear: Vec2,
    /// Angular velocity in radians per second.
    pub angular: f64,
}

impl Default for Velocity {
    fn default() -> Self {
        Velocity {
            linear: Vec2::zero(),
            angular: 0.0,
        }
    }
}

impl Velocity {
    /// Get the linear velocity of a point offset from the center of mass.
    #[inline]
    pub fn point_velocity(&self, offset: Vec2) -> Vec2 {
        self.linear + Vec2::new(-offset.y, offset.x) * self.angular
    }
}

/// Mass or moment of inertia of a body, which can be infinite.
///
/// This stores both a mass value and its inverse, because calculating
/// inverse mass is expensive and needed a lot in physics calculations.
#[derive(Clone, Copy, Debug)]
pub enum Mass {
    Finite { mass: f64, inverse: f64 },
    Infinite,
}

impl From<f64> for Mass {
    #[inline]
    fn from(mass: f64) -> Self {
        if mass > 0.0 {
            Mass::Finite {
                mass,
                inverse: 1.0 / mass,
            }
        } else {
            Mass::Infinite
        }
    }
}

impl Mass {
    /// Get the inverse of the mass, which is zero if the mass is infinite.
    #[inline]
    pub fn inv(&self) -> f64 {
        match self {
            Mass::Finite { inverse, .. } => *inverse,
            Mass::Infinite => 0.0,
        }
    }

    #[inline]
    pub fn value(&self) -> Option<f64> {
        match self {
            Mass::Finite { mass, .. } => Some(*mass),
            Mass::Infinite => None,
        }
    }
}

/// Determines how a collider's surface responds to contacts.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub struct Material {
    pub friction: f64,
    pub restitution: f64,
    /// Conveyor-belt style surface speed along the contact tangent.
    pub surface_speed: f64,
}

impl Default for Material {
    fn default() -> Self {
        Material {
            friction: 0.5,
            restitution: 0.0,
            surface_speed: 0.0,
        }
    }
}

impl Material {
    /// Friction between this material and another, the geometric mean of
    /// the two coefficients.
    #[inline]
    pub fn friction_with(&self, other: &Material) -> f64 {
        (self.friction * other.friction).sqrt()
    }

    /// Restitution between this material and another; the bouncier surface
    /// wins.
    #[inline]
    pub fn restitution_with(&self, other: &Material) -> f64 {
        self.restitution.max(other.restitution)
    }
}

/// Category/mask collision filtering with group overrides.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub struct Filter {
    pub category: u32,
    pub mask: u32,
    /// Colliders sharing the same non-zero group always collide when it is
    /// positive and never when it is negative, overriding category bits.
    pub group: i32,
}

impl Default for Filter {
    fn default() -> Self {
        Filter {
            category: 0x0001,
            mask: u32::MAX,
            group: 0,
        }
    }
}

impl Filter {
    pub fn should_collide(&self, other: &Filter) -> bool {
        if self.group == other.group && self.group != 0 {
            return self.group > 0;
        }
        (self.category & other.mask) != 0 && (other.category & self.mask) != 0
    }
}

/// A rigid body: pose, mass data, velocity and force state, plus links to
/// the colliders, contacts and joints attached to it.
#[derive(Debug)]
pub struct RigidBody {
    pub(crate) body_type: BodyType,

    pub(crate) position: Vec2,
    pub(crate) angle: f64,
    pub(crate) rotation: Rotor2,
    /// Center of mass in body-local coordinates.
    pub(crate) local_center: Vec2,

    pub velocity: Velocity,
    pub(crate) force: Vec2,
    pub(crate) torque: f64,

    pub(crate) mass: Mass,
    pub(crate) inertia: Mass,
    pub linear_damping: f64,
    pub angular_damping: f64,

    pub(crate) awake: bool,
    /// Seconds this body has been below the sleep velocity tolerances.
    pub(crate) resting: f64,
    pub(crate) island: bool,
    /// Island-local index while the solver runs.
    pub(crate) solver_index: usize,
    pub(crate) fixed_rotation: bool,

    pub(crate) colliders: Vec<ColliderKey>,
    pub(crate) contacts: Vec<ContactKey>,
    pub(crate) joints: Vec<JointKey>,

    pub(crate) id: u64,
    /// Free-form user tag; the engine never touches it.
    pub user_data: u64,
}

impl RigidBody {
    pub(crate) fn new(body_type: BodyType, pose: Pose, id: u64) -> Self {
        RigidBody {
            body_type,
            position: pose.translation,
            angle: 0.0,
            rotation: pose.rotation,
            local_center: Vec2::zero(),
            velocity: Velocity::default(),
            force: Vec2::zero(),
            torque: 0.0,
            mass: Mass::Infinite,
            inertia: Mass::Infinite,
            linear_damping: 0.0,
            angular_damping: 0.0,
            awake: body_type != BodyType::Static,
            resting: 0.0,
            island: false,
            solver_index: 0,
            fixed_rotation: false,
            colliders: Vec::new(),
            contacts: Vec::new(),
            joints: Vec::new(),
            id,
            user_data: 0,
        }
    }

    #[inline]
    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.body_type == BodyType::Static
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn position(&self) -> Vec2 {
        self.position
    }

    #[inline]
    pub fn angle(&self) -> f64 {
        self.angle
    }

    #[inline]
    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.rotation)
    }

    /// World-space center of mass.
    #[inline]
    pub fn world_center(&self) -> Vec2 {
        self.position + self.rotation * self.local_center
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
        self.wake();
    }

    pub fn set_angle(&mut self, angle: f64) {
        self.angle = angle;
        self.rotation = Rotor2::from_angle(angle);
        self.wake();
    }

    /// Update the origin position from a known world center of mass, used
    /// after the solver integrates about the center.
    pub(crate) fn set_center_and_angle(&mut self, center: Vec2, angle: f64) {
        self.angle = angle;
        self.rotation = Rotor2::from_angle(angle);
        self.position = center - self.rotation * self.local_center;
    }

    #[inline]
    pub fn mass(&self) -> Option<f64> {
        self.mass.value()
    }

    #[inline]
    pub fn inv_mass(&self) -> f64 {
        self.mass.inv()
    }

    #[inline]
    pub fn inertia(&self) -> Option<f64> {
        self.inertia.value()
    }

    #[inline]
    pub fn inv_inertia(&self) -> f64 {
        if self.fixed_rotation {
            0.0
        } else {
            self.inertia.inv()
        }
    }

    /// Lock the body's rotation, giving it infinite effective inertia.
    pub fn set_fixed_rotation(&mut self, fixed: bool) {
        self.fixed_rotation = fixed;
        self.velocity.angular = 0.0;
        self.wake();
    }

    #[inline]
    pub fn is_awake(&self) -> bool {
        self.awake
    }

    pub fn wake(&mut self) {
        if self.body_type != BodyType::Static {
            self.awake = true;
        }
        self.resting = 0.0;
    }

    pub(crate) fn sleep(&mut self) {
        self.awake = false;
        self.velocity = Velocity::default();
        self.force = Vec2::zero();
        self.torque = 0.0;
    }

    /// Accumulate a force at the center of mass for the next step.
    pub fn apply_force(&mut self, force: Vec2) {
        if self.is_dynamic() {
            self.force += force;
            self.wake();
        }
    }

    pub fn apply_torque(&mut self, torque: f64) {
        if self.is_dynamic() {
            self.torque += torque;
            self.wake();
        }
    }

    /// Apply an impulse at a world point, changing velocity immediately.
    pub fn apply_impulse(&mut self, impulse: Vec2, point: Vec2) {
        if self.is_dynamic() {
            self.velocity.linear += impulse * self.mass.inv();
            self.velocity.angular +=
                self.inv_inertia() * crate::math::cross(point - self.world_center(), impulse);
            self.wake();
        }
    }

    pub fn set_velocity(&mut self, velocity: Velocity) {
        if self.body_type != BodyType::Static {
            self.velocity = velocity;
            self.wake();
        }
    }

    #[inline]
    pub fn colliders(&self) -> &[ColliderKey] {
        &self.colliders
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_category_and_group() {
        let a = Filter {
            category: 0b01,
            mask: 0b10,
            group: 0,
        };
        let b = Filter {
            category: 0b10,
            mask: 0b01,
            group: 0,
        };
        assert!(a.should_collide(&b));

        let c = Filter {
            category: 0b100,
            mask: 0b100,
            group: 0,
        };
        assert!(!a.should_collide(&c));

        // negative group forbids collision even with matching masks
        let d = Filter {
            group: -3,
            ..Filter::default()
        };
        let e = Filter {
            group: -3,
            ..Filter::default()
        };
        assert!(!d.should_collide(&e));

        // positive group forces it even with disjoint masks
        let f = Filter {
            category: 0b01,
            mask: 0,
            group: 2,
        };
        let g = Filter {
            category: 0b10,
            mask: 0,
            group: 2,
        };
        assert!(f.should_collide(&g));
    }

    #[test]
    fn material_mixing() {
        let ice = Material {
            friction: 0.1,
            restitution: 0.0,
            surface_speed: 0.0,
        };
        let rubber = Material {
            friction: 0.9,
            restitution: 0.8,
            surface_speed: 0.0,
        };
        assert!((ice.friction_with(&rubber) - (0.09f64).sqrt()).abs() < 1e-12);
        assert_eq!(ice.restitution_with(&rubber), 0.8);
    }

    #[test]
    fn impulse_changes_velocity_about_center() {
        let mut body = RigidBody::new(BodyType::Dynamic, Pose::identity(), 0);
        body.mass = Mass::from(2.0);
        body.inertia = Mass::from(1.0);
        body.apply_impulse(Vec2::new(0.0, 2.0), Vec2::new(1.0, 0.0));
        assert!((body.velocity.linear.y - 1.0).abs() < 1e-12);
        assert!((body.velocity.angular - 2.0).abs() < 1e-12);
    }
}
