//! The world: owner of all bodies, colliders, joints and contacts, and the
//! fixed-timestep simulation driver.
//!
//! Entities live in slotmap arenas and refer to each other by generational
//! keys, so stale handles are detectable and there are no ownership cycles.

use std::f64::consts::PI;

use rand::Rng;
use slotmap::{new_key_type, SecondaryMap, SlotMap};

use crate::body::{BodyType, Filter, Mass, Material, RigidBody};
use crate::collision::narrowphase::ContactManifold;
use crate::collision::shape::{Capsule, Circle, Polygon, Shape};
use crate::collision::{Aabb, BroadPhase, Collider, AabbTree};
use crate::contact::{Contact, ContactListener, Transition};
use crate::island::WorkingBuffers;
use crate::joint::{
    AngleJoint, DistanceJoint, GrabJoint, Joint, JointKind, MotorJoint, PrismaticJoint,
    PulleyJoint, RevoluteJoint, WeldJoint,
};
use crate::math::{Pose, Vec2};
use crate::settings::{TimeStep, WorldSettings};

new_key_type! {
    pub struct BodyKey;
    pub struct ColliderKey;
    pub struct JointKey;
    pub struct ContactKey;
}

/// Invoked when a joint is destroyed, whether explicitly or because one of
/// its bodies was destroyed.
pub type JointDestroyCallback = Box<dyn FnMut(JointKey)>;

/// Result of [`World::ray_cast_closest`].
#[derive(Clone, Copy, Debug)]
pub struct RayHit {
    pub collider: ColliderKey,
    pub point: Vec2,
    pub normal: Vec2,
    pub fraction: f64,
}

enum ContactEvent {
    Begin(ColliderKey, ColliderKey, ContactManifold),
    Touching(ColliderKey, ColliderKey, ContactManifold),
    End(ColliderKey, ColliderKey),
}

/// A 2D physics world.
pub struct World {
    pub settings: WorldSettings,

    pub(crate) bodies: SlotMap<BodyKey, RigidBody>,
    pub(crate) colliders: SlotMap<ColliderKey, Collider>,
    pub(crate) joints: SlotMap<JointKey, Joint>,
    pub(crate) contacts: SlotMap<ContactKey, Contact>,
    pub(crate) broad_phase: BroadPhase,

    listeners: SecondaryMap<ColliderKey, Box<dyn ContactListener>>,
    joint_callbacks: SecondaryMap<JointKey, JointDestroyCallback>,
    pending_events: Vec<ContactEvent>,

    pub(crate) bufs: WorkingBuffers,
    pub(crate) island_count: usize,
    next_body_id: u64,
}

impl World {
    pub fn new(settings: WorldSettings) -> Self {
        World {
            settings,
            bodies: SlotMap::with_key(),
            colliders: SlotMap::with_key(),
            joints: SlotMap::with_key(),
            contacts: SlotMap::with_key(),
            broad_phase: BroadPhase::new(),
            listeners: SecondaryMap::new(),
            joint_callbacks: SecondaryMap::new(),
            pending_events: Vec::new(),
            bufs: WorkingBuffers::default(),
            island_count: 0,
            next_body_id: 0,
        }
    }

    /// Advance the simulation by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        let _span = tracy_span!("world step", "step");
        let step = TimeStep::new(dt, &self.settings);

        self.update_broad_phase(dt);
        self.find_new_contacts();
        self.update_contacts();
        self.destroy_escaped_bodies();
        self.solve_islands(&step);
        self.clear_moved_flags();
    }

    /// Destroy every body, collider, joint and contact.
    pub fn reset(&mut self) {
        self.bodies.clear();
        self.colliders.clear();
        self.joints.clear();
        self.contacts.clear();
        self.broad_phase.reset();
        self.listeners.clear();
        self.joint_callbacks.clear();
        self.pending_events.clear();
        self.island_count = 0;
    }

    //
    // step phases
    //

    fn update_broad_phase(&mut self, dt: f64) {
        let _span = tracy_span!("broad phase", "update_broad_phase");
        let keys: Vec<ColliderKey> = self.colliders.keys().collect();
        for key in keys {
            let collider = &self.colliders[key];
            let body = &self.bodies[collider.body];
            let aabb = collider.shape.compute_aabb(&body.pose());
            let displacement = body.velocity.linear * dt;
            let proxy = collider.proxy;
            self.broad_phase.update(proxy, aabb, displacement);
        }
    }

    /// Query every collider's fat box against the tree and create contacts
    /// for fresh candidate pairs.
    fn find_new_contacts(&mut self) {
        let _span = tracy_span!("find pairs", "find_new_contacts");
        let keys: Vec<ColliderKey> = self.colliders.keys().collect();
        let mut new_pairs: Vec<(ColliderKey, ColliderKey)> = Vec::new();

        for key in keys {
            let proxy = self.colliders[key].proxy;
            let fat = *self.broad_phase.tree.fat_aabb(proxy);

            let colliders = &self.colliders;
            let bodies = &self.bodies;
            let contacts = &self.contacts;
            self.broad_phase.tree.query(&fat, |_, other| {
                if other == key {
                    return true;
                }
                let ca = &colliders[key];
                let cb = &colliders[other];
                if ca.body == cb.body {
                    return true;
                }
                // visit each unordered pair once, with the greater shape
                // kind as collider A
                let kind_a = ca.shape.kind();
                let kind_b = cb.shape.kind();
                if kind_a < kind_b || (kind_a == kind_b && key > other) {
                    return true;
                }

                let body_a = &bodies[ca.body];
                let body_b = &bodies[cb.body];
                if !body_a.is_dynamic() && !body_b.is_dynamic() {
                    return true;
                }
                if !ca.filter.should_collide(&cb.filter) {
                    return true;
                }

                // at most one contact per pair
                let exists = body_a.contacts.iter().any(|&ck| {
                    let c = &contacts[ck];
                    (c.collider_a == key && c.collider_b == other)
                        || (c.collider_a == other && c.collider_b == key)
                });
                if !exists {
                    new_pairs.push((key, other));
                }
                true
            });
        }

        for (a, b) in new_pairs {
            let (body_a, body_b) = (self.colliders[a].body, self.colliders[b].body);
            let contact = Contact::new(
                a,
                b,
                body_a,
                body_b,
                &self.colliders[a].material,
                &self.colliders[b].material,
            );
            let ck = self.contacts.insert(contact);
            self.bodies[body_a].contacts.push(ck);
            self.bodies[body_b].contacts.push(ck);
        }
    }

    /// Destroy contacts whose proxies separated, then re-run narrow phase
    /// detection on the survivors and fire listener callbacks.
    fn update_contacts(&mut self) {
        let _span = tracy_span!("narrow phase", "update_contacts");
        let keys: Vec<ContactKey> = self.contacts.keys().collect();

        for ck in keys {
            let (collider_a, collider_b, body_a, body_b) = {
                let c = &self.contacts[ck];
                (c.collider_a, c.collider_b, c.body_a, c.body_b)
            };

            let proxy_a = self.colliders[collider_a].proxy;
            let proxy_b = self.colliders[collider_b].proxy;
            if !self.broad_phase.test_overlap(proxy_a, proxy_b) {
                self.destroy_contact(ck, true);
                continue;
            }

            // a fully sleeping pair keeps last frame's manifold
            if !self.bodies[body_a].awake && !self.bodies[body_b].awake {
                continue;
            }

            let transition = {
                let colliders = &self.colliders;
                let bodies = &self.bodies;
                let contact = &mut self.contacts[ck];
                let tf_a = bodies[body_a].pose();
                let tf_b = bodies[body_b].pose();
                contact.update(
                    &colliders[collider_a].shape,
                    &tf_a,
                    &colliders[collider_b].shape,
                    &tf_b,
                    self.settings.warm_starting,
                )
            };

            let manifold = self.contacts[ck].manifold;
            match transition {
                Transition::Begin => {
                    self.bodies[body_a].wake();
                    self.bodies[body_b].wake();
                    self.pending_events
                        .push(ContactEvent::Begin(collider_a, collider_b, manifold));
                }
                Transition::Touching => {
                    self.pending_events
                        .push(ContactEvent::Touching(collider_a, collider_b, manifold));
                }
                Transition::End => {
                    self.pending_events
                        .push(ContactEvent::End(collider_a, collider_b));
                }
                Transition::None => {}
            }
        }

        self.dispatch_events();
    }

    fn destroy_escaped_bodies(&mut self) {
        let region = self.settings.valid_region;
        let escaped: Vec<BodyKey> = self
            .bodies
            .iter()
            .filter(|(_, body)| !region.contains_point(body.position))
            .map(|(key, _)| key)
            .collect();
        for key in escaped {
            self.destroy_body(key);
        }
    }

    fn clear_moved_flags(&mut self) {
        for (_, collider) in self.colliders.iter() {
            self.broad_phase.tree.clear_moved(collider.proxy);
        }
    }

    fn dispatch_events(&mut self) {
        if self.pending_events.is_empty() {
            return;
        }
        let events = std::mem::take(&mut self.pending_events);
        // moving the registry out lets callbacks read the world while
        // making structural mutation unrepresentable
        let mut listeners = std::mem::take(&mut self.listeners);
        for event in events {
            match event {
                ContactEvent::Begin(a, b, manifold) => {
                    if let Some(l) = listeners.get_mut(a) {
                        l.on_contact_begin(self, a, b, &manifold);
                    }
                    if let Some(l) = listeners.get_mut(b) {
                        l.on_contact_begin(self, b, a, &manifold);
                    }
                }
                ContactEvent::Touching(a, b, manifold) => {
                    if let Some(l) = listeners.get_mut(a) {
                        l.on_contact_touching(self, a, b, &manifold);
                    }
                    if let Some(l) = listeners.get_mut(b) {
                        l.on_contact_touching(self, b, a, &manifold);
                    }
                }
                ContactEvent::End(a, b) => {
                    if let Some(l) = listeners.get_mut(a) {
                        l.on_contact_end(self, a, b);
                    }
                    if let Some(l) = listeners.get_mut(b) {
                        l.on_contact_end(self, b, a);
                    }
                }
            }
        }
        self.listeners = listeners;
    }

    //
    // body and collider management
    //

    /// Create a body with a single collider of the given shape.
    pub fn create_body(
        &mut self,
        shape: Shape,
        pose: Pose,
        body_type: BodyType,
        density: f64,
    ) -> BodyKey {
        let id = self.next_body_id;
        self.next_body_id += 1;
        let key = self.bodies.insert(RigidBody::new(body_type, pose, id));
        self.add_collider(key, shape, density);
        key
    }

    /// Attach an extra collider to an existing body, recomputing its mass.
    pub fn add_collider(&mut self, body: BodyKey, shape: Shape, density: f64) -> ColliderKey {
        let aabb = shape.compute_aabb(&self.bodies[body].pose());
        let collider = Collider::new(shape, body, density);
        let key = self.colliders.insert(collider);
        let proxy = self.broad_phase.add(aabb, key);
        self.colliders[key].proxy = proxy;
        self.bodies[body].colliders.push(key);
        self.reset_mass_data(body);
        key
    }

    pub fn create_circle(&mut self, radius: f64, body_type: BodyType, density: f64) -> BodyKey {
        self.create_body(
            Shape::Circle(Circle { radius }),
            Pose::identity(),
            body_type,
            density,
        )
    }

    pub fn create_box(
        &mut self,
        width: f64,
        height: f64,
        body_type: BodyType,
        density: f64,
    ) -> BodyKey {
        self.create_body(
            Shape::Polygon(Polygon::rect(width, height)),
            Pose::identity(),
            body_type,
            density,
        )
    }

    /// A horizontal capsule: a segment of the given length swept by a
    /// circle.
    pub fn create_capsule(
        &mut self,
        length: f64,
        radius: f64,
        body_type: BodyType,
        density: f64,
    ) -> BodyKey {
        self.create_body(
            Shape::Capsule(Capsule {
                a: Vec2::new(-length * 0.5, 0.0),
                b: Vec2::new(length * 0.5, 0.0),
                radius,
            }),
            Pose::identity(),
            body_type,
            density,
        )
    }

    /// The convex hull of the given points.
    pub fn create_polygon(
        &mut self,
        points: &[Vec2],
        body_type: BodyType,
        density: f64,
    ) -> BodyKey {
        self.create_body(
            Shape::Polygon(Polygon::new(points)),
            Pose::identity(),
            body_type,
            density,
        )
    }

    pub fn create_regular_polygon(
        &mut self,
        radius: f64,
        vertex_count: usize,
        initial_angle: f64,
        body_type: BodyType,
        density: f64,
    ) -> BodyKey {
        self.create_body(
            Shape::Polygon(Polygon::regular(radius, vertex_count, initial_angle)),
            Pose::identity(),
            body_type,
            density,
        )
    }

    /// A random convex polygon inscribed in a circle. A zero vertex count
    /// picks one between 3 and 8.
    pub fn create_random_convex_polygon(
        &mut self,
        radius: f64,
        vertex_count: usize,
        body_type: BodyType,
        density: f64,
    ) -> BodyKey {
        let mut rng = rand::thread_rng();
        let count = if vertex_count == 0 {
            rng.gen_range(3..=8)
        } else {
            vertex_count
        };
        let mut angles: Vec<f64> = (0..count).map(|_| rng.gen_range(0.0..2.0 * PI)).collect();
        angles.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let points: Vec<Vec2> = angles
            .iter()
            .map(|a| Vec2::new(a.cos(), a.sin()) * radius)
            .collect();
        self.create_polygon(&points, body_type, density)
    }

    /// Destroy a body along with its colliders, contacts and joints. Joint
    /// destroy callbacks and contact end callbacks fire.
    pub fn destroy_body(&mut self, key: BodyKey) {
        let Some(body) = self.bodies.get(key) else {
            return;
        };

        let joints = body.joints.clone();
        for jk in joints {
            self.destroy_joint(jk);
        }

        let colliders = self.bodies[key].colliders.clone();
        for ck in colliders {
            self.remove_collider(ck);
        }

        self.bodies.remove(key);
        self.dispatch_events();
    }

    /// Detach and destroy a single collider, with its contacts.
    pub fn remove_collider(&mut self, key: ColliderKey) {
        let Some(collider) = self.colliders.get(key) else {
            return;
        };
        let body = collider.body;

        let affected: Vec<ContactKey> = self.bodies[body]
            .contacts
            .iter()
            .copied()
            .filter(|&ck| {
                let c = &self.contacts[ck];
                c.collider_a == key || c.collider_b == key
            })
            .collect();
        for ck in affected {
            self.destroy_contact(ck, true);
        }

        let proxy = self.colliders[key].proxy;
        self.broad_phase.remove(proxy);
        self.listeners.remove(key);
        self.colliders.remove(key);

        if let Some(body) = self.bodies.get_mut(body) {
            body.colliders.retain(|&c| c != key);
        }
        self.reset_mass_data(body);
    }

    fn destroy_contact(&mut self, key: ContactKey, wake: bool) {
        let Some(contact) = self.contacts.remove(key) else {
            return;
        };
        for bk in [contact.body_a, contact.body_b] {
            if let Some(body) = self.bodies.get_mut(bk) {
                body.contacts.retain(|&c| c != key);
                if wake {
                    body.wake();
                }
            }
        }
        if contact.touching {
            self.pending_events
                .push(ContactEvent::End(contact.collider_a, contact.collider_b));
        }
    }

    /// Recompute mass, center of mass and inertia from the attached
    /// colliders. Static and kinematic bodies keep infinite mass.
    fn reset_mass_data(&mut self, key: BodyKey) {
        let Some(body) = self.bodies.get(key) else {
            return;
        };
        if !body.is_dynamic() {
            let body = self.bodies.get_mut(key).unwrap();
            body.mass = Mass::Infinite;
            body.inertia = Mass::Infinite;
            body.local_center = Vec2::zero();
            return;
        }

        let mut mass = 0.0;
        let mut center = Vec2::zero();
        let mut inertia = 0.0;
        for &ck in &body.colliders {
            let md = self.colliders[ck]
                .shape
                .compute_mass(self.colliders[ck].density);
            mass += md.mass;
            center += md.center * md.mass;
            inertia += md.inertia + md.mass * md.center.mag_sq();
        }

        let body = self.bodies.get_mut(key).unwrap();
        if mass > 0.0 {
            center /= mass;
            // shift inertia to the combined center of mass
            inertia -= mass * center.mag_sq();
            body.mass = Mass::from(mass);
            body.inertia = Mass::from(inertia);
            body.local_center = center;
        } else {
            // dynamic bodies need some mass to respond to anything
            body.mass = Mass::from(1.0);
            body.inertia = Mass::Infinite;
            body.local_center = Vec2::zero();
        }
    }

    //
    // joints
    //

    fn insert_joint(&mut self, joint: Joint) -> JointKey {
        let body_a = joint.body_a;
        let body_b = joint.body_b;
        let key = self.joints.insert(joint);
        self.bodies[body_a].joints.push(key);
        self.bodies[body_a].wake();
        if let Some(b) = body_b {
            self.bodies[b].joints.push(key);
            self.bodies[b].wake();
        }
        key
    }

    /// Soft mouse-drag constraint holding a body anchor to a world target.
    pub fn create_grab_joint(
        &mut self,
        body: BodyKey,
        anchor: Vec2,
        target: Vec2,
        frequency: f64,
        damping_ratio: f64,
        joint_mass: f64,
    ) -> JointKey {
        let local_anchor = self.bodies[body].pose().inversed() * anchor;
        self.insert_joint(Joint::new(
            body,
            None,
            JointKind::Grab(GrabJoint::new(
                local_anchor,
                target,
                frequency,
                damping_ratio,
                joint_mass,
            )),
        ))
    }

    pub fn create_revolute_joint(
        &mut self,
        body_a: BodyKey,
        body_b: BodyKey,
        anchor: Vec2,
        frequency: f64,
        damping_ratio: f64,
        joint_mass: f64,
    ) -> JointKey {
        let local_a = self.bodies[body_a].pose().inversed() * anchor;
        let local_b = self.bodies[body_b].pose().inversed() * anchor;
        self.insert_joint(Joint::new(
            body_a,
            Some(body_b),
            JointKind::Revolute(RevoluteJoint::new(
                local_a,
                local_b,
                frequency,
                damping_ratio,
                joint_mass,
            )),
        ))
    }

    /// Hold two anchors a fixed distance apart. A negative length locks in
    /// the current anchor distance.
    pub fn create_distance_joint(
        &mut self,
        body_a: BodyKey,
        body_b: BodyKey,
        anchor_a: Vec2,
        anchor_b: Vec2,
        length: f64,
        frequency: f64,
        damping_ratio: f64,
        joint_mass: f64,
    ) -> JointKey {
        let local_a = self.bodies[body_a].pose().inversed() * anchor_a;
        let local_b = self.bodies[body_b].pose().inversed() * anchor_b;
        let length = if length < 0.0 {
            (anchor_b - anchor_a).mag()
        } else {
            length
        };
        self.insert_joint(Joint::new(
            body_a,
            Some(body_b),
            JointKind::Distance(DistanceJoint::new(
                local_a,
                local_b,
                length,
                frequency,
                damping_ratio,
                joint_mass,
            )),
        ))
    }

    pub fn create_prismatic_joint(
        &mut self,
        body_a: BodyKey,
        body_b: BodyKey,
        anchor: Vec2,
        axis: Vec2,
        frequency: f64,
        damping_ratio: f64,
        joint_mass: f64,
    ) -> JointKey {
        let pose_a = self.bodies[body_a].pose();
        let local_a = pose_a.inversed() * anchor;
        let local_b = self.bodies[body_b].pose().inversed() * anchor;
        let local_axis = pose_a.rotation.reversed() * axis.normalized();
        let reference_angle = self.bodies[body_b].angle - self.bodies[body_a].angle;
        self.insert_joint(Joint::new(
            body_a,
            Some(body_b),
            JointKind::Prismatic(PrismaticJoint::new(
                local_a,
                local_b,
                local_axis,
                reference_angle,
                frequency,
                damping_ratio,
                joint_mass,
            )),
        ))
    }

    pub fn create_weld_joint(
        &mut self,
        body_a: BodyKey,
        body_b: BodyKey,
        anchor: Vec2,
        frequency: f64,
        damping_ratio: f64,
        joint_mass: f64,
    ) -> JointKey {
        let local_a = self.bodies[body_a].pose().inversed() * anchor;
        let local_b = self.bodies[body_b].pose().inversed() * anchor;
        let reference_angle = self.bodies[body_b].angle - self.bodies[body_a].angle;
        self.insert_joint(Joint::new(
            body_a,
            Some(body_b),
            JointKind::Weld(WeldJoint::new(
                local_a,
                local_b,
                reference_angle,
                frequency,
                damping_ratio,
                joint_mass,
            )),
        ))
    }

    pub fn create_angle_joint(
        &mut self,
        body_a: BodyKey,
        body_b: BodyKey,
        frequency: f64,
        damping_ratio: f64,
        joint_mass: f64,
    ) -> JointKey {
        let reference_angle = self.bodies[body_b].angle - self.bodies[body_a].angle;
        self.insert_joint(Joint::new(
            body_a,
            Some(body_b),
            JointKind::Angle(AngleJoint::new(
                reference_angle,
                frequency,
                damping_ratio,
                joint_mass,
            )),
        ))
    }

    /// Drive body B toward an offset from body A with force and torque
    /// budgets. Negative maxima mean unlimited.
    #[allow(clippy::too_many_arguments)]
    pub fn create_motor_joint(
        &mut self,
        body_a: BodyKey,
        body_b: BodyKey,
        anchor: Vec2,
        max_force: f64,
        max_torque: f64,
        frequency: f64,
        damping_ratio: f64,
        joint_mass: f64,
    ) -> JointKey {
        let local_a = self.bodies[body_a].pose().inversed() * anchor;
        let local_b = self.bodies[body_b].pose().inversed() * anchor;
        let angle_offset = self.bodies[body_b].angle - self.bodies[body_a].angle;
        self.insert_joint(Joint::new(
            body_a,
            Some(body_b),
            JointKind::Motor(MotorJoint::new(
                local_a,
                local_b,
                angle_offset,
                max_force,
                max_torque,
                frequency,
                damping_ratio,
                joint_mass,
            )),
        ))
    }

    /// Rope over two ground anchors: `len_a + ratio * len_b` is conserved
    /// at its creation-time value.
    #[allow(clippy::too_many_arguments)]
    pub fn create_pulley_joint(
        &mut self,
        body_a: BodyKey,
        body_b: BodyKey,
        ground_a: Vec2,
        ground_b: Vec2,
        anchor_a: Vec2,
        anchor_b: Vec2,
        ratio: f64,
        frequency: f64,
        damping_ratio: f64,
        joint_mass: f64,
    ) -> JointKey {
        let local_a = self.bodies[body_a].pose().inversed() * anchor_a;
        let local_b = self.bodies[body_b].pose().inversed() * anchor_b;
        let total_length = (anchor_a - ground_a).mag() + ratio * (anchor_b - ground_b).mag();
        self.insert_joint(Joint::new(
            body_a,
            Some(body_b),
            JointKind::Pulley(PulleyJoint::new(
                ground_a,
                ground_b,
                local_a,
                local_b,
                total_length,
                ratio,
                frequency,
                damping_ratio,
                joint_mass,
            )),
        ))
    }

    /// Destroy a joint, waking its bodies and firing its destroy callback.
    pub fn destroy_joint(&mut self, key: JointKey) {
        let Some(joint) = self.joints.remove(key) else {
            return;
        };
        for bk in joint.body_b.into_iter().chain([joint.body_a]) {
            if let Some(body) = self.bodies.get_mut(bk) {
                body.joints.retain(|&j| j != key);
                body.wake();
            }
        }
        if let Some(mut callback) = self.joint_callbacks.remove(key) {
            callback(key);
        }
    }

    //
    // queries
    //

    /// Colliders whose shape contains the point.
    pub fn query_point(&self, point: Vec2) -> Vec<ColliderKey> {
        let mut found = Vec::new();
        self.broad_phase.tree.query_point(point, |_, key| {
            let collider = &self.colliders[key];
            let pose = self.bodies[collider.body].pose();
            if collider.shape.test_point(&pose, point) {
                found.push(key);
            }
            true
        });
        found
    }

    /// Colliders whose fat AABB overlaps the region.
    pub fn query_aabb(&self, region: &Aabb) -> Vec<ColliderKey> {
        let mut found = Vec::new();
        self.broad_phase.tree.query(region, |_, key| {
            found.push(key);
            true
        });
        found
    }

    /// Cast a ray against all colliders. The callback receives the hit
    /// collider, point, normal and fraction, and returns a new maximum
    /// fraction: 0 terminates, a positive value narrows the search, a
    /// negative one leaves it unchanged.
    pub fn ray_cast(
        &self,
        from: Vec2,
        to: Vec2,
        max_fraction: f64,
        mut callback: impl FnMut(ColliderKey, Vec2, Vec2, f64) -> f64,
    ) {
        self.broad_phase
            .tree
            .ray_cast(from, to, max_fraction, 0.0, |input, key| {
                let collider = &self.colliders[key];
                let pose = self.bodies[collider.body].pose();
                match collider.shape.ray_cast(&pose, input) {
                    Some(hit) => {
                        let point = from + (to - from) * hit.fraction;
                        callback(key, point, hit.normal, hit.fraction)
                    }
                    None => -1.0,
                }
            });
    }

    /// The nearest ray hit, if any.
    pub fn ray_cast_closest(&self, from: Vec2, to: Vec2) -> Option<RayHit> {
        let mut closest: Option<RayHit> = None;
        self.ray_cast(from, to, 1.0, |collider, point, normal, fraction| {
            closest = Some(RayHit {
                collider,
                point,
                normal,
                fraction,
            });
            // clip the remaining search to the hit just found
            fraction
        });
        closest
    }

    //
    // accessors
    //

    #[inline]
    pub fn body(&self, key: BodyKey) -> &RigidBody {
        &self.bodies[key]
    }

    #[inline]
    pub fn body_mut(&mut self, key: BodyKey) -> &mut RigidBody {
        &mut self.bodies[key]
    }

    #[inline]
    pub fn try_body(&self, key: BodyKey) -> Option<&RigidBody> {
        self.bodies.get(key)
    }

    #[inline]
    pub fn collider(&self, key: ColliderKey) -> &Collider {
        &self.colliders[key]
    }

    #[inline]
    pub fn joint(&self, key: JointKey) -> &Joint {
        &self.joints[key]
    }

    #[inline]
    pub fn joint_mut(&mut self, key: JointKey) -> &mut Joint {
        &mut self.joints[key]
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyKey, &RigidBody)> {
        self.bodies.iter()
    }

    pub fn contacts(&self) -> impl Iterator<Item = (ContactKey, &Contact)> {
        self.contacts.iter()
    }

    /// Contacts attached to a body.
    pub fn body_contacts(&self, key: BodyKey) -> &[ContactKey] {
        &self.bodies[key].contacts
    }

    #[inline]
    pub fn contact(&self, key: ContactKey) -> &Contact {
        &self.contacts[key]
    }

    #[inline]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    #[inline]
    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    #[inline]
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Number of islands solved in the last step.
    #[inline]
    pub fn island_count(&self) -> usize {
        self.island_count
    }

    pub fn sleeping_body_count(&self) -> usize {
        self.bodies
            .values()
            .filter(|b| b.is_dynamic() && !b.awake)
            .count()
    }

    /// Read-only access to the broad phase tree.
    #[inline]
    pub fn tree(&self) -> &AabbTree {
        &self.broad_phase.tree
    }

    pub fn wake_all(&mut self) {
        for (_, body) in self.bodies.iter_mut() {
            body.wake();
        }
    }

    //
    // collider configuration
    //

    /// Replace a collider's filter. Existing contacts of the pair are
    /// dropped so they re-form under the new rules.
    pub fn set_filter(&mut self, key: ColliderKey, filter: Filter) {
        self.colliders[key].filter = filter;
        self.drop_contacts_of(key);
    }

    /// Replace a collider's material. Existing contacts are dropped so
    /// their mixed properties are recomputed.
    pub fn set_material(&mut self, key: ColliderKey, material: Material) {
        self.colliders[key].material = material;
        self.drop_contacts_of(key);
    }

    fn drop_contacts_of(&mut self, key: ColliderKey) {
        let body = self.colliders[key].body;
        let affected: Vec<ContactKey> = self.bodies[body]
            .contacts
            .iter()
            .copied()
            .filter(|&ck| {
                let c = &self.contacts[ck];
                c.collider_a == key || c.collider_b == key
            })
            .collect();
        for ck in affected {
            self.destroy_contact(ck, true);
        }
        self.dispatch_events();
    }

    //
    // callbacks
    //

    pub fn set_contact_listener(&mut self, key: ColliderKey, listener: Box<dyn ContactListener>) {
        self.listeners.insert(key, listener);
    }

    pub fn clear_contact_listener(&mut self, key: ColliderKey) {
        self.listeners.remove(key);
    }

    pub fn set_joint_destroy_callback(&mut self, key: JointKey, callback: JointDestroyCallback) {
        self.joint_callbacks.insert(key, callback);
    }
}
