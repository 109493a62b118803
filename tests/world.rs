//! Integration tests exercising the full simulation pipeline through the
//! public API only.

use std::cell::Cell;
use std::f64::consts::PI;
use std::rc::Rc;

use tumble::math::Vec2;
use tumble::{
    compute_distance, shape_cast, BodyKey, BodyType, Circle, ColliderKey, ContactListener,
    ContactManifold, JointKind, Polygon, Shape, Velocity, World, WorldSettings,
};

const DT: f64 = 1.0 / 60.0;

fn run(world: &mut World, steps: usize) {
    for _ in 0..steps {
        world.step(DT);
    }
}

/// A static 20 x 1 box whose top face is the line y = 0.
fn create_ground(world: &mut World) -> BodyKey {
    let ground = world.create_box(20.0, 1.0, BodyType::Static, 1.0);
    world.body_mut(ground).set_position(Vec2::new(0.0, -0.5));
    ground
}

//
// scenario tests
//

#[test]
fn circle_settles_on_ground() {
    let mut world = World::new(WorldSettings::default());
    create_ground(&mut world);

    // unit circle: radius 0.5, mass 1
    let density = 1.0 / (PI * 0.25);
    let ball = world.create_circle(0.5, BodyType::Dynamic, density);
    world.body_mut(ball).set_position(Vec2::new(0.0, 2.0));
    assert!((world.body(ball).mass().unwrap() - 1.0).abs() < 1e-9);

    run(&mut world, 120);

    let body = world.body(ball);
    assert!(
        body.position().y > 0.49 && body.position().y < 0.51,
        "circle should rest on the surface, got y = {}",
        body.position().y
    );
    assert!(body.velocity.linear.y.abs() < 0.01);
}

#[test]
fn distance_joint_holds_length_under_gravity() {
    let mut world = World::new(WorldSettings::default());
    let a = world.create_box(1.0, 1.0, BodyType::Dynamic, 1.0);
    world.body_mut(a).set_position(Vec2::new(-1.0, 5.0));
    let b = world.create_box(1.0, 1.0, BodyType::Dynamic, 1.0);
    world.body_mut(b).set_position(Vec2::new(1.0, 5.0));

    world.create_distance_joint(
        a,
        b,
        Vec2::new(-1.0, 5.0),
        Vec2::new(1.0, 5.0),
        2.0,
        5.0,
        1.0,
        1.0,
    );

    // 5 simulated seconds
    for _ in 0..300 {
        world.step(DT);
        let d = (world.body(a).position() - world.body(b).position()).mag();
        assert!(
            d > 1.9 && d < 2.1,
            "distance joint drifted to {d} while falling"
        );
    }
}

#[test]
fn warm_started_impulse_is_stable_on_resting_contact() {
    // without gravity the contact carries no load, so the stored impulse
    // must stay exactly where it started
    let mut settings = WorldSettings::default();
    settings.apply_gravity = false;
    let mut world = World::new(settings);
    create_ground(&mut world);
    let ball = world.create_circle(0.5, BodyType::Dynamic, 1.0);
    world.body_mut(ball).set_position(Vec2::new(0.0, 0.499));

    world.step(DT);
    let initial = world
        .body_contacts(ball)
        .first()
        .map(|&ck| world.contact(ck).normal_impulse(0))
        .unwrap_or(0.0);

    run(&mut world, 3);
    let after = world
        .body_contacts(ball)
        .first()
        .map(|&ck| world.contact(ck).normal_impulse(0))
        .unwrap_or(0.0);
    assert!((after - initial).abs() < 1e-6);
}

#[test]
fn resting_impulse_carries_weight_without_drift() {
    let mut world = World::new(WorldSettings::default());
    create_ground(&mut world);
    let density = 1.0 / (PI * 0.25);
    let ball = world.create_circle(0.5, BodyType::Dynamic, density);
    world.body_mut(ball).set_position(Vec2::new(0.0, 0.5));

    run(&mut world, 100);
    let impulse_at = |world: &World| {
        let ck = world.body_contacts(ball)[0];
        world.contact(ck).normal_impulse(0)
    };
    let reference = impulse_at(&world);
    // the resting contact must support the weight: m * g * dt
    assert!((reference - 10.0 * DT).abs() < 0.01);

    // feature ids stay stable, so the sum must not drift frame to frame
    for _ in 0..3 {
        world.step(DT);
        if world.sleeping_body_count() > 0 {
            break;
        }
        assert!((impulse_at(&world) - reference).abs() < 1e-6);
    }
}

#[test]
fn shape_cast_circle_against_box() {
    let a = Shape::Circle(Circle { radius: 0.5 });
    let b = Shape::Polygon(Polygon::rect(1.0, 1.0));
    let hit = shape_cast(
        &a,
        &tumble::math::Pose::identity(),
        &b,
        &tumble::math::Pose::new(Vec2::new(4.0, 0.0), tumble::math::Rotor2::identity()),
        Vec2::new(5.0, 0.0),
        Vec2::zero(),
    )
    .expect("cast should hit");
    assert!((hit.t - 0.7).abs() < 1e-3);
    assert!((hit.normal - Vec2::new(-1.0, 0.0)).mag() < 1e-3);
}

#[test]
fn separated_stacks_form_independent_islands() {
    let mut world = World::new(WorldSettings::default());
    create_ground(&mut world);

    let mut stacks = Vec::new();
    for x in [-5.0, 5.0] {
        let mut stack = Vec::new();
        for i in 0..3 {
            let key = world.create_box(1.0, 1.0, BodyType::Dynamic, 1.0);
            world
                .body_mut(key)
                .set_position(Vec2::new(x, 0.55 + i as f64 * 1.1));
            stack.push(key);
        }
        stacks.push(stack);
    }

    // let contacts form; the shared static ground must not merge the stacks
    run(&mut world, 30);
    assert_eq!(world.island_count(), 2);

    // let everything fall asleep, then disturb only the left stack
    run(&mut world, 300);
    let right_positions: Vec<Vec2> = stacks[1].iter().map(|&k| world.body(k).position()).collect();

    world
        .body_mut(stacks[0][2])
        .apply_impulse(Vec2::new(3.0, 0.0), Vec2::new(-5.0, 2.75));
    run(&mut world, 30);

    for (&key, &before) in stacks[1].iter().zip(&right_positions) {
        let now = world.body(key).position();
        assert!(
            (now - before).mag() < 1e-9,
            "solving the left island moved a body in the right island"
        );
    }
}

#[test]
fn settled_box_sleeps_and_wakes_on_impulse() {
    let mut world = World::new(WorldSettings::default());
    create_ground(&mut world);
    let b = world.create_box(1.0, 1.0, BodyType::Dynamic, 1.0);
    world.body_mut(b).set_position(Vec2::new(0.0, 0.51));

    // settle, then rest past the sleep threshold (0.5 s)
    run(&mut world, 180);
    assert!(!world.body(b).is_awake(), "box should be asleep");
    assert_eq!(world.body(b).velocity.linear.mag(), 0.0);
    assert_eq!(world.body(b).velocity.angular, 0.0);

    // no integration happens while asleep
    let y = world.body(b).position().y;
    run(&mut world, 60);
    assert_eq!(world.body(b).position().y, y);
    assert!(!world.body(b).is_awake());

    let pos = world.body(b).position();
    world
        .body_mut(b)
        .apply_impulse(Vec2::new(0.0, 5.0), pos);
    world.step(DT);
    assert!(world.body(b).is_awake());
    assert!(world.body(b).velocity.linear.y > 0.0);
}

//
// property tests
//

#[test]
fn static_bodies_never_move() {
    let mut world = World::new(WorldSettings::default());
    let ground = create_ground(&mut world);
    for i in 0..4 {
        let b = world.create_box(1.0, 1.0, BodyType::Dynamic, 1.0);
        world
            .body_mut(b)
            .set_position(Vec2::new(0.2 * i as f64, 0.6 + 1.1 * i as f64));
    }

    let before = world.body(ground).position();
    run(&mut world, 240);
    let after = world.body(ground).position();
    assert_eq!(before.x, after.x);
    assert_eq!(before.y, after.y);
    assert_eq!(world.body(ground).angle(), 0.0);
}

#[test]
fn impulse_sums_respect_bounds() {
    let mut world = World::new(WorldSettings::default());
    create_ground(&mut world);
    for i in 0..3 {
        let b = world.create_box(1.0, 1.0, BodyType::Dynamic, 1.0);
        world
            .body_mut(b)
            .set_position(Vec2::new(0.1 * i as f64, 0.55 + 1.1 * i as f64));
    }

    for _ in 0..120 {
        world.step(DT);
        for (_, contact) in world.contacts() {
            for p in 0..contact.manifold().count {
                let normal = contact.normal_impulse(p);
                let tangent = contact.tangent_impulse(p);
                assert!(normal >= 0.0, "normal impulse sum went negative");
                assert!(
                    tangent.abs() <= contact.friction() * normal + 1e-9,
                    "tangent impulse exceeded the friction cone"
                );
            }
        }
    }
}

#[test]
fn kinetic_energy_does_not_grow() {
    let mut settings = WorldSettings::default();
    settings.apply_gravity = false;
    let mut world = World::new(settings);

    let a = world.create_box(1.0, 1.0, BodyType::Dynamic, 1.0);
    world.body_mut(a).set_position(Vec2::new(-2.0, 0.0));
    world.body_mut(a).set_velocity(Velocity {
        linear: Vec2::new(3.0, 0.0),
        angular: 0.0,
    });
    let b = world.create_box(1.0, 1.0, BodyType::Dynamic, 1.0);
    world.body_mut(b).set_position(Vec2::new(2.0, 0.0));

    let energy = |world: &World| {
        [a, b]
            .iter()
            .map(|&k| {
                let body = world.body(k);
                let m = body.mass().unwrap();
                let i = body.inertia().unwrap();
                0.5 * m * body.velocity.linear.mag_sq()
                    + 0.5 * i * body.velocity.angular * body.velocity.angular
            })
            .sum::<f64>()
    };

    let mut previous = energy(&world);
    for _ in 0..180 {
        world.step(DT);
        let now = energy(&world);
        assert!(
            now <= previous * (1.0 + 1e-6) + 1e-9,
            "kinetic energy increased from {previous} to {now}"
        );
        previous = now;
    }
}

#[test]
fn bodies_leaving_the_valid_region_are_destroyed() {
    let mut settings = WorldSettings::default();
    settings.valid_region = tumble::Aabb::new(Vec2::new(-10.0, -10.0), Vec2::new(10.0, 10.0));
    let mut world = World::new(settings);

    let b = world.create_circle(0.5, BodyType::Dynamic, 1.0);
    world.body_mut(b).set_position(Vec2::new(0.0, 5.0));
    // falls past y = -10 in under 2 seconds
    run(&mut world, 150);
    assert!(world.try_body(b).is_none());
    assert_eq!(world.body_count(), 0);
}

//
// queries
//

#[test]
fn point_and_aabb_queries() {
    let mut world = World::new(WorldSettings::default());
    let a = world.create_box(2.0, 2.0, BodyType::Static, 1.0);
    let b = world.create_circle(0.5, BodyType::Static, 1.0);
    world.body_mut(b).set_position(Vec2::new(5.0, 0.0));
    world.step(DT);

    let hits = world.query_point(Vec2::new(0.5, 0.5));
    assert_eq!(hits.len(), 1);
    assert_eq!(world.collider(hits[0]).body, a);

    // the point query confirms against the exact shape, not the fat box
    assert!(world.query_point(Vec2::new(5.0, 0.52)).is_empty());

    let region = tumble::Aabb::new(Vec2::new(4.0, -1.0), Vec2::new(6.0, 1.0));
    let hits = world.query_aabb(&region);
    assert_eq!(hits.len(), 1);
    assert_eq!(world.collider(hits[0]).body, b);
}

#[test]
fn ray_cast_reports_closest_hit() {
    let mut world = World::new(WorldSettings::default());
    let near = world.create_circle(0.5, BodyType::Static, 1.0);
    world.body_mut(near).set_position(Vec2::new(3.0, 0.0));
    let far = world.create_circle(0.5, BodyType::Static, 1.0);
    world.body_mut(far).set_position(Vec2::new(7.0, 0.0));
    world.step(DT);

    let hit = world
        .ray_cast_closest(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0))
        .expect("ray should hit");
    assert_eq!(world.collider(hit.collider).body, near);
    assert!((hit.point - Vec2::new(2.5, 0.0)).mag() < 1e-6);
    assert!((hit.normal - Vec2::new(-1.0, 0.0)).mag() < 1e-6);
    assert!((hit.fraction - 0.25).abs() < 1e-6);

    assert!(world
        .ray_cast_closest(Vec2::new(0.0, 5.0), Vec2::new(10.0, 5.0))
        .is_none());
}

#[test]
fn distance_query_between_world_shapes() {
    let a = Shape::Circle(Circle { radius: 1.0 });
    let b = Shape::Polygon(Polygon::rect(2.0, 2.0));
    let result = compute_distance(
        &a,
        &tumble::math::Pose::identity(),
        &b,
        &tumble::math::Pose::new(Vec2::new(5.0, 0.0), tumble::math::Rotor2::identity()),
    );
    assert!((result.distance - 3.0).abs() < 1e-6);
    assert!((result.point_a - Vec2::new(1.0, 0.0)).mag() < 1e-6);
    assert!((result.point_b - Vec2::new(4.0, 0.0)).mag() < 1e-6);
}

//
// callbacks
//

#[derive(Default)]
struct CountingListener {
    begins: Rc<Cell<u32>>,
    touches: Rc<Cell<u32>>,
    ends: Rc<Cell<u32>>,
}

impl ContactListener for CountingListener {
    fn on_contact_begin(
        &mut self,
        _world: &World,
        _own: ColliderKey,
        _other: ColliderKey,
        _manifold: &ContactManifold,
    ) {
        self.begins.set(self.begins.get() + 1);
    }

    fn on_contact_touching(
        &mut self,
        _world: &World,
        _own: ColliderKey,
        _other: ColliderKey,
        _manifold: &ContactManifold,
    ) {
        self.touches.set(self.touches.get() + 1);
    }

    fn on_contact_end(&mut self, _world: &World, _own: ColliderKey, _other: ColliderKey) {
        self.ends.set(self.ends.get() + 1);
    }
}

#[test]
fn contact_listener_sees_begin_touch_end() {
    let mut world = World::new(WorldSettings::default());
    create_ground(&mut world);
    let ball = world.create_circle(0.5, BodyType::Dynamic, 1.0);
    world.body_mut(ball).set_position(Vec2::new(0.0, 1.5));

    let listener = CountingListener::default();
    let begins = listener.begins.clone();
    let touches = listener.touches.clone();
    let ends = listener.ends.clone();
    let ball_collider = world.body(ball).colliders()[0];
    world.set_contact_listener(ball_collider, Box::new(listener));

    run(&mut world, 60);
    assert!(begins.get() >= 1, "contact begin should have fired");
    assert!(touches.get() >= 1, "contact touching should have fired");

    let pos = world.body(ball).position();
    world
        .body_mut(ball)
        .apply_impulse(Vec2::new(0.0, 8.0), pos);
    run(&mut world, 30);
    assert!(ends.get() >= 1, "contact end should have fired");
}

#[test]
fn joint_destroy_callback_fires_on_body_destruction() {
    let mut world = World::new(WorldSettings::default());
    let a = world.create_box(1.0, 1.0, BodyType::Static, 1.0);
    let b = world.create_box(1.0, 1.0, BodyType::Dynamic, 1.0);
    world.body_mut(b).set_position(Vec2::new(0.0, 2.0));

    let joint = world.create_revolute_joint(a, b, Vec2::new(0.0, 1.0), 10.0, 1.0, 1.0);
    let fired = Rc::new(Cell::new(false));
    let flag = fired.clone();
    world.set_joint_destroy_callback(joint, Box::new(move |_| flag.set(true)));

    world.destroy_body(b);
    assert!(fired.get());
    assert_eq!(world.joint_count(), 0);
    // the surviving body no longer references the joint
    world.step(DT);
}

//
// joints
//

#[test]
fn grab_joint_drags_body_to_target() {
    let mut settings = WorldSettings::default();
    settings.apply_gravity = false;
    let mut world = World::new(settings);
    let b = world.create_box(1.0, 1.0, BodyType::Dynamic, 1.0);

    let joint = world.create_grab_joint(b, Vec2::zero(), Vec2::new(3.0, 1.0), 2.0, 0.7, 1.0);
    for _ in 0..240 {
        if let JointKind::Grab(grab) = world.joint_mut(joint).kind_mut() {
            grab.set_target(Vec2::new(3.0, 1.0));
        }
        world.step(DT);
    }
    let pos = world.body(b).position();
    assert!(
        (pos - Vec2::new(3.0, 1.0)).mag() < 0.1,
        "grab joint left the body at {pos:?}"
    );
}

#[test]
fn revolute_pendulum_conserves_anchor_distance() {
    let mut world = World::new(WorldSettings::default());
    let pivot = world.create_box(0.5, 0.5, BodyType::Static, 1.0);
    world.body_mut(pivot).set_position(Vec2::new(0.0, 5.0));
    let bob = world.create_box(0.5, 0.5, BodyType::Dynamic, 1.0);
    world.body_mut(bob).set_position(Vec2::new(2.0, 5.0));

    world.create_revolute_joint(pivot, bob, Vec2::new(0.0, 5.0), 0.0, 1.0, 1.0);

    for _ in 0..300 {
        world.step(DT);
        let d = (world.body(bob).position() - Vec2::new(0.0, 5.0)).mag();
        assert!(
            (d - 2.0).abs() < 0.1,
            "pendulum arm length drifted to {d}"
        );
    }
    // it should actually swing
    assert!(world.body(bob).position().y < 4.9);
}

#[test]
fn weld_joint_locks_relative_pose() {
    let mut world = World::new(WorldSettings::default());
    create_ground(&mut world);
    let a = world.create_box(1.0, 1.0, BodyType::Dynamic, 1.0);
    world.body_mut(a).set_position(Vec2::new(0.0, 3.0));
    let b = world.create_box(1.0, 1.0, BodyType::Dynamic, 1.0);
    world.body_mut(b).set_position(Vec2::new(1.0, 3.0));

    world.create_weld_joint(a, b, Vec2::new(0.5, 3.0), 0.0, 1.0, 1.0);
    world
        .body_mut(a)
        .apply_impulse(Vec2::new(1.5, 2.0), Vec2::new(0.0, 3.0));
    run(&mut world, 120);

    let d = world.body(b).position() - world.body(a).position();
    assert!((d.mag() - 1.0).abs() < 0.05, "weld separation became {}", d.mag());
    let rel_angle = world.body(b).angle() - world.body(a).angle();
    assert!(rel_angle.abs() < 0.05, "weld relative angle became {rel_angle}");
}

#[test]
fn angle_joint_locks_relative_angle() {
    let mut settings = WorldSettings::default();
    settings.apply_gravity = false;
    let mut world = World::new(settings);
    let a = world.create_box(1.0, 1.0, BodyType::Dynamic, 1.0);
    let b = world.create_box(1.0, 1.0, BodyType::Dynamic, 1.0);
    world.body_mut(b).set_position(Vec2::new(3.0, 0.0));

    world.create_angle_joint(a, b, 0.0, 1.0, 1.0);
    world.body_mut(a).apply_torque(20.0);
    run(&mut world, 120);

    let rel = world.body(b).angle() - world.body(a).angle();
    assert!(rel.abs() < 0.05, "relative angle drifted to {rel}");
}

#[test]
fn prismatic_joint_constrains_motion_to_axis() {
    let mut settings = WorldSettings::default();
    settings.apply_gravity = false;
    let mut world = World::new(settings);
    let rail = world.create_box(0.5, 0.5, BodyType::Static, 1.0);
    let slider = world.create_box(1.0, 1.0, BodyType::Dynamic, 1.0);
    world.body_mut(slider).set_position(Vec2::new(1.0, 0.0));

    world.create_prismatic_joint(
        rail,
        slider,
        Vec2::new(1.0, 0.0),
        Vec2::new(1.0, 0.0),
        0.0,
        1.0,
        1.0,
    );

    // push at an angle; only the axis component should survive
    world
        .body_mut(slider)
        .apply_impulse(Vec2::new(2.0, 2.0), Vec2::new(1.0, 0.0));
    run(&mut world, 120);

    let pos = world.body(slider).position();
    assert!(pos.x > 1.0, "slider should have moved along the axis");
    assert!(pos.y.abs() < 0.05, "slider left the axis: y = {}", pos.y);
}

#[test]
fn motor_joint_drives_toward_angular_offset() {
    let mut settings = WorldSettings::default();
    settings.apply_gravity = false;
    let mut world = World::new(settings);
    let anchor = world.create_box(0.5, 0.5, BodyType::Static, 1.0);
    let wheel = world.create_circle(0.5, BodyType::Dynamic, 1.0);

    let joint = world.create_motor_joint(anchor, wheel, Vec2::zero(), 100.0, 50.0, 30.0, 1.0, 1.0);
    if let JointKind::Motor(motor) = world.joint_mut(joint).kind_mut() {
        motor.angular_offset = PI / 2.0;
    }
    run(&mut world, 300);

    let angle = world.body(wheel).angle();
    assert!(
        (angle - PI / 2.0).abs() < 0.1,
        "motor stopped at angle {angle}"
    );
}

#[test]
fn pulley_joint_conserves_total_length() {
    let mut world = World::new(WorldSettings::default());
    let a = world.create_box(1.0, 1.0, BodyType::Dynamic, 1.0);
    world.body_mut(a).set_position(Vec2::new(-2.0, 3.0));
    let b = world.create_box(1.0, 1.0, BodyType::Dynamic, 4.0);
    world.body_mut(b).set_position(Vec2::new(2.0, 3.0));

    let ground_a = Vec2::new(-2.0, 6.0);
    let ground_b = Vec2::new(2.0, 6.0);
    world.create_pulley_joint(
        a,
        b,
        ground_a,
        ground_b,
        Vec2::new(-2.0, 3.0),
        Vec2::new(2.0, 3.0),
        1.0,
        0.0,
        1.0,
        1.0,
    );

    let total = |world: &World| {
        (world.body(a).position() - ground_a).mag() + (world.body(b).position() - ground_b).mag()
    };
    let initial = total(&world);
    run(&mut world, 240);
    // the heavier side should have descended, pulling the lighter one up
    assert!(world.body(b).position().y < 2.9);
    assert!(world.body(a).position().y > 3.1);
    assert!((total(&world) - initial).abs() < 0.15);
}

//
// shapes in the pipeline
//

#[test]
fn capsule_rests_at_its_radius() {
    let mut world = World::new(WorldSettings::default());
    create_ground(&mut world);
    let cap = world.create_capsule(2.0, 0.5, BodyType::Dynamic, 1.0);
    world.body_mut(cap).set_position(Vec2::new(0.0, 2.0));

    run(&mut world, 240);
    let y = world.body(cap).position().y;
    assert!(y > 0.48 && y < 0.52, "capsule rests at y = {y}");
    assert!(world.body(cap).angle().abs() < 0.05);
}

#[test]
fn regular_polygon_factory_produces_resting_body() {
    let mut world = World::new(WorldSettings::default());
    create_ground(&mut world);
    let hex = world.create_regular_polygon(0.5, 6, 0.0, BodyType::Dynamic, 1.0);
    world.body_mut(hex).set_position(Vec2::new(0.0, 2.0));

    run(&mut world, 240);
    let y = world.body(hex).position().y;
    assert!(y > 0.2 && y < 0.6, "hexagon rests at y = {y}");
}

#[test]
fn random_convex_polygon_is_valid() {
    let mut world = World::new(WorldSettings::default());
    for _ in 0..10 {
        let key = world.create_random_convex_polygon(1.0, 0, BodyType::Dynamic, 1.0);
        let body = world.body(key);
        assert!(body.mass().unwrap() > 0.0);
        let collider = world.collider(body.colliders()[0]);
        if let Shape::Polygon(p) = &collider.shape {
            assert!(p.vertex_count() >= 3);
        } else {
            panic!("factory should produce polygons");
        }
    }
}

//
// contact graph bookkeeping
//

#[test]
fn at_most_one_contact_per_pair() {
    let mut world = World::new(WorldSettings::default());
    create_ground(&mut world);
    let ball = world.create_circle(0.5, BodyType::Dynamic, 1.0);
    world.body_mut(ball).set_position(Vec2::new(0.0, 0.4));

    run(&mut world, 10);
    assert_eq!(world.contact_count(), 1);
    assert_eq!(world.body_contacts(ball).len(), 1);
}

#[test]
fn filters_prevent_contact_creation() {
    let mut settings = WorldSettings::default();
    settings.apply_gravity = false;
    let mut world = World::new(settings);
    let a = world.create_box(1.0, 1.0, BodyType::Dynamic, 1.0);
    let b = world.create_box(1.0, 1.0, BodyType::Static, 1.0);
    world.body_mut(b).set_position(Vec2::new(0.4, 0.0));

    let ca = world.body(a).colliders()[0];
    world.set_filter(
        ca,
        tumble::Filter {
            category: 0b01,
            mask: 0b10,
            group: 0,
        },
    );
    // the static box stays in the default category 0b01, which the dynamic
    // one does not mask
    run(&mut world, 5);
    assert_eq!(world.contact_count(), 0);
}

#[test]
fn kinematic_bodies_move_but_ignore_forces() {
    let mut world = World::new(WorldSettings::default());
    let platform = world.create_box(2.0, 0.5, BodyType::Kinematic, 1.0);
    world.body_mut(platform).set_velocity(Velocity {
        linear: Vec2::new(1.0, 0.0),
        angular: 0.0,
    });

    run(&mut world, 60);
    let pos = world.body(platform).position();
    assert!((pos.x - 1.0).abs() < 1e-9, "platform should have moved 1m");
    assert_eq!(pos.y, 0.0, "gravity must not act on kinematic bodies");
}

#[test]
fn multiple_colliders_combine_mass() {
    let mut settings = WorldSettings::default();
    settings.apply_gravity = false;
    let mut world = World::new(settings);

    let b = world.create_box(1.0, 1.0, BodyType::Dynamic, 1.0);
    let m1 = world.body(b).mass().unwrap();
    assert!((m1 - 1.0).abs() < 1e-9);

    world.add_collider(b, Shape::Circle(Circle { radius: 0.5 }), 1.0);
    let m2 = world.body(b).mass().unwrap();
    assert!((m2 - (1.0 + PI * 0.25)).abs() < 1e-9);
    assert!(world.body(b).inertia().unwrap() > 0.0);
}

#[test]
fn reset_clears_the_world() {
    let mut world = World::new(WorldSettings::default());
    create_ground(&mut world);
    let b = world.create_circle(0.5, BodyType::Dynamic, 1.0);
    world.body_mut(b).set_position(Vec2::new(0.0, 0.4));
    run(&mut world, 5);

    world.reset();
    assert_eq!(world.body_count(), 0);
    assert_eq!(world.contact_count(), 0);
    assert_eq!(world.joint_count(), 0);
    // the world is reusable afterwards
    create_ground(&mut world);
    run(&mut world, 5);
}
