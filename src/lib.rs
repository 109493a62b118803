//! A 2D real-time rigid body physics engine.
//!
//! The simulation is driven by [`World::step`]: a fixed pipeline that updates
//! a dynamic AABB tree broad phase, maintains a persistent contact graph,
//! runs a GJK/EPA narrow phase to build contact manifolds, groups bodies into
//! islands and solves each island's velocity and position constraints with
//! warm-started sequential impulses.
//!
//! ```no_run
//! use tumble::{World, WorldSettings, BodyType, Shape};
//!
//! let mut world = World::new(WorldSettings::default());
//! let _ground = world.create_box(20.0, 1.0, BodyType::Static, 1.0);
//! let ball = world.create_circle(0.5, BodyType::Dynamic, 1.0);
//! world.body_mut(ball).set_position(tumble::math::Vec2::new(0.0, 5.0));
//!
//! for _ in 0..120 {
//!     world.step(1.0 / 60.0);
//! }
//! ```

#[macro_use]
mod tracy_helpers {
    macro_rules! tracy_span {
        ($name: literal, $func_name: literal) => {{
            #[cfg(feature = "tracy")]
            let span = Some(tracy_client::Span::new(
                $name,
                $func_name,
                file!(),
                line!(),
                100,
            ));
            #[cfg(not(feature = "tracy"))]
            let span = ();
            span
        }};
    }
}

pub mod math;

pub mod settings;
pub use settings::{TimeStep, WorldSettings};

pub mod body;
pub use body::{BodyType, Filter, Mass, Material, RigidBody, Velocity};

pub mod collision;
pub use collision::{
    compute_distance, shape_cast, Aabb, Capsule, Circle, Collider, DistanceResult, Polygon,
    RayCastHit, RayCastInput, Shape, ShapeCastHit, ShapeKind,
};

pub mod contact;
pub use contact::{Contact, ContactListener};
pub use collision::narrowphase::{ContactManifold, ManifoldPoint};

mod contact_solver;

pub mod joint;
pub use joint::{
    AngleJoint, DistanceJoint, GrabJoint, Joint, JointKind, MotorJoint, PrismaticJoint,
    PulleyJoint, RevoluteJoint, WeldJoint,
};

mod island;

pub mod world;
pub use world::{
    BodyKey, ColliderKey, ContactKey, JointDestroyCallback, JointKey, RayHit, World,
};
