//! Joint constraints between bodies.
//!
//! Every joint prepares its Jacobian rows, effective mass and bias once per
//! step, then applies one Gauss-Seidel impulse per velocity iteration.
//! Joints with a positive frequency are soft: stiffness and damping are
//! folded into the effective mass (gamma) and bias (beta) the usual way.

use std::f64::consts::PI;

use crate::contact_solver::SolverBody;
use crate::math::{cross, cross_sv, invert2, invert3, Mat2, Mat3, Rotor2, Vec2, Vec3};
use crate::settings::TimeStep;
use crate::world::BodyKey;

/// Spring parameters derived from frequency and damping ratio.
///
/// `gamma` softens the effective mass, `beta` scales the positional bias.
/// A non-positive frequency yields a hard constraint.
#[derive(Clone, Copy, Debug)]
struct SoftParams {
    beta: f64,
    gamma: f64,
}

fn soft_params(frequency: f64, damping_ratio: f64, joint_mass: f64, dt: f64) -> SoftParams {
    if frequency > 0.0 {
        let omega = 2.0 * PI * frequency;
        let d = 2.0 * joint_mass * damping_ratio * omega;
        let k = joint_mass * omega * omega;
        let gamma = 1.0 / (dt * (d + dt * k));
        SoftParams {
            beta: dt * k * gamma,
            gamma,
        }
    } else {
        // hard constraint: no softness, plain Baumgarte stabilization
        SoftParams {
            beta: 0.2,
            gamma: 0.0,
        }
    }
}

/// A joint and the bodies it connects. Grab joints connect one body to a
/// world-space target and have no second body.
#[derive(Debug)]
pub struct Joint {
    pub(crate) body_a: BodyKey,
    pub(crate) body_b: Option<BodyKey>,
    pub(crate) kind: JointKind,
    pub(crate) island: bool,
    /// Island-local body slots, set while the solver runs.
    pub(crate) slot_a: usize,
    pub(crate) slot_b: usize,
}

#[derive(Debug)]
pub enum JointKind {
    Grab(GrabJoint),
    Revolute(RevoluteJoint),
    Distance(DistanceJoint),
    Prismatic(PrismaticJoint),
    Pulley(PulleyJoint),
    Weld(WeldJoint),
    Angle(AngleJoint),
    Motor(MotorJoint),
}

impl Joint {
    pub(crate) fn new(body_a: BodyKey, body_b: Option<BodyKey>, kind: JointKind) -> Self {
        Joint {
            body_a,
            body_b,
            kind,
            island: false,
            slot_a: 0,
            slot_b: 0,
        }
    }

    #[inline]
    pub fn body_a(&self) -> BodyKey {
        self.body_a
    }

    #[inline]
    pub fn body_b(&self) -> Option<BodyKey> {
        self.body_b
    }

    #[inline]
    pub fn kind(&self) -> &JointKind {
        &self.kind
    }

    #[inline]
    pub fn kind_mut(&mut self) -> &mut JointKind {
        &mut self.kind
    }

    pub(crate) fn prepare(&mut self, bodies: &mut [SolverBody], step: &TimeStep) {
        let (a, b) = (self.slot_a, self.slot_b);
        match &mut self.kind {
            JointKind::Grab(j) => j.prepare(bodies, a, step),
            JointKind::Revolute(j) => j.prepare(bodies, a, b, step),
            JointKind::Distance(j) => j.prepare(bodies, a, b, step),
            JointKind::Prismatic(j) => j.prepare(bodies, a, b, step),
            JointKind::Pulley(j) => j.prepare(bodies, a, b, step),
            JointKind::Weld(j) => j.prepare(bodies, a, b, step),
            JointKind::Angle(j) => j.prepare(bodies, a, b, step),
            JointKind::Motor(j) => j.prepare(bodies, a, b, step),
        }
    }

    pub(crate) fn solve_velocity(&mut self, bodies: &mut [SolverBody], step: &TimeStep) {
        let (a, b) = (self.slot_a, self.slot_b);
        match &mut self.kind {
            JointKind::Grab(j) => j.solve(bodies, a),
            JointKind::Revolute(j) => j.solve(bodies, a, b),
            JointKind::Distance(j) => j.solve(bodies, a, b),
            JointKind::Prismatic(j) => j.solve(bodies, a, b),
            JointKind::Pulley(j) => j.solve(bodies, a, b),
            JointKind::Weld(j) => j.solve(bodies, a, b),
            JointKind::Angle(j) => j.solve(bodies, a, b),
            JointKind::Motor(j) => j.solve(bodies, a, b, step),
        }
    }
}

#[inline]
fn anchor_arm(body: &SolverBody, local_anchor: Vec2) -> Vec2 {
    Rotor2::from_angle(body.angle) * (local_anchor - body.local_center)
}

/// K for a point-to-point constraint, `J M^-1 J^T` of the two linear rows.
fn point_mass_matrix(a: &SolverBody, b: &SolverBody, ra: Vec2, rb: Vec2, gamma: f64) -> Mat2 {
    let k00 = a.inv_mass + b.inv_mass + a.inv_inertia * ra.y * ra.y + b.inv_inertia * rb.y * rb.y
        + gamma;
    let k01 = -a.inv_inertia * ra.y * ra.x - b.inv_inertia * rb.y * rb.x;
    let k11 = a.inv_mass + b.inv_mass + a.inv_inertia * ra.x * ra.x + b.inv_inertia * rb.x * rb.x
        + gamma;
    Mat2::new(Vec2::new(k00, k01), Vec2::new(k01, k11))
}

//
// grab
//

/// Soft point-to-world-point constraint on a single body, for mouse
/// dragging. The target is settable every frame.
#[derive(Debug)]
pub struct GrabJoint {
    pub(crate) local_anchor: Vec2,
    target: Vec2,
    pub frequency: f64,
    pub damping_ratio: f64,
    pub joint_mass: f64,

    ra: Vec2,
    m: Mat2,
    bias: Vec2,
    gamma: f64,
    impulse_sum: Vec2,
}

impl GrabJoint {
    pub(crate) fn new(
        local_anchor: Vec2,
        target: Vec2,
        frequency: f64,
        damping_ratio: f64,
        joint_mass: f64,
    ) -> Self {
        GrabJoint {
            local_anchor,
            target,
            frequency,
            damping_ratio,
            joint_mass,
            ra: Vec2::zero(),
            m: Mat2::identity(),
            bias: Vec2::zero(),
            gamma: 0.0,
            impulse_sum: Vec2::zero(),
        }
    }

    #[inline]
    pub fn target(&self) -> Vec2 {
        self.target
    }

    #[inline]
    pub fn set_target(&mut self, target: Vec2) {
        self.target = target;
    }

    fn prepare(&mut self, bodies: &mut [SolverBody], a: usize, step: &TimeStep) {
        let soft = soft_params(self.frequency, self.damping_ratio, self.joint_mass, step.dt);
        self.gamma = soft.gamma;
        self.ra = anchor_arm(&bodies[a], self.local_anchor);

        let body = &bodies[a];
        let k00 = body.inv_mass + body.inv_inertia * self.ra.y * self.ra.y + soft.gamma;
        let k01 = -body.inv_inertia * self.ra.y * self.ra.x;
        let k11 = body.inv_mass + body.inv_inertia * self.ra.x * self.ra.x + soft.gamma;
        self.m = invert2(Mat2::new(Vec2::new(k00, k01), Vec2::new(k01, k11)))
            .unwrap_or(Mat2::new(Vec2::zero(), Vec2::zero()));

        let pa = body.center + self.ra;
        self.bias = (pa - self.target) * (soft.beta * step.inv_dt);

        if step.warm_starting {
            self.apply(bodies, a, self.impulse_sum);
        } else {
            self.impulse_sum = Vec2::zero();
        }
    }

    fn solve(&mut self, bodies: &mut [SolverBody], a: usize) {
        let jv = bodies[a].linear + cross_sv(bodies[a].angular, self.ra);
        let lambda = self.m * -(jv + self.bias + self.impulse_sum * self.gamma);
        self.apply(bodies, a, lambda);
        self.impulse_sum += lambda;
    }

    fn apply(&self, bodies: &mut [SolverBody], a: usize, lambda: Vec2) {
        bodies[a].linear += lambda * bodies[a].inv_mass;
        bodies[a].angular += bodies[a].inv_inertia * cross(self.ra, lambda);
    }
}

//
// revolute
//

/// Two-row point-to-point constraint pinning an anchor shared by two bodies.
#[derive(Debug)]
pub struct RevoluteJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub frequency: f64,
    pub damping_ratio: f64,
    pub joint_mass: f64,

    ra: Vec2,
    rb: Vec2,
    m: Mat2,
    bias: Vec2,
    gamma: f64,
    impulse_sum: Vec2,
}

impl RevoluteJoint {
    pub(crate) fn new(
        local_anchor_a: Vec2,
        local_anchor_b: Vec2,
        frequency: f64,
        damping_ratio: f64,
        joint_mass: f64,
    ) -> Self {
        RevoluteJoint {
            local_anchor_a,
            local_anchor_b,
            frequency,
            damping_ratio,
            joint_mass,
            ra: Vec2::zero(),
            rb: Vec2::zero(),
            m: Mat2::identity(),
            bias: Vec2::zero(),
            gamma: 0.0,
            impulse_sum: Vec2::zero(),
        }
    }

    fn prepare(&mut self, bodies: &mut [SolverBody], a: usize, b: usize, step: &TimeStep) {
        let soft = soft_params(self.frequency, self.damping_ratio, self.joint_mass, step.dt);
        self.gamma = soft.gamma;
        self.ra = anchor_arm(&bodies[a], self.local_anchor_a);
        self.rb = anchor_arm(&bodies[b], self.local_anchor_b);

        let k = point_mass_matrix(&bodies[a], &bodies[b], self.ra, self.rb, soft.gamma);
        self.m = invert2(k).unwrap_or(Mat2::new(Vec2::zero(), Vec2::zero()));

        let pa = bodies[a].center + self.ra;
        let pb = bodies[b].center + self.rb;
        self.bias = (pb - pa) * (soft.beta * step.inv_dt);

        if step.warm_starting {
            self.apply(bodies, a, b, self.impulse_sum);
        } else {
            self.impulse_sum = Vec2::zero();
        }
    }

    fn solve(&mut self, bodies: &mut [SolverBody], a: usize, b: usize) {
        let jv = (bodies[b].linear + cross_sv(bodies[b].angular, self.rb))
            - (bodies[a].linear + cross_sv(bodies[a].angular, self.ra));
        let lambda = self.m * -(jv + self.bias + self.impulse_sum * self.gamma);
        self.apply(bodies, a, b, lambda);
        self.impulse_sum += lambda;
    }

    fn apply(&self, bodies: &mut [SolverBody], a: usize, b: usize, lambda: Vec2) {
        bodies[a].linear -= lambda * bodies[a].inv_mass;
        bodies[a].angular -= bodies[a].inv_inertia * cross(self.ra, lambda);
        bodies[b].linear += lambda * bodies[b].inv_mass;
        bodies[b].angular += bodies[b].inv_inertia * cross(self.rb, lambda);
    }
}

//
// distance
//

/// Scalar constraint holding two local anchors at a target length, with an
/// optional slack bracket.
#[derive(Debug)]
pub struct DistanceJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub length: f64,
    /// Equal to `length` for a rigid rod; widen for a bracket that only
    /// constrains outside `[min_length, max_length]`.
    pub min_length: f64,
    pub max_length: f64,
    pub frequency: f64,
    pub damping_ratio: f64,
    pub joint_mass: f64,

    ra: Vec2,
    rb: Vec2,
    u: Vec2,
    m: f64,
    bias: f64,
    gamma: f64,
    active: bool,
    impulse_sum: f64,
}

impl DistanceJoint {
    pub(crate) fn new(
        local_anchor_a: Vec2,
        local_anchor_b: Vec2,
        length: f64,
        frequency: f64,
        damping_ratio: f64,
        joint_mass: f64,
    ) -> Self {
        DistanceJoint {
            local_anchor_a,
            local_anchor_b,
            length,
            min_length: length,
            max_length: length,
            frequency,
            damping_ratio,
            joint_mass,
            ra: Vec2::zero(),
            rb: Vec2::zero(),
            u: Vec2::zero(),
            m: 0.0,
            bias: 0.0,
            gamma: 0.0,
            active: true,
            impulse_sum: 0.0,
        }
    }

    fn prepare(&mut self, bodies: &mut [SolverBody], a: usize, b: usize, step: &TimeStep) {
        let soft = soft_params(self.frequency, self.damping_ratio, self.joint_mass, step.dt);
        self.gamma = soft.gamma;
        self.ra = anchor_arm(&bodies[a], self.local_anchor_a);
        self.rb = anchor_arm(&bodies[b], self.local_anchor_b);

        let pa = bodies[a].center + self.ra;
        let pb = bodies[b].center + self.rb;
        let d = pb - pa;
        let len = d.mag();
        self.u = if len > f64::EPSILON {
            d / len
        } else {
            Vec2::unit_y()
        };

        // inside a slack bracket nothing is constrained this step
        let rigid = self.min_length >= self.max_length;
        let target = if rigid {
            self.length
        } else {
            len.clamp(self.min_length, self.max_length)
        };
        self.active = rigid || (len - target).abs() > f64::EPSILON;
        if !self.active {
            self.impulse_sum = 0.0;
            return;
        }

        let crau = cross(self.ra, self.u);
        let crbu = cross(self.rb, self.u);
        let k = bodies[a].inv_mass
            + bodies[b].inv_mass
            + bodies[a].inv_inertia * crau * crau
            + bodies[b].inv_inertia * crbu * crbu
            + soft.gamma;
        self.m = if k > 0.0 { 1.0 / k } else { 0.0 };
        self.bias = (len - target) * (soft.beta * step.inv_dt);

        if step.warm_starting {
            self.apply(bodies, a, b, self.impulse_sum);
        } else {
            self.impulse_sum = 0.0;
        }
    }

    fn solve(&mut self, bodies: &mut [SolverBody], a: usize, b: usize) {
        if !self.active {
            return;
        }
        let jv = self.u.dot(
            (bodies[b].linear + cross_sv(bodies[b].angular, self.rb))
                - (bodies[a].linear + cross_sv(bodies[a].angular, self.ra)),
        );
        let lambda = self.m * -(jv + self.bias + self.impulse_sum * self.gamma);
        self.apply(bodies, a, b, lambda);
        self.impulse_sum += lambda;
    }

    fn apply(&self, bodies: &mut [SolverBody], a: usize, b: usize, lambda: f64) {
        let p = self.u * lambda;
        bodies[a].linear -= p * bodies[a].inv_mass;
        bodies[a].angular -= bodies[a].inv_inertia * cross(self.ra, p);
        bodies[b].linear += p * bodies[b].inv_mass;
        bodies[b].angular += bodies[b].inv_inertia * cross(self.rb, p);
    }
}

//
// prismatic
//

/// Slider: the anchor may translate only along an axis fixed in body A, and
/// the relative angle is locked.
#[derive(Debug)]
pub struct PrismaticJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) local_axis: Vec2,
    pub(crate) reference_angle: f64,
    pub frequency: f64,
    pub damping_ratio: f64,
    pub joint_mass: f64,

    t: Vec2,
    sa: f64,
    sb: f64,
    m: Mat2,
    bias: Vec2,
    gamma: f64,
    impulse_sum: Vec2,
}

impl PrismaticJoint {
    pub(crate) fn new(
        local_anchor_a: Vec2,
        local_anchor_b: Vec2,
        local_axis: Vec2,
        reference_angle: f64,
        frequency: f64,
        damping_ratio: f64,
        joint_mass: f64,
    ) -> Self {
        PrismaticJoint {
            local_anchor_a,
            local_anchor_b,
            local_axis,
            reference_angle,
            frequency,
            damping_ratio,
            joint_mass,
            t: Vec2::zero(),
            sa: 0.0,
            sb: 0.0,
            m: Mat2::identity(),
            bias: Vec2::zero(),
            gamma: 0.0,
            impulse_sum: Vec2::zero(),
        }
    }

    fn prepare(&mut self, bodies: &mut [SolverBody], a: usize, b: usize, step: &TimeStep) {
        let soft = soft_params(self.frequency, self.damping_ratio, self.joint_mass, step.dt);
        self.gamma = soft.gamma;
        let ra = anchor_arm(&bodies[a], self.local_anchor_a);
        let rb = anchor_arm(&bodies[b], self.local_anchor_b);

        let pa = bodies[a].center + ra;
        let pb = bodies[b].center + rb;
        let d = pb - pa;

        let axis = Rotor2::from_angle(bodies[a].angle) * self.local_axis;
        self.t = Vec2::new(-axis.y, axis.x);
        self.sa = cross(ra + d, self.t);
        self.sb = cross(rb, self.t);

        let k00 = bodies[a].inv_mass
            + bodies[b].inv_mass
            + bodies[a].inv_inertia * self.sa * self.sa
            + bodies[b].inv_inertia * self.sb * self.sb
            + soft.gamma;
        let k01 = bodies[a].inv_inertia * self.sa + bodies[b].inv_inertia * self.sb;
        let mut k11 = bodies[a].inv_inertia + bodies[b].inv_inertia + soft.gamma;
        if k11 == 0.0 {
            // both rotations locked; the angle row is trivially satisfied
            k11 = 1.0;
        }
        self.m = invert2(Mat2::new(Vec2::new(k00, k01), Vec2::new(k01, k11)))
            .unwrap_or(Mat2::new(Vec2::zero(), Vec2::zero()));

        self.bias = Vec2::new(
            d.dot(self.t),
            bodies[b].angle - bodies[a].angle - self.reference_angle,
        ) * (soft.beta * step.inv_dt);

        if step.warm_starting {
            self.apply(bodies, a, b, self.impulse_sum);
        } else {
            self.impulse_sum = Vec2::zero();
        }
    }

    fn solve(&mut self, bodies: &mut [SolverBody], a: usize, b: usize) {
        let jv = Vec2::new(
            self.t.dot(bodies[b].linear - bodies[a].linear) + self.sb * bodies[b].angular
                - self.sa * bodies[a].angular,
            bodies[b].angular - bodies[a].angular,
        );
        let lambda = self.m * -(jv + self.bias + self.impulse_sum * self.gamma);
        self.apply(bodies, a, b, lambda);
        self.impulse_sum += lambda;
    }

    fn apply(&self, bodies: &mut [SolverBody], a: usize, b: usize, lambda: Vec2) {
        let p = self.t * lambda.x;
        bodies[a].linear -= p * bodies[a].inv_mass;
        bodies[a].angular -= bodies[a].inv_inertia * (self.sa * lambda.x + lambda.y);
        bodies[b].linear += p * bodies[b].inv_mass;
        bodies[b].angular += bodies[b].inv_inertia * (self.sb * lambda.x + lambda.y);
    }
}

//
// pulley
//

/// Conserved-length constraint across two ground anchors:
/// `len_a + ratio * len_b` is held at its creation-time value.
#[derive(Debug)]
pub struct PulleyJoint {
    pub(crate) ground_a: Vec2,
    pub(crate) ground_b: Vec2,
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) total_length: f64,
    pub ratio: f64,
    pub frequency: f64,
    pub damping_ratio: f64,
    pub joint_mass: f64,

    ra: Vec2,
    rb: Vec2,
    ua: Vec2,
    ub: Vec2,
    m: f64,
    bias: f64,
    gamma: f64,
    impulse_sum: f64,
}

impl PulleyJoint {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        ground_a: Vec2,
        ground_b: Vec2,
        local_anchor_a: Vec2,
        local_anchor_b: Vec2,
        total_length: f64,
        ratio: f64,
        frequency: f64,
        damping_ratio: f64,
        joint_mass: f64,
    ) -> Self {
        PulleyJoint {
            ground_a,
            ground_b,
            local_anchor_a,
            local_anchor_b,
            total_length,
            ratio,
            frequency,
            damping_ratio,
            joint_mass,
            ra: Vec2::zero(),
            rb: Vec2::zero(),
            ua: Vec2::zero(),
            ub: Vec2::zero(),
            m: 0.0,
            bias: 0.0,
            gamma: 0.0,
            impulse_sum: 0.0,
        }
    }

    fn prepare(&mut self, bodies: &mut [SolverBody], a: usize, b: usize, step: &TimeStep) {
        let soft = soft_params(self.frequency, self.damping_ratio, self.joint_mass, step.dt);
        self.gamma = soft.gamma;
        self.ra = anchor_arm(&bodies[a], self.local_anchor_a);
        self.rb = anchor_arm(&bodies[b], self.local_anchor_b);

        let pa = bodies[a].center + self.ra;
        let pb = bodies[b].center + self.rb;

        let da = pa - self.ground_a;
        let db = pb - self.ground_b;
        let len_a = da.mag();
        let len_b = db.mag();
        self.ua = if len_a > f64::EPSILON {
            da / len_a
        } else {
            Vec2::zero()
        };
        self.ub = if len_b > f64::EPSILON {
            db / len_b
        } else {
            Vec2::zero()
        };

        let crau = cross(self.ra, self.ua);
        let crbu = cross(self.rb, self.ub);
        let k = bodies[a].inv_mass
            + bodies[a].inv_inertia * crau * crau
            + self.ratio * self.ratio * (bodies[b].inv_mass + bodies[b].inv_inertia * crbu * crbu)
            + soft.gamma;
        self.m = if k > 0.0 { 1.0 / k } else { 0.0 };

        let c = (len_a + self.ratio * len_b) - self.total_length;
        self.bias = c * (soft.beta * step.inv_dt);

        if step.warm_starting {
            self.apply(bodies, a, b, self.impulse_sum);
        } else {
            self.impulse_sum = 0.0;
        }
    }

    fn solve(&mut self, bodies: &mut [SolverBody], a: usize, b: usize) {
        let jv = self
            .ua
            .dot(bodies[a].linear + cross_sv(bodies[a].angular, self.ra))
            + self.ratio
                * self
                    .ub
                    .dot(bodies[b].linear + cross_sv(bodies[b].angular, self.rb));
        let lambda = self.m * -(jv + self.bias + self.impulse_sum * self.gamma);
        self.apply(bodies, a, b, lambda);
        self.impulse_sum += lambda;
    }

    fn apply(&self, bodies: &mut [SolverBody], a: usize, b: usize, lambda: f64) {
        let pa = self.ua * lambda;
        let pb = self.ub * (lambda * self.ratio);
        bodies[a].linear += pa * bodies[a].inv_mass;
        bodies[a].angular += bodies[a].inv_inertia * cross(self.ra, pa);
        bodies[b].linear += pb * bodies[b].inv_mass;
        bodies[b].angular += bodies[b].inv_inertia * cross(self.rb, pb);
    }
}

//
// weld
//

/// Full 3-DOF lock of relative translation and rotation, usually soft.
#[derive(Debug)]
pub struct WeldJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) reference_angle: f64,
    pub frequency: f64,
    pub damping_ratio: f64,
    pub joint_mass: f64,

    ra: Vec2,
    rb: Vec2,
    m: Mat3,
    bias: Vec3,
    gamma: f64,
    impulse_sum: Vec3,
}

impl WeldJoint {
    pub(crate) fn new(
        local_anchor_a: Vec2,
        local_anchor_b: Vec2,
        reference_angle: f64,
        frequency: f64,
        damping_ratio: f64,
        joint_mass: f64,
    ) -> Self {
        WeldJoint {
            local_anchor_a,
            local_anchor_b,
            reference_angle,
            frequency,
            damping_ratio,
            joint_mass,
            ra: Vec2::zero(),
            rb: Vec2::zero(),
            m: Mat3::identity(),
            bias: Vec3::zero(),
            gamma: 0.0,
            impulse_sum: Vec3::zero(),
        }
    }

    fn prepare(&mut self, bodies: &mut [SolverBody], a: usize, b: usize, step: &TimeStep) {
        let soft = soft_params(self.frequency, self.damping_ratio, self.joint_mass, step.dt);
        self.gamma = soft.gamma;
        self.ra = anchor_arm(&bodies[a], self.local_anchor_a);
        self.rb = anchor_arm(&bodies[b], self.local_anchor_b);
        let (ra, rb) = (self.ra, self.rb);
        let (ima, iia) = (bodies[a].inv_mass, bodies[a].inv_inertia);
        let (imb, iib) = (bodies[b].inv_mass, bodies[b].inv_inertia);

        let k00 = ima + imb + iia * ra.y * ra.y + iib * rb.y * rb.y + soft.gamma;
        let k01 = -iia * ra.y * ra.x - iib * rb.y * rb.x;
        let k02 = -iia * ra.y - iib * rb.y;
        let k11 = ima + imb + iia * ra.x * ra.x + iib * rb.x * rb.x + soft.gamma;
        let k12 = iia * ra.x + iib * rb.x;
        let k22 = iia + iib + soft.gamma;
        let k = Mat3::new(
            Vec3::new(k00, k01, k02),
            Vec3::new(k01, k11, k12),
            Vec3::new(k02, k12, k22),
        );
        self.m = invert3(k).unwrap_or(Mat3::new(Vec3::zero(), Vec3::zero(), Vec3::zero()));

        let pa = bodies[a].center + ra;
        let pb = bodies[b].center + rb;
        let c = pb - pa;
        let c_angle = bodies[b].angle - bodies[a].angle - self.reference_angle;
        self.bias = Vec3::new(c.x, c.y, c_angle) * (soft.beta * step.inv_dt);

        if step.warm_starting {
            self.apply(bodies, a, b, self.impulse_sum);
        } else {
            self.impulse_sum = Vec3::zero();
        }
    }

    fn solve(&mut self, bodies: &mut [SolverBody], a: usize, b: usize) {
        let jv01 = (bodies[b].linear + cross_sv(bodies[b].angular, self.rb))
            - (bodies[a].linear + cross_sv(bodies[a].angular, self.ra));
        let jv2 = bodies[b].angular - bodies[a].angular;
        let jv = Vec3::new(jv01.x, jv01.y, jv2);
        let lambda = self.m * -(jv + self.bias + self.impulse_sum * self.gamma);
        self.apply(bodies, a, b, lambda);
        self.impulse_sum += lambda;
    }

    fn apply(&self, bodies: &mut [SolverBody], a: usize, b: usize, lambda: Vec3) {
        let p = Vec2::new(lambda.x, lambda.y);
        bodies[a].linear -= p * bodies[a].inv_mass;
        bodies[a].angular -= bodies[a].inv_inertia * (cross(self.ra, p) + lambda.z);
        bodies[b].linear += p * bodies[b].inv_mass;
        bodies[b].angular += bodies[b].inv_inertia * (cross(self.rb, p) + lambda.z);
    }
}

//
// angle
//

/// Locks the relative angle of two bodies, usually soft.
#[derive(Debug)]
pub struct AngleJoint {
    pub(crate) reference_angle: f64,
    pub frequency: f64,
    pub damping_ratio: f64,
    pub joint_mass: f64,

    m: f64,
    bias: f64,
    gamma: f64,
    impulse_sum: f64,
}

impl AngleJoint {
    pub(crate) fn new(
        reference_angle: f64,
        frequency: f64,
        damping_ratio: f64,
        joint_mass: f64,
    ) -> Self {
        AngleJoint {
            reference_angle,
            frequency,
            damping_ratio,
            joint_mass,
            m: 0.0,
            bias: 0.0,
            gamma: 0.0,
            impulse_sum: 0.0,
        }
    }

    fn prepare(&mut self, bodies: &mut [SolverBody], a: usize, b: usize, step: &TimeStep) {
        let soft = soft_params(self.frequency, self.damping_ratio, self.joint_mass, step.dt);
        self.gamma = soft.gamma;

        let k = bodies[a].inv_inertia + bodies[b].inv_inertia + soft.gamma;
        self.m = if k > 0.0 { 1.0 / k } else { 0.0 };
        self.bias = (bodies[b].angle - bodies[a].angle - self.reference_angle)
            * (soft.beta * step.inv_dt);

        if step.warm_starting {
            self.apply(bodies, a, b, self.impulse_sum);
        } else {
            self.impulse_sum = 0.0;
        }
    }

    fn solve(&mut self, bodies: &mut [SolverBody], a: usize, b: usize) {
        let jv = bodies[b].angular - bodies[a].angular;
        let lambda = self.m * -(jv + self.bias + self.impulse_sum * self.gamma);
        self.apply(bodies, a, b, lambda);
        self.impulse_sum += lambda;
    }

    fn apply(&self, bodies: &mut [SolverBody], a: usize, b: usize, lambda: f64) {
        bodies[a].angular -= bodies[a].inv_inertia * lambda;
        bodies[b].angular += bodies[b].inv_inertia * lambda;
    }
}

//
// motor
//

/// Drives body B toward a linear and angular offset from body A, with the
/// applied impulse clamped to a maximum force and torque per step.
#[derive(Debug)]
pub struct MotorJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) angle_offset: f64,
    /// Target anchor separation in world space.
    pub linear_offset: Vec2,
    /// Target relative angle beyond the creation-time offset.
    pub angular_offset: f64,
    pub max_force: f64,
    pub max_torque: f64,
    pub frequency: f64,
    pub damping_ratio: f64,
    pub joint_mass: f64,

    ra: Vec2,
    rb: Vec2,
    m0: Mat2,
    m1: f64,
    bias0: Vec2,
    bias1: f64,
    gamma: f64,
    linear_impulse_sum: Vec2,
    angular_impulse_sum: f64,
}

impl MotorJoint {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        local_anchor_a: Vec2,
        local_anchor_b: Vec2,
        angle_offset: f64,
        max_force: f64,
        max_torque: f64,
        frequency: f64,
        damping_ratio: f64,
        joint_mass: f64,
    ) -> Self {
        MotorJoint {
            local_anchor_a,
            local_anchor_b,
            angle_offset,
            linear_offset: Vec2::zero(),
            angular_offset: 0.0,
            max_force: if max_force < 0.0 { f64::MAX } else { max_force },
            max_torque: if max_torque < 0.0 { f64::MAX } else { max_torque },
            frequency,
            damping_ratio,
            joint_mass,
            ra: Vec2::zero(),
            rb: Vec2::zero(),
            m0: Mat2::identity(),
            m1: 0.0,
            bias0: Vec2::zero(),
            bias1: 0.0,
            gamma: 0.0,
            linear_impulse_sum: Vec2::zero(),
            angular_impulse_sum: 0.0,
        }
    }

    fn prepare(&mut self, bodies: &mut [SolverBody], a: usize, b: usize, step: &TimeStep) {
        let soft = soft_params(self.frequency, self.damping_ratio, self.joint_mass, step.dt);
        self.gamma = soft.gamma;
        self.ra = anchor_arm(&bodies[a], self.local_anchor_a);
        self.rb = anchor_arm(&bodies[b], self.local_anchor_b);

        let k0 = point_mass_matrix(&bodies[a], &bodies[b], self.ra, self.rb, soft.gamma);
        self.m0 = invert2(k0).unwrap_or(Mat2::new(Vec2::zero(), Vec2::zero()));
        let k1 = bodies[a].inv_inertia + bodies[b].inv_inertia + soft.gamma;
        self.m1 = if k1 > 0.0 { 1.0 / k1 } else { 0.0 };

        let pa = bodies[a].center + self.ra;
        let pb = bodies[b].center + self.rb;
        self.bias0 = (pb - pa + self.linear_offset) * (soft.beta * step.inv_dt);
        self.bias1 = (bodies[b].angle - bodies[a].angle - self.angle_offset - self.angular_offset)
            * (soft.beta * step.inv_dt);

        if step.warm_starting {
            self.apply(bodies, a, b, self.linear_impulse_sum, self.angular_impulse_sum);
        } else {
            self.linear_impulse_sum = Vec2::zero();
            self.angular_impulse_sum = 0.0;
        }
    }

    fn solve(&mut self, bodies: &mut [SolverBody], a: usize, b: usize, step: &TimeStep) {
        let jv0 = (bodies[b].linear + cross_sv(bodies[b].angular, self.rb))
            - (bodies[a].linear + cross_sv(bodies[a].angular, self.ra));
        let jv1 = bodies[b].angular - bodies[a].angular;

        let mut lambda0 = self.m0 * -(jv0 + self.bias0 + self.linear_impulse_sum * self.gamma);
        let mut lambda1 = self.m1 * -(jv1 + self.bias1 + self.angular_impulse_sum * self.gamma);

        // clamp the accumulated linear impulse to the force budget
        let max_linear = self.max_force * step.dt;
        let old_linear = self.linear_impulse_sum;
        self.linear_impulse_sum += lambda0;
        if self.linear_impulse_sum.mag_sq() > max_linear * max_linear {
            self.linear_impulse_sum = self.linear_impulse_sum.normalized() * max_linear;
        }
        lambda0 = self.linear_impulse_sum - old_linear;

        // clamp the accumulated angular impulse to the torque budget
        let max_angular = self.max_torque * step.dt;
        let old_angular = self.angular_impulse_sum;
        self.angular_impulse_sum =
            (self.angular_impulse_sum + lambda1).clamp(-max_angular, max_angular);
        lambda1 = self.angular_impulse_sum - old_angular;

        self.apply(bodies, a, b, lambda0, lambda1);
    }

    fn apply(&self, bodies: &mut [SolverBody], a: usize, b: usize, lambda0: Vec2, lambda1: f64) {
        bodies[a].linear -= lambda0 * bodies[a].inv_mass;
        bodies[a].angular -= bodies[a].inv_inertia * (cross(self.ra, lambda0) + lambda1);
        bodies[b].linear += lambda0 * bodies[b].inv_mass;
        bodies[b].angular += bodies[b].inv_inertia * (cross(self.rb, lambda0) + lambda1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_params_follow_spring_derivation() {
        let dt = 1.0 / 60.0;
        let (f, zeta, m) = (5.0, 0.7, 2.0);
        let soft = soft_params(f, zeta, m, dt);

        let omega = 2.0 * PI * f;
        let k = m * omega * omega;
        let d = 2.0 * m * zeta * omega;
        let gamma = 1.0 / (dt * (d + dt * k));
        assert!((soft.gamma - gamma).abs() < 1e-12);
        assert!((soft.beta - dt * k * gamma).abs() < 1e-12);
    }

    #[test]
    fn non_positive_frequency_is_rigid() {
        let soft = soft_params(0.0, 1.0, 1.0, 1.0 / 60.0);
        assert_eq!(soft.gamma, 0.0);
        assert_eq!(soft.beta, 0.2);
    }

    #[test]
    fn motor_limits_are_sanitized() {
        let m = MotorJoint::new(Vec2::zero(), Vec2::zero(), 0.0, -1.0, 10.0, 5.0, 1.0, 1.0);
        assert_eq!(m.max_force, f64::MAX);
        assert_eq!(m.max_torque, 10.0);
    }
}
