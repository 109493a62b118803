//! Velocity and position solvers for contact constraints.
//!
//! Each manifold point gets a normal (non-penetration) and a tangent
//! (friction) solver; two-point manifolds optionally solve both normal
//! constraints at once as a 2x2 LCP. Positional error is corrected after
//! velocity convergence by split impulses applied directly to poses.

use crate::contact::Contact;
use crate::math::{cross, invert2, Mat2, Rotor2, Vec2};
use crate::settings::{TimeStep, WorldSettings, MAX_CONTACT_POINT, MAX_POSITION_CORRECTION};
use crate::world::ContactKey;

/// Body state copied into island-local buffers for the solver's duration.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SolverBody {
    /// World-space center of mass.
    pub center: Vec2,
    pub angle: f64,
    pub linear: Vec2,
    pub angular: f64,
    pub inv_mass: f64,
    pub inv_inertia: f64,
    /// Center of mass in body-local coordinates, for joint anchor arms.
    pub local_center: Vec2,
}

/// One row of the constraint Jacobian, split into per-body linear and
/// angular parts.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Jacobian {
    pub va: Vec2,
    pub wa: f64,
    pub vb: Vec2,
    pub wb: f64,
}

impl Jacobian {
    #[inline]
    fn velocity_dot(&self, a: &SolverBody, b: &SolverBody) -> f64 {
        self.va.dot(a.linear) + self.wa * a.angular + self.vb.dot(b.linear) + self.wb * b.angular
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct PointSolver {
    j: Jacobian,
    bias: f64,
    effective_mass: f64,
    impulse_sum: f64,
}

#[derive(Clone, Copy, Debug, Default)]
struct PositionPoint {
    /// Contact anchors relative to each body center, in that body's frame
    /// at prepare time so they rotate with the body while positions change.
    local_anchor_a: Vec2,
    local_anchor_b: Vec2,
    /// Contact normal in the first body's frame.
    local_normal: Vec2,
    depth: f64,
}

#[derive(Clone, Copy, Debug)]
struct BlockSolver {
    k: Mat2,
    inv_k: Mat2,
}

/// A contact prepared for one island solve.
pub(crate) struct ContactConstraint {
    pub contact: ContactKey,
    /// Island-local body slots, ordered so the manifold normal points from
    /// `a` to `b` (the manifold's `feature_flipped` is already applied).
    pub a: usize,
    pub b: usize,
    count: usize,
    friction: f64,
    normal_points: [PointSolver; MAX_CONTACT_POINT],
    tangent_points: [PointSolver; MAX_CONTACT_POINT],
    position_points: [PositionPoint; MAX_CONTACT_POINT],
    block: Option<BlockSolver>,
}

impl ContactConstraint {
    /// Build the Jacobians, effective masses and biases for this contact and
    /// apply the warm-start impulses.
    pub(crate) fn prepare(
        contact: &Contact,
        key: ContactKey,
        a: usize,
        b: usize,
        bodies: &mut [SolverBody],
        settings: &WorldSettings,
        step: &TimeStep,
    ) -> ContactConstraint {
        let manifold = &contact.manifold;
        let normal = manifold.normal;
        let tangent = manifold.tangent;

        let mut constraint = ContactConstraint {
            contact: key,
            a,
            b,
            count: manifold.count,
            friction: contact.friction,
            normal_points: [PointSolver::default(); MAX_CONTACT_POINT],
            tangent_points: [PointSolver::default(); MAX_CONTACT_POINT],
            position_points: [PositionPoint::default(); MAX_CONTACT_POINT],
            block: None,
        };

        let inv_rot_a = Rotor2::from_angle(bodies[a].angle).reversed();
        let inv_rot_b = Rotor2::from_angle(bodies[b].angle).reversed();

        for i in 0..manifold.count {
            let p = manifold.points[i].position;
            let ra = p - bodies[a].center;
            let rb = p - bodies[b].center;

            // normal row: J = [-n, -(ra x n), n, rb x n]
            let jn = Jacobian {
                va: -normal,
                wa: -cross(ra, normal),
                vb: normal,
                wb: cross(rb, normal),
            };
            let kn = bodies[a].inv_mass
                + bodies[b].inv_mass
                + bodies[a].inv_inertia * jn.wa * jn.wa
                + bodies[b].inv_inertia * jn.wb * jn.wb;

            let mut bias = 0.0;
            // restitution from the pre-solve approach speed
            let approach = jn.velocity_dot(&bodies[a], &bodies[b]);
            if approach < -settings.restitution_slop {
                bias += contact.restitution * approach;
            }
            if !settings.position_correction {
                // fold positional error into the velocity constraint instead
                bias -= settings.position_correction_beta
                    * step.inv_dt
                    * (manifold.penetration - settings.penetration_slop).max(0.0);
            }

            constraint.normal_points[i] = PointSolver {
                j: jn,
                bias,
                effective_mass: if kn > 0.0 { 1.0 / kn } else { 0.0 },
                impulse_sum: contact.normal_impulses[i],
            };

            // tangent row, biased by conveyor surface motion
            let jt = Jacobian {
                va: -tangent,
                wa: -cross(ra, tangent),
                vb: tangent,
                wb: cross(rb, tangent),
            };
            let kt = bodies[a].inv_mass
                + bodies[b].inv_mass
                + bodies[a].inv_inertia * jt.wa * jt.wa
                + bodies[b].inv_inertia * jt.wb * jt.wb;
            constraint.tangent_points[i] = PointSolver {
                j: jt,
                bias: -contact.surface_speed,
                effective_mass: if kt > 0.0 { 1.0 / kt } else { 0.0 },
                impulse_sum: contact.tangent_impulses[i],
            };

            constraint.position_points[i] = PositionPoint {
                local_anchor_a: inv_rot_a * ra,
                local_anchor_b: inv_rot_b * rb,
                local_normal: inv_rot_a * normal,
                depth: manifold.penetration,
            };
        }

        if manifold.count == 2 && settings.block_solve {
            constraint.block = constraint.build_block_solver(bodies);
        }

        if step.warm_starting {
            // negligible impulses are not worth the velocity kick
            let threshold = settings.warm_starting_threshold;
            for i in 0..constraint.count {
                let np = constraint.normal_points[i];
                if np.impulse_sum * np.impulse_sum > threshold {
                    constraint.apply_impulse(&np.j, np.impulse_sum, bodies);
                }
                let tp = constraint.tangent_points[i];
                if tp.impulse_sum * tp.impulse_sum > threshold {
                    constraint.apply_impulse(&tp.j, tp.impulse_sum, bodies);
                }
            }
        }

        constraint
    }

    /// K = J M^-1 J^T for the two normal rows. A near-singular K (nearly
    /// parallel contact points) disables the block solver for this contact.
    fn build_block_solver(&self, bodies: &[SolverBody]) -> Option<BlockSolver> {
        let (a, b) = (&bodies[self.a], &bodies[self.b]);
        let j1 = &self.normal_points[0].j;
        let j2 = &self.normal_points[1].j;

        let k11 = a.inv_mass
            + b.inv_mass
            + a.inv_inertia * j1.wa * j1.wa
            + b.inv_inertia * j1.wb * j1.wb;
        let k22 = a.inv_mass
            + b.inv_mass
            + a.inv_inertia * j2.wa * j2.wa
            + b.inv_inertia * j2.wb * j2.wb;
        let k12 = a.inv_mass
            + b.inv_mass
            + a.inv_inertia * j1.wa * j2.wa
            + b.inv_inertia * j1.wb * j2.wb;

        // conditioning guard; fall back to Gauss-Seidel when the matrix is
        // close to singular
        const MAX_CONDITION: f64 = 1000.0;
        let det = k11 * k22 - k12 * k12;
        if k11 * k22 >= MAX_CONDITION * det {
            return None;
        }

        let k = Mat2::new(Vec2::new(k11, k12), Vec2::new(k12, k22));
        invert2(k).map(|inv_k| BlockSolver { k, inv_k })
    }

    #[inline]
    fn apply_impulse(&self, j: &Jacobian, lambda: f64, bodies: &mut [SolverBody]) {
        let (ima, iia) = (bodies[self.a].inv_mass, bodies[self.a].inv_inertia);
        let (imb, iib) = (bodies[self.b].inv_mass, bodies[self.b].inv_inertia);
        bodies[self.a].linear += j.va * (ima * lambda);
        bodies[self.a].angular += iia * j.wa * lambda;
        bodies[self.b].linear += j.vb * (imb * lambda);
        bodies[self.b].angular += iib * j.wb * lambda;
    }

    /// One Gauss-Seidel pass: friction rows first, then the normal rows
    /// (together when the block solver is active).
    pub(crate) fn solve_velocity(&mut self, bodies: &mut [SolverBody]) {
        for i in 0..self.count {
            let max_friction = self.friction * self.normal_points[i].impulse_sum;
            let tp = &mut self.tangent_points[i];
            let jv = tp.j.velocity_dot(&bodies[self.a], &bodies[self.b]);
            let lambda = tp.effective_mass * -(jv + tp.bias);

            let old_sum = tp.impulse_sum;
            tp.impulse_sum = (old_sum + lambda).clamp(-max_friction, max_friction);
            let delta = tp.impulse_sum - old_sum;
            let j = tp.j;
            self.apply_impulse(&j, delta, bodies);
        }

        if self.count == 2 {
            if let Some(block) = self.block {
                self.solve_block(&block, bodies);
                return;
            }
        }

        for i in 0..self.count {
            let np = &mut self.normal_points[i];
            let jv = np.j.velocity_dot(&bodies[self.a], &bodies[self.b]);
            let lambda = np.effective_mass * -(jv + np.bias);

            let old_sum = np.impulse_sum;
            np.impulse_sum = (old_sum + lambda).max(0.0);
            let delta = np.impulse_sum - old_sum;
            let j = np.j;
            self.apply_impulse(&j, delta, bodies);
        }
    }

    /// Solve both normal constraints simultaneously.
    ///
    /// The complementarity problem `vn = K x + b, vn >= 0, x >= 0,
    /// vn . x = 0` is solved by total enumeration of its four cases; the
    /// first consistent one wins.
    fn solve_block(&mut self, block: &BlockSolver, bodies: &mut [SolverBody]) {
        let a_old = Vec2::new(
            self.normal_points[0].impulse_sum,
            self.normal_points[1].impulse_sum,
        );
        debug_assert!(a_old.x >= 0.0 && a_old.y >= 0.0);

        let vn1 = self.normal_points[0]
            .j
            .velocity_dot(&bodies[self.a], &bodies[self.b]);
        let vn2 = self.normal_points[1]
            .j
            .velocity_dot(&bodies[self.a], &bodies[self.b]);
        let b = Vec2::new(
            vn1 + self.normal_points[0].bias,
            vn2 + self.normal_points[1].bias,
        ) - block.k * a_old;

        let x;
        loop {
            // case 1: both constraints active
            let x1 = -(block.inv_k * b);
            if x1.x >= 0.0 && x1.y >= 0.0 {
                x = x1;
                break;
            }
            // case 2: only the first active
            let x2 = Vec2::new(self.normal_points[0].effective_mass * -b.x, 0.0);
            if x2.x >= 0.0 && block.k.cols[0].y * x2.x + b.y >= 0.0 {
                x = x2;
                break;
            }
            // case 3: only the second active
            let x3 = Vec2::new(0.0, self.normal_points[1].effective_mass * -b.y);
            if x3.y >= 0.0 && block.k.cols[1].x * x3.y + b.x >= 0.0 {
                x = x3;
                break;
            }
            // case 4: neither active
            if b.x >= 0.0 && b.y >= 0.0 {
                x = Vec2::zero();
                break;
            }
            // numerically inconsistent; keep the accumulated impulses
            x = a_old;
            break;
        }

        let delta = x - a_old;
        let j1 = self.normal_points[0].j;
        let j2 = self.normal_points[1].j;
        self.apply_impulse(&j1, delta.x, bodies);
        self.apply_impulse(&j2, delta.y, bodies);
        self.normal_points[0].impulse_sum = x.x;
        self.normal_points[1].impulse_sum = x.y;
    }

    /// One split-impulse pass over the manifold points, correcting poses
    /// directly. Returns true when every point is within tolerance.
    pub(crate) fn solve_position(
        &mut self,
        bodies: &mut [SolverBody],
        settings: &WorldSettings,
    ) -> bool {
        let mut min_separation: f64 = 0.0;

        for i in 0..self.count {
            let pp = &self.position_points[i];
            let rot_a = Rotor2::from_angle(bodies[self.a].angle);
            let rot_b = Rotor2::from_angle(bodies[self.b].angle);

            let normal = rot_a * pp.local_normal;
            let ra = rot_a * pp.local_anchor_a;
            let rb = rot_b * pp.local_anchor_b;
            let pa = bodies[self.a].center + ra;
            let pb = bodies[self.b].center + rb;

            let separation = (pb - pa).dot(normal) - pp.depth;
            min_separation = min_separation.min(separation);

            let correction = (settings.position_correction_beta
                * (separation + settings.penetration_slop))
                .clamp(-MAX_POSITION_CORRECTION, 0.0);

            let rn_a = cross(ra, normal);
            let rn_b = cross(rb, normal);
            let k = bodies[self.a].inv_mass
                + bodies[self.b].inv_mass
                + bodies[self.a].inv_inertia * rn_a * rn_a
                + bodies[self.b].inv_inertia * rn_b * rn_b;
            if k <= 0.0 {
                continue;
            }
            let lambda = -correction / k;
            let impulse = normal * lambda;

            bodies[self.a].center -= impulse * bodies[self.a].inv_mass;
            bodies[self.a].angle -= bodies[self.a].inv_inertia * cross(ra, impulse);
            bodies[self.b].center += impulse * bodies[self.b].inv_mass;
            bodies[self.b].angle += bodies[self.b].inv_inertia * cross(rb, impulse);
        }

        min_separation >= -3.0 * settings.penetration_slop
    }

    /// Persist accumulated impulses back into the contact for next frame's
    /// warm start.
    pub(crate) fn store_impulses(&self, contact: &mut Contact) {
        for i in 0..self.count {
            contact.normal_impulses[i] = self.normal_points[i].impulse_sum;
            contact.tangent_impulses[i] = self.tangent_points[i].impulse_sum;
        }
    }
}
