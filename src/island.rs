//! Island assembly and the per-island solve.
//!
//! Bodies connected through touching contacts or joints form an island;
//! each island integrates, solves and sleeps independently. Body state is
//! copied into island-local buffers for the solver's duration, which also
//! serve as the transient scratch space the solve needs (the buffers
//! persist across steps and are reused without reallocation).

use itertools::izip;

use crate::body::BodyType;
use crate::contact_solver::{ContactConstraint, SolverBody};
use crate::settings::TimeStep;
use crate::world::{BodyKey, ContactKey, JointKey, World};

#[derive(Clone, Copy, Debug)]
struct Island {
    body_start: usize,
    body_count: usize,
    contact_start: usize,
    contact_count: usize,
    joint_start: usize,
    joint_count: usize,
}

/// Scratch space reused every step.
#[derive(Default)]
pub(crate) struct WorkingBuffers {
    stack: Vec<BodyKey>,
    bodies: Vec<BodyKey>,
    contacts: Vec<ContactKey>,
    joints: Vec<JointKey>,
    islands: Vec<Island>,
    solver_bodies: Vec<SolverBody>,
    contact_constraints: Vec<ContactConstraint>,
}

impl World {
    /// Flood-fill islands from awake dynamic bodies, then solve each one.
    pub(crate) fn solve_islands(&mut self, step: &TimeStep) {
        let _span = tracy_span!("solve islands", "solve_islands");

        let mut bufs = std::mem::take(&mut self.bufs);
        bufs.bodies.clear();
        bufs.contacts.clear();
        bufs.joints.clear();
        bufs.islands.clear();

        for (_, body) in self.bodies.iter_mut() {
            body.island = false;
        }
        for (_, contact) in self.contacts.iter_mut() {
            contact.island = false;
        }
        for (_, joint) in self.joints.iter_mut() {
            joint.island = false;
        }

        let seeds: Vec<BodyKey> = self.bodies.keys().collect();
        for seed in seeds {
            {
                let body = &self.bodies[seed];
                if body.island || !body.awake || body.body_type == BodyType::Static {
                    continue;
                }
            }

            let mut island = Island {
                body_start: bufs.bodies.len(),
                body_count: 0,
                contact_start: bufs.contacts.len(),
                contact_count: 0,
                joint_start: bufs.joints.len(),
                joint_count: 0,
            };

            bufs.stack.clear();
            bufs.stack.push(seed);
            self.bodies[seed].island = true;

            while let Some(body_key) = bufs.stack.pop() {
                bufs.bodies.push(body_key);
                island.body_count += 1;

                // static bodies join the island but do not grow it
                if self.bodies[body_key].body_type == BodyType::Static {
                    continue;
                }

                let contact_count = self.bodies[body_key].contacts.len();
                for i in 0..contact_count {
                    let contact_key = self.bodies[body_key].contacts[i];
                    let (touching, in_island, body_a, body_b) = {
                        let contact = &self.contacts[contact_key];
                        (
                            contact.touching,
                            contact.island,
                            contact.body_a,
                            contact.body_b,
                        )
                    };
                    if !touching || in_island {
                        continue;
                    }
                    self.contacts[contact_key].island = true;
                    bufs.contacts.push(contact_key);
                    island.contact_count += 1;

                    let other = if body_a == body_key { body_b } else { body_a };
                    if !self.bodies[other].island {
                        self.bodies[other].island = true;
                        bufs.stack.push(other);
                    }
                }

                let joint_count = self.bodies[body_key].joints.len();
                for i in 0..joint_count {
                    let joint_key = self.bodies[body_key].joints[i];
                    let (in_island, body_a, body_b) = {
                        let joint = &self.joints[joint_key];
                        (joint.island, joint.body_a, joint.body_b)
                    };
                    if in_island {
                        continue;
                    }
                    self.joints[joint_key].island = true;
                    bufs.joints.push(joint_key);
                    island.joint_count += 1;

                    let other = match body_b {
                        Some(b) if b != body_key => Some(b),
                        Some(_) => Some(body_a),
                        None => None,
                    };
                    if let Some(other) = other {
                        if other != body_key && !self.bodies[other].island {
                            self.bodies[other].island = true;
                            bufs.stack.push(other);
                        }
                    }
                }
            }

            // static bodies may take part in many islands
            for &bk in &bufs.bodies[island.body_start..island.body_start + island.body_count] {
                if self.bodies[bk].body_type == BodyType::Static {
                    self.bodies[bk].island = false;
                }
            }

            bufs.islands.push(island);
        }

        self.island_count = bufs.islands.len();

        let islands = std::mem::take(&mut bufs.islands);
        for island in &islands {
            self.solve_island(island, &mut bufs, step);
        }
        bufs.islands = islands;

        self.bufs = bufs;
    }

    fn solve_island(&mut self, island: &Island, bufs: &mut WorkingBuffers, step: &TimeStep) {
        let body_keys = &bufs.bodies[island.body_start..island.body_start + island.body_count];
        let contact_keys =
            &bufs.contacts[island.contact_start..island.contact_start + island.contact_count];
        let joint_keys = &bufs.joints[island.joint_start..island.joint_start + island.joint_count];

        //
        // copy body state into the solver buffers
        //

        bufs.solver_bodies.clear();
        for (i, &bk) in body_keys.iter().enumerate() {
            let body = &mut self.bodies[bk];
            body.solver_index = i;
            bufs.solver_bodies.push(SolverBody {
                center: body.world_center(),
                angle: body.angle,
                linear: body.velocity.linear,
                angular: body.velocity.angular,
                inv_mass: if body.is_dynamic() { body.inv_mass() } else { 0.0 },
                inv_inertia: if body.is_dynamic() {
                    body.inv_inertia()
                } else {
                    0.0
                },
                local_center: body.local_center,
            });
        }

        //
        // integrate forces into tentative velocities
        //

        let gravity = if self.settings.apply_gravity {
            self.settings.gravity
        } else {
            crate::math::Vec2::zero()
        };
        for (sb, &bk) in izip!(bufs.solver_bodies.iter_mut(), body_keys) {
            let body = &self.bodies[bk];
            if !body.is_dynamic() {
                continue;
            }
            sb.linear += (gravity + body.force * sb.inv_mass) * step.dt;
            sb.angular += body.torque * sb.inv_inertia * step.dt;
            sb.linear *= 1.0 / (1.0 + step.dt * body.linear_damping);
            sb.angular *= 1.0 / (1.0 + step.dt * body.angular_damping);
        }

        //
        // prepare constraints (applies warm-start impulses)
        //

        bufs.contact_constraints.clear();
        for &ck in contact_keys {
            let contact = &self.contacts[ck];
            let (first, second) = if contact.manifold.feature_flipped {
                (contact.body_b, contact.body_a)
            } else {
                (contact.body_a, contact.body_b)
            };
            let a = self.bodies[first].solver_index;
            let b = self.bodies[second].solver_index;
            bufs.contact_constraints.push(ContactConstraint::prepare(
                contact,
                ck,
                a,
                b,
                &mut bufs.solver_bodies,
                &self.settings,
                step,
            ));
        }

        for &jk in joint_keys {
            let joint = &mut self.joints[jk];
            joint.slot_a = self.bodies[joint.body_a].solver_index;
            joint.slot_b = joint
                .body_b
                .map(|b| self.bodies[b].solver_index)
                .unwrap_or(joint.slot_a);
            joint.prepare(&mut bufs.solver_bodies, step);
        }

        //
        // velocity iterations
        //

        for _ in 0..step.velocity_iterations {
            for &jk in joint_keys {
                self.joints[jk].solve_velocity(&mut bufs.solver_bodies, step);
            }
            for constraint in bufs.contact_constraints.iter_mut() {
                constraint.solve_velocity(&mut bufs.solver_bodies);
            }
        }

        for constraint in bufs.contact_constraints.iter() {
            constraint.store_impulses(&mut self.contacts[constraint.contact]);
        }

        //
        // integrate positions
        //

        for sb in bufs.solver_bodies.iter_mut() {
            sb.center += sb.linear * step.dt;
            sb.angle += sb.angular * step.dt;
        }

        //
        // position corrections
        //

        if self.settings.position_correction {
            for _ in 0..step.position_iterations {
                let mut solved = true;
                for constraint in bufs.contact_constraints.iter_mut() {
                    solved &= constraint.solve_position(&mut bufs.solver_bodies, &self.settings);
                }
                if solved {
                    break;
                }
            }
        }

        //
        // sleep bookkeeping and write-back
        //

        let settings = &self.settings;
        let lin_tol_sq = settings.sleep_linear_tol * settings.sleep_linear_tol;
        let mut island_can_sleep = settings.sleeping;
        for (sb, &bk) in izip!(bufs.solver_bodies.iter(), body_keys) {
            let body = &mut self.bodies[bk];
            if body.is_static() {
                continue;
            }
            if sb.linear.mag_sq() > lin_tol_sq || sb.angular.abs() > settings.sleep_angular_tol {
                body.resting = 0.0;
            } else {
                body.resting += step.dt;
            }
            if body.resting < settings.sleep_time_threshold {
                island_can_sleep = false;
            }
        }

        for (sb, &bk) in izip!(bufs.solver_bodies.iter(), body_keys) {
            let body = &mut self.bodies[bk];
            if body.is_static() {
                continue;
            }
            body.set_center_and_angle(sb.center, sb.angle);
            body.force = crate::math::Vec2::zero();
            body.torque = 0.0;
            if island_can_sleep {
                body.sleep();
            } else {
                body.velocity.linear = sb.linear;
                body.velocity.angular = sb.angular;
                body.awake = true;
            }
        }
    }
}
