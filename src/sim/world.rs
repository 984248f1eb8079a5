// ---------------------------------------------------------------------------
// Reference physics world: free-flying rigid bodies plus rigid locks.
//
// Locked bodies are integrated as one composite around the lowest-index
// body of their group (the root). Followers keep the pose they had
// relative to the root when the lock was made. The composite turns about
// the root's origin, not the group's centre of mass.
// ---------------------------------------------------------------------------

use nalgebra::{Matrix3, UnitQuaternion, Vector3};
use tracing::debug;

use crate::dynamics::body::{
    BodyHandle, BodySnapshot, Load, LockConstraints, LockHandle, MassProperties,
    RigidBodyControl, RigidBodyView,
};
use crate::dynamics::state::RigidBodyState;
use crate::error::{ensure_positive_dt, FlightError, Result};
use super::integrator::rk4_step;

#[derive(Debug, Clone)]
pub struct RigidBody {
    pub state: RigidBodyState,
    pub props: MassProperties,
    load: Load,
}

impl RigidBody {
    pub fn new(props: MassProperties, state: RigidBodyState) -> Self {
        Self {
            state,
            props,
            load: Load::default(),
        }
    }

    pub fn snapshot(&self) -> BodySnapshot {
        BodySnapshot {
            state: self.state.clone(),
            props: self.props,
        }
    }

    /// Load accumulated since the last step.
    pub fn load(&self) -> &Load {
        &self.load
    }
}

impl RigidBodyView for RigidBody {
    fn position(&self) -> Vector3<f64> {
        self.state.pos
    }
    fn orientation(&self) -> UnitQuaternion<f64> {
        self.state.quat
    }
    fn linear_velocity(&self) -> Vector3<f64> {
        self.state.vel
    }
    fn angular_velocity(&self) -> Vector3<f64> {
        self.state.omega_world()
    }
    fn mass(&self) -> f64 {
        self.props.mass
    }
    fn half_extents(&self) -> Vector3<f64> {
        self.props.half_extents
    }
}

impl RigidBodyControl for RigidBody {
    fn apply_local_force(&mut self, force: Vector3<f64>, local_point: Vector3<f64>) {
        self.load.add_local_force(force, local_point);
    }
}

#[derive(Debug, Clone, Copy)]
struct Lock {
    a: usize,
    b: usize,
}

/// Pose of a follower expressed in its root's body frame.
#[derive(Debug, Clone, Copy)]
struct Attachment {
    root: usize,
    rel_pos: Vector3<f64>,
    rel_rot: UnitQuaternion<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct PhysicsWorld {
    bodies: Vec<RigidBody>,
    locks: Vec<Option<Lock>>,
    attachments: Vec<Option<Attachment>>,
}

impl PhysicsWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_body(&mut self, props: MassProperties, state: RigidBodyState) -> BodyHandle {
        self.bodies.push(RigidBody::new(props, state));
        self.attachments.push(None);
        BodyHandle(self.bodies.len() - 1)
    }

    pub fn body(&self, handle: BodyHandle) -> Result<&RigidBody> {
        self.bodies
            .get(handle.0)
            .ok_or_else(|| FlightError::precondition(format!("unknown body {}", handle.0)))
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> Result<&mut RigidBody> {
        self.bodies
            .get_mut(handle.0)
            .ok_or_else(|| FlightError::precondition(format!("unknown body {}", handle.0)))
    }

    pub fn snapshot(&self, handle: BodyHandle) -> Result<BodySnapshot> {
        self.body(handle).map(RigidBody::snapshot)
    }

    /// Whether two bodies are welded by a direct lock.
    pub fn is_locked(&self, a: BodyHandle, b: BodyHandle) -> bool {
        self.locks.iter().flatten().any(|l| {
            (l.a == a.0 && l.b == b.0) || (l.a == b.0 && l.b == a.0)
        })
    }


    /// Advance every body by `dt`, then clear all accumulated loads.
    pub fn step(&mut self, dt: f64) -> Result<()> {
        ensure_positive_dt(dt)?;

        for i in 0..self.bodies.len() {
            if self.attachments[i].is_some() {
                continue;
            }
            let (props, load) = self.composite(i);
            let next = rk4_step(&self.bodies[i].state, &props, &load, dt);
            self.bodies[i].state = next;
        }
        self.sync_followers();

        for body in &mut self.bodies {
            body.load.clear();
        }
        Ok(())
    }

    /// Mass properties and load of a root together with its followers.
    fn composite(&self, root: usize) -> (MassProperties, Load) {
        let base = &self.bodies[root];
        let mut props = base.props;
        let mut load = base.load;

        for (i, att) in self.attachments.iter().enumerate() {
            let Some(att) = att.filter(|a| a.root == root) else {
                continue;
            };
            let member = &self.bodies[i];
            let r = att.rel_rot.to_rotation_matrix();
            let rm: &Matrix3<f64> = r.matrix();

            // Diagonal of R·diag(I)·Rᵀ plus the parallel-axis shift.
            let d = att.rel_pos;
            for axis in 0..3 {
                let own: f64 = (0..3).map(|k| rm[(axis, k)].powi(2) * member.props.inertia[k]).sum();
                let shift = member.props.mass * (d.norm_squared() - d[axis].powi(2));
                props.inertia[axis] += own + shift;
            }
            props.mass += member.props.mass;

            let f = att.rel_rot * member.load.force;
            load.force += f;
            load.torque += att.rel_rot * member.load.torque + d.cross(&f);
        }
        (props, load)
    }

    fn sync_followers(&mut self) {
        for i in 0..self.bodies.len() {
            let Some(att) = self.attachments[i] else {
                continue;
            };
            let root = self.bodies[att.root].state.clone();
            let offset = root.quat * att.rel_pos;
            let omega_world = root.omega_world();
            let follower = &mut self.bodies[i].state;
            follower.pos = root.pos + offset;
            follower.quat = root.quat * att.rel_rot;
            follower.omega = att.rel_rot.inverse() * root.omega;
            follower.vel = root.vel + omega_world.cross(&offset);
        }
    }

    /// Group label per body: the lowest body index reachable through locks.
    fn group_roots(&self) -> Vec<usize> {
        let mut label: Vec<usize> = (0..self.bodies.len()).collect();
        let mut changed = true;
        while changed {
            changed = false;
            for lock in self.locks.iter().flatten() {
                let m = label[lock.a].min(label[lock.b]);
                if label[lock.a] != m || label[lock.b] != m {
                    label[lock.a] = m;
                    label[lock.b] = m;
                    changed = true;
                }
            }
        }
        label
    }

    fn rebuild_attachments(&mut self) {
        let roots = self.group_roots();
        for (i, &root) in roots.iter().enumerate() {
            self.attachments[i] = if root == i {
                None
            } else {
                let r = &self.bodies[root].state;
                let b = &self.bodies[i].state;
                Some(Attachment {
                    root,
                    rel_pos: r.quat.inverse() * (b.pos - r.pos),
                    rel_rot: r.quat.inverse() * b.quat,
                })
            };
        }
    }

    /// Start a freshly formed group moving together: the root takes the
    /// group's mean linear velocity and an inertia-weighted blend of the
    /// members' angular rates. Only linear momentum is kept exactly.
    fn capture(&mut self, root: usize) {
        let roots = self.group_roots();
        let members: Vec<usize> = (0..self.bodies.len()).filter(|&i| roots[i] == root).collect();

        let mut mass = 0.0;
        let mut momentum = Vector3::zeros();
        let mut weight = 0.0;
        let mut spin = Vector3::zeros();
        for &i in &members {
            let b = &self.bodies[i];
            mass += b.props.mass;
            momentum += b.state.vel * b.props.mass;
            let w = b.props.max_principal();
            weight += w;
            spin += b.state.omega_world() * w;
        }

        let root_body = &mut self.bodies[root];
        root_body.state.vel = momentum / mass;
        let omega_world = spin / weight;
        root_body.state.omega = root_body.state.quat.inverse() * omega_world;
        self.sync_followers();
    }
}

impl LockConstraints for PhysicsWorld {
    fn create_lock(&mut self, a: BodyHandle, b: BodyHandle) -> Result<LockHandle> {
        self.body(a)?;
        self.body(b)?;
        if a == b {
            return Err(FlightError::precondition("cannot lock a body to itself"));
        }
        if self.is_locked(a, b) {
            return Err(FlightError::precondition(format!(
                "bodies {} and {} are already locked",
                a.0, b.0
            )));
        }

        self.locks.push(Some(Lock { a: a.0, b: b.0 }));
        self.rebuild_attachments();
        let root = self.group_roots()[a.0];
        self.capture(root);
        debug!(a = a.0, b = b.0, root, "lock created");
        Ok(LockHandle(self.locks.len() - 1))
    }

    fn remove_lock(&mut self, lock: LockHandle) -> Result<()> {
        match self.locks.get_mut(lock.0) {
            Some(slot @ Some(_)) => {
                *slot = None;
                self.rebuild_attachments();
                debug!(lock = lock.0, "lock removed");
                Ok(())
            }
            _ => Err(FlightError::precondition(format!("unknown lock {}", lock.0))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn props() -> MassProperties {
        MassProperties::solid_box(1.0, Vector3::new(0.5, 0.5, 1.0)).unwrap()
    }

    fn still(z: f64) -> RigidBodyState {
        RigidBodyState::at_rest(Vector3::new(0.0, 0.0, z), UnitQuaternion::identity())
    }

    #[test]
    fn non_positive_dt_is_rejected() {
        let mut world = PhysicsWorld::new();
        world.add_body(props(), still(0.0));
        assert!(world.step(0.0).unwrap_err().is_fatal());
    }

    #[test]
    fn loads_are_cleared_after_step() {
        let mut world = PhysicsWorld::new();
        let h = world.add_body(props(), still(0.0));
        world
            .body_mut(h)
            .unwrap()
            .apply_local_force(Vector3::new(1.0, 0.0, 0.0), Vector3::zeros());
        world.step(1.0 / 60.0).unwrap();
        assert_eq!(*world.body(h).unwrap().load(), Load::default());
        assert!(world.body(h).unwrap().state.vel.x > 0.0);
    }

    #[test]
    fn lock_shares_linear_momentum_and_moves_bodies_together() {
        let mut world = PhysicsWorld::new();
        let a = world.add_body(props(), still(0.0));
        let b = world.add_body(props(), still(2.0));
        world.body_mut(a).unwrap().state.vel = Vector3::new(0.0, 0.0, 0.4);

        let lock = world.create_lock(a, b).unwrap();
        assert!(world.is_locked(a, b));
        assert_relative_eq!(world.body(a).unwrap().state.vel.z, 0.2, epsilon = 1e-12);
        assert_relative_eq!(world.body(b).unwrap().state.vel.z, 0.2, epsilon = 1e-12);

        // Push only the follower: the pair still moves as one.
        world
            .body_mut(b)
            .unwrap()
            .apply_local_force(Vector3::new(1.0, 0.0, 0.0), Vector3::zeros());
        for _ in 0..60 {
            world.step(1.0 / 60.0).unwrap();
        }
        let pa = world.body(a).unwrap().state.pos;
        let pb = world.body(b).unwrap().state.pos;
        assert_relative_eq!((pb - pa).norm(), 2.0, epsilon = 1e-9);

        world.remove_lock(lock).unwrap();
        assert!(!world.is_locked(a, b));
        assert!(world.remove_lock(lock).unwrap_err().is_precondition());
    }

    #[test]
    fn duplicate_or_self_lock_is_rejected() {
        let mut world = PhysicsWorld::new();
        let a = world.add_body(props(), still(0.0));
        let b = world.add_body(props(), still(2.0));
        assert!(world.create_lock(a, a).is_err());
        let lock = world.create_lock(a, b).unwrap();
        assert!(world.create_lock(b, a).unwrap_err().is_precondition());
        assert!(world.create_lock(a, BodyHandle(9)).is_err());
        assert!(world.is_locked(a, b));
        world.remove_lock(lock).unwrap();
        assert!(!world.is_locked(a, b));
    }
}
