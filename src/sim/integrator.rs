use nalgebra::UnitQuaternion;

use crate::dynamics::body::{Load, MassProperties};
use crate::dynamics::sixdof;
use crate::dynamics::state::RigidBodyState;

// ---------------------------------------------------------------------------
// 6DOF RK4 integrator with constant load over the step
// ---------------------------------------------------------------------------

/// Single RK4 step with the thruster load held constant over the step.
pub fn rk4_step(
    state: &RigidBodyState,
    props: &MassProperties,
    load: &Load,
    dt: f64,
) -> RigidBodyState {
    let k1 = sixdof::derivatives(state, props, load);
    let k2 = sixdof::derivatives(&state.apply(&k1, dt * 0.5), props, load);
    let k3 = sixdof::derivatives(&state.apply(&k2, dt * 0.5), props, load);
    let k4 = sixdof::derivatives(&state.apply(&k3, dt), props, load);

    let new_quat_raw = state.quat.quaternion()
        + (k1.dquat + k2.dquat * 2.0 + k3.dquat * 2.0 + k4.dquat) * (dt / 6.0);

    RigidBodyState {
        pos: state.pos + (k1.dpos + 2.0 * k2.dpos + 2.0 * k3.dpos + k4.dpos) * (dt / 6.0),
        vel: state.vel + (k1.dvel + 2.0 * k2.dvel + 2.0 * k3.dvel + k4.dvel) * (dt / 6.0),
        quat: UnitQuaternion::new_normalize(new_quat_raw),
        omega: state.omega
            + (k1.domega + 2.0 * k2.domega + 2.0 * k3.domega + k4.domega) * (dt / 6.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn free_spin_keeps_unit_quaternion_and_energy() {
        let props = MassProperties::solid_box(1.0, Vector3::new(0.5, 0.5, 1.0)).unwrap();
        let mut s = RigidBodyState::at_rest(Vector3::zeros(), UnitQuaternion::identity());
        s.omega = Vector3::new(0.3, 0.8, -0.2);
        let e0 = sixdof::kinetic_energy(&s, &props);
        for _ in 0..600 {
            s = rk4_step(&s, &props, &Load::default(), 1.0 / 60.0);
        }
        let norm = s.quat.quaternion().norm();
        assert!((norm - 1.0).abs() < 1e-9, "Quaternion norm drifted to {}", norm);
        let e1 = sixdof::kinetic_energy(&s, &props);
        assert!((e1 - e0).abs() / e0 < 1e-4, "energy drift {} → {}", e0, e1);
    }

    #[test]
    fn constant_force_gives_uniform_acceleration() {
        let props = MassProperties::solid_box(2.0, Vector3::new(0.5, 0.5, 1.0)).unwrap();
        let s = RigidBodyState::at_rest(Vector3::zeros(), UnitQuaternion::identity());
        let load = Load {
            force: Vector3::new(4.0, 0.0, 0.0),
            torque: Vector3::zeros(),
        };
        let next = rk4_step(&s, &props, &load, 0.5);
        // x = a t² / 2 with a = 2 m/s²
        assert!((next.pos.x - 0.25).abs() < 1e-12);
        assert!((next.vel.x - 1.0).abs() < 1e-12);
    }
}
