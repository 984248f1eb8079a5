use nalgebra::Quaternion;

use super::body::{Load, MassProperties};
use super::state::{Deriv, RigidBodyState};

// ---------------------------------------------------------------------------
// 6DOF Equations of motion (free flight, no gravity)
// ---------------------------------------------------------------------------

/// Compute rigid-body state derivatives under a load held constant over the step.
///
/// Forces & moments come only from the accumulated thruster load:
///   1. Force (body frame → world) drives translation
///   2. Torque (body frame) drives rotation through Euler's equation
pub fn derivatives(state: &RigidBodyState, props: &MassProperties, load: &Load) -> Deriv {
    let accel = (state.quat * load.force) / props.mass;

    // --- Euler's equation: I * domega = torque - omega × (I * omega) ---
    let i_vec = props.inertia;
    let i_omega = i_vec.component_mul(&state.omega);
    let gyro = state.omega.cross(&i_omega);
    let domega = (load.torque - gyro).component_div(&i_vec);

    // --- Quaternion kinematics: dq/dt = 0.5 * q * omega_quat ---
    let omega_quat = Quaternion::new(0.0, state.omega.x, state.omega.y, state.omega.z);
    let dquat = state.quat.quaternion() * omega_quat * 0.5;

    Deriv {
        dpos: state.vel,
        dvel: accel,
        dquat,
        domega,
    }
}

/// Energy of the body, used to sanity-check integration.
#[cfg(test)]
pub(crate) fn kinetic_energy(state: &RigidBodyState, props: &MassProperties) -> f64 {
    let linear = 0.5 * props.mass * state.vel.norm_squared();
    let angular = 0.5 * state.omega.dot(&props.inertia.component_mul(&state.omega));
    linear + angular
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
