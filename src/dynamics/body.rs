// ---------------------------------------------------------------------------
// Narrow rigid-body interfaces the control core depends on.
//
// The autopilot never touches a physics engine directly: it reads a
// RigidBodyView each tick and writes thruster loads through
// RigidBodyControl. Docking additionally needs LockConstraints
// to weld two bodies together.
// ---------------------------------------------------------------------------

use nalgebra::{UnitQuaternion, Vector3};

use crate::error::{FlightError, Result};
use super::state::RigidBodyState;

/// Opaque handle to a body owned by a physics engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub usize);

/// Opaque handle to a rigid lock between two bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockHandle(pub usize);

/// Read-only snapshot access to a rigid body.
pub trait RigidBodyView {
    fn position(&self) -> Vector3<f64>;
    fn orientation(&self) -> UnitQuaternion<f64>;
    fn linear_velocity(&self) -> Vector3<f64>;
    /// World-frame angular velocity, rad/s per axis.
    fn angular_velocity(&self) -> Vector3<f64>;
    fn mass(&self) -> f64;
    fn half_extents(&self) -> Vector3<f64>;
}

/// Write access: point forces expressed in the body frame.
pub trait RigidBodyControl: RigidBodyView {
    fn apply_local_force(&mut self, force: Vector3<f64>, local_point: Vector3<f64>);
}

/// Physics-engine support for welding bodies together.
pub trait LockConstraints {
    fn create_lock(&mut self, a: BodyHandle, b: BodyHandle) -> Result<LockHandle>;
    fn remove_lock(&mut self, lock: LockHandle) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Mass properties (solid box)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassProperties {
    pub mass: f64,                  // kg
    pub half_extents: Vector3<f64>, // m
    pub inertia: Vector3<f64>,      // [Ixx, Iyy, Izz] principal moments, kg·m^2
}

impl MassProperties {
    /// Solid rectangular prism: I_x = m/3 (h_y² + h_z²), etc.
    pub fn solid_box(mass: f64, half_extents: Vector3<f64>) -> Result<Self> {
        if !(mass > 0.0 && mass.is_finite()) {
            return Err(FlightError::configuration(format!(
                "mass must be positive and finite, got {mass}"
            )));
        }
        if half_extents.iter().any(|h| !(*h > 0.0 && h.is_finite())) {
            return Err(FlightError::configuration(format!(
                "half extents must be positive, got [{}, {}, {}]",
                half_extents.x, half_extents.y, half_extents.z
            )));
        }
        let h2 = half_extents.component_mul(&half_extents);
        let k = mass / 3.0;
        Ok(Self {
            mass,
            half_extents,
            inertia: Vector3::new(k * (h2.y + h2.z), k * (h2.x + h2.z), k * (h2.x + h2.y)),
        })
    }

    /// Conservative scalar inertia: the largest principal moment.
    pub fn max_principal(&self) -> f64 {
        self.inertia.max()
    }
}

/// Scalar moment of inertia used by the autopilot (max principal axis of a solid box).
pub fn moment_of_inertia(mass: f64, half_extents: &Vector3<f64>) -> Result<f64> {
    MassProperties::solid_box(mass, *half_extents).map(|p| p.max_principal())
}

// ---------------------------------------------------------------------------
// Accumulated load (body frame)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Load {
    pub force: Vector3<f64>,  // N, body frame
    pub torque: Vector3<f64>, // N·m, body frame, about the centre of mass
}

impl Load {
    pub fn add_local_force(&mut self, force: Vector3<f64>, local_point: Vector3<f64>) {
        self.force += force;
        self.torque += local_point.cross(&force);
    }

    pub fn clear(&mut self) {
        *self = Load::default();
    }
}

// ---------------------------------------------------------------------------
// Owned snapshot
// ---------------------------------------------------------------------------

/// A copy of a body's state taken once per tick.
#[derive(Debug, Clone, PartialEq)]
pub struct BodySnapshot {
    pub state: RigidBodyState,
    pub props: MassProperties,
}

impl RigidBodyView for BodySnapshot {
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

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn box_inertia_matches_formula() {
        let p = MassProperties::solid_box(3.0, Vector3::new(1.0, 2.0, 3.0)).unwrap();
        assert_relative_eq!(p.inertia.x, 1.0 * (4.0 + 9.0));
        assert_relative_eq!(p.inertia.y, 1.0 * (1.0 + 9.0));
        assert_relative_eq!(p.inertia.z, 1.0 * (1.0 + 4.0));
        assert_relative_eq!(p.max_principal(), 13.0);
    }

    #[test]
    fn zero_or_negative_mass_is_configuration_error() {
        let h = Vector3::new(0.5, 0.5, 1.0);
        assert!(moment_of_inertia(0.0, &h).unwrap_err().is_fatal());
        assert!(moment_of_inertia(-1.0, &h).unwrap_err().is_fatal());
        assert!(moment_of_inertia(f64::NAN, &h).is_err());
        assert!(moment_of_inertia(1.0, &Vector3::new(0.5, 0.0, 1.0)).is_err());
    }

    #[test]
    fn local_force_off_centre_adds_torque() {
        let mut load = Load::default();
        load.add_local_force(Vector3::new(0.0, 0.0, 1.0), Vector3::new(0.0, 1.0, 0.0));
        assert_relative_eq!(load.torque, Vector3::new(1.0, 0.0, 0.0));
        load.clear();
        assert_eq!(load, Load::default());
    }
}
