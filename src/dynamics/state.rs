use nalgebra::{Quaternion, UnitQuaternion, Vector3};

// ---------------------------------------------------------------------------
// Frame conventions
// ---------------------------------------------------------------------------
//
// Body frame: +x right, +y up, -z forward (nose). World frame: +y up.

/// World-up reference used when constructing orientation bases.
pub fn world_up() -> Vector3<f64> {
    Vector3::y()
}

/// Body-frame forward axis.
pub fn body_forward() -> Vector3<f64> {
    -Vector3::z()
}

// ---------------------------------------------------------------------------
// Rigid-body state: position, velocity, attitude, angular rate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RigidBodyState {
    pub pos: Vector3<f64>,              // m, world
    pub vel: Vector3<f64>,              // m/s, world
    pub quat: UnitQuaternion<f64>,      // body→world rotation
    pub omega: Vector3<f64>,            // rad/s, body frame angular velocity
}

impl RigidBodyState {
    pub fn at_rest(pos: Vector3<f64>, quat: UnitQuaternion<f64>) -> Self {
        Self {
            pos,
            vel: Vector3::zeros(),
            quat,
            omega: Vector3::zeros(),
        }
    }

    pub fn apply(&self, d: &Deriv, dt: f64) -> RigidBodyState {
        // Quaternion integration: q_new = normalize(q + dq * dt)
        let q_raw = self.quat.quaternion() + d.dquat * dt;
        RigidBodyState {
            pos: self.pos + d.dpos * dt,
            vel: self.vel + d.dvel * dt,
            quat: UnitQuaternion::new_normalize(q_raw),
            omega: self.omega + d.domega * dt,
        }
    }

    /// Angular velocity expressed in the world frame.
    pub fn omega_world(&self) -> Vector3<f64> {
        self.quat * self.omega
    }

    /// Nose direction in the world frame.
    pub fn forward(&self) -> Vector3<f64> {
        self.quat * body_forward()
    }

    pub fn up(&self) -> Vector3<f64> {
        self.quat * Vector3::y()
    }

    /// Velocity of a body-fixed point given in local coordinates.
    pub fn point_velocity(&self, local_point: &Vector3<f64>) -> Vector3<f64> {
        self.vel + self.omega_world().cross(&(self.quat * local_point))
    }
}

// ---------------------------------------------------------------------------
// State derivative
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Deriv {
    pub dpos: Vector3<f64>,
    pub dvel: Vector3<f64>,
    pub dquat: Quaternion<f64>,   // raw derivative, not unit
    pub domega: Vector3<f64>,     // angular acceleration, body frame
}

// ---------------------------------------------------------------------------
// Simulation config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub dt: f64,
    pub max_time: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            dt: 1.0 / 60.0,   // 60 Hz control tick
            max_time: 120.0,
        }
    }
}
