use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_positive_dt, FlightError, Result};

// ---------------------------------------------------------------------------
// PID gains
// ---------------------------------------------------------------------------

/// Selects one term of a gain triple for live tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GainTerm {
    Proportional,
    Integral,
    Derivative,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl PidGains {
    pub const fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        if [self.kp, self.ki, self.kd].iter().all(|g| g.is_finite()) {
            Ok(())
        } else {
            Err(FlightError::configuration(format!(
                "{name} gains must be finite, got ({}, {}, {})",
                self.kp, self.ki, self.kd
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// PID Controller (three axes, shared gains)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct VectorPid {
    gains: PidGains,
    integral: Vector3<f64>,
    prev_error: Vector3<f64>,
}

impl VectorPid {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            integral: Vector3::zeros(),
            prev_error: Vector3::zeros(),
        }
    }

    /// `error*Kp + ∫error*Ki + d(error)/dt*Kd`. The tick length must be positive.
    pub fn update(&mut self, error: Vector3<f64>, dt: f64) -> Result<Vector3<f64>> {
        ensure_positive_dt(dt)?;
        self.integral += error * dt;
        let derivative = (error - self.prev_error) / dt;
        self.prev_error = error;
        Ok(error * self.gains.kp + self.integral * self.gains.ki + derivative * self.gains.kd)
    }

    /// Forget accumulated integral and derivative history.
    pub fn reset(&mut self) {
        self.integral = Vector3::zeros();
        self.prev_error = Vector3::zeros();
    }

    pub fn gain(&self, term: GainTerm) -> f64 {
        match term {
            GainTerm::Proportional => self.gains.kp,
            GainTerm::Integral => self.gains.ki,
            GainTerm::Derivative => self.gains.kd,
        }
    }

    pub fn set_gain(&mut self, term: GainTerm, value: f64) {
        match term {
            GainTerm::Proportional => self.gains.kp = value,
            GainTerm::Integral => self.gains.ki = value,
            GainTerm::Derivative => self.gains.kd = value,
        }
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn set_gains(&mut self, gains: PidGains) {
        self.gains = gains;
    }

    pub fn integral(&self) -> Vector3<f64> {
        self.integral
    }
}
