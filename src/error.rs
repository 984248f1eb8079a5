// ---------------------------------------------------------------------------
// Error taxonomy for the control core.
// ---------------------------------------------------------------------------

use thiserror::Error;

/// Errors surfaced by the autopilot, docking and tuning components.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FlightError {
    /// Fatal configuration problem (non-positive mass, non-positive dt, bad gains).
    #[error("invalid configuration: {reason}")]
    Configuration {
        /// What was wrong with the configuration.
        reason: String,
    },

    /// Operation rejected without any state change (occupied port, tuner already running).
    #[error("operation rejected: {reason}")]
    Precondition {
        /// Why the operation was rejected.
        reason: String,
    },

    /// Relay auto-tuning did not observe a sustained oscillation within its budget.
    #[error("auto-tuning found no sustained oscillation after {elapsed:.1} s (last Kp {last_kp:.4})")]
    ConvergenceTimeout {
        /// Simulated seconds spent tuning.
        elapsed: f64,
        /// Proportional gain reached when the budget ran out.
        last_kp: f64,
    },
}

impl FlightError {
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::Precondition {
            reason: reason.into(),
        }
    }

    /// Configuration errors are fatal; everything else is recoverable.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition { .. })
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConvergenceTimeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, FlightError>;

/// Reject non-positive or non-finite tick lengths.
pub fn ensure_positive_dt(dt: f64) -> Result<()> {
    if dt > 0.0 && dt.is_finite() {
        Ok(())
    } else {
        Err(FlightError::configuration(format!(
            "tick length must be positive and finite, got {dt}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let err = FlightError::configuration("mass must be positive");
        assert!(err.to_string().contains("mass must be positive"));

        let err = FlightError::ConvergenceTimeout {
            elapsed: 120.0,
            last_kp: 3.2,
        };
        assert!(err.to_string().contains("120.0"));
    }

    #[test]
    fn predicates() {
        assert!(FlightError::configuration("x").is_fatal());
        assert!(!FlightError::precondition("x").is_fatal());
        assert!(FlightError::precondition("x").is_precondition());
        assert!(FlightError::ConvergenceTimeout { elapsed: 1.0, last_kp: 1.0 }.is_timeout());
    }

    #[test]
    fn dt_guard() {
        assert!(ensure_positive_dt(1.0 / 60.0).is_ok());
        assert!(ensure_positive_dt(0.0).unwrap_err().is_fatal());
        assert!(ensure_positive_dt(-0.1).is_err());
        assert!(ensure_positive_dt(f64::NAN).is_err());
    }
}
