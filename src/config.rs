// ---------------------------------------------------------------------------
// Flight configuration loaded from TOML.
//
// Every table is optional; missing keys fall back to the defaults of the
// corresponding component config.
// ---------------------------------------------------------------------------

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::docking::DockingConfig;
use crate::dynamics::state::SimConfig;
use crate::error::{FlightError, Result};
use crate::gnc::{AutoTuneConfig, AutopilotConfig};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightConfig {
    pub sim: SimConfig,
    pub autopilot: AutopilotConfig,
    pub docking: DockingConfig,
    pub autotune: AutoTuneConfig,
}

impl FlightConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: FlightConfig = toml::from_str(text)
            .map_err(|e| FlightError::configuration(format!("invalid TOML: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            FlightError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| FlightError::configuration(format!("cannot serialise config: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("sim.dt", self.sim.dt), ("sim.max_time", self.sim.max_time)] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(FlightError::configuration(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        self.autopilot.validate()?;
        self.docking.validate()?;
        self.autotune.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        FlightConfig::default().validate().unwrap();
        let parsed = FlightConfig::from_toml_str("").unwrap();
        assert_eq!(parsed, FlightConfig::default());
    }

    #[test]
    fn partial_tables_override_only_named_keys() {
        let cfg = FlightConfig::from_toml_str(
            r#"
            [sim]
            dt = 0.01

            [autopilot]
            autopilot_threshold = 0.02

            [autopilot.momentum_pid]
            kp = 4.0
            ki = 0.0
            kd = 1.5

            [docking]
            approach_standoff = 5.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.sim.dt, 0.01);
        assert_eq!(cfg.sim.max_time, SimConfig::default().max_time);
        assert_eq!(cfg.autopilot.autopilot_threshold, 0.02);
        assert_eq!(cfg.autopilot.momentum_pid.kp, 4.0);
        assert_eq!(cfg.autopilot.momentum_pid.kd, 1.5);
        assert_eq!(cfg.autopilot.orientation_pid, AutopilotConfig::default().orientation_pid);
        assert_eq!(cfg.docking.approach_standoff, 5.0);
        assert_eq!(cfg.autotune, AutoTuneConfig::default());
    }

    #[test]
    fn non_positive_dt_is_a_configuration_error() {
        let err = FlightConfig::from_toml_str("[sim]\ndt = 0.0\n").unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("sim.dt"));
    }

    #[test]
    fn gain_tables_must_be_complete() {
        let err = FlightConfig::from_toml_str("[autopilot.linear_pid]\nkp = 1.0\n").unwrap_err();
        assert!(err.to_string().contains("invalid TOML"));
    }

    #[test]
    fn malformed_toml_is_rejected() {
        let err = FlightConfig::from_toml_str("[sim\ndt = ").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn serialised_config_parses_back() {
        let text = FlightConfig::default().to_toml_string().unwrap();
        assert_eq!(FlightConfig::from_toml_str(&text).unwrap(), FlightConfig::default());
    }

    #[test]
    fn missing_file_is_reported() {
        let err = FlightConfig::load("/nonexistent/flight.toml").unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }
}
