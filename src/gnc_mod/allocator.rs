use nalgebra::Vector3;

use crate::error::{FlightError, Result};
use crate::vehicle::rcs::{ThrusterGroup, THRUSTER_COUNT};

// ---------------------------------------------------------------------------
// Thruster command: one force magnitude per thruster index
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrusterCommand {
    pub forces: [f64; THRUSTER_COUNT],
}

impl Default for ThrusterCommand {
    fn default() -> Self {
        Self::idle()
    }
}

impl ThrusterCommand {
    pub const fn idle() -> Self {
        Self {
            forces: [0.0; THRUSTER_COUNT],
        }
    }

    /// Elementwise sum, unclamped.
    pub fn combine(&self, other: &ThrusterCommand) -> ThrusterCommand {
        let mut forces = self.forces;
        for (f, o) in forces.iter_mut().zip(other.forces) {
            *f += o;
        }
        ThrusterCommand { forces }
    }

    /// Every element forced into `[0, max_thrust]`; NaN becomes 0.
    pub fn clamped(&self, max_thrust: f64) -> ThrusterCommand {
        ThrusterCommand {
            forces: self.forces.map(|f| sanitize(f, max_thrust)),
        }
    }

    /// Which thrusters are firing, for plume visuals.
    pub fn visibility(&self) -> [bool; THRUSTER_COUNT] {
        self.forces.map(|f| f > 0.0)
    }

    pub fn is_idle(&self) -> bool {
        self.forces.iter().all(|&f| f == 0.0)
    }

    pub fn total(&self) -> f64 {
        self.forces.iter().sum()
    }
}

/// Receives one force magnitude per thruster per tick.
pub trait ThrusterSink {
    fn set_thruster_force(&mut self, index: usize, magnitude: f64);
}

impl ThrusterSink for [f64; THRUSTER_COUNT] {
    fn set_thruster_force(&mut self, index: usize, magnitude: f64) {
        self[index] = magnitude;
    }
}

fn sanitize(force: f64, max_thrust: f64) -> f64 {
    if force.is_nan() {
        0.0
    } else {
        force.clamp(0.0, max_thrust)
    }
}

/// Magnitude each thruster in a group of `group_len` must produce for a
/// commanded axis component, clamped to `[0, max_thrust]`.
pub fn calculate_force_per_thruster(component: f64, group_len: usize, max_thrust: f64) -> f64 {
    if group_len == 0 {
        return 0.0;
    }
    sanitize(component.abs() / group_len as f64, max_thrust)
}

// ---------------------------------------------------------------------------
// Manual (keyboard-style) input
// ---------------------------------------------------------------------------

/// Per-axis pilot commands in `[-1, 1]`, body frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ManualInput {
    /// Pitch, yaw, roll.
    pub rotation: Vector3<f64>,
    /// Right, up, back.
    pub translation: Vector3<f64>,
}

impl ManualInput {
    pub fn is_neutral(&self) -> bool {
        self.rotation == Vector3::zeros() && self.translation == Vector3::zeros()
    }
}

// ---------------------------------------------------------------------------
// Allocator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrusterAllocator {
    max_thrust: f64,
}

impl ThrusterAllocator {
    pub fn new(max_thrust: f64) -> Result<Self> {
        if !(max_thrust > 0.0 && max_thrust.is_finite()) {
            return Err(FlightError::configuration(format!(
                "max thrust must be positive, got {max_thrust}"
            )));
        }
        Ok(Self { max_thrust })
    }

    pub fn max_thrust(&self) -> f64 {
        self.max_thrust
    }

    /// Spread a body-frame `{pitch, yaw, roll}` command over the rotation groups.
    pub fn allocate(&self, control: &Vector3<f64>) -> ThrusterCommand {
        self.spread(control, ThrusterGroup::rotation_pair)
    }

    /// Spread a body-frame force command over the translation groups.
    pub fn allocate_translation(&self, force: &Vector3<f64>) -> ThrusterCommand {
        self.spread(force, ThrusterGroup::translation_pair)
    }

    fn spread(
        &self,
        control: &Vector3<f64>,
        pair: fn(usize) -> (ThrusterGroup, ThrusterGroup),
    ) -> ThrusterCommand {
        let mut cmd = ThrusterCommand::idle();
        for axis in 0..3 {
            let c = control[axis];
            let (positive, negative) = pair(axis);
            let group = if c >= 0.0 { positive } else { negative };
            let indices = group.indices();
            let f = calculate_force_per_thruster(c, indices.len(), self.max_thrust);
            for &i in indices {
                cmd.forces[i] += f;
            }
        }
        cmd.clamped(self.max_thrust)
    }

    /// Full-scale firing of the groups a pilot command selects.
    pub fn manual(&self, input: &ManualInput) -> ThrusterCommand {
        let mut cmd = ThrusterCommand::idle();
        for axis in 0..3 {
            for (value, pair) in [
                (input.rotation[axis], ThrusterGroup::rotation_pair(axis)),
                (input.translation[axis], ThrusterGroup::translation_pair(axis)),
            ] {
                let value = if value.is_nan() { 0.0 } else { value.clamp(-1.0, 1.0) };
                if value == 0.0 {
                    continue;
                }
                let group = if value > 0.0 { pair.0 } else { pair.1 };
                for &i in group.indices() {
                    cmd.forces[i] += value.abs() * self.max_thrust;
                }
            }
        }
        cmd.clamped(self.max_thrust)
    }

    /// Sum autopilot and manual commands and clamp. An inactive craft never fires.
    pub fn finalize(
        &self,
        autopilot: &ThrusterCommand,
        manual: &ThrusterCommand,
        active: bool,
    ) -> ThrusterCommand {
        if !active {
            return ThrusterCommand::idle();
        }
        autopilot.combine(manual).clamped(self.max_thrust)
    }

    /// Push a command to the sink, one call per thruster.
    pub fn dispatch(&self, cmd: &ThrusterCommand, sink: &mut dyn ThrusterSink) {
        for (i, &f) in cmd.forces.iter().enumerate() {
            sink.set_thruster_force(i, sanitize(f, self.max_thrust));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator() -> ThrusterAllocator {
        ThrusterAllocator::new(1.0).unwrap()
    }

    fn in_range(cmd: &ThrusterCommand, max: f64) -> bool {
        cmd.forces.iter().all(|&f| (0.0..=max).contains(&f))
    }

    #[test]
    fn zero_component_gives_zero_force() {
        assert_eq!(calculate_force_per_thruster(0.0, 4, 1.0), 0.0);
        assert_eq!(calculate_force_per_thruster(-0.0, 4, 1.0), 0.0);
        let cmd = allocator().allocate(&Vector3::new(0.0, 0.4, 0.0));
        for &i in ThrusterGroup::PitchPositive.indices() {
            assert_eq!(cmd.forces[i], 0.0);
        }
        for &i in ThrusterGroup::PitchNegative.indices() {
            assert_eq!(cmd.forces[i], 0.0);
        }
    }

    #[test]
    fn command_is_split_evenly_across_group() {
        let cmd = allocator().allocate(&Vector3::new(0.0, -0.8, 0.0));
        for &i in ThrusterGroup::YawNegative.indices() {
            assert!((cmd.forces[i] - 0.2).abs() < 1e-12);
        }
        assert!((cmd.total() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn extreme_inputs_stay_clamped() {
        let a = allocator();
        for v in [1e9, -1e9, f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let control = Vector3::new(v, -v, v);
            assert!(in_range(&a.allocate(&control), 1.0), "rotation {v}");
            assert!(in_range(&a.allocate_translation(&control), 1.0), "translation {v}");
        }
        let saturated = a.allocate(&Vector3::new(1e9, 0.0, 0.0));
        for &i in ThrusterGroup::PitchPositive.indices() {
            assert_eq!(saturated.forces[i], 1.0);
        }
    }

    #[test]
    fn manual_and_autopilot_are_additive_then_clamped() {
        let a = allocator();
        let auto = a.allocate(&Vector3::new(0.0, 0.0, 2.0));
        let manual = a.manual(&ManualInput {
            rotation: Vector3::new(0.0, 0.0, 1.0),
            translation: Vector3::zeros(),
        });
        let combined = a.finalize(&auto, &manual, true);
        for &i in ThrusterGroup::RollPositive.indices() {
            assert_eq!(combined.forces[i], 1.0);
        }
        assert!(in_range(&combined, 1.0));

        let small = a.allocate(&Vector3::new(0.0, 0.0, 0.8));
        let half = a.manual(&ManualInput {
            rotation: Vector3::zeros(),
            translation: Vector3::new(0.5, 0.0, 0.0),
        });
        let sum = a.finalize(&small, &half, true);
        // Roll+ (4, 7, 16, 19) and Right (0, 6, 12, 18) share no thrusters.
        assert!((sum.forces[4] - 0.2).abs() < 1e-12);
        assert!((sum.forces[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn inactive_craft_fires_nothing() {
        let a = allocator();
        let cmd = a.allocate(&Vector3::new(3.0, -2.0, 1.0));
        let out = a.finalize(&cmd, &cmd, false);
        assert!(out.is_idle());
        assert!(out.visibility().iter().all(|v| !v));
    }

    #[test]
    fn dispatch_writes_every_index() {
        let a = allocator();
        let mut sink = [f64::NAN; THRUSTER_COUNT];
        a.dispatch(&a.allocate(&Vector3::new(0.4, 0.0, 0.0)), &mut sink);
        assert!(sink.iter().all(|f| f.is_finite()));
        assert_eq!(sink.iter().filter(|&&f| f > 0.0).count(), 4);
    }

    #[test]
    fn non_positive_thrust_is_configuration_error() {
        assert!(ThrusterAllocator::new(0.0).unwrap_err().is_fatal());
        assert!(ThrusterAllocator::new(f64::NAN).is_err());
    }
}
