// ---------------------------------------------------------------------------
// Phased attitude autopilot with optional translation control.
//
// Every tick the controller measures the orientation error and the
// angular momentum of the body, picks a control regime
// (AutopilotPhase) and turns the resulting PID command into thruster
// forces through the ThrusterAllocator.
// ---------------------------------------------------------------------------

use std::fmt;

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dynamics::body::{moment_of_inertia, RigidBodyView};
use crate::dynamics::state::world_up;
use crate::error::{ensure_positive_dt, FlightError, Result};
use crate::sim::event::{EventSink, FlightEvent};
use super::allocator::{ThrusterAllocator, ThrusterCommand};
use super::controller::Controller;
use super::guidance::{
    error_quaternion, look_rotation, orientation_error, response_signal, safe_normalize,
    shortest_axis_angle,
};
use super::pid::{PidGains, VectorPid};

// ---------------------------------------------------------------------------
// Phases and modes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AutopilotPhase {
    #[default]
    Idle,
    CancelMomentum,
    CorrectOrientation,
    FineAlign,
}

impl fmt::Display for AutopilotPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AutopilotPhase::Idle => "idle",
            AutopilotPhase::CancelMomentum => "cancel-momentum",
            AutopilotPhase::CorrectOrientation => "correct-orientation",
            AutopilotPhase::FineAlign => "fine-align",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutopilotMode {
    OrientationMatch,
    CancelRotation,
    CancelLinearMotion,
    PointToPosition,
    GoToPosition,
}

impl AutopilotMode {
    pub const ALL: [AutopilotMode; 5] = [
        AutopilotMode::OrientationMatch,
        AutopilotMode::CancelRotation,
        AutopilotMode::CancelLinearMotion,
        AutopilotMode::PointToPosition,
        AutopilotMode::GoToPosition,
    ];

    pub fn is_rotation(self) -> bool {
        matches!(
            self,
            AutopilotMode::OrientationMatch
                | AutopilotMode::CancelRotation
                | AutopilotMode::PointToPosition
        )
    }
}

/// Attitude objective. At most one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RotationGoal {
    #[default]
    None,
    CancelRotation,
    MatchOrientation,
    PointAtTarget,
}

impl RotationGoal {
    fn mode(self) -> Option<AutopilotMode> {
        match self {
            RotationGoal::None => None,
            RotationGoal::CancelRotation => Some(AutopilotMode::CancelRotation),
            RotationGoal::MatchOrientation => Some(AutopilotMode::OrientationMatch),
            RotationGoal::PointAtTarget => Some(AutopilotMode::PointToPosition),
        }
    }
}

/// Translation objective. At most one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TranslationGoal {
    #[default]
    None,
    CancelLinearMotion,
    GoToPosition,
}

impl TranslationGoal {
    fn mode(self) -> Option<AutopilotMode> {
        match self {
            TranslationGoal::None => None,
            TranslationGoal::CancelLinearMotion => Some(AutopilotMode::CancelLinearMotion),
            TranslationGoal::GoToPosition => Some(AutopilotMode::GoToPosition),
        }
    }
}

/// Enabled autopilot modes: one optional rotation goal plus one optional
/// translation goal. Enabling a mode replaces the other member of its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AutopilotModes {
    rotation: RotationGoal,
    translation: TranslationGoal,
}

impl AutopilotModes {
    pub fn rotation(&self) -> RotationGoal {
        self.rotation
    }

    pub fn translation(&self) -> TranslationGoal {
        self.translation
    }

    pub fn is_enabled(&self, mode: AutopilotMode) -> bool {
        self.rotation.mode() == Some(mode) || self.translation.mode() == Some(mode)
    }

    /// Enable `mode`, returning the mode it displaced from its group.
    pub fn enable(&mut self, mode: AutopilotMode) -> Option<AutopilotMode> {
        let displaced = if mode.is_rotation() {
            self.rotation.mode()
        } else {
            self.translation.mode()
        };
        match mode {
            AutopilotMode::OrientationMatch => self.rotation = RotationGoal::MatchOrientation,
            AutopilotMode::CancelRotation => self.rotation = RotationGoal::CancelRotation,
            AutopilotMode::PointToPosition => self.rotation = RotationGoal::PointAtTarget,
            AutopilotMode::CancelLinearMotion => {
                self.translation = TranslationGoal::CancelLinearMotion
            }
            AutopilotMode::GoToPosition => self.translation = TranslationGoal::GoToPosition,
        }
        displaced.filter(|&d| d != mode)
    }

    /// Disable `mode`; returns whether it was enabled.
    pub fn disable(&mut self, mode: AutopilotMode) -> bool {
        if !self.is_enabled(mode) {
            return false;
        }
        if mode.is_rotation() {
            self.rotation = RotationGoal::None;
        } else {
            self.translation = TranslationGoal::None;
        }
        true
    }

    pub fn enabled(&self) -> impl Iterator<Item = AutopilotMode> + '_ {
        AutopilotMode::ALL.into_iter().filter(|&m| self.is_enabled(m))
    }

    pub fn any(&self) -> bool {
        self.rotation != RotationGoal::None || self.translation != TranslationGoal::None
    }

    /// Pure rate damping: the phase machine ignores orientation error.
    pub fn is_rotation_cancel_only(&self) -> bool {
        self.rotation == RotationGoal::CancelRotation
    }

    /// Target orientation is derived from the target position every tick.
    pub fn is_tracking_target(&self) -> bool {
        self.rotation == RotationGoal::PointAtTarget
            || (self.translation == TranslationGoal::GoToPosition
                && self.rotation == RotationGoal::None)
    }

    pub fn controls_rotation(&self) -> bool {
        self.rotation != RotationGoal::None || self.is_tracking_target()
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutopilotConfig {
    /// |L| at or below this counts as low angular momentum, kg·m²/s.
    pub min_angular_momentum: f64,
    /// Orientation error above this needs correction, rad.
    pub autopilot_threshold: f64,
    /// Errors above this use `CorrectOrientation`, below it `FineAlign`, rad.
    pub fine_align_threshold: f64,
    pub response_knee: f64,
    pub momentum_pid: PidGains,
    pub orientation_pid: PidGains,
    pub momentum_output_scale: f64,
    pub orientation_output_scale: f64,
    /// Momentum damping when cancelling rotation is the only goal.
    pub sole_damping: f64,
    /// Momentum damping when an orientation correction follows.
    pub staged_damping: f64,
    /// In cancel-rotation mode, momentum must fall to this fraction of
    /// `min_angular_momentum` before `CancelMomentum` is released.
    pub cancel_release_fraction: f64,
    /// On target in the combined modes, residual momentum is damped until
    /// it falls to this fraction of `min_angular_momentum`.
    pub settle_release_fraction: f64,
    pub linear_pid: PidGains,
    pub position_gain: f64,
    pub max_linear_speed: f64, // m/s
    /// Closer than this to the target position, tracking keeps the last heading.
    pub tracking_min_range: f64, // m
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self {
            min_angular_momentum: 0.2,
            autopilot_threshold: 0.05,
            fine_align_threshold: 0.3,
            response_knee: 0.02,
            momentum_pid: PidGains::new(5.0, 0.05, 2.0),
            orientation_pid: PidGains::new(0.1, 0.01, 0.05),
            momentum_output_scale: 0.25,
            orientation_output_scale: 10.0,
            sole_damping: 1.0,
            staged_damping: 0.1,
            cancel_release_fraction: 0.1,
            settle_release_fraction: 0.001,
            linear_pid: PidGains::new(2.0, 0.0, 0.1),
            position_gain: 0.5,
            max_linear_speed: 1.0,
            tracking_min_range: 0.5,
        }
    }
}

impl AutopilotConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("min_angular_momentum", self.min_angular_momentum),
            ("autopilot_threshold", self.autopilot_threshold),
            ("fine_align_threshold", self.fine_align_threshold),
            ("response_knee", self.response_knee),
            ("momentum_output_scale", self.momentum_output_scale),
            ("orientation_output_scale", self.orientation_output_scale),
            ("sole_damping", self.sole_damping),
            ("staged_damping", self.staged_damping),
            ("position_gain", self.position_gain),
            ("max_linear_speed", self.max_linear_speed),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(FlightError::configuration(format!(
                    "autopilot.{name} must be positive, got {value}"
                )));
            }
        }
        let fractions = [
            ("cancel_release_fraction", self.cancel_release_fraction),
            ("settle_release_fraction", self.settle_release_fraction),
        ];
        for (name, value) in fractions {
            if !(value > 0.0 && value <= 1.0) {
                return Err(FlightError::configuration(format!(
                    "autopilot.{name} must be in (0, 1], got {value}"
                )));
            }
        }
        if !(self.tracking_min_range >= 0.0 && self.tracking_min_range.is_finite()) {
            return Err(FlightError::configuration(format!(
                "autopilot.tracking_min_range must be non-negative, got {}",
                self.tracking_min_range
            )));
        }
        self.momentum_pid.validate("autopilot.momentum_pid")?;
        self.orientation_pid.validate("autopilot.orientation_pid")?;
        self.linear_pid.validate("autopilot.linear_pid")
    }
}

/// Per-tick reporting values (arrows, HUD readouts). Not part of the control law.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AutopilotTelemetry {
    pub phase: AutopilotPhase,
    pub orientation_error: f64,          // rad
    pub angular_momentum: Vector3<f64>,  // world
    pub torque_command: Vector3<f64>,    // body
    pub force_command: Vector3<f64>,     // body
    pub rotation_axis: Vector3<f64>,     // world, unit or zero
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AutopilotController {
    config: AutopilotConfig,
    modes: AutopilotModes,
    phase: AutopilotPhase,
    momentum_pid: VectorPid,
    orientation_pid: VectorPid,
    linear_pid: VectorPid,
    allocator: ThrusterAllocator,
    target_orientation: UnitQuaternion<f64>,
    target_position: Vector3<f64>,
    speed_limit: Option<f64>,
    telemetry: AutopilotTelemetry,
    events: EventSink,
}

impl AutopilotController {
    pub fn new(config: AutopilotConfig, max_thrust: f64) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            momentum_pid: VectorPid::new(config.momentum_pid),
            orientation_pid: VectorPid::new(config.orientation_pid),
            linear_pid: VectorPid::new(config.linear_pid),
            allocator: ThrusterAllocator::new(max_thrust)?,
            config,
            modes: AutopilotModes::default(),
            phase: AutopilotPhase::Idle,
            target_orientation: UnitQuaternion::identity(),
            target_position: Vector3::zeros(),
            speed_limit: None,
            telemetry: AutopilotTelemetry::default(),
            events: EventSink::new(),
        })
    }

    pub fn config(&self) -> &AutopilotConfig {
        &self.config
    }

    pub fn modes(&self) -> AutopilotModes {
        self.modes
    }

    pub fn phase(&self) -> AutopilotPhase {
        self.phase
    }

    pub fn telemetry(&self) -> &AutopilotTelemetry {
        &self.telemetry
    }

    pub fn allocator(&self) -> &ThrusterAllocator {
        &self.allocator
    }

    pub fn target_orientation(&self) -> UnitQuaternion<f64> {
        self.target_orientation
    }

    pub fn target_position(&self) -> Vector3<f64> {
        self.target_position
    }

    pub fn events_mut(&mut self) -> &mut EventSink {
        &mut self.events
    }

    pub fn momentum_pid_mut(&mut self) -> &mut VectorPid {
        &mut self.momentum_pid
    }

    pub fn orientation_pid(&self) -> &VectorPid {
        &self.orientation_pid
    }

    pub fn orientation_pid_mut(&mut self) -> &mut VectorPid {
        &mut self.orientation_pid
    }

    pub fn linear_pid_mut(&mut self) -> &mut VectorPid {
        &mut self.linear_pid
    }

    /// Toggle a mode. Any change resets every loop so no windup carries over.
    pub fn set_mode(&mut self, mode: AutopilotMode, enabled: bool) {
        let changed = if enabled {
            if self.modes.is_enabled(mode) {
                false
            } else {
                if let Some(displaced) = self.modes.enable(mode) {
                    self.notify_mode(displaced, false);
                }
                true
            }
        } else {
            self.modes.disable(mode)
        };
        if changed {
            self.notify_mode(mode, enabled);
            self.reset();
        }
    }

    fn notify_mode(&mut self, mode: AutopilotMode, enabled: bool) {
        debug!(?mode, enabled, "autopilot mode changed");
        self.events.emit(&FlightEvent::ModeChanged { mode, enabled });
    }

    /// New orientation objective; the orientation loop starts fresh.
    pub fn set_target_orientation(&mut self, target: UnitQuaternion<f64>) {
        self.target_orientation = target;
        self.orientation_pid.reset();
    }

    /// New position objective; the velocity loop starts fresh.
    pub fn set_target_position(&mut self, target: Vector3<f64>) {
        self.target_position = target;
        self.linear_pid.reset();
    }

    /// Move the goal pose without resetting any loop. Used by outer
    /// controllers that re-plan the same objective every tick.
    pub fn steer(
        &mut self,
        orientation: UnitQuaternion<f64>,
        position: Vector3<f64>,
        speed_limit: Option<f64>,
    ) {
        self.target_orientation = orientation;
        self.target_position = position;
        self.speed_limit = speed_limit;
    }

    /// Drop every mode and return to `Idle`.
    pub fn release(&mut self) {
        let enabled: Vec<AutopilotMode> = self.modes.enabled().collect();
        for mode in enabled {
            self.set_mode(mode, false);
        }
        self.speed_limit = None;
        self.reset();
        self.set_phase(AutopilotPhase::Idle);
    }

    pub fn reset(&mut self) {
        self.momentum_pid.reset();
        self.orientation_pid.reset();
        self.linear_pid.reset();
    }

    fn set_phase(&mut self, phase: AutopilotPhase) {
        if phase == self.phase {
            return;
        }
        debug!(from = %self.phase, to = %phase, "autopilot phase changed");
        self.momentum_pid.reset();
        self.orientation_pid.reset();
        self.events.emit(&FlightEvent::PhaseChanged {
            from: self.phase,
            to: phase,
        });
        self.phase = phase;
        self.telemetry.phase = phase;
    }

    /// Run one control tick and return the clamped autopilot thruster command.
    pub fn compute(&mut self, body: &dyn RigidBodyView, dt: f64) -> Result<ThrusterCommand> {
        ensure_positive_dt(dt)?;
        let inertia = moment_of_inertia(body.mass(), &body.half_extents())?;
        let q = body.orientation();
        let momentum = body.angular_velocity() * inertia;

        if self.modes.is_tracking_target() {
            self.aim_at_target(&body.position());
        }

        let err = orientation_error(&self.target_orientation, &q);
        self.telemetry.orientation_error = err;
        self.telemetry.angular_momentum = momentum;

        let torque = if self.modes.controls_rotation() {
            self.rotation_command(&q, &momentum, inertia, err, dt)?
        } else {
            self.set_phase(AutopilotPhase::Idle);
            self.telemetry.rotation_axis = Vector3::zeros();
            Vector3::zeros()
        };
        let force = self.translation_command(body, dt)?;
        self.telemetry.torque_command = torque;
        self.telemetry.force_command = force;

        let cmd = self
            .allocator
            .allocate(&torque)
            .combine(&self.allocator.allocate_translation(&force));
        Ok(cmd.clamped(self.allocator.max_thrust()))
    }

    fn aim_at_target(&mut self, position: &Vector3<f64>) {
        let offset = self.target_position - position;
        if offset.norm() <= self.config.tracking_min_range {
            return;
        }
        if let Some(q) = look_rotation(&offset, &world_up()) {
            self.target_orientation = q;
        }
    }

    /// Body-frame torque command for this tick.
    fn rotation_command(
        &mut self,
        q: &UnitQuaternion<f64>,
        momentum: &Vector3<f64>,
        inertia: f64,
        err: f64,
        dt: f64,
    ) -> Result<Vector3<f64>> {
        let cfg = self.config;
        let magnitude = momentum.norm();

        let (phase, damping) = if self.modes.is_rotation_cancel_only() {
            let limit = if self.phase == AutopilotPhase::CancelMomentum {
                cfg.min_angular_momentum * cfg.cancel_release_fraction
            } else {
                cfg.min_angular_momentum
            };
            let phase = if magnitude <= limit {
                AutopilotPhase::Idle
            } else {
                AutopilotPhase::CancelMomentum
            };
            (phase, cfg.sole_damping)
        } else if magnitude > cfg.min_angular_momentum {
            (AutopilotPhase::CancelMomentum, cfg.staged_damping)
        } else if err > cfg.autopilot_threshold {
            let phase = if err > cfg.fine_align_threshold {
                AutopilotPhase::CorrectOrientation
            } else {
                AutopilotPhase::FineAlign
            };
            (phase, cfg.staged_damping)
        } else if self.phase != AutopilotPhase::Idle
            && magnitude > cfg.min_angular_momentum * cfg.settle_release_fraction
        {
            // On target but still turning: brake before going idle, or the
            // residual rate carries the craft back out of the threshold.
            (AutopilotPhase::CancelMomentum, cfg.sole_damping)
        } else {
            (AutopilotPhase::Idle, cfg.staged_damping)
        };
        self.set_phase(phase);

        let world = match phase {
            AutopilotPhase::Idle => Vector3::zeros(),
            AutopilotPhase::CancelMomentum => {
                self.momentum_pid.update(-momentum * damping, dt)? * cfg.momentum_output_scale
            }
            AutopilotPhase::CorrectOrientation | AutopilotPhase::FineAlign => {
                let q_err = error_quaternion(&self.target_orientation, q);
                let signal = response_signal(err, cfg.response_knee);
                let desired = shortest_axis_angle(&q_err) * (signal * inertia);
                self.orientation_pid.update(desired - momentum, dt)?
                    * cfg.orientation_output_scale
            }
        };
        self.telemetry.rotation_axis = safe_normalize(&world);
        Ok(q.inverse() * world)
    }

    /// Body-frame force command for this tick.
    fn translation_command(&mut self, body: &dyn RigidBodyView, dt: f64) -> Result<Vector3<f64>> {
        let desired = match self.modes.translation() {
            TranslationGoal::None => return Ok(Vector3::zeros()),
            TranslationGoal::CancelLinearMotion => Vector3::zeros(),
            TranslationGoal::GoToPosition => {
                let v = (self.target_position - body.position()) * self.config.position_gain;
                let limit = self.speed_limit.unwrap_or(self.config.max_linear_speed);
                if v.norm() > limit {
                    v.normalize() * limit
                } else {
                    v
                }
            }
        };
        let world = self.linear_pid.update(desired - body.linear_velocity(), dt)?;
        Ok(body.orientation().inverse() * world)
    }
}

impl Controller for AutopilotController {
    fn control(&mut self, body: &dyn RigidBodyView, dt: f64) -> Result<ThrusterCommand> {
        self.compute(body, dt)
    }

    fn reset(&mut self) {
        AutopilotController::reset(self);
    }

    fn name(&self) -> &str {
        "autopilot"
    }
}
