// ---------------------------------------------------------------------------
// Port-alignment state machine layered on the autopilot.
//
// While docking is active the controller re-plans the autopilot goal
// every tick from the target port's current pose, then welds the two
// bodies together once every tolerance is met.
// ---------------------------------------------------------------------------

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dynamics::body::{LockConstraints, LockHandle, RigidBodyView};
use crate::error::{FlightError, Result};
use crate::gnc::{AutopilotController, AutopilotMode};
use crate::sim::event::{EventSink, FlightEvent};
use crate::vehicle::port::{self, PortId, PortLink};
use crate::vehicle::spacecraft::{CraftId, Spacecraft};
use super::geometry::{approach_target, measure, DockingMeasurements, PortPose};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DockingPhase {
    #[default]
    Idle,
    Approaching,
    Aligning,
    Docking,
    Docked,
    Cancelled,
}

impl fmt::Display for DockingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DockingPhase::Idle => "idle",
            DockingPhase::Approaching => "approaching",
            DockingPhase::Aligning => "aligning",
            DockingPhase::Docking => "docking",
            DockingPhase::Docked => "docked",
            DockingPhase::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockingConfig {
    /// Hold point distance in front of the target port, m.
    pub approach_standoff: f64,
    /// Approaching ends within this distance of the hold point, m.
    pub range_tolerance: f64,
    /// Alignment and roll tolerance before the final approach, rad.
    pub align_angle_tolerance: f64,
    pub lateral_tolerance: f64, // m
    /// Relative speed allowed at the hold point, m/s.
    pub hold_speed: f64,
    pub final_approach_speed: f64,  // m/s
    pub capture_range: f64,         // m
    pub capture_angle_tolerance: f64, // rad
    pub capture_speed: f64,         // m/s
    /// Final approach falls back to aligning beyond these.
    pub abort_angle: f64,   // rad
    pub abort_lateral: f64, // m
}

impl Default for DockingConfig {
    fn default() -> Self {
        Self {
            approach_standoff: 3.0,
            range_tolerance: 0.5,
            align_angle_tolerance: 0.05,
            lateral_tolerance: 0.1,
            hold_speed: 0.1,
            final_approach_speed: 0.2,
            capture_range: 0.1,
            capture_angle_tolerance: 0.1,
            capture_speed: 0.3,
            abort_angle: 0.25,
            abort_lateral: 0.5,
        }
    }
}

impl DockingConfig {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("approach_standoff", self.approach_standoff),
            ("range_tolerance", self.range_tolerance),
            ("align_angle_tolerance", self.align_angle_tolerance),
            ("lateral_tolerance", self.lateral_tolerance),
            ("hold_speed", self.hold_speed),
            ("final_approach_speed", self.final_approach_speed),
            ("capture_range", self.capture_range),
            ("capture_angle_tolerance", self.capture_angle_tolerance),
            ("capture_speed", self.capture_speed),
            ("abort_angle", self.abort_angle),
            ("abort_lateral", self.abort_lateral),
        ];
        for (name, value) in fields {
            if !(value > 0.0 && value.is_finite()) {
                return Err(FlightError::configuration(format!(
                    "docking.{name} must be positive, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// The port pair a docking run is working towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DockingTarget {
    pub craft: CraftId,
    pub our_port: PortId,
    pub their_port: PortId,
}

#[derive(Debug)]
pub struct DockingController {
    config: DockingConfig,
    phase: DockingPhase,
    target: Option<DockingTarget>,
    lock: Option<LockHandle>,
    measurements: Option<DockingMeasurements>,
    events: EventSink,
}

impl DockingController {
    pub fn new(config: DockingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            phase: DockingPhase::Idle,
            target: None,
            lock: None,
            measurements: None,
            events: EventSink::new(),
        })
    }

    pub fn phase(&self) -> DockingPhase {
        self.phase
    }

    pub fn target(&self) -> Option<DockingTarget> {
        self.target
    }

    pub fn measurements(&self) -> Option<&DockingMeasurements> {
        self.measurements.as_ref()
    }

    pub fn events_mut(&mut self) -> &mut EventSink {
        &mut self.events
    }

    /// Approaching, aligning or on final approach.
    pub fn is_active(&self) -> bool {
        matches!(
            self.phase,
            DockingPhase::Approaching | DockingPhase::Aligning | DockingPhase::Docking
        )
    }

    fn set_phase(&mut self, phase: DockingPhase) {
        if phase == self.phase {
            return;
        }
        debug!(from = %self.phase, to = %phase, "docking phase changed");
        self.events.emit(&FlightEvent::DockingPhaseChanged {
            from: self.phase,
            to: phase,
        });
        self.phase = phase;
    }

    /// Begin docking `our_port` to `their_port` on `theirs`.
    ///
    /// Rejected without any state change if either port is occupied or we
    /// are already docked. Calling it with a different pair while docking
    /// restarts the run with the new ports.
    pub fn start_docking(
        &mut self,
        ours: &Spacecraft,
        theirs: &Spacecraft,
        our_port: PortId,
        their_port: PortId,
        autopilot: &mut AutopilotController,
    ) -> Result<()> {
        if ours.id == theirs.id {
            return Err(FlightError::precondition("cannot dock a spacecraft to itself"));
        }
        if self.phase == DockingPhase::Docked {
            return Err(FlightError::precondition("already docked; undock first"));
        }
        for (craft, id) in [(ours, our_port), (theirs, their_port)] {
            if craft.port(id).is_occupied() {
                warn!(craft = craft.id.0, port = %id, "docking rejected: port occupied");
                return Err(FlightError::precondition(format!(
                    "{id} port of {} is already occupied",
                    craft.spec.name
                )));
            }
        }

        let request = DockingTarget {
            craft: theirs.id,
            our_port,
            their_port,
        };
        if self.is_active() && self.target == Some(request) {
            return Ok(());
        }
        if self.is_active() {
            info!(port = %our_port, target_port = %their_port, "port pair changed, restarting docking");
        } else {
            info!(target = theirs.id.0, port = %our_port, target_port = %their_port, "docking started");
        }

        self.target = Some(request);
        self.measurements = None;
        // Restart from the beginning even when the phase does not change.
        self.set_phase(DockingPhase::Idle);
        self.set_phase(DockingPhase::Approaching);
        autopilot.set_mode(AutopilotMode::OrientationMatch, true);
        autopilot.set_mode(AutopilotMode::GoToPosition, true);
        autopilot.reset();
        Ok(())
    }

    /// Abandon docking and hand attitude control back.
    ///
    /// A no-op when no docking run is active, so modes enabled since the
    /// last run are left alone.
    pub fn cancel(&mut self, autopilot: &mut AutopilotController) -> Result<()> {
        if self.phase == DockingPhase::Docked {
            return Err(FlightError::precondition("docked; undock instead of cancelling"));
        }
        if !self.is_active() {
            return Ok(());
        }
        self.target = None;
        self.measurements = None;
        self.set_phase(DockingPhase::Cancelled);
        autopilot.release();
        info!("docking cancelled");
        Ok(())
    }

    /// One docking tick: measure, advance the phase, re-plan the autopilot goal.
    pub fn update(
        &mut self,
        ours: &mut Spacecraft,
        our_body: &dyn RigidBodyView,
        theirs: &mut Spacecraft,
        their_body: &dyn RigidBodyView,
        autopilot: &mut AutopilotController,
        locks: &mut dyn LockConstraints,
    ) -> Result<DockingPhase> {
        if !self.is_active() {
            return Ok(self.phase);
        }
        let Some(target) = self.target else {
            return Ok(self.phase);
        };
        if theirs.id != target.craft {
            return Err(FlightError::precondition(format!(
                "docking target is craft {}, got craft {}",
                target.craft.0, theirs.id.0
            )));
        }
        if theirs.port(target.their_port).is_occupied() {
            warn!(port = %target.their_port, "target port taken during approach");
            self.cancel(autopilot)?;
            return Ok(self.phase);
        }

        let our_pose = PortPose::of(ours.port(target.our_port), our_body);
        let their_pose = PortPose::of(theirs.port(target.their_port), their_body);
        let m = measure(&our_pose, &their_pose);
        self.measurements = Some(m);

        let cfg = self.config;
        let next = match self.phase {
            DockingPhase::Approaching if m.range <= cfg.approach_standoff + cfg.range_tolerance => {
                DockingPhase::Aligning
            }
            DockingPhase::Aligning
                if m.alignment_error <= cfg.align_angle_tolerance
                    && m.lateral_offset <= cfg.lateral_tolerance
                    && m.roll_error <= cfg.align_angle_tolerance
                    && m.closing_speed.abs() <= cfg.hold_speed =>
            {
                DockingPhase::Docking
            }
            DockingPhase::Docking
                if m.range <= cfg.capture_range
                    && m.alignment_error <= cfg.capture_angle_tolerance
                    && m.lateral_offset <= cfg.lateral_tolerance
                    && m.roll_error <= cfg.capture_angle_tolerance
                    && m.closing_speed <= cfg.capture_speed =>
            {
                DockingPhase::Docked
            }
            DockingPhase::Docking
                if m.alignment_error > cfg.abort_angle
                    || m.roll_error > cfg.abort_angle
                    || m.lateral_offset > cfg.abort_lateral =>
            {
                DockingPhase::Aligning
            }
            phase => phase,
        };

        if next == DockingPhase::Docked {
            self.capture(ours, theirs, target, autopilot, locks)?;
            return Ok(self.phase);
        }
        self.set_phase(next);

        let final_approach = next == DockingPhase::Docking;
        let standoff = if final_approach { 0.0 } else { cfg.approach_standoff };
        let offset = ours.port(target.our_port).offset;
        if let Some((q, p)) = approach_target(&their_pose, target.our_port, &offset, standoff) {
            autopilot.steer(q, p, final_approach.then_some(cfg.final_approach_speed));
        }
        Ok(self.phase)
    }

    fn capture(
        &mut self,
        ours: &mut Spacecraft,
        theirs: &mut Spacecraft,
        target: DockingTarget,
        autopilot: &mut AutopilotController,
        locks: &mut dyn LockConstraints,
    ) -> Result<()> {
        let (our_id, their_id) = (ours.id, theirs.id);
        let lock = locks.create_lock(ours.body, theirs.body)?;
        if let Err(e) = port::dock(
            ours.port_mut(target.our_port),
            our_id,
            theirs.port_mut(target.their_port),
            their_id,
        ) {
            locks.remove_lock(lock)?;
            return Err(e);
        }
        self.lock = Some(lock);
        autopilot.release();
        self.set_phase(DockingPhase::Docked);

        let (our_link, their_link) = (
            PortLink { craft: our_id, port: target.our_port },
            PortLink { craft: their_id, port: target.their_port },
        );
        info!(ours = our_id.0, theirs = their_id.0, "docked");
        self.events.emit(&FlightEvent::Docked {
            ours: our_link,
            theirs: their_link,
        });
        Ok(())
    }

    /// Release the lock and free both ports.
    pub fn undock(
        &mut self,
        ours: &mut Spacecraft,
        theirs: &mut Spacecraft,
        locks: &mut dyn LockConstraints,
    ) -> Result<()> {
        let (Some(target), Some(lock)) = (self.target, self.lock) else {
            return Err(FlightError::precondition("not docked"));
        };
        let their_link = PortLink { craft: theirs.id, port: target.their_port };
        if self.phase != DockingPhase::Docked
            || theirs.id != target.craft
            || ours.port(target.our_port).partner() != Some(their_link)
        {
            return Err(FlightError::precondition("not docked to this spacecraft"));
        }

        locks.remove_lock(lock)?;
        let (our_id, their_id) = (ours.id, theirs.id);
        port::undock(
            ours.port_mut(target.our_port),
            our_id,
            theirs.port_mut(target.their_port),
            their_id,
        )?;
        self.lock = None;
        self.target = None;
        self.set_phase(DockingPhase::Idle);
        info!(ours = our_id.0, theirs = their_id.0, "undocked");
        self.events.emit(&FlightEvent::Undocked {
            ours: PortLink { craft: our_id, port: target.our_port },
            theirs: their_link,
        });
        Ok(())
    }
}
