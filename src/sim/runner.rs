use std::cell::RefCell;
use std::rc::Rc;

use nalgebra::{UnitQuaternion, Vector3};
use tracing::{debug, info, warn};

use crate::config::FlightConfig;
use crate::docking::{DockingController, DockingPhase};
use crate::dynamics::body::{BodySnapshot, RigidBodyControl, RigidBodyView};
use crate::dynamics::state::RigidBodyState;
use crate::error::{FlightError, Result};
use crate::gnc::{
    AutopilotController, AutopilotPhase, ManualInput, RelayAutoTuner, ThrusterCommand,
    ThrusterSink, TuneResult, TuneStatus,
};
use crate::vehicle::{CraftId, PortId, Spacecraft, SpacecraftSpec, Thruster, THRUSTER_COUNT};
use super::event::{EventSink, FlightEvent, SimEvent};
use super::world::{PhysicsWorld, RigidBody};

type Inbox = Rc<RefCell<Vec<(CraftId, FlightEvent)>>>;

// ---------------------------------------------------------------------------
// Per-tick telemetry
// ---------------------------------------------------------------------------

/// What one craft looked like to its controllers on one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub time: f64,
    pub craft: CraftId,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
    pub angular_velocity: Vector3<f64>, // world, rad/s
    pub autopilot_phase: AutopilotPhase,
    pub docking_phase: DockingPhase,
    pub orientation_error: f64, // rad
    pub docking_range: Option<f64>,
    pub total_thrust: f64, // N
    pub firing: usize,
}

// ---------------------------------------------------------------------------
// Thruster output onto a physics body
// ---------------------------------------------------------------------------

struct BodyThrusters<'a> {
    body: &'a mut RigidBody,
    layout: &'a [Thruster; THRUSTER_COUNT],
}

impl ThrusterSink for BodyThrusters<'_> {
    fn set_thruster_force(&mut self, index: usize, magnitude: f64) {
        if magnitude > 0.0 {
            let t = &self.layout[index];
            self.body.apply_local_force(t.direction * magnitude, t.position);
        }
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct CraftSlot {
    craft: Spacecraft,
    autopilot: AutopilotController,
    docking: DockingController,
    tuner: RelayAutoTuner,
    manual: ManualInput,
    command: ThrusterCommand,
    tune_outcome: Option<Result<TuneResult>>,
}

/// Fixed-step simulation of any number of spacecraft sharing one physics world.
///
/// Each tick integrates the world, then evaluates docking, autopilot, and
/// auto-tuning for every craft in spawn order, then applies the clamped
/// thruster forces for the next integration.
#[derive(Debug)]
pub struct Simulation {
    config: FlightConfig,
    world: PhysicsWorld,
    slots: Vec<CraftSlot>,
    active: Option<CraftId>,
    time: f64,
    ticks: u64,
    inbox: Inbox,
    events: Vec<SimEvent>,
}

fn forward_events(sink: &mut EventSink, inbox: &Inbox, craft: CraftId) {
    let inbox = Rc::clone(inbox);
    sink.subscribe(move |event| inbox.borrow_mut().push((craft, event.clone())));
}

fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> Result<(&mut T, &mut T)> {
    if a == b || a >= items.len() || b >= items.len() {
        return Err(FlightError::precondition(format!("invalid craft pair ({a}, {b})")));
    }
    if a < b {
        let (lo, hi) = items.split_at_mut(b);
        Ok((&mut lo[a], &mut hi[0]))
    } else {
        let (lo, hi) = items.split_at_mut(a);
        Ok((&mut hi[0], &mut lo[b]))
    }
}

impl Simulation {
    pub fn new(config: FlightConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            world: PhysicsWorld::new(),
            slots: Vec::new(),
            active: None,
            time: 0.0,
            ticks: 0,
            inbox: Rc::new(RefCell::new(Vec::new())),
            events: Vec::new(),
        })
    }

    /// Add a spacecraft. The first one spawned becomes the active craft.
    pub fn spawn(&mut self, spec: SpacecraftSpec, state: RigidBodyState) -> Result<CraftId> {
        spec.validate()?;
        let id = CraftId(self.slots.len());
        let mut autopilot = AutopilotController::new(self.config.autopilot, spec.max_thrust)?;
        let mut docking = DockingController::new(self.config.docking)?;
        let mut tuner = RelayAutoTuner::new(self.config.autotune)?;
        forward_events(autopilot.events_mut(), &self.inbox, id);
        forward_events(docking.events_mut(), &self.inbox, id);
        forward_events(tuner.events_mut(), &self.inbox, id);

        let body = self.world.add_body(spec.mass_properties()?, state);
        info!(craft = id.0, name = %spec.name, "spacecraft spawned");
        self.slots.push(CraftSlot {
            craft: Spacecraft::new(id, spec, body)?,
            autopilot,
            docking,
            tuner,
            manual: ManualInput::default(),
            command: ThrusterCommand::idle(),
            tune_outcome: None,
        });
        if self.active.is_none() {
            self.active = Some(id);
        }
        Ok(id)
    }

    fn slot(&self, id: CraftId) -> Result<&CraftSlot> {
        self.slots
            .get(id.0)
            .ok_or_else(|| FlightError::precondition(format!("unknown craft {}", id.0)))
    }

    fn slot_mut(&mut self, id: CraftId) -> Result<&mut CraftSlot> {
        self.slots
            .get_mut(id.0)
            .ok_or_else(|| FlightError::precondition(format!("unknown craft {}", id.0)))
    }

    pub fn config(&self) -> &FlightConfig {
        &self.config
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn active(&self) -> Option<CraftId> {
        self.active
    }

    /// Hand pilot control to `id`. Its loops restart so nothing wound up
    /// while it was inactive leaks into the first firing.
    pub fn set_active(&mut self, id: CraftId) -> Result<()> {
        self.slot_mut(id)?.autopilot.reset();
        if let Some(prev) = self.active.filter(|&p| p != id) {
            self.slot_mut(prev)?.manual = ManualInput::default();
        }
        debug!(craft = id.0, "active craft changed");
        self.active = Some(id);
        Ok(())
    }

    pub fn craft(&self, id: CraftId) -> Result<&Spacecraft> {
        Ok(&self.slot(id)?.craft)
    }

    pub fn snapshot(&self, id: CraftId) -> Result<BodySnapshot> {
        self.world.snapshot(self.slot(id)?.craft.body)
    }

    pub fn autopilot(&self, id: CraftId) -> Result<&AutopilotController> {
        Ok(&self.slot(id)?.autopilot)
    }

    pub fn autopilot_mut(&mut self, id: CraftId) -> Result<&mut AutopilotController> {
        Ok(&mut self.slot_mut(id)?.autopilot)
    }

    pub fn docking(&self, id: CraftId) -> Result<&DockingController> {
        Ok(&self.slot(id)?.docking)
    }

    /// Thruster command applied on the most recent tick.
    pub fn command(&self, id: CraftId) -> Result<&ThrusterCommand> {
        Ok(&self.slot(id)?.command)
    }

    /// Pilot input; only the active craft acts on it.
    pub fn set_manual_input(&mut self, id: CraftId, input: ManualInput) -> Result<()> {
        self.slot_mut(id)?.manual = input;
        Ok(())
    }

    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<SimEvent> {
        self.flush_events();
        std::mem::take(&mut self.events)
    }

    fn flush_events(&mut self) {
        let time = self.time;
        let pending = std::mem::take(&mut *self.inbox.borrow_mut());
        self.events.extend(
            pending
                .into_iter()
                .map(|(craft, event)| SimEvent { time, craft, event }),
        );
    }

    // -- docking -------------------------------------------------------------

    pub fn start_docking(
        &mut self,
        ours: CraftId,
        our_port: PortId,
        theirs: CraftId,
        their_port: PortId,
    ) -> Result<()> {
        let (a, b) = pair_mut(&mut self.slots, ours.0, theirs.0)?;
        a.docking
            .start_docking(&a.craft, &b.craft, our_port, their_port, &mut a.autopilot)?;
        self.flush_events();
        Ok(())
    }

    pub fn cancel_docking(&mut self, id: CraftId) -> Result<()> {
        let slot = self.slot_mut(id)?;
        slot.docking.cancel(&mut slot.autopilot)?;
        self.flush_events();
        Ok(())
    }

    /// Undock `id` from whatever it is docked to, whichever side started it.
    pub fn undock(&mut self, id: CraftId) -> Result<()> {
        let initiator = if self.slot(id)?.docking.phase() == DockingPhase::Docked {
            id
        } else {
            self.slots
                .iter()
                .find(|s| {
                    s.docking.phase() == DockingPhase::Docked
                        && s.docking.target().map(|t| t.craft) == Some(id)
                })
                .map(|s| s.craft.id)
                .ok_or_else(|| FlightError::precondition(format!("craft {} is not docked", id.0)))?
        };
        let target = self
            .slot(initiator)?
            .docking
            .target()
            .ok_or_else(|| FlightError::precondition("docking target missing"))?;
        let (a, b) = pair_mut(&mut self.slots, initiator.0, target.craft.0)?;
        a.docking.undock(&mut a.craft, &mut b.craft, &mut self.world)?;
        self.flush_events();
        Ok(())
    }

    // -- auto-tuning ---------------------------------------------------------

    /// Relay-tune `id`'s orientation loop against its live orientation error.
    pub fn start_autotune(&mut self, id: CraftId) -> Result<()> {
        let slot = self.slot_mut(id)?;
        slot.tuner.start(slot.autopilot.orientation_pid_mut())?;
        slot.tune_outcome = None;
        Ok(())
    }

    pub fn cancel_autotune(&mut self, id: CraftId) -> Result<bool> {
        let slot = self.slot_mut(id)?;
        Ok(slot.tuner.cancel(slot.autopilot.orientation_pid_mut()))
    }

    pub fn tuner(&self, id: CraftId) -> Result<&RelayAutoTuner> {
        Ok(&self.slot(id)?.tuner)
    }

    /// Result of the last finished tuning run, if any.
    pub fn tune_outcome(&self, id: CraftId) -> Result<Option<&Result<TuneResult>>> {
        Ok(self.slot(id)?.tune_outcome.as_ref())
    }

    // -- stepping ------------------------------------------------------------

    pub fn step(&mut self) -> Result<Vec<TelemetryRecord>> {
        let dt = self.config.sim.dt;
        self.flush_events();
        self.world.step(dt)?;
        self.time += dt;
        self.ticks += 1;

        let mut records = Vec::with_capacity(self.slots.len());
        for index in 0..self.slots.len() {
            self.update_docking(index)?;
            records.push(self.control(index, dt)?);
        }
        self.flush_events();
        Ok(records)
    }

    fn update_docking(&mut self, index: usize) -> Result<()> {
        let slot = &self.slots[index];
        let Some(target) = slot.docking.target().filter(|_| slot.docking.is_active()) else {
            return Ok(());
        };
        let our_body = self.world.snapshot(slot.craft.body)?;
        let their_body = self.world.snapshot(self.slot(target.craft)?.craft.body)?;
        let (ours, theirs) = pair_mut(&mut self.slots, index, target.craft.0)?;
        ours.docking.update(
            &mut ours.craft,
            &our_body,
            &mut theirs.craft,
            &their_body,
            &mut ours.autopilot,
            &mut self.world,
        )?;
        Ok(())
    }

    fn control(&mut self, index: usize, dt: f64) -> Result<TelemetryRecord> {
        let time = self.time;
        let slot = &mut self.slots[index];
        let id = slot.craft.id;
        let active = self.active == Some(id);
        let body = self.world.snapshot(slot.craft.body)?;

        let auto = slot.autopilot.compute(&body, dt)?;
        if slot.tuner.is_running() {
            let error = slot.autopilot.telemetry().orientation_error;
            match slot.tuner.tick(slot.autopilot.orientation_pid_mut(), error, dt) {
                Ok(TuneStatus::Completed(result)) => slot.tune_outcome = Some(Ok(result)),
                Ok(_) => {}
                Err(e) if e.is_timeout() => {
                    warn!(craft = id.0, "auto-tuning gave up: {e}");
                    slot.tune_outcome = Some(Err(e));
                }
                Err(e) => return Err(e),
            }
        }

        let allocator = *slot.autopilot.allocator();
        let manual = if active && !slot.manual.is_neutral() {
            allocator.manual(&slot.manual)
        } else {
            ThrusterCommand::idle()
        };
        let command = allocator.finalize(&auto, &manual, active);
        let mut sink = BodyThrusters {
            body: self.world.body_mut(slot.craft.body)?,
            layout: &slot.craft.thrusters,
        };
        allocator.dispatch(&command, &mut sink);
        slot.command = command;

        Ok(TelemetryRecord {
            time,
            craft: id,
            position: body.position(),
            velocity: body.linear_velocity(),
            orientation: body.orientation(),
            angular_velocity: body.angular_velocity(),
            autopilot_phase: slot.autopilot.phase(),
            docking_phase: slot.docking.phase(),
            orientation_error: slot.autopilot.telemetry().orientation_error,
            docking_range: slot.docking.measurements().map(|m| m.range),
            total_thrust: command.total(),
            firing: command.visibility().iter().filter(|&&on| on).count(),
        })
    }

    /// Advance `ticks` steps and collect all telemetry.
    pub fn run_for(&mut self, ticks: usize) -> Result<Vec<TelemetryRecord>> {
        let mut log = Vec::with_capacity(ticks * self.slots.len());
        for _ in 0..ticks {
            log.extend(self.step()?);
        }
        Ok(log)
    }

    /// Step until `done` holds or `max_ticks` elapse. Returns whether `done` held.
    pub fn run_until(
        &mut self,
        max_ticks: usize,
        mut done: impl FnMut(&Simulation) -> bool,
    ) -> Result<bool> {
        for _ in 0..max_ticks {
            self.step()?;
            if done(self) {
                return Ok(true);
            }
        }
        Ok(false)
    }

}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::body::BodyHandle;
    use crate::gnc::AutopilotMode;
    use crate::vehicle::{presets, PortLink};
    use std::f64::consts::PI;

    fn at(z: f64) -> RigidBodyState {
        RigidBodyState::at_rest(Vector3::new(0.0, 0.0, z), UnitQuaternion::identity())
    }

    fn sim() -> Simulation {
        Simulation::new(FlightConfig::default()).unwrap()
    }

    #[test]
    fn craft_at_rest_on_target_fires_nothing() {
        let mut s = sim();
        let a = s.spawn(presets::shuttle(), at(0.0)).unwrap();
        let ap = s.autopilot_mut(a).unwrap();
        ap.set_mode(AutopilotMode::OrientationMatch, true);
        ap.set_target_orientation(UnitQuaternion::identity());

        let records = s.run_for(30).unwrap();
        assert!(s.command(a).unwrap().is_idle());
        assert!(records.iter().all(|r| r.autopilot_phase == AutopilotPhase::Idle));
        assert!(records.iter().all(|r| r.firing == 0));
    }

    #[test]
    fn yaw_180_converges_and_settles() {
        let mut s = sim();
        let a = s.spawn(presets::shuttle(), at(0.0)).unwrap();
        let target = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), PI);
        let ap = s.autopilot_mut(a).unwrap();
        ap.set_mode(AutopilotMode::OrientationMatch, true);
        ap.set_target_orientation(target);
        let threshold = ap.config().autopilot_threshold;

        let errors: Vec<f64> = (0..1800)
            .map(|_| s.step().unwrap().remove(0).orientation_error)
            .collect();
        let crossed = errors
            .iter()
            .position(|&e| e < threshold)
            .expect("error never dropped below the threshold");

        for (tick, pair) in errors[..=crossed].windows(2).enumerate() {
            assert!(pair[1] <= pair[0] + 1e-9, "error grew at tick {}: {:?}", tick + 1, pair);
        }
        let worst = errors[crossed..].iter().cloned().fold(0.0, f64::max);
        assert!(worst < threshold, "drifted back out to {worst} after tick {crossed}");

        let end = s.snapshot(a).unwrap();
        assert!(end.angular_velocity().norm() < 0.005, "still spinning: {}", end.angular_velocity());
        assert_eq!(s.autopilot(a).unwrap().phase(), AutopilotPhase::Idle);
        assert!(end.state.pos.norm() < 1e-6, "rotation groups must not translate");
    }

    #[test]
    fn cancel_rotation_damps_spin_then_idles() {
        let mut s = sim();
        let mut state = at(0.0);
        state.omega = Vector3::new(0.3, 1.0, -0.2);
        let a = s.spawn(presets::shuttle(), state).unwrap();
        s.autopilot_mut(a).unwrap().set_mode(AutopilotMode::CancelRotation, true);

        let settled = s
            .run_until(1200, |s| {
                s.autopilot(a).map(|ap| ap.phase() == AutopilotPhase::Idle).unwrap_or(false)
            })
            .unwrap();
        assert!(settled);
        assert!(s.snapshot(a).unwrap().angular_velocity().norm() < 0.1);
        s.step().unwrap();
        assert!(s.command(a).unwrap().is_idle());
        assert!(s
            .events()
            .iter()
            .any(|e| e.event == FlightEvent::PhaseChanged {
                from: AutopilotPhase::Idle,
                to: AutopilotPhase::CancelMomentum,
            }));
    }

    #[test]
    fn inactive_craft_never_fires() {
        let mut s = sim();
        let _a = s.spawn(presets::shuttle(), at(0.0)).unwrap();
        let mut spinning = at(-20.0);
        spinning.omega = Vector3::new(0.0, 0.8, 0.0);
        let b = s.spawn(presets::shuttle(), spinning).unwrap();
        s.autopilot_mut(b).unwrap().set_mode(AutopilotMode::CancelRotation, true);
        s.set_manual_input(b, ManualInput { rotation: Vector3::x(), ..Default::default() })
            .unwrap();

        let records = s.run_for(60).unwrap();
        assert!(records.iter().filter(|r| r.craft == b).all(|r| r.firing == 0));
        assert!(s.command(b).unwrap().is_idle());
        let omega = s.snapshot(b).unwrap().angular_velocity();
        assert!((omega.y - 0.8).abs() < 1e-9);

        s.set_active(b).unwrap();
        s.step().unwrap();
        assert!(!s.command(b).unwrap().is_idle());
    }

    #[test]
    fn manual_yaw_spins_the_active_craft() {
        let mut s = sim();
        let a = s.spawn(presets::shuttle(), at(0.0)).unwrap();
        s.set_manual_input(a, ManualInput { rotation: Vector3::y(), ..Default::default() })
            .unwrap();
        s.run_for(30).unwrap();
        let omega = s.snapshot(a).unwrap().angular_velocity();
        assert!(omega.y > 0.1, "yaw rate {omega}");
        assert!(omega.x.abs() < 1e-9 && omega.z.abs() < 1e-9);
    }

    #[test]
    fn docking_from_ten_metres() {
        let mut s = sim();
        let a = s.spawn(presets::shuttle(), at(0.0)).unwrap();
        let b = s.spawn(presets::shuttle(), at(-10.0)).unwrap();
        s.start_docking(a, PortId::Front, b, PortId::Back).unwrap();

        let docked = s
            .run_until(4800, |s| {
                s.docking(a).map(|d| d.phase() == DockingPhase::Docked).unwrap_or(false)
            })
            .unwrap();
        assert!(docked, "stuck in {:?} after {} ticks", s.docking(a).unwrap().phase(), s.ticks());

        let (ca, cb) = (s.craft(a).unwrap(), s.craft(b).unwrap());
        assert_eq!(
            ca.port(PortId::Front).partner(),
            Some(PortLink { craft: b, port: PortId::Back })
        );
        assert_eq!(
            cb.port(PortId::Back).partner(),
            Some(PortLink { craft: a, port: PortId::Front })
        );
        assert!(s.world().is_locked(ca.body, cb.body));
        assert!(!s.autopilot(a).unwrap().modes().any());

        let phases: Vec<DockingPhase> = s
            .events()
            .iter()
            .filter_map(|e| match e.event {
                FlightEvent::DockingPhaseChanged { to, .. } if e.craft == a => Some(to),
                _ => None,
            })
            .collect();
        assert!(phases.ends_with(&[
            DockingPhase::Approaching,
            DockingPhase::Aligning,
            DockingPhase::Docking,
            DockingPhase::Docked,
        ]));

        // A third craft cannot take the occupied port.
        let c = s.spawn(presets::shuttle(), at(-30.0)).unwrap();
        assert!(s.start_docking(c, PortId::Front, b, PortId::Back).unwrap_err().is_precondition());

        // Either side may undock.
        s.undock(b).unwrap();
        assert!(!s.world().is_locked(s.craft(a).unwrap().body, s.craft(b).unwrap().body));
        assert!(s.undock(a).is_err());
    }

    #[test]
    fn docked_pair_moves_together() {
        let mut s = sim();
        let a = s.spawn(presets::shuttle(), at(0.0)).unwrap();
        let b = s.spawn(presets::tender(), at(-10.0)).unwrap();
        s.start_docking(a, PortId::Front, b, PortId::Back).unwrap();
        s.run_until(6000, |s| {
            s.docking(a).map(|d| d.phase() == DockingPhase::Docked).unwrap_or(false)
        })
        .unwrap();
        assert_eq!(s.docking(a).unwrap().phase(), DockingPhase::Docked);

        let gap = |s: &Simulation| {
            (s.snapshot(b).unwrap().position() - s.snapshot(a).unwrap().position()).norm()
        };
        let before = gap(&s);
        let forward = ManualInput { translation: -Vector3::z(), ..Default::default() };
        s.set_manual_input(a, forward).unwrap();
        s.run_for(60).unwrap();
        assert!((gap(&s) - before).abs() < 1e-6);
        assert!(s.snapshot(b).unwrap().linear_velocity().z < -0.1);
    }

    #[test]
    fn autotune_cannot_start_twice() {
        let mut s = sim();
        let a = s.spawn(presets::shuttle(), at(0.0)).unwrap();
        s.start_autotune(a).unwrap();
        assert!(s.start_autotune(a).unwrap_err().is_precondition());
        assert!(s.cancel_autotune(a).unwrap());
        assert!(!s.cancel_autotune(a).unwrap());
    }

    #[test]
    fn autotune_timeout_is_recorded_and_gains_kept() {
        let mut s = sim();
        let a = s.spawn(presets::shuttle(), at(0.0)).unwrap();
        let gains = s.autopilot(a).unwrap().orientation_pid().gains();
        s.start_autotune(a).unwrap();

        // No orientation goal: the error never moves, so no oscillation appears.
        let finished = s
            .run_until(7300, |s| s.tune_outcome(a).map(|o| o.is_some()).unwrap_or(false))
            .unwrap();
        assert!(finished);
        let outcome = s.tune_outcome(a).unwrap().cloned().unwrap();
        assert!(outcome.unwrap_err().is_timeout());
        assert_eq!(s.autopilot(a).unwrap().orientation_pid().gains(), gains);
        assert!(!s.tuner(a).unwrap().is_running());
        assert!(s
            .events()
            .iter()
            .any(|e| matches!(e.event, FlightEvent::TuningTimedOut { .. })));
    }

    #[test]
    fn unknown_craft_is_rejected() {
        let mut s = sim();
        assert!(s.set_active(CraftId(4)).unwrap_err().is_precondition());
        let a = s.spawn(presets::shuttle(), at(0.0)).unwrap();
        assert!(s.start_docking(a, PortId::Front, a, PortId::Back).is_err());
    }

    #[test]
    fn invalid_spec_is_rejected_at_spawn() {
        let mut s = sim();
        let mut spec = presets::shuttle();
        spec.mass = -1.0;
        assert!(s.spawn(spec, at(0.0)).unwrap_err().is_fatal());
        assert!(s.is_empty());
        assert!(s.world().body(BodyHandle(0)).is_err());
    }
}
