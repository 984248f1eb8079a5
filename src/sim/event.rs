use std::fmt;

use crate::docking::DockingPhase;
use crate::gnc::{AutopilotMode, AutopilotPhase, PidGains};
use crate::vehicle::{CraftId, PortLink};

// ---------------------------------------------------------------------------
// Flight events
// ---------------------------------------------------------------------------

/// Notifications raised by the autopilot, docking and tuning controllers.
#[derive(Debug, Clone, PartialEq)]
pub enum FlightEvent {
    PhaseChanged { from: AutopilotPhase, to: AutopilotPhase },
    ModeChanged { mode: AutopilotMode, enabled: bool },
    DockingPhaseChanged { from: DockingPhase, to: DockingPhase },
    Docked { ours: PortLink, theirs: PortLink },
    Undocked { ours: PortLink, theirs: PortLink },
    TuningCompleted { critical_gain: f64, critical_period: f64, gains: PidGains },
    TuningTimedOut { elapsed: f64, last_kp: f64 },
}

/// A flight event stamped with simulation time and the craft that raised it.
#[derive(Debug, Clone, PartialEq)]
pub struct SimEvent {
    pub time: f64,
    pub craft: CraftId,
    pub event: FlightEvent,
}

pub type Observer = Box<dyn FnMut(&FlightEvent)>;

/// Observer registry owned by a single controller instance.
#[derive(Default)]
pub struct EventSink {
    observers: Vec<Observer>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&FlightEvent) + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Deliver `event` to every observer in registration order.
    pub fn emit(&mut self, event: &FlightEvent) {
        for observer in &mut self.observers {
            observer(event);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn observers_receive_events_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut sink = EventSink::new();
        for tag in 0..2 {
            let seen = Rc::clone(&seen);
            sink.subscribe(move |e| seen.borrow_mut().push((tag, e.clone())));
        }
        let event = FlightEvent::PhaseChanged {
            from: AutopilotPhase::Idle,
            to: AutopilotPhase::CancelMomentum,
        };
        sink.emit(&event);
        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (0, event.clone()));
        assert_eq!(seen[1].0, 1);
    }

    #[test]
    fn empty_sink_is_a_no_op() {
        let mut sink = EventSink::new();
        sink.emit(&FlightEvent::TuningTimedOut { elapsed: 1.0, last_kp: 0.1 });
        assert!(sink.is_empty());
        assert_eq!(format!("{sink:?}"), "EventSink { observers: 0 }");
    }
}
