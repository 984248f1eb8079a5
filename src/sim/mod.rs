pub mod event;
pub mod integrator;
pub mod runner;
pub mod world;

pub use event::{EventSink, FlightEvent, Observer, SimEvent};
pub use integrator::rk4_step;
pub use runner::{Simulation, TelemetryRecord};
pub use world::{PhysicsWorld, RigidBody};
