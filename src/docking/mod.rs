pub mod controller;
pub mod geometry;

pub use controller::{DockingConfig, DockingController, DockingPhase, DockingTarget};
pub use geometry::{approach_target, measure, DockingMeasurements, PortPose};
