pub mod port;
pub mod rcs;
pub mod spacecraft;

pub use port::{DockingPort, PortId, PortLink};
pub use rcs::{thruster_layout, Thruster, ThrusterGroup, THRUSTER_COUNT};
pub use spacecraft::{presets, CraftId, Spacecraft, SpacecraftBuilder, SpacecraftSpec};
