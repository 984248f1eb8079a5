pub mod body;
pub mod sixdof;
pub mod state;

pub use body::{
    moment_of_inertia, BodyHandle, BodySnapshot, Load, LockConstraints, LockHandle,
    MassProperties, RigidBodyControl, RigidBodyView,
};
pub use state::{body_forward, world_up, Deriv, RigidBodyState, SimConfig};
