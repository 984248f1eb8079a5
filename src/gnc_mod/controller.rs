use crate::dynamics::body::RigidBodyView;
use crate::error::Result;
use super::allocator::ThrusterCommand;

/// Trait for flight controllers.
///
/// Implement this to create custom attitude controllers that can be
/// plugged into the simulation loop.
pub trait Controller {
    /// Compute thruster forces from a snapshot of the controlled body.
    fn control(&mut self, body: &dyn RigidBodyView, dt: f64) -> Result<ThrusterCommand>;

    /// Reset controller internal state (e.g., PID integrators).
    fn reset(&mut self) {}

    /// Human-readable name for logging/display.
    fn name(&self) -> &str {
        "unnamed"
    }
}
