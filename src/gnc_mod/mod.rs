pub mod allocator;
pub mod autopilot;
pub mod autotune;
pub mod controller;
pub mod guidance;
pub mod pid;

pub use allocator::{calculate_force_per_thruster, ManualInput, ThrusterAllocator, ThrusterCommand, ThrusterSink};
pub use autopilot::{
    AutopilotConfig, AutopilotController, AutopilotMode, AutopilotModes, AutopilotPhase,
    AutopilotTelemetry, RotationGoal, TranslationGoal,
};
pub use autotune::{AutoTuneConfig, RelayAutoTuner, TuneResult, TuneStatus};
pub use controller::Controller;
pub use guidance::{look_rotation, orientation_error, shortest_axis_angle};
pub use pid::{GainTerm, PidGains, VectorPid};
