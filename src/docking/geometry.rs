use nalgebra::{UnitQuaternion, Vector3};

use crate::dynamics::body::RigidBodyView;
use crate::gnc::guidance::{angle_between, look_rotation, safe_normalize};
use crate::vehicle::port::{DockingPort, PortId};

// ---------------------------------------------------------------------------
// Port-to-port measurements
// ---------------------------------------------------------------------------

/// A docking port resolved into the world frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortPose {
    pub position: Vector3<f64>,
    pub direction: Vector3<f64>,
    /// Owning body's up axis.
    pub up: Vector3<f64>,
    pub velocity: Vector3<f64>,
}

impl PortPose {
    pub fn of(port: &DockingPort, body: &dyn RigidBodyView) -> Self {
        let (position, direction) = port.world_pose(body);
        Self {
            position,
            direction,
            up: body.orientation() * Vector3::y(),
            velocity: body.linear_velocity(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DockingMeasurements {
    /// Distance between the two port positions, m.
    pub range: f64,
    /// Relative velocity along the line from our port to theirs; positive when closing, m/s.
    pub closing_speed: f64,
    /// Angle between our port direction and the reversed target direction, rad.
    pub alignment_error: f64,
    /// Distance of our port from the target port's axis, m.
    pub lateral_offset: f64,
    /// Angle between the two ports' right vectors, rad.
    pub roll_error: f64,
}

pub fn measure(ours: &PortPose, theirs: &PortPose) -> DockingMeasurements {
    let separation = theirs.position - ours.position;
    let closing_speed = (ours.velocity - theirs.velocity).dot(&safe_normalize(&separation));

    let approach = -theirs.direction;
    let d = ours.position - theirs.position;
    let lateral = d - theirs.direction * d.dot(&theirs.direction);

    // Each body's own up axis, not world up, so a vertical docking axis still has a roll.
    let our_right = ours.direction.cross(&ours.up);
    let their_right = approach.cross(&theirs.up);

    DockingMeasurements {
        range: separation.norm(),
        closing_speed,
        alignment_error: angle_between(&ours.direction, &approach),
        lateral_offset: lateral.norm(),
        roll_error: angle_between(&our_right, &their_right),
    }
}

/// Goal pose for our body: our port facing the target port, `standoff`
/// metres out along the target port's axis.
pub fn approach_target(
    theirs: &PortPose,
    our_port: PortId,
    our_port_offset: &Vector3<f64>,
    standoff: f64,
) -> Option<(UnitQuaternion<f64>, Vector3<f64>)> {
    let facing = look_rotation(&-theirs.direction, &theirs.up)?;
    let orientation = facing * our_port.port_frame().inverse();
    let position = theirs.position + theirs.direction * standoff - orientation * our_port_offset;
    Some((orientation, position))
}
