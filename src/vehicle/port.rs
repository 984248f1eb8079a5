use std::fmt;

use nalgebra::{UnitQuaternion, Vector3};

use crate::dynamics::body::RigidBodyView;
use crate::error::{FlightError, Result};
use super::spacecraft::CraftId;

// ---------------------------------------------------------------------------
// Docking ports: one at the nose, one at the tail
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortId {
    Front,
    Back,
}

impl PortId {
    pub const ALL: [PortId; 2] = [PortId::Front, PortId::Back];

    pub fn index(self) -> usize {
        match self {
            PortId::Front => 0,
            PortId::Back => 1,
        }
    }

    /// Outward direction in the body frame.
    pub fn local_direction(self) -> Vector3<f64> {
        match self {
            PortId::Front => -Vector3::z(),
            PortId::Back => Vector3::z(),
        }
    }

    pub fn local_offset(self, half_extents: &Vector3<f64>) -> Vector3<f64> {
        self.local_direction() * half_extents.z
    }

    /// Rotation taking the body nose onto this port's direction.
    pub fn port_frame(self) -> UnitQuaternion<f64> {
        match self {
            PortId::Front => UnitQuaternion::identity(),
            PortId::Back => {
                UnitQuaternion::from_axis_angle(&Vector3::y_axis(), std::f64::consts::PI)
            }
        }
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortId::Front => write!(f, "front"),
            PortId::Back => write!(f, "back"),
        }
    }
}

/// Reference to the spacecraft and port on the other side of a dock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortLink {
    pub craft: CraftId,
    pub port: PortId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DockingPort {
    pub id: PortId,
    pub offset: Vector3<f64>,    // m, body frame
    pub direction: Vector3<f64>, // unit, body frame
    docked_to: Option<PortLink>,
}

impl DockingPort {
    pub fn new(id: PortId, half_extents: &Vector3<f64>) -> Self {
        Self {
            id,
            offset: id.local_offset(half_extents),
            direction: id.local_direction(),
            docked_to: None,
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.docked_to.is_some()
    }

    pub fn partner(&self) -> Option<PortLink> {
        self.docked_to
    }

    /// World-frame position and outward direction on the given body.
    pub fn world_pose(&self, body: &dyn RigidBodyView) -> (Vector3<f64>, Vector3<f64>) {
        let q = body.orientation();
        (body.position() + q * self.offset, q * self.direction)
    }
}

/// Mark two ports as docked to each other.
///
/// Fails without touching either port if one of them is already occupied.
pub fn dock(
    ours: &mut DockingPort,
    our_craft: CraftId,
    theirs: &mut DockingPort,
    their_craft: CraftId,
) -> Result<()> {
    if our_craft == their_craft {
        return Err(FlightError::precondition("cannot dock a spacecraft to itself"));
    }
    for (port, craft) in [(&*ours, our_craft), (&*theirs, their_craft)] {
        if port.is_occupied() {
            return Err(FlightError::precondition(format!(
                "{} port of craft {} is already occupied",
                port.id, craft.0
            )));
        }
    }
    ours.docked_to = Some(PortLink { craft: their_craft, port: theirs.id });
    theirs.docked_to = Some(PortLink { craft: our_craft, port: ours.id });
    Ok(())
}

/// Clear both sides of a dock. The ports must reference each other.
pub fn undock(
    ours: &mut DockingPort,
    our_craft: CraftId,
    theirs: &mut DockingPort,
    their_craft: CraftId,
) -> Result<()> {
    let expected_ours = Some(PortLink { craft: their_craft, port: theirs.id });
    let expected_theirs = Some(PortLink { craft: our_craft, port: ours.id });
    if ours.docked_to != expected_ours || theirs.docked_to != expected_theirs {
        return Err(FlightError::precondition(format!(
            "{} port of craft {} is not docked to the {} port of craft {}",
            ours.id, our_craft.0, theirs.id, their_craft.0
        )));
    }
    ours.docked_to = None;
    theirs.docked_to = None;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn h() -> Vector3<f64> {
        Vector3::new(0.5, 0.5, 1.0)
    }

    #[test]
    fn ports_sit_at_nose_and_tail() {
        let front = DockingPort::new(PortId::Front, &h());
        let back = DockingPort::new(PortId::Back, &h());
        assert_relative_eq!(front.offset, Vector3::new(0.0, 0.0, -1.0));
        assert_relative_eq!(back.direction, Vector3::z());
        assert_relative_eq!(PortId::Back.port_frame() * -Vector3::z(), Vector3::z(), epsilon = 1e-12);
    }

    #[test]
    fn dock_links_ports_both_ways() {
        let mut a = DockingPort::new(PortId::Front, &h());
        let mut b = DockingPort::new(PortId::Back, &h());
        dock(&mut a, CraftId(0), &mut b, CraftId(1)).unwrap();
        assert_eq!(a.partner(), Some(PortLink { craft: CraftId(1), port: PortId::Back }));
        assert_eq!(b.partner(), Some(PortLink { craft: CraftId(0), port: PortId::Front }));

        undock(&mut a, CraftId(0), &mut b, CraftId(1)).unwrap();
        assert!(!a.is_occupied() && !b.is_occupied());
    }

    #[test]
    fn docking_an_occupied_port_fails_without_changes() {
        let mut a = DockingPort::new(PortId::Front, &h());
        let mut b = DockingPort::new(PortId::Back, &h());
        let mut c = DockingPort::new(PortId::Front, &h());
        dock(&mut a, CraftId(0), &mut b, CraftId(1)).unwrap();
        let (a_before, b_before, c_before) = (a.clone(), b.clone(), c.clone());

        let err = dock(&mut c, CraftId(2), &mut b, CraftId(1)).unwrap_err();
        assert!(err.is_precondition());
        assert_eq!(a, a_before);
        assert_eq!(b, b_before);
        assert_eq!(c, c_before);
    }

    #[test]
    fn undock_requires_matching_partners() {
        let mut a = DockingPort::new(PortId::Front, &h());
        let mut b = DockingPort::new(PortId::Back, &h());
        assert!(undock(&mut a, CraftId(0), &mut b, CraftId(1)).is_err());
    }
}
