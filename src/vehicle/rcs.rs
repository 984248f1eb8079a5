use nalgebra::Vector3;

use crate::dynamics::body::Load;

// ---------------------------------------------------------------------------
// RCS thruster array: 24 thrusters, three per box corner
// ---------------------------------------------------------------------------
//
// Index = corner * 3 + axis. Corner bits select the sign of each half
// extent (bit 0 → x, bit 1 → y, bit 2 → z). Each thruster pushes inward
// along its axis.

pub const THRUSTER_COUNT: usize = 24;

/// One thruster: mounting point and unit force direction, both body frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thruster {
    pub position: Vector3<f64>,
    pub direction: Vector3<f64>,
}

fn corner_sign(corner: usize, axis: usize) -> f64 {
    if corner & (1 << axis) != 0 {
        1.0
    } else {
        -1.0
    }
}

/// Thruster positions and directions for a box with the given half extents.
pub fn thruster_layout(half_extents: &Vector3<f64>) -> [Thruster; THRUSTER_COUNT] {
    std::array::from_fn(|i| {
        let (corner, axis) = (i / 3, i % 3);
        let signs = Vector3::from_fn(|k, _| corner_sign(corner, k));
        let mut direction = Vector3::zeros();
        direction[axis] = -signs[axis];
        Thruster {
            position: signs.component_mul(half_extents),
            direction,
        }
    })
}

/// Body-frame load produced by firing the array with the given magnitudes.
pub fn net_load(layout: &[Thruster; THRUSTER_COUNT], forces: &[f64; THRUSTER_COUNT]) -> Load {
    let mut load = Load::default();
    for (t, &f) in layout.iter().zip(forces) {
        if f > 0.0 {
            load.add_local_force(t.direction * f, t.position);
        }
    }
    load
}

// ---------------------------------------------------------------------------
// Static thruster groups
// ---------------------------------------------------------------------------

/// Logical control groups. Rotation groups produce pure torque about one
/// body axis (pitch = x, yaw = y, roll = z); translation groups produce
/// pure force along one body axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThrusterGroup {
    PitchPositive,
    PitchNegative,
    YawPositive,
    YawNegative,
    RollPositive,
    RollNegative,
    /// Force along the nose (-z).
    Forward,
    Back,
    Up,
    Down,
    Right,
    Left,
}

impl ThrusterGroup {
    pub const ALL: [ThrusterGroup; 12] = [
        Self::PitchPositive,
        Self::PitchNegative,
        Self::YawPositive,
        Self::YawNegative,
        Self::RollPositive,
        Self::RollNegative,
        Self::Forward,
        Self::Back,
        Self::Up,
        Self::Down,
        Self::Right,
        Self::Left,
    ];

    pub fn indices(self) -> &'static [usize] {
        match self {
            Self::PitchPositive => &[8, 11, 14, 17],
            Self::PitchNegative => &[2, 5, 20, 23],
            Self::YawPositive => &[3, 9, 12, 18],
            Self::YawNegative => &[0, 6, 15, 21],
            Self::RollPositive => &[4, 7, 16, 19],
            Self::RollNegative => &[1, 10, 13, 22],
            Self::Forward => &[14, 17, 20, 23],
            Self::Back => &[2, 5, 8, 11],
            Self::Up => &[1, 4, 13, 16],
            Self::Down => &[7, 10, 19, 22],
            Self::Right => &[0, 6, 12, 18],
            Self::Left => &[3, 9, 15, 21],
        }
    }

    /// (positive, negative) rotation groups for body axis 0 = pitch, 1 = yaw, 2 = roll.
    pub fn rotation_pair(axis: usize) -> (Self, Self) {
        match axis {
            0 => (Self::PitchPositive, Self::PitchNegative),
            1 => (Self::YawPositive, Self::YawNegative),
            _ => (Self::RollPositive, Self::RollNegative),
        }
    }

    /// (positive, negative) translation groups for body axis x, y, z.
    pub fn translation_pair(axis: usize) -> (Self, Self) {
        match axis {
            0 => (Self::Right, Self::Left),
            1 => (Self::Up, Self::Down),
            _ => (Self::Back, Self::Forward),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn fire(group: ThrusterGroup) -> Load {
        let layout = thruster_layout(&Vector3::new(0.5, 0.75, 1.0));
        let mut forces = [0.0; THRUSTER_COUNT];
        for &i in group.indices() {
            forces[i] = 1.0;
        }
        net_load(&layout, &forces)
    }

    #[test]
    fn thrusters_sit_on_corners_and_push_inward() {
        let h = Vector3::new(0.5, 0.75, 1.0);
        for t in thruster_layout(&h) {
            assert_relative_eq!(t.position.abs(), h);
            assert_relative_eq!(t.direction.norm(), 1.0);
            assert!(t.position.dot(&t.direction) < 0.0);
        }
    }

    #[test]
    fn rotation_groups_give_pure_torque_about_their_axis() {
        for axis in 0..3 {
            let (pos, neg) = ThrusterGroup::rotation_pair(axis);
            for (group, sign) in [(pos, 1.0), (neg, -1.0)] {
                let load = fire(group);
                assert_relative_eq!(load.force, Vector3::zeros(), epsilon = 1e-12);
                assert!(load.torque[axis] * sign > 0.0, "{group:?}");
                for other in (0..3).filter(|&k| k != axis) {
                    assert_relative_eq!(load.torque[other], 0.0, epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn translation_groups_give_pure_force_along_their_axis() {
        for axis in 0..3 {
            let (pos, neg) = ThrusterGroup::translation_pair(axis);
            for (group, sign) in [(pos, 1.0), (neg, -1.0)] {
                let load = fire(group);
                assert_relative_eq!(load.torque, Vector3::zeros(), epsilon = 1e-12);
                assert_relative_eq!(load.force[axis], 4.0 * sign, epsilon = 1e-12);
            }
        }
        assert_relative_eq!(fire(ThrusterGroup::Forward).force, Vector3::new(0.0, 0.0, -4.0));
    }

    #[test]
    fn groups_within_a_family_are_disjoint() {
        let mut rotation = vec![];
        let mut translation = vec![];
        for g in ThrusterGroup::ALL {
            assert_eq!(g.indices().len(), 4);
            let bucket = if matches!(
                g,
                ThrusterGroup::Forward
                    | ThrusterGroup::Back
                    | ThrusterGroup::Up
                    | ThrusterGroup::Down
                    | ThrusterGroup::Right
                    | ThrusterGroup::Left
            ) {
                &mut translation
            } else {
                &mut rotation
            };
            bucket.extend_from_slice(g.indices());
        }
        rotation.sort_unstable();
        translation.sort_unstable();
        let all: Vec<usize> = (0..THRUSTER_COUNT).collect();
        assert_eq!(rotation, all);
        assert_eq!(translation, all);
    }
}
