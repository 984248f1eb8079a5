use std::f64::consts::PI;

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

// ---------------------------------------------------------------------------
// Guidance: attitude error and target-facing orientations
// ---------------------------------------------------------------------------

/// Below this sine of the half-angle the rotation axis is undefined.
const AXIS_EPSILON: f64 = 1e-6;
/// Vectors shorter than this are treated as zero before normalising.
const VECTOR_EPSILON: f64 = 1e-9;

/// Rotation taking the current attitude onto the target, renormalised.
pub fn error_quaternion(
    target: &UnitQuaternion<f64>,
    current: &UnitQuaternion<f64>,
) -> UnitQuaternion<f64> {
    UnitQuaternion::new_normalize((target * current.inverse()).into_inner())
}

/// Shortest-path angular distance in radians, in `[0, π]`.
pub fn orientation_error(target: &UnitQuaternion<f64>, current: &UnitQuaternion<f64>) -> f64 {
    let q = error_quaternion(target, current);
    2.0 * q.w.abs().clamp(-1.0, 1.0).acos()
}

/// Axis-angle vector (axis * angle) of `q`, folded onto the shortest path.
///
/// Returns zero when the half-angle sine is too small for the axis to be
/// meaningful.
pub fn shortest_axis_angle(q: &UnitQuaternion<f64>) -> Vector3<f64> {
    let w = q.w.clamp(-1.0, 1.0);
    let mut angle = 2.0 * w.acos();
    let s = (1.0 - w * w).max(0.0).sqrt();
    if s < AXIS_EPSILON {
        return Vector3::zeros();
    }
    let mut axis = q.imag() / s;
    if angle > PI {
        axis = -axis;
        angle = 2.0 * PI - angle;
    }
    axis * angle
}

/// Bounded response curve on the normalised error `n = error / π`:
/// `0.5 * n / (n + knee)`, never above 0.5.
pub fn response_signal(orientation_error: f64, knee: f64) -> f64 {
    let n = (orientation_error / PI).max(0.0);
    if n + knee <= 0.0 {
        return 0.0;
    }
    0.5 * n / (n + knee)
}

/// Unit vector along `v`, or zero for a near-zero input.
pub fn safe_normalize(v: &Vector3<f64>) -> Vector3<f64> {
    let n = v.norm();
    if n < VECTOR_EPSILON || !n.is_finite() {
        Vector3::zeros()
    } else {
        v / n
    }
}

/// Angle between two directions; zero if either is degenerate.
pub fn angle_between(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    let (a, b) = (safe_normalize(a), safe_normalize(b));
    if a == Vector3::zeros() || b == Vector3::zeros() {
        return 0.0;
    }
    a.dot(&b).clamp(-1.0, 1.0).acos()
}

/// Orientation whose nose (body -z) points along `forward`, with body +y
/// as close to `up` as possible.
///
/// `None` when `forward` is degenerate. When `forward` is parallel to `up`
/// a fallback secondary axis is used.
pub fn look_rotation(forward: &Vector3<f64>, up: &Vector3<f64>) -> Option<UnitQuaternion<f64>> {
    let fwd = safe_normalize(forward);
    if fwd == Vector3::zeros() {
        return None;
    }
    let z = -fwd;
    let mut x = up.cross(&z);
    if x.norm() < AXIS_EPSILON {
        let fallback = if z.z.abs() < 0.9 { Vector3::z() } else { Vector3::x() };
        x = fallback.cross(&z);
    }
    let x = x.normalize();
    let y = z.cross(&x);
    let basis = Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[x, y, z]));
    Some(UnitQuaternion::from_rotation_matrix(&basis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn samples() -> Vec<UnitQuaternion<f64>> {
        vec![
            UnitQuaternion::identity(),
            UnitQuaternion::from_euler_angles(0.3, -1.2, 2.9),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), PI),
            UnitQuaternion::from_euler_angles(-3.0, 0.01, 0.7),
        ]
    }

    #[test]
    fn error_to_self_is_zero() {
        for q in samples() {
            assert_relative_eq!(orientation_error(&q, &q), 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn error_ignores_double_cover() {
        for q in samples() {
            let flipped = UnitQuaternion::new_unchecked(-q.into_inner());
            assert_relative_eq!(orientation_error(&flipped, &q), 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn half_turn_yaw_is_pi() {
        let target = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), PI);
        let err = orientation_error(&target, &UnitQuaternion::identity());
        assert_relative_eq!(err, PI, epsilon = 1e-9);
    }

    #[test]
    fn axis_angle_takes_shortest_path() {
        let q = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), FRAC_PI_2);
        assert_relative_eq!(shortest_axis_angle(&q), Vector3::new(0.0, FRAC_PI_2, 0.0), epsilon = 1e-12);

        // 270° about +y is 90° about -y.
        let long_way = UnitQuaternion::new_unchecked(-q.into_inner());
        assert_relative_eq!(
            shortest_axis_angle(&long_way),
            Vector3::new(0.0, -FRAC_PI_2, 0.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn axis_angle_of_identity_is_zero() {
        let v = shortest_axis_angle(&UnitQuaternion::identity());
        assert_eq!(v, Vector3::zeros());
        assert!(v.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn response_is_bounded() {
        assert_eq!(response_signal(0.0, 0.02), 0.0);
        assert!(response_signal(PI, 0.02) < 0.5);
        assert!(response_signal(1.0, 0.02) > response_signal(0.1, 0.02));
    }

    #[test]
    fn look_rotation_points_nose_along_forward() {
        let dir = Vector3::new(3.0, 0.0, 4.0);
        let q = look_rotation(&dir, &Vector3::y()).unwrap();
        assert_relative_eq!(q * -Vector3::z(), dir.normalize(), epsilon = 1e-12);
        assert_relative_eq!((q * Vector3::y()).dot(&Vector3::y()), 1.0, epsilon = 1e-12);

        let ident = look_rotation(&-Vector3::z(), &Vector3::y()).unwrap();
        assert_relative_eq!(orientation_error(&ident, &UnitQuaternion::identity()), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn look_rotation_handles_degenerate_inputs() {
        assert!(look_rotation(&Vector3::zeros(), &Vector3::y()).is_none());
        let straight_up = look_rotation(&Vector3::y(), &Vector3::y()).unwrap();
        assert_relative_eq!(straight_up * -Vector3::z(), Vector3::y(), epsilon = 1e-12);
        assert_eq!(angle_between(&Vector3::zeros(), &Vector3::x()), 0.0);
        assert_eq!(safe_normalize(&Vector3::new(1e-12, 0.0, 0.0)), Vector3::zeros());
    }
}
