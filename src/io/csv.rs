use std::io::{self, Write};
use std::path::Path;

use crate::sim::TelemetryRecord;

/// Write per-tick telemetry in CSV format.
///
/// Columns: time, craft, pos_x, pos_y, pos_z, vel_x, vel_y, vel_z,
///          quat_w, quat_x, quat_y, quat_z, omega_x, omega_y, omega_z,
///          autopilot_phase, docking_phase, orientation_error_deg,
///          docking_range, total_thrust, firing
pub fn write_telemetry<W: Write>(writer: &mut W, records: &[TelemetryRecord]) -> io::Result<()> {
    writeln!(
        writer,
        "time,craft,pos_x,pos_y,pos_z,vel_x,vel_y,vel_z,\
         quat_w,quat_x,quat_y,quat_z,omega_x,omega_y,omega_z,\
         autopilot_phase,docking_phase,orientation_error_deg,\
         docking_range,total_thrust,firing"
    )?;

    for r in records {
        let q = r.orientation.quaternion();
        // Empty field when no docking run has measured a range.
        let range = r.docking_range.map(|d| format!("{d:.4}")).unwrap_or_default();
        writeln!(
            writer,
            "{:.4},{},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},\
             {:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},\
             {},{},{:.3},{},{:.4},{}",
            r.time,
            r.craft.0,
            r.position.x, r.position.y, r.position.z,
            r.velocity.x, r.velocity.y, r.velocity.z,
            q.w, q.i, q.j, q.k,
            r.angular_velocity.x, r.angular_velocity.y, r.angular_velocity.z,
            r.autopilot_phase,
            r.docking_phase,
            r.orientation_error.to_degrees(),
            range,
            r.total_thrust,
            r.firing,
        )?;
    }

    Ok(())
}

/// Write telemetry to a CSV file at the given path.
pub fn write_telemetry_file(path: impl AsRef<Path>, records: &[TelemetryRecord]) -> io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    write_telemetry(&mut file, records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docking::DockingPhase;
    use crate::gnc::AutopilotPhase;
    use crate::vehicle::CraftId;
    use nalgebra::{UnitQuaternion, Vector3};

    fn record(time: f64, range: Option<f64>) -> TelemetryRecord {
        TelemetryRecord {
            time,
            craft: CraftId(1),
            position: Vector3::new(0.0, 0.0, -3.0),
            velocity: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            angular_velocity: Vector3::zeros(),
            autopilot_phase: AutopilotPhase::FineAlign,
            docking_phase: DockingPhase::Aligning,
            orientation_error: 0.1,
            docking_range: range,
            total_thrust: 0.5,
            firing: 4,
        }
    }

    #[test]
    fn csv_output_has_header_and_rows() {
        let records = vec![record(0.0, None), record(1.0 / 60.0, Some(2.5))];

        let mut buf = Vec::new();
        write_telemetry(&mut buf, &records).unwrap();
        let output = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert!(lines[0].starts_with("time,craft,"));
        assert_eq!(lines.len(), 3); // header + 2 data rows
        assert!(lines[1].starts_with("0.0000,1,"));

        let header = lines[0].split(',').count();
        for row in &lines[1..] {
            assert_eq!(row.split(',').count(), header);
        }
        assert!(lines[2].contains(",2.5000,"));
    }
}
