use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use nalgebra::{UnitQuaternion, Vector3};
use tracing::info;

use rcs_autopilot::docking::DockingPhase;
use rcs_autopilot::dynamics::RigidBodyState;
use rcs_autopilot::gnc::AutopilotMode;
use rcs_autopilot::io::write_telemetry_file;
use rcs_autopilot::sim::{FlightEvent, SimEvent, TelemetryRecord};
use rcs_autopilot::vehicle::{presets, CraftId, PortId};
use rcs_autopilot::{FlightConfig, Simulation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Yaw slew from rest to a target heading.
    Slew,
    /// Kill an initial tumble.
    Cancel,
    /// Port-to-port docking with a second craft.
    Dock,
    /// Relay auto-tune of the orientation loop during a slew.
    Autotune,
}

#[derive(Debug, Parser)]
#[command(version, about = "RCS autopilot scenario runner")]
struct Args {
    #[arg(long, value_enum, default_value_t = Scenario::Slew)]
    scenario: Scenario,
    /// TOML flight configuration; defaults are used for missing keys.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of ticks to run (default: sim.max_time / sim.dt).
    #[arg(long)]
    ticks: Option<usize>,
    #[arg(long, default_value_t = 180.0)]
    yaw_deg: f64,
    /// Distance between craft centres for the docking scenario, m.
    #[arg(long, default_value_t = 10.0)]
    separation: f64,
    /// Write per-tick telemetry to this CSV file.
    #[arg(long)]
    csv: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => FlightConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => FlightConfig::default(),
    };
    info!(scenario = ?args.scenario, dt = config.sim.dt, "configuration loaded");

    let max_ticks = args
        .ticks
        .unwrap_or((config.sim.max_time / config.sim.dt).round() as usize);
    let dt = config.sim.dt;
    let mut sim = Simulation::new(config)?;
    let mut start = RigidBodyState::at_rest(Vector3::zeros(), UnitQuaternion::identity());
    if args.scenario == Scenario::Cancel {
        start.omega = Vector3::new(0.4, 1.0, -0.3);
    }
    let ship = sim.spawn(presets::shuttle(), start)?;

    match args.scenario {
        Scenario::Slew | Scenario::Autotune => {
            let target = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), args.yaw_deg.to_radians());
            let ap = sim.autopilot_mut(ship)?;
            ap.set_mode(AutopilotMode::OrientationMatch, true);
            ap.set_target_orientation(target);
            if args.scenario == Scenario::Autotune {
                sim.start_autotune(ship)?;
            }
        }
        Scenario::Cancel => {
            sim.autopilot_mut(ship)?.set_mode(AutopilotMode::CancelRotation, true);
        }
        Scenario::Dock => {
            let target = sim.spawn(
                presets::tender(),
                RigidBodyState::at_rest(Vector3::new(0.0, 0.0, -args.separation), UnitQuaternion::identity()),
            )?;
            sim.start_docking(ship, PortId::Front, target, PortId::Back)?;
        }
    }

    // -----------------------------------------------------------------------
    // Run
    // -----------------------------------------------------------------------
    let mut log: Vec<TelemetryRecord> = Vec::with_capacity(max_ticks);
    for _ in 0..max_ticks {
        let records = sim.step()?;
        log.extend(records.into_iter().filter(|r| r.craft == ship));
        let finished = match args.scenario {
            Scenario::Dock => sim.docking(ship)?.phase() == DockingPhase::Docked,
            Scenario::Autotune => sim.tune_outcome(ship)?.is_some(),
            _ => false,
        };
        if finished {
            break;
        }
    }

    if let Some(path) = &args.csv {
        write_telemetry_file(path, &log).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), rows = log.len(), "telemetry written");
    }

    print_report(&sim, ship, args.scenario, &log, dt)
}

fn print_report(
    sim: &Simulation,
    ship: CraftId,
    scenario: Scenario,
    log: &[TelemetryRecord],
    dt: f64,
) -> Result<()> {
    let craft = sim.craft(ship)?;
    let end = sim.snapshot(ship)?;
    let autopilot = sim.autopilot(ship)?;

    println!();
    println!("====================================================================");
    println!("  RCS AUTOPILOT: {:?} / {}", scenario, craft.spec.name);
    println!("====================================================================");
    println!();
    println!("  Spacecraft");
    println!("  ──────────────────────────────────────────────────────────────────");
    println!(
        "  Mass:          {:>8.2} kg    Max thrust:   {:>8.2} N",
        craft.spec.mass, craft.spec.max_thrust
    );
    let h = craft.spec.half_extents;
    println!("  Half extents:  {:>5.2} x {:>5.2} x {:>5.2} m", h.x, h.y, h.z);
    println!();

    println!("  Flight Events");
    println!("  ──────────────────────────────────────────────────────────────────");
    for e in sim.events() {
        if let Some(line) = describe(e) {
            println!("  t={:>7.2}s  craft {}  {}", e.time, e.craft.0, line);
        }
    }
    println!();

    println!("  Final State");
    println!("  ──────────────────────────────────────────────────────────────────");
    println!(
        "  Phase:         {:>20}   Orientation error: {:>7.3} deg",
        autopilot.phase().to_string(),
        autopilot.telemetry().orientation_error.to_degrees()
    );
    println!(
        "  |omega|:       {:>8.4} rad/s  |v|:          {:>8.4} m/s",
        end.state.omega.norm(),
        end.state.vel.norm()
    );
    println!(
        "  Position:      ({:>7.3}, {:>7.3}, {:>7.3}) m",
        end.state.pos.x, end.state.pos.y, end.state.pos.z
    );
    if let Some(outcome) = sim.tune_outcome(ship)? {
        match outcome {
            Ok(r) => println!(
                "  Tuned gains:   Kp={:.4} Ki={:.4} Kd={:.4}  (Kc={:.3}, Tc={:.3}s)",
                r.gains.kp, r.gains.ki, r.gains.kd, r.critical_gain, r.critical_period
            ),
            Err(e) => println!("  Auto-tune:     {e}"),
        }
    }
    println!();

    println!("  Timeline");
    println!("  ──────────────────────────────────────────────────────────────────");
    println!(
        "  {:>7}  {:>20}  {:>9}  {:>9}  {:>8}  {:>6}",
        "t (s)", "phase", "err (deg)", "|w| rad/s", "range", "firing"
    );
    println!("  {}", "─".repeat(66));
    let sample_interval = (log.len() / 30).max(1);
    for (i, r) in log.iter().enumerate() {
        if i % sample_interval != 0 && i != log.len() - 1 {
            continue;
        }
        let range = r.docking_range.map(|d| format!("{d:.2}")).unwrap_or_else(|| "-".into());
        println!(
            "  {:>7.2}  {:>20}  {:>9.3}  {:>9.4}  {:>8}  {:>6}",
            r.time,
            r.autopilot_phase.to_string(),
            r.orientation_error.to_degrees(),
            r.angular_velocity.norm(),
            range,
            r.firing
        );
    }

    println!();
    println!("  Simulation: {} ticks, dt={:.4} s", sim.ticks(), dt);
    println!("====================================================================");
    println!();
    Ok(())
}

fn describe(e: &SimEvent) -> Option<String> {
    let line = match &e.event {
        FlightEvent::PhaseChanged { from, to } => format!("autopilot {from} -> {to}"),
        FlightEvent::DockingPhaseChanged { from, to } => format!("docking {from} -> {to}"),
        FlightEvent::Docked { ours, theirs } => format!(
            "DOCKED    {} port to craft {} {} port",
            ours.port, theirs.craft.0, theirs.port
        ),
        FlightEvent::Undocked { .. } => "UNDOCKED".into(),
        FlightEvent::TuningCompleted { critical_gain, critical_period, .. } => {
            format!("TUNED     Kc={critical_gain:.3} Tc={critical_period:.3}s")
        }
        FlightEvent::TuningTimedOut { elapsed, last_kp } => {
            format!("TUNE TIMEOUT after {elapsed:.1}s (Kp {last_kp:.3})")
        }
        FlightEvent::ModeChanged { .. } => return None,
    };
    Some(line)
}
