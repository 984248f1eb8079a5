// ---------------------------------------------------------------------------
// Relay-style auto-tuning of a VectorPid.
//
// The tuner runs as a tick-driven state machine: each call to
// RelayAutoTuner::tick feeds it one orientation-error sample. It
// raises Kp (with Ki = Kd = 0) until the error oscillates with a steady
// amplitude and period, then applies Ziegler–Nichols style gains.
// ---------------------------------------------------------------------------

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ensure_positive_dt, FlightError, Result};
use crate::sim::event::{EventSink, FlightEvent};
use super::pid::{GainTerm, PidGains, VectorPid};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoTuneConfig {
    pub initial_kp: f64,
    /// Kp multiplier applied after each window without sustained oscillation.
    pub kp_step_factor: f64,
    pub sample_interval: f64, // s
    pub window: f64,          // s
    pub min_cycles: usize,
    /// Allowed relative drift between early and late period estimates.
    pub period_tolerance: f64,
    /// Smallest swing must be at least this fraction of the largest.
    pub sustain_ratio: f64,
    /// Sample deltas at or below this are ignored when tracking slope.
    pub noise_band: f64,
    pub max_duration: f64, // s
    pub max_kp: f64,
}

impl Default for AutoTuneConfig {
    fn default() -> Self {
        Self {
            initial_kp: 0.1,
            kp_step_factor: 2.0,
            sample_interval: 0.05,
            window: 10.0,
            min_cycles: 5,
            period_tolerance: 0.1,
            sustain_ratio: 0.8,
            noise_band: 1e-3,
            max_duration: 120.0,
            max_kp: 1e4,
        }
    }
}

impl AutoTuneConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("initial_kp", self.initial_kp),
            ("sample_interval", self.sample_interval),
            ("window", self.window),
            ("period_tolerance", self.period_tolerance),
            ("sustain_ratio", self.sustain_ratio),
            ("max_duration", self.max_duration),
            ("max_kp", self.max_kp),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(FlightError::configuration(format!(
                    "autotune.{name} must be positive, got {value}"
                )));
            }
        }
        if !(self.kp_step_factor > 1.0) {
            return Err(FlightError::configuration(format!(
                "autotune.kp_step_factor must exceed 1, got {}",
                self.kp_step_factor
            )));
        }
        if self.min_cycles == 0 {
            return Err(FlightError::configuration("autotune.min_cycles must be at least 1"));
        }
        if !(self.noise_band >= 0.0) {
            return Err(FlightError::configuration("autotune.noise_band must be non-negative"));
        }
        Ok(())
    }
}

/// Outcome of a successful tuning run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TuneResult {
    pub critical_gain: f64,
    pub critical_period: f64,
    pub gains: PidGains,
    pub elapsed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TuneStatus {
    /// No run in progress.
    Idle,
    Running { kp: f64, elapsed: f64 },
    Completed(TuneResult),
}

/// Slope reversal: sample time and value at the turning point.
#[derive(Debug, Clone, Copy)]
struct Reversal {
    time: f64,
    value: f64,
}

#[derive(Debug, Clone)]
struct Session {
    saved: PidGains,
    kp: f64,
    elapsed: f64,
    window_elapsed: f64,
    sample_timer: f64,
    last: Option<(f64, f64)>,
    slope: i8,
    reversals: VecDeque<Reversal>,
}

impl Session {
    fn sample(&mut self, value: f64, noise_band: f64) {
        if let Some((t_last, v_last)) = self.last {
            let delta = value - v_last;
            if delta.abs() > noise_band {
                let slope = if delta > 0.0 { 1 } else { -1 };
                if self.slope != 0 && slope != self.slope {
                    self.reversals.push_back(Reversal { time: t_last, value: v_last });
                }
                self.slope = slope;
            }
        }
        self.last = Some((self.elapsed, value));
    }

    fn sustained(&self, ratio: f64) -> bool {
        let swings: Vec<f64> = self
            .reversals
            .iter()
            .zip(self.reversals.iter().skip(1))
            .map(|(a, b)| (b.value - a.value).abs())
            .collect();
        let (min, max) = swings
            .iter()
            .fold((f64::INFINITY, 0.0_f64), |(lo, hi), &s| (lo.min(s), hi.max(s)));
        !swings.is_empty() && min >= ratio * max
    }

    /// Mean full period if early and late estimates agree within `tolerance`.
    fn stable_period(&self, tolerance: f64) -> Option<f64> {
        let periods: Vec<f64> = self
            .reversals
            .iter()
            .zip(self.reversals.iter().skip(2))
            .map(|(a, b)| b.time - a.time)
            .collect();
        let half = periods.len() / 2;
        if half == 0 {
            return None;
        }
        let mean = |p: &[f64]| p.iter().sum::<f64>() / p.len() as f64;
        let (early, late) = (mean(&periods[..half]), mean(&periods[half..]));
        let overall = mean(&periods);
        ((early - late).abs() / overall <= tolerance).then_some(overall)
    }

    fn next_window(&mut self, factor: f64) {
        self.kp *= factor;
        self.window_elapsed = 0.0;
        self.sample_timer = 0.0;
        self.last = None;
        self.slope = 0;
        self.reversals.clear();
    }
}

#[derive(Debug)]
pub struct RelayAutoTuner {
    config: AutoTuneConfig,
    session: Option<Session>,
    events: EventSink,
}

impl RelayAutoTuner {
    pub fn new(config: AutoTuneConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            session: None,
            events: EventSink::new(),
        })
    }

    pub fn config(&self) -> &AutoTuneConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn current_kp(&self) -> Option<f64> {
        self.session.as_ref().map(|s| s.kp)
    }

    pub fn events_mut(&mut self) -> &mut EventSink {
        &mut self.events
    }

    /// Begin tuning `pid`. Its gains are saved and restored on timeout or cancel.
    pub fn start(&mut self, pid: &mut VectorPid) -> Result<()> {
        if self.is_running() {
            return Err(FlightError::precondition("auto-tuning is already running"));
        }
        let saved = pid.gains();
        pid.set_gains(PidGains::new(self.config.initial_kp, 0.0, 0.0));
        pid.reset();
        self.session = Some(Session {
            saved,
            kp: self.config.initial_kp,
            elapsed: 0.0,
            window_elapsed: 0.0,
            sample_timer: 0.0,
            last: None,
            slope: 0,
            reversals: VecDeque::new(),
        });
        info!(kp = self.config.initial_kp, "auto-tuning started");
        Ok(())
    }

    /// Abort a running session and put the original gains back.
    pub fn cancel(&mut self, pid: &mut VectorPid) -> bool {
        match self.session.take() {
            Some(session) => {
                pid.set_gains(session.saved);
                pid.reset();
                info!("auto-tuning cancelled");
                true
            }
            None => false,
        }
    }

    /// Advance by one tick with the latest error sample.
    ///
    /// Returns `ConvergenceTimeout` (gains restored) when the budget runs out.
    pub fn tick(&mut self, pid: &mut VectorPid, error: f64, dt: f64) -> Result<TuneStatus> {
        ensure_positive_dt(dt)?;
        let cfg = self.config;
        let Some(session) = self.session.as_mut() else {
            return Ok(TuneStatus::Idle);
        };

        session.elapsed += dt;
        session.window_elapsed += dt;
        session.sample_timer += dt;
        if session.sample_timer + 1e-9 >= cfg.sample_interval {
            session.sample_timer -= cfg.sample_interval;
            session.sample(error, cfg.noise_band);
        }

        if session.reversals.len() > 2 * cfg.min_cycles {
            if session.sustained(cfg.sustain_ratio) {
                if let Some(period) = session.stable_period(cfg.period_tolerance) {
                    return Ok(self.finish(pid, period));
                }
            }
            session.reversals.pop_front();
        } else if session.window_elapsed >= cfg.window {
            session.next_window(cfg.kp_step_factor);
            pid.set_gain(GainTerm::Proportional, session.kp);
            pid.reset();
            info!(kp = session.kp, "no sustained oscillation, raising Kp");
        }

        if session.elapsed >= cfg.max_duration || session.kp > cfg.max_kp {
            let (elapsed, last_kp, saved) = (session.elapsed, session.kp, session.saved);
            self.session = None;
            pid.set_gains(saved);
            pid.reset();
            warn!(elapsed, last_kp, "auto-tuning timed out");
            self.events.emit(&FlightEvent::TuningTimedOut { elapsed, last_kp });
            return Err(FlightError::ConvergenceTimeout { elapsed, last_kp });
        }
        Ok(TuneStatus::Running {
            kp: session.kp,
            elapsed: session.elapsed,
        })
    }

    fn finish(&mut self, pid: &mut VectorPid, period: f64) -> TuneStatus {
        let Some(session) = self.session.take() else {
            return TuneStatus::Idle;
        };
        let kp = 0.6 * session.kp;
        let gains = PidGains::new(kp, 2.0 * kp / period, kp * period / 8.0);
        pid.set_gains(gains);
        pid.reset();
        info!(
            critical_gain = session.kp,
            critical_period = period,
            kp = gains.kp,
            ki = gains.ki,
            kd = gains.kd,
            "auto-tuning complete"
        );
        self.events.emit(&FlightEvent::TuningCompleted {
            critical_gain: session.kp,
            critical_period: period,
            gains,
        });
        TuneStatus::Completed(TuneResult {
            critical_gain: session.kp,
            critical_period: period,
            gains,
            elapsed: session.elapsed,
        })
    }
}
