//! Measurement polling, derived telemetry, and auto-reset policies.
//!
//! One [`Telemetry::tick`] per second (the embedder drives the cadence)
//! measures both channels, derives power, infers whether the output is
//! active, integrates on-time and energy, and applies the configured
//! auto-reset policy. Accumulators and histories only ever advance inside a
//! tick; a failed read degrades to a zero sample and the loop keeps going.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use crate::protocol::Psu;
use crate::transport::LineTransport;

/// Number of samples each history retains.
pub const HISTORY_CAPACITY: usize = 100;

/// Measured voltage above this is taken to mean the output is on.
///
/// The DC310S offers no status query, so output state is inferred from the
/// measurement. Known approximation: a sub-0.5 V setpoint driving a load
/// reads as "off". Swap the [`OutputDetector`] if a better signal appears.
pub const OUTPUT_ACTIVE_THRESHOLD: f64 = 0.5;

/// Fixed-capacity FIFO of recent samples, oldest evicted first.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    samples: VecDeque<f64>,
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        HistoryBuffer::new()
    }
}

impl HistoryBuffer {
    /// An empty history with capacity [`HISTORY_CAPACITY`].
    pub fn new() -> Self {
        HistoryBuffer {
            samples: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    /// Append a sample, evicting the oldest once full.
    pub fn push(&mut self, value: f64) {
        if self.samples.len() == HISTORY_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no samples have been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples in insertion order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    /// The most recent sample, if any.
    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }
}

/// One tick's measurement result.
///
/// A channel whose read failed or did not parse records 0.0 with its valid
/// flag cleared; the zero still participates in downstream arithmetic.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeasurementSample {
    /// Measured output voltage in volts (0.0 when invalid).
    pub voltage: f64,
    /// Measured output current in amps (0.0 when invalid).
    pub current: f64,
    /// Whether the voltage reply arrived and parsed.
    pub voltage_valid: bool,
    /// Whether the current reply arrived and parsed.
    pub current_valid: bool,
}

impl MeasurementSample {
    /// Both channels arrived and parsed this tick.
    pub fn is_valid(&self) -> bool {
        self.voltage_valid && self.current_valid
    }

    /// Instantaneous power in watts, absent when either channel is invalid.
    pub fn power(&self) -> Option<f64> {
        self.is_valid().then(|| self.voltage * self.current)
    }
}

/// Decides whether the supply is actively driving a load.
pub trait OutputDetector {
    /// True when the output should be considered on.
    fn is_active(&self, sample: &MeasurementSample) -> bool;
}

/// Default detector: measured voltage above a fixed threshold.
#[derive(Debug, Clone, Copy)]
pub struct VoltageThreshold(pub f64);

impl Default for VoltageThreshold {
    fn default() -> Self {
        VoltageThreshold(OUTPUT_ACTIVE_THRESHOLD)
    }
}

impl OutputDetector for VoltageThreshold {
    fn is_active(&self, sample: &MeasurementSample) -> bool {
        sample.voltage > self.0
    }
}

/// Elapsed on-time and integrated energy.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Accumulator {
    /// Whole seconds the output has been active.
    pub elapsed_seconds: u64,
    /// Integrated energy in joules (watt-seconds), 1 Hz Euler sum.
    pub energy_joules: f64,
}

impl Accumulator {
    /// Zero the elapsed-time counter.
    pub fn reset_timer(&mut self) {
        self.elapsed_seconds = 0;
    }

    /// Zero the energy integral.
    pub fn reset_energy(&mut self) {
        self.energy_joules = 0.0;
    }

    /// Zero both accumulators.
    pub fn reset_all(&mut self) {
        self.reset_timer();
        self.reset_energy();
    }
}

/// When an accumulator auto-resets relative to the inferred output state.
///
/// The serialized spellings match the settings file the original controller
/// wrote, so existing `reset_settings.json` files load unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetMode {
    /// Reset while the output is on.
    #[serde(rename = "reset on output on")]
    OnOutputOn,
    /// Reset while the output is off.
    #[serde(rename = "reset on output off")]
    OnOutputOff,
    /// Never reset automatically.
    #[serde(rename = "no reset")]
    Never,
}

/// Per-target auto-reset configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResetPolicy {
    /// Resets both accumulators. Evaluated first.
    pub all: ResetMode,
    /// Resets the elapsed-time counter. Evaluated second.
    pub timer: ResetMode,
    /// Resets the energy integral. Evaluated last.
    pub energy: ResetMode,
}

impl Default for ResetPolicy {
    fn default() -> Self {
        ResetPolicy {
            all: ResetMode::Never,
            timer: ResetMode::OnOutputOff,
            energy: ResetMode::OnOutputOff,
        }
    }
}

/// The per-tick measurement and accumulation engine.
pub struct Telemetry {
    voltage_history: HistoryBuffer,
    current_history: HistoryBuffer,
    last_sample: MeasurementSample,
    accumulator: Accumulator,
    policy: ResetPolicy,
    detector: Box<dyn OutputDetector + Send>,
    /// When set, policies fire only on the tick where the inferred output
    /// state changed, instead of every tick the state holds. The original
    /// controller re-fired every tick; that stays the default.
    edge_triggered: bool,
    prev_active: Option<bool>,
    output_active: bool,
}

impl Default for Telemetry {
    fn default() -> Self {
        Telemetry::new(ResetPolicy::default())
    }
}

impl Telemetry {
    /// An idle engine with the given auto-reset policy.
    pub fn new(policy: ResetPolicy) -> Self {
        Telemetry {
            voltage_history: HistoryBuffer::new(),
            current_history: HistoryBuffer::new(),
            last_sample: MeasurementSample::default(),
            accumulator: Accumulator::default(),
            policy,
            detector: Box::new(VoltageThreshold::default()),
            edge_triggered: false,
            prev_active: None,
            output_active: false,
        }
    }

    /// Run one measurement/accumulation cycle against a connected PSU.
    pub fn tick<T: LineTransport>(&mut self, psu: &mut Psu<T>) {
        let (voltage, voltage_valid) = match psu.measure_voltage() {
            Ok(v) => (v, true),
            Err(e) => {
                debug!(error = %e, "voltage unavailable this tick");
                (0.0, false)
            }
        };
        let (current, current_valid) = match psu.measure_current() {
            Ok(i) => (i, true),
            Err(e) => {
                debug!(error = %e, "current unavailable this tick");
                (0.0, false)
            }
        };
        let sample = MeasurementSample {
            voltage,
            current,
            voltage_valid,
            current_valid,
        };

        let active = self.detector.is_active(&sample);
        if active {
            self.accumulator.elapsed_seconds += 1;
            // Invalid channels contribute 0 W here, per the degradation rule.
            self.accumulator.energy_joules += sample.voltage * sample.current;
        }
        self.apply_policy(active);

        self.voltage_history.push(sample.voltage);
        self.current_history.push(sample.current);
        self.last_sample = sample;
        self.output_active = active;
    }

    fn apply_policy(&mut self, active: bool) {
        // The first observed tick counts as a transition in edge mode.
        let fires = !self.edge_triggered || self.prev_active != Some(active);
        self.prev_active = Some(active);
        if !fires {
            return;
        }
        let matching = if active {
            ResetMode::OnOutputOn
        } else {
            ResetMode::OnOutputOff
        };
        // Fixed order: all, then timer, then energy.
        if self.policy.all == matching {
            self.accumulator.reset_all();
        }
        if self.policy.timer == matching {
            self.accumulator.reset_timer();
        }
        if self.policy.energy == matching {
            self.accumulator.reset_energy();
        }
    }

    /// Whether the output was inferred active on the latest tick.
    pub fn output_active(&self) -> bool {
        self.output_active
    }

    /// The latest measurement.
    pub fn last_sample(&self) -> &MeasurementSample {
        &self.last_sample
    }

    /// Elapsed on-time and integrated energy.
    pub fn accumulator(&self) -> &Accumulator {
        &self.accumulator
    }

    /// Recent voltage samples.
    pub fn voltage_history(&self) -> &HistoryBuffer {
        &self.voltage_history
    }

    /// Recent current samples.
    pub fn current_history(&self) -> &HistoryBuffer {
        &self.current_history
    }

    /// The active auto-reset policy.
    pub fn policy(&self) -> &ResetPolicy {
        &self.policy
    }

    /// Replace the auto-reset policy.
    pub fn set_policy(&mut self, policy: ResetPolicy) {
        self.policy = policy;
    }

    /// Switch between level-triggered (default) and edge-triggered policy
    /// evaluation.
    pub fn set_edge_triggered(&mut self, edge: bool) {
        self.edge_triggered = edge;
    }

    /// Substitute the output-active inference.
    pub fn set_detector(&mut self, detector: Box<dyn OutputDetector + Send>) {
        self.detector = detector;
    }

    /// Manually zero the elapsed-time counter.
    pub fn reset_timer(&mut self) {
        self.accumulator.reset_timer();
    }

    /// Manually zero the energy integral.
    pub fn reset_energy(&mut self) {
        self.accumulator.reset_energy();
    }

    /// Manually zero both accumulators.
    pub fn reset_all(&mut self) {
        self.accumulator.reset_all();
    }
}
