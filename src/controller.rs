//! Thin orchestrator composing session, telemetry, and the preset gate.
//!
//! One periodic driver (the embedder's timer or the CLI loop) calls
//! [`Controller::tick`] once per [`TICK_INTERVAL`]; everything else is
//! user-triggered and runs to completion between ticks, so no locking is
//! needed anywhere.

use std::time::Duration;
use tracing::{debug, warn};

use crate::preset::{ApplyOutcome, ApplyStage, Preset, PresetGate};
use crate::session::{InitialSettings, Session};
use crate::store::PresetStore;
use crate::telemetry::{
    Accumulator, HistoryBuffer, MeasurementSample, OutputDetector, ResetPolicy, Telemetry,
};
use crate::transport::{LineTransport, SerialTransport};
use crate::error::{Dc310sError, Result};

/// Nominal period between telemetry ticks.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Read-only view handed to a rendering collaborator after each tick.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    /// Recent voltage samples, oldest first.
    pub voltage_history: &'a HistoryBuffer,
    /// Recent current samples, oldest first.
    pub current_history: &'a HistoryBuffer,
    /// The latest measurement.
    pub sample: &'a MeasurementSample,
    /// Elapsed on-time and integrated energy.
    pub accumulator: Accumulator,
    /// Whether the output was inferred active on the latest tick.
    pub output_active: bool,
    /// Preset confirmation handshake stage.
    pub apply_stage: ApplyStage,
    /// Session connectivity.
    pub connected: bool,
}

/// The composed DC310S controller core.
pub struct Controller<T: LineTransport> {
    session: Session<T>,
    telemetry: Telemetry,
    gate: PresetGate,
}

impl<T: LineTransport> Default for Controller<T> {
    fn default() -> Self {
        Controller::new(ResetPolicy::default())
    }
}

impl<T: LineTransport> Controller<T> {
    /// A disconnected controller with the given auto-reset policy.
    pub fn new(policy: ResetPolicy) -> Self {
        Controller {
            session: Session::new(),
            telemetry: Telemetry::new(policy),
            gate: PresetGate::new(),
        }
    }

    /// Connect over an already-open transport.
    pub fn connect_with(&mut self, transport: T) -> InitialSettings {
        self.session.connect_with(transport)
    }

    /// Disconnect; safe in any state. Subsequent ticks are skipped.
    pub fn disconnect(&mut self) {
        self.session.disconnect();
    }

    /// Session connectivity.
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// The most recent connect failure.
    pub fn last_error(&self) -> Option<&Dc310sError> {
        self.session.last_error()
    }

    /// Run one telemetry cycle, or skip it while disconnected.
    pub fn tick(&mut self) {
        match self.session.psu_mut() {
            Some(psu) => self.telemetry.tick(psu),
            None => debug!("tick skipped while disconnected"),
        }
    }

    /// Switch the output on or off.
    ///
    /// Returns whether the command went out without a local failure; the
    /// instrument provides no ack beyond that.
    pub fn set_output(&mut self, on: bool) -> bool {
        let Some(psu) = self.session.psu_mut() else {
            return false;
        };
        match psu.set_output(on) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, on, "output command not confirmed");
                false
            }
        }
    }

    /// Send a voltage setpoint.
    ///
    /// Non-finite values are dropped before any transport traffic, matching
    /// how the original rejected unparseable entry text.
    pub fn set_voltage(&mut self, volts: f64) -> bool {
        if !volts.is_finite() {
            return false;
        }
        let Some(psu) = self.session.psu_mut() else {
            return false;
        };
        match psu.set_voltage(volts) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, volts, "voltage command not confirmed");
                false
            }
        }
    }

    /// Send a current-limit setpoint. Same validation as [`set_voltage`].
    ///
    /// [`set_voltage`]: Self::set_voltage
    pub fn set_current(&mut self, amps: f64) -> bool {
        if !amps.is_finite() {
            return false;
        }
        let Some(psu) = self.session.psu_mut() else {
            return false;
        };
        match psu.set_current(amps) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, amps, "current command not confirmed");
                false
            }
        }
    }

    /// Request that a preset be applied, honoring the confirmation gate.
    ///
    /// Returns `None` while disconnected.
    pub fn request_apply(&mut self, preset: &Preset) -> Option<ApplyOutcome> {
        let active = self.telemetry.output_active();
        let psu = self.session.psu_mut()?;
        Some(self.gate.request_apply(preset, active, psu))
    }

    /// Disarm a pending preset confirmation.
    pub fn reset_apply_gate(&mut self) {
        self.gate.reset();
    }

    /// Validate and persist the current entry values as a named preset.
    ///
    /// Returns `Ok(false)` (nothing written) when either value is not a
    /// positive finite number.
    pub fn save_preset(
        &self,
        store: &mut dyn PresetStore,
        name: &str,
        voltage: f64,
        current: f64,
    ) -> Result<bool> {
        match Preset::validated(voltage, current) {
            Some(preset) => {
                store.save(name, preset)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// The active auto-reset policy.
    pub fn policy(&self) -> &ResetPolicy {
        self.telemetry.policy()
    }

    /// Replace the auto-reset policy (persisting it is the caller's job).
    pub fn set_policy(&mut self, policy: ResetPolicy) {
        self.telemetry.set_policy(policy);
    }

    /// Switch to edge-triggered policy evaluation (see [`Telemetry`]).
    pub fn set_edge_triggered(&mut self, edge: bool) {
        self.telemetry.set_edge_triggered(edge);
    }

    /// Substitute the output-active inference.
    pub fn set_detector(&mut self, detector: Box<dyn OutputDetector + Send>) {
        self.telemetry.set_detector(detector);
    }

    /// Manually zero the elapsed-time counter.
    pub fn reset_timer(&mut self) {
        self.telemetry.reset_timer();
    }

    /// Manually zero the energy integral.
    pub fn reset_energy(&mut self) {
        self.telemetry.reset_energy();
    }

    /// Manually zero both accumulators.
    pub fn reset_all(&mut self) {
        self.telemetry.reset_all();
    }

    /// Read-only state for a rendering collaborator (pull-based).
    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            voltage_history: self.telemetry.voltage_history(),
            current_history: self.telemetry.current_history(),
            sample: self.telemetry.last_sample(),
            accumulator: *self.telemetry.accumulator(),
            output_active: self.telemetry.output_active(),
            apply_stage: self.gate.stage(),
            connected: self.session.is_connected(),
        }
    }
}

impl Controller<SerialTransport> {
    /// Open a serial port and connect.
    ///
    /// `None` on failure; see [`last_error`](Self::last_error).
    pub fn connect(
        &mut self,
        path: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Option<InitialSettings> {
        self.session.connect(path, baud_rate, read_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_transport::MockTransport;
    use crate::store::MemoryPresetStore;

    fn connected_controller(replies: &[&str]) -> Controller<MockTransport> {
        let mut mock = MockTransport::new();
        // Settings sync consumes the first two replies.
        mock.push_reply("5.0");
        mock.push_reply("1.0");
        for reply in replies {
            mock.push_reply(reply);
        }
        let mut controller = Controller::default();
        controller.connect_with(mock);
        controller
    }

    fn written(controller: &mut Controller<MockTransport>) -> Vec<String> {
        controller
            .session
            .psu_mut()
            .unwrap()
            .transport()
            .written_lines()
            .to_vec()
    }

    #[test]
    fn ticks_are_skipped_while_disconnected() {
        let mut controller: Controller<MockTransport> = Controller::default();

        controller.tick();
        controller.tick();

        let snapshot = controller.snapshot();
        assert!(!snapshot.connected);
        assert!(snapshot.voltage_history.is_empty());
        assert_eq!(snapshot.accumulator, Accumulator::default());
    }

    #[test]
    fn connected_tick_advances_history_and_accumulators() {
        let mut controller = connected_controller(&["12.0", "0.5"]);

        controller.tick();

        let snapshot = controller.snapshot();
        assert!(snapshot.connected);
        assert!(snapshot.output_active);
        assert_eq!(snapshot.voltage_history.latest(), Some(12.0));
        assert_eq!(snapshot.accumulator.elapsed_seconds, 1);
        assert_eq!(snapshot.accumulator.energy_joules, 6.0);
    }

    #[test]
    fn non_finite_setpoints_never_reach_the_wire() {
        let mut controller = connected_controller(&[]);

        assert!(!controller.set_voltage(f64::NAN));
        assert!(!controller.set_voltage(f64::INFINITY));
        assert!(!controller.set_current(f64::NEG_INFINITY));

        // Only the connect-time settings sync went out.
        assert_eq!(written(&mut controller), ["voltage?", "current?"]);
    }

    #[test]
    fn setpoints_are_rejected_while_disconnected() {
        let mut controller: Controller<MockTransport> = Controller::default();
        assert!(!controller.set_voltage(5.0));
        assert!(!controller.set_output(true));
    }

    #[test]
    fn preset_apply_consults_inferred_output_state() {
        // One active tick first, so the gate sees a live output.
        let mut controller = connected_controller(&["5.0", "1.0"]);
        controller.tick();

        let preset = Preset {
            voltage: 13.7,
            current: 3.0,
        };
        assert_eq!(
            controller.request_apply(&preset),
            Some(ApplyOutcome::ConfirmRequired)
        );
        assert_eq!(controller.snapshot().apply_stage, ApplyStage::AwaitingConfirm);

        let outcome = controller.request_apply(&preset).unwrap();
        assert!(matches!(outcome, ApplyOutcome::Applied { .. }));
        assert_eq!(controller.snapshot().apply_stage, ApplyStage::Idle);

        let lines = written(&mut controller);
        assert!(lines.contains(&"voltage 13.7".to_string()));
        assert!(lines.contains(&"current 3".to_string()));
    }

    #[test]
    fn preset_apply_is_unavailable_while_disconnected() {
        let mut controller: Controller<MockTransport> = Controller::default();
        let preset = Preset {
            voltage: 5.0,
            current: 1.0,
        };
        assert_eq!(controller.request_apply(&preset), None);
    }

    #[test]
    fn save_preset_validates_before_writing() {
        let controller: Controller<MockTransport> = Controller::default();
        let mut store = MemoryPresetStore::new();

        assert!(!controller.save_preset(&mut store, "bad", 0.0, 1.0).unwrap());
        assert!(!controller
            .save_preset(&mut store, "bad", f64::NAN, 1.0)
            .unwrap());
        assert!(store.load_all().unwrap().is_empty());

        assert!(controller.save_preset(&mut store, "ok", 9.0, 1.5).unwrap());
        assert_eq!(store.load_all().unwrap().len(), 1);
    }

    #[test]
    fn disconnect_then_reconnect_preserves_accumulators() {
        let mut controller = connected_controller(&["5.0", "1.0"]);
        controller.tick();
        assert_eq!(controller.snapshot().accumulator.elapsed_seconds, 1);

        controller.disconnect();
        controller.tick();
        // Skipped tick: nothing advanced.
        assert_eq!(controller.snapshot().accumulator.elapsed_seconds, 1);
        assert_eq!(controller.snapshot().voltage_history.len(), 1);

        let mut mock = MockTransport::new();
        mock.push_reply("5.0");
        mock.push_reply("1.0");
        mock.push_reply("5.0");
        mock.push_reply("1.0");
        controller.connect_with(mock);
        controller.tick();
        assert_eq!(controller.snapshot().accumulator.elapsed_seconds, 2);
    }
}
