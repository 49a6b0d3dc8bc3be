//! Named setpoint presets and the two-step apply confirmation.
//!
//! Loading a preset into a live output is destructive, so while the output
//! is inferred active the first apply request only arms the gate; the next
//! request (for any preset) is taken as confirmation and applied.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::protocol::Psu;
use crate::transport::LineTransport;

/// A saved voltage/current setpoint pair, keyed by name in the store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    /// Target voltage in volts, > 0.
    pub voltage: f64,
    /// Target current limit in amps, > 0.
    pub current: f64,
}

impl Preset {
    /// Build a preset from entry values, rejecting anything that is not a
    /// positive finite number.
    pub fn validated(voltage: f64, current: f64) -> Option<Preset> {
        let ok = |v: f64| v.is_finite() && v > 0.0;
        (ok(voltage) && ok(current)).then_some(Preset { voltage, current })
    }
}

/// Where the confirmation handshake currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplyStage {
    /// No apply pending.
    #[default]
    Idle,
    /// An apply was requested while the output was active; the next request
    /// is the confirmation.
    AwaitingConfirm,
}

/// Result of one apply request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Output is live; ask again to confirm. Nothing was sent.
    ConfirmRequired,
    /// Both setpoint commands were issued. The flags report whether each
    /// command completed without a local failure (best-effort, no device
    /// ack exists).
    Applied {
        /// `voltage {v}` went out without error.
        voltage_confirmed: bool,
        /// `current {i}` went out without error.
        current_confirmed: bool,
    },
}

/// The two-step state machine guarding load-while-output-active.
#[derive(Debug, Default)]
pub struct PresetGate {
    stage: ApplyStage,
}

impl PresetGate {
    /// A gate with no apply pending.
    pub fn new() -> Self {
        PresetGate::default()
    }

    /// Request that `preset` be applied.
    ///
    /// With the output active and the gate idle this arms the gate and
    /// sends nothing; otherwise both setpoints are issued and the gate
    /// returns to idle.
    pub fn request_apply<T: LineTransport>(
        &mut self,
        preset: &Preset,
        output_active: bool,
        psu: &mut Psu<T>,
    ) -> ApplyOutcome {
        if output_active && self.stage == ApplyStage::Idle {
            self.stage = ApplyStage::AwaitingConfirm;
            return ApplyOutcome::ConfirmRequired;
        }

        let voltage_confirmed = match psu.set_voltage(preset.voltage) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "voltage setpoint not confirmed");
                false
            }
        };
        let current_confirmed = match psu.set_current(preset.current) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "current setpoint not confirmed");
                false
            }
        };
        self.stage = ApplyStage::Idle;
        ApplyOutcome::Applied {
            voltage_confirmed,
            current_confirmed,
        }
    }

    /// Current handshake stage.
    pub fn stage(&self) -> ApplyStage {
        self.stage
    }

    /// Disarm a pending confirmation (e.g. when a UI loses focus).
    pub fn reset(&mut self) {
        self.stage = ApplyStage::Idle;
    }
}
