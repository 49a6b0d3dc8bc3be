#![warn(missing_docs)]
//! A crate for controlling KIPRIM DC310S bench power supplies.
//!
//! The DC310S speaks a line-based ASCII protocol over USB serial: one
//! newline-terminated request, one single-line reply, no acks or checksums.
//! On top of that this crate provides a session state machine, a 1 Hz
//! telemetry engine (voltage/current histories, power, on-time and energy
//! accumulation with configurable auto-reset), and a two-step confirmation
//! gate for loading a preset into a live output.
//!
//! The serial port should be configured like so:
//! * Baud rate: 115200 (instrument default)
//! * Data bits: 8, stop bits: 1, parity: none
//! * Read timeout: 1 second (one tick may block up to this long)
//!
//! Quick start:
//!
//! ```no_run
//! use dc310s::{Controller, SerialTransport, DEFAULT_BAUD, DEFAULT_READ_TIMEOUT, TICK_INTERVAL};
//!
//! let mut controller = Controller::<SerialTransport>::default();
//! controller.connect("/dev/ttyUSB0", DEFAULT_BAUD, DEFAULT_READ_TIMEOUT);
//! loop {
//!     controller.tick();
//!     let snapshot = controller.snapshot();
//!     println!("{:?}", snapshot.sample);
//!     std::thread::sleep(TICK_INTERVAL);
//! }
//! ```

pub mod controller;
pub mod error;
pub mod preset;
pub mod protocol;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod transport;

#[cfg(test)]
mod mock_transport;

pub use controller::{Controller, Snapshot, TICK_INTERVAL};
pub use error::{Dc310sError, Result};
pub use preset::{ApplyOutcome, ApplyStage, Preset, PresetGate};
pub use protocol::Psu;
pub use session::{InitialSettings, Session};
pub use store::{
    JsonPolicyStore, JsonPresetStore, MemoryPresetStore, PolicyStore, PresetStore, default_presets,
};
pub use telemetry::{
    Accumulator, HISTORY_CAPACITY, HistoryBuffer, MeasurementSample, OUTPUT_ACTIVE_THRESHOLD,
    OutputDetector, ResetMode, ResetPolicy, Telemetry, VoltageThreshold,
};
pub use transport::{DEFAULT_BAUD, DEFAULT_READ_TIMEOUT, LineTransport, SerialTransport};
