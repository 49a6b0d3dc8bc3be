//! Connection lifecycle for one DC310S.
//!
//! Exactly one live session exists per running instance. The session owns
//! the transport exclusively; everything else reaches the instrument
//! through [`Session::psu_mut`], which yields nothing while disconnected.

use std::time::Duration;
use tracing::{info, warn};

use crate::error::Dc310sError;
use crate::protocol::Psu;
use crate::transport::{LineTransport, SerialTransport};

/// Setpoints read back right after connecting, for display.
///
/// `None` means the read-back failed; the session stays connected anyway.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitialSettings {
    /// Configured voltage setpoint in volts.
    pub voltage: Option<f64>,
    /// Configured current limit in amps.
    pub current: Option<f64>,
}

/// Disconnected/Connected state machine owning the instrument handle.
pub struct Session<T: LineTransport> {
    psu: Option<Psu<T>>,
    last_error: Option<Dc310sError>,
}

impl<T: LineTransport> Default for Session<T> {
    fn default() -> Self {
        Session::new()
    }
}

impl<T: LineTransport> Session<T> {
    /// A new session starts disconnected.
    pub fn new() -> Self {
        Session {
            psu: None,
            last_error: None,
        }
    }

    /// Enter the connected state over an already-open transport and run the
    /// best-effort settings sync.
    pub fn connect_with(&mut self, transport: T) -> InitialSettings {
        let mut psu = Psu::new(transport);
        let settings = InitialSettings {
            voltage: psu.query_voltage_setpoint().ok(),
            current: psu.query_current_setpoint().ok(),
        };
        if settings.voltage.is_none() || settings.current.is_none() {
            // Not fatal: the instrument may simply be slow to wake up.
            warn!("settings sync incomplete after connect");
        }
        self.psu = Some(psu);
        self.last_error = None;
        info!("session connected");
        settings
    }

    /// Whether the session is currently connected.
    pub fn is_connected(&self) -> bool {
        self.psu.is_some()
    }

    /// The instrument handle, while connected.
    pub fn psu_mut(&mut self) -> Option<&mut Psu<T>> {
        self.psu.as_mut()
    }

    /// Drop the transport and return to the disconnected state.
    ///
    /// Safe to call in any state.
    pub fn disconnect(&mut self) {
        if self.psu.take().is_some() {
            info!("session disconnected");
        }
    }

    /// The most recent connect failure, cleared by a successful connect.
    pub fn last_error(&self) -> Option<&Dc310sError> {
        self.last_error.as_ref()
    }
}

impl Session<SerialTransport> {
    /// Open a serial port and connect.
    ///
    /// Returns `None` on failure; the cause is kept in
    /// [`last_error`](Self::last_error) and the session stays disconnected.
    pub fn connect(
        &mut self,
        path: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Option<InitialSettings> {
        self.disconnect();
        match SerialTransport::open(path, baud_rate, read_timeout) {
            Ok(transport) => Some(self.connect_with(transport)),
            Err(e) => {
                warn!(error = %e, path, "connect failed");
                self.last_error = Some(e);
                None
            }
        }
    }
}
