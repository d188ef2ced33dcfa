//! Transport capability consumed by the engine.
//!
//! A transport moves 16-bit words between the host and one module over
//! whatever bus the product uses (EPP, USB2, PLX-bridged PCI). The engine
//! only ever sees two port numbers per product: the address port, which
//! latches the target device address, and the data port, which streams
//! words to or from that address. Everything else (USB endpoints, PCI BAR
//! mapping, retries at the bus level) stays behind this trait.

use std::fmt::Debug;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Errors surfaced by a transport implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The bus transaction failed.
    #[error("transport I/O failed: {reason}")]
    Io {
        /// Description of the failure.
        reason: String,
    },

    /// The port number is not one the transport exposes.
    #[error("no such transport port: {port:#x}")]
    InvalidPort {
        /// Requested port.
        port: u32,
    },
}

impl TransportError {
    /// Create an I/O error from any printable reason.
    pub fn io(reason: impl Into<String>) -> Self {
        Self::Io { reason: reason.into() }
    }
}

/// Word-level access to one module.
///
/// Implementations must be strict about transfer sizes: `read` returns
/// exactly `n` words or fails, and `write` either moves the whole slice
/// or fails. Short transfers are a bus fault, not a partial success.
pub trait Transport: Debug + Send {
    /// Write `words` to `port`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bus transaction fails or `port` does not
    /// exist.
    fn write(&mut self, port: u32, words: &[u16]) -> TransportResult<()>;

    /// Read `n` words from `port`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bus transaction fails, comes up short, or
    /// `port` does not exist.
    fn read(&mut self, port: u32, n: usize) -> TransportResult<Vec<u16>>;

    /// Block for at least `duration`.
    ///
    /// All protocol waits go through the transport so that a simulated
    /// module can keep virtual time instead of stalling the test suite.
    fn sleep(&mut self, duration: Duration);

    /// Largest number of words the transport moves in one transfer.
    /// Zero means unlimited.
    fn max_block_size(&self) -> usize;
}
