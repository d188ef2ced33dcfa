//! Error types for module driver operations

use std::time::Duration;

use dxp_chip::ControlTask;
use thiserror::Error;

use crate::transport::TransportError;

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, DxpError>;

/// Errors that can occur while driving a module.
#[derive(Debug, Error)]
pub enum DxpError {
    /// The underlying transport failed.
    #[error(transparent)]
    Transport {
        /// Bus-level failure.
        #[from]
        source: TransportError,
    },

    /// A polled condition never came true.
    #[error("timeout waiting for {what} after {waited_ms}ms")]
    Timeout {
        /// What was being waited for.
        what: &'static str,
        /// Total wait before giving up.
        waited_ms: u64,
    },

    /// An FPGA configuration line never asserted.
    #[error("{line} line never asserted for target mask {mask:#x}")]
    FpgaTimeout {
        /// Which status line, `"INIT*"` or `"XDONE"`.
        line: &'static str,
        /// CFG-control mask of the targeted devices.
        mask: u32,
    },

    /// The FPGA rejected the bitstream after receiving all of it.
    #[error("bitstream CRC failure for target mask {mask:#x}")]
    FpgaCrc {
        /// CFG-control mask of the targeted devices.
        mask: u32,
    },

    /// The module has no FPGA downloader with the requested name.
    #[error("no FPGA downloader named '{name}' on this module")]
    UnknownFpga {
        /// Requested downloader name.
        name: String,
    },

    /// A required firmware image was never configured.
    #[error("no {what} configured for this module")]
    MissingFirmware {
        /// Which image is missing.
        what: &'static str,
    },

    /// The DSP program does not fit in program memory.
    #[error("DSP program of {words} words exceeds program memory ({limit} words)")]
    ProgramTooLarge {
        /// Program length.
        words: usize,
        /// Program memory capacity.
        limit: usize,
    },

    /// The symbol table has no entry under the requested name.
    #[error("DSP symbol not found: {name}")]
    UnknownSymbol {
        /// Requested symbol name.
        name: String,
    },

    /// Write attempted to a read-only parameter.
    #[error("DSP symbol {name} is read-only")]
    ReadOnlyAccess {
        /// Parameter name.
        name: String,
    },

    /// Read attempted from a write-only parameter.
    #[error("DSP symbol {name} is write-only")]
    WriteOnlyAccess {
        /// Parameter name.
        name: String,
    },

    /// The variant does not implement the requested control task.
    #[error("control task {task} is not supported by this module")]
    UnknownControlTask {
        /// Requested task.
        task: ControlTask,
    },

    /// The control task produces no readable data.
    #[error("control task {task} has no readable data")]
    NoTaskData {
        /// Requested task.
        task: ControlTask,
    },

    /// The control task info block is too short.
    #[error("control task {task} info too short: need {expected} values, got {actual}")]
    InvalidLength {
        /// Task being started.
        task: ControlTask,
        /// Values required by the task.
        expected: usize,
        /// Values supplied.
        actual: usize,
    },

    /// A run or control task is already in progress on the channel.
    #[error("channel {channel} already has an active run")]
    RunActive {
        /// Busy channel.
        channel: usize,
    },

    /// The apply special run reported a DSP-side failure.
    #[error("apply failed with APPLYSTAT = {status:#x} (ERRINFO = {errinfo:#x})")]
    ApplyFailed {
        /// `APPLYSTAT` readout.
        status: u16,
        /// `ERRINFO` readout.
        errinfo: u16,
    },

    /// A verified write never read back correctly.
    #[error("write to {addr:#x} failed verification after {attempts} attempts")]
    RewriteFailure {
        /// Device address of the block.
        addr: u32,
        /// Write attempts made.
        attempts: usize,
    },

    /// The host could not allocate a device-sized buffer.
    #[error("unable to allocate {bytes} bytes for device data")]
    NoMemory {
        /// Requested allocation.
        bytes: usize,
    },

    /// Symbol or task access before a successful DSP download.
    #[error("no DSP code loaded for channel {channel}")]
    DspNotLoaded {
        /// Channel accessed.
        channel: usize,
    },

    /// Channel number beyond the module's channel count.
    #[error("channel {channel} out of range (module has {channels})")]
    InvalidChannel {
        /// Requested channel.
        channel: usize,
        /// Channels on the module.
        channels: usize,
    },
}

impl DxpError {
    /// Create a timeout error from the total wait duration.
    pub fn timeout(what: &'static str, waited: Duration) -> Self {
        let waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX);
        Self::Timeout { what, waited_ms }
    }

    /// Create an unknown-symbol error.
    pub fn unknown_symbol(name: impl Into<String>) -> Self {
        Self::UnknownSymbol { name: name.into() }
    }

    /// Create an unknown-downloader error.
    pub fn unknown_fpga(name: impl Into<String>) -> Self {
        Self::UnknownFpga { name: name.into() }
    }
}
