#![deny(unsafe_code)]

//! Firmware container parsing for DXP spectrometer modules.
//!
//! Every module boots from plain-text vendor files: FPGA bitstreams as
//! hex byte lines, and DSP code in one of two formats, both carrying the
//! program words and the parameter symbol table the driver needs to talk
//! to the running firmware.
//!
//! # Formats
//!
//! - **FPGA bitstream** — `*`-commented lines of hex byte pairs,
//!   assembled low-then-high into 16-bit words ([`FpgaImage`]).
//! - **DSX** — sectioned text (`@CONSTANTS@`, `@OFFSETS@`, `@GLOBAL@`,
//!   `@CHANNEL@`, `@PROGRAM MEMORY@`) used by the Mercury-class products
//!   ([`DspProgram::from_dsx_file`]).
//! - **Legacy listing** — symbol count plus one line per symbol with
//!   optional access/bounds columns, used by Saturn-class products
//!   ([`DspProgram::from_listing_file`]).
//!
//! # Example
//!
//! ```no_run
//! use dxp_firmware::FirmwareCache;
//!
//! # fn main() -> dxp_firmware::Result<()> {
//! let mut cache = FirmwareCache::new();
//!
//! let system = cache.fpga("firmware/mercury_sys.fip".as_ref())?;
//! let dsp = cache.dsp_dsx("firmware/mercury.dsx".as_ref())?;
//!
//! println!("bitstream: {} words", system.word_count());
//! println!("DSP code: {} words, {} global symbols",
//!     dsp.word_count(), dsp.params().global_count());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod cache;
mod dsx;
mod error;
mod fpga;
mod listing;
mod params;
mod program;

pub use cache::FirmwareCache;
pub use error::{FirmwareError, Result};
pub use fpga::FpgaImage;
pub use params::{AccessMode, DspParameterTable, Parameter};
pub use program::DspProgram;

/// Re-export of commonly used types.
pub mod prelude {
    pub use crate::{AccessMode, DspProgram, FirmwareCache, FpgaImage, Parameter, Result};
}
