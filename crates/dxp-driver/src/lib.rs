//! Pure Rust driver for DXP digital spectrometer modules.
//!
//! This crate provides the full control stack for the Saturn, Mercury, STJ
//! and xMAP products: firmware download (FPGA bitstreams and DSP code),
//! DSP parameter access by symbol name, run control and the special
//! control-task runs each product supports.
//!
//! # Layer hierarchy
//!
//! ```text
//! DeviceDriver          per-product download sequences and task catalogs
//!   SaturnDriver · MercuryDriver · StjDriver · XmapDriver
//!       |
//! DxpModule             runs, symbols, DSP boot, control tasks
//!       |
//! RegisterIo            two-phase addressed I/O, block chunking
//!       |
//! Transport             one bus (EPP, USB, PLX) or SimTransport
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use dxp_driver::{driver_for, profile_for, ChipVariant, DeviceDriver, FirmwareSet, SimTransport};
//! use dxp_firmware::FirmwareCache;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let sim = SimTransport::new(profile_for(ChipVariant::Mercury));
//! let mut driver = driver_for(ChipVariant::Mercury, Box::new(sim));
//!
//! let mut cache = FirmwareCache::new();
//! driver.set_firmware(FirmwareSet {
//!     system_fpga: Some(cache.fpga("firmware/mercury_sys.fip".as_ref())?),
//!     fippi_a: Some(cache.fpga("firmware/mercury_fippi.fip".as_ref())?),
//!     dsp: Some(cache.dsp_dsx("firmware/mercury.dsx".as_ref())?),
//!     ..FirmwareSet::default()
//! });
//! driver.download_fpga("all")?;
//! driver.download_dsp()?;
//!
//! driver.write_symbol(0, "BINFACT0", 4)?;
//! let id = driver.begin_run(true, false)?;
//! println!("run {id} started, gain word {}", driver.read_symbol(0, "GAINDAC0")?);
//! driver.end_run()?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

mod device;
pub mod drivers;
mod dsp;
mod error;
mod fpga;
mod registers;
mod runstate;
mod sim;
mod symbols;
mod tasks;
mod transport;

/// Product model constants (re-exported from dxp-chip).
pub mod chip {
    pub use dxp_chip::profile::{
        ChipProfile, ChipVariant, CsrLayout, FpgaTarget, Register, RegisterWidth, SpecialRunStyle,
        TimingProfile, RUNTYPE_NORMAL, RUNTYPE_SPECIAL,
    };
    pub use dxp_chip::{profile_for, ControlTask};
}

pub use device::{DxpModule, FirmwareSet};
pub use drivers::{driver_for, DeviceDriver, MercuryDriver, SaturnDriver, StjDriver, XmapDriver};
pub use error::{DxpError, Result};
pub use fpga::{DownloadPhase, FpgaDownloader, MAX_CRC_ATTEMPTS};
pub use registers::{RegisterIo, MAX_REWRITES};
pub use runstate::{BoardRunState, DspState, RunStateTracker};
pub use sim::{Burst, RunScript, SimTransport};
pub use symbols::{combine_words, ReadPlan, SymbolResolver, WriteOutcome, WritePlan};
pub use tasks::{ControlTaskEngine, ParseInfoFn, ReadDataFn, StartFn, TaskDescriptor, TaskOutcome};
pub use transport::{Transport, TransportError, TransportResult};

pub use dxp_chip::{profile_for, ChipProfile, ChipVariant, ControlTask};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        driver_for, profile_for, ChipVariant, ControlTask, DeviceDriver, DxpError, DxpModule,
        FirmwareSet, Result, SimTransport, TaskOutcome, Transport, WriteOutcome,
    };
}
