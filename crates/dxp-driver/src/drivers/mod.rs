//! Per-product drivers.
//!
//! A driver couples the generic engine to one product: its profile, its
//! FPGA download sequences and its control-task catalog. Everything a
//! caller does goes through [`DeviceDriver`]; the product types add
//! wiring, not behavior.

pub mod mercury;
pub mod saturn;
pub mod stj;
pub mod xmap;

pub use mercury::MercuryDriver;
pub use saturn::SaturnDriver;
pub use stj::StjDriver;
pub use xmap::XmapDriver;

use std::fmt::Debug;
use std::sync::Arc;

use dxp_chip::{ChipProfile, ChipVariant, ControlTask};
use dxp_firmware::FpgaImage;

use crate::device::{DxpModule, FirmwareSet};
use crate::error::{DxpError, Result};
use crate::symbols::WriteOutcome;
use crate::tasks::{ControlTaskEngine, TaskDescriptor};
use crate::transport::Transport;

/// `BUSY` value seeded before booting the DSP. The DSP overwrites it on
/// its way up, so a stale zero cannot fake a finished boot.
pub(crate) const BOOT_BUSY: u16 = 0x23;

/// One module of any product.
pub trait DeviceDriver: Debug + Send {
    /// The product this driver drives.
    fn variant(&self) -> ChipVariant;

    /// Select firmware for later downloads. Nothing moves to the
    /// hardware until a download runs.
    fn set_firmware(&mut self, firmware: FirmwareSet);

    /// Run the named FPGA download sequence.
    ///
    /// # Errors
    ///
    /// Returns [`DxpError::UnknownFpga`] for a name the product lacks
    /// and [`DxpError::MissingFirmware`] when the sequence needs an
    /// image that was never selected, plus download errors.
    fn download_fpga(&mut self, name: &str) -> Result<()>;

    /// Download and boot the selected DSP program.
    ///
    /// # Errors
    ///
    /// See [`DxpModule::download_dsp`].
    fn download_dsp(&mut self) -> Result<()>;

    /// Start a control task on one channel.
    ///
    /// # Errors
    ///
    /// See [`ControlTaskEngine::begin`].
    fn begin_control_task(&mut self, channel: usize, task: ControlTask, info: &[u32])
        -> Result<()>;

    /// Read a control task's result data.
    ///
    /// # Errors
    ///
    /// See [`ControlTaskEngine::data`].
    fn control_task_data(&mut self, channel: usize, task: ControlTask) -> Result<Vec<u16>>;

    /// End a control task and restore normal run mode.
    ///
    /// # Errors
    ///
    /// See [`ControlTaskEngine::end`].
    fn end_control_task(&mut self, channel: usize, task: ControlTask) -> Result<()>;

    /// Read a DSP parameter.
    ///
    /// # Errors
    ///
    /// See [`DxpModule::read_symbol`].
    fn read_symbol(&mut self, channel: usize, name: &str) -> Result<f64>;

    /// Write a DSP parameter, clamping into its declared bounds.
    ///
    /// # Errors
    ///
    /// See [`DxpModule::write_symbol`].
    fn write_symbol(&mut self, channel: usize, name: &str, value: u16) -> Result<WriteOutcome>;

    /// Start a normal run; returns its module-scoped identifier.
    ///
    /// # Errors
    ///
    /// See [`DxpModule::begin_run`].
    fn begin_run(&mut self, gate: bool, resume: bool) -> Result<u32>;

    /// Stop the current run.
    ///
    /// # Errors
    ///
    /// See [`DxpModule::end_run`].
    fn end_run(&mut self) -> Result<()>;

    /// Whether the hardware reports a run in progress.
    ///
    /// # Errors
    ///
    /// Fails if the bus access fails.
    fn is_run_active(&mut self) -> Result<bool>;
}

/// One named FPGA download sequence.
pub(crate) type DownloadFn = fn(&mut DxpModule) -> Result<()>;

pub(crate) fn require_image(
    slot: Option<&Arc<FpgaImage>>,
    what: &'static str,
) -> Result<Arc<FpgaImage>> {
    slot.cloned().ok_or(DxpError::MissingFirmware { what })
}

/// The state every product driver wraps: the module, its task catalog
/// and its download table.
#[derive(Debug)]
pub(crate) struct DriverCore {
    pub(crate) module: DxpModule,
    engine: ControlTaskEngine,
    downloaders: &'static [(&'static str, DownloadFn)],
}

impl DriverCore {
    pub(crate) fn new(
        transport: Box<dyn Transport>,
        profile: &'static ChipProfile,
        tasks: &'static [TaskDescriptor],
        downloaders: &'static [(&'static str, DownloadFn)],
    ) -> Self {
        Self {
            module: DxpModule::new(transport, profile),
            engine: ControlTaskEngine::new(tasks),
            downloaders,
        }
    }

    pub(crate) fn download_fpga(&mut self, name: &str) -> Result<()> {
        let Some((_, download)) = self.downloaders.iter().find(|(key, _)| *key == name) else {
            return Err(DxpError::unknown_fpga(name));
        };
        download(&mut self.module)
    }

    pub(crate) fn begin_control_task(
        &mut self,
        channel: usize,
        task: ControlTask,
        info: &[u32],
    ) -> Result<()> {
        let engine = self.engine;
        engine.begin(&mut self.module, channel, task, info)
    }

    pub(crate) fn control_task_data(
        &mut self,
        channel: usize,
        task: ControlTask,
    ) -> Result<Vec<u16>> {
        let engine = self.engine;
        engine.data(&mut self.module, channel, task)
    }

    pub(crate) fn end_control_task(&mut self, channel: usize, task: ControlTask) -> Result<()> {
        let engine = self.engine;
        engine.end(&mut self.module, channel, task)
    }
}

/// Build the driver for `variant` over `transport`.
#[must_use]
pub fn driver_for(variant: ChipVariant, transport: Box<dyn Transport>) -> Box<dyn DeviceDriver> {
    match variant {
        ChipVariant::Saturn => Box::new(saturn::SaturnDriver::new(transport)),
        ChipVariant::Mercury => Box::new(mercury::MercuryDriver::new(transport)),
        ChipVariant::Stj => Box::new(stj::StjDriver::new(transport)),
        ChipVariant::Xmap => Box::new(xmap::XmapDriver::new(transport)),
    }
}
