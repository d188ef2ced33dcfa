//! One spectrometer module.
//!
//! `DxpModule` owns the register I/O for a single module and layers the
//! product-independent engine on top: CSR access, run control, DSP
//! parameter reads and writes, and the bookkeeping that remembers what
//! the host itself started. Product differences flow in through the
//! [`ChipProfile`] rather than through subtypes.

use std::sync::Arc;
use std::time::Duration;

use dxp_chip::ChipProfile;
use dxp_firmware::{DspProgram, FpgaImage};
use tracing::{debug, error, info};

use crate::error::{DxpError, Result};
use crate::registers::{lo_word, RegisterIo};
use crate::runstate::{BoardRunState, DspState, RunStateTracker};
use crate::symbols::{combine_words, SymbolResolver, WriteOutcome};
use crate::transport::Transport;

/// Firmware selected for one module.
///
/// Images are shared, reference-counted handles; a set is cheap to clone
/// and swap. Products without a second FiPPI leave `fippi_b` empty, and
/// Saturn's lone FiPPI lives in the `fippi_a` slot.
#[derive(Debug, Clone, Default)]
pub struct FirmwareSet {
    /// Board-level system FPGA bitstream.
    pub system_fpga: Option<Arc<FpgaImage>>,
    /// Filter FPGA bitstream (the only FiPPI on single-FiPPI products).
    pub fippi_a: Option<Arc<FpgaImage>>,
    /// Second filter FPGA bitstream, where the product has one.
    pub fippi_b: Option<Arc<FpgaImage>>,
    /// DSP program and its parameter table.
    pub dsp: Option<Arc<DspProgram>>,
}

pub(crate) const fn bit(pos: u8) -> u32 {
    1 << pos
}

/// Engine state for one module.
#[derive(Debug)]
pub struct DxpModule {
    pub(crate) io: RegisterIo,
    pub(crate) firmware: FirmwareSet,
    pub(crate) runs: RunStateTracker,
    /// Set when a system FPGA reload means the next DSP download must
    /// re-initialize and apply the full parameter set.
    pub(crate) full_reboot_pending: bool,
}

impl DxpModule {
    /// Create an engine for one module with no firmware selected.
    #[must_use]
    pub fn new(transport: Box<dyn Transport>, profile: &'static ChipProfile) -> Self {
        Self {
            io: RegisterIo::new(transport, profile),
            firmware: FirmwareSet::default(),
            runs: RunStateTracker::new(profile.channels),
            full_reboot_pending: false,
        }
    }

    /// Product description this module was built for.
    #[must_use]
    pub fn profile(&self) -> &'static ChipProfile {
        self.io.profile()
    }

    /// Firmware currently selected for downloads.
    #[must_use]
    pub fn firmware(&self) -> &FirmwareSet {
        &self.firmware
    }

    /// Select the firmware downloads will use. Nothing moves to the
    /// hardware until the download operations run.
    pub fn set_firmware(&mut self, firmware: FirmwareSet) {
        self.firmware = firmware;
    }

    /// Host-side view of `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`DxpError::InvalidChannel`] for a channel the product
    /// does not have.
    pub fn run_state(&self, channel: usize) -> Result<BoardRunState> {
        self.ensure_channel(channel)?;
        Ok(*self.runs.channel(channel))
    }

    pub(crate) fn ensure_channel(&self, channel: usize) -> Result<()> {
        let channels = self.profile().channels;
        if channel >= channels {
            return Err(DxpError::InvalidChannel { channel, channels });
        }
        Ok(())
    }

    pub(crate) fn ensure_dsp_loaded(&self, channel: usize) -> Result<()> {
        if self.runs.channel(channel).dsp_state == DspState::Loaded {
            Ok(())
        } else {
            Err(DxpError::DspNotLoaded { channel })
        }
    }

    pub(crate) fn require_dsp(&self) -> Result<Arc<DspProgram>> {
        self.firmware
            .dsp
            .clone()
            .ok_or(DxpError::MissingFirmware { what: "DSP code" })
    }

    /// Read the control/status register.
    ///
    /// # Errors
    ///
    /// Fails if the bus access fails.
    pub fn read_csr(&mut self) -> Result<u32> {
        self.io.read_register(self.profile().csr)
    }

    pub(crate) fn write_csr(&mut self, value: u32) -> Result<()> {
        self.io.write_register(self.profile().csr, value)
    }

    pub(crate) fn csr_set_bits(&mut self, mask: u32) -> Result<()> {
        let csr = self.read_csr()?;
        self.write_csr(csr | mask)
    }

    pub(crate) fn csr_clear_bits(&mut self, mask: u32) -> Result<()> {
        let csr = self.read_csr()?;
        self.write_csr(csr & !mask)
    }

    /// Whether the hardware reports a run in progress.
    ///
    /// # Errors
    ///
    /// Fails if the bus access fails.
    pub fn is_run_active(&mut self) -> Result<bool> {
        let csr = self.read_csr()?;
        Ok(csr & bit(self.profile().csr_bits.run_active) != 0)
    }

    pub(crate) fn dsp_reports_active(&mut self) -> Result<bool> {
        let csr = self.read_csr()?;
        Ok(csr & bit(self.profile().csr_bits.dsp_active) != 0)
    }

    /// Set the run-enable bit without touching any bookkeeping.
    ///
    /// `gate` false raises the gate-ignore bit on products that have
    /// one, so the external gate input cannot pause the run. `resume`
    /// false also raises the MCA-reset bit to clear spectrum memory.
    pub(crate) fn start_run_raw(&mut self, gate: bool, resume: bool) -> Result<()> {
        let bits = self.profile().csr_bits;
        let mut csr = self.read_csr()?;
        csr |= bit(bits.run_enable);
        if resume {
            csr &= !bit(bits.reset_mca);
        } else {
            csr |= bit(bits.reset_mca);
        }
        if let Some(pos) = bits.gate_ignore {
            if gate {
                csr &= !bit(pos);
            } else {
                csr |= bit(pos);
            }
        }
        self.write_csr(csr)
    }

    pub(crate) fn stop_run_raw(&mut self) -> Result<()> {
        self.csr_clear_bits(bit(self.profile().csr_bits.run_enable))
    }

    /// Start a normal data-acquisition run on every channel.
    ///
    /// # Errors
    ///
    /// Returns [`DxpError::RunActive`] when any channel already has a
    /// run or control task going.
    pub fn begin_run(&mut self, gate: bool, resume: bool) -> Result<u32> {
        if let Some(channel) = self.runs.any_active() {
            return Err(DxpError::RunActive { channel });
        }
        self.start_run_raw(gate, resume)?;
        self.runs.mark_all_running();
        let id = self.runs.next_run_id();
        info!(run = id, gate, resume, "run started");
        Ok(id)
    }

    /// Stop the current run and wait for the DSPs to go idle.
    ///
    /// The busy wait is skipped for channels whose DSP never loaded, so
    /// stopping a freshly powered module cannot hang.
    ///
    /// # Errors
    ///
    /// Fails on bus errors or when a DSP never reports idle.
    pub fn end_run(&mut self) -> Result<()> {
        self.stop_run_raw()?;
        self.runs.clear_all_running();
        let timeout = self.profile().timing.run_stop_timeout;
        for channel in 0..self.profile().channels {
            if self.runs.channel(channel).dsp_state == DspState::Loaded {
                self.wait_for_busy(channel, 0, timeout)?;
            }
        }
        info!("run stopped");
        Ok(())
    }

    /// Poll `BUSY` on `channel` until it reads `target`.
    ///
    /// Checks before the first sleep so an already-idle DSP returns
    /// immediately. On timeout the DSP's `RUNERROR` code is pulled into
    /// the log before the error returns.
    pub(crate) fn wait_for_busy(
        &mut self,
        channel: usize,
        target: u16,
        timeout: Duration,
    ) -> Result<()> {
        let interval = self.profile().timing.dsp_poll;
        for _ in 0..poll_count(timeout, interval) {
            if self.read_symbol_word("BUSY", channel)? == target {
                return Ok(());
            }
            self.io.sleep(interval);
        }
        match self.read_symbol_word("RUNERROR", channel) {
            Ok(code) => error!(
                channel,
                target,
                runerror = format_args!("{code:#x}"),
                "DSP never reached the requested BUSY state"
            ),
            Err(err) => debug!(channel, %err, "RUNERROR unavailable after BUSY timeout"),
        }
        Err(DxpError::timeout("BUSY", timeout))
    }

    /// Read a DSP parameter, combining word pieces to one value.
    ///
    /// # Errors
    ///
    /// Returns [`DxpError::DspNotLoaded`] until DSP code is downloaded,
    /// plus name, channel and access errors.
    pub fn read_symbol(&mut self, name: &str, channel: usize) -> Result<f64> {
        self.ensure_channel(channel)?;
        self.ensure_dsp_loaded(channel)?;
        self.read_symbol_raw(name, channel)
    }

    /// Write a DSP parameter, clamping into its declared bounds.
    ///
    /// # Errors
    ///
    /// Returns [`DxpError::DspNotLoaded`] until DSP code is downloaded,
    /// plus name, channel and access errors.
    pub fn write_symbol(&mut self, name: &str, channel: usize, value: u16) -> Result<WriteOutcome> {
        self.ensure_channel(channel)?;
        self.ensure_dsp_loaded(channel)?;
        let program = self.require_dsp()?;
        let plan = SymbolResolver::new(program.params()).write_plan(name, channel, value)?;
        self.write_data(self.data_address(plan.address), &[u32::from(plan.value)])?;
        Ok(plan.outcome)
    }

    /// Parameter read without the loaded-state gate, for engine
    /// internals that run during boot and teardown.
    pub(crate) fn read_symbol_raw(&mut self, name: &str, channel: usize) -> Result<f64> {
        let program = self.require_dsp()?;
        let plan = SymbolResolver::new(program.params()).read_plan(name, channel)?;
        let mut words = Vec::with_capacity(plan.addresses.len());
        for addr in plan.addresses {
            let value = self.io.read_block(self.data_address(addr), 1)?[0];
            words.push(lo_word(value));
        }
        Ok(combine_words(&words))
    }

    /// Single-word parameter read, no piece probing.
    pub(crate) fn read_symbol_word(&mut self, name: &str, channel: usize) -> Result<u16> {
        let program = self.require_dsp()?;
        let addr = SymbolResolver::new(program.params()).resolve(name, channel)?;
        let value = self.io.read_block(self.data_address(addr), 1)?[0];
        Ok(lo_word(value))
    }

    /// Parameter write bypassing access checks and clamping, for engine
    /// writes to symbols the host otherwise only reads.
    pub(crate) fn write_symbol_raw(&mut self, name: &str, channel: usize, value: u16) -> Result<()> {
        let program = self.require_dsp()?;
        let addr = SymbolResolver::new(program.params()).resolve(name, channel)?;
        self.write_data(self.data_address(addr), &[u32::from(value)])
    }

    /// Address of a parameter block slot on the bus.
    pub(crate) fn data_address(&self, offset: u32) -> u32 {
        self.profile().data_memory + offset
    }

    /// Data-memory write, verified on products whose bus drops writes.
    pub(crate) fn write_data(&mut self, addr: u32, values: &[u32]) -> Result<()> {
        if self.profile().persistent_data_writes {
            self.io.write_block_verified(addr, values)
        } else {
            self.io.write_block(addr, values)
        }
    }

    pub(crate) fn sleep(&mut self, duration: Duration) {
        self.io.sleep(duration);
    }
}

/// Polls that fit in `timeout` at one poll per `interval`, at least one.
pub(crate) fn poll_count(timeout: Duration, interval: Duration) -> usize {
    let interval = interval.as_millis().max(1);
    usize::try_from(timeout.as_millis() / interval)
        .unwrap_or(usize::MAX)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimTransport;
    use dxp_chip::{mercury, saturn};

    fn module(profile: &'static ChipProfile) -> (DxpModule, SimTransport) {
        let sim = SimTransport::new(profile);
        (DxpModule::new(Box::new(sim.clone()), profile), sim)
    }

    #[test]
    fn poll_counts_round_down() {
        assert_eq!(poll_count(Duration::from_secs(1), Duration::from_millis(100)), 10);
        assert_eq!(poll_count(Duration::from_secs(3), Duration::from_millis(50)), 60);
        assert_eq!(poll_count(Duration::from_millis(5), Duration::from_millis(10)), 1);
    }

    #[test]
    fn begin_run_sets_enable_and_mca_reset() {
        let (mut module, sim) = module(&mercury::PROFILE);
        let id = module.begin_run(true, false).unwrap();
        assert_eq!(id, 0);
        assert_eq!(sim.csr() & 0b11, 0b11);
        assert!(module.is_run_active().unwrap());
    }

    #[test]
    fn resume_preserves_spectrum_memory() {
        let (mut module, sim) = module(&mercury::PROFILE);
        module.begin_run(true, true).unwrap();
        assert_eq!(sim.csr() & 0b10, 0);
    }

    #[test]
    fn second_run_rejected_while_active() {
        let (mut module, _sim) = module(&mercury::PROFILE);
        module.begin_run(true, false).unwrap();
        let err = module.begin_run(true, false).unwrap_err();
        assert!(matches!(err, DxpError::RunActive { channel: 0 }));
    }

    #[test]
    fn run_ids_count_up_per_module() {
        let (mut module, _sim) = module(&mercury::PROFILE);
        assert_eq!(module.begin_run(true, false).unwrap(), 0);
        module.end_run().unwrap();
        assert_eq!(module.begin_run(true, false).unwrap(), 1);
    }

    #[test]
    fn gate_ignore_bit_follows_gate_flag() {
        let (mut module, sim) = module(&saturn::PROFILE);
        module.begin_run(false, false).unwrap();
        assert_ne!(sim.csr() & (1 << 11), 0);
        module.end_run().unwrap();
        module.begin_run(true, false).unwrap();
        assert_eq!(sim.csr() & (1 << 11), 0);
    }

    #[test]
    fn channel_bounds_checked() {
        let (module, _sim) = module(&mercury::PROFILE);
        assert!(module.run_state(3).is_ok());
        assert!(matches!(
            module.run_state(4),
            Err(DxpError::InvalidChannel { channel: 4, channels: 4 })
        ));
    }

    #[test]
    fn symbol_access_requires_loaded_dsp() {
        let (mut module, _sim) = module(&mercury::PROFILE);
        assert!(matches!(
            module.read_symbol("BUSY", 0),
            Err(DxpError::DspNotLoaded { channel: 0 })
        ));
    }
}
