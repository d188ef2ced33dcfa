//! DSP code download, boot, sleep and wake.
//!
//! The DSP is reset, fed its program image through program memory, then
//! booted and watched until it reports both alive and idle. Sleep and
//! wake bracket FiPPI reconfiguration on products whose DSP would
//! otherwise trip on the dead front end; both are no-ops when the CSR
//! says no DSP is running, so they are safe on a cold module.

use dxp_chip::ControlTask;
use tracing::{debug, info};

use crate::device::{bit, poll_count, DxpModule};
use crate::error::{DxpError, Result};

/// Pack 16-bit program words for the bus. Mercury-class program memory
/// takes two words per location, high word in the upper half; a lone
/// trailing word goes out low.
fn pack_program(words: &[u16], word32: bool) -> Vec<u32> {
    if !word32 {
        return words.iter().map(|&w| u32::from(w)).collect();
    }
    let mut out = Vec::with_capacity(words.len().div_ceil(2));
    let mut pairs = words.chunks_exact(2);
    for pair in pairs.by_ref() {
        out.push(u32::from(pair[1]) << 16 | u32::from(pair[0]));
    }
    if let [lo] = pairs.remainder() {
        out.push(u32::from(*lo));
    }
    out
}

impl DxpModule {
    /// Hold the DSP in reset and let it settle.
    pub(crate) fn reset_dsp(&mut self) -> Result<()> {
        self.csr_set_bits(bit(self.profile().csr_bits.dsp_reset))?;
        let settle = self.profile().timing.dsp_reset_settle;
        self.sleep(settle);
        Ok(())
    }

    /// Raise the boot bit, then wait for the DSP to report alive and
    /// every channel to go idle.
    pub(crate) fn boot_dsp(&mut self) -> Result<()> {
        let timing = self.profile().timing;
        self.csr_set_bits(bit(self.profile().csr_bits.dsp_boot))?;

        let mut alive = false;
        for _ in 0..poll_count(timing.dsp_active_timeout, timing.dsp_poll) {
            if self.dsp_reports_active()? {
                alive = true;
                break;
            }
            self.sleep(timing.dsp_poll);
        }
        if !alive {
            return Err(DxpError::timeout("DSP active", timing.dsp_active_timeout));
        }
        for channel in 0..self.profile().channels {
            self.wait_for_busy(channel, 0, timing.dsp_busy_timeout)?;
        }
        debug!("DSP up and idle");
        Ok(())
    }

    /// Download the selected DSP program and boot it.
    ///
    /// After a system FPGA reload this also re-initializes the fresh
    /// parameter set and applies it to the hardware.
    ///
    /// # Errors
    ///
    /// Returns [`DxpError::MissingFirmware`] with no DSP selected,
    /// [`DxpError::ProgramTooLarge`] when the image exceeds program
    /// memory, plus boot and bus errors.
    pub fn download_dsp(&mut self) -> Result<()> {
        let program = self.require_dsp()?;
        let limit = self.profile().max_dsp_words;
        if program.word_count() > limit {
            return Err(DxpError::ProgramTooLarge { words: program.word_count(), limit });
        }

        self.reset_dsp()?;
        let packed = pack_program(program.words(), self.profile().dsp_word32_program);
        self.io.write_block(self.profile().program_memory, &packed)?;
        info!(words = program.word_count(), "DSP code downloaded");
        self.boot_dsp()?;
        self.runs.mark_all_loaded();

        if self.full_reboot_pending {
            self.finish_full_reboot()?;
        }
        Ok(())
    }

    /// After a whole-board reload the DSP boots with default parameters.
    /// Flag a first-time initialization and push the set to the
    /// hardware so acquisition state is coherent again.
    fn finish_full_reboot(&mut self) -> Result<()> {
        self.full_reboot_pending = false;
        for channel in 0..self.profile().channels {
            match self.write_symbol_raw("INITIALIZE", channel, 1) {
                Ok(()) => {}
                Err(DxpError::UnknownSymbol { .. }) => {
                    debug!("program has no INITIALIZE flag, skipping");
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        if self.profile().special_run_code(ControlTask::Apply).is_some() {
            self.apply(0)?;
        }
        Ok(())
    }

    /// Idle the DSP in a sleep run so front-end reconfiguration cannot
    /// glitch it. No-op when the CSR reports no DSP running.
    pub(crate) fn sleep_dsp(&mut self) -> Result<()> {
        if !self.dsp_reports_active()? {
            info!("no DSP running, sleep skipped");
            return Ok(());
        }
        for channel in 0..self.profile().channels {
            self.arm_special_run(channel, ControlTask::SleepDsp)?;
        }
        self.start_run_raw(false, true)?;
        debug!("DSP sleeping");
        Ok(())
    }

    /// End a sleep run and put the DSP back in normal run mode. No-op
    /// when the CSR reports no DSP running.
    pub(crate) fn wake_dsp(&mut self) -> Result<()> {
        if !self.dsp_reports_active()? {
            info!("no DSP running, wake skipped");
            return Ok(());
        }
        self.stop_run_raw()?;
        let timeout = self.profile().timing.dsp_busy_timeout;
        for channel in 0..self.profile().channels {
            self.wait_for_busy(channel, 0, timeout)?;
        }
        self.restore_normal_run_mode()?;
        debug!("DSP awake");
        Ok(())
    }
}
