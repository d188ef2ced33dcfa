//! Saturn register map and profile.
//!
//! Single-channel EPP/USB-bridged module, the oldest product in the
//! family. Everything is 16 bits wide: the transport moves one word per
//! register access, the CSR is a single word, and DSP program words are
//! streamed bare instead of packed into 32-bit writes. The transfer
//! address latches through the TSAR port and data moves through port 0.
//!
//! ```text
//! 0x8000  CSR          run/boot command bits + active status bits
//! 0x8001  CFG-control  FPGA target arm mask
//! 0x8002  CFG-status   INIT*/XDONE lines
//! 0x8003  CFG-data     bitstream byte stream (one byte per write)
//! ```
//!
//! Saturn DSP firmware predates the `SPECIALRUN` convention: a control
//! task is requested by writing its code to `WHICHTEST` and setting the
//! control-task bit in `RUNTASKS` before starting the run.

use core::time::Duration;

use crate::profile::{
    ChipProfile, ChipVariant, CsrLayout, FpgaTarget, Register, SpecialRunStyle, TimingProfile,
};
use crate::tasks::ControlTask;

/// Transport port moving data words.
pub const PORT_IO: u32 = 0;
/// Transport port latching the transfer address (TSAR).
pub const PORT_TSAR: u32 = 1;

/// Control/status register address.
pub const CSR: u32 = 0x8000;
/// CFG-control register address.
pub const CFG_CONTROL: u32 = 0x8001;
/// CFG-status register address.
pub const CFG_STATUS: u32 = 0x8002;
/// CFG-data register address.
pub const CFG_DATA: u32 = 0x8003;

/// DSP program memory base.
pub const PROGRAM_MEMORY: u32 = 0x0000;
/// DSP data memory base.
pub const DATA_MEMORY: u32 = 0x4000;

/// CSR bit masks.
pub mod csr {
    /// Run enable (command).
    pub const RUNENABLE: u16 = 0x1;
    /// Clear MCA memory at run start (command).
    pub const RESETMCA: u16 = 0x2;
    /// DSP boot release (command).
    pub const DSPBOOT: u16 = 0x4;
    /// DSP reset (command).
    pub const DSPRESET: u16 = 0x10;
    /// FiPPI reset (command).
    pub const FIPRESET: u16 = 0x20;
    /// FiPPI configuration error (status).
    pub const FIPERR: u16 = 0x100;
    /// Ignore the external gate input (command).
    pub const IGNOREGATE: u16 = 0x800;
    /// Run in progress (status).
    pub const RUNACTIVE: u16 = 0x4000;
    /// DSP firmware executing (status).
    pub const DSPACTIVE: u16 = 0x8000;
}

/// `WHICHTEST` codes understood by Saturn DSP firmware.
pub mod whichtest {
    /// Set the slow ASC DAC.
    pub const SET_ASCDAC: u16 = 0;
    /// ADC trace capture.
    pub const ACQUIRE_ADC: u16 = 1;
    /// Calibrate the tracking DAC.
    pub const TRKDAC: u16 = 2;
    /// Energy slope calibration.
    pub const SLOPE_CALIB: u16 = 3;
    /// Put the DSP to sleep.
    pub const SLEEP_DSP: u16 = 6;
    /// Reprogram the FiPPI from DSP-held configuration.
    pub const PROGRAM_FIPPI: u16 = 11;
    /// Set the input polarity.
    pub const SET_POLARITY: u16 = 12;
    /// Freeze the baseline history buffer.
    pub const BASELINE_HIST: u16 = 17;
    /// Read a page of external memory.
    pub const READ_MEMORY: u16 = 20;
    /// Write a page of external memory.
    pub const WRITE_MEMORY: u16 = 21;
    /// Soft reset.
    pub const RESET: u16 = 99;
}

/// Control-task bit in `RUNTASKS`.
pub const RUNTASKS_CONTROL_TASK: u16 = 0x100;

/// Saturn module profile.
pub const PROFILE: ChipProfile = ChipProfile {
    variant: ChipVariant::Saturn,
    channels: 1,
    addr_port: PORT_TSAR,
    data_port: PORT_IO,
    readdress_per_chunk: false,
    csr: Register::word16(CSR),
    csr_bits: CsrLayout {
        run_enable: 0,
        reset_mca: 1,
        dsp_boot: 2,
        dsp_reset: 4,
        run_active: 14,
        dsp_active: 15,
        gate_ignore: Some(11),
    },
    cfg_control: Register::word16(CFG_CONTROL),
    cfg_data: Register::word16(CFG_DATA),
    cfg_status: Register::word16(CFG_STATUS),
    fpga_targets: &[FpgaTarget { name: "FiPPI", mask: 0x1, init: 0x1, xdone: 0x2 }],
    program_memory: PROGRAM_MEMORY,
    data_memory: DATA_MEMORY,
    max_dsp_words: 0x8000,
    dsp_word32_program: false,
    persistent_data_writes: false,
    special_run: SpecialRunStyle::Whichtest {
        codes: &[
            (ControlTask::SetAscDac, whichtest::SET_ASCDAC),
            (ControlTask::AdcTrace, whichtest::ACQUIRE_ADC),
            (ControlTask::TrackDac, whichtest::TRKDAC),
            (ControlTask::SlopeCalibrate, whichtest::SLOPE_CALIB),
            (ControlTask::SleepDsp, whichtest::SLEEP_DSP),
            (ControlTask::BaselineHistory, whichtest::BASELINE_HIST),
            (ControlTask::ReadMemory, whichtest::READ_MEMORY),
            (ControlTask::WriteMemory, whichtest::WRITE_MEMORY),
        ],
        runtasks_bit: RUNTASKS_CONTROL_TASK,
    },
    timing: TimingProfile {
        cfg_settle: Duration::from_millis(1),
        xdone_poll: Duration::from_millis(50),
        xdone_timeout: Duration::from_secs(3),
        dsp_reset_settle: Duration::from_millis(1),
        dsp_poll: Duration::from_millis(10),
        dsp_active_timeout: Duration::from_secs(1),
        dsp_busy_timeout: Duration::from_secs(1),
        run_stop_timeout: Duration::from_secs(10),
        apply_poll: Duration::from_millis(100),
        apply_timeout: Duration::from_secs(1),
    },
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_addresses() {
        assert_eq!(CSR, 0x8000);
        assert_eq!(CFG_DATA, 0x8003);
        assert_eq!(DATA_MEMORY, 0x4000);
    }

    #[test]
    fn csr_masks_match_bit_positions() {
        let bits = PROFILE.csr_bits;
        assert_eq!(1 << bits.run_enable, u32::from(csr::RUNENABLE));
        assert_eq!(1 << bits.reset_mca, u32::from(csr::RESETMCA));
        assert_eq!(1 << bits.dsp_reset, u32::from(csr::DSPRESET));
        assert_eq!(1 << bits.run_active, u32::from(csr::RUNACTIVE));
        assert_eq!(1 << bits.gate_ignore.unwrap(), u32::from(csr::IGNOREGATE));
    }

    #[test]
    fn whichtest_lookup() {
        assert_eq!(
            PROFILE.special_run_code(ControlTask::AdcTrace),
            Some(whichtest::ACQUIRE_ADC)
        );
        assert_eq!(PROFILE.special_run_code(ControlTask::BiasScan), None);
        match PROFILE.special_run {
            SpecialRunStyle::Whichtest { runtasks_bit, .. } => {
                assert_eq!(runtasks_bit, RUNTASKS_CONTROL_TASK);
            }
            SpecialRunStyle::Runtype { .. } => panic!("saturn uses WHICHTEST"),
        }
    }

    #[test]
    fn single_word_registers() {
        assert_eq!(PROFILE.csr.width.words(), 1);
        assert!(!PROFILE.dsp_word32_program);
    }
}
