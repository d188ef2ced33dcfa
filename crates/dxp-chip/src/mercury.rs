//! Mercury register map and profile.
//!
//! Four-channel USB2-bridged module. The USB bridge exposes two transport
//! ports: writes to the address port latch a target device address, then
//! data moves through the I/O port with the address auto-incrementing.
//! Registers live behind the same two-phase scheme; all are 32 bits wide,
//! moved as two 16-bit words, low word first.
//!
//! ```text
//! 0x1000_0001  CFG-control   FPGA target arm mask
//! 0x1000_0002  CFG-data      bitstream byte stream (one byte per write)
//! 0x1000_0003  CFG-status    INIT*/XDONE lines
//! 0x0800_0002  CSR           run/boot command bits + active status bits
//! ```

use core::time::Duration;

use crate::profile::{
    ChipProfile, ChipVariant, CsrLayout, FpgaTarget, Register, SpecialRunStyle, TimingProfile,
};
use crate::tasks::ControlTask;

/// Transport port moving data words.
pub const PORT_IO: u32 = 0;
/// Transport port latching the transfer address.
pub const PORT_ADDR: u32 = 1;

/// CFG-control register address.
pub const CFG_CONTROL: u32 = 0x1000_0001;
/// CFG-data register address.
pub const CFG_DATA: u32 = 0x1000_0002;
/// CFG-status register address.
pub const CFG_STATUS: u32 = 0x1000_0003;
/// Control/status register address (system FPGA space).
pub const CSR: u32 = 0x0800_0002;

/// DSP program memory base.
pub const PROGRAM_MEMORY: u32 = 0x0000_0000;
/// DSP data memory base. Symbol addresses are offsets from here.
pub const DATA_MEMORY: u32 = 0x0100_0000;
/// External (statistics/MCA) memory base.
pub const EXT_MEMORY: u32 = 0x0300_0000;

/// `SPECIALRUN` codes understood by Mercury DSP firmware.
pub mod specialrun {
    /// Apply pending parameter changes.
    pub const APPLY: u16 = 0;
    /// ADC trace capture.
    pub const TRACE: u16 = 1;
    /// Adjust the ADC offset DAC (Mercury OEM).
    pub const SET_OFFADC: u16 = 2;
    /// Calibrate the RC decay time (Mercury OEM).
    pub const CALIBRATE_RC: u16 = 3;
    /// Put the DSP to sleep.
    pub const DSP_SLEEP: u16 = 7;
}

/// Mercury module profile.
pub const PROFILE: ChipProfile = ChipProfile {
    variant: ChipVariant::Mercury,
    channels: 4,
    addr_port: PORT_ADDR,
    data_port: PORT_IO,
    readdress_per_chunk: false,
    csr: Register::word32(CSR),
    csr_bits: CsrLayout {
        run_enable: 0,
        reset_mca: 1,
        dsp_reset: 2,
        dsp_boot: 3,
        run_active: 16,
        dsp_active: 17,
        gate_ignore: None,
    },
    cfg_control: Register::word32(CFG_CONTROL),
    cfg_data: Register::word32(CFG_DATA),
    cfg_status: Register::word32(CFG_STATUS),
    fpga_targets: &[
        FpgaTarget { name: "system FPGA", mask: 0x1, init: 0x1, xdone: 0x2 },
        FpgaTarget { name: "FiPPI A", mask: 0x2, init: 0x4, xdone: 0x8 },
    ],
    program_memory: PROGRAM_MEMORY,
    data_memory: DATA_MEMORY,
    max_dsp_words: 0x10000,
    dsp_word32_program: true,
    persistent_data_writes: false,
    special_run: SpecialRunStyle::Runtype {
        codes: &[
            (ControlTask::Apply, specialrun::APPLY),
            (ControlTask::AdcTrace, specialrun::TRACE),
            (ControlTask::SetAdcOffset, specialrun::SET_OFFADC),
            (ControlTask::CalibrateRc, specialrun::CALIBRATE_RC),
            (ControlTask::SleepDsp, specialrun::DSP_SLEEP),
        ],
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
        assert_eq!(CFG_CONTROL, 0x1000_0001);
        assert_eq!(CFG_STATUS, 0x1000_0003);
        assert_eq!(CSR, 0x0800_0002);
        assert_eq!(DATA_MEMORY, 0x0100_0000);
    }

    #[test]
    fn target_masks_are_disjoint() {
        let all = PROFILE.all_targets_mask();
        assert_eq!(all, 0x3);
        for t in PROFILE.fpga_targets {
            assert_eq!(t.init & t.xdone, 0);
        }
    }

    #[test]
    fn sleep_code_present() {
        assert_eq!(
            PROFILE.special_run_code(ControlTask::SleepDsp),
            Some(specialrun::DSP_SLEEP)
        );
    }
}
