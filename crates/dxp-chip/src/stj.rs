//! STJ register map and profile.
//!
//! Eight-channel PCI module for superconducting tunnel junction
//! detectors. The PLX bridge exposes a transfer-address register (TAR)
//! and transfer-data register (TDR) pair; block transfers latch the
//! device address into the TAR once and stream words through the TDR,
//! which auto-increments. The PLX write path is known to drop writes
//! under DMA load, so data-memory writes are verified and rewritten.

use core::time::Duration;

use crate::profile::{
    ChipProfile, ChipVariant, CsrLayout, FpgaTarget, Register, SpecialRunStyle, TimingProfile,
};
use crate::tasks::ControlTask;

/// Transfer Address Register (transport port).
pub const PORT_TAR: u32 = 0x50;
/// Transfer Data Register (transport port).
pub const PORT_TDR: u32 = 0x54;

/// CFG-control register address.
pub const CFG_CONTROL: u32 = 0x4;
/// CFG-data register address.
pub const CFG_DATA: u32 = 0x8;
/// CFG-status register address.
pub const CFG_STATUS: u32 = 0xC;
/// Control/status register address.
pub const CSR: u32 = 0x48;

/// DSP program memory base.
pub const PROGRAM_MEMORY: u32 = 0x0000_0000;
/// DSP data memory base.
pub const DATA_MEMORY: u32 = 0x0100_0000;
/// External 32-bit memory base.
pub const EXT_MEMORY: u32 = 0x0300_0000;
/// Event buffer A base.
pub const BUF_A_MEMORY: u32 = 0x0400_0000;

/// `SPECIALRUN` codes understood by STJ DSP firmware.
pub mod specialrun {
    /// Apply pending parameter changes.
    pub const APPLY: u16 = 0;
    /// ADC trace capture.
    pub const TRACE: u16 = 1;
    /// Detector bias scan.
    pub const BIAS_SCAN: u16 = 7;
    /// Recalibrate ADC offsets.
    pub const ADJUST_OFFSETS: u16 = 8;
    /// Drive the bias DAC directly.
    pub const BIAS_SET_DAC: u16 = 10;
}

/// STJ module profile.
pub const PROFILE: ChipProfile = ChipProfile {
    variant: ChipVariant::Stj,
    channels: 8,
    addr_port: PORT_TAR,
    data_port: PORT_TDR,
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
        FpgaTarget { name: "FiPPI B", mask: 0x4, init: 0x10, xdone: 0x20 },
    ],
    program_memory: PROGRAM_MEMORY,
    data_memory: DATA_MEMORY,
    max_dsp_words: 0x10000,
    dsp_word32_program: true,
    persistent_data_writes: true,
    special_run: SpecialRunStyle::Runtype {
        codes: &[
            (ControlTask::Apply, specialrun::APPLY),
            (ControlTask::AdcTrace, specialrun::TRACE),
            (ControlTask::BiasScan, specialrun::BIAS_SCAN),
            (ControlTask::AdjustOffsets, specialrun::ADJUST_OFFSETS),
            (ControlTask::BiasSetDac, specialrun::BIAS_SET_DAC),
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
