//! Product profile: everything the engine needs to know about one module
//! variant, expressed as plain data.
//!
//! The drivers share one code path for register I/O, FPGA configuration,
//! DSP boot and special runs; the differences between Saturn, Mercury, STJ
//! and xMAP hardware are confined to the `ChipProfile` consts in the
//! sibling modules. Nothing in here touches hardware.

use core::time::Duration;

use crate::tasks::ControlTask;

/// Module variant identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipVariant {
    /// Single-channel Saturn / X10P module (EPP/USB bridge).
    Saturn,
    /// Four-channel Mercury module (USB2 bridge).
    Mercury,
    /// Eight-channel superconducting-junction module (PCI/PLX bridge).
    Stj,
    /// Four-channel xMAP module (PCI/PLX bridge).
    Xmap,
}

impl ChipVariant {
    /// Short lowercase name used in logs and the CLI.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Saturn => "saturn",
            Self::Mercury => "mercury",
            Self::Stj => "stj",
            Self::Xmap => "xmap",
        }
    }
}

/// Width of a device register in transport words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterWidth {
    /// One 16-bit transport word.
    Word16,
    /// Two 16-bit transport words, low word first.
    Word32,
}

impl RegisterWidth {
    /// Transport words per register access.
    #[must_use]
    pub const fn words(self) -> usize {
        match self {
            Self::Word16 => 1,
            Self::Word32 => 2,
        }
    }
}

/// A device register location. Pure value, no ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    /// Device address.
    pub addr: u32,
    /// Access width.
    pub width: RegisterWidth,
}

impl Register {
    /// 16-bit register at `addr`.
    #[must_use]
    pub const fn word16(addr: u32) -> Self {
        Self { addr, width: RegisterWidth::Word16 }
    }

    /// 32-bit register at `addr`.
    #[must_use]
    pub const fn word32(addr: u32) -> Self {
        Self { addr, width: RegisterWidth::Word32 }
    }
}

/// CSR bit positions for one variant.
///
/// Command bits (run-enable, reset, boot) are written read-modify-write;
/// status bits (run-active, DSP-active) are observe-only.
#[derive(Debug, Clone, Copy)]
pub struct CsrLayout {
    /// Starts data acquisition while set.
    pub run_enable: u8,
    /// Clears MCA memory at run start when set.
    pub reset_mca: u8,
    /// Holds the DSP in reset.
    pub dsp_reset: u8,
    /// Boots the DSP out of reset once program memory is loaded.
    pub dsp_boot: u8,
    /// Asserted by hardware while a run is in progress.
    pub run_active: u8,
    /// Asserted by hardware while DSP firmware is executing.
    pub dsp_active: u8,
    /// Ignores the external gate input when set. Not present on all
    /// variants.
    pub gate_ignore: Option<u8>,
}

/// One FPGA configurable from the CFG port, with its arm mask and the
/// status-register masks for its INIT* and XDONE lines.
#[derive(Debug, Clone, Copy)]
pub struct FpgaTarget {
    /// Human-readable name used in logs ("system FPGA", "FiPPI A", ...).
    pub name: &'static str,
    /// Bit written to CFG-control to arm this device.
    pub mask: u32,
    /// CFG-status mask: ready to receive configuration data.
    pub init: u32,
    /// CFG-status mask: configuration complete and CRC-valid.
    pub xdone: u32,
}

/// `RUNTYPE` value for normal data acquisition.
pub const RUNTYPE_NORMAL: u16 = 0;
/// `RUNTYPE` value for a special run.
pub const RUNTYPE_SPECIAL: u16 = 1;

/// How a variant launches a special run.
#[derive(Debug, Clone, Copy)]
pub enum SpecialRunStyle {
    /// Mercury-class convention: write `RUNTYPE = 1` and `SPECIALRUN` to
    /// the task's code, then start a run.
    Runtype {
        /// Task to `SPECIALRUN` code map.
        codes: &'static [(ControlTask, u16)],
    },
    /// Saturn convention: write the task's code to `WHICHTEST` and OR the
    /// control-task bit into `RUNTASKS`, then start a run.
    Whichtest {
        /// Task to `WHICHTEST` code map.
        codes: &'static [(ControlTask, u16)],
        /// Control-task bit in `RUNTASKS`.
        runtasks_bit: u16,
    },
}

impl SpecialRunStyle {
    /// Device code for `task`, if the variant supports it.
    #[must_use]
    pub fn code(&self, task: ControlTask) -> Option<u16> {
        let codes = match self {
            Self::Runtype { codes } | Self::Whichtest { codes, .. } => codes,
        };
        codes.iter().find(|(t, _)| *t == task).map(|&(_, c)| c)
    }
}

/// Timing contract for one variant. All waits in the engine derive their
/// poll counts from these values (`round(timeout / interval)`).
#[derive(Debug, Clone, Copy)]
pub struct TimingProfile {
    /// Settle time after arming a CFG target, before the single INIT*
    /// check. Sleep granularity makes a poll loop pointless here.
    pub cfg_settle: Duration,
    /// Poll interval while waiting for XDONE.
    pub xdone_poll: Duration,
    /// Total XDONE wait.
    pub xdone_timeout: Duration,
    /// Settle time after asserting DSP reset.
    pub dsp_reset_settle: Duration,
    /// Poll interval for the CSR DSP-active bit and for `BUSY`.
    pub dsp_poll: Duration,
    /// Total wait for DSP-active after boot.
    pub dsp_active_timeout: Duration,
    /// Total wait for `BUSY == 0` after boot.
    pub dsp_busy_timeout: Duration,
    /// Total wait for `BUSY == 0` when a run or special run is stopped.
    pub run_stop_timeout: Duration,
    /// Poll interval for the run-enable bit during an apply run.
    pub apply_poll: Duration,
    /// Total apply wait.
    pub apply_timeout: Duration,
}

/// Complete description of one module variant.
#[derive(Debug, Clone, Copy)]
pub struct ChipProfile {
    /// Which product this is.
    pub variant: ChipVariant,
    /// Physical channels on the module.
    pub channels: usize,
    /// Transport port that receives the target device address
    /// (the TAR/TSAR phase).
    pub addr_port: u32,
    /// Transport port that moves data words.
    pub data_port: u32,
    /// Whether the TAR must be rewritten before every chunk of a block
    /// transfer. When false the data port auto-increments.
    pub readdress_per_chunk: bool,
    /// Control/status register.
    pub csr: Register,
    /// CSR bit positions.
    pub csr_bits: CsrLayout,
    /// CFG-control register (FPGA target arm mask).
    pub cfg_control: Register,
    /// CFG-data register (bitstream byte stream).
    pub cfg_data: Register,
    /// CFG-status register (INIT*/XDONE lines).
    pub cfg_status: Register,
    /// Configurable FPGAs on this module.
    pub fpga_targets: &'static [FpgaTarget],
    /// Base device address of DSP program memory.
    pub program_memory: u32,
    /// Base device address of DSP data memory. Symbol addresses are
    /// relative to this.
    pub data_memory: u32,
    /// Maximum DSP program length in 16-bit words.
    pub max_dsp_words: usize,
    /// Whether DSP program words are packed two-per-transfer into 32-bit
    /// writes (`hi << 16 | lo`) or streamed as bare 16-bit words.
    pub dsp_word32_program: bool,
    /// Whether data-memory block writes must be verified and rewritten
    /// (transport drops writes silently under load).
    pub persistent_data_writes: bool,
    /// Special-run launch convention.
    pub special_run: SpecialRunStyle,
    /// Timing contract.
    pub timing: TimingProfile,
}

impl ChipProfile {
    /// FPGA targets selected by a CFG-control mask, in table order.
    pub fn targets_in(&self, mask: u32) -> impl Iterator<Item = &'static FpgaTarget> + '_ {
        self.fpga_targets.iter().filter(move |t| t.mask & mask != 0)
    }

    /// Width of the product's register bus. Every register and every
    /// block-addressable memory location moves one value of this width,
    /// and the address phase sends the target address at the same width.
    #[must_use]
    pub const fn bus_width(&self) -> RegisterWidth {
        self.csr.width
    }

    /// Device code for a special run, if this variant supports the task.
    #[must_use]
    pub fn special_run_code(&self, task: ControlTask) -> Option<u16> {
        self.special_run.code(task)
    }

    /// Combined arm mask of every FPGA on the module.
    #[must_use]
    pub fn all_targets_mask(&self) -> u32 {
        self.fpga_targets.iter().fold(0, |m, t| m | t.mask)
    }
}
