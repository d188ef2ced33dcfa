//! STJ driver.
//!
//! Eight-channel PCI product for superconducting tunnel junction
//! detectors. Its two FiPPIs load the same image in one download, and
//! its PLX bridge is the reason data-memory writes are verified. The
//! DSP is never slept around FiPPI reloads on this product; the system
//! FPGA holds the front end quiet instead.

use dxp_chip::{stj, ChipVariant, ControlTask};

use super::{require_image, DeviceDriver, DownloadFn, DriverCore, BOOT_BUSY};
use crate::device::{DxpModule, FirmwareSet};
use crate::error::Result;
use crate::symbols::WriteOutcome;
use crate::tasks::{self, TaskDescriptor};
use crate::transport::Transport;

const SYSTEM: u32 = 0x1;
const FIPPIS: u32 = 0x6;

const CONTROL_TASKS: &[TaskDescriptor] = &[
    TaskDescriptor {
        task: ControlTask::AdcTrace,
        parse_info: Some(tasks::parse_trace_wait),
        start: tasks::start_trace,
        read_data: Some(tasks::read_adc_trace),
    },
    TaskDescriptor {
        task: ControlTask::Apply,
        parse_info: None,
        start: tasks::start_apply,
        read_data: None,
    },
    TaskDescriptor {
        task: ControlTask::WakeDsp,
        parse_info: None,
        start: tasks::start_wake,
        read_data: None,
    },
    TaskDescriptor {
        task: ControlTask::AdjustOffsets,
        parse_info: None,
        start: tasks::start_special_wait_busy,
        read_data: None,
    },
    TaskDescriptor {
        task: ControlTask::BiasScan,
        parse_info: None,
        start: tasks::start_special_wait_busy,
        read_data: None,
    },
    TaskDescriptor {
        task: ControlTask::BiasSetDac,
        parse_info: None,
        start: tasks::start_special_wait_busy,
        read_data: None,
    },
];

const FPGA_DOWNLOADERS: &[(&str, DownloadFn)] = &[
    ("all", download_all),
    ("system_fpga", download_system),
    ("a_and_b", download_fippis),
    ("a_and_b_dsp_no_wake", download_fippis_no_wake),
];

fn download_all(module: &mut DxpModule) -> Result<()> {
    let system = require_image(module.firmware().system_fpga.as_ref(), "system FPGA")?;
    module.configure_fpga(SYSTEM, &system)?;
    module.full_reboot_pending = true;
    module.runs.invalidate_dsp();
    download_fippis(module)
}

fn download_system(module: &mut DxpModule) -> Result<()> {
    let system = require_image(module.firmware().system_fpga.as_ref(), "system FPGA")?;
    module.configure_fpga(SYSTEM, &system)?;
    module.reset_dsp()?;
    for channel in 0..module.profile().channels {
        module.write_symbol_raw("BUSY", channel, BOOT_BUSY)?;
    }
    module.boot_dsp()?;
    module.runs.invalidate_dsp();
    Ok(())
}

/// Both FiPPIs from one image. The wake is skipped mid full reboot; the
/// DSP download that follows does its own initialization.
fn download_fippis(module: &mut DxpModule) -> Result<()> {
    download_fippis_no_wake(module)?;
    if module.full_reboot_pending {
        return Ok(());
    }
    module.wake_dsp()
}

fn download_fippis_no_wake(module: &mut DxpModule) -> Result<()> {
    let image = require_image(module.firmware().fippi_a.as_ref(), "FiPPI A")?;
    module.configure_fpga(FIPPIS, &image)
}

/// Driver for STJ modules.
#[derive(Debug)]
pub struct StjDriver {
    core: DriverCore,
}

impl StjDriver {
    /// Create a driver over `transport`.
    #[must_use]
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            core: DriverCore::new(transport, &stj::PROFILE, CONTROL_TASKS, FPGA_DOWNLOADERS),
        }
    }

    /// The engine underneath, for access beyond the driver surface.
    #[must_use]
    pub fn module(&self) -> &DxpModule {
        &self.core.module
    }

    /// Mutable access to the engine underneath.
    pub fn module_mut(&mut self) -> &mut DxpModule {
        &mut self.core.module
    }
}

impl DeviceDriver for StjDriver {
    fn variant(&self) -> ChipVariant {
        ChipVariant::Stj
    }

    fn set_firmware(&mut self, firmware: FirmwareSet) {
        self.core.module.set_firmware(firmware);
    }

    fn download_fpga(&mut self, name: &str) -> Result<()> {
        self.core.download_fpga(name)
    }

    fn download_dsp(&mut self) -> Result<()> {
        self.core.module.download_dsp()
    }

    fn begin_control_task(
        &mut self,
        channel: usize,
        task: ControlTask,
        info: &[u32],
    ) -> Result<()> {
        self.core.begin_control_task(channel, task, info)
    }

    fn control_task_data(&mut self, channel: usize, task: ControlTask) -> Result<Vec<u16>> {
        self.core.control_task_data(channel, task)
    }

    fn end_control_task(&mut self, channel: usize, task: ControlTask) -> Result<()> {
        self.core.end_control_task(channel, task)
    }

    fn read_symbol(&mut self, channel: usize, name: &str) -> Result<f64> {
        self.core.module.read_symbol(name, channel)
    }

    fn write_symbol(&mut self, channel: usize, name: &str, value: u16) -> Result<WriteOutcome> {
        self.core.module.write_symbol(name, channel, value)
    }

    fn begin_run(&mut self, gate: bool, resume: bool) -> Result<u32> {
        self.core.module.begin_run(gate, resume)
    }

    fn end_run(&mut self) -> Result<()> {
        self.core.module.end_run()
    }

    fn is_run_active(&mut self) -> Result<bool> {
        self.core.module.is_run_active()
    }
}
