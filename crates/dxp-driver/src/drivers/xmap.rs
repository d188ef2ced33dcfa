//! xMAP driver.
//!
//! Four-channel PCI mapping product. Three configuration targets, with
//! separate FiPPI images for the A and B channel pairs; single-FiPPI
//! reloads sleep the DSP, a whole-board reload leaves it down for the
//! DSP download that follows.

use dxp_chip::{xmap, ChipVariant, ControlTask};

use super::{require_image, DeviceDriver, DownloadFn, DriverCore, BOOT_BUSY};
use crate::device::{DxpModule, FirmwareSet};
use crate::error::Result;
use crate::symbols::WriteOutcome;
use crate::tasks::{self, TaskDescriptor};
use crate::transport::Transport;

const SYSTEM: u32 = 0x1;
const FIPPI_A: u32 = 0x2;
const FIPPI_B: u32 = 0x4;

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
        task: ControlTask::SleepDsp,
        parse_info: None,
        start: tasks::start_sleep,
        read_data: None,
    },
    TaskDescriptor {
        task: ControlTask::MemoryTest1,
        parse_info: None,
        start: tasks::start_special_wait_busy,
        read_data: None,
    },
    TaskDescriptor {
        task: ControlTask::MemoryTest2,
        parse_info: None,
        start: tasks::start_special_wait_busy,
        read_data: None,
    },
];

const FPGA_DOWNLOADERS: &[(&str, DownloadFn)] = &[
    ("all", download_all),
    ("system_fpga", download_system),
    ("a", download_fippi_a),
    ("b", download_fippi_b),
];

fn download_all(module: &mut DxpModule) -> Result<()> {
    let system = require_image(module.firmware().system_fpga.as_ref(), "system FPGA")?;
    let fippi_a = require_image(module.firmware().fippi_a.as_ref(), "FiPPI A")?;
    let fippi_b = require_image(module.firmware().fippi_b.as_ref(), "FiPPI B")?;
    module.configure_fpga(SYSTEM, &system)?;
    module.configure_fpga(FIPPI_A, &fippi_a)?;
    module.configure_fpga(FIPPI_B, &fippi_b)?;
    module.full_reboot_pending = true;
    module.runs.invalidate_dsp();
    Ok(())
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

fn download_fippi_a(module: &mut DxpModule) -> Result<()> {
    let image = require_image(module.firmware().fippi_a.as_ref(), "FiPPI A")?;
    module.sleep_dsp()?;
    module.configure_fpga(FIPPI_A, &image)?;
    module.wake_dsp()
}

fn download_fippi_b(module: &mut DxpModule) -> Result<()> {
    let image = require_image(module.firmware().fippi_b.as_ref(), "FiPPI B")?;
    module.sleep_dsp()?;
    module.configure_fpga(FIPPI_B, &image)?;
    module.wake_dsp()
}

/// Driver for xMAP modules.
#[derive(Debug)]
pub struct XmapDriver {
    core: DriverCore,
}

impl XmapDriver {
    /// Create a driver over `transport`.
    #[must_use]
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            core: DriverCore::new(transport, &xmap::PROFILE, CONTROL_TASKS, FPGA_DOWNLOADERS),
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

impl DeviceDriver for XmapDriver {
    fn variant(&self) -> ChipVariant {
        ChipVariant::Xmap
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
