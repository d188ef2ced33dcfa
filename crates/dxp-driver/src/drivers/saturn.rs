//! Saturn driver.
//!
//! Single-channel EPP/USB product, the oldest of the family. One FiPPI,
//! a 16-bit bus, and a `WHICHTEST`-selected special-run scheme whose
//! tasks are started and then polled to completion by the caller. Most
//! task data comes back through the DSP's history buffer.

use dxp_chip::{saturn, ChipVariant, ControlTask};

use super::{require_image, DeviceDriver, DownloadFn, DriverCore};
use crate::device::{DxpModule, FirmwareSet};
use crate::error::Result;
use crate::symbols::WriteOutcome;
use crate::tasks::{self, TaskDescriptor};
use crate::transport::Transport;

const FIPPI: u32 = 0x1;

const CONTROL_TASKS: &[TaskDescriptor] = &[
    TaskDescriptor {
        task: ControlTask::AdcTrace,
        parse_info: Some(tasks::parse_trace_wait),
        start: tasks::start_special,
        read_data: Some(tasks::read_history),
    },
    TaskDescriptor {
        task: ControlTask::SetAscDac,
        parse_info: None,
        start: tasks::start_special,
        read_data: None,
    },
    TaskDescriptor {
        task: ControlTask::TrackDac,
        parse_info: None,
        start: tasks::start_special,
        read_data: Some(tasks::read_history),
    },
    TaskDescriptor {
        task: ControlTask::SlopeCalibrate,
        parse_info: None,
        start: tasks::start_special,
        read_data: None,
    },
    TaskDescriptor {
        task: ControlTask::SleepDsp,
        parse_info: None,
        start: tasks::start_sleep,
        read_data: None,
    },
    TaskDescriptor {
        task: ControlTask::BaselineHistory,
        parse_info: None,
        start: tasks::start_special,
        read_data: Some(tasks::read_baseline_history),
    },
    TaskDescriptor {
        task: ControlTask::ReadMemory,
        parse_info: Some(tasks::parse_memory_window),
        start: tasks::start_special,
        read_data: Some(tasks::read_memory_page),
    },
    TaskDescriptor {
        task: ControlTask::WriteMemory,
        parse_info: Some(tasks::parse_memory_window),
        start: tasks::start_special,
        read_data: Some(tasks::read_history),
    },
];

const FPGA_DOWNLOADERS: &[(&str, DownloadFn)] =
    &[("all", download_fippi), ("fippi", download_fippi)];

/// The FiPPI is Saturn's only configurable FPGA, so `all` and `fippi`
/// are the same sequence. A running DSP sleeps across the reload and
/// its program survives, so nothing is invalidated.
fn download_fippi(module: &mut DxpModule) -> Result<()> {
    let image = require_image(module.firmware().fippi_a.as_ref(), "FiPPI")?;
    module.sleep_dsp()?;
    module.configure_fpga(FIPPI, &image)?;
    module.wake_dsp()
}

/// Driver for Saturn modules.
#[derive(Debug)]
pub struct SaturnDriver {
    core: DriverCore,
}

impl SaturnDriver {
    /// Create a driver over `transport`.
    #[must_use]
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            core: DriverCore::new(transport, &saturn::PROFILE, CONTROL_TASKS, FPGA_DOWNLOADERS),
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

impl DeviceDriver for SaturnDriver {
    fn variant(&self) -> ChipVariant {
        ChipVariant::Saturn
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
