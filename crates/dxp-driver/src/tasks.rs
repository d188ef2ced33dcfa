//! Control-task engine.
//!
//! Control tasks are the DSP's special runs: diagnostics and calibration
//! procedures started like a run but steered through the special-run
//! selector parameters. The engine drives a per-channel task lifecycle
//! over a product's task catalog; the catalog rows say how each task
//! parses its options, starts, and hands back data.
//!
//! A channel's bookkeeping is only touched after the start path
//! succeeds, so a failed begin leaves the channel exactly as it was.

use dxp_chip::profile::{SpecialRunStyle, RUNTYPE_NORMAL, RUNTYPE_SPECIAL};
use dxp_chip::ControlTask;
use tracing::{debug, info, warn};

use crate::device::{bit, poll_count, DxpModule};
use crate::error::{DxpError, Result};
use crate::registers::lo_word;
use crate::runstate::DspState;

/// What a task's start path left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// A special run is in progress; the channel is owned by the task
    /// until [`ControlTaskEngine::end`].
    Running,
    /// The task did all its work inside the start path.
    Completed,
}

/// Starts the task's special run.
pub type StartFn = fn(&mut DxpModule, usize, ControlTask) -> Result<TaskOutcome>;
/// Decodes caller options into DSP parameters before the start.
pub type ParseInfoFn = fn(&mut DxpModule, usize, ControlTask, &[u32]) -> Result<()>;
/// Pulls the task's result data out of the module.
pub type ReadDataFn = fn(&mut DxpModule, usize) -> Result<Vec<u16>>;

/// One row of a product's task catalog.
#[derive(Debug, Clone, Copy)]
pub struct TaskDescriptor {
    /// Task this row describes.
    pub task: ControlTask,
    /// Option decoder, for tasks that take any.
    pub parse_info: Option<ParseInfoFn>,
    /// Start path.
    pub start: StartFn,
    /// Result reader, for tasks that produce data.
    pub read_data: Option<ReadDataFn>,
}

/// Task lifecycle driver over one product's catalog.
#[derive(Debug, Clone, Copy)]
pub struct ControlTaskEngine {
    descriptors: &'static [TaskDescriptor],
}

impl ControlTaskEngine {
    /// Create an engine over one product's catalog.
    #[must_use]
    pub const fn new(descriptors: &'static [TaskDescriptor]) -> Self {
        Self { descriptors }
    }

    fn descriptor(&self, task: ControlTask) -> Result<&TaskDescriptor> {
        self.descriptors
            .iter()
            .find(|d| d.task == task)
            .ok_or(DxpError::UnknownControlTask { task })
    }

    /// Start `task` on `channel`. `info` carries task options; what they
    /// mean is the task's business.
    ///
    /// # Errors
    ///
    /// Returns [`DxpError::RunActive`] when the channel is busy,
    /// [`DxpError::UnknownControlTask`] for a task the product lacks,
    /// [`DxpError::DspNotLoaded`] without DSP code, plus start errors.
    pub fn begin(
        &self,
        module: &mut DxpModule,
        channel: usize,
        task: ControlTask,
        info: &[u32],
    ) -> Result<()> {
        module.ensure_channel(channel)?;
        let state = module.runs.channel(channel);
        if state.run_active || state.active_control_task.is_some() {
            return Err(DxpError::RunActive { channel });
        }
        module.ensure_dsp_loaded(channel)?;
        let descriptor = self.descriptor(task)?;

        if let Some(parse) = descriptor.parse_info {
            parse(module, channel, task, info)?;
        }
        match (descriptor.start)(module, channel, task)? {
            TaskOutcome::Running => {
                let state = module.runs.channel_mut(channel);
                state.run_active = true;
                state.active_control_task = Some(task);
                info!(channel, task = %task, "control task started");
            }
            TaskOutcome::Completed => {
                info!(channel, task = %task, "control task completed");
            }
        }
        Ok(())
    }

    /// Read `task`'s result data from `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`DxpError::NoTaskData`] for tasks that produce none,
    /// [`DxpError::UnknownControlTask`] for a task the product lacks,
    /// plus bus errors.
    pub fn data(
        &self,
        module: &mut DxpModule,
        channel: usize,
        task: ControlTask,
    ) -> Result<Vec<u16>> {
        module.ensure_channel(channel)?;
        let descriptor = self.descriptor(task)?;
        let Some(read) = descriptor.read_data else {
            return Err(DxpError::NoTaskData { task });
        };
        read(module, channel)
    }

    /// End `task` on `channel` and put the DSP back in normal run mode.
    ///
    /// # Errors
    ///
    /// Returns [`DxpError::UnknownControlTask`] for a task the product
    /// lacks, plus stop and bus errors.
    pub fn end(&self, module: &mut DxpModule, channel: usize, task: ControlTask) -> Result<()> {
        module.ensure_channel(channel)?;
        self.descriptor(task)?;

        if task == ControlTask::SleepDsp {
            // a sleeping DSP only notices the stop from inside a fresh
            // run, so start one and let it drain first
            module.start_run_raw(false, true)?;
            let timeout = module.profile().timing.dsp_busy_timeout;
            for ch in 0..module.profile().channels {
                module.wait_for_busy(ch, 0, timeout)?;
            }
        }

        let whichtest = matches!(module.profile().special_run, SpecialRunStyle::Whichtest { .. });
        if whichtest && task == ControlTask::BaselineHistory {
            // the history rides on the normal run; release the task
            // without stopping acquisition
            let state = module.runs.channel_mut(channel);
            state.run_active = false;
            state.active_control_task = None;
            module.clear_runtasks_bit(channel)?;
            info!(channel, task = %task, "control task ended, run left going");
            return Ok(());
        }

        module.stop_run_raw()?;
        {
            let state = module.runs.channel_mut(channel);
            state.run_active = false;
            state.active_control_task = None;
        }
        if module.runs.channel(channel).dsp_state == DspState::Loaded {
            let timeout = module.profile().timing.run_stop_timeout;
            module.wait_for_busy(channel, 0, timeout)?;
        }
        module.restore_normal_run_for(channel)?;
        info!(channel, task = %task, "control task ended");
        Ok(())
    }
}

impl DxpModule {
    /// Point the DSP's special-run selectors at `task` on `channel`.
    pub(crate) fn arm_special_run(&mut self, channel: usize, task: ControlTask) -> Result<()> {
        let Some(code) = self.profile().special_run_code(task) else {
            return Err(DxpError::UnknownControlTask { task });
        };
        match self.profile().special_run {
            SpecialRunStyle::Runtype { .. } => {
                self.write_symbol_raw("RUNTYPE", channel, RUNTYPE_SPECIAL)?;
                self.write_symbol_raw("SPECIALRUN", channel, code)?;
            }
            SpecialRunStyle::Whichtest { runtasks_bit, .. } => {
                self.write_symbol_raw("WHICHTEST", channel, code)?;
                let tasks = self.read_symbol_word("RUNTASKS", channel)?;
                self.write_symbol_raw("RUNTASKS", channel, tasks | runtasks_bit)?;
            }
        }
        Ok(())
    }

    pub(crate) fn clear_runtasks_bit(&mut self, channel: usize) -> Result<()> {
        if let SpecialRunStyle::Whichtest { runtasks_bit, .. } = self.profile().special_run {
            let tasks = self.read_symbol_word("RUNTASKS", channel)?;
            self.write_symbol_raw("RUNTASKS", channel, tasks & !runtasks_bit)?;
        }
        Ok(())
    }

    /// Put one channel back in normal-run mode.
    pub(crate) fn restore_normal_run_for(&mut self, channel: usize) -> Result<()> {
        match self.profile().special_run {
            SpecialRunStyle::Runtype { .. } => {
                self.write_symbol_raw("RUNTYPE", channel, RUNTYPE_NORMAL)
            }
            SpecialRunStyle::Whichtest { .. } => self.clear_runtasks_bit(channel),
        }
    }

    /// Put every channel back in normal-run mode.
    pub(crate) fn restore_normal_run_mode(&mut self) -> Result<()> {
        for channel in 0..self.profile().channels {
            self.restore_normal_run_for(channel)?;
        }
        Ok(())
    }

    /// Run the apply task: hand the staged acquisition parameters to
    /// the DSP and confirm it accepted them.
    ///
    /// Both status words are seeded with a sentinel so a DSP that never
    /// ran the task cannot look successful.
    pub(crate) fn apply(&mut self, channel: usize) -> Result<()> {
        const SENTINEL: u16 = 0xCDCD;
        let timing = self.profile().timing;

        self.arm_special_run(channel, ControlTask::Apply)?;
        self.write_symbol_raw("APPLYSTAT", channel, SENTINEL)?;
        self.write_symbol_raw("ERRINFO", channel, SENTINEL)?;
        self.start_run_raw(false, true)?;

        let run_bit = bit(self.profile().csr_bits.run_enable);
        let mut ended = false;
        for _ in 0..poll_count(timing.apply_timeout, timing.apply_poll) {
            self.sleep(timing.apply_poll);
            if self.read_csr()? & run_bit == 0 {
                ended = true;
                break;
            }
        }
        if !ended {
            warn!(channel, "apply run never ended on its own, stopping it");
            self.stop_run_raw()?;
            self.restore_normal_run_for(channel)?;
            return Err(DxpError::timeout("apply run", timing.apply_timeout));
        }

        let errinfo = self.read_symbol_word("ERRINFO", channel)?;
        debug!(channel, errinfo = format_args!("{errinfo:#x}"), "apply finished");
        let status = self.read_symbol_word("APPLYSTAT", channel)?;
        self.restore_normal_run_for(channel)?;
        if status != 0 {
            return Err(DxpError::ApplyFailed { status, errinfo });
        }
        Ok(())
    }
}

/// Arm and start a special run, then wait for the DSP to finish it.
/// Used by the Mercury-class products, whose calibration tasks complete
/// on their own; a task that never finishes is stopped before erroring.
pub(crate) fn start_special_wait_busy(
    module: &mut DxpModule,
    channel: usize,
    task: ControlTask,
) -> Result<TaskOutcome> {
    module.arm_special_run(channel, task)?;
    module.start_run_raw(false, true)?;
    let timeout = module.profile().timing.run_stop_timeout;
    if let Err(err) = module.wait_for_busy(channel, 0, timeout) {
        warn!(channel, task = %task, "special run stuck, cleaning up");
        if let Err(cleanup) = module
            .stop_run_raw()
            .and_then(|()| module.restore_normal_run_for(channel))
        {
            debug!(%cleanup, "cleanup after stuck special run failed");
        }
        return Err(err);
    }
    Ok(TaskOutcome::Running)
}

/// Arm and start a special run without waiting. Saturn's tasks signal
/// completion through `BUSY` and are polled by the caller.
pub(crate) fn start_special(
    module: &mut DxpModule,
    channel: usize,
    task: ControlTask,
) -> Result<TaskOutcome> {
    module.arm_special_run(channel, task)?;
    module.start_run_raw(false, true)?;
    Ok(TaskOutcome::Running)
}

/// ADC trace start for multichannel products: route the shared trace
/// buffer at this channel first.
pub(crate) fn start_trace(
    module: &mut DxpModule,
    channel: usize,
    task: ControlTask,
) -> Result<TaskOutcome> {
    if module.profile().channels > 1 {
        let chan = u16::try_from(channel).unwrap_or(0);
        module.write_symbol_raw("TRACECHAN", channel, chan)?;
    }
    start_special_wait_busy(module, channel, task)
}

pub(crate) fn start_sleep(
    module: &mut DxpModule,
    _channel: usize,
    _task: ControlTask,
) -> Result<TaskOutcome> {
    module.sleep_dsp()?;
    Ok(TaskOutcome::Running)
}

pub(crate) fn start_apply(
    module: &mut DxpModule,
    channel: usize,
    _task: ControlTask,
) -> Result<TaskOutcome> {
    module.apply(channel)?;
    Ok(TaskOutcome::Completed)
}

pub(crate) fn start_wake(
    module: &mut DxpModule,
    _channel: usize,
    _task: ControlTask,
) -> Result<TaskOutcome> {
    module.wake_dsp()?;
    Ok(TaskOutcome::Completed)
}

/// Trace options: `info[1]` is the sampling interval parameter.
pub(crate) fn parse_trace_wait(
    module: &mut DxpModule,
    channel: usize,
    task: ControlTask,
    info: &[u32],
) -> Result<()> {
    if info.len() < 2 {
        return Err(DxpError::InvalidLength { task, expected: 2, actual: info.len() });
    }
    module.write_symbol_raw("TRACEWAIT", channel, lo_word(info[1]))
}

/// External-memory window options: `info[1..4]` are page, address and
/// length.
pub(crate) fn parse_memory_window(
    module: &mut DxpModule,
    channel: usize,
    task: ControlTask,
    info: &[u32],
) -> Result<()> {
    if info.len() < 4 {
        return Err(DxpError::InvalidLength { task, expected: 4, actual: info.len() });
    }
    module.write_symbol_raw("EXTPAGE", channel, lo_word(info[1]))?;
    module.write_symbol_raw("EXTADDRESS", channel, lo_word(info[2]))?;
    module.write_symbol_raw("EXTLENGTH", channel, lo_word(info[3]))
}

fn read_data_words(module: &mut DxpModule, offset: u32, len: usize) -> Result<Vec<u16>> {
    let addr = module.data_address(offset);
    let values = module.io.read_block(addr, len)?;
    Ok(values.into_iter().map(lo_word).collect())
}

/// Trace data: `TRACELEN` words at `TRACESTART`.
pub(crate) fn read_adc_trace(module: &mut DxpModule, channel: usize) -> Result<Vec<u16>> {
    let start = module.read_symbol_word("TRACESTART", channel)?;
    let len = module.read_symbol_word("TRACELEN", channel)?;
    read_data_words(module, u32::from(start), usize::from(len))
}

/// Saturn history buffer: `HSTLEN` words at `HSTSTART`.
pub(crate) fn read_history(module: &mut DxpModule, channel: usize) -> Result<Vec<u16>> {
    let start = module.read_symbol_word("HSTSTART", channel)?;
    let len = module.read_symbol_word("HSTLEN", channel)?;
    read_data_words(module, u32::from(start), usize::from(len))
}

/// External-memory page reads land in the history buffer but only
/// `EXTLENGTH` words of it are the page.
pub(crate) fn read_memory_page(module: &mut DxpModule, channel: usize) -> Result<Vec<u16>> {
    let mut data = read_history(module, channel)?;
    let wanted = usize::from(module.read_symbol_word("EXTLENGTH", channel)?);
    data.truncate(wanted);
    Ok(data)
}

/// The baseline history is a ring; rotate so the oldest sample, at the
/// DSP's write cursor, comes out first.
pub(crate) fn read_baseline_history(module: &mut DxpModule, channel: usize) -> Result<Vec<u16>> {
    let start = module.read_symbol_word("HSTSTART", channel)?;
    let len = module.read_symbol_word("HSTLEN", channel)?;
    let mut data = read_data_words(module, u32::from(start), usize::from(len))?;
    let cursor = module.read_symbol_word("CIRCULAR", channel)?;
    let offset = usize::from(cursor.saturating_sub(start));
    if !data.is_empty() {
        let rot = offset % data.len();
        data.rotate_left(rot);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DxpModule;
    use crate::sim::SimTransport;
    use dxp_chip::mercury;

    const EMPTY: ControlTaskEngine = ControlTaskEngine::new(&[]);

    #[test]
    fn unknown_tasks_rejected_at_every_entry_point() {
        let sim = SimTransport::new(&mercury::PROFILE);
        let mut module = DxpModule::new(Box::new(sim), &mercury::PROFILE);
        module.runs.mark_all_loaded();
        for result in [
            EMPTY.begin(&mut module, 0, ControlTask::AdcTrace, &[]),
            EMPTY.end(&mut module, 0, ControlTask::AdcTrace),
            EMPTY.data(&mut module, 0, ControlTask::AdcTrace).map(|_| ()),
        ] {
            assert!(matches!(result, Err(DxpError::UnknownControlTask { .. })));
        }
    }

    #[test]
    fn bad_channel_rejected_before_catalog_lookup() {
        let sim = SimTransport::new(&mercury::PROFILE);
        let mut module = DxpModule::new(Box::new(sim), &mercury::PROFILE);
        assert!(matches!(
            EMPTY.begin(&mut module, 9, ControlTask::AdcTrace, &[]),
            Err(DxpError::InvalidChannel { channel: 9, .. })
        ));
    }
}
