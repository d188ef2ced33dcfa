//! Host-side run and firmware bookkeeping.
//!
//! The hardware only reports coarse status bits, so the engine tracks
//! what it has started itself: which channels believe a run is active,
//! which control task owns a channel, and whether the DSP image each
//! channel runs is still the one the host loaded.

use dxp_chip::ControlTask;

/// Host knowledge of a channel's DSP code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DspState {
    /// No program has been downloaded since power-up.
    #[default]
    NotLoaded,
    /// A program is downloaded and believed intact.
    Loaded,
    /// A program was downloaded but an FPGA reload may have clobbered
    /// it. Parameter access is refused until the next download.
    NeedsReload,
}

/// What the host believes one channel is doing.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoardRunState {
    /// A run or control task was started and not yet ended.
    pub run_active: bool,
    /// Control task owning the channel, if any.
    pub active_control_task: Option<ControlTask>,
    /// DSP code status.
    pub dsp_state: DspState,
}

/// Bookkeeping for every channel of one module.
#[derive(Debug)]
pub struct RunStateTracker {
    channels: Vec<BoardRunState>,
    next_run_id: u32,
}

impl RunStateTracker {
    /// Create a tracker with every channel idle and unloaded.
    #[must_use]
    pub fn new(channels: usize) -> Self {
        Self {
            channels: vec![BoardRunState::default(); channels],
            next_run_id: 0,
        }
    }

    /// State of one channel.
    #[must_use]
    pub fn channel(&self, channel: usize) -> &BoardRunState {
        &self.channels[channel]
    }

    /// Mutable state of one channel.
    pub fn channel_mut(&mut self, channel: usize) -> &mut BoardRunState {
        &mut self.channels[channel]
    }

    /// Number of channels tracked.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// First channel with an active run or task, if any.
    #[must_use]
    pub fn any_active(&self) -> Option<usize> {
        self.channels.iter().position(|c| c.run_active)
    }

    /// Hand out the next module-scoped run identifier.
    pub fn next_run_id(&mut self) -> u32 {
        let id = self.next_run_id;
        self.next_run_id = self.next_run_id.wrapping_add(1);
        id
    }

    /// Flag every channel as running.
    pub fn mark_all_running(&mut self) {
        for channel in &mut self.channels {
            channel.run_active = true;
        }
    }

    /// Clear run and task ownership on every channel.
    pub fn clear_all_running(&mut self) {
        for channel in &mut self.channels {
            channel.run_active = false;
            channel.active_control_task = None;
        }
    }

    /// Flag every channel's DSP code as freshly downloaded.
    pub fn mark_all_loaded(&mut self) {
        for channel in &mut self.channels {
            channel.dsp_state = DspState::Loaded;
        }
    }

    /// Downgrade loaded DSPs after an FPGA reload that may have wiped
    /// program memory. Channels that never loaded stay `NotLoaded`.
    pub fn invalidate_dsp(&mut self) {
        for channel in &mut self.channels {
            if channel.dsp_state == DspState::Loaded {
                channel.dsp_state = DspState::NeedsReload;
            }
        }
    }
}
