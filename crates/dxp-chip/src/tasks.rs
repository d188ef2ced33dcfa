//! Control task identifiers.
//!
//! A control task is any non-normal acquisition mode: calibration runs,
//! ADC trace capture, bias scans, apply, DSP sleep. The codes here are the
//! product-independent identifiers callers use; each variant maps the
//! subset it supports to its own device codes (`SPECIALRUN` values or
//! `WHICHTEST` values) in its profile.

/// A control task type.
///
/// The numeric codes are stable across variants and releases; they are
/// what the surrounding acquisition layer passes over its own API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ControlTask {
    /// Capture a raw ADC trace into DSP data memory.
    AdcTrace = 0,
    /// Commit pending acquisition parameters into DSP derived state.
    Apply = 1,
    /// Wake the DSP from a sleep special run.
    WakeDsp = 2,
    /// Recalibrate per-channel ADC offsets.
    AdjustOffsets = 3,
    /// Sweep the detector bias and record the response.
    BiasScan = 4,
    /// Drive the bias DAC to a fixed setting.
    BiasSetDac = 5,
    /// Suspend normal pulse processing (required around FiPPI reloads).
    SleepDsp = 6,
    /// Measure the RC feedback decay time.
    CalibrateRc = 7,
    /// Set the ADC offset DAC.
    SetAdcOffset = 8,
    /// Set the slow ASC DAC.
    SetAscDac = 9,
    /// Calibrate the tracking DAC.
    TrackDac = 10,
    /// Measure the energy slope calibration.
    SlopeCalibrate = 11,
    /// Freeze and expose the baseline history buffer.
    BaselineHistory = 12,
    /// Read a page of external memory through the DSP.
    ReadMemory = 13,
    /// Write a page of external memory through the DSP.
    WriteMemory = 14,
    /// Write test pattern 1 to external memory.
    MemoryTest1 = 15,
    /// Write test pattern 2 to external memory.
    MemoryTest2 = 16,
}

impl ControlTask {
    /// The wire code for this task.
    #[must_use]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Parses a wire code.
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0 => Self::AdcTrace,
            1 => Self::Apply,
            2 => Self::WakeDsp,
            3 => Self::AdjustOffsets,
            4 => Self::BiasScan,
            5 => Self::BiasSetDac,
            6 => Self::SleepDsp,
            7 => Self::CalibrateRc,
            8 => Self::SetAdcOffset,
            9 => Self::SetAscDac,
            10 => Self::TrackDac,
            11 => Self::SlopeCalibrate,
            12 => Self::BaselineHistory,
            13 => Self::ReadMemory,
            14 => Self::WriteMemory,
            15 => Self::MemoryTest1,
            16 => Self::MemoryTest2,
            _ => return None,
        })
    }

    /// Lowercase name used in logs and the CLI.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AdcTrace => "adc_trace",
            Self::Apply => "apply",
            Self::WakeDsp => "wake_dsp",
            Self::AdjustOffsets => "adjust_offsets",
            Self::BiasScan => "bias_scan",
            Self::BiasSetDac => "bias_set_dac",
            Self::SleepDsp => "sleep_dsp",
            Self::CalibrateRc => "calibrate_rc",
            Self::SetAdcOffset => "set_adc_offset",
            Self::SetAscDac => "set_asc_dac",
            Self::TrackDac => "track_dac",
            Self::SlopeCalibrate => "slope_calibrate",
            Self::BaselineHistory => "baseline_history",
            Self::ReadMemory => "read_memory",
            Self::WriteMemory => "write_memory",
            Self::MemoryTest1 => "memory_test_1",
            Self::MemoryTest2 => "memory_test_2",
        }
    }
}

impl core::fmt::Display for ControlTask {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in 0..=16 {
            let task = ControlTask::from_code(code).unwrap();
            assert_eq!(task.code(), code);
        }
        assert_eq!(ControlTask::from_code(17), None);
        assert_eq!(ControlTask::from_code(u16::MAX), None);
    }

    #[test]
    fn names_are_stable() {
        assert_eq!(ControlTask::AdcTrace.name(), "adc_trace");
        assert_eq!(ControlTask::Apply.to_string(), "apply");
    }
}
