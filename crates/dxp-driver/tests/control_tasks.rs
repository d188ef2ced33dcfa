//! Control-task lifecycles through the public driver surface.
//!
//! Covers the two special-run schemes: Mercury-class selectors
//! (`RUNTYPE`/`SPECIALRUN`, tasks wait for `BUSY` inside the start) and
//! Saturn's `WHICHTEST`/`RUNTASKS` scheme where the caller polls the
//! task to completion. DSP-side behavior is scripted on the simulator
//! where a task needs the firmware to act on its own.

use std::sync::Arc;
use std::time::Duration;

use dxp_chip::{mercury, saturn, stj, xmap, ChipProfile, ChipVariant, ControlTask};
use dxp_driver::{
    driver_for, DeviceDriver, DxpError, FirmwareSet, RunScript, SimTransport, WriteOutcome,
};
use dxp_firmware::DspProgram;

/// Global parameter addresses shared by the Mercury and xMAP fixtures.
const RUNTYPE: u32 = 2;
const SPECIALRUN: u32 = 3;
const APPLYSTAT: u32 = 4;
const ERRINFO: u32 = 5;
const TRACEWAIT: u32 = 7;
const TRACECHAN: u32 = 8;

/// Saturn fixture addresses (symbol index in the listing).
const WHICHTEST: u32 = 0;
const RUNTASKS: u32 = 1;
const EXTPAGE: u32 = 7;
const EXTADDRESS: u32 = 8;
const EXTLENGTH: u32 = 9;

const MERCURY_DSX: &str = "\
* Mercury bench DSP build with trace buffers
@CONSTANTS@
14
1
@OFFSETS@
0
400
500
600
700
@GLOBAL@
BUSY : 0
RUNERROR : 1
RUNTYPE : 2
SPECIALRUN : 3
APPLYSTAT : 4
ERRINFO : 5
INITIALIZE : 6
TRACEWAIT : 7
TRACECHAN : 8
TRACESTART : 9
TRACELEN : 10
REALTIME0 : 11
REALTIME1 : 12
REALTIME2 : 13
@CHANNEL@
BINFACT : 2
@PROGRAM MEMORY@
0001000200030004
";

const XMAP_DSX: &str = "\
* xMAP bench DSP build
@CONSTANTS@
4
0
@OFFSETS@
0
200
280
300
380
@GLOBAL@
BUSY : 0
RUNERROR : 1
RUNTYPE : 2
SPECIALRUN : 3
@PROGRAM MEMORY@
00050006
";

const STJ_DSX: &str = "\
* STJ bench DSP build
@CONSTANTS@
2
1
@OFFSETS@
0
400
480
500
580
600
680
700
780
@GLOBAL@
BUSY : 0
RUNERROR : 1
@CHANNEL@
SLOWLEN : 2
@PROGRAM MEMORY@
00070008
";

const SATURN_LISTING: &str = "\
* Saturn bench DSP build
12
WHICHTEST
RUNTASKS
BUSY -
RUNERROR -
HSTSTART
HSTLEN
CIRCULAR
EXTPAGE
EXTADDRESS
EXTLENGTH
TRACEWAIT
SLOWLEN * 2 28
123456ABCDEF
";

fn boot(
    variant: ChipVariant,
    profile: &'static ChipProfile,
    dsp: DspProgram,
) -> (Box<dyn DeviceDriver>, SimTransport) {
    let sim = SimTransport::new(profile);
    let mut driver = driver_for(variant, Box::new(sim.clone()));
    driver.set_firmware(FirmwareSet { dsp: Some(Arc::new(dsp)), ..FirmwareSet::default() });
    driver.download_dsp().expect("DSP download");
    (driver, sim)
}

fn mercury_driver() -> (Box<dyn DeviceDriver>, SimTransport) {
    let dsp = DspProgram::from_dsx_str(MERCURY_DSX).unwrap();
    boot(ChipVariant::Mercury, &mercury::PROFILE, dsp)
}

fn saturn_driver() -> (Box<dyn DeviceDriver>, SimTransport) {
    let dsp = DspProgram::from_listing_str(SATURN_LISTING).unwrap();
    boot(ChipVariant::Saturn, &saturn::PROFILE, dsp)
}

fn xmap_driver() -> (Box<dyn DeviceDriver>, SimTransport) {
    let dsp = DspProgram::from_dsx_str(XMAP_DSX).unwrap();
    boot(ChipVariant::Xmap, &xmap::PROFILE, dsp)
}

/// Script for a DSP-side apply run ending with the given status words.
fn apply_script(status: u32, errinfo: u32) -> RunScript {
    let dm = mercury::DATA_MEMORY;
    RunScript {
        delay: Duration::from_millis(150),
        clear_run_enable: true,
        pokes: vec![(dm + APPLYSTAT, status), (dm + ERRINFO, errinfo)],
    }
}

#[test]
fn mercury_trace_lifecycle_round_trips() {
    let (mut driver, sim) = mercury_driver();
    let dm = mercury::DATA_MEMORY;
    driver.write_symbol(0, "TRACESTART", 0x200).unwrap();
    driver.write_symbol(0, "TRACELEN", 4).unwrap();

    driver.begin_control_task(0, ControlTask::AdcTrace, &[0, 33]).unwrap();
    assert_eq!(sim.peek(dm + TRACEWAIT), 33);
    assert_eq!(sim.peek(dm + TRACECHAN), 0);
    assert_eq!(sim.peek(dm + RUNTYPE), 1);
    assert_eq!(sim.peek(dm + SPECIALRUN), 1);
    assert_ne!(sim.csr() & 1, 0, "special run going");

    // the capture the FiPPI would have streamed into the trace buffer
    for (i, value) in [5u32, 6, 7, 8].into_iter().enumerate() {
        sim.poke(dm + 0x200 + i as u32, value);
    }
    let data = driver.control_task_data(0, ControlTask::AdcTrace).unwrap();
    assert_eq!(data, vec![5, 6, 7, 8]);

    driver.end_control_task(0, ControlTask::AdcTrace).unwrap();
    assert_eq!(sim.peek(dm + RUNTYPE), 0, "normal run mode restored");
    assert_eq!(sim.csr() & 1, 0);

    // the channel is free for a normal run again
    driver.begin_run(true, false).unwrap();
    driver.end_run().unwrap();
}

#[test]
fn trace_routes_the_shared_buffer_at_the_channel() {
    let (mut driver, sim) = mercury_driver();
    driver.begin_control_task(2, ControlTask::AdcTrace, &[0, 5]).unwrap();
    assert_eq!(sim.peek(mercury::DATA_MEMORY + TRACECHAN), 2);
    driver.end_control_task(2, ControlTask::AdcTrace).unwrap();
}

#[test]
fn busy_channel_rejects_more_work() {
    let (mut driver, _sim) = mercury_driver();
    driver.begin_control_task(0, ControlTask::AdcTrace, &[0, 5]).unwrap();

    assert!(matches!(
        driver.begin_control_task(0, ControlTask::AdcTrace, &[0, 5]),
        Err(DxpError::RunActive { channel: 0 })
    ));
    assert!(matches!(driver.begin_run(true, false), Err(DxpError::RunActive { channel: 0 })));

    driver.end_control_task(0, ControlTask::AdcTrace).unwrap();
    driver.begin_run(true, false).unwrap();
}

/// Apply completes inside the begin call, so it owns no channel
/// afterwards and has no data to hand back.
#[test]
fn apply_completes_inline() {
    let (mut driver, sim) = mercury_driver();
    sim.on_run_start(apply_script(0, 0));

    driver.begin_control_task(0, ControlTask::Apply, &[]).unwrap();
    assert!(!driver.is_run_active().unwrap());
    assert!(matches!(
        driver.control_task_data(0, ControlTask::Apply),
        Err(DxpError::NoTaskData { task: ControlTask::Apply })
    ));

    driver.begin_run(true, false).unwrap();
    driver.end_run().unwrap();
}

#[test]
fn apply_failure_reports_the_dsp_status() {
    let (mut driver, sim) = mercury_driver();
    sim.on_run_start(apply_script(5, 0x30));

    let err = driver.begin_control_task(0, ControlTask::Apply, &[]).unwrap_err();
    assert!(matches!(err, DxpError::ApplyFailed { status: 5, errinfo: 0x30 }));
    assert_eq!(sim.peek(mercury::DATA_MEMORY + RUNTYPE), 0, "selector restored");

    driver.begin_run(true, false).unwrap();
}

/// Without a DSP ending the run the apply times out, and the engine
/// stops the run itself rather than leaving the module half-armed.
#[test]
fn apply_timeout_stops_the_stuck_run() {
    let (mut driver, sim) = mercury_driver();

    let err = driver.begin_control_task(0, ControlTask::Apply, &[]).unwrap_err();
    assert!(matches!(err, DxpError::Timeout { what: "apply run", .. }));
    assert_eq!(sim.csr() & 1, 0);
    assert_eq!(sim.peek(mercury::DATA_MEMORY + RUNTYPE), 0);
}

#[test]
fn per_channel_symbols_follow_channel_bases() {
    let (mut driver, sim) = mercury_driver();
    driver.write_symbol(1, "BINFACT", 7).unwrap();

    // channel 1 base 0x500, symbol offset 2
    assert_eq!(sim.peek(mercury::DATA_MEMORY + 0x502), 7);
    assert_eq!(driver.read_symbol(1, "BINFACT").unwrap(), 7.0);
    assert_eq!(driver.read_symbol(0, "BINFACT").unwrap(), 0.0);
}

#[test]
fn wide_symbols_read_as_one_value() {
    let (mut driver, sim) = mercury_driver();
    let dm = mercury::DATA_MEMORY;
    sim.poke(dm + 11, 0x1111); // REALTIME0
    sim.poke(dm + 12, 0x2222); // REALTIME1
    sim.poke(dm + 13, 3); // REALTIME2

    let value = driver.read_symbol(0, "REALTIME").unwrap();
    assert_eq!(value, 3.0 * 4_294_967_296.0 + 8738.0 * 65536.0 + 4369.0);
}

#[test]
fn channel_bounds_checked_before_anything_runs() {
    let (mut driver, _sim) = mercury_driver();
    assert!(matches!(
        driver.begin_control_task(7, ControlTask::AdcTrace, &[0, 5]),
        Err(DxpError::InvalidChannel { channel: 7, channels: 4 })
    ));
}

#[test]
fn short_info_rejected_without_starting() {
    let (mut driver, sim) = mercury_driver();
    let err = driver.begin_control_task(0, ControlTask::AdcTrace, &[]).unwrap_err();
    assert!(matches!(
        err,
        DxpError::InvalidLength { task: ControlTask::AdcTrace, expected: 2, actual: 0 }
    ));
    assert_eq!(sim.csr() & 1, 0, "no run started");

    // the failed begin left the channel free
    driver.begin_control_task(0, ControlTask::AdcTrace, &[0, 5]).unwrap();
    driver.end_control_task(0, ControlTask::AdcTrace).unwrap();
}

/// Saturn tasks start and keep running; the caller polls `BUSY`, pulls
/// the history buffer, then ends the task.
#[test]
fn saturn_trace_is_polled_by_the_caller() {
    let (mut driver, sim) = saturn_driver();
    let dm = saturn::DATA_MEMORY;
    driver.write_symbol(0, "HSTSTART", 0x100).unwrap();
    driver.write_symbol(0, "HSTLEN", 3).unwrap();

    driver.begin_control_task(0, ControlTask::AdcTrace, &[0, 10]).unwrap();
    assert_eq!(sim.peek(dm + WHICHTEST), 1, "ACQUIRE_ADC selected");
    assert_ne!(sim.peek(dm + RUNTASKS) & 0x100, 0, "control-task bit up");
    assert_eq!(sim.csr() & 0x801, 0x801, "run going, gate ignored");
    assert_eq!(driver.read_symbol(0, "TRACEWAIT").unwrap(), 10.0);

    // DSP reports done, capture sits in the history buffer
    assert_eq!(driver.read_symbol(0, "BUSY").unwrap(), 0.0);
    for (i, value) in [21u32, 22, 23].into_iter().enumerate() {
        sim.poke(dm + 0x100 + i as u32, value);
    }
    let data = driver.control_task_data(0, ControlTask::AdcTrace).unwrap();
    assert_eq!(data, vec![21, 22, 23]);

    driver.end_control_task(0, ControlTask::AdcTrace).unwrap();
    assert_eq!(sim.peek(dm + RUNTASKS), 0);
    assert_eq!(sim.csr() & 1, 0);
}

#[test]
fn saturn_memory_window_truncates_to_length() {
    let (mut driver, sim) = saturn_driver();
    let dm = saturn::DATA_MEMORY;
    driver.write_symbol(0, "HSTSTART", 0x100).unwrap();
    driver.write_symbol(0, "HSTLEN", 5).unwrap();

    driver.begin_control_task(0, ControlTask::ReadMemory, &[0, 2, 0x30, 3]).unwrap();
    assert_eq!(sim.peek(dm + WHICHTEST), 20);
    assert_eq!(sim.peek(dm + EXTPAGE), 2);
    assert_eq!(sim.peek(dm + EXTADDRESS), 0x30);
    assert_eq!(sim.peek(dm + EXTLENGTH), 3);

    for (i, value) in [1u32, 2, 3, 4, 5].into_iter().enumerate() {
        sim.poke(dm + 0x100 + i as u32, value);
    }
    let page = driver.control_task_data(0, ControlTask::ReadMemory).unwrap();
    assert_eq!(page, vec![1, 2, 3], "only EXTLENGTH words are the page");

    driver.end_control_task(0, ControlTask::ReadMemory).unwrap();
}

#[test]
fn saturn_memory_write_window_arms_the_selector() {
    let (mut driver, sim) = saturn_driver();
    driver.begin_control_task(0, ControlTask::WriteMemory, &[0, 1, 0x40, 2]).unwrap();
    assert_eq!(sim.peek(saturn::DATA_MEMORY + WHICHTEST), 21);
    assert_eq!(sim.peek(saturn::DATA_MEMORY + EXTPAGE), 1);
    driver.end_control_task(0, ControlTask::WriteMemory).unwrap();
}

/// The baseline history rides on the normal run: ending the task
/// releases the channel but leaves acquisition going.
#[test]
fn saturn_baseline_history_rotates_and_leaves_the_run() {
    let (mut driver, sim) = saturn_driver();
    let dm = saturn::DATA_MEMORY;
    driver.write_symbol(0, "HSTSTART", 0x100).unwrap();
    driver.write_symbol(0, "HSTLEN", 4).unwrap();

    driver.begin_control_task(0, ControlTask::BaselineHistory, &[]).unwrap();
    assert_eq!(sim.peek(dm + WHICHTEST), 17);

    for (i, value) in [10u32, 11, 12, 13].into_iter().enumerate() {
        sim.poke(dm + 0x100 + i as u32, value);
    }
    // DSP write cursor sits two slots in, so the oldest sample is there
    driver.write_symbol(0, "CIRCULAR", 0x102).unwrap();
    let history = driver.control_task_data(0, ControlTask::BaselineHistory).unwrap();
    assert_eq!(history, vec![12, 13, 10, 11]);

    driver.end_control_task(0, ControlTask::BaselineHistory).unwrap();
    assert_ne!(sim.csr() & 1, 0, "run left going");
    assert_eq!(sim.peek(dm + RUNTASKS), 0, "task bit released");

    driver.end_run().unwrap();
    assert!(!driver.is_run_active().unwrap());
}

#[test]
fn saturn_sleep_task_brackets_cleanly() {
    let (mut driver, sim) = saturn_driver();
    let dm = saturn::DATA_MEMORY;

    driver.begin_control_task(0, ControlTask::SleepDsp, &[]).unwrap();
    assert_eq!(sim.peek(dm + WHICHTEST), 6);
    assert_ne!(sim.csr() & 1, 0);

    driver.end_control_task(0, ControlTask::SleepDsp).unwrap();
    assert_eq!(sim.peek(dm + RUNTASKS), 0);
    assert_eq!(sim.csr() & 1, 0);
}

#[test]
fn xmap_sleep_task_uses_the_selector_pair() {
    let (mut driver, sim) = xmap_driver();
    let dm = xmap::DATA_MEMORY;

    driver.begin_control_task(0, ControlTask::SleepDsp, &[]).unwrap();
    assert_eq!(sim.peek(dm + RUNTYPE), 1);
    assert_eq!(sim.peek(dm + SPECIALRUN), 7);
    assert_ne!(sim.csr() & 1, 0);

    driver.end_control_task(0, ControlTask::SleepDsp).unwrap();
    assert_eq!(sim.peek(dm + RUNTYPE), 0);
    assert_eq!(sim.csr() & 1, 0);
}

#[test]
fn tasks_without_data_say_so() {
    let (mut driver, _sim) = saturn_driver();
    driver.begin_control_task(0, ControlTask::SetAscDac, &[]).unwrap();
    assert!(matches!(
        driver.control_task_data(0, ControlTask::SetAscDac),
        Err(DxpError::NoTaskData { task: ControlTask::SetAscDac })
    ));
    driver.end_control_task(0, ControlTask::SetAscDac).unwrap();
}

#[test]
fn foreign_tasks_rejected_per_product() {
    let (mut driver, _sim) = saturn_driver();
    assert!(matches!(
        driver.begin_control_task(0, ControlTask::BiasScan, &[]),
        Err(DxpError::UnknownControlTask { task: ControlTask::BiasScan })
    ));
}

#[test]
fn writes_clamp_into_declared_bounds() {
    let (mut driver, _sim) = saturn_driver();

    let outcome = driver.write_symbol(0, "SLOWLEN", 100).unwrap();
    assert_eq!(outcome, WriteOutcome::Clamped { requested: 100, written: 28 });
    assert_eq!(driver.read_symbol(0, "SLOWLEN").unwrap(), 28.0);

    assert_eq!(driver.write_symbol(0, "SLOWLEN", 10).unwrap(), WriteOutcome::Written);
}

#[test]
fn read_only_symbols_reject_host_writes() {
    let (mut driver, _sim) = saturn_driver();
    match driver.write_symbol(0, "BUSY", 1).unwrap_err() {
        DxpError::ReadOnlyAccess { name } => assert_eq!(name, "BUSY"),
        other => panic!("expected ReadOnlyAccess, got {other}"),
    }
}

/// STJ parameter memory drops writes under load; the driver rewrites
/// until the readback agrees.
#[test]
fn stj_symbol_writes_survive_a_flaky_bus() {
    let dsp = DspProgram::from_dsx_str(STJ_DSX).unwrap();
    let (mut driver, sim) = boot(ChipVariant::Stj, &stj::PROFILE, dsp);

    sim.drop_memory_writes(1);
    assert_eq!(driver.write_symbol(3, "SLOWLEN", 9).unwrap(), WriteOutcome::Written);

    // channel 3 base 0x580, symbol offset 2
    assert_eq!(sim.peek(stj::DATA_MEMORY + 0x582), 9);
    assert_eq!(driver.read_symbol(3, "SLOWLEN").unwrap(), 9.0);
}
