//! Full module lifecycle against the simulated transport.
//!
//! Demonstrates firmware download, DSP parameter access and run control
//! without any hardware attached.

use std::sync::Arc;
use std::time::Duration;

use dxp_driver::{
    driver_for, profile_for, ChipVariant, FirmwareSet, RunScript, SimTransport,
};
use dxp_firmware::{DspProgram, FpgaImage};

const BITSTREAM: &str = "* demo bitstream\nAABBCCDD\nEEFF0011\n";

const DSX: &str = "\
@CONSTANTS@
7
0
@OFFSETS@
0
400
480
500
580
@GLOBAL@
BUSY : 0
RUNERROR : 1
RUNTYPE : 2
SPECIALRUN : 3
APPLYSTAT : 4
ERRINFO : 5
GAINDAC : 6
@PROGRAM MEMORY@
0102030405060708
";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("dxp_driver=info")
        .init();

    println!("🔬 DXP Mercury lifecycle (simulated)\n");

    let profile = profile_for(ChipVariant::Mercury);
    let sim = SimTransport::new(profile);
    let mut driver = driver_for(ChipVariant::Mercury, Box::new(sim.clone()));

    let image = Arc::new(FpgaImage::parse(BITSTREAM)?);
    driver.set_firmware(FirmwareSet {
        system_fpga: Some(image.clone()),
        fippi_a: Some(image),
        fippi_b: None,
        dsp: Some(Arc::new(DspProgram::from_dsx_str(DSX)?)),
    });

    // The full reboot ends in an apply run; script the DSP's answer.
    sim.on_run_start(RunScript {
        delay: Duration::from_millis(150),
        clear_run_enable: true,
        pokes: vec![(profile.data_memory + 4, 0), (profile.data_memory + 5, 0)],
    });

    println!("📤 Downloading firmware...");
    driver.download_fpga("all")?;
    driver.download_dsp()?;
    println!("✅ System FPGA, FiPPI and DSP code are live\n");

    driver.write_symbol(0, "GAINDAC", 0x5A)?;
    println!("📥 GAINDAC reads back as {}", driver.read_symbol(0, "GAINDAC")?);

    let id = driver.begin_run(true, false)?;
    println!("▶️  Run {id} started, active = {}", driver.is_run_active()?);
    driver.end_run()?;
    println!("⏹️  Run {id} stopped\n");

    println!("🎉 Lifecycle complete");
    Ok(())
}
