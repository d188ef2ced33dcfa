//! `dxp` — command-line interface for DXP spectrometer modules.
//!
//! ```text
//! USAGE:
//!   dxp inspect <file>        Summarize a firmware file
//!   dxp params <file>         Dump a DSP code file's parameter table
//!   dxp selftest <variant>    Exercise a simulated module end to end
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dxp_chip::{profile_for, ChipVariant, ControlTask};
use dxp_driver::{driver_for, FirmwareSet, RunScript, SimTransport};
use dxp_firmware::{AccessMode, DspProgram, FpgaImage};

#[derive(Parser)]
#[command(name = "dxp", about = "DXP spectrometer module CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Summarize a firmware file (FPGA bitstream, DSX, or listing).
    Inspect {
        /// Firmware file. `.dsx` and `.dsp`/`.lst` are DSP code,
        /// anything else is read as an FPGA bitstream.
        file: PathBuf,
    },
    /// Dump the parameter table of a DSP code file.
    Params {
        /// DSP code file (`.dsx`, or a legacy symbol listing).
        file: PathBuf,
    },
    /// Run a module lifecycle against the simulated transport.
    Selftest {
        /// Product variant: saturn, mercury, stj or xmap.
        variant: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Inspect { file } => cmd_inspect(&file)?,
        Cmd::Params { file } => cmd_params(&file)?,
        Cmd::Selftest { variant } => cmd_selftest(&variant)?,
    }

    Ok(())
}

fn is_dsp_code(path: &Path) -> Option<bool> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("dsx") => Some(true),
        Some(ext) if ext.eq_ignore_ascii_case("dsp") || ext.eq_ignore_ascii_case("lst") => {
            Some(false)
        }
        _ => None,
    }
}

fn load_dsp(path: &Path) -> Result<DspProgram> {
    let program = match is_dsp_code(path) {
        Some(true) => DspProgram::from_dsx_file(path),
        _ => DspProgram::from_listing_file(path),
    };
    program.with_context(|| format!("loading DSP code from {}", path.display()))
}

fn cmd_inspect(path: &Path) -> Result<()> {
    match is_dsp_code(path) {
        Some(dsx) => {
            let program = load_dsp(path)?;
            let params = program.params();
            println!("File       : {}", path.display());
            println!("Kind       : {}", if dsx { "DSX DSP code" } else { "DSP symbol listing" });
            println!("Code words : {}", program.word_count());
            println!(
                "Symbols    : {} global, {} per-channel",
                params.global_count(),
                params.per_channel_count()
            );
            println!("Channels   : {}", params.channel_offsets().len());
        }
        None => {
            let image = FpgaImage::from_file(path)
                .with_context(|| format!("loading bitstream from {}", path.display()))?;
            println!("File       : {}", path.display());
            println!("Kind       : FPGA bitstream");
            println!("Words      : {}", image.word_count());
            println!("Bytes      : {}", image.word_count() * 2);
        }
    }
    Ok(())
}

fn cmd_params(path: &Path) -> Result<()> {
    let program = load_dsp(path)?;
    let params = program.params();

    print!("Channel bases:");
    for base in params.channel_offsets() {
        print!(" {base:#x}");
    }
    println!();
    println!();

    let mut rows: Vec<(&str, _, bool)> = params
        .globals()
        .map(|(name, p)| (name, p, true))
        .chain(params.per_channels().map(|(name, p)| (name, p, false)))
        .collect();
    rows.sort_by_key(|&(name, p, global)| (!global, p.address, name));

    println!("{:<14} {:>8}  {:<6} {:<6} BOUNDS", "SYMBOL", "ADDR", "SCOPE", "ACCESS");
    for (name, p, global) in rows {
        let scope = if global { "global" } else { "chan" };
        let access = match p.access {
            AccessMode::ReadWrite => "rw",
            AccessMode::ReadOnly => "ro",
            AccessMode::WriteOnly => "wo",
        };
        let bounds = if p.is_bounded() {
            format!("[{}, {}]", p.lower_bound, p.upper_bound)
        } else {
            "-".to_string()
        };
        println!("{:<14} {:>#8x}  {:<6} {:<6} {}", name, p.address, scope, access, bounds);
    }
    Ok(())
}

/// Selftest fixture addresses; the DSX below places APPLYSTAT and
/// ERRINFO here so the apply script can post a success status.
const APPLYSTAT: u32 = 4;
const ERRINFO: u32 = 5;

const SELFTEST_DSX: &str = "\
* Selftest DSP build (Mercury-class products)
@CONSTANTS@
10
0
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
RUNTYPE : 2
SPECIALRUN : 3
APPLYSTAT : 4
ERRINFO : 5
TRACEWAIT : 6
TRACECHAN : 7
TRACESTART : 8
TRACELEN : 9
@PROGRAM MEMORY@
0102030405060708
";

const SELFTEST_LISTING: &str = "\
* Selftest DSP build (Saturn)
8
WHICHTEST
RUNTASKS
BUSY -
RUNERROR -
HSTSTART
HSTLEN
TRACEWAIT
GAINDAC
010203040506
";

const SELFTEST_BITSTREAM: &str = "* selftest bitstream\nAABBCCDD\nEEFF0011\n";

fn selftest_firmware(variant: ChipVariant) -> Result<FirmwareSet> {
    let image = Arc::new(FpgaImage::parse(SELFTEST_BITSTREAM)?);
    let dsp = Arc::new(match variant {
        ChipVariant::Saturn => DspProgram::from_listing_str(SELFTEST_LISTING)?,
        _ => DspProgram::from_dsx_str(SELFTEST_DSX)?,
    });
    Ok(match variant {
        ChipVariant::Saturn => FirmwareSet {
            system_fpga: None,
            fippi_a: Some(image),
            fippi_b: None,
            dsp: Some(dsp),
        },
        ChipVariant::Xmap => FirmwareSet {
            system_fpga: Some(image.clone()),
            fippi_a: Some(image.clone()),
            fippi_b: Some(image),
            dsp: Some(dsp),
        },
        _ => FirmwareSet {
            system_fpga: Some(image.clone()),
            fippi_a: Some(image),
            fippi_b: None,
            dsp: Some(dsp),
        },
    })
}

fn cmd_selftest(variant: &str) -> Result<()> {
    let variant = match variant {
        "saturn" => ChipVariant::Saturn,
        "mercury" => ChipVariant::Mercury,
        "stj" => ChipVariant::Stj,
        "xmap" => ChipVariant::Xmap,
        other => bail!("unknown variant '{other}' (saturn, mercury, stj, xmap)"),
    };
    let profile = profile_for(variant);
    let sim = SimTransport::new(profile);
    let mut driver = driver_for(variant, Box::new(sim.clone()));
    driver.set_firmware(selftest_firmware(variant)?);

    println!("{} module selftest (simulated transport)", variant.as_str());

    let downloader = if variant == ChipVariant::Saturn { "fippi" } else { "all" };
    driver.download_fpga(downloader)?;
    println!("  ok  FPGA download ({downloader})");

    if variant != ChipVariant::Saturn {
        // the full reboot ends in an apply run; script the DSP side
        sim.on_run_start(RunScript {
            delay: Duration::from_millis(150),
            clear_run_enable: true,
            pokes: vec![
                (profile.data_memory + APPLYSTAT, 0),
                (profile.data_memory + ERRINFO, 0),
            ],
        });
    }
    driver.download_dsp()?;
    println!("  ok  DSP code download and boot");

    driver.write_symbol(0, "TRACEWAIT", 5)?;
    let value = driver.read_symbol(0, "TRACEWAIT")?;
    ensure!(value == 5.0, "TRACEWAIT readback {value}, wanted 5");
    println!("  ok  parameter write/read round trip");

    let id = driver.begin_run(true, false)?;
    ensure!(driver.is_run_active()?, "run {id} did not go active");
    driver.end_run()?;
    println!("  ok  normal run start/stop (run {id})");

    let (buf_start, buf_len) = if variant == ChipVariant::Saturn {
        ("HSTSTART", "HSTLEN")
    } else {
        ("TRACESTART", "TRACELEN")
    };
    driver.write_symbol(0, buf_start, 0x200)?;
    driver.write_symbol(0, buf_len, 4)?;
    driver.begin_control_task(0, ControlTask::AdcTrace, &[0, 10])?;
    for i in 0..4u32 {
        sim.poke(profile.data_memory + 0x200 + i, 0x800 + i);
    }
    ensure!(driver.read_symbol(0, "BUSY")? == 0.0, "DSP never finished the trace");
    let trace = driver.control_task_data(0, ControlTask::AdcTrace)?;
    ensure!(trace.len() == 4, "trace returned {} samples, wanted 4", trace.len());
    driver.end_control_task(0, ControlTask::AdcTrace)?;
    println!("  ok  ADC trace capture ({} samples)", trace.len());

    println!("selftest passed");
    Ok(())
}
