//! Parse a DSP code file and dump its parameter table.
//!
//! Accepts a `.dsx` code file or a legacy symbol listing.

use dxp_firmware::{AccessMode, DspProgram};

fn main() -> dxp_firmware::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("dxp_firmware=debug")
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: cargo run --example inspect_dsx -- <code.dsx|listing.lst>");
        std::process::exit(1);
    });

    println!("📂 Loading DSP code: {path}\n");

    let program = if path.ends_with(".dsx") {
        DspProgram::from_dsx_file(&path)?
    } else {
        DspProgram::from_listing_file(&path)?
    };

    let params = program.params();
    println!("✅ {} code words", program.word_count());
    println!(
        "✅ {} global and {} per-channel symbols across {} channel(s)\n",
        params.global_count(),
        params.per_channel_count(),
        params.channel_offsets().len()
    );

    let mut rows: Vec<_> = params
        .globals()
        .chain(params.per_channels())
        .collect();
    rows.sort_by_key(|&(name, p)| (p.address, name));

    println!("{:<14} {:>8}  ACCESS", "SYMBOL", "ADDR");
    for (name, p) in rows {
        let access = match p.access {
            AccessMode::ReadWrite => "rw",
            AccessMode::ReadOnly => "ro",
            AccessMode::WriteOnly => "wo",
        };
        println!("{:<14} {:>#8x}  {}", name, p.address, access);
    }

    Ok(())
}
