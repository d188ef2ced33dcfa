//! Parser for `.dsx` DSP code files.
//!
//! A DSX file is line-oriented: `*` starts a comment, `@NAME@` starts a
//! section. The sections consumed here:
//!
//! ```text
//! @CONSTANTS@       two decimal count lines: global, then per-channel
//! @OFFSETS@         hex global base offset, then one hex base offset
//!                   per physical channel
//! @GLOBAL@          `NAME : offset` lines, decimal, absolute address =
//!                   offset + global base
//! @CHANNEL@         `NAME : offset` lines, decimal, channel-relative
//! @PROGRAM MEMORY@  8-hex-digit groups parsed high-word-first, stored
//!                   low word first; runs to end of file
//! ```
//!
//! The DSX format carries no access or bounds columns, so every symbol
//! parses as read-write and unbounded.

use std::collections::HashMap;

use crate::error::{FirmwareError, Result};
use crate::params::{DspParameterTable, Parameter};
use crate::program::DspProgram;

pub(crate) fn parse(source: &str) -> Result<DspProgram> {
    let lines: Vec<&str> = source.lines().collect();

    let mut n_globals = 0usize;
    let mut n_per_chan = 0usize;
    let mut global_offset = 0u32;
    let mut channel_offsets = Vec::new();
    let mut global = HashMap::new();
    let mut per_channel = HashMap::new();
    let mut words = None;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        i += 1;

        // Comments and anything that is not a section header.
        if !line.starts_with('@') {
            continue;
        }

        if line.starts_with("@CONSTANTS@") {
            n_globals = next_count(&lines, &mut i, "global symbol count")?;
            n_per_chan = next_count(&lines, &mut i, "per-channel symbol count")?;
            tracing::debug!(n_globals, n_per_chan, "DSX symbol counts");
        } else if line.starts_with("@OFFSETS@") {
            global_offset = next_hex(&lines, &mut i, "global base offset")?;
            while i < lines.len() {
                let Some(offset) = hex_token(lines[i]) else {
                    break;
                };
                channel_offsets.push(offset);
                i += 1;
            }
            tracing::debug!(
                global_offset,
                channels = channel_offsets.len(),
                "DSX base offsets"
            );
        } else if line.starts_with("@GLOBAL@") {
            for _ in 0..n_globals {
                let (name, offset) = next_symbol(&lines, &mut i, "@GLOBAL@")?;
                global.insert(name, Parameter::read_write(offset + global_offset));
            }
        } else if line.starts_with("@CHANNEL@") {
            for _ in 0..n_per_chan {
                let (name, offset) = next_symbol(&lines, &mut i, "@CHANNEL@")?;
                per_channel.insert(name, Parameter::read_write(offset));
            }
        } else if line.starts_with("@PROGRAM MEMORY@") {
            words = Some(parse_program(&lines[i..]));
            break;
        }
    }

    let Some(words) = words else {
        return Err(FirmwareError::MissingSection {
            section: "@PROGRAM MEMORY@",
        });
    };

    tracing::debug!(words = words.len(), "DSX code length");

    let params = DspParameterTable::new(global, per_channel, channel_offsets)?;
    Ok(DspProgram::new(words, params))
}

/// Program lines are runs of 8-hex-digit groups; scanning a line stops at
/// the first character that is not a hex digit. Each group holds two
/// 16-bit words, high first in the file, stored low word first.
fn parse_program(lines: &[&str]) -> Vec<u16> {
    let mut words = Vec::new();

    for line in lines {
        if !line.is_ascii() {
            continue;
        }
        let mut i = 0;
        while i + 8 <= line.len() {
            let Ok(hi) = u16::from_str_radix(&line[i..i + 4], 16) else {
                break;
            };
            let Ok(lo) = u16::from_str_radix(&line[i + 4..i + 8], 16) else {
                break;
            };
            words.push(lo);
            words.push(hi);
            i += 8;
        }
    }

    words
}

fn next_line<'a>(lines: &[&'a str], i: &mut usize, what: &str) -> Result<&'a str> {
    let Some(line) = lines.get(*i) else {
        return Err(FirmwareError::malformed(format!(
            "unexpected end of file reading {what}"
        )));
    };
    *i += 1;
    Ok(line)
}

fn next_count(lines: &[&str], i: &mut usize, what: &str) -> Result<usize> {
    let line = next_line(lines, i, what)?;
    line.split_whitespace()
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| FirmwareError::malformed(format!("bad {what}: '{line}'")))
}

fn next_hex(lines: &[&str], i: &mut usize, what: &str) -> Result<u32> {
    let line = next_line(lines, i, what)?;
    hex_token(line).ok_or_else(|| FirmwareError::malformed(format!("bad {what}: '{line}'")))
}

fn hex_token(line: &str) -> Option<u32> {
    let token = line.split_whitespace().next()?;
    u32::from_str_radix(token, 16).ok()
}

fn next_symbol(lines: &[&str], i: &mut usize, section: &str) -> Result<(String, u32)> {
    let line = next_line(lines, i, section)?;
    let parsed = line.split_once(':').and_then(|(name, offset)| {
        let name = name.trim();
        let offset = offset.trim().parse::<u32>().ok()?;
        (!name.is_empty()).then(|| (name.to_string(), offset))
    });

    parsed.ok_or_else(|| {
        FirmwareError::malformed(format!("bad symbol line in {section}: '{line}'"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
* Generated DSP code listing
@CONSTANTS@
2
1
@OFFSETS@
100
0
40
@GLOBAL@
BUSY : 3
RUNERROR : 5
@CHANNEL@
MCALIMLO : 4
@PROGRAM MEMORY@
12345678DEAD0001
*";

    #[test]
    fn test_symbols_and_offsets() {
        let program = parse(SAMPLE).unwrap();
        let params = program.params();

        // Global addresses fold in the hex base offset (0x100).
        assert_eq!(params.global("BUSY").unwrap().address, 0x100 + 3);
        assert_eq!(params.global("RUNERROR").unwrap().address, 0x100 + 5);
        // Per-channel addresses stay relative.
        assert_eq!(params.per_channel("MCALIMLO").unwrap().address, 4);
        assert_eq!(params.channel_offsets(), &[0x0, 0x40]);
    }

    #[test]
    fn test_program_words_low_first() {
        let program = parse(SAMPLE).unwrap();
        assert_eq!(program.words(), &[0x5678, 0x1234, 0x0001, 0xDEAD]);
    }

    #[test]
    fn test_missing_program_section() {
        let truncated = SAMPLE.split("@PROGRAM MEMORY@").next().unwrap();
        let err = parse(truncated).unwrap_err();
        assert!(matches!(
            err,
            FirmwareError::MissingSection {
                section: "@PROGRAM MEMORY@"
            }
        ));
    }

    #[test]
    fn test_program_scan_stops_at_non_hex() {
        let words = parse_program(&["12345678 trailing junk", "XYZ"]);
        assert_eq!(words, vec![0x5678, 0x1234]);
    }

    #[test]
    fn test_truncated_symbol_table() {
        let source = "@CONSTANTS@\n3\n0\n@GLOBAL@\nBUSY : 1\n";
        assert!(matches!(parse(source), Err(FirmwareError::Malformed { .. })));
    }
}
