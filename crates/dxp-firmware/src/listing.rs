//! Parser for legacy `.dsp` symbol listings (Saturn-class).
//!
//! The oldest DSP file format: `*` comment lines, then a decimal symbol
//! count, then one line per symbol, then the program code. A symbol's
//! address is its line index in the table. Symbol lines carry one, two
//! or four fields:
//!
//! ```text
//! NAME                   read-write, unbounded
//! NAME -                 read-only ("-"), unbounded
//! NAME * 0 1023          read-write, clamped to [0, 1023]
//! ```
//!
//! Exactly three fields is a format error. Program lines are 6-hex-digit
//! groups, each parsed as a 4-digit and a 2-digit value and stored as two
//! 16-bit words in that order.
//!
//! Saturn modules have a single channel, so every symbol lands in the
//! per-channel table with a lone zero base offset.

use std::collections::HashMap;

use crate::error::{FirmwareError, Result};
use crate::params::{AccessMode, DspParameterTable, Parameter};
use crate::program::DspProgram;

pub(crate) fn parse(source: &str) -> Result<DspProgram> {
    let mut lines = source.lines();

    let count = loop {
        let Some(line) = lines.next() else {
            return Err(FirmwareError::malformed("missing symbol count line"));
        };
        if line.starts_with('*') {
            continue;
        }
        let Some(count) = line.split_whitespace().next().and_then(|t| t.parse::<u32>().ok())
        else {
            return Err(FirmwareError::malformed(format!(
                "bad symbol count line: '{line}'"
            )));
        };
        break count;
    };

    tracing::debug!(count, "listing symbol count");

    let mut per_channel = HashMap::with_capacity(count as usize);
    for index in 0..count {
        let Some(line) = lines.next() else {
            return Err(FirmwareError::malformed(format!(
                "symbol table truncated after {index} entries"
            )));
        };
        let (name, parameter) = parse_symbol(line, index)?;
        per_channel.insert(name, parameter);
    }

    let words = parse_program(lines);
    tracing::debug!(words = words.len(), "listing code length");

    let params = DspParameterTable::new(HashMap::new(), per_channel, vec![0])?;
    Ok(DspProgram::new(words, params))
}

fn parse_symbol(line: &str, address: u32) -> Result<(String, Parameter)> {
    let fields: Vec<&str> = line.split_whitespace().collect();

    let mut parameter = Parameter::read_write(address);
    match fields.as_slice() {
        [_name] => {}
        [_name, access] => {
            if *access == "-" {
                parameter.access = AccessMode::ReadOnly;
            }
        }
        [name, _access, _bound] => {
            return Err(FirmwareError::malformed(format!(
                "symbol '{name}': 3 fields found"
            )));
        }
        [_name, access, lower, upper, ..] => {
            if *access == "-" {
                parameter.access = AccessMode::ReadOnly;
            }
            let bounds = lower.parse().ok().zip(upper.parse().ok());
            let Some((lower, upper)) = bounds else {
                return Err(FirmwareError::malformed(format!(
                    "bad symbol bounds: '{line}'"
                )));
            };
            parameter.lower_bound = lower;
            parameter.upper_bound = upper;
        }
        [] => {
            return Err(FirmwareError::malformed("blank line in symbol table"));
        }
    }

    Ok((fields[0].to_string(), parameter))
}

/// Program lines are runs of 6-hex-digit groups, each a 4-digit word
/// followed by a 2-digit word.
fn parse_program<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<u16> {
    let mut words = Vec::new();

    for line in lines {
        if line.starts_with('*') || !line.is_ascii() {
            continue;
        }
        let mut i = 0;
        while i + 6 <= line.len() {
            let Ok(first) = u16::from_str_radix(&line[i..i + 4], 16) else {
                break;
            };
            let Ok(second) = u16::from_str_radix(&line[i + 4..i + 6], 16) else {
                break;
            };
            words.push(first);
            words.push(second);
            i += 6;
        }
    }

    words
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
* Saturn DSP listing
4
WHICHTEST
BUSY -
SLOWLEN * 2 28
RUNTASKS
123456ABCDEF
";

    #[test]
    fn test_symbol_fields() {
        let program = parse(SAMPLE).unwrap();
        let params = program.params();

        assert_eq!(params.per_channel_count(), 4);
        assert_eq!(params.global_count(), 0);
        assert_eq!(params.channel_offsets(), &[0]);

        let whichtest = params.per_channel("WHICHTEST").unwrap();
        assert_eq!(whichtest.address, 0);
        assert_eq!(whichtest.access, AccessMode::ReadWrite);
        assert!(!whichtest.is_bounded());

        let busy = params.per_channel("BUSY").unwrap();
        assert_eq!(busy.address, 1);
        assert_eq!(busy.access, AccessMode::ReadOnly);

        let slowlen = params.per_channel("SLOWLEN").unwrap();
        assert_eq!(slowlen.address, 2);
        assert_eq!((slowlen.lower_bound, slowlen.upper_bound), (2, 28));
    }

    #[test]
    fn test_program_word_pairs() {
        let program = parse(SAMPLE).unwrap();
        assert_eq!(program.words(), &[0x1234, 0x56, 0xABCD, 0xEF]);
    }

    #[test]
    fn test_three_fields_rejected() {
        let source = "1\nSLOWLEN * 2\n";
        let err = parse(source).unwrap_err();
        assert!(matches!(err, FirmwareError::Malformed { reason } if reason.contains("3 fields")));
    }

    #[test]
    fn test_truncated_table() {
        let source = "* comment\n3\nBUSY\n";
        assert!(matches!(parse(source), Err(FirmwareError::Malformed { .. })));
    }
}
