//! FPGA bitstream container.

use std::fs;
use std::path::Path;

use crate::error::{FirmwareError, Result};

/// A parsed FPGA configuration bitstream.
///
/// Vendor files carry the bitstream as `*`-commented lines of hex byte
/// pairs; consecutive bytes assemble low-then-high into 16-bit words.
/// Immutable after load and shared between channels through the
/// [`FirmwareCache`](crate::FirmwareCache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FpgaImage {
    words: Vec<u16>,
}

impl FpgaImage {
    /// Load and parse a bitstream file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or holds no
    /// configuration data.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(FirmwareError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let source = fs::read_to_string(path)?;
        let image = Self::parse(&source)?;
        tracing::info!(
            path = %path.display(),
            words = image.word_count(),
            "FPGA bitstream loaded"
        );
        Ok(image)
    }

    /// Parse bitstream text.
    ///
    /// Byte assembly state carries across lines, and a trailing unpaired
    /// byte becomes a final word with only its low byte set.
    ///
    /// # Errors
    ///
    /// Returns an error when no hex data is present at all.
    pub fn parse(source: &str) -> Result<Self> {
        let mut words = Vec::new();
        let mut pending_low: Option<u16> = None;

        for line in source.lines() {
            if line.starts_with('*') || !line.is_ascii() {
                continue;
            }
            let mut i = 0;
            while i + 2 <= line.len() {
                let Ok(byte) = u8::from_str_radix(&line[i..i + 2], 16) else {
                    break;
                };
                match pending_low.take() {
                    None => pending_low = Some(u16::from(byte)),
                    Some(low) => words.push(u16::from(byte) << 8 | low),
                }
                i += 2;
            }
        }

        if let Some(low) = pending_low {
            words.push(low);
        }

        if words.is_empty() {
            return Err(FirmwareError::malformed("no configuration data in file"));
        }

        Ok(Self { words })
    }

    /// The assembled 16-bit configuration words.
    #[must_use]
    pub fn words(&self) -> &[u16] {
        &self.words
    }

    /// Number of configuration words.
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.words.len()
    }
}
