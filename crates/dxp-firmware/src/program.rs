//! DSP program container.

use std::fs;
use std::path::Path;

use crate::error::{FirmwareError, Result};
use crate::params::DspParameterTable;
use crate::{dsx, listing};

/// A parsed DSP program: the code words plus the symbol table describing
/// the parameter block the code exposes in data memory.
///
/// Immutable after load and shared between channels through the
/// [`FirmwareCache`](crate::FirmwareCache). Which file format applies is
/// a property of the product line, so the constructors are explicit
/// rather than sniffed from content.
#[derive(Debug, Clone)]
pub struct DspProgram {
    words: Vec<u16>,
    params: DspParameterTable,
}

impl DspProgram {
    pub(crate) fn new(words: Vec<u16>, params: DspParameterTable) -> Self {
        Self { words, params }
    }

    /// Load a `.dsx` file (Mercury-class products).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_dsx_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "loading DSP code");

        if !path.exists() {
            return Err(FirmwareError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let source = fs::read_to_string(path)?;
        Self::from_dsx_str(&source)
    }

    /// Parse `.dsx` text.
    ///
    /// # Errors
    ///
    /// Returns an error if a section is malformed or `@PROGRAM MEMORY@`
    /// is missing.
    pub fn from_dsx_str(source: &str) -> Result<Self> {
        dsx::parse(source)
    }

    /// Load a legacy `.dsp` symbol listing (Saturn-class products).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_listing_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "loading DSP code");

        if !path.exists() {
            return Err(FirmwareError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let source = fs::read_to_string(path)?;
        Self::from_listing_str(&source)
    }

    /// Parse legacy listing text.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol table is malformed.
    pub fn from_listing_str(source: &str) -> Result<Self> {
        listing::parse(source)
    }

    /// The 16-bit program words, in file order.
    #[must_use]
    pub fn words(&self) -> &[u16] {
        &self.words
    }

    /// Program length in 16-bit words.
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// The symbol table.
    #[must_use]
    pub fn params(&self) -> &DspParameterTable {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file() {
        let err = DspProgram::from_dsx_file("/nonexistent/code.dsx").unwrap_err();
        assert!(matches!(err, FirmwareError::FileNotFound { .. }));
    }

    #[test]
    fn test_dsx_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "@CONSTANTS@\n1\n0\n@OFFSETS@\n0\n0\n@GLOBAL@\nBUSY : 3\n@PROGRAM MEMORY@\n00010002\n"
        )
        .unwrap();

        let program = DspProgram::from_dsx_file(file.path()).unwrap();
        assert_eq!(program.word_count(), 2);
        assert!(program.params().is_global("BUSY"));
    }
}
