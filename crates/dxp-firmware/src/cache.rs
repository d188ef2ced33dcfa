//! Path-keyed firmware cache.
//!
//! Several channels (and several boards) routinely reference the same
//! firmware file. The cache parses each path once and hands out shared
//! `Arc`s; it holds only weak references, so an image is dropped as soon
//! as the last board using it goes away and a later request reloads it
//! from disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use crate::error::Result;
use crate::fpga::FpgaImage;
use crate::program::DspProgram;

/// De-duplicating loader for firmware files.
///
/// Keys are the paths as given; callers that want `./a` and `a` to share
/// an entry canonicalize before calling.
#[derive(Debug, Default)]
pub struct FirmwareCache {
    fpga: HashMap<PathBuf, Weak<FpgaImage>>,
    dsp: HashMap<PathBuf, Weak<DspProgram>>,
}

impl FirmwareCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// FPGA bitstream for `path`, loading it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the file must be loaded and cannot be.
    pub fn fpga(&mut self, path: &Path) -> Result<Arc<FpgaImage>> {
        if let Some(image) = self.fpga.get(path).and_then(Weak::upgrade) {
            tracing::debug!(path = %path.display(), "FPGA image already loaded, reusing");
            return Ok(image);
        }

        let image = Arc::new(FpgaImage::from_file(path)?);
        self.fpga.insert(path.to_path_buf(), Arc::downgrade(&image));
        Ok(image)
    }

    /// DSP program for a `.dsx` `path`, loading it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the file must be loaded and cannot be.
    pub fn dsp_dsx(&mut self, path: &Path) -> Result<Arc<DspProgram>> {
        if let Some(program) = self.dsp.get(path).and_then(Weak::upgrade) {
            tracing::debug!(path = %path.display(), "DSP code already loaded, reusing");
            return Ok(program);
        }

        let program = Arc::new(DspProgram::from_dsx_file(path)?);
        self.dsp.insert(path.to_path_buf(), Arc::downgrade(&program));
        Ok(program)
    }

    /// DSP program for a legacy listing `path`, loading it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the file must be loaded and cannot be.
    pub fn dsp_listing(&mut self, path: &Path) -> Result<Arc<DspProgram>> {
        if let Some(program) = self.dsp.get(path).and_then(Weak::upgrade) {
            tracing::debug!(path = %path.display(), "DSP code already loaded, reusing");
            return Ok(program);
        }

        let program = Arc::new(DspProgram::from_listing_file(path)?);
        self.dsp.insert(path.to_path_buf(), Arc::downgrade(&program));
        Ok(program)
    }

    /// Drops entries whose images are no longer referenced.
    pub fn purge(&mut self) {
        self.fpga.retain(|_, w| w.strong_count() > 0);
        self.dsp.retain(|_, w| w.strong_count() > 0);
    }

    /// Number of entries still referenced by at least one owner.
    #[must_use]
    pub fn live_entries(&self) -> usize {
        let live = |w: &Weak<FpgaImage>| usize::from(w.strong_count() > 0);
        let live_dsp = |w: &Weak<DspProgram>| usize::from(w.strong_count() > 0);
        self.fpga.values().map(live).sum::<usize>() + self.dsp.values().map(live_dsp).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fpga_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "* test bitstream\nAABB\n").unwrap();
        file
    }

    #[test]
    fn test_same_path_shares_one_image() {
        let file = fpga_file();
        let mut cache = FirmwareCache::new();

        let a = cache.fpga(file.path()).unwrap();
        let b = cache.fpga(file.path()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.live_entries(), 1);
    }

    #[test]
    fn test_entry_dies_with_last_owner() {
        let file = fpga_file();
        let mut cache = FirmwareCache::new();

        let image = cache.fpga(file.path()).unwrap();
        drop(image);
        assert_eq!(cache.live_entries(), 0);

        // A later request reloads rather than resurrecting the entry.
        let again = cache.fpga(file.path()).unwrap();
        assert_eq!(again.words(), &[0xBBAA]);
        cache.purge();
        assert_eq!(cache.live_entries(), 1);
    }
}
