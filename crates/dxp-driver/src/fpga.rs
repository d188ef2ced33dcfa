//! FPGA configuration downloads.
//!
//! All products configure their FPGAs through the same three-register
//! CPLD dance: write the target mask to CFG control, confirm the
//! selected INIT* lines assert, stream the bitstream bytes through CFG
//! data, then poll CFG status until every selected XDONE line reports
//! the device came up. XDONE with a dropped INIT* means the device
//! rejected the bitstream CRC, which is transient on some buses, so a
//! whole-download retry sits on top.

use dxp_firmware::FpgaImage;
use tracing::{debug, info, warn};

use crate::device::{poll_count, DxpModule};
use crate::error::{DxpError, Result};
use crate::registers::RegisterIo;

/// Downloads abandoned after this many bitstream CRC rejections.
pub const MAX_CRC_ATTEMPTS: usize = 5;

/// Where one download attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadPhase {
    /// Nothing started.
    #[default]
    Idle,
    /// Target mask written, settle wait running.
    TargetArmed,
    /// Checking the INIT* lines.
    AwaitingInit,
    /// Bitstream bytes moving.
    Streaming,
    /// Polling for XDONE.
    AwaitingDone,
    /// Every selected device configured.
    Done,
    /// A handshake line never asserted.
    TimedOut,
    /// A device rejected the bitstream CRC.
    CrcFailed,
}

/// One module's FPGA download machinery.
#[derive(Debug)]
pub struct FpgaDownloader<'a> {
    io: &'a mut RegisterIo,
    phase: DownloadPhase,
}

impl<'a> FpgaDownloader<'a> {
    /// Borrow the module's I/O path for one download sequence.
    pub fn new(io: &'a mut RegisterIo) -> Self {
        Self { io, phase: DownloadPhase::Idle }
    }

    /// Phase the last download reached.
    #[must_use]
    pub fn phase(&self) -> DownloadPhase {
        self.phase
    }

    /// Configure every target in `mask` with `image`, once.
    ///
    /// # Errors
    ///
    /// Returns [`DxpError::FpgaTimeout`] when INIT* or XDONE never
    /// asserts and [`DxpError::FpgaCrc`] when a target rejects the
    /// bitstream, plus bus errors.
    pub fn download(&mut self, mask: u32, image: &FpgaImage) -> Result<()> {
        let profile = self.io.profile();
        let timing = profile.timing;

        self.phase = DownloadPhase::TargetArmed;
        self.io.write_register(profile.cfg_control, mask)?;
        self.io.sleep(timing.cfg_settle);

        // One status read decides; INIT* asserts within the settle time
        // or the target is absent or held in reset.
        self.phase = DownloadPhase::AwaitingInit;
        let status = self.io.read_register(profile.cfg_status)?;
        for target in profile.targets_in(mask) {
            if status & target.init == 0 {
                self.phase = DownloadPhase::TimedOut;
                return Err(DxpError::FpgaTimeout { line: "INIT*", mask });
            }
        }

        self.phase = DownloadPhase::Streaming;
        let mut stream = Vec::with_capacity(image.word_count() * 2);
        for &word in image.words() {
            stream.push(u32::from(word) & 0xFF);
            stream.push(u32::from(word) >> 8);
        }
        self.io.write_fifo(profile.cfg_data, &stream)?;

        self.phase = DownloadPhase::AwaitingDone;
        for _ in 0..poll_count(timing.xdone_timeout, timing.xdone_poll) {
            self.io.sleep(timing.xdone_poll);
            let status = self.io.read_register(profile.cfg_status)?;
            if profile.targets_in(mask).any(|t| status & t.xdone == 0) {
                continue;
            }
            // Configured, unless a device re-pulled INIT* to flag a CRC
            // error in the stream it just consumed.
            if profile.targets_in(mask).any(|t| status & t.init == 0) {
                self.phase = DownloadPhase::CrcFailed;
                return Err(DxpError::FpgaCrc { mask });
            }
            self.phase = DownloadPhase::Done;
            debug!(
                mask = format_args!("{mask:#x}"),
                words = image.word_count(),
                "FPGA targets configured"
            );
            return Ok(());
        }
        self.phase = DownloadPhase::TimedOut;
        Err(DxpError::FpgaTimeout { line: "XDONE", mask })
    }

    /// Configure with retries on CRC rejection.
    ///
    /// # Errors
    ///
    /// As [`Self::download`], after [`MAX_CRC_ATTEMPTS`] CRC failures.
    pub fn download_with_retry(&mut self, mask: u32, image: &FpgaImage) -> Result<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.download(mask, image) {
                Err(DxpError::FpgaCrc { .. }) if attempt < MAX_CRC_ATTEMPTS => {
                    warn!(
                        mask = format_args!("{mask:#x}"),
                        attempt, "bitstream CRC rejected, downloading again"
                    );
                }
                other => return other,
            }
        }
    }
}

impl DxpModule {
    /// Download `image` to the targets in `mask`, with CRC retries.
    pub(crate) fn configure_fpga(&mut self, mask: u32, image: &FpgaImage) -> Result<()> {
        info!(
            mask = format_args!("{mask:#x}"),
            words = image.word_count(),
            "downloading FPGA bitstream"
        );
        FpgaDownloader::new(&mut self.io).download_with_retry(mask, image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimTransport;
    use dxp_chip::mercury;
    use std::time::Duration;

    fn setup() -> (RegisterIo, SimTransport) {
        let sim = SimTransport::new(&mercury::PROFILE);
        (RegisterIo::new(Box::new(sim.clone()), &mercury::PROFILE), sim)
    }

    fn image() -> FpgaImage {
        // one word 0xABCD: streams as byte values 0xCD then 0xAB
        FpgaImage::parse("CDAB").unwrap()
    }

    #[test]
    fn bytes_stream_low_half_first() {
        let (mut io, sim) = setup();
        let mut dl = FpgaDownloader::new(&mut io);
        dl.download(0x1, &image()).unwrap();
        assert_eq!(dl.phase(), DownloadPhase::Done);
        assert_eq!(sim.cfg_stream_received(), vec![0xCD, 0xAB]);
    }

    #[test]
    fn missing_init_is_a_timeout() {
        let (mut io, sim) = setup();
        sim.veto_init(0x2);
        let mut dl = FpgaDownloader::new(&mut io);
        let err = dl.download(0x2, &image()).unwrap_err();
        assert!(matches!(err, DxpError::FpgaTimeout { line: "INIT*", mask: 0x2 }));
        assert_eq!(dl.phase(), DownloadPhase::TimedOut);
        // nothing streamed to an unarmed device
        assert_eq!(sim.cfg_bytes_received(), 0);
    }

    #[test]
    fn xdone_at_the_deadline_still_succeeds() {
        let (mut io, sim) = setup();
        sim.set_xdone_delay(Duration::from_secs(3));
        let mut dl = FpgaDownloader::new(&mut io);
        dl.download(0x1, &image()).unwrap();
        assert_eq!(dl.phase(), DownloadPhase::Done);
    }

    #[test]
    fn xdone_past_the_deadline_times_out() {
        let (mut io, sim) = setup();
        sim.set_xdone_delay(Duration::from_millis(3050));
        let mut dl = FpgaDownloader::new(&mut io);
        let err = dl.download(0x1, &image()).unwrap_err();
        assert!(matches!(err, DxpError::FpgaTimeout { line: "XDONE", .. }));
    }

    #[test]
    fn crc_rejection_retries_and_recovers() {
        let (mut io, sim) = setup();
        sim.fail_crc_times(1);
        let mut dl = FpgaDownloader::new(&mut io);
        dl.download_with_retry(0x1, &image()).unwrap();
        assert_eq!(dl.phase(), DownloadPhase::Done);
        // both attempts streamed the full image
        assert_eq!(sim.write_burst_sizes().iter().filter(|&&w| w == 4).count(), 2);
    }

    #[test]
    fn persistent_crc_rejection_gives_up() {
        let (mut io, sim) = setup();
        sim.fail_crc_times(MAX_CRC_ATTEMPTS);
        let mut dl = FpgaDownloader::new(&mut io);
        let err = dl.download_with_retry(0x1, &image()).unwrap_err();
        assert!(matches!(err, DxpError::FpgaCrc { mask: 0x1 }));
        assert_eq!(dl.phase(), DownloadPhase::CrcFailed);
    }
}
