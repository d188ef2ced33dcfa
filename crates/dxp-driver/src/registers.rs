//! Addressed register and block I/O.
//!
//! Every access is two-phase: the target address goes out on the address
//! port, then data moves on the data port. A 32-bit location travels as
//! two 16-bit words, low word first; a 16-bit product moves one word per
//! location. Block transfers are split to the transport's burst limit,
//! and products whose bridge consumes the latched address get it
//! rewritten before every chunk.

use std::time::Duration;

use dxp_chip::profile::Register;
use dxp_chip::ChipProfile;
use tracing::{debug, warn};

use crate::error::{DxpError, Result};
use crate::transport::Transport;

/// Total attempts (first write plus rewrites) for a verified write.
pub const MAX_REWRITES: usize = 10;

#[allow(clippy::cast_possible_truncation)]
pub(crate) const fn lo_word(value: u32) -> u16 {
    (value & 0xFFFF) as u16
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) const fn hi_word(value: u32) -> u16 {
    (value >> 16) as u16
}

/// Word-level access to one module through its address/data port pair.
#[derive(Debug)]
pub struct RegisterIo {
    transport: Box<dyn Transport>,
    profile: &'static ChipProfile,
}

impl RegisterIo {
    /// Wrap a transport for the given product.
    #[must_use]
    pub fn new(transport: Box<dyn Transport>, profile: &'static ChipProfile) -> Self {
        Self { transport, profile }
    }

    /// Product description this I/O path was built for.
    #[must_use]
    pub fn profile(&self) -> &'static ChipProfile {
        self.profile
    }

    /// Let device-side time pass. Routed through the transport so a
    /// simulated module can keep a virtual clock.
    pub fn sleep(&mut self, duration: Duration) {
        self.transport.sleep(duration);
    }

    /// Latch `addr` as the target for the next data transfer.
    ///
    /// # Errors
    ///
    /// Fails if the transport rejects the address phase.
    pub fn set_address(&mut self, addr: u32) -> Result<()> {
        let words = self.encode_one(addr);
        self.transport.write(self.profile.addr_port, &words)?;
        Ok(())
    }

    /// Read one register.
    ///
    /// # Errors
    ///
    /// Fails if either phase of the access fails.
    pub fn read_register(&mut self, reg: Register) -> Result<u32> {
        self.set_address(reg.addr)?;
        let wpl = reg.width.words();
        let words = self.transport.read(self.profile.data_port, wpl)?;
        Ok(decode_one(&words))
    }

    /// Write one register.
    ///
    /// # Errors
    ///
    /// Fails if either phase of the access fails.
    pub fn write_register(&mut self, reg: Register, value: u32) -> Result<()> {
        self.set_address(reg.addr)?;
        let words = self.encode_one(value)[..reg.width.words()].to_vec();
        self.transport.write(self.profile.data_port, &words)?;
        Ok(())
    }

    /// Write `values` to consecutive locations starting at `addr`.
    ///
    /// # Errors
    ///
    /// Fails if the transport rejects any phase of any chunk.
    pub fn write_block(&mut self, addr: u32, values: &[u32]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let per_chunk = self.chunk_locations(values.len());
        let mut done = 0usize;
        for chunk in values.chunks(per_chunk) {
            self.address_chunk(addr, done)?;
            let mut words = Vec::with_capacity(chunk.len() * self.words_per_location());
            for &value in chunk {
                words.push(lo_word(value));
                if self.words_per_location() == 2 {
                    words.push(hi_word(value));
                }
            }
            self.transport.write(self.profile.data_port, &words)?;
            done += chunk.len();
        }
        Ok(())
    }

    /// Read `len` consecutive locations starting at `addr`.
    ///
    /// # Errors
    ///
    /// Fails if the transfer buffer cannot be allocated or the transport
    /// rejects any phase of any chunk.
    pub fn read_block(&mut self, addr: u32, len: usize) -> Result<Vec<u32>> {
        let mut out = Vec::new();
        out.try_reserve_exact(len)
            .map_err(|_| DxpError::NoMemory { bytes: len.saturating_mul(4) })?;
        if len == 0 {
            return Ok(out);
        }
        let per_chunk = self.chunk_locations(len);
        let wpl = self.words_per_location();
        while out.len() < len {
            let want = per_chunk.min(len - out.len());
            self.address_chunk(addr, out.len())?;
            let words = self.transport.read(self.profile.data_port, want * wpl)?;
            for pair in words.chunks_exact(wpl) {
                out.push(decode_one(pair));
            }
        }
        Ok(out)
    }

    /// Stream `values` into one register, re-latching the register
    /// address before every chunk. The target address never advances; a
    /// FIFO-style register swallows the whole stream.
    ///
    /// # Errors
    ///
    /// Fails if the transport rejects any phase of any chunk.
    pub fn write_fifo(&mut self, reg: Register, values: &[u32]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let per_chunk = self.chunk_locations(values.len());
        let wpl = reg.width.words();
        for chunk in values.chunks(per_chunk) {
            self.set_address(reg.addr)?;
            let mut words = Vec::with_capacity(chunk.len() * wpl);
            for &value in chunk {
                words.push(lo_word(value));
                if wpl == 2 {
                    words.push(hi_word(value));
                }
            }
            self.transport.write(self.profile.data_port, &words)?;
        }
        Ok(())
    }

    /// Write a block and read it back until the readback matches, for
    /// products whose bus is known to drop the occasional write.
    ///
    /// # Errors
    ///
    /// Returns [`DxpError::RewriteFailure`] when the readback still
    /// disagrees after [`MAX_REWRITES`] attempts, or any transfer error.
    pub fn write_block_verified(&mut self, addr: u32, values: &[u32]) -> Result<()> {
        for attempt in 1..=MAX_REWRITES {
            self.write_block(addr, values)?;
            let readback = self.read_block(addr, values.len())?;
            if readback == values {
                if attempt > 1 {
                    debug!(addr = format_args!("{addr:#x}"), attempt, "write verified");
                }
                return Ok(());
            }
            warn!(
                addr = format_args!("{addr:#x}"),
                attempt, "readback mismatch, rewriting block"
            );
        }
        Err(DxpError::RewriteFailure { addr, attempts: MAX_REWRITES })
    }

    fn words_per_location(&self) -> usize {
        self.profile.bus_width().words()
    }

    fn encode_one(&self, value: u32) -> Vec<u16> {
        if self.words_per_location() == 2 {
            vec![lo_word(value), hi_word(value)]
        } else {
            vec![lo_word(value)]
        }
    }

    /// Locations per burst under the transport's word limit. A limit of
    /// zero means unbounded; a limit below one location still moves one.
    fn chunk_locations(&self, total: usize) -> usize {
        let max_words = self.transport.max_block_size();
        if max_words == 0 {
            total
        } else {
            (max_words / self.words_per_location()).max(1)
        }
    }

    fn address_chunk(&mut self, base: u32, done: usize) -> Result<()> {
        if done == 0 || self.profile.readdress_per_chunk {
            self.set_address(base + u32::try_from(done).unwrap_or(u32::MAX))?;
        }
        Ok(())
    }
}

fn decode_one(words: &[u16]) -> u32 {
    match words {
        [lo] => u32::from(*lo),
        [lo, hi] => u32::from(*hi) << 16 | u32::from(*lo),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimTransport;
    use dxp_chip::{mercury, saturn};

    #[test]
    fn low_word_travels_first() {
        let sim = SimTransport::new(&mercury::PROFILE);
        let mut io = RegisterIo::new(Box::new(sim.clone()), &mercury::PROFILE);
        io.write_block(mercury::DATA_MEMORY, &[0x0002_0001]).unwrap();
        assert_eq!(sim.peek(mercury::DATA_MEMORY), 0x0002_0001);
        let back = io.read_block(mercury::DATA_MEMORY, 1).unwrap();
        assert_eq!(back, vec![0x0002_0001]);
    }

    #[test]
    fn burst_limit_counts_words_not_locations() {
        let sim = SimTransport::new(&mercury::PROFILE);
        sim.set_max_block(4);
        let mut io = RegisterIo::new(Box::new(sim.clone()), &mercury::PROFILE);
        io.write_block(mercury::DATA_MEMORY, &[1, 2, 3]).unwrap();
        // two 32-bit locations fit per four-word burst
        assert_eq!(sim.write_burst_sizes(), vec![4, 2]);
    }

    #[test]
    fn sub_location_limit_still_moves_one_location() {
        let sim = SimTransport::new(&mercury::PROFILE);
        sim.set_max_block(1);
        let mut io = RegisterIo::new(Box::new(sim.clone()), &mercury::PROFILE);
        io.write_block(mercury::DATA_MEMORY, &[7, 8]).unwrap();
        assert_eq!(sim.write_burst_sizes(), vec![2, 2]);
    }

    #[test]
    fn register_write_reaches_csr() {
        let sim = SimTransport::new(&saturn::PROFILE);
        let mut io = RegisterIo::new(Box::new(sim.clone()), &saturn::PROFILE);
        io.write_register(saturn::PROFILE.csr, 0x1).unwrap();
        assert_eq!(sim.csr() & 0x1, 0x1);
        let value = io.read_register(saturn::PROFILE.csr).unwrap();
        assert_eq!(value & 0x1, 0x1);
    }

    #[test]
    fn empty_block_is_a_no_op() {
        let sim = SimTransport::new(&saturn::PROFILE);
        let mut io = RegisterIo::new(Box::new(sim.clone()), &saturn::PROFILE);
        io.write_block(saturn::DATA_MEMORY, &[]).unwrap();
        assert!(io.read_block(saturn::DATA_MEMORY, 0).unwrap().is_empty());
        assert!(sim.write_burst_sizes().is_empty());
        assert_eq!(sim.address_write_count(), 0);
    }
}
