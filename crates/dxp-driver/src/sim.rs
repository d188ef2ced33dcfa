//! Simulated module transport.
//!
//! `SimTransport` emulates one module end-to-end at the word level: the
//! address/data port pair, register FIFO semantics for the CSR and CFG
//! ports, auto-incrementing memory, CSR command-bit edges (DSP reset and
//! boot, run enable), and the INIT*/XDONE handshake of the FPGA
//! configuration CPLD. Time is virtual: `sleep` advances a clock and
//! fires scheduled state changes, so a three-second XDONE wait costs the
//! test suite nothing.
//!
//! The handle is cheaply cloneable and shares state, so a test can keep
//! one clone for scripting and inspection while the engine owns another
//! as its boxed transport.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dxp_chip::ChipProfile;
use tracing::debug;

use crate::registers::{hi_word, lo_word};
use crate::transport::{Transport, TransportError, TransportResult};

/// One data-port transfer as seen by the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Burst {
    /// Words moved.
    pub words: usize,
    /// True for a device-to-host transfer.
    pub read: bool,
}

/// State changes applied when the run-enable bit edges.
///
/// A start script fires on the rising edge, a stop script on the falling
/// edge. Scripts queue in FIFO order and each edge consumes one. This is
/// how tests stand in for DSP-side behavior: an apply run that clears
/// run-enable and posts `APPLYSTAT`, a trace that drops `BUSY` when the
/// capture ends, a run stop that takes a few milliseconds to idle.
#[derive(Debug, Clone, Default)]
pub struct RunScript {
    /// Delay from the edge to the script taking effect.
    pub delay: Duration,
    /// Clear the run-enable bit (the DSP ending its own run).
    pub clear_run_enable: bool,
    /// Memory locations to set.
    pub pokes: Vec<(u32, u32)>,
}

#[derive(Debug, Clone)]
enum Event {
    CfgStatus { set: u32, clear: u32 },
    CsrBits { set: u32, clear: u32 },
    Poke { addr: u32, value: u32 },
}

#[derive(Debug)]
struct SimState {
    profile: &'static ChipProfile,
    mem: HashMap<u32, u32>,
    tar: Option<u32>,
    now: Duration,
    events: Vec<(Duration, Event)>,
    bursts: Vec<Burst>,
    address_writes: usize,
    max_block: usize,
    lose_address: bool,
    drop_writes: usize,
    csr: u32,
    cfg_status: u32,
    cfg_armed: u32,
    cfg_bytes: usize,
    cfg_stream: Vec<u32>,
    expect_bytes: Option<usize>,
    xdone_delay: Duration,
    crc_failures: usize,
    init_veto: u32,
    boot_delay: Duration,
    boot_pokes: Vec<(u32, u32)>,
    start_scripts: VecDeque<RunScript>,
    stop_scripts: VecDeque<RunScript>,
}

const fn bit(pos: u8) -> u32 {
    1 << pos
}

impl SimState {
    fn schedule(&mut self, at: Duration, event: Event) {
        self.events.push((at, event));
    }

    fn run_due_events(&mut self) {
        loop {
            let due = self
                .events
                .iter()
                .enumerate()
                .filter(|(_, (at, _))| *at <= self.now)
                .min_by_key(|(_, (at, _))| *at)
                .map(|(idx, _)| idx);
            let Some(idx) = due else { break };
            let (_, event) = self.events.remove(idx);
            match event {
                Event::CfgStatus { set, clear } => {
                    self.cfg_status = (self.cfg_status | set) & !clear;
                }
                Event::CsrBits { set, clear } => {
                    self.csr = (self.csr | set) & !clear;
                }
                Event::Poke { addr, value } => {
                    self.mem.insert(addr, value);
                }
            }
        }
    }

    fn advance(&mut self, duration: Duration) {
        self.now += duration;
        self.run_due_events();
    }

    fn words_per_location(&self) -> usize {
        self.profile.bus_width().words()
    }

    fn is_register(&self, addr: u32) -> bool {
        addr == self.profile.csr.addr
            || addr == self.profile.cfg_control.addr
            || addr == self.profile.cfg_data.addr
            || addr == self.profile.cfg_status.addr
    }

    fn arm_cfg(&mut self, mask: u32) {
        self.cfg_armed = mask & self.profile.all_targets_mask();
        let mut set = 0;
        let mut clear = 0;
        for target in self.profile.targets_in(mask) {
            if target.mask & self.init_veto == 0 {
                set |= target.init;
            } else {
                clear |= target.init;
            }
            clear |= target.xdone;
        }
        self.cfg_status = (self.cfg_status | set) & !clear;
        self.cfg_bytes = 0;
        self.cfg_stream.clear();
        debug!(mask = format_args!("{mask:#x}"), "sim: CFG targets armed");
    }

    fn receive_cfg_bytes(&mut self, values: &[u32]) {
        self.cfg_bytes += values.len();
        self.cfg_stream.extend_from_slice(values);
        if self.cfg_armed == 0 {
            return;
        }
        let expect = self.expect_bytes.unwrap_or(1);
        if self.cfg_bytes < expect {
            return;
        }
        let mut xdone = 0;
        let mut init = 0;
        for target in self.profile.targets_in(self.cfg_armed) {
            xdone |= target.xdone;
            init |= target.init;
        }
        let clear = if self.crc_failures > 0 {
            self.crc_failures -= 1;
            init
        } else {
            0
        };
        let at = self.now + self.xdone_delay;
        self.schedule(at, Event::CfgStatus { set: xdone, clear });
        self.cfg_armed = 0;
    }

    fn write_csr(&mut self, value: u32) {
        let bits = self.profile.csr_bits;
        let run = bit(bits.run_enable);
        let status = bit(bits.run_active) | bit(bits.dsp_active);
        let pulses = bit(bits.dsp_reset) | bit(bits.dsp_boot);
        let old = self.csr;
        let mut new = (value & !status) | (old & status);

        if value & bit(bits.dsp_reset) != 0 {
            new &= !bit(bits.dsp_active);
        }
        if value & bit(bits.dsp_boot) != 0 {
            let at = self.now + self.boot_delay;
            self.schedule(at, Event::CsrBits { set: bit(bits.dsp_active), clear: 0 });
            let pokes = self.boot_pokes.clone();
            for (addr, value) in pokes {
                self.schedule(at, Event::Poke { addr, value });
            }
        }
        if new & run != 0 && old & run == 0 {
            new |= bit(bits.run_active);
            if let Some(script) = self.start_scripts.pop_front() {
                let at = self.now + script.delay;
                for (addr, value) in script.pokes {
                    self.schedule(at, Event::Poke { addr, value });
                }
                if script.clear_run_enable {
                    self.schedule(at, Event::CsrBits { set: 0, clear: run | bit(bits.run_active) });
                }
            }
        }
        if new & run == 0 && old & run != 0 {
            new &= !bit(bits.run_active);
            if let Some(script) = self.stop_scripts.pop_front() {
                let at = self.now + script.delay;
                for (addr, value) in script.pokes {
                    self.schedule(at, Event::Poke { addr, value });
                }
            }
        }
        self.csr = new & !pulses;
    }

    fn write_values(&mut self, values: &[u32]) -> TransportResult<()> {
        let Some(tar) = self.tar else {
            return Err(TransportError::io("data write with no address latched"));
        };
        if tar == self.profile.cfg_control.addr {
            for &value in values {
                self.arm_cfg(value);
            }
        } else if tar == self.profile.cfg_data.addr {
            self.receive_cfg_bytes(values);
        } else if tar == self.profile.cfg_status.addr {
            // status lines are driven by the FPGAs, host writes land nowhere
        } else if tar == self.profile.csr.addr {
            for &value in values {
                self.write_csr(value);
            }
        } else if self.drop_writes > 0 {
            self.drop_writes -= 1;
            debug!(addr = format_args!("{tar:#x}"), "sim: dropping write burst");
            self.tar = Some(tar + u32::try_from(values.len()).unwrap_or(0));
        } else {
            for (offset, &value) in values.iter().enumerate() {
                self.mem.insert(tar + u32::try_from(offset).unwrap_or(0), value);
            }
            self.tar = Some(tar + u32::try_from(values.len()).unwrap_or(0));
        }
        Ok(())
    }

    fn read_values(&mut self, locations: usize) -> TransportResult<Vec<u32>> {
        let Some(tar) = self.tar else {
            return Err(TransportError::io("data read with no address latched"));
        };
        let mut out = Vec::with_capacity(locations);
        if self.is_register(tar) {
            let value = if tar == self.profile.csr.addr {
                self.csr
            } else if tar == self.profile.cfg_status.addr {
                self.cfg_status
            } else if tar == self.profile.cfg_control.addr {
                self.cfg_armed
            } else {
                0
            };
            out.resize(locations, value);
        } else {
            for offset in 0..locations {
                let addr = tar + u32::try_from(offset).unwrap_or(0);
                out.push(self.mem.get(&addr).copied().unwrap_or(0));
            }
            self.tar = Some(tar + u32::try_from(locations).unwrap_or(0));
        }
        Ok(out)
    }
}

/// Shared-state handle to one simulated module.
#[derive(Debug, Clone)]
pub struct SimTransport {
    state: Arc<Mutex<SimState>>,
}

impl SimTransport {
    /// Create a quiescent module for `profile`.
    #[must_use]
    pub fn new(profile: &'static ChipProfile) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                profile,
                mem: HashMap::new(),
                tar: None,
                now: Duration::ZERO,
                events: Vec::new(),
                bursts: Vec::new(),
                address_writes: 0,
                max_block: 0,
                lose_address: false,
                drop_writes: 0,
                csr: 0,
                cfg_status: 0,
                cfg_armed: 0,
                cfg_bytes: 0,
                cfg_stream: Vec::new(),
                expect_bytes: None,
                xdone_delay: Duration::from_millis(50),
                crc_failures: 0,
                init_veto: 0,
                boot_delay: Duration::from_millis(20),
                boot_pokes: Vec::new(),
                start_scripts: VecDeque::new(),
                stop_scripts: VecDeque::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Limit transfers to `words` per burst (0 = unlimited).
    pub fn set_max_block(&self, words: usize) {
        self.lock().max_block = words;
    }

    /// Invalidate the latched address after every data burst, the way a
    /// PLX bridge consumes its transfer address register.
    pub fn lose_address_after_bursts(&self, lose: bool) {
        self.lock().lose_address = lose;
    }

    /// Silently discard the next `count` memory write bursts.
    pub fn drop_memory_writes(&self, count: usize) {
        self.lock().drop_writes = count;
    }

    /// Bitstream bytes the armed targets need before XDONE can assert.
    /// Without this, any nonempty stream completes the download.
    pub fn expect_cfg_bytes(&self, bytes: usize) {
        self.lock().expect_bytes = Some(bytes);
    }

    /// Delay from the final bitstream byte to XDONE asserting.
    pub fn set_xdone_delay(&self, delay: Duration) {
        self.lock().xdone_delay = delay;
    }

    /// Report a CRC failure (INIT* dropped at XDONE time) for the next
    /// `count` downloads.
    pub fn fail_crc_times(&self, count: usize) {
        self.lock().crc_failures = count;
    }

    /// Keep INIT* de-asserted for the targets in `mask`.
    pub fn veto_init(&self, mask: u32) {
        self.lock().init_veto = mask;
    }

    /// Delay from the DSP boot bit to the DSP-active bit asserting.
    pub fn set_boot_delay(&self, delay: Duration) {
        self.lock().boot_delay = delay;
    }

    /// Set a memory location whenever the DSP boots.
    pub fn on_boot_poke(&self, addr: u32, value: u32) {
        self.lock().boot_pokes.push((addr, value));
    }

    /// Queue a script for the next run-enable rising edge.
    pub fn on_run_start(&self, script: RunScript) {
        self.lock().start_scripts.push_back(script);
    }

    /// Queue a script for the next run-enable falling edge.
    pub fn on_run_stop(&self, script: RunScript) {
        self.lock().stop_scripts.push_back(script);
    }

    /// Set one memory location directly.
    pub fn poke(&self, addr: u32, value: u32) {
        self.lock().mem.insert(addr, value);
    }

    /// Read one memory location directly.
    #[must_use]
    pub fn peek(&self, addr: u32) -> u32 {
        let mut state = self.lock();
        state.run_due_events();
        state.mem.get(&addr).copied().unwrap_or(0)
    }

    /// Current CSR value.
    #[must_use]
    pub fn csr(&self) -> u32 {
        let mut state = self.lock();
        state.run_due_events();
        state.csr
    }

    /// Overwrite the CSR without command-bit side effects.
    pub fn set_csr(&self, value: u32) {
        self.lock().csr = value;
    }

    /// Current CFG-status value.
    #[must_use]
    pub fn cfg_status(&self) -> u32 {
        let mut state = self.lock();
        state.run_due_events();
        state.cfg_status
    }

    /// Bitstream bytes received since the last arm.
    #[must_use]
    pub fn cfg_bytes_received(&self) -> usize {
        self.lock().cfg_bytes
    }

    /// Bitstream byte values received since the last arm, in order.
    #[must_use]
    pub fn cfg_stream_received(&self) -> Vec<u32> {
        self.lock().cfg_stream.clone()
    }

    /// Word counts of host-to-device data bursts, in order.
    #[must_use]
    pub fn write_burst_sizes(&self) -> Vec<usize> {
        self.lock().bursts.iter().filter(|b| !b.read).map(|b| b.words).collect()
    }

    /// Word counts of device-to-host data bursts, in order.
    #[must_use]
    pub fn read_burst_sizes(&self) -> Vec<usize> {
        self.lock().bursts.iter().filter(|b| b.read).map(|b| b.words).collect()
    }

    /// Address-port writes observed so far.
    #[must_use]
    pub fn address_write_count(&self) -> usize {
        self.lock().address_writes
    }

    /// Forget recorded bursts and address writes.
    pub fn clear_bursts(&self) {
        let mut state = self.lock();
        state.bursts.clear();
        state.address_writes = 0;
    }

    /// Virtual time elapsed.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.lock().now
    }
}

impl Transport for SimTransport {
    fn write(&mut self, port: u32, words: &[u16]) -> TransportResult<()> {
        let mut state = self.lock();
        state.run_due_events();
        let wpl = state.words_per_location();
        if port == state.profile.addr_port {
            if words.len() != wpl {
                return Err(TransportError::io(format!(
                    "address phase must be {wpl} words, got {}",
                    words.len()
                )));
            }
            let addr = if wpl == 2 {
                u32::from(words[1]) << 16 | u32::from(words[0])
            } else {
                u32::from(words[0])
            };
            state.tar = Some(addr);
            state.address_writes += 1;
            Ok(())
        } else if port == state.profile.data_port {
            state.bursts.push(Burst { words: words.len(), read: false });
            if words.len() % wpl != 0 {
                return Err(TransportError::io("data burst splits a location"));
            }
            let values: Vec<u32> = words
                .chunks_exact(wpl)
                .map(|pair| {
                    if wpl == 2 {
                        u32::from(pair[1]) << 16 | u32::from(pair[0])
                    } else {
                        u32::from(pair[0])
                    }
                })
                .collect();
            let outcome = state.write_values(&values);
            if state.lose_address {
                state.tar = None;
            }
            outcome
        } else {
            Err(TransportError::InvalidPort { port })
        }
    }

    fn read(&mut self, port: u32, n: usize) -> TransportResult<Vec<u16>> {
        let mut state = self.lock();
        state.run_due_events();
        if port != state.profile.data_port {
            return Err(TransportError::InvalidPort { port });
        }
        state.bursts.push(Burst { words: n, read: true });
        let wpl = state.words_per_location();
        if n % wpl != 0 {
            return Err(TransportError::io("data burst splits a location"));
        }
        let values = state.read_values(n / wpl)?;
        if state.lose_address {
            state.tar = None;
        }
        let mut words = Vec::with_capacity(n);
        for value in values {
            words.push(lo_word(value));
            if wpl == 2 {
                words.push(hi_word(value));
            }
        }
        Ok(words)
    }

    fn sleep(&mut self, duration: Duration) {
        self.lock().advance(duration);
    }

    fn max_block_size(&self) -> usize {
        self.lock().max_block
    }
}
