//! In-memory [`SmbusDevice`] for tests.
//!
//! A `FakeDevice` is a cheap handle onto shared state: clone it before
//! handing it to a [`Bus`](crate::Bus) and keep the clone to inspect what the
//! bus did. Each slave is a 256-byte register file; block transfers and word
//! reads walk consecutive registers.

use crate::device::SmbusDevice;
use nix::errno::Errno;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One device-level request, in the order the device saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeOp {
    Select(u8),
    ReadByte { addr: u8, reg: u8 },
    ReadWord { addr: u8, reg: u8 },
    ReadBlock { addr: u8, reg: u8, len: usize },
    WriteBlock { addr: u8, reg: u8, data: Vec<u8> },
    WriteByte { addr: u8, reg: u8, value: u8 },
}

#[derive(Default)]
struct FakeState {
    registers: HashMap<u8, [u8; 256]>,
    absent: HashSet<u8>,
    current: Option<u8>,
    trace: Vec<FakeOp>,
    fail_select: Option<Errno>,
    fail_transfer: Option<Errno>,
    fail_close: Option<Errno>,
    latency: Duration,
    closed: bool,
}

impl FakeState {
    fn slave(&mut self) -> Result<&mut [u8; 256], Errno> {
        let addr = self.current.ok_or(Errno::EDESTADDRREQ)?;
        if self.absent.contains(&addr) {
            return Err(Errno::ENXIO);
        }
        Ok(self.registers.entry(addr).or_insert([0; 256]))
    }
}

#[derive(Default)]
struct Shared {
    state: Mutex<FakeState>,
    in_flight: AtomicBool,
    overlaps: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct FakeDevice {
    shared: Arc<Shared>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_register(&self, addr: u8, reg: u8, value: u8) {
        let mut state = self.shared.state.lock();
        state.registers.entry(addr).or_insert([0; 256])[usize::from(reg)] = value;
    }

    pub fn register(&self, addr: u8, reg: u8) -> u8 {
        let state = self.shared.state.lock();
        state
            .registers
            .get(&addr)
            .map_or(0, |regs| regs[usize::from(reg)])
    }

    /// Transfers to `addr` fail with `ENXIO`, as a slave that never ACKs.
    pub fn set_absent(&self, addr: u8) {
        self.shared.state.lock().absent.insert(addr);
    }

    /// The next address selection fails with `errno`.
    pub fn fail_next_select(&self, errno: Errno) {
        self.shared.state.lock().fail_select = Some(errno);
    }

    /// The next transfer fails with `errno`.
    pub fn fail_next_transfer(&self, errno: Errno) {
        self.shared.state.lock().fail_transfer = Some(errno);
    }

    pub fn fail_close(&self, errno: Errno) {
        self.shared.state.lock().fail_close = Some(errno);
    }

    /// Time every transfer spends on the wire.
    pub fn set_latency(&self, latency: Duration) {
        self.shared.state.lock().latency = latency;
    }

    pub fn trace(&self) -> Vec<FakeOp> {
        self.shared.state.lock().trace.clone()
    }

    /// Number of address selections the device received.
    pub fn select_count(&self) -> usize {
        self.shared
            .state
            .lock()
            .trace
            .iter()
            .filter(|op| matches!(op, FakeOp::Select(_)))
            .count()
    }

    /// Number of times a transfer started while another was in flight.
    pub fn overlaps(&self) -> usize {
        self.shared.overlaps.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Runs one transfer, flagging overlap with any other transfer. The
    /// state lock is not held during the simulated wire time.
    fn transfer<T>(
        &self,
        op: impl FnOnce(u8) -> FakeOp,
        f: impl FnOnce(&mut [u8; 256]) -> T,
    ) -> Result<T, Errno> {
        if self.shared.in_flight.swap(true, Ordering::SeqCst) {
            self.shared.overlaps.fetch_add(1, Ordering::SeqCst);
        }

        let latency = self.shared.state.lock().latency;
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        let result = {
            let mut state = self.shared.state.lock();
            if let Some(addr) = state.current {
                state.trace.push(op(addr));
            }
            match state.fail_transfer.take() {
                Some(errno) => Err(errno),
                None => state.slave().map(f),
            }
        };

        self.shared.in_flight.store(false, Ordering::SeqCst);
        result
    }
}

impl SmbusDevice for FakeDevice {
    fn set_slave_address(&mut self, addr: u8) -> Result<(), Errno> {
        let mut state = self.shared.state.lock();
        state.trace.push(FakeOp::Select(addr));
        if let Some(errno) = state.fail_select.take() {
            return Err(errno);
        }
        state.current = Some(addr);
        Ok(())
    }

    fn read_byte_data(&mut self, reg: u8) -> Result<u8, Errno> {
        self.transfer(
            |addr| FakeOp::ReadByte { addr, reg },
            |regs| regs[usize::from(reg)],
        )
    }

    fn read_word_data(&mut self, reg: u8) -> Result<u16, Errno> {
        self.transfer(
            |addr| FakeOp::ReadWord { addr, reg },
            |regs| {
                let lo = regs[usize::from(reg)];
                let hi = regs[usize::from(reg.wrapping_add(1))];
                u16::from_le_bytes([lo, hi])
            },
        )
    }

    fn read_i2c_block_data(&mut self, reg: u8, buf: &mut [u8]) -> Result<usize, Errno> {
        let len = buf.len();
        self.transfer(
            |addr| FakeOp::ReadBlock { addr, reg, len },
            |regs| {
                for (i, b) in buf.iter_mut().enumerate() {
                    *b = regs[usize::from(reg.wrapping_add(i as u8))];
                }
                len
            },
        )
    }

    fn write_i2c_block_data(&mut self, reg: u8, data: &[u8]) -> Result<usize, Errno> {
        self.transfer(
            |addr| FakeOp::WriteBlock {
                addr,
                reg,
                data: data.to_vec(),
            },
            |regs| {
                for (i, b) in data.iter().enumerate() {
                    regs[usize::from(reg.wrapping_add(i as u8))] = *b;
                }
                data.len()
            },
        )
    }

    fn write_byte_data(&mut self, reg: u8, value: u8) -> Result<(), Errno> {
        self.transfer(
            |addr| FakeOp::WriteByte { addr, reg, value },
            |regs| regs[usize::from(reg)] = value,
        )
    }

    fn close(self) -> Result<(), Errno> {
        let mut state = self.shared.state.lock();
        state.closed = true;
        match state.fail_close.take() {
            Some(errno) => Err(errno),
            None => Ok(()),
        }
    }
}
