use crate::config::{BusConfig, SMBUS_BLOCK_MAX};
use crate::device::SmbusDevice;
use crate::error::{Error, Result};
use crate::logger::{default_logger, Direction, Logger, Transfer, Value};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

#[cfg(target_os = "linux")]
use crate::linux::LinuxI2cDevice;

/// Register-level access to the slaves on one I2C bus.
///
/// Mirrors the operations of [`Bus`], so code that talks to peripherals can
/// take `&dyn RegisterBus` and be handed something other than a real bus.
pub trait RegisterBus: Send + Sync {
    fn read_byte(&self, addr: u8, reg: u8) -> Result<u8>;
    fn read_word(&self, addr: u8, reg: u8) -> Result<u16>;
    fn read_block(&self, addr: u8, reg: u8, buf: &mut [u8]) -> Result<usize>;
    fn write_block(&self, addr: u8, reg: u8, value: &[u8]) -> Result<usize>;
    fn write_byte(&self, addr: u8, reg: u8, value: u8) -> Result<()>;
    fn set_logger(&self, logger: Logger);
    fn close(&self) -> Result<()>;
}

struct Inner<D> {
    /// `None` once closed.
    device: Option<D>,
    /// Slave the device was last successfully pointed at.
    current: Option<u8>,
    logger: Logger,
}

/// Serialized accessor for one open bus.
///
/// Every operation holds a single lock for its whole duration, so selecting
/// the slave and the transfer that follows are atomic with respect to other
/// callers. Share it between threads behind an `Arc`.
pub struct Bus<D: SmbusDevice> {
    path: Option<PathBuf>,
    config: BusConfig,
    inner: Mutex<Inner<D>>,
}

#[cfg(target_os = "linux")]
impl Bus<LinuxI2cDevice> {
    /// Opens `/dev/i2c-<id>` with the default [`BusConfig`].
    pub fn open(id: u32) -> Result<Self> {
        Self::open_with(id, BusConfig::default())
    }

    pub fn open_with(id: u32, config: BusConfig) -> Result<Self> {
        let path = config.device_path(id);
        let device = LinuxI2cDevice::open(&path, config.exclusive).map_err(|source| {
            log::debug!(target: "i2cbus", "open {} failed: {source}", path.display());
            Error::Open {
                path: path.clone(),
                source,
            }
        })?;
        log::debug!(target: "i2cbus", "opened {}", path.display());

        Ok(Self {
            path: Some(path),
            ..Self::new(device, config)
        })
    }
}

impl<D: SmbusDevice> Bus<D> {
    /// Wraps an already open device. No slave is selected yet.
    pub fn new(device: D, config: BusConfig) -> Self {
        Self {
            path: None,
            config,
            inner: Mutex::new(Inner {
                device: Some(device),
                current: None,
                logger: default_logger(),
            }),
        }
    }

    /// Device node this bus was opened from.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Slave address the device is currently configured for.
    pub fn current_address(&self) -> Option<u8> {
        self.inner.lock().current
    }

    pub fn set_logger(&self, logger: Logger) {
        self.inner.lock().logger = logger;
    }

    pub fn read_byte(&self, addr: u8, reg: u8) -> Result<u8> {
        self.with_slave(addr, |device, logger| {
            let result = device.read_byte_data(reg);
            logger(&Transfer {
                direction: Direction::Recv,
                addr,
                reg,
                value: Value::Byte(result.unwrap_or(0)),
                error: result.err(),
            });
            result.map_err(|source| Error::Transfer { addr, reg, source })
        })
    }

    /// Reads a word and returns it with the first byte on the wire as the
    /// high byte. Callers must not swap it again.
    pub fn read_word(&self, addr: u8, reg: u8) -> Result<u16> {
        self.with_slave(addr, |device, logger| {
            let result = device.read_word_data(reg);
            logger(&Transfer {
                direction: Direction::Recv,
                addr,
                reg,
                value: Value::Word(result.unwrap_or(0)),
                error: result.err(),
            });
            result
                .map(u16::swap_bytes)
                .map_err(|source| Error::Transfer { addr, reg, source })
        })
    }

    /// Reads up to `buf.len()` bytes starting at `reg`. Returns how many
    /// bytes were stored in `buf`.
    pub fn read_block(&self, addr: u8, reg: u8, buf: &mut [u8]) -> Result<usize> {
        let len = self.block_len(buf.len())?;
        let buf = &mut buf[..len];
        self.with_slave(addr, |device, logger| {
            let result = device.read_i2c_block_data(reg, buf);
            let count = result.unwrap_or(0);
            logger(&Transfer {
                direction: Direction::Recv,
                addr,
                reg,
                value: Value::Block(&buf[..count]),
                error: result.err(),
            });
            result.map_err(|source| Error::Transfer { addr, reg, source })
        })
    }

    /// Writes `value` starting at `reg`. Returns the number of bytes written.
    pub fn write_block(&self, addr: u8, reg: u8, value: &[u8]) -> Result<usize> {
        let value = &value[..self.block_len(value.len())?];
        self.with_slave(addr, |device, logger| {
            let result = device.write_i2c_block_data(reg, value);
            logger(&Transfer {
                direction: Direction::Send,
                addr,
                reg,
                value: Value::Block(value),
                error: result.err(),
            });
            result.map_err(|source| Error::Transfer { addr, reg, source })
        })
    }

    pub fn write_byte(&self, addr: u8, reg: u8, value: u8) -> Result<()> {
        self.with_slave(addr, |device, logger| {
            let result = device.write_byte_data(reg, value);
            logger(&Transfer {
                direction: Direction::Send,
                addr,
                reg,
                value: Value::Byte(value),
                error: result.err(),
            });
            result.map_err(|source| Error::Transfer { addr, reg, source })
        })
    }

    /// Releases the device. Any later operation, including another
    /// `close`, fails with [`Error::Closed`].
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let device = inner.device.take().ok_or(Error::Closed)?;
        inner.current = None;
        device.close().map_err(Error::Close)?;
        log::debug!(target: "i2cbus", "closed {}", self.name());
        Ok(())
    }

    fn name(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => "bus".to_string(),
        }
    }

    fn block_len(&self, len: usize) -> Result<usize> {
        self.config.block_len(len).ok_or(Error::InvalidBlockLength {
            len,
            max: SMBUS_BLOCK_MAX,
        })
    }

    /// Locks the bus, points the device at `addr` unless it already is, and
    /// runs `op`. A failed selection leaves the cached address untouched and
    /// is not reported to the logger.
    fn with_slave<T>(&self, addr: u8, op: impl FnOnce(&mut D, &Logger) -> Result<T>) -> Result<T> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let device = inner.device.as_mut().ok_or(Error::Closed)?;

        if inner.current != Some(addr) {
            if let Err(source) = device.set_slave_address(addr) {
                log::debug!(target: "i2cbus", "{}: select slave {addr:#04x} failed: {source}", self.name());
                return Err(Error::SelectSlave { addr, source });
            }
            log::trace!(target: "i2cbus", "{}: selected slave {addr:#04x}", self.name());
            inner.current = Some(addr);
        }

        op(device, &inner.logger)
    }
}

impl<D: SmbusDevice> RegisterBus for Bus<D> {
    fn read_byte(&self, addr: u8, reg: u8) -> Result<u8> {
        Bus::read_byte(self, addr, reg)
    }

    fn read_word(&self, addr: u8, reg: u8) -> Result<u16> {
        Bus::read_word(self, addr, reg)
    }

    fn read_block(&self, addr: u8, reg: u8, buf: &mut [u8]) -> Result<usize> {
        Bus::read_block(self, addr, reg, buf)
    }

    fn write_block(&self, addr: u8, reg: u8, value: &[u8]) -> Result<usize> {
        Bus::write_block(self, addr, reg, value)
    }

    fn write_byte(&self, addr: u8, reg: u8, value: u8) -> Result<()> {
        Bus::write_byte(self, addr, reg, value)
    }

    fn set_logger(&self, logger: Logger) {
        Bus::set_logger(self, logger)
    }

    fn close(&self) -> Result<()> {
        Bus::close(self)
    }
}
