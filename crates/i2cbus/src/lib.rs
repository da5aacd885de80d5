//! Serialized SMBus register access to an I2C bus exposed as a character
//! device, with every transfer reported to a replaceable logger.

pub mod bus;
pub mod config;
pub mod device;
pub mod error;
pub mod fake;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod logger;

pub use bus::{Bus, RegisterBus};
pub use config::{BlockPolicy, BusConfig, SMBUS_BLOCK_MAX};
pub use device::SmbusDevice;
pub use error::{Error, Result};
pub use logger::{channel_logger, Direction, LogEntry, Logger, Transfer, TransferLog, Value};
#[cfg(target_os = "linux")]
pub use linux::LinuxI2cDevice;

pub use nix::errno::Errno;
