use nix::errno::Errno;
use std::path::PathBuf;

/// Errors surfaced by [`Bus`](crate::Bus) operations.
///
/// OS failures keep their raw code: open failures wrap the `std::io::Error`
/// from the open/lock call, everything after that carries the `Errno` the
/// ioctl or close returned.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The device node could not be opened or locked.
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The driver rejected the slave address.
    #[error("failed to select slave 0x{addr:02x}: {source}")]
    SelectSlave {
        addr: u8,
        #[source]
        source: Errno,
    },

    /// The register transfer failed on the bus.
    #[error("transfer to 0x{addr:02x} register 0x{reg:02x} failed: {source}")]
    Transfer {
        addr: u8,
        reg: u8,
        #[source]
        source: Errno,
    },

    /// Closing the handle reported an error. The handle is released anyway.
    #[error("failed to close bus: {0}")]
    Close(#[source] Errno),

    /// Block length is zero or exceeds the SMBus block limit.
    #[error("invalid block length {len} (max {max})")]
    InvalidBlockLength { len: usize, max: usize },

    /// The bus was already closed.
    #[error("bus is closed")]
    Closed,
}

impl Error {
    /// Raw OS error code behind this error, if there is one.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Error::Open { source, .. } => source.raw_os_error().map(Errno::from_raw),
            Error::SelectSlave { source, .. } | Error::Transfer { source, .. } => Some(*source),
            Error::Close(errno) => Some(*errno),
            Error::InvalidBlockLength { .. } | Error::Closed => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
