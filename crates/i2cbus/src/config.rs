use std::path::PathBuf;

/// Largest payload of an SMBus block transfer.
pub const SMBUS_BLOCK_MAX: usize = 32;

/// What to do with a block buffer longer than [`SMBUS_BLOCK_MAX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockPolicy {
    /// Fail with [`Error::InvalidBlockLength`](crate::Error::InvalidBlockLength).
    #[default]
    Reject,
    /// Transfer only the first [`SMBUS_BLOCK_MAX`] bytes.
    Clamp,
}

#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Node name before the bus id, `/dev/i2c` gives `/dev/i2c-1`.
    pub device_prefix: String,
    /// Hold an exclusive lock on the node while the bus is open.
    pub exclusive: bool,
    pub block_policy: BlockPolicy,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            device_prefix: "/dev/i2c".to_string(),
            exclusive: true,
            block_policy: BlockPolicy::Reject,
        }
    }
}

impl BusConfig {
    pub fn device_path(&self, id: u32) -> PathBuf {
        PathBuf::from(format!("{}-{}", self.device_prefix, id))
    }

    /// Length actually transferred for a block request of `len` bytes.
    pub(crate) fn block_len(&self, len: usize) -> Option<usize> {
        match (len, self.block_policy) {
            (0, _) => None,
            (n, _) if n <= SMBUS_BLOCK_MAX => Some(n),
            (_, BlockPolicy::Clamp) => Some(SMBUS_BLOCK_MAX),
            (_, BlockPolicy::Reject) => None,
        }
    }
}
