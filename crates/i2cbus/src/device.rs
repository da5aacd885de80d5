use nix::errno::Errno;

/// Platform side of a bus: an open controller handle that can be pointed at
/// a slave and issue SMBus register transfers to it.
///
/// Implementations do no locking or caching; [`Bus`](crate::Bus) serializes
/// calls and skips redundant address selection.
pub trait SmbusDevice: Send {
    /// Point subsequent transfers at `addr`.
    fn set_slave_address(&mut self, addr: u8) -> Result<(), Errno>;

    /// SMBus "read byte data".
    fn read_byte_data(&mut self, reg: u8) -> Result<u8, Errno>;

    /// SMBus "read word data". The value is returned as transmitted, low
    /// byte first.
    fn read_word_data(&mut self, reg: u8) -> Result<u16, Errno>;

    /// SMBus "read i2c block data" of `buf.len()` bytes. Returns the number
    /// of bytes stored in `buf`.
    fn read_i2c_block_data(&mut self, reg: u8, buf: &mut [u8]) -> Result<usize, Errno>;

    /// SMBus "write i2c block data". Returns the number of bytes written.
    fn write_i2c_block_data(&mut self, reg: u8, data: &[u8]) -> Result<usize, Errno>;

    /// SMBus "write byte data".
    fn write_byte_data(&mut self, reg: u8, value: u8) -> Result<(), Errno>;

    /// Release the handle.
    fn close(self) -> Result<(), Errno>
    where
        Self: Sized;
}
