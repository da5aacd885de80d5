//! Linux `i2c-dev` backend.
//!
//! Talks to `/dev/i2c-N` through the `I2C_SLAVE` and `I2C_SMBUS` ioctls,
//! the same requests libi2c's `i2c_smbus_*` helpers issue.
//! See https://www.kernel.org/doc/Documentation/i2c/dev-interface

use crate::config::SMBUS_BLOCK_MAX;
use crate::device::SmbusDevice;
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::os::fd::{AsRawFd, IntoRawFd, RawFd};
use std::path::Path;

// linux/i2c-dev.h
const I2C_SLAVE: u32 = 0x0703;
const I2C_SMBUS: u32 = 0x0720;

// linux/i2c.h
const I2C_SMBUS_READ: u8 = 1;
const I2C_SMBUS_WRITE: u8 = 0;
const I2C_SMBUS_BYTE_DATA: u32 = 2;
const I2C_SMBUS_WORD_DATA: u32 = 3;
const I2C_SMBUS_I2C_BLOCK_DATA: u32 = 8;

/// `union i2c_smbus_data`, viewed as its byte array.
#[repr(C, align(2))]
struct SmbusData {
    block: [u8; SMBUS_BLOCK_MAX + 2],
}

impl SmbusData {
    fn new() -> Self {
        Self {
            block: [0; SMBUS_BLOCK_MAX + 2],
        }
    }

    fn word(&self) -> u16 {
        u16::from_ne_bytes([self.block[0], self.block[1]])
    }
}

/// `struct i2c_smbus_ioctl_data`
#[repr(C)]
struct SmbusIoctlData {
    read_write: u8,
    command: u8,
    size: u32,
    data: *mut SmbusData,
}

nix::ioctl_write_int_bad!(i2c_set_slave, I2C_SLAVE);
nix::ioctl_readwrite_bad!(i2c_smbus, I2C_SMBUS, SmbusIoctlData);

enum Handle {
    Plain(File),
    Locked(Flock<File>),
}

/// An open `/dev/i2c-N` node.
pub struct LinuxI2cDevice {
    handle: Handle,
}

impl LinuxI2cDevice {
    /// Opens `path` read/write. With `exclusive`, also takes a non-blocking
    /// exclusive `flock`, so a bus already held elsewhere fails with
    /// `EWOULDBLOCK`.
    pub fn open(path: &Path, exclusive: bool) -> std::io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let handle = if exclusive {
            let lock = Flock::lock(file, FlockArg::LockExclusiveNonblock)
                .map_err(|(_, errno)| std::io::Error::from(errno))?;
            Handle::Locked(lock)
        } else {
            Handle::Plain(file)
        };
        Ok(Self { handle })
    }

    fn fd(&self) -> RawFd {
        match &self.handle {
            Handle::Plain(file) => file.as_raw_fd(),
            Handle::Locked(lock) => lock.as_raw_fd(),
        }
    }

    fn smbus_access(
        &mut self,
        read_write: u8,
        command: u8,
        size: u32,
        data: &mut SmbusData,
    ) -> Result<(), Errno> {
        let mut args = SmbusIoctlData {
            read_write,
            command,
            size,
            data: data as *mut SmbusData,
        };
        // SAFETY: `args` and the buffer it points to outlive the call and
        // match the kernel's layout.
        unsafe { i2c_smbus(self.fd(), &mut args) }.map(drop)
    }
}

impl SmbusDevice for LinuxI2cDevice {
    fn set_slave_address(&mut self, addr: u8) -> Result<(), Errno> {
        // SAFETY: I2C_SLAVE takes the address by value.
        unsafe { i2c_set_slave(self.fd(), addr.into()) }.map(drop)
    }

    fn read_byte_data(&mut self, reg: u8) -> Result<u8, Errno> {
        let mut data = SmbusData::new();
        self.smbus_access(I2C_SMBUS_READ, reg, I2C_SMBUS_BYTE_DATA, &mut data)?;
        Ok(data.block[0])
    }

    fn read_word_data(&mut self, reg: u8) -> Result<u16, Errno> {
        let mut data = SmbusData::new();
        self.smbus_access(I2C_SMBUS_READ, reg, I2C_SMBUS_WORD_DATA, &mut data)?;
        Ok(data.word())
    }

    fn read_i2c_block_data(&mut self, reg: u8, buf: &mut [u8]) -> Result<usize, Errno> {
        let len = buf.len().min(SMBUS_BLOCK_MAX);
        let mut data = SmbusData::new();
        data.block[0] = len as u8;
        self.smbus_access(I2C_SMBUS_READ, reg, I2C_SMBUS_I2C_BLOCK_DATA, &mut data)?;

        let count = usize::from(data.block[0]).min(len);
        buf[..count].copy_from_slice(&data.block[1..=count]);
        Ok(count)
    }

    fn write_i2c_block_data(&mut self, reg: u8, values: &[u8]) -> Result<usize, Errno> {
        let len = values.len().min(SMBUS_BLOCK_MAX);
        let mut data = SmbusData::new();
        data.block[0] = len as u8;
        data.block[1..=len].copy_from_slice(&values[..len]);
        self.smbus_access(I2C_SMBUS_WRITE, reg, I2C_SMBUS_I2C_BLOCK_DATA, &mut data)?;
        Ok(len)
    }

    fn write_byte_data(&mut self, reg: u8, value: u8) -> Result<(), Errno> {
        let mut data = SmbusData::new();
        data.block[0] = value;
        self.smbus_access(I2C_SMBUS_WRITE, reg, I2C_SMBUS_BYTE_DATA, &mut data)
    }

    fn close(self) -> Result<(), Errno> {
        let file = match self.handle {
            Handle::Plain(file) => file,
            Handle::Locked(lock) => lock.unlock().map_err(|(_, errno)| errno)?,
        };
        nix::unistd::close(file.into_raw_fd())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct TempNode(PathBuf);

    impl TempNode {
        fn new(name: &str) -> Self {
            let path = std::env::temp_dir().join(format!("i2cbus-{}-{name}", std::process::id()));
            File::create(&path).unwrap();
            Self(path)
        }
    }

    impl Drop for TempNode {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    #[test]
    fn open_missing_node() {
        let err = LinuxI2cDevice::open(Path::new("/nonexistent/i2c-9"), true)
            .err()
            .unwrap();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn exclusive_open_rejects_second_holder() {
        let node = TempNode::new("excl");
        let first = LinuxI2cDevice::open(&node.0, true).unwrap();

        let err = LinuxI2cDevice::open(&node.0, true).err().unwrap();
        assert_eq!(err.raw_os_error(), Some(Errno::EWOULDBLOCK as i32));

        let shared = LinuxI2cDevice::open(&node.0, false).unwrap();
        shared.close().unwrap();

        first.close().unwrap();
        let again = LinuxI2cDevice::open(&node.0, true).unwrap();
        again.close().unwrap();
    }

    #[test]
    fn ioctls_on_plain_file_fail_with_enotty() {
        let node = TempNode::new("notty");
        let mut dev = LinuxI2cDevice::open(&node.0, false).unwrap();
        assert_eq!(dev.set_slave_address(0x50), Err(Errno::ENOTTY));
        assert_eq!(dev.read_byte_data(0x00), Err(Errno::ENOTTY));
        dev.close().unwrap();
    }

    #[test]
    fn smbus_data_matches_kernel_union() {
        assert_eq!(std::mem::size_of::<SmbusData>(), 34);
        assert_eq!(std::mem::align_of::<SmbusData>(), 2);
    }
}
