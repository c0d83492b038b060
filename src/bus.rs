use std::path::Path;

use embedded_hal::i2c::{Error as _, ErrorKind, I2c};
use linux_embedded_hal::I2cdev;
use log::debug;

use crate::Error;

/// Exclusive handle to one peripheral on an I2C bus.
pub struct Device<I> {
    i2c: I,
    address: u8,
}

/// Open a Linux i2c-dev bus and bind the handle to `address`.
pub fn open(path: impl AsRef<Path>, address: u8) -> Result<Device<I2cdev>, Error> {
    let path = path.as_ref();
    let i2c = I2cdev::new(path).map_err(|e| Error::DeviceOpen {
        path: path.to_owned(),
        source: Box::new(e),
    })?;
    debug!("Opened {} for peripheral 0x{address:02x}", path.display());
    Ok(Device::new(i2c, address))
}

impl<I> Device<I> {
    pub fn new(i2c: I, address: u8) -> Self {
        Self { i2c, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Give the bus back, closing the handle.
    pub fn release(self) -> I {
        self.i2c
    }
}

impl<I: I2c> Device<I> {
    /// Single write transaction of `bytes`, header included.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), ErrorKind> {
        debug!("I2C Write 0x{:02x} w:{}", self.address, bytes.len());
        self.i2c.write(self.address, bytes).map_err(|e| e.kind())
    }

    /// Zero-length write. Returns `true` if the peripheral acknowledged.
    pub fn probe(&mut self) -> bool {
        self.i2c.write(self.address, &[]).is_ok()
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<(), ErrorKind> {
        debug!("I2C Read 0x{:02x} r:{}", self.address, buf.len());
        self.i2c.read(self.address, buf).map_err(|e| e.kind())
    }

    /// Write `data` to the register selected by `header`.
    pub fn write_registers(&mut self, header: &[u8], data: &[u8]) -> Result<(), Error> {
        let mut buf = Vec::with_capacity(header.len() + data.len());
        buf.extend_from_slice(header);
        buf.extend_from_slice(data);
        self.write(&buf).map_err(|kind| Error::NoAcknowledge {
            register: header_address(header),
            kind,
        })
    }

    /// Point the peripheral at `header` and read `buf.len()` bytes from there.
    pub fn read_registers(&mut self, header: &[u8], buf: &mut [u8]) -> Result<(), Error> {
        let register = header_address(header);
        self.write(header)
            .map_err(|kind| Error::NoAcknowledge { register, kind })?;
        self.read(buf).map_err(|kind| Error::Read { register, kind })
    }
}

fn header_address(header: &[u8]) -> u16 {
    header
        .iter()
        .fold(0u16, |acc, &byte| (acc << 8) | u16::from(byte))
}

#[cfg(test)]
mod tests {
    use embedded_hal::i2c::NoAcknowledgeSource;
    use embedded_hal_mock::eh1::i2c::{Mock, Transaction};

    use super::*;

    #[test]
    fn read_registers_sets_pointer_then_reads() {
        let expectations = [
            Transaction::write(0x68, vec![0x08]),
            Transaction::read(0x68, vec![1, 2, 3]),
        ];
        let mut device = Device::new(Mock::new(&expectations), 0x68);
        let mut buf = [0u8; 3];
        device.read_registers(&[0x08], &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);
        device.release().done();
    }

    #[test]
    fn unacknowledged_pointer_write_skips_read() {
        let nack = ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address);
        let expectations = [Transaction::write(0x50, vec![0x01, 0x20]).with_error(nack)];
        let mut device = Device::new(Mock::new(&expectations), 0x50);
        let mut buf = [0u8; 4];
        let err = device.read_registers(&[0x01, 0x20], &mut buf).unwrap_err();
        assert!(matches!(
            err,
            Error::NoAcknowledge {
                register: 0x0120,
                ..
            }
        ));
        device.release().done();
    }

    #[test]
    fn missing_device_node() {
        let Err(err) = open("/nonexistent/i2c-9", 0x50) else {
            panic!("opened a device that doesn't exist");
        };
        match err {
            Error::DeviceOpen { path, .. } => assert_eq!(path, Path::new("/nonexistent/i2c-9")),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn probe_reports_ack() {
        let nack = ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address);
        let expectations = [
            Transaction::write(0x50, vec![]).with_error(nack),
            Transaction::write(0x50, vec![]),
        ];
        let mut device = Device::new(Mock::new(&expectations), 0x50);
        assert_eq!(device.address(), 0x50);
        assert!(!device.probe());
        assert!(device.probe());
        device.release().done();
    }
}
