//! Pieces shared by the command-line utilities.

use std::path::PathBuf;
use std::process::ExitCode;

use linux_embedded_hal::I2cdev;
use log::error;

use crate::bus::{self, Device};
use crate::Error;

pub const DEFAULT_I2C_DEVICE: &str = "/dev/i2c-1";

/// Bus selection flags accepted by every utility.
#[derive(Debug, Clone, clap::Args)]
pub struct BusArgs {
    /// I2C character device.
    #[arg(long, default_value = DEFAULT_I2C_DEVICE)]
    pub i2c_device: PathBuf,

    /// Peripheral address in hex, with or without a leading 0x.
    #[arg(long, value_parser = parse_address)]
    pub i2c_address: Option<u8>,
}

impl BusArgs {
    /// Open the bus, using `default_address` unless one was given.
    pub fn open(&self, default_address: u8) -> Result<Device<I2cdev>, Error> {
        bus::open(&self.i2c_device, self.i2c_address.unwrap_or(default_address))
    }
}

/// Parse a 7-bit address written in hex.
pub fn parse_address(s: &str) -> Result<u8, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    match u8::from_str_radix(digits, 16) {
        Ok(address) if address <= 0x7f => Ok(address),
        Ok(address) => Err(format!("0x{address:02x} is not a 7-bit address")),
        Err(e) => Err(format!("{s:?} is not a hex address: {e}")),
    }
}

/// `info` unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

/// Process status for a failed operation.
pub fn exit_code(error: &Error) -> u8 {
    match error {
        Error::DeviceOpen { .. }
        | Error::Range(_)
        | Error::Source { .. }
        | Error::Sink { .. }
        | Error::Unsupported(_) => 1,
        Error::NoAcknowledge { .. }
        | Error::Read { .. }
        | Error::WriteTimeout { .. }
        | Error::InvalidData(_) => 2,
        Error::InvalidDate(_) => 3,
    }
}

/// Report the outcome of a utility's `run` and turn it into a status.
pub fn finish(result: anyhow::Result<ExitCode>) -> ExitCode {
    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            let code = e.downcast_ref::<Error>().map_or(1, exit_code);
            ExitCode::from(code)
        }
    }
}
