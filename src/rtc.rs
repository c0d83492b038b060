//! Maxim DS1307 real-time clock with 56 bytes of battery-backed RAM.

use bit_field::BitField;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use embedded_hal::i2c::I2c;
use log::{info, warn};

use crate::bus::Device;
use crate::util::{bcd_to_bin, bin_to_bcd};
use crate::Error;

/// The DS1307 address is fixed in silicon.
pub const DEFAULT_ADDRESS: u8 = 0x68;

const CLOCK_REGISTER: u8 = 0x00;
const RAM_REGISTER: u8 = 0x08;
const CLOCK_LEN: usize = 8;
pub const RAM_SIZE: usize = 56;
pub const REGISTER_FILE_SIZE: usize = CLOCK_LEN + RAM_SIZE;

/// Accepted by [`parse_datetime`].
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Clock and control registers for `datetime`. The oscillator is enabled,
/// the clock runs in 24-hour mode and the square-wave output is off.
pub fn encode_datetime(datetime: &NaiveDateTime) -> [u8; CLOCK_LEN] {
    let mut seconds = bin_to_bcd(datetime.second() as u8);
    // CH: clock halt
    seconds.set_bit(7, false);
    let mut hours = bin_to_bcd(datetime.hour() as u8);
    hours.set_bits(6..8, 0);

    [
        seconds,
        bin_to_bcd(datetime.minute() as u8),
        hours,
        // Day of week is not used.
        0x00,
        bin_to_bcd(datetime.day() as u8),
        bin_to_bcd(datetime.month() as u8),
        bin_to_bcd(datetime.year().rem_euclid(100) as u8),
        0x00,
    ]
}

/// Inverse of [`encode_datetime`]. Years are taken to be in the 2000s.
pub fn decode_datetime(registers: &[u8]) -> Result<NaiveDateTime, Error> {
    let &[seconds, minutes, hours, _, date, month, year, ..] = registers else {
        return Err(Error::InvalidData("short clock register block"));
    };
    let second = bcd_to_bin(seconds.get_bits(0..7));
    let hour = bcd_to_bin(hours.get_bits(0..6));

    NaiveDate::from_ymd_opt(
        2000 + i32::from(bcd_to_bin(year)),
        u32::from(bcd_to_bin(month)),
        u32::from(bcd_to_bin(date)),
    )
    .and_then(|day| {
        day.and_hms_opt(
            u32::from(hour),
            u32::from(bcd_to_bin(minutes)),
            u32::from(second),
        )
    })
    .ok_or(Error::InvalidData("clock registers do not hold a valid date"))
}

/// Parse `YYYY-MM-DD HH:MM:SS`.
pub fn parse_datetime(input: &str) -> Result<NaiveDateTime, Error> {
    NaiveDateTime::parse_from_str(input.trim(), DATETIME_FORMAT)
        .map_err(|_| Error::InvalidDate(input.to_owned()))
}

pub struct Ds1307<I> {
    device: Device<I>,
}

impl<I> Ds1307<I> {
    pub fn new(device: Device<I>) -> Self {
        Self { device }
    }

    pub fn release(self) -> I {
        self.device.release()
    }
}

impl<I: I2c> Ds1307<I> {
    pub fn set_datetime(&mut self, datetime: &NaiveDateTime) -> Result<(), Error> {
        info!("Setting date to {}", datetime.format(DATETIME_FORMAT));
        self.device
            .write_registers(&[CLOCK_REGISTER], &encode_datetime(datetime))
    }

    pub fn datetime(&mut self) -> Result<NaiveDateTime, Error> {
        let registers = self.dump()?;
        decode_datetime(&registers[..CLOCK_LEN])
    }

    /// Store `data` in RAM, padded with nulls. Anything past
    /// [`RAM_SIZE`] bytes is dropped.
    pub fn set_ram(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.len() > RAM_SIZE {
            warn!("Truncating RAM data from {} to {RAM_SIZE} bytes", data.len());
        }
        let mut ram = [0u8; RAM_SIZE];
        let n = data.len().min(RAM_SIZE);
        ram[..n].copy_from_slice(&data[..n]);
        info!("Writing {n} bytes to RAM");
        self.device.write_registers(&[RAM_REGISTER], &ram)
    }

    /// RAM contents up to the first null.
    pub fn ram(&mut self) -> Result<Vec<u8>, Error> {
        let registers = self.dump()?;
        Ok(registers[CLOCK_LEN..]
            .iter()
            .copied()
            .take_while(|&b| b != 0)
            .collect())
    }

    /// The whole register file: clock, control and RAM.
    pub fn dump(&mut self) -> Result<[u8; REGISTER_FILE_SIZE], Error> {
        let mut registers = [0u8; REGISTER_FILE_SIZE];
        self.device
            .read_registers(&[CLOCK_REGISTER], &mut registers)?;
        Ok(registers)
    }
}
