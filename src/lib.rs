//! Utilities for I2C peripherals on a Raspberry Pi class host.
//!
//! [`eeprom`] holds the paged writer and sequential reader for serial
//! EEPROMs. The other modules drive a DS1307 clock, a pzPowerI2C power
//! controller and a BMP280 sensor over the same [`bus::Device`] handle.

pub mod bmp280;
pub mod bus;
pub mod cli;
pub mod convert;
pub mod eeprom;
mod error;
pub mod pzpower;
pub mod rtc;
pub mod util;

pub use bus::open;
pub use error::{Error, RangeError};
