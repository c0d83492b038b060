use std::time::Duration;

use embedded_hal::i2c::I2c;
use log::debug;

use crate::{bus::Device, Error};

/// Number of acknowledgement probes issued after a page write.
pub const DEFAULT_POLL_TRIES: u32 = 50;

/// Waits for an EEPROM to finish its internal write cycle.
///
/// While committing a page the device NACKs its own address, so a
/// zero-length write fails until the cycle completes.
#[derive(Debug, Clone, Copy, bon::Builder)]
pub struct AckPoller {
    #[builder(default = DEFAULT_POLL_TRIES)]
    tries: u32,
    /// Pause between probes. `None` spins back to back.
    delay: Option<Duration>,
}

impl Default for AckPoller {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl AckPoller {
    pub fn tries(&self) -> u32 {
        self.tries
    }

    /// Probe until acknowledged. `address` is the memory address that was
    /// just written and is only used for error reporting.
    pub fn wait<I: I2c>(&self, device: &mut Device<I>, address: u16) -> Result<(), Error> {
        for attempt in 1..=self.tries {
            if device.probe() {
                debug!(
                    "0x{:02x} acknowledged after {attempt} probe(s)",
                    device.address()
                );
                return Ok(());
            }
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
        }
        Err(Error::WriteTimeout {
            address,
            attempts: self.tries,
        })
    }
}
