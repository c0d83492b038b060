//! Bosch BMP280 barometric pressure and temperature sensor.

use embedded_hal::i2c::I2c;
use log::debug;
use serde::Serialize;

use crate::bus::Device;
use crate::util::{le_i16, le_u16};
use crate::Error;

pub const DEFAULT_ADDRESS: u8 = 0x77;

const CALIBRATION_REGISTER: u8 = 0x88;
const CALIBRATION_LEN: usize = 24;
const CTRL_MEAS_REGISTER: u8 = 0xf4;
const CONFIG_REGISTER: u8 = 0xf5;
const DATA_REGISTER: u8 = 0xf7;
const DATA_LEN: usize = 6;

/// Temperature x1, pressure x16, normal mode.
const CTRL_MEAS: u8 = 0x27;
/// 1 s standby, filter off.
const CONFIG: u8 = 0xa0;

/// Factory trimming parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub t1: u16,
    pub t2: i16,
    pub t3: i16,
    pub p1: u16,
    pub p: [i16; 8],
}

impl Calibration {
    pub fn from_bytes(bytes: &[u8; CALIBRATION_LEN]) -> Self {
        let word = |i: usize| le_i16(bytes[2 * i], bytes[2 * i + 1]);
        let mut p = [0i16; 8];
        for (n, value) in p.iter_mut().enumerate() {
            *value = word(4 + n);
        }
        Self {
            t1: le_u16(bytes[0], bytes[1]),
            t2: word(1),
            t3: word(2),
            p1: le_u16(bytes[6], bytes[7]),
            p,
        }
    }

    /// Temperature in °C and the fine temperature shared with the pressure
    /// calculation.
    fn temperature(&self, adc_t: i32) -> (f64, f64) {
        let adc_t = f64::from(adc_t);
        let t1 = f64::from(self.t1);
        let var1 = (adc_t / 16384.0 - t1 / 1024.0) * f64::from(self.t2);
        let var2 = (adc_t / 131072.0 - t1 / 8192.0).powi(2) * f64::from(self.t3);
        let t_fine = var1 + var2;
        (t_fine / 5120.0, t_fine.trunc())
    }

    /// Pressure in Pa.
    fn pressure(&self, adc_p: i32, t_fine: f64) -> f64 {
        let p = |n: usize| f64::from(self.p[n - 2]);

        let mut var1 = t_fine / 2.0 - 64000.0;
        let mut var2 = var1 * var1 * p(6) / 32768.0;
        var2 += var1 * p(5) * 2.0;
        var2 = var2 / 4.0 + p(4) * 65536.0;
        var1 = (p(3) * var1 * var1 / 524288.0 + p(2) * var1) / 524288.0;
        var1 = (1.0 + var1 / 32768.0) * f64::from(self.p1);
        if var1 == 0.0 {
            return 0.0;
        }
        let mut pressure = 1048576.0 - f64::from(adc_p);
        pressure = (pressure - var2 / 4096.0) * 6250.0 / var1;
        let var1 = p(9) * pressure * pressure / 2147483648.0;
        let var2 = pressure * p(8) / 32768.0;
        pressure + (var1 + var2 + p(7)) / 16.0
    }

    /// Compensate a raw data block read from 0xF7.
    pub fn compensate(&self, data: &[u8; DATA_LEN]) -> Reading {
        let raw = |msb: u8, lsb: u8, xlsb: u8| {
            (i32::from(msb) << 12) | (i32::from(lsb) << 4) | (i32::from(xlsb) >> 4)
        };
        let adc_p = raw(data[0], data[1], data[2]);
        let adc_t = raw(data[3], data[4], data[5]);
        debug!("BMP280 raw pressure {adc_p} temperature {adc_t}");

        let (temperature_c, t_fine) = self.temperature(adc_t);
        Reading {
            temperature_c,
            pressure_hpa: self.pressure(adc_p, t_fine) / 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    #[serde(rename = "temperature_C")]
    pub temperature_c: f64,
    #[serde(rename = "pressure_HPA")]
    pub pressure_hpa: f64,
}

pub struct Bmp280<I> {
    device: Device<I>,
    calibration: Calibration,
}

impl<I: I2c> Bmp280<I> {
    /// Read the trimming parameters and start continuous conversion.
    pub fn init(mut device: Device<I>) -> Result<Self, Error> {
        let mut bytes = [0u8; CALIBRATION_LEN];
        device.read_registers(&[CALIBRATION_REGISTER], &mut bytes)?;
        let calibration = Calibration::from_bytes(&bytes);
        debug!("BMP280 calibration {calibration:?}");

        device.write_registers(&[CTRL_MEAS_REGISTER], &[CTRL_MEAS])?;
        device.write_registers(&[CONFIG_REGISTER], &[CONFIG])?;
        Ok(Self {
            device,
            calibration,
        })
    }

    pub fn sample(&mut self) -> Result<Reading, Error> {
        let mut data = [0u8; DATA_LEN];
        self.device.read_registers(&[DATA_REGISTER], &mut data)?;
        Ok(self.calibration.compensate(&data))
    }

    pub fn release(self) -> I {
        self.device.release()
    }
}
