//! pzPowerI2C power-management microcontroller.
//!
//! The controller exposes 64 sixteen-bit registers, sent high byte first.
//! A bulk read starts at register 0; a write is the register index followed
//! by the big-endian value.

use std::str::FromStr;
use std::time::Duration;

use bit_field::BitField;
use embedded_hal::i2c::I2c;
use log::info;
use serde::Serialize;

use crate::bus::Device;
use crate::convert::{PZPOWER_BOARD, PZPOWER_INPUT};
use crate::util::be_u16;
use crate::Error;

pub const DEFAULT_ADDRESS: u8 = 0x1a;
pub const REGISTER_COUNT: usize = 64;

/// Written to a threshold or delay register to turn that feature off.
pub const DISABLED: u16 = 65535;

/// Time the controller needs to commit parameters to its own EEPROM.
const PARAM_SETTLE: Duration = Duration::from_millis(100);

/// Accepted range for voltage thresholds.
pub const THRESHOLD_VOLTS: std::ops::RangeInclusive<f64> = 8.0..=40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Register {
    VoltageInputNow = 0,
    VoltageInputAvg = 1,
    TemperatureBoardNow = 2,
    TemperatureBoardAvg = 3,
    SwitchMagnetNow = 4,
    /// Any write clears the latch.
    SwitchMagnetLatch = 5,
    SequenceNumber = 6,
    TimeIntervalMilliseconds = 7,
    TimeUptimeMinutes = 8,
    TimeWatchdogReadSeconds = 9,
    /// Any write restarts the write watchdog.
    TimeWatchdogWriteSeconds = 10,
    CommandOff = 11,
    PowerOffFlags = 12,
    DefaultParamsWritten = 13,

    SerialPrefix = 32,
    SerialNumber = 33,
    HardwareModel = 34,
    HardwareVersion = 35,
    SoftwareModel = 36,
    SoftwareVersion = 37,
    SoftwareYear = 38,
    SoftwareMonth = 39,
    SoftwareDay = 40,
    ParamWrite = 41,
    TicksAdc = 42,
    StartupPowerOnDelay = 43,
    CommandOffHoldTime = 44,
    ReadWatchdogOffThreshold = 45,
    ReadWatchdogOffHoldTime = 46,
    WriteWatchdogOffThreshold = 47,
    WriteWatchdogOffHoldTime = 48,
    LvdDisconnectVoltage = 49,
    LvdDisconnectDelay = 50,
    LvdReconnectVoltage = 51,
    HvdDisconnectVoltage = 52,
    HvdDisconnectDelay = 53,
    HvdReconnectVoltage = 54,
}

/// Raw register file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registers(pub [u16; REGISTER_COUNT]);

impl Registers {
    pub fn from_be_bytes(bytes: &[u8; REGISTER_COUNT * 2]) -> Self {
        let mut words = [0u16; REGISTER_COUNT];
        for (word, pair) in words.iter_mut().zip(bytes.chunks_exact(2)) {
            *word = be_u16(pair[0], pair[1]);
        }
        Self(words)
    }

    pub fn get(&self, register: Register) -> u16 {
        self.0[register as usize]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerOffFlags {
    pub value: u16,
    pub command: bool,
    pub read_watchdog: bool,
    pub write_watchdog: bool,
    pub lvd: bool,
    pub hvd: bool,
    pub ltd: bool,
    pub htd: bool,
}

impl From<u16> for PowerOffFlags {
    fn from(value: u16) -> Self {
        Self {
            value,
            command: value.get_bit(0),
            read_watchdog: value.get_bit(1),
            write_watchdog: value.get_bit(2),
            lvd: value.get_bit(3),
            hvd: value.get_bit(4),
            ltd: value.get_bit(5),
            htd: value.get_bit(6),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Data {
    pub voltage_in_now: f64,
    pub voltage_in_average: f64,
    pub temperature_pcb_now: f64,
    pub temperature_pcb_average: f64,
    pub magnetic_switch_state: bool,
    pub magnetic_switch_latch: bool,
    pub sequence_number: u16,
    pub interval_milliseconds: u16,
    pub uptime_minutes: u16,
    pub read_watchdog_seconds: u16,
    pub write_watchdog_seconds: u16,
    // Key spelling is what existing consumers of the JSON expect.
    #[serde(rename = "default_paramaters_written")]
    pub default_parameters_written: u16,
    pub command_off_seconds: u16,
    pub power_off_flags: PowerOffFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Configuration {
    pub serial_number: String,
    pub hardware_model: u16,
    pub hardware_version: u16,
    pub software_model: u16,
    pub software_version: u16,
    pub software_date: String,
    pub factory_unlocked: u16,
    pub adc_sample_ticks: u16,
    pub startup_power_on_delay_seconds: u16,
    pub command_off_hold_time_seconds: u16,
    pub read_watchdog_off_threshold_seconds: u16,
    pub read_watchdog_off_hold_time_seconds: u16,
    pub write_watchdog_off_threshold_seconds: u16,
    pub write_watchdog_off_hold_time_seconds: u16,
    #[serde(rename = "lvd-off-threshold_volts")]
    pub lvd_off_threshold_volts: f64,
    #[serde(rename = "lvd-off-delay_seconds")]
    pub lvd_off_delay_seconds: u16,
    #[serde(rename = "lvd-on-threshold_volts")]
    pub lvd_on_threshold_volts: f64,
    #[serde(rename = "hvd-off-threshold_volts")]
    pub hvd_off_threshold_volts: f64,
    #[serde(rename = "hvd-off-delay_seconds")]
    pub hvd_off_delay_seconds: u16,
    #[serde(rename = "hvd-on-threshold_volts")]
    pub hvd_on_threshold_volts: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    pub data: Data,
    pub configuration: Configuration,
}

impl From<&Registers> for Status {
    fn from(regs: &Registers) -> Self {
        use Register as R;

        let volts = |r: Register| PZPOWER_INPUT.to_volts(regs.get(r));
        let celsius = |r: Register| PZPOWER_BOARD.celsius(f64::from(regs.get(r)));
        let prefix = char::from_u32(u32::from(regs.get(R::SerialPrefix))).unwrap_or('?');

        let data = Data {
            voltage_in_now: volts(R::VoltageInputNow),
            voltage_in_average: volts(R::VoltageInputAvg),
            temperature_pcb_now: celsius(R::TemperatureBoardNow),
            temperature_pcb_average: celsius(R::TemperatureBoardAvg),
            magnetic_switch_state: regs.get(R::SwitchMagnetNow) != 0,
            magnetic_switch_latch: regs.get(R::SwitchMagnetLatch) != 0,
            sequence_number: regs.get(R::SequenceNumber),
            interval_milliseconds: regs.get(R::TimeIntervalMilliseconds),
            uptime_minutes: regs.get(R::TimeUptimeMinutes),
            read_watchdog_seconds: regs.get(R::TimeWatchdogReadSeconds),
            write_watchdog_seconds: regs.get(R::TimeWatchdogWriteSeconds),
            default_parameters_written: regs.get(R::DefaultParamsWritten),
            command_off_seconds: regs.get(R::CommandOff),
            power_off_flags: regs.get(R::PowerOffFlags).into(),
        };

        let configuration = Configuration {
            serial_number: format!("{prefix}{}", regs.get(R::SerialNumber)),
            hardware_model: regs.get(R::HardwareModel),
            hardware_version: regs.get(R::HardwareVersion),
            software_model: regs.get(R::SoftwareModel),
            software_version: regs.get(R::SoftwareVersion),
            software_date: format!(
                "20{:02}-{:02}-{:02}",
                regs.get(R::SoftwareYear),
                regs.get(R::SoftwareMonth),
                regs.get(R::SoftwareDay)
            ),
            factory_unlocked: regs.get(R::ParamWrite),
            adc_sample_ticks: regs.get(R::TicksAdc),
            startup_power_on_delay_seconds: regs.get(R::StartupPowerOnDelay),
            command_off_hold_time_seconds: regs.get(R::CommandOffHoldTime),
            read_watchdog_off_threshold_seconds: regs.get(R::ReadWatchdogOffThreshold),
            read_watchdog_off_hold_time_seconds: regs.get(R::ReadWatchdogOffHoldTime),
            write_watchdog_off_threshold_seconds: regs.get(R::WriteWatchdogOffThreshold),
            write_watchdog_off_hold_time_seconds: regs.get(R::WriteWatchdogOffHoldTime),
            lvd_off_threshold_volts: volts(R::LvdDisconnectVoltage),
            lvd_off_delay_seconds: regs.get(R::LvdDisconnectDelay),
            lvd_on_threshold_volts: volts(R::LvdReconnectVoltage),
            hvd_off_threshold_volts: volts(R::HvdDisconnectVoltage),
            hvd_off_delay_seconds: regs.get(R::HvdDisconnectDelay),
            hvd_on_threshold_volts: volts(R::HvdReconnectVoltage),
        };

        Status {
            data,
            configuration,
        }
    }
}

/// Magnetic switch reading combined with its latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    Open,
    OpenLatched,
    ClosedLatched,
    /// Closed without the latch set. The firmware shouldn't report this.
    Inconsistent,
}

impl From<&Data> for SwitchState {
    fn from(data: &Data) -> Self {
        match (data.magnetic_switch_state, data.magnetic_switch_latch) {
            (false, false) => SwitchState::Open,
            (false, true) => SwitchState::OpenLatched,
            (true, true) => SwitchState::ClosedLatched,
            (true, false) => SwitchState::Inconsistent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamCommand {
    Save,
    Defaults,
    ResetCpu,
    Raw(u16),
}

impl ParamCommand {
    fn value(self) -> u16 {
        match self {
            ParamCommand::Save => 1,
            ParamCommand::Defaults => 2,
            ParamCommand::ResetCpu => 65535,
            ParamCommand::Raw(value) => value,
        }
    }
}

impl FromStr for ParamCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "save" => Self::Save,
            "defaults" => Self::Defaults,
            "reset_cpu" => Self::ResetCpu,
            other => Self::Raw(other.parse().map_err(|_| {
                format!("expected save, defaults, reset_cpu or 0 to 65535, got {other:?}")
            })?),
        })
    }
}

/// Board serial number: an upper-case letter followed by a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialNumber {
    pub prefix: char,
    pub number: u16,
}

impl FromStr for SerialNumber {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let prefix = chars
            .next()
            .filter(char::is_ascii_uppercase)
            .ok_or_else(|| format!("serial number {s:?} must start with A to Z"))?;
        let number = chars
            .as_str()
            .parse()
            .map_err(|_| format!("serial number {s:?} must end in 0 to 65535"))?;
        Ok(Self { prefix, number })
    }
}

/// Parse a voltage threshold within [`THRESHOLD_VOLTS`].
pub fn parse_threshold_volts(s: &str) -> Result<f64, String> {
    let volts: f64 = s.parse().map_err(|_| format!("{s:?} is not a number"))?;
    if THRESHOLD_VOLTS.contains(&volts) {
        Ok(volts)
    } else {
        Err(format!(
            "{volts} is outside of {} to {} volts",
            THRESHOLD_VOLTS.start(),
            THRESHOLD_VOLTS.end()
        ))
    }
}

/// A change to the controller's state or configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Setting {
    ResetSwitchLatch,
    ResetWriteWatchdog,
    CommandOff(u16),
    CommandOffHoldTime(u16),
    ReadWatchdogOffThreshold(u16),
    ReadWatchdogOffHoldTime(u16),
    WriteWatchdogOffThreshold(u16),
    WriteWatchdogOffHoldTime(u16),
    LvdOffThreshold(f64),
    LvdOffDelay(u16),
    LvdOnThreshold(f64),
    HvdOffThreshold(f64),
    HvdOffDelay(u16),
    HvdOnThreshold(f64),
    Param(ParamCommand),
    Serial(SerialNumber),
    AdcTicks(u16),
    StartupPowerOnDelay(u16),
}

impl Setting {
    /// Register writes, in order.
    fn writes(&self) -> Vec<(Register, u16)> {
        use Register as R;

        let counts = |volts: f64| PZPOWER_INPUT.to_counts(volts);
        match *self {
            Setting::ResetSwitchLatch => vec![(R::SwitchMagnetLatch, 0)],
            Setting::ResetWriteWatchdog => vec![(R::TimeWatchdogWriteSeconds, 0)],
            Setting::CommandOff(s) => vec![(R::CommandOff, s)],
            Setting::CommandOffHoldTime(s) => vec![(R::CommandOffHoldTime, s)],
            Setting::ReadWatchdogOffThreshold(s) => vec![(R::ReadWatchdogOffThreshold, s)],
            Setting::ReadWatchdogOffHoldTime(s) => vec![(R::ReadWatchdogOffHoldTime, s)],
            Setting::WriteWatchdogOffThreshold(s) => vec![(R::WriteWatchdogOffThreshold, s)],
            Setting::WriteWatchdogOffHoldTime(s) => vec![(R::WriteWatchdogOffHoldTime, s)],
            Setting::LvdOffThreshold(v) => vec![(R::LvdDisconnectVoltage, counts(v))],
            Setting::LvdOffDelay(s) => vec![(R::LvdDisconnectDelay, s)],
            Setting::LvdOnThreshold(v) => vec![(R::LvdReconnectVoltage, counts(v))],
            Setting::HvdOffThreshold(v) => vec![(R::HvdDisconnectVoltage, counts(v))],
            Setting::HvdOffDelay(s) => vec![(R::HvdDisconnectDelay, s)],
            Setting::HvdOnThreshold(v) => vec![(R::HvdReconnectVoltage, counts(v))],
            Setting::Param(command) => vec![(R::ParamWrite, command.value())],
            Setting::Serial(serial) => vec![
                (R::SerialPrefix, serial.prefix as u16),
                (R::SerialNumber, serial.number),
            ],
            Setting::AdcTicks(ticks) => vec![(R::TicksAdc, ticks)],
            Setting::StartupPowerOnDelay(s) => vec![(R::StartupPowerOnDelay, s)],
        }
    }
}

pub struct PzPower<I> {
    device: Device<I>,
}

impl<I> PzPower<I> {
    pub fn new(device: Device<I>) -> Self {
        Self { device }
    }

    pub fn release(self) -> I {
        self.device.release()
    }
}

impl<I: I2c> PzPower<I> {
    pub fn registers(&mut self) -> Result<Registers, Error> {
        let mut bytes = [0u8; REGISTER_COUNT * 2];
        self.device.read_registers(&[0x00], &mut bytes)?;
        Ok(Registers::from_be_bytes(&bytes))
    }

    pub fn status(&mut self) -> Result<Status, Error> {
        self.registers().map(|regs| Status::from(&regs))
    }

    pub fn write_word(&mut self, register: Register, value: u16) -> Result<(), Error> {
        info!("Writing {value} to register {register:?}");
        self.device
            .write_registers(&[register as u8], &value.to_be_bytes())
    }

    pub fn apply(&mut self, setting: &Setting) -> Result<(), Error> {
        for (register, value) in setting.writes() {
            self.write_word(register, value)?;
        }
        if matches!(setting, Setting::Param(_)) {
            std::thread::sleep(PARAM_SETTLE);
        }
        Ok(())
    }
}
