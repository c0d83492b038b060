//! Read and configure a pzPowerI2C power controller.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::{debug, info};
use pi_i2c_utils::cli::{self, BusArgs};
use pi_i2c_utils::pzpower::{
    self, ParamCommand, PzPower, SerialNumber, Setting, SwitchState, DISABLED,
};

#[derive(Debug, Parser)]
#[command(about = "pzPowerI2C power controller utility")]
struct Args {
    #[command(flatten)]
    bus: BusArgs,

    /// Print status as JSON. This is the default unless only --read-switch
    /// is given.
    #[arg(long)]
    read: bool,

    /// Keep printing status every MS milliseconds.
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u16).range(0..=65534))]
    read_loop: Option<u16>,

    /// Exit with 128 (open), 129 (open, latched) or 130 (closed, latched).
    #[arg(long)]
    read_switch: bool,

    #[arg(long)]
    reset_switch_latch: bool,

    #[arg(long)]
    reset_write_watchdog: bool,

    /// Seconds until the controller switches the load off.
    #[arg(long, value_parser = clap::value_parser!(u16).range(0..=65534))]
    set_command_off: Option<u16>,

    #[arg(long, value_parser = seconds)]
    set_command_off_hold_time: Option<u16>,

    #[arg(long)]
    disable_read_watchdog: bool,

    #[arg(long, value_parser = seconds)]
    set_read_watchdog_off_threshold: Option<u16>,

    #[arg(long, value_parser = seconds)]
    set_read_watchdog_off_hold_time: Option<u16>,

    #[arg(long)]
    disable_write_watchdog: bool,

    #[arg(long, value_parser = seconds)]
    set_write_watchdog_off_threshold: Option<u16>,

    #[arg(long, value_parser = seconds)]
    set_write_watchdog_off_hold_time: Option<u16>,

    #[arg(long)]
    disable_lvd: bool,

    #[arg(long, value_name = "VOLTS", value_parser = pzpower::parse_threshold_volts)]
    set_lvd_off_threshold: Option<f64>,

    #[arg(long, value_parser = seconds)]
    set_lvd_off_delay: Option<u16>,

    #[arg(long, value_name = "VOLTS", value_parser = pzpower::parse_threshold_volts)]
    set_lvd_on_threshold: Option<f64>,

    #[arg(long)]
    disable_hvd: bool,

    #[arg(long, value_name = "VOLTS", value_parser = pzpower::parse_threshold_volts)]
    set_hvd_off_threshold: Option<f64>,

    #[arg(long, value_parser = seconds)]
    set_hvd_off_delay: Option<u16>,

    #[arg(long, value_name = "VOLTS", value_parser = pzpower::parse_threshold_volts)]
    set_hvd_on_threshold: Option<f64>,

    /// save, defaults, reset_cpu or a raw value for the parameter register.
    #[arg(long)]
    param: Option<ParamCommand>,

    /// Letter A to Z followed by a number, e.g. P1234.
    #[arg(long)]
    set_serial: Option<SerialNumber>,

    #[arg(long, value_parser = seconds)]
    set_adc_ticks: Option<u16>,

    #[arg(long, value_parser = clap::value_parser!(u16).range(1..=65535))]
    set_startup_power_on_delay: Option<u16>,
}

/// 1 to 65534; 65535 is reserved for "disabled".
fn seconds(s: &str) -> Result<u16, String> {
    match s.parse::<u16>() {
        Ok(n) if (1..DISABLED).contains(&n) => Ok(n),
        _ => Err(format!("{s:?} is not in 1 to {}", DISABLED - 1)),
    }
}

impl Args {
    /// Requested changes, in the order they are written.
    fn settings(&self) -> Vec<Setting> {
        let disable = |flag: bool, value: Option<u16>| {
            if flag {
                Some(DISABLED)
            } else {
                value
            }
        };

        let mut settings = Vec::new();
        let mut push = |setting: Option<Setting>| settings.extend(setting);
        push(self.reset_switch_latch.then_some(Setting::ResetSwitchLatch));
        push(self.reset_write_watchdog.then_some(Setting::ResetWriteWatchdog));
        push(self.set_command_off.map(Setting::CommandOff));
        push(self.set_command_off_hold_time.map(Setting::CommandOffHoldTime));
        push(
            disable(self.disable_read_watchdog, self.set_read_watchdog_off_threshold)
                .map(Setting::ReadWatchdogOffThreshold),
        );
        push(self.set_read_watchdog_off_hold_time.map(Setting::ReadWatchdogOffHoldTime));
        push(
            disable(self.disable_write_watchdog, self.set_write_watchdog_off_threshold)
                .map(Setting::WriteWatchdogOffThreshold),
        );
        push(self.set_write_watchdog_off_hold_time.map(Setting::WriteWatchdogOffHoldTime));
        push(disable(self.disable_lvd, self.set_lvd_off_delay).map(Setting::LvdOffDelay));
        push(self.set_lvd_off_threshold.map(Setting::LvdOffThreshold));
        push(self.set_lvd_on_threshold.map(Setting::LvdOnThreshold));
        push(disable(self.disable_hvd, self.set_hvd_off_delay).map(Setting::HvdOffDelay));
        push(self.set_hvd_off_threshold.map(Setting::HvdOffThreshold));
        push(self.set_hvd_on_threshold.map(Setting::HvdOnThreshold));
        push(self.param.map(Setting::Param));
        push(self.set_serial.map(Setting::Serial));
        push(self.set_adc_ticks.map(Setting::AdcTicks));
        push(self.set_startup_power_on_delay.map(Setting::StartupPowerOnDelay));
        settings
    }
}

fn switch_exit_code(state: SwitchState) -> ExitCode {
    ExitCode::from(match state {
        SwitchState::Open => 128,
        SwitchState::OpenLatched => 129,
        SwitchState::ClosedLatched => 130,
        SwitchState::Inconsistent => 127,
    })
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    let mut power = PzPower::new(args.bus.open(pzpower::DEFAULT_ADDRESS)?);

    // The switch is reported as it was before any of the writes below.
    let mut status = power.status()?;
    let mut exit = ExitCode::SUCCESS;
    if args.read_switch {
        let state = SwitchState::from(&status.data);
        info!("Magnetic switch is {state:?}");
        exit = switch_exit_code(state);
    }

    let settings = args.settings();
    for setting in &settings {
        power.apply(setting)?;
    }
    if !settings.is_empty() {
        status = power.status()?;
    }

    let print = args.read
        || args.read_loop.is_some()
        || !settings.is_empty()
        || !args.read_switch;
    if !print {
        return Ok(exit);
    }
    loop {
        println!("{}", serde_json::to_string_pretty(&status)?);
        let Some(interval) = args.read_loop else {
            break;
        };
        debug!("Next read in {interval} ms");
        std::thread::sleep(Duration::from_millis(u64::from(interval)));
        status = power.status()?;
    }
    Ok(exit)
}

fn main() -> ExitCode {
    cli::init_logging();
    cli::finish(run(Args::parse()))
}
