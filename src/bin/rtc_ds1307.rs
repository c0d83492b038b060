//! Set and read a DS1307 real-time clock and its battery-backed RAM.

use std::io::Write;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use log::info;
use pi_i2c_utils::cli::{self, BusArgs};
use pi_i2c_utils::rtc::{self, Ds1307, DATETIME_FORMAT};

#[derive(Debug, Parser)]
#[command(about = "DS1307 real-time clock utility")]
struct Args {
    #[command(flatten)]
    bus: BusArgs,

    /// Print the clock as YYYY-MM-DD HH:MM:SS.
    #[arg(long)]
    read: bool,

    /// Print RAM up to the first null.
    #[arg(long)]
    ram_read: bool,

    /// Set the clock from "YYYY-MM-DD HH:MM:SS".
    #[arg(long, value_name = "DATETIME")]
    set: Option<String>,

    /// Store up to 56 bytes in RAM, padded with nulls.
    #[arg(long, value_name = "DATA")]
    ram_set: Option<String>,

    /// Write the raw 64-byte register file to stdout.
    #[arg(long)]
    dump: bool,
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    // Parse before touching the bus so a bad date changes nothing.
    let datetime = args.set.as_deref().map(rtc::parse_datetime).transpose()?;

    let mut clock = Ds1307::new(args.bus.open(rtc::DEFAULT_ADDRESS)?);

    if let Some(datetime) = datetime {
        clock.set_datetime(&datetime)?;
    }
    if let Some(data) = &args.ram_set {
        clock.set_ram(data.as_bytes())?;
    }

    let mut stdout = std::io::stdout().lock();
    if args.read {
        info!("Date read from DS1307");
        writeln!(stdout, "{}", clock.datetime()?.format(DATETIME_FORMAT))?;
    } else if args.ram_read {
        info!("RAM read from DS1307");
        stdout.write_all(&clock.ram()?)?;
    } else if args.dump {
        info!("Dump from DS1307");
        stdout.write_all(&clock.dump()?)?;
    }
    stdout.flush().context("writing to stdout")?;
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    cli::init_logging();
    cli::finish(run(Args::parse()))
}
