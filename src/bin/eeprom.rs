//! Read, write and dump serial EEPROMs.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::info;
use pi_i2c_utils::cli::{self, BusArgs};
use pi_i2c_utils::eeprom::{AckPoller, Eeprom, Model, TransferRequest, DEFAULT_POLL_TRIES};
use pi_i2c_utils::Error;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Part {
    #[value(name = "24aa64", alias = "24lc64")]
    Mc24aa64,
    #[value(name = "24aa02e48")]
    Mc24aa02e48,
}

impl Part {
    fn model(self) -> Model {
        match self {
            Part::Mc24aa64 => Model::MC_24AA64,
            Part::Mc24aa02e48 => Model::MC_24AA02E48,
        }
    }
}

#[derive(Debug, Parser)]
#[command(about = "Read and write I2C serial EEPROMs")]
struct Args {
    #[command(flatten)]
    bus: BusArgs,

    #[arg(long, value_enum, default_value = "24aa64")]
    model: Part,

    /// Write the contents of FILE to the EEPROM.
    #[arg(long, value_name = "FILE")]
    write: Option<PathBuf>,

    /// Read from the EEPROM into FILE.
    #[arg(long, value_name = "FILE")]
    read: Option<PathBuf>,

    /// Copy the whole EEPROM into FILE.
    #[arg(long, value_name = "FILE")]
    dump: Option<PathBuf>,

    /// Treat data as a null-terminated string.
    #[arg(long)]
    string: bool,

    #[arg(long, default_value_t = 0)]
    start_address: usize,

    /// Byte budget. Defaults to everything from the start address on.
    #[arg(long)]
    n_bytes: Option<usize>,

    /// Print the capacity in bytes.
    #[arg(long)]
    capacity: bool,

    /// Print the factory-programmed MAC address.
    #[arg(long)]
    read_mac: bool,

    /// Acknowledgement probes after each page write.
    #[arg(
        long,
        default_value_t = DEFAULT_POLL_TRIES,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    poll_tries: u32,

    /// Pause between acknowledgement probes.
    #[arg(long)]
    poll_delay_us: Option<u64>,
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    let model = args.model.model();
    if args.capacity {
        println!("{}", model.capacity);
    }
    if args.write.is_none() && args.read.is_none() && args.dump.is_none() && !args.read_mac {
        return Ok(ExitCode::SUCCESS);
    }

    let request = TransferRequest::builder()
        .start_address(args.start_address)
        // A zero budget would hide an out-of-range start address.
        .max_bytes(
            args.n_bytes
                .unwrap_or(model.capacity.saturating_sub(args.start_address).max(1)),
        )
        .sentinel(args.string)
        .build();
    // Fail on bad ranges before opening anything.
    if args.write.is_some() || args.read.is_some() {
        request.check(&model).map_err(Error::from)?;
    }

    let poller = AckPoller::builder()
        .tries(args.poll_tries)
        .maybe_delay(args.poll_delay_us.map(Duration::from_micros))
        .build();
    let device = args.bus.open(model.default_address)?;
    let mut eeprom = Eeprom::new(device, model).with_poller(poller);
    info!(
        "{} EEPROM, {} bytes in {} byte pages, up to {} acknowledgement probes per page",
        eeprom.model().name,
        eeprom.model().capacity,
        eeprom.model().page_size,
        poller.tries()
    );

    if let Some(path) = &args.write {
        let source = File::open(path)
            .with_context(|| format!("opening {} for reading", path.display()))?;
        let result = eeprom.write(&request, BufReader::new(source))?;
        info!(
            "Wrote {} bytes from {}{}",
            result.bytes_transferred,
            path.display(),
            if result.truncated { " (truncated)" } else { "" }
        );
    }
    if let Some(path) = &args.read {
        let sink = File::create(path)
            .with_context(|| format!("opening {} for writing", path.display()))?;
        let result = eeprom.read(&request, BufWriter::new(sink))?;
        info!("Read {} bytes into {}", result.bytes_transferred, path.display());
    }
    if let Some(path) = &args.dump {
        let sink = File::create(path)
            .with_context(|| format!("opening {} for writing", path.display()))?;
        let result = eeprom.dump(BufWriter::new(sink))?;
        info!("Dumped {} bytes into {}", result.bytes_transferred, path.display());
    }
    if args.read_mac {
        println!("{}", eeprom.read_mac()?);
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    cli::init_logging();
    cli::finish(run(Args::parse()))
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Args;

    #[test]
    fn poll_tries_must_be_positive() {
        assert!(Args::try_parse_from(["eeprom", "--poll-tries", "0"]).is_err());
        let args = Args::try_parse_from(["eeprom", "--poll-tries", "3"]).unwrap();
        assert_eq!(args.poll_tries, 3);
        let args = Args::try_parse_from(["eeprom"]).unwrap();
        assert_eq!(args.poll_tries, super::DEFAULT_POLL_TRIES);
    }
}
