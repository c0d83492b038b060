//! Print BMP280 temperature and pressure as JSON.

use std::process::ExitCode;
use std::time::Duration;

use chrono::{Local, SecondsFormat};
use clap::Parser;
use pi_i2c_utils::bmp280::{self, Bmp280, Reading};
use pi_i2c_utils::cli::{self, BusArgs};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Parser)]
#[command(about = "BMP280 read utility")]
struct Args {
    #[command(flatten)]
    bus: BusArgs,

    /// Name of the object wrapping each sample. Empty prints it bare.
    #[arg(long, default_value = "BMP280")]
    json_enclosing_array: String,

    /// Sample every MS milliseconds instead of once.
    #[arg(long, value_name = "MS")]
    interval_ms: Option<u64>,

    /// Stop after this many samples. Runs forever if omitted.
    #[arg(long, requires = "interval_ms")]
    count: Option<u64>,
}

#[derive(Serialize)]
struct Sample {
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    #[serde(flatten)]
    reading: Reading,
}

fn enclose(name: &str, sample: &Sample) -> serde_json::Result<Value> {
    let value = serde_json::to_value(sample)?;
    if name.is_empty() {
        return Ok(value);
    }
    let mut map = Map::new();
    map.insert(name.to_owned(), value);
    Ok(Value::Object(map))
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    let mut sensor = Bmp280::init(args.bus.open(bmp280::DEFAULT_ADDRESS)?)?;

    let mut taken = 0;
    loop {
        let sample = Sample {
            timestamp: args
                .interval_ms
                .map(|_| Local::now().to_rfc3339_opts(SecondsFormat::Millis, false)),
            reading: sensor.sample()?,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&enclose(&args.json_enclosing_array, &sample)?)?
        );
        taken += 1;

        let Some(interval) = args.interval_ms else {
            break;
        };
        if args.count.is_some_and(|count| taken >= count) {
            break;
        }
        std::thread::sleep(Duration::from_millis(interval));
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    cli::init_logging();
    cli::finish(run(Args::parse()))
}
