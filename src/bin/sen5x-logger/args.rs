use std::path::PathBuf;

use air_quality_relay::{address::parse_i2c_address, notecard::NOTECARD_ADDRESS, sen5x::SEN5X_ADDRESS};
use chrono_tz::Tz;
use clap::{ArgAction, Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    Serial,
    I2c,
}

#[derive(Debug, Parser)]
pub struct Args {
    #[arg(long, env = "SEN5X_I2C_BUS", default_value = "/dev/i2c-1")]
    pub i2c_bus: PathBuf,

    #[arg(long, env = "SEN5X_ADDRESS", default_value_t = SEN5X_ADDRESS, value_parser = parse_i2c_address)]
    pub sensor_address: u8,

    #[arg(long, env = "SAMPLE_INTERVAL_SECS", default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub sample_interval_secs: u64,

    /// Stop after this many sampling cycles; runs until interrupted when unset.
    #[arg(long, env = "MAX_SAMPLES")]
    pub max_samples: Option<u64>,

    #[arg(long, env = "UPLOAD_INTERVAL_SECS", default_value_t = 600, value_parser = clap::value_parser!(u64).range(1..))]
    pub upload_interval_secs: u64,

    #[arg(long, env = "NOTECARD_TRANSPORT", value_enum, default_value_t = Transport::Serial)]
    pub transport: Transport,

    #[arg(long, env = "NOTECARD_SERIAL_PORT", default_value = "/dev/ttyACM0")]
    pub serial_port: String,

    #[arg(long, env = "NOTECARD_BAUD_RATE", default_value_t = 9600)]
    pub baud_rate: u32,

    #[arg(long, env = "NOTECARD_AUTODETECT", default_value_t = true, action = ArgAction::Set)]
    pub autodetect: bool,

    #[arg(long, env = "NOTECARD_I2C_BUS", default_value = "/dev/i2c-1")]
    pub notecard_bus: PathBuf,

    #[arg(long, env = "NOTECARD_ADDRESS", default_value_t = NOTECARD_ADDRESS, value_parser = parse_i2c_address)]
    pub notecard_address: u8,

    #[arg(long, env = "DATA_FILE", default_value = "sensor_data.json")]
    pub data_file: PathBuf,

    #[arg(long, env = "TZ", default_value = "UTC")]
    pub timezone: Tz,
}
