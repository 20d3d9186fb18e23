use std::path::PathBuf;

use air_quality_relay::{address::parse_i2c_address, sen5x::SEN5X_ADDRESS};
use clap::Parser;

#[derive(Debug, Parser)]
pub struct Args {
    #[arg(long, env = "SEN5X_I2C_BUS", default_value = "/dev/i2c-1")]
    pub i2c_bus: PathBuf,

    #[arg(long, env = "SEN5X_ADDRESS", default_value_t = SEN5X_ADDRESS, value_parser = parse_i2c_address)]
    pub sensor_address: u8,

    #[arg(long, env = "SAMPLE_INTERVAL_SECS", default_value_t = 2)]
    pub interval_secs: u64,

    #[arg(long, env = "MONITOR_SAMPLES", default_value_t = 1000)]
    pub samples: u64,
}
