mod args;

use std::process::ExitCode;

use air_quality_relay::sen5x::{
    FrameSource as _, READINGS_TABLE_HEADER, SensorChannel, decode_frame,
};
use anyhow::{Context as _, Result};
use args::Args;
use clap::Parser as _;
use linux_embedded_hal::{Delay, I2cdev};
use tokio::{
    signal, task,
    time::{Duration, sleep},
};
use tracing::warn;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("{e:#}");
        return ExitCode::from(1);
    }

    ExitCode::from(0)
}

async fn run() -> Result<()> {
    let args = Args::parse();

    let i2c = I2cdev::new(&args.i2c_bus)
        .with_context(|| format!("failed to open sensor bus: {:?}", args.i2c_bus))?;
    let mut channel = SensorChannel::new(i2c, Delay, args.sensor_address);

    channel = task::spawn_blocking(move || {
        channel
            .start_periodic_measurement()
            .map(|()| channel)
    })
    .await?
    .context("failed to start sensor")?;

    println!("{READINGS_TABLE_HEADER}");

    for _ in 0..args.samples {
        let (returned, result) = task::spawn_blocking(move || {
            let result = channel.read_measurement();
            (channel, result)
        })
        .await?;
        channel = returned;

        match result {
            Ok(frame) => println!("{}", decode_frame(&frame)),
            Err(e) => warn!("skipping sample: {e}"),
        }

        tokio::select! {
            _ = sleep(Duration::from_secs(args.interval_secs)) => {}
            result = signal::ctrl_c() => {
                result.context("failed to listen for interrupt")?;
                break;
            }
        }
    }

    Ok(())
}
