mod args;

use std::{process::ExitCode, sync::Arc, time::Duration};

use air_quality_relay::{
    buffer::SharedBuffer,
    notecard::{DEFAULT_REPLY_TIMEOUT, I2cTransport, SerialTransport, SystemSerial, UploadTransport},
    sampling::{MeasurementLoop, SamplingConfig},
    sen5x::SensorChannel,
    uploader::Uploader,
};
use anyhow::{Context as _, Result};
use args::{Args, Transport};
use clap::Parser as _;
use linux_embedded_hal::{Delay, I2cdev};
use tokio::{signal, sync::watch};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "air_quality_relay=info,sen5x_logger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        error!("{e:#}");
        return ExitCode::from(1);
    }

    ExitCode::from(0)
}

async fn run() -> Result<()> {
    let args = Args::parse();

    let buffer = Arc::new(
        SharedBuffer::open(&args.data_file)
            .with_context(|| format!("failed to open data file: {:?}", args.data_file))?,
    );
    let pending = buffer.len()?;
    if pending > 0 {
        info!("{pending} undelivered measurement(s) carried over from {:?}", args.data_file);
    }

    let i2c = I2cdev::new(&args.i2c_bus)
        .with_context(|| format!("failed to open sensor bus: {:?}", args.i2c_bus))?;
    let channel = SensorChannel::new(i2c, Delay, args.sensor_address);

    let transport: Arc<dyn UploadTransport> = match args.transport {
        Transport::Serial => Arc::new(SerialTransport::new(
            args.serial_port.clone(),
            args.autodetect,
            SystemSerial::new(args.baud_rate, DEFAULT_REPLY_TIMEOUT),
        )),
        Transport::I2c => {
            let bus = I2cdev::new(&args.notecard_bus)
                .with_context(|| format!("failed to open Notecard bus: {:?}", args.notecard_bus))?;
            Arc::new(I2cTransport::new(bus, args.notecard_address))
        }
    };

    let sampling = MeasurementLoop::new(
        channel,
        buffer.clone(),
        SamplingConfig {
            interval: Duration::from_secs(args.sample_interval_secs),
            max_samples: args.max_samples,
            timezone: args.timezone,
        },
    );
    let uploader = Uploader::new(
        buffer,
        transport,
        Duration::from_secs(args.upload_interval_secs),
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut sampling = tokio::spawn(sampling.run(stop_rx.clone()));
    let mut uploading = tokio::spawn(uploader.run(stop_rx));

    info!(
        "sampling 0x{:02x} on {:?} every {}s, uploading via {:?} every {}s",
        args.sensor_address,
        args.i2c_bus,
        args.sample_interval_secs,
        args.transport,
        args.upload_interval_secs,
    );

    let mut uploaded = None;
    let sampled = tokio::select! {
        result = &mut sampling => result,
        result = &mut uploading => {
            error!("uploader exited early, stopping measurement loop");
            uploaded = Some(result);
            let _ = stop_tx.send(true);
            sampling.await
        }
        result = signal::ctrl_c() => {
            result.context("failed to listen for interrupt")?;
            info!("interrupt received, finishing current cycle");
            let _ = stop_tx.send(true);
            sampling.await
        }
    };

    let _ = stop_tx.send(true);
    let uploaded = match uploaded {
        Some(result) => result,
        None => uploading.await,
    };
    uploaded
        .context("uploader task panicked")?
        .context("uploader failed")?;

    let summary = sampled.context("measurement task panicked")??;
    info!(
        "done: {} cycle(s), {} recorded, {} failed",
        summary.cycles, summary.recorded, summary.failed
    );

    Ok(())
}
