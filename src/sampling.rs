use std::{sync::Arc, time::Duration};

use anyhow::{Context as _, Result, anyhow, ensure};
use chrono::Utc;
use chrono_tz::Tz;
use tokio::{
    sync::watch,
    task,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

use crate::{
    buffer::SharedBuffer,
    sen5x::{FrameSource, Measurement, SensorError, decode_frame},
};

#[derive(Debug, Clone)]
pub struct SamplingConfig {
    pub interval: Duration,

    /// `None` samples until stopped.
    pub max_samples: Option<u64>,

    pub timezone: Tz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Warming,
    Sampling,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    /// Ticks spent on the sensor, successful or not. Failed starts count.
    pub cycles: u64,
    pub recorded: u64,
    pub failed: u64,
}

/// Drives a [`FrameSource`] on a fixed cadence and records every decoded
/// measurement into the shared buffer.
#[derive(Debug)]
pub struct MeasurementLoop<S> {
    source: Option<S>,
    buffer: Arc<SharedBuffer>,
    config: SamplingConfig,
    state: LoopState,
    summary: LoopSummary,
}

impl<S> MeasurementLoop<S>
where
    S: FrameSource + Send + 'static,
{
    pub fn new(source: S, buffer: Arc<SharedBuffer>, config: SamplingConfig) -> Self {
        Self {
            source: Some(source),
            buffer,
            config,
            state: LoopState::Warming,
            summary: LoopSummary::default(),
        }
    }

    /// Runs until the sample cap is reached or `stop` flips to true. A cycle
    /// that has started always finishes its disk write before the stop is
    /// honoured. Bus errors skip the cycle; snapshot write errors end the loop.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> Result<LoopSummary> {
        ensure!(
            !self.config.interval.is_zero(),
            "sample interval must be greater than zero"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.is_done() || *stop.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                    continue;
                }
            }

            match self.state {
                LoopState::Warming => self.warm_up().await?,
                LoopState::Sampling => self.sample().await?,
            }
        }

        info!(
            cycles = self.summary.cycles,
            recorded = self.summary.recorded,
            failed = self.summary.failed,
            "measurement loop stopped"
        );

        Ok(self.summary)
    }

    fn is_done(&self) -> bool {
        self.config
            .max_samples
            .is_some_and(|max| self.summary.cycles >= max)
    }

    async fn warm_up(&mut self) -> Result<()> {
        match self.with_source(|s| s.start_periodic_measurement()).await? {
            Ok(()) => {
                info!("sensor started, sampling every {:?}", self.config.interval);
                self.state = LoopState::Sampling;
            }
            Err(e) => {
                // failed starts count toward `max_samples`
                self.summary.cycles += 1;
                self.summary.failed += 1;
                warn!(cycle = self.summary.cycles, "failed to start sensor, retrying next tick: {e}");
            }
        }
        Ok(())
    }

    async fn sample(&mut self) -> Result<()> {
        self.summary.cycles += 1;

        let frame = match self.with_source(|s| s.read_measurement()).await? {
            Ok(frame) => frame,
            Err(e) => {
                self.summary.failed += 1;
                warn!(cycle = self.summary.cycles, "skipping sample: {e}");
                return Ok(());
            }
        };

        let readings = decode_frame(&frame);
        let measurement = Measurement::new(Utc::now().with_timezone(&self.config.timezone), readings);
        debug!(?measurement, "decoded frame");

        let buffer = self.buffer.clone();
        task::spawn_blocking(move || buffer.append(measurement))
            .await
            .context("snapshot writer panicked")?
            .context("failed to persist measurement")?;

        self.summary.recorded += 1;
        info!(cycle = self.summary.cycles, "{readings}");

        Ok(())
    }

    /// Runs blocking sensor I/O off the async workers, handing the source back
    /// afterwards.
    async fn with_source<T, F>(&mut self, f: F) -> Result<Result<T, SensorError>>
    where
        T: Send + 'static,
        F: FnOnce(&mut S) -> Result<T, SensorError> + Send + 'static,
    {
        let mut source = self
            .source
            .take()
            .ok_or_else(|| anyhow!("sensor source lost by an earlier panicked cycle"))?;

        let (source, out) = task::spawn_blocking(move || {
            let out = f(&mut source);
            (source, out)
        })
        .await
        .context("sensor task panicked")?;

        self.source = Some(source);
        Ok(out)
    }
}
