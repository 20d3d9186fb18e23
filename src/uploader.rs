use std::{sync::Arc, time::Duration};

use anyhow::{Context as _, Result, ensure};
use tokio::{
    sync::watch,
    task,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{debug, error, info, warn};

use crate::{
    buffer::SharedBuffer,
    notecard::{UploadOutcome, UploadTransport, card_write_request},
};

#[derive(Debug)]
pub enum UploadReport {
    NothingToSend,
    Attempted {
        outcome: UploadOutcome,
        batch_len: usize,
        acknowledged: usize,
    },
}

/// Periodically pushes the persisted batch through an [`UploadTransport`].
/// Failures are logged and retried on the next tick; nothing here can stop the
/// process.
pub struct Uploader {
    buffer: Arc<SharedBuffer>,
    transport: Arc<dyn UploadTransport>,
    interval: Duration,
}

impl Uploader {
    pub fn new(
        buffer: Arc<SharedBuffer>,
        transport: Arc<dyn UploadTransport>,
        interval: Duration,
    ) -> Self {
        Self {
            buffer,
            transport,
            interval,
        }
    }

    /// First upload happens one interval after start. An attempt still in
    /// flight when `stop` fires is abandoned; its batch stays buffered. Upload
    /// failures never end the task; only a zero interval does.
    pub async fn run(self, mut stop: watch::Receiver<bool>) -> Result<()> {
        ensure!(
            !self.interval.is_zero(),
            "upload interval must be greater than zero"
        );

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *stop.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            tokio::select! {
                result = self.upload_once() => {
                    if let Err(e) = result {
                        error!("upload attempt aborted: {e:#}");
                    }
                }
                _ = stop.changed() => {
                    info!("stop requested, abandoning in-flight upload");
                    break;
                }
            }
        }

        debug!("uploader stopped");
        Ok(())
    }

    /// One attempt: snapshot under the buffer lock, send with the lock
    /// released, acknowledge only on delivery.
    pub async fn upload_once(&self) -> Result<UploadReport> {
        let buffer = self.buffer.clone();
        let batch = task::spawn_blocking(move || buffer.snapshot_and_optionally_clear(false))
            .await
            .context("snapshot reader panicked")?
            .context("failed to read measurement batch")?;

        if batch.is_empty() {
            debug!("nothing to upload");
            return Ok(UploadReport::NothingToSend);
        }

        let payload = card_write_request(&self.buffer.file_name(), &batch.contents)
            .context("failed to encode upload request")?;

        let transport = self.transport.clone();
        let outcome = task::spawn_blocking(move || transport.send(&payload))
            .await
            .context("upload transport panicked")?;

        let batch_len = batch.len();
        let mut acknowledged = 0;
        if outcome.is_delivered() {
            info!("uploaded {batch_len} measurement(s): {outcome}");

            let buffer = self.buffer.clone();
            acknowledged = task::spawn_blocking(move || buffer.acknowledge(&batch))
                .await
                .context("snapshot writer panicked")?
                .context("failed to drop delivered measurements")?;
        } else {
            warn!("upload of {batch_len} measurement(s) {outcome}; keeping batch for next tick");
        }

        Ok(UploadReport::Attempted {
            outcome,
            batch_len,
            acknowledged,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    };

    use chrono::{TimeZone as _, Utc};
    use serde_json::Value;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        notecard::{
            CandidateSource, Endpoint, FailedAttempt, TransportCandidate, TransportError,
        },
        sen5x::{Measurement, Readings},
    };

    /// Records payloads; optionally appends to the buffer mid-send to prove the
    /// lock is not held across transport I/O.
    struct RecordingTransport {
        deliver: AtomicBool,
        sent: Mutex<Vec<Value>>,
        append_during_send: Option<Arc<SharedBuffer>>,
    }

    impl RecordingTransport {
        fn new(deliver: bool) -> Self {
            Self {
                deliver: AtomicBool::new(deliver),
                sent: Mutex::default(),
                append_during_send: None,
            }
        }

        fn sent_counts(&self) -> Vec<usize> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|req| {
                    let data = req["body"]["data"].as_str().unwrap();
                    serde_json::from_str::<Vec<Measurement>>(data).unwrap().len()
                })
                .collect()
        }
    }

    fn candidate() -> TransportCandidate {
        TransportCandidate {
            endpoint: Endpoint::SerialPath("/dev/ttyACM0".into()),
            priority: 0,
            source: CandidateSource::Configured,
        }
    }

    impl UploadTransport for RecordingTransport {
        fn send(&self, payload: &[u8]) -> UploadOutcome {
            self.sent
                .lock()
                .unwrap()
                .push(serde_json::from_slice(payload).unwrap());

            if let Some(buffer) = &self.append_during_send {
                buffer.append(measurement(59)).unwrap();
            }

            if self.deliver.load(Ordering::SeqCst) {
                UploadOutcome::Delivered {
                    candidate: candidate(),
                    reply: "{}".into(),
                    note: None,
                }
            } else {
                UploadOutcome::Failed {
                    attempts: vec![FailedAttempt {
                        candidate: candidate(),
                        reason: TransportError::NoReply,
                    }],
                }
            }
        }
    }

    fn measurement(second: u32) -> Measurement {
        Measurement::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, second).unwrap(),
            Readings::default(),
        )
    }

    fn buffer(dir: &TempDir) -> Arc<SharedBuffer> {
        Arc::new(SharedBuffer::open(dir.path().join("sensor_data.json")).unwrap())
    }

    #[tokio::test]
    async fn empty_buffer_sends_nothing() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(RecordingTransport::new(true));
        let uploader = Uploader::new(buffer(&dir), transport.clone(), Duration::from_secs(1));

        let report = uploader.upload_once().await.unwrap();

        assert!(matches!(report, UploadReport::NothingToSend));
        assert!(transport.sent_counts().is_empty());
    }

    #[tokio::test]
    async fn sends_card_write_with_file_contents() {
        let dir = TempDir::new().unwrap();
        let buffer = buffer(&dir);
        buffer.append(measurement(1)).unwrap();
        let transport = Arc::new(RecordingTransport::new(true));
        let uploader = Uploader::new(buffer.clone(), transport.clone(), Duration::from_secs(1));

        uploader.upload_once().await.unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0]["req"], "card.write");
        assert_eq!(sent[0]["body"]["file"], "sensor_data.json");
        assert!(buffer.is_empty().unwrap());
    }

    #[tokio::test]
    async fn failed_upload_retains_batch() {
        let dir = TempDir::new().unwrap();
        let buffer = buffer(&dir);
        buffer.append(measurement(1)).unwrap();
        buffer.append(measurement(2)).unwrap();
        let transport = Arc::new(RecordingTransport::new(false));
        let uploader = Uploader::new(buffer.clone(), transport.clone(), Duration::from_secs(1));

        let report = uploader.upload_once().await.unwrap();
        let UploadReport::Attempted { acknowledged, .. } = report else {
            panic!("expected an attempt");
        };
        assert_eq!(acknowledged, 0);
        assert_eq!(buffer.len().unwrap(), 2);

        buffer.append(measurement(3)).unwrap();
        transport.deliver.store(true, Ordering::SeqCst);
        uploader.upload_once().await.unwrap();

        assert_eq!(transport.sent_counts(), vec![2, 3]);
        assert!(buffer.is_empty().unwrap());
    }

    #[tokio::test]
    async fn appends_during_send_survive_acknowledge() {
        let dir = TempDir::new().unwrap();
        let buffer = buffer(&dir);
        buffer.append(measurement(1)).unwrap();
        let transport = Arc::new(RecordingTransport {
            append_during_send: Some(buffer.clone()),
            ..RecordingTransport::new(true)
        });
        let uploader = Uploader::new(buffer.clone(), transport, Duration::from_secs(1));

        let report = uploader.upload_once().await.unwrap();

        let UploadReport::Attempted { acknowledged, .. } = report else {
            panic!("expected an attempt");
        };
        assert_eq!(acknowledged, 1);
        let left = buffer.snapshot_and_optionally_clear(false).unwrap();
        assert_eq!(left.measurements, vec![measurement(59)]);
    }

    #[tokio::test]
    async fn run_uploads_on_timer_and_stops() {
        let dir = TempDir::new().unwrap();
        let buffer = buffer(&dir);
        buffer.append(measurement(1)).unwrap();
        let transport = Arc::new(RecordingTransport::new(true));
        let uploader = Uploader::new(buffer.clone(), transport.clone(), Duration::from_millis(10));
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(uploader.run(stop_rx));
        while !buffer.is_empty().unwrap() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        stop_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        assert_eq!(transport.sent_counts(), vec![1]);
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let dir = TempDir::new().unwrap();
        let buffer = buffer(&dir);
        buffer.append(measurement(1)).unwrap();
        let transport = Arc::new(RecordingTransport::new(true));
        let uploader = Uploader::new(buffer.clone(), transport.clone(), Duration::ZERO);
        let (_stop_tx, stop_rx) = watch::channel(false);

        let err = tokio::spawn(uploader.run(stop_rx)).await.unwrap().unwrap_err();

        assert!(err.to_string().contains("upload interval must be greater than zero"));
        assert!(transport.sent_counts().is_empty());
        assert_eq!(buffer.len().unwrap(), 1);
    }
}
