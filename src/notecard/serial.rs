use std::{
    io::{self, BufRead as _, BufReader, Read, Write},
    time::Duration,
};

use tracing::{debug, warn};

use crate::notecard::{
    CandidateSource, Endpoint, FailedAttempt, TransportCandidate, TransportError, UploadOutcome,
    UploadTransport, reply_error,
};

/// Device paths where a Notecard commonly shows up, tried in order during
/// autodetection.
pub const FALLBACK_SERIAL_PATHS: [&str; 6] = [
    "/dev/ttyACM0",
    "/dev/ttyACM1",
    "/dev/ttyUSB0",
    "/dev/ttyUSB1",
    "/dev/serial0",
    "/dev/ttyAMA0",
];

const ENUMERATED_PORT_MARKERS: [&str; 4] = ["ttyACM", "ttyUSB", "usbmodem", "usbserial"];

pub const DEFAULT_BAUD_RATE: u32 = 9600;

pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

pub trait SerialLink: Read + Write + Send {}

impl<T: Read + Write + Send> SerialLink for T {}

/// Opens and discovers serial devices.
pub trait SerialConnector: Send + Sync {
    fn open(&self, path: &str) -> Result<Box<dyn SerialLink>, TransportError>;

    /// Host ports that look like a Notecard, in enumeration order.
    fn enumerate(&self) -> Vec<String>;
}

#[derive(Debug, Clone)]
pub struct SystemSerial {
    baud_rate: u32,
    timeout: Duration,
}

impl SystemSerial {
    pub fn new(baud_rate: u32, timeout: Duration) -> Self {
        Self { baud_rate, timeout }
    }
}

impl Default for SystemSerial {
    fn default() -> Self {
        Self::new(DEFAULT_BAUD_RATE, DEFAULT_REPLY_TIMEOUT)
    }
}

impl SerialConnector for SystemSerial {
    fn open(&self, path: &str) -> Result<Box<dyn SerialLink>, TransportError> {
        let port = serialport::new(path, self.baud_rate)
            .timeout(self.timeout)
            .open()
            .map_err(|e| TransportError::Open(e.to_string()))?;
        Ok(Box::new(port))
    }

    fn enumerate(&self) -> Vec<String> {
        match serialport::available_ports() {
            Ok(ports) => ports
                .into_iter()
                .map(|p| p.port_name)
                .filter(|name| ENUMERATED_PORT_MARKERS.iter().any(|m| name.contains(m)))
                .collect(),
            Err(e) => {
                warn!("failed to enumerate serial ports: {e}");
                Vec::new()
            }
        }
    }
}

/// Notecard attached over a serial line.
pub struct SerialTransport<C = SystemSerial> {
    primary: String,
    autodetect: bool,
    connector: C,
}

impl<C: SerialConnector> SerialTransport<C> {
    pub fn new(primary: impl Into<String>, autodetect: bool, connector: C) -> Self {
        Self {
            primary: primary.into(),
            autodetect,
            connector,
        }
    }

    /// Built fresh on every call: the configured path, then the fallback list,
    /// then whatever the host enumerates right now. Duplicates keep their first
    /// position.
    pub fn candidates(&self) -> Vec<TransportCandidate> {
        let mut paths = vec![(self.primary.clone(), CandidateSource::Configured)];

        if self.autodetect {
            paths.extend(
                FALLBACK_SERIAL_PATHS
                    .iter()
                    .map(|p| (p.to_string(), CandidateSource::Fallback)),
            );
            paths.extend(
                self.connector
                    .enumerate()
                    .into_iter()
                    .map(|p| (p, CandidateSource::Enumerated)),
            );
        }

        let mut candidates: Vec<TransportCandidate> = Vec::with_capacity(paths.len());
        for (path, source) in paths {
            let endpoint = Endpoint::SerialPath(path);
            if candidates.iter().any(|c| c.endpoint == endpoint) {
                continue;
            }
            candidates.push(TransportCandidate {
                endpoint,
                priority: candidates.len(),
                source,
            });
        }
        candidates
    }

    fn attempt(&self, path: &str, payload: &[u8]) -> Result<String, TransportError> {
        let mut link = self.connector.open(path)?;

        link.write_all(payload).map_err(TransportError::Write)?;
        link.flush().map_err(TransportError::Write)?;

        let mut reply = String::new();
        match BufReader::new(link).read_line(&mut reply) {
            Ok(0) => return Err(TransportError::NoReply),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::TimedOut => return Err(TransportError::NoReply),
            Err(e) => return Err(TransportError::Read(e)),
        }

        let reply = reply.trim().to_string();
        if let Some(err) = reply_error(&reply) {
            return Err(TransportError::Rejected(err));
        }
        Ok(reply)
    }
}

impl<C: SerialConnector> UploadTransport for SerialTransport<C> {
    fn send(&self, payload: &[u8]) -> UploadOutcome {
        let mut attempts = Vec::new();

        for candidate in self.candidates() {
            let Endpoint::SerialPath(path) = &candidate.endpoint else {
                continue;
            };

            match self.attempt(path, payload) {
                Ok(reply) => {
                    return UploadOutcome::Delivered {
                        candidate,
                        reply,
                        note: None,
                    };
                }
                Err(reason) => {
                    debug!("serial candidate {candidate} failed: {reason}");
                    attempts.push(FailedAttempt { candidate, reason });
                }
            }
        }

        UploadOutcome::Failed { attempts }
    }
}
