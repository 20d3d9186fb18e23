use std::{fmt, io};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    SerialPath(String),
    BusAddress(u8),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::SerialPath(path) => write!(f, "{path}"),
            Endpoint::BusAddress(address) => write!(f, "i2c 0x{address:02x}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    Configured,
    Fallback,
    Enumerated,
}

/// One endpoint tried during an upload. Lower `priority` is tried first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportCandidate {
    pub endpoint: Endpoint,
    pub priority: usize,
    pub source: CandidateSource,
}

impl fmt::Display for TransportCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (#{}, {:?})", self.endpoint, self.priority, self.source)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open: {0}")]
    Open(String),

    #[error("failed to write request: {0}")]
    Write(#[source] io::Error),

    #[error("failed to read reply: {0}")]
    Read(#[source] io::Error),

    #[error("no reply before timeout")]
    NoReply,

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("I2C write failed: {0}")]
    Bus(String),
}

#[derive(Debug)]
pub struct FailedAttempt {
    pub candidate: TransportCandidate,
    pub reason: TransportError,
}

#[derive(Debug)]
pub enum UploadOutcome {
    Delivered {
        candidate: TransportCandidate,
        reply: String,
        /// Set when delivery is assumed without a readable reply.
        note: Option<String>,
    },
    Failed {
        attempts: Vec<FailedAttempt>,
    },
}

impl UploadOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, UploadOutcome::Delivered { .. })
    }
}

impl fmt::Display for UploadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadOutcome::Delivered {
                candidate,
                reply,
                note,
            } => {
                write!(f, "delivered via {candidate}, reply {reply:?}")?;
                if let Some(note) = note {
                    write!(f, " ({note})")?;
                }
                Ok(())
            }
            UploadOutcome::Failed { attempts } if attempts.is_empty() => {
                write!(f, "failed: no candidates to try")
            }
            UploadOutcome::Failed { attempts } => {
                write!(f, "failed after {} attempt(s)", attempts.len())?;
                for a in attempts {
                    write!(f, "; {}: {}", a.candidate.endpoint, a.reason)?;
                }
                Ok(())
            }
        }
    }
}
