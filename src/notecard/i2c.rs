use std::sync::Mutex;

use embedded_hal::i2c::I2c;
use tracing::debug;

use crate::notecard::{
    CandidateSource, Endpoint, FailedAttempt, TransportCandidate, TransportError, UploadOutcome,
    UploadTransport, reply_error,
};

pub const NOTECARD_ADDRESS: u8 = 0x17;

/// Largest payload slice written in a single I2C transfer.
pub const MAX_TRANSFER_LEN: usize = 250;

pub const MAX_REPLY_LEN: usize = 255;

/// Notecard sharing an I2C bus. The payload goes out in sequential chunks with
/// no per-chunk acknowledgement, followed by one bounded reply read.
pub struct I2cTransport<I> {
    i2c: Mutex<I>,
    address: u8,
}

impl<I: I2c + Send> I2cTransport<I> {
    pub fn new(i2c: I, address: u8) -> Self {
        Self {
            i2c: Mutex::new(i2c),
            address,
        }
    }

    pub fn candidate(&self) -> TransportCandidate {
        TransportCandidate {
            endpoint: Endpoint::BusAddress(self.address),
            priority: 0,
            source: CandidateSource::Configured,
        }
    }
}

impl<I: I2c + Send> UploadTransport for I2cTransport<I> {
    fn send(&self, payload: &[u8]) -> UploadOutcome {
        let candidate = self.candidate();
        let fail = |candidate, reason| UploadOutcome::Failed {
            attempts: vec![FailedAttempt { candidate, reason }],
        };

        let Ok(mut i2c) = self.i2c.lock() else {
            return fail(candidate, TransportError::Open("I2C bus lock poisoned".into()));
        };

        for (i, chunk) in payload.chunks(MAX_TRANSFER_LEN).enumerate() {
            if let Err(e) = i2c.write(self.address, chunk) {
                let reason = TransportError::Bus(format!("chunk {i}: {e:?}"));
                return fail(candidate, reason);
            }
        }

        let mut buf = [0u8; MAX_REPLY_LEN];
        if let Err(e) = i2c.read(self.address, &mut buf) {
            debug!("no reply from {candidate}: {e:?}");
            return UploadOutcome::Delivered {
                candidate,
                reply: String::new(),
                note: Some(format!("written, reply unreadable: {e:?}")),
            };
        }

        let reply = decode_reply(&buf);
        if let Some(err) = reply_error(&reply) {
            return fail(candidate, TransportError::Rejected(err));
        }

        UploadOutcome::Delivered {
            candidate,
            reply,
            note: None,
        }
    }
}

/// Idle bus bytes (0x00, 0xff) pad the read buffer past the end of the reply.
fn decode_reply(buf: &[u8]) -> String {
    let end = buf
        .iter()
        .position(|&b| b == 0x00 || b == 0xff)
        .unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).trim().to_string()
}
