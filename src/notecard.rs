//! Delivery of buffered measurements to a Blues Notecard.
//!
//! Two transports share the [`UploadTransport`] interface:
//! - [`SerialTransport`] for USB/UART attachment, with autodetection of the
//!   device path when the configured one is unusable
//! - [`I2cTransport`] for a Notecard sharing the I2C bus
//!
//! Which one is used is decided once from configuration.

mod i2c;
mod outcome;
mod request;
mod serial;

pub use i2c::*;
pub use outcome::*;
pub use request::*;
pub use serial::*;

/// Sends one request and reports how it went. Implementations never panic or
/// error out of band; every failure lands in [`UploadOutcome::Failed`].
pub trait UploadTransport: Send + Sync {
    fn send(&self, payload: &[u8]) -> UploadOutcome;
}
