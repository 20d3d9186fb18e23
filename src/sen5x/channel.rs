use embedded_hal::{
    delay::DelayNs,
    i2c::{ErrorKind, I2c},
};
use thiserror::Error;

use crate::sen5x::{FRAME_LEN, RawFrame};

pub const SEN5X_ADDRESS: u8 = 0x69;

pub const START_PERIODIC_MEASUREMENT: [u8; 2] = [0x00, 0x21];

/// Requests the latest measurement; the answer is a [`RawFrame`].
pub const READ_MEASURED_VALUES: [u8; 2] = [0x03, 0xc4];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorTiming {
    pub power_up_ms: u32,
    pub first_measurement_ms: u32,
    pub settle_ms: u32,
}

impl Default for SensorTiming {
    fn default() -> Self {
        // power-up wait, then time until the first result is available
        Self {
            power_up_ms: 1_000,
            first_measurement_ms: 2_000,
            settle_ms: 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("I2C {operation} at 0x{address:02x} failed ({kind:?}): {detail}")]
    Bus {
        operation: &'static str,
        address: u8,
        kind: ErrorKind,
        detail: String,
    },
}

/// Something that produces raw measurement frames.
pub trait FrameSource {
    /// One-time start sequence, including the warm-up wait.
    fn start_periodic_measurement(&mut self) -> Result<(), SensorError>;

    fn read_measurement(&mut self) -> Result<RawFrame, SensorError>;
}

#[derive(Debug)]
pub struct SensorChannel<I, D> {
    i2c: I,
    delay: D,
    address: u8,
    timing: SensorTiming,
}

impl<I: I2c, D: DelayNs> SensorChannel<I, D> {
    pub fn new(i2c: I, delay: D, address: u8) -> Self {
        Self::with_timing(i2c, delay, address, SensorTiming::default())
    }

    pub fn with_timing(i2c: I, delay: D, address: u8, timing: SensorTiming) -> Self {
        Self {
            i2c,
            delay,
            address,
            timing,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    fn write_command(&mut self, operation: &'static str, command: &[u8]) -> Result<(), SensorError> {
        let address = self.address;
        self.i2c
            .write(address, command)
            .map_err(|e| bus_error(operation, address, e))
    }
}

impl<I: I2c, D: DelayNs> FrameSource for SensorChannel<I, D> {
    fn start_periodic_measurement(&mut self) -> Result<(), SensorError> {
        self.delay.delay_ms(self.timing.power_up_ms);
        self.write_command("start periodic measurement", &START_PERIODIC_MEASUREMENT)?;
        self.delay.delay_ms(self.timing.first_measurement_ms);
        Ok(())
    }

    fn read_measurement(&mut self) -> Result<RawFrame, SensorError> {
        self.write_command("read measured values", &READ_MEASURED_VALUES)?;
        self.delay.delay_ms(self.timing.settle_ms);

        let address = self.address;
        let mut frame = [0u8; FRAME_LEN];
        self.i2c
            .read(address, &mut frame)
            .map_err(|e| bus_error("frame read", address, e))?;

        Ok(frame)
    }
}

fn bus_error<E: embedded_hal::i2c::Error>(operation: &'static str, address: u8, e: E) -> SensorError {
    SensorError::Bus {
        operation,
        address,
        kind: e.kind(),
        detail: format!("{e:?}"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use embedded_hal::i2c::{ErrorType, NoAcknowledgeSource, Operation};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Write(u8, Vec<u8>),
        Read(u8, usize),
        Delay(u32),
    }

    type Log = Arc<Mutex<Vec<Event>>>;

    struct MockBus {
        log: Log,
        frame: RawFrame,
        fail_reads: bool,
    }

    impl ErrorType for MockBus {
        type Error = ErrorKind;
    }

    impl I2c for MockBus {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            for op in operations {
                match op {
                    Operation::Write(bytes) => {
                        self.log.lock().unwrap().push(Event::Write(address, bytes.to_vec()));
                    }
                    Operation::Read(buf) => {
                        if self.fail_reads {
                            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
                        }
                        self.log.lock().unwrap().push(Event::Read(address, buf.len()));
                        buf.copy_from_slice(&self.frame[..buf.len()]);
                    }
                }
            }
            Ok(())
        }
    }

    struct MockDelay(Log);

    impl DelayNs for MockDelay {
        fn delay_ns(&mut self, _ns: u32) {}

        fn delay_ms(&mut self, ms: u32) {
            self.0.lock().unwrap().push(Event::Delay(ms));
        }
    }

    fn channel(fail_reads: bool) -> (SensorChannel<MockBus, MockDelay>, Log) {
        let log = Log::default();
        let mut frame = [0u8; FRAME_LEN];
        frame[0] = 0x01;
        frame[1] = 0x02;
        let bus = MockBus {
            log: log.clone(),
            frame,
            fail_reads,
        };
        (
            SensorChannel::new(bus, MockDelay(log.clone()), SEN5X_ADDRESS),
            log,
        )
    }

    #[test]
    fn start_waits_around_start_command() {
        let (mut channel, log) = channel(false);

        channel.start_periodic_measurement().unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                Event::Delay(1_000),
                Event::Write(0x69, vec![0x00, 0x21]),
                Event::Delay(2_000),
            ]
        );
    }

    #[test]
    fn read_issues_command_then_reads_full_frame() {
        let (mut channel, log) = channel(false);

        let frame = channel.read_measurement().unwrap();

        assert_eq!(&frame[..2], &[0x01, 0x02]);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                Event::Write(0x69, vec![0x03, 0xc4]),
                Event::Delay(1),
                Event::Read(0x69, 24),
            ]
        );
    }

    #[test]
    fn read_failure_names_operation() {
        let (mut channel, _log) = channel(true);

        let err = channel.read_measurement().unwrap_err();

        let SensorError::Bus {
            operation,
            address,
            kind,
            ..
        } = err;
        assert_eq!(operation, "frame read");
        assert_eq!(address, 0x69);
        assert_eq!(kind, ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
    }
}
