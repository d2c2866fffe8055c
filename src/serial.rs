//! Native asynchronous serial port support for [`Motor`](crate::Motor).
//!
//! Uses the [`serial2-tokio`](https://crates.io/crates/serial2-tokio) crate.
//!
//! ```no_run
//! # #[tokio::main]
//! # async fn main() -> ddsm210::Result<(), ddsm210::serial::PortError> {
//! use ddsm210::{DeviceId, Motor, serial::{self, SerialTransport}};
//!
//! let port = serial::open("/dev/ttyUSB0")?;
//! let transport = SerialTransport::new(port, serial::DEFAULT_TIMEOUT);
//! let mut motor = Motor::new(transport, DeviceId::DEFAULT);
//!
//! println!("{}", motor.query_feedback().await?);
//! # Ok(())
//! # }
//! ```

extern crate std;

use crate::{
    Error,
    frame::{FRAME_LEN, Frame},
    transport::Transport,
};
use alloc::{boxed::Box, vec::Vec};
use core::time::Duration;
use embedded_io_adapters::tokio_1::FromTokio;
use embedded_io_async::{ErrorType, Read, Write};
use log::trace;
use serial2_tokio::{CharSize, Parity, SerialPort, Settings, StopBits};
use tokio::time::{self, Instant};

/// Baud rate of the motor's UART.
pub const BAUD_RATE: u32 = 115_200;

/// Time to wait for a reply before treating the device as silent.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Serial port type implementing [`Read`] and [`Write`].
pub type Port = FromTokio<SerialPort>;

/// Port-specific error type to be used as `E` for the generic [`Error<E>`] type.
pub type PortError = <Port as ErrorType>::Error;

/// Opens a native serial port at the given path.
///
/// Returns a [`Port`] that can be passed to [`SerialTransport::new`].
pub fn open(path: &str) -> Result<Port, Error<std::io::Error>> {
    let port = SerialPort::open(path, |mut settings: Settings| {
        settings.set_raw();
        settings.set_baud_rate(BAUD_RATE)?;
        settings.set_char_size(CharSize::Bits8);
        settings.set_parity(Parity::None);
        settings.set_stop_bits(StopBits::One);

        Ok(settings)
    })?;

    port.discard_buffers()?;

    Ok(FromTokio::new(port))
}

/// Port whose pending input can be dropped before a request is written.
pub trait DiscardInput: ErrorType {
    /// Drops all bytes received but not yet read.
    fn discard_input(&mut self) -> Result<(), Self::Error>;
}

impl DiscardInput for Port {
    fn discard_input(&mut self) -> Result<(), Self::Error> {
        self.inner().discard_input_buffer()
    }
}

/// Transport over a serial port, [`Port`] by default.
///
/// Each exchange waits at most `timeout` for the reply frame. Bytes that
/// arrived until then are returned, so a silent device yields an empty reply.
#[derive(Debug)]
pub struct SerialTransport<P = Port> {
    port: P,
    timeout: Duration,
}

impl<P> SerialTransport<P> {
    /// Constructs a new transport with the given reply timeout.
    #[must_use]
    pub fn new(port: P, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    /// Returns the underlying port.
    pub fn into_inner(self) -> P {
        self.port
    }
}

#[async_trait::async_trait(?Send)]
impl<P: Read + Write + DiscardInput> Transport for SerialTransport<P> {
    type Error = P::Error;

    async fn exchange(&mut self, request: &Frame) -> Result<Vec<u8>, Self::Error> {
        // Drop stale bytes, e.g. a late reply to a previous request
        self.port.discard_input()?;

        trace!("Write to port: {:02x?}", request.as_bytes());
        self.port.write_all(request.as_bytes()).await?;
        self.port.flush().await?;

        let deadline = Instant::now() + self.timeout;
        let mut buf = [0x00; FRAME_LEN];
        let mut len = 0;

        while len < FRAME_LEN {
            match time::timeout_at(deadline, self.port.read(&mut buf[len..])).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => len += n,
                Ok(Err(err)) => return Err(err),
            }
        }

        trace!("Read from port: {:02x?}", &buf[..len]);

        Ok(buf[..len].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::init_logger;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    const TIMEOUT: Duration = Duration::from_millis(50);
    const REQUEST: [u8; 10] = [0x01, 0x74, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x04];
    const REPLY: [u8; 10] = [0x01, 0x74, 0x00, 0x00, 0x00, 0x05, 0x7f, 0xff, 0x00, 0xb4];

    impl DiscardInput for FromTokio<DuplexStream> {
        fn discard_input(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    fn transport() -> (SerialTransport<FromTokio<DuplexStream>>, DuplexStream) {
        let (port, device) = tokio::io::duplex(64);

        (SerialTransport::new(FromTokio::new(port), TIMEOUT), device)
    }

    #[tokio::test(start_paused = true)]
    async fn exchange() -> Result<(), std::io::Error> {
        init_logger();

        let (mut transport, mut device) = transport();
        let request = Frame::decode(&REQUEST).expect("request should be a frame");

        device.write_all(&REPLY).await?;

        let start = Instant::now();
        let reply = transport.exchange(&request).await?;
        let mut sent = [0x00; FRAME_LEN];

        device.read_exact(&mut sent).await?;

        assert_eq!(reply, REPLY, "reply should be correct");
        assert_eq!(sent, REQUEST, "request should be written");
        assert!(start.elapsed() < TIMEOUT, "full reply should not wait for the deadline");

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn exchange_silent_device() -> Result<(), std::io::Error> {
        init_logger();

        let (mut transport, _device) = transport();
        let request = Frame::decode(&REQUEST).expect("request should be a frame");
        let start = Instant::now();
        let reply = transport.exchange(&request).await?;

        assert!(reply.is_empty(), "silent device should yield an empty reply");
        assert!(start.elapsed() >= TIMEOUT, "reply should be awaited until the deadline");

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn exchange_partial_reply() -> Result<(), std::io::Error> {
        init_logger();

        let (mut transport, mut device) = transport();
        let request = Frame::decode(&REQUEST).expect("request should be a frame");

        device.write_all(&REPLY[..3]).await?;

        let start = Instant::now();
        let reply = transport.exchange(&request).await?;

        assert_eq!(reply, &REPLY[..3], "partial reply should be returned");
        assert!(start.elapsed() >= TIMEOUT, "reply should be awaited until the deadline");

        Ok(())
    }
}
