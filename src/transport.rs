//! Transport abstraction for request/response exchanges.
//!
//! The bus is half-duplex: a request frame is written and at most one reply
//! frame is read back before the next request. Implementations are expected
//! to bound the read by a timeout and to return the bytes received so far
//! (possibly none) once it expires.

use crate::frame::{FRAME_LEN, Frame};
use alloc::{boxed::Box, vec::Vec};
use embedded_io_async::{Read, Write};
use log::trace;

/// A single request/response exchange with a device.
#[async_trait::async_trait(?Send)]
pub trait Transport {
    /// Transport-specific error type.
    type Error;

    /// Writes a request and returns the raw reply.
    ///
    /// An empty reply signals that the device did not answer in time.
    async fn exchange(&mut self, request: &Frame) -> Result<Vec<u8>, Self::Error>;
}

#[async_trait::async_trait(?Send)]
impl<T: Transport + ?Sized> Transport for &mut T {
    type Error = T::Error;

    async fn exchange(&mut self, request: &Frame) -> Result<Vec<u8>, Self::Error> {
        (**self).exchange(request).await
    }
}

/// Transport over a port implementing [`Read`] and [`Write`].
///
/// Reads until a full frame has arrived or the port signals end-of-file.
/// Ports that block forever on a silent device need an external timeout,
/// see [`serial::SerialTransport`](crate::serial::SerialTransport) for an
/// implementation that applies one.
#[derive(Debug)]
pub struct PortTransport<P> {
    port: P,
}

impl<P: Read + Write> PortTransport<P> {
    /// Constructs a new transport.
    pub fn new(port: P) -> Self {
        Self { port }
    }

    /// Returns the underlying port.
    pub fn into_inner(self) -> P {
        self.port
    }
}

#[async_trait::async_trait(?Send)]
impl<P: Read + Write> Transport for PortTransport<P> {
    type Error = P::Error;

    async fn exchange(&mut self, request: &Frame) -> Result<Vec<u8>, Self::Error> {
        trace!("Write to port: {:02x?}", request.as_bytes());
        self.port.write_all(request.as_bytes()).await?;
        self.port.flush().await?;

        let mut buf = [0x00; FRAME_LEN];
        let mut len = 0;

        while len < FRAME_LEN {
            match self.port.read(&mut buf[len..]).await? {
                0 => break,
                n => len += n,
            }
        }

        trace!("Read from port: {:02x?}", &buf[..len]);

        Ok(buf[..len].to_vec())
    }
}
