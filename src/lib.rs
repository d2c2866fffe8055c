//! Control DDSM210 geared hub motors via their serial command protocol.
//!
//! # Overview
//!
//! The `ddsm210` crate implements the fixed-length command/response protocol
//! spoken by DDSM210 motors. It offers an asynchronous, platform-agnostic API
//! for driving a motor, querying its telemetry and assigning its bus id.
//!
//! Depending on your needs, you can:
//!
//! - Use the high-level [`Motor`] handle to exchange commands over a [`Transport`].
//! - Build request frames with [`Command::encode`] and decode replies with
//!   [`Response::decode`], supplying your own I/O.
//! - Run the id assignment handshake step by step with [`assign::IdAssignment`].
//!
//! # Getting started
//!
//! The motor exposes a UART that has to be configured as follows:
//!
//! - **Baud rate:** 115200
//! - **Parity:** None
//! - **Data bits:** 8
//! - **Stop bits:** 1
//!
//! If you enable the `native-serial` feature, you can open a compatible
//! serial port using `serial::open` and wrap it in a `serial::SerialTransport`,
//! which also applies the read timeout the protocol relies on.
//!
//! Any other port implementing the [`embedded_io_async`] traits can be used
//! through [`PortTransport`], as long as its reads end once the device stops sending.
//!
//! # Examples
//!
//! ## Driving a motor using [`Motor`]
//!
//! ```no_run
//! use ddsm210::{
//!     DeviceId, Motor,
//!     command::{Drive, MotionMode, Setpoint},
//! };
//!
//! # async fn example<T: ddsm210::Transport>(transport: T) -> ddsm210::Result<(), T::Error> {
//! let mut motor = Motor::new(transport, DeviceId::DEFAULT);
//!
//! motor.switch_mode(MotionMode::Velocity).await?;
//!
//! let telemetry = motor.drive(Drive::new(Setpoint::Velocity(1000))).await?;
//!
//! println!("Velocity: {} rpm", telemetry.rpm());
//! println!("Position: {:.1}°", motor.query_feedback().await?.degrees());
//!
//! motor.brake().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Encoding and decoding frames without a transport
//!
//! ```
//! use ddsm210::{
//!     DeviceId, Response,
//!     command::{Command, CommandKind},
//! };
//!
//! let request = Command::Feedback.encode(DeviceId::DEFAULT)?;
//!
//! assert_eq!(request.as_bytes(), &[0x01, 0x74, 0, 0, 0, 0, 0, 0, 0, 0x04]);
//!
//! let reply = [0x01, 0x74, 0x00, 0x00, 0x00, 0x05, 0x7f, 0xff, 0x00, 0xb4];
//!
//! if let Response::Feedback(telemetry) = Response::decode(CommandKind::Feedback, &reply)? {
//!     assert_eq!(telemetry.laps, 5);
//!     assert!(telemetry.checksum_valid);
//! }
//! # Ok::<(), Box<dyn core::error::Error>>(())
//! ```
//!
//! # Protocol details
//!
//! Every request and response is a 10-byte frame consisting of the device id,
//! an opcode, a payload and a trailing CRC-8/MAXIM checksum.
//! The device answers each request with at most one frame. A missing reply
//! is reported as [`DecodeError::EmptyResponse`] and is not necessarily a fault.
//!
//! Telemetry with a broken checksum is still decoded, with its
//! `checksum_valid` field cleared. Whether to trust it is up to the caller.
//!
//! The control mode (open loop, velocity or position) is kept by the device
//! and determines how drive setpoints are interpreted. It is not tracked here.
//! After a power loss, the device keeps only its id and starts up braked.

#![no_std]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

pub mod assign;
pub mod command;
pub mod crc;
pub mod frame;
pub mod response;
pub mod transport;

#[cfg(feature = "native-serial")]
#[cfg_attr(docsrs, doc(cfg(feature = "native-serial")))]
pub mod serial;

pub use command::{Command, DeviceId};
pub use embedded_io_async;
pub use frame::{DecodeError, EncodeError, Frame};
pub use response::Response;
pub use transport::{PortTransport, Transport};

use crate::{
    assign::{AssignError, AssignmentState, IdAssignment},
    command::{Drive, MotionMode},
    response::{DriveTelemetry, MileageTelemetry, ModeQueryResult},
};
use alloc::vec::Vec;
use core::fmt::{Display, Formatter};
use log::debug;

/// A specialized [`Result`] type for [`Motor`] operations.
///
/// Uses [`Error<E>`] as the error variant, which can include transport-specific errors.
pub type Result<T, E> = core::result::Result<T, Error<E>>;

/// Error type for [`Motor`] operations.
///
/// The generic parameter `E` allows the error type to carry a transport-specific error.
///
/// This enum is marked `#[non_exhaustive]` to allow for future variants.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug)]
pub enum Error<E> {
    /// The request could not be built from the provided arguments.
    Encode(EncodeError),
    /// The reply could not be decoded.
    Decode(DecodeError),
    /// The id assignment handshake was aborted.
    Assignment(AssignError),
    /// A transport-specific input/output error.
    Io(E),
}

impl<E> Error<E> {
    /// Returns `true` if the device did not respond within the transport's timeout.
    #[must_use]
    pub fn is_no_response(&self) -> bool {
        matches!(self, Self::Decode(DecodeError::EmptyResponse))
    }
}

impl<E: core::error::Error> Display for Error<E> {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        match self {
            Self::Encode(err) => write!(f, "encoding error: {err}"),
            Self::Decode(err) => write!(f, "decoding error: {err}"),
            Self::Assignment(err) => write!(f, "id assignment error: {err}"),
            Self::Io(err) => write!(f, "input/output error: {err}"),
        }
    }
}

impl<E: core::error::Error> core::error::Error for Error<E> {}

impl<E> From<E> for Error<E> {
    fn from(err: E) -> Self {
        Self::Io(err)
    }
}

/// Asynchronous handle for a single motor.
///
/// Binds a [`Transport`] to the [`DeviceId`] the motor answers to.
/// Each method performs exactly one exchange, except for [`Motor::assign_id`].
///
/// # Examples
///
/// ```no_run
/// # async fn example<T: ddsm210::Transport>(transport: T) -> ddsm210::Result<(), T::Error> {
/// use ddsm210::{DeviceId, Motor};
///
/// let mut motor = Motor::new(transport, DeviceId::DEFAULT);
///
/// println!("{}", motor.query_mode().await?);
/// println!("{}", motor.query_feedback().await?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Motor<T> {
    transport: T,
    id: DeviceId,
}

impl<T: Transport> Motor<T> {
    /// Constructs a new motor handle.
    pub fn new(transport: T, id: DeviceId) -> Self {
        Self { transport, id }
    }

    /// Returns the id the motor is addressed with.
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Returns a mutable reference to the underlying transport.
    pub fn transport(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Sends any command and decodes the reply according to its kind.
    ///
    /// # Errors
    ///
    /// - [`Error::Encode`] if the command arguments are out of range.
    /// - [`Error::Decode`] if the reply is missing or malformed.
    /// - [`Error::Io`] for transport errors.
    pub async fn execute(&mut self, cmd: Command) -> Result<Response, T::Error> {
        let reply = self.transact(&cmd).await?;

        Response::decode(cmd.kind(), &reply).map_err(Error::Decode)
    }

    /// Drives the motor towards a setpoint and returns its telemetry.
    ///
    /// The setpoint is interpreted according to the motor's current mode,
    /// see [`Motor::switch_mode`].
    pub async fn drive(&mut self, drive: Drive) -> Result<DriveTelemetry, T::Error> {
        let reply = self.transact(&Command::Drive(drive)).await?;

        decode_reply(&reply, DriveTelemetry::decode)
    }

    /// Stops the motor and engages the brake.
    ///
    /// The brake does not hold in open loop mode.
    pub async fn brake(&mut self) -> Result<DriveTelemetry, T::Error> {
        self.drive(Drive::brake()).await
    }

    /// Queries the lap counter and position within the current turn.
    pub async fn query_feedback(&mut self) -> Result<MileageTelemetry, T::Error> {
        let reply = self.transact(&Command::Feedback).await?;

        decode_reply(&reply, MileageTelemetry::decode)
    }

    /// Queries the motor's current control mode.
    pub async fn query_mode(&mut self) -> Result<ModeQueryResult, T::Error> {
        let reply = self.transact(&Command::ObtainMode).await?;

        decode_reply(&reply, ModeQueryResult::decode)
    }

    /// Switches the motor's control mode.
    ///
    /// Returns the raw reply frame, or `None` if the motor did not answer.
    pub async fn switch_mode(&mut self, mode: MotionMode) -> Result<Option<Frame>, T::Error> {
        let reply = self.transact(&Command::SwitchMode(mode)).await?;

        match Frame::decode(&reply) {
            Ok(frame) => Ok(Some(frame)),
            Err(DecodeError::EmptyResponse) => Ok(None),
            Err(err) => Err(Error::Decode(err)),
        }
    }

    /// Assigns a new bus id and addresses the motor with it from now on.
    ///
    /// All motors on the bus accept the assignment, so only the motor to be
    /// renamed should be connected. See the [`assign`] module for details.
    ///
    /// <div class="warning">
    /// The motor accepts only one id change per power cycle.
    /// Power-cycle it before calling this method again.
    /// </div>
    ///
    /// # Errors
    ///
    /// - [`Error::Encode`] if `new_id` is the broadcast id.
    /// - [`Error::Assignment`] if a reply is corrupted.
    /// - [`Error::Io`] for transport errors.
    pub async fn assign_id(&mut self, new_id: u8) -> Result<DeviceId, T::Error> {
        let mut assignment = IdAssignment::new(new_id).map_err(Error::Encode)?;

        while let Some(request) = assignment.next_request() {
            let reply = self.transport.exchange(&request).await?;

            if let AssignmentState::Succeeded { id } =
                assignment.advance(&reply).map_err(Error::Assignment)?
            {
                self.id = id;
            }
        }

        Ok(self.id)
    }

    async fn transact(&mut self, cmd: &Command) -> Result<Vec<u8>, T::Error> {
        let request = cmd.encode(self.id).map_err(Error::Encode)?;

        debug!("Sending {cmd:?} to {}", self.id);

        Ok(self.transport.exchange(&request).await?)
    }
}

fn decode_reply<R, E>(
    reply: &[u8],
    decoder: impl FnOnce(&Frame) -> core::result::Result<R, DecodeError>,
) -> Result<R, E> {
    Frame::decode(reply)
        .and_then(|frame| decoder(&frame))
        .map_err(Error::Decode)
}
