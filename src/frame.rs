//! Fixed-length frame codec.
//!
//! Every request and response on the bus is exactly [`FRAME_LEN`] bytes:
//!
//! ```text
//! [id, opcode_or_mode, b2, b3, b4, b5, b6, b7, b8, crc8]
//! ```
//!
//! The trailing byte is the [CRC-8/MAXIM](crate::crc) checksum of the first nine.

use crate::crc;
use core::fmt::{Display, Formatter};
use log::trace;

/// Length of every frame in bytes.
pub const FRAME_LEN: usize = 10;

/// Number of bytes shared by the opcode and the payload.
const BODY_LEN: usize = 8;

/// Error type for building request frames.
///
/// These errors always indicate caller misuse and are never retried.
#[non_exhaustive]
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum EncodeError {
    /// Opcode and payload do not add up to the 8 bytes between id and checksum.
    FrameLengthMismatch,
    /// A numeric argument lies outside the range accepted by the device.
    ValueOutOfRange,
}

impl Display for EncodeError {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        match self {
            Self::FrameLengthMismatch => write!(f, "frame length mismatch"),
            Self::ValueOutOfRange => write!(f, "value out of range"),
        }
    }
}

impl core::error::Error for EncodeError {}

/// Error type for parsing response frames.
///
/// A checksum mismatch is deliberately absent: it is reported through
/// [`Frame::checksum_valid`] and the `checksum_valid` fields of decoded telemetry.
#[non_exhaustive]
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum DecodeError {
    /// No bytes arrived before the transport timed out.
    ///
    /// This is an expected outcome, e.g. for a device that stays silent.
    EmptyResponse,
    /// The response has a length other than [`FRAME_LEN`].
    LengthMismatch(usize),
    /// The echoed tag byte does not belong to the command that was sent.
    UnexpectedTag {
        /// Tag byte required by the command.
        expected: u8,
        /// Tag byte found in the response.
        found: u8,
    },
    /// Bytes that must be zero contain data.
    MalformedPadding,
}

impl DecodeError {
    /// Returns `true` if the device did not respond at all.
    #[must_use]
    pub fn is_empty_response(&self) -> bool {
        matches!(self, Self::EmptyResponse)
    }
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        match self {
            Self::EmptyResponse => write!(f, "empty response"),
            Self::LengthMismatch(len) => {
                write!(f, "length mismatch: expected {FRAME_LEN} bytes, got {len}")
            }
            Self::UnexpectedTag { expected, found } => {
                write!(f, "unexpected tag: expected {expected:#04x}, got {found:#04x}")
            }
            Self::MalformedPadding => write!(f, "malformed padding"),
        }
    }
}

impl core::error::Error for DecodeError {}

/// A single 10-byte frame.
///
/// Frames built via [`Frame::encode`] always carry a correct checksum.
/// Frames obtained from [`Frame::decode`] may not, see [`Frame::checksum_valid`].
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct Frame([u8; FRAME_LEN]);

impl Frame {
    /// Builds a request frame from a target id, opcode and payload.
    ///
    /// The opcode is one or two bytes long and, together with the payload,
    /// must fill the 8 bytes between id and checksum.
    ///
    /// # Errors
    ///
    /// - [`EncodeError::FrameLengthMismatch`] if the lengths do not add up.
    pub fn encode(id: u8, opcode: &[u8], payload: &[u8]) -> Result<Self, EncodeError> {
        if !(1..=2).contains(&opcode.len()) || opcode.len() + payload.len() != BODY_LEN {
            return Err(EncodeError::FrameLengthMismatch);
        }

        let mut buf = [0x00; FRAME_LEN];

        buf[0] = id;
        buf[1..=opcode.len()].copy_from_slice(opcode);
        buf[1 + opcode.len()..FRAME_LEN - 1].copy_from_slice(payload);
        buf[FRAME_LEN - 1] = crc::compute(&buf[..FRAME_LEN - 1]);

        let frame = Self(buf);

        trace!("New frame: {:02x?}", frame.0);

        Ok(frame)
    }

    /// Parses raw bytes received from the transport.
    ///
    /// A checksum mismatch does not fail parsing.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::EmptyResponse`] if `raw` is empty.
    /// - [`DecodeError::LengthMismatch`] if `raw` is not exactly [`FRAME_LEN`] bytes.
    pub fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        match raw.len() {
            0 => Err(DecodeError::EmptyResponse),
            FRAME_LEN => {
                let mut buf = [0x00; FRAME_LEN];

                buf.copy_from_slice(raw);

                Ok(Self(buf))
            }
            len => Err(DecodeError::LengthMismatch(len)),
        }
    }

    /// Returns the id byte.
    #[must_use]
    pub fn id(&self) -> u8 {
        self.0[0]
    }

    /// Returns the opcode byte, which responses echo as their tag.
    #[must_use]
    pub fn tag(&self) -> u8 {
        self.0[1]
    }

    /// Returns the 8 bytes following the id, including the tag.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.0[1..FRAME_LEN - 1]
    }

    /// Returns the trailing checksum byte.
    #[must_use]
    pub fn checksum(&self) -> u8 {
        self.0[FRAME_LEN - 1]
    }

    /// Returns `true` if the trailing byte matches the checksum of the first nine.
    #[must_use]
    pub fn checksum_valid(&self) -> bool {
        self.checksum() == crc::compute(&self.0[..FRAME_LEN - 1])
    }

    /// Returns the raw frame bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }
}

impl From<Frame> for [u8; FRAME_LEN] {
    fn from(frame: Frame) -> Self {
        frame.0
    }
}
