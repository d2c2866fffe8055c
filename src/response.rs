//! Typed response decoders.
//!
//! Responses are not self-describing beyond their echoed tag byte,
//! so the decoder is selected by the [`CommandKind`] of the request
//! that produced them. See [`Response::decode`].

use crate::{
    command::{CommandKind, MotionMode, OPCODE_DRIVE, OPCODE_FEEDBACK, OPCODE_SWITCH_MODE},
    frame::{DecodeError, Frame},
};
use bitflags_derive::{FlagsDebug, FlagsDisplay};
use core::fmt::{self, Formatter};
use log::debug;

bitflags::bitflags! {
    /// Device error condition.
    ///
    /// Each flag represents a fault reported in the error byte of a response.
    /// Multiple faults may be active simultaneously.
    #[derive(FlagsDisplay, FlagsDebug, PartialEq, Eq, Copy, Clone)]
    pub struct ErrorFlags: u8 {
        /// Motor current exceeded its limit.
        const Overcurrent = 0x02;
        /// Motor temperature exceeded its limit.
        const Overtemperature = 0x10;
    }
}

impl ErrorFlags {
    /// Splits a raw error byte into known flags and reserved bits.
    #[must_use]
    pub fn decode(raw: u8) -> DeviceErrors {
        DeviceErrors {
            flags: Self::from_bits_truncate(raw),
            reserved: raw & !Self::all().bits(),
        }
    }
}

/// Decoded error byte of a response.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct DeviceErrors {
    /// Recognized error conditions.
    pub flags: ErrorFlags,
    /// Remaining set bits without a documented meaning.
    pub reserved: u8,
}

impl DeviceErrors {
    /// Returns `true` if no bit of the error byte is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty() && self.reserved == 0
    }

    /// Returns the number of reserved bits that are set.
    #[must_use]
    pub fn reserved_count(&self) -> u32 {
        self.reserved.count_ones()
    }
}

impl fmt::Display for DeviceErrors {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match (self.flags.is_empty(), self.reserved) {
            (true, 0) => write!(f, "none"),
            (false, 0) => write!(f, "{}", self.flags),
            (true, reserved) => write!(f, "reserved {reserved:#04x}"),
            (false, reserved) => write!(f, "{} (reserved {reserved:#04x})", self.flags),
        }
    }
}

/// Telemetry returned in response to a drive command.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct DriveTelemetry {
    /// Id of the responding device.
    pub id: u8,
    /// Echoed tag byte.
    pub mode: u8,
    /// Current velocity in units of 0.1 rpm.
    pub velocity: i16,
    /// Motor current in device units.
    pub current: u16,
    /// Acceleration time in units of 0.1 ms.
    pub acceleration: u8,
    /// Winding temperature in device units.
    pub temperature: u8,
    /// Reported errors.
    pub errors: DeviceErrors,
    /// Whether the frame checksum matched.
    pub checksum_valid: bool,
}

impl DriveTelemetry {
    /// Decodes a drive response frame.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::UnexpectedTag`] if the frame does not echo the drive opcode.
    pub fn decode(frame: &Frame) -> Result<Self, DecodeError> {
        let b = expect_tag(frame, OPCODE_DRIVE)?;

        Ok(Self {
            id: frame.id(),
            mode: b[0],
            velocity: i16::from_be_bytes([b[1], b[2]]),
            current: u16::from_be_bytes([b[3], b[4]]),
            acceleration: b[5],
            temperature: b[6],
            errors: ErrorFlags::decode(b[7]),
            checksum_valid: checked(frame),
        })
    }

    /// Returns the acceleration time in milliseconds.
    #[must_use]
    pub fn acceleration_ms(&self) -> f32 {
        f32::from(self.acceleration) / 10.0
    }

    /// Returns the velocity in rpm.
    #[must_use]
    pub fn rpm(&self) -> f32 {
        f32::from(self.velocity) / 10.0
    }
}

impl fmt::Display for DriveTelemetry {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "id {:#04x}: velocity {:.1} rpm, current {}, acceleration {:.1} ms, temperature {}, errors {}",
            self.id,
            self.rpm(),
            self.current,
            self.acceleration_ms(),
            self.temperature,
            self.errors,
        )?;

        if !self.checksum_valid {
            write!(f, " [invalid checksum]")?;
        }

        Ok(())
    }
}

/// Telemetry returned in response to a feedback query.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct MileageTelemetry {
    /// Id of the responding device.
    pub id: u8,
    /// Echoed tag byte.
    pub mode: u8,
    /// Number of completed turns.
    pub laps: u32,
    /// Position within the current turn, `0..=65535` covering one turn.
    pub position: u16,
    /// Reported errors.
    pub errors: DeviceErrors,
    /// Whether the frame checksum matched.
    pub checksum_valid: bool,
}

impl MileageTelemetry {
    /// Decodes a feedback response frame.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::UnexpectedTag`] if the frame does not echo the feedback opcode.
    pub fn decode(frame: &Frame) -> Result<Self, DecodeError> {
        let b = expect_tag(frame, OPCODE_FEEDBACK)?;

        Ok(Self {
            id: frame.id(),
            mode: b[0],
            laps: u32::from_be_bytes([b[1], b[2], b[3], b[4]]),
            position: u16::from_be_bytes([b[5], b[6]]),
            errors: ErrorFlags::decode(b[7]),
            checksum_valid: checked(frame),
        })
    }

    /// Returns the position within the current turn in degrees.
    #[must_use]
    pub fn degrees(&self) -> f32 {
        f32::from(self.position) * 360.0 / 65535.0
    }
}

impl fmt::Display for MileageTelemetry {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "id {:#04x}: laps {}, position {} ({:.1}°), errors {}",
            self.id,
            self.laps,
            self.position,
            self.degrees(),
            self.errors,
        )?;

        if !self.checksum_valid {
            write!(f, " [invalid checksum]")?;
        }

        Ok(())
    }
}

/// Result of a mode query.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct ModeQueryResult {
    /// Id of the responding device.
    pub id: u8,
    /// Echoed tag byte, always the mode switch opcode.
    pub tag: u8,
    /// Raw mode byte.
    pub raw_mode: u8,
    /// Whether the frame checksum matched.
    pub checksum_valid: bool,
}

impl ModeQueryResult {
    /// Decodes a mode query response frame.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::UnexpectedTag`] if the frame does not echo the mode switch opcode.
    /// - [`DecodeError::MalformedPadding`] if any byte after the mode is non-zero.
    pub fn decode(frame: &Frame) -> Result<Self, DecodeError> {
        let b = expect_tag(frame, OPCODE_SWITCH_MODE)?;

        if b[2..].iter().any(|&x| x != 0x00) {
            return Err(DecodeError::MalformedPadding);
        }

        Ok(Self {
            id: frame.id(),
            tag: b[0],
            raw_mode: b[1],
            checksum_valid: checked(frame),
        })
    }

    /// Returns the reported mode, if it is a known one.
    #[must_use]
    pub fn mode(&self) -> Option<MotionMode> {
        MotionMode::from_repr(self.raw_mode)
    }
}

impl fmt::Display for ModeQueryResult {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self.mode() {
            Some(mode) => write!(f, "id {:#04x}: mode {mode}", self.id)?,
            None => write!(f, "id {:#04x}: unknown mode {:#04x}", self.id, self.raw_mode)?,
        }

        if !self.checksum_valid {
            write!(f, " [invalid checksum]")?;
        }

        Ok(())
    }
}

/// Decoded response, one variant per [`CommandKind`].
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Response {
    /// Response to [`CommandKind::Drive`].
    Drive(DriveTelemetry),
    /// Response to [`CommandKind::Feedback`].
    Feedback(MileageTelemetry),
    /// Response to [`CommandKind::ObtainMode`].
    Mode(ModeQueryResult),
    /// Response to [`CommandKind::SwitchMode`] or [`CommandKind::SetId`].
    ///
    /// These replies have no documented layout and are passed through unchanged.
    Ack(Frame),
}

impl Response {
    /// Decodes raw response bytes for a request of the given kind.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::EmptyResponse`] if no bytes were received.
    /// - [`DecodeError::LengthMismatch`] if the response is not exactly one frame.
    /// - [`DecodeError::UnexpectedTag`] or [`DecodeError::MalformedPadding`]
    ///   if the frame violates the layout of the expected response.
    pub fn decode(kind: CommandKind, raw: &[u8]) -> Result<Self, DecodeError> {
        let frame = Frame::decode(raw)?;

        match kind {
            CommandKind::Drive => DriveTelemetry::decode(&frame).map(Self::Drive),
            CommandKind::Feedback => MileageTelemetry::decode(&frame).map(Self::Feedback),
            CommandKind::ObtainMode => ModeQueryResult::decode(&frame).map(Self::Mode),
            CommandKind::SwitchMode | CommandKind::SetId => Ok(Self::Ack(frame)),
        }
    }

    /// Returns whether the underlying frame checksum matched.
    #[must_use]
    pub fn checksum_valid(&self) -> bool {
        match self {
            Self::Drive(t) => t.checksum_valid,
            Self::Feedback(t) => t.checksum_valid,
            Self::Mode(r) => r.checksum_valid,
            Self::Ack(frame) => frame.checksum_valid(),
        }
    }
}

/// Checks the echoed tag and returns the 8 bytes following the id.
fn expect_tag(frame: &Frame, expected: u8) -> Result<&[u8], DecodeError> {
    match frame.tag() {
        found if found == expected => Ok(frame.body()),
        found => Err(DecodeError::UnexpectedTag { expected, found }),
    }
}

fn checked(frame: &Frame) -> bool {
    let valid = frame.checksum_valid();

    if !valid {
        debug!("Response checksum mismatch: {:02x?}", frame.as_bytes());
    }

    valid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::init_logger;
    use alloc::string::ToString;

    const DRIVE: [u8; 10] = [0x01, 0x64, 0xfc, 0x18, 0x00, 0x2a, 0x05, 0x1c, 0x12, 0x35];
    const FEEDBACK: [u8; 10] = [0x01, 0x74, 0x00, 0x00, 0x00, 0x05, 0x7f, 0xff, 0x00, 0xb4];
    const MODE: [u8; 10] = [0x01, 0xa0, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xe4];

    #[test]
    fn drive_telemetry() -> Result<(), DecodeError> {
        init_logger();

        let Response::Drive(t) = Response::decode(CommandKind::Drive, &DRIVE)? else {
            panic!("response should be drive telemetry");
        };

        assert_eq!(t.id, 0x01, "id should be correct");
        assert_eq!(t.mode, 0x64, "mode echo should be correct");
        assert_eq!(t.velocity, -1000, "velocity should be correct");
        assert_eq!(t.current, 42, "current should be correct");
        assert_eq!(t.acceleration, 5, "acceleration should be correct");
        assert!((t.acceleration_ms() - 0.5).abs() < 1e-6, "acceleration time should be correct");
        assert_eq!(t.temperature, 28, "temperature should be correct");
        assert_eq!(
            t.errors.flags,
            ErrorFlags::Overcurrent | ErrorFlags::Overtemperature,
            "error flags should be correct"
        );
        assert_eq!(t.errors.reserved, 0x00, "no reserved bits should be set");
        assert!(t.checksum_valid, "checksum should be valid");

        Ok(())
    }

    #[test]
    fn mileage_telemetry() -> Result<(), DecodeError> {
        init_logger();

        let Response::Feedback(t) = Response::decode(CommandKind::Feedback, &FEEDBACK)? else {
            panic!("response should be mileage telemetry");
        };

        assert_eq!(t.laps, 5, "laps should be correct");
        assert_eq!(t.position, 0x7fff, "position should be correct");
        assert!((t.degrees() - 179.997).abs() < 1e-3, "degrees should be correct");
        assert!(t.errors.is_empty(), "no errors should be set");
        assert!(t.checksum_valid, "checksum should be valid");

        Ok(())
    }

    #[test]
    fn mileage_laps_are_big_endian() -> Result<(), DecodeError> {
        init_logger();

        let mut raw = [0x01, 0x74, 0x12, 0x34, 0x56, 0x78, 0x00, 0x00, 0x00, 0x00];
        raw[9] = crate::crc::compute(&raw[..9]);

        let t = MileageTelemetry::decode(&Frame::decode(&raw)?)?;

        assert_eq!(t.laps, 0x1234_5678, "laps should be correct");

        Ok(())
    }

    #[test]
    fn mode_query_result() -> Result<(), DecodeError> {
        init_logger();

        let Response::Mode(r) = Response::decode(CommandKind::ObtainMode, &MODE)? else {
            panic!("response should be a mode query result");
        };

        assert_eq!(r.tag, 0xa0, "tag should be correct");
        assert_eq!(r.mode(), Some(MotionMode::Velocity), "mode should be correct");
        assert!(r.checksum_valid, "checksum should be valid");

        Ok(())
    }

    #[test]
    fn unknown_mode_is_not_an_error() -> Result<(), DecodeError> {
        init_logger();

        let mut raw = MODE;
        raw[2] = 0x07;
        raw[9] = crate::crc::compute(&raw[..9]);

        let r = ModeQueryResult::decode(&Frame::decode(&raw)?)?;

        assert_eq!(r.raw_mode, 0x07, "raw mode should be preserved");
        assert_eq!(r.mode(), None, "mode should be unknown");

        Ok(())
    }

    #[test]
    fn invalid_checksum_is_flagged() -> Result<(), DecodeError> {
        init_logger();

        let mut raw = FEEDBACK;
        raw[9] ^= 0xff;

        let response = Response::decode(CommandKind::Feedback, &raw)?;

        assert!(!response.checksum_valid(), "checksum should be invalid");

        let Response::Feedback(t) = response else {
            panic!("response should be mileage telemetry");
        };

        assert_eq!(t.laps, 5, "telemetry should still be decoded");
        assert!(
            t.to_string().ends_with("[invalid checksum]"),
            "display should mention the checksum"
        );

        Ok(())
    }

    #[test]
    fn ack_passes_frame_through() -> Result<(), DecodeError> {
        init_logger();

        let response = Response::decode(CommandKind::SwitchMode, &MODE)?;

        assert_eq!(
            response,
            Response::Ack(Frame::decode(&MODE)?),
            "frame should be passed through"
        );

        Ok(())
    }

    #[test]
    fn error_unexpected_tag() {
        init_logger();

        assert_eq!(
            Response::decode(CommandKind::Drive, &FEEDBACK),
            Err(DecodeError::UnexpectedTag {
                expected: 0x64,
                found: 0x74
            }),
            "drive decoder should reject feedback response"
        );
        assert_eq!(
            Response::decode(CommandKind::Feedback, &DRIVE),
            Err(DecodeError::UnexpectedTag {
                expected: 0x74,
                found: 0x64
            }),
            "feedback decoder should reject drive response"
        );
        assert_eq!(
            Response::decode(CommandKind::ObtainMode, &FEEDBACK),
            Err(DecodeError::UnexpectedTag {
                expected: 0xa0,
                found: 0x74
            }),
            "mode decoder should reject feedback response"
        );
    }

    #[test]
    fn error_malformed_padding() {
        init_logger();

        for pos in 3..9 {
            let mut raw = MODE;
            raw[pos] = 0x01;
            raw[9] = crate::crc::compute(&raw[..9]);

            assert_eq!(
                Response::decode(CommandKind::ObtainMode, &raw),
                Err(DecodeError::MalformedPadding),
                "non-zero byte at {pos} should be rejected"
            );
        }
    }

    #[test]
    fn error_empty_and_short_responses() {
        init_logger();

        assert_eq!(
            Response::decode(CommandKind::Feedback, &[]),
            Err(DecodeError::EmptyResponse),
            "result should be empty response"
        );
        assert_eq!(
            Response::decode(CommandKind::Drive, &DRIVE[..4]),
            Err(DecodeError::LengthMismatch(4)),
            "result should be length mismatch"
        );
    }

    #[test]
    fn error_flags() {
        let errors = ErrorFlags::decode(0x83);

        assert_eq!(errors.flags, ErrorFlags::Overcurrent, "known flags should be correct");
        assert_eq!(errors.reserved, 0x81, "reserved bits should be correct");
        assert_eq!(errors.reserved_count(), 2, "reserved count should be correct");
        assert!(ErrorFlags::decode(0x00).is_empty(), "zero should decode to no errors");
        assert_eq!(ErrorFlags::decode(0x00).to_string(), "none", "display should be correct");
        assert_eq!(
            ErrorFlags::decode(0x10).to_string(),
            "Overtemperature",
            "display should be correct"
        );
    }
}
