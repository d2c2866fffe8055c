//! Typed request builders.
//!
//! Each [`Command`] knows its opcode and payload layout and turns into a
//! ready-to-send [`Frame`] via [`Command::encode`].

use crate::frame::{EncodeError, Frame};
use core::fmt::{self, Formatter};
use strum::{Display, EnumString, FromRepr, VariantNames};

/// Opcode of the identity assignment command (two bytes).
pub(crate) const OPCODE_SET_ID: [u8; 2] = [0x55, 0x53];
/// Opcode of the drive command.
pub(crate) const OPCODE_DRIVE: u8 = 0x64;
/// Opcode of the feedback query.
pub(crate) const OPCODE_FEEDBACK: u8 = 0x74;
/// Opcode of the mode query.
pub(crate) const OPCODE_OBTAIN_MODE: u8 = 0x75;
/// Opcode of the mode switch command, also echoed by mode query responses.
pub(crate) const OPCODE_SWITCH_MODE: u8 = 0xa0;

/// Largest velocity setpoint magnitude, in units of 0.1 rpm.
pub const MAX_VELOCITY: i16 = 2100;

/// Largest position setpoint, corresponding to a full turn.
pub const MAX_POSITION: u16 = 32767;

/// Bus id of a device.
///
/// Any value except the broadcast id `0xaa` can be assigned to a device.
/// The broadcast id is reserved for identity assignment and cannot be constructed.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct DeviceId(u8);

impl DeviceId {
    /// Reserved id that every device listens to during identity assignment.
    pub(crate) const BROADCAST: Self = Self(0xaa);

    /// Factory default id.
    pub const DEFAULT: Self = Self(0x01);

    /// Constructs a device id.
    ///
    /// # Errors
    ///
    /// - [`EncodeError::ValueOutOfRange`] for the reserved broadcast id.
    pub fn new(id: u8) -> Result<Self, EncodeError> {
        match id {
            0xaa => Err(EncodeError::ValueOutOfRange),
            id => Ok(Self(id)),
        }
    }

    /// Returns the raw id byte.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Control mode of the motor.
///
/// The mode is session state held by the device and determines how the
/// [`Drive`] setpoint is interpreted.
#[derive(
    FromRepr, Display, EnumString, VariantNames, PartialEq, Eq, Copy, Clone, Debug,
)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum MotionMode {
    /// No holding torque; a brake command does not latch.
    OpenLoop = 0x00,
    /// Velocity loop, setpoints in units of 0.1 rpm.
    Velocity = 0x02,
    /// Position loop, setpoints covering one turn.
    Position = 0x03,
}

/// Command tag, used to select the matching response decoder.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum CommandKind {
    /// Identity assignment.
    SetId,
    /// Velocity or position drive.
    Drive,
    /// Mileage and position feedback query.
    Feedback,
    /// Mode query.
    ObtainMode,
    /// Mode switch.
    SwitchMode,
}

/// Setpoint of a drive command.
///
/// Both variants share the same 16-bit field on the wire.
/// Which one the device applies depends on its current [`MotionMode`].
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Setpoint {
    /// Target velocity in units of 0.1 rpm, within `±MAX_VELOCITY`.
    Velocity(i16),
    /// Target position, with `0..=MAX_POSITION` covering one turn.
    Position(u16),
}

impl Setpoint {
    /// Converts a velocity in rpm into a setpoint, rounding to 0.1 rpm.
    ///
    /// # Errors
    ///
    /// - [`EncodeError::ValueOutOfRange`] beyond ±210 rpm.
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_rpm(rpm: f32) -> Result<Self, EncodeError> {
        let scaled = rpm * 10.0;

        if !(-f32::from(MAX_VELOCITY)..=f32::from(MAX_VELOCITY)).contains(&scaled) {
            return Err(EncodeError::ValueOutOfRange);
        }

        let rounded = if scaled < 0.0 {
            scaled - 0.5
        } else {
            scaled + 0.5
        };

        Ok(Self::Velocity(rounded as i16))
    }

    /// Converts an angle in degrees (`0..=360`) into a position setpoint.
    ///
    /// # Errors
    ///
    /// - [`EncodeError::ValueOutOfRange`] for angles outside `0..=360`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_degrees(degrees: f32) -> Result<Self, EncodeError> {
        if !(0.0..=360.0).contains(&degrees) {
            return Err(EncodeError::ValueOutOfRange);
        }

        Ok(Self::Position(
            (degrees / 360.0 * f32::from(MAX_POSITION) + 0.5) as u16,
        ))
    }

    fn to_be_bytes(self) -> Result<[u8; 2], EncodeError> {
        match self {
            Self::Velocity(v) if (-MAX_VELOCITY..=MAX_VELOCITY).contains(&v) => {
                Ok(v.to_be_bytes())
            }
            Self::Position(p) if p <= MAX_POSITION => Ok(p.to_be_bytes()),
            _ => Err(EncodeError::ValueOutOfRange),
        }
    }
}

/// Converts an acceleration time in milliseconds into the device's native unit.
///
/// One unit equals 0.1 ms; the result is rounded and saturates at a byte.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn acceleration_from_millis(ms: f32) -> u8 {
    // Float-to-int casts saturate, negative and NaN inputs end up as 0
    (ms * 10.0 + 0.5) as u8
}

/// Drive command parameters.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct Drive {
    /// Velocity or position setpoint.
    pub setpoint: Setpoint,
    /// Acceleration time in units of 0.1 ms.
    pub acceleration: u8,
    /// Engages the brake.
    pub brake: bool,
}

impl Drive {
    /// Constructs a drive command without acceleration ramp or brake.
    #[must_use]
    pub fn new(setpoint: Setpoint) -> Self {
        Self {
            setpoint,
            acceleration: 0,
            brake: false,
        }
    }

    /// Constructs a brake command.
    ///
    /// The brake holds the motor in velocity and position mode only.
    #[must_use]
    pub fn brake() -> Self {
        Self {
            setpoint: Setpoint::Velocity(0),
            acceleration: 0,
            brake: true,
        }
    }

    /// Sets the acceleration time in units of 0.1 ms.
    #[must_use]
    pub fn with_acceleration(mut self, acceleration: u8) -> Self {
        self.acceleration = acceleration;
        self
    }

    fn payload(&self) -> Result<[u8; 7], EncodeError> {
        let [hi, lo] = self.setpoint.to_be_bytes()?;
        let brake = if self.brake { 0xff } else { 0x00 };

        Ok([hi, lo, 0x00, 0x00, self.acceleration, brake, 0x00])
    }
}

/// Request sent to a device.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Command {
    /// Assigns a new bus id. Always sent to the broadcast id `0xaa`.
    SetId(u8),
    /// Drives the motor towards a setpoint.
    Drive(Drive),
    /// Queries mileage and position.
    Feedback,
    /// Queries the current mode.
    ObtainMode,
    /// Switches the control mode.
    SwitchMode(MotionMode),
}

impl Command {
    /// Returns the tag of this command.
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::SetId(_) => CommandKind::SetId,
            Self::Drive(_) => CommandKind::Drive,
            Self::Feedback => CommandKind::Feedback,
            Self::ObtainMode => CommandKind::ObtainMode,
            Self::SwitchMode(_) => CommandKind::SwitchMode,
        }
    }

    /// Builds the request frame addressed to `id`.
    ///
    /// [`Command::SetId`] ignores `id` and is addressed to the broadcast id `0xaa`.
    ///
    /// # Errors
    ///
    /// - [`EncodeError::ValueOutOfRange`] for setpoints outside the accepted range
    ///   or an identity assignment to the broadcast id.
    pub fn encode(&self, id: DeviceId) -> Result<Frame, EncodeError> {
        match *self {
            Self::SetId(target) => {
                let target = DeviceId::new(target)?;

                Frame::encode(
                    DeviceId::BROADCAST.get(),
                    &OPCODE_SET_ID,
                    &[target.get(), 0x00, 0x00, 0x00, 0x00, 0x00],
                )
            }
            Self::Drive(drive) => Frame::encode(id.get(), &[OPCODE_DRIVE], &drive.payload()?),
            Self::Feedback => Frame::encode(id.get(), &[OPCODE_FEEDBACK], &[0x00; 7]),
            Self::ObtainMode => Frame::encode(id.get(), &[OPCODE_OBTAIN_MODE], &[0x00; 7]),
            Self::SwitchMode(mode) => Frame::encode(
                id.get(),
                &[OPCODE_SWITCH_MODE],
                &[mode as u8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
            ),
        }
    }
}
