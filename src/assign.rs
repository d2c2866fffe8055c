//! Bus id assignment handshake.
//!
//! The firmware only applies a new id after the assignment request has been
//! sent [`ROUNDS`] times to the broadcast id `0xaa`. The device answers the
//! first request after power-up and may stay silent afterwards, so an empty
//! reply still counts as a completed round. A reply that arrives with a
//! broken checksum aborts the handshake.
//!
//! <div class="warning">
//! A device accepts only one id change per power cycle.
//! It must be power-cycled before running the handshake again.
//! This cannot be detected over the bus.
//! </div>
//!
//! [`IdAssignment`] holds no I/O. Feed it replies via [`IdAssignment::advance`],
//! let it call an exchange closure via [`IdAssignment::step`], or use
//! [`Motor::assign_id`](crate::Motor::assign_id) to drive it over a [`Transport`](crate::Transport).

use crate::{
    Error, Result,
    command::{Command, DeviceId},
    frame::{EncodeError, Frame},
};
use alloc::vec::Vec;
use core::fmt::{self, Formatter};
use log::{debug, warn};

/// Number of requests required for an assignment to take effect.
pub const ROUNDS: u8 = 5;

/// State of an [`IdAssignment`].
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum AssignmentState {
    /// No request has been sent yet.
    Idle,
    /// Assignment in progress, `round` requests have completed.
    Assigning {
        /// Number of completed rounds, below [`ROUNDS`].
        round: u8,
    },
    /// All rounds completed, the device now answers to `id`.
    Succeeded {
        /// Newly assigned id.
        id: DeviceId,
    },
    /// A reply was corrupted and the handshake was aborted.
    Failed,
}

impl AssignmentState {
    /// Returns `true` once no further requests will be sent.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed)
    }
}

/// Error type for the assignment handshake.
#[non_exhaustive]
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum AssignError {
    /// The reply to the given round (starting at 1) had an invalid checksum.
    ChecksumMismatch {
        /// Round whose reply was rejected.
        round: u8,
    },
}

impl fmt::Display for AssignError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::ChecksumMismatch { round } => {
                write!(f, "checksum mismatch in assignment round {round}")
            }
        }
    }
}

impl core::error::Error for AssignError {}

/// Bus id assignment handshake.
///
/// # Examples
///
/// ```
/// use ddsm210::assign::{AssignmentState, IdAssignment};
///
/// let mut assignment = IdAssignment::new(0x02)?;
///
/// // A device that never answers still receives all five requests
/// while let Some(request) = assignment.next_request() {
///     assert_eq!(request.id(), 0xaa);
///     assignment.advance(&[])?;
/// }
///
/// assert!(matches!(assignment.state(), AssignmentState::Succeeded { .. }));
/// # Ok::<(), Box<dyn core::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct IdAssignment {
    target: DeviceId,
    request: Frame,
    state: AssignmentState,
}

impl IdAssignment {
    /// Prepares the handshake for assigning `new_id`.
    ///
    /// # Errors
    ///
    /// - [`EncodeError::ValueOutOfRange`] if `new_id` is the broadcast id.
    pub fn new(new_id: u8) -> core::result::Result<Self, EncodeError> {
        let target = DeviceId::new(new_id)?;
        let request = Command::SetId(new_id).encode(DeviceId::BROADCAST)?;

        Ok(Self {
            target,
            request,
            state: AssignmentState::Idle,
        })
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> AssignmentState {
        self.state
    }

    /// Returns the request for the next round.
    ///
    /// Returns `None` once the handshake has succeeded or failed.
    pub fn next_request(&mut self) -> Option<Frame> {
        match self.state {
            AssignmentState::Idle => {
                self.state = AssignmentState::Assigning { round: 0 };

                Some(self.request)
            }
            AssignmentState::Assigning { .. } => Some(self.request),
            AssignmentState::Succeeded { .. } | AssignmentState::Failed => None,
        }
    }

    /// Completes the current round with the raw reply received for its request.
    ///
    /// Finished handshakes are left unchanged.
    ///
    /// # Errors
    ///
    /// - [`AssignError::ChecksumMismatch`] if the reply is non-empty but not a
    ///   frame with a valid checksum. The handshake is then [`AssignmentState::Failed`].
    pub fn advance(&mut self, reply: &[u8]) -> core::result::Result<AssignmentState, AssignError> {
        let completed = match self.state {
            AssignmentState::Idle => 0,
            AssignmentState::Assigning { round } => round,
            state => return Ok(state),
        };
        let round = completed + 1;

        if reply.is_empty() {
            debug!("No reply to assignment round {round}");
        } else if !Frame::decode(reply).is_ok_and(|frame| frame.checksum_valid()) {
            warn!("Invalid reply to assignment round {round}: {reply:02x?}");
            self.state = AssignmentState::Failed;

            return Err(AssignError::ChecksumMismatch { round });
        }

        self.state = if round == ROUNDS {
            debug!("Assigned id {}", self.target);
            AssignmentState::Succeeded { id: self.target }
        } else {
            AssignmentState::Assigning { round }
        };

        Ok(self.state)
    }

    /// Performs one round through the given exchange closure.
    ///
    /// The closure writes the request and returns the bytes read back,
    /// which are empty if the device did not answer in time.
    /// Finished handshakes are returned without calling the closure.
    ///
    /// # Errors
    ///
    /// - [`Error::Assignment`] if the reply is corrupted.
    /// - [`Error::Io`] if the exchange fails.
    pub fn step<F, E>(&mut self, exchange: F) -> Result<AssignmentState, E>
    where
        F: FnOnce(&Frame) -> core::result::Result<Vec<u8>, E>,
    {
        let Some(request) = self.next_request() else {
            return Ok(self.state);
        };
        let reply = exchange(&request)?;

        self.advance(&reply).map_err(Error::Assignment)
    }
}
