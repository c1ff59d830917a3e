use ulid::Ulid;

use crate::model::BookingState;
use crate::store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    /// Structurally invalid request: malformed interval, capacity exceeded,
    /// outside the booking window.
    Validation(&'static str),
    /// The slot overlaps the named ACTIVE booking. Includes late detection
    /// at commit time. Never auto-retried.
    Conflict(Ulid),
    /// Actor is neither owner nor elevated. Never auto-retried.
    Authorization(&'static str),
    /// Unknown room or booking.
    NotFound(Ulid),
    /// Illegal state transition, e.g. cancelling a CANCELLED booking.
    InvalidState { id: Ulid, state: BookingState },
    LimitExceeded(&'static str),
    /// Store unresponsive, caller cancelled, or retry budget exhausted.
    Timeout(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "validation failed: {msg}"),
            EngineError::Conflict(id) => write!(f, "conflicts with active booking: {id}"),
            EngineError::Authorization(msg) => write!(f, "not authorized: {msg}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::InvalidState { id, state } => {
                write!(f, "invalid transition for booking {id} in state {state:?}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Timeout(reason) => write!(f, "timed out: {reason}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => EngineError::NotFound(id),
            // A colliding id means the slot decision was made elsewhere.
            StoreError::AlreadyExists(id) => EngineError::Conflict(id),
            StoreError::Overlap(id) => EngineError::Conflict(id),
            StoreError::StaleState { id, actual, .. } => EngineError::InvalidState {
                id,
                state: actual,
            },
            StoreError::LimitExceeded(msg) => EngineError::LimitExceeded(msg),
            StoreError::Unavailable(reason) => EngineError::Timeout(reason),
        }
    }
}
