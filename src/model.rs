use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds UTC — the only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`. The end instant itself is not occupied,
/// so back-to-back bookings never touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// Room attributes as served by the catalog. Immutable from the booking
/// core's perspective — capacity edits and the like happen elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub name: String,
    /// Maximum attendee count. Always > 0.
    pub capacity: u32,
    pub facilities: BTreeSet<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Member,
    Admin,
}

impl Role {
    /// Admins may mutate bookings they don't own and approve pending ones.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// Caller identity as handed over by the authentication collaborator.
/// Trusted as given — token verification happens upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Ulid,
    pub display_name: String,
    pub role: Role,
}

impl Identity {
    pub fn new(id: Ulid, display_name: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            role,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingState {
    /// Awaiting approval under the manual approval policy. Does not occupy
    /// room time.
    Pending,
    /// Occupies room time; participates in conflict checks.
    Active,
    /// Terminal. Kept forever as audit trail.
    Cancelled,
}

impl BookingState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingState::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub room_id: Ulid,
    pub owner_id: Ulid,
    pub title: String,
    pub span: Span,
    pub attendees: u32,
    pub purpose: Option<String>,
    pub state: BookingState,
    /// Bumped on every state transition — the store's compare-and-set key.
    pub version: u64,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.state == BookingState::Active
    }
}

/// A structurally complete creation request. Carries raw instants so that an
/// inverted interval is a validation error, not a construction panic.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub room_id: Ulid,
    pub title: String,
    pub start: Ms,
    pub end: Ms,
    pub attendees: u32,
    pub purpose: Option<String>,
}

/// The event types — flat, no nesting. This is the WAL record format.
/// Cancellation is a `StateChanged`, never a delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BookingCreated {
        booking: Booking,
    },
    StateChanged {
        id: Ulid,
        room_id: Ulid,
        from: BookingState,
        to: BookingState,
        /// Version after the transition.
        version: u64,
    },
}
