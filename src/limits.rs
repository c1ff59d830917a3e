//! Hard limits protecting the engine against absurd input.

use crate::model::Ms;

/// 1970-01-01T00:00:00Z — nothing is bookable before the epoch.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;

/// 2100-01-01T00:00:00Z.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// A single booking never spans more than 14 days.
pub const MAX_BOOKING_DURATION_MS: Ms = 14 * 24 * 3_600_000;

pub const MAX_TITLE_LEN: usize = 200;

pub const MAX_PURPOSE_LEN: usize = 2_000;

pub const MAX_ATTENDEES: u32 = 100_000;

/// Cap on records per room ledger, cancelled history included.
pub const MAX_BOOKINGS_PER_ROOM: usize = 100_000;

/// Listing queries wider than a year are rejected.
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * 24 * 3_600_000;
