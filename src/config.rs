use std::time::Duration;

use crate::model::{Ms, Span};

const DAY_MS: Ms = 86_400_000;

/// What state a newly created booking lands in. A single global choice —
/// never per-request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApprovalPolicy {
    /// Bookings commit ACTIVE and occupy room time immediately.
    #[default]
    Immediate,
    /// Bookings commit PENDING and only occupy room time once approved.
    Manual,
}

/// Bounded retry with exponential backoff, applied only to transient store
/// failures during create. Conflicts and authorization failures never retry.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(25),
        }
    }
}

/// Daily booking window in UTC, as millisecond offsets from midnight.
/// A booking must fall entirely inside one day's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpeningHours {
    pub open: Ms,
    pub close: Ms,
}

impl OpeningHours {
    pub fn new(open: Ms, close: Ms) -> Self {
        debug_assert!(0 <= open && open < close && close <= DAY_MS);
        Self { open, close }
    }

    pub fn admits(&self, span: &Span) -> bool {
        let day_start = span.start - span.start.rem_euclid(DAY_MS);
        span.start - day_start >= self.open && span.end - day_start <= self.close
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub approval: ApprovalPolicy,
    /// None means bookable around the clock.
    pub opening_hours: Option<OpeningHours>,
    pub retry: RetryPolicy,
    /// Per-attempt budget for a store call. Exceeding it is a transient
    /// failure (retried during create), eventually surfacing `Timeout`.
    pub store_timeout: Duration,
    /// Whether listings include CANCELLED records.
    pub list_includes_cancelled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            approval: ApprovalPolicy::default(),
            opening_hours: None,
            retry: RetryPolicy::default(),
            store_timeout: Duration::from_secs(5),
            list_includes_cancelled: false,
        }
    }
}
