use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use ulid::Ulid;

use crate::config::{ApprovalPolicy, OpeningHours};
use crate::conflict;
use crate::limits::*;
use crate::model::{Booking, BookingRequest, BookingState, Identity, Span};
use crate::observability;

use super::{Engine, EngineError};

/// Structural validation, before any domain logic runs.
fn validate_request(
    req: &BookingRequest,
    hours: Option<&OpeningHours>,
) -> Result<Span, EngineError> {
    if req.end <= req.start {
        return Err(EngineError::Validation("end must be after start"));
    }
    if req.start < MIN_VALID_TIMESTAMP_MS || req.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::Validation("timestamp out of range"));
    }
    let span = Span::new(req.start, req.end);
    if span.duration_ms() > MAX_BOOKING_DURATION_MS {
        return Err(EngineError::LimitExceeded("booking too long"));
    }
    if req.attendees == 0 {
        return Err(EngineError::Validation("at least one attendee required"));
    }
    if req.attendees > MAX_ATTENDEES {
        return Err(EngineError::LimitExceeded("attendee count absurd"));
    }
    if req.title.is_empty() {
        return Err(EngineError::Validation("title required"));
    }
    if req.title.len() > MAX_TITLE_LEN {
        return Err(EngineError::LimitExceeded("title too long"));
    }
    if let Some(p) = &req.purpose
        && p.len() > MAX_PURPOSE_LEN
    {
        return Err(EngineError::LimitExceeded("purpose too long"));
    }
    if let Some(h) = hours
        && !h.admits(&span)
    {
        return Err(EngineError::Validation("outside opening hours"));
    }
    Ok(span)
}

impl Engine {
    /// Create a booking. Commits ACTIVE (or PENDING under the manual
    /// approval policy) iff the slot has no conflict with committed ACTIVE
    /// bookings at commit time. Transient store failures are retried with
    /// bounded backoff; conflicts and authorization failures never are.
    pub async fn create_booking(
        &self,
        req: BookingRequest,
        actor: &Identity,
        cancel: &CancellationToken,
    ) -> Result<Booking, EngineError> {
        let started = std::time::Instant::now();
        let span = validate_request(&req, self.config.opening_hours.as_ref())?;

        let room = self
            .catalog
            .get_room(req.room_id)
            .await
            .ok_or(EngineError::NotFound(req.room_id))?;
        if req.attendees > room.capacity {
            return Err(EngineError::Validation("attendee count exceeds room capacity"));
        }

        let initial = match self.config.approval {
            ApprovalPolicy::Immediate => BookingState::Active,
            ApprovalPolicy::Manual => BookingState::Pending,
        };
        let booking = Booking {
            id: Ulid::new(),
            room_id: req.room_id,
            owner_id: actor.id,
            title: req.title,
            span,
            attendees: req.attendees,
            purpose: req.purpose,
            state: initial,
            version: 0,
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.attempt_create(&booking, cancel).await {
                Ok(committed) => {
                    metrics::counter!(observability::BOOKINGS_CREATED_TOTAL).increment(1);
                    metrics::histogram!(observability::CREATE_DURATION_SECONDS)
                        .record(started.elapsed().as_secs_f64());
                    info!(
                        "booking {} created on room {} [{}, {})",
                        committed.id, committed.room_id, span.start, span.end
                    );
                    return Ok(committed);
                }
                Err(EngineError::Conflict(id)) => {
                    metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
                    return Err(EngineError::Conflict(id));
                }
                Err(EngineError::Timeout(reason))
                    if !cancel.is_cancelled() && attempt < self.config.retry.max_attempts =>
                {
                    metrics::counter!(observability::CREATE_RETRIES_TOTAL).increment(1);
                    warn!("create attempt {attempt} failed transiently ({reason}), retrying");
                    tokio::time::sleep(self.config.retry.delay(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One atomic create attempt: conflict read, resolver, insert. The
    /// read-time check gives a fast answer; the store's exclusion constraint
    /// makes the commit decision, so a writer landing between the two still
    /// surfaces as `Conflict`, never as a double booking.
    async fn attempt_create(
        &self,
        booking: &Booking,
        cancel: &CancellationToken,
    ) -> Result<Booking, EngineError> {
        let active = self
            .guarded(cancel, self.store.find_active(booking.room_id, booking.span))
            .await?;
        if let Some(hit) = conflict::find_conflict(&active, &booking.span, None) {
            return Err(EngineError::Conflict(hit.id));
        }
        self.guarded(cancel, self.store.insert(booking.clone())).await
    }

    /// Cancel a booking. Owner or elevated role only. Double-cancel is an
    /// error, always the same one: `InvalidState` with the CANCELLED record's
    /// state — a lost race against a concurrent cancel reports identically.
    pub async fn cancel_booking(
        &self,
        id: Ulid,
        actor: &Identity,
        cancel: &CancellationToken,
    ) -> Result<Booking, EngineError> {
        let booking = self.guarded(cancel, self.store.get(id)).await?;

        if booking.owner_id != actor.id && !actor.role.is_elevated() {
            metrics::counter!(observability::AUTH_FAILURES_TOTAL).increment(1);
            warn!(
                "actor {} denied cancel of booking {} owned by {}",
                actor.id, id, booking.owner_id
            );
            return Err(EngineError::Authorization(
                "only the owner or an elevated role may cancel",
            ));
        }
        if booking.state == BookingState::Cancelled {
            return Err(EngineError::InvalidState {
                id,
                state: BookingState::Cancelled,
            });
        }

        let updated = self
            .guarded(
                cancel,
                self.store
                    .update_state(id, booking.state, BookingState::Cancelled),
            )
            .await?;
        metrics::counter!(observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
        info!("booking {id} cancelled by {}", actor.id);
        Ok(updated)
    }

    /// PENDING → ACTIVE under the manual approval policy. Elevated role only.
    /// PENDING bookings never block, so activation re-evaluates the exclusion
    /// constraint inside the store: approving the second of two overlapping
    /// pending bookings fails `Conflict`.
    pub async fn approve_booking(
        &self,
        id: Ulid,
        actor: &Identity,
        cancel: &CancellationToken,
    ) -> Result<Booking, EngineError> {
        if !actor.role.is_elevated() {
            metrics::counter!(observability::AUTH_FAILURES_TOTAL).increment(1);
            return Err(EngineError::Authorization("approval requires an elevated role"));
        }

        let booking = self.guarded(cancel, self.store.get(id)).await?;
        if booking.state != BookingState::Pending {
            return Err(EngineError::InvalidState {
                id,
                state: booking.state,
            });
        }

        let updated = self
            .guarded(
                cancel,
                self.store
                    .update_state(id, BookingState::Pending, BookingState::Active),
            )
            .await?;
        metrics::counter!(observability::BOOKINGS_APPROVED_TOTAL).increment(1);
        info!("booking {id} approved by {}", actor.id);
        Ok(updated)
    }
}
