//! The conflict resolver: a pure predicate over one room's bookings.
//!
//! Two half-open intervals `[s1, e1)` and `[s2, e2)` conflict iff
//! `s1 < e2 && s2 < e1`. Only ACTIVE bookings participate — PENDING and
//! CANCELLED records never block. Exact abutment is not a conflict.

use ulid::Ulid;

use crate::model::{Booking, BookingState, Span};

/// First ACTIVE booking whose interval intersects `candidate`, or None.
/// `exclude` skips the booking being re-evaluated, for flows that re-check
/// an existing record (approval, future reschedule).
pub fn find_conflict<'a>(
    bookings: &'a [Booking],
    candidate: &Span,
    exclude: Option<Ulid>,
) -> Option<&'a Booking> {
    bookings.iter().find(|b| {
        b.state == BookingState::Active
            && exclude != Some(b.id)
            && b.span.overlaps(candidate)
    })
}

pub fn has_conflict(bookings: &[Booking], candidate: &Span, exclude: Option<Ulid>) -> bool {
    find_conflict(bookings, candidate, exclude).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(start: i64, end: i64, state: BookingState) -> Booking {
        Booking {
            id: Ulid::new(),
            room_id: Ulid::new(),
            owner_id: Ulid::new(),
            title: "b".into(),
            span: Span::new(start, end),
            attendees: 1,
            purpose: None,
            state,
            version: 0,
        }
    }

    #[test]
    fn overlapping_active_conflicts() {
        let existing = vec![booking(100, 200, BookingState::Active)];
        assert!(has_conflict(&existing, &Span::new(150, 250), None));
        assert!(has_conflict(&existing, &Span::new(50, 150), None));
    }

    #[test]
    fn containment_both_directions_conflicts() {
        let existing = vec![booking(100, 400, BookingState::Active)];
        // candidate inside existing
        assert!(has_conflict(&existing, &Span::new(200, 300), None));

        let existing = vec![booking(200, 300, BookingState::Active)];
        // candidate swallows existing
        assert!(has_conflict(&existing, &Span::new(100, 400), None));
    }

    #[test]
    fn abutting_is_not_a_conflict() {
        let existing = vec![booking(100, 200, BookingState::Active)];
        assert!(!has_conflict(&existing, &Span::new(200, 300), None));
        assert!(!has_conflict(&existing, &Span::new(0, 100), None));
    }

    #[test]
    fn pending_and_cancelled_never_block() {
        let existing = vec![
            booking(100, 200, BookingState::Pending),
            booking(100, 200, BookingState::Cancelled),
        ];
        assert!(!has_conflict(&existing, &Span::new(100, 200), None));
    }

    #[test]
    fn exclude_skips_the_named_booking() {
        let existing = vec![booking(100, 200, BookingState::Active)];
        let id = existing[0].id;
        assert!(!has_conflict(&existing, &Span::new(100, 200), Some(id)));
        assert!(has_conflict(&existing, &Span::new(100, 200), Some(Ulid::new())));
    }

    #[test]
    fn reports_the_blocking_booking() {
        let existing = vec![
            booking(0, 50, BookingState::Active),
            booking(100, 200, BookingState::Active),
        ];
        let hit = find_conflict(&existing, &Span::new(150, 300), None).unwrap();
        assert_eq!(hit.id, existing[1].id);
    }
}
