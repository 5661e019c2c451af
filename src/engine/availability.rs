use crate::model::*;

use super::EngineError;

// ── Availability Algorithm ────────────────────────────────────────

/// Decide whether a stay window is bookable on a room.
///
/// Rejections, in order: stay shorter than the room's minimum, overlap
/// with a live booking (pending within its payment window, or confirmed),
/// then the earliest blocked date inside the window. Read-only: the
/// booking path re-runs this under the room's write lock before inserting.
pub fn check_availability(room: &RoomState, stay: &StaySpan, now: Ms) -> Result<(), EngineError> {
    if let Some(min) = room.minimum_nights
        && stay.nights() < min as i64 {
            return Err(EngineError::MinimumStay {
                required: min,
                requested: stay.nights(),
            });
        }

    for booking in room.bookings_touching(stay) {
        if booking.is_active(now) {
            return Err(EngineError::BookingConflict {
                id: booking.id,
                reference: booking.reference.clone(),
            });
        }
    }

    // blocked_in yields in calendar order, so the first hit is the earliest
    if let Some(date) = room.blocked_in(stay).next() {
        return Err(EngineError::DateBlocked(date));
    }

    Ok(())
}

/// Compute the open calendar gaps of a room inside `query`: the query
/// window minus live bookings and blocked dates, as disjoint spans.
pub fn free_windows(room: &RoomState, query: &StaySpan, now: Ms) -> Vec<StaySpan> {
    let mut busy: Vec<StaySpan> = Vec::new();

    for booking in room.bookings_touching(query) {
        if booking.is_active(now) {
            busy.push(StaySpan::new(
                booking.span.start.max(query.start),
                booking.span.end.min(query.end),
            ));
        }
    }
    for date in room.blocked_in(query) {
        if let Some(next) = date.succ_opt() {
            busy.push(StaySpan::new(date, next));
        }
    }

    busy.sort_by_key(|s| s.start);
    let busy = merge_overlapping(&busy);
    subtract_spans(&[*query], &busy)
}

/// Merge sorted overlapping/adjacent spans into disjoint spans.
pub fn merge_overlapping(sorted: &[StaySpan]) -> Vec<StaySpan> {
    let mut merged: Vec<StaySpan> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

/// Subtract sorted disjoint `to_remove` spans from sorted `base` spans.
pub fn subtract_spans(base: &[StaySpan], to_remove: &[StaySpan]) -> Vec<StaySpan> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(StaySpan::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(StaySpan::new(current_start, current_end));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use ulid::Ulid;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn span(a: (i32, u32, u32), b: (i32, u32, u32)) -> StaySpan {
        StaySpan::new(d(a.0, a.1, a.2), d(b.0, b.1, b.2))
    }

    fn make_room(bookings: Vec<Booking>) -> RoomState {
        let mut room = RoomState::new(Ulid::new(), None, 10000, HashMap::new(), None);
        for b in bookings {
            room.insert_booking(b);
        }
        room
    }

    fn booking(stay: StaySpan, status: BookingStatus, expires: Option<Ms>) -> Booking {
        Booking {
            id: Ulid::new(),
            reference: "BK-2025-0001".into(),
            span: stay,
            status,
            total_cost: 0,
            channel: Channel::Website,
            hold_expires_at: expires,
        }
    }

    // ── check_availability ────────────────────────────────

    #[test]
    fn overlapping_confirmed_booking_conflicts() {
        let existing = span((2025, 3, 10), (2025, 3, 15));
        let room = make_room(vec![booking(existing, BookingStatus::Confirmed, None)]);

        let request = span((2025, 3, 12), (2025, 3, 18));
        let err = check_availability(&room, &request, 0).unwrap_err();
        assert!(matches!(err, EngineError::BookingConflict { ref reference, .. }
            if reference == "BK-2025-0001"));
    }

    #[test]
    fn back_to_back_stays_allowed() {
        let existing = span((2025, 3, 10), (2025, 3, 15));
        let room = make_room(vec![booking(existing, BookingStatus::Confirmed, None)]);

        check_availability(&room, &span((2025, 3, 15), (2025, 3, 18)), 0).unwrap();
        check_availability(&room, &span((2025, 3, 7), (2025, 3, 10)), 0).unwrap();
    }

    #[test]
    fn pending_booking_blocks_within_hold() {
        let existing = span((2025, 3, 10), (2025, 3, 15));
        let room = make_room(vec![booking(existing, BookingStatus::Pending, Some(10_000))]);

        let request = span((2025, 3, 12), (2025, 3, 14));
        assert!(check_availability(&room, &request, 9_999).is_err());
        // Hold lapsed: the pending booking no longer blocks
        check_availability(&room, &request, 10_000).unwrap();
    }

    #[test]
    fn blocked_date_reported_earliest_first() {
        let mut room = make_room(vec![]);
        room.block(d(2025, 3, 13));
        room.block(d(2025, 3, 11));

        let err = check_availability(&room, &span((2025, 3, 10), (2025, 3, 15)), 0).unwrap_err();
        assert_eq!(err, EngineError::DateBlocked(d(2025, 3, 11)));
    }

    #[test]
    fn blocked_checkout_day_is_fine() {
        let mut room = make_room(vec![]);
        room.block(d(2025, 3, 15));
        check_availability(&room, &span((2025, 3, 10), (2025, 3, 15)), 0).unwrap();
    }

    #[test]
    fn minimum_nights_enforced() {
        let mut room = make_room(vec![]);
        room.minimum_nights = Some(3);

        let err = check_availability(&room, &span((2025, 3, 10), (2025, 3, 12)), 0).unwrap_err();
        assert_eq!(
            err,
            EngineError::MinimumStay {
                required: 3,
                requested: 2
            }
        );
        check_availability(&room, &span((2025, 3, 10), (2025, 3, 13)), 0).unwrap();
    }

    // ── free_windows ──────────────────────────────────────

    #[test]
    fn free_windows_fragment_around_booking() {
        let room = make_room(vec![booking(
            span((2025, 3, 10), (2025, 3, 15)),
            BookingStatus::Confirmed,
            None,
        )]);

        let free = free_windows(&room, &span((2025, 3, 1), (2025, 3, 31)), 0);
        assert_eq!(
            free,
            vec![
                span((2025, 3, 1), (2025, 3, 10)),
                span((2025, 3, 15), (2025, 3, 31)),
            ]
        );
    }

    #[test]
    fn free_windows_merge_adjacent_blocks() {
        let mut room = make_room(vec![]);
        room.block(d(2025, 3, 10));
        room.block(d(2025, 3, 11));
        room.block(d(2025, 3, 12));

        let free = free_windows(&room, &span((2025, 3, 1), (2025, 3, 20)), 0);
        assert_eq!(
            free,
            vec![
                span((2025, 3, 1), (2025, 3, 10)),
                span((2025, 3, 13), (2025, 3, 20)),
            ]
        );
    }

    #[test]
    fn free_windows_booking_spanning_query_edge() {
        let room = make_room(vec![booking(
            span((2025, 2, 25), (2025, 3, 5)),
            BookingStatus::Confirmed,
            None,
        )]);

        let free = free_windows(&room, &span((2025, 3, 1), (2025, 3, 10)), 0);
        assert_eq!(free, vec![span((2025, 3, 5), (2025, 3, 10))]);
    }

    #[test]
    fn free_windows_empty_room_is_all_free() {
        let room = make_room(vec![]);
        let query = span((2025, 3, 1), (2025, 3, 31));
        assert_eq!(free_windows(&room, &query, 0), vec![query]);
    }

    #[test]
    fn free_windows_fully_booked() {
        let query = span((2025, 3, 1), (2025, 3, 31));
        let room = make_room(vec![booking(query, BookingStatus::Confirmed, None)]);
        assert!(free_windows(&room, &query, 0).is_empty());
    }

    // ── merge / subtract primitives ───────────────────────

    #[test]
    fn merge_overlapping_basic() {
        let spans = vec![
            span((2025, 1, 1), (2025, 1, 10)),
            span((2025, 1, 5), (2025, 1, 12)),
            span((2025, 1, 20), (2025, 1, 25)),
        ];
        assert_eq!(
            merge_overlapping(&spans),
            vec![
                span((2025, 1, 1), (2025, 1, 12)),
                span((2025, 1, 20), (2025, 1, 25)),
            ]
        );
    }

    #[test]
    fn merge_adjacent_spans() {
        let spans = vec![
            span((2025, 1, 1), (2025, 1, 5)),
            span((2025, 1, 5), (2025, 1, 9)),
        ];
        assert_eq!(merge_overlapping(&spans), vec![span((2025, 1, 1), (2025, 1, 9))]);
    }

    #[test]
    fn subtract_middle_punch() {
        let base = vec![span((2025, 1, 1), (2025, 1, 31))];
        let remove = vec![span((2025, 1, 10), (2025, 1, 15))];
        assert_eq!(
            subtract_spans(&base, &remove),
            vec![
                span((2025, 1, 1), (2025, 1, 10)),
                span((2025, 1, 15), (2025, 1, 31)),
            ]
        );
    }

    #[test]
    fn subtract_no_overlap() {
        let base = vec![
            span((2025, 1, 1), (2025, 1, 10)),
            span((2025, 2, 1), (2025, 2, 10)),
        ];
        let remove = vec![span((2025, 1, 10), (2025, 2, 1))];
        assert_eq!(subtract_spans(&base, &remove), base);
    }

    #[test]
    fn subtract_full_cover() {
        let base = vec![span((2025, 1, 5), (2025, 1, 10))];
        let remove = vec![span((2025, 1, 1), (2025, 1, 15))];
        assert!(subtract_spans(&base, &remove).is_empty());
    }
}
