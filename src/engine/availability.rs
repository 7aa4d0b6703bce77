use ulid::Ulid;

use crate::model::*;

use super::EngineError;
use super::conflict::check_no_conflict;

// ── Availability index ──────────────────────────────────────────
//
// Pure operations on a single listing's reservation list. The caller holds
// the listing lock, which is what makes `reserve` atomic.

/// True iff no active reservation overlaps `range`.
pub fn is_available(ls: &ListingState, range: &DateRange) -> bool {
    ls.overlapping(range).next().is_none()
}

/// Re-check and claim `range` for `booking_id`.
pub fn reserve(ls: &mut ListingState, booking_id: Ulid, range: DateRange) -> Result<Reservation, EngineError> {
    check_no_conflict(ls, &range, None)?;
    let reservation = Reservation { booking_id, range };
    ls.insert_reservation(reservation);
    Ok(reservation)
}

/// Drop a booking's reservation. No-op if it holds none.
pub fn release(ls: &mut ListingState, booking_id: Ulid) -> Option<Reservation> {
    ls.remove_reservation(booking_id)
}

/// Maximal free sub-ranges of `window`.
pub fn free_ranges(ls: &ListingState, window: &DateRange) -> Vec<DateRange> {
    let taken: Vec<DateRange> = ls
        .overlapping(window)
        .map(|r| DateRange::new(r.range.start.max(window.start), r.range.end.min(window.end)))
        .collect();
    subtract_ranges(&[*window], &merge_overlapping(&taken))
}

/// Merge sorted overlapping/adjacent ranges into disjoint ranges.
pub fn merge_overlapping(sorted: &[DateRange]) -> Vec<DateRange> {
    let mut merged: Vec<DateRange> = Vec::new();
    for &range in sorted {
        if let Some(last) = merged.last_mut()
            && range.start <= last.end
        {
            last.end = last.end.max(range.end);
            continue;
        }
        merged.push(range);
    }
    merged
}

/// `base` minus `to_remove`. Both inputs sorted and disjoint.
pub fn subtract_ranges(base: &[DateRange], to_remove: &[DateRange]) -> Vec<DateRange> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < b.end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(DateRange::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < b.end {
            result.push(DateRange::new(current_start, b.end));
        }
    }

    result
}
