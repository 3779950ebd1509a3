//! Per-day interval arithmetic for the Query operation.

use crate::model::{Booking, MINUTES_PER_DAY, Minutes, Span};

/// Bounds of `day` in absolute minutes.
pub fn day_bounds(day: u8) -> Span {
    let start = day as Minutes * MINUTES_PER_DAY;
    Span::new(start, start + MINUTES_PER_DAY)
}

/// Clip `span` to the bounds of `day`. `None` when they do not intersect.
/// Multi-day bookings are clipped to the day boundary this way before any
/// subtraction.
pub fn clip_to_day(span: &Span, day: u8) -> Option<Span> {
    let bounds = day_bounds(day);
    let start = span.start.max(bounds.start);
    let end = span.end.min(bounds.end);
    (start < end).then(|| Span::new(start, end))
}

/// Maximal free intervals within `day`, i.e. `[00:00, 24:00)` minus every
/// booking that intersects the day. Result spans are in absolute minutes.
pub fn free_intervals(day: u8, bookings: &[Booking]) -> Vec<Span> {
    let bounds = day_bounds(day);
    let mut busy: Vec<Span> = bookings
        .iter()
        .filter_map(|b| clip_to_day(&b.span, day))
        .collect();
    busy.sort_by_key(|s| s.start);

    let mut free = Vec::new();
    let mut current = bounds.start;
    for iv in &busy {
        if iv.start > current {
            free.push(Span::new(current, iv.start));
        }
        current = current.max(iv.end);
    }
    if current < bounds.end {
        free.push(Span::new(current, bounds.end));
    }
    free
}

/// Day-relative `HH:MM`; minute 1440 renders as `24:00`.
pub fn hhmm(rel: Minutes) -> String {
    format!("{:02}:{:02}", rel / 60, rel % 60)
}

/// `HH:MM-HH:MM, ...` over day-relative times, or `Fully booked`.
pub fn render_free_intervals(day: u8, free: &[Span]) -> String {
    if free.is_empty() {
        return "Fully booked".into();
    }
    let base = day_bounds(day).start;
    free.iter()
        .map(|s| format!("{}-{}", hhmm(s.start - base), hhmm(s.end - base)))
        .collect::<Vec<_>>()
        .join(", ")
}
